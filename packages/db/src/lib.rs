//! Store adapters for the job queue system.
//!
//! This crate provides the [`Store`] interface the queue is built on and two
//! implementations:
//!
//! - [`SurrealStore`] persists records in a SurrealDB table
//! - [`MemoryStore`] keeps records in process, for tests
//!
//! # Features
//!
//! - `memory` (default): Use in-memory SurrealDB storage
//! - `rocksdb`: Use RocksDB for persistent file-based storage

mod connection;
mod error;
mod memory;
mod schema;
mod store;
mod surreal_store;

pub use connection::{Database, DbConfig, connect};
pub use error::StoreError;
pub use memory::MemoryStore;
pub use schema::{ensure_collection, remove_collection, table_exists};
pub use store::{JobFilter, JobUpdate, Store, Updated, Upserted};
pub use surreal_store::SurrealStore;
