//! Database connection setup.

use surrealdb::Surreal;
use surrealdb::engine::any::{Any, connect as connect_any};
use surrealdb::opt::auth::Root;

use crate::StoreError;

/// Database connection wrapper.
pub type Database = Surreal<Any>;

/// Database configuration.
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// Connection mode: "mem://", "file://path" or "rocksdb://path"
    pub endpoint: String,
    /// Namespace to use
    pub namespace: String,
    /// Database name to use
    pub database: String,
    /// Optional root credentials for authentication
    pub credentials: Option<(String, String)>,
    /// Table holding the queue's records
    pub collection: String,
    /// Maximum number of records kept before the oldest are evicted
    pub capacity: Option<usize>,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            endpoint: "mem://".to_string(),
            namespace: "jobqueue".to_string(),
            database: "main".to_string(),
            credentials: None,
            collection: "jobqueue".to_string(),
            capacity: Some(100_000),
        }
    }
}

impl DbConfig {
    /// Create a config for in-memory testing.
    pub fn memory() -> Self {
        Self::default()
    }

    /// Create a config for file-based persistence.
    pub fn file(path: impl Into<String>) -> Self {
        Self {
            endpoint: format!("file://{}", path.into()),
            ..Default::default()
        }
    }

    /// Create a config for RocksDB persistence (requires rocksdb feature).
    pub fn rocksdb(path: impl Into<String>) -> Self {
        Self {
            endpoint: format!("rocksdb://{}", path.into()),
            ..Default::default()
        }
    }

    /// Build a config from environment variables.
    ///
    /// - `JOBQUEUE_DB_ENDPOINT` (default: `mem://`)
    /// - `JOBQUEUE_DB_NAMESPACE` (default: `jobqueue`)
    /// - `JOBQUEUE_DB_DATABASE` (default: `main`)
    /// - `JOBQUEUE_DB_USER` / `JOBQUEUE_DB_PASS` (optional, both required)
    /// - `JOBQUEUE_COLLECTION` (default: `jobqueue`)
    /// - `JOBQUEUE_CAPACITY` (default: 100000, `0` means unbounded)
    pub fn from_env() -> Result<Self, StoreError> {
        let var = |key: &str| std::env::var(key).ok().filter(|v| !v.trim().is_empty());
        let mut cfg = Self::default();

        if let Some(endpoint) = var("JOBQUEUE_DB_ENDPOINT") {
            cfg.endpoint = endpoint;
        }
        if let Some(ns) = var("JOBQUEUE_DB_NAMESPACE") {
            cfg.namespace = ns;
        }
        if let Some(db) = var("JOBQUEUE_DB_DATABASE") {
            cfg.database = db;
        }
        match (var("JOBQUEUE_DB_USER"), var("JOBQUEUE_DB_PASS")) {
            (Some(user), Some(pass)) => cfg.credentials = Some((user, pass)),
            (None, None) => {}
            _ => {
                return Err(StoreError::InvalidConfig(
                    "JOBQUEUE_DB_USER and JOBQUEUE_DB_PASS must be set together".into(),
                ));
            }
        }
        if let Some(collection) = var("JOBQUEUE_COLLECTION") {
            cfg.collection = collection;
        }
        if let Some(capacity) = var("JOBQUEUE_CAPACITY") {
            let n: usize = capacity.trim().parse().map_err(|_| {
                StoreError::InvalidConfig(format!("unsupported JOBQUEUE_CAPACITY={capacity}"))
            })?;
            cfg.capacity = (n > 0).then_some(n);
        }

        Ok(cfg)
    }

    /// Set the namespace.
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Set the database name.
    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = database.into();
        self
    }

    /// Set root credentials for authentication.
    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.credentials = Some((username.into(), password.into()));
        self
    }

    /// Set the table holding the queue.
    pub fn with_collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = collection.into();
        self
    }

    /// Set the record bound. `None` disables eviction.
    pub fn with_capacity(mut self, capacity: Option<usize>) -> Self {
        self.capacity = capacity;
        self
    }
}

/// Open a database connection and select the configured namespace/database.
pub async fn connect(config: &DbConfig) -> Result<Database, StoreError> {
    tracing::info!("Connecting to database: {}", config.endpoint);

    let db = connect_any(config.endpoint.as_str()).await?;

    // Authenticate if credentials provided
    if let Some((username, password)) = &config.credentials {
        db.signin(Root { username, password }).await?;
    }

    db.use_ns(&config.namespace)
        .use_db(&config.database)
        .await?;

    tracing::info!(
        "Connected to database: {}/{}",
        config.namespace,
        config.database
    );

    Ok(db)
}
