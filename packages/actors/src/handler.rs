//! Job handler trait.

use std::future::Future;
use std::pin::Pin;

use jobqueue::Job;

/// Result type for job handlers. The error is recorded when the job is
/// abandoned.
pub type HandlerResult = Result<(), String>;

/// Future type for async job handlers.
pub type HandlerFuture = Pin<Box<dyn Future<Output = HandlerResult> + Send>>;

/// Trait for job handlers.
///
/// Implement this trait to define how claimed jobs are processed.
pub trait JobHandler: Send + Sync + 'static {
    /// Process a job.
    fn handle(&self, job: &Job) -> HandlerFuture;
}

/// A simple function-based job handler.
pub struct FnHandler<F>
where
    F: Fn(&Job) -> HandlerFuture + Send + Sync + 'static,
{
    handler: F,
}

impl<F> FnHandler<F>
where
    F: Fn(&Job) -> HandlerFuture + Send + Sync + 'static,
{
    /// Create a new function-based handler.
    pub fn new(handler: F) -> Self {
        Self { handler }
    }
}

impl<F> JobHandler for FnHandler<F>
where
    F: Fn(&Job) -> HandlerFuture + Send + Sync + 'static,
{
    fn handle(&self, job: &Job) -> HandlerFuture {
        (self.handler)(job)
    }
}

/// Helper macro for creating job handlers from async closures.
#[macro_export]
macro_rules! job_handler {
    (|$job:ident| $body:expr) => {
        $crate::FnHandler::new(|$job: &$crate::Job| -> $crate::HandlerFuture {
            let $job = $job.clone();
            Box::pin(async move {
                let result: $crate::HandlerResult = $body;
                result
            })
        })
    };
}
