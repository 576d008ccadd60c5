//! Exception reporting.

use std::sync::Arc;

use crate::error::JobError;

/// Records or forwards unexpected failures (error tracker, log sink, ...).
pub trait ExceptionReporter: Send + Sync {
    fn report(&self, error: &JobError);
}

impl<R> ExceptionReporter for Arc<R>
where
    R: ExceptionReporter + ?Sized,
{
    fn report(&self, error: &JobError) {
        (**self).report(error)
    }
}

/// Reporter that writes every failure to the `tracing` pipeline.
#[derive(Debug, Default, Copy, Clone)]
pub struct TracingReporter;

impl ExceptionReporter for TracingReporter {
    fn report(&self, error: &JobError) {
        tracing::error!(error = %error, detail = ?error, "job error reported");
    }
}
