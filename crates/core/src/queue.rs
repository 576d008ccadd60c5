//! Queue contracts.

use std::sync::Arc;

use crate::error::QueueError;
use crate::job::Job;

/// A queue connection that hands out jobs.
pub trait Queue: Send + Sync {
    /// Name of the connection this queue was resolved from.
    fn connection_name(&self) -> &str;

    /// Pop the next available job from `queue`, if any.
    ///
    /// May block for as long as the backend's own timeout allows.
    fn pop(&self, queue: &str) -> Result<Option<Box<dyn Job>>, QueueError>;
}

/// Resolves queues by connection name.
pub trait QueueManager: Send + Sync {
    fn connection(&self, name: &str) -> Result<Arc<dyn Queue>, QueueError>;
}

impl<Q> QueueManager for Arc<Q>
where
    Q: QueueManager + ?Sized,
{
    fn connection(&self, name: &str) -> Result<Arc<dyn Queue>, QueueError> {
        (**self).connection(name)
    }
}
