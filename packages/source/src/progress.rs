//! Progress reporting for batch enrichment.
//!
//! [`ProgressCallback`] keeps the batch controller independent of how
//! progress is shown. The CLI renders it with `indicatif`; tests and
//! library callers pass [`NullProgress`].

use std::sync::Arc;

/// Receives progress updates from a long-running batch.
///
/// Implementations must be `Send + Sync` so one instance can be shared
/// through an `Arc` with the controller.
pub trait ProgressCallback: Send + Sync {
    /// Sets the number of subjects the batch will look at.
    fn set_total(&self, total: u64);

    /// Advances by `delta` subjects.
    fn inc(&self, delta: u64);

    /// Replaces the status message (usually the current subject).
    fn set_message(&self, msg: String);

    /// Marks the batch as finished with a summary message.
    fn finish(&self, msg: String);
}

/// Ignores every update.
pub struct NullProgress;

impl ProgressCallback for NullProgress {
    fn set_total(&self, _total: u64) {}
    fn inc(&self, _delta: u64) {}
    fn set_message(&self, _msg: String) {}
    fn finish(&self, _msg: String) {}
}

/// Returns a shared [`NullProgress`].
#[must_use]
pub fn null_progress() -> Arc<dyn ProgressCallback> {
    Arc::new(NullProgress)
}
