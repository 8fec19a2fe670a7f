//! Progress reporting over an explicit channel
//!
//! The chunk engine emits [`ProgressEvent`]s in two stages: `Processing`
//! while chunks are sealed or opened, then `Merging` while the output buffer
//! is assembled. A dropped receiver is ignored.

use tokio::sync::mpsc::UnboundedSender;
use venc_core::{Operation, ProgressEvent, Stage};

pub type ProgressSender = UnboundedSender<ProgressEvent>;

/// Minimum advance, in percentage points, between two processing events
pub const PROGRESS_STEP: f64 = 0.1;

pub(crate) struct ProgressTracker<'a> {
    sender: Option<&'a ProgressSender>,
    operation: Operation,
    last: f64,
}

impl<'a> ProgressTracker<'a> {
    pub(crate) fn new(sender: Option<&'a ProgressSender>, operation: Operation) -> Self {
        Self {
            sender,
            operation,
            last: 0.0,
        }
    }

    /// Report `done` of `total` units processed.
    pub(crate) fn update(&mut self, done: u64, total: u64) {
        let percent = if total == 0 {
            100.0
        } else {
            (done as f64 / total as f64 * 100.0).min(100.0)
        };
        if percent - self.last >= PROGRESS_STEP {
            self.emit(Stage::Processing, percent);
            self.last = percent;
        }
    }

    pub(crate) fn finish_processing(&mut self) {
        self.last = 100.0;
        self.emit(Stage::Processing, 100.0);
    }

    pub(crate) fn merging(&self, percent: f64) {
        self.emit(Stage::Merging, percent);
    }

    fn emit(&self, stage: Stage, percent: f64) {
        if let Some(tx) = self.sender {
            let _ = tx.send(ProgressEvent::new(self.operation, stage, percent));
        }
    }
}
