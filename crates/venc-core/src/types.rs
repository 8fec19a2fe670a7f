use serde::{Deserialize, Serialize};

/// Which engine entry point produced an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Encrypt,
    Decrypt,
}

/// Progress stage: chunk processing, then assembly of the output buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Processing,
    Merging,
}

/// A single progress report emitted by the chunk engine.
///
/// `percent` is in `0.0..=100.0`, rounded to two decimals, and never decreases
/// within one stage of one operation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub operation: Operation,
    pub stage: Stage,
    pub percent: f64,
}

impl ProgressEvent {
    pub fn new(operation: Operation, stage: Stage, percent: f64) -> Self {
        Self {
            operation,
            stage,
            percent: round2(percent.clamp(0.0, 100.0)),
        }
    }
}

/// Round to two decimal places
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
