//! venc-core: shared error taxonomy, progress events, and configuration schema
//! for the VENC file encryption tool.

pub mod config;
pub mod error;
pub mod types;

pub use error::{ErrorKind, VencError, VencResult};
pub use types::{Operation, ProgressEvent, Stage};
