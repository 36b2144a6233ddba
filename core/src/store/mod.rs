//! Reading-progress persistence boundary and its JSON-file default.

pub mod progress;

pub use progress::{JsonProgressStore, ProgressRecord, ProgressStore};

pub type Result<T> = crate::Result<T>;
