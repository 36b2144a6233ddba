//! Core engine for the bookview cloud page viewer.
//!
//! The interesting machinery lives in [`cache`], [`fetch`], [`pipeline`],
//! [`loader`], and [`monitor`]: a bounded LRU of decoded pages, a
//! deduplicating throttled fetch coordinator, an adaptive look-ahead
//! planner, the navigation orchestrator tying them together, and the
//! memory/network pressure responder. Everything else is supporting cast.

#![deny(missing_debug_implementations)]

pub mod book;
pub mod cache;
pub mod codec;
pub mod config;
pub mod fetch;
pub mod loader;
pub mod log;
pub mod monitor;
pub mod pipeline;
pub mod stats;
pub mod store;
pub mod types;

pub type Result<T> = std::result::Result<T, anyhow::Error>;

pub use config::ViewerConfig;
pub use fetch::FetchError;
pub use loader::PageLoader;
pub use monitor::{NetworkQuality, PressureMonitor};
pub use types::{Book, BookId, PageImage, PageKey};

/// Returns the version of the core crate for telemetry and debugging.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exposes_semver_version() {
        assert!(version().contains('.'));
    }

    #[test]
    fn constructs_basic_types() {
        let book = Book::new(
            BookId::new("b1"),
            "Demo",
            vec![(PageKey::new("f-2"), "002.webp".to_string()), (
                PageKey::new("f-1"),
                "001.webp".to_string(),
            )],
        );

        assert_eq!(book.total_pages(), 2);
        assert_eq!(book.page(1).unwrap().name, "001.webp");
        assert_eq!(book.page(2).unwrap().sequence_index, 2);
    }
}
