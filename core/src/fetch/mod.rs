//! Remote page acquisition: error taxonomy, collaborator seams, and the
//! deduplicating fetch coordinator.

pub mod coordinator;

pub use coordinator::FetchCoordinator;

use std::fmt;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

use crate::types::PageKey;

/// Failure modes of acquiring one page.
///
/// The enum is `Clone` so a shared in-flight future can fan the same
/// failure out to every attached waiter. `Decode` means bytes transferred
/// but did not validate as a displayable image; callers treat it exactly
/// like `Network`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("access credentials expired")]
    AuthExpired,
    #[error("network failure: {0}")]
    Network(String),
    #[error("deadline elapsed")]
    Timeout,
    #[error("request cancelled")]
    Cancelled,
    #[error("payload is not a displayable image: {0}")]
    Decode(String),
}

/// Storage-provider boundary: raw bytes addressed by page key.
#[async_trait]
pub trait PageSource: Send + Sync + fmt::Debug {
    async fn fetch_bytes(&self, page: &PageKey, token: &str) -> Result<Bytes, FetchError>;
}

/// Identity-provider boundary. Token lifecycle is opaque to the core; it
/// only reacts to [`FetchError::AuthExpired`].
#[async_trait]
pub trait Identity: Send + Sync + fmt::Debug {
    fn access_token(&self) -> Option<String>;

    /// Attempt a credential refresh, returning whether it succeeded.
    async fn refresh(&self) -> bool;
}
