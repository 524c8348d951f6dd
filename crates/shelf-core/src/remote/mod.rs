//! Remote item service gateway.
//!
//! Wraps the authenticated HTTP item service behind a trait so the sync
//! coordinator can be driven against an in-memory double in tests. The
//! gateway knows nothing about local storage; every call is scoped to an
//! owner via a caller-supplied bearer token.

mod http;

pub use http::HttpItemGateway;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::Article;

/// Failures surfaced by remote item service calls
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Invalid gateway configuration
    #[error("Invalid gateway configuration: {0}")]
    InvalidConfiguration(String),

    /// Bearer token invalid or expired; never retried without a fresh token
    #[error("Bearer token rejected by the item service")]
    Unauthorized,

    /// The token does not own the targeted record; not retried
    #[error("Owner mismatch: {0}")]
    Forbidden(String),

    /// Malformed payload or response body; not retried
    #[error("Item service rejected the payload: {0}")]
    InvalidPayload(String),

    /// The remote record changed since the last known revision
    #[error("Remote record changed since the last known revision")]
    Conflict,

    /// Network failure, timeout, or 5xx; retried on the next cycle
    #[error("Item service unavailable: {0}")]
    Unavailable(String),
}

impl GatewayError {
    /// Whether a later cycle may succeed without caller intervention.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

pub type GatewayResult<T> = Result<T, GatewayError>;

/// Authenticated client for the remote item service.
#[async_trait]
pub trait RemoteGateway: Send + Sync {
    /// Fetch the full article set for an owner.
    async fn fetch_all(&self, owner_id: &str, token: &str) -> GatewayResult<Vec<Article>>;

    /// Fetch articles changed since the given timestamp.
    ///
    /// Optional optimization; the default implementation falls back to a
    /// full fetch.
    async fn fetch_since(
        &self,
        owner_id: &str,
        token: &str,
        since: i64,
    ) -> GatewayResult<Vec<Article>> {
        let _ = since;
        self.fetch_all(owner_id, token).await
    }

    /// Fetch a single article; absent records are `None`, not an error.
    async fn fetch_one(&self, id: &str, token: &str) -> GatewayResult<Option<Article>>;

    /// Upsert an article; returns the echoed record including the
    /// server-assigned revision.
    async fn put(&self, article: &Article, token: &str) -> GatewayResult<Article>;

    /// Delete an article by id (idempotent on the service side).
    async fn delete(&self, id: &str, token: &str) -> GatewayResult<()>;
}
