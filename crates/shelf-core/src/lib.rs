//! shelf-core - Core sync engine for Shelf
//!
//! Keeps the on-device article cache consistent with the remote item
//! service under intermittent connectivity: durable local storage, a
//! pending-operation outbox, the reconciliation cycle, and the session
//! surface consumed by the UI layers.

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod remote;
pub mod session;
pub mod sync;
mod util;

pub use error::{Error, Result};
pub use models::{Article, OutboxEntry, OutboxOperation, PendingOperation, Tag, TagId};
pub use session::{StaticTokenProvider, SyncSession, TokenProvider};
pub use sync::{OptimisticOverlay, SyncCoordinator, SyncStatus};
