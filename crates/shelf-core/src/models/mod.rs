//! Data models for Shelf

mod article;
mod outbox;
mod tag;

pub use article::Article;
pub use outbox::{OutboxEntry, OutboxOperation, PendingOperation};
pub use tag::{Tag, TagId};
