//! Database layer for Shelf

mod article_repository;
mod connection;
mod migrations;
mod outbox_repository;
mod tag_repository;

pub use article_repository::{ArticleStore, ReconcilePatch, SqliteArticleStore};
pub use connection::Database;
pub use outbox_repository::{OutboxStore, SqliteOutboxStore};
pub use tag_repository::{SqliteTagStore, TagStore};
