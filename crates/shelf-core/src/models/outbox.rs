//! Outbox models
//!
//! An outbox entry is a local mutation not yet confirmed by the remote
//! item service. Entries replay strictly in sequence order per owner so a
//! Put followed by a Delete for the same id is never reordered.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::models::Article;

/// The kind of mutation recorded in an outbox entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutboxOperation {
    Put,
    Delete,
}

impl OutboxOperation {
    /// Stable storage representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Put => "put",
            Self::Delete => "delete",
        }
    }
}

impl FromStr for OutboxOperation {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "put" => Ok(Self::Put),
            "delete" => Ok(Self::Delete),
            other => Err(Error::InvalidInput(format!(
                "Unknown outbox operation: {other}"
            ))),
        }
    }
}

/// A mutation to append to the outbox.
#[derive(Debug, Clone, PartialEq)]
pub enum PendingOperation {
    /// Upsert the full record snapshot.
    Put(Article),
    /// Delete the record by id.
    Delete {
        owner_id: String,
        article_id: String,
    },
}

impl PendingOperation {
    /// A put carrying a full record snapshot.
    #[must_use]
    pub const fn put(article: Article) -> Self {
        Self::Put(article)
    }

    /// A delete for the given owner-scoped id.
    #[must_use]
    pub fn delete(owner_id: impl Into<String>, article_id: impl Into<String>) -> Self {
        Self::Delete {
            owner_id: owner_id.into(),
            article_id: article_id.into(),
        }
    }
}

/// A durable outbox row awaiting acknowledgment.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboxEntry {
    /// Monotonic sequence assigned at append time; defines replay order
    pub sequence: i64,
    /// Owner the mutation is scoped to
    pub owner_id: String,
    /// Id of the article the mutation targets
    pub article_id: String,
    /// Mutation kind
    pub operation: OutboxOperation,
    /// Full record snapshot for puts; `None` for deletes
    pub payload: Option<Article>,
    /// Number of failed replay attempts so far
    pub attempts: u32,
    /// Message from the most recent failure
    pub last_error: Option<String>,
    /// Append timestamp (Unix ms)
    pub created_at: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_round_trips_through_storage_form() {
        for op in [OutboxOperation::Put, OutboxOperation::Delete] {
            let parsed: OutboxOperation = op.as_str().parse().unwrap();
            assert_eq!(parsed, op);
        }
    }

    #[test]
    fn test_operation_rejects_unknown_values() {
        assert!("merge".parse::<OutboxOperation>().is_err());
    }

    #[test]
    fn test_pending_delete_captures_scope() {
        let op = PendingOperation::delete("owner-1", "a1");
        let PendingOperation::Delete {
            owner_id,
            article_id,
        } = op
        else {
            panic!("expected delete");
        };
        assert_eq!(owner_id, "owner-1");
        assert_eq!(article_id, "a1");
    }
}
