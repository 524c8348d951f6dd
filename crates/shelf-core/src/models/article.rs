//! Article model

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::util::unix_timestamp_ms;

/// A saved article in the system.
///
/// Field names at the wire boundary are camelCase and round-trip exactly;
/// attributes the sync engine does not own land in `extra` and are carried
/// through reconciliation untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Article {
    /// Stable identifier, caller-assigned on creation
    pub id: String,
    /// Last-known remote version marker; absent until the first
    /// acknowledged put
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision: Option<String>,
    /// Partition key; every query and remote call is scoped to it
    pub owner_id: String,
    /// Save timestamp (Unix ms); default ordering and reconciliation
    /// tiebreaker
    pub saved_at: i64,
    /// Article title
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Short excerpt for list views
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub excerpt: Option<String>,
    /// Read flag
    #[serde(default)]
    pub read: bool,
    /// Favorite flag
    #[serde(default)]
    pub favorite: bool,
    /// Reading progress in the range 0.0..=1.0
    #[serde(default)]
    pub progress: f64,
    /// Free-form tag names
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    /// Handle to the cached article content, owned by the content layer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_ref: Option<String>,
    /// Wire attributes owned by out-of-scope collaborators; preserved
    /// verbatim
    #[serde(flatten)]
    pub extra: Map<String, Value>,
    /// Local-only tombstone marker, never serialized to the wire
    #[serde(skip)]
    pub deleted: bool,
}

impl Article {
    /// Create a new article owned by `owner_id` with the given id.
    #[must_use]
    pub fn new(id: impl Into<String>, owner_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            revision: None,
            owner_id: owner_id.into(),
            saved_at: unix_timestamp_ms(),
            title: None,
            excerpt: None,
            read: false,
            favorite: false,
            progress: 0.0,
            tags: Vec::new(),
            content_ref: None,
            extra: Map::new(),
            deleted: false,
        }
    }

    /// Refresh `saved_at` after a local mutation so last-writer-wins
    /// comparisons favor this copy.
    pub fn touch(&mut self) {
        self.saved_at = unix_timestamp_ms();
    }
}
