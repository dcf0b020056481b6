use crate::types::MediaItem;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Classification of an item in a changeset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangesetKind {
    /// Present on the source, not in the library
    Added,
    /// Present on both sides with differing fields
    Changed,
    /// Present in the library, gone from the source
    Removed,
    /// Present on both sides, nothing to do
    None,
}

impl ChangesetKind {
    /// Convert to string
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Added => "added",
            Self::Changed => "changed",
            Self::Removed => "removed",
            Self::None => "none",
        }
    }
}

impl fmt::Display for ChangesetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One classified item of a changeset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangesetItem {
    /// What has to happen to the item
    pub kind: ChangesetKind,
    /// The retrieved item (or the local one for `Removed`)
    pub item: MediaItem,
}

impl ChangesetItem {
    /// Create a changeset entry
    pub fn new(kind: ChangesetKind, item: MediaItem) -> Self {
        Self { kind, item }
    }
}
