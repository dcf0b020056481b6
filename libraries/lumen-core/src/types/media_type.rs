//! Media type tags
//!
//! A media type is an opaque string tag. Its relations to other media types
//! (dependencies, required types, grouped types) are declared by the handler
//! registered for it, not by the tag itself.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Well-known media type tags
pub mod media_types {
    /// Feature films
    pub const MOVIE: &str = "movie";
    /// TV shows (the show entity itself)
    pub const TVSHOW: &str = "tvshow";
    /// Seasons of a TV show
    pub const SEASON: &str = "season";
    /// Episodes of a season
    pub const EPISODE: &str = "episode";
    /// Music videos
    pub const MUSICVIDEO: &str = "musicvideo";
    /// Music artists
    pub const ARTIST: &str = "artist";
    /// Music albums
    pub const ALBUM: &str = "album";
    /// Songs
    pub const SONG: &str = "song";
}

/// Media type tag (e.g. "movie", "episode")
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MediaType(String);

impl MediaType {
    /// Create a media type tag
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    /// Get the tag as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MediaType {
    fn from(tag: &str) -> Self {
        Self::new(tag)
    }
}

impl From<String> for MediaType {
    fn from(tag: String) -> Self {
        Self(tag)
    }
}

impl PartialEq<str> for MediaType {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for MediaType {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}
