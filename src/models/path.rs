//! Hierarchical document store paths.
//!
//! Paths alternate between collections and documents, separated by `/`:
//!
//! | Path | Kind | Segments |
//! |------|------|----------|
//! | `registry-1` | Collection (root) | 1 |
//! | `registry-1/device-7` | Document | 2 |
//! | `registry-1/device-7/iot-events` | Collection | 3 |
//! | `registry-1/device-7/iot-events/telemetry/events/1700000000` | Document | 6 |
//!
//! Both types are validated on construction, so a value of either type always
//! names a well-formed location.

use std::{borrow::Borrow, fmt, str::FromStr};

use serde::{Serialize, Serializer};

/// Maximum size of a single path segment, in bytes.
pub const MAX_SEGMENT_BYTES: usize = 1500;

/// Error type for path parsing and construction.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PathError {
    #[error("path is empty")]
    Empty,

    #[error("invalid path segment '{segment}': {reason}")]
    InvalidSegment {
        segment: String,
        reason: &'static str,
    },

    #[error("'{path}' is not a {expected} path")]
    WrongKind {
        path: String,
        expected: &'static str,
    },
}

/// Check a single path segment.
///
/// Segments must be non-empty, must not contain `/`, must not be `.` or `..`,
/// must not use the reserved `__name__` form and must fit in
/// [`MAX_SEGMENT_BYTES`].
pub fn validate_segment(segment: &str) -> Result<(), PathError> {
    let reason = if segment.is_empty() {
        Some("segment is empty")
    } else if segment.contains('/') {
        Some("segment contains '/'")
    } else if segment == "." || segment == ".." {
        Some("segment is a relative reference")
    } else if segment.len() >= 4 && segment.starts_with("__") && segment.ends_with("__") {
        Some("segment uses the reserved __name__ form")
    } else if segment.len() > MAX_SEGMENT_BYTES {
        Some("segment exceeds 1500 bytes")
    } else {
        None
    };

    match reason {
        Some(reason) => Err(PathError::InvalidSegment {
            segment: segment.to_string(),
            reason,
        }),
        None => Ok(()),
    }
}

fn parse_segments(path: &str) -> Result<usize, PathError> {
    if path.is_empty() {
        return Err(PathError::Empty);
    }
    let mut count = 0;
    for segment in path.split('/') {
        validate_segment(segment)?;
        count += 1;
    }
    Ok(count)
}

/// Path to a collection. Has an odd number of segments.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CollectionPath(String);

impl CollectionPath {
    /// A top-level collection.
    pub fn root(id: &str) -> Result<Self, PathError> {
        validate_segment(id)?;
        Ok(Self(id.to_string()))
    }

    pub fn parse(path: &str) -> Result<Self, PathError> {
        if parse_segments(path)? % 2 == 0 {
            return Err(PathError::WrongKind {
                path: path.to_string(),
                expected: "collection",
            });
        }
        Ok(Self(path.to_string()))
    }

    /// Reference a document directly inside this collection.
    pub fn doc(&self, id: &str) -> Result<DocumentPath, PathError> {
        validate_segment(id)?;
        Ok(DocumentPath(format!("{}/{}", self.0, id)))
    }

    /// The last segment.
    pub fn id(&self) -> &str {
        last_segment(&self.0)
    }

    /// The document this collection is nested under, `None` for a root collection.
    pub fn parent(&self) -> Option<DocumentPath> {
        self.0
            .rsplit_once('/')
            .map(|(parent, _)| DocumentPath(parent.to_string()))
    }

    pub fn is_root(&self) -> bool {
        !self.0.contains('/')
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Path to a document. Has an even number of segments.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocumentPath(String);

impl DocumentPath {
    pub fn parse(path: &str) -> Result<Self, PathError> {
        if parse_segments(path)? % 2 == 1 {
            return Err(PathError::WrongKind {
                path: path.to_string(),
                expected: "document",
            });
        }
        Ok(Self(path.to_string()))
    }

    /// Reference a sub-collection of this document.
    pub fn collection(&self, id: &str) -> Result<CollectionPath, PathError> {
        validate_segment(id)?;
        Ok(CollectionPath(format!("{}/{}", self.0, id)))
    }

    /// The document id (last segment).
    pub fn id(&self) -> &str {
        last_segment(&self.0)
    }

    /// The collection holding this document.
    pub fn parent(&self) -> CollectionPath {
        match self.0.rsplit_once('/') {
            Some((parent, _)) => CollectionPath(parent.to_string()),
            // Unreachable: a document path always has at least two segments.
            None => CollectionPath(self.0.clone()),
        }
    }

    /// The root collection this document lives under.
    pub fn root(&self) -> CollectionPath {
        let first = self.0.split_once('/').map_or(self.0.as_str(), |(first, _)| first);
        CollectionPath(first.to_string())
    }

    /// Every ancestor document, nearest first.
    ///
    /// `a/b/c/d/e/f` yields `a/b/c/d` then `a/b`.
    pub fn ancestors(&self) -> impl Iterator<Item = DocumentPath> + '_ {
        std::iter::successors(self.parent().parent(), |doc| doc.parent().parent())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn last_segment(path: &str) -> &str {
    path.rsplit_once('/').map_or(path, |(_, last)| last)
}

impl fmt::Display for CollectionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for DocumentPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// `Ord` and `Hash` match the inner string.
impl Borrow<str> for DocumentPath {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl FromStr for CollectionPath {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl FromStr for DocumentPath {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for CollectionPath {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl Serialize for DocumentPath {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}
