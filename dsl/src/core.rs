//! Common items useful for working with Oberon-0 language elements but
//! not part of the language itself.
use core::fmt;
use std::path::Path;
use std::sync::Arc;

/// FileId identifies the origin of source code.
///
/// FileId is normally useful in the context of source positions
/// where a source position is in a file.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct FileId(Arc<str>);

impl FileId {
    /// Creates an empty file identifier.
    pub fn new() -> Self {
        FileId::default()
    }

    /// Creates a file identifier from the path.
    pub fn from_path(path: &Path) -> Self {
        FileId(Arc::from(path.to_string_lossy().as_ref()))
    }

    /// Creates a file identifier from the slice. The slice
    /// is normally the file path.
    pub fn from_string(path: &str) -> Self {
        FileId(Arc::from(path))
    }
}

impl Default for FileId {
    fn default() -> Self {
        FileId(Arc::from(""))
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Location in a file of a language element instance.
///
/// The location is defined by byte indices in the source file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceSpan {
    /// The position of the starting character (0-indexed).
    pub start: usize,
    /// The position one past the ending character (0-indexed).
    pub end: usize,
    pub file_id: FileId,
}

impl SourceSpan {
    pub fn range(start: usize, end: usize) -> Self {
        Self {
            start,
            end,
            file_id: FileId::default(),
        }
    }

    pub fn with_file_id(mut self, file_id: &FileId) -> Self {
        self.file_id = file_id.clone();
        self
    }

    /// Returns true for the default span, that is, a span that does not
    /// refer to any real position.
    pub fn is_default(&self) -> bool {
        self.start == 0 && self.end == 0 && self.file_id == FileId::default()
    }
}
