/// Error types for the catalog
///
/// Asset errors never abort a catalog mutation: the pipeline logs them and
/// carries on. Store errors are returned to the caller. Validation errors are
/// collected per record during an import.
use std::fmt;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Failures raised by the copy and thumbnail stores
#[derive(Debug, Error)]
pub enum AssetError {
    /// The referenced file does not exist
    #[error("source not found: {}", .0.display())]
    MissingSource(PathBuf),

    /// The file exists but is not a readable image
    #[error("could not decode image {}: {source}", .path.display())]
    ImageDecodeFailure {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    /// The thumbnail could not be re-encoded as JPEG
    #[error("could not encode thumbnail for {}: {source}", .path.display())]
    ImageEncodeFailure {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    /// Permission problems, locked files, full disks...
    #[error("filesystem denied access to {}: {source}", .path.display())]
    FilesystemDenied {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl AssetError {
    pub(crate) fn denied(path: impl Into<PathBuf>, source: io::Error) -> Self {
        AssetError::FilesystemDenied {
            path: path.into(),
            source,
        }
    }

    /// Short reason used in reports and the operation log
    pub fn reason(&self) -> String {
        match self {
            AssetError::MissingSource(_) => "missing".to_string(),
            AssetError::ImageDecodeFailure { source, .. } => format!("decode: {}", source),
            AssetError::ImageEncodeFailure { source, .. } => format!("encode: {}", source),
            AssetError::FilesystemDenied { source, .. } => format!("denied: {}", source),
        }
    }
}

/// Failures of the JSON record store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("catalog I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("catalog document is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("an entry titled '{0}' already exists")]
    DuplicateTitle(String),

    #[error("no entry titled '{0}'")]
    NotFound(String),

    #[error("title is required")]
    EmptyTitle,

    #[error("import data must be a list of entries")]
    NotAList,
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        StoreError::Io {
            path: path.into(),
            source,
        }
    }
}

/// What was wrong with one imported record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationKind {
    NotAnObject,
    MissingKeys(Vec<String>),
    InvalidTitle,
    InvalidDescription,
    InvalidPosterPath,
    InvalidScreenshots,
    InvalidTags,
    /// An earlier record in the same import already used this title
    DuplicateTitle,
}

/// A rejected import record, rendered as `Item <index>: <problem>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub index: usize,
    pub kind: ValidationKind,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Item {}: ", self.index)?;
        match &self.kind {
            ValidationKind::NotAnObject => write!(f, "not an object"),
            ValidationKind::MissingKeys(keys) => write!(f, "missing keys {}", keys.join(", ")),
            ValidationKind::InvalidTitle => write!(f, "invalid title"),
            ValidationKind::InvalidDescription => write!(f, "invalid description"),
            ValidationKind::InvalidPosterPath => write!(f, "invalid poster_path"),
            ValidationKind::InvalidScreenshots => {
                write!(f, "invalid screenshots_paths (must be list of strings)")
            }
            ValidationKind::InvalidTags => write!(f, "invalid tags (must be list of strings)"),
            ValidationKind::DuplicateTitle => write!(f, "duplicate title"),
        }
    }
}

impl std::error::Error for ValidationError {}
