//! Error types for the benchmark runner and the model adapter.

use std::path::PathBuf;

use thiserror::Error;

/// Error type for vlmeval.
///
/// All fallible public functions in this crate return [`Result<T>`](type@Result).
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// The requested model has no entry in the model configuration file.
    #[error("model `{0}` is not present in the model configs")]
    UnknownModel(String),

    /// A message item had a type other than `text`, `image` or `video`.
    #[error("invalid message type: {kind}, value: {value}")]
    InvalidContentType { kind: String, value: String },

    /// An image value is neither a supported URL nor an existing path.
    #[error("invalid image: {0}")]
    InvalidImage(String),

    /// A video value is neither a supported URL nor an existing path.
    #[error("invalid video: {0}")]
    InvalidVideo(String),

    /// An annotation file did not have the expected shape.
    #[error("malformed annotation {path}: {reason}")]
    Annotation { path: PathBuf, reason: String },

    /// File system error, with the offending path.
    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    /// The model server answered, but not with a usable completion.
    #[error("backend error: {0}")]
    Backend(String),

    /// A rank of the process group failed or went away.
    #[error("process group error: {0}")]
    ProcessGroup(String),
}

/// Convenience type alias for `std::result::Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether this error was raised while validating a message, before any generation.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::InvalidContentType { .. } | Self::InvalidImage(_) | Self::InvalidVideo(_)
        )
    }
}
