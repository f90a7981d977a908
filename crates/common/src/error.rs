//! Error types shared across SyncPlot crates.

use std::path::PathBuf;

/// Top-level error type for SyncPlot operations.
#[derive(Debug, thiserror::Error)]
pub enum SyncplotError {
    /// Invalid configuration, unknown columns, or misuse of a renderer's lifecycle.
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Malformed or insufficient data.
    #[error("Data error: {message}")]
    Data { message: String },

    /// Synchronization of a single stream failed.
    #[error("Synchronization of stream '{stream}' failed: {source}")]
    Synchronization {
        stream: String,
        #[source]
        source: Box<SyncplotError>,
    },

    #[error("Unsupported operation: {message}")]
    Unsupported { message: String },

    /// A video, sensor file, or output target could not be opened, read, or written.
    #[error("Resource error at {path}: {message}")]
    Resource { path: PathBuf, message: String },

    #[error("Render error: {message}")]
    Render { message: String },

    #[error("File not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias using SyncplotError.
pub type SyncplotResult<T> = Result<T, SyncplotError>;

impl SyncplotError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    pub fn data(msg: impl Into<String>) -> Self {
        Self::Data {
            message: msg.into(),
        }
    }

    pub fn synchronization(stream: impl Into<String>, source: SyncplotError) -> Self {
        Self::Synchronization {
            stream: stream.into(),
            source: Box::new(source),
        }
    }

    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::Unsupported {
            message: msg.into(),
        }
    }

    pub fn resource(path: impl Into<PathBuf>, msg: impl Into<String>) -> Self {
        Self::Resource {
            path: path.into(),
            message: msg.into(),
        }
    }

    pub fn render(msg: impl Into<String>) -> Self {
        Self::Render {
            message: msg.into(),
        }
    }

    /// Name of the stream whose synchronization failed, if any.
    pub fn failed_stream(&self) -> Option<&str> {
        match self {
            Self::Synchronization { stream, .. } => Some(stream),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_synchronization_error_names_stream() {
        let err = SyncplotError::synchronization("wrist", SyncplotError::data("too short"));
        assert_eq!(err.failed_stream(), Some("wrist"));
        let text = err.to_string();
        assert!(text.contains("wrist"));
        assert!(text.contains("too short"));
    }

    #[test]
    fn test_resource_error_display() {
        let err = SyncplotError::resource("/tmp/missing.mp4", "cannot open");
        assert_eq!(
            err.to_string(),
            "Resource error at /tmp/missing.mp4: cannot open"
        );
        assert!(err.failed_stream().is_none());
    }
}
