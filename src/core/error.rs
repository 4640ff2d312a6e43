//! Error types for the brickmap renderer

use thiserror::Error;

/// Main error type for the renderer
#[derive(Debug, Error)]
pub enum Error {
    #[error("GPU error: {0}")]
    Gpu(String),

    #[error("Window error: {0}")]
    Window(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Voxel error: {0}")]
    Voxel(String),

    #[error("Streaming error: {0}")]
    Streaming(String),

    /// A timeline wait that can never be satisfied
    #[error("Sync error: {0}")]
    Sync(String),

    #[error("Shader error: {0}")]
    Shader(String),
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::Sync("halt timeline never reaches 3".into());
        assert_eq!(err.to_string(), "Sync error: halt timeline never reaches 3");
    }

    #[test]
    fn test_json_error_is_config() {
        let json_err = serde_json::from_str::<u32>("not json").unwrap_err();
        assert!(matches!(Error::from(json_err), Error::Config(_)));
    }
}
