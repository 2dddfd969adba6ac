use thiserror::Error;

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Unknown model: {0}")]
    UnknownModel(String),

    #[error("Invalid parameter: {0}")]
    InvalidParam(String),

    #[error("Invalid name: {0}")]
    InvalidName(String),

    #[error("Index out of range: {index} >= {len}")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("Singular matrix: {0}")]
    SingularMatrix(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Errors raised by a misconfigured request or setup rather than by data.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            AppError::Configuration(_) | AppError::UnknownModel(_) | AppError::InvalidParam(_)
        )
    }
}

// Implement conversions from other error types
impl From<bincode::Error> for AppError {
    fn from(err: bincode::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Storage(err.to_string())
    }
}

impl From<rayon::ThreadPoolBuildError> for AppError {
    fn from(err: rayon::ThreadPoolBuildError) -> Self {
        AppError::Internal(format!("failed to build worker pool: {}", err))
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = AppError::IndexOutOfRange { index: 7, len: 4 };
        assert_eq!(err.to_string(), "Index out of range: 7 >= 4");

        let err = AppError::Configuration("unknown fallback".to_string());
        assert_eq!(err.to_string(), "Configuration error: unknown fallback");
    }

    #[test]
    fn test_is_configuration() {
        assert!(AppError::UnknownModel("svd".into()).is_configuration());
        assert!(AppError::Configuration("x".into()).is_configuration());
        assert!(!AppError::Storage("io".into()).is_configuration());
    }
}
