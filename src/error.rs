//! Error types for training-job launch operations

use thiserror::Error;

/// Result type alias for launcher operations
pub type Result<T> = std::result::Result<T, LaunchError>;

/// Comprehensive error types for training-job launch operations
#[derive(Error, Debug)]
pub enum LaunchError {
    /// Input/output errors (file not found, permission denied, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Embeddings artifact container parse errors
    #[error("Artifact format error: {0}")]
    Format(#[from] safetensors::SafeTensorError),

    /// Embeddings artifact content errors (missing keys, bad shapes)
    #[error("Artifact error: {0}")]
    Artifact(String),

    /// Invalid configuration or parameters
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Trainer spawn or execution errors
    #[error("Launch error: {0}")]
    Launch(String),

    /// Checkpoint archive errors
    #[error("Archive error: {0}")]
    Archive(String),

    /// Generic error for unexpected conditions
    #[error("Internal error: {0}")]
    Internal(String),
}

impl LaunchError {
    /// Create a new invalid configuration error
    pub fn invalid_config<S: Into<String>>(msg: S) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Create a new artifact content error
    pub fn artifact<S: Into<String>>(msg: S) -> Self {
        Self::Artifact(msg.into())
    }

    /// Create a new launch error
    pub fn launch<S: Into<String>>(msg: S) -> Self {
        Self::Launch(msg.into())
    }

    /// Create a new archive error
    pub fn archive<S: Into<String>>(msg: S) -> Self {
        Self::Archive(msg.into())
    }

    /// Create a new internal error
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::Internal(msg.into())
    }

    // Enhanced contextual error creators

    /// Create file I/O error with operation context
    pub fn file_io_error<P: AsRef<std::path::Path>>(
        operation: &str,
        path: P,
        error: &std::io::Error,
    ) -> Self {
        let path_display = path.as_ref().display();
        Self::Io(std::io::Error::new(
            error.kind(),
            format!("Failed to {} '{}': {}", operation, path_display, error),
        ))
    }

    /// Create configuration error with valid ranges
    pub fn config_value_error<T: std::fmt::Display>(
        parameter: &str,
        value: T,
        valid_range: &str,
        recommended: Option<T>,
    ) -> Self {
        let recommendation = match recommended {
            Some(rec) => format!(" Recommended: {}", rec),
            None => String::new(),
        };

        Self::InvalidConfig(format!(
            "Invalid {}: {} (valid range: {}).{}",
            parameter, value, valid_range, recommendation
        ))
    }

    /// Create artifact error with tensor context
    pub fn artifact_shape_error(tensor: &str, expected: &str, actual: &[usize]) -> Self {
        Self::Artifact(format!(
            "Tensor '{}' has shape {:?}, expected {}",
            tensor, actual, expected
        ))
    }

    /// Create launch error with trainer context and troubleshooting hints
    pub fn launch_error_with_context<P: AsRef<std::path::Path>>(
        operation: &str,
        trainer: P,
        error: &str,
        suggestions: &[&str],
    ) -> Self {
        let trainer_display = trainer.as_ref().display();
        let suggestion_text = if suggestions.is_empty() {
            String::new()
        } else {
            format!(" Suggestions: {}", suggestions.join(", "))
        };

        Self::Launch(format!(
            "Failed to {} trainer '{}': {}.{}",
            operation, trainer_display, error, suggestion_text
        ))
    }
}
