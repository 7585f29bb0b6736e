//! Crate-level error taxonomy.

/// infradraft domain errors.
#[derive(Debug, thiserror::Error)]
pub enum InfraError {
    #[error("unknown stage: {0}")]
    UnknownStage(String),

    #[error("project path does not exist: {0}")]
    ProjectNotFound(String),

    #[error("invalid artifact path: {0}")]
    InvalidArtifactPath(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("digest mismatch: expected {expected}, got {actual}")]
    DigestMismatch { expected: String, actual: String },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for infradraft domain operations.
pub type Result<T> = std::result::Result<T, InfraError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_stage_display() {
        let err = InfraError::UnknownStage("terraform".to_string());
        assert!(err.to_string().contains("unknown stage"));
        assert!(err.to_string().contains("terraform"));
    }

    #[test]
    fn test_digest_mismatch_error() {
        let err = InfraError::DigestMismatch {
            expected: "abc123".to_string(),
            actual: "def456".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("abc123"));
        assert!(msg.contains("def456"));
    }
}
