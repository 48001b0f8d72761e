//! Domain error types

use thiserror::Error;

/// Errors that can occur in domain operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Invalid identifier format
    #[error("Invalid identifier: {0}")]
    InvalidId(String),

    /// Invalid remote path format or content
    #[error("Invalid remote path: {0}")]
    InvalidPath(String),

    /// Anchor token could not be parsed
    #[error("Invalid anchor token: {0}")]
    InvalidAnchor(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DomainError::InvalidPath("no-slash".to_string());
        assert_eq!(err.to_string(), "Invalid remote path: no-slash");

        let err = DomainError::InvalidAnchor("XYZ".to_string());
        assert_eq!(err.to_string(), "Invalid anchor token: XYZ");
    }
}
