//! Error types for CCS
//!
//! Provides the error taxonomy shared by the engine, the transport and the CLI.

use thiserror::Error;

/// Result type alias for CCS operations
pub type Result<T> = std::result::Result<T, CcsError>;

/// Unified error type for CCS
#[derive(Error, Debug)]
pub enum CcsError {
    // ===== Policy Errors =====
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error(transparent)]
    Allocation(#[from] AllocationError),

    // ===== Cluster Errors =====
    #[error(transparent)]
    Transport(#[from] ClusterError),

    // ===== Local Input Errors =====
    #[error("{0}")]
    Validation(String),

    // ===== I/O Errors =====
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // ===== Serialization Errors =====
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl CcsError {
    /// True for errors caused by an unusable policy rather than the cluster
    pub fn is_config(&self) -> bool {
        matches!(self, Self::Configuration(_) | Self::Allocation(_))
    }
}

/// Allocation could not be determined from the policy
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AllocationError {
    #[error("Profile '{0}' not found in config")]
    UnknownProfile(String),

    #[error("Primary node '{0}' not found in config")]
    UnknownPrimary(String),

    #[error("Primary node '{0}' has no peer_id in config")]
    PrimaryWithoutPeerId(String),

    #[error("No backup_node configured")]
    NoBackup,

    #[error("Backup node '{0}' not found in config")]
    UnknownBackup(String),

    #[error("Backup node '{0}' has no peer_id in config")]
    BackupWithoutPeerId(String),
}

/// Any failure talking to the pinning cluster or its gateway
#[derive(Error, Debug)]
pub enum ClusterError {
    #[error("Unauthorized: check basic auth credentials")]
    Unauthorized,

    #[error("{message}")]
    Api { status: u16, message: String },

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Malformed response: {0}")]
    Decode(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ClusterError {
    /// HTTP status code, when the cluster answered at all
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Unauthorized => Some(401),
            Self::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Build the error for a non-success HTTP answer
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        if status == 401 {
            Self::Unauthorized
        } else {
            Self::Api {
                status,
                message: message.into(),
            }
        }
    }
}

impl From<serde_json::Error> for ClusterError {
    fn from(err: serde_json::Error) -> Self {
        ClusterError::Decode(err.to_string())
    }
}

impl From<serde_json::Error> for CcsError {
    fn from(err: serde_json::Error) -> Self {
        CcsError::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for CcsError {
    fn from(err: serde_yaml::Error) -> Self {
        CcsError::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for CcsError {
    fn from(err: toml::de::Error) -> Self {
        CcsError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CcsError::from(AllocationError::UnknownProfile("nonexistent".to_string()));
        assert_eq!(err.to_string(), "Profile 'nonexistent' not found in config");
        assert!(err.is_config());
    }

    #[test]
    fn test_unauthorized_classification() {
        let err = ClusterError::from_status(401, "nope");
        assert!(matches!(err, ClusterError::Unauthorized));
        assert_eq!(err.status_code(), Some(401));

        let err = ClusterError::from_status(500, "Connection failed");
        assert_eq!(err.status_code(), Some(500));
        assert_eq!(err.to_string(), "Connection failed");
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: CcsError = io_err.into();
        assert!(matches!(err, CcsError::Io(_)));
        assert!(!err.is_config());
    }
}
