//! Error types for Schedcast

use thiserror::Error;

pub type Result<T> = std::result::Result<T, SchedcastError>;

#[derive(Error, Debug)]
pub enum SchedcastError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl SchedcastError {
    /// Returns the appropriate exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            SchedcastError::InvalidInput(_) => 3,
            SchedcastError::Network(NetworkError::AuthExpired(_)) => 2,
            SchedcastError::Network(_) => 1,
            SchedcastError::Config(_) => 1,
            SchedcastError::Database(_) => 1,
            SchedcastError::NotFound(_) => 1,
        }
    }

    /// Whether a failed operation may succeed on a later sweep.
    ///
    /// Transient errors leave the queue item in place for the next pass.
    /// `AuthExpired` is permanent until the user re-authorizes, and a
    /// `PartialThread` already left remote state behind, so neither is
    /// retried blindly.
    pub fn is_transient(&self) -> bool {
        match self {
            SchedcastError::Network(net) => match net {
                NetworkError::Publish(_) | NetworkError::Http(_) | NetworkError::RateLimit(_) => {
                    true
                }
                NetworkError::AuthExpired(_) | NetworkError::PartialThread { .. } => false,
            },
            _ => false,
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing required field: {0}")]
    MissingField(String),
}

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database operation failed: {0}")]
    SqlxError(#[from] sqlx::Error),

    #[error("Migration failed: {0}")]
    MigrationError(#[from] sqlx::migrate::MigrateError),

    #[error("Serialization failed: {0}")]
    SerdeError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Corrupt row: {0}")]
    Corrupt(String),
}

#[derive(Error, Debug)]
pub enum NetworkError {
    /// Refresh token rejected by the network. Fatal for the credential
    /// until the user re-authorizes; the sweeper skips the item.
    #[error("Authorization expired: {0}")]
    AuthExpired(String),

    /// The network rejected the publish call.
    #[error("Publish failed: {0}")]
    Publish(String),

    /// A multi-segment thread was only partially posted. The root and the
    /// already-posted count are reported so the orphaned remote state can
    /// be found.
    #[error("Thread partially posted ({posted}/{total}, root {root_id:?}): {message}")]
    PartialThread {
        root_id: Option<String>,
        posted: usize,
        total: usize,
        message: String,
    },

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Rate limit exceeded: {0}")]
    RateLimit(String),
}

impl From<reqwest::Error> for NetworkError {
    fn from(err: reqwest::Error) -> Self {
        NetworkError::Http(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_code_invalid_input() {
        let error = SchedcastError::InvalidInput("empty payload".to_string());
        assert_eq!(error.exit_code(), 3);
    }

    #[test]
    fn test_exit_code_auth_expired() {
        let error = SchedcastError::Network(NetworkError::AuthExpired(
            "refresh token revoked".to_string(),
        ));
        assert_eq!(error.exit_code(), 2);
    }

    #[test]
    fn test_exit_code_other_errors() {
        let publish = SchedcastError::Network(NetworkError::Publish("rejected".to_string()));
        assert_eq!(publish.exit_code(), 1);

        let not_found = SchedcastError::NotFound("event abc".to_string());
        assert_eq!(not_found.exit_code(), 1);

        let config = SchedcastError::Config(ConfigError::MissingField("database.path".to_string()));
        assert_eq!(config.exit_code(), 1);
    }

    #[test]
    fn test_transient_classification() {
        let publish = SchedcastError::Network(NetworkError::Publish("rate limited".to_string()));
        assert!(publish.is_transient());

        let http = SchedcastError::Network(NetworkError::Http("connection reset".to_string()));
        assert!(http.is_transient());

        let auth = SchedcastError::Network(NetworkError::AuthExpired("revoked".to_string()));
        assert!(!auth.is_transient());

        let partial = SchedcastError::Network(NetworkError::PartialThread {
            root_id: Some("123".to_string()),
            posted: 1,
            total: 3,
            message: "timeout".to_string(),
        });
        assert!(!partial.is_transient());

        let not_found = SchedcastError::NotFound("credential".to_string());
        assert!(!not_found.is_transient());
    }

    #[test]
    fn test_partial_thread_formatting() {
        let error = NetworkError::PartialThread {
            root_id: Some("1790000000".to_string()),
            posted: 2,
            total: 3,
            message: "segment 3 rejected".to_string(),
        };
        let message = format!("{}", error);
        assert!(message.contains("2/3"));
        assert!(message.contains("1790000000"));
        assert!(message.contains("segment 3 rejected"));
    }

    #[test]
    fn test_error_conversion_from_network_error() {
        let net = NetworkError::Publish("content rejected".to_string());
        let error: SchedcastError = net.into();

        match error {
            SchedcastError::Network(_) => {}
            _ => panic!("Expected SchedcastError::Network"),
        }
    }

    #[test]
    fn test_error_message_formatting() {
        let error = SchedcastError::Network(NetworkError::AuthExpired(
            "twitter refresh rejected".to_string(),
        ));
        assert_eq!(
            format!("{}", error),
            "Network error: Authorization expired: twitter refresh rejected"
        );
    }
}
