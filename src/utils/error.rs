//! Error handling for the AlphaStrat client.

use thiserror::Error;

/// Fallback text when neither the server nor the transport says anything useful.
pub const UNKNOWN_ERROR: &str = "Unknown error";

/// Main error type for the client
#[derive(Debug, Error)]
pub enum Error {
    /// Input rejected before any request was sent
    #[error("Validation error: {0}")]
    Validation(String),

    /// Timeout, refused connection or any other transport-level failure
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Non-2xx response from a remote service
    #[error("Remote error (HTTP {status}): {}", .detail.as_deref().unwrap_or(UNKNOWN_ERROR))]
    Remote {
        status: u16,
        /// `detail` field of the JSON error body, when the server sent one
        detail: Option<String>,
    },

    /// Remote rejected a create because the resource already exists (HTTP 409)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Job reached the remote-reported `error` state
    #[error("Job failed: {0}")]
    JobFailed(String),

    /// Submission response carried no job id; holds the raw response body
    #[error("No job id in response: {0}")]
    MissingJobId(String),

    /// Unparseable strategy document
    #[error("Import error: {0}")]
    Import(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML parse errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// TOML parse errors
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// TOML serialization errors
    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

impl Error {
    /// Text shown to the user for this failure.
    ///
    /// Prefers the server-supplied detail, then the transport's own message,
    /// then [`UNKNOWN_ERROR`].
    pub fn display_message(&self) -> String {
        match self {
            | Error::Remote { detail: Some(d), .. } if !d.trim().is_empty() => d.clone(),
            | Error::Remote { status, .. } => format!("Request failed with status {status}"),
            | Error::Transport(e) => {
                let msg = e.to_string();
                if msg.is_empty() {
                    UNKNOWN_ERROR.to_string()
                } else {
                    msg
                }
            }
            | Error::Validation(m)
            | Error::Conflict(m)
            | Error::JobFailed(m)
            | Error::Import(m)
            | Error::Config(m) => {
                if m.is_empty() {
                    UNKNOWN_ERROR.to_string()
                } else {
                    m.clone()
                }
            }
            | other => other.to_string(),
        }
    }

    /// True for failures a poll loop should swallow and retry on the next tick.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Transport(_) | Error::Remote { .. } | Error::Json(_))
    }
}

/// Result type for the client
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let config_error = Error::Config("missing field".to_string());
        assert_eq!(config_error.to_string(), "Configuration error: missing field");

        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let wrapped_io_error = Error::from(io_error);
        assert!(wrapped_io_error.to_string().contains("I/O error"));
    }

    #[test]
    fn display_message_prefers_server_detail() {
        let err = Error::Remote { status: 400, detail: Some("bad strategy".into()) };
        assert_eq!(err.display_message(), "bad strategy");

        let err = Error::Remote { status: 502, detail: None };
        assert_eq!(err.display_message(), "Request failed with status 502");

        let err = Error::Remote { status: 500, detail: Some("  ".into()) };
        assert_eq!(err.display_message(), "Request failed with status 500");
    }

    #[test]
    fn display_message_falls_back_to_unknown() {
        assert_eq!(Error::Validation(String::new()).display_message(), UNKNOWN_ERROR);
        assert_eq!(Error::Conflict("dup".into()).display_message(), "dup");
    }

    #[test]
    fn remote_and_json_failures_are_transient() {
        assert!(Error::Remote { status: 503, detail: None }.is_transient());
        assert!(!Error::Validation("x".into()).is_transient());
        assert!(!Error::JobFailed("x".into()).is_transient());
    }
}
