//! Error types for imagefeed-dl
//!
//! This module provides the error taxonomy for the library:
//! - Domain-specific error types (authentication, resolution, materialization)
//! - A per-file reconcile error that is recorded, never returned
//! - Machine-readable error codes and a serializable [`ErrorDetail`] for callers
//!   that render failures to a user

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for imagefeed-dl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for imagefeed-dl
///
/// Authentication, resolution and materialization failures are kept as
/// distinct variants so a caller can tell them apart without string matching.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "remote.page_size")
        key: Option<String>,
    },

    /// Login against the content source failed
    #[error("authentication error: {0}")]
    Authentication(#[from] AuthenticationError),

    /// The requested profile could not be resolved
    #[error("resolution error: {0}")]
    Resolution(#[from] ResolutionError),

    /// Writing a post's media to disk failed; the fetch was aborted
    #[error("materialization failed: {0}")]
    Materialization(#[from] MaterializationError),

    /// The download target is missing or is not a directory
    #[error("not a directory: {0}")]
    NotADirectory(PathBuf),

    /// The remote feed returned something the pagination could not use
    #[error("feed error: {0}")]
    Feed(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Network error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// Login failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthenticationError {
    /// Username or password rejected by the remote service
    #[error("invalid username or password")]
    InvalidCredentials,

    /// The account requires a second factor that this client cannot provide
    #[error("two-factor authentication is required")]
    TwoFactorRequired,

    /// Malformed login input (e.g., empty username)
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

/// Profile resolution failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolutionError {
    /// No profile with the given name exists
    #[error("profile '{name}' does not exist")]
    ProfileNotFound {
        /// The name that was looked up
        name: String,
    },

    /// The profile is private and not followed by the logged-in account
    #[error("profile '{name}' is private and requires following")]
    ProfileForbidden {
        /// The name that was looked up
        name: String,
    },

    /// The resolved username cannot be used as a single directory name
    #[error("profile name '{name}' is not a valid directory name")]
    UnsafeName {
        /// The username as reported by the source
        name: String,
    },
}

/// Failure to write one post's media into the download target
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("post {post}: {reason}")]
pub struct MaterializationError {
    /// Identity of the post that failed (shortcode or id)
    pub post: String,
    /// The reason materialization failed
    pub reason: String,
}

impl MaterializationError {
    /// Create a new materialization error for a post
    pub fn new(post: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            post: post.into(),
            reason: reason.into(),
        }
    }
}

/// A single file the reconciler could not delete
///
/// Recorded in the reconcile report; it never aborts the batch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("failed to remove {}: {message}", path.display())]
pub struct ReconciliationFileError {
    /// The file that could not be removed
    pub path: PathBuf,
    /// Kind of the underlying I/O failure
    pub kind: std::io::ErrorKind,
    /// The underlying error message
    pub message: String,
}

impl ReconciliationFileError {
    /// Build from the I/O error returned by a delete attempt
    pub fn from_io(path: PathBuf, error: &std::io::Error) -> Self {
        Self {
            path,
            kind: error.kind(),
            message: error.to_string(),
        }
    }
}

impl Error {
    /// Get the machine-readable error code
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::Config { .. } => "config_error",
            Error::Authentication(e) => match e {
                AuthenticationError::InvalidCredentials => "invalid_credentials",
                AuthenticationError::TwoFactorRequired => "two_factor_required",
                AuthenticationError::InvalidArgument(_) => "invalid_argument",
            },
            Error::Resolution(e) => match e {
                ResolutionError::ProfileNotFound { .. } => "profile_not_found",
                ResolutionError::ProfileForbidden { .. } => "profile_forbidden",
                ResolutionError::UnsafeName { .. } => "unsafe_profile_name",
            },
            Error::Materialization(_) => "materialization_failed",
            Error::NotADirectory(_) => "not_a_directory",
            Error::Feed(_) => "feed_error",
            Error::Io(_) => "io_error",
            Error::Network(_) => "network_error",
            Error::Serialization(_) => "serialization_error",
            Error::Other(_) => "internal_error",
        }
    }
}

/// Rendered error information for a presentation layer
///
/// # Example JSON
///
/// ```json
/// {
///   "code": "profile_forbidden",
///   "message": "resolution error: profile 'someone' is private and requires following",
///   "details": { "profile": "someone" }
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDetail {
    /// Machine-readable error code (e.g., "profile_not_found")
    pub code: String,

    /// Human-readable error message
    pub message: String,

    /// Optional additional context about the error
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl From<&Error> for ErrorDetail {
    fn from(error: &Error) -> Self {
        let details = match error {
            Error::Resolution(
                ResolutionError::ProfileNotFound { name }
                | ResolutionError::ProfileForbidden { name }
                | ResolutionError::UnsafeName { name },
            ) => Some(serde_json::json!({ "profile": name })),
            Error::Materialization(MaterializationError { post, .. }) => {
                Some(serde_json::json!({ "post": post }))
            }
            Error::NotADirectory(path) => Some(serde_json::json!({ "path": path })),
            Error::Config { key: Some(key), .. } => Some(serde_json::json!({ "key": key })),
            _ => None,
        };

        Self {
            code: error.error_code().to_string(),
            message: error.to_string(),
            details,
        }
    }
}

impl From<Error> for ErrorDetail {
    fn from(error: Error) -> Self {
        Self::from(&error)
    }
}
