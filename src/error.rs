//! Error types for profile-export
//!
//! This module provides the error taxonomy for the library:
//! - Domain-specific error types (session store, browser, artifact)
//! - Machine-readable error codes for run summaries and logs
//! - Context information (paths, locators, wait durations)
//!
//! Propagation follows one rule: authentication errors are fatal to a run,
//! everything raised while processing a single target is caught by the
//! pipeline and turned into a [`TargetOutcome`](crate::types::TargetOutcome).

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for profile-export operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for profile-export
#[derive(Debug, Error)]
pub enum Error {
    /// A required input (credential, path) is missing before any browser is opened
    #[error("precondition failed: {0}")]
    Precondition(String),

    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "selectors.export_label")
        key: Option<String>,
    },

    /// Session token store error
    #[error("session store error: {0}")]
    Session(#[from] SessionError),

    /// Browser driver or UI interaction error
    #[error("browser error: {0}")]
    Browser(#[from] BrowserError),

    /// Artifact detection or claim error
    #[error("artifact error: {0}")]
    Artifact(#[from] ArtifactError),

    /// Interactive login did not reach a post-login destination
    #[error("login failed: {0}")]
    LoginFailed(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Session token store errors
///
/// Every variant is recoverable: the authenticator falls back to an
/// interactive login whenever the store cannot produce a token set.
#[derive(Debug, Error)]
pub enum SessionError {
    /// No token set has been saved yet
    #[error("no session stored at {path}")]
    NotFound {
        /// Location of the expected token file
        path: PathBuf,
    },

    /// The stored token set could not be parsed
    #[error("corrupt session data at {path}: {reason}")]
    CorruptData {
        /// Location of the token file
        path: PathBuf,
        /// Parser message
        reason: String,
    },

    /// The token set could not be read or written
    #[error("cannot persist session at {path}: {reason}")]
    Persistence {
        /// Location of the token file
        path: PathBuf,
        /// Underlying I/O message
        reason: String,
    },
}

/// Browser driver and UI interaction errors
#[derive(Debug, Error)]
pub enum BrowserError {
    /// The browser process could not be configured or started
    #[error("failed to launch browser: {0}")]
    Launch(String),

    /// A driver command failed
    #[error("driver command failed: {0}")]
    Driver(String),

    /// Navigation to a URL failed
    #[error("navigation to {url} failed: {reason}")]
    Navigation {
        /// Requested URL
        url: String,
        /// Driver message
        reason: String,
    },

    /// No element matched a locator within the bounded wait
    #[error("no element matched {locator} within {waited_ms}ms")]
    ElementNotFound {
        /// Human-readable locator description
        locator: String,
        /// How long the lookup waited
        waited_ms: u64,
    },

    /// A bounded wait elapsed without reaching the expected state
    #[error("timed out after {waited_ms}ms waiting for {what}")]
    Timeout {
        /// What was being waited for
        what: String,
        /// How long the wait lasted
        waited_ms: u64,
    },

    /// The page rejected a script-level interaction
    #[error("script interaction rejected: {0}")]
    ScriptRejected(String),

    /// Every strategy of a locator chain failed
    #[error("all {tried} locator strategies failed")]
    AllLocatorsFailed {
        /// Number of strategies attempted
        tried: usize,
    },
}

/// Artifact detection and claim errors
#[derive(Debug, Error)]
pub enum ArtifactError {
    /// No finished artifact appeared before the timeout
    #[error("no artifact appeared in {dir} within {waited_ms}ms")]
    DownloadTimeout {
        /// Watched directory
        dir: PathBuf,
        /// How long the poll lasted
        waited_ms: u64,
    },

    /// Claim was requested but no qualifying artifact exists
    #[error("no qualifying artifact in {dir}")]
    NoCandidate {
        /// Scanned directory
        dir: PathBuf,
    },

    /// The rename that claims an artifact failed; the artifact is left in place
    #[error("failed to move {source_path} to {dest_path}: {reason}")]
    ClaimFailed {
        /// The artifact that was being claimed
        source_path: PathBuf,
        /// The identifier-named destination
        dest_path: PathBuf,
        /// The reason the rename failed
        reason: String,
    },
}

impl Error {
    /// Get the machine-readable error code
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::Precondition(_) => "precondition_failed",
            Error::Config { .. } => "config_error",
            Error::Session(e) => match e {
                SessionError::NotFound { .. } => "session_not_found",
                SessionError::CorruptData { .. } => "session_corrupt",
                SessionError::Persistence { .. } => "session_persistence",
            },
            Error::Browser(e) => match e {
                BrowserError::Launch(_) => "browser_launch",
                BrowserError::Driver(_) => "driver_error",
                BrowserError::Navigation { .. } => "navigation_failed",
                BrowserError::ElementNotFound { .. } => "element_not_found",
                BrowserError::Timeout { .. } => "timeout",
                BrowserError::ScriptRejected(_) => "script_rejected",
                BrowserError::AllLocatorsFailed { .. } => "all_locators_failed",
            },
            Error::Artifact(e) => match e {
                ArtifactError::DownloadTimeout { .. } => "download_timeout",
                ArtifactError::NoCandidate { .. } => "no_candidate",
                ArtifactError::ClaimFailed { .. } => "claim_failed",
            },
            Error::LoginFailed(_) => "login_failed",
            Error::Io(_) => "io_error",
            Error::Serialization(_) => "serialization_error",
        }
    }

    /// Whether this error ends the whole run rather than a single target
    pub fn is_run_fatal(&self) -> bool {
        matches!(
            self,
            Error::Precondition(_)
                | Error::Config { .. }
                | Error::LoginFailed(_)
                | Error::Browser(BrowserError::Launch(_))
        )
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_errors_keep_their_specific_code() {
        let err: Error = SessionError::CorruptData {
            path: PathBuf::from("cookies.json"),
            reason: "expected value at line 1".into(),
        }
        .into();
        assert_eq!(err.error_code(), "session_corrupt");

        let err: Error = ArtifactError::ClaimFailed {
            source_path: PathBuf::from("a.pdf"),
            dest_path: PathBuf::from("b.pdf"),
            reason: "denied".into(),
        }
        .into();
        assert_eq!(err.error_code(), "claim_failed");
    }

    #[test]
    fn display_includes_context() {
        let err: Error = BrowserError::ElementNotFound {
            locator: "id=username".into(),
            waited_ms: 10_000,
        }
        .into();
        let msg = err.to_string();
        assert!(msg.contains("id=username"), "message was: {msg}");
        assert!(msg.contains("10000ms"), "message was: {msg}");
    }

    #[test]
    fn only_setup_errors_are_run_fatal() {
        assert!(Error::Precondition("missing username".into()).is_run_fatal());
        assert!(Error::LoginFailed("still on /login".into()).is_run_fatal());
        assert!(Error::Browser(BrowserError::Launch("no chrome".into())).is_run_fatal());

        let per_target: Error = ArtifactError::DownloadTimeout {
            dir: PathBuf::from("downloads"),
            waited_ms: 30_000,
        }
        .into();
        assert!(!per_target.is_run_fatal());
        assert!(!Error::Browser(BrowserError::AllLocatorsFailed { tried: 2 }).is_run_fatal());
    }
}
