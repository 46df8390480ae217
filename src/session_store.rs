//! Persisted session tokens
//!
//! A session is the set of cookies captured after an interactive login. It is
//! stored as a JSON array (the same shape browser tooling exports, so
//! `httpOnly`, `sameSite` and `expiry` are accepted) and always read or
//! written as a whole: a file that does not parse is reported as
//! [`SessionError::CorruptData`] and never partially applied.

use crate::error::SessionError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// One cookie of an authenticated session
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionToken {
    /// Cookie name
    pub name: String,
    /// Cookie value
    pub value: String,
    /// Domain the cookie is valid for (e.g. ".service.example")
    pub domain: String,
    /// Path the cookie is valid for (default "/")
    #[serde(default = "default_path")]
    pub path: String,
    /// Expiration as Unix seconds; `None` for session cookies
    #[serde(default, alias = "expiry", skip_serializing_if = "Option::is_none")]
    pub expires: Option<f64>,
    /// Only sent over HTTPS
    #[serde(default)]
    pub secure: bool,
    /// Not readable from page script
    #[serde(default)]
    pub http_only: bool,
    /// SameSite attribute: "Strict", "Lax" or "None"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub same_site: Option<String>,
}

fn default_path() -> String {
    "/".to_string()
}

impl SessionToken {
    /// Create a host cookie with default attributes
    pub fn new(name: impl Into<String>, value: impl Into<String>, domain: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            domain: domain.into(),
            path: default_path(),
            expires: None,
            secure: false,
            http_only: false,
            same_site: None,
        }
    }

    /// Whether the token expired before `now_unix` (seconds)
    pub fn is_expired_at(&self, now_unix: f64) -> bool {
        self.expires.is_some_and(|expires| expires < now_unix)
    }

    /// Whether the token has expired as of the system clock
    pub fn is_expired(&self) -> bool {
        let now = chrono::Utc::now().timestamp_millis() as f64 / 1000.0;
        self.is_expired_at(now)
    }
}

/// File-backed store for one session token set
#[derive(Clone, Debug)]
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    /// Store backed by the JSON file at `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Location of the token file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replace the stored token set
    ///
    /// The set is written to a sibling temp file and renamed over the old one,
    /// so readers never observe a half-written store.
    pub async fn save(&self, tokens: &[SessionToken]) -> Result<(), SessionError> {
        let persistence = |e: std::io::Error| SessionError::Persistence {
            path: self.path.clone(),
            reason: e.to_string(),
        };

        let json = serde_json::to_vec_pretty(tokens).map_err(|e| SessionError::Persistence {
            path: self.path.clone(),
            reason: e.to_string(),
        })?;

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(persistence)?;
        }

        let tmp = self.temp_path();
        tokio::fs::write(&tmp, &json)
            .await
            .map_err(persistence)?;
        if let Err(e) = tokio::fs::rename(&tmp, &self.path).await {
            tokio::fs::remove_file(&tmp).await.ok();
            return Err(persistence(e));
        }

        info!(
            path = %self.path.display(),
            tokens = tokens.len(),
            "session saved"
        );
        Ok(())
    }

    /// Load the stored token set
    pub async fn load(&self) -> Result<Vec<SessionToken>, SessionError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(SessionError::NotFound {
                    path: self.path.clone(),
                });
            }
            Err(e) => {
                return Err(SessionError::Persistence {
                    path: self.path.clone(),
                    reason: e.to_string(),
                });
            }
        };

        let tokens: Vec<SessionToken> =
            serde_json::from_slice(&bytes).map_err(|e| SessionError::CorruptData {
                path: self.path.clone(),
                reason: e.to_string(),
            })?;

        debug!(path = %self.path.display(), tokens = tokens.len(), "session loaded");
        Ok(tokens)
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "session".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}
