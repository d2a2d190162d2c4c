//! Credential providers for the Gmail client
//!
//! Acquiring and refreshing tokens happens outside this crate. These
//! providers only hand out an access token that already exists, or report
//! that none is available.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use log::debug;
use serde::Deserialize;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Supplies a Gmail access token on demand
pub trait CredentialProvider: Send + Sync {
    /// Current access token, or `None` when the account is not authenticated
    fn access_token(&self) -> Result<Option<String>>;
}

/// A fixed access token
pub struct StaticToken {
    token: Option<String>,
}

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
        }
    }

    /// A provider that never has a credential
    pub fn none() -> Self {
        Self { token: None }
    }
}

impl CredentialProvider for StaticToken {
    fn access_token(&self) -> Result<Option<String>> {
        Ok(self.token.clone())
    }
}

/// Token file written by a separate login flow
///
/// Accepts both the `{access_token, expires_at}` layout and the layout
/// written by Google's auth libraries (`{token, expiry}`).
#[derive(Debug, Deserialize)]
struct StoredToken {
    #[serde(alias = "token")]
    access_token: String,
    /// Expiry as seconds since epoch
    expires_at: Option<i64>,
    /// Expiry as an RFC 3339 timestamp
    expiry: Option<DateTime<Utc>>,
}

impl StoredToken {
    fn expiry(&self) -> Option<DateTime<Utc>> {
        self.expiry
            .or_else(|| self.expires_at.and_then(|s| DateTime::from_timestamp(s, 0)))
    }
}

/// Reads the access token from a JSON file on every request
pub struct TokenFile {
    path: PathBuf,
}

impl TokenFile {
    /// Tokens this close to expiry are treated as already expired
    const EXPIRY_MARGIN_SECS: i64 = 60;

    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<Option<StoredToken>> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e).with_context(|| {
                    format!("Failed to read token file: {}", self.path.display())
                });
            }
        };

        let token: StoredToken = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse token file: {}", self.path.display()))?;
        Ok(Some(token))
    }
}

impl CredentialProvider for TokenFile {
    fn access_token(&self) -> Result<Option<String>> {
        let Some(token) = self.load()? else {
            debug!("No token file at {}", self.path.display());
            return Ok(None);
        };

        if let Some(expiry) = token.expiry() {
            let remaining = expiry - Utc::now();
            if remaining.num_seconds() <= Self::EXPIRY_MARGIN_SECS {
                debug!("Stored token expired at {}", expiry);
                return Ok(None);
            }
        }

        Ok(Some(token.access_token))
    }
}
