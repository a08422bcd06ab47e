//! User record contract shared with the surrounding application.

use crate::error::AppError;
use crate::models::Credential;
use serde::{Deserialize, Serialize};

/// The fields of the application's user record that the token lifecycle
/// reads and writes. The record itself is owned by the caller.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct User {
    /// Application login name (also the key for per-user refresh locking)
    pub username: String,
    /// Elite Dangerous commander name
    #[serde(default)]
    pub cmdr_name: Option<String>,
    /// Credential serialized as canonical JSON
    #[serde(default)]
    pub access_token: Option<String>,
    /// Refresh token, duplicated for the application's own use
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Seconds the current access token was granted for
    #[serde(default)]
    pub token_expiration: Option<i64>,
}

impl User {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            ..Default::default()
        }
    }

    /// Name to use in log lines.
    pub fn display_name(&self) -> &str {
        self.cmdr_name.as_deref().unwrap_or(&self.username)
    }

    /// Parse the stored credential.
    ///
    /// Returns `Ok(None)` when the user never authorized, and
    /// `MalformedCredential` for anything that is not the canonical form.
    pub fn stored_credential(&self) -> Result<Option<Credential>, AppError> {
        let Some(raw) = self.access_token.as_deref() else {
            return Ok(None);
        };

        if raw.trim().is_empty() {
            return Err(AppError::MalformedCredential(
                "empty credential string".to_string(),
            ));
        }

        let mut credential: Credential = serde_json::from_str(raw)
            .map_err(|e| AppError::MalformedCredential(e.to_string()))?;

        if credential.access_token.is_empty() {
            return Err(AppError::MalformedCredential(
                "empty access token".to_string(),
            ));
        }

        if credential.refresh_token.is_empty() {
            if let Some(refresh_token) = self.refresh_token.as_deref() {
                credential.refresh_token = refresh_token.to_string();
            }
        }

        Ok(Some(credential))
    }

    /// Replace the stored credential. All token fields change together.
    ///
    /// On error the record is left untouched.
    pub fn store_credential(&mut self, credential: &Credential) -> Result<(), AppError> {
        let raw = serde_json::to_string(credential).map_err(|e| {
            AppError::Internal(anyhow::anyhow!("Couldn't serialize credential: {}", e))
        })?;

        self.access_token = Some(raw);
        self.refresh_token = Some(credential.refresh_token.clone());
        self.token_expiration = Some(credential.expires_in);
        Ok(())
    }

    /// Drop the stored credential, forcing re-authorization.
    pub fn clear_credential(&mut self) {
        self.access_token = None;
        self.refresh_token = None;
        self.token_expiration = None;
    }
}
