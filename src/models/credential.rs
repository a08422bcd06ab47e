// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! OAuth credential model and token endpoint response.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifetime assumed when the token endpoint omits `expires_in` (4 hours).
pub const DEFAULT_EXPIRES_IN_SECS: i64 = 14400;

/// Longest lifetime accepted from the token endpoint (one year).
pub const MAX_EXPIRES_IN_SECS: i64 = 365 * 24 * 60 * 60;

/// Margin before expiry when a credential is refreshed proactively (5 minutes).
pub const TOKEN_REFRESH_MARGIN_SECS: i64 = 5 * 60;

/// Canonical OAuth credential, as stored on the user record.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    /// Lifetime granted at issue time, in seconds
    #[serde(default = "default_expires_in")]
    pub expires_in: i64,
    /// Absolute expiry (unix seconds when serialized)
    #[serde(with = "chrono::serde::ts_seconds")]
    pub expires_at: DateTime<Utc>,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

fn default_expires_in() -> i64 {
    DEFAULT_EXPIRES_IN_SECS
}

impl Credential {
    /// Whether the credential should be refreshed before use.
    pub fn needs_refresh(&self, now: DateTime<Utc>) -> bool {
        now + Duration::seconds(TOKEN_REFRESH_MARGIN_SECS) >= self.expires_at
    }

    /// Whether the expiry has already passed.
    pub fn is_lapsed(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .field("token_type", &self.token_type)
            .field("expires_in", &self.expires_in)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Successful response from the Frontier token endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
    /// Some providers send an absolute expiry instead (unix seconds).
    #[serde(default)]
    pub expires_at: Option<i64>,
}

impl TokenResponse {
    /// Convert into a canonical credential.
    ///
    /// `fallback_refresh_token` is kept when the provider does not rotate
    /// the refresh token.
    pub fn into_credential(self, now: DateTime<Utc>, fallback_refresh_token: &str) -> Credential {
        let expires_in = self
            .expires_in
            .filter(|secs| *secs > 0)
            .unwrap_or(DEFAULT_EXPIRES_IN_SECS)
            .min(MAX_EXPIRES_IN_SECS);

        let expires_at = self
            .expires_at
            .and_then(|ts| DateTime::from_timestamp(ts, 0))
            .or_else(|| {
                Duration::try_seconds(expires_in).and_then(|d| now.checked_add_signed(d))
            })
            .unwrap_or(now);

        Credential {
            access_token: self.access_token,
            refresh_token: self
                .refresh_token
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| fallback_refresh_token.to_string()),
            token_type: self
                .token_type
                .filter(|t| !t.is_empty())
                .unwrap_or_else(default_token_type),
            expires_in,
            expires_at,
        }
    }
}
