// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Error types for the CAPI token lifecycle.

/// Error type shared by the CAPI client and service layers.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// CAPI answered 401 for the presented access token.
    #[error("Unauthorized by CAPI")]
    Unauthorized,

    #[error("Malformed stored credential: {0}")]
    MalformedCredential(String),

    #[error("Authorization exchange failed: {0}")]
    AuthExchange(String),

    #[error("Token refresh failed: {0}")]
    RefreshFailure(String),

    #[error("CAPI unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// True when the only way forward is sending the user back through
    /// the authorization flow.
    pub fn is_auth_error(&self) -> bool {
        matches!(
            self,
            AppError::Unauthorized
                | AppError::MalformedCredential(_)
                | AppError::AuthExchange(_)
                | AppError::RefreshFailure(_)
        )
    }
}

/// Result type alias for CAPI operations
pub type Result<T> = std::result::Result<T, AppError>;
