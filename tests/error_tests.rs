// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use fcms_capi::error::AppError;

#[test]
fn test_is_auth_error_matches() {
    assert!(AppError::Unauthorized.is_auth_error());
    assert!(AppError::MalformedCredential("bad".to_string()).is_auth_error());
    assert!(AppError::AuthExchange("state mismatch".to_string()).is_auth_error());
    assert!(AppError::RefreshFailure("invalid_grant".to_string()).is_auth_error());
}

#[test]
fn test_is_auth_error_no_match() {
    assert!(!AppError::UpstreamUnavailable("HTTP 503".to_string()).is_auth_error());
    assert!(!AppError::Internal(anyhow::anyhow!("boom")).is_auth_error());
}

#[test]
fn test_error_messages() {
    assert_eq!(
        AppError::RefreshFailure("invalid_grant".to_string()).to_string(),
        "Token refresh failed: invalid_grant"
    );
    assert_eq!(
        AppError::UpstreamUnavailable("HTTP 500".to_string()).to_string(),
        "CAPI unavailable: HTTP 500"
    );
}
