// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Frontier Companion API (CAPI) client.
//!
//! Handles:
//! - Authorization URL construction and code exchange
//! - Token refresh against the Frontier auth server
//! - Bearer-authenticated GETs of CAPI resources

use crate::config::Config;
use crate::error::AppError;
use crate::models::{Credential, TokenResponse};
use chrono::Utc;
use reqwest::{StatusCode, Url};

/// OAuth scopes requested from Frontier.
const CAPI_SCOPE: &str = "auth capi";

/// Low-level CAPI and auth server client.
#[derive(Clone)]
pub struct CapiClient {
    http: reqwest::Client,
    capi_url: String,
    auth_url: String,
    redirect_url: String,
    client_id: String,
    client_secret: String,
}

impl CapiClient {
    /// Create a client; every request is bounded by `config.http_timeout`.
    pub fn new(config: &Config) -> Result<Self, AppError> {
        let http = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .build()
            .map_err(|e| AppError::Internal(anyhow::anyhow!("HTTP client init failed: {}", e)))?;

        Ok(Self {
            http,
            capi_url: config.capi_url.trim_end_matches('/').to_string(),
            auth_url: config.auth_url.trim_end_matches('/').to_string(),
            redirect_url: config.redirect_url.clone(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
        })
    }

    /// Authorization redirect URL carrying the given state.
    pub fn authorization_url(&self, state: &str) -> String {
        format!(
            "{}/auth?\
             response_type=code&\
             client_id={}&\
             redirect_uri={}&\
             scope={}&\
             state={}",
            self.auth_url,
            urlencoding::encode(&self.client_id),
            urlencoding::encode(&self.redirect_url),
            urlencoding::encode(CAPI_SCOPE),
            urlencoding::encode(state),
        )
    }

    /// Exchange an authorization code for a credential.
    pub async fn exchange_code(&self, code: &str) -> Result<Credential, AppError> {
        let mut form = vec![
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.redirect_url.as_str()),
            ("client_id", self.client_id.as_str()),
        ];
        if !self.client_secret.is_empty() {
            form.push(("client_secret", self.client_secret.as_str()));
        }

        self.token_request(&form, "")
            .await
            .map_err(AppError::AuthExchange)
    }

    /// Refresh a credential with `grant_type=refresh_token`.
    pub async fn refresh_token(&self, refresh_token: &str) -> Result<Credential, AppError> {
        let mut form = vec![
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", self.client_id.as_str()),
        ];
        if !self.client_secret.is_empty() {
            form.push(("client_secret", self.client_secret.as_str()));
        }

        self.token_request(&form, refresh_token)
            .await
            .map_err(AppError::RefreshFailure)
    }

    /// GET a CAPI resource.
    ///
    /// Returns `Ok(None)` for 204 or an empty body and `Unauthorized` for 401.
    pub async fn get_resource(
        &self,
        endpoint: &str,
        access_token: &str,
    ) -> Result<Option<Vec<u8>>, AppError> {
        let url = join_url(&self.capi_url, endpoint);

        let response = self
            .http
            .get(&url)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| AppError::UpstreamUnavailable(e.to_string()))?;

        let status = response.status();

        if status == StatusCode::UNAUTHORIZED {
            return Err(AppError::Unauthorized);
        }

        if status == StatusCode::NO_CONTENT {
            return Ok(None);
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::UpstreamUnavailable(format!(
                "HTTP {}: {}",
                status,
                truncate(&body)
            )));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| AppError::UpstreamUnavailable(format!("Failed to read body: {}", e)))?;

        if body.is_empty() {
            return Ok(None);
        }
        Ok(Some(body.to_vec()))
    }

    /// POST to the token endpoint and parse a credential out of the answer.
    ///
    /// A response only counts as a token if it is 2xx and carries an
    /// `access_token`; anything else is reported with the provider's message.
    async fn token_request(
        &self,
        form: &[(&str, &str)],
        fallback_refresh_token: &str,
    ) -> Result<Credential, String> {
        let url = format!("{}/token", self.auth_url);

        let response = self
            .http
            .post(&url)
            .form(form)
            .send()
            .await
            .map_err(|e| format!("Token request failed: {}", e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| format!("Failed to read token response: {}", e))?;

        if !status.is_success() {
            return Err(format!("HTTP {}: {}", status, provider_message(&body)));
        }

        let token: TokenResponse = serde_json::from_str(&body)
            .map_err(|_| format!("Unexpected token response: {}", provider_message(&body)))?;

        if token.access_token.is_empty() {
            return Err("Token response carried an empty access token".to_string());
        }

        Ok(token.into_credential(Utc::now(), fallback_refresh_token))
    }
}

/// Join a base URL and an endpoint path with exactly one slash.
fn join_url(base: &str, endpoint: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        endpoint.trim_start_matches('/')
    )
}

/// Pull a human readable failure reason out of a token endpoint body.
fn provider_message(body: &str) -> String {
    let Ok(serde_json::Value::Object(map)) = serde_json::from_str::<serde_json::Value>(body)
    else {
        return truncate(body);
    };

    let parts: Vec<String> = ["error", "error_description", "message", "detail"]
        .iter()
        .filter_map(|key| map.get(*key))
        .map(|v| match v {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        })
        .collect();

    if parts.is_empty() {
        "no access_token in response".to_string()
    } else {
        parts.join("; ")
    }
}

fn truncate(body: &str) -> String {
    const MAX: usize = 200;
    match body.char_indices().nth(MAX) {
        Some((idx, _)) => format!("{}...", &body[..idx]),
        None => body.to_string(),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// CapiService - High-level service with token management
// ─────────────────────────────────────────────────────────────────────────────

use crate::models::User;
use crate::services::OAuthStateSigner;
use dashmap::DashMap;
use serde_json::{Map, Value};
use std::sync::Arc;
use subtle::ConstantTimeEq;
use tokio::sync::Mutex;

/// Shared per-user refresh locks.
pub type RefreshLocks = Arc<DashMap<String, Arc<Mutex<()>>>>;

/// Shared record of the last refresh performed per user.
pub type RotationLedger = Arc<DashMap<String, Rotation>>;

/// A refresh token that has been spent, and what it was exchanged for.
#[derive(Clone)]
pub struct Rotation {
    consumed_refresh_token: String,
    credential: Credential,
}

/// Authorization redirect plus the state the callback must echo back.
#[derive(Debug, Clone)]
pub struct AuthorizationRequest {
    pub url: String,
    pub state: String,
}

/// Result of fetching a CAPI resource.
#[derive(Debug)]
pub enum FetchOutcome {
    /// Non-empty 2xx body.
    Data(Vec<u8>),
    /// 204 or an empty body.
    Empty,
    /// No usable credential; the user must re-authorize.
    AuthRequired,
    /// Network or non-auth HTTP failure.
    Failed(AppError),
}

impl FetchOutcome {
    pub fn into_bytes(self) -> Option<Vec<u8>> {
        match self {
            FetchOutcome::Data(body) => Some(body),
            _ => None,
        }
    }
}

/// High-level CAPI service that manages the credential lifecycle.
///
/// This service encapsulates:
/// - Loading the canonical credential from the user record
/// - Refresh when expiring (with 5-minute margin) and once on 401
/// - Writing refreshed credentials back to the user record
/// - Per-user locking so only one refresh per user is in flight
///
/// Clones share the refresh locks and rotation ledger.
#[derive(Clone)]
pub struct CapiService {
    client: CapiClient,
    state_signer: OAuthStateSigner,
    /// Per-user mutex to serialize token refresh operations.
    refresh_locks: RefreshLocks,
    /// Last rotation per user, so a repeated refresh is idempotent.
    rotations: RotationLedger,
}

impl CapiService {
    pub fn new(config: &Config) -> Result<Self, AppError> {
        Ok(Self {
            client: CapiClient::new(config)?,
            state_signer: OAuthStateSigner::new(
                &config.oauth_state_key,
                config.oauth_state_max_age,
            ),
            refresh_locks: Arc::new(DashMap::new()),
            rotations: Arc::new(DashMap::new()),
        })
    }

    // ─── Authorization ───────────────────────────────────────────────────────

    /// Build the Frontier authorization redirect and its state token.
    pub fn acquire_authorization_url(&self) -> Result<AuthorizationRequest, AppError> {
        let state = self.state_signer.issue()?;
        let url = self.client.authorization_url(&state);
        tracing::info!("Starting OAuth flow, redirecting to Frontier");
        Ok(AuthorizationRequest { url, state })
    }

    /// Exchange an authorization callback for a credential.
    ///
    /// `callback_payload` is the callback URL (or just its query string),
    /// `state` the value handed out by [`Self::acquire_authorization_url`].
    pub async fn exchange_code_for_token(
        &self,
        callback_payload: &str,
        state: &str,
    ) -> Result<Credential, AppError> {
        let params = CallbackParams::parse(callback_payload);

        if let Some(error) = params.error {
            tracing::warn!(error = %error, "OAuth error from Frontier");
            return Err(AppError::AuthExchange(format!(
                "provider returned {}",
                error
            )));
        }

        let returned_state = params.state.unwrap_or_default();
        if !bool::from(returned_state.as_bytes().ct_eq(state.as_bytes())) {
            tracing::error!("OAuth state mismatch on callback");
            return Err(AppError::AuthExchange("state mismatch".to_string()));
        }
        if !self.state_signer.verify(state) {
            return Err(AppError::AuthExchange(
                "state is invalid or expired".to_string(),
            ));
        }

        let code = params
            .code
            .filter(|c| !c.is_empty())
            .ok_or_else(|| AppError::AuthExchange("missing authorization code".to_string()))?;

        tracing::info!("Exchanging authorization code for tokens");
        let credential = self.client.exchange_code(&code).await.map_err(|e| {
            tracing::error!(error = %e, "Frontier token exchange failed");
            e
        })?;

        Ok(credential)
    }

    // ─── Token Management ────────────────────────────────────────────────────

    /// Return a usable credential for `user`, refreshing it if it expired.
    ///
    /// `None` means the user has to go through authorization again; in that
    /// case the stored credential has been cleared (unless there was none).
    /// A failed refresh of a token that has not lapsed yet keeps the token.
    pub async fn ensure_fresh(&self, user: &mut User) -> Option<Credential> {
        match self.try_ensure_fresh(user).await {
            Ok(credential) => credential,
            Err(e) => {
                tracing::error!(
                    username = %user.username,
                    error = %e,
                    "No valid CAPI credential"
                );
                None
            }
        }
    }

    async fn try_ensure_fresh(&self, user: &mut User) -> Result<Option<Credential>, AppError> {
        let credential = match user.stored_credential() {
            Ok(Some(credential)) => credential,
            Ok(None) => {
                tracing::warn!(cmdr = %user.display_name(), "No CAPI token for user");
                return Ok(None);
            }
            Err(e) => {
                user.clear_credential();
                return Err(e);
            }
        };

        if !credential.needs_refresh(Utc::now()) {
            return Ok(Some(credential));
        }

        tracing::info!(cmdr = %user.display_name(), "Access token expired, refreshing");

        match self.refresh(&user.username, &credential.refresh_token).await {
            Ok(new_credential) => {
                user.store_credential(&new_credential)?;
                Ok(Some(new_credential))
            }
            Err(e) if !credential.is_lapsed(Utc::now()) => {
                // Still inside the margin; the next call gets another try.
                tracing::warn!(
                    cmdr = %user.display_name(),
                    error = %e,
                    "Early token refresh failed, keeping current token"
                );
                Ok(Some(credential))
            }
            Err(e) => {
                user.clear_credential();
                Err(e)
            }
        }
    }

    /// Refresh a credential for the user keyed by `user_key`.
    ///
    /// At most one refresh per user runs at a time. Repeating a call with a
    /// refresh token that was already spent returns the credential it was
    /// spent on instead of contacting the provider again.
    pub async fn refresh(&self, user_key: &str, refresh_token: &str) -> Result<Credential, AppError> {
        if refresh_token.is_empty() {
            return Err(AppError::RefreshFailure("no refresh token".to_string()));
        }

        let lock = self
            .refresh_locks
            .entry(user_key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        let _guard = lock.lock().await;

        if let Some(rotation) = self.rotations.get(user_key) {
            if rotation.consumed_refresh_token == refresh_token
                && !rotation.credential.is_lapsed(Utc::now())
            {
                tracing::debug!(user_key, "Refresh token already rotated, reusing result");
                return Ok(rotation.credential.clone());
            }
        }

        let credential = self.client.refresh_token(refresh_token).await.map_err(|e| {
            tracing::error!(user_key, error = %e, "Couldn't refresh authentication token");
            e
        })?;

        if credential.is_lapsed(Utc::now()) {
            return Err(AppError::RefreshFailure(
                "provider issued an already expired token".to_string(),
            ));
        }

        self.rotations.insert(
            user_key.to_string(),
            Rotation {
                consumed_refresh_token: refresh_token.to_string(),
                credential: credential.clone(),
            },
        );

        tracing::info!(user_key, "Authentication token refreshed");
        Ok(credential)
    }

    // ─── API Wrappers ────────────────────────────────────────────────────────

    /// Fetch a CAPI resource on behalf of `user`.
    ///
    /// A 401 triggers exactly one refresh-and-retry; a second 401 ends the
    /// call with `AuthRequired`.
    pub async fn fetch_resource(&self, endpoint: &str, user: &mut User) -> FetchOutcome {
        let credential = match self.try_ensure_fresh(user).await {
            Ok(Some(credential)) => credential,
            Ok(None) => return FetchOutcome::AuthRequired,
            Err(e) => {
                tracing::error!(
                    username = %user.username,
                    endpoint,
                    error = %e,
                    "No valid CAPI credential"
                );
                return FetchOutcome::AuthRequired;
            }
        };

        match self.client.get_resource(endpoint, &credential.access_token).await {
            Err(AppError::Unauthorized) => {}
            other => return self.outcome(endpoint, user, other),
        }

        tracing::warn!(
            cmdr = %user.display_name(),
            endpoint,
            "CAPI request unauthorized. Attempting to refresh token."
        );

        let refreshed = match self.refresh(&user.username, &credential.refresh_token).await {
            Ok(refreshed) => refreshed,
            Err(e) => {
                tracing::error!(
                    cmdr = %user.display_name(),
                    username = %user.username,
                    error = %e,
                    "Failed to get new token. Bailing."
                );
                user.clear_credential();
                return FetchOutcome::AuthRequired;
            }
        };
        if let Err(e) = user.store_credential(&refreshed) {
            tracing::error!(username = %user.username, error = %e, "Couldn't store refreshed token");
            return FetchOutcome::Failed(e);
        }

        match self.client.get_resource(endpoint, &refreshed.access_token).await {
            Err(AppError::Unauthorized) => {
                tracing::error!(
                    cmdr = %user.display_name(),
                    endpoint,
                    "CAPI still unauthorized after token refresh"
                );
                FetchOutcome::AuthRequired
            }
            other => self.outcome(endpoint, user, other),
        }
    }

    fn outcome(
        &self,
        endpoint: &str,
        user: &User,
        result: Result<Option<Vec<u8>>, AppError>,
    ) -> FetchOutcome {
        match result {
            Ok(Some(body)) => FetchOutcome::Data(body),
            Ok(None) => {
                tracing::warn!(cmdr = %user.display_name(), endpoint, "No content from CAPI");
                FetchOutcome::Empty
            }
            Err(e) => {
                tracing::error!(
                    cmdr = %user.display_name(),
                    endpoint,
                    error = %e,
                    "Failed to get CAPI resource"
                );
                FetchOutcome::Failed(e)
            }
        }
    }

    /// Fetch the user's fleet carrier.
    pub async fn get_carrier(&self, user: &mut User) -> Option<Map<String, Value>> {
        match self.fetch_resource("/fleetcarrier", user).await {
            FetchOutcome::Data(body) => decode_object("/fleetcarrier", user, &body),
            FetchOutcome::Empty => {
                tracing::warn!(username = %user.username, "No carrier data. No fleet carrier?");
                None
            }
            _ => None,
        }
    }

    /// Fetch the commander profile.
    pub async fn get_cmdr(&self, user: &mut User) -> Option<Map<String, Value>> {
        tracing::debug!(cmdr = %user.display_name(), "Loading CMDR profile");
        self.fetch_resource("/profile", user)
            .await
            .into_bytes()
            .and_then(|body| decode_object("/profile", user, &body))
    }
}

fn decode_object(endpoint: &str, user: &User, body: &[u8]) -> Option<Map<String, Value>> {
    match serde_json::from_slice::<Value>(body) {
        Ok(Value::Object(map)) => Some(map),
        Ok(_) => {
            tracing::error!(username = %user.username, endpoint, "CAPI returned a non-object");
            None
        }
        Err(e) => {
            tracing::error!(username = %user.username, endpoint, error = %e, "Invalid CAPI data");
            None
        }
    }
}

/// Query parameters of the OAuth callback.
#[derive(Debug, Default)]
struct CallbackParams {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
}

impl CallbackParams {
    /// Accepts a full callback URL or a bare query string.
    fn parse(payload: &str) -> Self {
        let url = Url::parse(payload).or_else(|_| {
            Url::parse(&format!(
                "http://callback.invalid/?{}",
                payload.trim_start_matches('?')
            ))
        });

        let mut params = Self::default();
        let Ok(url) = url else {
            return params;
        };
        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "code" => params.code = Some(value.into_owned()),
                "state" => params.state = Some(value.into_owned()),
                "error" => params.error = Some(value.into_owned()),
                _ => {}
            }
        }
        params
    }
}
