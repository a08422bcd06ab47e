// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! In-process fake of the Frontier auth server and CAPI.
//!
//! - `POST /token` issues `access-N` / `refresh-N`, rejects reuse of a
//!   refresh token with `invalid_grant`, accepts the code `good-code`.
//!   `expires_at_offset_secs` makes it issue short-lived or lapsed tokens.
//! - `GET /profile` and `GET /fleetcarrier` replay `resource_script`
//!   statuses (200 when the script is empty).

use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Form, Json, Router,
};
use chrono::{DateTime, Duration, Utc};
use fcms_capi::config::Config;
use fcms_capi::models::{Credential, User};
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU16, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

#[allow(dead_code)]
pub const GOOD_CODE: &str = "good-code";

/// Shared state of the fake provider.
pub struct Provider {
    pub token_calls: AtomicUsize,
    pub resource_calls: AtomicUsize,
    /// Statuses returned by successive resource requests.
    pub resource_script: Mutex<VecDeque<u16>>,
    /// Replaces the JSON body of successful resource responses.
    pub resource_body: Mutex<Option<String>>,
    /// Status forced on every token request (200 = behave normally).
    pub token_status: AtomicU16,
    pub omit_expires_in: AtomicBool,
    /// When set, issued tokens carry `expires_at = now + offset` seconds.
    pub expires_at_offset_secs: Mutex<Option<i64>>,
    pub token_delay_ms: AtomicU64,
    /// Bearer tokens presented to the resource endpoints, in order.
    pub bearers: Mutex<Vec<String>>,
    consumed_refresh_tokens: Mutex<HashSet<String>>,
    issued: AtomicUsize,
}

#[allow(dead_code)]
impl Provider {
    fn new() -> Self {
        Self {
            token_calls: AtomicUsize::new(0),
            resource_calls: AtomicUsize::new(0),
            resource_script: Mutex::new(VecDeque::new()),
            resource_body: Mutex::new(None),
            token_status: AtomicU16::new(200),
            omit_expires_in: AtomicBool::new(false),
            expires_at_offset_secs: Mutex::new(None),
            token_delay_ms: AtomicU64::new(0),
            bearers: Mutex::new(Vec::new()),
            consumed_refresh_tokens: Mutex::new(HashSet::new()),
            issued: AtomicUsize::new(0),
        }
    }

    pub fn token_calls(&self) -> usize {
        self.token_calls.load(Ordering::SeqCst)
    }

    pub fn resource_calls(&self) -> usize {
        self.resource_calls.load(Ordering::SeqCst)
    }

    pub fn script(&self, statuses: &[u16]) {
        self.resource_script
            .lock()
            .unwrap()
            .extend(statuses.iter().copied());
    }

    pub fn bearers(&self) -> Vec<String> {
        self.bearers.lock().unwrap().clone()
    }
}

/// Start the fake provider and return a config pointing at it.
#[allow(dead_code)]
pub async fn spawn_provider() -> (Arc<Provider>, Config) {
    let provider = Arc::new(Provider::new());

    let app = Router::new()
        .route("/token", post(token))
        .route("/profile", get(profile))
        .route("/fleetcarrier", get(fleetcarrier))
        .with_state(provider.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind fake provider");
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let base = format!("http://{}", addr);
    let config = Config {
        capi_url: base.clone(),
        auth_url: base,
        ..Config::default()
    };

    (provider, config)
}

/// A user whose stored credential expires at `expires_at`.
#[allow(dead_code)]
pub fn user_with_credential(
    username: &str,
    access_token: &str,
    refresh_token: &str,
    expires_at: DateTime<Utc>,
) -> User {
    let mut user = User::new(username);
    user.cmdr_name = Some(format!("CMDR {}", username));
    user.store_credential(&Credential {
        access_token: access_token.to_string(),
        refresh_token: refresh_token.to_string(),
        token_type: "Bearer".to_string(),
        expires_in: 14400,
        expires_at,
    })
    .unwrap();
    user
}

#[allow(dead_code)]
pub fn fresh_user(username: &str) -> User {
    user_with_credential(
        username,
        "access-live",
        "refresh-live",
        Utc::now() + Duration::hours(2),
    )
}

#[allow(dead_code)]
pub fn expired_user(username: &str) -> User {
    user_with_credential(
        username,
        "access-stale",
        "refresh-stale",
        Utc::now() - Duration::hours(1),
    )
}

async fn token(
    State(provider): State<Arc<Provider>>,
    Form(form): Form<HashMap<String, String>>,
) -> (StatusCode, Json<Value>) {
    provider.token_calls.fetch_add(1, Ordering::SeqCst);

    let delay = provider.token_delay_ms.load(Ordering::SeqCst);
    if delay > 0 {
        tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
    }

    let forced = provider.token_status.load(Ordering::SeqCst);
    if forced != 200 {
        return (
            StatusCode::from_u16(forced).unwrap(),
            Json(json!({ "message": "forced failure" })),
        );
    }

    let invalid_grant = || {
        (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "invalid_grant" })),
        )
    };

    match form.get("grant_type").map(String::as_str) {
        Some("refresh_token") => {
            let refresh_token = form.get("refresh_token").cloned().unwrap_or_default();
            let fresh = !refresh_token.is_empty()
                && provider
                    .consumed_refresh_tokens
                    .lock()
                    .unwrap()
                    .insert(refresh_token);
            if !fresh {
                return invalid_grant();
            }
        }
        Some("authorization_code") => {
            if form.get("code").map(String::as_str) != Some(GOOD_CODE) {
                return invalid_grant();
            }
        }
        _ => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": "unsupported_grant_type" })),
            )
        }
    }

    let n = provider.issued.fetch_add(1, Ordering::SeqCst) + 1;
    let mut body = json!({
        "access_token": format!("access-{}", n),
        "refresh_token": format!("refresh-{}", n),
        "token_type": "Bearer",
    });
    if !provider.omit_expires_in.load(Ordering::SeqCst) {
        body["expires_in"] = json!(7200);
    }
    if let Some(offset) = *provider.expires_at_offset_secs.lock().unwrap() {
        body["expires_at"] = json!(Utc::now().timestamp() + offset);
    }

    (StatusCode::OK, Json(body))
}

async fn profile(State(provider): State<Arc<Provider>>, headers: HeaderMap) -> Response {
    resource(
        &provider,
        &headers,
        json!({ "commander": { "id": 42, "name": "Test Pilot" } }),
    )
}

async fn fleetcarrier(State(provider): State<Arc<Provider>>, headers: HeaderMap) -> Response {
    resource(
        &provider,
        &headers,
        json!({ "name": { "callsign": "XXX-123" }, "balance": "1000" }),
    )
}

fn resource(provider: &Provider, headers: &HeaderMap, body: Value) -> Response {
    provider.resource_calls.fetch_add(1, Ordering::SeqCst);

    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .unwrap_or_default()
        .to_string();
    provider.bearers.lock().unwrap().push(bearer);

    let status = provider
        .resource_script
        .lock()
        .unwrap()
        .pop_front()
        .unwrap_or(200);

    match status {
        200 => match provider.resource_body.lock().unwrap().clone() {
            Some(raw) => (StatusCode::OK, raw).into_response(),
            None => (StatusCode::OK, Json(body)).into_response(),
        },
        204 => StatusCode::NO_CONTENT.into_response(),
        other => (StatusCode::from_u16(other).unwrap(), "upstream error").into_response(),
    }
}
