//! Client configuration loaded from environment variables.
//!
//! Loaded once at startup and injected into [`crate::services::CapiService`];
//! nothing in the crate reads the environment after that.

use std::env;
use std::time::Duration;

pub const DEFAULT_CAPI_URL: &str = "https://pts-companion.orerve.net";
pub const DEFAULT_AUTH_URL: &str = "https://auth.frontierstore.net";
pub const DEFAULT_REDIRECT_URL: &str = "https://fleetcarrier.space/oauth/callback";

const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 10;
const DEFAULT_STATE_MAX_AGE_SECS: u64 = 10 * 60;

/// CAPI client configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the Companion API (`/profile`, `/fleetcarrier`)
    pub capi_url: String,
    /// Base URL of the Frontier auth server (`/auth`, `/token`)
    pub auth_url: String,
    /// OAuth redirect URI registered with Frontier
    pub redirect_url: String,
    /// OAuth client ID (public)
    pub client_id: String,
    /// OAuth client secret, empty for public clients
    pub client_secret: String,
    /// HMAC key for signing the OAuth state parameter
    pub oauth_state_key: Vec<u8>,
    /// Upper bound on every outbound HTTP call
    pub http_timeout: Duration,
    /// How long an issued OAuth state stays acceptable
    pub oauth_state_max_age: Duration,
}

impl Default for Config {
    /// Default config for testing only.
    fn default() -> Self {
        Self {
            capi_url: "http://127.0.0.1:9".to_string(),
            auth_url: "http://127.0.0.1:9".to_string(),
            redirect_url: "http://localhost:6543/oauth/callback".to_string(),
            client_id: "test_client_id".to_string(),
            client_secret: "test_secret".to_string(),
            oauth_state_key: b"test_state_key_32_bytes_minimum!".to_vec(),
            http_timeout: Duration::from_secs(5),
            oauth_state_max_age: Duration::from_secs(DEFAULT_STATE_MAX_AGE_SECS),
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        let client_id = env::var("CAPI_CLIENT_ID")
            .map(|v| v.trim().to_string())
            .map_err(|_| ConfigError::Missing("CAPI_CLIENT_ID"))?;
        let client_secret = env::var("CAPI_CLIENT_SECRET")
            .map(|v| v.trim().to_string())
            .map_err(|_| ConfigError::Missing("CAPI_CLIENT_SECRET"))?;

        // The state key only needs to be secret to this process.
        let oauth_state_key = match env::var("OAUTH_STATE_KEY") {
            Ok(key) if !key.trim().is_empty() => key.trim().as_bytes().to_vec(),
            _ if !client_secret.is_empty() => client_secret.as_bytes().to_vec(),
            _ => client_id.as_bytes().to_vec(),
        };

        Ok(Self {
            capi_url: url_var("CAPI_URL", DEFAULT_CAPI_URL),
            auth_url: url_var("AUTH_URL", DEFAULT_AUTH_URL),
            redirect_url: url_var("REDIRECT_URL", DEFAULT_REDIRECT_URL),
            client_id,
            client_secret,
            oauth_state_key,
            http_timeout: Duration::from_secs(secs_var(
                "HTTP_TIMEOUT_SECS",
                DEFAULT_HTTP_TIMEOUT_SECS,
            )?),
            oauth_state_max_age: Duration::from_secs(secs_var(
                "OAUTH_STATE_MAX_AGE_SECS",
                DEFAULT_STATE_MAX_AGE_SECS,
            )?),
        })
    }
}

/// Read a URL setting, treating an empty value as unset.
fn url_var(name: &str, default: &str) -> String {
    env::var(name)
        .ok()
        .map(|v| v.trim().trim_end_matches('/').to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn secs_var(name: &'static str, default: u64) -> Result<u64, ConfigError> {
    match env::var(name) {
        Ok(v) => match v.trim().parse::<u64>() {
            Ok(secs) if secs > 0 => Ok(secs),
            _ => Err(ConfigError::Invalid(name, v)),
        },
        Err(_) => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {0}: {1:?}")]
    Invalid(&'static str, String),
}
