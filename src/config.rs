//! Configuration module for OAuth credentials and gateway settings
//!
//! All configuration is loaded from environment variables following the
//! pattern `GMAIL_GATEWAY_<KEY>`. OAuth client credentials are required;
//! everything else has a sensible default. Provider endpoint bases are
//! configurable so tests can point the gateway at a local fake.

use std::env;
use std::env::VarError;
use std::time::Duration;

use secrecy::SecretString;

use crate::errors::{AppError, AppResult};

/// OAuth scopes requested during authorization
///
/// Identity scopes feed the userinfo lookup; the mail scope grants full
/// mailbox access for the wrapped provider operations.
pub const OAUTH_SCOPES: [&str; 4] = [
    "openid",
    "https://www.googleapis.com/auth/userinfo.email",
    "https://www.googleapis.com/auth/userinfo.profile",
    "https://mail.google.com/",
];

/// Agent runtime configuration
///
/// Points the chat facade at an OpenAI-compatible tool-calling endpoint.
/// Absent entirely when `GMAIL_GATEWAY_AGENT_BASE_URL` is unset; the chat
/// endpoint then reports the assistant as not configured.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Base URL of the chat-completions API (e.g., `https://api.openai.com/v1`)
    pub base_url: String,
    /// Model name passed on every completion request
    pub model: String,
    /// Optional bearer key for the completions API
    pub api_key: Option<SecretString>,
    /// Maximum tool-calling rounds per chat request
    pub max_iterations: usize,
}

/// Gateway-wide configuration
///
/// Cloned into handlers via `Arc` for thread-safe shared access. Secrets are
/// stored using `SecretString` to prevent accidental logging.
#[derive(Debug, Clone)]
pub struct Config {
    /// OAuth client identifier issued by the provider console
    pub client_id: String,
    /// OAuth client secret, never logged
    pub client_secret: SecretString,
    /// Redirect URI registered for the OAuth callback
    pub redirect_uri: String,
    /// Frontend URL the callback redirects to, with `?token=` appended
    pub post_login_redirect: String,
    /// Socket address the HTTP server binds
    pub listen_addr: String,
    /// Overall provider request timeout in milliseconds
    pub http_timeout_ms: u64,
    /// TCP connect timeout in milliseconds
    pub connect_timeout_ms: u64,
    /// Mail REST API base (no trailing slash)
    pub api_base: String,
    /// Multiplexed batch endpoint base
    pub batch_base: String,
    /// Authorization URL users are sent to
    pub auth_uri: String,
    /// Token endpoint for code exchange and refresh
    pub token_uri: String,
    /// Userinfo endpoint for the authenticated profile
    pub userinfo_uri: String,
    /// Best-effort token revocation endpoint
    pub revoke_uri: String,
    /// Time-to-live for pending OAuth state tokens in seconds
    pub state_ttl_seconds: u64,
    /// Maximum pending state tokens to retain (oldest evicted beyond this)
    pub state_max_entries: usize,
    /// Seconds before expiry at which an access token counts as expired
    pub refresh_margin_seconds: i64,
    /// Chat agent runtime, when configured
    pub agent: Option<AgentConfig>,
}

impl Config {
    /// Load all configuration from environment variables
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` if a required variable is missing or a numeric
    /// variable is malformed.
    ///
    /// # Example Environment
    ///
    /// ```text
    /// GMAIL_GATEWAY_CLIENT_ID=1234.apps.googleusercontent.com
    /// GMAIL_GATEWAY_CLIENT_SECRET=shhh
    /// GMAIL_GATEWAY_REDIRECT_URI=http://localhost:8000/api/auth/callback
    /// GMAIL_GATEWAY_LISTEN_ADDR=127.0.0.1:8000
    /// GMAIL_GATEWAY_AGENT_BASE_URL=http://localhost:11434/v1
    /// ```
    pub fn load_from_env() -> AppResult<Self> {
        let agent = match optional_env("GMAIL_GATEWAY_AGENT_BASE_URL")? {
            Some(base_url) => Some(AgentConfig {
                base_url,
                model: string_env("GMAIL_GATEWAY_AGENT_MODEL", "gpt-4o-mini")?,
                api_key: optional_env("GMAIL_GATEWAY_AGENT_API_KEY")?.map(SecretString::from),
                max_iterations: parse_usize_env("GMAIL_GATEWAY_AGENT_MAX_ITERATIONS", 3)?,
            }),
            None => None,
        };

        Ok(Self {
            client_id: required_env("GMAIL_GATEWAY_CLIENT_ID")?,
            client_secret: SecretString::from(required_env("GMAIL_GATEWAY_CLIENT_SECRET")?),
            redirect_uri: required_env("GMAIL_GATEWAY_REDIRECT_URI")?,
            post_login_redirect: string_env(
                "GMAIL_GATEWAY_POST_LOGIN_REDIRECT",
                "http://localhost:5173/mail",
            )?,
            listen_addr: string_env("GMAIL_GATEWAY_LISTEN_ADDR", "127.0.0.1:8000")?,
            http_timeout_ms: parse_u64_env("GMAIL_GATEWAY_HTTP_TIMEOUT_MS", 30_000)?,
            connect_timeout_ms: parse_u64_env("GMAIL_GATEWAY_CONNECT_TIMEOUT_MS", 10_000)?,
            api_base: string_env(
                "GMAIL_GATEWAY_API_BASE",
                "https://gmail.googleapis.com/gmail/v1",
            )?,
            batch_base: string_env(
                "GMAIL_GATEWAY_BATCH_BASE",
                "https://www.googleapis.com/batch/gmail/v1",
            )?,
            auth_uri: string_env(
                "GMAIL_GATEWAY_AUTH_URI",
                "https://accounts.google.com/o/oauth2/auth",
            )?,
            token_uri: string_env(
                "GMAIL_GATEWAY_TOKEN_URI",
                "https://oauth2.googleapis.com/token",
            )?,
            userinfo_uri: string_env(
                "GMAIL_GATEWAY_USERINFO_URI",
                "https://www.googleapis.com/oauth2/v2/userinfo",
            )?,
            revoke_uri: string_env(
                "GMAIL_GATEWAY_REVOKE_URI",
                "https://oauth2.googleapis.com/revoke",
            )?,
            state_ttl_seconds: parse_u64_env("GMAIL_GATEWAY_STATE_TTL_SECONDS", 600)?,
            state_max_entries: parse_usize_env("GMAIL_GATEWAY_STATE_MAX_ENTRIES", 512)?,
            refresh_margin_seconds: parse_u64_env("GMAIL_GATEWAY_REFRESH_MARGIN_SECONDS", 60)?
                as i64,
            agent,
        })
    }

    /// Overall provider request timeout
    pub fn http_timeout(&self) -> Duration {
        Duration::from_millis(self.http_timeout_ms)
    }

    /// TCP connect timeout
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

/// Read a required environment variable, returning error if missing or empty
fn required_env(key: &str) -> AppResult<String> {
    match env::var(key) {
        Ok(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(AppError::InvalidInput(format!(
            "missing required environment variable {key}"
        ))),
    }
}

/// Read an optional environment variable
///
/// Returns `None` when unset or blank.
fn optional_env(key: &str) -> AppResult<Option<String>> {
    match env::var(key) {
        Ok(v) if !v.trim().is_empty() => Ok(Some(v)),
        Ok(_) | Err(VarError::NotPresent) => Ok(None),
        Err(VarError::NotUnicode(_)) => Err(AppError::InvalidInput(format!(
            "environment variable {key} contains non-unicode data"
        ))),
    }
}

/// Read a string environment variable with default fallback
fn string_env(key: &str, default: &str) -> AppResult<String> {
    Ok(optional_env(key)?.unwrap_or_else(|| default.to_owned()))
}

/// Parse a `u64` environment variable with default fallback
///
/// Returns `default` if unset.
///
/// # Errors
///
/// Returns `InvalidInput` if the variable is set but not a valid `u64`.
fn parse_u64_env(key: &str, default: u64) -> AppResult<u64> {
    match env::var(key) {
        Ok(v) => v.parse::<u64>().map_err(|_| {
            AppError::InvalidInput(format!("invalid u64 environment variable {key}: '{v}'"))
        }),
        Err(VarError::NotPresent) => Ok(default),
        Err(VarError::NotUnicode(_)) => Err(AppError::InvalidInput(format!(
            "environment variable {key} contains non-unicode data"
        ))),
    }
}

/// Parse a `usize` environment variable with default fallback
///
/// Returns `default` if unset.
///
/// # Errors
///
/// Returns `InvalidInput` if the variable is set but not a valid `usize`.
fn parse_usize_env(key: &str, default: usize) -> AppResult<usize> {
    match env::var(key) {
        Ok(v) => v.parse::<usize>().map_err(|_| {
            AppError::InvalidInput(format!("invalid usize environment variable {key}: '{v}'"))
        }),
        Err(VarError::NotPresent) => Ok(default),
        Err(VarError::NotUnicode(_)) => Err(AppError::InvalidInput(format!(
            "environment variable {key} contains non-unicode data"
        ))),
    }
}

#[cfg(test)]
impl Config {
    /// Baseline config for unit tests
    ///
    /// Endpoint bases point at `base` so a single fake HTTP server can stand
    /// in for every provider surface.
    pub fn for_tests(base: &str) -> Self {
        Self {
            client_id: "test-client-id".to_owned(),
            client_secret: SecretString::from("test-client-secret"),
            redirect_uri: "http://localhost:8000/api/auth/callback".to_owned(),
            post_login_redirect: "http://localhost:5173/mail".to_owned(),
            listen_addr: "127.0.0.1:0".to_owned(),
            http_timeout_ms: 5_000,
            connect_timeout_ms: 2_000,
            api_base: format!("{base}/gmail/v1"),
            batch_base: format!("{base}/batch/gmail/v1"),
            auth_uri: format!("{base}/o/oauth2/auth"),
            token_uri: format!("{base}/token"),
            userinfo_uri: format!("{base}/oauth2/v2/userinfo"),
            revoke_uri: format!("{base}/revoke"),
            state_ttl_seconds: 600,
            state_max_entries: 512,
            refresh_margin_seconds: 60,
            agent: None,
        }
    }
}
