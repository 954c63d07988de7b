//! Session and credential lifecycle management
//!
//! Owns the OAuth authorization-code flow: pending state tokens, the code
//! exchange, the in-memory session table, access-token refresh, and logout
//! with best-effort revocation. Sessions are transient; nothing survives a
//! process restart; horizontal scaling would require externalizing this
//! table (known gap, not implemented).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rand::RngCore;
use secrecy::ExposeSecret;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::{Config, OAUTH_SCOPES};
use crate::errors::{AppError, AppResult};
use crate::models::UserProfile;

/// One authenticated session
///
/// Created on a successful OAuth callback, mutated in place when the access
/// token is refreshed, destroyed on logout or irrecoverable refresh failure.
#[derive(Debug, Clone)]
pub struct Session {
    /// Authenticated user identity
    pub user: UserProfile,
    /// Live provider access token
    pub access_token: String,
    /// Refresh token, absent when the provider withheld one
    pub refresh_token: Option<String>,
    /// Access token expiry
    pub expires_at: DateTime<Utc>,
    /// Session creation time
    pub created_at: DateTime<Utc>,
}

impl Session {
    /// Whether the access token is expired or lapses within `margin_seconds`
    fn is_expired(&self, margin_seconds: i64) -> bool {
        self.expires_at - ChronoDuration::seconds(margin_seconds) <= Utc::now()
    }
}

/// Live credential handle returned by a successful validation
///
/// The mail client is constructed around this per request; it never sees the
/// session table itself.
#[derive(Debug, Clone)]
pub struct AuthHandle {
    /// Authenticated user identity
    pub user: UserProfile,
    /// Access token guaranteed unexpired at validation time
    pub access_token: String,
}

/// Pending OAuth state tokens with TTL and bounded size
///
/// Each entry binds an authorization URL to its callback. Entries are
/// consumed exactly once; expired entries are swept before every operation
/// and the oldest are evicted beyond `max_entries`.
#[derive(Debug)]
struct StateStore {
    ttl: Duration,
    max_entries: usize,
    entries: HashMap<String, Instant>,
}

impl StateStore {
    fn new(ttl_seconds: u64, max_entries: usize) -> Self {
        Self {
            ttl: Duration::from_secs(ttl_seconds),
            max_entries,
            entries: HashMap::new(),
        }
    }

    /// Record a fresh state token and return it
    fn issue(&mut self) -> String {
        self.cleanup();
        let state = generate_token();
        self.entries.insert(state.clone(), Instant::now());
        self.evict_if_needed();
        state
    }

    /// Consume a state token, deleting it whether or not it validates
    ///
    /// Returns `true` only for a known, unexpired token. Reuse returns
    /// `false` because the first consumption removed the entry.
    fn consume(&mut self, state: &str) -> bool {
        self.cleanup();
        self.entries.remove(state).is_some()
    }

    /// Remove entries older than the TTL
    fn cleanup(&mut self) {
        let ttl = self.ttl;
        self.entries.retain(|_, issued_at| issued_at.elapsed() < ttl);
    }

    /// Evict oldest entries (by issuance time) beyond `max_entries`
    fn evict_if_needed(&mut self) {
        if self.entries.len() <= self.max_entries {
            return;
        }

        let overflow = self.entries.len() - self.max_entries;
        let mut by_age: Vec<(String, Instant)> = self
            .entries
            .iter()
            .map(|(state, issued_at)| (state.clone(), *issued_at))
            .collect();
        by_age.sort_by_key(|(_, issued_at)| *issued_at);

        for (state, _) in by_age.into_iter().take(overflow) {
            self.entries.remove(&state);
        }
    }
}

/// Token endpoint response (code exchange and refresh)
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
    #[serde(default)]
    refresh_token: Option<String>,
}

/// Userinfo endpoint response
#[derive(Debug, Deserialize)]
struct UserInfoResponse {
    id: String,
    email: String,
    #[serde(default)]
    name: Option<String>,
}

/// Session manager
///
/// Injected into request handlers via shared app state; the session table is
/// owned here, never referenced as ambient global state. Refresh attempts are
/// serialized per session token so two concurrent requests against the same
/// expiring session cannot race refresh calls against the provider.
pub struct SessionManager {
    config: Arc<Config>,
    http: reqwest::Client,
    states: Mutex<StateStore>,
    sessions: Mutex<HashMap<String, Session>>,
    refresh_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl SessionManager {
    /// Create the manager with its own HTTP client built from config timeouts
    ///
    /// # Errors
    ///
    /// Returns `Internal` if the HTTP client cannot be constructed.
    pub fn new(config: Arc<Config>) -> AppResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.http_timeout())
            .connect_timeout(config.connect_timeout())
            .build()
            .map_err(|e| AppError::Internal(format!("failed to build HTTP client: {e}")))?;
        let states = StateStore::new(config.state_ttl_seconds, config.state_max_entries);

        Ok(Self {
            config,
            http,
            states: Mutex::new(states),
            sessions: Mutex::new(HashMap::new()),
            refresh_locks: Mutex::new(HashMap::new()),
        })
    }

    /// Issue the provider authorization URL with a fresh state token
    pub async fn authorization_url(&self) -> String {
        let state = self.states.lock().await.issue();
        let scopes = OAUTH_SCOPES.join(" ");
        format!(
            "{}?client_id={}&redirect_uri={}&response_type=code&scope={}&access_type=offline&include_granted_scopes=true&prompt=consent&state={}",
            self.config.auth_uri,
            urlencoding::encode(&self.config.client_id),
            urlencoding::encode(&self.config.redirect_uri),
            urlencoding::encode(&scopes),
            urlencoding::encode(&state),
        )
    }

    /// Handle the OAuth callback: exchange the code and mint a session
    ///
    /// The state token is single-use and deleted whether or not the exchange
    /// succeeds; an unknown or reused state is fatal for the callback.
    ///
    /// # Errors
    ///
    /// - `InvalidInput` for unknown/expired/reused state
    /// - `Provider` when the code exchange or userinfo lookup fails
    pub async fn handle_callback(&self, code: &str, state: &str) -> AppResult<String> {
        if !self.states.lock().await.consume(state) {
            return Err(AppError::invalid(
                "unknown, expired, or already used state token",
            ));
        }

        let tokens = self.exchange_code(code).await?;
        let user = self.fetch_userinfo(&tokens.access_token).await?;
        info!(email = %user.email, "oauth callback established session");

        let session_token = generate_token();
        let now = Utc::now();
        let session = Session {
            user,
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
            expires_at: now + ChronoDuration::seconds(tokens.expires_in),
            created_at: now,
        };
        self.sessions
            .lock()
            .await
            .insert(session_token.clone(), session);

        Ok(session_token)
    }

    /// Validate a bearer token, refreshing the access token when needed
    ///
    /// A session whose access token lapsed is refreshed in place under a
    /// per-token lock; both the lookup and the refresh are re-checked after
    /// acquiring it so concurrent validations perform at most one provider
    /// refresh. Refresh failure (or a missing refresh token) deletes the
    /// session, so no operation ever proceeds on a known-expired credential.
    ///
    /// # Errors
    ///
    /// Returns `Unauthenticated` for unknown tokens and irrecoverable
    /// expiries.
    pub async fn validate(&self, session_token: &str) -> AppResult<AuthHandle> {
        let margin = self.config.refresh_margin_seconds;
        let session = self
            .lookup(session_token)
            .await
            .ok_or_else(|| AppError::Unauthenticated("unknown session token".to_owned()))?;
        if !session.is_expired(margin) {
            return Ok(handle_of(session));
        }

        let token_lock = {
            let mut locks = self.refresh_locks.lock().await;
            locks
                .entry(session_token.to_owned())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        let _guard = token_lock.lock().await;

        // Re-check under the lock: a concurrent request may have refreshed
        // or invalidated the session already.
        let session = self
            .lookup(session_token)
            .await
            .ok_or_else(|| AppError::Unauthenticated("session is no longer valid".to_owned()))?;
        if !session.is_expired(margin) {
            return Ok(handle_of(session));
        }

        let Some(refresh_token) = session.refresh_token.clone() else {
            self.remove(session_token).await;
            return Err(AppError::Unauthenticated(
                "session expired and no refresh token is available".to_owned(),
            ));
        };

        match self.refresh_access_token(&refresh_token).await {
            Ok(tokens) => {
                let mut sessions = self.sessions.lock().await;
                let Some(entry) = sessions.get_mut(session_token) else {
                    return Err(AppError::Unauthenticated(
                        "session was removed during refresh".to_owned(),
                    ));
                };
                entry.access_token = tokens.access_token;
                entry.expires_at = Utc::now() + ChronoDuration::seconds(tokens.expires_in);
                if let Some(rotated) = tokens.refresh_token {
                    entry.refresh_token = Some(rotated);
                }
                debug!(email = %entry.user.email, "access token refreshed");
                Ok(handle_of(entry.clone()))
            }
            Err(e) => {
                warn!(error = %e, "session refresh failed; invalidating session");
                self.remove(session_token).await;
                Err(AppError::Unauthenticated(format!(
                    "session refresh failed: {e}"
                )))
            }
        }
    }

    /// Remove a session, revoking its access token best-effort
    ///
    /// Returns whether a session existed to remove. Revocation failures are
    /// ignored; the local record is removed unconditionally.
    pub async fn logout(&self, session_token: &str) -> bool {
        let removed = {
            let mut sessions = self.sessions.lock().await;
            sessions.remove(session_token)
        };
        self.refresh_locks.lock().await.remove(session_token);

        let Some(session) = removed else {
            return false;
        };

        let result = self
            .http
            .post(&self.config.revoke_uri)
            .form(&[("token", session.access_token.as_str())])
            .send()
            .await;
        if let Err(e) = result {
            debug!(error = %e, "token revocation failed; ignoring");
        }
        info!(email = %session.user.email, "session logged out");
        true
    }

    async fn lookup(&self, session_token: &str) -> Option<Session> {
        self.sessions.lock().await.get(session_token).cloned()
    }

    async fn remove(&self, session_token: &str) {
        self.sessions.lock().await.remove(session_token);
        self.refresh_locks.lock().await.remove(session_token);
    }

    /// Exchange an authorization code for tokens
    async fn exchange_code(&self, code: &str) -> AppResult<TokenResponse> {
        let params = [
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.expose_secret()),
            ("code", code),
            ("redirect_uri", self.config.redirect_uri.as_str()),
            ("grant_type", "authorization_code"),
        ];
        self.token_request(&params, "token exchange").await
    }

    /// Refresh an access token using a refresh token
    async fn refresh_access_token(&self, refresh_token: &str) -> AppResult<TokenResponse> {
        let params = [
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.expose_secret()),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
        ];
        self.token_request(&params, "token refresh").await
    }

    async fn token_request(
        &self,
        params: &[(&str, &str)],
        what: &str,
    ) -> AppResult<TokenResponse> {
        let response = self
            .http
            .post(&self.config.token_uri)
            .form(params)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Provider(format!(
                "{what} failed: HTTP {status} - {body}"
            )));
        }
        response
            .json::<TokenResponse>()
            .await
            .map_err(|e| AppError::Provider(format!("{what} returned malformed JSON: {e}")))
    }

    /// Fetch the authenticated user's profile
    async fn fetch_userinfo(&self, access_token: &str) -> AppResult<UserProfile> {
        let response = self
            .http
            .get(&self.config.userinfo_uri)
            .bearer_auth(access_token)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Provider(format!(
                "userinfo lookup failed: HTTP {status} - {body}"
            )));
        }
        let info = response
            .json::<UserInfoResponse>()
            .await
            .map_err(|e| AppError::Provider(format!("userinfo returned malformed JSON: {e}")))?;
        Ok(UserProfile {
            id: info.id,
            email: info.email,
            name: info.name.unwrap_or_default(),
        })
    }
}

fn handle_of(session: Session) -> AuthHandle {
    AuthHandle {
        user: session.user,
        access_token: session.access_token,
    }
}

/// Generate a cryptographically random URL-safe token (32 bytes, 43 chars)
fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}
