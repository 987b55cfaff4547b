//! REST adapter for the hosted identity and profile service.
//!
//! Speaks the service's two dialects: the GoTrue-style auth endpoints
//! under `/auth/v1` (password grant, signup, refresh, logout) and the
//! PostgREST row API under `/rest/v1`. All error classification lives
//! here; above this module only [`AuthError`] and [`ProfileError`]
//! kinds exist.
//!
//! The active session is persisted as JSON under the platform data
//! directory so a restart lands back in the signed-in state without a
//! credential prompt, and a background task renews the access token
//! shortly before it expires.

use std::path::PathBuf;
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use directories::ProjectDirs;
use parking_lot::Mutex;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use ovi_shared::{Identity, NewProfile, Profile};

use crate::auth::{AuthEvent, AuthSession, IdentityBackend, SignUpMetadata, SignUpOutcome};
use crate::error::{AuthError, ProfileError};
use crate::profiles::ProfileStore;

const EVENT_CAPACITY: usize = 32;

/// Refresh this long before the access token expires.
const REFRESH_MARGIN_SECS: i64 = 60;

/// Backoff between refresh attempts when the service is unreachable.
const REFRESH_RETRY: Duration = Duration::from_secs(15);

/// PostgREST content negotiation for "exactly one row". A query that
/// matches zero rows then comes back as 406 instead of an empty array.
const PGRST_OBJECT: &str = "application/vnd.pgrst.object+json";

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Connection settings for [`HttpBackend`].
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// Project base URL, without a trailing slash.
    pub base_url: String,
    /// Public API key, sent as the `apikey` header on every call.
    pub api_key: String,
    /// Where to persist the session. `None` picks
    /// `<platform data dir>/session.json`.
    pub session_file: Option<PathBuf>,
    /// Per-request timeout.
    pub request_timeout: Duration,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:54321".to_string(),
            api_key: String::new(),
            session_file: None,
            request_timeout: Duration::from_secs(10),
        }
    }
}

// ---------------------------------------------------------------------------
// Backend
// ---------------------------------------------------------------------------

/// [`IdentityBackend`] and [`ProfileStore`] over the hosted REST API.
///
/// Cheap to clone; clones share the session and the event stream.
#[derive(Clone)]
pub struct HttpBackend {
    inner: Arc<HttpInner>,
}

struct HttpInner {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    session_path: PathBuf,
    session: Mutex<Option<AuthSession>>,
    events: broadcast::Sender<AuthEvent>,
    refresh_task: Mutex<Option<JoinHandle<()>>>,
}

impl HttpBackend {
    pub fn new(config: HttpConfig) -> Result<Self, AuthError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|err| AuthError::Other(format!("could not build HTTP client: {err}")))?;
        let session_path = match config.session_file {
            Some(path) => path,
            None => default_session_path()?,
        };
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        Ok(Self {
            inner: Arc::new(HttpInner {
                http,
                base_url: config.base_url.trim_end_matches('/').to_string(),
                api_key: config.api_key,
                session_path,
                session: Mutex::new(None),
                events,
                refresh_task: Mutex::new(None),
            }),
        })
    }

    /// The session currently held by this backend, if any.
    pub fn current_session(&self) -> Option<AuthSession> {
        self.inner.session.lock().clone()
    }

    /// Install a fresh session: remember it, write it to disk, announce
    /// it, and (re)arm the refresh task.
    async fn install_session(&self, session: AuthSession) {
        *self.inner.session.lock() = Some(session.clone());
        self.inner.persist().await;
        self.schedule_refresh();
        let _ = self.inner.events.send(AuthEvent::SignedIn {
            identity: session.identity,
        });
    }

    fn schedule_refresh(&self) {
        let handle = tokio::spawn(HttpInner::refresh_loop(Arc::downgrade(&self.inner)));
        if let Some(old) = self.inner.refresh_task.lock().replace(handle) {
            old.abort();
        }
    }

    fn cancel_refresh(&self) {
        if let Some(task) = self.inner.refresh_task.lock().take() {
            task.abort();
        }
    }
}

impl HttpInner {
    /// Keeps the access token alive until the session ends. Holds the
    /// backend only weakly while sleeping, so dropping the last
    /// [`HttpBackend`] clone ends the task instead of the task keeping
    /// the backend alive. Exits when the session is gone or the
    /// service rejects the refresh token.
    async fn refresh_loop(this: Weak<Self>) {
        loop {
            let Some(inner) = this.upgrade() else { return };
            let Some((refresh_token, expires_at)) = inner
                .session
                .lock()
                .as_ref()
                .map(|s| (s.refresh_token.clone(), s.expires_at))
            else {
                return;
            };
            let wake_at = expires_at - chrono::Duration::seconds(REFRESH_MARGIN_SECS);
            let delay = (wake_at - Utc::now()).to_std().unwrap_or(Duration::ZERO);
            drop(inner);

            tokio::time::sleep(delay).await;

            let Some(inner) = this.upgrade() else { return };
            match inner.refresh(&refresh_token).await {
                Ok(identity) => {
                    debug!(user = %identity.id, "Access token refreshed");
                    inner.persist().await;
                    let _ = inner.events.send(AuthEvent::TokenRefreshed { identity });
                }
                Err(AuthError::Timeout) | Err(AuthError::Network(_)) => {
                    // The service may just be unreachable; the refresh
                    // token is not known to be bad, so keep trying.
                    warn!("Token refresh unreachable, retrying");
                    drop(inner);
                    tokio::time::sleep(REFRESH_RETRY).await;
                }
                Err(err) => {
                    warn!(error = %err, "Token refresh rejected, ending session");
                    *inner.session.lock() = None;
                    inner.persist().await;
                    let _ = inner.events.send(AuthEvent::SignedOut);
                    return;
                }
            }
        }
    }

    /// Exchange the refresh token for new tokens and swap them into the
    /// held session.
    async fn refresh(&self, refresh_token: &str) -> Result<Identity, AuthError> {
        let url = format!("{}/auth/v1/token?grant_type=refresh_token", self.base_url);
        let response = self
            .http
            .post(&url)
            .header("apikey", &self.api_key)
            .json(&json!({ "refresh_token": refresh_token }))
            .send()
            .await
            .map_err(transport_error)?;

        let token = read_token(response).await?;
        let session = session_from_token(token);
        let identity = session.identity.clone();
        *self.session.lock() = Some(session);
        Ok(identity)
    }

    /// Mirror the held session to disk. A `None` session removes the
    /// file. Disk trouble is logged and swallowed; auth never fails on
    /// persistence.
    async fn persist(&self) {
        let snapshot = self.session.lock().clone();
        match snapshot {
            Some(session) => {
                if let Some(parent) = self.session_path.parent() {
                    let _ = tokio::fs::create_dir_all(parent).await;
                }
                match serde_json::to_vec_pretty(&session) {
                    Ok(bytes) => {
                        if let Err(err) = tokio::fs::write(&self.session_path, bytes).await {
                            warn!(
                                error = %err,
                                path = %self.session_path.display(),
                                "Could not persist session"
                            );
                        }
                    }
                    Err(err) => warn!(error = %err, "Could not serialize session"),
                }
            }
            None => {
                let _ = tokio::fs::remove_file(&self.session_path).await;
            }
        }
    }

    /// Bearer token for row API calls: the session's access token, or
    /// the public key when signed out.
    fn bearer(&self) -> String {
        self.session
            .lock()
            .as_ref()
            .map(|s| s.access_token.clone())
            .unwrap_or_else(|| self.api_key.clone())
    }
}

impl Drop for HttpInner {
    fn drop(&mut self) {
        if let Some(task) = self.refresh_task.get_mut().take() {
            task.abort();
        }
    }
}

#[async_trait]
impl IdentityBackend for HttpBackend {
    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthSession, AuthError> {
        let url = format!("{}/auth/v1/token?grant_type=password", self.inner.base_url);
        let response = self
            .inner
            .http
            .post(&url)
            .header("apikey", &self.inner.api_key)
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await
            .map_err(transport_error)?;

        let token = read_token(response).await?;
        let session = session_from_token(token);
        info!(user = %session.identity.id, "Signed in");
        self.install_session(session.clone()).await;
        Ok(session)
    }

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        metadata: SignUpMetadata,
    ) -> Result<SignUpOutcome, AuthError> {
        let url = format!("{}/auth/v1/signup", self.inner.base_url);
        let response = self
            .inner
            .http
            .post(&url)
            .header("apikey", &self.inner.api_key)
            .json(&json!({
                "email": email,
                "password": password,
                "data": metadata,
            }))
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        let text = response.text().await.map_err(transport_error)?;
        if !status.is_success() {
            return Err(classify_auth_error(status, &text));
        }

        // Two response shapes: a token envelope when the account is
        // usable immediately, or a bare user object while email
        // confirmation is pending.
        if let Ok(token) = serde_json::from_str::<TokenResponse>(&text) {
            let session = session_from_token(token);
            info!(user = %session.identity.id, "Signed up");
            self.install_session(session.clone()).await;
            return Ok(SignUpOutcome {
                identity: session.identity.clone(),
                session: Some(session),
            });
        }

        let user: ApiUser = serde_json::from_str(&text)
            .map_err(|err| AuthError::Other(format!("unexpected signup response: {err}")))?;
        let identity = user.into_identity();
        info!(user = %identity.id, "Signed up, confirmation pending");
        Ok(SignUpOutcome {
            identity,
            session: None,
        })
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        let token = self
            .inner
            .session
            .lock()
            .as_ref()
            .map(|s| s.access_token.clone());
        let Some(token) = token else {
            // Nothing to end.
            return Ok(());
        };

        let url = format!("{}/auth/v1/logout", self.inner.base_url);
        let response = self
            .inner
            .http
            .post(&url)
            .header("apikey", &self.inner.api_key)
            .bearer_auth(&token)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        // 401 means the token is already dead, which is as signed out
        // as it gets.
        if !status.is_success() && status != StatusCode::UNAUTHORIZED {
            let text = response.text().await.map_err(transport_error)?;
            return Err(classify_auth_error(status, &text));
        }

        self.cancel_refresh();
        *self.inner.session.lock() = None;
        self.inner.persist().await;
        info!("Signed out");
        let _ = self.inner.events.send(AuthEvent::SignedOut);
        Ok(())
    }

    async fn restore(&self) -> Result<Option<Identity>, AuthError> {
        let bytes = match tokio::fs::read(&self.inner.session_path).await {
            Ok(bytes) => bytes,
            Err(_) => return Ok(None),
        };
        let mut stored: AuthSession = match serde_json::from_slice(&bytes) {
            Ok(session) => session,
            Err(err) => {
                warn!(error = %err, "Discarding unreadable session file");
                let _ = tokio::fs::remove_file(&self.inner.session_path).await;
                return Ok(None);
            }
        };

        // The token's own exp claim wins over the stored timestamp.
        if let Some(exp) = jwt_expiry(&stored.access_token) {
            stored.expires_at = exp;
        }

        let identity = stored.identity.clone();
        let refresh_token = stored.refresh_token.clone();
        let stale = stored.expires_at
            <= Utc::now() + chrono::Duration::seconds(REFRESH_MARGIN_SECS);
        *self.inner.session.lock() = Some(stored);

        if stale {
            // Only a successful refresh brings a stale session back.
            match self.inner.refresh(&refresh_token).await {
                Ok(_) => self.inner.persist().await,
                Err(AuthError::Timeout) | Err(AuthError::Network(_)) => {
                    // Unreachable is not revoked: start signed out but
                    // leave the file for the next launch to retry.
                    warn!("Could not reach the service to refresh the persisted session");
                    *self.inner.session.lock() = None;
                    return Ok(None);
                }
                Err(err) => {
                    warn!(error = %err, "Persisted session rejected, discarding it");
                    *self.inner.session.lock() = None;
                    self.inner.persist().await;
                    return Ok(None);
                }
            }
        }

        self.schedule_refresh();
        info!(user = %identity.id, "Restored persisted session");
        Ok(Some(identity))
    }

    fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.inner.events.subscribe()
    }
}

#[async_trait]
impl ProfileStore for HttpBackend {
    async fn fetch(&self, id: Uuid) -> Result<Profile, ProfileError> {
        let url = format!(
            "{}/rest/v1/profiles?id=eq.{}&select=*",
            self.inner.base_url, id
        );
        let response = self
            .inner
            .http
            .get(&url)
            .header("apikey", &self.inner.api_key)
            .bearer_auth(self.inner.bearer())
            .header("Accept", PGRST_OBJECT)
            .send()
            .await
            .map_err(profile_transport_error)?;

        read_profile(response).await
    }

    async fn insert(&self, profile: &NewProfile) -> Result<Profile, ProfileError> {
        let url = format!("{}/rest/v1/profiles", self.inner.base_url);
        let response = self
            .inner
            .http
            .post(&url)
            .header("apikey", &self.inner.api_key)
            .bearer_auth(self.inner.bearer())
            .header("Accept", PGRST_OBJECT)
            .header("Prefer", "return=representation")
            .json(profile)
            .send()
            .await
            .map_err(profile_transport_error)?;

        read_profile(response).await
    }
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
    user: ApiUser,
}

#[derive(Debug, Deserialize)]
struct ApiUser {
    id: Uuid,
    #[serde(default)]
    email: Option<String>,
}

impl ApiUser {
    fn into_identity(self) -> Identity {
        Identity {
            id: self.id,
            email: self.email.unwrap_or_default(),
        }
    }
}

/// The union of error body shapes the auth and row APIs produce.
/// Fields the running service version does not send simply stay
/// `None`.
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error_code: Option<String>,
}

impl ErrorBody {
    fn parse(text: &str) -> Self {
        serde_json::from_str(text).unwrap_or_default()
    }

    fn best_message(&self) -> String {
        [&self.error_description, &self.msg, &self.message, &self.error]
            .into_iter()
            .flatten()
            .find(|m| !m.is_empty())
            .cloned()
            .unwrap_or_default()
    }
}

// ---------------------------------------------------------------------------
// Response handling
// ---------------------------------------------------------------------------

async fn read_token(response: reqwest::Response) -> Result<TokenResponse, AuthError> {
    let status = response.status();
    let text = response.text().await.map_err(transport_error)?;
    if !status.is_success() {
        return Err(classify_auth_error(status, &text));
    }
    serde_json::from_str(&text)
        .map_err(|err| AuthError::Other(format!("unexpected token response: {err}")))
}

async fn read_profile(response: reqwest::Response) -> Result<Profile, ProfileError> {
    let status = response.status();
    let text = response
        .text()
        .await
        .map_err(profile_transport_error)?;
    if !status.is_success() {
        return Err(classify_profile_error(status, &text));
    }
    serde_json::from_str(&text)
        .map_err(|err| ProfileError::Unavailable(format!("unexpected profile body: {err}")))
}

fn session_from_token(token: TokenResponse) -> AuthSession {
    let expires_at = token
        .expires_in
        .map(|secs| Utc::now() + chrono::Duration::seconds(secs))
        .or_else(|| jwt_expiry(&token.access_token))
        .unwrap_or_else(|| Utc::now() + chrono::Duration::hours(1));

    AuthSession {
        identity: token.user.into_identity(),
        access_token: token.access_token,
        refresh_token: token.refresh_token,
        expires_at,
    }
}

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

fn transport_error(err: reqwest::Error) -> AuthError {
    if err.is_timeout() {
        AuthError::Timeout
    } else {
        AuthError::Network(err.to_string())
    }
}

fn profile_transport_error(err: reqwest::Error) -> ProfileError {
    ProfileError::Unavailable(err.to_string())
}

/// Fold a non-2xx auth response into an [`AuthError`] kind. Matches on
/// the stable `error_code` where the service sends one and falls back
/// to the documented message strings of older versions.
fn classify_auth_error(status: StatusCode, body: &str) -> AuthError {
    let parsed = ErrorBody::parse(body);
    let message = parsed.best_message();
    let lower = message.to_ascii_lowercase();
    let code = parsed.error_code.as_deref().unwrap_or("");

    if status == StatusCode::TOO_MANY_REQUESTS
        || code == "over_request_rate_limit"
        || lower.contains("rate limit")
        || lower.contains("too many requests")
    {
        return AuthError::RateLimited;
    }
    if code == "invalid_credentials" || lower.contains("invalid login credentials") {
        return AuthError::InvalidCredentials;
    }
    if code == "email_not_confirmed" || lower.contains("email not confirmed") {
        return AuthError::EmailNotConfirmed;
    }
    if code == "user_already_exists"
        || code == "email_exists"
        || lower.contains("already registered")
    {
        return AuthError::AlreadyRegistered;
    }
    if code == "weak_password" || lower.contains("password should be") {
        return AuthError::WeakPassword(message);
    }
    if code == "signup_disabled" || lower.contains("signups not allowed") {
        return AuthError::SignupDisabled;
    }
    if (code == "validation_failed" && lower.contains("email"))
        || lower.contains("unable to validate email")
    {
        return AuthError::InvalidEmail;
    }

    if message.is_empty() {
        AuthError::Other(format!("backend returned status {status}"))
    } else {
        AuthError::Other(message)
    }
}

/// Fold a non-2xx row API response into a [`ProfileError`] kind.
fn classify_profile_error(status: StatusCode, body: &str) -> ProfileError {
    if status == StatusCode::NOT_ACCEPTABLE {
        // Single-object negotiation found no row.
        return ProfileError::NotFound;
    }
    if status == StatusCode::CONFLICT {
        return ProfileError::Conflict;
    }

    let message = ErrorBody::parse(body).best_message();
    // Unique-violation sqlstate, in case a gateway rewrote the status.
    if message.contains("23505") || message.contains("duplicate key") {
        return ProfileError::Conflict;
    }
    if message.is_empty() {
        ProfileError::Unavailable(format!("backend returned status {status}"))
    } else {
        ProfileError::Unavailable(message)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn default_session_path() -> Result<PathBuf, AuthError> {
    let dirs = ProjectDirs::from("network", "ovi", "ovi").ok_or_else(|| {
        AuthError::Other("could not determine application data directory".to_string())
    })?;
    Ok(dirs.data_dir().join("session.json"))
}

/// Pull the `exp` claim out of a JWT without verifying it. The token
/// is otherwise opaque to this client; the claim only schedules the
/// refresh.
fn jwt_expiry(token: &str) -> Option<DateTime<Utc>> {
    let payload = token.split('.').nth(1)?;
    let bytes = URL_SAFE_NO_PAD.decode(payload).ok()?;
    let claims: serde_json::Value = serde_json::from_slice(&bytes).ok()?;
    let exp = claims.get("exp")?.as_i64()?;
    DateTime::from_timestamp(exp, 0)
}
