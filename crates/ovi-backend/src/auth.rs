//! The identity side of the backend boundary.
//!
//! [`IdentityBackend`] is the only way the client core talks about
//! authentication. Implementations own "who is signed in": they do the
//! credential round-trips, hold whatever token state they need, and
//! publish an [`AuthEvent`] whenever the authenticated identity
//! changes. The session manager subscribes to that stream and folds it
//! into its own view; it never polls the backend.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use ovi_shared::Identity;

use crate::error::AuthError;

// ---------------------------------------------------------------------------
// Sessions
// ---------------------------------------------------------------------------

/// An authenticated session as the backend reports it.
///
/// Serializable so implementations can persist it across restarts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthSession {
    pub identity: Identity,
    /// Bearer token sent with authorized calls.
    pub access_token: String,
    /// Token used to mint a fresh access token when this one runs out.
    pub refresh_token: String,
    /// When the access token stops working.
    pub expires_at: DateTime<Utc>,
}

/// Optional fields sent along with sign-up. The backend stores them as
/// user metadata; the client also mirrors them into the new profile.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SignUpMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

impl SignUpMetadata {
    /// Metadata where both name fields carry the single name the user
    /// typed into the registration form.
    pub fn from_name(name: &str) -> Self {
        Self {
            full_name: Some(name.to_string()),
            display_name: Some(name.to_string()),
        }
    }
}

/// What came back from a sign-up call.
///
/// `session` is `None` when the backend created the account but wants
/// the email confirmed before it will issue tokens.
#[derive(Debug, Clone)]
pub struct SignUpOutcome {
    pub identity: Identity,
    pub session: Option<AuthSession>,
}

impl SignUpOutcome {
    /// True when the account cannot be used until the confirmation
    /// link in the welcome email is clicked.
    pub fn requires_confirmation(&self) -> bool {
        self.session.is_none()
    }
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// Published on the backend's event stream whenever the authenticated
/// identity changes.
#[derive(Debug, Clone)]
pub enum AuthEvent {
    /// A session became active: sign-in, or a sign-up that was issued
    /// tokens immediately.
    SignedIn { identity: Identity },
    /// The session ended, either by explicit sign-out or because a
    /// token refresh was rejected.
    SignedOut,
    /// The access token was renewed in the background. The identity is
    /// unchanged but re-announced so subscribers can resync.
    TokenRefreshed { identity: Identity },
}

// ---------------------------------------------------------------------------
// The boundary trait
// ---------------------------------------------------------------------------

/// Authentication operations against an identity provider.
#[async_trait]
pub trait IdentityBackend: Send + Sync {
    /// Exchange credentials for a session. Emits
    /// [`AuthEvent::SignedIn`] on success.
    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthSession, AuthError>;

    /// Create an account. When the backend hands back a session the
    /// account is usable immediately and `SignedIn` is emitted;
    /// otherwise the caller should tell the user to check their inbox.
    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        metadata: SignUpMetadata,
    ) -> Result<SignUpOutcome, AuthError>;

    /// End the current session. Emits [`AuthEvent::SignedOut`] on
    /// success. A failure leaves the session in place.
    async fn sign_out(&self) -> Result<(), AuthError>;

    /// Recover a previously persisted session, if one exists and is
    /// still usable. Called once at startup, before the event stream
    /// is consumed; it does not emit events because the caller already
    /// holds the returned identity.
    async fn restore(&self) -> Result<Option<Identity>, AuthError>;

    /// Subscribe to identity changes.
    fn subscribe(&self) -> broadcast::Receiver<AuthEvent>;
}
