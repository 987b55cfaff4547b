//! The session view the UI binds to.
//!
//! A [`SessionSnapshot`] is a complete, self-contained description of
//! the auth state at one moment. The manager replaces the whole
//! snapshot on every transition; nothing outside this crate mutates
//! it.

use serde::Serialize;
use uuid::Uuid;

use ovi_shared::{Identity, Profile, SecurityLevel};

/// Coarse session state, derived from a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    /// The startup restore, or a sign-in, is still settling.
    Loading,
    /// Nobody is signed in.
    Anonymous,
    /// Signed in with the profile loaded.
    Authenticated,
    /// Signed in, but the profile could not be loaded; the view is
    /// built from the identity alone.
    Degraded,
}

/// The signed-in member as the UI sees them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionUser {
    pub id: Uuid,
    pub email: String,
    /// Best display name available: profile display name, then
    /// username, then the email local part. Empty strings count as
    /// absent at every step.
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    /// The full profile row, when it loaded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile: Option<Profile>,
}

impl SessionUser {
    /// View for an identity whose profile is in hand.
    pub fn from_profile(identity: &Identity, profile: Profile) -> Self {
        let mut name = profile.preferred_name().to_string();
        if name.is_empty() {
            name = identity.email_local_part().to_string();
        }
        let avatar = profile.avatar_url.clone();
        Self {
            id: identity.id,
            email: identity.email.clone(),
            name,
            avatar,
            profile: Some(profile),
        }
    }

    /// Minimal view built from the identity alone, used when the
    /// profile store is not cooperating: name from the email local
    /// part, no avatar, no profile.
    pub fn from_identity(identity: &Identity) -> Self {
        Self {
            id: identity.id,
            email: identity.email.clone(),
            name: identity.email_local_part().to_string(),
            avatar: None,
            profile: None,
        }
    }

    /// Security tier, `standard` until a profile says otherwise.
    pub fn security_level(&self) -> SecurityLevel {
        self.profile
            .as_ref()
            .map(|p| p.security_level)
            .unwrap_or_default()
    }
}

/// One moment of auth state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<SessionUser>,
    /// True from startup until the restore resolves, and again while a
    /// login or registration settles.
    pub loading: bool,
    /// Diagnostic from the last profile reconciliation that had to
    /// fall back, for optional display. Authentication never waits on
    /// this.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Security tier of the signed-in member, `standard` when unknown.
    pub security_level: SecurityLevel,
}

impl SessionSnapshot {
    /// Startup state: nothing known yet, restore in flight.
    pub fn booting() -> Self {
        Self {
            user: None,
            loading: true,
            error: None,
            security_level: SecurityLevel::default(),
        }
    }

    /// Nobody signed in, everything settled.
    pub fn anonymous() -> Self {
        Self {
            user: None,
            loading: false,
            error: None,
            security_level: SecurityLevel::default(),
        }
    }

    /// Signed-in view, optionally carrying a reconciliation
    /// diagnostic.
    pub fn authenticated(user: SessionUser, error: Option<String>) -> Self {
        let security_level = user.security_level();
        Self {
            user: Some(user),
            loading: false,
            error,
            security_level,
        }
    }

    pub fn status(&self) -> SessionStatus {
        if self.loading {
            return SessionStatus::Loading;
        }
        match &self.user {
            None => SessionStatus::Anonymous,
            Some(user) if user.profile.is_some() => SessionStatus::Authenticated,
            Some(_) => SessionStatus::Degraded,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.user.is_some()
    }
}
