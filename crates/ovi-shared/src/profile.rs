//! Application-owned creator profile records.
//!
//! A [`Profile`] is keyed 1:1 by identity id and holds what Ovi knows
//! about a member beyond their account: naming, bio, avatar, security
//! tier, and the public counters shown on profile pages. Field names
//! match the backend's `profiles` row shape so records serialize
//! straight into REST bodies.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::identity::Identity;

/// Account security tier, as selected in the settings modal.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SecurityLevel {
    /// Password-only. The default for every new account.
    #[default]
    Standard,
    Biometric,
    Neural,
    Quantum,
}

/// A member's profile row.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Profile {
    /// Identity id this profile belongs to (primary key, exactly one
    /// profile per identity).
    pub id: Uuid,
    /// Unique handle. Derived from the email local part on first login.
    pub username: String,
    /// Human-readable name shown instead of the username when set.
    pub display_name: Option<String>,
    /// Free-form text shown on the profile page.
    pub bio: Option<String>,
    /// Reference to the avatar image, if one was uploaded.
    pub avatar_url: Option<String>,
    /// Security tier of the account.
    pub security_level: SecurityLevel,
    /// Whether the account passed creator verification.
    pub verified: bool,
    /// Published track count. Only ever grows.
    pub tracks_count: u64,
    /// Follower count. Only ever grows.
    pub followers_count: u64,
    /// Followed-accounts count. Only ever grows.
    pub following_count: u64,
    /// When the row was created (backend-assigned).
    pub created_at: DateTime<Utc>,
    /// When the row was last modified (backend-assigned).
    pub updated_at: DateTime<Utc>,
}

impl Profile {
    /// The name the UI should show for this profile: the display name
    /// when set and non-empty, otherwise the username.
    pub fn preferred_name(&self) -> &str {
        self.display_name
            .as_deref()
            .filter(|n| !n.is_empty())
            .unwrap_or(&self.username)
    }
}

/// Insert payload for a new profile row.
///
/// Timestamps are absent: the backend assigns `created_at`/`updated_at`
/// when the row lands.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewProfile {
    pub id: Uuid,
    pub username: String,
    pub display_name: Option<String>,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
    pub security_level: SecurityLevel,
    pub verified: bool,
    pub tracks_count: u64,
    pub followers_count: u64,
    pub following_count: u64,
}

impl NewProfile {
    /// Default profile for a freshly authenticated identity that has no
    /// row yet. Everything derives from the email.
    pub fn for_identity(identity: &Identity) -> Self {
        let local = identity.email_local_part();
        Self {
            id: identity.id,
            username: sanitize_username(local),
            display_name: Some(local.to_string()),
            bio: None,
            avatar_url: None,
            security_level: SecurityLevel::default(),
            verified: false,
            tracks_count: 0,
            followers_count: 0,
            following_count: 0,
        }
    }
}

/// Reduce an arbitrary string to a username-safe handle: lowercase ASCII
/// alphanumerics plus `_`, `.` and `-`; everything else is dropped.
/// Falls back to `"member"` when nothing survives.
pub fn sanitize_username(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
        .map(|c| c.to_ascii_lowercase())
        .collect();

    if cleaned.is_empty() {
        "member".to_string()
    } else {
        cleaned
    }
}
