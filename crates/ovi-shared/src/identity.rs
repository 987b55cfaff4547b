use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A backend-issued account record: "who is logged in".
///
/// Identities are created and owned entirely by the identity backend.
/// The client core only ever reads them; everything Ovi itself knows
/// about a member lives in [`crate::Profile`], keyed by this id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Identity {
    /// Backend-assigned account id.
    pub id: Uuid,
    /// Email address the account was registered with.
    pub email: String,
}

impl Identity {
    /// The part of the email before the `@`.
    ///
    /// Used wherever a member has no profile data yet: default usernames,
    /// fallback display names.
    pub fn email_local_part(&self) -> &str {
        self.email.split('@').next().unwrap_or("")
    }
}
