//! Shared domain types for the Ovi Network client core.
//!
//! Everything here crosses crate boundaries: the backend adapters
//! produce these types, the session layer merges them, and the
//! embedding layer serializes them to whatever renders the UI.

pub mod identity;
pub mod profile;

pub use identity::Identity;
pub use profile::{sanitize_username, NewProfile, Profile, SecurityLevel};
