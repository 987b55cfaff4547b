//! Backend boundary for the Ovi client core.
//!
//! Everything the application knows about the hosted service goes
//! through two traits: [`IdentityBackend`] for authentication and
//! [`ProfileStore`] for profile rows. [`http::HttpBackend`] implements
//! both against the real REST API; [`memory::MemoryBackend`] and
//! [`memory::MemoryProfiles`] are the in-process doubles used by tests
//! and the demo.

pub mod auth;
pub mod error;
pub mod http;
pub mod memory;
pub mod profiles;

pub use auth::{AuthEvent, AuthSession, IdentityBackend, SignUpMetadata, SignUpOutcome};
pub use error::{AuthError, ProfileError};
pub use http::{HttpBackend, HttpConfig};
pub use memory::{MemoryBackend, MemoryProfiles};
pub use profiles::ProfileStore;
