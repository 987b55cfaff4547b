//! Session lifecycle for Ovi applications.
//!
//! [`SessionManager`] sits between an identity backend and the UI: it
//! restores persisted sessions at startup, runs login/register/logout,
//! reconciles the signed-in user's profile row (creating it on first
//! sign-in), and publishes the result as a [`SessionSnapshot`] through
//! a watch channel. All failures surface as [`SessionError`], whose
//! `Display` text is written for end users.

pub mod error;
pub mod manager;
pub mod view;

pub use error::{Result, SessionError};
pub use manager::{Registration, SessionManager};
pub use view::{SessionSnapshot, SessionStatus, SessionUser};
