//! User-facing session errors.
//!
//! The `Display` text of each variant is the exact copy the UI shows,
//! so the whole message catalog lives in one place. Two variants show
//! backend text as-is: password-policy feedback, which the backend
//! already writes for people, and unclassified errors, whose raw
//! message is better than a vague stand-in. Transport detail stays in
//! payloads for logging and never reaches the user.

use ovi_backend::AuthError;
use thiserror::Error;

pub type Result<T, E = SessionError> = std::result::Result<T, E>;

/// What `login`, `register` and `logout` hand back on failure. Always
/// returned, never panicked.
#[derive(Debug, Clone, Error)]
pub enum SessionError {
    #[error("Invalid email or password. Please check your credentials.")]
    InvalidCredentials,

    #[error("Please confirm your email address before logging in.")]
    EmailNotConfirmed,

    #[error("Too many attempts. Please wait a moment and try again.")]
    RateLimited,

    #[error("An account with this email already exists.")]
    AlreadyRegistered,

    /// The payload is the backend's own description of its password
    /// policy.
    #[error("{0}")]
    WeakPassword(String),

    #[error("Registration is currently disabled. Please try again later.")]
    SignupDisabled,

    #[error("Please enter a valid email address.")]
    InvalidEmail,

    #[error("Could not reach Ovi. Please check your connection and try again.")]
    Network(String),

    #[error("The request timed out. Please try again.")]
    Timeout,

    /// Nothing recognized this one; the raw backend message passes
    /// through unchanged.
    #[error("{0}")]
    Other(String),
}

impl SessionError {
    /// Raw backend detail, when any was captured. For logs, not users.
    pub fn detail(&self) -> Option<&str> {
        match self {
            Self::WeakPassword(detail) | Self::Network(detail) | Self::Other(detail) => {
                Some(detail)
            }
            _ => None,
        }
    }
}

impl From<AuthError> for SessionError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidCredentials => Self::InvalidCredentials,
            AuthError::EmailNotConfirmed => Self::EmailNotConfirmed,
            AuthError::RateLimited => Self::RateLimited,
            AuthError::AlreadyRegistered => Self::AlreadyRegistered,
            AuthError::WeakPassword(detail) => Self::WeakPassword(detail),
            AuthError::SignupDisabled => Self::SignupDisabled,
            AuthError::InvalidEmail => Self::InvalidEmail,
            AuthError::Network(detail) => Self::Network(detail),
            AuthError::Timeout => Self::Timeout,
            AuthError::Other(detail) => Self::Other(detail),
        }
    }
}
