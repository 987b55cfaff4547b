//! Typed errors for the backend boundary.
//!
//! Classification happens exactly once, in the adapters that talk to
//! the hosted service. HTTP statuses, error bodies and transport
//! failures are folded into these kinds there, so everything above the
//! boundary matches on variants instead of re-parsing message strings.

use thiserror::Error;

/// Errors from identity operations (sign-in, sign-up, sign-out,
/// session restore, token refresh).
#[derive(Debug, Clone, Error)]
pub enum AuthError {
    /// The email/password pair was rejected.
    #[error("invalid login credentials")]
    InvalidCredentials,

    /// The account exists but its email was never confirmed.
    #[error("email not confirmed")]
    EmailNotConfirmed,

    /// The backend rate-limited the request.
    #[error("too many requests")]
    RateLimited,

    /// Sign-up with an email that already has an account.
    #[error("email already registered")]
    AlreadyRegistered,

    /// Sign-up password rejected by the backend's password policy. The
    /// payload is the backend's own description of the requirement.
    #[error("weak password: {0}")]
    WeakPassword(String),

    /// The backend has sign-ups turned off.
    #[error("signups are disabled")]
    SignupDisabled,

    /// The backend could not parse the email address.
    #[error("invalid email address")]
    InvalidEmail,

    /// The backend could not be reached.
    #[error("network error: {0}")]
    Network(String),

    /// The request ran past the configured timeout.
    #[error("request timed out")]
    Timeout,

    /// Anything the classifier does not recognize. Carries the raw
    /// backend message so it is not lost.
    #[error("{0}")]
    Other(String),
}

/// Errors from the profile row store.
///
/// `NotFound` and `Conflict` are the two outcomes the reconciliation
/// path branches on; everything else lands in `Unavailable`.
#[derive(Debug, Clone, Error)]
pub enum ProfileError {
    /// No row exists for the requested id.
    #[error("profile not found")]
    NotFound,

    /// Insert collided with an existing row for the same id.
    #[error("profile already exists")]
    Conflict,

    /// The store could not serve the request (transport failure,
    /// permissions, malformed payload).
    #[error("profile store unavailable: {0}")]
    Unavailable(String),
}
