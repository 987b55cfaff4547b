//! Application-facing facade over the Ovi session and notification
//! stacks.
//!
//! [`OviClient`] wires a [`SessionManager`] to a [`NotificationQueue`]
//! so the common auth flows come with user feedback attached: a
//! loading toast while the call runs, then a success or error toast
//! built from the outcome. UIs subscribe to both watch channels and
//! render whatever arrives; nothing here blocks on rendering.

pub mod config;

use std::sync::Arc;

use tracing_subscriber::{fmt, EnvFilter};

use ovi_backend::{AuthError, HttpBackend, IdentityBackend, ProfileStore};
use ovi_notify::{NotificationQueue, ToastKind, ToastRequest};
use ovi_session::{Registration, Result, SessionManager};
use ovi_shared::Identity;

pub use crate::config::ClientConfig;

/// Install the tracing subscriber. Respects `RUST_LOG`; falls back to
/// a debug view of the Ovi crates.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("ovi_client=debug,ovi_session=debug,ovi_backend=debug,ovi_notify=info,warn")
    });

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}

/// One client = one session manager + one notification queue.
///
/// Both halves are independently usable; the methods here are the
/// flows where they belong together.
pub struct OviClient {
    pub session: SessionManager,
    pub notifications: NotificationQueue,
}

impl OviClient {
    /// Wire a client over any backend pair. The session restore starts
    /// immediately in the background.
    pub fn new(backend: Arc<dyn IdentityBackend>, profiles: Arc<dyn ProfileStore>) -> Self {
        Self {
            session: SessionManager::start(backend, profiles),
            notifications: NotificationQueue::new(),
        }
    }

    /// Connect to a hosted backend described by `config`. One
    /// `HttpBackend` serves as both the identity backend and the
    /// profile store.
    pub fn connect(config: &ClientConfig) -> Result<Self, AuthError> {
        let backend = Arc::new(HttpBackend::new(config.http_config())?);
        let profiles: Arc<dyn ProfileStore> = backend.clone();
        Ok(Self::new(backend, profiles))
    }

    /// Sign in, with toast feedback: a loading toast while the call
    /// runs, then a welcome or error toast.
    pub async fn login(&self, email: &str, password: &str) -> Result<Identity> {
        self.notifications
            .track(
                "Signing in...",
                self.session.login(email, password),
                |identity| format!("Welcome back, {}!", identity.email_local_part()),
                |err| err.to_string(),
            )
            .await
    }

    /// Create an account, with toast feedback. Confirmation-pending is
    /// a success here too: it gets a persistent "check your inbox"
    /// toast instead of a welcome.
    pub async fn register(&self, email: &str, password: &str, name: &str) -> Result<Registration> {
        let loading = self.notifications.loading("Creating your account...");
        let result = self.session.register(email, password, name).await;
        self.notifications.dismiss(loading);

        match &result {
            Ok(Registration::ConfirmationPending(identity)) => {
                self.notifications.push(
                    ToastRequest::new(format!(
                        "We sent a confirmation link to {}.",
                        identity.email
                    ))
                    .kind(ToastKind::Info)
                    .title("Check your inbox")
                    .persistent(),
                );
            }
            Ok(Registration::Active(_)) => {
                self.notifications.success("Account created. Welcome to Ovi!");
            }
            Err(err) => {
                self.notifications.error(err.to_string());
            }
        }

        result
    }

    /// Sign out, with toast feedback. On failure the error toast
    /// carries a retry action the UI can dispatch back to us.
    pub async fn logout(&self) -> Result<()> {
        match self.session.logout().await {
            Ok(()) => {
                self.notifications.info("Signed out.");
                Ok(())
            }
            Err(err) => {
                self.notifications.push(
                    ToastRequest::new(err.to_string())
                        .kind(ToastKind::Error)
                        .action("Retry", "session.logout"),
                );
                Err(err)
            }
        }
    }
}
