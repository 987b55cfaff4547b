//! The session manager.
//!
//! One [`SessionManager`] per application. It owns the session
//! snapshot, serializes the login/register/logout operations, and
//! keeps the snapshot reconciled with the identity backend's event
//! stream.
//!
//! Population is deliberately two-step: `login` only performs the
//! credential exchange, and the signed-in view is built by the
//! reconciliation path when the backend announces the new identity.
//! The backend owns "who is authenticated"; this manager owns "what
//! application data describes them."

use std::sync::Arc;

use tokio::sync::{broadcast, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use ovi_backend::{
    AuthEvent, IdentityBackend, ProfileError, ProfileStore, SignUpMetadata,
};
use ovi_shared::{Identity, NewProfile};

use crate::error::{Result, SessionError};
use crate::view::{SessionSnapshot, SessionUser};

/// Success shape of [`SessionManager::register`].
#[derive(Debug, Clone)]
pub enum Registration {
    /// Tokens were issued; the session is live.
    Active(Identity),
    /// The account exists but its email must be confirmed before the
    /// first sign-in. Callers branch into a "check your inbox" state,
    /// not a failure state.
    ConfirmationPending(Identity),
}

impl Registration {
    pub fn requires_confirmation(&self) -> bool {
        matches!(self, Self::ConfirmationPending(_))
    }

    pub fn identity(&self) -> &Identity {
        match self {
            Self::Active(identity) | Self::ConfirmationPending(identity) => identity,
        }
    }
}

/// Owns the session snapshot and the reconciliation loop.
pub struct SessionManager {
    shared: Arc<SessionShared>,
    /// Serializes login/register/logout so overlapping calls cannot
    /// interleave their snapshot transitions.
    op_lock: Mutex<()>,
    listener: JoinHandle<()>,
}

struct SessionShared {
    backend: Arc<dyn IdentityBackend>,
    profiles: Arc<dyn ProfileStore>,
    snapshot: watch::Sender<SessionSnapshot>,
}

impl SessionManager {
    /// Start the manager: subscribe to the backend, attempt a session
    /// restore, then keep reconciling events until dropped. The
    /// snapshot starts in the loading state.
    pub fn start(backend: Arc<dyn IdentityBackend>, profiles: Arc<dyn ProfileStore>) -> Self {
        let (snapshot, _) = watch::channel(SessionSnapshot::booting());
        let shared = Arc::new(SessionShared {
            backend,
            profiles,
            snapshot,
        });

        let listener = tokio::spawn({
            let shared = Arc::clone(&shared);
            async move { shared.run().await }
        });

        Self {
            shared,
            op_lock: Mutex::new(()),
            listener,
        }
    }

    /// Watch the session snapshot. The receiver always holds the
    /// current value.
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.shared.snapshot.subscribe()
    }

    /// The snapshot right now.
    pub fn snapshot(&self) -> SessionSnapshot {
        self.shared.snapshot.borrow().clone()
    }

    /// Stop reconciling backend events. The snapshot freezes at its
    /// current value; also happens on drop.
    pub fn shutdown(&self) {
        self.listener.abort();
    }

    /// Sign in with credentials.
    ///
    /// On success the returned identity is authoritative, but the
    /// snapshot's user arrives through reconciliation moments later;
    /// the snapshot stays `loading` until that lands. On failure the
    /// snapshot settles immediately and the error's `Display` text is
    /// ready for the user.
    pub async fn login(&self, email: &str, password: &str) -> Result<Identity> {
        let _guard = self.op_lock.lock().await;
        self.shared.set_loading();

        match self.shared.backend.sign_in(email, password).await {
            Ok(session) => {
                info!(user = %session.identity.id, "Login accepted");
                Ok(session.identity)
            }
            Err(err) => {
                let err = SessionError::from(err);
                warn!(error = %err, detail = ?err.detail(), "Login failed");
                self.shared.clear_loading();
                Err(err)
            }
        }
    }

    /// Create an account. `name` seeds the backend's user metadata;
    /// the profile row still derives from the email on first
    /// reconciliation.
    pub async fn register(&self, email: &str, password: &str, name: &str) -> Result<Registration> {
        let _guard = self.op_lock.lock().await;
        self.shared.set_loading();

        let metadata = SignUpMetadata::from_name(name);
        match self.shared.backend.sign_up(email, password, metadata).await {
            Ok(outcome) if outcome.requires_confirmation() => {
                info!(user = %outcome.identity.id, "Registered, confirmation pending");
                // No session was issued, so no event will land; settle
                // the snapshot here.
                self.shared.clear_loading();
                Ok(Registration::ConfirmationPending(outcome.identity))
            }
            Ok(outcome) => {
                info!(user = %outcome.identity.id, "Registered");
                Ok(Registration::Active(outcome.identity))
            }
            Err(err) => {
                let err = SessionError::from(err);
                warn!(error = %err, detail = ?err.detail(), "Registration failed");
                self.shared.clear_loading();
                Err(err)
            }
        }
    }

    /// Sign out. On success the snapshot is cleared synchronously,
    /// before this returns; on failure it is left as it was and the
    /// error is surfaced.
    pub async fn logout(&self) -> Result<()> {
        let _guard = self.op_lock.lock().await;
        self.shared.set_loading();

        match self.shared.backend.sign_out().await {
            Ok(()) => {
                info!("Logged out");
                self.shared
                    .snapshot
                    .send_replace(SessionSnapshot::anonymous());
                Ok(())
            }
            Err(err) => {
                let err = SessionError::from(err);
                warn!(error = %err, "Logout failed");
                self.shared.clear_loading();
                Err(err)
            }
        }
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        self.listener.abort();
    }
}

impl SessionShared {
    async fn run(&self) {
        // Subscribe before restoring so no event can fall in between.
        let mut events = self.backend.subscribe();

        match self.backend.restore().await {
            Ok(Some(identity)) => {
                debug!(user = %identity.id, "Reconciling restored session");
                self.reconcile(Some(&identity)).await;
            }
            Ok(None) => self.reconcile(None).await,
            Err(err) => {
                warn!(error = %err, "Session restore failed");
                self.reconcile(None).await;
            }
        }

        loop {
            match events.recv().await {
                Ok(AuthEvent::SignedIn { identity })
                | Ok(AuthEvent::TokenRefreshed { identity }) => {
                    self.reconcile(Some(&identity)).await;
                }
                Ok(AuthEvent::SignedOut) => self.reconcile(None).await,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Auth event stream lagged");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("Auth event stream closed");
                    return;
                }
            }
        }
    }

    /// Fold one observed identity state into a fresh snapshot.
    async fn reconcile(&self, identity: Option<&Identity>) {
        let next = match identity {
            None => SessionSnapshot::anonymous(),
            Some(identity) => self.resolve_user(identity).await,
        };
        self.snapshot.send_replace(next);
    }

    /// Build the signed-in view: profile fetch, lazy creation with the
    /// conflict re-fetch, and the identity-only fallback when the
    /// store is not cooperating. Always lands on a settled snapshot.
    async fn resolve_user(&self, identity: &Identity) -> SessionSnapshot {
        match self.profiles.fetch(identity.id).await {
            Ok(profile) => {
                SessionSnapshot::authenticated(SessionUser::from_profile(identity, profile), None)
            }
            Err(ProfileError::NotFound) => {
                debug!(user = %identity.id, "No profile yet, creating one");
                let new_profile = NewProfile::for_identity(identity);
                match self.profiles.insert(&new_profile).await {
                    Ok(profile) => SessionSnapshot::authenticated(
                        SessionUser::from_profile(identity, profile),
                        None,
                    ),
                    Err(ProfileError::Conflict) => {
                        // Another writer won the creation race; their
                        // row is the real one.
                        debug!(user = %identity.id, "Profile insert collided, re-fetching");
                        match self.profiles.fetch(identity.id).await {
                            Ok(profile) => SessionSnapshot::authenticated(
                                SessionUser::from_profile(identity, profile),
                                None,
                            ),
                            Err(err) => {
                                warn!(
                                    user = %identity.id,
                                    error = %err,
                                    "Re-fetch after insert conflict failed"
                                );
                                SessionSnapshot::authenticated(
                                    SessionUser::from_identity(identity),
                                    Some(err.to_string()),
                                )
                            }
                        }
                    }
                    Err(err) => {
                        warn!(user = %identity.id, error = %err, "Profile insert failed");
                        SessionSnapshot::authenticated(SessionUser::from_identity(identity), None)
                    }
                }
            }
            Err(err) => {
                warn!(user = %identity.id, error = %err, "Profile fetch failed");
                SessionSnapshot::authenticated(
                    SessionUser::from_identity(identity),
                    Some(err.to_string()),
                )
            }
        }
    }

    fn set_loading(&self) {
        self.snapshot.send_modify(|s| {
            s.loading = true;
            s.error = None;
        });
    }

    fn clear_loading(&self) {
        self.snapshot.send_modify(|s| s.loading = false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use ovi_backend::{AuthError, MemoryBackend, MemoryProfiles, ProfileError};
    use ovi_shared::SecurityLevel;

    use crate::view::SessionStatus;

    async fn wait_for<F>(
        rx: &mut watch::Receiver<SessionSnapshot>,
        predicate: F,
    ) -> SessionSnapshot
    where
        F: Fn(&SessionSnapshot) -> bool,
    {
        tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                {
                    let current = rx.borrow_and_update();
                    if predicate(&current) {
                        return current.clone();
                    }
                }
                rx.changed().await.unwrap();
            }
        })
        .await
        .expect("session never reached the expected state")
    }

    fn fresh() -> (Arc<MemoryBackend>, Arc<MemoryProfiles>, SessionManager) {
        let backend = Arc::new(MemoryBackend::new());
        let profiles = Arc::new(MemoryProfiles::new());
        let manager = SessionManager::start(backend.clone(), profiles.clone());
        (backend, profiles, manager)
    }

    #[tokio::test]
    async fn test_starts_loading_then_settles_anonymous() {
        let (_backend, _profiles, manager) = fresh();

        // The listener has not had a chance to run yet.
        assert!(manager.snapshot().loading);
        assert_eq!(manager.snapshot().status(), SessionStatus::Loading);

        let mut rx = manager.subscribe();
        let settled = wait_for(&mut rx, |s| !s.loading).await;
        assert_eq!(settled.status(), SessionStatus::Anonymous);
        assert!(settled.user.is_none());
    }

    #[tokio::test]
    async fn test_restore_reconciles_and_creates_missing_profile() {
        let backend = Arc::new(MemoryBackend::new());
        let profiles = Arc::new(MemoryProfiles::new());
        let identity = backend.seed_session("vera@ovi.network", "correct-horse");

        let manager = SessionManager::start(backend.clone(), profiles.clone());
        let mut rx = manager.subscribe();
        let snapshot = wait_for(&mut rx, |s| s.is_authenticated()).await;

        let user = snapshot.user.unwrap();
        assert_eq!(user.id, identity.id);
        assert_eq!(user.name, "vera");
        assert!(user.profile.is_some());
        assert_eq!(profiles.len(), 1);
        assert_eq!(profiles.insert_count(), 1);
    }

    #[tokio::test]
    async fn test_login_populates_through_reconciliation() {
        let (backend, profiles, manager) = fresh();
        backend.seed_account("vera@ovi.network", "correct-horse");

        let mut rx = manager.subscribe();
        wait_for(&mut rx, |s| !s.loading).await;

        let identity = manager
            .login("vera@ovi.network", "correct-horse")
            .await
            .unwrap();

        let snapshot = wait_for(&mut rx, |s| s.is_authenticated()).await;
        assert_eq!(snapshot.status(), SessionStatus::Authenticated);
        assert_eq!(snapshot.user.as_ref().unwrap().id, identity.id);
        assert_eq!(profiles.len(), 1);
    }

    #[tokio::test]
    async fn test_login_failure_returns_catalog_message() {
        let (backend, _profiles, manager) = fresh();
        backend.seed_account("vera@ovi.network", "correct-horse");

        let mut rx = manager.subscribe();
        wait_for(&mut rx, |s| !s.loading).await;

        let err = manager
            .login("vera@ovi.network", "short")
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid email or password. Please check your credentials."
        );

        // The failed call settles the snapshot rather than leaving it
        // spinning.
        let snapshot = manager.snapshot();
        assert!(!snapshot.loading);
        assert!(snapshot.user.is_none());
    }

    #[tokio::test]
    async fn test_register_confirmation_pending_is_a_success() {
        let backend = Arc::new(MemoryBackend::with_confirmation_required());
        let profiles = Arc::new(MemoryProfiles::new());
        let manager = SessionManager::start(backend.clone(), profiles.clone());
        let mut rx = manager.subscribe();
        wait_for(&mut rx, |s| !s.loading).await;

        let registration = manager
            .register("new@ovi.network", "hunter22", "New Member")
            .await
            .unwrap();

        assert!(registration.requires_confirmation());
        assert_eq!(registration.identity().email, "new@ovi.network");

        // Nothing signed in, nothing left loading, no profile yet.
        let snapshot = manager.snapshot();
        assert!(!snapshot.loading);
        assert!(snapshot.user.is_none());
        assert_eq!(profiles.len(), 0);
    }

    #[tokio::test]
    async fn test_register_with_immediate_session_authenticates() {
        let (_backend, profiles, manager) = fresh();
        let mut rx = manager.subscribe();
        wait_for(&mut rx, |s| !s.loading).await;

        let registration = manager
            .register("fresh@ovi.network", "hunter22", "Fresh")
            .await
            .unwrap();
        assert!(!registration.requires_confirmation());

        let snapshot = wait_for(&mut rx, |s| s.is_authenticated()).await;
        assert_eq!(snapshot.user.as_ref().unwrap().name, "fresh");
        assert_eq!(profiles.len(), 1);
    }

    #[tokio::test]
    async fn test_register_failure_maps_errors() {
        let (backend, _profiles, manager) = fresh();
        backend.seed_account("taken@ovi.network", "correct-horse");
        let mut rx = manager.subscribe();
        wait_for(&mut rx, |s| !s.loading).await;

        let err = manager
            .register("taken@ovi.network", "hunter22", "Taken")
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "An account with this email already exists."
        );

        let err = manager
            .register("ok@ovi.network", "abc", "Ok")
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::WeakPassword(_)));
    }

    #[tokio::test]
    async fn test_logout_clears_synchronously() {
        let backend = Arc::new(MemoryBackend::new());
        let profiles = Arc::new(MemoryProfiles::new());
        backend.seed_session("vera@ovi.network", "correct-horse");
        let manager = SessionManager::start(backend.clone(), profiles.clone());
        let mut rx = manager.subscribe();
        wait_for(&mut rx, |s| s.is_authenticated()).await;

        manager.logout().await.unwrap();

        // No waiting: the snapshot is already anonymous.
        let snapshot = manager.snapshot();
        assert!(snapshot.user.is_none());
        assert!(!snapshot.loading);
        assert_eq!(snapshot.status(), SessionStatus::Anonymous);
        assert_eq!(snapshot.security_level, SecurityLevel::Standard);
    }

    #[tokio::test]
    async fn test_logout_failure_leaves_session_in_place() {
        let backend = Arc::new(MemoryBackend::new());
        let profiles = Arc::new(MemoryProfiles::new());
        backend.seed_session("vera@ovi.network", "correct-horse");
        let manager = SessionManager::start(backend.clone(), profiles.clone());
        let mut rx = manager.subscribe();
        wait_for(&mut rx, |s| s.is_authenticated()).await;

        backend.fail_next_sign_out(AuthError::Timeout);
        let err = manager.logout().await.unwrap_err();
        assert_eq!(err.to_string(), "The request timed out. Please try again.");

        let snapshot = wait_for(&mut rx, |s| !s.loading).await;
        assert!(snapshot.is_authenticated());
    }

    #[tokio::test]
    async fn test_backend_sign_out_signal_clears_session() {
        let backend = Arc::new(MemoryBackend::new());
        let profiles = Arc::new(MemoryProfiles::new());
        backend.seed_session("vera@ovi.network", "correct-horse");
        let manager = SessionManager::start(backend.clone(), profiles.clone());
        let mut rx = manager.subscribe();
        wait_for(&mut rx, |s| s.is_authenticated()).await;

        // Sign-out happens behind the manager's back, like an expired
        // refresh token would.
        backend.sign_out().await.unwrap();

        let snapshot = wait_for(&mut rx, |s| !s.is_authenticated()).await;
        assert_eq!(snapshot.status(), SessionStatus::Anonymous);
    }

    #[tokio::test]
    async fn test_insert_race_resolves_to_single_profile() {
        let backend = Arc::new(MemoryBackend::new());
        let profiles = Arc::new(MemoryProfiles::new());
        let identity = backend.seed_session("vera@ovi.network", "correct-horse");

        // Another device already created the row, but this device's
        // first look still reports a miss, so it walks straight into
        // the insert conflict.
        profiles
            .insert(&NewProfile::for_identity(&identity))
            .await
            .unwrap();
        profiles.pretend_missing(1);

        let manager = SessionManager::start(backend.clone(), profiles.clone());
        let mut rx = manager.subscribe();
        let snapshot = wait_for(&mut rx, |s| s.is_authenticated()).await;

        // The conflict resolved by re-fetching, not by erroring out.
        assert_eq!(snapshot.status(), SessionStatus::Authenticated);
        assert!(snapshot.error.is_none());
        assert_eq!(profiles.len(), 1);
        // fetch(miss), insert(conflict), fetch(hit)
        assert_eq!(profiles.fetch_count(), 2);
        assert_eq!(profiles.insert_count(), 2);
    }

    #[tokio::test]
    async fn test_fetch_error_degrades_with_diagnostic() {
        let backend = Arc::new(MemoryBackend::new());
        let profiles = Arc::new(MemoryProfiles::new());
        backend.seed_session("vera@ovi.network", "correct-horse");
        profiles.fail_next_fetch(ProfileError::Unavailable("store down".to_string()));

        let manager = SessionManager::start(backend.clone(), profiles.clone());
        let mut rx = manager.subscribe();
        let snapshot = wait_for(&mut rx, |s| s.is_authenticated()).await;

        assert_eq!(snapshot.status(), SessionStatus::Degraded);
        let user = snapshot.user.as_ref().unwrap();
        assert_eq!(user.name, "vera");
        assert!(user.profile.is_none());
        assert!(user.avatar.is_none());
        assert!(snapshot.error.as_deref().unwrap().contains("store down"));
    }

    #[tokio::test]
    async fn test_insert_error_degrades_without_diagnostic() {
        let backend = Arc::new(MemoryBackend::new());
        let profiles = Arc::new(MemoryProfiles::new());
        backend.seed_session("vera@ovi.network", "correct-horse");
        profiles.fail_next_insert(ProfileError::Unavailable("writes paused".to_string()));

        let manager = SessionManager::start(backend.clone(), profiles.clone());
        let mut rx = manager.subscribe();
        let snapshot = wait_for(&mut rx, |s| s.is_authenticated()).await;

        assert_eq!(snapshot.status(), SessionStatus::Degraded);
        assert!(snapshot.error.is_none());
        assert_eq!(profiles.len(), 0);
    }

    #[tokio::test]
    async fn test_shutdown_stops_reconciliation() {
        let (backend, _profiles, manager) = fresh();
        backend.seed_account("vera@ovi.network", "correct-horse");
        let mut rx = manager.subscribe();
        wait_for(&mut rx, |s| !s.loading).await;

        manager.shutdown();

        // The backend signs someone in, but nobody is listening.
        backend
            .sign_in("vera@ovi.network", "correct-horse")
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(manager.snapshot().user.is_none());
    }

    #[tokio::test]
    async fn test_overlapping_logins_serialize_cleanly() {
        let backend = Arc::new(MemoryBackend::new());
        let profiles = Arc::new(MemoryProfiles::new());
        backend.seed_account("vera@ovi.network", "correct-horse");
        let manager = Arc::new(SessionManager::start(backend.clone(), profiles.clone()));
        let mut rx = manager.subscribe();
        wait_for(&mut rx, |s| !s.loading).await;

        // A double-click submits twice.
        let first = tokio::spawn({
            let manager = Arc::clone(&manager);
            async move { manager.login("vera@ovi.network", "correct-horse").await }
        });
        let second = tokio::spawn({
            let manager = Arc::clone(&manager);
            async move { manager.login("vera@ovi.network", "correct-horse").await }
        });

        assert!(first.await.unwrap().is_ok());
        assert!(second.await.unwrap().is_ok());

        let snapshot = wait_for(&mut rx, |s| s.is_authenticated() && !s.loading).await;
        assert_eq!(snapshot.status(), SessionStatus::Authenticated);
        // Both reconciliations agree on one profile row.
        assert_eq!(profiles.len(), 1);
    }
}
