//! In-process backend used by tests and the demo binary.
//!
//! Behaves like the hosted service as seen from the client: seeded
//! accounts, an optional email-confirmation mode, and failure
//! injection for the paths that are awkward to produce against a real
//! deployment (missing rows, insert collisions, store outages).
//! Passwords are compared in plain text; this never guards anything.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use uuid::Uuid;

use ovi_shared::{Identity, NewProfile, Profile};

use crate::auth::{AuthEvent, AuthSession, IdentityBackend, SignUpMetadata, SignUpOutcome};
use crate::error::{AuthError, ProfileError};
use crate::profiles::ProfileStore;

const EVENT_CAPACITY: usize = 32;

// ---------------------------------------------------------------------------
// Identity backend
// ---------------------------------------------------------------------------

struct Account {
    identity: Identity,
    password: String,
    confirmed: bool,
}

/// In-memory [`IdentityBackend`].
pub struct MemoryBackend {
    accounts: Mutex<Vec<Account>>,
    current: Mutex<Option<Identity>>,
    events: broadcast::Sender<AuthEvent>,
    confirmation_required: bool,
    signups_disabled: Mutex<bool>,
    fail_sign_out: Mutex<Option<AuthError>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            accounts: Mutex::new(Vec::new()),
            current: Mutex::new(None),
            events,
            confirmation_required: false,
            signups_disabled: Mutex::new(false),
            fail_sign_out: Mutex::new(None),
        }
    }

    /// A backend that withholds tokens from new sign-ups until the
    /// account is confirmed, like a deployment with confirmation
    /// emails turned on.
    pub fn with_confirmation_required() -> Self {
        Self {
            confirmation_required: true,
            ..Self::new()
        }
    }

    /// Register a confirmed account and return its identity.
    pub fn seed_account(&self, email: &str, password: &str) -> Identity {
        self.push_account(email, password, true)
    }

    /// Register an account that has not clicked its confirmation link.
    pub fn seed_unconfirmed(&self, email: &str, password: &str) -> Identity {
        self.push_account(email, password, false)
    }

    /// Register an account and mark it as already signed in, so
    /// `restore` finds it. Models a persisted session from a previous
    /// run.
    pub fn seed_session(&self, email: &str, password: &str) -> Identity {
        let identity = self.seed_account(email, password);
        *self.current.lock() = Some(identity.clone());
        identity
    }

    /// Make the next `sign_out` call fail with `err`.
    pub fn fail_next_sign_out(&self, err: AuthError) {
        *self.fail_sign_out.lock() = Some(err);
    }

    /// Reject sign-ups from now on, like a deployment with public
    /// registration turned off.
    pub fn disable_signups(&self) {
        *self.signups_disabled.lock() = true;
    }

    /// The identity the backend currently considers signed in.
    pub fn current_identity(&self) -> Option<Identity> {
        self.current.lock().clone()
    }

    fn push_account(&self, email: &str, password: &str, confirmed: bool) -> Identity {
        let identity = Identity {
            id: Uuid::new_v4(),
            email: email.to_string(),
        };
        self.accounts.lock().push(Account {
            identity: identity.clone(),
            password: password.to_string(),
            confirmed,
        });
        identity
    }

    fn issue_session(&self, identity: Identity) -> AuthSession {
        AuthSession {
            identity,
            access_token: format!("memory-access-{}", Uuid::new_v4()),
            refresh_token: format!("memory-refresh-{}", Uuid::new_v4()),
            expires_at: Utc::now() + chrono::Duration::hours(1),
        }
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IdentityBackend for MemoryBackend {
    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthSession, AuthError> {
        let account = {
            let accounts = self.accounts.lock();
            match accounts
                .iter()
                .find(|a| a.identity.email.eq_ignore_ascii_case(email))
            {
                Some(a) if a.password == password => {
                    if !a.confirmed {
                        return Err(AuthError::EmailNotConfirmed);
                    }
                    a.identity.clone()
                }
                // Same error whether the account is unknown or the
                // password is wrong, like the real service.
                _ => return Err(AuthError::InvalidCredentials),
            }
        };

        let session = self.issue_session(account.clone());
        *self.current.lock() = Some(account.clone());
        let _ = self.events.send(AuthEvent::SignedIn { identity: account });
        Ok(session)
    }

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        _metadata: SignUpMetadata,
    ) -> Result<SignUpOutcome, AuthError> {
        if *self.signups_disabled.lock() {
            return Err(AuthError::SignupDisabled);
        }
        if !email.contains('@') {
            return Err(AuthError::InvalidEmail);
        }
        if password.len() < 6 {
            return Err(AuthError::WeakPassword(
                "Password should be at least 6 characters".to_string(),
            ));
        }
        if self
            .accounts
            .lock()
            .iter()
            .any(|a| a.identity.email.eq_ignore_ascii_case(email))
        {
            return Err(AuthError::AlreadyRegistered);
        }

        let identity = self.push_account(email, password, !self.confirmation_required);
        if self.confirmation_required {
            return Ok(SignUpOutcome {
                identity,
                session: None,
            });
        }

        let session = self.issue_session(identity.clone());
        *self.current.lock() = Some(identity.clone());
        let _ = self.events.send(AuthEvent::SignedIn {
            identity: identity.clone(),
        });
        Ok(SignUpOutcome {
            identity,
            session: Some(session),
        })
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        if let Some(err) = self.fail_sign_out.lock().take() {
            return Err(err);
        }
        *self.current.lock() = None;
        let _ = self.events.send(AuthEvent::SignedOut);
        Ok(())
    }

    async fn restore(&self) -> Result<Option<Identity>, AuthError> {
        Ok(self.current.lock().clone())
    }

    fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }
}

// ---------------------------------------------------------------------------
// Profile store
// ---------------------------------------------------------------------------

/// In-memory [`ProfileStore`] with call counters and failure injection.
pub struct MemoryProfiles {
    rows: Mutex<HashMap<Uuid, Profile>>,
    /// How many upcoming fetches should report `NotFound` regardless of
    /// the stored rows. Used to stage the first-login and insert-race
    /// scenarios.
    pretend_missing: AtomicUsize,
    fail_fetch: Mutex<Option<ProfileError>>,
    fail_insert: Mutex<Option<ProfileError>>,
    fetch_calls: AtomicUsize,
    insert_calls: AtomicUsize,
}

impl MemoryProfiles {
    pub fn new() -> Self {
        Self {
            rows: Mutex::new(HashMap::new()),
            pretend_missing: AtomicUsize::new(0),
            fail_fetch: Mutex::new(None),
            fail_insert: Mutex::new(None),
            fetch_calls: AtomicUsize::new(0),
            insert_calls: AtomicUsize::new(0),
        }
    }

    /// Put a row in place directly, bypassing `insert` and its
    /// bookkeeping.
    pub fn seed(&self, profile: Profile) {
        self.rows.lock().insert(profile.id, profile);
    }

    pub fn get(&self, id: Uuid) -> Option<Profile> {
        self.rows.lock().get(&id).cloned()
    }

    pub fn len(&self) -> usize {
        self.rows.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.lock().is_empty()
    }

    /// Report `NotFound` for the next `n` fetches even if the row
    /// exists.
    pub fn pretend_missing(&self, n: usize) {
        self.pretend_missing.store(n, Ordering::SeqCst);
    }

    /// Make the next fetch fail with `err`.
    pub fn fail_next_fetch(&self, err: ProfileError) {
        *self.fail_fetch.lock() = Some(err);
    }

    /// Make the next insert fail with `err`.
    pub fn fail_next_insert(&self, err: ProfileError) {
        *self.fail_insert.lock() = Some(err);
    }

    pub fn fetch_count(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    pub fn insert_count(&self) -> usize {
        self.insert_calls.load(Ordering::SeqCst)
    }

    fn materialize(profile: &NewProfile) -> Profile {
        let now = Utc::now();
        Profile {
            id: profile.id,
            username: profile.username.clone(),
            display_name: profile.display_name.clone(),
            bio: profile.bio.clone(),
            avatar_url: profile.avatar_url.clone(),
            security_level: profile.security_level,
            verified: profile.verified,
            tracks_count: profile.tracks_count,
            followers_count: profile.followers_count,
            following_count: profile.following_count,
            created_at: now,
            updated_at: now,
        }
    }
}

impl Default for MemoryProfiles {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProfileStore for MemoryProfiles {
    async fn fetch(&self, id: Uuid) -> Result<Profile, ProfileError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.fail_fetch.lock().take() {
            return Err(err);
        }
        if self
            .pretend_missing
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(ProfileError::NotFound);
        }
        self.rows
            .lock()
            .get(&id)
            .cloned()
            .ok_or(ProfileError::NotFound)
    }

    async fn insert(&self, profile: &NewProfile) -> Result<Profile, ProfileError> {
        self.insert_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.fail_insert.lock().take() {
            return Err(err);
        }
        let mut rows = self.rows.lock();
        if rows.contains_key(&profile.id) {
            return Err(ProfileError::Conflict);
        }
        let row = Self::materialize(profile);
        rows.insert(row.id, row.clone());
        Ok(row)
    }
}
