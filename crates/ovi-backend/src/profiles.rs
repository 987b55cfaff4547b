//! The profile side of the backend boundary.

use async_trait::async_trait;
use uuid::Uuid;

use ovi_shared::{NewProfile, Profile};

use crate::error::ProfileError;

/// Access to the backend's `profiles` table.
///
/// The session manager leans on the error contract here: `fetch` must
/// report a missing row as [`ProfileError::NotFound`] and `insert`
/// must report an id collision as [`ProfileError::Conflict`], because
/// those two outcomes drive the lazy-creation path.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Fetch the profile row for an identity id.
    async fn fetch(&self, id: Uuid) -> Result<Profile, ProfileError>;

    /// Insert a new profile row and return it as the store materialized
    /// it (timestamps and defaults filled in).
    async fn insert(&self, profile: &NewProfile) -> Result<Profile, ProfileError>;
}
