//! External adapter traits
//!
//! Profile lookups and AI-assisted name matching are deployment concerns;
//! the core consumes them through these traits and ships no-op defaults.
//! Adapter calls are best-effort and must never run inside a store
//! transaction.

use crate::models::ProfileSnapshot;
use crate::naming::NameMatch;
use crate::types::Result;

/// Fetches a public profile snapshot for a username.
#[async_trait::async_trait]
pub trait ProfileFetcher: Send + Sync {
    /// Returns None when the profile cannot be resolved; errors are
    /// reserved for adapter misconfiguration.
    async fn fetch(&self, username: &str) -> Result<Option<ProfileSnapshot>>;
}

/// Default adapter: profile lookups disabled.
pub struct NoopProfileFetcher;

#[async_trait::async_trait]
impl ProfileFetcher for NoopProfileFetcher {
    async fn fetch(&self, _username: &str) -> Result<Option<ProfileSnapshot>> {
        Ok(None)
    }
}

/// AI-assisted duplicate-name matching, layered on top of the built-in
/// edit-distance matcher when configured.
#[async_trait::async_trait]
pub trait NameMatchAdapter: Send + Sync {
    async fn match_names(
        &self,
        target: &str,
        existing: &[(String, String)],
    ) -> Result<Vec<NameMatch>>;
}
