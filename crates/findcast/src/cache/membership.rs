//! Tracked-username membership cache.

use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashSet;

use crate::directory::TrackedNameLoader;
use crate::error::Result;

/// In-memory set of tracked usernames, case-insensitive.
///
/// Lookups and live mutations are synchronous; [`refresh`](Self::refresh)
/// awaits the external loader off-lock and then swaps the whole set in one
/// write, so readers never observe a half-refreshed state.
pub struct MembershipCache {
    names: RwLock<FxHashSet<String>>,
    loader: Arc<dyn TrackedNameLoader>,
}

impl MembershipCache {
    pub fn new(loader: Arc<dyn TrackedNameLoader>) -> Self {
        Self {
            names: RwLock::new(FxHashSet::default()),
            loader,
        }
    }

    pub fn contains(&self, username: &str) -> bool {
        self.names.read().contains(&username.to_lowercase())
    }

    pub fn add(&self, username: &str) {
        self.names.write().insert(username.to_lowercase());
    }

    pub fn remove(&self, username: &str) {
        self.names.write().remove(&username.to_lowercase());
    }

    pub fn len(&self) -> usize {
        self.names.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.read().is_empty()
    }

    /// Replace the entire set with what storage currently reports.
    ///
    /// Returns the new set size.
    pub async fn refresh(&self) -> Result<usize> {
        let loaded = self.loader.load_tracked_names().await?;
        let fresh: FxHashSet<String> = loaded.into_iter().map(|n| n.to_lowercase()).collect();
        let count = fresh.len();
        *self.names.write() = fresh;
        Ok(count)
    }
}
