//! Role-gate permission checks with a TTL cache.
//!
//! A destination may require the find's owner to hold a role in its guild.
//! Checking that costs chat-platform lookups, so verdicts are memoized per
//! `(guild, user, role)` with passive expiry: a read past the TTL triggers a
//! fresh check-and-store, there is no background sweep.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tracing::debug;

use crate::config::PermissionCacheConfig;
use crate::directory::ChatGateway;

type CacheKey = (u64, u64, u64);

#[derive(Clone, Copy)]
struct CacheEntry {
    allowed: bool,
    expires_at: Instant,
}

impl CacheEntry {
    fn new(allowed: bool, ttl: Duration) -> Self {
        Self {
            allowed,
            expires_at: Instant::now() + ttl,
        }
    }

    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// Statistics about the permission cache.
#[derive(Debug, Clone)]
pub struct PermissionCacheStats {
    pub entry_count: usize,
    pub max_entries: usize,
    pub ttl: Duration,
}

/// Checks whether a find's owner may post into a destination guild.
pub struct PermissionChecker {
    gateway: Arc<dyn ChatGateway>,
    cache: DashMap<CacheKey, CacheEntry>,
    ttl: Duration,
    max_entries: usize,
}

impl PermissionChecker {
    pub fn new(gateway: Arc<dyn ChatGateway>, config: PermissionCacheConfig) -> Self {
        Self {
            gateway,
            cache: DashMap::new(),
            ttl: config.ttl,
            max_entries: config.max_entries,
        }
    }

    /// Check whether `owner_id` holds `required_role` in `guild_id`.
    ///
    /// No requirement (absent or zero role id) is always allowed without any
    /// lookup. Any resolution failure means not permitted, never an error.
    pub async fn check(&self, guild_id: u64, owner_id: u64, required_role: Option<u64>) -> bool {
        let Some(role_id) = required_role.filter(|id| *id != 0) else {
            return true;
        };

        let key = (guild_id, owner_id, role_id);
        if let Some(entry) = self.cache.get(&key) {
            if !entry.is_expired() {
                debug!(guild_id, owner_id, role_id, "permission cache hit");
                return entry.allowed;
            }
            drop(entry);
            self.cache.remove(&key);
        }

        let allowed = self.check_via_gateway(guild_id, owner_id, role_id).await;
        self.store(key, allowed);
        allowed
    }

    async fn check_via_gateway(&self, guild_id: u64, owner_id: u64, role_id: u64) -> bool {
        if self.gateway.resolve_guild(guild_id).await.is_none() {
            debug!(guild_id, "guild not resolvable, denying");
            return false;
        }

        let Some(member) = self.gateway.resolve_member(guild_id, owner_id).await else {
            debug!(guild_id, owner_id, "member not resolvable, denying");
            return false;
        };

        self.gateway.member_has_role(&member, role_id)
    }

    fn store(&self, key: CacheKey, allowed: bool) {
        if self.cache.len() >= self.max_entries {
            self.cache.retain(|_, entry| !entry.is_expired());
        }
        if self.cache.len() >= self.max_entries {
            // Still full after dropping expired entries: evict the entry
            // closest to expiry.
            let oldest = self
                .cache
                .iter()
                .min_by_key(|entry| entry.value().expires_at)
                .map(|entry| *entry.key());
            if let Some(oldest) = oldest {
                self.cache.remove(&oldest);
            }
        }
        self.cache.insert(key, CacheEntry::new(allowed, self.ttl));
    }

    /// Drop cached verdicts for one guild. For the outer layer to call when
    /// it learns of a role or webhook change; the pipeline never invalidates.
    pub fn invalidate_guild(&self, guild_id: u64) {
        self.cache.retain(|key, _| key.0 != guild_id);
    }

    /// Drop cached verdicts for one user.
    pub fn invalidate_user(&self, user_id: u64) {
        self.cache.retain(|key, _| key.1 != user_id);
    }

    /// Drop every cached verdict.
    pub fn clear(&self) {
        self.cache.clear();
    }

    pub fn stats(&self) -> PermissionCacheStats {
        PermissionCacheStats {
            entry_count: self.cache.len(),
            max_entries: self.max_entries,
            ttl: self.ttl,
        }
    }
}
