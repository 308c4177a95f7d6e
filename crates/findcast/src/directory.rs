//! Collaborator interfaces the relay core depends on.
//!
//! Subscription storage and the chat platform client live outside this crate;
//! the pipeline only sees them through these traits, so tests (and the CLI)
//! can substitute their own implementations.

use async_trait::async_trait;

use crate::error::Result;

/// Bulk loader behind [`MembershipCache::refresh`](crate::cache::MembershipCache::refresh).
#[async_trait]
pub trait TrackedNameLoader: Send + Sync {
    /// Return every currently tracked username.
    async fn load_tracked_names(&self) -> Result<Vec<String>>;
}

/// One configured delivery target for a tracked user.
#[derive(Debug, Clone)]
pub struct DestinationEntry {
    /// Webhook URL to post to.
    pub url: String,
    /// Guild the webhook belongs to.
    pub guild_id: u64,
    /// Role the owning user must hold in that guild, if any. Zero means no
    /// requirement.
    pub required_role_id: Option<u64>,
}

/// The current fan-out for a tracked username.
#[derive(Debug, Clone)]
pub struct UserDestinations {
    /// Chat-platform id of the user who registered the username.
    pub owner_id: u64,
    pub targets: Vec<DestinationEntry>,
}

/// Maps a tracked username to its delivery fan-out.
#[async_trait]
pub trait DestinationResolver: Send + Sync {
    /// Returns `Ok(None)` when the username is no longer registered.
    async fn resolve_destinations(&self, username: &str) -> Result<Option<UserDestinations>>;
}

/// A resolved guild. Existence is all the permission check needs.
#[derive(Debug, Clone)]
pub struct GuildRef {
    pub id: u64,
}

/// A resolved guild member with their role set.
#[derive(Debug, Clone)]
pub struct Member {
    pub user_id: u64,
    pub role_ids: Vec<u64>,
}

/// Cosmetic info for rendering the notification author/footer.
#[derive(Debug, Clone)]
pub struct UserDisplay {
    pub display_name: String,
    pub avatar_url: String,
}

/// Read-only chat platform lookups used for permission checks and rendering.
#[async_trait]
pub trait ChatGateway: Send + Sync {
    /// Resolve a guild by id. `None` when the bot cannot see it.
    async fn resolve_guild(&self, guild_id: u64) -> Option<GuildRef>;

    /// Resolve a member of a guild. `None` on any lookup failure.
    async fn resolve_member(&self, guild_id: u64, user_id: u64) -> Option<Member>;

    /// Test whether a member holds a role.
    fn member_has_role(&self, member: &Member, role_id: u64) -> bool {
        member.role_ids.contains(&role_id)
    }

    /// Resolve a user's display name and avatar. `None` degrades rendering to
    /// placeholders, never to an error.
    async fn resolve_display(&self, user_id: u64) -> Option<UserDisplay>;
}
