//! File-backed routing directory.
//!
//! The CLI runs without a database or a bot client: tracked users and their
//! webhook destinations come from a TOML routing table instead.
//!
//! ```toml
//! [[user]]
//! username = "Someone"
//! owner_id = 42
//!
//! [[user.destination]]
//! url = "https://discord.com/api/webhooks/123/token"
//! guild_id = 7
//! ```

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use serde::Deserialize;

use findcast::directory::{
    ChatGateway, DestinationEntry, DestinationResolver, GuildRef, Member, TrackedNameLoader,
    UserDestinations, UserDisplay,
};

use crate::error::Result;

#[derive(Debug, Deserialize)]
pub struct RoutingTable {
    #[serde(default, rename = "user")]
    pub users: Vec<RoutedUser>,
}

#[derive(Debug, Deserialize)]
pub struct RoutedUser {
    pub username: String,
    pub owner_id: u64,
    #[serde(default, rename = "destination")]
    pub destinations: Vec<RoutedDestination>,
}

#[derive(Debug, Deserialize)]
pub struct RoutedDestination {
    pub url: String,
    pub guild_id: u64,
    pub required_role_id: Option<u64>,
}

/// Routing table indexed by lower-cased username.
pub struct FileDirectory {
    users: HashMap<String, RoutedUser>,
}

impl FileDirectory {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let table: RoutingTable = toml::from_str(&text)?;
        Ok(Self::new(table))
    }

    pub fn new(table: RoutingTable) -> Self {
        let users = table
            .users
            .into_iter()
            .map(|user| (user.username.to_lowercase(), user))
            .collect();
        Self { users }
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

#[async_trait]
impl TrackedNameLoader for FileDirectory {
    async fn load_tracked_names(&self) -> findcast::Result<Vec<String>> {
        Ok(self.users.keys().cloned().collect())
    }
}

#[async_trait]
impl DestinationResolver for FileDirectory {
    async fn resolve_destinations(
        &self,
        username: &str,
    ) -> findcast::Result<Option<UserDestinations>> {
        let Some(user) = self.users.get(&username.to_lowercase()) else {
            return Ok(None);
        };
        let targets = user
            .destinations
            .iter()
            .map(|destination| DestinationEntry {
                url: destination.url.clone(),
                guild_id: destination.guild_id,
                required_role_id: destination.required_role_id,
            })
            .collect();
        Ok(Some(UserDestinations {
            owner_id: user.owner_id,
            targets,
        }))
    }
}

/// Chat gateway stand-in for runs without a bot client.
///
/// Nothing can be resolved, so role-gated destinations are denied (a gate
/// that cannot be verified is not satisfied) and display lookups degrade to
/// the rendering placeholders.
#[derive(Debug, Default)]
pub struct OfflineChatGateway;

#[async_trait]
impl ChatGateway for OfflineChatGateway {
    async fn resolve_guild(&self, _guild_id: u64) -> Option<GuildRef> {
        None
    }

    async fn resolve_member(&self, _guild_id: u64, _user_id: u64) -> Option<Member> {
        None
    }

    async fn resolve_display(&self, _user_id: u64) -> Option<UserDisplay> {
        None
    }
}
