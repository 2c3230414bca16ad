//! Per-user crosspost groups: a parent channel fanned out to child channels.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex as StdMutex, MutexGuard},
};

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::info;

use crate::{
    domain::{ChannelId, UserId},
    errors::Error,
    store::SettingsStore,
    Result,
};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrosspostGroup {
    pub name: String,
    pub parent: ChannelId,
    pub children: Vec<ChannelId>,
}

/// Persisted per-user record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSettings {
    pub user_id: UserId,
    #[serde(default)]
    pub groups: Vec<CrosspostGroup>,
}

impl UserSettings {
    pub fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            groups: Vec::new(),
        }
    }

    pub fn group(&self, name: &str) -> Option<&CrosspostGroup> {
        self.groups.iter().find(|g| g.name == name)
    }

    fn group_mut(&mut self, name: &str) -> Option<&mut CrosspostGroup> {
        self.groups.iter_mut().find(|g| g.name == name)
    }

    fn is_parent(&self, channel: ChannelId) -> bool {
        self.groups.iter().any(|g| g.parent == channel)
    }
}

#[derive(Default)]
struct OwnerLocks {
    inner: StdMutex<HashMap<UserId, Arc<Mutex<()>>>>,
}

impl OwnerLocks {
    fn map(&self) -> MutexGuard<'_, HashMap<UserId, Arc<Mutex<()>>>> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    async fn lock_owner(&self, owner: UserId) -> OwnerGuard<'_> {
        let lock = self
            .map()
            .entry(owner)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        OwnerGuard {
            locks: self,
            owner,
            held: Some(lock.lock_owned().await),
        }
    }
}

/// One owner's read-modify-write slot. The last holder to leave forgets the lock.
struct OwnerGuard<'a> {
    locks: &'a OwnerLocks,
    owner: UserId,
    held: Option<OwnedMutexGuard<()>>,
}

impl Drop for OwnerGuard<'_> {
    fn drop(&mut self) {
        self.held.take();
        let mut map = self.locks.map();
        // Waiters hold their own clone, so only the map's reference is left when idle.
        if map
            .get(&self.owner)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            map.remove(&self.owner);
        }
    }
}

/// Crosspost group operations, all scoped to one owner.
///
/// Every mutation validates fully before it writes, and writes at most once.
pub struct CrosspostGroups {
    store: Arc<dyn SettingsStore>,
    locks: OwnerLocks,
}

impl CrosspostGroups {
    pub fn new(store: Arc<dyn SettingsStore>) -> Self {
        Self {
            store,
            locks: OwnerLocks::default(),
        }
    }

    pub async fn create(
        &self,
        owner: UserId,
        name: &str,
        parent: ChannelId,
    ) -> Result<CrosspostGroup> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::Validation("group name must not be empty".to_string()));
        }

        let _guard = self.locks.lock_owner(owner).await;
        let mut user = self
            .load(owner)
            .await?
            .unwrap_or_else(|| UserSettings::new(owner));
        if user.group(name).is_some() {
            return Err(Error::Validation(format!("group {name:?} already exists")));
        }
        if user.is_parent(parent) {
            return Err(Error::Validation(format!(
                "channel {parent} is already the parent of another group"
            )));
        }

        let group = CrosspostGroup {
            name: name.to_string(),
            parent,
            children: Vec::new(),
        };
        user.groups.push(group.clone());
        self.save(&user).await?;
        info!(owner = %owner, group = name, parent = %parent, "crosspost group created");
        Ok(group)
    }

    pub async fn delete(&self, owner: UserId, name: &str) -> Result<()> {
        let _guard = self.locks.lock_owner(owner).await;
        let mut user = self.require(owner).await?;
        let before = user.groups.len();
        user.groups.retain(|g| g.name != name);
        if user.groups.len() == before {
            return Err(missing_group(name));
        }
        self.save(&user).await?;
        info!(owner = %owner, group = name, "crosspost group deleted");
        Ok(())
    }

    /// Add `ids` as children of `name`. Returns the channels that were not already there.
    pub async fn add_children(
        &self,
        owner: UserId,
        name: &str,
        ids: &[ChannelId],
    ) -> Result<Vec<ChannelId>> {
        let _guard = self.locks.lock_owner(owner).await;
        let mut user = self.require(owner).await?;
        let group = user.group_mut(name).ok_or_else(|| missing_group(name))?;

        let mut added = Vec::new();
        for id in ids {
            if !group.children.contains(id) && !added.contains(id) {
                added.push(*id);
            }
        }
        if added.is_empty() {
            return Ok(added);
        }
        group.children.extend(added.iter().copied());
        self.save(&user).await?;
        Ok(added)
    }

    /// Remove `ids` from `name`. Returns the channels that were actually children.
    pub async fn remove_children(
        &self,
        owner: UserId,
        name: &str,
        ids: &[ChannelId],
    ) -> Result<Vec<ChannelId>> {
        let _guard = self.locks.lock_owner(owner).await;
        let mut user = self.require(owner).await?;
        let group = user.group_mut(name).ok_or_else(|| missing_group(name))?;

        let mut removed = Vec::new();
        group.children.retain(|c| {
            if ids.contains(c) {
                removed.push(*c);
                false
            } else {
                true
            }
        });
        if removed.is_empty() {
            return Ok(removed);
        }
        self.save(&user).await?;
        Ok(removed)
    }

    /// Duplicate `src` as `dest` rooted at `new_parent`.
    ///
    /// A child equal to `new_parent` is replaced by the source's parent, so the old
    /// parent keeps receiving posts from the new one.
    pub async fn copy(
        &self,
        owner: UserId,
        src: &str,
        dest: &str,
        new_parent: ChannelId,
    ) -> Result<CrosspostGroup> {
        let dest = dest.trim();
        if dest.is_empty() {
            return Err(Error::Validation("group name must not be empty".to_string()));
        }

        let _guard = self.locks.lock_owner(owner).await;
        let mut user = self.require(owner).await?;
        let source = user.group(src).ok_or_else(|| missing_group(src))?;
        if user.group(dest).is_some() {
            return Err(Error::Validation(format!("group {dest:?} already exists")));
        }
        if user.is_parent(new_parent) {
            return Err(Error::Validation(format!(
                "channel {new_parent} is already the parent of another group"
            )));
        }

        let children = source
            .children
            .iter()
            .map(|&c| if c == new_parent { source.parent } else { c })
            .collect();
        let group = CrosspostGroup {
            name: dest.to_string(),
            parent: new_parent,
            children,
        };
        user.groups.push(group.clone());
        self.save(&user).await?;
        info!(owner = %owner, src, dest, parent = %new_parent, "crosspost group copied");
        Ok(group)
    }

    pub async fn groups(&self, owner: UserId) -> Result<Vec<CrosspostGroup>> {
        Ok(self.load(owner).await?.map(|u| u.groups).unwrap_or_default())
    }

    /// Children of the owner's group whose parent is `channel`.
    pub async fn targets(&self, owner: UserId, channel: ChannelId) -> Result<Vec<ChannelId>> {
        Ok(self
            .groups(owner)
            .await?
            .into_iter()
            .find(|g| g.parent == channel)
            .map(|g| g.children)
            .unwrap_or_default())
    }

    async fn load(&self, owner: UserId) -> Result<Option<UserSettings>> {
        self.store.user_settings(owner).await.map_err(persistence)
    }

    async fn require(&self, owner: UserId) -> Result<UserSettings> {
        self.load(owner)
            .await?
            .ok_or_else(|| Error::NotFound(format!("no crosspost groups for user {owner}")))
    }

    async fn save(&self, user: &UserSettings) -> Result<()> {
        self.store.save_user_settings(user).await.map_err(persistence)
    }
}

fn missing_group(name: &str) -> Error {
    Error::NotFound(format!("group {name:?}"))
}

fn persistence(e: Error) -> Error {
    match e {
        Error::Persistence(_) => e,
        other => Error::Persistence(other.to_string()),
    }
}
