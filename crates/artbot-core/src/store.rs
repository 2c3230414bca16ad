//! Settings persistence port and its two implementations.

use std::{
    path::{Path, PathBuf},
    sync::{Mutex, MutexGuard},
};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info};

use crate::{
    crosspost::UserSettings,
    domain::{GuildId, UserId},
    errors::Error,
    settings::{GuildDefaults, GuildSettings},
    Result,
};

/// CRUD over guild and user settings records.
#[async_trait]
pub trait SettingsStore: Send + Sync {
    /// Stored settings for `guild`, or the defaults if there is no record yet.
    async fn guild_settings(&self, guild: GuildId) -> Result<GuildSettings>;
    async fn save_guild_settings(&self, settings: &GuildSettings) -> Result<()>;
    async fn user_settings(&self, user: UserId) -> Result<Option<UserSettings>>;
    async fn save_user_settings(&self, settings: &UserSettings) -> Result<()>;
}

/// Everything the store persists.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
struct StoreData {
    #[serde(default)]
    guilds: Vec<GuildSettings>,
    #[serde(default)]
    users: Vec<UserSettings>,
}

impl StoreData {
    fn guild(&self, defaults: &GuildDefaults, guild: GuildId) -> GuildSettings {
        self.guilds
            .iter()
            .find(|g| g.guild_id == guild)
            .cloned()
            .unwrap_or_else(|| defaults.for_guild(guild))
    }

    fn put_guild(&mut self, settings: &GuildSettings) {
        match self.guilds.iter_mut().find(|g| g.guild_id == settings.guild_id) {
            Some(g) => *g = settings.clone(),
            None => self.guilds.push(settings.clone()),
        }
    }

    fn user(&self, user: UserId) -> Option<UserSettings> {
        self.users.iter().find(|u| u.user_id == user).cloned()
    }

    fn put_user(&mut self, settings: &UserSettings) {
        match self.users.iter_mut().find(|u| u.user_id == settings.user_id) {
            Some(u) => *u = settings.clone(),
            None => self.users.push(settings.clone()),
        }
    }
}

/// In-process store. Used by tests and when no settings file is configured.
#[derive(Debug, Default)]
pub struct MemoryStore {
    defaults: GuildDefaults,
    data: Mutex<StoreData>,
}

impl MemoryStore {
    pub fn new(defaults: GuildDefaults) -> Self {
        Self {
            defaults,
            data: Mutex::new(StoreData::default()),
        }
    }

    fn data(&self) -> MutexGuard<'_, StoreData> {
        self.data.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl SettingsStore for MemoryStore {
    async fn guild_settings(&self, guild: GuildId) -> Result<GuildSettings> {
        Ok(self.data().guild(&self.defaults, guild))
    }

    async fn save_guild_settings(&self, settings: &GuildSettings) -> Result<()> {
        self.data().put_guild(settings);
        Ok(())
    }

    async fn user_settings(&self, user: UserId) -> Result<Option<UserSettings>> {
        Ok(self.data().user(user))
    }

    async fn save_user_settings(&self, settings: &UserSettings) -> Result<()> {
        self.data().put_user(settings);
        Ok(())
    }
}

/// Whole-file JSON store. Each save rewrites the file through a temporary sibling.
pub struct JsonFileStore {
    path: PathBuf,
    defaults: GuildDefaults,
    data: AsyncMutex<StoreData>,
}

impl JsonFileStore {
    /// Load `path`, starting empty if it does not exist or is blank.
    pub async fn open(path: impl Into<PathBuf>, defaults: GuildDefaults) -> Result<Self> {
        let path = path.into();
        let data = match tokio::fs::read_to_string(&path).await {
            Ok(txt) if txt.trim().is_empty() => StoreData::default(),
            Ok(txt) => serde_json::from_str(&txt).map_err(|e| {
                Error::Persistence(format!("corrupt settings file {}: {e}", path.display()))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => StoreData::default(),
            Err(e) => {
                return Err(Error::Persistence(format!(
                    "failed to read {}: {e}",
                    path.display()
                )))
            }
        };
        info!(
            path = %path.display(),
            guilds = data.guilds.len(),
            users = data.users.len(),
            "settings store opened"
        );
        Ok(Self {
            path,
            defaults,
            data: AsyncMutex::new(data),
        })
    }

    /// Apply `f` to a copy, persist it, and only then make it visible.
    async fn update(&self, f: impl FnOnce(&mut StoreData) + Send) -> Result<()> {
        let mut data = self.data.lock().await;
        let mut next = data.clone();
        f(&mut next);
        write_atomic(&self.path, &next).await?;
        *data = next;
        Ok(())
    }
}

async fn write_atomic(path: &Path, data: &StoreData) -> Result<()> {
    let txt = serde_json::to_string_pretty(data)?;
    let tmp = path.with_extension("json.tmp");
    let persist = |e: std::io::Error| Error::Persistence(format!("{}: {e}", path.display()));

    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(dir).await.map_err(persist)?;
    }
    tokio::fs::write(&tmp, txt).await.map_err(persist)?;
    tokio::fs::rename(&tmp, path).await.map_err(persist)?;
    debug!(path = %path.display(), "settings saved");
    Ok(())
}

#[async_trait]
impl SettingsStore for JsonFileStore {
    async fn guild_settings(&self, guild: GuildId) -> Result<GuildSettings> {
        Ok(self.data.lock().await.guild(&self.defaults, guild))
    }

    async fn save_guild_settings(&self, settings: &GuildSettings) -> Result<()> {
        self.update(|d| d.put_guild(settings)).await
    }

    async fn user_settings(&self, user: UserId) -> Result<Option<UserSettings>> {
        Ok(self.data.lock().await.user(user))
    }

    async fn save_user_settings(&self, settings: &UserSettings) -> Result<()> {
        self.update(|d| d.put_user(settings)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{crosspost::CrosspostGroup, domain::ChannelId, settings::RepostMode};

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("artbot-store-{}-{name}.json", std::process::id()))
    }

    #[tokio::test]
    async fn memory_store_falls_back_to_defaults() {
        let store = MemoryStore::new(GuildDefaults::default());
        let s = store.guild_settings(GuildId(3)).await.unwrap();
        assert_eq!(s.guild_id, GuildId(3));
        assert_eq!(s.limit, 50);
        assert!(store.user_settings(UserId(1)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn json_store_survives_reopen() {
        let path = temp_path("reopen");
        let _ = std::fs::remove_file(&path);

        let store = JsonFileStore::open(&path, GuildDefaults::default()).await.unwrap();
        let mut g = store.guild_settings(GuildId(1)).await.unwrap();
        g.repost_mode = RepostMode::Links;
        store.save_guild_settings(&g).await.unwrap();

        let mut u = UserSettings::new(UserId(9));
        u.groups.push(CrosspostGroup {
            name: "art".to_string(),
            parent: ChannelId(1),
            children: vec![ChannelId(2)],
        });
        store.save_user_settings(&u).await.unwrap();
        drop(store);

        let store = JsonFileStore::open(&path, GuildDefaults::default()).await.unwrap();
        assert_eq!(store.guild_settings(GuildId(1)).await.unwrap(), g);
        assert_eq!(store.user_settings(UserId(9)).await.unwrap(), Some(u));
        assert!(!path.with_extension("json.tmp").exists());

        std::fs::remove_file(&path).unwrap();
    }

    #[tokio::test]
    async fn corrupt_file_is_a_persistence_error() {
        let path = temp_path("corrupt");
        std::fs::write(&path, "{ not json").unwrap();
        let err = JsonFileStore::open(&path, GuildDefaults::default())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, Error::Persistence(_)));
        std::fs::remove_file(&path).unwrap();
    }

    #[tokio::test]
    async fn unreadable_path_is_a_persistence_error() {
        let dir = std::env::temp_dir().join(format!("artbot-store-{}-dir", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let store = JsonFileStore::open(&dir, GuildDefaults::default()).await;
        assert!(matches!(store, Err(Error::Persistence(_))));
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
