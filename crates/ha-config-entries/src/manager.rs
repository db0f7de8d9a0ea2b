//! Config Entries Manager
//!
//! Owns the config entry store: indexes, persistence, lifecycle state and
//! pending re-authentication requests. Running integrations lives in
//! [`crate::HomeAssistant`].

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::{DashMap, DashSet};
use ha_registries::{Storable, Storage, StorageResult};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::entry::{ConfigEntry, ConfigEntryState, ConfigEntryUpdate};
use crate::state_machine::InvalidTransition;

/// Storage key for config entries
pub const STORAGE_KEY: &str = "core.config_entries";
/// Current storage version
pub const STORAGE_VERSION: u32 = 1;
/// Current minor version
pub const STORAGE_MINOR_VERSION: u32 = 5;

/// Config entries errors
#[derive(Debug, Error)]
pub enum ConfigEntriesError {
    #[error("Entry not found: {0}")]
    NotFound(String),

    #[error("Entry already exists for domain {domain} with unique_id {unique_id}")]
    AlreadyExists { domain: String, unique_id: String },

    #[error("No integration registered for domain {0}")]
    UnknownIntegration(String),

    #[error("Cannot unload entry in state {0:?}")]
    CannotUnload(ConfigEntryState),

    #[error("Authentication failed: {0}")]
    AuthFailed(String),

    #[error("Setup not ready, retrying in {retry_in:?}: {reason}")]
    NotReady { reason: String, retry_in: Duration },

    #[error(transparent)]
    InvalidTransition(#[from] InvalidTransition),

    #[error("Storage error: {0}")]
    Storage(#[from] ha_registries::StorageError),
}

pub type ConfigEntriesResult<T> = Result<T, ConfigEntriesError>;

/// Config entries data for storage
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigEntriesData {
    pub entries: Vec<ConfigEntry>,
}

impl Storable for ConfigEntriesData {
    const KEY: &'static str = STORAGE_KEY;
    const VERSION: u32 = STORAGE_VERSION;
    const MINOR_VERSION: u32 = STORAGE_MINOR_VERSION;
}

/// Config Entries store
pub struct ConfigEntries {
    storage: Arc<Storage>,

    /// Primary index: entry_id -> ConfigEntry
    entries: DashMap<String, ConfigEntry>,

    /// Index: domain -> set of entry_ids
    by_domain: DashMap<String, HashSet<String>>,

    /// Index: (domain, unique_id) -> entry_id
    by_unique_id: DashMap<(String, String), String>,

    /// Entries waiting for the user to re-authenticate
    reauth: DashSet<String>,
}

impl ConfigEntries {
    pub fn new(storage: Arc<Storage>) -> Self {
        Self {
            storage,
            entries: DashMap::new(),
            by_domain: DashMap::new(),
            by_unique_id: DashMap::new(),
            reauth: DashSet::new(),
        }
    }

    /// Load entries from storage
    pub async fn load(&self) -> StorageResult<()> {
        if let Some(storage_file) = self.storage.load::<ConfigEntriesData>().await? {
            info!(
                "Loading {} config entries from storage (v{}.{})",
                storage_file.data.entries.len(),
                storage_file.version,
                storage_file.minor_version
            );
            for entry in storage_file.data.entries {
                self.index_entry(entry);
            }
        }
        Ok(())
    }

    /// Save entries to storage
    pub async fn save(&self) -> StorageResult<()> {
        let mut entries: Vec<ConfigEntry> =
            self.entries.iter().map(|r| r.value().clone()).collect();
        entries.sort_by_key(|e| e.created_at);

        self.storage.save(&ConfigEntriesData { entries }).await?;
        debug!("Saved {} config entries to storage", self.entries.len());
        Ok(())
    }

    fn index_entry(&self, entry: ConfigEntry) {
        let entry_id = entry.entry_id.clone();

        self.by_domain
            .entry(entry.domain.clone())
            .or_default()
            .insert(entry_id.clone());

        if let Some(ref unique_id) = entry.unique_id {
            self.by_unique_id
                .insert((entry.domain.clone(), unique_id.clone()), entry_id.clone());
        }

        self.entries.insert(entry_id, entry);
    }

    fn unindex_entry(&self, entry: &ConfigEntry) {
        if let Some(mut ids) = self.by_domain.get_mut(&entry.domain) {
            ids.remove(&entry.entry_id);
        }

        if let Some(ref unique_id) = entry.unique_id {
            self.by_unique_id
                .remove(&(entry.domain.clone(), unique_id.clone()));
        }

        self.entries.remove(&entry.entry_id);
    }

    /// Get an entry by ID
    pub fn get(&self, entry_id: &str) -> Option<ConfigEntry> {
        self.entries.get(entry_id).map(|r| r.value().clone())
    }

    /// Get all entries for a domain
    pub fn get_by_domain(&self, domain: &str) -> Vec<ConfigEntry> {
        self.by_domain
            .get(domain)
            .map(|ids| ids.iter().filter_map(|id| self.get(id)).collect())
            .unwrap_or_default()
    }

    pub fn get_by_unique_id(&self, domain: &str, unique_id: &str) -> Option<ConfigEntry> {
        self.by_unique_id
            .get(&(domain.to_string(), unique_id.to_string()))
            .and_then(|entry_id| self.get(&entry_id))
    }

    /// Add a new config entry
    pub async fn add(&self, entry: ConfigEntry) -> ConfigEntriesResult<ConfigEntry> {
        if let Some(ref unique_id) = entry.unique_id {
            if self.get_by_unique_id(&entry.domain, unique_id).is_some() {
                return Err(ConfigEntriesError::AlreadyExists {
                    domain: entry.domain.clone(),
                    unique_id: unique_id.clone(),
                });
            }
        }

        self.index_entry(entry.clone());
        self.save().await?;

        info!(
            "Added config entry: {} ({}) [{}]",
            entry.title, entry.domain, entry.entry_id
        );
        Ok(entry)
    }

    /// Update an existing entry and persist it
    pub async fn update(
        &self,
        entry_id: &str,
        update: ConfigEntryUpdate,
    ) -> ConfigEntriesResult<ConfigEntry> {
        // Mutate in place so concurrent readers never see the entry missing
        let updated = {
            let mut entry = self
                .entries
                .get_mut(entry_id)
                .ok_or_else(|| ConfigEntriesError::NotFound(entry_id.to_string()))?;

            if let Some(title) = update.title {
                entry.title = title;
            }
            if let Some(data) = update.data {
                entry.data = data;
            }
            if let Some(unique_id) = update.unique_id {
                if let Some(old) = entry.unique_id.take() {
                    self.by_unique_id.remove(&(entry.domain.clone(), old));
                }
                if let Some(ref new) = unique_id {
                    self.by_unique_id
                        .insert((entry.domain.clone(), new.clone()), entry_id.to_string());
                }
                entry.unique_id = unique_id;
            }
            entry.modified_at = Utc::now();
            entry.clone()
        };

        self.save().await?;

        debug!("Updated config entry: {}", entry_id);
        Ok(updated)
    }

    /// Remove an entry and persist the removal
    pub async fn remove(&self, entry_id: &str) -> ConfigEntriesResult<ConfigEntry> {
        let entry = self
            .get(entry_id)
            .ok_or_else(|| ConfigEntriesError::NotFound(entry_id.to_string()))?;

        self.unindex_entry(&entry);
        self.reauth.remove(entry_id);
        self.save().await?;

        info!(
            "Removed config entry: {} ({}) [{}]",
            entry.title, entry.domain, entry_id
        );
        Ok(entry)
    }

    /// Move an entry to a new lifecycle state, validating the transition
    pub fn transition(
        &self,
        entry_id: &str,
        state: ConfigEntryState,
        reason: Option<String>,
    ) -> ConfigEntriesResult<ConfigEntry> {
        let mut entry = self
            .entries
            .get_mut(entry_id)
            .ok_or_else(|| ConfigEntriesError::NotFound(entry_id.to_string()))?;

        entry.try_set_state(state, reason)?;
        debug!("Entry {} state changed to {:?}", entry_id, state);
        Ok(entry.clone())
    }

    /// Increment the retry counter and return the new count
    pub fn increment_tries(&self, entry_id: &str) -> u32 {
        self.entries
            .get_mut(entry_id)
            .map(|mut e| {
                e.tries += 1;
                e.tries
            })
            .unwrap_or(0)
    }

    /// Record that an entry needs the user to re-authenticate
    pub fn start_reauth(&self, entry_id: &str) {
        if self.reauth.insert(entry_id.to_string()) {
            info!("Re-authentication required for entry {}", entry_id);
        }
    }

    pub fn reauth_in_progress(&self, entry_id: &str) -> bool {
        self.reauth.contains(entry_id)
    }

    pub fn finish_reauth(&self, entry_id: &str) {
        self.reauth.remove(entry_id);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::ConfigEntrySource;
    use serde_json::json;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn create_test_manager() -> (TempDir, ConfigEntries) {
        let temp_dir = TempDir::new().unwrap();
        let storage = Arc::new(Storage::new(temp_dir.path()));
        (temp_dir, ConfigEntries::new(storage))
    }

    #[tokio::test]
    async fn test_duplicate_unique_id_rejected() {
        let (_dir, manager) = create_test_manager();

        manager
            .add(ConfigEntry::new("tuya", "Account 1").with_unique_id("same-id"))
            .await
            .unwrap();
        let result = manager
            .add(ConfigEntry::new("tuya", "Account 2").with_unique_id("same-id"))
            .await;

        assert!(matches!(
            result,
            Err(ConfigEntriesError::AlreadyExists { .. })
        ));
    }

    #[tokio::test]
    async fn test_get_by_domain() {
        let (_dir, manager) = create_test_manager();

        manager.add(ConfigEntry::new("tuya", "A")).await.unwrap();
        manager.add(ConfigEntry::new("tuya", "B")).await.unwrap();
        manager.add(ConfigEntry::new("hue", "C")).await.unwrap();

        assert_eq!(manager.get_by_domain("tuya").len(), 2);
        assert_eq!(manager.get_by_domain("hue").len(), 1);
    }

    #[tokio::test]
    async fn test_update_replaces_data() {
        let (_dir, manager) = create_test_manager();

        let mut data = HashMap::new();
        data.insert("user_code".to_string(), json!("abc"));
        let entry = manager
            .add(ConfigEntry::new("tuya", "Tuya").with_data(data.clone()))
            .await
            .unwrap();

        data.insert("token_info".to_string(), json!({"t": 1}));
        let updated = manager
            .update(&entry.entry_id, ConfigEntryUpdate::new().data(data))
            .await
            .unwrap();

        assert_eq!(updated.data["token_info"], json!({"t": 1}));
        assert_eq!(updated.data["user_code"], json!("abc"));
        assert!(updated.modified_at >= entry.modified_at);
    }

    #[tokio::test]
    async fn test_update_reindexes_unique_id() {
        let (_dir, manager) = create_test_manager();
        let entry = manager
            .add(ConfigEntry::new("tuya", "Tuya").with_unique_id("old-uid"))
            .await
            .unwrap();

        manager
            .update(
                &entry.entry_id,
                ConfigEntryUpdate::new().unique_id(Some("new-uid".into())),
            )
            .await
            .unwrap();

        assert!(manager.get_by_unique_id("tuya", "old-uid").is_none());
        assert_eq!(
            manager.get_by_unique_id("tuya", "new-uid").unwrap().entry_id,
            entry.entry_id
        );
    }

    #[tokio::test]
    async fn test_update_missing_entry() {
        let (_dir, manager) = create_test_manager();
        let result = manager
            .update("missing", ConfigEntryUpdate::new().title("x"))
            .await;
        assert!(matches!(result, Err(ConfigEntriesError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_transition_is_validated() {
        let (_dir, manager) = create_test_manager();
        let entry = manager.add(ConfigEntry::new("tuya", "Tuya")).await.unwrap();

        let result = manager.transition(&entry.entry_id, ConfigEntryState::Loaded, None);
        assert!(matches!(
            result,
            Err(ConfigEntriesError::InvalidTransition(_))
        ));

        manager
            .transition(&entry.entry_id, ConfigEntryState::SetupInProgress, None)
            .unwrap();
        let loaded = manager
            .transition(&entry.entry_id, ConfigEntryState::Loaded, None)
            .unwrap();
        assert!(loaded.is_loaded());
    }

    #[tokio::test]
    async fn test_reauth_tracking() {
        let (_dir, manager) = create_test_manager();
        let entry = manager.add(ConfigEntry::new("tuya", "Tuya")).await.unwrap();

        manager.start_reauth(&entry.entry_id);
        assert!(manager.reauth_in_progress(&entry.entry_id));

        manager.remove(&entry.entry_id).await.unwrap();
        assert!(!manager.reauth_in_progress(&entry.entry_id));
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let storage = Arc::new(Storage::new(temp_dir.path()));

        {
            let manager = ConfigEntries::new(storage.clone());
            manager
                .add(
                    ConfigEntry::new("tuya", "Tuya")
                        .with_unique_id("user-123")
                        .with_source(ConfigEntrySource::Import),
                )
                .await
                .unwrap();
        }

        let manager = ConfigEntries::new(storage);
        manager.load().await.unwrap();

        assert_eq!(manager.len(), 1);
        let entry = manager.get_by_unique_id("tuya", "user-123").unwrap();
        assert_eq!(entry.title, "Tuya");
        assert_eq!(entry.source, ConfigEntrySource::Import);
        assert_eq!(entry.state, ConfigEntryState::NotLoaded);
    }
}
