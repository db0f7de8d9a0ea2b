//! Device Registry
//!
//! Tracks registered devices by internal id, by `(domain, id)` identifier,
//! and by owning config entry.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::storage::{Storable, Storage, StorageResult};

/// Storage key for device registry
pub const STORAGE_KEY: &str = "core.device_registry";
/// Current storage version
pub const STORAGE_VERSION: u32 = 1;
/// Current minor version
pub const STORAGE_MINOR_VERSION: u32 = 12;

/// A device identifier (domain, id) pair
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceIdentifier(pub String, pub String);

impl DeviceIdentifier {
    pub fn new(domain: impl Into<String>, id: impl Into<String>) -> Self {
        Self(domain.into(), id.into())
    }

    pub fn domain(&self) -> &str {
        &self.0
    }

    pub fn id(&self) -> &str {
        &self.1
    }

    /// Create a key for indexing
    pub fn key(&self) -> String {
        format!("{}:{}", self.0, self.1)
    }
}

/// A registered device entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceEntry {
    /// Internal UUID
    pub id: String,

    /// Unique identifiers by domain (e.g., [["tuya", "bf1234"]])
    #[serde(default)]
    pub identifiers: Vec<DeviceIdentifier>,

    /// Associated config entries
    #[serde(default)]
    pub config_entries: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manufacturer: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,

    #[serde(default = "Utc::now")]
    pub modified_at: DateTime<Utc>,
}

impl DeviceEntry {
    /// Identifier ids belonging to `domain`
    pub fn ids_for_domain<'a>(&'a self, domain: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.identifiers
            .iter()
            .filter(move |i| i.domain() == domain)
            .map(|i| i.id())
    }
}

/// Attributes passed to [`DeviceRegistry::get_or_create`]
#[derive(Debug, Clone, Default)]
pub struct DeviceInfo {
    pub config_entry_id: String,
    pub identifiers: Vec<DeviceIdentifier>,
    pub manufacturer: Option<String>,
    pub name: Option<String>,
    pub model: Option<String>,
}

impl DeviceInfo {
    pub fn new(config_entry_id: impl Into<String>) -> Self {
        Self {
            config_entry_id: config_entry_id.into(),
            ..Default::default()
        }
    }

    pub fn identifier(mut self, domain: impl Into<String>, id: impl Into<String>) -> Self {
        self.identifiers.push(DeviceIdentifier::new(domain, id));
        self
    }

    pub fn manufacturer(mut self, manufacturer: impl Into<String>) -> Self {
        self.manufacturer = Some(manufacturer.into());
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }
}

/// Device registry data for storage
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeviceRegistryData {
    pub devices: Vec<DeviceEntry>,
}

impl Storable for DeviceRegistryData {
    const KEY: &'static str = STORAGE_KEY;
    const VERSION: u32 = STORAGE_VERSION;
    const MINOR_VERSION: u32 = STORAGE_MINOR_VERSION;
}

/// Device Registry with multi-index support
///
/// Entries are stored as `Arc<DeviceEntry>` to avoid cloning on reads.
pub struct DeviceRegistry {
    storage: Arc<Storage>,

    /// Primary index: device_id -> DeviceEntry
    by_id: DashMap<String, Arc<DeviceEntry>>,

    /// Index: identifier key -> device_id
    by_identifier: DashMap<String, String>,

    /// Index: config_entry_id -> set of device_ids
    by_config_entry_id: DashMap<String, HashSet<String>>,
}

impl DeviceRegistry {
    pub fn new(storage: Arc<Storage>) -> Self {
        Self {
            storage,
            by_id: DashMap::new(),
            by_identifier: DashMap::new(),
            by_config_entry_id: DashMap::new(),
        }
    }

    /// Load from storage
    pub async fn load(&self) -> StorageResult<()> {
        if let Some(storage_file) = self.storage.load::<DeviceRegistryData>().await? {
            info!(
                "Loading {} devices from storage (v{}.{})",
                storage_file.data.devices.len(),
                storage_file.version,
                storage_file.minor_version
            );
            for entry in storage_file.data.devices {
                self.index_entry(Arc::new(entry));
            }
        }
        Ok(())
    }

    /// Save to storage
    pub async fn save(&self) -> StorageResult<()> {
        let mut devices: Vec<DeviceEntry> =
            self.by_id.iter().map(|r| (**r.value()).clone()).collect();
        devices.sort_by_key(|d| d.created_at);

        self.storage.save(&DeviceRegistryData { devices }).await?;
        debug!("Saved {} devices to storage", self.by_id.len());
        Ok(())
    }

    fn index_entry(&self, entry: Arc<DeviceEntry>) {
        let device_id = entry.id.clone();

        for identifier in &entry.identifiers {
            self.by_identifier
                .insert(identifier.key(), device_id.clone());
        }

        for config_entry_id in &entry.config_entries {
            self.by_config_entry_id
                .entry(config_entry_id.clone())
                .or_default()
                .insert(device_id.clone());
        }

        self.by_id.insert(device_id, entry);
    }

    fn unindex_entry(&self, entry: &DeviceEntry) {
        for identifier in &entry.identifiers {
            self.by_identifier
                .remove_if(&identifier.key(), |_, id| *id == entry.id);
        }

        for config_entry_id in &entry.config_entries {
            if let Some(mut ids) = self.by_config_entry_id.get_mut(config_entry_id) {
                ids.remove(&entry.id);
            }
        }
    }

    /// Get device by internal id
    pub fn get(&self, device_id: &str) -> Option<Arc<DeviceEntry>> {
        self.by_id.get(device_id).map(|r| Arc::clone(r.value()))
    }

    /// Get a device matching any of the given identifiers
    pub fn get_device(&self, identifiers: &[DeviceIdentifier]) -> Option<Arc<DeviceEntry>> {
        identifiers.iter().find_map(|identifier| {
            self.by_identifier
                .get(&identifier.key())
                .and_then(|device_id| self.get(&device_id))
        })
    }

    /// Get all devices for a config entry
    pub fn get_by_config_entry_id(&self, config_entry_id: &str) -> Vec<Arc<DeviceEntry>> {
        self.by_config_entry_id
            .get(config_entry_id)
            .map(|ids| ids.iter().filter_map(|id| self.get(id)).collect())
            .unwrap_or_default()
    }

    /// Get or create a device
    ///
    /// An existing device matched by identifier gets the config entry added
    /// and its name, manufacturer and model refreshed from `info`.
    pub fn get_or_create(&self, info: DeviceInfo) -> Arc<DeviceEntry> {
        if let Some(existing) = self.get_device(&info.identifiers) {
            debug!("Found existing device by identifier: {}", existing.id);
            let device_id = existing.id.clone();
            return self
                .update(&device_id, |entry| {
                    if !entry.config_entries.contains(&info.config_entry_id) {
                        entry.config_entries.push(info.config_entry_id.clone());
                    }
                    for identifier in &info.identifiers {
                        if !entry.identifiers.contains(identifier) {
                            entry.identifiers.push(identifier.clone());
                        }
                    }
                    if info.name.is_some() {
                        entry.name = info.name.clone();
                    }
                    if info.manufacturer.is_some() {
                        entry.manufacturer = info.manufacturer.clone();
                    }
                    if info.model.is_some() {
                        entry.model = info.model.clone();
                    }
                })
                .unwrap_or(existing);
        }

        let now = Utc::now();
        let entry = Arc::new(DeviceEntry {
            id: uuid::Uuid::new_v4().simple().to_string(),
            identifiers: info.identifiers,
            config_entries: vec![info.config_entry_id],
            name: info.name,
            manufacturer: info.manufacturer,
            model: info.model,
            created_at: now,
            modified_at: now,
        });
        self.index_entry(Arc::clone(&entry));

        info!("Registered new device: {:?} ({})", entry.name, entry.id);
        entry
    }

    /// Update a device entry
    ///
    /// Returns the updated entry, or None if the device does not exist.
    pub fn update<F>(&self, device_id: &str, f: F) -> Option<Arc<DeviceEntry>>
    where
        F: FnOnce(&mut DeviceEntry),
    {
        // Remove first so no shard lock is held while re-indexing
        let (_, old) = self.by_id.remove(device_id)?;
        self.unindex_entry(&old);

        let mut entry = (*old).clone();
        f(&mut entry);
        if entry.identifiers != old.identifiers
            || entry.config_entries != old.config_entries
            || entry.name != old.name
            || entry.manufacturer != old.manufacturer
            || entry.model != old.model
        {
            entry.modified_at = Utc::now();
        }

        let entry = Arc::new(entry);
        self.index_entry(Arc::clone(&entry));
        Some(entry)
    }

    /// Remove a device by internal id
    pub fn remove_device(&self, device_id: &str) -> Option<Arc<DeviceEntry>> {
        let (_, entry) = self.by_id.remove(device_id)?;
        self.unindex_entry(&entry);
        info!("Removed device: {}", device_id);
        Some(entry)
    }

    /// Detach a config entry from all its devices
    ///
    /// Devices left without any config entry are removed.
    pub fn clear_config_entry(&self, config_entry_id: &str) {
        for device in self.get_by_config_entry_id(config_entry_id) {
            if device.config_entries.len() <= 1 {
                self.remove_device(&device.id);
            } else {
                self.update(&device.id, |e| {
                    e.config_entries.retain(|id| id != config_entry_id);
                });
            }
        }
        self.by_config_entry_id.remove(config_entry_id);
    }

    pub fn device_ids(&self) -> Vec<String> {
        self.by_id.iter().map(|r| r.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// Iterate over all entries
    ///
    /// Collect before mutating the registry from the loop body.
    pub fn iter(&self) -> impl Iterator<Item = Arc<DeviceEntry>> + '_ {
        self.by_id.iter().map(|r| Arc::clone(r.value()))
    }
}
