//! The central Home Assistant instance
//!
//! Bundles the host services integrations use and drives config entry
//! lifecycle: setup, unload, reload, removal and platform forwarding.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

use dashmap::DashMap;
use ha_core::JobScheduler;
use ha_dispatcher::Dispatcher;
use ha_registries::{DeviceRegistry, Storage, StorageResult};
use tracing::{debug, info, trace, warn};

use crate::entry::{ConfigEntry, ConfigEntryState, ConfigEntryUpdate};
use crate::integration::{EntityPlatform, Integration, Platform, SetupError};
use crate::manager::{ConfigEntries, ConfigEntriesError, ConfigEntriesResult};
use crate::state_machine::calculate_retry_delay;

/// The central Home Assistant instance
pub struct HomeAssistant {
    /// Cooperative job queue and blocking executor
    pub jobs: JobScheduler,
    /// Signal dispatcher
    pub dispatcher: Arc<Dispatcher>,
    /// Device registry
    pub devices: Arc<DeviceRegistry>,
    /// Config entry store
    pub config_entries: ConfigEntries,
    integrations: DashMap<String, Arc<dyn Integration>>,
    platforms: DashMap<(String, Platform), Arc<dyn EntityPlatform>>,
    /// entry_id -> platforms set up for it
    loaded_platforms: DashMap<String, BTreeSet<Platform>>,
}

impl HomeAssistant {
    /// Create a new instance persisting into `<config_dir>/.storage`
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(config_dir: impl AsRef<Path>) -> Arc<Self> {
        let storage = Arc::new(Storage::new(config_dir));

        Arc::new(Self {
            jobs: JobScheduler::start(),
            dispatcher: Arc::new(Dispatcher::new()),
            devices: Arc::new(DeviceRegistry::new(storage.clone())),
            config_entries: ConfigEntries::new(storage),
            integrations: DashMap::new(),
            platforms: DashMap::new(),
            loaded_platforms: DashMap::new(),
        })
    }

    /// Load persisted devices and config entries
    pub async fn load(&self) -> StorageResult<()> {
        self.devices.load().await?;
        self.config_entries.load().await
    }

    /// Persist devices and config entries
    pub async fn save(&self) -> StorageResult<()> {
        self.devices.save().await?;
        self.config_entries.save().await
    }

    pub fn register_integration(&self, integration: Arc<dyn Integration>) {
        let domain = integration.domain().to_string();
        debug!("Registered integration: {}", domain);
        self.integrations.insert(domain, integration);
    }

    pub fn register_platform(
        &self,
        domain: impl Into<String>,
        platform: Platform,
        handler: Arc<dyn EntityPlatform>,
    ) {
        let domain = domain.into();
        debug!("Registered platform {} for {}", platform, domain);
        self.platforms.insert((domain, platform), handler);
    }

    fn integration(&self, domain: &str) -> ConfigEntriesResult<Arc<dyn Integration>> {
        self.integrations
            .get(domain)
            .map(|i| Arc::clone(i.value()))
            .ok_or_else(|| ConfigEntriesError::UnknownIntegration(domain.to_string()))
    }

    fn get_entry(&self, entry_id: &str) -> ConfigEntriesResult<ConfigEntry> {
        self.config_entries
            .get(entry_id)
            .ok_or_else(|| ConfigEntriesError::NotFound(entry_id.to_string()))
    }

    /// Set up a config entry through its integration
    ///
    /// Authentication failures leave the entry in `SetupError` with a pending
    /// re-auth; other failures leave it in `SetupRetry` and report the backoff
    /// delay before the next attempt.
    pub async fn async_setup_entry(self: &Arc<Self>, entry_id: &str) -> ConfigEntriesResult<()> {
        let entry = self.get_entry(entry_id)?;
        if entry.is_disabled() {
            debug!("Skipping setup for disabled entry: {}", entry_id);
            return Ok(());
        }

        let integration = self.integration(&entry.domain)?;
        let entry = self.config_entries.transition(
            entry_id,
            ConfigEntryState::SetupInProgress,
            None,
        )?;

        match integration.async_setup_entry(self, &entry).await {
            Ok(()) => {
                self.config_entries
                    .transition(entry_id, ConfigEntryState::Loaded, None)?;
                self.config_entries.finish_reauth(entry_id);
                info!("Setup completed for entry: {} ({})", entry.title, entry_id);
                Ok(())
            }
            Err(SetupError::AuthFailed(reason)) => {
                self.unload_partial_setup(&entry).await;
                warn!("Authentication failed for entry {}: {}", entry_id, reason);
                self.config_entries.transition(
                    entry_id,
                    ConfigEntryState::SetupError,
                    Some(reason.clone()),
                )?;
                self.config_entries.start_reauth(entry_id);
                Err(ConfigEntriesError::AuthFailed(reason))
            }
            Err(SetupError::NotReady(reason)) => {
                self.unload_partial_setup(&entry).await;
                self.config_entries.transition(
                    entry_id,
                    ConfigEntryState::SetupRetry,
                    Some(reason.clone()),
                )?;
                let retry_in = calculate_retry_delay(entry.tries);
                self.config_entries.increment_tries(entry_id);
                warn!(
                    "Setup of entry {} not ready, retrying in {:?}: {}",
                    entry_id, retry_in, reason
                );
                Err(ConfigEntriesError::NotReady { reason, retry_in })
            }
        }
    }

    /// Unload platforms a failed setup already forwarded the entry to
    async fn unload_partial_setup(self: &Arc<Self>, entry: &ConfigEntry) {
        let loaded: Vec<Platform> = self
            .loaded_platforms
            .get(&entry.entry_id)
            .map(|loaded| loaded.iter().copied().collect())
            .unwrap_or_default();
        if loaded.is_empty() {
            return;
        }

        debug!(
            "Unloading {} platform(s) after failed setup of {}",
            loaded.len(),
            entry.entry_id
        );
        if !self.async_unload_platforms(entry, &loaded).await {
            warn!("Platforms of entry {} did not unload cleanly", entry.entry_id);
        }
    }

    /// Unload a config entry; returns whether the integration fully unloaded
    pub async fn async_unload_entry(self: &Arc<Self>, entry_id: &str) -> ConfigEntriesResult<bool> {
        let entry = self.get_entry(entry_id)?;
        if !entry.state.is_recoverable() {
            return Err(ConfigEntriesError::CannotUnload(entry.state));
        }
        if entry.state == ConfigEntryState::NotLoaded {
            return Ok(true);
        }

        let integration = self.integration(&entry.domain)?;
        self.config_entries
            .transition(entry_id, ConfigEntryState::UnloadInProgress, None)?;

        // Only a loaded entry has anything for the integration to tear down
        let unloaded = if entry.state == ConfigEntryState::Loaded {
            integration.async_unload_entry(self, &entry).await
        } else {
            true
        };

        if unloaded {
            self.config_entries
                .transition(entry_id, ConfigEntryState::NotLoaded, None)?;
            info!("Unloaded entry: {} ({})", entry.title, entry_id);
        } else {
            self.config_entries.transition(
                entry_id,
                ConfigEntryState::FailedUnload,
                Some("integration failed to unload".to_string()),
            )?;
            warn!("Failed to unload entry: {} ({})", entry.title, entry_id);
        }
        Ok(unloaded)
    }

    /// Reload an entry (unload + setup)
    pub async fn async_reload_entry(self: &Arc<Self>, entry_id: &str) -> ConfigEntriesResult<()> {
        if !self.async_unload_entry(entry_id).await? {
            return Err(ConfigEntriesError::CannotUnload(
                ConfigEntryState::FailedUnload,
            ));
        }
        self.async_setup_entry(entry_id).await
    }

    /// Delete a config entry
    ///
    /// Unloads it if needed, lets the integration release its resources,
    /// detaches it from the device registry and removes it from storage.
    pub async fn async_remove_entry(self: &Arc<Self>, entry_id: &str) -> ConfigEntriesResult<()> {
        let entry = self.get_entry(entry_id)?;

        if entry.state.is_recoverable() && entry.state != ConfigEntryState::NotLoaded {
            self.async_unload_entry(entry_id).await?;
        }

        match self.integration(&entry.domain) {
            Ok(integration) => integration.async_remove_entry(self, &entry).await,
            Err(_) => debug!("No integration loaded for removed entry {}", entry_id),
        }

        self.devices.clear_config_entry(entry_id);
        self.loaded_platforms.remove(entry_id);
        self.config_entries.remove(entry_id).await?;
        self.devices.save().await?;
        Ok(())
    }

    /// Update an entry and persist it
    pub async fn async_update_entry(
        &self,
        entry_id: &str,
        update: ConfigEntryUpdate,
    ) -> ConfigEntriesResult<ConfigEntry> {
        self.config_entries.update(entry_id, update).await
    }

    /// Forward an entry to the integration's entity platforms
    ///
    /// Platforms without a registered handler are skipped.
    pub async fn async_forward_entry_setups(
        self: &Arc<Self>,
        entry: &ConfigEntry,
        platforms: &[Platform],
    ) -> Result<(), SetupError> {
        for &platform in platforms {
            let handler = self
                .platforms
                .get(&(entry.domain.clone(), platform))
                .map(|h| Arc::clone(h.value()));
            let Some(handler) = handler else {
                trace!("No {} platform registered for {}", platform, entry.domain);
                continue;
            };

            handler.async_setup_entry(self, entry).await?;
            self.loaded_platforms
                .entry(entry.entry_id.clone())
                .or_default()
                .insert(platform);
            debug!("Forwarded entry {} to {}", entry.entry_id, platform);
        }
        Ok(())
    }

    /// Unload the given platforms for an entry; returns whether all unloaded
    pub async fn async_unload_platforms(
        self: &Arc<Self>,
        entry: &ConfigEntry,
        platforms: &[Platform],
    ) -> bool {
        let mut all_unloaded = true;

        for &platform in platforms {
            if !self.platform_loaded(&entry.entry_id, platform) {
                continue;
            }
            let handler = self
                .platforms
                .get(&(entry.domain.clone(), platform))
                .map(|h| Arc::clone(h.value()));
            let unloaded = match handler {
                Some(handler) => handler.async_unload_entry(self, entry).await,
                None => true,
            };

            if unloaded {
                if let Some(mut loaded) = self.loaded_platforms.get_mut(&entry.entry_id) {
                    loaded.remove(&platform);
                }
            } else {
                warn!("Platform {} failed to unload entry {}", platform, entry.entry_id);
                all_unloaded = false;
            }
        }
        all_unloaded
    }

    /// Whether `platform` currently has `entry_id` set up
    pub fn platform_loaded(&self, entry_id: &str, platform: Platform) -> bool {
        self.loaded_platforms
            .get(entry_id)
            .is_some_and(|loaded| loaded.contains(&platform))
    }
}
