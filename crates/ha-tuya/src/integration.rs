//! Config entry lifecycle for the Tuya integration
//!
//! One sharing session manager is kept per config entry. Sessions survive
//! unload/setup cycles (reloads) and are only released when the entry is
//! removed.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use ha_config_entries::{ConfigEntry, HomeAssistant, Integration, SetupError};
use ha_core::HA_VERSION;
use ha_registries::DeviceInfo;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::{requires_reauth, TuyaConfig, TuyaEntryData};
use crate::consts::{DOMAIN, MANUFACTURER, PLATFORMS};
use crate::error::{TuyaError, TuyaResult};
use crate::listener::{DeviceListener, TokenListener};
use crate::sharing::{CustomerDevice, ManagerFactory, SharingDeviceListener, SharingManager};

/// Session state kept for one config entry
#[derive(Clone)]
pub struct TuyaData {
    pub manager: Arc<dyn SharingManager>,
    pub listener: Arc<dyn SharingDeviceListener>,
}

/// The Tuya integration
pub struct TuyaIntegration {
    factory: Arc<dyn ManagerFactory>,
    config: TuyaConfig,
    /// entry_id -> session; `None` until the first session is created and
    /// again once the last one is removed
    sessions: Mutex<Option<HashMap<String, TuyaData>>>,
}

impl TuyaIntegration {
    pub fn new(factory: Arc<dyn ManagerFactory>, config: TuyaConfig) -> Self {
        Self {
            factory,
            config,
            sessions: Mutex::new(None),
        }
    }

    /// Session stored for an entry, if any
    pub async fn session(&self, entry_id: &str) -> Option<TuyaData> {
        self.sessions
            .lock()
            .await
            .as_ref()
            .and_then(|sessions| sessions.get(entry_id).cloned())
    }

    /// Whether any session namespace exists
    pub async fn has_sessions(&self) -> bool {
        self.sessions.lock().await.is_some()
    }

    /// Reuse the entry's session or build a new one
    async fn get_or_create_session(
        &self,
        hass: &Arc<HomeAssistant>,
        entry: &ConfigEntry,
    ) -> TuyaResult<TuyaData> {
        if requires_reauth(entry) {
            return Err(TuyaError::AuthRequired);
        }

        let mut guard = self.sessions.lock().await;
        if let Some(existing) = guard.as_ref().and_then(|s| s.get(&entry.entry_id)) {
            debug!("Reusing session for entry {}", entry.entry_id);
            return Ok(existing.clone());
        }

        let credentials =
            TuyaEntryData::from_entry(entry)?.into_credentials(&self.config.client_id);
        let token_listener = Arc::new(TokenListener::new(hass, entry.entry_id.clone()));
        let manager = self.factory.create(credentials, token_listener);

        let listener: Arc<dyn SharingDeviceListener> = Arc::new(DeviceListener::new(hass));
        manager.add_device_listener(listener.clone());

        let data = TuyaData { manager, listener };
        guard
            .get_or_insert_with(HashMap::new)
            .insert(entry.entry_id.clone(), data.clone());
        info!("Created sharing session for entry {}", entry.entry_id);
        Ok(data)
    }

    /// Drop the entry's session; the namespace goes with the last one
    async fn release_session(&self, entry_id: &str) {
        let mut guard = self.sessions.lock().await;
        if let Some(sessions) = guard.as_mut() {
            sessions.remove(entry_id);
            if sessions.is_empty() {
                *guard = None;
            }
        }
    }

    /// Report client versions upstream; failures are only logged
    async fn report_version(&self, hass: &HomeAssistant, manager: &Arc<dyn SharingManager>) {
        let manager = manager.clone();
        let integration_version = self.config.manifest.integration_version().to_string();
        let sdk_version = self.config.manifest.sharing_sdk_version().to_string();

        let result = hass
            .jobs
            .async_add_executor_job(move || {
                manager.report_version(HA_VERSION, &integration_version, &sdk_version)
            })
            .await;

        match result {
            Ok(Ok(())) => debug!("Reported version {} to Tuya", HA_VERSION),
            Ok(Err(e)) => warn!("Failed to report version to Tuya: {}", e),
            Err(e) => warn!("Version report job failed: {}", e),
        }
    }

    async fn setup_entry(&self, hass: &Arc<HomeAssistant>, entry: &ConfigEntry) -> TuyaResult<()> {
        let TuyaData { manager, .. } = self.get_or_create_session(hass, entry).await?;

        self.report_version(hass, &manager).await;

        // Get devices & clean up device entities
        let cache_manager = manager.clone();
        hass.jobs
            .async_add_executor_job(move || cache_manager.update_device_cache())
            .await?
            .map_err(TuyaError::DeviceCache)?;

        let device_map = manager.device_map();
        cleanup_device_registry(hass, &device_map);

        // Register known device IDs
        for device in device_map.values() {
            hass.devices.get_or_create(
                DeviceInfo::new(entry.entry_id.clone())
                    .identifier(DOMAIN, device.id.clone())
                    .manufacturer(MANUFACTURER)
                    .name(device.name.clone())
                    .model(format!("{} (unsupported)", device.product_name)),
            );
        }

        hass.async_forward_entry_setups(entry, PLATFORMS).await?;

        // Subscribe here even if no platform registered entities
        let mq_manager = manager.clone();
        hass.jobs
            .async_add_executor_job(move || mq_manager.refresh_mq())
            .await?
            .map_err(TuyaError::PushChannel)?;

        Ok(())
    }
}

/// Remove Tuya devices the sharing backend no longer reports
fn cleanup_device_registry(
    hass: &HomeAssistant,
    device_map: &HashMap<String, CustomerDevice>,
) {
    let stale: Vec<String> = hass
        .devices
        .iter()
        .filter(|device| {
            device
                .ids_for_domain(DOMAIN)
                .any(|id| !device_map.contains_key(id))
        })
        .map(|device| device.id.clone())
        .collect();

    for device_id in stale {
        hass.devices.remove_device(&device_id);
    }
}

#[async_trait]
impl Integration for TuyaIntegration {
    fn domain(&self) -> &str {
        DOMAIN
    }

    async fn async_setup_entry(
        &self,
        hass: &Arc<HomeAssistant>,
        entry: &ConfigEntry,
    ) -> Result<(), SetupError> {
        self.setup_entry(hass, entry).await.map_err(SetupError::from)
    }

    async fn async_unload_entry(&self, hass: &Arc<HomeAssistant>, entry: &ConfigEntry) -> bool {
        debug!("unload entry id = {}", entry.entry_id);
        hass.async_unload_platforms(entry, PLATFORMS).await
    }

    async fn async_remove_entry(&self, hass: &Arc<HomeAssistant>, entry: &ConfigEntry) {
        debug!("remove entry id = {}", entry.entry_id);
        let Some(TuyaData { manager, listener }) = self.session(&entry.entry_id).await else {
            warn!("No sharing session for removed entry {}", entry.entry_id);
            self.release_session(&entry.entry_id).await;
            return;
        };

        if manager.is_mq_running() {
            manager.stop_mq();
        }
        manager.remove_device_listener(&listener);

        let unload_manager = manager.clone();
        if let Err(e) = hass
            .jobs
            .async_add_executor_job(move || unload_manager.unload())
            .await
        {
            warn!("Failed to release session for entry {}: {}", entry.entry_id, e);
        }

        self.release_session(&entry.entry_id).await;
    }
}
