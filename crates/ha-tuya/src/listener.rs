//! Listeners registered with the sharing SDK
//!
//! Both listeners are invoked on SDK worker threads. They never touch host
//! state directly; every registry, dispatcher or config entry change is
//! queued on the host job scheduler, preserving callback order.

use std::sync::{Arc, Weak};

use ha_config_entries::{ConfigEntryUpdate, HomeAssistant};
use ha_core::JobScheduler;
use ha_dispatcher::Dispatcher;
use ha_registries::{DeviceIdentifier, DeviceRegistry};
use serde_json::json;
use tracing::{debug, warn};

use crate::consts::{update_signal, CONF_TOKEN_INFO, DOMAIN, TUYA_DISCOVERY_NEW};
use crate::sharing::{CustomerDevice, SharingDeviceListener, SharingTokenListener};

/// Relays device changes into the dispatcher and device registry
pub struct DeviceListener {
    jobs: JobScheduler,
    dispatcher: Arc<Dispatcher>,
    devices: Arc<DeviceRegistry>,
}

impl DeviceListener {
    pub fn new(hass: &HomeAssistant) -> Self {
        Self {
            jobs: hass.jobs.clone(),
            dispatcher: hass.dispatcher.clone(),
            devices: hass.devices.clone(),
        }
    }

    fn schedule_remove(&self, device_id: &str) {
        let devices = self.devices.clone();
        let device_id = device_id.to_string();
        self.jobs
            .add_job(async move { remove_device_entry(&devices, &device_id) });
    }
}

impl SharingDeviceListener for DeviceListener {
    fn update_device(&self, device: &CustomerDevice) {
        debug!(
            "Received update for device {}: {:?}",
            device.id, device.status
        );
        let dispatcher = self.dispatcher.clone();
        let signal = update_signal(&device.id);
        self.jobs.add_job(async move {
            dispatcher.send(&signal, None);
        });
    }

    fn add_device(&self, device: &CustomerDevice) {
        // Ensure the device isn't present stale
        self.schedule_remove(&device.id);

        let dispatcher = self.dispatcher.clone();
        let payload = json!([device.id]);
        self.jobs.add_job(async move {
            dispatcher.send(TUYA_DISCOVERY_NEW, Some(payload));
        });
    }

    fn remove_device(&self, device_id: &str) {
        self.schedule_remove(device_id);
    }
}

/// Remove the registry entry for a Tuya device id, if any
pub fn remove_device_entry(devices: &DeviceRegistry, device_id: &str) {
    debug!("Remove device: {}", device_id);
    if let Some(entry) = devices.get_device(&[DeviceIdentifier::new(DOMAIN, device_id)]) {
        devices.remove_device(&entry.id);
    }
}

/// Writes refreshed tokens back into the config entry
pub struct TokenListener {
    hass: Weak<HomeAssistant>,
    jobs: JobScheduler,
    entry_id: String,
}

impl TokenListener {
    pub fn new(hass: &Arc<HomeAssistant>, entry_id: impl Into<String>) -> Self {
        Self {
            hass: Arc::downgrade(hass),
            jobs: hass.jobs.clone(),
            entry_id: entry_id.into(),
        }
    }
}

impl SharingTokenListener for TokenListener {
    fn update_token(&self, token_info: serde_json::Value) {
        let hass = self.hass.clone();
        let entry_id = self.entry_id.clone();

        self.jobs.add_job(async move {
            let Some(hass) = hass.upgrade() else {
                return;
            };
            let Some(entry) = hass.config_entries.get(&entry_id) else {
                warn!("Dropping token update for unknown entry {}", entry_id);
                return;
            };

            let mut data = entry.data;
            data.insert(CONF_TOKEN_INFO.to_string(), token_info);
            debug!(entry_id = %entry_id, "Update token info");

            if let Err(e) = hass
                .async_update_entry(&entry_id, ConfigEntryUpdate::new().data(data))
                .await
            {
                warn!("Failed to persist token for entry {}: {}", entry_id, e);
            }
        });
    }
}
