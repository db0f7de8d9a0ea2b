//! Test Home Assistant instance with the Tuya integration registered

use std::collections::HashMap;
use std::sync::Arc;

use ha_config_entries::{ConfigEntry, HomeAssistant};
use ha_registries::DeviceInfo;
use ha_tuya::{TuyaConfig, TuyaIntegration, DOMAIN};
use serde_json::{json, Value};
use tempfile::TempDir;

use super::MockFactory;

/// Install a test subscriber once; honours RUST_LOG
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Credentials as stored by the QR-code login
pub fn entry_data() -> HashMap<String, Value> {
    serde_json::from_value(json!({
        "user_code": "usercode",
        "terminal_id": "terminal",
        "endpoint": "https://apigw.tuyaus.com",
        "token_info": {
            "access_token": "access",
            "refresh_token": "refresh",
            "expire_time": 7200,
            "t": 1700000000000u64,
            "uid": "uid"
        },
        "user_id": "uid"
    }))
    .unwrap()
}

/// Entry data written by the legacy cloud-project login
pub fn legacy_entry_data() -> HashMap<String, Value> {
    serde_json::from_value(json!({
        "tuya_app_type": "smartlife",
        "access_id": "id",
        "access_secret": "secret"
    }))
    .unwrap()
}

pub struct TestTuya {
    /// Keeps the storage directory alive
    pub dir: TempDir,
    pub hass: Arc<HomeAssistant>,
    pub integration: Arc<TuyaIntegration>,
    pub factory: Arc<MockFactory>,
}

impl TestTuya {
    pub fn new(factory: Arc<MockFactory>) -> Self {
        init_tracing();
        let dir = TempDir::new().unwrap();
        let hass = HomeAssistant::new(dir.path());
        let integration = Arc::new(TuyaIntegration::new(
            factory.clone(),
            TuyaConfig::load().unwrap(),
        ));
        hass.register_integration(integration.clone());

        Self {
            dir,
            hass,
            integration,
            factory,
        }
    }

    /// Add a config entry and return its id
    pub async fn add_entry(&self, data: HashMap<String, Value>) -> String {
        self.hass
            .config_entries
            .add(ConfigEntry::new(DOMAIN, "Tuya").with_data(data))
            .await
            .unwrap()
            .entry_id
    }

    /// Register a Tuya device directly in the device registry
    pub fn register_device(&self, entry_id: &str, device_id: &str) -> String {
        self.hass
            .devices
            .get_or_create(DeviceInfo::new(entry_id).identifier(DOMAIN, device_id))
            .id
            .clone()
    }

    /// Sorted Tuya device ids currently in the registry
    pub fn tuya_device_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .hass
            .devices
            .iter()
            .flat_map(|device| {
                device
                    .ids_for_domain(DOMAIN)
                    .map(str::to_string)
                    .collect::<Vec<_>>()
            })
            .collect();
        ids.sort();
        ids
    }
}
