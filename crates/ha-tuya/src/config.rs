//! Typed view of Tuya config entry data and integration settings

use ha_config_entries::ConfigEntry;
use serde::Deserialize;

use crate::consts::{CONF_APP_TYPE, TUYA_CLIENT_ID};
use crate::error::{TuyaError, TuyaResult};
use crate::manifest::IntegrationManifest;
use crate::sharing::ManagerCredentials;

/// Credentials stored in a Tuya config entry
#[derive(Debug, Clone, Deserialize)]
pub struct TuyaEntryData {
    pub user_code: String,
    pub terminal_id: String,
    pub endpoint: String,
    #[serde(default)]
    pub token_info: serde_json::Value,
}

impl TuyaEntryData {
    /// Parse the credential keys out of an entry; other keys are ignored
    pub fn from_entry(entry: &ConfigEntry) -> TuyaResult<Self> {
        let data = serde_json::Value::Object(
            entry
                .data
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        );
        serde_json::from_value(data).map_err(|source| TuyaError::InvalidEntry {
            entry_id: entry.entry_id.clone(),
            source,
        })
    }

    pub fn into_credentials(self, client_id: &str) -> ManagerCredentials {
        ManagerCredentials {
            client_id: client_id.to_string(),
            user_code: self.user_code,
            terminal_id: self.terminal_id,
            endpoint: self.endpoint,
            token_info: self.token_info,
        }
    }
}

/// Whether the entry still carries the legacy login marker
pub fn requires_reauth(entry: &ConfigEntry) -> bool {
    entry.data.contains_key(CONF_APP_TYPE)
}

/// Integration-wide settings
#[derive(Debug, Clone)]
pub struct TuyaConfig {
    pub client_id: String,
    pub manifest: IntegrationManifest,
}

impl TuyaConfig {
    /// Settings from the bundled manifest and the registered client id
    pub fn load() -> TuyaResult<Self> {
        Ok(Self {
            client_id: TUYA_CLIENT_ID.to_string(),
            manifest: IntegrationManifest::bundled().map_err(TuyaError::Manifest)?,
        })
    }

    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = client_id.into();
        self
    }
}
