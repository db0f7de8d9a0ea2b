//! Integration and entity platform traits
//!
//! An [`Integration`] binds config entries of one domain to whatever it
//! talks to. Entity platforms (light, switch, ...) are registered separately
//! per domain and receive entries forwarded by the integration.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::entry::ConfigEntry;
use crate::hass::HomeAssistant;

/// Error returned by integration and platform setup
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SetupError {
    /// Credentials rejected; the user must re-authenticate
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    /// Transient failure; the host retries with backoff
    #[error("not ready: {0}")]
    NotReady(String),
}

/// Entity platforms an integration can forward entries to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    AlarmControlPanel,
    BinarySensor,
    Button,
    Camera,
    Climate,
    Cover,
    Fan,
    Humidifier,
    Light,
    Number,
    Scene,
    Select,
    Sensor,
    Siren,
    Switch,
    Vacuum,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::AlarmControlPanel => "alarm_control_panel",
            Platform::BinarySensor => "binary_sensor",
            Platform::Button => "button",
            Platform::Camera => "camera",
            Platform::Climate => "climate",
            Platform::Cover => "cover",
            Platform::Fan => "fan",
            Platform::Humidifier => "humidifier",
            Platform::Light => "light",
            Platform::Number => "number",
            Platform::Scene => "scene",
            Platform::Select => "select",
            Platform::Sensor => "sensor",
            Platform::Siren => "siren",
            Platform::Switch => "switch",
            Platform::Vacuum => "vacuum",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An integration handling config entries of one domain
#[async_trait]
pub trait Integration: Send + Sync {
    /// Domain this integration handles
    fn domain(&self) -> &str;

    /// Set up a config entry
    async fn async_setup_entry(
        &self,
        hass: &Arc<HomeAssistant>,
        entry: &ConfigEntry,
    ) -> Result<(), SetupError>;

    /// Unload a config entry; returns whether everything unloaded
    async fn async_unload_entry(&self, hass: &Arc<HomeAssistant>, entry: &ConfigEntry) -> bool;

    /// Called once when the entry is deleted, after it has been unloaded
    async fn async_remove_entry(&self, _hass: &Arc<HomeAssistant>, _entry: &ConfigEntry) {}
}

/// An entity platform of one integration domain
#[async_trait]
pub trait EntityPlatform: Send + Sync {
    async fn async_setup_entry(
        &self,
        hass: &Arc<HomeAssistant>,
        entry: &ConfigEntry,
    ) -> Result<(), SetupError>;

    async fn async_unload_entry(&self, hass: &Arc<HomeAssistant>, entry: &ConfigEntry) -> bool;
}
