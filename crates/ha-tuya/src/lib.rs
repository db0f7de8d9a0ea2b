//! Tuya Integration
//!
//! Connects Tuya devices shared through the Smart Life / Tuya Smart apps.
//! Each config entry owns one sharing session; device and token changes
//! pushed by the backend flow back into the device registry, dispatcher
//! and config entry through the listeners in [`listener`].
//!
//! # Lifecycle
//!
//! - setup: build or reuse the session, sync the device registry, forward
//!   to entity platforms and open the push channel
//! - unload: unload the entity platforms; the session is kept for reloads
//! - remove: stop the push channel and release the session

pub mod config;
pub mod consts;
pub mod error;
pub mod integration;
pub mod listener;
pub mod manifest;
pub mod sharing;

pub use config::{requires_reauth, TuyaConfig, TuyaEntryData};
pub use consts::{update_signal, DOMAIN, PLATFORMS, TUYA_DISCOVERY_NEW};
pub use error::{TuyaError, TuyaResult};
pub use integration::{TuyaData, TuyaIntegration};
pub use listener::{remove_device_entry, DeviceListener, TokenListener};
pub use manifest::IntegrationManifest;
pub use sharing::{
    same_listener, CustomerDevice, ManagerCredentials, ManagerFactory, SharingDeviceListener,
    SharingError, SharingManager, SharingTokenListener,
};
