//! Device-sharing SDK surface
//!
//! The vendor SDK owns everything below this line: HTTP calls, the MQTT push
//! channel, token refresh and the device model. The integration only sees it
//! through these traits. Methods documented as blocking perform synchronous
//! I/O and must run on the host executor.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors reported by the sharing SDK
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SharingError {
    #[error("request to {endpoint} failed: {message}")]
    Request { endpoint: String, message: String },

    #[error("push channel error: {0}")]
    PushChannel(String),

    #[error("token rejected: {0}")]
    Token(String),
}

/// A device as modelled by the sharing SDK
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomerDevice {
    pub id: String,
    pub name: String,
    pub product_name: String,
    #[serde(default)]
    pub status: HashMap<String, serde_json::Value>,
}

/// Credentials a session manager is built from
#[derive(Debug, Clone, PartialEq)]
pub struct ManagerCredentials {
    pub client_id: String,
    pub user_code: String,
    pub terminal_id: String,
    pub endpoint: String,
    pub token_info: serde_json::Value,
}

/// Receives device changes; called from SDK worker threads
pub trait SharingDeviceListener: Send + Sync {
    fn update_device(&self, device: &CustomerDevice);
    fn add_device(&self, device: &CustomerDevice);
    fn remove_device(&self, device_id: &str);
}

/// Receives refreshed tokens; called from SDK worker threads
pub trait SharingTokenListener: Send + Sync {
    fn update_token(&self, token_info: serde_json::Value);
}

/// One authenticated session with the device-sharing backend
pub trait SharingManager: Send + Sync {
    /// Fetch the device list into the local cache (blocking)
    fn update_device_cache(&self) -> Result<(), SharingError>;

    /// Snapshot of the cached devices keyed by device id
    fn device_map(&self) -> HashMap<String, CustomerDevice>;

    fn add_device_listener(&self, listener: Arc<dyn SharingDeviceListener>);

    /// Detach a listener previously passed to `add_device_listener`
    fn remove_device_listener(&self, listener: &Arc<dyn SharingDeviceListener>);

    /// (Re)connect the push channel (blocking)
    fn refresh_mq(&self) -> Result<(), SharingError>;

    /// Whether a push channel is currently connected
    fn is_mq_running(&self) -> bool;

    fn stop_mq(&self);

    /// Release the session (blocking)
    fn unload(&self);

    /// Report client versions to the backend (blocking)
    fn report_version(
        &self,
        ha_version: &str,
        integration_version: &str,
        sdk_version: &str,
    ) -> Result<(), SharingError>;
}

/// Builds session managers
pub trait ManagerFactory: Send + Sync {
    fn create(
        &self,
        credentials: ManagerCredentials,
        token_listener: Arc<dyn SharingTokenListener>,
    ) -> Arc<dyn SharingManager>;
}

/// Compare listeners by identity, ignoring vtable differences
pub fn same_listener(a: &Arc<dyn SharingDeviceListener>, b: &Arc<dyn SharingDeviceListener>) -> bool {
    std::ptr::eq(
        Arc::as_ptr(a) as *const (),
        Arc::as_ptr(b) as *const (),
    )
}
