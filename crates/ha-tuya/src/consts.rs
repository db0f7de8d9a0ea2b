//! Constants for the Tuya integration

use ha_config_entries::Platform;

pub const DOMAIN: &str = "tuya";

/// Manufacturer recorded on every registered device
pub const MANUFACTURER: &str = "Tuya";

/// Client id the device-sharing backend issued to Home Assistant
pub const TUYA_CLIENT_ID: &str = "HA_3y9q4ak7g4ephrvke";

/// Config entry data keys
pub const CONF_USER_CODE: &str = "user_code";
pub const CONF_TERMINAL_ID: &str = "terminal_id";
pub const CONF_ENDPOINT: &str = "endpoint";
pub const CONF_TOKEN_INFO: &str = "token_info";
/// Only present on entries created by the legacy cloud-project login
pub const CONF_APP_TYPE: &str = "tuya_app_type";

/// Dispatcher signal carrying the ids of newly added devices
pub const TUYA_DISCOVERY_NEW: &str = "tuya_discovery_new";
/// Prefix of the per-device state update signal
pub const TUYA_HA_SIGNAL_UPDATE_ENTITY: &str = "tuya_entry_update";

/// Requirement name the sharing SDK version is read from
pub const SHARING_SDK_REQUIREMENT: &str = "device-sharing-sdk";

pub const PLATFORMS: &[Platform] = &[
    Platform::AlarmControlPanel,
    Platform::BinarySensor,
    Platform::Button,
    Platform::Camera,
    Platform::Climate,
    Platform::Cover,
    Platform::Fan,
    Platform::Humidifier,
    Platform::Light,
    Platform::Number,
    Platform::Scene,
    Platform::Select,
    Platform::Sensor,
    Platform::Siren,
    Platform::Switch,
    Platform::Vacuum,
];

/// Signal entities of `device_id` listen on for state updates
pub fn update_signal(device_id: &str) -> String {
    format!("{TUYA_HA_SIGNAL_UPDATE_ENTITY}_{device_id}")
}
