//! Integration manifest
//!
//! The manifest ships with the crate; version reporting reads the
//! integration version and the pinned sharing SDK requirement from it.

use serde::{Deserialize, Serialize};

use crate::consts::SHARING_SDK_REQUIREMENT;

const BUNDLED_MANIFEST: &str = include_str!("../manifest.json");

/// Integration manifest from manifest.json
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntegrationManifest {
    pub domain: String,
    pub name: String,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub requirements: Vec<String>,
    #[serde(default)]
    pub iot_class: Option<String>,
}

impl IntegrationManifest {
    /// The manifest compiled into this crate
    pub fn bundled() -> Result<Self, serde_json::Error> {
        serde_json::from_str(BUNDLED_MANIFEST)
    }

    pub fn integration_version(&self) -> &str {
        self.version.as_deref().unwrap_or("unknown")
    }

    /// Version pinned by the `...device-sharing-sdk==X` requirement, or ""
    pub fn sharing_sdk_version(&self) -> &str {
        self.requirements
            .iter()
            .filter(|req| req.contains(SHARING_SDK_REQUIREMENT))
            .find_map(|req| req.split_once("==").map(|(_, version)| version.trim()))
            .unwrap_or("")
    }
}
