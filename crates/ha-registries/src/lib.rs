//! Home Assistant Registries
//!
//! This crate provides the persistent device registry and the `.storage/`
//! JSON persistence it shares with other host stores (config entries).

pub mod device_registry;
pub mod storage;

// Re-export main types
pub use storage::{Storable, Storage, StorageError, StorageFile, StorageResult};

pub use device_registry::{
    DeviceEntry, DeviceIdentifier, DeviceInfo, DeviceRegistry, DeviceRegistryData,
};
