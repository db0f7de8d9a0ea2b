//! Common test utilities for the Tuya integration
//!
//! A scripted sharing backend stands in for the vendor SDK, and a test
//! harness wires it into an isolated HomeAssistant instance.

#![allow(dead_code)]

mod mock_sharing;
mod test_hass;

pub use mock_sharing::*;
pub use test_hass::*;
