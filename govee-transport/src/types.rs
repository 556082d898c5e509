//! Common types for the link layer

use std::collections::HashMap;

use crate::protocol::power_from_manufacturer_data;

/// Identification of an opened link
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkInfo {
    /// Bluetooth address (`AA:BB:CC:DD:EE:FF`)
    pub address: String,
    /// Advertised local name if available
    pub name: Option<String>,
}

impl LinkInfo {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            name: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Name if known, address otherwise
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.address)
    }
}

/// A light seen while scanning
#[derive(Debug, Clone, Default)]
pub struct DiscoveredLight {
    pub address: String,
    pub name: Option<String>,
    pub rssi: Option<i16>,
    /// Manufacturer data keyed by company id
    pub manufacturer_data: HashMap<u16, Vec<u8>>,
}

impl DiscoveredLight {
    /// Power state announced in the advertisement, if any
    pub fn advertised_power(&self) -> Option<bool> {
        self.manufacturer_data
            .iter()
            .find_map(|(&id, data)| power_from_manufacturer_data(id, data))
    }

    /// Whether the advertised name looks like a Govee light
    pub fn looks_like_govee(&self) -> bool {
        self.name
            .as_deref()
            .is_some_and(|n| DISCOVERY_NAME_PREFIXES.iter().any(|p| n.starts_with(p)))
    }
}

/// Advertised name prefixes used by Govee lights
pub const DISCOVERY_NAME_PREFIXES: &[&str] = &["Govee_", "ihoment_", "GBK_", "H1167"];

/// Whether a name belongs to the H1167 family (music mode capable)
pub fn is_h1167(name: &str) -> bool {
    name.to_ascii_lowercase().contains("h1167")
}
