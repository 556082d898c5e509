//! Transport error types

use thiserror::Error;

/// Errors that can occur while talking to a light over its GATT link
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    // Common errors
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Device disconnected")]
    Disconnected,

    #[error("Communication timeout")]
    Timeout,

    // BLE-specific errors
    #[error("No Bluetooth adapter available")]
    AdapterNotFound,

    #[error("GATT characteristic not found: {0}")]
    CharacteristicNotFound(String),

    #[error("BLE error: {0}")]
    Ble(String),

    #[error("Characteristic write failed: {0}")]
    WriteFailed(String),

    // Generic
    #[error("Internal error: {0}")]
    Internal(String),
}

#[cfg(feature = "bluetooth")]
impl From<btleplug::Error> for TransportError {
    fn from(e: btleplug::Error) -> Self {
        match e {
            btleplug::Error::DeviceNotFound => TransportError::DeviceNotFound("peripheral".into()),
            btleplug::Error::NotConnected => TransportError::Disconnected,
            btleplug::Error::TimedOut(_) => TransportError::Timeout,
            other => TransportError::Ble(other.to_string()),
        }
    }
}
