//! Bluetooth LE GATT link via btleplug
//!
//! Govee lights expose one vendor service with two characteristics:
//!
//! - Write characteristic (`...2b11`): outbound frames, write without response
//! - Notify characteristic (`...2b10`): inbound response/state frames
//!
//! Device discovery here is limited to resolving one known address on the
//! first adapter. Enumerating and registering lights belongs to the caller.

use std::time::Duration;

use async_trait::async_trait;
use btleplug::api::{Central, Characteristic, Manager as _, Peripheral as _, ScanFilter, WriteType};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures::StreamExt;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::error::TransportError;
use crate::protocol::{gatt, uuid_string, Frame};
use crate::types::{DiscoveredLight, LinkInfo};
use crate::{BoxedLink, GattLink, LinkConnector, NOTIFICATION_CHANNEL_CAPACITY};

/// Poll interval while waiting for an address to show up in a scan
const SCAN_POLL_MS: u64 = 250;

/// Get the first Bluetooth adapter of the system
async fn first_adapter() -> Result<Adapter, TransportError> {
    let manager = Manager::new().await?;
    manager
        .adapters()
        .await?
        .into_iter()
        .next()
        .ok_or(TransportError::AdapterNotFound)
}

async fn describe(peripheral: &Peripheral) -> Result<DiscoveredLight, TransportError> {
    let address = peripheral.address().to_string();
    let props = peripheral.properties().await?;
    Ok(match props {
        Some(props) => DiscoveredLight {
            address,
            name: props.local_name,
            rssi: props.rssi,
            manufacturer_data: props.manufacturer_data,
        },
        None => DiscoveredLight {
            address,
            ..Default::default()
        },
    })
}

/// Scan the first adapter for the given duration and return Govee lights seen
pub async fn scan_lights(duration: Duration) -> Result<Vec<DiscoveredLight>, TransportError> {
    let adapter = first_adapter().await?;
    adapter.start_scan(ScanFilter::default()).await?;
    tokio::time::sleep(duration).await;

    let mut lights = Vec::new();
    for peripheral in adapter.peripherals().await? {
        let light = describe(&peripheral).await?;
        if light.looks_like_govee() {
            lights.push(light);
        }
    }
    if let Err(e) = adapter.stop_scan().await {
        debug!("stop_scan failed: {}", e);
    }
    Ok(lights)
}

/// Connector that opens links to one resolved peripheral
#[derive(Clone)]
pub struct BtleConnector {
    peripheral: Peripheral,
    info: LinkInfo,
}

impl BtleConnector {
    /// Scan until `address` appears or `scan_timeout` elapses
    ///
    /// Returns the connector and the advertisement seen for the device.
    pub async fn discover(
        address: &str,
        scan_timeout: Duration,
    ) -> Result<(Self, DiscoveredLight), TransportError> {
        let adapter = first_adapter().await?;
        adapter.start_scan(ScanFilter::default()).await?;
        debug!("Scanning for {} ({:?})", address, scan_timeout);

        let found = tokio::time::timeout(scan_timeout, async {
            loop {
                for peripheral in adapter.peripherals().await? {
                    if peripheral.address().to_string().eq_ignore_ascii_case(address) {
                        let light = describe(&peripheral).await?;
                        return Ok::<_, TransportError>((peripheral, light));
                    }
                }
                tokio::time::sleep(Duration::from_millis(SCAN_POLL_MS)).await;
            }
        })
        .await;

        if let Err(e) = adapter.stop_scan().await {
            debug!("stop_scan failed: {}", e);
        }

        let (peripheral, light) = match found {
            Ok(result) => result?,
            Err(_) => return Err(TransportError::DeviceNotFound(address.to_string())),
        };

        let mut info = LinkInfo::new(light.address.clone());
        info.name = light.name.clone();
        info!("Found {} ({})", info.display_name(), info.address);

        Ok((Self { peripheral, info }, light))
    }

    pub fn link_info(&self) -> &LinkInfo {
        &self.info
    }
}

#[async_trait]
impl LinkConnector for BtleConnector {
    async fn open(&self) -> Result<BoxedLink, TransportError> {
        let link = BtleLink::connect(self.peripheral.clone(), self.info.clone()).await?;
        Ok(std::sync::Arc::new(link))
    }

    fn address(&self) -> &str {
        &self.info.address
    }
}

/// Connected GATT link to one light
pub struct BtleLink {
    peripheral: Peripheral,
    write_char: Characteristic,
    notify_char: Characteristic,
    info: LinkInfo,
    /// Task forwarding btleplug notifications into the broadcast channel
    forwarder: Mutex<Option<JoinHandle<()>>>,
}

impl BtleLink {
    /// Connect the peripheral and resolve the vendor characteristics
    pub async fn connect(peripheral: Peripheral, info: LinkInfo) -> Result<Self, TransportError> {
        if !peripheral.is_connected().await? {
            peripheral.connect().await?;
        }
        peripheral.discover_services().await?;

        let chars = peripheral.characteristics();
        let find = |uuid: uuid::Uuid| {
            chars
                .iter()
                .find(|c| c.uuid == uuid)
                .cloned()
                .ok_or_else(|| TransportError::CharacteristicNotFound(uuid_string(&uuid)))
        };
        let write_char = find(gatt::WRITE_CHARACTERISTIC)?;
        let notify_char = find(gatt::NOTIFY_CHARACTERISTIC)?;

        debug!("Connected to {} with {} characteristics", info.address, chars.len());

        Ok(Self {
            peripheral,
            write_char,
            notify_char,
            info,
            forwarder: Mutex::new(None),
        })
    }
}

#[async_trait]
impl GattLink for BtleLink {
    async fn write_frame(&self, frame: &Frame) -> Result<(), TransportError> {
        self.peripheral
            .write(&self.write_char, frame.as_bytes(), WriteType::WithoutResponse)
            .await
            .map_err(|e| match TransportError::from(e) {
                TransportError::Ble(msg) => TransportError::WriteFailed(msg),
                other => other,
            })
    }

    async fn start_notifications(&self) -> Result<broadcast::Receiver<Vec<u8>>, TransportError> {
        self.peripheral.subscribe(&self.notify_char).await?;
        let mut stream = self.peripheral.notifications().await?;
        let (tx, rx) = broadcast::channel(NOTIFICATION_CHANNEL_CAPACITY);
        let notify_uuid = self.notify_char.uuid;

        let handle = tokio::spawn(async move {
            while let Some(notification) = stream.next().await {
                if notification.uuid != notify_uuid {
                    continue;
                }
                // No receivers left means the session is gone
                if tx.send(notification.value).is_err() {
                    break;
                }
            }
        });

        if let Some(previous) = self.forwarder.lock().replace(handle) {
            previous.abort();
        }
        Ok(rx)
    }

    async fn stop_notifications(&self) -> Result<(), TransportError> {
        if let Some(handle) = self.forwarder.lock().take() {
            handle.abort();
        }
        self.peripheral.unsubscribe(&self.notify_char).await?;
        Ok(())
    }

    async fn is_connected(&self) -> bool {
        self.peripheral.is_connected().await.unwrap_or(false)
    }

    async fn close(&self) -> Result<(), TransportError> {
        if let Some(handle) = self.forwarder.lock().take() {
            handle.abort();
        }
        self.peripheral.disconnect().await?;
        Ok(())
    }

    fn link_info(&self) -> &LinkInfo {
        &self.info
    }
}

impl Drop for BtleLink {
    fn drop(&mut self) {
        if let Some(handle) = self.forwarder.get_mut().take() {
            debug!("Link to {} dropped without close", self.info.address);
            handle.abort();
        }
    }
}
