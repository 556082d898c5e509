//! Protocol engine for Govee BLE lights
//!
//! This crate drives one light per `LightSession` on top of any
//! `LinkConnector` (btleplug, monitored, mock):
//!
//! - setters queue deltas against the cached state (`set_*_buffered`)
//! - queries queue one frame and hand back a `ResponseWaiter`
//! - `flush` connects on demand and writes the queued frames
//! - notifications update the cache and are pushed to a subscriber

pub mod buffer;
pub mod command;
pub mod connection;
pub mod correlator;
pub mod effect;
pub mod error;
pub mod led;
pub mod state;

pub use buffer::{OutgoingBuffer, QueuedPacket, Rollback};
pub use command::{ColorPayload, LedCommand, Packet, PacketHead};
pub use connection::{ConnectionConfig, ConnectionManager, ConnectionState, LinkEvent};
pub use correlator::{ResponseCorrelator, ResponseWaiter, StateSink, StateUpdate};
pub use effect::{BasicMode, CarnivalMode, CurrentEffect, Effect, EffectFamily, MusicMode};
pub use error::LightError;
pub use led::RgbColor;
pub use state::DeviceState;

use std::sync::Arc;

use govee_transport::BoxedConnector;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::connection::LinkEventHandler;

/// Per-device options supplied by the caller
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionOptions {
    /// Segmented color layout and 0-100 brightness
    pub segmented: bool,
    /// Device supports music mode and effects
    pub music_mode_support: bool,
    pub connection: ConnectionConfig,
}

/// Session with one light
///
/// Owns the state cache, the outgoing buffer and the connection. Setters and
/// queries only touch the buffer; nothing reaches the device before `flush`.
pub struct LightSession {
    address: String,
    options: SessionOptions,
    /// Lock order: `state` before `buffer`
    state: Arc<Mutex<DeviceState>>,
    buffer: Mutex<OutgoingBuffer>,
    correlator: Arc<ResponseCorrelator>,
    connection: ConnectionManager,
    /// One transmit sequence at a time
    flush_lock: tokio::sync::Mutex<()>,
}

impl LightSession {
    /// Create a session
    ///
    /// # Arguments
    /// * `connector` - Opens fresh links to the device
    /// * `options` - Device family flags and connection policy
    /// * `sink` - Receives a state snapshot after every applied response
    pub fn new(connector: BoxedConnector, options: SessionOptions, sink: Option<StateSink>) -> Self {
        let address = connector.address().to_string();
        let state = Arc::new(Mutex::new(DeviceState::default()));
        let correlator = Arc::new(ResponseCorrelator::new(
            address.clone(),
            options.segmented,
            Arc::clone(&state),
            sink,
        ));

        let handler: LinkEventHandler = {
            let correlator = Arc::clone(&correlator);
            Arc::new(move |event| match event {
                LinkEvent::Notification(data) => {
                    // Already logged and delivered to the waiting caller
                    let _ = correlator.handle_notification(&data);
                }
                LinkEvent::Lost => correlator.abandon_pending(),
            })
        };

        Self {
            connection: ConnectionManager::new(connector, options.connection.clone(), handler),
            buffer: Mutex::new(OutgoingBuffer::new(options.segmented)),
            address,
            options,
            state,
            correlator,
            flush_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    pub fn is_segmented(&self) -> bool {
        self.options.segmented
    }

    pub fn supports_music_mode(&self) -> bool {
        self.options.music_mode_support
    }

    // === Setters ===

    /// Queue a power change; returns false when suppressed
    pub fn set_power_buffered(&self, on: bool) -> Result<bool, LightError> {
        let mut state = self.state.lock();
        self.buffer.lock().set_power(&mut state, on)
    }

    /// Queue a brightness change (0-255)
    pub fn set_brightness_buffered(&self, brightness: u16) -> Result<bool, LightError> {
        let mut state = self.state.lock();
        self.buffer.lock().set_brightness(&mut state, brightness)
    }

    /// Queue a color change (0-255 per component)
    pub fn set_color_buffered(&self, r: u16, g: u16, b: u16) -> Result<bool, LightError> {
        let mut state = self.state.lock();
        self.buffer.lock().set_color(&mut state, r, g, b)
    }

    /// Queue an effect by display name
    pub fn set_effect_buffered(&self, name: &str) -> Result<bool, LightError> {
        self.require_music_mode("effects")?;
        let effect =
            Effect::from_name(name).ok_or_else(|| LightError::UnknownEffect(name.to_string()))?;
        let mut state = self.state.lock();
        self.buffer.lock().set_effect(&mut state, effect)
    }

    /// Queue enabling (Rhythm) or disabling music mode
    pub fn set_music_mode_buffered(&self, enabled: bool) -> Result<bool, LightError> {
        self.require_music_mode("music mode")?;
        let mut state = self.state.lock();
        self.buffer.lock().set_music_mode(&mut state, enabled)
    }

    fn require_music_mode(&self, feature: &str) -> Result<(), LightError> {
        if self.options.music_mode_support {
            Ok(())
        } else {
            Err(LightError::NotSupported(format!(
                "{} on {}",
                feature, self.address
            )))
        }
    }

    // === Queries ===

    pub fn request_power_buffered(&self) -> Result<ResponseWaiter, LightError> {
        self.request(OutgoingBuffer::request_power)
    }

    pub fn request_brightness_buffered(&self) -> Result<ResponseWaiter, LightError> {
        self.request(OutgoingBuffer::request_brightness)
    }

    pub fn request_color_buffered(&self) -> Result<ResponseWaiter, LightError> {
        self.request(OutgoingBuffer::request_color)
    }

    pub fn request_music_mode_buffered(&self) -> Result<ResponseWaiter, LightError> {
        self.request(OutgoingBuffer::request_music_mode)
    }

    /// Queue a query and tie its waiter to the queued frame
    ///
    /// The buffer stays locked until the waiter is attached so a concurrent
    /// flush takes both or neither.
    fn request(
        &self,
        queue: impl FnOnce(&mut OutgoingBuffer) -> Result<LedCommand, LightError>,
    ) -> Result<ResponseWaiter, LightError> {
        let mut buffer = self.buffer.lock();
        let command = queue(&mut *buffer)?;
        let waiter = self.correlator.register(command);
        buffer.attach_waiter(waiter.id());
        Ok(waiter)
    }

    // === Transmission ===

    /// Frames the next flush will write
    pub fn pending_frames(&self) -> usize {
        self.buffer.lock().frame_count()
    }

    /// Transmit and clear the buffer
    ///
    /// Every frame is attempted even after a failed write; the buffer is
    /// empty afterwards whatever the outcome. On failure the batch is
    /// undone: its optimistic cache writes are rolled back and its waiters
    /// abandoned. Work queued while this flush was running is untouched.
    pub async fn flush(&self) -> Result<(), LightError> {
        let _guard = self.flush_lock.lock().await;

        let entries = self.buffer.lock().take();
        if entries.is_empty() {
            return Ok(());
        }

        let link = match self.connection.ensure_connected().await {
            Ok(link) => link,
            Err(e) => {
                self.fail_batch(&entries);
                return Err(e);
            }
        };

        let frame_delay = self.options.connection.frame_delay;
        let total: usize = entries.iter().map(|e| usize::from(e.copies)).sum();
        let mut failed = 0;
        let mut first_error = None;

        for entry in &entries {
            for _ in 0..entry.copies {
                if let Err(e) = link.write_frame(&entry.frame).await {
                    warn!(
                        "Write of {} to {} failed: {}",
                        entry.packet.command.name(),
                        self.address,
                        e
                    );
                    failed += 1;
                    first_error.get_or_insert(e);
                }
                tokio::time::sleep(frame_delay).await;
            }
        }
        debug!("Flushed {} frames to {}", total - failed, self.address);

        match first_error {
            Some(source) => {
                self.fail_batch(&entries);
                Err(LightError::TransmitFailed {
                    failed,
                    total,
                    source,
                })
            }
            None => Ok(()),
        }
    }

    fn fail_batch(&self, entries: &[QueuedPacket]) {
        {
            let mut state = self.state.lock();
            for rollback in entries.iter().rev().filter_map(|e| e.rollback.as_ref()) {
                rollback.restore(&mut state);
            }
        }
        let waiters: Vec<u64> = entries.iter().filter_map(|e| e.waiter).collect();
        self.correlator.abandon(&waiters);
    }

    /// Query everything and flush, swallowing connection failures
    ///
    /// Returns the cached state, which stays stale when the device is
    /// unreachable. Responses arrive asynchronously through the sink.
    pub async fn refresh(&self) -> DeviceState {
        let queued = {
            let mut buffer = self.buffer.lock();
            let mut queue = || -> Result<(), LightError> {
                buffer.request_power()?;
                buffer.request_brightness()?;
                buffer.request_color()?;
                if self.options.music_mode_support {
                    buffer.request_music_mode()?;
                }
                Ok(())
            };
            queue()
        };
        if let Err(e) = queued {
            warn!("Could not queue refresh of {}: {}", self.address, e);
        }

        let failures_before = self.connection.failure_count();
        match self.flush().await {
            Ok(()) if failures_before > 0 => {
                info!(
                    "{} reachable again after {} failed connection cycles",
                    self.address, failures_before
                );
            }
            Ok(()) => {}
            Err(e) => {
                warn!(
                    "Refresh of {} failed ({} consecutive connection failures): {}",
                    self.address,
                    self.connection.failure_count(),
                    e
                );
            }
        }
        self.snapshot()
    }

    // === Connection ===

    /// Clear backoff state and force-close the link
    pub async fn reset_connection_state(&self) {
        self.correlator.abandon_pending();
        self.connection.reset().await;
    }

    pub async fn disconnect(&self) {
        self.correlator.abandon_pending();
        self.connection.disconnect().await;
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_connected()
    }

    pub fn connection_failure_count(&self) -> u32 {
        self.connection.failure_count()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.connection.state()
    }

    pub fn connection(&self) -> &ConnectionManager {
        &self.connection
    }

    // === Cached state ===

    /// Seed the power state before the first read (e.g. from an advertisement)
    ///
    /// Does nothing once the power state is known.
    pub fn seed_power(&self, on: bool) {
        let mut state = self.state.lock();
        if state.power.is_none() {
            state.power = Some(on);
        }
    }

    pub fn snapshot(&self) -> DeviceState {
        self.state.lock().clone()
    }

    pub fn power(&self) -> Option<bool> {
        self.state.lock().power
    }

    /// Brightness on the 0-255 scale
    pub fn brightness(&self) -> Option<u8> {
        self.state.lock().brightness
    }

    pub fn color(&self) -> Option<RgbColor> {
        self.state.lock().color
    }

    pub fn effect(&self) -> Option<CurrentEffect> {
        self.state.lock().current_effect
    }

    pub fn music_mode_enabled(&self) -> bool {
        self.state.lock().music_mode_enabled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use govee_transport::mock::MockConnector;

    fn session(music: bool) -> LightSession {
        LightSession::new(
            Arc::new(MockConnector::new("AA:BB:CC:DD:EE:FF")),
            SessionOptions {
                segmented: false,
                music_mode_support: music,
                ..Default::default()
            },
            None,
        )
    }

    #[test]
    fn test_capability_gating() {
        let s = session(false);
        assert!(matches!(
            s.set_effect_buffered("Waves"),
            Err(LightError::NotSupported(_))
        ));
        assert!(matches!(
            s.set_music_mode_buffered(true),
            Err(LightError::NotSupported(_))
        ));
        assert_eq!(s.pending_frames(), 0);
    }

    #[test]
    fn test_unknown_effect() {
        let s = session(true);
        assert_eq!(
            s.set_effect_buffered("Disco"),
            Err(LightError::UnknownEffect("Disco".into()))
        );
        assert!(s.set_effect_buffered("Calm").unwrap());
        assert_eq!(
            s.effect(),
            Some(CurrentEffect::Known(Effect::Basic(BasicMode::Calm)))
        );
    }

    #[test]
    fn test_seed_power_only_when_unknown() {
        let s = session(false);
        s.seed_power(true);
        assert_eq!(s.power(), Some(true));
        s.seed_power(false);
        assert_eq!(s.power(), Some(true));
    }

    #[tokio::test]
    async fn test_empty_flush_does_not_connect() {
        let s = session(false);
        s.flush().await.unwrap();
        assert!(!s.is_connected());
    }
}
