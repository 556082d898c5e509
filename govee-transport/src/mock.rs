//! In-memory link for tests
//!
//! `MockConnector` hands out `MockLink`s that share one scripted state: open
//! failures, write failures, recorded frames and injected notifications.
//! Clones of a connector share that state, so a test keeps one clone to
//! drive and inspect while the session under test owns another.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::broadcast;

use crate::error::TransportError;
use crate::protocol::Frame;
use crate::types::LinkInfo;
use crate::{BoxedLink, GattLink, LinkConnector, NOTIFICATION_CHANNEL_CAPACITY};

#[derive(Debug)]
struct MockState {
    open_count: u32,
    close_count: u32,
    fail_opens: u32,
    fail_always: bool,
    open_error: TransportError,
    open_delay: Option<Duration>,
    subscribe_delay: Option<Duration>,
    fail_writes: u32,
    write_attempts: u32,
    written: Vec<Frame>,
    /// Bumped on every open so older handles report themselves dead
    generation: u64,
    connected: bool,
    notify_tx: Option<broadcast::Sender<Vec<u8>>>,
}

impl Default for MockState {
    fn default() -> Self {
        Self {
            open_count: 0,
            close_count: 0,
            fail_opens: 0,
            fail_always: false,
            open_error: TransportError::Timeout,
            open_delay: None,
            subscribe_delay: None,
            fail_writes: 0,
            write_attempts: 0,
            written: Vec::new(),
            generation: 0,
            connected: false,
            notify_tx: None,
        }
    }
}

/// Scriptable connector for one fake light
#[derive(Clone)]
pub struct MockConnector {
    address: String,
    state: Arc<Mutex<MockState>>,
}

impl MockConnector {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            state: Arc::new(Mutex::new(MockState::default())),
        }
    }

    /// Make the next `n` opens fail
    pub fn fail_next_opens(&self, n: u32) {
        self.state.lock().fail_opens = n;
    }

    /// Make every open fail until turned off again
    pub fn fail_all_opens(&self, fail: bool) {
        self.state.lock().fail_always = fail;
    }

    /// Error returned by failing opens (default `Timeout`)
    pub fn set_open_error(&self, err: TransportError) {
        self.state.lock().open_error = err;
    }

    /// Delay every open, e.g. to run into connect timeouts
    pub fn set_open_delay(&self, delay: Option<Duration>) {
        self.state.lock().open_delay = delay;
    }

    /// Delay every notification subscribe
    pub fn set_subscribe_delay(&self, delay: Option<Duration>) {
        self.state.lock().subscribe_delay = delay;
    }

    /// Make the next `n` frame writes fail
    pub fn fail_next_writes(&self, n: u32) {
        self.state.lock().fail_writes = n;
    }

    pub fn open_count(&self) -> u32 {
        self.state.lock().open_count
    }

    pub fn close_count(&self) -> u32 {
        self.state.lock().close_count
    }

    /// Writes attempted, failed ones included
    pub fn write_attempts(&self) -> u32 {
        self.state.lock().write_attempts
    }

    /// Frames successfully written, in order
    pub fn written_frames(&self) -> Vec<Frame> {
        self.state.lock().written.clone()
    }

    /// Whether the current link is up
    pub fn is_link_connected(&self) -> bool {
        self.state.lock().connected
    }

    /// Deliver raw bytes as a notification
    ///
    /// Returns false when nobody is subscribed.
    pub fn inject_notification(&self, data: Vec<u8>) -> bool {
        let tx = self.state.lock().notify_tx.clone();
        match tx {
            Some(tx) => tx.send(data).is_ok(),
            None => false,
        }
    }

    /// Simulate the peripheral going away
    pub fn drop_link(&self) {
        let mut state = self.state.lock();
        state.connected = false;
        state.notify_tx = None;
    }
}

#[async_trait]
impl LinkConnector for MockConnector {
    async fn open(&self) -> Result<BoxedLink, TransportError> {
        let delay = self.state.lock().open_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.lock();
        state.open_count += 1;
        if state.fail_always {
            return Err(state.open_error.clone());
        }
        if state.fail_opens > 0 {
            state.fail_opens -= 1;
            return Err(state.open_error.clone());
        }

        state.generation += 1;
        state.connected = true;
        state.notify_tx = None;
        Ok(Arc::new(MockLink {
            info: LinkInfo::new(self.address.clone()).with_name("Govee_Mock"),
            generation: state.generation,
            state: Arc::clone(&self.state),
        }))
    }

    fn address(&self) -> &str {
        &self.address
    }
}

/// Link handed out by `MockConnector`
pub struct MockLink {
    info: LinkInfo,
    generation: u64,
    state: Arc<Mutex<MockState>>,
}

impl MockLink {
    fn is_current(&self, state: &MockState) -> bool {
        state.connected && state.generation == self.generation
    }
}

#[async_trait]
impl GattLink for MockLink {
    async fn write_frame(&self, frame: &Frame) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        state.write_attempts += 1;
        if !self.is_current(&state) {
            return Err(TransportError::Disconnected);
        }
        if state.fail_writes > 0 {
            state.fail_writes -= 1;
            return Err(TransportError::WriteFailed("scripted failure".into()));
        }
        state.written.push(*frame);
        Ok(())
    }

    async fn start_notifications(&self) -> Result<broadcast::Receiver<Vec<u8>>, TransportError> {
        let delay = self.state.lock().subscribe_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.lock();
        if !self.is_current(&state) {
            return Err(TransportError::Disconnected);
        }
        let (tx, rx) = broadcast::channel(NOTIFICATION_CHANNEL_CAPACITY);
        state.notify_tx = Some(tx);
        Ok(rx)
    }

    async fn stop_notifications(&self) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        if state.generation == self.generation {
            state.notify_tx = None;
        }
        Ok(())
    }

    async fn is_connected(&self) -> bool {
        self.is_current(&self.state.lock())
    }

    async fn close(&self) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        state.close_count += 1;
        if state.generation == self.generation {
            state.connected = false;
            state.notify_tx = None;
        }
        Ok(())
    }

    fn link_info(&self) -> &LinkInfo {
        &self.info
    }
}
