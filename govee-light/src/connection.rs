//! Connection manager for the link to one light
//!
//! ```text
//! Disconnected --ensure_connected--> Connecting --ok--> Connected
//!       ^                                |                 |
//!       +------------ all tries failed --+                 |
//!       +-------- link lost / disconnect (Disconnecting) --+
//! ```
//!
//! Failed connect cycles grow a failure counter. While it is nonzero a new
//! cycle is refused until `min(2^failures, cap)` has elapsed since the last
//! failed cycle.

use std::sync::Arc;
use std::time::Duration;

use govee_transport::protocol::timing;
use govee_transport::{BoxedConnector, BoxedLink, TransportError};
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::LightError;

/// Connection policy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// Tries per connect cycle
    pub max_attempts: u32,
    /// Delay before try `n + 1` is `retry_delay * n`
    pub retry_delay: Duration,
    /// Per-try timeout before the first successful connection
    pub initial_timeout: Duration,
    /// Per-try timeout for reconnections
    pub reconnect_timeout: Duration,
    /// Upper bound of the backoff window
    pub backoff_cap: Duration,
    /// Delay after every frame written during a flush
    pub frame_delay: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            max_attempts: timing::MAX_CONNECTION_ATTEMPTS,
            retry_delay: Duration::from_millis(timing::RETRY_DELAY_MS),
            initial_timeout: Duration::from_secs(timing::INITIAL_CONNECTION_TIMEOUT_SECS),
            reconnect_timeout: Duration::from_secs(timing::RECONNECTION_TIMEOUT_SECS),
            backoff_cap: Duration::from_secs(timing::BACKOFF_CAP_SECS),
            frame_delay: Duration::from_millis(timing::FRAME_DELAY_MS),
        }
    }
}

/// Link lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Disconnecting,
}

/// Events delivered by the notification reader
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// Raw notification bytes, not yet verified
    Notification(Vec<u8>),
    /// The notification channel closed underneath a live link
    Lost,
}

/// Receiver of link events
pub type LinkEventHandler = Arc<dyn Fn(LinkEvent) + Send + Sync>;

/// Backoff window after `failures` consecutive failed cycles
pub fn backoff_window(failures: u32, cap: Duration) -> Duration {
    if failures == 0 {
        return Duration::ZERO;
    }
    let secs = 2u64.saturating_pow(failures);
    Duration::from_secs(secs).min(cap)
}

#[derive(Default)]
struct LinkSlot {
    link: Option<BoxedLink>,
    reader: Option<JoinHandle<()>>,
    state: ConnectionState,
    failures: u32,
    last_attempt: Option<Instant>,
    ever_connected: bool,
    /// Bumped per installed link so a stale reader cannot touch a newer one
    generation: u64,
}

impl LinkSlot {
    fn backoff_remaining(&self, cap: Duration, now: Instant) -> Option<Duration> {
        let last = self.last_attempt?;
        let window = backoff_window(self.failures, cap);
        let elapsed = now.saturating_duration_since(last);
        (elapsed < window).then(|| window - elapsed)
    }
}

/// Owns the link to one device address
pub struct ConnectionManager {
    connector: BoxedConnector,
    config: ConnectionConfig,
    /// Serializes connect and disconnect cycles
    connect_lock: tokio::sync::Mutex<()>,
    slot: Arc<Mutex<LinkSlot>>,
    on_event: LinkEventHandler,
}

impl ConnectionManager {
    pub fn new(
        connector: BoxedConnector,
        config: ConnectionConfig,
        on_event: LinkEventHandler,
    ) -> Self {
        Self {
            connector,
            config,
            connect_lock: tokio::sync::Mutex::new(()),
            slot: Arc::new(Mutex::new(LinkSlot::default())),
            on_event,
        }
    }

    pub fn address(&self) -> &str {
        self.connector.address()
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub fn state(&self) -> ConnectionState {
        self.slot.lock().state
    }

    pub fn is_connected(&self) -> bool {
        let slot = self.slot.lock();
        slot.state == ConnectionState::Connected && slot.link.is_some()
    }

    /// Consecutive failed connect cycles
    pub fn failure_count(&self) -> u32 {
        self.slot.lock().failures
    }

    /// Time left in the current backoff window, if any
    pub fn backoff_remaining(&self) -> Option<Duration> {
        self.slot
            .lock()
            .backoff_remaining(self.config.backoff_cap, Instant::now())
    }

    /// Return the live link, connecting first if needed
    pub async fn ensure_connected(&self) -> Result<BoxedLink, LightError> {
        let _guard = self.connect_lock.lock().await;

        let existing = self.slot.lock().link.clone();
        if let Some(link) = existing {
            if link.is_connected().await {
                return Ok(link);
            }
            debug!("Link to {} went away, tearing down", self.address());
            self.teardown().await;
        }

        let (timeout, failures) = {
            let mut slot = self.slot.lock();
            if let Some(remaining) = slot.backoff_remaining(self.config.backoff_cap, Instant::now())
            {
                return Err(LightError::ConnectionBackoffActive {
                    failures: slot.failures,
                    remaining,
                });
            }
            slot.state = ConnectionState::Connecting;
            let timeout = if slot.ever_connected {
                self.config.reconnect_timeout
            } else {
                self.config.initial_timeout
            };
            (timeout, slot.failures)
        };

        let mut last_error = None;
        for attempt in 1..=self.config.max_attempts {
            debug!(
                "Connect attempt {}/{} to {} (timeout {:?}, {} prior failures)",
                attempt,
                self.config.max_attempts,
                self.address(),
                timeout,
                failures
            );

            match self.try_connect(timeout).await {
                Ok(link) => {
                    info!("Connected to {}", self.address());
                    return Ok(link);
                }
                Err(e) => {
                    warn!(
                        "Connect attempt {}/{} to {} failed: {}",
                        attempt,
                        self.config.max_attempts,
                        self.address(),
                        e
                    );
                    last_error = Some(e);
                }
            }

            if attempt < self.config.max_attempts {
                tokio::time::sleep(self.config.retry_delay * attempt).await;
            }
        }

        let mut slot = self.slot.lock();
        slot.failures = slot.failures.saturating_add(1);
        slot.last_attempt = Some(Instant::now());
        slot.state = ConnectionState::Disconnected;
        Err(LightError::ConnectionAttemptsExhausted {
            attempts: self.config.max_attempts,
            last_error,
        })
    }

    /// One try with a fresh handle
    ///
    /// `timeout` bounds opening and subscribing together.
    async fn try_connect(&self, timeout: Duration) -> Result<BoxedLink, TransportError> {
        let deadline = Instant::now() + timeout;
        let link = match tokio::time::timeout_at(deadline, self.connector.open()).await {
            Ok(result) => result?,
            Err(_) => return Err(TransportError::Timeout),
        };

        let subscribed = tokio::time::timeout_at(deadline, async {
            if !link.is_connected().await {
                return Err(TransportError::Disconnected);
            }
            link.start_notifications().await
        })
        .await
        .unwrap_or(Err(TransportError::Timeout));
        let rx = match subscribed {
            Ok(rx) => rx,
            Err(e) => {
                close_quietly(&link).await;
                return Err(e);
            }
        };

        let mut slot = self.slot.lock();
        slot.generation += 1;
        let reader = spawn_reader(
            rx,
            Arc::clone(&self.slot),
            slot.generation,
            Arc::clone(&self.on_event),
        );
        if let Some(previous) = slot.reader.replace(reader) {
            previous.abort();
        }
        slot.link = Some(Arc::clone(&link));
        slot.state = ConnectionState::Connected;
        slot.failures = 0;
        slot.last_attempt = None;
        slot.ever_connected = true;
        Ok(link)
    }

    /// Stop notifications and close the link, logging failures
    async fn teardown(&self) {
        let (link, reader) = {
            let mut slot = self.slot.lock();
            let link = slot.link.take();
            if link.is_some() {
                slot.state = ConnectionState::Disconnecting;
            }
            (link, slot.reader.take())
        };

        if let Some(reader) = reader {
            reader.abort();
        }

        if let Some(link) = link {
            if let Err(e) = link.stop_notifications().await {
                warn!("Failed to stop notifications on {}: {}", self.address(), e);
            }
            if let Err(e) = link.close().await {
                warn!("Failed to close link to {}: {}", self.address(), e);
            }
        }

        self.slot.lock().state = ConnectionState::Disconnected;
    }

    /// Best-effort disconnect; errors are logged, never returned
    pub async fn disconnect(&self) {
        let _guard = self.connect_lock.lock().await;
        self.close_locked().await;
    }

    /// Forget accumulated backoff and force-close the link
    ///
    /// Waits for a connect cycle in flight, so its failure is cleared too.
    pub async fn reset(&self) {
        let _guard = self.connect_lock.lock().await;
        {
            let mut slot = self.slot.lock();
            slot.failures = 0;
            slot.last_attempt = None;
        }
        debug!("Connection state of {} reset", self.address());
        self.close_locked().await;
    }

    /// Caller holds `connect_lock`
    async fn close_locked(&self) {
        let had_link = self.slot.lock().link.is_some();
        self.teardown().await;
        if had_link {
            info!("Disconnected from {}", self.address());
        }
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        if let Some(reader) = self.slot.lock().reader.take() {
            reader.abort();
        }
    }
}

async fn close_quietly(link: &BoxedLink) {
    if let Err(e) = link.close().await {
        debug!("Closing partial link failed: {}", e);
    }
}

fn spawn_reader(
    mut rx: broadcast::Receiver<Vec<u8>>,
    slot: Arc<Mutex<LinkSlot>>,
    generation: u64,
    on_event: LinkEventHandler,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(data) => on_event(LinkEvent::Notification(data)),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("Dropped {} notifications", n);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }

        let lost = {
            let mut slot = slot.lock();
            if slot.generation == generation && slot.state == ConnectionState::Connected {
                slot.state = ConnectionState::Disconnected;
                true
            } else {
                false
            }
        };
        if lost {
            warn!("Notification channel closed, link lost");
            on_event(LinkEvent::Lost);
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use govee_transport::mock::MockConnector;

    fn manager(mock: &MockConnector) -> (ConnectionManager, Arc<Mutex<Vec<LinkEvent>>>) {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        let manager = ConnectionManager::new(
            Arc::new(mock.clone()),
            ConnectionConfig::default(),
            Arc::new(move |event| sink.lock().push(event)),
        );
        (manager, events)
    }

    #[test]
    fn test_backoff_window() {
        let cap = Duration::from_secs(30);
        assert_eq!(backoff_window(0, cap), Duration::ZERO);
        assert_eq!(backoff_window(1, cap), Duration::from_secs(2));
        assert_eq!(backoff_window(3, cap), Duration::from_secs(8));
        assert_eq!(backoff_window(4, cap), Duration::from_secs(16));
        assert_eq!(backoff_window(5, cap), cap);
        assert_eq!(backoff_window(200, cap), cap);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_is_idempotent() {
        let mock = MockConnector::new("AA:BB:CC:DD:EE:FF");
        let (manager, _) = manager(&mock);

        manager.ensure_connected().await.unwrap();
        manager.ensure_connected().await.unwrap();
        assert_eq!(mock.open_count(), 1);
        assert!(manager.is_connected());
        assert_eq!(manager.state(), ConnectionState::Connected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_within_cycle() {
        let mock = MockConnector::new("AA:BB:CC:DD:EE:FF");
        mock.fail_next_opens(2);
        let (manager, _) = manager(&mock);

        let start = Instant::now();
        manager.ensure_connected().await.unwrap();
        assert_eq!(mock.open_count(), 3);
        assert_eq!(manager.failure_count(), 0);
        // 1s after the first try, 2s after the second
        assert!(start.elapsed() >= Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_carries_last_error() {
        let mock = MockConnector::new("AA:BB:CC:DD:EE:FF");
        mock.fail_all_opens(true);
        mock.set_open_error(TransportError::DeviceNotFound("AA:BB:CC:DD:EE:FF".into()));
        let (manager, _) = manager(&mock);

        let err = manager.ensure_connected().await.unwrap_err();
        assert_eq!(
            err,
            LightError::ConnectionAttemptsExhausted {
                attempts: 3,
                last_error: Some(TransportError::DeviceNotFound("AA:BB:CC:DD:EE:FF".into())),
            }
        );
        assert_eq!(mock.open_count(), 3);
        assert_eq!(manager.failure_count(), 1);
        assert_eq!(manager.state(), ConnectionState::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_timeout_counts_as_failure() {
        let mock = MockConnector::new("AA:BB:CC:DD:EE:FF");
        mock.set_open_delay(Some(Duration::from_secs(60)));
        let (manager, _) = manager(&mock);

        let err = manager.ensure_connected().await.unwrap_err();
        assert!(matches!(
            err,
            LightError::ConnectionAttemptsExhausted {
                last_error: Some(TransportError::Timeout),
                ..
            }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_subscribe_times_out() {
        let mock = MockConnector::new("AA:BB:CC:DD:EE:FF");
        mock.set_subscribe_delay(Some(Duration::from_secs(60)));
        let (manager, _) = manager(&mock);

        let err = manager.ensure_connected().await.unwrap_err();
        assert!(matches!(
            err,
            LightError::ConnectionAttemptsExhausted {
                last_error: Some(TransportError::Timeout),
                ..
            }
        ));
        assert_eq!(mock.open_count(), 3);
        // Every half-open link was closed again
        assert_eq!(mock.close_count(), 3);
        assert!(!manager.is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_waits_for_cycle_in_flight() {
        let mock = MockConnector::new("AA:BB:CC:DD:EE:FF");
        mock.fail_all_opens(true);
        let (manager, _) = manager(&mock);

        let (connected, ()) = tokio::join!(manager.ensure_connected(), async {
            tokio::time::sleep(Duration::from_millis(500)).await;
            manager.reset().await;
        });
        assert!(connected.is_err());
        assert_eq!(manager.failure_count(), 0);
        assert_eq!(manager.backoff_remaining(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_link_loss_detected_and_reconnected() {
        let mock = MockConnector::new("AA:BB:CC:DD:EE:FF");
        let (manager, events) = manager(&mock);
        manager.ensure_connected().await.unwrap();

        mock.drop_link();
        tokio::task::yield_now().await;
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert_eq!(events.lock().last(), Some(&LinkEvent::Lost));

        manager.ensure_connected().await.unwrap();
        assert_eq!(mock.open_count(), 2);
        assert!(manager.is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_and_reset() {
        let mock = MockConnector::new("AA:BB:CC:DD:EE:FF");
        mock.fail_all_opens(true);
        let (manager, events) = manager(&mock);

        assert!(manager.ensure_connected().await.is_err());
        assert_eq!(manager.failure_count(), 1);
        assert!(manager.backoff_remaining().is_some());

        manager.reset().await;
        assert_eq!(manager.failure_count(), 0);
        assert_eq!(manager.backoff_remaining(), None);

        mock.fail_all_opens(false);
        manager.ensure_connected().await.unwrap();
        manager.disconnect().await;
        assert!(!manager.is_connected());
        assert!(!mock.is_link_connected());
        assert_eq!(mock.close_count(), 1);
        // Explicit disconnect is not reported as a lost link
        assert!(events.lock().is_empty());

        // Disconnecting twice is a no-op
        manager.disconnect().await;
        assert_eq!(mock.close_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_notifications_reach_handler() {
        let mock = MockConnector::new("AA:BB:CC:DD:EE:FF");
        let (manager, events) = manager(&mock);
        manager.ensure_connected().await.unwrap();

        assert!(mock.inject_notification(vec![0xAA, 0x01, 0x01]));
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(
            events.lock().as_slice(),
            &[LinkEvent::Notification(vec![0xAA, 0x01, 0x01])]
        );
    }
}
