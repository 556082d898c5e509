//! Response correlator
//!
//! Turns inbound notification frames into state cache updates, resolves the
//! oldest pending waiter for the same command and pushes a snapshot to the
//! subscriber.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use govee_transport::Frame;
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::command::{LedCommand, PacketHead};
use crate::effect::CurrentEffect;
use crate::error::LightError;
use crate::led::{level_from_percent, RgbColor};
use crate::state::DeviceState;

/// State pushed to subscribers after every cache mutation by a response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateUpdate {
    pub address: String,
    pub command: LedCommand,
    pub state: DeviceState,
}

/// Subscriber channel for pushed state
pub type StateSink = mpsc::UnboundedSender<StateUpdate>;

type Reply = Result<DeviceState, LightError>;

/// Resolves when the response to one query has been applied
///
/// Resolves with the cache snapshot taken right after the response was
/// applied. Dropping the waiter is fine; the update still reaches the sink.
#[derive(Debug)]
pub struct ResponseWaiter {
    id: u64,
    command: LedCommand,
    rx: oneshot::Receiver<Reply>,
}

impl ResponseWaiter {
    /// Unique per correlator
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Command code of the awaited response
    pub fn command(&self) -> LedCommand {
        self.command
    }

    pub async fn wait(self) -> Result<DeviceState, LightError> {
        self.rx.await.unwrap_or(Err(LightError::ResponseAbandoned))
    }
}

struct PendingResponse {
    id: u64,
    command: LedCommand,
    tx: oneshot::Sender<Reply>,
}

pub struct ResponseCorrelator {
    address: String,
    segmented: bool,
    state: Arc<Mutex<DeviceState>>,
    pending: Mutex<VecDeque<PendingResponse>>,
    next_id: AtomicU64,
    sink: Option<StateSink>,
}

impl ResponseCorrelator {
    pub fn new(
        address: impl Into<String>,
        segmented: bool,
        state: Arc<Mutex<DeviceState>>,
        sink: Option<StateSink>,
    ) -> Self {
        Self {
            address: address.into(),
            segmented,
            state,
            pending: Mutex::new(VecDeque::new()),
            next_id: AtomicU64::new(1),
            sink,
        }
    }

    /// Register interest in the next response carrying `command`
    pub fn register(&self, command: LedCommand) -> ResponseWaiter {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        let mut pending = self.pending.lock();
        // Waiters dropped by their callers
        pending.retain(|p| !p.tx.is_closed());
        pending.push_back(PendingResponse { id, command, tx });
        ResponseWaiter { id, command, rx }
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    /// Fail every pending waiter with `ResponseAbandoned`
    pub fn abandon_pending(&self) {
        let drained: Vec<_> = self.pending.lock().drain(..).collect();
        Self::fail_abandoned(drained);
    }

    /// Fail only the waiters with the given ids
    ///
    /// Ids already resolved or abandoned are ignored.
    pub fn abandon(&self, ids: &[u64]) {
        if ids.is_empty() {
            return;
        }
        let removed: Vec<_> = {
            let mut pending = self.pending.lock();
            let (removed, kept): (Vec<_>, Vec<_>) =
                pending.drain(..).partition(|p| ids.contains(&p.id));
            *pending = VecDeque::from(kept);
            removed
        };
        Self::fail_abandoned(removed);
    }

    fn fail_abandoned(abandoned: Vec<PendingResponse>) {
        if !abandoned.is_empty() {
            debug!("Abandoning {} pending responses", abandoned.len());
        }
        for pending in abandoned {
            let _ = pending.tx.send(Err(LightError::ResponseAbandoned));
        }
    }

    /// Process one raw notification
    ///
    /// Returns the command applied, `None` for frames that carry no state.
    /// A corrupt frame is discarded and its error handed to the oldest
    /// pending waiter.
    pub fn handle_notification(&self, data: &[u8]) -> Result<Option<LedCommand>, LightError> {
        let frame = match Frame::decode(data) {
            Ok(frame) => frame,
            Err(e) => {
                let err = LightError::from(e);
                warn!("Discarding frame from {}: {}", self.address, err);
                if let Some(pending) = self.pending.lock().pop_front() {
                    let _ = pending.tx.send(Err(err.clone()));
                }
                return Err(err);
            }
        };

        if frame.head() != PacketHead::Request.byte() {
            debug!("Ignoring non-response frame {:?}", frame);
            return Ok(None);
        }

        let Some(command) = LedCommand::from_code(frame.cmd()) else {
            debug!("Ignoring unknown command 0x{:02x}", frame.cmd());
            return Ok(None);
        };

        let snapshot = {
            let mut state = self.state.lock();
            self.apply(&mut state, command, frame.payload());
            state.clone()
        };
        debug!("{} <- {}: {}", self.address, command.name(), snapshot);

        let waiter = {
            let mut pending = self.pending.lock();
            pending
                .iter()
                .position(|p| p.command == command)
                .and_then(|i| pending.remove(i))
        };
        if let Some(waiter) = waiter {
            let _ = waiter.tx.send(Ok(snapshot.clone()));
        }

        if let Some(sink) = &self.sink {
            let update = StateUpdate {
                address: self.address.clone(),
                command,
                state: snapshot,
            };
            if sink.send(update).is_err() {
                debug!("State subscriber for {} is gone", self.address);
            }
        }

        Ok(Some(command))
    }

    fn apply(&self, state: &mut DeviceState, command: LedCommand, payload: &[u8]) {
        match command {
            LedCommand::Power => state.power = Some(payload[0] != 0),
            LedCommand::Brightness => {
                state.brightness = Some(if self.segmented {
                    level_from_percent(payload[0])
                } else {
                    payload[0]
                });
            }
            LedCommand::Color => {
                state.color = Some(RgbColor::new(payload[1], payload[2], payload[3]));
            }
            LedCommand::Segment => {
                state.color = Some(RgbColor::new(payload[2], payload[3], payload[4]));
            }
            LedCommand::MusicMode => {
                let effect = CurrentEffect::from_wire(payload[0]);
                state.music_mode_enabled = effect.is_some();
                state.current_effect = effect;
            }
            LedCommand::Effect | LedCommand::Scene => {
                state.current_effect = CurrentEffect::from_wire(payload[0]);
            }
        }
    }
}
