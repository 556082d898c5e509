//! Periodic refresh scheduler
//!
//! One task per light, each owning its session. State pushed by any light
//! is printed by a single printer task. Ctrl-C resets every session.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::bail;
use futures::future::join_all;
use govee_light::{LightSession, StateSink, StateUpdate};
use tokio::sync::{mpsc, watch, Mutex};
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use super::{
    interrupted, open_session, resolve_target, setup_interrupt_handler, CommandResult, Context,
    Target,
};

pub async fn watch(ctx: &Context, devices: Vec<String>, interval: Option<u64>) -> CommandResult {
    let keys: Vec<String> = if devices.is_empty() {
        ctx.config.devices.iter().map(|d| d.address.clone()).collect()
    } else {
        devices
    };
    if keys.is_empty() {
        bail!("No devices configured; add one with `devices add` or name it on the command line");
    }
    let targets = keys
        .iter()
        .map(|key| resolve_target(&ctx.config, key))
        .collect::<anyhow::Result<Vec<_>>>()?;

    let interval = interval
        .map(|secs| Duration::from_secs(secs.max(1)))
        .unwrap_or_else(|| ctx.config.polling.interval());
    info!(
        "Watching {} light(s) every {}s (Ctrl-C to stop)",
        targets.len(),
        interval.as_secs()
    );

    let labels: HashMap<String, String> = targets
        .iter()
        .map(|t| (t.address.to_uppercase(), t.label().to_string()))
        .collect();
    let (tx, rx) = mpsc::unbounded_channel();
    let printer = tokio::spawn(print_updates(rx, labels));

    let stop = setup_interrupt_handler();
    // Scans share the adapter
    let scan_lock = Arc::new(Mutex::new(()));

    let handles: Vec<_> = targets
        .into_iter()
        .map(|target| {
            let worker = DeviceWorker {
                ctx: ctx.clone(),
                target,
                sink: tx.clone(),
                interval,
                scan_lock: Arc::clone(&scan_lock),
            };
            tokio::spawn(worker.run(stop.clone()))
        })
        .collect();
    drop(tx);

    for result in join_all(handles).await {
        if let Err(e) = result {
            warn!("Watch task failed: {}", e);
        }
    }
    // Ends once every session, and with it every sink clone, is gone
    if let Err(e) = printer.await {
        warn!("Printer task failed: {}", e);
    }
    Ok(())
}

async fn print_updates(
    mut rx: mpsc::UnboundedReceiver<StateUpdate>,
    labels: HashMap<String, String>,
) {
    while let Some(update) = rx.recv().await {
        let label = labels
            .get(&update.address.to_uppercase())
            .map_or(update.address.as_str(), String::as_str);
        println!("[{}] {:<10} {}", label, update.command.name(), update.state);
    }
}

struct DeviceWorker {
    ctx: Context,
    target: Target,
    sink: StateSink,
    interval: Duration,
    scan_lock: Arc<Mutex<()>>,
}

impl DeviceWorker {
    async fn run(self, mut stop: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut session: Option<LightSession> = None;

        loop {
            tokio::select! {
                _ = interrupted(&mut stop) => break,
                _ = ticker.tick() => {}
            }
            tokio::select! {
                _ = interrupted(&mut stop) => break,
                _ = self.poll(&mut session) => {}
            }
        }

        if let Some(session) = session {
            session.reset_connection_state().await;
            info!("{}: stopped", self.target.label());
        }
    }

    /// Resolve the light if needed, then refresh it
    async fn poll(&self, session: &mut Option<LightSession>) {
        if session.is_none() {
            let opened = {
                let _scan = self.scan_lock.lock().await;
                open_session(&self.ctx, &self.target, Some(self.sink.clone()), true).await
            };
            match opened {
                Ok(s) => *session = Some(s),
                Err(e) => {
                    warn!("{}: {}", self.target.label(), e);
                    return;
                }
            }
        }
        if let Some(session) = session {
            session.refresh().await;
        }
    }
}
