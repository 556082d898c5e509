//! Command handlers for the CLI application.
//!
//! This module organizes command handlers by category:
//! - `control`: Write commands (on, off, brightness, color, effect, music)
//! - `query`: Read commands (status, effects, reset)
//! - `watch`: Periodic refresh of one or more lights
//! - `devices`: Configuration management (list, add, set, remove, scan)

pub mod control;
pub mod devices;
pub mod query;
pub mod watch;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::bail;
use govee_driver::config::{AppConfig, DeviceEntry};
use govee_light::{LightSession, StateSink};
use govee_transport::{BoxedConnector, BtleConnector, PacketFilter, PrinterConfig, PrinterConnector};
use tracing::debug;

/// Result type for command handlers
pub type CommandResult = anyhow::Result<()>;

/// Everything a handler needs besides its own arguments
#[derive(Clone)]
pub struct Context {
    pub config: AppConfig,
    pub config_path: PathBuf,
    /// Set when `--monitor` is given
    pub printer: Option<PrinterConfig>,
}

/// A light named on the command line
#[derive(Debug, Clone)]
pub struct Target {
    pub address: String,
    /// Configured entry; `None` for a bare address
    pub entry: Option<DeviceEntry>,
}

impl Target {
    pub fn label(&self) -> &str {
        self.entry
            .as_ref()
            .map_or(self.address.as_str(), |e| e.label())
    }
}

/// Whether `s` is a colon separated Bluetooth address
pub fn looks_like_address(s: &str) -> bool {
    let parts: Vec<&str> = s.split(':').collect();
    parts.len() == 6
        && parts
            .iter()
            .all(|p| p.len() == 2 && p.chars().all(|c| c.is_ascii_hexdigit()))
}

/// Resolve a configured name or address
///
/// Unconfigured addresses are accepted and get the creation defaults once
/// their advertisement has been seen.
pub fn resolve_target(config: &AppConfig, key: &str) -> anyhow::Result<Target> {
    if let Some(entry) = config.find_device(key) {
        return Ok(Target {
            address: entry.address.clone(),
            entry: Some(entry.clone()),
        });
    }
    if looks_like_address(key) {
        return Ok(Target {
            address: key.to_uppercase(),
            entry: None,
        });
    }
    bail!("Unknown device '{key}' (not a configured name or a Bluetooth address)")
}

/// Find the light and build a session for it
///
/// Scans until the address shows up or `polling.scan_timeout_secs` elapses.
/// With `seed_power` the advertised power state is used until the first
/// response arrives.
pub async fn open_session(
    ctx: &Context,
    target: &Target,
    sink: Option<StateSink>,
    seed_power: bool,
) -> anyhow::Result<LightSession> {
    let (connector, light) =
        BtleConnector::discover(&target.address, ctx.config.polling.scan_timeout()).await?;

    let entry = target
        .entry
        .clone()
        .unwrap_or_else(|| DeviceEntry::new(target.address.clone(), light.name.as_deref()));
    debug!(
        "{}: segmented={} music_mode_support={}",
        entry.label(),
        entry.segmented,
        entry.music_mode_support
    );

    let mut connector: BoxedConnector = Arc::new(connector);
    if let Some(config) = &ctx.printer {
        connector = PrinterConnector::wrap(connector, config.clone());
    }

    let session = LightSession::new(
        connector,
        entry.session_options(&ctx.config.connection),
        sink,
    );
    if seed_power {
        if let Some(on) = light.advertised_power() {
            debug!("{} advertises power {}", entry.label(), on);
            session.seed_power(on);
        }
    }
    Ok(session)
}

/// Set up a Ctrl-C handler that flips the returned flag to true.
pub fn setup_interrupt_handler() -> tokio::sync::watch::Receiver<bool> {
    let (tx, rx) = tokio::sync::watch::channel(false);

    ctrlc::set_handler(move || {
        let _ = tx.send(true);
    })
    .ok();

    rx
}

/// Resolves once the interrupt flag is set
pub async fn interrupted(rx: &mut tokio::sync::watch::Receiver<bool>) {
    let _ = rx.wait_for(|stop| *stop).await;
}

/// Create printer config from CLI flags
pub fn create_printer_config(
    monitor: bool,
    hex: bool,
    filter: Option<&str>,
) -> anyhow::Result<Option<PrinterConfig>> {
    if !monitor {
        return Ok(None);
    }

    let filter = match filter {
        Some(f) => f.parse::<PacketFilter>().map_err(anyhow::Error::msg)?,
        None => PacketFilter::All,
    };

    Ok(Some(PrinterConfig::default().with_hex(hex).with_filter(filter)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_detection() {
        assert!(looks_like_address("A4:C1:38:0a:0B:01"));
        assert!(!looks_like_address("A4:C1:38:0A:0B"));
        assert!(!looks_like_address("A4:C1:38:0A:0B:0G"));
        assert!(!looks_like_address("Desk Strip"));
    }

    #[test]
    fn test_resolve_target() {
        let mut config = AppConfig::default();
        let mut entry = DeviceEntry::new("A4:C1:38:00:00:01", None);
        entry.name = Some("Desk".into());
        config.devices.push(entry);

        let by_name = resolve_target(&config, "Desk").unwrap();
        assert_eq!(by_name.address, "A4:C1:38:00:00:01");
        assert_eq!(by_name.label(), "Desk");

        let bare = resolve_target(&config, "a4:c1:38:00:00:02").unwrap();
        assert_eq!(bare.address, "A4:C1:38:00:00:02");
        assert!(bare.entry.is_none());

        assert!(resolve_target(&config, "Kitchen").is_err());
    }

    #[test]
    fn test_printer_config_from_flags() {
        assert!(create_printer_config(false, true, Some("cmd=0x05"))
            .unwrap()
            .is_none());

        let config = create_printer_config(true, true, Some("cmd=0x05"))
            .unwrap()
            .unwrap();
        assert!(config.show_hex);
        assert_eq!(config.filter, PacketFilter::Cmd(0x05));

        assert!(create_printer_config(true, false, Some("bogus")).is_err());
    }

    #[tokio::test]
    async fn test_interrupted_sees_earlier_signal() {
        let (tx, mut rx) = tokio::sync::watch::channel(false);
        tx.send(true).unwrap();
        interrupted(&mut rx).await;
    }
}
