//! PrinterLink middleware for monitoring link traffic
//!
//! This module provides a middleware that wraps any GattLink implementation
//! and prints all frames passing through it.
//!
//! # Example
//!
//! ```ignore
//! use govee_transport::{BtleConnector, PrinterConnector, PrinterConfig, PacketFilter};
//!
//! let (connector, _) = BtleConnector::discover(address, timeout).await?;
//! let config = PrinterConfig::default().with_hex(true);
//! let monitored = PrinterConnector::wrap(Arc::new(connector), config);
//! // Every link opened through `monitored` now prints its frames
//! ```

use crate::protocol::{cmd, head, Frame, FrameError};
use crate::{
    BoxedConnector, BoxedLink, GattLink, LinkConnector, LinkInfo, TransportError,
    NOTIFICATION_CHANNEL_CAPACITY,
};
use async_trait::async_trait;
use crossterm::style::Stylize;
use parking_lot::Mutex;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// Packet filter for selective display
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum PacketFilter {
    #[default]
    All,
    /// Outbound frames only
    Commands,
    /// Inbound notifications only
    Responses,
    /// One command code in both directions
    Cmd(u8),
}

impl FromStr for PacketFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "all" | "" => Ok(Self::All),
            "commands" | "cmds" | "out" => Ok(Self::Commands),
            "responses" | "rsp" | "in" => Ok(Self::Responses),
            s if s.starts_with("cmd=") || s.starts_with("0x") => {
                let hex_str = s.strip_prefix("cmd=").unwrap_or(s);
                let hex_str = hex_str.strip_prefix("0x").unwrap_or(hex_str);
                u8::from_str_radix(hex_str, 16)
                    .map(Self::Cmd)
                    .map_err(|e| format!("Invalid command byte: {}", e))
            }
            _ => Err(format!("Unknown filter: {}", s)),
        }
    }
}

impl PacketFilter {
    fn shows_outbound(&self, cmd: u8) -> bool {
        match self {
            Self::All | Self::Commands => true,
            Self::Responses => false,
            Self::Cmd(c) => *c == cmd,
        }
    }

    /// `cmd` is `None` when the frame is too short to carry one
    fn shows_inbound(&self, cmd: Option<u8>) -> bool {
        match self {
            Self::All | Self::Responses => true,
            Self::Commands => false,
            Self::Cmd(c) => cmd == Some(*c),
        }
    }
}

/// Configuration for the printer middleware
#[derive(Debug, Clone, Default)]
pub struct PrinterConfig {
    /// Show raw hex dump alongside decoded output
    pub show_hex: bool,
    /// Filter for selective display
    pub filter: PacketFilter,
}

impl PrinterConfig {
    /// Create config with hex output setting
    pub fn with_hex(mut self, show: bool) -> Self {
        self.show_hex = show;
        self
    }

    /// Create config with filter
    pub fn with_filter(mut self, filter: PacketFilter) -> Self {
        self.filter = filter;
        self
    }
}

/// Shared printing logic for both directions
#[derive(Debug, Clone)]
struct Printer {
    config: PrinterConfig,
}

impl Printer {
    /// Print a frame being written
    fn print_outbound(&self, frame: &Frame) {
        if !self.config.filter.shows_outbound(frame.cmd()) {
            return;
        }

        let tag = if frame.head() == head::COMMAND {
            "CMD".cyan().bold()
        } else {
            "REQ".magenta().bold()
        };
        eprintln!(
            "{} {}  0x{:02x} {} {:02x?}",
            ">>>".cyan(),
            tag,
            frame.cmd(),
            cmd::name(frame.cmd()).yellow(),
            trim_padding(frame.payload())
        );

        if self.config.show_hex {
            eprintln!("    {}  {:02x?}", "HEX".dim(), frame.as_bytes());
        }
    }

    /// Print a notification received
    fn print_inbound(&self, data: &[u8]) {
        if !self.config.filter.shows_inbound(data.get(1).copied()) {
            return;
        }

        match Frame::decode(data) {
            Ok(frame) => {
                eprintln!(
                    "{} {}  0x{:02x} {} {:02x?}",
                    "<<<".green(),
                    "RSP".green().bold(),
                    frame.cmd(),
                    cmd::name(frame.cmd()).yellow(),
                    trim_padding(frame.payload())
                );
            }
            Err(e) => {
                let reason = match e {
                    FrameError::ChecksumMismatch { .. } => "CHECKSUM",
                    _ => "LENGTH",
                };
                eprintln!(
                    "{} {}  {} {}",
                    "<<<".red(),
                    "BAD".red().bold(),
                    reason.red(),
                    e
                );
            }
        }

        if self.config.show_hex {
            eprintln!("    {}  {:02x?}", "HEX".dim(), data);
        }
    }
}

/// Payload without trailing zero padding (at least one byte kept)
fn trim_padding(payload: &[u8]) -> &[u8] {
    let end = payload
        .iter()
        .rposition(|&b| b != 0)
        .map_or(1.min(payload.len()), |i| i + 1);
    &payload[..end]
}

/// Link middleware that prints all frames
///
/// Wraps any GattLink implementation and prints all traffic passing through.
pub struct PrinterLink {
    inner: BoxedLink,
    printer: Printer,
    forwarder: Mutex<Option<JoinHandle<()>>>,
}

impl PrinterLink {
    /// Wrap a link with printing middleware
    pub fn wrap(link: BoxedLink, config: PrinterConfig) -> BoxedLink {
        Arc::new(Self {
            inner: link,
            printer: Printer { config },
            forwarder: Mutex::new(None),
        })
    }
}

#[async_trait]
impl GattLink for PrinterLink {
    async fn write_frame(&self, frame: &Frame) -> Result<(), TransportError> {
        self.printer.print_outbound(frame);
        self.inner.write_frame(frame).await
    }

    async fn start_notifications(&self) -> Result<broadcast::Receiver<Vec<u8>>, TransportError> {
        let mut upstream = self.inner.start_notifications().await?;
        let (tx, rx) = broadcast::channel(NOTIFICATION_CHANNEL_CAPACITY);
        let printer = self.printer.clone();

        let handle = tokio::spawn(async move {
            loop {
                match upstream.recv().await {
                    Ok(data) => {
                        printer.print_inbound(&data);
                        if tx.send(data).is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        eprintln!("{} {}  {} dropped", "<<<".red(), "LAG".red().bold(), n);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
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
        self.inner.stop_notifications().await
    }

    async fn is_connected(&self) -> bool {
        self.inner.is_connected().await
    }

    async fn close(&self) -> Result<(), TransportError> {
        if let Some(handle) = self.forwarder.lock().take() {
            handle.abort();
        }
        self.inner.close().await
    }

    fn link_info(&self) -> &LinkInfo {
        self.inner.link_info()
    }
}

/// Connector middleware wrapping every opened link in a `PrinterLink`
pub struct PrinterConnector {
    inner: BoxedConnector,
    config: PrinterConfig,
}

impl PrinterConnector {
    pub fn wrap(connector: BoxedConnector, config: PrinterConfig) -> BoxedConnector {
        Arc::new(Self {
            inner: connector,
            config,
        })
    }
}

#[async_trait]
impl LinkConnector for PrinterConnector {
    async fn open(&self) -> Result<BoxedLink, TransportError> {
        let link = self.inner.open().await?;
        Ok(PrinterLink::wrap(link, self.config.clone()))
    }

    fn address(&self) -> &str {
        self.inner.address()
    }
}
