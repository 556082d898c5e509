// CLI definitions using clap

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "govee-driver")]
#[command(author, version, about = "Govee Bluetooth LE light driver")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Config file path (default: ~/.config/govee-ble/devices.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace); RUST_LOG takes precedence
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Enable link monitoring (prints all frames and notifications)
    #[arg(long, global = true)]
    pub monitor: bool,

    /// Show raw hex dump alongside decoded output
    #[arg(long, global = true)]
    pub hex: bool,

    /// Filter monitor output (all, commands, responses, cmd=0xNN)
    #[arg(long, global = true)]
    pub filter: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    // === Control Commands ===
    /// Turn a light on
    On {
        /// Device address or configured name
        device: String,
    },

    /// Turn a light off
    Off {
        /// Device address or configured name
        device: String,
    },

    /// Set brightness
    #[command(visible_aliases = ["bright", "b"])]
    Brightness {
        /// Device address or configured name
        device: String,
        /// Brightness (0-255, scaled to 0-100 on segmented devices)
        #[arg(value_parser = clap::value_parser!(u16).range(0..256))]
        level: u16,
    },

    /// Set a solid RGB color
    #[command(visible_aliases = ["colour", "c"])]
    Color {
        /// Device address or configured name
        device: String,
        /// Red (0-255)
        #[arg(value_parser = clap::value_parser!(u16).range(0..256))]
        r: u16,
        /// Green (0-255)
        #[arg(value_parser = clap::value_parser!(u16).range(0..256))]
        g: u16,
        /// Blue (0-255)
        #[arg(value_parser = clap::value_parser!(u16).range(0..256))]
        b: u16,
    },

    /// Select a lighting effect by name (see `effects`)
    #[command(visible_aliases = ["fx", "e"])]
    Effect {
        /// Device address or configured name
        device: String,
        /// Effect name, e.g. "Rhythm" or "Piano Keys"
        name: String,
    },

    /// Toggle microphone-reactive music mode
    #[command(visible_alias = "m")]
    Music {
        /// Device address or configured name
        device: String,
        #[arg(value_enum)]
        state: Toggle,
    },

    // === Query Commands ===
    /// Query power, brightness, color and music mode
    #[command(visible_aliases = ["st", "s"])]
    Status {
        /// Device address or configured name
        device: String,
        /// Seconds to wait for the responses
        #[arg(short, long, default_value = "5")]
        timeout: u64,
    },

    /// Refresh devices periodically and print every state update
    #[command(visible_alias = "w")]
    Watch {
        /// Devices to watch (default: all configured devices)
        devices: Vec<String>,
        /// Refresh interval in seconds (default: polling.interval_secs)
        #[arg(short, long)]
        interval: Option<u64>,
    },

    /// List effect names by family
    #[command(visible_alias = "fxs")]
    Effects,

    /// Refresh once, then reset the connection state and print diagnostics
    Reset {
        /// Device address or configured name
        device: String,
    },

    // === Configuration ===
    /// Manage configured devices
    #[command(subcommand, visible_alias = "dev")]
    Devices(DeviceCommands),
}

#[derive(Copy, Clone, PartialEq, Eq, Debug, ValueEnum)]
pub enum Toggle {
    On,
    Off,
}

impl Toggle {
    pub fn enabled(self) -> bool {
        self == Toggle::On
    }
}

/// Device configuration commands
#[derive(Subcommand)]
pub enum DeviceCommands {
    /// List configured devices
    #[command(visible_alias = "ls")]
    List,

    /// Add a device (scans for its advertised name unless --no-scan)
    Add {
        /// Bluetooth address (AA:BB:CC:DD:EE:FF)
        address: String,
        /// Friendly name
        #[arg(short, long)]
        name: Option<String>,
        /// Segmented layout (default: true)
        #[arg(long)]
        segmented: Option<bool>,
        /// Music mode support (default: true for H1167 models)
        #[arg(long)]
        music_mode: Option<bool>,
        /// Do not scan for the advertised name
        #[arg(long)]
        no_scan: bool,
    },

    /// Change flags of a configured device
    Set {
        /// Device address or configured name
        device: String,
        /// New friendly name
        #[arg(short, long)]
        name: Option<String>,
        #[arg(long)]
        segmented: Option<bool>,
        #[arg(long)]
        music_mode: Option<bool>,
    },

    /// Remove a configured device
    #[command(visible_alias = "rm")]
    Remove {
        /// Device address or configured name
        device: String,
    },

    /// Scan for nearby Govee lights
    Scan {
        /// Scan duration in seconds (default: polling.scan_timeout_secs)
        #[arg(short, long)]
        duration: Option<u64>,
    },
}
