//! Govee BLE Light Driver CLI
//!
//! A command-line interface for controlling Govee Bluetooth LE lights.

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use govee_driver::config::AppConfig;

// CLI definitions
mod cli;
use cli::{Cli, Commands, DeviceCommands};

// Command handlers
mod commands;
use commands::Context;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = cli.config.clone().unwrap_or_else(AppConfig::default_path);
    let config = AppConfig::load(&config_path)?;

    // Initialize logging: RUST_LOG, then --log-level, then the config file
    let level = cli
        .log_level
        .clone()
        .unwrap_or_else(|| config.logging.level.clone());
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    // Create printer config if monitoring is enabled
    let printer = commands::create_printer_config(cli.monitor, cli.hex, cli.filter.as_deref())?;

    let mut ctx = Context {
        config,
        config_path,
        printer,
    };

    match cli.command {
        // === Control Commands ===
        Commands::On { device } => commands::control::power(&ctx, &device, true).await?,
        Commands::Off { device } => commands::control::power(&ctx, &device, false).await?,
        Commands::Brightness { device, level } => {
            commands::control::brightness(&ctx, &device, level).await?;
        }
        Commands::Color { device, r, g, b } => {
            commands::control::color(&ctx, &device, r, g, b).await?;
        }
        Commands::Effect { device, name } => {
            commands::control::effect(&ctx, &device, &name).await?;
        }
        Commands::Music { device, state } => {
            commands::control::music(&ctx, &device, state.enabled()).await?;
        }

        // === Query Commands ===
        Commands::Status { device, timeout } => {
            commands::query::status(&ctx, &device, timeout).await?;
        }
        Commands::Watch { devices, interval } => {
            commands::watch::watch(&ctx, devices, interval).await?;
        }
        Commands::Effects => commands::query::effects()?,
        Commands::Reset { device } => commands::query::reset(&ctx, &device).await?,

        // === Configuration ===
        Commands::Devices(sub) => match sub {
            DeviceCommands::List => commands::devices::list(&ctx)?,
            DeviceCommands::Add {
                address,
                name,
                segmented,
                music_mode,
                no_scan,
            } => {
                commands::devices::add(&mut ctx, &address, name, segmented, music_mode, no_scan)
                    .await?;
            }
            DeviceCommands::Set {
                device,
                name,
                segmented,
                music_mode,
            } => commands::devices::set(&mut ctx, &device, name, segmented, music_mode)?,
            DeviceCommands::Remove { device } => commands::devices::remove(&mut ctx, &device)?,
            DeviceCommands::Scan { duration } => commands::devices::scan(&ctx, duration).await?,
        },
    }

    Ok(())
}
