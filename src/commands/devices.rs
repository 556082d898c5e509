//! Device configuration commands

use std::time::Duration;

use anyhow::{bail, Context as _};
use crossterm::style::Stylize;
use govee_driver::config::DeviceEntry;
use govee_transport::bluetooth::scan_lights;
use govee_transport::{is_h1167, BtleConnector};
use tracing::warn;

use super::{looks_like_address, CommandResult, Context};

fn flag(value: bool) -> &'static str {
    if value {
        "yes"
    } else {
        "no"
    }
}

fn print_entry(entry: &DeviceEntry) {
    println!(
        "  {}  {:<20} segmented={:<3} music={}",
        entry.address,
        entry.name.as_deref().unwrap_or("-"),
        flag(entry.segmented),
        flag(entry.music_mode_support)
    );
}

pub fn list(ctx: &Context) -> CommandResult {
    if ctx.config.devices.is_empty() {
        println!("No devices configured ({})", ctx.config_path.display());
        println!("Add one with: govee-driver devices add <ADDRESS>");
        return Ok(());
    }
    println!("{}", ctx.config_path.display().to_string().dim());
    for entry in &ctx.config.devices {
        print_entry(entry);
    }
    Ok(())
}

pub async fn add(
    ctx: &mut Context,
    address: &str,
    name: Option<String>,
    segmented: Option<bool>,
    music_mode: Option<bool>,
    no_scan: bool,
) -> CommandResult {
    if !looks_like_address(address) {
        bail!("'{address}' is not a Bluetooth address (expected AA:BB:CC:DD:EE:FF)");
    }
    let address = address.to_uppercase();

    let advertised = if no_scan {
        None
    } else {
        match BtleConnector::discover(&address, ctx.config.polling.scan_timeout()).await {
            Ok((_, light)) => light.name,
            Err(e) => {
                warn!("Could not read advertised name: {}", e);
                None
            }
        }
    };

    let mut entry = DeviceEntry::new(address, advertised.as_deref());
    entry.name = name;
    if let Some(segmented) = segmented {
        entry.segmented = segmented;
    }
    if let Some(music_mode) = music_mode {
        entry.music_mode_support = music_mode;
    }

    let replaced = ctx.config.upsert_device(entry.clone());
    save(ctx)?;
    println!("{} device:", if replaced { "Updated" } else { "Added" });
    print_entry(&entry);
    Ok(())
}

pub fn set(
    ctx: &mut Context,
    device: &str,
    name: Option<String>,
    segmented: Option<bool>,
    music_mode: Option<bool>,
) -> CommandResult {
    let entry = ctx
        .config
        .find_device_mut(device)
        .with_context(|| format!("Device '{device}' is not configured"))?;
    if let Some(name) = name {
        entry.name = Some(name);
    }
    if let Some(segmented) = segmented {
        entry.segmented = segmented;
    }
    if let Some(music_mode) = music_mode {
        entry.music_mode_support = music_mode;
    }
    let entry = entry.clone();

    save(ctx)?;
    print_entry(&entry);
    Ok(())
}

pub fn remove(ctx: &mut Context, device: &str) -> CommandResult {
    let entry = ctx
        .config
        .remove_device(device)
        .with_context(|| format!("Device '{device}' is not configured"))?;
    save(ctx)?;
    println!("Removed {}", entry.label());
    Ok(())
}

/// Scan and print nearby lights
pub async fn scan(ctx: &Context, duration: Option<u64>) -> CommandResult {
    let duration = duration
        .map(Duration::from_secs)
        .unwrap_or_else(|| ctx.config.polling.scan_timeout());
    println!("Scanning for {}s...", duration.as_secs());

    let mut lights = scan_lights(duration).await?;
    if lights.is_empty() {
        println!("No Govee lights found");
        return Ok(());
    }
    lights.sort_by_key(|l| std::cmp::Reverse(l.rssi));

    for light in &lights {
        let name = light.name.as_deref().unwrap_or("-");
        let configured = if ctx.config.find_device(&light.address).is_some() {
            "configured".green().to_string()
        } else {
            String::new()
        };
        let power = match light.advertised_power() {
            Some(true) => "on",
            Some(false) => "off",
            None => "?",
        };
        let rssi = light.rssi.map_or("?".to_string(), |r| format!("{r} dBm"));
        println!(
            "  {}  {:<24} rssi={:<8} power={:<3} music={} {}",
            light.address,
            name,
            rssi,
            power,
            flag(is_h1167(name)),
            configured
        );
    }
    Ok(())
}

fn save(ctx: &Context) -> CommandResult {
    ctx.config
        .save(&ctx.config_path)
        .with_context(|| format!("Failed to write {}", ctx.config_path.display()))
}
