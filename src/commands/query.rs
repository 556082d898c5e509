//! Read commands: status, effects, reset

use std::time::Duration;

use crossterm::style::Stylize;
use futures::future::join_all;
use govee_light::{DeviceState, Effect, EffectFamily, LightSession};
use tracing::warn;

use super::{open_session, resolve_target, CommandResult, Context};

fn unknown() -> String {
    "unknown".dim().to_string()
}

/// Print the cached state of one light
pub fn print_state(label: &str, state: &DeviceState, music_mode_support: bool) {
    println!("\n{}", label.bold());
    let power = match state.power {
        Some(true) => "on".green().to_string(),
        Some(false) => "off".red().to_string(),
        None => unknown(),
    };
    println!("  Power:      {power}");
    match state.brightness {
        Some(b) => println!("  Brightness: {b}/255"),
        None => println!("  Brightness: {}", unknown()),
    }
    match state.color {
        Some(c) => println!("  Color:      {} ({}, {}, {})", c, c.r, c.g, c.b),
        None => println!("  Color:      {}", unknown()),
    }
    if music_mode_support {
        match state.current_effect {
            Some(effect) => println!("  Effect:     {effect}"),
            None => println!("  Effect:     none"),
        }
        let music = if state.music_mode_enabled { "on" } else { "off" };
        println!("  Music mode: {music}");
    }
}

/// Query every attribute and wait for the responses
pub async fn status(ctx: &Context, device: &str, timeout: u64) -> CommandResult {
    let target = resolve_target(&ctx.config, device)?;
    let session = open_session(ctx, &target, None, true).await?;
    let result = query_all(&session, Duration::from_secs(timeout)).await;
    session.disconnect().await;
    result?;

    print_state(
        target.label(),
        &session.snapshot(),
        session.supports_music_mode(),
    );
    Ok(())
}

async fn query_all(session: &LightSession, timeout: Duration) -> anyhow::Result<()> {
    let mut waiters = vec![
        session.request_power_buffered()?,
        session.request_brightness_buffered()?,
        session.request_color_buffered()?,
    ];
    if session.supports_music_mode() {
        waiters.push(session.request_music_mode_buffered()?);
    }
    session.flush().await?;

    let outcomes = join_all(waiters.into_iter().map(|waiter| {
        let command = waiter.command();
        async move { (command, tokio::time::timeout(timeout, waiter.wait()).await) }
    }))
    .await;

    for (command, outcome) in outcomes {
        match outcome {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => warn!("No {} response: {}", command.name(), e),
            Err(_) => warn!(
                "No {} response within {}s",
                command.name(),
                timeout.as_secs()
            ),
        }
    }
    Ok(())
}

/// List effect names by family
pub fn effects() -> CommandResult {
    for family in [EffectFamily::Music, EffectFamily::Carnival, EffectFamily::Basic] {
        println!("{}", family.name().bold());
        for effect in Effect::all().filter(|e| e.family() == family) {
            println!("  0x{:02x}  {}", effect.wire_value(), effect.name());
        }
    }
    Ok(())
}

fn print_diagnostics(session: &LightSession) {
    println!(
        "  connected={} failures={} state={:?}",
        session.is_connected(),
        session.connection_failure_count(),
        session.connection_state()
    );
}

/// Refresh once, then clear the connection state
pub async fn reset(ctx: &Context, device: &str) -> CommandResult {
    let target = resolve_target(&ctx.config, device)?;
    let session = open_session(ctx, &target, None, false).await?;

    let state = session.refresh().await;
    print_state(target.label(), &state, session.supports_music_mode());

    println!("\nBefore reset:");
    print_diagnostics(&session);
    session.reset_connection_state().await;
    println!("After reset:");
    print_diagnostics(&session);
    Ok(())
}
