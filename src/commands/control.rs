//! Write commands: power, brightness, color, effect, music mode

use govee_light::{Effect, LightError, LightSession};
use tracing::info;

use super::{open_session, resolve_target, CommandResult, Context};

/// Queue one change, flush it and disconnect
///
/// `queue` returns false when the change was suppressed against the cache.
async fn apply<F>(ctx: &Context, device: &str, what: &str, queue: F) -> CommandResult
where
    F: FnOnce(&LightSession) -> Result<bool, LightError>,
{
    let target = resolve_target(&ctx.config, device)?;
    let session = open_session(ctx, &target, None, false).await?;

    let result = async {
        if !queue(&session)? {
            info!("{} already {}", target.label(), what);
        }
        session.flush().await
    }
    .await;
    session.disconnect().await;
    result?;

    println!("{}: {}", target.label(), what);
    Ok(())
}

pub async fn power(ctx: &Context, device: &str, on: bool) -> CommandResult {
    let what = if on { "on" } else { "off" };
    apply(ctx, device, what, |s| s.set_power_buffered(on)).await
}

pub async fn brightness(ctx: &Context, device: &str, level: u16) -> CommandResult {
    let what = format!("brightness {level}/255");
    apply(ctx, device, &what, |s| s.set_brightness_buffered(level)).await
}

pub async fn color(ctx: &Context, device: &str, r: u16, g: u16, b: u16) -> CommandResult {
    let what = format!("color ({r}, {g}, {b})");
    apply(ctx, device, &what, |s| s.set_color_buffered(r, g, b)).await
}

pub async fn effect(ctx: &Context, device: &str, name: &str) -> CommandResult {
    // Reject typos before scanning
    let effect = Effect::from_name(name).ok_or_else(|| LightError::UnknownEffect(name.into()))?;
    let what = format!("effect {} ({})", effect, effect.family().name());
    apply(ctx, device, &what, |s| s.set_effect_buffered(effect.name())).await
}

pub async fn music(ctx: &Context, device: &str, enabled: bool) -> CommandResult {
    let what = if enabled { "music mode on" } else { "music mode off" };
    apply(ctx, device, what, |s| s.set_music_mode_buffered(enabled)).await
}
