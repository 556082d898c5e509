//! Last known state of one light

use std::fmt;

use crate::effect::CurrentEffect;
use crate::led::RgbColor;

/// Cached device state
///
/// Every attribute starts unknown and only becomes known through a response
/// or an optimistic write. Brightness is always on the 0-255 scale.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceState {
    pub power: Option<bool>,
    pub brightness: Option<u8>,
    pub color: Option<RgbColor>,
    pub current_effect: Option<CurrentEffect>,
    pub music_mode_enabled: bool,
}

impl fmt::Display for DeviceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn opt<T: fmt::Display>(v: &Option<T>) -> String {
            v.as_ref().map_or_else(|| "?".to_string(), |v| v.to_string())
        }
        let power = match self.power {
            Some(true) => "on",
            Some(false) => "off",
            None => "?",
        };
        write!(
            f,
            "power={} brightness={} color={} effect={} music={}",
            power,
            opt(&self.brightness),
            opt(&self.color),
            opt(&self.current_effect),
            if self.music_mode_enabled { "on" } else { "off" }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_displays_unknown() {
        let state = DeviceState::default();
        assert!(!state.music_mode_enabled);
        assert_eq!(
            state.to_string(),
            "power=? brightness=? color=? effect=? music=off"
        );
    }

    #[test]
    fn test_known_false_is_displayed() {
        let state = DeviceState {
            power: Some(false),
            brightness: Some(0),
            ..Default::default()
        };
        assert_eq!(
            state.to_string(),
            "power=off brightness=0 color=? effect=? music=off"
        );
    }
}
