//! RGB color and brightness scaling

use std::fmt;

use crate::error::LightError;

/// Maximum brightness of segmented devices (percent)
pub const BRIGHTNESS_PERCENT_MAX: u8 = 100;

/// RGB color value
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct RgbColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl RgbColor {
    /// Create a new RGB color
    pub fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Create a color from wider integers, rejecting components over 255
    pub fn try_from_components(r: u16, g: u16, b: u16) -> Result<Self, LightError> {
        Ok(Self {
            r: component("red", r)?,
            g: component("green", g)?,
            b: component("blue", b)?,
        })
    }
}

fn component(field: &'static str, value: u16) -> Result<u8, LightError> {
    u8::try_from(value).map_err(|_| LightError::ValueOutOfRange { field, value })
}

impl fmt::Display for RgbColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

/// Validate a brightness on the 0-255 scale
pub fn checked_brightness(value: u16) -> Result<u8, LightError> {
    component("brightness", value)
}

/// Convert 0-255 brightness to the 0-100 percent used by segmented devices
pub fn percent_from_level(level: u8) -> u8 {
    (f32::from(level) / 255.0 * 100.0).round() as u8
}

/// Convert a reported 0-100 percent back to 0-255
///
/// Values above 100 saturate at 255.
pub fn level_from_percent(percent: u8) -> u8 {
    let percent = percent.min(BRIGHTNESS_PERCENT_MAX);
    (f32::from(percent) / 100.0 * 255.0).round() as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percent_conversion_endpoints() {
        assert_eq!(percent_from_level(0), 0);
        assert_eq!(percent_from_level(255), 100);
        assert_eq!(percent_from_level(128), 50);
        assert_eq!(level_from_percent(100), 255);
        assert_eq!(level_from_percent(0), 0);
        assert_eq!(level_from_percent(50), 128);
        assert_eq!(level_from_percent(200), 255);
    }

    #[test]
    fn test_brightness_range() {
        assert_eq!(checked_brightness(255), Ok(255));
        assert_eq!(
            checked_brightness(256),
            Err(LightError::ValueOutOfRange {
                field: "brightness",
                value: 256
            })
        );
    }

    #[test]
    fn test_color_components() {
        assert_eq!(
            RgbColor::try_from_components(10, 20, 30),
            Ok(RgbColor::new(10, 20, 30))
        );
        assert!(matches!(
            RgbColor::try_from_components(10, 300, 30),
            Err(LightError::ValueOutOfRange { field: "green", value: 300 })
        ));
    }

    #[test]
    fn test_color_display() {
        assert_eq!(RgbColor::new(255, 128, 0).to_string(), "#ff8000");
        assert_eq!(RgbColor::default().to_string(), "#000000");
    }
}
