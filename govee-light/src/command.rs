//! Command model: command kinds, color payloads and outgoing packets

use govee_transport::protocol::{cmd, color_type, head, timing};
use govee_transport::Frame;

use crate::effect::{Effect, MUSIC_OFF};
use crate::error::LightError;
use crate::led::RgbColor;

/// Command kinds understood by the lights
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LedCommand {
    Power,
    Brightness,
    Color,
    /// Per-zone color (segmented devices)
    Segment,
    MusicMode,
    Effect,
    Scene,
}

impl LedCommand {
    /// Command byte on the wire
    pub fn code(&self) -> u8 {
        match self {
            Self::Power => cmd::POWER,
            Self::Brightness => cmd::BRIGHTNESS,
            Self::Color => cmd::COLOR,
            Self::Segment => cmd::SEGMENT,
            Self::MusicMode => cmd::MUSIC_MODE,
            Self::Effect => cmd::EFFECT,
            Self::Scene => cmd::SCENE,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            cmd::POWER => Some(Self::Power),
            cmd::BRIGHTNESS => Some(Self::Brightness),
            cmd::COLOR => Some(Self::Color),
            cmd::SEGMENT => Some(Self::Segment),
            cmd::MUSIC_MODE => Some(Self::MusicMode),
            cmd::EFFECT => Some(Self::Effect),
            cmd::SCENE => Some(Self::Scene),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        cmd::name(self.code())
    }
}

/// Frame head of a packet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketHead {
    /// State change
    Command,
    /// State query
    Request,
}

impl PacketHead {
    pub fn byte(&self) -> u8 {
        match self {
            Self::Command => head::COMMAND,
            Self::Request => head::REQUEST,
        }
    }
}

/// Color payload layouts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorPayload {
    /// Single-zone devices
    Single(RgbColor),
    /// Segmented devices, `mask` selects the zones to paint
    Segments { mask: u8, color: RgbColor },
    /// Older single-zone devices
    Legacy(RgbColor),
}

impl ColorPayload {
    pub fn to_bytes(&self) -> Vec<u8> {
        match *self {
            Self::Single(c) => vec![color_type::SINGLE, c.r, c.g, c.b],
            Self::Legacy(c) => vec![color_type::LEGACY, c.r, c.g, c.b],
            Self::Segments { mask, color: c } => {
                let mut bytes = vec![color_type::SEGMENTS, mask, c.r, c.g, c.b, 0, 0, 0, 0, 0];
                bytes.extend_from_slice(&color_type::SEGMENTS_TRAILER);
                bytes
            }
        }
    }

    /// Payloads that set `color` on a device of the given family
    pub fn for_device(color: RgbColor, segmented: bool) -> Vec<Self> {
        if segmented {
            vec![Self::Segments {
                mask: color_type::FIRST_SEGMENT,
                color,
            }]
        } else {
            vec![Self::Single(color), Self::Legacy(color)]
        }
    }
}

/// One outgoing packet before framing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub head: PacketHead,
    pub command: LedCommand,
    pub payload: Vec<u8>,
}

impl Packet {
    pub fn command(command: LedCommand, payload: Vec<u8>) -> Self {
        Self {
            head: PacketHead::Command,
            command,
            payload,
        }
    }

    pub fn query(command: LedCommand) -> Self {
        Self::query_with(command, Vec::new())
    }

    pub fn query_with(command: LedCommand, payload: Vec<u8>) -> Self {
        Self {
            head: PacketHead::Request,
            command,
            payload,
        }
    }

    pub fn set_power(on: bool) -> Self {
        Self::command(LedCommand::Power, vec![u8::from(on)])
    }

    /// `raw` is already in the device's native scale
    pub fn set_brightness(raw: u8) -> Self {
        Self::command(LedCommand::Brightness, vec![raw])
    }

    pub fn set_color(payload: ColorPayload) -> Self {
        Self::command(LedCommand::Color, payload.to_bytes())
    }

    pub fn set_effect(effect: Effect) -> Self {
        Self::command(effect.command(), vec![effect.wire_value()])
    }

    pub fn music_off() -> Self {
        Self::command(LedCommand::MusicMode, vec![MUSIC_OFF])
    }

    /// Query for the current color, shaped for the device family
    pub fn query_color(segmented: bool) -> Self {
        if segmented {
            Self::query_with(LedCommand::Segment, vec![color_type::FIRST_SEGMENT])
        } else {
            Self::query(LedCommand::Color)
        }
    }

    pub fn is_query(&self) -> bool {
        self.head == PacketHead::Request
    }

    /// Number of copies queued per flush
    pub fn copies(&self) -> u8 {
        if self.is_query() {
            1
        } else {
            timing::COMMAND_REPEAT
        }
    }

    pub fn to_frame(&self) -> Result<Frame, LightError> {
        Ok(Frame::encode(
            self.head.byte(),
            self.command.code(),
            &self.payload,
        )?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effect::{CarnivalMode, MusicMode};

    #[test]
    fn test_command_codes_roundtrip() {
        for code in [0x01, 0x04, 0x05, 0xA5, 0x06, 0x07, 0x08] {
            assert_eq!(LedCommand::from_code(code).map(|c| c.code()), Some(code));
        }
        assert_eq!(LedCommand::from_code(0x02), None);
        assert_eq!(LedCommand::Segment.name(), "SEGMENT");
    }

    #[test]
    fn test_segments_payload_layout() {
        let payload = ColorPayload::Segments {
            mask: 0x01,
            color: RgbColor::new(10, 20, 30),
        };
        assert_eq!(
            payload.to_bytes(),
            vec![0x15, 0x01, 10, 20, 30, 0, 0, 0, 0, 0, 0xFF, 0xFF]
        );
    }

    #[test]
    fn test_color_payloads_by_family() {
        let color = RgbColor::new(10, 20, 30);
        let single_zone = ColorPayload::for_device(color, false);
        assert_eq!(
            single_zone,
            vec![ColorPayload::Single(color), ColorPayload::Legacy(color)]
        );
        assert_eq!(single_zone[0].to_bytes(), vec![0x02, 10, 20, 30]);
        assert_eq!(single_zone[1].to_bytes(), vec![0x0D, 10, 20, 30]);
        assert_eq!(ColorPayload::for_device(color, true).len(), 1);
    }

    #[test]
    fn test_effect_packets() {
        let music = Packet::set_effect(Effect::Music(MusicMode::Waves));
        assert_eq!(music.command, LedCommand::MusicMode);
        assert_eq!(music.payload, vec![0x05]);

        let carnival = Packet::set_effect(Effect::Carnival(CarnivalMode::Dazzle));
        assert_eq!(carnival.command, LedCommand::Effect);
        assert_eq!(carnival.payload, vec![0x12]);

        assert_eq!(Packet::music_off().payload, vec![0x00]);
    }

    #[test]
    fn test_copies_and_framing() {
        let set = Packet::set_power(true);
        assert_eq!(set.copies(), 3);
        let frame = set.to_frame().unwrap();
        assert_eq!(&frame.as_bytes()[..3], &[0x33, 0x01, 0x01]);

        let query = Packet::query_color(true);
        assert_eq!(query.copies(), 1);
        let frame = query.to_frame().unwrap();
        assert_eq!(&frame.as_bytes()[..3], &[0xAA, 0xA5, 0x01]);

        let too_long = Packet::command(LedCommand::Scene, vec![0; 18]);
        assert_eq!(
            too_long.to_frame(),
            Err(LightError::PayloadTooLong { len: 18 })
        );
    }
}
