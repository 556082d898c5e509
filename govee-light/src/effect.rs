//! Lighting effect table
//!
//! Effects come from three disjoint wire ranges. Music effects are written
//! with the MUSIC_MODE command, carnival and basic effects with EFFECT.

use std::fmt;

use crate::command::LedCommand;

/// Wire value that turns music mode off
pub const MUSIC_OFF: u8 = 0x00;

/// Microphone-reactive effects (0x01-0x0C)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MusicMode {
    Rhythm = 0x01,
    Sprouting = 0x02,
    Shiny = 0x03,
    Beat = 0x04,
    Waves = 0x05,
    Spectrum = 0x06,
    Rolling = 0x07,
    Hopping = 0x08,
    Starlight = 0x09,
    PianoKeys = 0x0A,
    Jumping = 0x0B,
    Luminous = 0x0C,
}

impl MusicMode {
    pub const ALL: [Self; 12] = [
        Self::Rhythm,
        Self::Sprouting,
        Self::Shiny,
        Self::Beat,
        Self::Waves,
        Self::Spectrum,
        Self::Rolling,
        Self::Hopping,
        Self::Starlight,
        Self::PianoKeys,
        Self::Jumping,
        Self::Luminous,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Rhythm => "Rhythm",
            Self::Sprouting => "Sprouting",
            Self::Shiny => "Shiny",
            Self::Beat => "Beat",
            Self::Waves => "Waves",
            Self::Spectrum => "Spectrum",
            Self::Rolling => "Rolling",
            Self::Hopping => "Hopping",
            Self::Starlight => "Starlight",
            Self::PianoKeys => "Piano Keys",
            Self::Jumping => "Jumping",
            Self::Luminous => "Luminous",
        }
    }
}

/// "Carnival" effects (0x10-0x19)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CarnivalMode {
    Brilliant = 0x10,
    Pulsate = 0x11,
    Dazzle = 0x12,
    Fascination = 0x13,
    Aspiring = 0x14,
    Cadence = 0x15,
    Revel = 0x16,
    Fluctuate = 0x17,
    Funny = 0x18,
    Shimmer = 0x19,
}

impl CarnivalMode {
    pub const ALL: [Self; 10] = [
        Self::Brilliant,
        Self::Pulsate,
        Self::Dazzle,
        Self::Fascination,
        Self::Aspiring,
        Self::Cadence,
        Self::Revel,
        Self::Fluctuate,
        Self::Funny,
        Self::Shimmer,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Brilliant => "Brilliant",
            Self::Pulsate => "Pulsate",
            Self::Dazzle => "Dazzle",
            Self::Fascination => "Fascination",
            Self::Aspiring => "Aspiring",
            Self::Cadence => "Cadence",
            Self::Revel => "Revel",
            Self::Fluctuate => "Fluctuate",
            Self::Funny => "Funny",
            Self::Shimmer => "Shimmer",
        }
    }
}

/// Basic effects (0x20-0x21)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum BasicMode {
    Dynamic = 0x20,
    Calm = 0x21,
}

impl BasicMode {
    pub const ALL: [Self; 2] = [Self::Dynamic, Self::Calm];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Dynamic => "Dynamic",
            Self::Calm => "Calm",
        }
    }
}

/// Effect family
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EffectFamily {
    Music,
    Carnival,
    Basic,
}

impl EffectFamily {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Music => "music",
            Self::Carnival => "carnival",
            Self::Basic => "basic",
        }
    }
}

/// A named effect from one of the three tables
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Effect {
    Music(MusicMode),
    Carnival(CarnivalMode),
    Basic(BasicMode),
}

impl Effect {
    /// Every effect, music first
    pub fn all() -> impl Iterator<Item = Effect> {
        MusicMode::ALL
            .into_iter()
            .map(Effect::Music)
            .chain(CarnivalMode::ALL.into_iter().map(Effect::Carnival))
            .chain(BasicMode::ALL.into_iter().map(Effect::Basic))
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Music(m) => m.name(),
            Self::Carnival(m) => m.name(),
            Self::Basic(m) => m.name(),
        }
    }

    pub fn family(&self) -> EffectFamily {
        match self {
            Self::Music(_) => EffectFamily::Music,
            Self::Carnival(_) => EffectFamily::Carnival,
            Self::Basic(_) => EffectFamily::Basic,
        }
    }

    /// Look up an effect by its display name (exact match)
    pub fn from_name(name: &str) -> Option<Self> {
        Self::all().find(|e| e.name() == name)
    }

    /// Wire byte of this effect
    pub fn wire_value(&self) -> u8 {
        match self {
            Self::Music(m) => *m as u8,
            Self::Carnival(m) => *m as u8,
            Self::Basic(m) => *m as u8,
        }
    }

    /// Look up an effect by wire byte
    pub fn from_wire(value: u8) -> Option<Self> {
        Self::all().find(|e| e.wire_value() == value)
    }

    /// Command that sets this effect
    pub fn command(&self) -> LedCommand {
        match self {
            Self::Music(_) => LedCommand::MusicMode,
            Self::Carnival(_) | Self::Basic(_) => LedCommand::Effect,
        }
    }
}

impl fmt::Display for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Effect reported by a device, which may be outside the known table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CurrentEffect {
    Known(Effect),
    Unknown(u8),
}

impl CurrentEffect {
    /// Decode a reported wire value; zero means no effect
    pub fn from_wire(value: u8) -> Option<Self> {
        if value == 0 {
            return None;
        }
        Some(match Effect::from_wire(value) {
            Some(effect) => Self::Known(effect),
            None => Self::Unknown(value),
        })
    }

    pub fn wire_value(&self) -> u8 {
        match self {
            Self::Known(effect) => effect.wire_value(),
            Self::Unknown(value) => *value,
        }
    }

    pub fn known(&self) -> Option<Effect> {
        match self {
            Self::Known(effect) => Some(*effect),
            Self::Unknown(_) => None,
        }
    }
}

impl fmt::Display for CurrentEffect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Known(effect) => f.write_str(effect.name()),
            Self::Unknown(value) => write!(f, "Unknown_{:02x}", value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_table_is_bijective() {
        let effects: Vec<Effect> = Effect::all().collect();
        assert_eq!(effects.len(), 24);

        let names: HashSet<_> = effects.iter().map(|e| e.name()).collect();
        let values: HashSet<_> = effects.iter().map(|e| e.wire_value()).collect();
        assert_eq!(names.len(), effects.len());
        assert_eq!(values.len(), effects.len());

        for effect in effects {
            assert_eq!(Effect::from_name(effect.name()), Some(effect));
            assert_eq!(Effect::from_wire(effect.wire_value()), Some(effect));
        }
    }

    #[test]
    fn test_families_and_commands() {
        let waves = Effect::from_name("Waves").unwrap();
        assert_eq!(waves.wire_value(), 0x05);
        assert_eq!(waves.command(), LedCommand::MusicMode);
        assert_eq!(waves.family(), EffectFamily::Music);

        let shimmer = Effect::from_name("Shimmer").unwrap();
        assert_eq!(shimmer.wire_value(), 0x19);
        assert_eq!(shimmer.command(), LedCommand::Effect);

        let calm = Effect::from_name("Calm").unwrap();
        assert_eq!(calm.wire_value(), 0x21);
        assert_eq!(calm.family(), EffectFamily::Basic);

        assert_eq!(Effect::from_name("Piano Keys").map(|e| e.wire_value()), Some(0x0A));
        assert_eq!(Effect::from_name("waves"), None);
    }

    #[test]
    fn test_current_effect_labels() {
        assert_eq!(CurrentEffect::from_wire(0), None);
        assert_eq!(
            CurrentEffect::from_wire(0x05).map(|e| e.to_string()),
            Some("Waves".to_string())
        );
        let unknown = CurrentEffect::from_wire(0x7f).unwrap();
        assert_eq!(unknown, CurrentEffect::Unknown(0x7f));
        assert_eq!(unknown.to_string(), "Unknown_7f");
        assert_eq!(unknown.known(), None);
        assert_eq!(unknown.wire_value(), 0x7f);
    }
}
