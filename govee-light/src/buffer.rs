//! Outgoing packet buffer
//!
//! Setters compare against the cached state and enqueue nothing when the
//! value already matches. Otherwise they update the cache optimistically and
//! enqueue the command frame (repeated, the link drops writes) followed by
//! one confirming query. Each setter records what it overwrote so a failed
//! flush can put the cache back.

use govee_transport::Frame;
use tracing::debug;

use crate::command::{ColorPayload, LedCommand, Packet};
use crate::effect::{CurrentEffect, Effect, MusicMode};
use crate::error::LightError;
use crate::led::{checked_brightness, percent_from_level, RgbColor};
use crate::state::DeviceState;

type EffectFields = (Option<CurrentEffect>, bool);

fn effect_fields(state: &DeviceState) -> EffectFields {
    (state.current_effect, state.music_mode_enabled)
}

/// Cache fields a setter overwrote optimistically
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rollback {
    Power {
        previous: Option<bool>,
        written: bool,
    },
    Brightness {
        previous: Option<u8>,
        written: u8,
    },
    Color {
        previous: Option<RgbColor>,
        written: RgbColor,
    },
    /// Effect and music flag move together
    Effect {
        previous: EffectFields,
        written: EffectFields,
    },
}

impl Rollback {
    /// Put the previous value back
    ///
    /// Skipped when the field no longer holds the written value, i.e. a
    /// response or a later setter has moved it since. Undo a batch in
    /// reverse queue order.
    pub fn restore(&self, state: &mut DeviceState) {
        match *self {
            Self::Power { previous, written } => {
                if state.power == Some(written) {
                    state.power = previous;
                }
            }
            Self::Brightness { previous, written } => {
                if state.brightness == Some(written) {
                    state.brightness = previous;
                }
            }
            Self::Color { previous, written } => {
                if state.color == Some(written) {
                    state.color = previous;
                }
            }
            Self::Effect { previous, written } => {
                if effect_fields(state) == written {
                    (state.current_effect, state.music_mode_enabled) = previous;
                }
            }
        }
    }
}

/// A packet with its encoded frame and repeat count
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedPacket {
    pub packet: Packet,
    pub frame: Frame,
    pub copies: u8,
    /// Set on the first packet of a setter's group
    pub rollback: Option<Rollback>,
    /// Response waiter registered for this query, if any
    pub waiter: Option<u64>,
}

/// Pending frames for the next flush
#[derive(Debug, Clone)]
pub struct OutgoingBuffer {
    segmented: bool,
    entries: Vec<QueuedPacket>,
}

impl OutgoingBuffer {
    pub fn new(segmented: bool) -> Self {
        Self {
            segmented,
            entries: Vec::new(),
        }
    }

    /// Encode every packet before queuing any of them
    fn enqueue(
        &mut self,
        packets: Vec<Packet>,
        rollback: Option<Rollback>,
    ) -> Result<(), LightError> {
        let mut queued = packets
            .into_iter()
            .map(|packet| {
                Ok(QueuedPacket {
                    frame: packet.to_frame()?,
                    copies: packet.copies(),
                    packet,
                    rollback: None,
                    waiter: None,
                })
            })
            .collect::<Result<Vec<_>, LightError>>()?;
        if let Some(first) = queued.first_mut() {
            first.rollback = rollback;
        }
        for entry in &queued {
            debug!(
                "queue {} {:?} x{}",
                entry.packet.command.name(),
                entry.packet.payload,
                entry.copies
            );
        }
        self.entries.extend(queued);
        Ok(())
    }

    /// Returns whether anything was queued
    pub fn set_power(&mut self, state: &mut DeviceState, on: bool) -> Result<bool, LightError> {
        if state.power == Some(on) {
            return Ok(false);
        }
        let rollback = Rollback::Power {
            previous: state.power,
            written: on,
        };
        self.enqueue(
            vec![Packet::set_power(on), Packet::query(LedCommand::Power)],
            Some(rollback),
        )?;
        state.power = Some(on);
        Ok(true)
    }

    /// `value` is on the 0-255 scale regardless of device family
    pub fn set_brightness(
        &mut self,
        state: &mut DeviceState,
        value: u16,
    ) -> Result<bool, LightError> {
        let level = checked_brightness(value)?;
        if state.brightness == Some(level) {
            return Ok(false);
        }
        let raw = if self.segmented {
            percent_from_level(level)
        } else {
            level
        };
        let rollback = Rollback::Brightness {
            previous: state.brightness,
            written: level,
        };
        self.enqueue(
            vec![
                Packet::set_brightness(raw),
                Packet::query(LedCommand::Brightness),
            ],
            Some(rollback),
        )?;
        state.brightness = Some(level);
        Ok(true)
    }

    pub fn set_color(
        &mut self,
        state: &mut DeviceState,
        r: u16,
        g: u16,
        b: u16,
    ) -> Result<bool, LightError> {
        let color = RgbColor::try_from_components(r, g, b)?;
        if state.color == Some(color) {
            return Ok(false);
        }
        let mut packets: Vec<Packet> = ColorPayload::for_device(color, self.segmented)
            .into_iter()
            .map(Packet::set_color)
            .collect();
        packets.push(Packet::query_color(self.segmented));
        let rollback = Rollback::Color {
            previous: state.color,
            written: color,
        };
        self.enqueue(packets, Some(rollback))?;
        state.color = Some(color);
        Ok(true)
    }

    pub fn set_effect(
        &mut self,
        state: &mut DeviceState,
        effect: Effect,
    ) -> Result<bool, LightError> {
        if state.current_effect == Some(CurrentEffect::Known(effect)) {
            return Ok(false);
        }
        let previous = effect_fields(state);
        let music = matches!(effect, Effect::Music(_)) || state.music_mode_enabled;
        let written = (Some(CurrentEffect::Known(effect)), music);
        self.enqueue(
            vec![
                Packet::set_effect(effect),
                Packet::query(LedCommand::MusicMode),
            ],
            Some(Rollback::Effect { previous, written }),
        )?;
        (state.current_effect, state.music_mode_enabled) = written;
        Ok(true)
    }

    /// Enabling selects the Rhythm effect, disabling writes music value 0
    pub fn set_music_mode(
        &mut self,
        state: &mut DeviceState,
        enabled: bool,
    ) -> Result<bool, LightError> {
        if state.music_mode_enabled == enabled {
            return Ok(false);
        }
        let (write, effect) = if enabled {
            let rhythm = Effect::Music(MusicMode::Rhythm);
            (Packet::set_effect(rhythm), Some(CurrentEffect::Known(rhythm)))
        } else {
            (Packet::music_off(), None)
        };
        let previous = effect_fields(state);
        let written = (effect, enabled);
        self.enqueue(
            vec![write, Packet::query(LedCommand::MusicMode)],
            Some(Rollback::Effect { previous, written }),
        )?;
        (state.current_effect, state.music_mode_enabled) = written;
        Ok(true)
    }

    /// Queue a query; returns the command code its response will carry
    fn request(&mut self, packet: Packet) -> Result<LedCommand, LightError> {
        let command = packet.command;
        self.enqueue(vec![packet], None)?;
        Ok(command)
    }

    /// Tag the most recently queued packet with a response waiter id
    pub fn attach_waiter(&mut self, id: u64) {
        if let Some(last) = self.entries.last_mut() {
            last.waiter = Some(id);
        }
    }

    pub fn request_power(&mut self) -> Result<LedCommand, LightError> {
        self.request(Packet::query(LedCommand::Power))
    }

    pub fn request_brightness(&mut self) -> Result<LedCommand, LightError> {
        self.request(Packet::query(LedCommand::Brightness))
    }

    /// SEGMENT query for the first zone on segmented devices, COLOR otherwise
    pub fn request_color(&mut self) -> Result<LedCommand, LightError> {
        self.request(Packet::query_color(self.segmented))
    }

    pub fn request_music_mode(&mut self) -> Result<LedCommand, LightError> {
        self.request(Packet::query(LedCommand::MusicMode))
    }

    /// Drain the buffer
    pub fn take(&mut self) -> Vec<QueuedPacket> {
        std::mem::take(&mut self.entries)
    }

    pub fn entries(&self) -> &[QueuedPacket] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of frames a flush will write, repeats included
    pub fn frame_count(&self) -> usize {
        self.entries.iter().map(|e| usize::from(e.copies)).sum()
    }
}
