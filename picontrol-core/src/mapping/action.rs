//! Mapping actions and the output messages they emit

use serde::{Deserialize, Serialize};

use super::MappingError;

/// Action type codes shared by the console, storage and module wire format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum ActionType {
    None = 0,
    MidiNote = 1,
    MidiCc = 2,
    Keyboard = 3,
    MidiPitchBend = 4,
    MidiModWheel = 5,
}

impl ActionType {
    pub const fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(ActionType::None),
            1 => Some(ActionType::MidiNote),
            2 => Some(ActionType::MidiCc),
            3 => Some(ActionType::Keyboard),
            4 => Some(ActionType::MidiPitchBend),
            5 => Some(ActionType::MidiModWheel),
            _ => None,
        }
    }

    pub const fn as_u8(self) -> u8 {
        self as u8
    }
}

/// What a mapping does with its parameter
///
/// MIDI channels are stored 1-16 as configured by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Action {
    None,
    MidiNote { channel: u8, note: u8, velocity: u8 },
    MidiCc { channel: u8, controller: u8 },
    Keyboard { keycode: u8, modifier: u8 },
    MidiPitchBend { channel: u8 },
    MidiModWheel { channel: u8 },
}

/// Velocity given to note mappings that are configured without one
pub const DEFAULT_VELOCITY: u8 = 127;

impl Action {
    /// Build an action from its type code and two data bytes
    ///
    /// `d1`/`d2` are channel/note, channel/controller, keycode/modifier,
    /// or channel/unused depending on the type.
    pub fn from_parts(action_type: u8, d1: u8, d2: u8) -> Result<Self, MappingError> {
        let kind = ActionType::from_u8(action_type).ok_or(MappingError::UnknownActionType)?;
        Ok(match kind {
            ActionType::None => Action::None,
            ActionType::MidiNote => Action::MidiNote {
                channel: d1,
                note: d2,
                velocity: DEFAULT_VELOCITY,
            },
            ActionType::MidiCc => Action::MidiCc {
                channel: d1,
                controller: d2,
            },
            ActionType::Keyboard => Action::Keyboard {
                keycode: d1,
                modifier: d2,
            },
            ActionType::MidiPitchBend => Action::MidiPitchBend { channel: d1 },
            ActionType::MidiModWheel => Action::MidiModWheel { channel: d1 },
        })
    }

    /// Inverse of [`Action::from_parts`]
    pub fn parts(&self) -> (u8, u8, u8) {
        let kind = self.action_type().as_u8();
        match *self {
            Action::None => (kind, 0, 0),
            Action::MidiNote { channel, note, .. } => (kind, channel, note),
            Action::MidiCc {
                channel,
                controller,
            } => (kind, channel, controller),
            Action::Keyboard { keycode, modifier } => (kind, keycode, modifier),
            Action::MidiPitchBend { channel } | Action::MidiModWheel { channel } => {
                (kind, channel, 0)
            }
        }
    }

    /// Decode the 3-byte target union of a module mapping record
    pub fn from_wire(action_type: u8, target: [u8; 3]) -> Result<Self, MappingError> {
        let action = Self::from_parts(action_type, target[0], target[1])?;
        Ok(match action {
            Action::MidiNote { channel, note, .. } => Action::MidiNote {
                channel,
                note,
                velocity: target[2],
            },
            other => other,
        })
    }

    pub fn to_wire(&self) -> [u8; 3] {
        let (_, d1, d2) = self.parts();
        match *self {
            Action::MidiNote { velocity, .. } => [d1, d2, velocity],
            _ => [d1, d2, 0],
        }
    }

    pub fn action_type(&self) -> ActionType {
        match self {
            Action::None => ActionType::None,
            Action::MidiNote { .. } => ActionType::MidiNote,
            Action::MidiCc { .. } => ActionType::MidiCc,
            Action::Keyboard { .. } => ActionType::Keyboard,
            Action::MidiPitchBend { .. } => ActionType::MidiPitchBend,
            Action::MidiModWheel { .. } => ActionType::MidiModWheel,
        }
    }

    /// Output for a curved value, or `None` if nothing observable changed
    ///
    /// `previous` is the curved value of the last observation; the first
    /// observation of a parameter always emits.
    pub fn evaluate(&self, current: u8, previous: Option<u8>) -> Option<OutputAction> {
        match *self {
            Action::None => None,

            Action::MidiNote {
                channel,
                note,
                velocity,
            } => {
                let on = current > 0;
                if previous.map(|p| p > 0) == Some(on) {
                    return None;
                }
                let channel = midi_channel(channel);
                Some(if on {
                    OutputAction::NoteOn {
                        channel,
                        note,
                        velocity: (current >> 1).max(1).min(velocity.max(1)),
                    }
                } else {
                    OutputAction::NoteOff {
                        channel,
                        note,
                        velocity: 0,
                    }
                })
            }

            Action::MidiCc {
                channel,
                controller,
            } => {
                let value = current >> 1;
                if previous.map(|p| p >> 1) == Some(value) {
                    return None;
                }
                Some(OutputAction::ControlChange {
                    channel: midi_channel(channel),
                    controller,
                    value,
                })
            }

            Action::MidiPitchBend { channel } => {
                let value = pitch_bend(current);
                if previous.map(pitch_bend) == Some(value) {
                    return None;
                }
                Some(OutputAction::PitchBend {
                    channel: midi_channel(channel),
                    value,
                })
            }

            Action::MidiModWheel { channel } => {
                let value = mod_wheel(current);
                if previous.map(mod_wheel) == Some(value) {
                    return None;
                }
                Some(OutputAction::ModWheel {
                    channel: midi_channel(channel),
                    value,
                })
            }

            Action::Keyboard { keycode, modifier } => {
                let down = current >= KEY_THRESHOLD;
                if previous.map(|p| p >= KEY_THRESHOLD) == Some(down) {
                    return None;
                }
                Some(if down {
                    OutputAction::KeyDown { keycode, modifier }
                } else {
                    OutputAction::KeyUp { keycode, modifier }
                })
            }
        }
    }
}

/// Curved values at or above this press a key
const KEY_THRESHOLD: u8 = 128;

/// Configured 1-16 channel to the 0-15 wire channel
const fn midi_channel(channel: u8) -> u8 {
    channel.saturating_sub(1) & 0x0F
}

/// 0..=255 to -8192..=8191 with 128 at center
fn pitch_bend(v: u8) -> i16 {
    let centered = v as i32 - 128;
    let bend = if centered >= 0 {
        centered * 8191 / 127
    } else {
        centered * 64
    };
    bend as i16
}

/// 0..=255 to the 14-bit range
fn mod_wheel(v: u8) -> u16 {
    (v as u32 * 16383 / 255) as u16
}

/// Message handed to the output sink
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum OutputAction {
    NoteOn { channel: u8, note: u8, velocity: u8 },
    NoteOff { channel: u8, note: u8, velocity: u8 },
    ControlChange { channel: u8, controller: u8, value: u8 },
    /// Signed bend, -8192..=8191
    PitchBend { channel: u8, value: i16 },
    /// 14-bit value sent as CC1 (MSB) then CC33 (LSB)
    ModWheel { channel: u8, value: u16 },
    KeyDown { keycode: u8, modifier: u8 },
    KeyUp { keycode: u8, modifier: u8 },
}

impl OutputAction {
    /// Raw MIDI bytes for MIDI outputs, written into `buf`
    ///
    /// Returns the number of bytes used; keyboard outputs use none.
    pub fn midi_bytes(&self, buf: &mut [u8; 6]) -> usize {
        match *self {
            OutputAction::NoteOn {
                channel,
                note,
                velocity,
            } => {
                buf[..3].copy_from_slice(&[0x90 | channel, note & 0x7F, velocity & 0x7F]);
                3
            }
            OutputAction::NoteOff {
                channel,
                note,
                velocity,
            } => {
                buf[..3].copy_from_slice(&[0x80 | channel, note & 0x7F, velocity & 0x7F]);
                3
            }
            OutputAction::ControlChange {
                channel,
                controller,
                value,
            } => {
                buf[..3].copy_from_slice(&[0xB0 | channel, controller & 0x7F, value & 0x7F]);
                3
            }
            OutputAction::PitchBend { channel, value } => {
                let raw = (value as i32 + 8192) as u16;
                buf[..3].copy_from_slice(&[
                    0xE0 | channel,
                    (raw & 0x7F) as u8,
                    ((raw >> 7) & 0x7F) as u8,
                ]);
                3
            }
            OutputAction::ModWheel { channel, value } => {
                buf.copy_from_slice(&[
                    0xB0 | channel,
                    1,
                    ((value >> 7) & 0x7F) as u8,
                    0xB0 | channel,
                    33,
                    (value & 0x7F) as u8,
                ]);
                6
            }
            OutputAction::KeyDown { .. } | OutputAction::KeyUp { .. } => 0,
        }
    }
}
