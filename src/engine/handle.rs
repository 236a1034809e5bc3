use std::sync::Arc;

use crossbeam_queue::ArrayQueue;
use four_cc::FourCC;

use crate::{
    error::Error,
    parameter::{Parameter, ParameterStore},
};

// -------------------------------------------------------------------------------------------------

/// Events which get queued by an [`EngineHandle`] and are applied at the start of the
/// engine's next render call, in arrival order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum EngineMessage {
    NoteOn {
        channel: u8,
        note: u8,
        velocity: f32,
    },
    NoteOff {
        channel: u8,
        note: u8,
        allow_tail_off: bool,
    },
    PitchWheel {
        channel: u8,
        value: u16,
    },
    Controller {
        channel: u8,
        controller: u8,
        value: u8,
    },
    AllNotesOff {
        allow_tail_off: bool,
    },
}

// -------------------------------------------------------------------------------------------------

/// Sends MIDI events to and changes parameters of an [`Engine`](crate::Engine) from any
/// (non real-time) thread.
///
/// Handles are `Send` and `Sync` and can be cloned, so they can be passed around freely.
/// Note and controller events are queued and applied with the engine's next render call.
/// Parameter changes are written into the engine's lock-free parameter store and picked up
/// with the next render call as well.
#[derive(Clone)]
pub struct EngineHandle {
    message_queue: Arc<ArrayQueue<EngineMessage>>,
    parameters: Arc<ParameterStore>,
}

impl EngineHandle {
    pub(crate) fn new(
        message_queue: Arc<ArrayQueue<EngineMessage>>,
        parameters: Arc<ParameterStore>,
    ) -> Self {
        Self {
            message_queue,
            parameters,
        }
    }

    /// Start a new note on the given MIDI channel (1..=16) with the given velocity
    /// (0.0..=1.0). Notes or channels the asset does not apply to are ignored by the engine.
    /// A velocity of 0.0 releases the note instead, like a note-off with tail-off.
    pub fn note_on(&self, channel: u8, note: u8, velocity: f32) -> Result<(), Error> {
        Self::validate_channel(channel)?;
        Self::validate_note(note)?;
        self.push(
            EngineMessage::NoteOn {
                channel,
                note,
                velocity: velocity.clamp(0.0, 1.0),
            },
            "note_on",
        )
    }

    /// Stop a playing note on the given MIDI channel. With `allow_tail_off`, the note's
    /// envelope releases, else the note stops immediately.
    pub fn note_off(&self, channel: u8, note: u8, allow_tail_off: bool) -> Result<(), Error> {
        Self::validate_channel(channel)?;
        Self::validate_note(note)?;
        self.push(
            EngineMessage::NoteOff {
                channel,
                note,
                allow_tail_off,
            },
            "note_off",
        )
    }

    /// Move the pitch wheel of the given MIDI channel to the given 14-bit position.
    /// See [`PITCH_WHEEL_CENTER`](crate::utils::PITCH_WHEEL_CENTER).
    pub fn pitch_wheel_moved(&self, channel: u8, value: u16) -> Result<(), Error> {
        Self::validate_channel(channel)?;
        if value > crate::utils::PITCH_WHEEL_MAX {
            return Err(Error::ParameterError(format!(
                "Invalid pitch wheel value: {value}"
            )));
        }
        self.push(EngineMessage::PitchWheel { channel, value }, "pitch_wheel")
    }

    /// Send a MIDI controller change. Sustain pedal (64), all sound off (120) and all notes
    /// off (123) are handled, other controllers are ignored.
    pub fn controller_moved(&self, channel: u8, controller: u8, value: u8) -> Result<(), Error> {
        Self::validate_channel(channel)?;
        if controller > 127 || value > 127 {
            return Err(Error::ParameterError(format!(
                "Invalid controller event: {controller}={value}"
            )));
        }
        self.push(
            EngineMessage::Controller {
                channel,
                controller,
                value,
            },
            "controller",
        )
    }

    /// Stop all playing notes on all channels.
    pub fn all_notes_off(&self, allow_tail_off: bool) -> Result<(), Error> {
        // force push stop events to avoid hanging notes
        if self
            .message_queue
            .force_push(EngineMessage::AllNotesOff { allow_tail_off })
            .is_some()
        {
            log::warn!("Engine event queue is full. Dropped the oldest pending event.");
        }
        Ok(())
    }

    /// Access all parameter descriptors of the engine.
    pub fn parameters(&self) -> &[Box<dyn Parameter>] {
        self.parameters.parameters()
    }

    /// Read the current plain value of the parameter with the given id.
    pub fn parameter_value(&self, id: FourCC) -> Result<f32, Error> {
        self.parameters.value(id)
    }

    /// Set a parameter's plain value. Out of range values are clamped.
    /// Returns the applied value.
    pub fn set_parameter(&self, id: FourCC, value: f32) -> Result<f32, Error> {
        let value = self.parameters.set_value(id, value)?;
        log::debug!("Set parameter '{id}' to {value}");
        Ok(value)
    }

    /// Set a parameter's value from a normalized value in range \[0,1\].
    /// Returns the applied plain value.
    pub fn set_parameter_normalized(&self, id: FourCC, normalized: f32) -> Result<f32, Error> {
        let value = self.parameters.set_normalized_value(id, normalized)?;
        log::debug!("Set parameter '{id}' to {value}");
        Ok(value)
    }

    /// Reset all parameters to their default values.
    pub fn reset_parameters(&self) {
        self.parameters.reset();
    }

    fn push(&self, message: EngineMessage, event_name: &str) -> Result<(), Error> {
        if self.message_queue.push(message).is_err() {
            log::warn!("Engine event queue is full. Failed to send a {event_name} event.");
            log::warn!("Increase the engine's message queue size to prevent this from happening...");
            return Err(Error::SendError("Engine event queue is full".to_string()));
        }
        Ok(())
    }

    fn validate_channel(channel: u8) -> Result<(), Error> {
        if !(1..=16).contains(&channel) {
            return Err(Error::ParameterError(format!(
                "Invalid MIDI channel: {channel}. Must be in range [1, 16]"
            )));
        }
        Ok(())
    }

    fn validate_note(note: u8) -> Result<(), Error> {
        if note > 127 {
            return Err(Error::ParameterError(format!("Invalid MIDI note: {note}")));
        }
        Ok(())
    }
}

// -------------------------------------------------------------------------------------------------
