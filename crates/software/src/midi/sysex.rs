//! Decoding of the device's SysEx command set, used by the factory calibration tooling.
//!
//! Every command is framed as `F0 77 <opcode> <arguments...> F7`. Multi-bit values are sent as 4-bit nibbles, most
//! significant first, so no argument byte ever has its high bit set.

use num_derive::FromPrimitive;
use num_traits::FromPrimitive;
use thiserror::Error;

/// Manufacturer marker identifying SysEx messages addressed to this device.
pub const SYSEX_MARKER: u8 = 0x77;

/// Reasons a SysEx message is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SysexError {
    /// The message didn't fit in the assembly buffer.
    #[error("SysEx message is longer than the assembly buffer")]
    Overflow,
    /// SysEx data or an end byte arrived without a start byte.
    #[error("SysEx data arrived without a start byte")]
    Truncated,
    /// The manufacturer marker belongs to someone else (or is missing).
    #[error("SysEx message is not addressed to this device")]
    NotGemini,
    /// The message carries the manufacturer marker but stops before the opcode.
    #[error("SysEx message has no command")]
    MissingOpcode,
    /// The opcode isn't part of the command set.
    #[error("unknown SysEx command {0:#04x}")]
    UnknownCommand(u8),
    /// The command carries too few or too many argument bytes.
    #[error("SysEx command {0:#04x} has the wrong number of arguments")]
    BadLength(u8),
    /// An argument byte which should hold a nibble is above 0x0F.
    #[error("SysEx argument is not a nibble")]
    BadNibble,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive)]
enum Opcode {
    EnterCalibrationMode = 0x01,
    SetAdcGainError = 0x02,
    SetAdcOffsetError = 0x03,
    SetLedBrightness = 0x04,
    ReadAdc = 0x05,
    SetDac = 0x06,
    SetPeriod = 0x07,
    ResetSettings = 0x08,
    SetKnobRanges = 0x09,
}

/// A signed 16.16 fixed-point number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fix16(pub i32);

impl Fix16 {
    /// Converts to floating point.
    pub fn to_f32(self) -> f32 {
        self.0 as f32 / 65536.0
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for Fix16 {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(fmt, "{=f32}", self.to_f32())
    }
}

/// A command sent to the device over SysEx.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Command {
    /// Switches the device into calibration mode; the host expects a reply carrying the firmware version.
    EnterCalibrationMode,
    /// Sets the ADC gain error correction (fixed point, 2048 = 1.0).
    SetAdcGainError(u16),
    /// Sets the ADC offset error correction.
    SetAdcOffsetError(u16),
    /// Sets the status LED brightness.
    SetLedBrightness(u16),
    /// Requests the latest conversion result for an ADC channel.
    ReadAdc {
        /// ADC channel index.
        channel: u8,
    },
    /// Writes a code directly to one DAC channel.
    SetDac {
        /// DAC channel index, 0 to 3.
        channel: u8,
        /// Gain/reference selector for the write.
        gain: u8,
        /// 12-bit DAC code.
        value: u16,
    },
    /// Sets an oscillator's timer period directly.
    SetPeriod {
        /// Oscillator index.
        channel: u8,
        /// Timer period.
        value: u16,
    },
    /// Restores factory settings.
    ResetSettings,
    /// Sets the pitch knob ranges for both oscillators.
    SetKnobRanges {
        /// Lowest Castor knob value.
        castor_min: Fix16,
        /// Highest Castor knob value.
        castor_max: Fix16,
        /// Lowest Pollux knob value.
        pollux_min: Fix16,
        /// Highest Pollux knob value.
        pollux_max: Fix16,
    },
}

impl Command {
    /// Decodes a SysEx message body, i.e., everything between `F0` and `F7`.
    pub fn decode(body: &[u8]) -> Result<Self, SysexError> {
        let [SYSEX_MARKER, rest @ ..] = body else {
            return Err(SysexError::NotGemini);
        };
        let [opcode, args @ ..] = rest else {
            return Err(SysexError::MissingOpcode);
        };
        let raw_opcode = *opcode;
        let opcode = Opcode::from_u8(raw_opcode).ok_or(SysexError::UnknownCommand(raw_opcode))?;
        let bad_length = SysexError::BadLength(raw_opcode);

        let command = match opcode {
            Opcode::EnterCalibrationMode => {
                no_args(args, bad_length)?;
                Self::EnterCalibrationMode
            }
            Opcode::SetAdcGainError => Self::SetAdcGainError(nibbles_u16(args, bad_length)?),
            Opcode::SetAdcOffsetError => Self::SetAdcOffsetError(nibbles_u16(args, bad_length)?),
            Opcode::SetLedBrightness => Self::SetLedBrightness(nibbles_u16(args, bad_length)?),
            Opcode::ReadAdc => {
                let [channel] = args else {
                    return Err(bad_length);
                };
                Self::ReadAdc { channel: *channel }
            }
            Opcode::SetDac => {
                let [channel, gain, value @ ..] = args else {
                    return Err(bad_length);
                };
                Self::SetDac {
                    channel: *channel,
                    gain: *gain,
                    value: nibbles_u16(value, bad_length)?,
                }
            }
            Opcode::SetPeriod => {
                let [channel, value @ ..] = args else {
                    return Err(bad_length);
                };
                Self::SetPeriod {
                    channel: *channel,
                    value: nibbles_u16(value, bad_length)?,
                }
            }
            Opcode::ResetSettings => {
                no_args(args, bad_length)?;
                Self::ResetSettings
            }
            Opcode::SetKnobRanges => {
                if args.len() != 32 {
                    return Err(bad_length);
                }
                let mut ranges = [Fix16(0); 4];
                for (range, chunk) in ranges.iter_mut().zip(args.chunks_exact(8)) {
                    *range = Fix16(nibbles(chunk)? as i32);
                }
                let [castor_min, castor_max, pollux_min, pollux_max] = ranges;
                Self::SetKnobRanges {
                    castor_min,
                    castor_max,
                    pollux_min,
                    pollux_max,
                }
            }
        };
        Ok(command)
    }
}

fn no_args(args: &[u8], err: SysexError) -> Result<(), SysexError> {
    if args.is_empty() { Ok(()) } else { Err(err) }
}

fn nibbles_u16(args: &[u8], err: SysexError) -> Result<u16, SysexError> {
    if args.len() != 4 {
        return Err(err);
    }
    nibbles(args).map(|v| v as u16)
}

/// Folds up to eight nibbles, most significant first.
fn nibbles(args: &[u8]) -> Result<u32, SysexError> {
    args.iter().try_fold(0_u32, |acc, &nibble| {
        if nibble > 0x0F {
            Err(SysexError::BadNibble)
        } else {
            Ok(acc << 4 | u32::from(nibble))
        }
    })
}
