//! This module contains the static configuration of the voice module's outputs along with the enums used to address
//! its channels. None of it changes at runtime; calibration data lives in [`crate::voice_params`] instead.

use measurements::Voltage;

/// Full scale of the 12-bit converters on both ends of the signal path.
pub const CODE_MAX: u16 = 0x0FFF;

/// Names the two voices of the module. The discriminant doubles as the ADC and PWM channel index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Channel {
    /// Channel 0, the "Pollux" control input and its PWM output.
    Pollux = 0,
    /// Channel 1, the "Castor" control/CV input and its PWM output. Castor's CV drives the calibration table lookup.
    Castor = 1,
}

impl Channel {
    /// Both channels in scan order.
    pub const ALL: [Channel; 2] = [Channel::Pollux, Channel::Castor];

    /// Returns the channel's position in a scan.
    pub const fn index(self) -> usize {
        self as usize
    }
}

/// Configuration of the PWM outputs, applied once at startup.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct OutputConfig {
    /// PWM carrier frequency applied to both channels, in hertz.
    ///
    /// The default reproduces the original hardware: a 48 MHz timer counting to a period of 0xFF.
    pub pwm_frequency: u32,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            pwm_frequency: 48_000_000 / 256,
        }
    }
}

/// Voltage reference selection for the MCP4728.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Reference {
    /// Ratiometric to the supply; the programmable gain is ignored in this mode.
    Vdd(Voltage),
    /// The on-chip 2.048 V bandgap reference.
    Internal,
}

impl Reference {
    /// Voltage of the on-chip reference.
    pub const INTERNAL_VOLTS: f64 = 2.048;
}

#[cfg(feature = "defmt")]
impl defmt::Format for Reference {
    fn format(&self, fmt: defmt::Formatter) {
        match self {
            Reference::Vdd(v) => defmt::write!(fmt, "Vdd({=f64} V)", v.as_volts()),
            Reference::Internal => defmt::write!(fmt, "Internal"),
        }
    }
}

/// Output amplifier gain for the MCP4728. Only applies when [`Reference::Internal`] is selected.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Gain {
    /// Unity gain.
    #[default]
    X1,
    /// Doubles the output.
    X2,
}

/// Configuration of the MCP4728 quad DAC.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Mcp4728Config {
    /// 7-bit I2C address. Factory default is 0x60; the low three bits are programmable.
    pub address: u8,
    /// Reference used by all four channels.
    pub reference: Reference,
    /// Gain used by all four channels.
    pub gain: Gain,
}

impl Default for Mcp4728Config {
    fn default() -> Self {
        Self {
            address: 0x60,
            reference: Reference::Vdd(Voltage::from_volts(3.3)),
            gain: Gain::X1,
        }
    }
}
