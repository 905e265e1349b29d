//! This crate contains architecture-agnostic logic for Gemini, the firmware of a dual-channel analog oscillator voice
//! module (Castor & Pollux). Two control voltages are sampled continuously; each scan is turned into voice parameters
//! through a calibration table and written out to PWM and a quad [MCP4728](https://www.microchip.com/en-us/product/mcp4728)
//! DAC, while a USB MIDI endpoint is serviced from the same cooperative loop.
//!
//! Hardware is reached only through the traits in [`scheduler`] and [`output`], so everything here can be exercised
//! on the host. The `gemini` firmware crate supplies the Embassy-backed implementations.

#![deny(missing_docs)]
#![no_std]

#[cfg(test)]
extern crate std;

mod fmt;

pub mod configuration;

/// Driver for the MCP4728 quad 12-bit I2C DAC.
pub mod mcp4728;

/// Decoding and reporting of inbound USB-MIDI packets.
pub mod midi;

pub mod output;
pub mod sample;
pub mod scheduler;

/// Calibration table lookup: CV codes to voice parameters.
pub mod voice_params;
