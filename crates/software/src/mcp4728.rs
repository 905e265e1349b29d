use crate::{
    configuration::{CODE_MAX, Gain, Mcp4728Config, Reference},
    output::QuadDac,
};
use embedded_hal::i2c::I2c;
use measurements::Voltage;

const WRITE_VREF: u8 = 0b1000_0000;
const WRITE_GAIN: u8 = 0b1100_0000;

/// An MCP4728 on an I2C bus. All four channels share one reference and gain setting.
pub struct Mcp4728<I2C> {
    i2c: I2C,
    config: Mcp4728Config,
}

impl<I2C: I2c> Mcp4728<I2C> {
    /// Constructs an [`Mcp4728`]. The chip keeps its power-on settings until [`init`](QuadDac::init) runs.
    pub fn new(i2c: I2C, config: Mcp4728Config) -> Self {
        Self { i2c, config }
    }

    /// The nominal output voltage for `code` under the configured reference and gain.
    pub fn voltage(&self, code: u16) -> Voltage {
        let fraction = f64::from(code.min(CODE_MAX)) / 4096.0;
        let full_scale = match self.config.reference {
            Reference::Vdd(vdd) => vdd.as_volts(),
            Reference::Internal => match self.config.gain {
                Gain::X1 => Reference::INTERNAL_VOLTS,
                Gain::X2 => 2.0 * Reference::INTERNAL_VOLTS,
            },
        };
        Voltage::from_volts(full_scale * fraction)
    }

    fn all_channels(bit: bool) -> u8 {
        if bit { 0b1111 } else { 0b0000 }
    }
}

impl<I2C: I2c> QuadDac for Mcp4728<I2C> {
    type Error = I2C::Error;

    /// Selects the reference and gain for all channels. Neither is written to EEPROM.
    fn init(&mut self) -> Result<(), Self::Error> {
        let internal = matches!(self.config.reference, Reference::Internal);
        let doubled = matches!(self.config.gain, Gain::X2);
        info!(
            "MCP4728 at {=u8:#x}: internal reference {}, x2 gain {}, full scale {=f64} V",
            self.config.address,
            internal,
            doubled,
            self.voltage(CODE_MAX).as_volts()
        );

        self.i2c
            .write(self.config.address, &[WRITE_VREF | Self::all_channels(internal)])?;
        self.i2c
            .write(self.config.address, &[WRITE_GAIN | Self::all_channels(doubled)])
    }

    /// Fast Write of all four input registers, channel A first, with every channel powered up.
    fn write_channels(&mut self, codes: [u16; 4]) -> Result<(), Self::Error> {
        let mut frame = [0_u8; 8];
        for (bytes, code) in frame.chunks_exact_mut(2).zip(codes) {
            let code = code & CODE_MAX;
            // upper two bits of the first byte are the Fast Write command, next two are power-down (normal)
            bytes[0] = (code >> 8) as u8;
            bytes[1] = code as u8;
        }
        self.i2c.write(self.config.address, &frame)
    }
}
