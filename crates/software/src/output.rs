//! The module's physical outputs: two PWM channels and a quad DAC, and the [`OutputDispatcher`] which drives them once
//! per completed scan.

use crate::{
    configuration::{CODE_MAX, Channel, OutputConfig},
    sample::RawSamples,
    voice_params::VoiceParams,
};

/// A PWM output duty cycle, as a fraction in `[0.0, 1.0]`.
#[derive(Debug, Default, Clone, Copy, PartialEq, PartialOrd)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Duty(f32);

impl Duty {
    /// Output held low.
    pub const ZERO: Duty = Duty(0.0);
    /// Output held high.
    pub const FULL: Duty = Duty(1.0);

    /// Scales a 12-bit code to a duty cycle as `code / 4096`.
    ///
    /// Full scale saturates: the largest code the ADC can produce drives the output fully high rather than one step short.
    pub fn from_code(code: u16) -> Self {
        if code >= CODE_MAX {
            return Self::FULL;
        }
        Self((f32::from(code) / 4096.0).clamp(0.0, 1.0))
    }

    /// The duty cycle as a fraction.
    pub fn fraction(self) -> f32 {
        self.0
    }
}

/// The PWM peripheral, one output per [`Channel`]. Writes must not block.
pub trait PwmOutput {
    /// Sets the carrier frequency of a channel, in hertz.
    fn set_frequency(&mut self, channel: Channel, frequency: u32);

    /// Sets the duty cycle of a channel.
    fn set_duty(&mut self, channel: Channel, duty: Duty);
}

/// A four-channel DAC written in one bus transaction.
pub trait QuadDac {
    /// Bus-level failure, e.g., a missing acknowledgment.
    type Error;

    /// One-time setup, run before the first write.
    fn init(&mut self) -> Result<(), Self::Error>;

    /// Writes all four channels at once. Must complete in bounded time.
    fn write_channels(&mut self, codes: [u16; 4]) -> Result<(), Self::Error>;
}

/// Builds the DAC frame for one scan.
///
/// The channel order is fixed by the board wiring: Pollux's raw code drives both the first and third channels, the
/// resolved Castor DAC code the second, and Castor's raw code the fourth.
pub fn dac_frame(samples: &RawSamples, params: &VoiceParams) -> [u16; 4] {
    [
        samples.pollux(),
        params.dac_code,
        samples.pollux(),
        samples.castor(),
    ]
}

/// Translates scans and resolved [`VoiceParams`] into PWM and DAC writes.
pub struct OutputDispatcher<P, D> {
    pwm: P,
    dac: D,
    config: OutputConfig,
    dac_failures: u32,
}

impl<P: PwmOutput, D: QuadDac> OutputDispatcher<P, D> {
    /// Constructs an [`OutputDispatcher`]. Nothing is written until [`init`](Self::init).
    pub fn new(pwm: P, dac: D, config: OutputConfig) -> Self {
        Self {
            pwm,
            dac,
            config,
            dac_failures: 0,
        }
    }

    /// Brings the outputs to a known state: configured carrier frequency, zero duty, DAC set up.
    pub fn init(&mut self) {
        for channel in Channel::ALL {
            self.pwm.set_frequency(channel, self.config.pwm_frequency);
            self.pwm.set_duty(channel, Duty::ZERO);
        }
        if self.dac.init().is_err() {
            warn!("DAC initialization failed; writes will be attempted anyway");
            self.dac_failures = self.dac_failures.wrapping_add(1);
        }
    }

    /// Updates every output for one scan: PWM duties first, then a single DAC transaction.
    ///
    /// A failed DAC write is counted and dropped; the next scan overwrites it. Returns `false` if the write failed.
    pub fn dispatch(&mut self, samples: &RawSamples, params: &VoiceParams) -> bool {
        self.pwm
            .set_duty(Channel::Pollux, Duty::from_code(samples.pollux()));
        self.pwm
            .set_duty(Channel::Castor, Duty::from_code(samples.castor()));

        match self.dac.write_channels(dac_frame(samples, params)) {
            Ok(()) => true,
            Err(_) => {
                warn!("DAC write failed; dropping frame");
                self.dac_failures = self.dac_failures.wrapping_add(1);
                false
            }
        }
    }

    /// Number of DAC transactions that failed, including initialization.
    pub fn dac_failures(&self) -> u32 {
        self.dac_failures
    }
}

#[cfg(test)]
pub(crate) mod mock {
    //! Recording stand-ins for the output collaborators, shared with the scheduler tests.

    use super::*;
    use core::cell::RefCell;
    use std::{rc::Rc, vec::Vec};

    /// Everything a test might want to see happen, in the order it happened.
    #[derive(Debug, Clone, Copy, PartialEq)]
    pub enum Event {
        UsbPoll,
        MidiReceive(bool),
        TakeScan(bool),
        StartScan,
        Frequency(Channel, u32),
        Duty(Channel, Duty),
        DacInit,
        DacWrite([u16; 4]),
    }

    pub type Log = Rc<RefCell<Vec<Event>>>;

    pub struct MockPwm(pub Log);

    impl PwmOutput for MockPwm {
        fn set_frequency(&mut self, channel: Channel, frequency: u32) {
            self.0.borrow_mut().push(Event::Frequency(channel, frequency));
        }

        fn set_duty(&mut self, channel: Channel, duty: Duty) {
            self.0.borrow_mut().push(Event::Duty(channel, duty));
        }
    }

    pub struct MockDac {
        pub log: Log,
        pub fail: bool,
    }

    #[derive(Debug)]
    pub struct Nack;

    impl QuadDac for MockDac {
        type Error = Nack;

        fn init(&mut self) -> Result<(), Nack> {
            self.log.borrow_mut().push(Event::DacInit);
            Ok(())
        }

        fn write_channels(&mut self, codes: [u16; 4]) -> Result<(), Nack> {
            self.log.borrow_mut().push(Event::DacWrite(codes));
            if self.fail { Err(Nack) } else { Ok(()) }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{mock::*, *};

    fn dispatcher(log: &Log, fail: bool) -> OutputDispatcher<MockPwm, MockDac> {
        OutputDispatcher::new(
            MockPwm(log.clone()),
            MockDac {
                log: log.clone(),
                fail,
            },
            OutputConfig::default(),
        )
    }

    mod duty {
        use super::*;

        #[test]
        fn zero_code_is_zero_duty() {
            assert_eq!(0.0, Duty::from_code(0).fraction(), "Expected left but got right");
        }

        #[test]
        fn full_scale_is_full_duty() {
            assert_eq!(1.0, Duty::from_code(4095).fraction(), "Expected left but got right");
            assert_eq!(1.0, Duty::from_code(u16::MAX).fraction(), "Expected left but got right");
        }

        #[test]
        fn scales_by_4096() {
            assert_eq!(0.5, Duty::from_code(2048).fraction(), "Expected left but got right");
            assert_eq!(0.25, Duty::from_code(1024).fraction(), "Expected left but got right");
        }
    }

    #[test]
    fn frame_duplicates_pollux() {
        let frame = dac_frame(
            &RawSamples::new(111, 222),
            &VoiceParams {
                dac_code: 333,
                period: 0,
            },
        );
        assert_eq!([111, 333, 111, 222], frame, "Expected left but got right");
    }

    #[test]
    fn init_sets_frequency_and_zero_duty() {
        let log = Log::default();
        dispatcher(&log, false).init();
        assert_eq!(
            std::vec![
                Event::Frequency(Channel::Pollux, 187_500),
                Event::Duty(Channel::Pollux, Duty::ZERO),
                Event::Frequency(Channel::Castor, 187_500),
                Event::Duty(Channel::Castor, Duty::ZERO),
                Event::DacInit,
            ],
            *log.borrow(),
            "Expected left but got right"
        );
    }

    #[test]
    fn dispatch_writes_pwm_before_dac() {
        let log = Log::default();
        let mut outputs = dispatcher(&log, false);
        let samples = RawSamples::new(0, 2048);
        let params = VoiceParams {
            dac_code: 900,
            period: 0,
        };

        assert!(outputs.dispatch(&samples, &params));
        assert_eq!(
            std::vec![
                Event::Duty(Channel::Pollux, Duty::ZERO),
                Event::Duty(Channel::Castor, Duty::from_code(2048)),
                Event::DacWrite([0, 900, 0, 2048]),
            ],
            *log.borrow(),
            "Expected left but got right"
        );
    }

    #[test]
    fn failed_dac_write_is_counted_not_retried() {
        let log = Log::default();
        let mut outputs = dispatcher(&log, true);

        assert!(!outputs.dispatch(&RawSamples::default(), &VoiceParams::default()));
        let writes = log
            .borrow()
            .iter()
            .filter(|event| matches!(event, Event::DacWrite(_)))
            .count();
        assert_eq!(1, writes, "A failed write should not be retried");
        assert_eq!(1, outputs.dac_failures(), "Expected left but got right");
    }
}
