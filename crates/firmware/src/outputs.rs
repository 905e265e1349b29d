//! PWM outputs. Each channel gets its own timer so the two carriers can be configured independently.

use embassy_stm32::{
    peripherals::{TIM3, TIM4},
    time::Hertz,
    timer::simple_pwm::SimplePwm,
};
use gemini_lib::{
    configuration::Channel,
    output::{Duty, PwmOutput},
};

/// Pollux on TIM3 channel 1, Castor on TIM4 channel 1.
pub struct PwmPair {
    pollux: SimplePwm<'static, TIM3>,
    castor: SimplePwm<'static, TIM4>,
}

impl PwmPair {
    /// Takes both timers and enables their first channel.
    pub fn new(mut pollux: SimplePwm<'static, TIM3>, mut castor: SimplePwm<'static, TIM4>) -> Self {
        pollux.ch1().enable();
        castor.ch1().enable();
        Self { pollux, castor }
    }
}

/// Converts a duty fraction to compare register counts for a timer with the given top value.
fn counts(duty: Duty, max: u16) -> u16 {
    (duty.fraction() * f32::from(max)) as u16
}

impl PwmOutput for PwmPair {
    fn set_frequency(&mut self, channel: Channel, frequency: u32) {
        match channel {
            Channel::Pollux => self.pollux.set_frequency(Hertz(frequency)),
            Channel::Castor => self.castor.set_frequency(Hertz(frequency)),
        }
    }

    fn set_duty(&mut self, channel: Channel, duty: Duty) {
        match channel {
            Channel::Pollux => {
                let max = self.pollux.max_duty_cycle();
                self.pollux.ch1().set_duty_cycle(counts(duty, max));
            }
            Channel::Castor => {
                let max = self.castor.max_duty_cycle();
                self.castor.ch1().set_duty_cycle(counts(duty, max));
            }
        }
    }
}
