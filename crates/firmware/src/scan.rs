//! Continuous round-robin scan of the two CV inputs.

use crate::ScanSync;
use defmt::*;
use embassy_stm32::{
    adc::{Adc, AnyAdcChannel},
    peripherals::ADC1,
};
use embassy_time::{Duration, Ticker};
use gemini_lib::sample::RawSamples;

/// Rate at which both channels are converted.
const SCAN_RATE_HZ: u64 = 4_000;

/// Waits for the control loop to request scanning, then converts Pollux and Castor back to back at
/// [`SCAN_RATE_HZ`], publishing each completed pair.
#[embassy_executor::task]
pub async fn scan_task(
    mut adc: Adc<'static, ADC1>,
    mut pollux: AnyAdcChannel<ADC1>,
    mut castor: AnyAdcChannel<ADC1>,
    handoff: &'static ScanSync,
) -> ! {
    handoff.wait_start().await;
    info!("ADC scan running at {} Hz", SCAN_RATE_HZ);

    let mut ticker = Ticker::every(Duration::from_hz(SCAN_RATE_HZ));
    loop {
        ticker.next().await;
        let pollux_code = adc.blocking_read(&mut pollux);
        let castor_code = adc.blocking_read(&mut castor);
        handoff.publish(RawSamples::new(pollux_code, castor_code));
    }
}
