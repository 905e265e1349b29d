//! Gemini is firmware for a dual-channel analog oscillator voice module, ported to the [Nucleo-F767ZI development
//! board](https://www.st.com/en/evaluation-tools/nucleo-f767zi.html). Two control voltages, Pollux and Castor, are
//! scanned continuously; every completed scan sets the duty of two PWM outputs and, through a factory calibration
//! table, the codes of an external MCP4728 quad DAC. The module also enumerates as a USB MIDI device.
//!
//! The control loop itself is a plain busy loop in thread mode (see [`gemini_lib::scheduler`]). Interrupt-driven
//! work, i.e., the USB stack and the ADC scan, runs as [Embassy](https://embassy.dev) tasks on an
//! [`InterruptExecutor`] and hands its results to the loop through statics.

#![no_std]
#![no_main]

mod calibration;
mod outputs;
mod scan;
mod usb_midi;

use crate::{
    calibration::FACTORY_TABLE,
    outputs::PwmPair,
    scan::scan_task,
    usb_midi::{ConnectionSync, MidiQueue, UsbMidiPort, midi_task, usb_task},
};
use cortex_m_rt::entry;
use defmt::*;
use embassy_executor::InterruptExecutor;
use embassy_stm32::{
    Config,
    adc::{Adc, AdcChannel, SampleTime},
    bind_interrupts,
    gpio::OutputType,
    i2c::{self, I2c},
    interrupt::{self, InterruptExt, Priority},
    peripherals,
    time::Hertz,
    timer::{
        low_level::CountingMode,
        simple_pwm::{PwmPin, SimplePwm},
    },
    usb,
};
use embassy_sync::{blocking_mutex::raw::CriticalSectionRawMutex, channel::Channel, watch::Watch};
use embassy_usb::{Builder, class::midi::MidiClass};
use gemini_lib::{
    configuration::{Mcp4728Config, OutputConfig},
    mcp4728::Mcp4728,
    output::OutputDispatcher,
    sample::ScanHandoff,
    scheduler::Scheduler,
    voice_params::VoiceParamTable,
};
use static_cell::StaticCell;

use {defmt_rtt as _, panic_probe as _};

bind_interrupts!(
    #[doc(hidden)]
    struct Irqs {
        OTG_FS => usb::InterruptHandler<peripherals::USB_OTG_FS>;
    }
);

type UsbDriver = usb::Driver<'static, peripherals::USB_OTG_FS>;
type ScanSync = ScanHandoff<CriticalSectionRawMutex>;

/// Latest ADC scan, handed from [`scan_task`] to the control loop.
static SCAN: ScanSync = ScanHandoff::new();

/// MIDI packets received over USB, waiting for the control loop.
static MIDI_QUEUE: MidiQueue = Channel::new();

/// Whether a USB host has configured the device.
static USB_CONNECTION: ConnectionSync = Watch::new();

/// Runs every task; the control loop keeps thread mode to itself.
static EXECUTOR_TASKS: InterruptExecutor = InterruptExecutor::new();

// UART4 is otherwise unused; its vector serves as the executor's software interrupt
#[embassy_stm32::interrupt]
unsafe fn UART4() {
    unsafe { EXECUTOR_TASKS.on_interrupt() }
}

#[entry]
fn main() -> ! {
    info!("Initializing Gemini");

    let mut config = Config::default();
    {
        use embassy_stm32::rcc::*;
        // hse: high-speed external clock
        config.rcc.hse = Some(Hse {
            freq: Hertz(8_000_000),
            mode: HseMode::Bypass,
        });

        // pll: phase-locked loop, crucial for dividing clock
        config.rcc.pll_src = PllSource::HSE;
        config.rcc.pll = Some(Pll {
            prediv: PllPreDiv::DIV4,
            mul: PllMul::MUL216,
            divp: Some(PllPDiv::DIV2), // 8mhz / 4 * 216 / 2 = 216Mhz
            // per section 5.2 of RM0410: the 48MHz clock used for USB OTG FS is derived from main PLL VCO (PLLQ clock)
            divq: Some(PllQDiv::DIV9), // 8mhz / 4 * 216 / 9 = 48Mhz
            divr: None,
        });
        config.rcc.ahb_pre = AHBPrescaler::DIV1;
        config.rcc.apb1_pre = APBPrescaler::DIV4;
        config.rcc.apb2_pre = APBPrescaler::DIV2;
        config.rcc.sys = Sysclk::PLL1_P;
        config.rcc.mux.clk48sel = mux::Clk48sel::PLL1_Q;
    }
    let p = embassy_stm32::init(config);

    // Create the driver, from the HAL.
    static ENDPOINT_OUT_BUFFER: StaticCell<[u8; 256]> = StaticCell::new();
    let mut config = embassy_stm32::usb::Config::default();

    // Per section 6.10 of the Nucleo board manual (UM1974), CN13 (the USB port) cannot power the board, so the
    // device is self-powered and must detect VBUS.
    config.vbus_detection = true;

    let driver = usb::Driver::new_fs(
        p.USB_OTG_FS,
        Irqs,
        p.PA12,
        p.PA11,
        ENDPOINT_OUT_BUFFER.init([0; 256]),
        config,
    );

    // per https://pid.codes, FOSS projects can apply to be listed under the vendor ID owned by InterBiometrics;
    // 0x0001 is its test product ID
    let vendor_id = 0x1209;
    let product_id = 0x0001;

    let mut config = embassy_usb::Config::new(vendor_id, product_id);
    config.manufacturer = Some("Winterbloom");
    config.product = Some("Gemini");
    config.self_powered = true;
    config.max_power = 0;

    static CONFIG_DESCRIPTOR: StaticCell<[u8; 256]> = StaticCell::new();
    static BOS_DESCRIPTOR: StaticCell<[u8; 256]> = StaticCell::new();
    static CONTROL_BUFFER: StaticCell<[u8; 64]> = StaticCell::new();

    let mut builder = Builder::new(
        driver,
        config,
        CONFIG_DESCRIPTOR.init([0; 256]),
        BOS_DESCRIPTOR.init([0; 256]),
        &mut [], // no msos descriptors
        CONTROL_BUFFER.init([0; 64]),
    );
    let class = MidiClass::new(&mut builder, 0, 1, 64);
    let usb = builder.build();

    // CV inputs: Pollux on PA3 (ADC123_IN3), Castor on PC0 (ADC123_IN10)
    let mut adc = Adc::new(p.ADC1);
    adc.set_sample_time(SampleTime::CYCLES480);
    let pollux_in = p.PA3.degrade_adc();
    let castor_in = p.PC0.degrade_adc();

    interrupt::UART4.set_priority(Priority::P6);
    let spawner = EXECUTOR_TASKS.start(interrupt::UART4);
    unwrap!(spawner.spawn(usb_task(usb)));
    unwrap!(spawner.spawn(midi_task(
        class,
        MIDI_QUEUE.sender(),
        USB_CONNECTION.sender()
    )));
    unwrap!(spawner.spawn(scan_task(adc, pollux_in, castor_in, &SCAN)));

    let output_config = OutputConfig::default();
    let pwm = PwmPair::new(
        SimplePwm::new(
            p.TIM3,
            Some(PwmPin::new(p.PA6, OutputType::PushPull)),
            None,
            None,
            None,
            Hertz(output_config.pwm_frequency),
            CountingMode::EdgeAlignedUp,
        ),
        SimplePwm::new(
            p.TIM4,
            Some(PwmPin::new(p.PD12, OutputType::PushPull)),
            None,
            None,
            None,
            Hertz(output_config.pwm_frequency),
            CountingMode::EdgeAlignedUp,
        ),
    );

    let mut i2c_config = i2c::Config::default();
    i2c_config.frequency = Hertz(400_000);
    let i2c = I2c::new_blocking(p.I2C1, p.PB8, p.PB9, i2c_config);
    let dac = Mcp4728::new(i2c, Mcp4728Config::default());

    let table = unwrap!(VoiceParamTable::new(&FACTORY_TABLE));
    let port = UsbMidiPort::new(MIDI_QUEUE.receiver(), unwrap!(USB_CONNECTION.receiver()));

    info!("Entering control loop");
    Scheduler::new(
        port,
        SCAN.receiver(),
        table,
        OutputDispatcher::new(pwm, dac, output_config),
    )
    .run()
}
