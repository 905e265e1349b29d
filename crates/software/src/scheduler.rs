//! The control loop. Every iteration services USB, drains at most one MIDI packet and, if the ADC finished a scan
//! since the last iteration, resolves voice parameters from it and updates the outputs.
//!
//! Nothing in an iteration waits: collaborators are polled and either have something or don't. The loop owns no
//! hardware directly; everything it touches is handed to [`Scheduler::new`].

use crate::{
    midi::{Ingress, MidiIngress, MidiPacket},
    output::{OutputDispatcher, PwmOutput, QuadDac},
    sample::RawSamples,
    voice_params::{VoiceParamTable, VoiceParams},
};

/// The USB device stack, as seen from the control loop.
pub trait UsbTransport {
    /// Housekeeping which must run every iteration. Must not block.
    fn poll(&mut self);

    /// Returns the next received MIDI packet, if there is one.
    fn try_receive_midi(&mut self) -> Option<MidiPacket>;
}

/// The ADC scan pipeline, as seen from the control loop.
pub trait SampleSource {
    /// Starts continuous scanning of both channels. Called once.
    fn start_scan(&mut self);

    /// Takes the latest completed scan if it hasn't been taken yet, clearing the ready edge.
    fn take_scan(&mut self) -> Option<RawSamples>;

    /// Number of scans replaced before they could be taken.
    fn skipped(&self) -> u32;
}

/// How many dispatches pass between two logged [`Stats`] reports.
pub const STATS_INTERVAL: u32 = 1 << 14;

/// Running counters kept by the [`Scheduler`]. All of them wrap.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Stats {
    /// Loop iterations completed.
    pub iterations: u32,
    /// MIDI packets drained from the transport.
    pub midi_packets: u32,
    /// Scans turned into output updates.
    pub dispatches: u32,
    /// DAC transactions that failed.
    pub dac_failures: u32,
    /// Scans the ADC completed which were overwritten before the loop took them.
    pub skipped_scans: u32,
}

/// An output update performed during an iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Dispatch {
    /// The scan that was consumed.
    pub samples: RawSamples,
    /// Parameters resolved from the Castor code.
    pub params: VoiceParams,
    /// Whether the DAC accepted the write.
    pub dac_ok: bool,
}

/// What happened during one call to [`Scheduler::iterate`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Iteration {
    /// Outcome of handling the MIDI packet, if one was received.
    pub midi: Option<Ingress>,
    /// The output update, if a scan was ready.
    pub dispatch: Option<Dispatch>,
    /// The counters, if this iteration logged them. Happens every [`STATS_INTERVAL`] dispatches.
    pub report: Option<Stats>,
}

/// Drives the module: one cooperative loop over every collaborator.
pub struct Scheduler<'t, U, S, P, D> {
    usb: U,
    samples: S,
    table: VoiceParamTable<'t>,
    outputs: OutputDispatcher<P, D>,
    ingress: MidiIngress,
    stats: Stats,
}

impl<'t, U, S, P, D> Scheduler<'t, U, S, P, D>
where
    U: UsbTransport,
    S: SampleSource,
    P: PwmOutput,
    D: QuadDac,
{
    /// Constructs a [`Scheduler`]. The table has already been validated by [`VoiceParamTable::new`], so nothing here
    /// can fail.
    pub fn new(usb: U, samples: S, table: VoiceParamTable<'t>, outputs: OutputDispatcher<P, D>) -> Self {
        Self {
            usb,
            samples,
            table,
            outputs,
            ingress: MidiIngress::new(),
            stats: Stats::default(),
        }
    }

    /// Startup sequence: bring the outputs to a known state, then start the ADC.
    ///
    /// Outputs go first so the first scan never lands on an unconfigured PWM timer or DAC.
    pub fn start(&mut self) {
        info!("Initializing outputs");
        self.outputs.init();
        info!("Starting ADC scan");
        self.samples.start_scan();
    }

    /// Runs [`start`](Self::start) and then iterates forever.
    pub fn run(mut self) -> ! {
        self.start();
        loop {
            self.iterate();
        }
    }

    /// Runs a single iteration of the loop.
    pub fn iterate(&mut self) -> Iteration {
        self.usb.poll();

        let midi = self.usb.try_receive_midi().map(|packet| {
            self.stats.midi_packets = self.stats.midi_packets.wrapping_add(1);
            self.ingress.handle(packet)
        });

        let dispatch = self.samples.take_scan().map(|samples| {
            let params = self.table.resolve(samples.castor());
            let dac_ok = self.outputs.dispatch(&samples, &params);
            self.stats.dispatches = self.stats.dispatches.wrapping_add(1);
            Dispatch {
                samples,
                params,
                dac_ok,
            }
        });

        self.stats.iterations = self.stats.iterations.wrapping_add(1);

        let report = (dispatch.is_some() && self.stats.dispatches % STATS_INTERVAL == 0).then(|| {
            let stats = self.stats();
            info!("{}", stats);
            stats
        });

        Iteration {
            midi,
            dispatch,
            report,
        }
    }

    /// A snapshot of the loop's counters.
    pub fn stats(&self) -> Stats {
        Stats {
            dac_failures: self.outputs.dac_failures(),
            skipped_scans: self.samples.skipped(),
            ..self.stats
        }
    }
}
