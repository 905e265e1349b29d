//! Handoff of completed ADC scans from the sampling pipeline to the control loop.
//!
//! The producer (an interrupt-driven task in the firmware) and the consumer (the [`Scheduler`][crate::scheduler::Scheduler])
//! share exactly one thing: a [`ScanHandoff`]. Publishing copies a whole scan in and taking copies it out under the
//! same lock, so the consumer can never observe half of one scan and half of the next. Each scan is stamped with a
//! generation number; a gap between consecutive generations means the consumer fell behind and a scan was overwritten.
//! The consumer counts those gaps and reports them through [`SampleSource::skipped`].

use crate::{
    configuration::{CODE_MAX, Channel},
    scheduler::SampleSource,
};
use core::sync::atomic::{AtomicU32, Ordering};
use embassy_sync::{blocking_mutex::raw::RawMutex, signal::Signal};

/// One 12-bit conversion result per channel, as produced by a single scan.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RawSamples([u16; 2]);

impl RawSamples {
    /// Constructs [`RawSamples`], discarding anything above the 12-bit range.
    pub const fn new(pollux: u16, castor: u16) -> Self {
        Self([pollux & CODE_MAX, castor & CODE_MAX])
    }

    /// Returns the code sampled for `channel`.
    pub fn get(&self, channel: Channel) -> u16 {
        self.0[channel.index()]
    }

    /// Channel 0.
    pub fn pollux(&self) -> u16 {
        self.get(Channel::Pollux)
    }

    /// Channel 1.
    pub fn castor(&self) -> u16 {
        self.get(Channel::Castor)
    }
}

/// A completed scan together with its generation stamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Scan {
    /// Incremented by one for every published scan, starting at 1. Wraps.
    pub generation: u32,
    /// The conversion results.
    pub samples: RawSamples,
}

/// Single-producer/single-consumer cell carrying the latest scan and its "results ready" edge.
///
/// Meant to live in a `static`; see [`ScanHandoff::new`].
pub struct ScanHandoff<M: RawMutex> {
    scan: Signal<M, Scan>,
    start: Signal<M, ()>,
    generation: AtomicU32,
}

impl<M: RawMutex> Default for ScanHandoff<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: RawMutex> ScanHandoff<M> {
    /// Constructs an empty [`ScanHandoff`].
    pub const fn new() -> Self {
        Self {
            scan: Signal::new(),
            start: Signal::new(),
            generation: AtomicU32::new(0),
        }
    }

    /// Producer side: makes `samples` the latest scan and raises the ready edge.
    ///
    /// A scan that was never taken is replaced; the consumer notices the gap in generations.
    pub fn publish(&self, samples: RawSamples) -> Scan {
        let generation = self.generation.fetch_add(1, Ordering::Relaxed).wrapping_add(1);
        let scan = Scan {
            generation,
            samples,
        };
        self.scan.signal(scan);
        scan
    }

    /// Producer side: resolves once the consumer has asked for scanning to begin.
    pub async fn wait_start(&self) {
        self.start.wait().await
    }

    #[cfg(test)]
    pub(crate) fn start_pending(&self) -> bool {
        self.start.signaled()
    }

    /// Creates the consumer end. There must only ever be one.
    pub fn receiver(&self) -> ScanReceiver<'_, M> {
        ScanReceiver {
            handoff: self,
            last_generation: 0,
            skipped: 0,
        }
    }
}

/// Consumer end of a [`ScanHandoff`].
pub struct ScanReceiver<'a, M: RawMutex> {
    handoff: &'a ScanHandoff<M>,
    last_generation: u32,
    skipped: u32,
}

impl<M: RawMutex> SampleSource for ScanReceiver<'_, M> {
    fn start_scan(&mut self) {
        self.handoff.start.signal(());
    }

    fn take_scan(&mut self) -> Option<RawSamples> {
        let scan = self.handoff.scan.try_take()?;

        let missed = scan
            .generation
            .wrapping_sub(self.last_generation)
            .wrapping_sub(1);
        if missed != 0 {
            warn!("{} ADC scan(s) skipped before generation {}", missed, scan.generation);
            self.skipped = self.skipped.wrapping_add(missed);
        }
        self.last_generation = scan.generation;

        Some(scan.samples)
    }

    fn skipped(&self) -> u32 {
        self.skipped
    }
}
