//! USB MIDI plumbing. The device stack and the MIDI class run as tasks; the control loop only ever sees
//! [`UsbMidiPort`], which reads their results without waiting.

use crate::UsbDriver;
use defmt::{panic, *};
use embassy_stm32::usb;
use embassy_sync::{
    blocking_mutex::raw::CriticalSectionRawMutex,
    channel::{self, Channel},
    watch::{self, Watch},
};
use embassy_usb::{UsbDevice, class::midi::MidiClass, driver::EndpointError};
use gemini_lib::{midi::MidiPacket, scheduler::UsbTransport};

/// Packets buffered between the MIDI class and the control loop.
const MIDI_QUEUE_DEPTH: usize = 16;
pub type MidiQueue = Channel<CriticalSectionRawMutex, MidiPacket, MIDI_QUEUE_DEPTH>;
type MidiQueueSender = channel::Sender<'static, CriticalSectionRawMutex, MidiPacket, MIDI_QUEUE_DEPTH>;
type MidiQueueReceiver = channel::Receiver<'static, CriticalSectionRawMutex, MidiPacket, MIDI_QUEUE_DEPTH>;

const CONNECTION_RECEIVER_CNT: usize = 1;
pub type ConnectionSync = Watch<CriticalSectionRawMutex, bool, CONNECTION_RECEIVER_CNT>;
type ConnectionSender = watch::Sender<'static, CriticalSectionRawMutex, bool, CONNECTION_RECEIVER_CNT>;
type ConnectionReceiver = watch::Receiver<'static, CriticalSectionRawMutex, bool, CONNECTION_RECEIVER_CNT>;

#[embassy_executor::task]
pub async fn usb_task(mut usb: UsbDevice<'static, UsbDriver>) -> ! {
    usb.run().await
}

/// Splits received bulk transfers into USB-MIDI event packets and queues them for the control loop.
#[embassy_executor::task]
pub async fn midi_task(
    mut class: MidiClass<'static, UsbDriver>,
    packets: MidiQueueSender,
    connection: ConnectionSender,
) -> ! {
    loop {
        class.wait_connection().await;
        connection.send(true);
        let _ = forward_midi(&mut class, &packets).await;
        connection.send(false);
    }
}

#[doc(hidden)]
struct Disconnected {}

impl From<EndpointError> for Disconnected {
    fn from(val: EndpointError) -> Self {
        match val {
            EndpointError::BufferOverflow => panic!("Buffer overflow"),
            EndpointError::Disabled => Disconnected {},
        }
    }
}

async fn forward_midi<'d, T: usb::Instance + 'd>(
    class: &mut MidiClass<'d, usb::Driver<'d, T>>,
    packets: &MidiQueueSender,
) -> Result<(), Disconnected> {
    let mut buf = [0; 64];
    loop {
        let n = class.read_packet(&mut buf).await?;
        // a transfer carries whole 4-byte event packets; a ragged tail would be a host bug
        for chunk in buf[..n].chunks(4) {
            match MidiPacket::from_slice(chunk) {
                Some(packet) => packets.send(packet).await,
                None => warn!("Dropping {} trailing byte(s) of a USB MIDI transfer", chunk.len()),
            }
        }
    }
}

/// The control loop's handle on USB MIDI.
pub struct UsbMidiPort {
    packets: MidiQueueReceiver,
    connection: ConnectionReceiver,
}

impl UsbMidiPort {
    pub fn new(packets: MidiQueueReceiver, connection: ConnectionReceiver) -> Self {
        Self {
            packets,
            connection,
        }
    }
}

impl UsbTransport for UsbMidiPort {
    fn poll(&mut self) {
        match self.connection.try_changed() {
            Some(true) => info!("USB connected"),
            Some(false) => info!("USB disconnected"),
            None => {}
        }
    }

    fn try_receive_midi(&mut self) -> Option<MidiPacket> {
        self.packets.try_receive().ok()
    }
}
