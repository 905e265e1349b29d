use tinyvec::ArrayVec;
use wmidi::MidiMessage;

mod sysex;
pub use sysex::*;

/// One USB-MIDI Event Packet: a header byte (cable number and Code Index Number) followed by up to three MIDI bytes.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MidiPacket([u8; 4]);

impl MidiPacket {
    /// Constructs a [`MidiPacket`] from its four bytes.
    pub const fn new(bytes: [u8; 4]) -> Self {
        Self(bytes)
    }

    /// Constructs a [`MidiPacket`] from a slice which must be exactly four bytes long.
    pub fn from_slice(data: &[u8]) -> Option<Self> {
        <[u8; 4]>::try_from(data).ok().map(Self)
    }

    /// The raw packet.
    pub fn as_bytes(&self) -> &[u8; 4] {
        &self.0
    }

    /// Virtual cable the packet arrived on.
    pub fn cable(&self) -> u8 {
        self.0[0] >> 4
    }

    /// Classifies the packet by the low nibble of its header.
    pub fn code_index(&self) -> CodeIndex {
        CodeIndex::from_header(self.0[0])
    }

    /// The MIDI bytes carried by the packet, trimmed to the length its [`CodeIndex`] announces.
    pub fn payload(&self) -> &[u8] {
        &self.0[1..1 + self.code_index().payload_len()]
    }
}

/// USB-MIDI Code Index Number, which tells how to interpret the three MIDI bytes of a [`MidiPacket`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CodeIndex {
    /// 0x0 and 0x1, reserved for future extensions and cable events.
    Reserved,
    /// 0x2, two-byte System Common message.
    SystemCommon2,
    /// 0x3, three-byte System Common message.
    SystemCommon3,
    /// 0x4, SysEx starts or continues.
    SysexContinue,
    /// 0x5, SysEx ends with one byte, or a one-byte System Common message.
    SysexEnd1,
    /// 0x6, SysEx ends with two bytes.
    SysexEnd2,
    /// 0x7, SysEx ends with three bytes.
    SysexEnd3,
    /// 0x8 to 0xE, a channel voice message; the nibble mirrors the status byte.
    ChannelVoice(u8),
    /// 0xF, a single byte.
    SingleByte,
}

impl CodeIndex {
    /// Reads the Code Index Number from a packet header.
    pub const fn from_header(header: u8) -> Self {
        match header & 0x0F {
            0x0 | 0x1 => Self::Reserved,
            0x2 => Self::SystemCommon2,
            0x3 => Self::SystemCommon3,
            0x4 => Self::SysexContinue,
            0x5 => Self::SysexEnd1,
            0x6 => Self::SysexEnd2,
            0x7 => Self::SysexEnd3,
            0xF => Self::SingleByte,
            cin => Self::ChannelVoice(cin),
        }
    }

    /// How many of the packet's three MIDI bytes are meaningful.
    pub const fn payload_len(&self) -> usize {
        match self {
            Self::Reserved => 0,
            Self::SysexEnd1 | Self::SingleByte => 1,
            Self::SystemCommon2 | Self::SysexEnd2 => 2,
            // program change and channel pressure
            Self::ChannelVoice(0xC | 0xD) => 2,
            Self::SystemCommon3 | Self::SysexContinue | Self::SysexEnd3 | Self::ChannelVoice(_) => 3,
        }
    }

    /// Returns `true` for the Code Index Numbers that may carry SysEx data.
    pub const fn is_sysex(&self) -> bool {
        matches!(
            self,
            Self::SysexContinue | Self::SysexEnd1 | Self::SysexEnd2 | Self::SysexEnd3
        )
    }
}

/// What came of handling one [`MidiPacket`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Ingress {
    /// A complete non-SysEx message, reported and passed through.
    Message(MidiPacket),
    /// SysEx data was buffered; the message isn't complete yet.
    SysexPending,
    /// A complete SysEx message decoded into a device [`Command`].
    Command(Command),
    /// A SysEx message which couldn't be assembled or understood.
    Rejected(SysexError),
    /// A packet with a reserved Code Index Number.
    Ignored,
}

/// Largest SysEx body (excluding the start and end bytes) the device will assemble.
pub const SYSEX_CAPACITY: usize = 64;

const SYSEX_START: u8 = 0xF0;
const SYSEX_END: u8 = 0xF7;

/// Reassembles SysEx messages which span several USB-MIDI packets.
#[derive(Debug, Default, Clone, PartialEq)]
struct SysexAssembler {
    body: ArrayVec<[u8; SYSEX_CAPACITY]>,
    in_progress: bool,
    overflowed: bool,
}

impl SysexAssembler {
    /// Feeds SysEx bytes in. Returns the message body once the end byte arrives.
    fn push(&mut self, data: &[u8]) -> Result<Option<&[u8]>, SysexError> {
        for &byte in data {
            match byte {
                SYSEX_START => {
                    // a new start abandons whatever was being assembled
                    self.body.clear();
                    self.in_progress = true;
                    self.overflowed = false;
                }
                SYSEX_END => {
                    if !self.in_progress {
                        return Err(SysexError::Truncated);
                    }
                    self.in_progress = false;
                    if self.overflowed {
                        return Err(SysexError::Overflow);
                    }
                    return Ok(Some(self.body.as_slice()));
                }
                _ if !self.in_progress => return Err(SysexError::Truncated),
                _ => {
                    if self.body.try_push(byte).is_some() {
                        self.overflowed = true;
                    }
                }
            }
        }
        Ok(None)
    }
}

/// Handles inbound [`MidiPacket`]s one at a time: reports each and assembles/decodes SysEx.
///
/// The only state carried between packets is a partially assembled SysEx message. When no packet arrives the
/// scheduler skips this step entirely.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct MidiIngress {
    sysex: SysexAssembler,
}

impl MidiIngress {
    /// Constructs a [`MidiIngress`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Reports `packet` and, if it completes a SysEx message, decodes it.
    pub fn handle(&mut self, packet: MidiPacket) -> Ingress {
        info!("MIDI IN (cable {}): {=[u8]:x}", packet.cable(), &packet.as_bytes()[..]);

        let code_index = packet.code_index();
        if code_index == CodeIndex::Reserved {
            debug!("Ignoring USB-MIDI packet with reserved code index");
            return Ingress::Ignored;
        }

        let payload = packet.payload();
        let sysex = code_index.is_sysex()
            // a lone 0x5 byte which isn't a SysEx end is a one-byte System Common message
            && !(code_index == CodeIndex::SysexEnd1 && payload[0] != SYSEX_END);

        if !sysex {
            report(payload);
            return Ingress::Message(packet);
        }

        match self.sysex.push(payload) {
            Ok(None) => Ingress::SysexPending,
            Ok(Some(body)) => match Command::decode(body) {
                Ok(command) => {
                    info!("Received command: {}", command);
                    Ingress::Command(command)
                }
                Err(err) => {
                    warn!("Rejected SysEx message: {}", err);
                    Ingress::Rejected(err)
                }
            },
            Err(err) => {
                warn!("Rejected SysEx message: {}", err);
                Ingress::Rejected(err)
            }
        }
    }
}

/// Logs a channel or system message in a readable form.
fn report(payload: &[u8]) {
    match MidiMessage::from_bytes(payload) {
        Ok(MidiMessage::NoteOn(channel, note, velocity)) => {
            info!(
                "Received NoteOn: channel {}, note {}, velocity: {}",
                channel.number(),
                note.to_str(),
                u8::from(velocity)
            );
        }
        Ok(MidiMessage::NoteOff(channel, note, velocity)) => {
            info!(
                "Received NoteOff: channel {}, note {}, velocity: {}",
                channel.number(),
                note.to_str(),
                u8::from(velocity)
            );
        }
        Ok(MidiMessage::ControlChange(channel, control_function, control_value)) => {
            info!(
                "Received Control Change {} on channel {}, value: {}",
                u8::from(control_function),
                channel.number(),
                u8::from(control_value)
            );
        }
        Ok(_) => {
            info!("Received unsupported MIDI message: {=[u8]:x}", payload);
        }
        Err(_) => {
            warn!("Received malformed MIDI message: {=[u8]:x}", payload);
        }
    }
}
