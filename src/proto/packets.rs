//! Packet definitions and explicit byte-offset serialisation
//!
//! # Wire format
//!
//! Every frame starts with a 5-byte header:
//! ```text
//! [kind: u8][node_id: u8][mode: u8][hw_version: u8][fw_version: u8]
//! ```
//!
//! All multi-byte integers are little-endian and structures are tightly
//! packed. Each kind has a fixed frame size; decoding tolerates trailing
//! bytes but never a short buffer. Explicit offsets are used instead of
//! reinterpreting native structs, so the layout holds on any target.

use crate::config::protocol::MAX_FRAME_SIZE;
use heapless::Vec;

/// Size of the common header in bytes
pub const HEADER_LEN: usize = 5;

/// Errors returned by [`Packet::decode`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    /// Buffer is smaller than the declared kind's fixed size
    TooShort,
    /// Kind tag is outside the enumerated set
    UnknownKind,
}

/// Errors returned by [`Packet::encode`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodeError {
    /// Frame would exceed [`MAX_FRAME_SIZE`]
    Overflow,
}

/// Packet kind tag, the first byte of every frame
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketKind {
    Hello = 0x01,
    Handshake = 0x02,
    Telemetry = 0x03,
    Config = 0x04,
    ConfigAck = 0x05,
    Debug = 0x06,
}

impl PacketKind {
    /// Try to convert a tag byte to a kind
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x01 => Some(Self::Hello),
            0x02 => Some(Self::Handshake),
            0x03 => Some(Self::Telemetry),
            0x04 => Some(Self::Config),
            0x05 => Some(Self::ConfigAck),
            0x06 => Some(Self::Debug),
            _ => None,
        }
    }

    /// Fixed frame size for this kind, header included
    pub fn frame_len(self) -> usize {
        match self {
            Self::Hello => HEADER_LEN + 2,
            Self::Handshake => HEADER_LEN,
            Self::Telemetry => HEADER_LEN + 41,
            Self::Config => HEADER_LEN + 13,
            Self::ConfigAck => HEADER_LEN + 1,
            Self::Debug => HEADER_LEN + 35,
        }
    }
}

/// Operating mode tag carried in every header
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    #[default]
    Running = 0,
    Pairing = 1,
    Debug = 2,
}

impl Mode {
    /// Map a mode byte; unrecognised values fall back to Running
    pub fn from_byte(byte: u8) -> Self {
        match byte {
            1 => Self::Pairing,
            2 => Self::Debug,
            _ => Self::Running,
        }
    }
}

/// Coarse battery state-of-charge class supplied by the gateway
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BatteryBucket {
    Low = 0,
    #[default]
    Med = 1,
    High = 2,
}

impl BatteryBucket {
    /// Map a bucket byte; unrecognised values fall back to Med
    pub fn from_byte(byte: u8) -> Self {
        match byte {
            0 => Self::Low,
            2 => Self::High,
            _ => Self::Med,
        }
    }
}

/// Common header prepended to every frame (kind tag excluded)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Header {
    /// Node id, 0 while unassigned
    pub node_id: u8,
    pub mode: Mode,
    pub hw_version: u8,
    pub fw_version: u8,
}

impl Header {
    /// Header with this firmware's version constants
    pub fn new(node_id: u8, mode: Mode) -> Self {
        Self {
            node_id,
            mode,
            hw_version: crate::config::protocol::HW_VERSION,
            fw_version: crate::config::protocol::FW_VERSION,
        }
    }

    fn write(&self, kind: PacketKind, out: &mut Vec<u8, MAX_FRAME_SIZE>) -> Result<(), EncodeError> {
        out.push(kind as u8).map_err(|_| EncodeError::Overflow)?;
        out.push(self.node_id).map_err(|_| EncodeError::Overflow)?;
        out.push(self.mode as u8).map_err(|_| EncodeError::Overflow)?;
        out.push(self.hw_version).map_err(|_| EncodeError::Overflow)?;
        out.push(self.fw_version).map_err(|_| EncodeError::Overflow)?;
        Ok(())
    }

    fn read(buf: &[u8]) -> Self {
        Self {
            node_id: buf[1],
            mode: Mode::from_byte(buf[2]),
            hw_version: buf[3],
            fw_version: buf[4],
        }
    }
}

/// Five wire statistics for one ADC channel, in transmission order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChannelStats {
    pub mean: u16,
    pub median: u16,
    pub min: u16,
    pub max: u16,
    pub stddev: u16,
}

impl ChannelStats {
    fn write(&self, out: &mut Vec<u8, MAX_FRAME_SIZE>) -> Result<(), EncodeError> {
        for v in [self.mean, self.median, self.min, self.max, self.stddev] {
            out.extend_from_slice(&v.to_le_bytes())
                .map_err(|_| EncodeError::Overflow)?;
        }
        Ok(())
    }

    fn read(buf: &[u8]) -> Self {
        let word = |i: usize| u16::from_le_bytes([buf[i], buf[i + 1]]);
        Self {
            mean: word(0),
            median: word(2),
            min: word(4),
            max: word(6),
            stddev: word(8),
        }
    }
}

/// HELLO: broadcast by an unpaired node, advertises capabilities
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HelloPacket {
    pub header: Header,
    pub capabilities: u16,
}

/// HANDSHAKE: the header's node_id carries the assignment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandshakePacket {
    pub header: Header,
}

/// CONFIG: operating parameters pushed from the gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConfigPacket {
    pub header: Header,
    pub sleep_s: u16,
    pub power_up_ms: u16,
    pub settle_ms: u16,
    pub sample_interval_ms: u16,
    pub led_mode: u8,
    pub battery_bucket: u8,
    pub lost_rx_limit: u8,
    pub debug_mode: u8,
    pub reset_flags: u8,
}

/// CONFIG_ACK: status 0 means the config was applied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfigAckPacket {
    pub header: Header,
    pub status: u8,
}

/// TELEMETRY: one measurement cycle, raw ADC statistics only
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TelemetryPacket {
    pub header: Header,
    pub cycle: u32,
    pub timestamp_ms: u32,
    pub battery_bucket: u8,
    pub flags: u8,
    pub soil: ChannelStats,
    pub vbat: ChannelStats,
    pub ntc: ChannelStats,
    /// Always 0x7F; carried for layout compatibility only
    pub last_rssi: i8,
}

/// DEBUG: raw soil samples plus the RX failure counter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DebugPacket {
    pub header: Header,
    pub rx_failed: u16,
    pub soil_count: u8,
    pub soil_raw: [u16; crate::config::adc::MAX_SAMPLES],
}

/// Decoded frame of any kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Packet {
    Hello(HelloPacket),
    Handshake(HandshakePacket),
    Telemetry(TelemetryPacket),
    Config(ConfigPacket),
    ConfigAck(ConfigAckPacket),
    Debug(DebugPacket),
}

impl Packet {
    /// Kind tag of this packet
    pub fn kind(&self) -> PacketKind {
        match self {
            Packet::Hello(_) => PacketKind::Hello,
            Packet::Handshake(_) => PacketKind::Handshake,
            Packet::Telemetry(_) => PacketKind::Telemetry,
            Packet::Config(_) => PacketKind::Config,
            Packet::ConfigAck(_) => PacketKind::ConfigAck,
            Packet::Debug(_) => PacketKind::Debug,
        }
    }

    /// Serialise to the fixed wire layout of this kind
    pub fn encode(&self) -> Result<Vec<u8, MAX_FRAME_SIZE>, EncodeError> {
        let mut out: Vec<u8, MAX_FRAME_SIZE> = Vec::new();
        let push = |out: &mut Vec<u8, MAX_FRAME_SIZE>, b: u8| {
            out.push(b).map_err(|_| EncodeError::Overflow)
        };
        let extend = |out: &mut Vec<u8, MAX_FRAME_SIZE>, s: &[u8]| {
            out.extend_from_slice(s).map_err(|_| EncodeError::Overflow)
        };

        match self {
            Packet::Hello(p) => {
                p.header.write(PacketKind::Hello, &mut out)?;
                extend(&mut out, &p.capabilities.to_le_bytes())?;
            }
            Packet::Handshake(p) => {
                p.header.write(PacketKind::Handshake, &mut out)?;
            }
            Packet::Telemetry(p) => {
                p.header.write(PacketKind::Telemetry, &mut out)?;
                extend(&mut out, &p.cycle.to_le_bytes())?;
                extend(&mut out, &p.timestamp_ms.to_le_bytes())?;
                push(&mut out, p.battery_bucket)?;
                push(&mut out, p.flags)?;
                p.soil.write(&mut out)?;
                p.vbat.write(&mut out)?;
                p.ntc.write(&mut out)?;
                push(&mut out, p.last_rssi as u8)?;
            }
            Packet::Config(p) => {
                p.header.write(PacketKind::Config, &mut out)?;
                extend(&mut out, &p.sleep_s.to_le_bytes())?;
                extend(&mut out, &p.power_up_ms.to_le_bytes())?;
                extend(&mut out, &p.settle_ms.to_le_bytes())?;
                extend(&mut out, &p.sample_interval_ms.to_le_bytes())?;
                push(&mut out, p.led_mode)?;
                push(&mut out, p.battery_bucket)?;
                push(&mut out, p.lost_rx_limit)?;
                push(&mut out, p.debug_mode)?;
                push(&mut out, p.reset_flags)?;
            }
            Packet::ConfigAck(p) => {
                p.header.write(PacketKind::ConfigAck, &mut out)?;
                push(&mut out, p.status)?;
            }
            Packet::Debug(p) => {
                p.header.write(PacketKind::Debug, &mut out)?;
                extend(&mut out, &p.rx_failed.to_le_bytes())?;
                push(&mut out, p.soil_count)?;
                for sample in &p.soil_raw {
                    extend(&mut out, &sample.to_le_bytes())?;
                }
            }
        }

        debug_assert_eq!(out.len(), self.kind().frame_len());
        Ok(out)
    }

    /// Parse a frame; trailing bytes beyond the kind's fixed size are ignored
    pub fn decode(buf: &[u8]) -> Result<Packet, DecodeError> {
        if buf.is_empty() {
            return Err(DecodeError::TooShort);
        }
        let kind = PacketKind::from_byte(buf[0]).ok_or(DecodeError::UnknownKind)?;
        if buf.len() < kind.frame_len() {
            return Err(DecodeError::TooShort);
        }

        let header = Header::read(buf);
        let body = &buf[HEADER_LEN..];
        let word = |i: usize| u16::from_le_bytes([body[i], body[i + 1]]);

        let packet = match kind {
            PacketKind::Hello => Packet::Hello(HelloPacket {
                header,
                capabilities: word(0),
            }),
            PacketKind::Handshake => Packet::Handshake(HandshakePacket { header }),
            PacketKind::Telemetry => Packet::Telemetry(TelemetryPacket {
                header,
                cycle: u32::from_le_bytes([body[0], body[1], body[2], body[3]]),
                timestamp_ms: u32::from_le_bytes([body[4], body[5], body[6], body[7]]),
                battery_bucket: body[8],
                flags: body[9],
                soil: ChannelStats::read(&body[10..20]),
                vbat: ChannelStats::read(&body[20..30]),
                ntc: ChannelStats::read(&body[30..40]),
                last_rssi: body[40] as i8,
            }),
            PacketKind::Config => Packet::Config(ConfigPacket {
                header,
                sleep_s: word(0),
                power_up_ms: word(2),
                settle_ms: word(4),
                sample_interval_ms: word(6),
                led_mode: body[8],
                battery_bucket: body[9],
                lost_rx_limit: body[10],
                debug_mode: body[11],
                reset_flags: body[12],
            }),
            PacketKind::ConfigAck => Packet::ConfigAck(ConfigAckPacket {
                header,
                status: body[0],
            }),
            PacketKind::Debug => {
                let mut soil_raw = [0u16; crate::config::adc::MAX_SAMPLES];
                for (i, sample) in soil_raw.iter_mut().enumerate() {
                    *sample = word(3 + i * 2);
                }
                Packet::Debug(DebugPacket {
                    header,
                    rx_failed: word(0),
                    soil_count: body[2],
                    soil_raw,
                })
            }
        };
        Ok(packet)
    }
}
