//! Host uplink: length-prefixed serial framing in both directions
//!
//! Wire format per frame: `[len LSB][len MSB][payload …]`, payload byte 0
//! is an uplink tag. A declared length the receive buffer cannot hold is
//! consumed and discarded byte-for-byte so the stream stays aligned.

use heapless::Vec;

use crate::config::gateway::MAX_UPLINK_PAYLOAD;
use crate::gateway::spool::SpoolEntry;
use crate::proto::{ConfigPacket, Packet, PacketKind};

/// Uplink tag bytes
pub mod tags {
    /// Node HELLO forwarded to the host
    pub const UP_HELLO: u8 = 0xA1;
    /// Node TELEMETRY forwarded to the host
    pub const UP_TELEMETRY: u8 = 0xA2;
    /// Node CONFIG_ACK forwarded to the host
    pub const UP_CONFIG_ACK: u8 = 0xA3;
    /// Host CONFIG for one node
    pub const DOWN_CONFIG: u8 = 0xB1;
    /// Host-requested HANDSHAKE for one node
    pub const DOWN_HANDSHAKE: u8 = 0xB2;
}

/// Errors surfaced by a host port write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostPortError {
    WriteFailed,
}

/// Polled byte stream to the host computer.
///
/// Reads return whatever is buffered; writes block only up to the
/// interface's own buffering.
pub trait HostPort {
    /// True while the host side is attached and draining frames
    fn connected(&self) -> bool;

    /// Bytes currently readable
    fn available(&self) -> usize;

    /// Read up to `buf.len()` bytes, returning the count
    fn read(&mut self, buf: &mut [u8]) -> usize;

    fn write(&mut self, data: &[u8]) -> Result<(), HostPortError>;
}

/// Host-originated frame after tag dispatch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownFrame {
    /// CONFIG destined for `node_id`; the embedded header still carries
    /// whatever the host stamped and is rewritten by the router
    Config { node_id: u8, config: ConfigPacket },
    /// HANDSHAKE request for `node_id`
    Handshake { node_id: u8 },
}

/// Bidirectional framer over a [`HostPort`]
pub struct Uplink<P: HostPort> {
    port: P,
}

impl<P: HostPort> Uplink<P> {
    pub fn new(port: P) -> Self {
        Self { port }
    }

    pub fn port(&self) -> &P {
        &self.port
    }

    pub fn port_mut(&mut self) -> &mut P {
        &mut self.port
    }

    pub fn connected(&self) -> bool {
        self.port.connected()
    }

    /// Write one length-prefixed frame
    pub fn send_frame(&mut self, payload: &[u8]) -> bool {
        if payload.is_empty() {
            return false;
        }
        let len = payload.len() as u16;
        let header = [len as u8, (len >> 8) as u8];
        self.port.write(&header).is_ok() && self.port.write(payload).is_ok()
    }

    /// Forward a HELLO: `[tag][node_id][rssi][radio frame]`
    pub fn send_hello(&mut self, node_id: u8, rssi: i8, frame: &[u8]) -> bool {
        self.send_tagged(tags::UP_HELLO, node_id, rssi, None, frame)
    }

    /// Forward a CONFIG_ACK: `[tag][node_id][rssi][radio frame]`
    pub fn send_config_ack(&mut self, node_id: u8, rssi: i8, frame: &[u8]) -> bool {
        self.send_tagged(tags::UP_CONFIG_ACK, node_id, rssi, None, frame)
    }

    /// Forward telemetry with its gateway arrival timestamp:
    /// `[tag][node_id][rssi][local_ts_ms LE 4B][radio frame]`
    pub fn send_telemetry(&mut self, item: &SpoolEntry) -> bool {
        self.send_tagged(
            tags::UP_TELEMETRY,
            item.node_id,
            item.rssi,
            Some(item.local_ts_ms),
            &item.frame,
        )
    }

    fn send_tagged(
        &mut self,
        tag: u8,
        node_id: u8,
        rssi: i8,
        local_ts_ms: Option<u32>,
        frame: &[u8],
    ) -> bool {
        let mut payload: Vec<u8, MAX_UPLINK_PAYLOAD> = Vec::new();
        let ok = payload.push(tag).is_ok()
            && payload.push(node_id).is_ok()
            && payload.push(rssi as u8).is_ok()
            && match local_ts_ms {
                Some(ts) => payload.extend_from_slice(&ts.to_le_bytes()).is_ok(),
                None => true,
            }
            && payload.extend_from_slice(frame).is_ok();
        if !ok {
            return false;
        }
        self.send_frame(&payload)
    }

    /// Drain the host stream until a valid downlink frame or no data is
    /// left. Unknown tags and undersized frames are discarded.
    pub fn poll(&mut self) -> Option<DownFrame> {
        // Each round consumes at least the length header, so this ends
        while self.port.available() >= 2 {
            let Some(payload) = self.poll_frame() else {
                continue;
            };
            if payload.is_empty() {
                continue;
            }
            match payload[0] {
                tags::DOWN_CONFIG => {
                    if payload.len() < 2 + PacketKind::Config.frame_len() {
                        continue;
                    }
                    let node_id = payload[1];
                    match Packet::decode(&payload[2..]) {
                        Ok(Packet::Config(config)) => {
                            return Some(DownFrame::Config { node_id, config })
                        }
                        _ => continue,
                    }
                }
                tags::DOWN_HANDSHAKE => {
                    if payload.len() < 2 {
                        continue;
                    }
                    // Any frame body beyond the node id is advisory only
                    return Some(DownFrame::Handshake {
                        node_id: payload[1],
                    });
                }
                _ => continue,
            }
        }
        None
    }

    /// Read one length-prefixed frame if a full header is buffered.
    ///
    /// Oversized or truncated frames are consumed in full and dropped to
    /// keep the stream aligned.
    fn poll_frame(&mut self) -> Option<Vec<u8, MAX_UPLINK_PAYLOAD>> {
        if self.port.available() < 2 {
            return None;
        }
        let mut header = [0u8; 2];
        if self.port.read(&mut header) != 2 {
            return None;
        }
        let len = usize::from(u16::from_le_bytes(header));
        if len == 0 || len > MAX_UPLINK_PAYLOAD {
            self.discard(len);
            return None;
        }

        let mut payload: Vec<u8, MAX_UPLINK_PAYLOAD> = Vec::new();
        // Cannot fail: len is within capacity
        let _ = payload.resize(len, 0);
        let got = self.port.read(&mut payload);
        if got != len {
            self.discard(len - got);
            return None;
        }
        Some(payload)
    }

    fn discard(&mut self, mut remaining: usize) {
        let mut sink = [0u8; 32];
        while remaining > 0 {
            let chunk = remaining.min(sink.len());
            let got = self.port.read(&mut sink[..chunk]);
            if got == 0 {
                break; // sender stalled; do not block forever
            }
            remaining -= got;
        }
    }
}
