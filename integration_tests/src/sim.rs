//! Simulated drivers implementing the firmware's hardware traits.
//!
//! Everything runs in-process: the radio records outbound frames into a
//! shared queue the world pump drains, and the clock is a cell both sides
//! share.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

use soilnet_firmware::gateway::uplink::{HostPort, HostPortError};
use soilnet_firmware::platform::{Clock, DisplaySummary, StatusDisplay, StatusLed};
use soilnet_firmware::radio::{Mac, RadioDriver, RadioError};
use soilnet_firmware::sensors::{AnalogFrontEnd, SensorChannel};
use soilnet_firmware::storage::KvStore;

/// Outbound radio frame waiting for the pump
#[derive(Debug, Clone)]
pub struct AirFrame {
    pub dest: Mac,
    pub data: Vec<u8>,
}

pub type AirQueue = Rc<RefCell<VecDeque<AirFrame>>>;

pub fn air_queue() -> AirQueue {
    Rc::new(RefCell::new(VecDeque::new()))
}

/// Radio driver that parks frames on a shared queue
pub struct SimRadio {
    outbound: AirQueue,
}

impl SimRadio {
    pub fn new(outbound: AirQueue) -> Self {
        Self { outbound }
    }
}

impl RadioDriver for SimRadio {
    fn send(&mut self, dest: &Mac, frame: &[u8]) -> Result<(), RadioError> {
        self.outbound.borrow_mut().push_back(AirFrame {
            dest: *dest,
            data: frame.to_vec(),
        });
        Ok(())
    }
}

/// Millisecond clock shared by both devices
#[derive(Clone)]
pub struct SimClock {
    now: Rc<Cell<u32>>,
}

impl SimClock {
    pub fn new() -> Self {
        Self {
            now: Rc::new(Cell::new(0)),
        }
    }

    pub fn advance(&self, ms: u32) {
        self.now.set(self.now.get().wrapping_add(ms));
    }
}

impl Clock for SimClock {
    fn now_ms(&self) -> u32 {
        self.now.get()
    }

    fn delay_ms(&mut self, ms: u32) {
        self.advance(ms);
    }
}

/// HashMap key-value store, one per namespace; survives simulated reboots
#[derive(Default)]
pub struct MemKv {
    entries: std::collections::HashMap<String, Vec<u8>>,
}

impl MemKv {
    pub fn new() -> Self {
        Self::default()
    }

    fn get_raw<const N: usize>(&self, key: &str) -> Option<[u8; N]> {
        self.entries.get(key)?.as_slice().try_into().ok()
    }
}

impl KvStore for MemKv {
    fn get_u8(&self, key: &str, default: u8) -> u8 {
        self.get_raw::<1>(key).map(|b| b[0]).unwrap_or(default)
    }

    fn put_u8(&mut self, key: &str, value: u8) {
        self.entries.insert(key.into(), vec![value]);
    }

    fn get_u16(&self, key: &str, default: u16) -> u16 {
        self.get_raw::<2>(key)
            .map(u16::from_le_bytes)
            .unwrap_or(default)
    }

    fn put_u16(&mut self, key: &str, value: u16) {
        self.entries.insert(key.into(), value.to_le_bytes().to_vec());
    }

    fn get_u32(&self, key: &str, default: u32) -> u32 {
        self.get_raw::<4>(key)
            .map(u32::from_le_bytes)
            .unwrap_or(default)
    }

    fn put_u32(&mut self, key: &str, value: u32) {
        self.entries.insert(key.into(), value.to_le_bytes().to_vec());
    }

    fn get_bool(&self, key: &str, default: bool) -> bool {
        self.get_raw::<1>(key).map(|b| b[0] != 0).unwrap_or(default)
    }

    fn put_bool(&mut self, key: &str, value: bool) {
        self.entries.insert(key.into(), vec![value as u8]);
    }

    fn get_bytes(&self, key: &str, out: &mut [u8]) -> Option<usize> {
        let bytes = self.entries.get(key)?;
        if bytes.len() > out.len() {
            return None;
        }
        out[..bytes.len()].copy_from_slice(bytes);
        Some(bytes.len())
    }

    fn put_bytes(&mut self, key: &str, data: &[u8]) -> bool {
        self.entries.insert(key.into(), data.to_vec());
        true
    }

    fn bytes_len(&self, key: &str) -> usize {
        self.entries.get(key).map(Vec::len).unwrap_or(0)
    }
}

/// Analog front-end returning stable mid-scale readings per channel
#[derive(Default)]
pub struct SimFrontEnd {
    powered: [bool; 3],
}

impl SimFrontEnd {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(channel: SensorChannel) -> usize {
        match channel {
            SensorChannel::Soil => 0,
            SensorChannel::Vbat => 1,
            SensorChannel::Ntc => 2,
        }
    }
}

impl AnalogFrontEnd for SimFrontEnd {
    fn energize(&mut self, channel: SensorChannel) {
        self.powered[Self::slot(channel)] = true;
    }

    fn de_energize(&mut self, channel: SensorChannel) {
        self.powered[Self::slot(channel)] = false;
    }

    fn read_raw(&mut self, channel: SensorChannel) -> u16 {
        match channel {
            SensorChannel::Soil => 1500,
            SensorChannel::Vbat => 2800,
            SensorChannel::Ntc => 1200,
        }
    }
}

/// LED sink; the harness only cares that calls do not panic
#[derive(Default)]
pub struct SimLed;

impl SimLed {
    pub fn new() -> Self {
        Self
    }
}

impl StatusLed for SimLed {
    fn set(&mut self, _red: bool, _green: bool, _blue: bool) {}
}

/// Display sink recording the last status line
#[derive(Default)]
pub struct SimDisplay {
    pub last_status: Option<(String, String)>,
    pub summaries: usize,
}

impl SimDisplay {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StatusDisplay for SimDisplay {
    fn status(&mut self, line1: &str, line2: &str) {
        self.last_status = Some((line1.into(), line2.into()));
    }

    fn summary(&mut self, _summary: &DisplaySummary) {
        self.summaries += 1;
    }
}

/// Byte-stream host port with a toggleable connection flag
pub struct SimHostPort {
    pub rx: VecDeque<u8>,
    pub tx: Vec<u8>,
    pub connected: bool,
}

impl SimHostPort {
    pub fn new() -> Self {
        Self {
            rx: VecDeque::new(),
            tx: Vec::new(),
            connected: true,
        }
    }

    /// Queue a framed payload as the host software would send it
    pub fn queue_frame(&mut self, payload: &[u8]) {
        let len = payload.len() as u16;
        self.rx.push_back(len as u8);
        self.rx.push_back((len >> 8) as u8);
        self.rx.extend(payload.iter().copied());
    }

    /// Split everything written so far back into framed payloads
    pub fn written_frames(&self) -> Vec<Vec<u8>> {
        let mut frames = Vec::new();
        let mut rest = self.tx.as_slice();
        while rest.len() >= 2 {
            let len = usize::from(u16::from_le_bytes([rest[0], rest[1]]));
            if rest.len() < 2 + len {
                break;
            }
            frames.push(rest[2..2 + len].to_vec());
            rest = &rest[2 + len..];
        }
        frames
    }
}

impl HostPort for SimHostPort {
    fn connected(&self) -> bool {
        self.connected
    }

    fn available(&self) -> usize {
        self.rx.len()
    }

    fn read(&mut self, buf: &mut [u8]) -> usize {
        let mut count = 0;
        while count < buf.len() {
            match self.rx.pop_front() {
                Some(byte) => {
                    buf[count] = byte;
                    count += 1;
                }
                None => break,
            }
        }
        count
    }

    fn write(&mut self, data: &[u8]) -> Result<(), HostPortError> {
        self.tx.extend_from_slice(data);
        Ok(())
    }
}
