//! Gateway-side radio link: bounded receive FIFO and per-node peer table
//!
//! The receive callback enqueues into a bounded FIFO and learns MACs as a
//! side effect; the main loop drains it. Both sides touch the shared state
//! through one brief critical section, which also provides the ordering
//! the head/tail publication needs.

use core::cell::RefCell;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use heapless::{Deque, Vec};

use crate::config::gateway::{
    MAX_NODES, OVERFLOW_LOG_INTERVAL_MS, RX_FIFO_LEN, UNPAIRED_MAC_TTL_MS,
};
use crate::config::protocol::{MAX_FRAME_SIZE, NODE_ID_UNSET};
use crate::proto::packets::HEADER_LEN;
use crate::proto::PacketKind;
use crate::radio::{mac_is_unknown, Mac, RadioDriver, BROADCAST_MAC};

/// Router dispatch tag derived from the radio kind byte at enqueue time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RxKind {
    /// Anything the router has no policy for
    None,
    Hello,
    Telemetry,
    ConfigAck,
    Debug,
}

impl RxKind {
    fn from_kind_byte(byte: u8) -> Self {
        match PacketKind::from_byte(byte) {
            Some(PacketKind::Hello) => Self::Hello,
            Some(PacketKind::Telemetry) => Self::Telemetry,
            Some(PacketKind::ConfigAck) => Self::ConfigAck,
            Some(PacketKind::Debug) => Self::Debug,
            _ => Self::None,
        }
    }
}

/// One drained receive: header fields plus the verbatim frame
#[derive(Debug, Clone)]
pub struct RxEntry {
    pub kind: RxKind,
    pub node_id: u8,
    pub rssi: i8,
    pub frame: Vec<u8, MAX_FRAME_SIZE>,
}

#[derive(Debug, Clone, Copy, Default)]
struct NodeSlot {
    in_use: bool,
    node_id: u8,
    last_rssi: i8,
    last_seen_ms: u32,
    mac: Mac,
}

#[derive(Debug, Clone, Copy)]
struct UnassignedMac {
    mac: Mac,
    seen_ms: u32,
}

struct LinkShared {
    fifo: Deque<RxEntry, RX_FIFO_LEN>,
    nodes: [NodeSlot; MAX_NODES],
    unassigned: Option<UnassignedMac>,
    last_overflow_ms: Option<u32>,
}

/// Shared radio state between the receive callback and the main loop.
///
/// Lives in a `static` on the target so the driver glue can reach it from
/// its callback context.
pub struct GatewayRadio {
    inner: Mutex<CriticalSectionRawMutex, RefCell<LinkShared>>,
}

impl GatewayRadio {
    pub const fn new() -> Self {
        Self {
            inner: Mutex::new(RefCell::new(LinkShared {
                fifo: Deque::new(),
                nodes: [NodeSlot {
                    in_use: false,
                    node_id: 0,
                    last_rssi: 0,
                    last_seen_ms: 0,
                    mac: [0; 6],
                }; MAX_NODES],
                unassigned: None,
                last_overflow_ms: None,
            })),
        }
    }

    /// Receive callback entry point: copy the frame, learn the MAC,
    /// enqueue. Drops the arrival when the FIFO is full.
    pub fn on_receive(&self, mac: Option<&Mac>, data: &[u8], rssi: i8, now_ms: u32) {
        if data.len() < HEADER_LEN || data.len() > MAX_FRAME_SIZE {
            return;
        }

        let kind = RxKind::from_kind_byte(data[0]);
        let node_id = data[1];

        let mut frame = Vec::new();
        // Cannot fail: length checked above
        let _ = frame.extend_from_slice(data);

        self.inner.lock(|cell| {
            let mut shared = cell.borrow_mut();

            if let Some(mac) = mac {
                if node_id != NODE_ID_UNSET {
                    if let Some(slot) = shared.find_or_allocate(node_id) {
                        slot.mac = *mac;
                        slot.last_rssi = rssi;
                        slot.last_seen_ms = now_ms;
                    }
                } else {
                    // Remember where the HELLO came from so a HANDSHAKE can
                    // reach it before any id exists
                    shared.unassigned = Some(UnassignedMac {
                        mac: *mac,
                        seen_ms: now_ms,
                    });
                }
            }

            let entry = RxEntry {
                kind,
                node_id,
                rssi,
                frame,
            };
            if shared.fifo.push_back(entry).is_err() {
                let due = match shared.last_overflow_ms {
                    Some(last) => now_ms.wrapping_sub(last) > OVERFLOW_LOG_INTERVAL_MS,
                    None => true,
                };
                if due {
                    crate::debug!("gateway: rx fifo overflow, dropping frame");
                    shared.last_overflow_ms = Some(now_ms);
                }
            }
        });
    }

    /// Dequeue the oldest receive entry
    pub fn pop(&self) -> Option<RxEntry> {
        self.inner.lock(|cell| cell.borrow_mut().fifo.pop_front())
    }

    /// Destination for a frame to `node_id`: table MAC, then a fresh
    /// unassigned MAC, then broadcast. The bool reports whether the
    /// unassigned slot was used.
    pub fn resolve(&self, node_id: u8, now_ms: u32) -> (Mac, bool) {
        self.inner.lock(|cell| {
            let shared = cell.borrow();
            if let Some(slot) = shared.find(node_id) {
                if !mac_is_unknown(&slot.mac) {
                    return (slot.mac, false);
                }
            }
            if node_id != NODE_ID_UNSET {
                if let Some(unassigned) = shared.unassigned {
                    if now_ms.wrapping_sub(unassigned.seen_ms) <= UNPAIRED_MAC_TTL_MS {
                        return (unassigned.mac, true);
                    }
                }
            }
            (BROADCAST_MAC, false)
        })
    }

    /// Bind `mac` to `node_id` and retire the unassigned slot; called after
    /// a send through that MAC succeeded
    pub fn promote(&self, node_id: u8, mac: &Mac) {
        self.inner.lock(|cell| {
            let mut shared = cell.borrow_mut();
            if let Some(slot) = shared.find_or_allocate(node_id) {
                slot.mac = *mac;
            }
            shared.unassigned = None;
        });
    }

    /// Table MAC for a node, if one is known
    pub fn node_mac(&self, node_id: u8) -> Option<Mac> {
        self.inner.lock(|cell| {
            cell.borrow().find(node_id).map(|slot| slot.mac)
        })
    }

    /// True while the unassigned slot holds a MAC
    pub fn has_unassigned(&self) -> bool {
        self.inner.lock(|cell| cell.borrow().unassigned.is_some())
    }
}

impl Default for GatewayRadio {
    fn default() -> Self {
        Self::new()
    }
}

impl LinkShared {
    fn find(&self, node_id: u8) -> Option<&NodeSlot> {
        self.nodes
            .iter()
            .find(|slot| slot.in_use && slot.node_id == node_id)
    }

    fn find_or_allocate(&mut self, node_id: u8) -> Option<&mut NodeSlot> {
        let existing = self
            .nodes
            .iter()
            .position(|slot| slot.in_use && slot.node_id == node_id);
        let index = match existing {
            Some(index) => index,
            None => {
                let free = self.nodes.iter().position(|slot| !slot.in_use)?;
                self.nodes[free] = NodeSlot {
                    in_use: true,
                    node_id,
                    last_rssi: 0,
                    last_seen_ms: 0,
                    mac: [0xFF; 6],
                };
                free
            }
        };
        Some(&mut self.nodes[index])
    }
}

/// Transmit path: resolves node ids to MACs through the shared state
pub struct GatewayLink<'s, R: RadioDriver> {
    radio: &'s GatewayRadio,
    driver: R,
}

impl<'s, R: RadioDriver> GatewayLink<'s, R> {
    pub fn new(driver: R, radio: &'s GatewayRadio) -> Self {
        Self { radio, driver }
    }

    pub fn radio(&self) -> &GatewayRadio {
        self.radio
    }

    /// Access the underlying driver (mock inspection in tests)
    pub fn driver(&self) -> &R {
        &self.driver
    }

    /// Best-effort send to a node; promotes the unassigned MAC into the
    /// node table when a send through it succeeds
    pub fn send_to_node(&mut self, node_id: u8, frame: &[u8], now_ms: u32) -> bool {
        if frame.is_empty() || frame.len() > MAX_FRAME_SIZE {
            return false;
        }
        let (dest, used_unassigned) = self.radio.resolve(node_id, now_ms);
        let sent = self.driver.send(&dest, frame).is_ok();
        if !sent {
            crate::debug!("gateway: send to node {} failed", node_id);
        }
        if sent && used_unassigned {
            self.radio.promote(node_id, &dest);
        }
        sent
    }
}
