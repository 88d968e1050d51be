//! Per-node CONFIG persistence on the gateway
//!
//! Stores the raw 18-byte CONFIG frame under `cfgNN` (zero-padded decimal
//! node id) so the host's last configuration survives a gateway restart.

use core::fmt::Write;

use heapless::String;

use crate::proto::{ConfigPacket, Packet, PacketKind};
use crate::storage::KvStore;

/// CONFIG store over the `tgw_cfg` namespace
pub struct ConfigStore<S: KvStore> {
    store: S,
}

impl<S: KvStore> ConfigStore<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    fn key(node_id: u8) -> String<8> {
        let mut key = String::new();
        // Cannot fail: "cfg255" fits
        let _ = write!(key, "cfg{:02}", node_id);
        key
    }

    pub fn save(&mut self, node_id: u8, config: &ConfigPacket) -> bool {
        let frame = match Packet::Config(*config).encode() {
            Ok(frame) => frame,
            Err(_) => return false,
        };
        self.store.put_bytes(&Self::key(node_id), &frame)
    }

    /// Load the stored CONFIG; size mismatches are treated as missing
    pub fn load(&self, node_id: u8) -> Option<ConfigPacket> {
        let key = Self::key(node_id);
        if self.store.bytes_len(&key) != PacketKind::Config.frame_len() {
            return None;
        }
        let mut frame = [0u8; 18];
        self.store.get_bytes(&key, &mut frame)?;
        match Packet::decode(&frame) {
            Ok(Packet::Config(config)) => Some(config),
            _ => None,
        }
    }
}
