//! Persistence adapter for node status and configuration
//!
//! Two namespaces, one store instance each. Reads fall back to the prior
//! in-memory value so a missing key never clobbers known state; the store
//! is transactional per key, so a failed write leaves the old value behind.

use crate::node::settings::{NodeConfig, RuntimeStatus};
use crate::platform::ResetCause;
use crate::proto::BatteryBucket;
use crate::storage::KvStore;

/// Loads and saves the node's runtime status and configuration
pub struct NodePersistence<S: KvStore> {
    status_store: S,
    config_store: S,
}

impl<S: KvStore> NodePersistence<S> {
    /// `status_store` is the "rsn_status" namespace, `config_store` the
    /// "rsn_config" namespace
    pub fn new(status_store: S, config_store: S) -> Self {
        Self {
            status_store,
            config_store,
        }
    }

    /// Overlay persisted status fields onto `status`
    pub fn load_status(&self, status: &mut RuntimeStatus) {
        let s = &self.status_store;
        status.node_id = s.get_u8("node_id", status.node_id);
        status.config_valid = s.get_bool("cfg_valid", status.config_valid);
        status.debug_mode = s.get_bool("debug_mode", status.debug_mode);
        status.low_batt = s.get_bool("low_batt", status.low_batt);
        status.lost_rx = s.get_bool("lost_rx", status.lost_rx);
        status.waiting_handshake = s.get_bool("wait_hs", status.waiting_handshake);
        status.waiting_config = s.get_bool("wait_cfg", status.waiting_config);
        status.last_reset_cause =
            ResetCause::from_byte(s.get_u8("rst_cause", status.last_reset_cause.as_byte()));
        status.rx_failed = s.get_u16("rx_failed", status.rx_failed);
        status.cycle_count = s.get_u32("cycle_cnt", status.cycle_count);
    }

    pub fn save_status(&mut self, status: &RuntimeStatus) {
        let s = &mut self.status_store;
        s.put_u8("node_id", status.node_id);
        s.put_bool("cfg_valid", status.config_valid);
        s.put_bool("debug_mode", status.debug_mode);
        s.put_bool("low_batt", status.low_batt);
        s.put_bool("lost_rx", status.lost_rx);
        s.put_bool("wait_hs", status.waiting_handshake);
        s.put_bool("wait_cfg", status.waiting_config);
        s.put_u8("rst_cause", status.last_reset_cause.as_byte());
        s.put_u16("rx_failed", status.rx_failed);
        s.put_u32("cycle_cnt", status.cycle_count);
    }

    /// Overlay persisted config fields onto `config`, then sanitize
    pub fn load_config(&self, config: &mut NodeConfig) {
        let s = &self.config_store;
        config.sleep_s = s.get_u16("sleep_s", config.sleep_s);
        config.power_up_ms = s.get_u16("pwr_ms", config.power_up_ms);
        config.settle_ms = s.get_u16("settle_ms", config.settle_ms);
        config.sample_interval_ms = s.get_u16("samp_ms", config.sample_interval_ms);
        config.led_mode = s.get_u8("led_mode", config.led_mode);
        config.battery_bucket =
            BatteryBucket::from_byte(s.get_u8("batt_bucket", config.battery_bucket as u8));
        config.lost_rx_limit = s.get_u8("lost_rx_lim", config.lost_rx_limit);
        config.debug_mode = s.get_u8("dbg_mode", config.debug_mode as u8) != 0;
        config.reset_flags = s.get_u8("rst_flags", config.reset_flags);
        *config = config.sanitized();
    }

    pub fn save_config(&mut self, config: &NodeConfig) {
        let s = &mut self.config_store;
        s.put_u16("sleep_s", config.sleep_s);
        s.put_u16("pwr_ms", config.power_up_ms);
        s.put_u16("settle_ms", config.settle_ms);
        s.put_u16("samp_ms", config.sample_interval_ms);
        s.put_u8("led_mode", config.led_mode);
        s.put_u8("batt_bucket", config.battery_bucket as u8);
        s.put_u8("lost_rx_lim", config.lost_rx_limit);
        s.put_u8("dbg_mode", config.debug_mode as u8);
        s.put_u8("rst_flags", config.reset_flags);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::mock::MemStore;

    #[test]
    fn test_status_round_trip() {
        let mut persist = NodePersistence::new(MemStore::new(), MemStore::new());
        let status = RuntimeStatus {
            node_id: 7,
            config_valid: true,
            debug_mode: false,
            low_batt: true,
            lost_rx: false,
            waiting_handshake: false,
            waiting_config: true,
            last_reset_cause: ResetCause::Watchdog,
            rx_failed: 2,
            cycle_count: 41,
        };
        persist.save_status(&status);

        let mut loaded = RuntimeStatus::default();
        persist.load_status(&mut loaded);
        assert_eq!(loaded, status);
    }

    #[test]
    fn test_config_round_trip_is_sanitized() {
        let mut persist = NodePersistence::new(MemStore::new(), MemStore::new());
        let config = NodeConfig {
            sleep_s: 600,
            ..NodeConfig::default()
        };
        persist.save_config(&config);

        let mut loaded = NodeConfig::default();
        persist.load_config(&mut loaded);
        assert_eq!(loaded, config);
        assert!(loaded.sleep_s >= 1 && loaded.sleep_s <= 36_000);
        assert!(loaded.power_up_ms > 0);
        assert!(loaded.settle_ms > 0);
        assert!(loaded.sample_interval_ms > 0);
    }

    #[test]
    fn test_empty_store_keeps_in_memory_values() {
        let persist = NodePersistence::new(MemStore::new(), MemStore::new());
        let mut status = RuntimeStatus {
            node_id: 9,
            rx_failed: 3,
            ..RuntimeStatus::default()
        };
        persist.load_status(&mut status);
        assert_eq!(status.node_id, 9);
        assert_eq!(status.rx_failed, 3);
    }
}
