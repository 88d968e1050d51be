//! Node configuration and runtime status

use crate::config::{node_defaults, protocol};
use crate::platform::ResetCause;
use crate::proto::{flags, BatteryBucket, ConfigPacket, Header};

/// Operating parameters, pushed by the gateway and persisted locally
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeConfig {
    pub sleep_s: u16,
    pub power_up_ms: u16,
    pub settle_ms: u16,
    pub sample_interval_ms: u16,
    /// Reserved; persisted but never consulted
    pub led_mode: u8,
    pub battery_bucket: BatteryBucket,
    pub lost_rx_limit: u8,
    pub debug_mode: bool,
    /// Reserved; carried and persisted verbatim
    pub reset_flags: u8,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            sleep_s: 0,
            power_up_ms: 0,
            settle_ms: 0,
            sample_interval_ms: 0,
            led_mode: 0,
            battery_bucket: BatteryBucket::Med,
            lost_rx_limit: 0,
            debug_mode: false,
            reset_flags: 0,
        }
        .sanitized()
    }
}

impl NodeConfig {
    /// Clamp every duration into its safe range; zero fields fall back to
    /// their defaults
    pub fn sanitized(mut self) -> Self {
        if self.sleep_s == 0 {
            self.sleep_s = node_defaults::SLEEP_S;
        }
        if self.sleep_s > node_defaults::MAX_SLEEP_S {
            self.sleep_s = node_defaults::MAX_SLEEP_S;
        }
        if self.power_up_ms == 0 {
            self.power_up_ms = node_defaults::POWER_UP_MS;
        }
        if self.settle_ms == 0 {
            self.settle_ms = node_defaults::SETTLE_MS;
        }
        if self.sample_interval_ms == 0 {
            self.sample_interval_ms = node_defaults::SAMPLE_INTERVAL_MS;
        }
        if self.lost_rx_limit == 0 {
            self.lost_rx_limit = node_defaults::LOST_RX_LIMIT;
        }
        self
    }

    /// Adopt the tunable fields of a CONFIG packet (header excluded)
    pub fn from_packet(packet: &ConfigPacket) -> Self {
        Self {
            sleep_s: packet.sleep_s,
            power_up_ms: packet.power_up_ms,
            settle_ms: packet.settle_ms,
            sample_interval_ms: packet.sample_interval_ms,
            led_mode: packet.led_mode,
            battery_bucket: BatteryBucket::from_byte(packet.battery_bucket),
            lost_rx_limit: packet.lost_rx_limit,
            debug_mode: packet.debug_mode != 0,
            reset_flags: packet.reset_flags,
        }
    }

    /// Wire form with a caller-provided header
    pub fn to_packet(&self, header: Header) -> ConfigPacket {
        ConfigPacket {
            header,
            sleep_s: self.sleep_s,
            power_up_ms: self.power_up_ms,
            settle_ms: self.settle_ms,
            sample_interval_ms: self.sample_interval_ms,
            led_mode: self.led_mode,
            battery_bucket: self.battery_bucket as u8,
            lost_rx_limit: self.lost_rx_limit,
            debug_mode: self.debug_mode as u8,
            reset_flags: self.reset_flags,
        }
    }
}

/// Flags and counters persisted across deep sleep
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RuntimeStatus {
    /// Id assigned by the gateway, 0 until paired
    pub node_id: u8,
    pub config_valid: bool,
    pub debug_mode: bool,
    pub low_batt: bool,
    pub lost_rx: bool,
    pub waiting_handshake: bool,
    pub waiting_config: bool,
    pub last_reset_cause: ResetCause,
    /// Cumulative RX/ACK failures
    pub rx_failed: u16,
    pub cycle_count: u32,
}

impl RuntimeStatus {
    /// True once pairing and configuration both completed
    pub fn is_configured(&self) -> bool {
        self.config_valid && self.node_id != protocol::NODE_ID_UNSET
    }

    /// Flag byte for the next TELEMETRY packet
    pub fn telemetry_flags(&self) -> u8 {
        let mut value = 0;
        if self.low_batt {
            value |= flags::LOW_BATT;
        }
        if self.lost_rx {
            value |= flags::LOST_RX;
        }
        if self.debug_mode {
            value |= flags::DEBUG_MODE;
        }
        match self.last_reset_cause {
            ResetCause::Watchdog => value |= flags::WATCHDOG_RESET,
            ResetCause::Brownout => value |= flags::BROWNOUT_RESET,
            _ => {}
        }
        if self.cycle_count == 0 {
            value |= flags::FIRST_BOOT;
        }
        value
    }
}
