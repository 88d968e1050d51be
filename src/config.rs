//! Configuration constants shared by the node and the gateway

/// Protocol constants
pub mod protocol {
    /// Maximum radio frame size in bytes
    pub const MAX_FRAME_SIZE: usize = 128;

    /// Hardware version reported in every header
    pub const HW_VERSION: u8 = 1;

    /// Firmware version reported in every header
    pub const FW_VERSION: u8 = 1;

    /// node_id value meaning "not yet assigned"
    pub const NODE_ID_UNSET: u8 = 0;
}

/// Capability bits advertised in the HELLO packet
pub mod capabilities {
    pub const SOIL: u16 = 1 << 0;
    pub const VBAT: u16 = 1 << 1;
    pub const NTC: u16 = 1 << 2;
    pub const RGB: u16 = 1 << 3;

    /// Everything this board supports
    pub const ALL: u16 = SOIL | VBAT | NTC | RGB;
}

/// Node defaults applied when a config field is zero or missing
pub mod node_defaults {
    /// Short default sleep to speed up pairing on a fresh node
    pub const SLEEP_S: u16 = 3;
    pub const POWER_UP_MS: u16 = 100;
    pub const SETTLE_MS: u16 = 150;
    pub const SAMPLE_INTERVAL_MS: u16 = 50;
    pub const LOST_RX_LIMIT: u8 = 3;

    /// Upper bound accepted for a configured sleep time (10 hours)
    pub const MAX_SLEEP_S: u16 = 36000;
}

/// ADC burst sampling limits
pub mod adc {
    /// Samples taken per burst when the config does not say otherwise
    pub const DEFAULT_NUM_SAMPLES: u8 = 4;

    /// Static sample buffer size; bursts are capped here
    pub const MAX_SAMPLES: usize = 16;
}

/// Node timing constants
pub mod node_timing {
    /// How long the node waits for a HANDSHAKE after each HELLO
    pub const PAIRING_WAIT_MS: u32 = 4000;

    /// Response window after telemetry while a CONFIG is outstanding
    pub const RESPONSE_WINDOW_MS: u32 = 4000;

    /// HELLO broadcasts per wake before giving up and sleeping
    pub const MAX_HELLO_ATTEMPTS: u8 = 3;
}

/// Gateway sizing and timing constants
pub mod gateway {
    /// Node table capacity
    pub const MAX_NODES: usize = 8;

    /// Radio receive FIFO capacity
    pub const RX_FIFO_LEN: usize = 16;

    /// Telemetry spool capacity
    pub const SPOOL_LEN: usize = 32;

    /// How long a MAC heard from an unassigned node stays routable
    pub const UNPAIRED_MAC_TTL_MS: u32 = 8000;

    /// Minimum interval between FIFO overflow log lines
    pub const OVERFLOW_LOG_INTERVAL_MS: u32 = 500;

    /// Minimum interval between telemetry display refreshes
    pub const DISPLAY_REFRESH_MS: u32 = 1000;

    /// Largest uplink payload: a radio frame plus the uplink prefix
    pub const MAX_UPLINK_PAYLOAD: usize = super::protocol::MAX_FRAME_SIZE + 8;
}
