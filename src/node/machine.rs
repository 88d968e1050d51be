//! Node duty-cycle state machine
//!
//! One wake runs Boot → CheckConfig and then either the pairing phase or
//! one measure/transmit/receive pass, ending in deep sleep. Handlers are
//! synchronous and return the next state promptly; the only blocking waits
//! are the sensor delays inside the measurement burst. Timeouts are
//! measured from state entry against the monotonic clock.

use core::mem;

use crate::config::{capabilities, node_defaults, node_timing, protocol};
use crate::node::leds;
use crate::node::link::NodeLink;
use crate::node::persist::NodePersistence;
use crate::node::settings::{NodeConfig, RuntimeStatus};
use crate::platform::{Clock, ResetCause, StatusLed};
use crate::proto::{
    BatteryBucket, ConfigAckPacket, ConfigPacket, Header, HelloPacket, Mode, Packet,
    TelemetryPacket,
};
use crate::radio::RadioDriver;
use crate::sensors::{read_burst, AnalogFrontEnd, BurstTiming, SensorChannel};
use crate::storage::KvStore;

/// States of the duty cycle; the hello attempt counter lives with the
/// pairing phase that owns it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Boot,
    CheckConfig,
    PairingHello { attempts: u8 },
    PairingWaitHandshake { attempts: u8 },
    RunningMeasure,
    RunningTx,
    RunningRx,
    RunningConfig,
    LostRx,
    LowBatt,
    DebugLoop,
    Sleep,
}

/// What the caller should do after a step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// Keep stepping
    Continue,
    /// Enter deep sleep for this many seconds; wake is a fresh boot
    Sleep { seconds: u32 },
}

/// Everything the state machine drives, bundled so handlers take one
/// argument instead of five
pub struct NodeHardware<'m, R, S, A, C, L>
where
    R: RadioDriver,
    S: KvStore,
    A: AnalogFrontEnd,
    C: Clock,
    L: StatusLed,
{
    pub link: NodeLink<'m, R>,
    pub persist: NodePersistence<S>,
    pub frontend: A,
    pub clock: C,
    pub led: L,
}

/// The node context: status, config and the in-flight telemetry buffer.
///
/// Owns every process-wide mutable of the firmware except the ISR-facing
/// mailbox, which is inherently shared.
pub struct NodeMachine {
    state: State,
    state_entered_ms: u32,
    mode: Mode,
    status: RuntimeStatus,
    config: NodeConfig,
    telemetry: TelemetryPacket,
    pending_config: Option<ConfigPacket>,
    last_tx_ok: bool,
    log_verbose: bool,
}

/// Base sleep time scaled by the battery and link recovery factors, in
/// that order
pub fn effective_sleep_seconds(base_s: u16, low_batt: bool, lost_rx: bool) -> u32 {
    let base = if base_s == 0 {
        u32::from(node_defaults::SLEEP_S)
    } else {
        u32::from(base_s)
    };
    let mut seconds = base;
    if low_batt {
        seconds = seconds * 13 / 10;
    }
    if lost_rx {
        seconds += seconds / 2;
    }
    seconds
}

impl NodeMachine {
    /// Boot-time construction: load persisted state and latch the reset
    /// cause for the next telemetry frame
    pub fn new<S: KvStore>(
        persist: &NodePersistence<S>,
        reset_cause: ResetCause,
        now_ms: u32,
    ) -> Self {
        let mut status = RuntimeStatus::default();
        persist.load_status(&mut status);
        let mut config = NodeConfig::default();
        persist.load_config(&mut config);

        status.last_reset_cause = reset_cause;
        let mode = if status.debug_mode {
            Mode::Debug
        } else {
            Mode::Running
        };
        let log_verbose = status.debug_mode || config.debug_mode;

        crate::debug!(
            "init: node_id={} config_valid={} debug={}",
            status.node_id,
            status.config_valid,
            status.debug_mode
        );

        Self {
            state: State::Boot,
            state_entered_ms: now_ms,
            mode,
            status,
            config,
            telemetry: TelemetryPacket::default(),
            pending_config: None,
            last_tx_ok: false,
            log_verbose,
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn status(&self) -> &RuntimeStatus {
        &self.status
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    /// Run one state handler and advance
    pub fn step<R, S, A, C, L>(&mut self, hw: &mut NodeHardware<'_, R, S, A, C, L>) -> StepOutcome
    where
        R: RadioDriver,
        S: KvStore,
        A: AnalogFrontEnd,
        C: Clock,
        L: StatusLed,
    {
        let now = hw.clock.now_ms();
        let (next, outcome) = match self.state {
            State::Boot => (State::CheckConfig, StepOutcome::Continue),
            State::CheckConfig => (self.check_config(), StepOutcome::Continue),
            State::PairingHello { attempts } => {
                (self.pairing_hello(hw, attempts), StepOutcome::Continue)
            }
            State::PairingWaitHandshake { attempts } => (
                self.pairing_wait_handshake(hw, attempts, now),
                StepOutcome::Continue,
            ),
            State::RunningMeasure => {
                self.perform_measurement(hw);
                (State::RunningTx, StepOutcome::Continue)
            }
            State::RunningTx => (self.running_tx(hw), StepOutcome::Continue),
            State::RunningRx => (self.running_rx(hw, now), StepOutcome::Continue),
            State::RunningConfig => (self.running_config(hw), StepOutcome::Continue),
            State::LostRx => (self.lost_rx(hw), StepOutcome::Continue),
            State::LowBatt => (self.low_batt(hw), StepOutcome::Continue),
            State::DebugLoop => (self.debug_loop(hw, now), StepOutcome::Continue),
            State::Sleep => {
                let seconds = self.enter_sleep(hw);
                (State::Sleep, StepOutcome::Sleep { seconds })
            }
        };

        if mem::discriminant(&next) != mem::discriminant(&self.state) {
            self.state_entered_ms = hw.clock.now_ms();
        }
        self.state = next;
        outcome
    }

    fn elapsed(&self, now: u32) -> u32 {
        now.wrapping_sub(self.state_entered_ms)
    }

    fn log(&self, args: core::fmt::Arguments) {
        if self.log_verbose {
            crate::debug::debug_print(args);
        }
    }

    fn check_config(&mut self) -> State {
        if self.status.is_configured() {
            self.mode = if self.status.debug_mode {
                Mode::Debug
            } else {
                Mode::Running
            };
            self.log(format_args!("check_config: valid, mode={:?}", self.mode));
            return if self.status.debug_mode {
                State::DebugLoop
            } else {
                State::RunningMeasure
            };
        }
        self.mode = Mode::Pairing;
        self.status.waiting_handshake = true;
        self.status.waiting_config = true;
        self.log(format_args!("check_config: no config, pairing"));
        State::PairingHello { attempts: 0 }
    }

    fn pairing_hello<R, S, A, C, L>(
        &mut self,
        hw: &mut NodeHardware<'_, R, S, A, C, L>,
        attempts: u8,
    ) -> State
    where
        R: RadioDriver,
        S: KvStore,
        A: AnalogFrontEnd,
        C: Clock,
        L: StatusLed,
    {
        let hello = HelloPacket {
            header: self.header(),
            capabilities: capabilities::ALL,
        };
        hw.link.send_hello(&hello);
        self.log(format_args!("pairing: hello broadcast"));
        leds::pairing_pattern(&mut hw.led, &mut hw.clock, true);
        State::PairingWaitHandshake {
            attempts: attempts + 1,
        }
    }

    fn pairing_wait_handshake<R, S, A, C, L>(
        &mut self,
        hw: &mut NodeHardware<'_, R, S, A, C, L>,
        attempts: u8,
        now: u32,
    ) -> State
    where
        R: RadioDriver,
        S: KvStore,
        A: AnalogFrontEnd,
        C: Clock,
        L: StatusLed,
    {
        if let Some(handshake) = hw.link.try_receive_handshake() {
            self.status.node_id = handshake.header.node_id;
            self.status.waiting_handshake = false;
            self.status.waiting_config = true;
            self.status.rx_failed = 0;
            self.last_tx_ok = true;
            hw.persist.save_status(&self.status);
            self.log(format_args!(
                "pairing: handshake ok, node_id={}",
                self.status.node_id
            ));
            return State::RunningRx;
        }
        // A CONFIG can overtake a lost HANDSHAKE; its header carries the id
        if let Some(config) = hw.link.try_receive_config() {
            self.pending_config = Some(config);
            return State::RunningConfig;
        }
        if self.elapsed(now) > node_timing::PAIRING_WAIT_MS {
            if attempts < node_timing::MAX_HELLO_ATTEMPTS {
                self.log(format_args!("pairing: timeout, retry {}", attempts));
                return State::PairingHello { attempts };
            }
            self.log(format_args!("pairing: giving up until next wake"));
            return State::Sleep;
        }
        leds::pairing_pattern(&mut hw.led, &mut hw.clock, true);
        State::PairingWaitHandshake { attempts }
    }

    fn perform_measurement<R, S, A, C, L>(&mut self, hw: &mut NodeHardware<'_, R, S, A, C, L>)
    where
        R: RadioDriver,
        S: KvStore,
        A: AnalogFrontEnd,
        C: Clock,
        L: StatusLed,
    {
        hw.frontend.all_off(); // known-dark starting point

        let timing = BurstTiming {
            settle_ms: self.config.settle_ms,
            sample_interval_ms: self.config.sample_interval_ms,
            num_samples: crate::config::adc::DEFAULT_NUM_SAMPLES,
        };
        hw.clock.delay_ms(u32::from(self.config.power_up_ms));

        let soil = read_burst(&mut hw.frontend, &mut hw.clock, SensorChannel::Soil, &timing);
        hw.clock.delay_ms(u32::from(self.config.settle_ms));
        let vbat = read_burst(&mut hw.frontend, &mut hw.clock, SensorChannel::Vbat, &timing);
        hw.clock.delay_ms(u32::from(self.config.settle_ms));
        let ntc = read_burst(&mut hw.frontend, &mut hw.clock, SensorChannel::Ntc, &timing);

        self.status.low_batt = self.config.battery_bucket == BatteryBucket::Low;

        self.telemetry = TelemetryPacket {
            header: self.header(),
            cycle: self.status.cycle_count,
            timestamp_ms: hw.clock.now_ms(),
            battery_bucket: self.config.battery_bucket as u8,
            flags: self.status.telemetry_flags(),
            soil: soil.channel_stats(),
            vbat: vbat.channel_stats(),
            ntc: ntc.channel_stats(),
            last_rssi: 0x7F, // not measurable on this radio
        };
        self.status.cycle_count += 1;

        self.log(format_args!(
            "measure: soil mean={} vbat mean={} ntc mean={}",
            soil.mean, vbat.mean, ntc.mean
        ));
        hw.frontend.all_off();
    }

    fn running_tx<R, S, A, C, L>(&mut self, hw: &mut NodeHardware<'_, R, S, A, C, L>) -> State
    where
        R: RadioDriver,
        S: KvStore,
        A: AnalogFrontEnd,
        C: Clock,
        L: StatusLed,
    {
        self.last_tx_ok = hw.link.send(&Packet::Telemetry(self.telemetry));
        self.log(format_args!("tx: telemetry sent ok={}", self.last_tx_ok));
        leds::running_pattern(
            &mut hw.led,
            &mut hw.clock,
            BatteryBucket::from_byte(self.telemetry.battery_bucket),
            self.last_tx_ok,
            self.status.low_batt,
        );
        State::RunningRx
    }

    fn running_rx<R, S, A, C, L>(
        &mut self,
        hw: &mut NodeHardware<'_, R, S, A, C, L>,
        now: u32,
    ) -> State
    where
        R: RadioDriver,
        S: KvStore,
        A: AnalogFrontEnd,
        C: Clock,
        L: StatusLed,
    {
        self.last_tx_ok = hw.link.last_send_ok();

        // Checked before the timeout so a late CONFIG on the same poll is
        // never lost to an expiring window
        if let Some(config) = hw.link.try_receive_config() {
            self.log(format_args!("rx: config received"));
            self.pending_config = Some(config);
            return State::RunningConfig;
        }
        if self.status.waiting_config && self.elapsed(now) > node_timing::RESPONSE_WINDOW_MS {
            self.log(format_args!("rx: config window expired"));
            return State::Sleep; // wait for it on a later, cheaper cycle
        }
        if !self.last_tx_ok {
            self.status.rx_failed += 1;
            self.log(format_args!("rx: tx failed count={}", self.status.rx_failed));
            if self.config.lost_rx_limit > 0
                && self.status.rx_failed >= u16::from(self.config.lost_rx_limit)
            {
                return State::LostRx;
            }
            return if self.status.low_batt {
                State::LowBatt
            } else {
                State::Sleep
            };
        }

        self.status.rx_failed = 0;
        self.status.lost_rx = false;
        if self.status.low_batt {
            State::LowBatt
        } else {
            State::Sleep
        }
    }

    fn running_config<R, S, A, C, L>(&mut self, hw: &mut NodeHardware<'_, R, S, A, C, L>) -> State
    where
        R: RadioDriver,
        S: KvStore,
        A: AnalogFrontEnd,
        C: Clock,
        L: StatusLed,
    {
        let Some(packet) = self.pending_config.take() else {
            return State::Sleep;
        };

        // A lost handshake is rescued by the CONFIG header's node_id
        if packet.header.node_id != protocol::NODE_ID_UNSET
            && packet.header.node_id != self.status.node_id
        {
            self.status.node_id = packet.header.node_id;
            self.status.waiting_handshake = false;
        }

        self.config = NodeConfig::from_packet(&packet).sanitized();
        self.status.config_valid = true;
        self.status.waiting_config = false;
        self.status.debug_mode = self.config.debug_mode;
        self.status.low_batt = self.config.battery_bucket == BatteryBucket::Low;
        self.mode = if self.status.debug_mode {
            Mode::Debug
        } else {
            Mode::Running
        };
        self.log_verbose = self.log_verbose || self.config.debug_mode;
        self.log(format_args!(
            "config: applied sleep_s={} settle_ms={} debug={}",
            self.config.sleep_s, self.config.settle_ms, self.config.debug_mode
        ));

        hw.persist.save_config(&self.config);
        hw.persist.save_status(&self.status);

        hw.link.send(&Packet::ConfigAck(ConfigAckPacket {
            header: self.header(),
            status: 0,
        }));

        if self.status.debug_mode {
            State::DebugLoop
        } else {
            State::RunningMeasure
        }
    }

    fn lost_rx<R, S, A, C, L>(&mut self, hw: &mut NodeHardware<'_, R, S, A, C, L>) -> State
    where
        R: RadioDriver,
        S: KvStore,
        A: AnalogFrontEnd,
        C: Clock,
        L: StatusLed,
    {
        self.status.lost_rx = true;
        self.log(format_args!(
            "lost_rx: failed={} limit={}",
            self.status.rx_failed, self.config.lost_rx_limit
        ));
        leds::lost_rx_pattern(&mut hw.led, &mut hw.clock);

        if self.config.lost_rx_limit > 0
            && self.status.rx_failed >= u16::from(self.config.lost_rx_limit)
        {
            // The gateway stopped confirming us; forget the pairing and
            // start over
            self.status.config_valid = false;
            self.status.node_id = protocol::NODE_ID_UNSET;
            self.status.waiting_handshake = true;
            self.status.rx_failed = 0;
            self.log(format_args!("lost_rx: returning to pairing"));
            return State::PairingHello { attempts: 0 };
        }
        State::Sleep
    }

    fn low_batt<R, S, A, C, L>(&mut self, hw: &mut NodeHardware<'_, R, S, A, C, L>) -> State
    where
        R: RadioDriver,
        S: KvStore,
        A: AnalogFrontEnd,
        C: Clock,
        L: StatusLed,
    {
        self.log(format_args!("low_batt"));
        leds::running_pattern(
            &mut hw.led,
            &mut hw.clock,
            BatteryBucket::Low,
            self.last_tx_ok,
            true,
        );
        State::Sleep
    }

    fn debug_loop<R, S, A, C, L>(
        &mut self,
        hw: &mut NodeHardware<'_, R, S, A, C, L>,
        now: u32,
    ) -> State
    where
        R: RadioDriver,
        S: KvStore,
        A: AnalogFrontEnd,
        C: Clock,
        L: StatusLed,
    {
        if self.elapsed(now) >= u32::from(self.config.sample_interval_ms) {
            self.perform_measurement(hw);
            hw.link.send(&Packet::Telemetry(self.telemetry));
            self.state_entered_ms = now;
            self.log(format_args!("debug: measurement + telemetry"));
        }
        leds::debug_pattern(&mut hw.led, &mut hw.clock);
        State::DebugLoop
    }

    fn enter_sleep<R, S, A, C, L>(&mut self, hw: &mut NodeHardware<'_, R, S, A, C, L>) -> u32
    where
        R: RadioDriver,
        S: KvStore,
        A: AnalogFrontEnd,
        C: Clock,
        L: StatusLed,
    {
        hw.frontend.all_off();
        hw.led.off();
        hw.persist.save_status(&self.status);

        let seconds =
            effective_sleep_seconds(self.config.sleep_s, self.status.low_batt, self.status.lost_rx);
        self.log(format_args!(
            "sleep: {}s low_batt={} lost_rx={}",
            seconds, self.status.low_batt, self.status.lost_rx
        ));
        seconds
    }

    fn header(&self) -> Header {
        Header::new(self.status.node_id, self.mode)
    }
}
