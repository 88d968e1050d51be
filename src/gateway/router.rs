//! Gateway router: bridges node radio traffic and the host serial link
//!
//! Each tick runs three phases in order: drain the radio FIFO, drain the
//! host downlink, flush the telemetry spool. Telemetry joins the spool
//! whenever the uplink is down or older items are still queued, so host
//! delivery order always matches radio arrival order.

use core::fmt::Write;

use heapless::String;

use crate::gateway::link::{GatewayLink, RxEntry, RxKind};
use crate::gateway::spool::{SpoolEntry, TelemetrySpool};
use crate::gateway::store::ConfigStore;
use crate::gateway::uplink::{DownFrame, HostPort, Uplink};
use crate::platform::{Clock, DisplaySummary, StatusDisplay};
use crate::proto::{HandshakePacket, Header, Mode, Packet, PacketKind, TelemetryPacket};
use crate::radio::RadioDriver;
use crate::storage::KvStore;

/// Router state: traffic counters and display pacing
pub struct Router {
    hello_count: u32,
    telemetry_count: u32,
    last_display_ms: Option<u32>,
}

impl Router {
    pub const fn new() -> Self {
        Self {
            hello_count: 0,
            telemetry_count: 0,
            last_display_ms: None,
        }
    }

    pub fn hello_count(&self) -> u32 {
        self.hello_count
    }

    pub fn telemetry_count(&self) -> u32 {
        self.telemetry_count
    }

    /// One main-loop tick
    pub fn poll<R, P, S, D, C>(
        &mut self,
        link: &mut GatewayLink<'_, R>,
        uplink: &mut Uplink<P>,
        spool: &mut TelemetrySpool,
        store: &mut ConfigStore<S>,
        display: &mut D,
        clock: &C,
    ) where
        R: RadioDriver,
        P: HostPort,
        S: KvStore,
        D: StatusDisplay,
        C: Clock,
    {
        self.drain_radio(link, uplink, spool, display, clock);
        self.drain_downlink(link, uplink, store, display, clock);
        self.flush_spool(uplink, spool);
    }

    fn drain_radio<R, P, D, C>(
        &mut self,
        link: &mut GatewayLink<'_, R>,
        uplink: &mut Uplink<P>,
        spool: &mut TelemetrySpool,
        display: &mut D,
        clock: &C,
    ) where
        R: RadioDriver,
        P: HostPort,
        D: StatusDisplay,
        C: Clock,
    {
        while let Some(entry) = link.radio().pop() {
            match entry.kind {
                RxKind::Hello => {
                    self.hello_count += 1;
                    uplink.send_hello(entry.node_id, entry.rssi, &entry.frame);
                    let mut line: String<24> = String::new();
                    let _ = write!(line, "HELLO n:{} rssi:{}", entry.node_id, entry.rssi);
                    display.status("HELLO rx", &line);
                }
                RxKind::Telemetry => {
                    self.handle_telemetry(entry, uplink, spool, display, clock);
                }
                RxKind::ConfigAck => {
                    uplink.send_config_ack(entry.node_id, entry.rssi, &entry.frame);
                    display.status("Config ACK", "forwarded");
                }
                // Debug frames are for a sniffer on the air, not the host
                RxKind::Debug | RxKind::None => {}
            }
        }
    }

    fn handle_telemetry<P, D, C>(
        &mut self,
        entry: RxEntry,
        uplink: &mut Uplink<P>,
        spool: &mut TelemetrySpool,
        display: &mut D,
        clock: &C,
    ) where
        P: HostPort,
        D: StatusDisplay,
        C: Clock,
    {
        if entry.frame.len() != PacketKind::Telemetry.frame_len() {
            crate::debug!(
                "router: dropping telemetry with size mismatch ({})",
                entry.frame.len()
            );
            return;
        }
        let telemetry = match Packet::decode(&entry.frame) {
            Ok(Packet::Telemetry(telemetry)) => telemetry,
            _ => return,
        };

        self.telemetry_count += 1;
        let now = clock.now_ms();
        let item = SpoolEntry {
            node_id: entry.node_id,
            rssi: entry.rssi,
            local_ts_ms: now,
            frame: entry.frame,
        };

        // The backlog always goes first so host order stays FIFO
        if uplink.connected() {
            self.flush_spool(uplink, spool);
            if spool.has_pending() {
                // Uplink choked mid-flush; queue behind the backlog
                if spool.push(item).is_err() {
                    crate::debug!("router: telemetry spool full, dropping newest item");
                }
            } else if !uplink.send_telemetry(&item) && spool.push(item).is_err() {
                crate::debug!("router: failed to requeue telemetry after uplink error");
            }
        } else if spool.push(item).is_err() {
            crate::debug!("router: telemetry spool full, dropping newest item");
        }

        if self
            .last_display_ms
            .map_or(true, |last| now.wrapping_sub(last) > crate::config::gateway::DISPLAY_REFRESH_MS)
        {
            let mut line: String<26> = String::new();
            let _ = write!(line, "TELEM n:{} rssi:{}", entry.node_id, entry.rssi);
            display.status("Telem rx", &line);
            self.last_display_ms = Some(now);
        }
        self.show_summary(&telemetry, entry.node_id, entry.rssi, display);
    }

    fn show_summary<D: StatusDisplay>(
        &self,
        telemetry: &TelemetryPacket,
        node_id: u8,
        rssi: i8,
        display: &mut D,
    ) {
        display.summary(&DisplaySummary {
            hello_count: self.hello_count,
            telemetry_count: self.telemetry_count,
            node_id,
            cycle: telemetry.cycle,
            soil_mean: telemetry.soil.mean,
            vbat_mean: telemetry.vbat.mean,
            rssi,
        });
    }

    fn drain_downlink<R, P, S, D, C>(
        &mut self,
        link: &mut GatewayLink<'_, R>,
        uplink: &mut Uplink<P>,
        store: &mut ConfigStore<S>,
        display: &mut D,
        clock: &C,
    ) where
        R: RadioDriver,
        P: HostPort,
        S: KvStore,
        D: StatusDisplay,
        C: Clock,
    {
        while let Some(frame) = uplink.poll() {
            match frame {
                DownFrame::Config {
                    node_id,
                    mut config,
                } => {
                    // The router owns the header; the host only names the node
                    config.header = Header::new(node_id, Mode::Running);

                    // Best effort: a node still waiting in pairing needs the
                    // handshake before it will listen for config
                    self.send_handshake(link, node_id, clock);

                    store.save(node_id, &config);
                    if let Ok(encoded) = Packet::Config(config).encode() {
                        link.send_to_node(node_id, &encoded, clock.now_ms());
                    }
                    display.status("Send CONFIG", "to node");
                }
                DownFrame::Handshake { node_id } => {
                    let ok = self.send_handshake(link, node_id, clock);
                    if ok {
                        display.status("Send HANDSHAKE", "to node");
                    } else {
                        display.status("Handshake fail", "no MAC?");
                    }
                }
            }
        }
    }

    fn send_handshake<R: RadioDriver, C: Clock>(
        &mut self,
        link: &mut GatewayLink<'_, R>,
        node_id: u8,
        clock: &C,
    ) -> bool {
        let handshake = Packet::Handshake(HandshakePacket {
            header: Header::new(node_id, Mode::Running),
        });
        match handshake.encode() {
            Ok(frame) => link.send_to_node(node_id, &frame, clock.now_ms()),
            Err(_) => false,
        }
    }

    fn flush_spool<P: HostPort>(&mut self, uplink: &mut Uplink<P>, spool: &mut TelemetrySpool) {
        while uplink.connected() && spool.has_pending() {
            let Some(item) = spool.pop() else { break };
            if !uplink.send_telemetry(&item) {
                // Put it back and retry next tick; order is preserved
                let _ = spool.push_front(item);
                break;
            }
        }
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::gateway::SPOOL_LEN;
    use crate::gateway::link::GatewayRadio;
    use crate::gateway::uplink::{mock::MockHostPort, tags};
    use crate::platform::mock::{MockClock, MockDisplay};
    use crate::proto::{ChannelStats, ConfigPacket};
    use crate::radio::mock::MockRadio;
    use crate::radio::Mac;
    use crate::storage::mock::MemStore;

    const NODE_MAC: Mac = [0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF];

    struct Fixture<'r> {
        router: Router,
        link: GatewayLink<'r, MockRadio>,
        uplink: Uplink<MockHostPort>,
        spool: TelemetrySpool,
        store: ConfigStore<MemStore>,
        display: MockDisplay,
        clock: MockClock,
    }

    impl<'r> Fixture<'r> {
        fn new(radio: &'r GatewayRadio) -> Self {
            Self {
                router: Router::new(),
                link: GatewayLink::new(MockRadio::new(), radio),
                uplink: Uplink::new(MockHostPort::new()),
                spool: TelemetrySpool::new(),
                store: ConfigStore::new(MemStore::new()),
                display: MockDisplay::new(),
                clock: MockClock::new(),
            }
        }

        fn poll(&mut self) {
            self.router.poll(
                &mut self.link,
                &mut self.uplink,
                &mut self.spool,
                &mut self.store,
                &mut self.display,
                &self.clock,
            );
        }
    }

    fn telemetry_frame(node_id: u8, cycle: u32) -> heapless::Vec<u8, 128> {
        Packet::Telemetry(TelemetryPacket {
            header: Header::new(node_id, Mode::Running),
            cycle,
            timestamp_ms: 1_000 + cycle,
            battery_bucket: 1,
            flags: 0,
            soil: ChannelStats {
                mean: 1500,
                ..ChannelStats::default()
            },
            vbat: ChannelStats {
                mean: 2200,
                ..ChannelStats::default()
            },
            ntc: ChannelStats::default(),
            last_rssi: 0x7F,
        })
        .encode()
        .unwrap()
    }

    fn hello_frame(node_id: u8) -> heapless::Vec<u8, 128> {
        Packet::Hello(crate::proto::HelloPacket {
            header: Header::new(node_id, Mode::Pairing),
            capabilities: 0x000F,
        })
        .encode()
        .unwrap()
    }

    #[test]
    fn test_hello_forwarded_to_host() {
        let radio = GatewayRadio::new();
        let mut fx = Fixture::new(&radio);
        radio.on_receive(Some(&NODE_MAC), &hello_frame(0), -44, 0);
        fx.poll();

        let frames = fx.uplink.port().written_frames();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0][0], tags::UP_HELLO);
        assert_eq!(frames[0][1], 0);
        assert_eq!(fx.router.hello_count(), 1);
    }

    #[test]
    fn test_telemetry_forwarded_with_timestamp() {
        let radio = GatewayRadio::new();
        let mut fx = Fixture::new(&radio);
        fx.clock.advance(7_000);
        radio.on_receive(Some(&NODE_MAC), &telemetry_frame(7, 1), -51, 6_900);
        fx.poll();

        let frames = fx.uplink.port().written_frames();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0][0], tags::UP_TELEMETRY);
        assert_eq!(frames[0][1], 7);
        assert_eq!(&frames[0][3..7], &7_000u32.to_le_bytes());
        assert_eq!(fx.router.telemetry_count(), 1);
        // Summary reflects the decoded packet
        let summary = fx.display.summaries.last().unwrap();
        assert_eq!(summary.soil_mean, 1500);
        assert_eq!(summary.vbat_mean, 2200);
        assert_eq!(summary.cycle, 1);
    }

    #[test]
    fn test_size_mismatched_telemetry_dropped() {
        let radio = GatewayRadio::new();
        let mut fx = Fixture::new(&radio);
        // Telemetry tag but a frame one byte short
        let mut bad = telemetry_frame(7, 1);
        bad.pop();
        radio.on_receive(Some(&NODE_MAC), &bad, -51, 0);
        fx.poll();

        assert!(fx.uplink.port().written_frames().is_empty());
        assert!(fx.spool.is_empty());
        assert_eq!(fx.router.telemetry_count(), 0);
    }

    #[test]
    fn test_config_ack_forwarded() {
        let radio = GatewayRadio::new();
        let mut fx = Fixture::new(&radio);
        let ack = Packet::ConfigAck(crate::proto::ConfigAckPacket {
            header: Header::new(7, Mode::Running),
            status: 0,
        })
        .encode()
        .unwrap();
        radio.on_receive(Some(&NODE_MAC), &ack, -51, 0);
        fx.poll();

        let frames = fx.uplink.port().written_frames();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0][0], tags::UP_CONFIG_ACK);
    }

    #[test]
    fn test_debug_frames_consumed_silently() {
        let radio = GatewayRadio::new();
        let mut fx = Fixture::new(&radio);
        let mut debug_frame = [0u8; 40];
        debug_frame[0] = PacketKind::Debug as u8;
        debug_frame[1] = 7;
        radio.on_receive(Some(&NODE_MAC), &debug_frame, -51, 0);
        fx.poll();
        assert!(fx.uplink.port().written_frames().is_empty());
    }

    #[test]
    fn test_down_config_sends_handshake_first_and_restamps() {
        let radio = GatewayRadio::new();
        // The node announced itself, so the unassigned MAC is routable
        radio.on_receive(Some(&NODE_MAC), &hello_frame(0), -44, 0);
        let mut fx = Fixture::new(&radio);
        fx.poll(); // forwards the hello

        let config = ConfigPacket {
            header: Header::default(), // host leaves the header blank
            sleep_s: 600,
            ..ConfigPacket::default()
        };
        let mut payload: std::vec::Vec<u8> = vec![tags::DOWN_CONFIG, 5];
        payload.extend_from_slice(&Packet::Config(config).encode().unwrap());
        fx.uplink.port_mut().queue_frame(&payload);
        fx.poll();

        let sent = &fx.link.driver().sent;
        assert_eq!(sent.len(), 2);
        // Handshake reaches the node before the config
        assert_eq!(sent[0].1[0], PacketKind::Handshake as u8);
        assert_eq!(sent[1].1[0], PacketKind::Config as u8);
        // Both rode the recently heard MAC
        assert_eq!(sent[0].0, NODE_MAC);

        // Router re-stamped the header
        match Packet::decode(&sent[1].1).unwrap() {
            Packet::Config(config) => {
                assert_eq!(config.header.node_id, 5);
                assert_eq!(config.header.mode, Mode::Running);
                assert_eq!(config.header.hw_version, 1);
                assert_eq!(config.sleep_s, 600);
            }
            other => panic!("expected config, got {:?}", other),
        }

        // And persisted the config for node 5
        assert_eq!(fx.store.load(5).unwrap().sleep_s, 600);
        // Send success promoted the MAC into the node table
        assert_eq!(radio.node_mac(5), Some(NODE_MAC));
        assert!(!radio.has_unassigned());
    }

    #[test]
    fn test_down_handshake_forwarded() {
        let radio = GatewayRadio::new();
        let mut fx = Fixture::new(&radio);
        fx.uplink.port_mut().queue_frame(&[tags::DOWN_HANDSHAKE, 9]);
        fx.poll();

        let sent = &fx.link.driver().sent;
        assert_eq!(sent.len(), 1);
        match Packet::decode(&sent[0].1).unwrap() {
            Packet::Handshake(handshake) => assert_eq!(handshake.header.node_id, 9),
            other => panic!("expected handshake, got {:?}", other),
        }
    }

    #[test]
    fn test_spool_bridges_uplink_outage_in_order() {
        let radio = GatewayRadio::new();
        let mut fx = Fixture::new(&radio);
        fx.uplink.port_mut().connected = false;

        // One more frame than the spool holds
        for cycle in 0..(SPOOL_LEN as u32 + 1) {
            radio.on_receive(Some(&NODE_MAC), &telemetry_frame(7, cycle), -51, 0);
            fx.poll();
        }
        assert_eq!(fx.spool.len(), SPOOL_LEN);
        assert!(fx.uplink.port().written_frames().is_empty());

        // Reconnect with a fresh arrival racing the backlog
        fx.uplink.port_mut().connected = true;
        radio.on_receive(
            Some(&NODE_MAC),
            &telemetry_frame(7, SPOOL_LEN as u32 + 1),
            -51,
            0,
        );
        fx.poll();

        let frames = fx.uplink.port().written_frames();
        assert_eq!(frames.len(), SPOOL_LEN + 1);
        // Cycles 0..=31 then 33; cycle 32 was the dropped newest entry
        for (i, frame) in frames.iter().take(SPOOL_LEN).enumerate() {
            match Packet::decode(&frame[7..]).unwrap() {
                Packet::Telemetry(telemetry) => assert_eq!(telemetry.cycle, i as u32),
                other => panic!("expected telemetry, got {:?}", other),
            }
        }
        match Packet::decode(&frames[SPOOL_LEN][7..]).unwrap() {
            Packet::Telemetry(telemetry) => assert_eq!(telemetry.cycle, SPOOL_LEN as u32 + 1),
            other => panic!("expected telemetry, got {:?}", other),
        }
        assert!(fx.spool.is_empty());
    }

    #[test]
    fn test_display_rate_limiting() {
        let radio = GatewayRadio::new();
        let mut fx = Fixture::new(&radio);

        radio.on_receive(Some(&NODE_MAC), &telemetry_frame(7, 0), -51, 0);
        fx.poll();
        radio.on_receive(Some(&NODE_MAC), &telemetry_frame(7, 1), -51, 0);
        fx.poll();
        // Only the first telemetry within the window printed a status line
        let telem_lines = fx
            .display
            .lines
            .iter()
            .filter(|(line1, _)| line1 == "Telem rx")
            .count();
        assert_eq!(telem_lines, 1);
        // But every telemetry refreshed the summary
        assert_eq!(fx.display.summaries.len(), 2);

        fx.clock.advance(1_100);
        radio.on_receive(Some(&NODE_MAC), &telemetry_frame(7, 2), -51, 0);
        fx.poll();
        let telem_lines = fx
            .display
            .lines
            .iter()
            .filter(|(line1, _)| line1 == "Telem rx")
            .count();
        assert_eq!(telem_lines, 2);
    }
}
