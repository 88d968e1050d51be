//! A simulated world: one node, one gateway, one shared clock.
//!
//! The pump carries frames between the two radios, invoking the same
//! callback entry points the real driver glue would. Each world step also
//! advances the clock by the run-loop tick so timeouts fire like they do
//! on hardware.

use soilnet_firmware::gateway::{ConfigStore, GatewayLink, GatewayRadio, Router, TelemetrySpool, Uplink};
use soilnet_firmware::node::{NodeHardware, NodeLink, NodeMachine, NodePersistence, RxMailbox, StepOutcome};
use soilnet_firmware::platform::{Clock, ResetCause};
use soilnet_firmware::proto::{ConfigPacket, Packet, PacketKind};
use soilnet_firmware::radio::{Mac, BROADCAST_MAC};

use crate::sim::{
    air_queue, AirQueue, MemKv, SimClock, SimDisplay, SimFrontEnd, SimHostPort, SimLed, SimRadio,
};

/// Milliseconds of simulated time per world step (the run-loop tick)
const STEP_TICK_MS: u32 = 5;

pub const NODE_MAC: Mac = [0x24, 0x0A, 0xC4, 0x12, 0x34, 0x57];
pub const GATEWAY_MAC: Mac = [0xA8, 0x42, 0xE3, 0x4A, 0xA4, 0x24];

/// Uplink tag bytes, re-exported for test assertions
pub use soilnet_firmware::gateway::uplink::tags;

pub struct NodeSim {
    pub mailbox: &'static RxMailbox,
    pub outbound: AirQueue,
    pub hw: NodeHardware<'static, SimRadio, MemKv, SimFrontEnd, SimClock, SimLed>,
    pub machine: NodeMachine,
}

pub struct GatewaySim {
    pub radio: &'static GatewayRadio,
    pub outbound: AirQueue,
    pub link: GatewayLink<'static, SimRadio>,
    pub uplink: Uplink<SimHostPort>,
    pub spool: TelemetrySpool,
    pub store: ConfigStore<MemKv>,
    pub display: SimDisplay,
    pub router: Router,
}

pub struct World {
    pub clock: SimClock,
    pub node: NodeSim,
    pub gateway: GatewaySim,
    /// Simulate a lost HANDSHAKE by dropping them on the air
    pub drop_handshakes: bool,
    /// Deliver send completions to the node (radio-level ACK)
    pub confirm_node_sends: bool,
}

impl World {
    pub fn new() -> Self {
        let clock = SimClock::new();

        let mailbox: &'static RxMailbox = Box::leak(Box::new(RxMailbox::new()));
        let node_outbound = air_queue();
        let node_hw = NodeHardware {
            link: NodeLink::new(SimRadio::new(node_outbound.clone()), mailbox),
            persist: NodePersistence::new(MemKv::new(), MemKv::new()),
            frontend: SimFrontEnd::new(),
            clock: clock.clone(),
            led: SimLed::new(),
        };
        let machine = NodeMachine::new(&node_hw.persist, ResetCause::PowerOn, clock.now_ms());

        let radio: &'static GatewayRadio = Box::leak(Box::new(GatewayRadio::new()));
        let gateway_outbound = air_queue();
        let gateway = GatewaySim {
            radio,
            outbound: gateway_outbound.clone(),
            link: GatewayLink::new(SimRadio::new(gateway_outbound), radio),
            uplink: Uplink::new(SimHostPort::new()),
            spool: TelemetrySpool::new(),
            store: ConfigStore::new(MemKv::new()),
            display: SimDisplay::new(),
            router: Router::new(),
        };

        Self {
            clock,
            node: NodeSim {
                mailbox,
                outbound: node_outbound,
                hw: node_hw,
                machine,
            },
            gateway,
            drop_handshakes: false,
            confirm_node_sends: true,
        }
    }

    /// Carry queued frames across the air in both directions
    pub fn pump(&mut self) {
        let node_frames: Vec<_> = self.node.outbound.borrow_mut().drain(..).collect();
        for frame in node_frames {
            if self.confirm_node_sends {
                self.node.mailbox.on_send_complete(true);
            }
            if frame.dest == BROADCAST_MAC || frame.dest == GATEWAY_MAC {
                self.gateway.radio.on_receive(
                    Some(&NODE_MAC),
                    &frame.data,
                    -52,
                    self.clock.now_ms(),
                );
            }
        }

        let gateway_frames: Vec<_> = self.gateway.outbound.borrow_mut().drain(..).collect();
        for frame in gateway_frames {
            if self.drop_handshakes
                && frame.data.first() == Some(&(PacketKind::Handshake as u8))
            {
                continue;
            }
            if frame.dest == BROADCAST_MAC || frame.dest == NODE_MAC {
                self.node.mailbox.on_receive(Some(&GATEWAY_MAC), &frame.data);
            }
        }
    }

    /// One router tick on the gateway
    pub fn gateway_tick(&mut self) {
        self.gateway.router.poll(
            &mut self.gateway.link,
            &mut self.gateway.uplink,
            &mut self.gateway.spool,
            &mut self.gateway.store,
            &mut self.gateway.display,
            &self.clock,
        );
    }

    /// One node step plus a full exchange and gateway tick
    pub fn step(&mut self) -> StepOutcome {
        let outcome = self.node.machine.step(&mut self.node.hw);
        self.pump();
        self.gateway_tick();
        self.pump();
        self.clock.advance(STEP_TICK_MS);
        outcome
    }

    /// Step until the predicate holds; None when max_steps is exhausted
    pub fn run_until<F>(&mut self, max_steps: usize, predicate: F) -> Option<usize>
    where
        F: Fn(&World) -> bool,
    {
        for i in 0..max_steps {
            self.step();
            if predicate(self) {
                return Some(i);
            }
        }
        None
    }

    /// Step until the node requests deep sleep; returns the sleep seconds
    pub fn run_to_sleep(&mut self, max_steps: usize) -> Option<u32> {
        for _ in 0..max_steps {
            if let StepOutcome::Sleep { seconds } = self.step() {
                return Some(seconds);
            }
        }
        None
    }

    /// Deep-sleep the node and boot it fresh, as the timer wake would
    pub fn reboot_node_after(&mut self, sleep_seconds: u32) {
        self.clock.advance(sleep_seconds.saturating_mul(1000));
        self.node.machine = NodeMachine::new(
            &self.node.hw.persist,
            ResetCause::DeepSleepWake,
            self.clock.now_ms(),
        );
    }

    /// Frames the gateway has written to the host, framing stripped
    pub fn host_frames(&self) -> Vec<Vec<u8>> {
        self.gateway.uplink.port().written_frames()
    }

    /// Queue a host CONFIG for `node_id` on the gateway's serial input
    pub fn host_send_config(&mut self, node_id: u8, config: ConfigPacket) {
        let mut payload = vec![tags::DOWN_CONFIG, node_id];
        payload.extend_from_slice(&Packet::Config(config).encode().unwrap());
        self.gateway.uplink.port_mut().queue_frame(&payload);
    }

    /// Queue a host HANDSHAKE request for `node_id`
    pub fn host_send_handshake(&mut self, node_id: u8) {
        self.gateway
            .uplink
            .port_mut()
            .queue_frame(&[tags::DOWN_HANDSHAKE, node_id]);
    }
}
