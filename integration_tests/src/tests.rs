//! Scenario test cases over the simulated world.

use colored::Colorize;

use soilnet_firmware::node::{effective_sleep_seconds, State};
use soilnet_firmware::proto::{BatteryBucket, ConfigPacket, Header, Packet};

use crate::world::{tags, World};

/// Test result.
pub struct TestResult {
    pub name: String,
    pub passed: bool,
    pub message: Option<String>,
}

impl TestResult {
    fn pass(name: &str) -> Self {
        Self {
            name: name.to_string(),
            passed: true,
            message: None,
        }
    }

    fn fail(name: &str, message: &str) -> Self {
        Self {
            name: name.to_string(),
            passed: false,
            message: Some(message.to_string()),
        }
    }
}

macro_rules! check {
    ($name:expr, $cond:expr, $msg:expr) => {
        if !$cond {
            return TestResult::fail($name, $msg);
        }
    };
}

/// Run a test function and print results as it happens.
fn run_test<F>(name: &str, test_fn: F) -> TestResult
where
    F: FnOnce(&str) -> TestResult,
{
    print!("  {} ... ", name);
    std::io::Write::flush(&mut std::io::stdout()).ok();

    let result = test_fn(name);

    if result.passed {
        println!("{}", "PASS".green().bold());
    } else {
        println!("{}", "FAIL".red().bold());
        if let Some(msg) = &result.message {
            println!("    {}", msg.red());
        }
    }

    result
}

/// Run all tests matching `filter` and return results.
pub fn run_all_tests(filter: Option<&str>) -> Vec<TestResult> {
    let cases: Vec<(&str, fn(&str) -> TestResult)> = vec![
        ("cold pairing assigns a node id", test_cold_pairing),
        ("config window closes into default sleep", test_config_window_timeout),
        ("full config cycle with ack and telemetry", test_full_config_cycle),
        ("config rescues a node that lost its handshake", test_out_of_order_config),
        ("telemetry spool bridges an uplink outage", test_spool_outage),
        ("persistent send failures force re-pairing", test_lost_rx_repair),
        ("low battery stretches the sleep interval", test_low_battery_sleep),
    ];

    let mut results = Vec::new();
    for (name, case) in cases {
        if let Some(filter) = filter {
            if !name.contains(filter) {
                continue;
            }
        }
        results.push(run_test(name, case));
    }
    results
}

pub fn print_results(results: &[TestResult]) {
    let passed = results.iter().filter(|r| r.passed).count();
    let failed = results.len() - passed;

    println!();
    if failed == 0 {
        println!("{}", format!("All {} tests passed", passed).green().bold());
    } else {
        println!(
            "{}",
            format!("{} passed, {} failed", passed, failed).red().bold()
        );
    }
}

/// Drive the world through HELLO -> HANDSHAKE.
fn pair(world: &mut World, node_id: u8, name: &str) -> Result<(), TestResult> {
    if world
        .run_until(2_000, |w| {
            w.host_frames().iter().any(|f| f[0] == tags::UP_HELLO)
        })
        .is_none()
    {
        return Err(TestResult::fail(name, "gateway never forwarded a HELLO"));
    }
    world.host_send_handshake(node_id);
    if world
        .run_until(100, |w| w.node.machine.status().node_id == node_id)
        .is_none()
    {
        return Err(TestResult::fail(name, "node never adopted the handshake id"));
    }
    Ok(())
}

fn test_cold_pairing(name: &str) -> TestResult {
    let mut world = World::new();
    if let Err(result) = pair(&mut world, 7, name) {
        return result;
    }

    // The forwarded HELLO carried node_id 0 and the full capability mask
    let frames = world.host_frames();
    let hello = frames.iter().find(|f| f[0] == tags::UP_HELLO).unwrap();
    check!(name, hello[1] == 0, "hello should report node_id 0");
    match Packet::decode(&hello[3..]) {
        Ok(Packet::Hello(packet)) => {
            check!(name, packet.capabilities == 0x000F, "wrong capability mask");
        }
        _ => return TestResult::fail(name, "hello frame did not decode"),
    }

    check!(
        name,
        world.node.machine.state() == State::RunningRx,
        "node should wait for config after the handshake"
    );
    check!(
        name,
        !world.node.machine.status().waiting_handshake,
        "waiting_handshake should clear"
    );

    // The handshake rode the recently heard MAC, which got promoted
    check!(
        name,
        world.gateway.radio.node_mac(7) == Some(crate::world::NODE_MAC),
        "unassigned MAC was not promoted to node 7"
    );
    TestResult::pass(name)
}

fn test_config_window_timeout(name: &str) -> TestResult {
    let mut world = World::new();
    if let Err(result) = pair(&mut world, 7, name) {
        return result;
    }

    // No CONFIG arrives: the window expires into the 3 s default sleep
    match world.run_to_sleep(2_000) {
        Some(seconds) => {
            check!(name, seconds == 3, "expected the 3 s default sleep");
            TestResult::pass(name)
        }
        None => TestResult::fail(name, "node never went to sleep"),
    }
}

fn test_full_config_cycle(name: &str) -> TestResult {
    let mut world = World::new();
    if let Err(result) = pair(&mut world, 7, name) {
        return result;
    }

    world.host_send_config(
        7,
        ConfigPacket {
            header: Header::default(),
            sleep_s: 600,
            ..ConfigPacket::default()
        },
    );
    if world
        .run_until(200, |w| w.node.machine.status().config_valid)
        .is_none()
    {
        return TestResult::fail(name, "node never applied the config");
    }
    check!(
        name,
        world.node.machine.config().sleep_s == 600,
        "sleep_s not adopted"
    );
    check!(
        name,
        world.gateway.store.load(7).map(|c| c.sleep_s) == Some(600),
        "gateway did not persist the config"
    );

    // The config cycle continues into measurement and telemetry
    let seconds = match world.run_to_sleep(2_000) {
        Some(seconds) => seconds,
        None => return TestResult::fail(name, "node never finished the cycle"),
    };
    check!(name, seconds == 600, "sleep should follow the new config");

    let frames = world.host_frames();
    check!(
        name,
        frames.iter().any(|f| f[0] == tags::UP_CONFIG_ACK),
        "host never saw the CONFIG_ACK"
    );
    let telemetry = frames.iter().find(|f| f[0] == tags::UP_TELEMETRY);
    match telemetry {
        Some(frame) => {
            check!(name, frame[1] == 7, "telemetry tagged with wrong node id");
            match Packet::decode(&frame[7..]) {
                Ok(Packet::Telemetry(packet)) => {
                    check!(name, packet.soil.mean == 1500, "unexpected soil mean");
                    check!(name, packet.last_rssi == 0x7F, "last_rssi must be 0x7F");
                }
                _ => return TestResult::fail(name, "telemetry frame did not decode"),
            }
        }
        None => return TestResult::fail(name, "host never saw telemetry"),
    }
    TestResult::pass(name)
}

fn test_out_of_order_config(name: &str) -> TestResult {
    let mut world = World::new();
    world.drop_handshakes = true;

    if world
        .run_until(2_000, |w| {
            w.host_frames().iter().any(|f| f[0] == tags::UP_HELLO)
        })
        .is_none()
    {
        return TestResult::fail(name, "gateway never forwarded a HELLO");
    }

    // Host pushes a CONFIG for node 9; the handshake the router sends
    // first is lost on the air
    world.host_send_config(
        9,
        ConfigPacket {
            header: Header::default(),
            sleep_s: 120,
            ..ConfigPacket::default()
        },
    );
    if world
        .run_until(200, |w| w.node.machine.status().config_valid)
        .is_none()
    {
        return TestResult::fail(name, "node never applied the config");
    }

    check!(
        name,
        world.node.machine.status().node_id == 9,
        "node_id should be learned from the CONFIG header"
    );
    check!(
        name,
        !world.node.machine.status().waiting_handshake,
        "waiting_handshake should clear on config adoption"
    );
    if world
        .run_until(200, |w| {
            w.host_frames().iter().any(|f| f[0] == tags::UP_CONFIG_ACK)
        })
        .is_none()
    {
        return TestResult::fail(name, "host never saw the CONFIG_ACK");
    }
    TestResult::pass(name)
}

fn test_spool_outage(name: &str) -> TestResult {
    let mut world = World::new();
    if let Err(result) = pair(&mut world, 7, name) {
        return result;
    }
    world.host_send_config(
        7,
        ConfigPacket {
            header: Header::default(),
            sleep_s: 60,
            ..ConfigPacket::default()
        },
    );
    let seconds = match world.run_to_sleep(2_000) {
        Some(seconds) => seconds,
        None => return TestResult::fail(name, "node never slept after config"),
    };

    // Host goes away; three wakes' telemetry must queue on the gateway
    world.gateway.uplink.port_mut().connected = false;
    let frames_before = world.host_frames().len();
    for _ in 0..3 {
        world.reboot_node_after(seconds);
        if world.run_to_sleep(2_000).is_none() {
            return TestResult::fail(name, "node wake did not complete");
        }
    }
    check!(
        name,
        world.host_frames().len() == frames_before,
        "nothing should reach the host while disconnected"
    );
    check!(name, world.gateway.spool.len() == 3, "spool should hold 3 items");

    // Reconnect: the backlog drains oldest-first
    world.gateway.uplink.port_mut().connected = true;
    world.gateway_tick();
    let frames = world.host_frames();
    let cycles: Vec<u32> = frames[frames_before..]
        .iter()
        .filter(|f| f[0] == tags::UP_TELEMETRY)
        .filter_map(|f| match Packet::decode(&f[7..]) {
            Ok(Packet::Telemetry(packet)) => Some(packet.cycle),
            _ => None,
        })
        .collect();
    check!(name, cycles.len() == 3, "expected 3 flushed telemetry frames");
    check!(
        name,
        cycles.windows(2).all(|w| w[0] < w[1]),
        "spool flush must preserve arrival order"
    );
    check!(name, !world.gateway.spool.has_pending(), "spool should drain");
    TestResult::pass(name)
}

fn test_lost_rx_repair(name: &str) -> TestResult {
    let mut world = World::new();
    if let Err(result) = pair(&mut world, 7, name) {
        return result;
    }
    world.host_send_config(
        7,
        ConfigPacket {
            header: Header::default(),
            sleep_s: 30,
            ..ConfigPacket::default()
        },
    );
    let mut seconds = match world.run_to_sleep(2_000) {
        Some(seconds) => seconds,
        None => return TestResult::fail(name, "node never slept after config"),
    };

    // The radio stops confirming sends; after lost_rx_limit wakes the
    // node forgets its pairing and broadcasts HELLO again
    world.confirm_node_sends = false;
    for _ in 0..3 {
        world.reboot_node_after(seconds);
        seconds = match world.run_to_sleep(4_000) {
            Some(seconds) => seconds,
            None => return TestResult::fail(name, "node wake did not complete"),
        };
    }

    check!(
        name,
        world.node.machine.status().node_id == 0,
        "node should clear its id when re-pairing"
    );
    check!(
        name,
        !world.node.machine.status().config_valid,
        "config should be invalidated"
    );
    check!(
        name,
        world.node.machine.status().waiting_handshake,
        "node should wait for a fresh handshake"
    );
    TestResult::pass(name)
}

fn test_low_battery_sleep(name: &str) -> TestResult {
    // Battery factor first, then recovery: 10 -> 13 -> 19
    if effective_sleep_seconds(10, true, true) != 19 {
        return TestResult::fail(name, "10 s low+lost should scale to 19 s");
    }

    let mut world = World::new();
    if let Err(result) = pair(&mut world, 7, name) {
        return result;
    }
    world.host_send_config(
        7,
        ConfigPacket {
            header: Header::default(),
            sleep_s: 10,
            battery_bucket: BatteryBucket::Low as u8,
            ..ConfigPacket::default()
        },
    );
    if world
        .run_until(200, |w| w.node.machine.status().config_valid)
        .is_none()
    {
        return TestResult::fail(name, "node never applied the config");
    }

    match world.run_to_sleep(2_000) {
        Some(seconds) => {
            check!(name, seconds == 13, "low battery should scale 10 s to 13 s");
            check!(
                name,
                world.node.machine.status().low_batt,
                "low_batt flag should be set"
            );
            TestResult::pass(name)
        }
        None => TestResult::fail(name, "node never went to sleep"),
    }
}
