//! Node LED patterns
//!
//! Short blocking flashes driven between states; colors follow the board's
//! convention: red = battery trouble, blue = link trouble, green = healthy.

use crate::platform::{Clock, StatusLed};
use crate::proto::BatteryBucket;

/// End-of-cycle flash after a telemetry send
pub fn running_pattern<L: StatusLed, C: Clock>(
    led: &mut L,
    clock: &mut C,
    bucket: BatteryBucket,
    tx_ok: bool,
    low_batt: bool,
) {
    led.off();
    if low_batt || bucket == BatteryBucket::Low {
        led.set(true, false, false);
    } else if !tx_ok {
        led.set(false, false, true);
    } else {
        led.set(false, true, false);
    }
    clock.delay_ms(60);
    led.off();
}

/// Cyan flash while pairing; plain blue once only the config is missing
pub fn pairing_pattern<L: StatusLed, C: Clock>(led: &mut L, clock: &mut C, waiting_config: bool) {
    led.off();
    if waiting_config {
        led.set(false, true, true);
    } else {
        led.set(false, false, true);
    }
    clock.delay_ms(80);
    led.off();
}

/// Double-spaced red flash when consecutive cycles lost their response
pub fn lost_rx_pattern<L: StatusLed, C: Clock>(led: &mut L, clock: &mut C) {
    led.off();
    led.set(true, false, false);
    clock.delay_ms(80);
    led.off();
    clock.delay_ms(80);
}

/// Quick cyan-green blink inside the debug loop
pub fn debug_pattern<L: StatusLed, C: Clock>(led: &mut L, clock: &mut C) {
    led.off();
    led.set(false, true, true);
    clock.delay_ms(40);
    led.off();
}
