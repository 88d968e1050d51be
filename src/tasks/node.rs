//! Node run loop

use embassy_time::{Duration, Timer};

use crate::node::{NodeHardware, NodeMachine, StepOutcome};
use crate::platform::{Clock, StatusLed, System};
use crate::radio::RadioDriver;
use crate::sensors::AnalogFrontEnd;
use crate::storage::KvStore;

/// Step the node machine until it asks for deep sleep.
///
/// Yields between steps so the radio driver and debug writer get CPU time;
/// deep sleep never returns, the next wake is a fresh boot.
pub async fn run_node<R, S, A, C, L, Y>(
    mut machine: NodeMachine,
    hw: &mut NodeHardware<'_, R, S, A, C, L>,
    system: &mut Y,
) -> !
where
    R: RadioDriver,
    S: KvStore,
    A: AnalogFrontEnd,
    C: Clock,
    L: StatusLed,
    Y: System,
{
    loop {
        match machine.step(hw) {
            StepOutcome::Continue => Timer::after(Duration::from_millis(1)).await,
            StepOutcome::Sleep { seconds } => system.deep_sleep(seconds),
        }
    }
}
