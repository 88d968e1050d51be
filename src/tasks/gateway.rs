//! Gateway run loop

use embassy_time::{Duration, Timer};

use crate::gateway::{ConfigStore, GatewayLink, Router, TelemetrySpool, Uplink};
use crate::gateway::uplink::HostPort;
use crate::platform::{Clock, StatusDisplay};
use crate::radio::RadioDriver;
use crate::storage::KvStore;

/// Poll interval between router ticks
const TICK_MS: u64 = 2;

/// Drive the router forever; the radio callback keeps filling the FIFO
/// while this loop sleeps between ticks.
pub async fn run_gateway<R, P, S, D, C>(
    mut router: Router,
    link: &mut GatewayLink<'_, R>,
    uplink: &mut Uplink<P>,
    store: &mut ConfigStore<S>,
    display: &mut D,
    clock: &C,
) -> !
where
    R: RadioDriver,
    P: HostPort,
    S: KvStore,
    D: StatusDisplay,
    C: Clock,
{
    let mut spool = TelemetrySpool::new();
    loop {
        router.poll(link, uplink, &mut spool, store, display, clock);
        Timer::after(Duration::from_millis(TICK_MS)).await;
    }
}
