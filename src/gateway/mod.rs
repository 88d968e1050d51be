//! Telemetry gateway: radio receive path, host uplink and the router

pub mod link;
pub mod router;
pub mod spool;
pub mod store;
pub mod uplink;

pub use link::{GatewayLink, GatewayRadio, RxEntry, RxKind};
pub use router::Router;
pub use spool::{SpoolEntry, TelemetrySpool};
pub use store::ConfigStore;
pub use uplink::{DownFrame, HostPort, Uplink};
