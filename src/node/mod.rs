//! Remote sensor node: duty-cycled state machine and its support layers

pub mod leds;
pub mod link;
pub mod machine;
pub mod persist;
pub mod settings;

pub use link::{NodeLink, RxMailbox};
pub use machine::{effective_sleep_seconds, NodeHardware, NodeMachine, State, StepOutcome};
pub use persist::NodePersistence;
pub use settings::{NodeConfig, RuntimeStatus};
