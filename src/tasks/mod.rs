//! Embassy run loops
//!
//! Thin async shells that drive the synchronous cores on an embassy
//! executor. Board bring-up constructs the drivers and hands them in.

pub mod gateway;
pub mod node;

pub use gateway::run_gateway;
pub use node::run_node;
