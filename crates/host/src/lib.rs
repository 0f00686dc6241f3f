//! Privileged coordinator surface: wires the session engine, the history
//! store, and the cross-surface relay together.

pub mod coordinator;
pub mod relay;

pub use coordinator::Coordinator;
pub use relay::{Relay, RelayConnection};
