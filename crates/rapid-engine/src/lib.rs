//! Ties every other `rapid-*` crate into the running protocol: the alert
//! batcher (§4.I), the transport adapters the orphan rule forces into this
//! crate, the `RapidStateMachine` actor (§4.J), and the `MembershipService`
//! facade a process actually embeds (§6).

mod adapters;
mod batcher;
mod event;
mod state_machine;

pub mod facade;

pub use batcher::AlertBatcher;
pub use event::{ClusterEvent, Event, NodeStatusChange, RapidHandle};
pub use facade::{join, start, MembershipService};
