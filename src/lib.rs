//! `rapid`: a cluster membership service implementing the Rapid protocol
//! (see `SPEC_FULL.md`). This crate is a thin umbrella over the `rapid-*`
//! crates under `crates/`, which carry the actual protocol logic; it exists
//! so a consumer can depend on one crate and one prelude instead of wiring
//! up `rapid-core`/`rapid-membership`/`rapid-messaging`/`rapid-engine`
//! individually.

pub use rapid_engine::{join, start, AlertBatcher, ClusterEvent, Event, MembershipService, NodeStatusChange, RapidHandle};

pub use rapid_core::{
    Alert, Configuration, EdgeStatus, Endpoint, JoinStatusCode, Metadata, NodeId, RapidError, RapidSettings, Result,
};
pub use rapid_membership::MembershipView;
pub use rapid_messaging::wire::{RapidRequest, RapidResponse};
pub use rapid_messaging::{Broadcaster, MessagingClient, RequestHandler, TcpMessagingClient, TcpMessagingServer};
