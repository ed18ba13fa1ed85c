//! Consensus: Fast Paxos's single-broadcast-round vote (§4.F), classic Paxos
//! as its fallback (§4.G), and the `ConsensusInstance` that owns both for one
//! configuration's lifetime.

pub mod fast_paxos;
pub mod instance;
pub mod paxos;

pub use fast_paxos::{fast_paxos_tolerance, FastPaxos};
pub use instance::{ConsensusBroadcaster, ConsensusInstance};
pub use paxos::Paxos;
