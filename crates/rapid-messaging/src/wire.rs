//! §6's wire protocol: one discriminated request/response union per peer RPC,
//! plus every payload message shape it carries.

use rapid_core::{Alert, Endpoint, JoinStatusCode, Metadata, NodeId};
use serde::{Deserialize, Serialize};

/// A Paxos rank: `(round, nodeIndex)`, compared lexicographically by field
/// order (§4.G) — the derived `Ord` already does this.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Rank {
    pub round: u64,
    pub node_index: u64,
}

impl Rank {
    pub const ZERO: Rank = Rank { round: 0, node_index: 0 };

    /// The fast round's fixed rank (§4.G: "Fast round is round=1, nodeIndex=1").
    pub const FAST: Rank = Rank { round: 1, node_index: 1 };

    pub fn classic(round: u64, node_index: u64) -> Self {
        debug_assert!(round >= 2, "classic rounds start at round=2 (§4.G)");
        Self { round, node_index }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct JoinMessage {
    pub sender: Endpoint,
    pub node_id: NodeId,
    pub metadata: Metadata,
}

/// One parallel entry per member of `endpoints`/`identifiers`; the idiomatic
/// equivalent of §6's flat `metadataKeys[]`/`metadataValues[]` pair.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct JoinResponse {
    pub sender: Endpoint,
    pub status_code: JoinStatusCode,
    pub configuration_id: u64,
    pub endpoints: Vec<Endpoint>,
    pub identifiers: Vec<NodeId>,
    pub metadata: Vec<Metadata>,
}

pub type AlertMessage = Alert;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BatchedAlertMessage {
    pub sender: Endpoint,
    pub alerts: Vec<AlertMessage>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProbeMessage {
    pub sender: Endpoint,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProbeStatus {
    Ok,
    Bootstrapping,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProbeResponse {
    pub status: ProbeStatus,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FastRoundPhase2bMessage {
    pub configuration_id: u64,
    pub sender: Endpoint,
    pub endpoints: Vec<Endpoint>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Phase1aMessage {
    pub configuration_id: u64,
    pub sender: Endpoint,
    pub rank: Rank,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Phase1bMessage {
    pub configuration_id: u64,
    pub sender: Endpoint,
    pub rnd: Rank,
    pub vrnd: Rank,
    pub vval: Vec<Endpoint>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Phase2aMessage {
    pub configuration_id: u64,
    pub sender: Endpoint,
    pub rnd: Rank,
    pub vval: Vec<Endpoint>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Phase2bMessage {
    pub configuration_id: u64,
    pub sender: Endpoint,
    pub rnd: Rank,
    pub endpoints: Vec<Endpoint>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LeaveMessage {
    pub sender: Endpoint,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum RapidRequest {
    Join(JoinMessage),
    BatchedAlert(BatchedAlertMessage),
    Probe(ProbeMessage),
    FastRoundPhase2b(FastRoundPhase2bMessage),
    Phase1a(Phase1aMessage),
    Phase1b(Phase1bMessage),
    Phase2a(Phase2aMessage),
    Phase2b(Phase2bMessage),
    Leave(LeaveMessage),
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum RapidResponse {
    Join(JoinResponse),
    Response,
    Consensus,
    Probe(ProbeResponse),
}
