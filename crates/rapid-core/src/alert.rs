use crate::{Endpoint, Metadata, NodeId};
use serde::{Deserialize, Serialize};

/// Whether an observer currently believes its monitored edge is up or down
/// (§3, §6 `AlertMessage.edgeStatus`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EdgeStatus {
    Up,
    Down,
}

/// A signed statement from `edge_src` about the edge to `edge_dst` in a
/// specific configuration. `ring_numbers` lists every ring on which
/// `edge_src` is currently an observer of `edge_dst`, so one message reports
/// every affected ring in a single send (§3).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub edge_src: Endpoint,
    pub edge_dst: Endpoint,
    pub edge_status: EdgeStatus,
    pub configuration_id: u64,
    pub ring_numbers: Vec<u32>,
    pub node_id: Option<NodeId>,
    pub metadata: Option<Metadata>,
}

impl Alert {
    pub fn new(
        edge_src: Endpoint,
        edge_dst: Endpoint,
        edge_status: EdgeStatus,
        configuration_id: u64,
        ring_numbers: Vec<u32>,
    ) -> Self {
        Self {
            edge_src,
            edge_dst,
            edge_status,
            configuration_id,
            ring_numbers,
            node_id: None,
            metadata: None,
        }
    }

    pub fn with_joiner(mut self, node_id: NodeId, metadata: Metadata) -> Self {
        self.node_id = Some(node_id);
        self.metadata = Some(metadata);
        self
    }
}
