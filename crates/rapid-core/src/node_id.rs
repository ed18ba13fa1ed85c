use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// A 128-bit identifier unique to one physical node, minted from a fresh UUID at
/// startup. Used only to reject a joiner that is retrying with a stale identity
/// onto a ring slot it no longer legitimately occupies.
#[derive(Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct NodeId {
    high: u64,
    low: u64,
}

impl NodeId {
    /// Mints a fresh node identity. Never two nodes in a live cluster should
    /// observe the same value; `Uuid::new_v4` is unauthenticated randomness, which
    /// is sufficient since identity here is advisory (collision just re-triggers
    /// the join-retry path via `UUID_ALREADY_IN_RING`/`UUID_ALREADY_SEEN`).
    pub fn generate() -> Self {
        Self::from_uuid(Uuid::new_v4())
    }

    pub fn from_uuid(id: Uuid) -> Self {
        let bytes = id.as_u128();
        Self {
            high: (bytes >> 64) as u64,
            low: bytes as u64,
        }
    }

    pub fn from_parts(high: u64, low: u64) -> Self {
        Self { high, low }
    }

    pub fn high(&self) -> u64 {
        self.high
    }

    pub fn low(&self) -> u64 {
        self.low
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({:016x}{:016x})", self.high, self.low)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}
