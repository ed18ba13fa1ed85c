//! Fast Paxos (§4.F): a single broadcast round that decides immediately when
//! `N - F` nodes vote for the same proposal, falling back to classic Paxos
//! (scheduled after a jittered delay) when they don't converge in time.

use rapid_core::Endpoint;
use rapid_messaging::wire::FastRoundPhase2bMessage;
use std::collections::{HashMap, HashSet};

pub struct FastPaxos {
    n: usize,
    configuration_id: u64,
    voters: HashSet<Endpoint>,
    votes_per_proposal: HashMap<Vec<Endpoint>, usize>,
    decided: bool,
}

/// `F = ⌊(N-1)/4⌋`: the number of disagreeing votes Fast Paxos can tolerate
/// while still deciding in one round.
pub fn fast_paxos_tolerance(n: usize) -> usize {
    n.saturating_sub(1) / 4
}

impl FastPaxos {
    pub fn new(n: usize, configuration_id: u64) -> Self {
        Self {
            n,
            configuration_id,
            voters: HashSet::new(),
            votes_per_proposal: HashMap::new(),
            decided: false,
        }
    }

    pub fn is_decided(&self) -> bool {
        self.decided
    }

    /// §4.F `handleFastRoundProposal`. Returns the decided value the first
    /// time some proposal's vote count crosses `N - F` while the total
    /// number of (deduplicated) voters has also crossed `N - F`.
    pub fn handle_fast_round_proposal(
        &mut self,
        msg: FastRoundPhase2bMessage,
    ) -> Option<Vec<Endpoint>> {
        if self.decided || msg.configuration_id != self.configuration_id {
            return None;
        }
        if !self.voters.insert(msg.sender) {
            return None; // duplicate sender
        }

        let count = {
            let entry = self.votes_per_proposal.entry(msg.endpoints.clone()).or_insert(0);
            *entry += 1;
            *entry
        };

        let f = fast_paxos_tolerance(self.n);
        let quorum = self.n - f;
        if self.voters.len() >= quorum && count >= quorum {
            self.decided = true;
            return Some(msg.endpoints);
        }
        None
    }
}
