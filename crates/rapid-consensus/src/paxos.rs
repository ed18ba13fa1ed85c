//! Classic Paxos (§4.G): phase 1a/1b/2a/2b, with the Fast-Paxos coordinator
//! rule (Figure 2 of the Fast Paxos paper) selecting the value a coordinator
//! proposes once it has collected a majority of promises.
//!
//! Ranks are `(round, nodeIndex)` ordered lexicographically (the derived
//! `Ord` on `rapid_messaging::wire::Rank` already does this field-by-field);
//! `nodeIndex` is a full, untruncated 64-bit ring hash of the node's own
//! endpoint rather than a narrower 32-bit value, to keep collisions
//! vanishingly unlikely at any cluster size.

use rapid_core::Endpoint;
use rapid_messaging::wire::{Phase1aMessage, Phase1bMessage, Phase2aMessage, Phase2bMessage, Rank};
use std::collections::{HashMap, HashSet};

pub struct Paxos {
    self_endpoint: Endpoint,
    node_index: u64,
    configuration_id: u64,

    // Acceptor state.
    rnd: Rank,
    vrnd: Rank,
    vval: Vec<Endpoint>,

    // Coordinator state.
    crnd: Rank,
    cval: Option<Vec<Endpoint>>,
    phase1b: Vec<Phase1bMessage>,

    // Learner state: senders of Phase2b, grouped by the rank they accepted.
    phase2b: HashMap<Rank, HashSet<Endpoint>>,
    decided: bool,
}

impl Paxos {
    pub fn new(self_endpoint: Endpoint, node_index: u64, configuration_id: u64) -> Self {
        Self {
            self_endpoint,
            node_index,
            configuration_id,
            rnd: Rank::ZERO,
            vrnd: Rank::ZERO,
            vval: Vec::new(),
            crnd: Rank::ZERO,
            cval: None,
            phase1b: Vec::new(),
            phase2b: HashMap::new(),
            decided: false,
        }
    }

    pub fn node_index(&self) -> u64 {
        self.node_index
    }

    pub fn is_decided(&self) -> bool {
        self.decided
    }

    /// Primes the acceptor's vote as if it had accepted `vval` at the fast
    /// round, so a classic round started later already sees this node's
    /// fast vote in its Phase 1b response (§4.F "self-vote by calling G's
    /// registerFastRoundVote"). A no-op if the acceptor has already voted
    /// at an equal or higher rank.
    pub fn register_fast_round_vote(&mut self, vval: Vec<Endpoint>) {
        if Rank::FAST >= self.vrnd {
            self.vrnd = Rank::FAST;
            self.vval = vval;
        }
    }

    /// §4.G Phase 1a (coordinator side): starts (or re-starts at a higher
    /// round) the coordinator role. Returns the message to broadcast, or
    /// `None` if `round` would not advance `crnd`.
    pub fn start_phase1a(&mut self, round: u64) -> Option<Phase1aMessage> {
        let candidate = Rank::classic(round, self.node_index);
        if candidate <= self.crnd {
            return None;
        }
        self.crnd = candidate;
        self.cval = None;
        self.phase1b.clear();
        Some(Phase1aMessage {
            configuration_id: self.configuration_id,
            sender: self.self_endpoint.clone(),
            rank: candidate,
        })
    }

    /// §4.G Phase 1a handler (acceptor side).
    pub fn handle_phase1a(&mut self, msg: &Phase1aMessage) -> Option<Phase1bMessage> {
        if msg.configuration_id != self.configuration_id {
            return None;
        }
        if msg.rank <= self.rnd {
            return None;
        }
        self.rnd = msg.rank;
        Some(Phase1bMessage {
            configuration_id: self.configuration_id,
            sender: self.self_endpoint.clone(),
            rnd: self.rnd,
            vrnd: self.vrnd,
            vval: self.vval.clone(),
        })
    }

    /// §4.G Phase 1b handler (coordinator side). Returns a Phase 2a message
    /// the first time a non-empty value is chosen for the current `crnd`.
    pub fn handle_phase1b(&mut self, msg: Phase1bMessage, n: usize) -> Option<Phase2aMessage> {
        if msg.rnd != self.crnd {
            return None;
        }
        self.phase1b.push(msg);
        if self.phase1b.len() <= n / 2 {
            return None;
        }
        if self.cval.is_some() {
            return None;
        }
        let chosen = self.select_proposal_using_coordinator_rule(n)?;
        self.cval = Some(chosen.clone());
        Some(Phase2aMessage {
            configuration_id: self.configuration_id,
            sender: self.self_endpoint.clone(),
            rnd: self.crnd,
            vval: chosen,
        })
    }

    /// The Fast Paxos Figure 2 coordinator rule: among the collected Phase
    /// 1b messages, let `k` be the highest `vrnd` reported and `V` the
    /// distinct non-empty values voted at `k`.
    fn select_proposal_using_coordinator_rule(&self, n: usize) -> Option<Vec<Endpoint>> {
        let k = self.phase1b.iter().map(|m| m.vrnd).max().unwrap_or(Rank::ZERO);
        let at_k: Vec<&Vec<Endpoint>> = self
            .phase1b
            .iter()
            .filter(|m| m.vrnd == k && !m.vval.is_empty())
            .map(|m| &m.vval)
            .collect();

        if at_k.is_empty() {
            // |V| = 0: no promise at the max round carried a value. Fall back
            // to the first non-empty vval seen across any collected promise,
            // or give up (coordinator retries once more Phase 1b arrive).
            return self.phase1b.iter().find(|m| !m.vval.is_empty()).map(|m| m.vval.clone());
        }

        let mut counts: HashMap<&Vec<Endpoint>, usize> = HashMap::new();
        for v in &at_k {
            *counts.entry(*v).or_insert(0) += 1;
        }

        if counts.len() == 1 {
            return Some(at_k[0].clone());
        }

        // |V| > 1: only a value with count > N/4 can be safely chosen (the
        // R ∩ Q = N/4 quorum-intersection argument, E=N/4, F=N/2). At most
        // one such value can exist; if none qualifies yet, return None and
        // let the coordinator retry once more promises arrive.
        counts
            .into_iter()
            .find(|(_, count)| *count > n / 4)
            .map(|(v, _)| v.clone())
    }

    /// §4.G Phase 2a handler (acceptor side).
    pub fn handle_phase2a(&mut self, msg: &Phase2aMessage) -> Option<Phase2bMessage> {
        if msg.configuration_id != self.configuration_id {
            return None;
        }
        if msg.rnd < self.rnd || self.vrnd == msg.rnd {
            return None;
        }
        self.rnd = msg.rnd;
        self.vrnd = msg.rnd;
        self.vval = msg.vval.clone();
        Some(Phase2bMessage {
            configuration_id: self.configuration_id,
            sender: self.self_endpoint.clone(),
            rnd: msg.rnd,
            endpoints: msg.vval.clone(),
        })
    }

    /// §4.G Phase 2b handler (learner side). Returns the decided value the
    /// first time some rank's acceptances cross a majority.
    pub fn handle_phase2b(&mut self, msg: Phase2bMessage, n: usize) -> Option<Vec<Endpoint>> {
        if self.decided || msg.configuration_id != self.configuration_id {
            return None;
        }
        let senders = self.phase2b.entry(msg.rnd).or_default();
        senders.insert(msg.sender.clone());
        if senders.len() > n / 2 {
            self.decided = true;
            return Some(msg.endpoints);
        }
        None
    }
}
