//! `ConsensusInstance` (§4.F/§4.G supplement): one Fast Paxos + classic Paxos
//! pair scoped to a single configuration, wired to a broadcaster and a
//! decision sink. The state machine holds exactly one of these per active
//! configuration and discards it (along with the cut detector) the moment a
//! new configuration is installed (§3 Lifecycle).

use crate::fast_paxos::FastPaxos;
use crate::paxos::Paxos;
use async_trait::async_trait;
use rand::Rng;
use rapid_core::{ring_hash, Endpoint};
use rapid_messaging::wire::{
    FastRoundPhase2bMessage, Phase1aMessage, Phase1bMessage, Phase2aMessage, Phase2bMessage, Rank,
    RapidRequest,
};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Sends a consensus message to every member of the current configuration
/// (§4.H `Broadcaster`, abstracted here so `rapid-consensus` does not need
/// the concrete transport).
#[async_trait]
pub trait ConsensusBroadcaster: Send + Sync + 'static {
    async fn broadcast(&self, request: RapidRequest);
}

pub struct ConsensusInstance {
    self_endpoint: Endpoint,
    configuration_id: u64,
    n: usize,
    fast: FastPaxos,
    classic: Paxos,
    fallback_base: Duration,
    fallback_handle: Option<JoinHandle<()>>,
}

impl ConsensusInstance {
    pub fn new(self_endpoint: Endpoint, n: usize, configuration_id: u64, fallback_base: Duration) -> Self {
        let node_index = ring_hash(&self_endpoint, 0);
        Self {
            classic: Paxos::new(self_endpoint.clone(), node_index, configuration_id),
            fast: FastPaxos::new(n, configuration_id),
            self_endpoint,
            configuration_id,
            n,
            fallback_base,
            fallback_handle: None,
        }
    }

    pub fn is_decided(&self) -> bool {
        self.fast.is_decided() || self.classic.is_decided()
    }

    /// §4.F `propose`: self-votes into the classic round (so a later
    /// fallback already has this node's fast vote as its acceptor state),
    /// broadcasts the fast-round vote, and schedules the jittered classic
    /// fallback.
    pub async fn propose<B: ConsensusBroadcaster>(
        &mut self,
        proposal: Vec<Endpoint>,
        broadcaster: &B,
        classic_fallback_tx: mpsc::Sender<u64>,
    ) {
        self.classic.register_fast_round_vote(proposal.clone());

        let msg = FastRoundPhase2bMessage {
            configuration_id: self.configuration_id,
            sender: self.self_endpoint.clone(),
            endpoints: proposal,
        };
        broadcaster.broadcast(RapidRequest::FastRoundPhase2b(msg)).await;

        let jitter = jittered_fallback_delay(self.n, self.fallback_base);
        let configuration_id = self.configuration_id;
        self.fallback_handle = Some(tokio::spawn(async move {
            tokio::time::sleep(jitter).await;
            let _ = classic_fallback_tx.send(configuration_id).await;
        }));
    }

    /// Cancels the scheduled classic-Paxos fallback. Called the instant a
    /// decision fires, from either the fast round or classic Paxos, so the
    /// fallback never fires after the configuration has already moved on.
    fn cancel_fallback(&mut self) {
        if let Some(handle) = self.fallback_handle.take() {
            handle.abort();
        }
    }

    pub fn handle_fast_round_proposal(&mut self, msg: FastRoundPhase2bMessage) -> Option<Vec<Endpoint>> {
        let decision = self.fast.handle_fast_round_proposal(msg);
        if decision.is_some() {
            self.cancel_fallback();
        }
        decision
    }

    pub async fn start_classic_round<B: ConsensusBroadcaster>(&mut self, round: u64, broadcaster: &B) {
        if self.is_decided() {
            return;
        }
        if let Some(msg) = self.classic.start_phase1a(round) {
            broadcaster.broadcast(RapidRequest::Phase1a(msg)).await;
        }
    }

    pub fn handle_phase1a(&mut self, msg: &Phase1aMessage) -> Option<Phase1bMessage> {
        self.classic.handle_phase1a(msg)
    }

    pub async fn handle_phase1b<B: ConsensusBroadcaster>(&mut self, msg: Phase1bMessage, broadcaster: &B) {
        if let Some(phase2a) = self.classic.handle_phase1b(msg, self.n) {
            broadcaster.broadcast(RapidRequest::Phase2a(phase2a)).await;
        }
    }

    pub fn handle_phase2a(&mut self, msg: &Phase2aMessage) -> Option<Phase2bMessage> {
        self.classic.handle_phase2a(msg)
    }

    pub fn handle_phase2b(&mut self, msg: Phase2bMessage) -> Option<Vec<Endpoint>> {
        let decision = self.classic.handle_phase2b(msg, self.n);
        if decision.is_some() {
            self.cancel_fallback();
        }
        decision
    }

    pub fn node_index(&self) -> u64 {
        self.classic.node_index()
    }
}

impl Drop for ConsensusInstance {
    fn drop(&mut self) {
        self.cancel_fallback();
    }
}

/// §4.F jitter: `-1000 * ln(1 - U[0,1)) / rate + base`, with `rate = 1/N`.
/// Spreads classic-Paxos fallback starts across the cluster so a fast-round
/// stall does not trigger a thundering herd of simultaneous Phase 1a floods.
fn jittered_fallback_delay(n: usize, base: Duration) -> Duration {
    let rate = 1.0 / n.max(1) as f64;
    let u: f64 = rand::thread_rng().gen_range(0.0..1.0f64);
    let millis = -1000.0 * (1.0 - u).ln() / rate + base.as_millis() as f64;
    Duration::from_millis(millis.max(0.0) as u64)
}
