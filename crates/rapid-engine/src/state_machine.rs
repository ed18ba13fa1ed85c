//! `RapidStateMachine` (§4.J): the single-consumer actor that owns the
//! `MembershipView`, `MultiNodeCutDetector`, and the active `ConsensusInstance`
//! for as long as one exists, plus every transition, filtering, and
//! admission rule of §4.J.

use crate::adapters::{ConsensusBroadcasterAdapter, ProbeClientAdapter};
use crate::batcher::AlertBatcher;
use crate::event::{ClusterEvent, Event, NodeStatusChange, RapidHandle};
use rapid_consensus::{ConsensusBroadcaster, ConsensusInstance};
use rapid_core::{Alert, EdgeStatus, Endpoint, JoinStatusCode, Metadata, NodeId, RapidSettings};
use rapid_detector::MultiNodeCutDetector;
use rapid_fd::{EdgeFdRunner, EdgeFdRunnerConfig};
use rapid_membership::MembershipView;
use rapid_messaging::wire::{
    BatchedAlertMessage, FastRoundPhase2bMessage, JoinMessage, JoinResponse, LeaveMessage, Phase1aMessage,
    Phase1bMessage, Phase2aMessage, Phase2bMessage, ProbeMessage, ProbeResponse, ProbeStatus, RapidRequest,
    RapidResponse,
};
use rapid_messaging::{Broadcaster, MessagingClient};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    Initial,
    Active,
    ViewChanging,
    Leaving,
    Left,
}

pub struct RapidStateMachine<C: MessagingClient> {
    self_endpoint: Endpoint,
    settings: RapidSettings,
    state: Phase,
    view: MembershipView,
    detector: MultiNodeCutDetector,
    consensus: Option<ConsensusInstance>,
    broadcaster: Broadcaster<C>,
    client: Arc<C>,
    batcher: AlertBatcher,
    fd_handles: Vec<JoinHandle<()>>,
    failure_tx: mpsc::Sender<Endpoint>,
    fallback_tx: mpsc::Sender<u64>,
    forwarder_handles: Vec<JoinHandle<()>>,
    postponed_joiners: Vec<oneshot::Sender<RapidResponse>>,
    joiner_node_ids: HashMap<Endpoint, NodeId>,
    joiner_metadata: HashMap<Endpoint, Metadata>,
    stashed: VecDeque<Event>,
    events: broadcast::Sender<ClusterEvent>,
    bootstrap_probes_remaining: u32,
}

/// Builds a state machine over `view`, spawns its mailbox task, and returns
/// the handle every other component talks to it through. `view` is either a
/// fresh single-node view (`start`) or one materialized from a `JoinResponse`
/// (`join`) — see `rapid-engine::facade`.
pub fn spawn<C: MessagingClient>(
    self_endpoint: Endpoint,
    settings: RapidSettings,
    view: MembershipView,
    client: Arc<C>,
) -> RapidHandle {
    settings.validate().expect("RapidSettings must be valid by the time a state machine is built");
    let bootstrap_limit = settings.bootstrap_heartbeat_limit;

    let (mailbox_tx, mailbox_rx) = mpsc::channel(1024);
    let (events_tx, _) = broadcast::channel(256);
    let handle = RapidHandle::new(mailbox_tx, events_tx.clone());

    let (failure_tx, mut failure_rx) = mpsc::channel::<Endpoint>(256);
    let (fallback_tx, mut fallback_rx) = mpsc::channel::<u64>(16);

    let failure_forwarder = {
        let handle = handle.clone();
        tokio::spawn(async move {
            while let Some(subject) = failure_rx.recv().await {
                handle.notify_subject_failed(subject).await;
            }
        })
    };
    let fallback_forwarder = {
        let handle = handle.clone();
        tokio::spawn(async move {
            while let Some(configuration_id) = fallback_rx.recv().await {
                handle.notify_classic_fallback(configuration_id).await;
            }
        })
    };

    let detector = MultiNodeCutDetector::from_settings(&settings);
    let mut machine = RapidStateMachine {
        self_endpoint,
        settings,
        state: Phase::Initial,
        view,
        detector,
        consensus: None,
        broadcaster: Broadcaster::new(client.clone()),
        client,
        batcher: AlertBatcher::new(),
        fd_handles: Vec::new(),
        failure_tx,
        fallback_tx,
        forwarder_handles: vec![failure_forwarder, fallback_forwarder],
        postponed_joiners: Vec::new(),
        joiner_node_ids: HashMap::new(),
        joiner_metadata: HashMap::new(),
        stashed: VecDeque::new(),
        events: events_tx,
        bootstrap_probes_remaining: bootstrap_limit,
    };
    machine.enter_active();
    tokio::spawn(machine.run(mailbox_rx));
    handle
}

impl<C: MessagingClient> RapidStateMachine<C> {
    async fn run(mut self, mut mailbox_rx: mpsc::Receiver<Event>) {
        let mut batch_ticker = tokio::time::interval(self.settings.batching_window());
        batch_ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                event = mailbox_rx.recv() => {
                    match event {
                        Some(event) => {
                            let is_shutdown = matches!(event, Event::Shutdown(_));
                            self.handle_event(event).await;
                            if is_shutdown {
                                break;
                            }
                        }
                        None => break,
                    }
                }
                _ = batch_ticker.tick() => {
                    self.handle_event(Event::BatchTick).await;
                }
            }
        }
    }

    async fn handle_event(&mut self, event: Event) {
        if self.state == Phase::Left {
            if let Event::Shutdown(ack) = event {
                let _ = ack.send(());
            }
            return;
        }
        match event {
            Event::Wire(request, reply) => self.handle_wire(request, reply).await,
            Event::BatchTick => self.flush_batch().await,
            Event::SubjectFailed(subject) => self.handle_subject_failed(subject).await,
            Event::ClassicFallback(configuration_id) => self.handle_classic_fallback(configuration_id).await,
            Event::GetMemberList(tx) => {
                let _ = tx.send(self.view.configuration().clone());
            }
            Event::GetMetadata(tx) => {
                let mut map = HashMap::new();
                for endpoint in self.view.ring0_in_order() {
                    if let Some(node_id) = self.view.node_id(&endpoint) {
                        let metadata = self.view.metadata(&endpoint).cloned().unwrap_or_default();
                        map.insert(endpoint, (node_id, metadata));
                    }
                }
                let _ = tx.send(map);
            }
            Event::Shutdown(ack) => {
                self.shutdown_internal().await;
                let _ = ack.send(());
            }
        }
    }

    // -- Lifecycle -------------------------------------------------------

    fn enter_active(&mut self) {
        self.state = Phase::Active;
        self.detector.reset();
        self.rearm_broadcaster();
        self.rearm_fd_runners();
    }

    /// §4.J: "Broadcaster recipients set to `ring[0]`" — including self, so
    /// that a proposer's own fast-round/classic-Paxos messages loop back
    /// through its own mailbox and are counted like any other vote, instead
    /// of being silently dropped from the tally.
    fn rearm_broadcaster(&mut self) {
        self.broadcaster.set_membership(self.view.ring0_in_order());
    }

    fn abort_fd_runners(&mut self) {
        for handle in self.fd_handles.drain(..) {
            handle.abort();
        }
    }

    fn rearm_fd_runners(&mut self) {
        self.abort_fd_runners();
        let config = EdgeFdRunnerConfig::from(&self.settings);
        for subject in self.view.subjects_of(&self.self_endpoint) {
            let probe = Arc::new(ProbeClientAdapter::new(self.client.clone(), self.self_endpoint.clone()));
            let handle = EdgeFdRunner::spawn(subject, probe, self.failure_tx.clone(), config.clone());
            self.fd_handles.push(handle);
        }
    }

    async fn shutdown_internal(&mut self) {
        if self.state == Phase::Left {
            return;
        }
        self.state = Phase::Leaving;
        let leave = RapidRequest::Leave(LeaveMessage {
            sender: self.self_endpoint.clone(),
        });
        self.broadcaster.broadcast_best_effort(leave).await;
        self.abort_fd_runners();
        for handle in self.forwarder_handles.drain(..) {
            handle.abort();
        }
        self.state = Phase::Left;
    }

    // -- Wire dispatch -----------------------------------------------------

    async fn handle_wire(&mut self, request: RapidRequest, reply: oneshot::Sender<RapidResponse>) {
        match request {
            RapidRequest::Join(msg) => self.handle_join(msg, reply).await,
            RapidRequest::BatchedAlert(msg) => self.handle_batched_alert(msg, reply).await,
            RapidRequest::Probe(msg) => self.handle_probe(msg, reply),
            RapidRequest::FastRoundPhase2b(msg) => self.handle_fast_round(msg, reply).await,
            RapidRequest::Phase1a(msg) => self.handle_phase1a(msg, reply).await,
            RapidRequest::Phase1b(msg) => self.handle_phase1b(msg, reply).await,
            RapidRequest::Phase2a(msg) => self.handle_phase2a(msg, reply).await,
            RapidRequest::Phase2b(msg) => self.handle_phase2b(msg, reply).await,
            RapidRequest::Leave(msg) => self.handle_leave(msg, reply).await,
        }
    }

    fn join_response_with_current_view(&self, status: JoinStatusCode) -> RapidResponse {
        let config = self.view.configuration();
        RapidResponse::Join(JoinResponse {
            sender: self.self_endpoint.clone(),
            status_code: status,
            configuration_id: config.configuration_id,
            endpoints: config.endpoints.clone(),
            identifiers: config.node_ids.clone(),
            metadata: config
                .endpoints
                .iter()
                .map(|e| self.view.metadata(e).cloned().unwrap_or_default())
                .collect(),
        })
    }

    async fn handle_join(&mut self, msg: JoinMessage, reply: oneshot::Sender<RapidResponse>) {
        match self.state {
            Phase::ViewChanging => {
                let _ = reply.send(self.join_response_with_current_view(JoinStatusCode::ViewChangeInProgress));
            }
            Phase::Active => match self.view.is_safe_to_join(&msg.sender, msg.node_id) {
                JoinStatusCode::SafeToJoin => {
                    self.postponed_joiners.push(reply);
                    let configuration_id = self.view.configuration().configuration_id;
                    let observers_by_ring: Vec<(u32, Endpoint)> = self
                        .view
                        .expected_observers_of(&msg.sender)
                        .into_iter()
                        .enumerate()
                        .map(|(ring, observer)| (ring as u32, observer))
                        .collect();

                    let mut proposals = Vec::new();
                    for (ring, observer) in observers_by_ring {
                        let alert = Alert::new(observer, msg.sender.clone(), EdgeStatus::Up, configuration_id, vec![ring])
                            .with_joiner(msg.node_id, msg.metadata.clone());
                        proposals.extend(self.process_alert(alert.clone()));
                        self.batcher.enqueue(alert);
                    }
                    if !proposals.is_empty() {
                        self.begin_view_change(proposals).await;
                    }
                }
                JoinStatusCode::SameNodeAlreadyInRing => {
                    let _ = reply.send(self.join_response_with_current_view(JoinStatusCode::SafeToJoin));
                }
                other => {
                    let _ = reply.send(self.join_response_with_current_view(other));
                }
            },
            Phase::Initial | Phase::Leaving | Phase::Left => {
                let _ = reply.send(RapidResponse::Response);
            }
        }
    }

    async fn handle_batched_alert(&mut self, msg: BatchedAlertMessage, reply: oneshot::Sender<RapidResponse>) {
        let _ = reply.send(RapidResponse::Response);
        if !matches!(self.state, Phase::Active | Phase::ViewChanging) {
            return;
        }
        let mut proposals = Vec::new();
        for alert in msg.alerts {
            proposals.extend(self.process_alert(alert));
        }
        if self.state == Phase::Active {
            let configuration_id = self.view.configuration().configuration_id;
            proposals.extend(self.detector.invalidate_failing_edges(&mut self.view, configuration_id));
        }
        if !proposals.is_empty() {
            self.begin_view_change(proposals).await;
        }
    }

    fn handle_probe(&mut self, _msg: ProbeMessage, reply: oneshot::Sender<RapidResponse>) {
        let status = if self.bootstrap_probes_remaining > 0 {
            self.bootstrap_probes_remaining -= 1;
            ProbeStatus::Bootstrapping
        } else {
            ProbeStatus::Ok
        };
        let _ = reply.send(RapidResponse::Probe(ProbeResponse { status }));
    }

    async fn handle_leave(&mut self, msg: LeaveMessage, reply: oneshot::Sender<RapidResponse>) {
        if self.state == Phase::ViewChanging {
            self.stashed.push_back(Event::Wire(RapidRequest::Leave(msg), reply));
            return;
        }
        let _ = reply.send(RapidResponse::Response);
        if self.state != Phase::Active {
            return;
        }
        let configuration_id = self.view.configuration().configuration_id;
        let ring_numbers = self.view.ring_numbers(&self.self_endpoint, &msg.sender);
        if ring_numbers.is_empty() {
            return;
        }
        let alert = Alert::new(self.self_endpoint.clone(), msg.sender.clone(), EdgeStatus::Down, configuration_id, ring_numbers);
        let proposals = self.process_alert(alert.clone());
        self.batcher.enqueue(alert);
        if !proposals.is_empty() {
            self.begin_view_change(proposals).await;
        }
    }

    // -- Consensus message routing ------------------------------------------

    /// Lazily creates a `ConsensusInstance` for `configuration_id` the first
    /// time this node observes protocol traffic for it without having
    /// detected the cut itself yet, flipping `Active` to `ViewChanging` in
    /// the process. Returns `false` for a stale configuration id, which the
    /// caller drops the message for.
    fn ensure_consensus(&mut self, configuration_id: u64) -> bool {
        if configuration_id != self.view.configuration().configuration_id {
            return false;
        }
        if self.consensus.is_none() {
            let n = self.view.size().max(1);
            self.consensus = Some(ConsensusInstance::new(
                self.self_endpoint.clone(),
                n,
                configuration_id,
                self.settings.classic_paxos_fallback_base(),
            ));
            if self.state == Phase::Active {
                self.state = Phase::ViewChanging;
            }
        }
        true
    }

    fn broadcaster_adapter(&self) -> ConsensusBroadcasterAdapter<C> {
        ConsensusBroadcasterAdapter::new(self.client.clone(), self.broadcaster.recipients().to_vec())
    }

    async fn handle_fast_round(&mut self, msg: FastRoundPhase2bMessage, reply: oneshot::Sender<RapidResponse>) {
        let _ = reply.send(RapidResponse::Consensus);
        if !matches!(self.state, Phase::Active | Phase::ViewChanging) {
            return;
        }
        if !self.ensure_consensus(msg.configuration_id) {
            return;
        }
        if let Some(decision) = self.consensus.as_mut().unwrap().handle_fast_round_proposal(msg) {
            self.apply_view_change(decision).await;
        }
    }

    async fn handle_phase1a(&mut self, msg: Phase1aMessage, reply: oneshot::Sender<RapidResponse>) {
        let _ = reply.send(RapidResponse::Consensus);
        if !matches!(self.state, Phase::Active | Phase::ViewChanging) {
            return;
        }
        if !self.ensure_consensus(msg.configuration_id) {
            return;
        }
        let sender = msg.sender.clone();
        if let Some(phase1b) = self.consensus.as_mut().unwrap().handle_phase1a(&msg) {
            // Fired on a detached task rather than awaited inline: `sender`
            // is frequently this node itself (ring[0] always includes self,
            // §4.J), and a self-addressed reply is delivered back into this
            // very mailbox, so waiting for it here would deadlock the
            // single-consumer actor against itself (§5).
            let client = self.client.clone();
            tokio::spawn(async move {
                if let Err(e) = client.send(&sender, RapidRequest::Phase1b(phase1b)).await {
                    tracing::debug!(%sender, error = %e, "failed to reply with phase1b");
                }
            });
        }
    }

    async fn handle_phase1b(&mut self, msg: Phase1bMessage, reply: oneshot::Sender<RapidResponse>) {
        let _ = reply.send(RapidResponse::Consensus);
        if !matches!(self.state, Phase::Active | Phase::ViewChanging) {
            return;
        }
        if !self.ensure_consensus(msg.configuration_id) {
            return;
        }
        let adapter = self.broadcaster_adapter();
        self.consensus.as_mut().unwrap().handle_phase1b(msg, &adapter).await;
    }

    async fn handle_phase2a(&mut self, msg: Phase2aMessage, reply: oneshot::Sender<RapidResponse>) {
        let _ = reply.send(RapidResponse::Consensus);
        if !matches!(self.state, Phase::Active | Phase::ViewChanging) {
            return;
        }
        if !self.ensure_consensus(msg.configuration_id) {
            return;
        }
        if let Some(phase2b) = self.consensus.as_mut().unwrap().handle_phase2a(&msg) {
            let adapter = self.broadcaster_adapter();
            adapter.broadcast(RapidRequest::Phase2b(phase2b)).await;
        }
    }

    async fn handle_phase2b(&mut self, msg: Phase2bMessage, reply: oneshot::Sender<RapidResponse>) {
        let _ = reply.send(RapidResponse::Consensus);
        if !matches!(self.state, Phase::Active | Phase::ViewChanging) {
            return;
        }
        if !self.ensure_consensus(msg.configuration_id) {
            return;
        }
        if let Some(decision) = self.consensus.as_mut().unwrap().handle_phase2b(msg) {
            self.apply_view_change(decision).await;
        }
    }

    async fn handle_classic_fallback(&mut self, configuration_id: u64) {
        if configuration_id != self.view.configuration().configuration_id {
            return;
        }
        if let Some(consensus) = self.consensus.as_mut() {
            if consensus.is_decided() {
                return;
            }
            let adapter = ConsensusBroadcasterAdapter::new(self.client.clone(), self.broadcaster.recipients().to_vec());
            consensus.start_classic_round(2, &adapter).await;
        }
    }

    // -- Alert filtering, cut detection, batching ---------------------------

    /// §4.J "alert filtering", executed identically in `Active` and
    /// `ViewChanging`. Returns the proposal the cut detector produced, if
    /// any (always empty while `ViewChanging`, since the detector itself is
    /// not consulted then).
    fn process_alert(&mut self, alert: Alert) -> Vec<Endpoint> {
        if alert.configuration_id != self.view.configuration().configuration_id {
            return Vec::new();
        }
        let present = self.view.contains(&alert.edge_dst);
        match alert.edge_status {
            EdgeStatus::Up if present => return Vec::new(),
            EdgeStatus::Down if !present => return Vec::new(),
            _ => {}
        }
        if alert.edge_status == EdgeStatus::Up {
            if let Some(node_id) = alert.node_id {
                self.joiner_node_ids.insert(alert.edge_dst.clone(), node_id);
            }
            if let Some(metadata) = alert.metadata.clone() {
                self.joiner_metadata.insert(alert.edge_dst.clone(), metadata);
            }
        }
        if self.state == Phase::Active {
            self.detector.aggregate(&alert)
        } else {
            Vec::new()
        }
    }

    async fn handle_subject_failed(&mut self, subject: Endpoint) {
        if self.state != Phase::Active {
            return;
        }
        let configuration_id = self.view.configuration().configuration_id;
        let ring_numbers = self.view.ring_numbers(&self.self_endpoint, &subject);
        if ring_numbers.is_empty() {
            return;
        }
        let alert = Alert::new(self.self_endpoint.clone(), subject, EdgeStatus::Down, configuration_id, ring_numbers);
        let proposals = self.process_alert(alert.clone());
        self.batcher.enqueue(alert);
        if !proposals.is_empty() {
            self.begin_view_change(proposals).await;
        }
    }

    async fn flush_batch(&mut self) {
        if let Some(alerts) = self.batcher.tick() {
            if alerts.is_empty() {
                return;
            }
            let msg = BatchedAlertMessage {
                sender: self.self_endpoint.clone(),
                alerts,
            };
            self.broadcaster.broadcast_best_effort(RapidRequest::BatchedAlert(msg)).await;
        }
    }

    // -- View change ---------------------------------------------------------

    async fn begin_view_change(&mut self, proposal: Vec<Endpoint>) {
        if self.state != Phase::Active {
            return;
        }
        let mut seen = std::collections::HashSet::new();
        let mut unique: Vec<Endpoint> = proposal.into_iter().filter(|e| seen.insert(e.clone())).collect();
        // §4.J: sorted by ringHash(seed=0) so every node proposes an
        // identical byte-equal vector for identical input sets.
        unique.sort_by_key(|e| rapid_core::ring_hash(e, 0));

        self.state = Phase::ViewChanging;
        let n = self.view.size().max(1);
        let configuration_id = self.view.configuration().configuration_id;
        let mut consensus = ConsensusInstance::new(
            self.self_endpoint.clone(),
            n,
            configuration_id,
            self.settings.classic_paxos_fallback_base(),
        );
        let adapter = self.broadcaster_adapter();
        consensus.propose(unique.clone(), &adapter, self.fallback_tx.clone()).await;
        self.consensus = Some(consensus);

        let _ = self.events.send(ClusterEvent::ViewChangeProposal(unique));
    }

    async fn apply_view_change(&mut self, proposal: Vec<Endpoint>) {
        self.consensus = None;
        let mut status_changes = Vec::new();

        for endpoint in &proposal {
            if self.view.contains(endpoint) {
                if let Err(e) = self.view.ring_delete(endpoint) {
                    tracing::error!(%endpoint, error = %e, "fatal: could not remove endpoint from a committed view");
                    continue;
                }
                self.joiner_node_ids.remove(endpoint);
                self.joiner_metadata.remove(endpoint);
                status_changes.push(NodeStatusChange::Down(endpoint.clone()));
            } else {
                let node_id = match self.joiner_node_ids.remove(endpoint) {
                    Some(id) => id,
                    None => {
                        tracing::error!(%endpoint, "fatal: committed proposal adds an endpoint whose joiner id was never observed");
                        continue;
                    }
                };
                let metadata = self.joiner_metadata.remove(endpoint).unwrap_or_default();
                if let Err(e) = self.view.ring_add(endpoint.clone(), node_id, metadata) {
                    tracing::error!(%endpoint, error = %e, "fatal: could not add endpoint to a committed view");
                    continue;
                }
                status_changes.push(NodeStatusChange::Up(endpoint.clone()));
            }
        }

        let configuration_id = self.view.configuration().configuration_id;
        let response = self.join_response_with_current_view(JoinStatusCode::SafeToJoin);
        for reply in self.postponed_joiners.drain(..) {
            let _ = reply.send(response.clone());
        }

        let kicked = status_changes
            .iter()
            .any(|c| matches!(c, NodeStatusChange::Down(e) if e == &self.self_endpoint));

        self.detector.reset();
        self.rearm_broadcaster();
        self.rearm_fd_runners();

        let _ = self.events.send(ClusterEvent::ViewChange(configuration_id, status_changes));

        if kicked {
            let _ = self.events.send(ClusterEvent::Kicked);
            self.abort_fd_runners();
            self.state = Phase::Left;
            return;
        }

        self.state = Phase::Active;

        let stashed: VecDeque<Event> = std::mem::take(&mut self.stashed);
        for event in stashed {
            self.handle_event(event).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use rapid_core::{RapidSettings, TransportError};

    struct NoopClient;

    #[async_trait]
    impl MessagingClient for NoopClient {
        async fn send(&self, endpoint: &Endpoint, _request: RapidRequest) -> Result<RapidResponse, TransportError> {
            Err(TransportError::ConnectionClosed {
                endpoint: endpoint.to_string(),
            })
        }
    }

    fn ep(host: &str, port: u16) -> Endpoint {
        Endpoint::from((host, port))
    }

    fn machine(self_endpoint: Endpoint, view: MembershipView) -> RapidStateMachine<NoopClient> {
        let settings = RapidSettings::default();
        let client = Arc::new(NoopClient);
        let (failure_tx, _failure_rx) = mpsc::channel(1);
        let (fallback_tx, _fallback_rx) = mpsc::channel(1);
        let (events_tx, _) = broadcast::channel(16);
        let detector = MultiNodeCutDetector::from_settings(&settings);
        let mut m = RapidStateMachine {
            self_endpoint,
            settings,
            state: Phase::Active,
            view,
            detector,
            consensus: None,
            broadcaster: Broadcaster::new(client.clone()),
            client,
            batcher: AlertBatcher::new(),
            fd_handles: Vec::new(),
            failure_tx,
            fallback_tx,
            forwarder_handles: Vec::new(),
            postponed_joiners: Vec::new(),
            joiner_node_ids: HashMap::new(),
            joiner_metadata: HashMap::new(),
            stashed: VecDeque::new(),
            events: events_tx,
            bootstrap_probes_remaining: 0,
        };
        m.rearm_broadcaster();
        m
    }

    fn single_node_view(endpoint: &Endpoint) -> MembershipView {
        let mut view = MembershipView::new(10);
        view.ring_add(endpoint.clone(), NodeId::generate(), Metadata::new()).unwrap();
        view
    }

    #[test]
    fn process_alert_drops_a_stale_configuration_id() {
        let self_ep = ep("a", 1);
        let view = single_node_view(&self_ep);
        let mut m = machine(self_ep.clone(), view);
        let configuration_id = m.view.configuration().configuration_id;
        let alert = Alert::new(self_ep.clone(), ep("b", 2), EdgeStatus::Up, configuration_id + 1, vec![0]);
        assert!(m.process_alert(alert).is_empty());
    }

    #[test]
    fn process_alert_drops_an_up_alert_for_a_member_already_present() {
        let self_ep = ep("a", 1);
        let view = single_node_view(&self_ep);
        let mut m = machine(self_ep.clone(), view);
        let configuration_id = m.view.configuration().configuration_id;
        let alert = Alert::new(self_ep.clone(), self_ep.clone(), EdgeStatus::Up, configuration_id, vec![0]);
        assert!(m.process_alert(alert).is_empty());
    }

    #[test]
    fn process_alert_remembers_the_joiners_node_id_and_metadata() {
        let self_ep = ep("a", 1);
        let view = single_node_view(&self_ep);
        let mut m = machine(self_ep.clone(), view);
        let configuration_id = m.view.configuration().configuration_id;
        let joiner = ep("b", 2);
        let joiner_id = NodeId::generate();
        let alert = Alert::new(self_ep.clone(), joiner.clone(), EdgeStatus::Up, configuration_id, vec![0])
            .with_joiner(joiner_id, Metadata::new());
        m.process_alert(alert);
        assert_eq!(m.joiner_node_ids.get(&joiner), Some(&joiner_id));
    }

    #[tokio::test]
    async fn apply_view_change_admits_a_joiner_and_replies_to_its_postponed_request() {
        let self_ep = ep("a", 1);
        let view = single_node_view(&self_ep);
        let mut m = machine(self_ep.clone(), view);
        let joiner = ep("b", 2);
        let joiner_id = NodeId::generate();
        m.joiner_node_ids.insert(joiner.clone(), joiner_id);
        m.state = Phase::ViewChanging;

        let (tx, rx) = oneshot::channel();
        m.postponed_joiners.push(tx);

        let mut events = m.events.subscribe();
        m.apply_view_change(vec![joiner.clone()]).await;

        assert!(m.view.contains(&joiner));
        assert_eq!(m.state, Phase::Active);
        let response = rx.await.unwrap();
        assert!(matches!(response, RapidResponse::Join(r) if r.status_code == JoinStatusCode::SafeToJoin));
        assert!(matches!(events.recv().await.unwrap(), ClusterEvent::ViewChange(_, changes) if changes == vec![NodeStatusChange::Up(joiner)]));
    }

    #[tokio::test]
    async fn apply_view_change_that_removes_self_fires_kicked_and_leaves() {
        let self_ep = ep("a", 1);
        let peer = ep("b", 2);
        let mut view = MembershipView::new(10);
        view.ring_add(self_ep.clone(), NodeId::generate(), Metadata::new()).unwrap();
        view.ring_add(peer.clone(), NodeId::generate(), Metadata::new()).unwrap();

        // The peer is driving this node's removal, so construct the machine
        // from the peer's point of view: `self_endpoint` is the one being
        // voted out.
        let mut m = machine(self_ep.clone(), view);
        m.state = Phase::ViewChanging;

        let mut events = m.events.subscribe();
        m.apply_view_change(vec![self_ep.clone()]).await;

        assert_eq!(m.state, Phase::Left);
        assert!(matches!(events.recv().await.unwrap(), ClusterEvent::ViewChange(_, _)));
        assert!(matches!(events.recv().await.unwrap(), ClusterEvent::Kicked));
    }

    #[tokio::test]
    async fn begin_view_change_is_a_no_op_outside_active() {
        let self_ep = ep("a", 1);
        let view = single_node_view(&self_ep);
        let mut m = machine(self_ep.clone(), view);
        m.state = Phase::ViewChanging;
        m.begin_view_change(vec![ep("b", 2)]).await;
        assert!(m.consensus.is_none());
        assert_eq!(m.state, Phase::ViewChanging);
    }
}
