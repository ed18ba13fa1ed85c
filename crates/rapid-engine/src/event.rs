//! The mailbox's `Event` enum (§4.J supplement) and the `ClusterEvent`s it
//! fans out to subscribers, plus `RapidHandle` — the only thing any other
//! component is given in order to talk to the state machine.

use rapid_core::{Configuration, Endpoint, Metadata, NodeId};
use rapid_messaging::wire::{RapidRequest, RapidResponse};
use std::collections::HashMap;
use tokio::sync::{broadcast, mpsc, oneshot};

/// One UP or DOWN transition applied by a committed view change (§6
/// `ClusterEvent.ViewChange`'s `statusChanges`).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NodeStatusChange {
    Up(Endpoint),
    Down(Endpoint),
}

/// §6 `ClusterEvent`: what a `subscribe()`r is notified of.
#[derive(Clone, Debug)]
pub enum ClusterEvent {
    ViewChangeProposal(Vec<Endpoint>),
    ViewChange(u64, Vec<NodeStatusChange>),
    Kicked,
}

/// Everything that can land in the state machine's single mailbox. A bounded
/// `mpsc::Sender<Event>` is the one serialization point for all the sources
/// named in §5 (wire requests, FD runners, the batching timer, a decided
/// consensus round) — the task that owns the receiving end is the sole
/// mutator of the `MembershipView`/`MultiNodeCutDetector`/consensus state.
pub enum Event {
    Wire(RapidRequest, oneshot::Sender<RapidResponse>),
    BatchTick,
    SubjectFailed(Endpoint),
    /// A `ConsensusInstance`'s jittered classic-Paxos fallback timer fired
    /// for the configuration id it was scheduled against. Ignored if the
    /// state machine has since moved past that configuration.
    ClassicFallback(u64),
    GetMemberList(oneshot::Sender<Configuration>),
    GetMetadata(oneshot::Sender<HashMap<Endpoint, (NodeId, Metadata)>>),
    Shutdown(oneshot::Sender<()>),
}

/// Cloneable, back-reference-free handle onto a running state machine: every
/// collaborator holds one of these, never a pointer back into the actor itself.
#[derive(Clone)]
pub struct RapidHandle {
    mailbox: mpsc::Sender<Event>,
    events: broadcast::Sender<ClusterEvent>,
}

impl RapidHandle {
    pub fn new(mailbox: mpsc::Sender<Event>, events: broadcast::Sender<ClusterEvent>) -> Self {
        Self { mailbox, events }
    }

    pub async fn send_wire(&self, request: RapidRequest) -> RapidResponse {
        let (tx, rx) = oneshot::channel();
        if self.mailbox.send(Event::Wire(request, tx)).await.is_err() {
            return RapidResponse::Response;
        }
        rx.await.unwrap_or(RapidResponse::Response)
    }

    pub async fn member_list(&self) -> Option<Configuration> {
        let (tx, rx) = oneshot::channel();
        self.mailbox.send(Event::GetMemberList(tx)).await.ok()?;
        rx.await.ok()
    }

    pub async fn cluster_metadata(&self) -> Option<HashMap<Endpoint, (NodeId, Metadata)>> {
        let (tx, rx) = oneshot::channel();
        self.mailbox.send(Event::GetMetadata(tx)).await.ok()?;
        rx.await.ok()
    }

    pub async fn shutdown(&self) {
        let (tx, rx) = oneshot::channel();
        if self.mailbox.send(Event::Shutdown(tx)).await.is_ok() {
            let _ = rx.await;
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ClusterEvent> {
        self.events.subscribe()
    }

    pub(crate) async fn notify_subject_failed(&self, subject: Endpoint) {
        let _ = self.mailbox.send(Event::SubjectFailed(subject)).await;
    }

    pub(crate) async fn notify_classic_fallback(&self, configuration_id: u64) {
        let _ = self.mailbox.send(Event::ClassicFallback(configuration_id)).await;
    }
}
