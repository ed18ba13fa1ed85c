//! Bridges the transport-agnostic traits `rapid_fd::ProbeClient` and
//! `rapid_consensus::ConsensusBroadcaster` onto a concrete
//! `rapid_messaging::MessagingClient`. These exist only because of Rust's
//! orphan rule — neither trait nor the `TcpMessagingClient` type is local to
//! this crate, so the glue has to live in the one crate that depends on
//! both.

use async_trait::async_trait;
use rapid_consensus::ConsensusBroadcaster;
use rapid_core::{Endpoint, TransportError};
use rapid_fd::{ProbeClient, ProbeOutcome};
use rapid_messaging::wire::{ProbeMessage, ProbeStatus, RapidRequest, RapidResponse};
use rapid_messaging::MessagingClient;
use std::sync::Arc;

pub struct ProbeClientAdapter<C> {
    client: Arc<C>,
    self_endpoint: Endpoint,
}

impl<C: MessagingClient> ProbeClientAdapter<C> {
    pub fn new(client: Arc<C>, self_endpoint: Endpoint) -> Self {
        Self { client, self_endpoint }
    }
}

#[async_trait]
impl<C: MessagingClient> ProbeClient for ProbeClientAdapter<C> {
    async fn probe(&self, subject: &Endpoint) -> Result<ProbeOutcome, TransportError> {
        let response = self
            .client
            .send(
                subject,
                RapidRequest::Probe(ProbeMessage {
                    sender: self.self_endpoint.clone(),
                }),
            )
            .await?;
        Ok(match response {
            RapidResponse::Probe(p) => match p.status {
                ProbeStatus::Ok => ProbeOutcome::Ok,
                ProbeStatus::Bootstrapping => ProbeOutcome::Bootstrapping,
            },
            // Any other well-formed reply still proves the peer is alive.
            _ => ProbeOutcome::Ok,
        })
    }
}

/// A one-shot snapshot of "send this to every current configuration member",
/// built fresh by the state machine for each `ConsensusInstance` call that
/// needs to broadcast — owning its data (rather than borrowing the state
/// machine's `Broadcaster`) is what lets it satisfy `ConsensusBroadcaster`'s
/// `'static` bound.
pub struct ConsensusBroadcasterAdapter<C> {
    client: Arc<C>,
    recipients: Vec<Endpoint>,
}

impl<C: MessagingClient> ConsensusBroadcasterAdapter<C> {
    pub fn new(client: Arc<C>, recipients: Vec<Endpoint>) -> Self {
        Self { client, recipients }
    }
}

#[async_trait]
impl<C: MessagingClient> ConsensusBroadcaster for ConsensusBroadcasterAdapter<C> {
    /// Fires every send on a detached task rather than awaiting the batch
    /// inline (§5: "the state machine does not block on peer responses").
    /// This matters most when `recipients` includes `self` (§4.J: broadcaster
    /// recipients are `ring[0]`, and the proposer is always a member of its
    /// own `ring[0]`) — a self-addressed consensus message is delivered back
    /// into this very mailbox, so awaiting its reply from inside the handler
    /// that sent it would deadlock the single-consumer actor against itself.
    async fn broadcast(&self, request: RapidRequest) {
        let client = Arc::clone(&self.client);
        let recipients = self.recipients.clone();
        tokio::spawn(async move {
            let sends = recipients.iter().map(|endpoint| {
                let client = Arc::clone(&client);
                let endpoint = endpoint.clone();
                let request = request.clone();
                async move {
                    if let Err(e) = client.send(&endpoint, request).await {
                        tracing::debug!(%endpoint, error = %e, "consensus broadcast send failed");
                    }
                }
            });
            futures::future::join_all(sends).await;
        });
    }
}
