//! Component H: fans one request out to every member of the current
//! configuration. Stateless apart from its recipient list, which only the
//! owning state machine mutates (on every view change) — no internal
//! synchronization is needed.

use crate::transport::MessagingClient;
use crate::wire::{RapidRequest, RapidResponse};
use rapid_core::{Endpoint, TransportError};
use std::sync::Arc;

pub struct Broadcaster<C> {
    client: Arc<C>,
    recipients: Vec<Endpoint>,
}

impl<C: MessagingClient> Broadcaster<C> {
    pub fn new(client: Arc<C>) -> Self {
        Self {
            client,
            recipients: Vec::new(),
        }
    }

    pub fn set_membership(&mut self, endpoints: Vec<Endpoint>) {
        self.recipients = endpoints;
    }

    pub fn recipients(&self) -> &[Endpoint] {
        &self.recipients
    }

    /// Sends `request` to every recipient concurrently and waits for all of
    /// them to settle (§4.H: broadcast is fire-and-collect, not fire-and-wait
    /// for a quorum — the caller's own protocol logic decides what a quorum
    /// of replies means, if anything).
    pub async fn broadcast(&self, request: RapidRequest) -> Vec<Result<RapidResponse, TransportError>> {
        let sends = self.recipients.iter().map(|endpoint| {
            let client = Arc::clone(&self.client);
            let endpoint = endpoint.clone();
            let request = request.clone();
            async move { client.send(&endpoint, request).await }
        });
        futures::future::join_all(sends).await
    }

    /// Best-effort broadcast: sends are fired on a detached task and their
    /// outcomes discarded, rather than awaited inline. Used for messages
    /// where a peer's absence is informative on its own (e.g. probes,
    /// alerts) and retries are handled by the next tick rather than by this
    /// call. Not blocking here matters because `recipients` includes `self`
    /// (§4.J: "Broadcaster recipients set to `ring[0]`") — a self-addressed
    /// message is delivered back into this node's own mailbox, so waiting
    /// for it inline would deadlock the caller against itself (§5: "the
    /// state machine does not block on peer responses").
    pub async fn broadcast_best_effort(&self, request: RapidRequest) {
        let client = Arc::clone(&self.client);
        let recipients = self.recipients.clone();
        tokio::spawn(async move {
            let sends = recipients.iter().map(|endpoint| {
                let client = Arc::clone(&client);
                let endpoint = endpoint.clone();
                let request = request.clone();
                async move {
                    let _ = client.send(&endpoint, request).await;
                }
            });
            futures::future::join_all(sends).await;
        });
    }
}
