//! §6's external interface: `MembershipService` is what a process embeds —
//! `start`/`join` bring a node into a cluster, the returned service answers
//! `GetMemberList`/`GetMetadata`/`shutdown`/`subscribe`, and also implements
//! `RequestHandler` so it can be handed straight to a `TcpMessagingServer`.

use crate::event::{ClusterEvent, RapidHandle};
use crate::state_machine;
use async_trait::async_trait;
use rapid_core::{Endpoint, JoinStatusCode, Metadata, NodeId, RapidError, RapidSettings};
use rapid_membership::MembershipView;
use rapid_messaging::wire::{JoinMessage, RapidRequest, RapidResponse};
use rapid_messaging::{MessagingClient, RequestHandler};
use std::sync::Arc;
use tokio::sync::broadcast;

/// The facade a process holds after `start`/`join` succeeds. Cheap to clone
/// (it is just a `RapidHandle` underneath); every clone talks to the same
/// running state machine.
#[derive(Clone)]
pub struct MembershipService {
    handle: RapidHandle,
}

impl MembershipService {
    fn new(handle: RapidHandle) -> Self {
        Self { handle }
    }

    pub async fn get_member_list(&self) -> Vec<Endpoint> {
        self.handle.member_list().await.map(|c| c.endpoints).unwrap_or_default()
    }

    /// The id of the configuration currently in effect, for tests and
    /// diagnostics that need to confirm two nodes agree on the same view
    /// rather than merely the same member count.
    pub async fn get_configuration_id(&self) -> Option<u64> {
        self.handle.member_list().await.map(|c| c.configuration_id)
    }

    pub async fn get_cluster_metadata(&self) -> std::collections::HashMap<Endpoint, (NodeId, Metadata)> {
        self.handle.cluster_metadata().await.unwrap_or_default()
    }

    pub async fn shutdown(&self) {
        self.handle.shutdown().await;
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ClusterEvent> {
        self.handle.subscribe()
    }
}

#[async_trait]
impl RequestHandler for MembershipService {
    async fn handle(&self, request: RapidRequest) -> RapidResponse {
        self.handle.send_wire(request).await
    }
}

/// Bootstraps a brand new cluster consisting of just `self_endpoint`. Used by
/// whichever node is configured as the seed.
pub fn start<C: MessagingClient>(
    self_endpoint: Endpoint,
    metadata: Metadata,
    settings: RapidSettings,
    client: Arc<C>,
) -> Result<MembershipService, RapidError> {
    settings.validate()?;
    let node_id = NodeId::generate();
    let mut view = MembershipView::new(settings.k);
    view.ring_add(self_endpoint.clone(), node_id, metadata)
        .expect("a freshly created view cannot reject its own first member");
    let handle = state_machine::spawn(self_endpoint, settings, view, client);
    Ok(MembershipService::new(handle))
}

/// §6's join retry policy: a fresh `NodeId` on `UUID_ALREADY_IN_RING`, a
/// `joinDelay` backoff (same id) on `HOSTNAME_ALREADY_IN_RING` or
/// `VIEW_CHANGE_IN_PROGRESS`, up to `joinAttempts` tries against the same
/// seed before giving up.
pub async fn join<C: MessagingClient>(
    self_endpoint: Endpoint,
    seed_endpoint: Endpoint,
    metadata: Metadata,
    settings: RapidSettings,
    client: Arc<C>,
) -> Result<MembershipService, RapidError> {
    settings.validate()?;
    let mut node_id = NodeId::generate();
    let mut last_error: Option<rapid_core::TransportError> = None;

    for _ in 0..settings.join_attempts {
        let request = RapidRequest::Join(JoinMessage {
            sender: self_endpoint.clone(),
            node_id,
            metadata: metadata.clone(),
        });

        let response = match client.send(&seed_endpoint, request).await {
            Ok(RapidResponse::Join(response)) => response,
            Ok(_) => {
                tokio::time::sleep(settings.join_delay()).await;
                continue;
            }
            Err(e) => {
                last_error = Some(e);
                tokio::time::sleep(settings.join_delay()).await;
                continue;
            }
        };

        match response.status_code {
            JoinStatusCode::SafeToJoin | JoinStatusCode::SameNodeAlreadyInRing => {
                let view = MembershipView::from_configuration(
                    settings.k,
                    response.endpoints,
                    response.identifiers,
                    response.metadata,
                );
                let handle = state_machine::spawn(self_endpoint, settings, view, client);
                return Ok(MembershipService::new(handle));
            }
            JoinStatusCode::UuidAlreadyInRing => {
                node_id = NodeId::generate();
            }
            JoinStatusCode::HostnameAlreadyInRing | JoinStatusCode::ViewChangeInProgress => {
                tokio::time::sleep(settings.join_delay()).await;
            }
        }
    }

    Err(last_error
        .map(RapidError::from)
        .unwrap_or(RapidError::Join(JoinStatusCode::ViewChangeInProgress)))
}
