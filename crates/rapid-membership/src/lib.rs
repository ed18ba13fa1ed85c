//! `MembershipView`: the K-ring topology over the current member set, and the
//! `Configuration` snapshots it produces.
//!
//! Owned exclusively by the `RapidStateMachine` (no external mutation, no
//! `Mutex` — see SPEC_FULL.md §5); every mutating method therefore takes
//! `&mut self`, including the read paths that populate the observer cache.

use rapid_core::{
    configuration_id, Configuration, Endpoint, JoinStatusCode, MembershipViewError, Metadata,
    NodeId, SortableSet,
};
use std::collections::{HashMap, HashSet};

pub struct MembershipView {
    k: u32,
    rings: Vec<SortableSet>,
    seen_node_ids: HashSet<NodeId>,
    endpoint_ids: HashMap<Endpoint, NodeId>,
    endpoint_metadata: HashMap<Endpoint, Metadata>,
    observer_cache: HashMap<Endpoint, Vec<Endpoint>>,
    configuration: Configuration,
}

impl MembershipView {
    pub fn new(k: u32) -> Self {
        let rings = (0..k).map(SortableSet::new).collect();
        Self {
            k,
            rings,
            seen_node_ids: HashSet::new(),
            endpoint_ids: HashMap::new(),
            endpoint_metadata: HashMap::new(),
            observer_cache: HashMap::new(),
            configuration: Configuration {
                configuration_id: configuration_id(&[], &[]),
                endpoints: Vec::new(),
                node_ids: Vec::new(),
            },
        }
    }

    /// Seeds a view that already has members — used when a joiner receives
    /// its first `JoinResponse` and must materialize the view it was handed
    /// rather than building one ring-add at a time. `metadata` is parallel to
    /// `endpoints_in_ring0_order`, as carried on the wire by `JoinResponse`.
    pub fn from_configuration(
        k: u32,
        endpoints_in_ring0_order: Vec<Endpoint>,
        node_ids: Vec<NodeId>,
        metadata: Vec<Metadata>,
    ) -> Self {
        let mut view = Self::new(k);
        for ((endpoint, node_id), metadata) in endpoints_in_ring0_order.into_iter().zip(node_ids).zip(metadata) {
            view.ring_add(endpoint, node_id, metadata)
                .expect("seeding a fresh view from a valid configuration cannot conflict");
        }
        view
    }

    pub fn k(&self) -> u32 {
        self.k
    }

    pub fn size(&self) -> usize {
        self.rings[0].len()
    }

    pub fn contains(&self, endpoint: &Endpoint) -> bool {
        self.rings[0].contains(endpoint)
    }

    pub fn metadata(&self, endpoint: &Endpoint) -> Option<&Metadata> {
        self.endpoint_metadata.get(endpoint)
    }

    pub fn node_id(&self, endpoint: &Endpoint) -> Option<NodeId> {
        self.endpoint_ids.get(endpoint).copied()
    }

    pub fn configuration(&self) -> &Configuration {
        &self.configuration
    }

    /// §4.B. Checked before a join attempt is admitted.
    pub fn is_safe_to_join(&self, endpoint: &Endpoint, node_id: NodeId) -> JoinStatusCode {
        if self.endpoint_ids.get(endpoint) == Some(&node_id) {
            JoinStatusCode::SameNodeAlreadyInRing
        } else if self.rings[0].contains(endpoint) {
            JoinStatusCode::HostnameAlreadyInRing
        } else if self.seen_node_ids.contains(&node_id) {
            JoinStatusCode::UuidAlreadyInRing
        } else {
            JoinStatusCode::SafeToJoin
        }
    }

    /// §4.B `ringAdd`. Inserts `endpoint` into all `K` rings, records
    /// `node_id` as seen, and invalidates the observer cache for every
    /// endpoint whose ring-successor changed as a result (each ring's old
    /// predecessor of `endpoint`, which now observes `endpoint` instead of
    /// whatever it observed before).
    pub fn ring_add(
        &mut self,
        endpoint: Endpoint,
        node_id: NodeId,
        metadata: Metadata,
    ) -> Result<(), MembershipViewError> {
        if self.seen_node_ids.contains(&node_id) {
            return Err(MembershipViewError::UuidAlreadySeen);
        }
        if self.rings[0].contains(&endpoint) {
            return Err(MembershipViewError::NodeAlreadyInRing);
        }

        let mut affected = Vec::with_capacity(self.k as usize);
        for ring in &mut self.rings {
            ring.insert(endpoint.clone());
            if let Some(pred) = ring.predecessor(&endpoint) {
                if pred != &endpoint {
                    affected.push(pred.clone());
                }
            }
        }

        self.seen_node_ids.insert(node_id);
        self.endpoint_ids.insert(endpoint.clone(), node_id);
        self.endpoint_metadata.insert(endpoint.clone(), metadata);

        self.observer_cache.remove(&endpoint);
        for e in affected {
            self.observer_cache.remove(&e);
        }

        self.recompute_configuration();
        Ok(())
    }

    /// §4.B `ringDelete`. Removes `endpoint` from all rings and, together
    /// with it, its `NodeId` from the seen set — the one explicit shrink path
    /// invariant 2 allows.
    pub fn ring_delete(&mut self, endpoint: &Endpoint) -> Result<(), MembershipViewError> {
        if !self.rings[0].contains(endpoint) {
            return Err(MembershipViewError::NodeNotInRing);
        }

        let mut affected = Vec::with_capacity(self.k as usize);
        for ring in &mut self.rings {
            if let Some(pred) = ring.predecessor(endpoint) {
                if pred != endpoint {
                    affected.push(pred.clone());
                }
            }
            ring.remove(endpoint);
        }

        if let Some(id) = self.endpoint_ids.remove(endpoint) {
            self.seen_node_ids.remove(&id);
        }
        self.endpoint_metadata.remove(endpoint);

        self.observer_cache.remove(endpoint);
        for e in affected {
            self.observer_cache.remove(&e);
        }

        self.recompute_configuration();
        Ok(())
    }

    /// §4.B `observersOf`. The K-length list whose k-th element is the
    /// ring-successor of `endpoint` in ring `k`; empty if the ring has at
    /// most one member.
    pub fn observers_of(&mut self, endpoint: &Endpoint) -> Vec<Endpoint> {
        if self.rings[0].len() <= 1 {
            return Vec::new();
        }
        if let Some(cached) = self.observer_cache.get(endpoint) {
            return cached.clone();
        }
        let observers: Vec<Endpoint> = self
            .rings
            .iter()
            .filter_map(|r| r.successor(endpoint).cloned())
            .collect();
        self.observer_cache.insert(endpoint.clone(), observers.clone());
        observers
    }

    /// §4.B `expectedObserversOf`: the same computation for an endpoint not
    /// yet in the ring, using each ring's lower-bound successor.
    pub fn expected_observers_of(&self, endpoint: &Endpoint) -> Vec<Endpoint> {
        if self.rings[0].is_empty() {
            return Vec::new();
        }
        self.rings
            .iter()
            .filter_map(|r| r.lower_successor(endpoint).cloned())
            .collect()
    }

    /// §4.B `subjectsOf`: the K predecessors of `endpoint` on each ring — the
    /// endpoints `endpoint` itself observes.
    pub fn subjects_of(&self, endpoint: &Endpoint) -> Vec<Endpoint> {
        if self.rings[0].len() <= 1 {
            return Vec::new();
        }
        self.rings
            .iter()
            .filter_map(|r| r.predecessor(endpoint).cloned())
            .collect()
    }

    /// §4.B `ringNumbers`: every ring index on which `observer` is the
    /// ring-successor of `subject`.
    pub fn ring_numbers(&self, observer: &Endpoint, subject: &Endpoint) -> Vec<u32> {
        self.rings
            .iter()
            .enumerate()
            .filter(|(_, r)| r.successor(subject) == Some(observer))
            .map(|(k, _)| k as u32)
            .collect()
    }

    pub fn ring0_in_order(&self) -> Vec<Endpoint> {
        self.rings[0].iter().cloned().collect()
    }

    fn recompute_configuration(&mut self) {
        let ring0: Vec<Endpoint> = self.rings[0].iter().cloned().collect();
        let node_ids: Vec<NodeId> = ring0.iter().map(|e| self.endpoint_ids[e]).collect();
        let id = configuration_id(&node_ids, &ring0);
        self.configuration = Configuration {
            configuration_id: id,
            endpoints: ring0,
            node_ids,
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ep(host: &str, port: u16) -> Endpoint {
        Endpoint::from((host, port))
    }

    fn populated(n: usize) -> MembershipView {
        let mut view = MembershipView::new(10);
        for i in 0..n {
            view.ring_add(ep(&format!("host-{i}"), 1000 + i as u16), NodeId::generate(), Metadata::new())
                .unwrap();
        }
        view
    }

    #[test]
    fn observer_subject_duality() {
        let mut view = populated(8);
        let endpoints = view.ring0_in_order();
        for a in &endpoints {
            for b in &endpoints {
                if a == b {
                    continue;
                }
                let observers_of_b = view.observers_of(b);
                let subjects_of_a = view.subjects_of(a);
                assert_eq!(observers_of_b.contains(a), subjects_of_a.contains(b));
            }
        }
    }

    #[test]
    fn configuration_stable_regardless_of_insertion_order() {
        let ids: Vec<NodeId> = (0..5).map(|_| NodeId::generate()).collect();
        let endpoints: Vec<Endpoint> = (0..5).map(|i| ep(&format!("h{i}"), 2000 + i as u16)).collect();

        let mut forward = MembershipView::new(10);
        for (e, id) in endpoints.iter().zip(&ids) {
            forward.ring_add(e.clone(), *id, Metadata::new()).unwrap();
        }

        let mut backward = MembershipView::new(10);
        for (e, id) in endpoints.iter().zip(&ids).rev() {
            backward.ring_add(e.clone(), *id, Metadata::new()).unwrap();
        }

        assert_eq!(
            forward.configuration().configuration_id,
            backward.configuration().configuration_id
        );
        assert_eq!(forward.ring0_in_order(), backward.ring0_in_order());
    }

    #[test]
    fn add_then_delete_restores_configuration_id() {
        let mut view = populated(4);
        let before = view.configuration().configuration_id;
        let new_ep = ep("fresh", 9999);
        let new_id = NodeId::generate();
        view.ring_add(new_ep.clone(), new_id, Metadata::new()).unwrap();
        assert_ne!(view.configuration().configuration_id, before);
        view.ring_delete(&new_ep).unwrap();
        assert_eq!(view.configuration().configuration_id, before);
    }

    #[test]
    fn ring_numbers_matches_observers_of() {
        let mut view = populated(6);
        let endpoints = view.ring0_in_order();
        let subject = endpoints[0].clone();
        let observers = view.observers_of(&subject);
        for observer in &observers {
            let numbers = view.ring_numbers(observer, &subject);
            assert!(!numbers.is_empty());
        }
    }

    #[test]
    fn two_member_ring_allows_duplicate_observers() {
        let mut view = MembershipView::new(10);
        let a = ep("a", 1);
        let b = ep("b", 2);
        view.ring_add(a.clone(), NodeId::generate(), Metadata::new()).unwrap();
        view.ring_add(b.clone(), NodeId::generate(), Metadata::new()).unwrap();
        let observers = view.observers_of(&a);
        assert_eq!(observers.len(), 10);
        assert!(observers.iter().all(|o| o == &b));
    }

    #[test]
    fn is_safe_to_join_reports_each_conflict_kind() {
        let mut view = populated(1);
        let existing = view.ring0_in_order()[0].clone();
        let existing_id = view.node_id(&existing).unwrap();

        assert_eq!(
            view.is_safe_to_join(&existing, existing_id),
            JoinStatusCode::SameNodeAlreadyInRing
        );
        assert_eq!(
            view.is_safe_to_join(&existing, NodeId::generate()),
            JoinStatusCode::HostnameAlreadyInRing
        );
        assert_eq!(
            view.is_safe_to_join(&ep("new", 4242), existing_id),
            JoinStatusCode::UuidAlreadyInRing
        );
        assert_eq!(
            view.is_safe_to_join(&ep("new", 4242), NodeId::generate()),
            JoinStatusCode::SafeToJoin
        );
    }

    #[test]
    fn ring_delete_rejects_unknown_endpoint() {
        let mut view = populated(2);
        let err = view.ring_delete(&ep("ghost", 1)).unwrap_err();
        assert_eq!(err, MembershipViewError::NodeNotInRing);
    }

    #[test]
    fn ring_add_rejects_seen_uuid_and_duplicate_endpoint() {
        let mut view = populated(1);
        let existing = view.ring0_in_order()[0].clone();
        let existing_id = view.node_id(&existing).unwrap();

        let err = view
            .ring_add(ep("new", 1), existing_id, Metadata::new())
            .unwrap_err();
        assert_eq!(err, MembershipViewError::UuidAlreadySeen);

        let err = view
            .ring_add(existing, NodeId::generate(), Metadata::new())
            .unwrap_err();
        assert_eq!(err, MembershipViewError::NodeAlreadyInRing);
    }
}
