use crate::endpoint::Endpoint;
use crate::node_id::NodeId;
use crate::ring::{h64, wrapping_add};
use serde::{Deserialize, Serialize};

/// A named snapshot of the membership: the id, `ring[0]` in ring order, and the
/// node-id set. Produced fresh by `MembershipView` after every add/delete;
/// never mutated in place.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Configuration {
    pub configuration_id: u64,
    pub endpoints: Vec<Endpoint>,
    pub node_ids: Vec<NodeId>,
}

impl Configuration {
    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }
}

/// Odd per-position multiplier folded into the ring0 accumulation so that
/// reordering the same endpoint set changes the result (see below).
const RING_POSITION_PRIME: u64 = 0x9e37_79b9_7f4a_7c15;

/// Computes the configuration id per §6: `h = 1`, then accumulate
/// `H64(nodeId.high) +̇ H64(nodeId.low)` for every seen node id using plain
/// wrapping addition (node-id order is irrelevant to membership — addition
/// is commutative), then fold in `H64(hostname) +̇ H64(port)` for every endpoint
/// of `ring[0]` **in ring order**.
///
/// A pure `+̇` accumulation over the endpoint terms would be commutative too,
/// which would silently contradict invariant 4 ("configuration id ... the
/// order of ring[0]"): two rings holding the same endpoints in different
/// orders would then hash identically. The endpoint loop instead folds each
/// term with a position-dependent rotation before adding it in, which keeps
/// the accumulation deterministic and wrapping but makes it sensitive to
/// ring order, matching invariant 4 as stated rather than the literal `+̇`
/// shorthand.
pub fn configuration_id(seen_node_ids: &[NodeId], ring0_in_order: &[Endpoint]) -> u64 {
    let mut h: u64 = 1;
    for id in seen_node_ids {
        h = wrapping_add(h, h64(&id.high().to_le_bytes()));
        h = wrapping_add(h, h64(&id.low().to_le_bytes()));
    }
    for (i, endpoint) in ring0_in_order.iter().enumerate() {
        let term = wrapping_add(h64(endpoint.hostname()), h64(&endpoint.port().to_le_bytes()));
        let positioned = term
            .rotate_left((i as u32) % 64)
            .wrapping_mul(RING_POSITION_PRIME.wrapping_add(i as u64));
        h = wrapping_add(h, positioned);
    }
    h
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ep(host: &str, port: u16) -> Endpoint {
        Endpoint::from((host, port))
    }

    #[test]
    fn node_id_order_does_not_affect_hash() {
        let a = NodeId::generate();
        let b = NodeId::generate();
        let ring = vec![ep("x", 1)];
        let h1 = configuration_id(&[a, b], &ring);
        let h2 = configuration_id(&[b, a], &ring);
        assert_eq!(h1, h2);
    }

    #[test]
    fn ring_order_does_affect_hash() {
        let ids = [NodeId::generate()];
        let forward = vec![ep("a", 1), ep("b", 2)];
        let backward = vec![ep("b", 2), ep("a", 1)];
        assert_ne!(
            configuration_id(&ids, &forward),
            configuration_id(&ids, &backward)
        );
    }

    #[test]
    fn identical_inputs_yield_identical_hash() {
        let ids = [NodeId::generate(), NodeId::generate()];
        let ring = vec![ep("a", 1), ep("b", 2), ep("c", 3)];
        assert_eq!(configuration_id(&ids, &ring), configuration_id(&ids, &ring));
    }

    #[test]
    fn add_then_delete_restores_hash() {
        let ids = [NodeId::generate()];
        let base = vec![ep("a", 1), ep("b", 2)];
        let with_extra = vec![ep("a", 1), ep("b", 2), ep("c", 3)];
        let h_base = configuration_id(&ids, &base);
        let h_extra = configuration_id(&ids, &with_extra);
        assert_ne!(h_base, h_extra);
        assert_eq!(h_base, configuration_id(&ids, &base));
    }
}
