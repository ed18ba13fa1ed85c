//! Stable, seed-varying 64-bit hashing for ring placement, plus the single
//! fixed (unseeded) hash used to compute configuration ids (§6).
//!
//! Both are 64-bit FNV-1a variants. FNV-1a was picked over `DefaultHasher`
//! (`std::collections::hash_map::RandomState`) because the latter is seeded
//! per-process — two nodes hashing the same endpoint would disagree, which
//! breaks every invariant in §4.B that depends on nodes agreeing on ring
//! order. `ring_hash` mixes `seed` into the FNV offset basis so each of the
//! `K` rings gets a distinct, but still deterministic, ordering.

use crate::endpoint::Endpoint;

const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

fn fnv1a(seed: u64, bytes: &[u8]) -> u64 {
    let mut hash = seed;
    for &b in bytes {
        hash ^= b as u64;
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

/// Per-seed hash used to order one ring. Uniform across `seed` because the
/// seed is mixed into the hash's starting state rather than appended to the
/// input, so adjacent seeds do not produce correlated orderings.
pub fn ring_hash(endpoint: &Endpoint, seed: u32) -> u64 {
    let basis = fnv1a(FNV_OFFSET_BASIS, &seed.to_le_bytes());
    let mut h = fnv1a(basis, endpoint.hostname());
    h = fnv1a(h, &endpoint.port().to_le_bytes());
    h
}

/// The fixed, unseeded 64-bit hash used by the configuration-id algorithm of
/// §6. Deliberately a different call shape than [`ring_hash`] — reusing the
/// seeded hash with `seed=0` would still be deterministic, but would make the
/// two concerns (ring placement vs. configuration identity) accidentally
/// coupled to the same constant.
pub fn h64(bytes: &[u8]) -> u64 {
    fnv1a(FNV_OFFSET_BASIS, bytes)
}

/// Wrapping combination used by the configuration-id accumulator: order of
/// application does not matter, so the accumulation is commutative.
pub fn wrapping_add(a: u64, b: u64) -> u64 {
    a.wrapping_add(b)
}

/// An endpoint set ordered by `ring_hash(_, seed)`, breaking ties on the
/// endpoint itself so the order is total even under a hash collision.
#[derive(Clone, Debug, Default)]
pub struct SortableSet {
    seed: u32,
    order: Vec<Endpoint>,
}

impl SortableSet {
    pub fn new(seed: u32) -> Self {
        Self {
            seed,
            order: Vec::new(),
        }
    }

    fn key(&self, e: &Endpoint) -> (u64, Endpoint) {
        (ring_hash(e, self.seed), e.clone())
    }

    fn position_of(&self, e: &Endpoint) -> Result<usize, usize> {
        let target = self.key(e);
        self.order
            .binary_search_by_key(&target, |existing| self.key(existing))
    }

    /// Inserts `e`, keeping the set sorted. No-op if already present.
    pub fn insert(&mut self, e: Endpoint) {
        if let Err(idx) = self.position_of(&e) {
            self.order.insert(idx, e);
        }
    }

    /// Removes `e` if present. Returns whether it was present.
    pub fn remove(&mut self, e: &Endpoint) -> bool {
        match self.position_of(e) {
            Ok(idx) => {
                self.order.remove(idx);
                true
            }
            Err(_) => false,
        }
    }

    pub fn contains(&self, e: &Endpoint) -> bool {
        self.position_of(e).is_ok()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Endpoint> {
        self.order.iter()
    }

    /// The ring-successor of `e`, wrapping to the first element. `None` if
    /// `e` is not present or the ring has fewer than 2 members.
    pub fn successor(&self, e: &Endpoint) -> Option<&Endpoint> {
        if self.order.len() < 2 {
            return None;
        }
        let idx = self.position_of(e).ok()?;
        Some(&self.order[(idx + 1) % self.order.len()])
    }

    /// The ring-predecessor of `e`, wrapping to the last element.
    pub fn predecessor(&self, e: &Endpoint) -> Option<&Endpoint> {
        if self.order.len() < 2 {
            return None;
        }
        let idx = self.position_of(e).ok()?;
        let prev = if idx == 0 { self.order.len() - 1 } else { idx - 1 };
        Some(&self.order[prev])
    }

    /// Where `e` (not necessarily present) would land, and what its successor
    /// would be once inserted — used by `expectedObserversOf` for an endpoint
    /// that has not yet joined the ring.
    pub fn lower_successor(&self, e: &Endpoint) -> Option<&Endpoint> {
        if self.order.is_empty() {
            return None;
        }
        if self.order.len() == 1 {
            return Some(&self.order[0]);
        }
        let target = self.key(e);
        let idx = match self
            .order
            .binary_search_by_key(&target, |existing| self.key(existing))
        {
            Ok(i) => i,
            Err(i) => i,
        };
        Some(&self.order[idx % self.order.len()])
    }
}
