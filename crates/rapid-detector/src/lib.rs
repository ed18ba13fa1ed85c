//! `MultiNodeCutDetector`: aggregates per-edge alerts into a view-change
//! proposal once enough independent observers (the high watermark `H`) have
//! reported a status change for the same destination, giving
//! "almost-everywhere agreement" on the proposal before consensus ever runs
//! (§4.C). A fresh instance replaces the old one on every configuration
//! change — see [`MultiNodeCutDetector::reset`].

use rapid_core::{Alert, EdgeStatus, Endpoint, RapidSettings};
use rapid_membership::MembershipView;
use std::collections::{HashMap, HashSet};

pub struct MultiNodeCutDetector {
    k: u32,
    h: u32,
    l: u32,
    reports: HashMap<Endpoint, HashMap<u32, Endpoint>>,
    pre_proposal: HashSet<Endpoint>,
    proposal: HashSet<Endpoint>,
    updates_in_progress: u32,
    seen_link_down_events: bool,
    proposal_count: u64,
}

impl MultiNodeCutDetector {
    pub fn new(k: u32, h: u32, l: u32) -> Self {
        debug_assert!(l > 0 && l <= h && h <= k, "watermarks must satisfy 0 < L <= H <= K");
        Self {
            k,
            h,
            l,
            reports: HashMap::new(),
            pre_proposal: HashSet::new(),
            proposal: HashSet::new(),
            updates_in_progress: 0,
            seen_link_down_events: false,
            proposal_count: 0,
        }
    }

    pub fn from_settings(settings: &RapidSettings) -> Self {
        Self::new(settings.k, settings.h, settings.l)
    }

    /// §4.C supplement: a fresh detector for a new configuration. The
    /// distilled spec names "replace the consensus instances per
    /// configuration change" under Lifecycle rather than giving the detector
    /// its own entry point; this is that entry point.
    pub fn reset(&mut self) {
        *self = Self::new(self.k, self.h, self.l);
    }

    pub fn proposal_count(&self) -> u64 {
        self.proposal_count
    }

    pub fn k(&self) -> u32 {
        self.k
    }

    /// §4.C `aggregate`. Each ring number in `alert` is counted independently
    /// toward `alert.edge_dst`'s report set; a destination enters
    /// `pre_proposal` on crossing `L`, moves to `proposal` on crossing `H`,
    /// and the accumulated proposal is emitted (and cleared) the moment the
    /// process-wide `updates_in_progress` counter drains back to zero.
    pub fn aggregate(&mut self, alert: &Alert) -> Vec<Endpoint> {
        if alert.edge_status == EdgeStatus::Down {
            self.seen_link_down_events = true;
        }

        let dst = alert.edge_dst.clone();
        for &ring in &alert.ring_numbers {
            let dst_reports = self.reports.entry(dst.clone()).or_default();
            if dst_reports.contains_key(&ring) {
                continue;
            }
            dst_reports.insert(ring, alert.edge_src.clone());
            let count = dst_reports.len() as u32;

            if count == self.l {
                self.updates_in_progress += 1;
                self.pre_proposal.insert(dst.clone());
            }
            if count == self.h {
                self.pre_proposal.remove(&dst);
                self.proposal.insert(dst.clone());
                self.updates_in_progress -= 1;
            }
        }

        if self.updates_in_progress == 0 && !self.proposal.is_empty() {
            let out: Vec<Endpoint> = self.proposal.drain().collect();
            self.proposal_count += 1;
            return out;
        }
        Vec::new()
    }

    /// §4.C `invalidateFailingEdges`. Only engages once a `DOWN` alert has
    /// been observed this configuration. For every destination still stuck in
    /// `pre_proposal`, forges a report from each of its observers that is
    /// itself already unstable (in `proposal` or `pre_proposal`) — such an
    /// observer may never get to report on its own, since it is itself on its
    /// way out. This pushes straddling destinations past `H` once their
    /// monitors have entered the unstable band.
    pub fn invalidate_failing_edges(
        &mut self,
        view: &mut MembershipView,
        configuration_id: u64,
    ) -> Vec<Endpoint> {
        if !self.seen_link_down_events {
            return Vec::new();
        }

        let unstable: HashSet<Endpoint> = self
            .proposal
            .iter()
            .chain(self.pre_proposal.iter())
            .cloned()
            .collect();
        let pending: Vec<Endpoint> = self.pre_proposal.iter().cloned().collect();

        let mut produced = Vec::new();
        for n in pending {
            for observer in view.observers_of(&n) {
                if !unstable.contains(&observer) {
                    continue;
                }
                let ring_numbers = view.ring_numbers(&observer, &n);
                if ring_numbers.is_empty() {
                    continue;
                }
                let status = if view.contains(&n) {
                    EdgeStatus::Down
                } else {
                    EdgeStatus::Up
                };
                let alert = Alert::new(observer, n.clone(), status, configuration_id, ring_numbers);
                produced.extend(self.aggregate(&alert));
            }
        }
        produced
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rapid_core::NodeId;
    use rapid_membership::MembershipView;

    fn ep(host: &str, port: u16) -> Endpoint {
        Endpoint::from((host, port))
    }

    fn down_alert(src: Endpoint, dst: Endpoint, rings: Vec<u32>) -> Alert {
        Alert::new(src, dst, EdgeStatus::Down, 0, rings)
    }

    #[test]
    fn withholds_proposal_until_h_reports() {
        let mut d = MultiNodeCutDetector::new(10, 8, 2);
        let dst = ep("A", 1);
        for i in 0..7u32 {
            let src = ep(&format!("src-{i}"), 2000 + i as u16);
            let out = d.aggregate(&down_alert(src, dst.clone(), vec![i]));
            assert!(out.is_empty());
        }
        let out = d.aggregate(&down_alert(ep("src-7", 2007), dst.clone(), vec![7]));
        assert_eq!(out, vec![dst]);
    }

    #[test]
    fn withholds_until_second_destination_also_crosses_h() {
        // §8 S5: K=10, H=8, L=2. A one-element proposal for A is withheld
        // while B sits between L and H; once B also reaches H, a
        // two-element proposal is emitted.
        let mut d = MultiNodeCutDetector::new(10, 8, 2);
        let a = ep("A", 1);
        let b = ep("B", 2);

        for i in 0..8u32 {
            let src = ep(&format!("src-{i}"), 3000 + i as u16);
            let out = d.aggregate(&down_alert(src, a.clone(), vec![i]));
            assert!(out.is_empty(), "A must not be emitted alone while B is still in-flight");
            // keep B between L and H (never let it reach H independently yet)
            if i < 3 {
                let src_b = ep(&format!("srcb-{i}"), 4000 + i as u16);
                d.aggregate(&down_alert(src_b, b.clone(), vec![i]));
            }
        }

        // Push B over H now.
        let mut out = Vec::new();
        for i in 3..8u32 {
            let src_b = ep(&format!("srcb-{i}"), 4000 + i as u16);
            out = d.aggregate(&down_alert(src_b, b.clone(), vec![i]));
        }
        assert_eq!(out.len(), 2);
        assert!(out.contains(&a));
        assert!(out.contains(&b));
    }

    #[test]
    fn cut_detector_determinism_under_reordering() {
        let dst = ep("A", 1);
        let reports: Vec<(Endpoint, u32)> = (0..8u32)
            .map(|i| (ep(&format!("src-{i}"), 5000 + i as u16), i))
            .collect();

        let mut forward = MultiNodeCutDetector::new(10, 8, 2);
        let mut out_forward = Vec::new();
        for (src, ring) in &reports {
            out_forward = forward.aggregate(&down_alert(src.clone(), dst.clone(), vec![*ring]));
        }

        let mut backward = MultiNodeCutDetector::new(10, 8, 2);
        let mut out_backward = Vec::new();
        for (src, ring) in reports.iter().rev() {
            out_backward = backward.aggregate(&down_alert(src.clone(), dst.clone(), vec![*ring]));
        }

        assert_eq!(out_forward, out_backward);
        assert_eq!(forward.proposal_count(), backward.proposal_count());
    }

    #[test]
    fn reset_clears_all_accumulated_state() {
        let mut d = MultiNodeCutDetector::new(10, 8, 2);
        let dst = ep("A", 1);
        for i in 0..8u32 {
            d.aggregate(&down_alert(ep(&format!("s{i}"), 6000 + i as u16), dst.clone(), vec![i]));
        }
        assert_eq!(d.proposal_count(), 1);
        d.reset();
        assert_eq!(d.proposal_count(), 0);
        let out = d.aggregate(&down_alert(ep("s0", 6000), dst, vec![0]));
        assert!(out.is_empty());
    }

    #[test]
    fn invalidate_failing_edges_is_noop_without_a_down_alert() {
        let mut d = MultiNodeCutDetector::new(10, 8, 2);
        let mut view = MembershipView::new(10);
        for i in 0..5 {
            view.ring_add(ep(&format!("h{i}"), 7000 + i), NodeId::generate(), rapid_core::Metadata::new())
                .unwrap();
        }
        assert!(d.invalidate_failing_edges(&mut view, view.configuration().configuration_id).is_empty());
    }

    #[test]
    fn invalidate_failing_edges_pushes_straddling_node_past_h() {
        // Two-member ring: every ring's successor of `target` is `observer`
        // (§4.B's |ring|==2 duplicate-observer policy), so the topology here
        // is fully determined rather than hash-dependent.
        let mut view = MembershipView::new(3);
        let target = ep("target", 1);
        let observer = ep("observer", 2);
        view.ring_add(target.clone(), NodeId::generate(), rapid_core::Metadata::new())
            .unwrap();
        view.ring_add(observer.clone(), NodeId::generate(), rapid_core::Metadata::new())
            .unwrap();

        let mut d = MultiNodeCutDetector::new(3, 3, 1);

        // `target` gets one report (ring 0 only): crosses L(=1), short of H(=3).
        d.aggregate(&down_alert(observer.clone(), target.clone(), vec![0]));

        // `observer` is driven into `proposal` via 3 independent (synthetic)
        // reporters, one per ring. This does not yet emit anything: `target`
        // is still outstanding, holding `updates_in_progress` at 1.
        for ring in 0..3u32 {
            let out = d.aggregate(&down_alert(
                ep(&format!("reporter-{ring}"), 9000 + ring as u16),
                observer.clone(),
                vec![ring],
            ));
            assert!(out.is_empty());
        }

        let config_id = view.configuration().configuration_id;
        let produced = d.invalidate_failing_edges(&mut view, config_id);

        // `observer`'s remaining two rings (1, 2) against `target` are now
        // synthesized, pushing `target` to its third report and over H. Both
        // `observer` (already in `proposal`) and `target` drain together.
        assert_eq!(produced.len(), 2);
        assert!(produced.contains(&target));
        assert!(produced.contains(&observer));
        assert_eq!(d.proposal_count(), 1);
    }
}
