//! Selection logic: decides which members of a LAG may aggregate.
//!
//! [`select`] is a pure function over a snapshot of the LAG's members. The
//! steps, in order:
//!
//! 1. Disabled members are unselected.
//! 2. Members are partitioned by aggregation key. The partition holding the
//!    LAG's own key wins, otherwise the partition of the best-ordered member.
//! 3. Members are ordered by port priority, port number, then the partner's
//!    port priority and number.
//! 4. Dynamic LAGs only: members are grouped by partner (system priority,
//!    system MAC, key). The group with the best partner system wins, then the
//!    larger group, then the lower partner key. Members without a partner
//!    win only when nobody has one.
//! 5. Members whose known speed differs from the first ordered member with a
//!    known speed are unselected.
//! 6. At most `max_members` are selected, the rest are standby.

use std::collections::{BTreeMap, HashMap};

use sonic_types::{PortId, SystemId};

use crate::types::{IfIndex, Selection, UnselectedReason};

/// Identity of a partner aggregator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PartnerId {
    pub system: SystemId,
    pub key: u16,
}

/// One member as the selection logic sees it.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub ifx: IfIndex,
    pub enabled: bool,
    pub key: u16,
    pub port: PortId,
    /// `None` when no partner is known (defaulted).
    pub partner: Option<PartnerId>,
    pub partner_port: PortId,
    pub speed: Option<u32>,
}

impl Candidate {
    fn order(&self) -> (PortId, PortId, IfIndex) {
        (self.port, self.partner_port, self.ifx)
    }
}

#[derive(Debug, Clone)]
pub struct SelectionInput<'a> {
    pub lag_key: u16,
    pub dynamic: bool,
    pub max_members: usize,
    pub candidates: &'a [Candidate],
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionOutput {
    pub decisions: BTreeMap<IfIndex, Selection>,
    /// Selected members, best first.
    pub active: Vec<IfIndex>,
}

impl SelectionOutput {
    pub fn decision(&self, ifx: IfIndex) -> Selection {
        self.decisions.get(&ifx).copied().unwrap_or_default()
    }
}

/// Runs the selection logic over one LAG.
pub fn select(input: &SelectionInput<'_>) -> SelectionOutput {
    fn reject(out: &mut SelectionOutput, c: &Candidate, reason: UnselectedReason) {
        out.decisions.insert(c.ifx, Selection::Unselected(reason));
    }

    let mut out = SelectionOutput::default();

    let mut pool: Vec<&Candidate> = Vec::new();
    for c in input.candidates {
        if c.enabled {
            pool.push(c);
        } else {
            reject(&mut out, c, UnselectedReason::Disabled);
        }
    }
    pool.sort_by_key(|c| c.order());

    let Some(first) = pool.first() else {
        return out;
    };

    let winning_key = if pool.iter().any(|c| c.key == input.lag_key) {
        input.lag_key
    } else {
        first.key
    };
    pool.retain(|c| {
        let keep = c.key == winning_key;
        if !keep {
            reject(&mut out, c, UnselectedReason::KeyMismatch);
        }
        keep
    });

    if input.dynamic {
        if let Some(winner) = winning_partner(&pool) {
            pool.retain(|c| {
                let keep = c.partner == Some(winner);
                if !keep {
                    let reason = if c.partner.is_some() {
                        UnselectedReason::PartnerMismatch
                    } else {
                        UnselectedReason::NoPartner
                    };
                    reject(&mut out, c, reason);
                }
                keep
            });
        }
    }

    if let Some(reference) = pool.iter().find_map(|c| c.speed) {
        pool.retain(|c| {
            let keep = c.speed.map_or(true, |s| s == reference);
            if !keep {
                reject(&mut out, c, UnselectedReason::SpeedMismatch);
            }
            keep
        });
    }

    for (rank, c) in pool.iter().enumerate() {
        if rank < input.max_members {
            out.decisions.insert(c.ifx, Selection::Selected);
            out.active.push(c.ifx);
        } else {
            out.decisions.insert(c.ifx, Selection::Standby);
        }
    }
    out
}

/// Best live partner among `pool`, `None` if nobody has a partner.
fn winning_partner(pool: &[&Candidate]) -> Option<PartnerId> {
    let mut groups: HashMap<PartnerId, usize> = HashMap::new();
    for partner in pool.iter().filter_map(|c| c.partner) {
        *groups.entry(partner).or_default() += 1;
    }
    groups
        .into_iter()
        .min_by(|(a, a_len), (b, b_len)| {
            a.system
                .cmp(&b.system)
                .then(b_len.cmp(a_len))
                .then(a.key.cmp(&b.key))
        })
        .map(|(partner, _)| partner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use sonic_types::MacAddress;

    fn mac(last: u8) -> MacAddress {
        MacAddress::new([0x52, 0x54, 0, 0, 0, last])
    }

    fn partner(priority: u16, mac_last: u8, key: u16) -> Option<PartnerId> {
        Some(PartnerId {
            system: SystemId::new(priority, mac(mac_last)),
            key,
        })
    }

    fn candidate(ifx: usize, port_number: u16) -> Candidate {
        Candidate {
            ifx: IfIndex(ifx),
            enabled: true,
            key: 1,
            port: PortId::new(1, port_number),
            partner: partner(100, 1, 7),
            partner_port: PortId::new(1, port_number),
            speed: Some(100_000),
        }
    }

    fn run(candidates: &[Candidate], max_members: usize) -> SelectionOutput {
        select(&SelectionInput {
            lag_key: 1,
            dynamic: true,
            max_members,
            candidates,
        })
    }

    #[test]
    fn test_all_compatible_selected_in_order() {
        let candidates = vec![candidate(0, 3), candidate(1, 1), candidate(2, 2)];
        let out = run(&candidates, 8);

        assert_eq!(out.active, vec![IfIndex(1), IfIndex(2), IfIndex(0)]);
        assert!(out.decisions.values().all(|s| s.is_selected()));
    }

    #[test]
    fn test_disabled_members() {
        let mut candidates = vec![candidate(0, 1), candidate(1, 2)];
        candidates[0].enabled = false;
        let out = run(&candidates, 8);

        assert_eq!(
            out.decision(IfIndex(0)),
            Selection::Unselected(UnselectedReason::Disabled)
        );
        assert_eq!(out.active, vec![IfIndex(1)]);
    }

    #[test]
    fn test_key_partition_prefers_lag_key() {
        let mut candidates = vec![candidate(0, 1), candidate(1, 2)];
        candidates[0].key = 5;
        let out = run(&candidates, 8);

        assert_eq!(
            out.decision(IfIndex(0)),
            Selection::Unselected(UnselectedReason::KeyMismatch)
        );
        assert_eq!(out.decision(IfIndex(1)), Selection::Selected);
    }

    #[test]
    fn test_key_partition_without_lag_key() {
        let mut candidates = vec![candidate(0, 2), candidate(1, 1)];
        candidates[0].key = 5;
        candidates[1].key = 6;
        let out = run(&candidates, 8);

        // Best-ordered member (port 1) decides the key.
        assert_eq!(out.decision(IfIndex(1)), Selection::Selected);
        assert_eq!(
            out.decision(IfIndex(0)),
            Selection::Unselected(UnselectedReason::KeyMismatch)
        );
    }

    #[test]
    fn test_lower_partner_system_priority_wins() {
        let mut candidates = vec![candidate(0, 1), candidate(1, 2), candidate(2, 3)];
        // Two members reach a system with a worse priority but lower MAC.
        candidates[0].partner = partner(200, 0, 7);
        candidates[1].partner = partner(200, 0, 7);
        candidates[2].partner = partner(100, 9, 7);
        let out = run(&candidates, 8);

        assert_eq!(out.active, vec![IfIndex(2)]);
        assert_eq!(
            out.decision(IfIndex(0)),
            Selection::Unselected(UnselectedReason::PartnerMismatch)
        );
    }

    #[test]
    fn test_equal_partner_systems_prefer_larger_group() {
        let mut candidates = vec![candidate(0, 1), candidate(1, 2), candidate(2, 3)];
        candidates[0].partner = partner(100, 1, 3);
        let out = run(&candidates, 8);

        assert_eq!(out.active, vec![IfIndex(1), IfIndex(2)]);
        assert_eq!(
            out.decision(IfIndex(0)),
            Selection::Unselected(UnselectedReason::PartnerMismatch)
        );
    }

    #[test]
    fn test_no_partner_group() {
        let mut candidates = vec![candidate(0, 1), candidate(1, 2)];
        candidates[0].partner = None;
        let out = run(&candidates, 8);
        assert_eq!(
            out.decision(IfIndex(0)),
            Selection::Unselected(UnselectedReason::NoPartner)
        );
        assert_eq!(out.decision(IfIndex(1)), Selection::Selected);

        // Nobody has a partner: all of them are selected.
        candidates[1].partner = None;
        let out = run(&candidates, 8);
        assert_eq!(out.active, vec![IfIndex(0), IfIndex(1)]);
    }

    #[test]
    fn test_speed_mismatch() {
        let mut candidates = vec![candidate(0, 1), candidate(1, 2), candidate(2, 3)];
        candidates[0].speed = None;
        candidates[2].speed = Some(10_000);
        let out = run(&candidates, 8);

        assert_eq!(out.active, vec![IfIndex(0), IfIndex(1)]);
        assert_eq!(
            out.decision(IfIndex(2)),
            Selection::Unselected(UnselectedReason::SpeedMismatch)
        );
    }

    #[test]
    fn test_port_priority_decides_standby() {
        let mut candidates = vec![candidate(0, 1), candidate(1, 2)];
        candidates[0].port = PortId::new(200, 1);
        candidates[1].port = PortId::new(100, 2);
        let out = run(&candidates, 1);

        assert_eq!(out.decision(IfIndex(1)), Selection::Selected);
        assert_eq!(out.decision(IfIndex(0)), Selection::Standby);
    }

    #[test]
    fn test_partner_port_breaks_ties() {
        let mut candidates = vec![candidate(0, 1), candidate(1, 1)];
        candidates[0].partner_port = PortId::new(1, 9);
        candidates[1].partner_port = PortId::new(1, 4);
        let out = run(&candidates, 1);

        assert_eq!(out.active, vec![IfIndex(1)]);
    }

    #[test]
    fn test_static_mode_ignores_partners() {
        let mut candidates = vec![candidate(0, 1), candidate(1, 2)];
        candidates[0].partner = None;
        candidates[1].partner = partner(1, 1, 1);
        let out = select(&SelectionInput {
            lag_key: 1,
            dynamic: false,
            max_members: 8,
            candidates: &candidates,
        });
        assert_eq!(out.active, vec![IfIndex(0), IfIndex(1)]);
    }

    #[test]
    fn test_empty_lag() {
        let out = run(&[], 8);
        assert_eq!(out, SelectionOutput::default());
        assert_eq!(out.decision(IfIndex(4)), Selection::default());
    }
}
