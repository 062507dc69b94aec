use vindex_types::constants::PROPOSER_SCHEDULE_RESOLUTION;
use vindex_types::primitives::{Address, Height, Round};
use vindex_types::validator::ValidatorSetSnapshot;

/// Stake-weighted proposer rotation.
///
/// Weights are normalised so the largest validator gets
/// `PROPOSER_SCHEDULE_RESOLUTION` slots and every member at least one, then
/// laid out by smooth weighted round-robin so a heavy validator's slots are
/// spread across the cycle instead of bunched together.
#[derive(Debug, Clone, Default)]
pub struct ProposerSchedule {
    members: Vec<Address>,
    slots: Vec<usize>,
}

impl ProposerSchedule {
    /// Build the schedule for a validator set snapshot.
    pub fn new(snapshot: &ValidatorSetSnapshot) -> Self {
        let members: Vec<Address> = snapshot.members.iter().map(|m| m.address).collect();
        let max_power = snapshot.members.iter().map(|m| m.power).max().unwrap_or(0);
        if members.is_empty() || max_power == 0 {
            return Self {
                slots: (0..members.len()).collect(),
                members,
            };
        }

        let resolution = PROPOSER_SCHEDULE_RESOLUTION as u128;
        let weights: Vec<i64> = snapshot
            .members
            .iter()
            .map(|m| (m.power.saturating_mul(resolution) / max_power).max(1) as i64)
            .collect();
        let total: i64 = weights.iter().sum();

        let mut current = vec![0i64; weights.len()];
        let mut slots = Vec::with_capacity(total as usize);
        for _ in 0..total {
            for (c, w) in current.iter_mut().zip(&weights) {
                *c += w;
            }
            // Ties go to the earlier member in snapshot order.
            let mut pick = 0;
            for i in 1..current.len() {
                if current[i] > current[pick] {
                    pick = i;
                }
            }
            current[pick] -= total;
            slots.push(pick);
        }
        Self { members, slots }
    }

    pub fn cycle_len(&self) -> usize {
        self.slots.len()
    }

    /// Proposer for `(height, round)`.
    ///
    /// Round `r` picks the `r`-th distinct validator met walking the cycle
    /// forward from the height's base slot, so consecutive rounds always try
    /// different validators.
    pub fn proposer(&self, height: Height, round: Round) -> Option<&Address> {
        if self.slots.is_empty() {
            return None;
        }
        let wanted = round as usize % self.members.len();
        let start = (height % self.slots.len() as u64) as usize;
        let mut seen: Vec<usize> = Vec::with_capacity(wanted + 1);
        for offset in 0..self.slots.len() {
            let member = self.slots[(start + offset) % self.slots.len()];
            if !seen.contains(&member) {
                if seen.len() == wanted {
                    return self.members.get(member);
                }
                seen.push(member);
            }
        }
        None
    }

    pub fn is_proposer(&self, height: Height, round: Round, address: &Address) -> bool {
        self.proposer(height, round) == Some(address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{BTreeMap, HashSet};
    use vindex_types::validator::ValidatorPower;

    fn snapshot(powers: &[(u8, u128)]) -> ValidatorSetSnapshot {
        ValidatorSetSnapshot::new(
            0,
            powers
                .iter()
                .map(|(b, p)| ValidatorPower {
                    address: [*b; 20],
                    pubkey: [*b; 32],
                    power: *p,
                })
                .collect(),
        )
    }

    #[test]
    fn test_frequencies_follow_stake() {
        let schedule = ProposerSchedule::new(&snapshot(&[(1, 1000), (2, 2000), (3, 3000)]));
        let mut counts: BTreeMap<Address, usize> = BTreeMap::new();
        for h in 0..schedule.cycle_len() as u64 {
            *counts.entry(*schedule.proposer(h, 0).unwrap()).or_default() += 1;
        }
        assert_eq!(counts[&[1u8; 20]], 333);
        assert_eq!(counts[&[2u8; 20]], 666);
        assert_eq!(counts[&[3u8; 20]], 1000);
    }

    #[test]
    fn test_small_stake_gets_a_slot() {
        let schedule = ProposerSchedule::new(&snapshot(&[(1, 1), (2, 1_000_000_000)]));
        let proposers: HashSet<Address> = (0..schedule.cycle_len() as u64)
            .map(|h| *schedule.proposer(h, 0).unwrap())
            .collect();
        assert_eq!(proposers.len(), 2);
    }

    #[test]
    fn test_rounds_pick_distinct_proposers() {
        let schedule = ProposerSchedule::new(&snapshot(&[(1, 10), (2, 50), (3, 40), (4, 5)]));
        for height in [0u64, 7, 123] {
            let picks: Vec<Address> = (0..4)
                .map(|r| *schedule.proposer(height, r).unwrap())
                .collect();
            let distinct: HashSet<&Address> = picks.iter().collect();
            assert_eq!(distinct.len(), 4);
            assert_eq!(schedule.proposer(height, 4), schedule.proposer(height, 0));
        }
    }

    #[test]
    fn test_deterministic() {
        let snap = snapshot(&[(1, 7), (2, 9), (3, 9)]);
        let a = ProposerSchedule::new(&snap);
        let b = ProposerSchedule::new(&snap);
        for h in 0..50 {
            assert_eq!(a.proposer(h, 1), b.proposer(h, 1));
        }
    }

    #[test]
    fn test_empty_and_single() {
        let empty = ProposerSchedule::new(&ValidatorSetSnapshot::default());
        assert_eq!(empty.proposer(0, 0), None);

        let single = ProposerSchedule::new(&snapshot(&[(1, 5)]));
        for r in 0..3 {
            assert!(single.is_proposer(9, r, &[1u8; 20]));
        }
    }
}
