use std::fmt;

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use crate::primitives::*;

/// Lifecycle status of a validator.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    BorshSerialize,
    BorshDeserialize,
    Serialize,
    Deserialize,
)]
pub enum ValidatorStatus {
    /// In the active set; counts toward voting power.
    Bonded,
    /// Left the active set; waiting out the unbonding period.
    Unbonding,
    /// Registered but not in the active set.
    Unbonded,
    /// Removed for a consensus fault; must unjail to re-enter.
    Jailed,
}

impl ValidatorStatus {
    /// Whether the status machine permits moving from `self` to `next`.
    pub fn can_transition_to(self, next: ValidatorStatus) -> bool {
        use ValidatorStatus::*;
        matches!(
            (self, next),
            (Unbonded, Bonded)
                | (Unbonding, Bonded)
                | (Bonded, Unbonding)
                | (Unbonding, Unbonded)
                | (Bonded, Jailed)
                | (Unbonding, Jailed)
                | (Unbonded, Jailed)
                | (Jailed, Unbonded)
        )
    }
}

impl fmt::Display for ValidatorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ValidatorStatus::Bonded => "bonded",
            ValidatorStatus::Unbonding => "unbonding",
            ValidatorStatus::Unbonded => "unbonded",
            ValidatorStatus::Jailed => "jailed",
        };
        f.write_str(s)
    }
}

/// A registered validator and its bonded-stake pool.
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct Validator {
    /// Operator address, BLAKE3(pubkey)[0..20].
    pub address: Address,
    /// Consensus signing key.
    pub pubkey: PublicKey,
    /// Bonded stake currently attributed to this validator.
    pub tokens: Amount,
    /// Total shares issued to delegators.
    pub delegator_shares: Shares,
    pub status: ValidatorStatus,
    /// Set while `status == Unbonding`.
    pub unbonding_until: Option<Timestamp>,
}

/// A buffered validator status change, applied at the next epoch boundary.
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct StatusChange {
    pub validator: Address,
    pub target: ValidatorStatus,
}

/// An undelegation waiting for its completion time.
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct UnbondingEntry {
    pub id: u64,
    pub delegator: Address,
    pub validator: Address,
    pub amount: Amount,
    pub created_at: Timestamp,
    /// Block time at or after which the amount is credited back.
    pub completion_time: Timestamp,
}

/// A member of the active validator set with its frozen voting power.
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct ValidatorPower {
    pub address: Address,
    pub pubkey: PublicKey,
    pub power: Amount,
}

/// The active validator set, frozen at an epoch boundary.
///
/// Consensus only ever reads voting power from a snapshot, so stake changes
/// inside an epoch never affect in-flight voting.
#[derive(
    Debug, Clone, Default, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize,
)]
pub struct ValidatorSetSnapshot {
    pub epoch: u64,
    /// Members sorted by power descending, then address ascending.
    pub members: Vec<ValidatorPower>,
    pub total_power: Amount,
}

impl ValidatorSetSnapshot {
    /// Build a snapshot, ordering members canonically.
    pub fn new(epoch: u64, mut members: Vec<ValidatorPower>) -> Self {
        members.sort_by(|a, b| b.power.cmp(&a.power).then(a.address.cmp(&b.address)));
        let total_power = members.iter().map(|m| m.power).sum();
        Self {
            epoch,
            members,
            total_power,
        }
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn get(&self, address: &Address) -> Option<&ValidatorPower> {
        self.members.iter().find(|m| &m.address == address)
    }

    pub fn contains(&self, address: &Address) -> bool {
        self.get(address).is_some()
    }

    /// True if `power` is strictly more than two thirds of the total.
    pub fn is_supermajority(&self, power: Amount) -> bool {
        power.saturating_mul(3) > self.total_power.saturating_mul(2)
    }

    /// True if `power` is more than a third of the total, so at least one
    /// honest validator is behind it.
    pub fn exceeds_one_third(&self, power: Amount) -> bool {
        power.saturating_mul(3) > self.total_power
    }

    /// Smallest power that forms a supermajority.
    pub fn quorum_threshold(&self) -> Amount {
        self.total_power.saturating_mul(2) / 3 + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn member(byte: u8, power: Amount) -> ValidatorPower {
        ValidatorPower {
            address: [byte; 20],
            pubkey: [byte; 32],
            power,
        }
    }

    #[test]
    fn test_status_transitions() {
        use ValidatorStatus::*;
        assert!(Unbonded.can_transition_to(Bonded));
        assert!(Bonded.can_transition_to(Unbonding));
        assert!(Unbonding.can_transition_to(Unbonded));
        assert!(Bonded.can_transition_to(Jailed));
        assert!(Jailed.can_transition_to(Unbonded));

        assert!(!Jailed.can_transition_to(Bonded));
        assert!(!Unbonded.can_transition_to(Unbonding));
        assert!(!Bonded.can_transition_to(Unbonded));
        assert!(!Bonded.can_transition_to(Bonded));
    }

    #[test]
    fn test_snapshot_ordering() {
        let snap = ValidatorSetSnapshot::new(0, vec![member(1, 10), member(3, 30), member(2, 30)]);
        let order: Vec<u8> = snap.members.iter().map(|m| m.address[0]).collect();
        assert_eq!(order, vec![2, 3, 1]);
        assert_eq!(snap.total_power, 70);
    }

    #[test]
    fn test_supermajority_threshold() {
        let snap = ValidatorSetSnapshot::new(0, vec![member(1, 1000), member(2, 2000), member(3, 3000)]);
        assert_eq!(snap.quorum_threshold(), 4001);
        assert!(!snap.is_supermajority(4000));
        assert!(snap.is_supermajority(4001));
        assert!(!snap.is_supermajority(3000));
        assert!(snap.is_supermajority(5000));
        assert!(!snap.exceeds_one_third(2000));
        assert!(snap.exceeds_one_third(2001));
    }
}
