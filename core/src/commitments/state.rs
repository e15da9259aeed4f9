use shade_privacy::{CommitmentHash, MerklePath, TokenType};
use std::collections::BTreeMap;

/// A commitment rebuilt from history, position not yet verified
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncompleteCommitment {
    pub hash: CommitmentHash,
    /// Nonce of the transaction that produced it
    pub nonce: u64,
    pub token_type: TokenType,
    pub value: u64,
    pub amount: u64,
    pub fee: u64,
    /// First input spent by the producing transaction
    pub linked_input: Option<u64>,
}

/// A commitment confirmed present in the tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveCommitment {
    pub commitment: IncompleteCommitment,
    pub index: u64,
    pub opening: MerklePath,
}

impl ActiveCommitment {
    pub fn hash(&self) -> &CommitmentHash {
        &self.commitment.hash
    }

    pub fn value(&self) -> u64 {
        self.commitment.value
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum CommitmentPhase {
    Incomplete,
    Positioned,
    Active,
    Consumed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitmentState {
    /// Only a lower bound on the position is known
    Incomplete {
        commitment: IncompleteCommitment,
        hint: u64,
    },
    /// Position read from the commitment's own metadata
    Positioned {
        commitment: IncompleteCommitment,
        index: u64,
    },
    Active(ActiveCommitment),
    Consumed {
        commitment: IncompleteCommitment,
        consumed_by: u64,
    },
}

impl CommitmentState {
    pub fn phase(&self) -> CommitmentPhase {
        match self {
            CommitmentState::Incomplete { .. } => CommitmentPhase::Incomplete,
            CommitmentState::Positioned { .. } => CommitmentPhase::Positioned,
            CommitmentState::Active(_) => CommitmentPhase::Active,
            CommitmentState::Consumed { .. } => CommitmentPhase::Consumed,
        }
    }

    pub fn commitment(&self) -> &IncompleteCommitment {
        match self {
            CommitmentState::Incomplete { commitment, .. }
            | CommitmentState::Positioned { commitment, .. }
            | CommitmentState::Consumed { commitment, .. } => commitment,
            CommitmentState::Active(active) => &active.commitment,
        }
    }
}

/// Per-nonce commitment states. Phases only move forward.
#[derive(Debug, Default)]
pub(crate) struct CommitmentStore {
    states: BTreeMap<u64, CommitmentState>,
}

impl CommitmentStore {
    /// Apply `next` unless it would move the commitment backwards.
    ///
    /// An active commitment may be replaced by a fresher opening.
    pub fn advance(&mut self, next: CommitmentState) -> bool {
        let nonce = next.commitment().nonce;
        let apply = match self.states.get(&nonce) {
            None => true,
            Some(current) => {
                next.phase() > current.phase()
                    || (next.phase() == CommitmentPhase::Active
                        && current.phase() == CommitmentPhase::Active)
            }
        };
        if apply {
            self.states.insert(nonce, next);
        }
        apply
    }

    /// Mark the output of `nonce` as spent by `consumer`
    pub fn consume(&mut self, nonce: u64, consumer: u64) -> bool {
        let Some(current) = self.states.get(&nonce) else {
            return false;
        };
        let next = CommitmentState::Consumed {
            commitment: current.commitment().clone(),
            consumed_by: consumer,
        };
        self.advance(next)
    }

    pub fn get(&self, nonce: u64) -> Option<&CommitmentState> {
        self.states.get(&nonce)
    }

    /// Known (token, value) of the output produced at `nonce`
    pub fn value_of(&self, nonce: u64) -> Option<(TokenType, u64)> {
        self.states
            .get(&nonce)
            .map(|state| (state.commitment().token_type, state.commitment().value))
    }
}
