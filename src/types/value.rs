/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The value that Paxos rounds agree on.

use std::collections::BTreeMap;

use borsh::{BorshDeserialize, BorshSerialize};
use sha2::{Digest, Sha256};

use super::data_types::{ProposalId, SessionId};

/// Final content of every file a value writes. A `None` content deletes the file.
pub type Writes = BTreeMap<String, Option<Vec<u8>>>;

/// A flattened write set, as decided by a Paxos round and applied by every replica.
///
/// Two values are equal only if they carry the same [`ProposalId`], so a proposer can tell whether
/// the value decided in its round is the one it originally proposed.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct Value {
    pub proposal: ProposalId,
    /// Session of the snapshot this value was flattened from. `None` for values proposed directly
    /// through the `paxos_propose` administrative command.
    pub session: Option<SessionId>,
    pub writes: Writes,
}

impl Value {
    pub fn new(proposal: ProposalId, session: Option<SessionId>, writes: Writes) -> Self {
        Self {
            proposal,
            session,
            writes,
        }
    }

    /// SHA256 digest of the value's borsh encoding.
    pub fn digest(&self) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(self.try_to_vec().unwrap_or_default());
        hasher.finalize().into()
    }
}
