/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Durable, append-only record of the state a node relies on across crashes.
//!
//! Every piece of state that other nodes or clients may have observed is appended to the [`Journal`]
//! *before* the in-memory state changes: promises and accepted values, proposed rounds, learned
//! values, peer-set additions, issued ids, the last committed session, completed transactions,
//! in-progress applies of decided values, and pending client commands. Components expose explicit
//! setters that perform the journal append and the state mutation together.
//!
//! At startup a [`Node`](crate::node::Node) replays the journal in order, handing every entry to each
//! component's `restore` method, before it accepts any message.

use std::{
    fmt::{self, Display, Formatter},
    sync::{Arc, Mutex, PoisonError},
};

use borsh::{BorshDeserialize, BorshSerialize};

use crate::{
    networking::codec::{self, CodecError},
    types::{
        data_types::{NodeAddress, ProposalId, SequenceNumber, SessionId, TransactionId},
        value::{Value, Writes},
    },
};

pub trait Journal: Send + 'static {
    /// Durably append an entry. When this returns `Ok`, the entry must survive a crash.
    fn append(&mut self, entry: &JournalEntry) -> Result<(), JournalError>;

    /// Read back every entry appended so far, oldest first.
    fn replay(&self) -> Result<Vec<JournalEntry>, JournalError>;
}

#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub enum JournalEntry {
    // Acceptor.
    Promised { seq: SequenceNumber },
    Accepted { seq: SequenceNumber, value: Value },

    // Proposer.
    Proposed { seq: SequenceNumber, value: Value },

    // Learner.
    Learned { seq: SequenceNumber, value: Value },

    // Membership.
    PeerAdded { peer: NodeAddress },

    // Transaction coordinator.
    SessionIssued { session: SessionId },
    ProposalIssued { counter: u64 },
    Committed { session: SessionId },
    TransactionCompleted { origin: NodeAddress, txn: TransactionId },
    ApplyStarted { proposal: ProposalId, writes: Writes },
    ApplyFinished { proposal: ProposalId },

    // Client.
    TransactionIssued { txn: TransactionId },
    CommandIssued { command: String },
    CommandCompleted { command: String },
}

#[derive(Debug)]
pub enum JournalError {
    CodecError(CodecError),

    /// The journal's backing store cannot be written to or read from.
    Unavailable(String),
}

impl Display for JournalError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            JournalError::CodecError(err) => write!(f, "journal entry {}", err),
            JournalError::Unavailable(reason) => write!(f, "journal unavailable: {}", reason),
        }
    }
}

impl From<CodecError> for JournalError {
    fn from(value: CodecError) -> Self {
        JournalError::CodecError(value)
    }
}

/// In-memory [`Journal`] that stores encoded entries. Clones share the same entries, so a journal
/// outlives the node that wrote it and can be handed to a restarted node.
#[derive(Clone, Default)]
pub struct MemJournal {
    entries: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl MemJournal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries appended so far.
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Journal for MemJournal {
    fn append(&mut self, entry: &JournalEntry) -> Result<(), JournalError> {
        let bytes = codec::encode(entry)?;
        self.entries
            .lock()
            .map_err(|_| JournalError::Unavailable("lock poisoned".to_string()))?
            .push(bytes);
        Ok(())
    }

    fn replay(&self) -> Result<Vec<JournalEntry>, JournalError> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| JournalError::Unavailable("lock poisoned".to_string()))?;
        entries
            .iter()
            .map(|bytes| codec::decode(bytes).map_err(JournalError::from))
            .collect()
    }
}
