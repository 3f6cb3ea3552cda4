/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Definitions for the transaction RPCs exchanged between a client and its serving node.

use std::fmt::{self, Display, Formatter};

use borsh::{BorshDeserialize, BorshSerialize};

use crate::types::data_types::{NodeAddress, ProposalId, SessionId, TransactionId};

/// An operation on one file, executed against a snapshot.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub enum Operation {
    Create { filename: String },
    Exists { filename: String },
    Read { filename: String },
    Append { filename: String, data: Vec<u8> },
    Overwrite { filename: String, data: Vec<u8> },
    Delete { filename: String },
}

impl Operation {
    pub fn filename(&self) -> &str {
        match self {
            Operation::Create { filename }
            | Operation::Exists { filename }
            | Operation::Read { filename }
            | Operation::Append { filename, .. }
            | Operation::Overwrite { filename, .. }
            | Operation::Delete { filename } => filename,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Operation::Create { .. } => "create",
            Operation::Exists { .. } => "exists",
            Operation::Read { .. } => "read",
            Operation::Append { .. } => "append",
            Operation::Overwrite { .. } => "overwrite",
            Operation::Delete { .. } => "delete",
        }
    }

    /// Whether the operation may change the file.
    pub fn is_write(&self) -> bool {
        !matches!(self, Operation::Exists { .. } | Operation::Read { .. })
    }
}

/// Result of an [`Operation`]: whether it took effect, or the content that was read.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub enum OpResult {
    Bool(bool),
    Content(Option<Vec<u8>>),
}

#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub enum Action {
    Begin { txn: TransactionId },
    Do {
        session: SessionId,
        txn: TransactionId,
        operation: Operation,
    },
    Commit {
        session: SessionId,
        txn: TransactionId,
    },
}

/// A transaction RPC. `command` is the client command the request belongs to, and is echoed back in
/// the [`Reply`].
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct Request {
    pub command: String,
    pub action: Action,
}

#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct Reply {
    pub command: String,
    /// The action this is a reply to.
    pub request: Action,
    pub body: ReplyBody,
}

#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub enum ReplyBody {
    Began { session: SessionId },
    Done { result: OpResult },
    Committed,
    Failed(TransactionError),
}

#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub enum TransactionError {
    /// `do` or `commit` named a session the serving node does not have open.
    InvalidSession { session: SessionId },

    /// `begin` repeated a transaction that already committed.
    DuplicateTransaction {
        origin: NodeAddress,
        txn: TransactionId,
    },

    /// A value committed after the snapshot was opened.
    StaleSnapshot {
        session: SessionId,
        last_committed: SessionId,
    },

    /// The Paxos round for the commit was nacked, or decided another value.
    ProposalRejected { proposal: ProposalId },

    /// The client issued an operation or commit outside of a transaction.
    NoTransaction,
}

impl Display for TransactionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            TransactionError::InvalidSession { session } => {
                write!(f, "invalid session {}", session)
            }
            TransactionError::DuplicateTransaction { origin, txn } => {
                write!(f, "transaction {} of node {} already committed", txn, origin)
            }
            TransactionError::StaleSnapshot {
                session,
                last_committed,
            } => write!(
                f,
                "snapshot of session {} is stale: session {} committed since",
                session, last_committed
            ),
            TransactionError::ProposalRejected { proposal } => {
                write!(f, "proposal {} rejected", proposal)
            }
            TransactionError::NoTransaction => write!(f, "no transaction in progress"),
        }
    }
}
