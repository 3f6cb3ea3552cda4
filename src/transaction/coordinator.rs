/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The serving side of snapshot transactions.
//!
//! The [`Coordinator`] owns the open snapshots of a node, turns a `commit` into a
//! [proposal value](Value), and applies decided values to [storage](Storage), both the ones its own
//! commits proposed ([`on_consensus`](Coordinator::on_consensus)) and the ones other nodes decided
//! ([`on_learned`](Coordinator::on_learned)).
//!
//! ## Write-ahead apply
//!
//! A value's writes are journaled as `ApplyStarted` before they touch storage, and `ApplyFinished`
//! is journaled after the last write. A node that crashes in between re-applies the writes when it
//! restarts. Writes carry whole file contents, so applying them twice leaves storage the same.

use std::collections::{HashMap, HashSet};
use std::sync::mpsc::Sender;
use std::time::SystemTime;

use crate::{
    events::{ApplyValueEvent, BeginTransactionEvent, CommitTransactionEvent, Event},
    journal::{Journal, JournalEntry, JournalError},
    storage::Storage,
    types::{
        data_types::{NodeAddress, ProposalId, SessionId, TransactionId},
        value::{Value, Writes},
    },
};

use super::{
    messages::{Action, Operation, Reply, ReplyBody, TransactionError},
    snapshot::Snapshot,
};

/// What the node must do with a `commit` request.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum CommitOutcome {
    /// Reply to the client with this error.
    Rejected(TransactionError),

    /// Decide the value through Paxos.
    Propose(Value),

    /// The snapshot wrote nothing. The value counts as decided without any message exchange.
    Resolved(Value),
}

/// A commit waiting for its Paxos round to end.
struct PendingProposal {
    command: String,
    origin: NodeAddress,
    session: SessionId,
    txn: TransactionId,
}

pub(crate) struct Coordinator {
    me: NodeAddress,
    snapshots: HashMap<SessionId, Snapshot>,
    pending_proposals: HashMap<ProposalId, PendingProposal>,
    completed_transactions: HashSet<(NodeAddress, TransactionId)>,
    applied: HashSet<ProposalId>,
    interrupted_apply: Option<(ProposalId, Writes)>,
    last_committed: Option<SessionId>,
    session_counter: u64,
    proposal_counter: u64,
    event_publisher: Option<Sender<Event>>,
}

impl Coordinator {
    pub(crate) fn new(me: NodeAddress, event_publisher: Option<Sender<Event>>) -> Self {
        Self {
            me,
            snapshots: HashMap::new(),
            pending_proposals: HashMap::new(),
            completed_transactions: HashSet::new(),
            applied: HashSet::new(),
            interrupted_apply: None,
            last_committed: None,
            session_counter: 0,
            proposal_counter: 0,
            event_publisher,
        }
    }

    /// Open a snapshot for transaction `txn` of client `origin`.
    pub(crate) fn begin<J: Journal>(
        &mut self,
        origin: NodeAddress,
        txn: TransactionId,
        journal: &mut J,
    ) -> Result<ReplyBody, JournalError> {
        if self.completed_transactions.contains(&(origin, txn)) {
            return Ok(ReplyBody::Failed(TransactionError::DuplicateTransaction {
                origin,
                txn,
            }));
        }

        let floor = self.last_committed.map_or(0, |session| session.int());
        let session = SessionId::new(self.session_counter.max(floor) + 1);
        journal.append(&JournalEntry::SessionIssued { session })?;
        self.session_counter = session.int();

        self.snapshots.insert(
            session,
            Snapshot::new(session, origin, txn, self.last_committed),
        );
        Event::publish(
            &self.event_publisher,
            Event::BeginTransaction(BeginTransactionEvent {
                timestamp: SystemTime::now(),
                origin,
                txn,
                session,
            }),
        );
        Ok(ReplyBody::Began { session })
    }

    /// Execute `operation` against the snapshot of `session`.
    pub(crate) fn perform<S: Storage>(
        &mut self,
        session: SessionId,
        txn: TransactionId,
        operation: &Operation,
        storage: &S,
    ) -> ReplyBody {
        match self.snapshots.get_mut(&session) {
            Some(snapshot) if snapshot.txn() == txn => ReplyBody::Done {
                result: snapshot.apply(operation, storage),
            },
            _ => {
                log::debug!(
                    "Refusing {} on {}: no open session {} for transaction {}",
                    operation.name(),
                    operation.filename(),
                    session,
                    txn
                );
                ReplyBody::Failed(TransactionError::InvalidSession { session })
            }
        }
    }

    /// Consume the snapshot of `session` and turn it into a value to decide.
    pub(crate) fn commit<S: Storage, J: Journal>(
        &mut self,
        command: String,
        session: SessionId,
        txn: TransactionId,
        storage: &S,
        journal: &mut J,
    ) -> Result<CommitOutcome, JournalError> {
        let snapshot = match self.snapshots.get(&session) {
            Some(snapshot) if snapshot.txn() == txn => snapshot,
            _ => {
                return Ok(CommitOutcome::Rejected(
                    TransactionError::InvalidSession { session },
                ))
            }
        };

        if let Some(last_committed) = self.last_committed {
            if snapshot.is_stale(last_committed) {
                self.snapshots.remove(&session);
                return Ok(CommitOutcome::Rejected(TransactionError::StaleSnapshot {
                    session,
                    last_committed,
                }));
            }
        }

        let proposal = self.issue_proposal(journal)?;
        let Some(snapshot) = self.snapshots.remove(&session) else {
            return Ok(CommitOutcome::Rejected(TransactionError::InvalidSession {
                session,
            }));
        };
        let value = Value::new(proposal, Some(session), snapshot.flatten(storage));
        self.pending_proposals.insert(
            proposal,
            PendingProposal {
                command,
                origin: snapshot.origin(),
                session,
                txn,
            },
        );

        if snapshot.is_empty() {
            Ok(CommitOutcome::Resolved(value))
        } else {
            Ok(CommitOutcome::Propose(value))
        }
    }

    /// Get a fresh proposal id for a value this node proposes.
    pub(crate) fn issue_proposal<J: Journal>(
        &mut self,
        journal: &mut J,
    ) -> Result<ProposalId, JournalError> {
        let counter = self.proposal_counter + 1;
        journal.append(&JournalEntry::ProposalIssued { counter })?;
        self.proposal_counter = counter;
        Ok(ProposalId::new(self.me, counter))
    }

    /// Resolve the pending commit that proposed `value`. Returns the reply to send and where to send
    /// it, or None if no commit is waiting for this value.
    pub(crate) fn on_consensus<S: Storage, J: Journal>(
        &mut self,
        success: bool,
        value: &Value,
        storage: &mut S,
        journal: &mut J,
    ) -> Result<Option<(NodeAddress, Reply)>, JournalError> {
        let Some(pending) = self.pending_proposals.remove(&value.proposal) else {
            return Ok(None);
        };

        let body = if success {
            self.apply(value, storage, journal)?;
            if !value.writes.is_empty() {
                self.advance_last_committed(pending.session, journal)?;
            }
            journal.append(&JournalEntry::TransactionCompleted {
                origin: pending.origin,
                txn: pending.txn,
            })?;
            self.completed_transactions
                .insert((pending.origin, pending.txn));
            ReplyBody::Committed
        } else {
            ReplyBody::Failed(TransactionError::ProposalRejected {
                proposal: value.proposal,
            })
        };

        Event::publish(
            &self.event_publisher,
            Event::CommitTransaction(CommitTransactionEvent {
                timestamp: SystemTime::now(),
                origin: pending.origin,
                session: pending.session,
                proposal: value.proposal,
                success,
            }),
        );

        let reply = Reply {
            command: pending.command,
            request: Action::Commit {
                session: pending.session,
                txn: pending.txn,
            },
            body,
        };
        Ok(Some((pending.origin, reply)))
    }

    /// Apply a value that became this node's newest learned value.
    pub(crate) fn on_learned<S: Storage, J: Journal>(
        &mut self,
        value: &Value,
        storage: &mut S,
        journal: &mut J,
    ) -> Result<(), JournalError> {
        self.apply(value, storage, journal)?;
        if let Some(session) = value.session {
            if !value.writes.is_empty() {
                self.advance_last_committed(session, journal)?;
            }
        }
        Ok(())
    }

    /// Apply `values` again in order, including the ones applied before. Used when a value is
    /// learned after values of later rounds, so that the later writes end up on top.
    pub(crate) fn reapply<S: Storage, J: Journal>(
        &mut self,
        values: &[Value],
        storage: &mut S,
        journal: &mut J,
    ) -> Result<(), JournalError> {
        for value in values {
            self.applied.remove(&value.proposal);
            self.on_learned(value, storage, journal)?;
        }
        Ok(())
    }

    /// Whether the writes of `value` have reached storage on this node.
    pub(crate) fn is_applied(&self, value: &Value) -> bool {
        value.writes.is_empty() || self.applied.contains(&value.proposal)
    }

    /// Re-apply the writes of a value whose apply was cut short by a crash.
    pub(crate) fn finish_interrupted_apply<S: Storage, J: Journal>(
        &mut self,
        storage: &mut S,
        journal: &mut J,
    ) -> Result<(), JournalError> {
        let Some((proposal, writes)) = self.interrupted_apply.take() else {
            return Ok(());
        };
        log::debug!("Re-applying interrupted value {}", proposal);
        write_all(&writes, storage);
        journal.append(&JournalEntry::ApplyFinished { proposal })?;
        self.applied.insert(proposal);
        Ok(())
    }

    fn apply<S: Storage, J: Journal>(
        &mut self,
        value: &Value,
        storage: &mut S,
        journal: &mut J,
    ) -> Result<(), JournalError> {
        if value.writes.is_empty() || self.applied.contains(&value.proposal) {
            return Ok(());
        }

        journal.append(&JournalEntry::ApplyStarted {
            proposal: value.proposal,
            writes: value.writes.clone(),
        })?;
        write_all(&value.writes, storage);
        journal.append(&JournalEntry::ApplyFinished {
            proposal: value.proposal,
        })?;
        self.applied.insert(value.proposal);

        Event::publish(
            &self.event_publisher,
            Event::ApplyValue(ApplyValueEvent {
                timestamp: SystemTime::now(),
                proposal: value.proposal,
                files: value.writes.len(),
            }),
        );
        Ok(())
    }

    fn advance_last_committed<J: Journal>(
        &mut self,
        session: SessionId,
        journal: &mut J,
    ) -> Result<(), JournalError> {
        if self.last_committed >= Some(session) {
            return Ok(());
        }
        journal.append(&JournalEntry::Committed { session })?;
        self.last_committed = Some(session);
        Ok(())
    }

    pub(crate) fn restore(&mut self, entry: &JournalEntry) {
        match entry {
            JournalEntry::SessionIssued { session } => {
                self.session_counter = self.session_counter.max(session.int())
            }
            JournalEntry::ProposalIssued { counter } => {
                self.proposal_counter = self.proposal_counter.max(*counter)
            }
            JournalEntry::Committed { session } => {
                self.last_committed = self.last_committed.max(Some(*session))
            }
            JournalEntry::TransactionCompleted { origin, txn } => {
                self.completed_transactions.insert((*origin, *txn));
            }
            JournalEntry::ApplyStarted { proposal, writes } => {
                self.interrupted_apply = Some((*proposal, writes.clone()))
            }
            JournalEntry::ApplyFinished { proposal } => {
                self.applied.insert(*proposal);
                if matches!(&self.interrupted_apply, Some((interrupted, _)) if interrupted == proposal)
                {
                    self.interrupted_apply = None;
                }
            }
            _ => (),
        }
    }

    pub(crate) fn last_committed(&self) -> Option<SessionId> {
        self.last_committed
    }

    pub(crate) fn is_completed(&self, origin: NodeAddress, txn: TransactionId) -> bool {
        self.completed_transactions.contains(&(origin, txn))
    }

    pub(crate) fn open_sessions(&self) -> usize {
        self.snapshots.len()
    }
}

/// Write every file in `writes` to storage: `None` deletes the file, content replaces it.
fn write_all<S: Storage>(writes: &Writes, storage: &mut S) {
    for (filename, content) in writes {
        match content {
            None => {
                storage.delete(filename);
            }
            Some(content) => {
                if !storage.exists(filename) {
                    storage.create(filename);
                }
                if let Err(err) = storage.overwrite(filename, content, None) {
                    log::warn!("Failed to write {}: {}", filename, err);
                }
            }
        }
    }
}
