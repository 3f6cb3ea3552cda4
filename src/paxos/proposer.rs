/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The proposer role: running rounds and reporting their outcome.
//!
//! A node runs at most one round at a time. A value proposed while a round is collecting promises
//! replaces that round, which fails: no acceptor can have accepted its value yet. A value proposed
//! once `ACCEPT` went out waits in a queue instead, since the open round's value may already be
//! accepted and learned. Queued values are proposed in order as rounds close.

use std::collections::{BTreeSet, VecDeque};
use std::time::SystemTime;

use crate::{
    events::{DecideEvent, Event, ProposeEvent},
    journal::{Journal, JournalEntry, JournalError},
    networking::network::Network,
    types::{
        data_types::{NodeAddress, SequenceNumber},
        value::Value,
    },
};

use super::{
    messages::{Accepted, Nack, PaxosMessage, Promise},
    protocol::{Paxos, PaxosError, PaxosOutcome},
    sequence::next_seq,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum RoundStatus {
    /// No round has been proposed since the node started.
    Idle,
    /// `PREPARE` was broadcast; collecting promises.
    Preparing,
    /// `ACCEPT` was broadcast; waiting for the first `ACCEPTED`.
    Accepting,
    /// The round's outcome was reported.
    Closed,
}

#[derive(Clone, Debug)]
pub(crate) struct ProposerState {
    proposed_seq: Option<SequenceNumber>,
    proposed_value: Option<Value>,
    original_value: Option<Value>,
    promisers: BTreeSet<NodeAddress>,
    status: RoundStatus,
    decided: Option<(SequenceNumber, Value)>,
    queued: VecDeque<Value>,
}

impl ProposerState {
    pub(crate) fn new() -> Self {
        Self {
            proposed_seq: None,
            proposed_value: None,
            original_value: None,
            promisers: BTreeSet::new(),
            status: RoundStatus::Idle,
            decided: None,
            queued: VecDeque::new(),
        }
    }

    pub(crate) fn proposed_seq(&self) -> Option<SequenceNumber> {
        self.proposed_seq
    }

    pub(crate) fn status(&self) -> RoundStatus {
        self.status
    }

    /// The latest `(seq, value)` this node's proposer heard was accepted.
    pub(crate) fn decided(&self) -> Option<&(SequenceNumber, Value)> {
        self.decided.as_ref()
    }

    /// Values waiting for the open round to close.
    pub(crate) fn queued(&self) -> usize {
        self.queued.len()
    }

    fn is_open(&self) -> bool {
        matches!(self.status, RoundStatus::Preparing | RoundStatus::Accepting)
    }

    fn start_round<J: Journal>(
        &mut self,
        seq: SequenceNumber,
        value: Value,
        journal: &mut J,
    ) -> Result<(), JournalError> {
        journal.append(&JournalEntry::Proposed {
            seq,
            value: value.clone(),
        })?;
        self.proposed_seq = Some(seq);
        self.proposed_value = Some(value.clone());
        self.original_value = Some(value);
        self.promisers.clear();
        self.status = RoundStatus::Preparing;
        Ok(())
    }

    /// Close the open round, returning the value it originally proposed.
    fn close(&mut self) -> Option<Value> {
        self.status = RoundStatus::Closed;
        self.original_value.clone()
    }

    /// A round interrupted by a crash is not resumed, but its number stays used.
    pub(crate) fn restore(&mut self, entry: &JournalEntry) {
        if let JournalEntry::Proposed { seq, value } = entry {
            self.proposed_seq = Some(*seq);
            self.proposed_value = Some(value.clone());
            self.original_value = Some(value.clone());
            self.promisers.clear();
            self.status = RoundStatus::Idle;
        }
    }
}

pub(crate) trait Proposer {
    /// Start a new round for `value`, or queue it behind a round that already broadcast `ACCEPT`.
    ///
    /// If a round of this node was still collecting promises, it is abandoned and its failure is
    /// returned.
    fn propose<J: Journal>(
        &mut self,
        value: Value,
        journal: &mut J,
    ) -> Result<Option<PaxosOutcome>, PaxosError>;

    fn on_promise(&mut self, origin: NodeAddress, promise: Promise);

    fn on_accepted(&mut self, origin: NodeAddress, accepted: Accepted) -> Option<PaxosOutcome>;

    fn on_nack(&mut self, origin: NodeAddress, nack: Nack) -> Option<PaxosOutcome>;
}

impl<N: Network> Paxos<N> {
    fn open_round<J: Journal>(&mut self, value: Value, journal: &mut J) -> Result<(), PaxosError> {
        let seq = next_seq(
            self.config.me,
            self.membership.len(),
            self.acceptor.accepted_seq(),
            self.proposer.proposed_seq,
        );
        self.proposer.start_round(seq, value.clone(), journal)?;

        Event::publish(
            &self.event_publisher,
            Event::Propose(ProposeEvent {
                timestamp: SystemTime::now(),
                seq,
                value,
            }),
        );
        self.sender_handle
            .send_to_all(self.membership.peers(), PaxosMessage::prepare(seq));
        Ok(())
    }

    /// Start a round for the oldest queued value if no round is open.
    pub(super) fn propose_queued<J: Journal>(&mut self, journal: &mut J) -> Result<(), PaxosError> {
        if self.proposer.is_open() {
            return Ok(());
        }
        match self.proposer.queued.pop_front() {
            Some(value) => self.open_round(value, journal),
            None => Ok(()),
        }
    }
}

impl<N: Network> Proposer for Paxos<N> {
    fn propose<J: Journal>(
        &mut self,
        value: Value,
        journal: &mut J,
    ) -> Result<Option<PaxosOutcome>, PaxosError> {
        if self.proposer.status == RoundStatus::Accepting || !self.proposer.queued.is_empty() {
            log::debug!(
                "Queueing proposal {} behind round {:?}",
                value.proposal,
                self.proposer.proposed_seq
            );
            self.proposer.queued.push_back(value);
            self.propose_queued(journal)?;
            return Ok(None);
        }

        let abandoned = if self.proposer.status == RoundStatus::Preparing {
            let seq = self.proposer.proposed_seq;
            self.proposer.close().map(|original| {
                log::debug!("Abandoning round {:?} for a new proposal", seq);
                PaxosOutcome::Consensus {
                    success: false,
                    value: original,
                }
            })
        } else {
            None
        };

        self.open_round(value, journal)?;
        Ok(abandoned)
    }

    fn on_promise(&mut self, origin: NodeAddress, promise: Promise) {
        let Promise {
            seq,
            accepted_seq,
            accepted_value,
        } = promise;
        if self.proposer.status != RoundStatus::Preparing || self.proposer.proposed_seq != Some(seq)
        {
            return;
        }
        if !self.proposer.promisers.insert(origin) {
            return;
        }

        // Acceptors never promise below their accepted round, so this only fires for promises
        // built by hand. Replicas converge by applying learned values in round order instead.
        if let (Some(accepted_seq), Some(accepted_value)) = (accepted_seq, accepted_value) {
            if Some(accepted_seq) > self.proposer.proposed_seq {
                self.proposer.proposed_value = Some(accepted_value);
            }
        }

        if self.proposer.promisers.len() >= self.membership.quorum() {
            if let Some(value) = self.proposer.proposed_value.clone() {
                self.proposer.status = RoundStatus::Accepting;
                self.sender_handle
                    .send_to_all(self.membership.peers(), PaxosMessage::accept(seq, value));
            }
        }
    }

    fn on_accepted(&mut self, _origin: NodeAddress, accepted: Accepted) -> Option<PaxosOutcome> {
        let Accepted { seq, value } = accepted;
        if self
            .proposer
            .decided
            .as_ref()
            .map_or(true, |(decided_seq, _)| seq > *decided_seq)
        {
            self.proposer.decided = Some((seq, value.clone()));
        }

        if self.proposer.status != RoundStatus::Accepting || self.proposer.proposed_seq != Some(seq)
        {
            return None;
        }
        let original = self.proposer.close()?;
        let success = value == original;

        Event::publish(
            &self.event_publisher,
            Event::Decide(DecideEvent {
                timestamp: SystemTime::now(),
                seq,
                proposal: original.proposal,
                success,
            }),
        );
        Some(PaxosOutcome::Consensus {
            success,
            value: original,
        })
    }

    fn on_nack(&mut self, origin: NodeAddress, nack: Nack) -> Option<PaxosOutcome> {
        if self.proposer.status != RoundStatus::Preparing
            || self.proposer.proposed_seq != Some(nack.seq)
        {
            return None;
        }
        log::debug!("Round {} nacked by {}", nack.seq, origin);
        let original = self.proposer.close()?;

        Event::publish(
            &self.event_publisher,
            Event::Decide(DecideEvent {
                timestamp: SystemTime::now(),
                seq: nack.seq,
                proposal: original.proposal,
                success: false,
            }),
        );
        Some(PaxosOutcome::Consensus {
            success: false,
            value: original,
        })
    }
}
