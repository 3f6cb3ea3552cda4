/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The acceptor role: promising rounds and accepting values.

use std::cmp::max;
use std::time::SystemTime;

use crate::{
    events::{AcceptEvent, Event, NackEvent, PromiseEvent},
    journal::{Journal, JournalEntry, JournalError},
    networking::network::Network,
    types::{
        data_types::{NodeAddress, SequenceNumber},
        value::Value,
    },
};

use super::{
    messages::{Accept, Accepted, PaxosMessage, Prepare},
    proposer::Proposer,
    protocol::{Paxos, PaxosError, PaxosOutcome},
};

/// Invariant: once both are set, `accepted_seq <= promised_seq`.
#[derive(Clone, Debug, Default)]
pub(crate) struct AcceptorState {
    promised_seq: Option<SequenceNumber>,
    accepted_seq: Option<SequenceNumber>,
    accepted_value: Option<Value>,
}

impl AcceptorState {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn promised_seq(&self) -> Option<SequenceNumber> {
        self.promised_seq
    }

    pub(crate) fn accepted_seq(&self) -> Option<SequenceNumber> {
        self.accepted_seq
    }

    pub(crate) fn accepted_value(&self) -> Option<&Value> {
        self.accepted_value.as_ref()
    }

    /// Whether this acceptor may still take part in round `seq`.
    fn admits(&self, seq: SequenceNumber) -> bool {
        self.promised_seq.map_or(true, |promised| seq >= promised)
    }

    fn set_promised<J: Journal>(
        &mut self,
        seq: SequenceNumber,
        journal: &mut J,
    ) -> Result<(), JournalError> {
        journal.append(&JournalEntry::Promised { seq })?;
        self.promised_seq = Some(seq);
        Ok(())
    }

    fn set_accepted<J: Journal>(
        &mut self,
        seq: SequenceNumber,
        value: Value,
        journal: &mut J,
    ) -> Result<(), JournalError> {
        journal.append(&JournalEntry::Accepted {
            seq,
            value: value.clone(),
        })?;
        self.accept(seq, value);
        Ok(())
    }

    fn accept(&mut self, seq: SequenceNumber, value: Value) {
        self.promised_seq = max(self.promised_seq, Some(seq));
        self.accepted_seq = Some(seq);
        self.accepted_value = Some(value);
    }

    pub(crate) fn restore(&mut self, entry: &JournalEntry) {
        match entry {
            JournalEntry::Promised { seq } => self.promised_seq = Some(*seq),
            JournalEntry::Accepted { seq, value } => self.accept(*seq, value.clone()),
            _ => (),
        }
    }
}

pub(crate) trait Acceptor {
    /// Promise round `prepare.seq` unless a higher round was already promised, in which case nack it.
    fn on_prepare<J: Journal>(
        &mut self,
        origin: NodeAddress,
        prepare: Prepare,
        journal: &mut J,
    ) -> Result<(), PaxosError>;

    /// Accept `accept.value` unless a higher round was already promised, in which case drop it.
    ///
    /// Returns the outcome of this node's own round if the accept came from this node's proposer.
    fn on_accept<J: Journal>(
        &mut self,
        origin: NodeAddress,
        accept: Accept,
        journal: &mut J,
    ) -> Result<Option<PaxosOutcome>, PaxosError>;
}

impl<N: Network> Acceptor for Paxos<N> {
    fn on_prepare<J: Journal>(
        &mut self,
        origin: NodeAddress,
        prepare: Prepare,
        journal: &mut J,
    ) -> Result<(), PaxosError> {
        let Prepare { seq } = prepare;
        if self.acceptor.admits(seq) {
            self.acceptor.set_promised(seq, journal)?;
            Event::publish(
                &self.event_publisher,
                Event::Promise(PromiseEvent {
                    timestamp: SystemTime::now(),
                    proposer: origin,
                    seq,
                }),
            );
            let promise = PaxosMessage::promise(
                seq,
                self.acceptor.accepted_seq,
                self.acceptor.accepted_value.clone(),
            );
            self.sender_handle.send(origin, promise);
        } else {
            Event::publish(
                &self.event_publisher,
                Event::Nack(NackEvent {
                    timestamp: SystemTime::now(),
                    proposer: origin,
                    seq,
                }),
            );
            self.sender_handle.send(origin, PaxosMessage::nack(seq));
        }
        Ok(())
    }

    fn on_accept<J: Journal>(
        &mut self,
        origin: NodeAddress,
        accept: Accept,
        journal: &mut J,
    ) -> Result<Option<PaxosOutcome>, PaxosError> {
        let Accept { seq, value } = accept;
        if !self.acceptor.admits(seq) {
            log::debug!(
                "Dropping ACCEPT for round {} from {}: promised round {:?}",
                seq,
                origin,
                self.acceptor.promised_seq
            );
            return Ok(None);
        }

        self.acceptor.set_accepted(seq, value.clone(), journal)?;
        Event::publish(
            &self.event_publisher,
            Event::Accept(AcceptEvent {
                timestamp: SystemTime::now(),
                proposer: origin,
                seq,
                value: value.clone(),
            }),
        );

        // The local proposer is told directly instead of through the network.
        let outcome = if origin == self.config.me && self.proposer.proposed_seq() == Some(seq) {
            self.on_accepted(
                origin,
                Accepted {
                    seq,
                    value: value.clone(),
                },
            )
        } else {
            self.sender_handle
                .send(origin, PaxosMessage::accepted(seq, value.clone()));
            None
        };

        self.sender_handle
            .send_to_all(self.membership.peers(), PaxosMessage::learn(seq, value));

        Ok(outcome)
    }
}
