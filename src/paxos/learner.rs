/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The learner role: recording decided values and serving catch-up requests.
//!
//! Values are learned in whatever order the network delivers them. A value learned for a round
//! older than the newest learned one is reported together with every value learned after it, so
//! the node can apply them again in round order and end up with the same files as its peers.

use std::collections::BTreeMap;
use std::ops::Bound::{Excluded, Unbounded};
use std::time::SystemTime;

use crate::{
    events::{Event, LearnEvent, ServeCatchUpEvent},
    journal::{Journal, JournalEntry, JournalError},
    networking::network::Network,
    types::{
        data_types::{NodeAddress, SequenceNumber},
        value::Value,
    },
};

use super::{
    messages::{Accepted, CatchUp, Learn, PaxosMessage, Update},
    proposer::Proposer,
    protocol::{Paxos, PaxosError, PaxosOutcome},
};

/// Where a value recorded by the learner landed in its history.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Recorded {
    /// The round was already in the history.
    Known,
    /// The value is the newest learned value.
    Newest,
    /// Values of later rounds were learned before this one.
    Late,
}

/// Invariant: `learned_seq` is the greatest key of `history`, and `learned_value` its value.
/// Entries of `history` are never replaced.
#[derive(Clone, Debug, Default)]
pub(crate) struct LearnerState {
    learned_seq: Option<SequenceNumber>,
    learned_value: Option<Value>,
    history: BTreeMap<SequenceNumber, Value>,
}

impl LearnerState {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn learned_seq(&self) -> Option<SequenceNumber> {
        self.learned_seq
    }

    pub(crate) fn learned_value(&self) -> Option<&Value> {
        self.learned_value.as_ref()
    }

    pub(crate) fn history(&self) -> &BTreeMap<SequenceNumber, Value> {
        &self.history
    }

    /// Record `(seq, value)` unless `seq` is already in the history.
    fn record<J: Journal>(
        &mut self,
        seq: SequenceNumber,
        value: Value,
        journal: &mut J,
    ) -> Result<Recorded, JournalError> {
        if self.history.contains_key(&seq) {
            return Ok(Recorded::Known);
        }
        journal.append(&JournalEntry::Learned {
            seq,
            value: value.clone(),
        })?;
        Ok(self.insert(seq, value))
    }

    fn insert(&mut self, seq: SequenceNumber, value: Value) -> Recorded {
        if self.history.contains_key(&seq) {
            return Recorded::Known;
        }
        let newest = self.learned_seq.map_or(true, |learned| seq > learned);
        if newest {
            self.learned_seq = Some(seq);
            self.learned_value = Some(value.clone());
        }
        self.history.insert(seq, value);
        if newest {
            Recorded::Newest
        } else {
            Recorded::Late
        }
    }

    /// History values from round `seq` onward, in round order.
    fn values_from(&self, seq: SequenceNumber) -> Vec<Value> {
        self.history.range(seq..).map(|(_, value)| value.clone()).collect()
    }

    /// History entries strictly after `since`, or the whole history if `since` is None.
    fn updates_since(&self, since: Option<SequenceNumber>) -> BTreeMap<SequenceNumber, Value> {
        match since {
            Some(since) => self
                .history
                .range((Excluded(since), Unbounded))
                .map(|(seq, value)| (*seq, value.clone()))
                .collect(),
            None => self.history.clone(),
        }
    }

    pub(crate) fn restore(&mut self, entry: &JournalEntry) {
        if let JournalEntry::Learned { seq, value } = entry {
            self.insert(*seq, value.clone());
        }
    }
}

pub(crate) trait Learner {
    /// Record a value some acceptor accepted. A value for this node's own open round also ends
    /// that round, in case the acceptor's `ACCEPTED` reply is lost.
    fn on_learn<J: Journal>(
        &mut self,
        origin: NodeAddress,
        learn: Learn,
        journal: &mut J,
    ) -> Result<Vec<PaxosOutcome>, PaxosError>;

    /// Announce `origin` and send it the part of the history it is missing.
    fn on_catch_up<J: Journal>(
        &mut self,
        origin: NodeAddress,
        catch_up: CatchUp,
        journal: &mut J,
    ) -> Result<(), PaxosError>;

    /// Merge a peer's history into this node's. Returns one outcome per merged value, oldest
    /// first.
    fn on_update<J: Journal>(
        &mut self,
        origin: NodeAddress,
        update: Update,
        journal: &mut J,
    ) -> Result<Vec<PaxosOutcome>, PaxosError>;
}

impl<N: Network> Paxos<N> {
    fn learn<J: Journal>(
        &mut self,
        seq: SequenceNumber,
        value: Value,
        journal: &mut J,
    ) -> Result<Option<PaxosOutcome>, PaxosError> {
        let recorded = self.learner.record(seq, value.clone(), journal)?;
        if recorded == Recorded::Known {
            return Ok(None);
        }
        Event::publish(
            &self.event_publisher,
            Event::Learn(LearnEvent {
                timestamp: SystemTime::now(),
                seq,
                value: value.clone(),
            }),
        );
        if recorded == Recorded::Late {
            log::debug!(
                "Learned {} at {} after round {:?}",
                value.proposal,
                seq,
                self.learner.learned_seq
            );
            return Ok(Some(PaxosOutcome::Reordered {
                seq,
                values: self.learner.values_from(seq),
            }));
        }
        Ok(Some(PaxosOutcome::Learned { seq, value }))
    }
}

impl<N: Network> Learner for Paxos<N> {
    fn on_learn<J: Journal>(
        &mut self,
        origin: NodeAddress,
        learn: Learn,
        journal: &mut J,
    ) -> Result<Vec<PaxosOutcome>, PaxosError> {
        let Learn { seq, value } = learn;
        let mut outcomes: Vec<PaxosOutcome> = self
            .on_accepted(
                origin,
                Accepted {
                    seq,
                    value: value.clone(),
                },
            )
            .into_iter()
            .collect();
        outcomes.extend(self.learn(seq, value, journal)?);
        Ok(outcomes)
    }

    fn on_catch_up<J: Journal>(
        &mut self,
        origin: NodeAddress,
        catch_up: CatchUp,
        journal: &mut J,
    ) -> Result<(), PaxosError> {
        self.add_peer(origin, journal)?;

        let updates = self.learner.updates_since(catch_up.since);
        Event::publish(
            &self.event_publisher,
            Event::ServeCatchUp(ServeCatchUpEvent {
                timestamp: SystemTime::now(),
                peer: origin,
                since: catch_up.since,
                updates: updates.len(),
            }),
        );
        let update = PaxosMessage::update(
            self.learner.learned_seq,
            self.learner.learned_value.clone(),
            updates,
        );
        self.sender_handle.send(origin, update);
        Ok(())
    }

    fn on_update<J: Journal>(
        &mut self,
        origin: NodeAddress,
        update: Update,
        journal: &mut J,
    ) -> Result<Vec<PaxosOutcome>, PaxosError> {
        self.add_peer(origin, journal)?;

        let Update {
            learned_seq,
            learned_value,
            updates,
        } = update;
        let mut outcomes = Vec::new();
        for (seq, value) in updates {
            outcomes.extend(self.learn(seq, value, journal)?);
        }
        if let (Some(seq), Some(value)) = (learned_seq, learned_value) {
            outcomes.extend(self.learn(seq, value, journal)?);
        }
        Ok(outcomes)
    }
}
