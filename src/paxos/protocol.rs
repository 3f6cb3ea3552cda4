/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The [`Paxos`] struct, which composes the three roles and dispatches incoming messages to them.

use std::fmt::{self, Display, Formatter};
use std::sync::mpsc::Sender;
use std::time::SystemTime;

use crate::{
    events::{AddPeerEvent, Event},
    journal::{Journal, JournalEntry, JournalError},
    membership::Membership,
    networking::{network::Network, sending::SenderHandle},
    types::{
        data_types::{NodeAddress, SequenceNumber},
        value::Value,
    },
};

use super::{
    acceptor::{Acceptor, AcceptorState},
    learner::{Learner, LearnerState},
    messages::PaxosMessage,
    proposer::{Proposer, ProposerState},
};

pub(crate) struct PaxosConfiguration {
    pub(crate) me: NodeAddress,
}

/// What a message handler asks the rest of the node to do.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum PaxosOutcome {
    /// A round proposed by this node has ended. `value` is the value this node originally proposed.
    Consensus { success: bool, value: Value },

    /// A value became this node's newest learned value.
    Learned { seq: SequenceNumber, value: Value },

    /// A value was learned for round `seq` after values of later rounds. `values` holds the history
    /// from `seq` onward, in round order.
    Reordered { seq: SequenceNumber, values: Vec<Value> },
}

#[derive(Debug)]
pub enum PaxosError {
    JournalError(JournalError),
}

impl Display for PaxosError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            PaxosError::JournalError(err) => write!(f, "paxos: {}", err),
        }
    }
}

impl From<JournalError> for PaxosError {
    fn from(value: JournalError) -> Self {
        PaxosError::JournalError(value)
    }
}

pub(crate) struct Paxos<N: Network> {
    pub(super) config: PaxosConfiguration,
    pub(super) membership: Membership,
    pub(super) acceptor: AcceptorState,
    pub(super) proposer: ProposerState,
    pub(super) learner: LearnerState,
    pub(super) sender_handle: SenderHandle<N>,
    pub(super) event_publisher: Option<Sender<Event>>,
}

impl<N: Network> Paxos<N> {
    pub(crate) fn new(
        config: PaxosConfiguration,
        network: N,
        event_publisher: Option<Sender<Event>>,
    ) -> Self {
        Self {
            membership: Membership::new(config.me),
            config,
            acceptor: AcceptorState::new(),
            proposer: ProposerState::new(),
            learner: LearnerState::new(),
            sender_handle: SenderHandle::new(network),
            event_publisher,
        }
    }

    /// Hand a message to the role that handles it, and return what the rest of the node must do
    /// in response.
    pub(crate) fn on_receive_msg<J: Journal>(
        &mut self,
        origin: NodeAddress,
        msg: PaxosMessage,
        journal: &mut J,
    ) -> Result<Vec<PaxosOutcome>, PaxosError> {
        let outcomes = match msg {
            PaxosMessage::Prepare(prepare) => {
                self.on_prepare(origin, prepare, journal)?;
                Vec::new()
            }
            PaxosMessage::Promise(promise) => {
                self.on_promise(origin, promise);
                Vec::new()
            }
            PaxosMessage::Nack(nack) => self.on_nack(origin, nack).into_iter().collect(),
            PaxosMessage::Accept(accept) => {
                self.on_accept(origin, accept, journal)?.into_iter().collect()
            }
            PaxosMessage::Accepted(accepted) => {
                self.on_accepted(origin, accepted).into_iter().collect()
            }
            PaxosMessage::Learn(learn) => self.on_learn(origin, learn, journal)?,
            PaxosMessage::CatchUp(catch_up) => {
                self.on_catch_up(origin, catch_up, journal)?;
                Vec::new()
            }
            PaxosMessage::Update(update) => self.on_update(origin, update, journal)?,
        };

        // A round may have closed.
        self.propose_queued(journal)?;
        Ok(outcomes)
    }

    /// Ask every node on the network for the values learned after this node's newest one.
    pub(crate) fn catch_up(&mut self) {
        let since = self.learner.learned_seq();
        self.sender_handle.broadcast(PaxosMessage::catch_up(since));
    }

    /// Add `peer` to the peer set. Returns whether the peer is new.
    pub(crate) fn add_peer<J: Journal>(
        &mut self,
        peer: NodeAddress,
        journal: &mut J,
    ) -> Result<bool, JournalError> {
        let added = self.membership.add(peer, journal)?;
        if added {
            Event::publish(
                &self.event_publisher,
                Event::AddPeer(AddPeerEvent {
                    timestamp: SystemTime::now(),
                    peer,
                }),
            );
        }
        Ok(added)
    }

    pub(crate) fn restore(&mut self, entry: &JournalEntry) {
        self.membership.restore(entry);
        self.acceptor.restore(entry);
        self.proposer.restore(entry);
        self.learner.restore(entry);
    }

    pub(crate) fn membership(&self) -> &Membership {
        &self.membership
    }

    pub(crate) fn acceptor(&self) -> &AcceptorState {
        &self.acceptor
    }

    pub(crate) fn proposer(&self) -> &ProposerState {
        &self.proposer
    }

    pub(crate) fn learner(&self) -> &LearnerState {
        &self.learner
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::{
        journal::MemJournal,
        networking::{codec, messages::Message},
        paxos::{messages::Accept, proposer::RoundStatus},
        types::{data_types::ProposalId, value::Writes},
    };

    /// Records every message sent instead of delivering it.
    #[derive(Clone, Default)]
    struct RecordingNetwork(Arc<Mutex<Vec<(NodeAddress, Message)>>>);

    impl RecordingNetwork {
        fn take(&self) -> Vec<(NodeAddress, Message)> {
            std::mem::take(&mut *self.0.lock().unwrap())
        }
    }

    impl Network for RecordingNetwork {
        fn send(&mut self, peer: NodeAddress, bytes: Vec<u8>) {
            let msg = codec::decode(&bytes).unwrap();
            self.0.lock().unwrap().push((peer, msg));
        }

        fn broadcast(&mut self, bytes: Vec<u8>) {
            self.send(NodeAddress::new(u32::MAX), bytes)
        }

        fn recv(&mut self) -> Option<(NodeAddress, Vec<u8>)> {
            None
        }
    }

    fn node(me: u32, peers: &[u32]) -> (Paxos<RecordingNetwork>, RecordingNetwork, MemJournal) {
        let network = RecordingNetwork::default();
        let mut journal = MemJournal::new();
        let mut paxos = Paxos::new(
            PaxosConfiguration {
                me: NodeAddress::new(me),
            },
            network.clone(),
            None,
        );
        for peer in peers {
            paxos.add_peer(NodeAddress::new(*peer), &mut journal).unwrap();
        }
        (paxos, network, journal)
    }

    fn value(counter: u64) -> Value {
        let mut writes = Writes::new();
        writes.insert("f".to_string(), Some(counter.to_le_bytes().to_vec()));
        Value::new(ProposalId::new(NodeAddress::new(0), counter), None, writes)
    }

    fn addr(int: u32) -> NodeAddress {
        NodeAddress::new(int)
    }

    fn seq(int: u64) -> SequenceNumber {
        SequenceNumber::new(int)
    }

    #[test]
    fn promises_for_other_rounds_are_ignored() {
        let (mut paxos, network, mut journal) = node(0, &[1, 2]);
        assert_eq!(paxos.proposer().status(), RoundStatus::Idle);

        paxos.propose(value(1), &mut journal).unwrap();
        let prepares = network.take();
        assert_eq!(prepares.len(), 3);
        assert!(prepares
            .iter()
            .all(|(_, msg)| *msg == Message::from(PaxosMessage::prepare(seq(0)))));
        assert_eq!(paxos.proposer().status(), RoundStatus::Preparing);

        let stale = PaxosMessage::promise(seq(3), None, None);
        paxos.on_receive_msg(addr(1), stale, &mut journal).unwrap();
        let repeated = PaxosMessage::promise(seq(0), None, None);
        paxos.on_receive_msg(addr(1), repeated.clone(), &mut journal).unwrap();
        paxos.on_receive_msg(addr(1), repeated, &mut journal).unwrap();
        assert_eq!(paxos.proposer().status(), RoundStatus::Preparing);
        assert!(network.take().is_empty());

        let promise = PaxosMessage::promise(seq(0), None, None);
        paxos.on_receive_msg(addr(2), promise, &mut journal).unwrap();
        assert_eq!(paxos.proposer().status(), RoundStatus::Accepting);
        let accepts = network.take();
        assert_eq!(accepts.len(), 3);
        assert!(accepts
            .iter()
            .all(|(_, msg)| *msg == Message::from(PaxosMessage::accept(seq(0), value(1)))));
    }

    #[test]
    fn promise_carrying_later_accepted_value_is_adopted() {
        let (mut paxos, network, mut journal) = node(0, &[1, 2]);
        paxos
            .on_receive_msg(addr(1), PaxosMessage::prepare(seq(1)), &mut journal)
            .unwrap();
        paxos
            .on_receive_msg(addr(1), PaxosMessage::accept(seq(1), value(7)), &mut journal)
            .unwrap();
        assert_eq!(paxos.acceptor().accepted_value(), Some(&value(7)));
        network.take();

        paxos.propose(value(1), &mut journal).unwrap();
        assert_eq!(paxos.proposer().proposed_seq(), Some(seq(3)));
        network.take();

        let adopted = PaxosMessage::promise(seq(3), Some(seq(4)), Some(value(7)));
        paxos.on_receive_msg(addr(1), adopted, &mut journal).unwrap();
        let plain = PaxosMessage::promise(seq(3), None, None);
        paxos.on_receive_msg(addr(2), plain, &mut journal).unwrap();
        let accepts = network.take();
        assert!(accepts
            .iter()
            .all(|(_, msg)| *msg == Message::from(PaxosMessage::accept(seq(3), value(7)))));

        let accepted = PaxosMessage::accepted(seq(3), value(7));
        let outcomes = paxos.on_receive_msg(addr(2), accepted, &mut journal).unwrap();
        assert_eq!(
            outcomes,
            vec![PaxosOutcome::Consensus {
                success: false,
                value: value(1)
            }]
        );
    }

    #[test]
    fn nack_only_fails_a_preparing_round() {
        let (mut paxos, network, mut journal) = node(0, &[1, 2]);
        paxos.propose(value(1), &mut journal).unwrap();
        for peer in [1, 2] {
            let promise = PaxosMessage::promise(seq(0), None, None);
            paxos.on_receive_msg(addr(peer), promise, &mut journal).unwrap();
        }
        network.take();

        let outcomes = paxos
            .on_receive_msg(addr(1), PaxosMessage::nack(seq(0)), &mut journal)
            .unwrap();
        assert!(outcomes.is_empty());
        assert_eq!(paxos.proposer().status(), RoundStatus::Accepting);

        let accepted = PaxosMessage::accepted(seq(0), value(1));
        let outcomes = paxos.on_receive_msg(addr(2), accepted, &mut journal).unwrap();
        assert_eq!(
            outcomes,
            vec![PaxosOutcome::Consensus {
                success: true,
                value: value(1)
            }]
        );
        assert_eq!(paxos.proposer().status(), RoundStatus::Closed);
        assert_eq!(paxos.proposer().decided(), Some(&(seq(0), value(1))));

        paxos.propose(value(2), &mut journal).unwrap();
        network.take();
        let outcomes = paxos
            .on_receive_msg(addr(2), PaxosMessage::nack(seq(3)), &mut journal)
            .unwrap();
        assert_eq!(
            outcomes,
            vec![PaxosOutcome::Consensus {
                success: false,
                value: value(2)
            }]
        );
        assert_eq!(paxos.proposer().status(), RoundStatus::Closed);
    }

    #[test]
    fn accept_from_self_reports_consensus_without_sending_accepted() {
        let (mut paxos, network, mut journal) = node(0, &[1, 2]);
        paxos.propose(value(1), &mut journal).unwrap();
        for peer in [1, 2] {
            let promise = PaxosMessage::promise(seq(0), None, None);
            paxos.on_receive_msg(addr(peer), promise, &mut journal).unwrap();
        }
        network.take();

        let outcomes = paxos
            .on_accept(
                addr(0),
                Accept {
                    seq: seq(0),
                    value: value(1),
                },
                &mut journal,
            )
            .unwrap();
        assert_eq!(
            outcomes,
            Some(PaxosOutcome::Consensus {
                success: true,
                value: value(1)
            })
        );
        let sent = network.take();
        assert_eq!(sent.len(), 3);
        assert!(sent
            .iter()
            .all(|(_, msg)| *msg == Message::from(PaxosMessage::learn(seq(0), value(1)))));
        assert_eq!(paxos.acceptor().accepted_seq(), Some(seq(0)));
    }

    #[test]
    fn acceptor_refuses_rounds_below_its_promise() {
        let (mut paxos, network, mut journal) = node(1, &[0, 2]);
        paxos
            .on_receive_msg(addr(2), PaxosMessage::prepare(seq(5)), &mut journal)
            .unwrap();
        assert_eq!(
            network.take(),
            vec![(addr(2), Message::from(PaxosMessage::promise(seq(5), None, None)))]
        );

        paxos
            .on_receive_msg(addr(0), PaxosMessage::accept(seq(3), value(1)), &mut journal)
            .unwrap();
        assert!(network.take().is_empty());
        assert_eq!(paxos.acceptor().accepted_value(), None);

        paxos
            .on_receive_msg(addr(0), PaxosMessage::prepare(seq(3)), &mut journal)
            .unwrap();
        assert_eq!(
            network.take(),
            vec![(addr(0), Message::from(PaxosMessage::nack(seq(3))))]
        );
        assert_eq!(paxos.acceptor().promised_seq(), Some(seq(5)));
    }

    #[test]
    fn value_proposed_during_accept_phase_waits_for_the_round() {
        let (mut paxos, network, mut journal) = node(0, &[1, 2]);
        paxos.propose(value(1), &mut journal).unwrap();
        for peer in [1, 2] {
            let promise = PaxosMessage::promise(seq(0), None, None);
            paxos.on_receive_msg(addr(peer), promise, &mut journal).unwrap();
        }
        network.take();

        assert_eq!(paxos.propose(value(2), &mut journal).unwrap(), None);
        assert_eq!(paxos.proposer().status(), RoundStatus::Accepting);
        assert_eq!(paxos.proposer().queued(), 1);
        assert!(network.take().is_empty());

        let accepted = PaxosMessage::accepted(seq(0), value(1));
        let outcomes = paxos.on_receive_msg(addr(1), accepted, &mut journal).unwrap();
        assert_eq!(
            outcomes,
            vec![PaxosOutcome::Consensus {
                success: true,
                value: value(1)
            }]
        );
        assert_eq!(paxos.proposer().status(), RoundStatus::Preparing);
        assert_eq!(paxos.proposer().proposed_seq(), Some(seq(3)));
        assert_eq!(paxos.proposer().queued(), 0);
        let prepares = network.take();
        assert_eq!(prepares.len(), 3);
        assert!(prepares
            .iter()
            .all(|(_, msg)| *msg == Message::from(PaxosMessage::prepare(seq(3)))));
    }

    #[test]
    fn learn_for_own_round_closes_it() {
        let (mut paxos, network, mut journal) = node(0, &[1, 2]);
        paxos.propose(value(1), &mut journal).unwrap();
        for peer in [1, 2] {
            let promise = PaxosMessage::promise(seq(0), None, None);
            paxos.on_receive_msg(addr(peer), promise, &mut journal).unwrap();
        }
        network.take();

        let learn = PaxosMessage::learn(seq(0), value(1));
        let outcomes = paxos.on_receive_msg(addr(2), learn, &mut journal).unwrap();
        assert_eq!(
            outcomes,
            vec![
                PaxosOutcome::Consensus {
                    success: true,
                    value: value(1)
                },
                PaxosOutcome::Learned {
                    seq: seq(0),
                    value: value(1)
                },
            ]
        );
        assert_eq!(paxos.proposer().status(), RoundStatus::Closed);

        let accepted = PaxosMessage::accepted(seq(0), value(1));
        let outcomes = paxos.on_receive_msg(addr(1), accepted, &mut journal).unwrap();
        assert!(outcomes.is_empty());
    }

    #[test]
    fn late_learn_reports_history_from_its_round() {
        let (mut paxos, _network, mut journal) = node(2, &[0, 1]);

        let outcomes = paxos
            .on_receive_msg(addr(1), PaxosMessage::learn(seq(1), value(2)), &mut journal)
            .unwrap();
        assert_eq!(
            outcomes,
            vec![PaxosOutcome::Learned {
                seq: seq(1),
                value: value(2)
            }]
        );

        let outcomes = paxos
            .on_receive_msg(addr(0), PaxosMessage::learn(seq(0), value(1)), &mut journal)
            .unwrap();
        assert_eq!(
            outcomes,
            vec![PaxosOutcome::Reordered {
                seq: seq(0),
                values: vec![value(1), value(2)]
            }]
        );
        assert_eq!(paxos.learner().learned_seq(), Some(seq(1)));
        assert_eq!(paxos.learner().history().len(), 2);

        let outcomes = paxos
            .on_receive_msg(addr(1), PaxosMessage::learn(seq(0), value(1)), &mut journal)
            .unwrap();
        assert!(outcomes.is_empty());
    }
}
