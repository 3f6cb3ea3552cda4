/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! A single replica of the store, as an event-driven actor.
//!
//! A [`Node`] composes the [Paxos](crate::paxos) roles, the transaction
//! [coordinator](crate::transaction::coordinator) and the [client](crate::session) of one replica.
//! It has no thread of its own: whoever owns it (the [replica runner](crate::replica), or a test)
//! hands it one input at a time, either a datagram from the [network](crate::networking) through
//! [`on_receive`](Node::on_receive) or a command line through [`on_command`](Node::on_command), and
//! the node runs one synchronous handler chain in response.
//!
//! ## Commands
//!
//! Besides client commands (see [`procedure`](crate::session::procedure)), a node understands two
//! administrative commands:
//! - `paxos_setup <address>...` adds peers to the node's peer set.
//! - `paxos_propose <file>=<content>...` proposes the given file contents directly, outside of any
//!   transaction.
//!
//! ## Recovery
//!
//! [`Node::new`] replays the [journal](crate::journal) before the node handles anything. A node
//! restarted over the journal of a crashed node keeps its promises, its learned history, the
//! transactions it served, and its client's pending commands. [`Node::start`] then asks the network
//! for the values it missed and re-runs the pending commands.

use std::collections::BTreeMap;
use std::fmt::{self, Display, Formatter};
use std::sync::mpsc::Sender;

use crate::{
    config::Configuration,
    events::Event,
    journal::{Journal, JournalError},
    networking::{codec, messages::Message, network::Network, sending::SenderHandle},
    paxos::{
        proposer::Proposer,
        protocol::{Paxos, PaxosError, PaxosOutcome},
    },
    session::{
        client::{Client, ClientError, CommandOutcome},
        procedure::CommandError,
    },
    storage::Storage,
    transaction::{
        coordinator::{CommitOutcome, Coordinator},
        messages::{Action, Reply, ReplyBody, Request},
    },
    types::{
        data_types::{NodeAddress, SequenceNumber, SessionId, TransactionId},
        value::{Value, Writes},
    },
};

#[derive(Debug)]
pub enum NodeError {
    JournalError(JournalError),
    PaxosError(PaxosError),
    CommandError(CommandError),
}

impl Display for NodeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            NodeError::JournalError(err) => Display::fmt(err, f),
            NodeError::PaxosError(err) => Display::fmt(err, f),
            NodeError::CommandError(err) => Display::fmt(err, f),
        }
    }
}

impl From<JournalError> for NodeError {
    fn from(value: JournalError) -> Self {
        NodeError::JournalError(value)
    }
}

impl From<PaxosError> for NodeError {
    fn from(value: PaxosError) -> Self {
        NodeError::PaxosError(value)
    }
}

impl From<CommandError> for NodeError {
    fn from(value: CommandError) -> Self {
        NodeError::CommandError(value)
    }
}

impl From<ClientError> for NodeError {
    fn from(value: ClientError) -> Self {
        match value {
            ClientError::CommandError(err) => NodeError::CommandError(err),
            ClientError::JournalError(err) => NodeError::JournalError(err),
        }
    }
}

pub struct Node<N: Network, S: Storage, J: Journal> {
    paxos: Paxos<N>,
    coordinator: Coordinator,
    client: Client<N>,
    storage: S,
    journal: J,
    sender_handle: SenderHandle<N>,
}

impl<N: Network, S: Storage, J: Journal> Node<N, S, J> {
    /// Create a node, restoring its state from `journal`.
    pub fn new(
        configuration: Configuration,
        network: N,
        mut storage: S,
        mut journal: J,
        event_publisher: Option<Sender<Event>>,
    ) -> Result<Self, NodeError> {
        let me = configuration.me;
        let initial_peers = configuration.initial_peers.clone();
        let (paxos_config, client_config) = configuration.into();

        let mut paxos = Paxos::new(paxos_config, network.clone(), event_publisher.clone());
        let mut coordinator = Coordinator::new(me, event_publisher.clone());
        let mut client = Client::new(client_config, network.clone(), event_publisher);

        let entries = journal.replay()?;
        log::debug!("Node {} replaying {} journal entries", me, entries.len());
        for entry in &entries {
            paxos.restore(entry);
            coordinator.restore(entry);
            client.restore(entry);
        }

        // Values may have been learned but not yet applied when the node stopped. Everything from
        // the oldest of those onward is applied again, in round order.
        coordinator.finish_interrupted_apply(&mut storage, &mut journal)?;
        let history = paxos.learner().history();
        if let Some(seq) = history
            .iter()
            .find(|(_, value)| !coordinator.is_applied(value))
            .map(|(seq, _)| *seq)
        {
            let values: Vec<Value> = history.range(seq..).map(|(_, value)| value.clone()).collect();
            log::debug!("Node {} re-applying {} learned values", me, values.len());
            coordinator.reapply(&values, &mut storage, &mut journal)?;
        }

        for peer in initial_peers {
            paxos.add_peer(peer, &mut journal)?;
        }

        Ok(Self {
            paxos,
            coordinator,
            client,
            storage,
            journal,
            sender_handle: SenderHandle::new(network),
        })
    }

    /// Ask the network for missed values, and re-run the client commands that were pending when the
    /// node last stopped.
    pub fn start(&mut self) -> Result<(), NodeError> {
        self.paxos.catch_up();
        self.client.resume_recovered(&mut self.journal)?;
        Ok(())
    }

    /// Handle a datagram received from `origin`. Datagrams that fail to decode are dropped.
    pub fn on_receive(&mut self, origin: NodeAddress, bytes: &[u8]) -> Result<(), NodeError> {
        let msg: Message = match codec::decode(bytes) {
            Ok(msg) => msg,
            Err(err) => {
                log::warn!("Dropping message from {}: {}", origin, err);
                return Ok(());
            }
        };

        match msg {
            Message::PaxosMessage(msg) => {
                let outcomes = self.paxos.on_receive_msg(origin, msg, &mut self.journal)?;
                self.on_paxos_outcomes(outcomes)
            }
            Message::RpcRequest(request) => self.on_request(origin, request),
            Message::RpcReply(reply) => {
                self.client.on_reply(origin, reply, &mut self.journal)?;
                Ok(())
            }
        }
    }

    /// Handle an administrative or client command.
    pub fn on_command(&mut self, line: &str) -> Result<(), NodeError> {
        let mut words = line.split_whitespace();
        match words.next() {
            Some("paxos_setup") => {
                let peers = words
                    .map(|word| {
                        word.parse()
                            .map_err(|_| CommandError::InvalidAddress(word.to_string()))
                    })
                    .collect::<Result<Vec<NodeAddress>, _>>()?;
                if peers.is_empty() {
                    return Err(CommandError::WrongArity {
                        command: "paxos_setup".to_string(),
                        expected: 1,
                        got: 0,
                    }
                    .into());
                }
                for peer in peers {
                    self.paxos.add_peer(peer, &mut self.journal)?;
                }
                Ok(())
            }
            Some("paxos_propose") => {
                let writes = words
                    .map(|word| match word.split_once('=') {
                        Some((filename, content)) if !filename.is_empty() => {
                            Ok((filename.to_string(), Some(content.as_bytes().to_vec())))
                        }
                        _ => Err(CommandError::InvalidWrite(word.to_string())),
                    })
                    .collect::<Result<Writes, _>>()?;
                if writes.is_empty() {
                    return Err(CommandError::WrongArity {
                        command: "paxos_propose".to_string(),
                        expected: 1,
                        got: 0,
                    }
                    .into());
                }
                let proposal = self.coordinator.issue_proposal(&mut self.journal)?;
                self.propose(Value::new(proposal, None, writes))
            }
            Some(_) => {
                self.client.issue(line, &mut self.journal)?;
                Ok(())
            }
            None => Err(CommandError::Empty.into()),
        }
    }

    fn on_request(&mut self, origin: NodeAddress, request: Request) -> Result<(), NodeError> {
        let Request { command, action } = request;
        let body = match &action {
            Action::Begin { txn } => self.coordinator.begin(origin, *txn, &mut self.journal)?,
            Action::Do {
                session,
                txn,
                operation,
            } => self
                .coordinator
                .perform(*session, *txn, operation, &self.storage),
            Action::Commit { session, txn } => {
                match self.coordinator.commit(
                    command.clone(),
                    *session,
                    *txn,
                    &self.storage,
                    &mut self.journal,
                )? {
                    CommitOutcome::Rejected(err) => ReplyBody::Failed(err),
                    CommitOutcome::Resolved(value) => return self.on_consensus(true, &value),
                    CommitOutcome::Propose(value) => return self.propose(value),
                }
            }
        };

        self.sender_handle.send(
            origin,
            Reply {
                command,
                request: action,
                body,
            },
        );
        Ok(())
    }

    fn propose(&mut self, value: Value) -> Result<(), NodeError> {
        let abandoned = self.paxos.propose(value, &mut self.journal)?;
        self.on_paxos_outcomes(abandoned.into_iter().collect())
    }

    fn on_paxos_outcomes(&mut self, outcomes: Vec<PaxosOutcome>) -> Result<(), NodeError> {
        for outcome in outcomes {
            match outcome {
                PaxosOutcome::Consensus { success, value } => self.on_consensus(success, &value)?,
                PaxosOutcome::Learned { seq, value } => {
                    log::debug!("Node {} learned {} at {}", self.address(), value.proposal, seq);
                    self.coordinator
                        .on_learned(&value, &mut self.storage, &mut self.journal)?
                }
                PaxosOutcome::Reordered { seq, values } => {
                    log::debug!(
                        "Node {} re-applying {} values from round {}",
                        self.address(),
                        values.len(),
                        seq
                    );
                    self.coordinator
                        .reapply(&values, &mut self.storage, &mut self.journal)?
                }
            }
        }
        Ok(())
    }

    fn on_consensus(&mut self, success: bool, value: &Value) -> Result<(), NodeError> {
        if let Some((destination, reply)) =
            self.coordinator
                .on_consensus(success, value, &mut self.storage, &mut self.journal)?
        {
            self.sender_handle.send(destination, reply);
        }
        Ok(())
    }

    pub fn address(&self) -> NodeAddress {
        self.paxos.membership().me()
    }

    pub fn peers(&self) -> Vec<NodeAddress> {
        self.paxos.membership().peers().copied().collect()
    }

    pub fn learned_seq(&self) -> Option<SequenceNumber> {
        self.paxos.learner().learned_seq()
    }

    pub fn learned_value(&self) -> Option<&Value> {
        self.paxos.learner().learned_value()
    }

    pub fn learned_history(&self) -> &BTreeMap<SequenceNumber, Value> {
        self.paxos.learner().history()
    }

    pub fn promised_seq(&self) -> Option<SequenceNumber> {
        self.paxos.acceptor().promised_seq()
    }

    pub fn accepted_seq(&self) -> Option<SequenceNumber> {
        self.paxos.acceptor().accepted_seq()
    }

    pub fn last_committed(&self) -> Option<SessionId> {
        self.coordinator.last_committed()
    }

    /// Whether transaction `txn` of client `origin` committed through this node.
    pub fn is_transaction_completed(&self, origin: NodeAddress, txn: TransactionId) -> bool {
        self.coordinator.is_completed(origin, txn)
    }

    /// Number of snapshots this node has open.
    pub fn open_sessions(&self) -> usize {
        self.coordinator.open_sessions()
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Get how the last run of `command` ended, if it has.
    pub fn command_outcome(&self, command: &str) -> Option<&CommandOutcome> {
        self.client.outcome(command)
    }

    pub fn is_command_pending(&self, command: &str) -> bool {
        self.client.is_pending(command)
    }
}
