/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The [`Client`], which drives procedures through transaction RPCs.

use std::collections::{HashMap, VecDeque};
use std::sync::mpsc::Sender;
use std::time::{Duration, SystemTime};

use crate::{
    events::{CacheHitEvent, CompleteCommandEvent, Event},
    journal::{Journal, JournalEntry, JournalError},
    networking::{network::Network, sending::SenderHandle},
    transaction::messages::{
        Action, OpResult, Operation, Reply, ReplyBody, Request, TransactionError,
    },
    types::data_types::{NodeAddress, SessionId, TransactionId},
};

use super::{
    cache::TtlCache,
    procedure::{parse_command, CommandError, Procedure, Yielded},
};

/// How a client command ended.
pub type CommandOutcome = Result<OpResult, TransactionError>;

pub(crate) struct ClientConfiguration {
    pub(crate) cache_ttl: Duration,
}

struct PendingCommand {
    server: NodeAddress,
    procedure: Box<dyn Procedure>,
    session: Option<SessionId>,
    txn: Option<TransactionId>,
    /// The request whose reply the procedure waits for. Replies to anything else are duplicates.
    awaiting: Option<Action>,
}

struct Outbound {
    server: NodeAddress,
    request: Request,
}

struct Inbound {
    origin: NodeAddress,
    reply: Reply,
    /// Put into the queue by the read cache, not received from the network.
    cached: bool,
}

pub(crate) struct Client<N: Network> {
    pending: HashMap<String, PendingCommand>,
    outcomes: HashMap<String, CommandOutcome>,
    send_queue: VecDeque<Outbound>,
    recv_queue: VecDeque<Inbound>,
    cache: TtlCache<Option<Vec<u8>>>,
    txn_counter: u64,
    recovered: Vec<String>,
    sender_handle: SenderHandle<N>,
    event_publisher: Option<Sender<Event>>,
}

impl<N: Network> Client<N> {
    pub(crate) fn new(
        config: ClientConfiguration,
        network: N,
        event_publisher: Option<Sender<Event>>,
    ) -> Self {
        Self {
            cache: TtlCache::new(config.cache_ttl),
            pending: HashMap::new(),
            outcomes: HashMap::new(),
            send_queue: VecDeque::new(),
            recv_queue: VecDeque::new(),
            txn_counter: 0,
            recovered: Vec::new(),
            sender_handle: SenderHandle::new(network),
            event_publisher,
        }
    }

    /// Parse and start a client command.
    pub(crate) fn issue<J: Journal>(
        &mut self,
        command: &str,
        journal: &mut J,
    ) -> Result<(), ClientError> {
        let command = command.trim();
        if self.pending.contains_key(command) {
            return Err(CommandError::AlreadyPending(command.to_string()).into());
        }
        let (server, procedure) = parse_command(command)?;
        journal.append(&JournalEntry::CommandIssued {
            command: command.to_string(),
        })?;
        self.outcomes.remove(command);
        self.start(command.to_string(), server, procedure, journal)?;
        Ok(())
    }

    /// Queue a reply received from the network and process both queues.
    pub(crate) fn on_reply<J: Journal>(
        &mut self,
        origin: NodeAddress,
        reply: Reply,
        journal: &mut J,
    ) -> Result<(), JournalError> {
        self.recv_queue.push_back(Inbound {
            origin,
            reply,
            cached: false,
        });
        self.pump(journal)
    }

    /// Re-run the commands that were pending when the node stopped.
    pub(crate) fn resume_recovered<J: Journal>(
        &mut self,
        journal: &mut J,
    ) -> Result<(), JournalError> {
        for command in std::mem::take(&mut self.recovered) {
            match parse_command(&command) {
                Ok((server, procedure)) => {
                    log::debug!("Re-running command \"{}\"", command);
                    self.start(command, server, procedure, journal)?;
                }
                Err(err) => log::warn!("Dropping recovered command \"{}\": {}", command, err),
            }
        }
        Ok(())
    }

    pub(crate) fn restore(&mut self, entry: &JournalEntry) {
        match entry {
            JournalEntry::TransactionIssued { txn } => {
                self.txn_counter = self.txn_counter.max(txn.int())
            }
            JournalEntry::CommandIssued { command } => {
                if !self.recovered.contains(command) {
                    self.recovered.push(command.clone())
                }
            }
            JournalEntry::CommandCompleted { command } => self.recovered.retain(|c| c != command),
            _ => (),
        }
    }

    pub(crate) fn outcome(&self, command: &str) -> Option<&CommandOutcome> {
        self.outcomes.get(command.trim())
    }

    pub(crate) fn is_pending(&self, command: &str) -> bool {
        self.pending.contains_key(command.trim())
    }

    fn start<J: Journal>(
        &mut self,
        command: String,
        server: NodeAddress,
        procedure: Box<dyn Procedure>,
        journal: &mut J,
    ) -> Result<(), JournalError> {
        self.pending.insert(
            command.clone(),
            PendingCommand {
                server,
                procedure,
                session: None,
                txn: None,
                awaiting: None,
            },
        );
        self.step(&command, None, journal)?;
        self.pump(journal)
    }

    /// Resume the procedure of `command` and act on what it yields.
    fn step<J: Journal>(
        &mut self,
        command: &str,
        last: Option<OpResult>,
        journal: &mut J,
    ) -> Result<(), JournalError> {
        let Some(pending) = self.pending.get_mut(command) else {
            return Ok(());
        };
        let yielded = pending.procedure.resume(last);
        let server = pending.server;
        let session = pending.session;
        let txn = pending.txn;

        let action = match (yielded, session, txn) {
            (Yielded::Done(result), _, _) => return self.finish(command, Ok(result), journal),
            (Yielded::StartTransaction, _, _) => {
                let txn = self.next_txn(journal)?;
                if let Some(pending) = self.pending.get_mut(command) {
                    pending.txn = Some(txn);
                    pending.session = None;
                }
                Action::Begin { txn }
            }
            (Yielded::Perform(operation), Some(session), Some(txn)) => Action::Do {
                session,
                txn,
                operation,
            },
            (Yielded::Commit, Some(session), Some(txn)) => Action::Commit { session, txn },
            _ => return self.finish(command, Err(TransactionError::NoTransaction), journal),
        };
        self.send_rpc(command, server, action);
        Ok(())
    }

    /// Queue a request, or answer it from the read cache.
    fn send_rpc(&mut self, command: &str, server: NodeAddress, action: Action) {
        if let Some(pending) = self.pending.get_mut(command) {
            pending.awaiting = Some(action.clone());
        }

        if let Action::Do { operation, .. } = &action {
            let filename = operation.filename();
            if let Operation::Read { .. } = operation {
                if let Some(content) = self.cache.get(filename) {
                    Event::publish(
                        &self.event_publisher,
                        Event::CacheHit(CacheHitEvent {
                            timestamp: SystemTime::now(),
                            filename: filename.to_string(),
                        }),
                    );
                    self.recv_queue.push_back(Inbound {
                        origin: server,
                        reply: Reply {
                            command: command.to_string(),
                            request: action,
                            body: ReplyBody::Done {
                                result: OpResult::Content(content),
                            },
                        },
                        cached: true,
                    });
                    return;
                }
            } else if operation.is_write() {
                self.cache.remove(filename);
            }
        }

        self.send_queue.push_back(Outbound {
            server,
            request: Request {
                command: command.to_string(),
                action,
            },
        });
    }

    /// Drain both queues until neither has anything left.
    fn pump<J: Journal>(&mut self, journal: &mut J) -> Result<(), JournalError> {
        loop {
            while let Some(Outbound { server, request }) = self.send_queue.pop_front() {
                self.sender_handle.send(server, request);
            }
            match self.recv_queue.pop_front() {
                Some(inbound) => self.handle_reply(inbound, journal)?,
                None => return Ok(()),
            }
        }
    }

    fn handle_reply<J: Journal>(
        &mut self,
        inbound: Inbound,
        journal: &mut J,
    ) -> Result<(), JournalError> {
        let Inbound {
            origin,
            reply,
            cached,
        } = inbound;
        let Some(pending) = self.pending.get_mut(&reply.command) else {
            log::debug!(
                "Ignoring reply from {} for finished command \"{}\"",
                origin,
                reply.command
            );
            return Ok(());
        };
        if pending.server != origin || pending.awaiting.as_ref() != Some(&reply.request) {
            log::debug!(
                "Ignoring duplicate reply from {} for \"{}\"",
                origin,
                reply.command
            );
            return Ok(());
        }
        pending.awaiting = None;

        match reply.body {
            ReplyBody::Began { session } => {
                pending.session = Some(session);
                self.step(&reply.command, None, journal)
            }
            ReplyBody::Done { result } => {
                if let (
                    Action::Do {
                        operation: Operation::Read { filename },
                        ..
                    },
                    OpResult::Content(content),
                ) = (&reply.request, &result)
                {
                    if !cached {
                        self.cache.insert(filename, content.clone());
                    }
                }
                self.step(&reply.command, Some(result), journal)
            }
            ReplyBody::Committed => self.step(&reply.command, None, journal),
            ReplyBody::Failed(err) => self.finish(&reply.command, Err(err), journal),
        }
    }

    fn finish<J: Journal>(
        &mut self,
        command: &str,
        outcome: CommandOutcome,
        journal: &mut J,
    ) -> Result<(), JournalError> {
        journal.append(&JournalEntry::CommandCompleted {
            command: command.to_string(),
        })?;
        self.pending.remove(command);

        match &outcome {
            Ok(_) => log::debug!("Command \"{}\" completed", command),
            Err(err) => log::debug!("Command \"{}\" failed: {}", command, err),
        }
        Event::publish(
            &self.event_publisher,
            Event::CompleteCommand(CompleteCommandEvent {
                timestamp: SystemTime::now(),
                command: command.to_string(),
                success: outcome.is_ok(),
            }),
        );
        self.outcomes.insert(command.to_string(), outcome);
        Ok(())
    }

    fn next_txn<J: Journal>(&mut self, journal: &mut J) -> Result<TransactionId, JournalError> {
        let txn = TransactionId::new(self.txn_counter + 1);
        journal.append(&JournalEntry::TransactionIssued { txn })?;
        self.txn_counter = txn.int();
        Ok(txn)
    }
}

/// Why a client command could not be issued.
#[derive(Debug)]
pub(crate) enum ClientError {
    CommandError(CommandError),
    JournalError(JournalError),
}

impl From<CommandError> for ClientError {
    fn from(value: CommandError) -> Self {
        ClientError::CommandError(value)
    }
}

impl From<JournalError> for ClientError {
    fn from(value: JournalError) -> Self {
        ClientError::JournalError(value)
    }
}
