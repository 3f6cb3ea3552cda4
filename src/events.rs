/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Definitions of the events a node emits for event handling and logging.
//!
//! An event for a given action indicates that the action has been completed. Events are published
//! on a channel and handled on the [event bus](crate::event_bus) thread, so handlers never run inside
//! the node's handler chain.

use std::sync::mpsc::Sender;
use std::time::SystemTime;

use crate::types::{
    data_types::{NodeAddress, ProposalId, SequenceNumber, SessionId, TransactionId},
    value::Value,
};

pub enum Event {
    // Events that change persistent state.
    Learn(LearnEvent),
    AddPeer(AddPeerEvent),
    ApplyValue(ApplyValueEvent),
    // Events that involve sending a Paxos message.
    Propose(ProposeEvent),
    Promise(PromiseEvent),
    Nack(NackEvent),
    Accept(AcceptEvent),
    ServeCatchUp(ServeCatchUpEvent),
    // Round outcomes.
    Decide(DecideEvent),
    // Transaction events.
    BeginTransaction(BeginTransactionEvent),
    CommitTransaction(CommitTransactionEvent),
    // Client events.
    CompleteCommand(CompleteCommandEvent),
    CacheHit(CacheHitEvent),
}

impl Event {
    pub(crate) fn publish(event_publisher: &Option<Sender<Event>>, event: Event) {
        if let Some(event_publisher) = event_publisher {
            let _ = event_publisher.send(event);
        }
    }
}

/// The node learned `value` as the newest decided value.
pub struct LearnEvent {
    pub timestamp: SystemTime,
    pub seq: SequenceNumber,
    pub value: Value,
}

pub struct AddPeerEvent {
    pub timestamp: SystemTime,
    pub peer: NodeAddress,
}

/// The writes of a decided value reached storage.
pub struct ApplyValueEvent {
    pub timestamp: SystemTime,
    pub proposal: ProposalId,
    pub files: usize,
}

/// The node broadcast a `PREPARE` for a new round.
pub struct ProposeEvent {
    pub timestamp: SystemTime,
    pub seq: SequenceNumber,
    pub value: Value,
}

pub struct PromiseEvent {
    pub timestamp: SystemTime,
    pub proposer: NodeAddress,
    pub seq: SequenceNumber,
}

pub struct NackEvent {
    pub timestamp: SystemTime,
    pub proposer: NodeAddress,
    pub seq: SequenceNumber,
}

pub struct AcceptEvent {
    pub timestamp: SystemTime,
    pub proposer: NodeAddress,
    pub seq: SequenceNumber,
    pub value: Value,
}

pub struct ServeCatchUpEvent {
    pub timestamp: SystemTime,
    pub peer: NodeAddress,
    pub since: Option<SequenceNumber>,
    pub updates: usize,
}

/// A round this node proposed in has ended. `success` is false if the round was nacked, or if the
/// decided value is not the one this node originally proposed.
pub struct DecideEvent {
    pub timestamp: SystemTime,
    pub seq: SequenceNumber,
    pub proposal: ProposalId,
    pub success: bool,
}

pub struct BeginTransactionEvent {
    pub timestamp: SystemTime,
    pub origin: NodeAddress,
    pub txn: TransactionId,
    pub session: SessionId,
}

pub struct CommitTransactionEvent {
    pub timestamp: SystemTime,
    pub origin: NodeAddress,
    pub session: SessionId,
    pub proposal: ProposalId,
    pub success: bool,
}

pub struct CompleteCommandEvent {
    pub timestamp: SystemTime,
    pub command: String,
    pub success: bool,
}

/// A read was answered from the client's read cache without a network round trip.
pub struct CacheHitEvent {
    pub timestamp: SystemTime,
    pub filename: String,
}
