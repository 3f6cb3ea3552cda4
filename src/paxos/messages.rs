/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Definitions for structured messages that are sent between nodes as part of the
//! [Paxos](crate::paxos) protocol.

use std::collections::BTreeMap;

use borsh::{BorshDeserialize, BorshSerialize};

use crate::types::{data_types::SequenceNumber, value::Value};

#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub enum PaxosMessage {
    Prepare(Prepare),
    Promise(Promise),
    Nack(Nack),
    Accept(Accept),
    Accepted(Accepted),
    Learn(Learn),
    CatchUp(CatchUp),
    Update(Update),
}

impl PaxosMessage {
    pub fn prepare(seq: SequenceNumber) -> PaxosMessage {
        PaxosMessage::Prepare(Prepare { seq })
    }

    pub fn promise(
        seq: SequenceNumber,
        accepted_seq: Option<SequenceNumber>,
        accepted_value: Option<Value>,
    ) -> PaxosMessage {
        PaxosMessage::Promise(Promise {
            seq,
            accepted_seq,
            accepted_value,
        })
    }

    pub fn nack(seq: SequenceNumber) -> PaxosMessage {
        PaxosMessage::Nack(Nack { seq })
    }

    pub fn accept(seq: SequenceNumber, value: Value) -> PaxosMessage {
        PaxosMessage::Accept(Accept { seq, value })
    }

    pub fn accepted(seq: SequenceNumber, value: Value) -> PaxosMessage {
        PaxosMessage::Accepted(Accepted { seq, value })
    }

    pub fn learn(seq: SequenceNumber, value: Value) -> PaxosMessage {
        PaxosMessage::Learn(Learn { seq, value })
    }

    pub fn catch_up(since: Option<SequenceNumber>) -> PaxosMessage {
        PaxosMessage::CatchUp(CatchUp { since })
    }

    pub fn update(
        learned_seq: Option<SequenceNumber>,
        learned_value: Option<Value>,
        updates: BTreeMap<SequenceNumber, Value>,
    ) -> PaxosMessage {
        PaxosMessage::Update(Update {
            learned_seq,
            learned_value,
            updates,
        })
    }

    /// Name of the message kind, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            PaxosMessage::Prepare(_) => "PREPARE",
            PaxosMessage::Promise(_) => "PROMISE",
            PaxosMessage::Nack(_) => "NACK",
            PaxosMessage::Accept(_) => "ACCEPT",
            PaxosMessage::Accepted(_) => "ACCEPTED",
            PaxosMessage::Learn(_) => "LEARN",
            PaxosMessage::CatchUp(_) => "CATCH_UP",
            PaxosMessage::Update(_) => "UPDATE",
        }
    }
}

/// Asks acceptors to promise not to accept rounds numbered below `seq`.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct Prepare {
    pub seq: SequenceNumber,
}

/// An acceptor's promise for round `seq`, carrying the acceptor's most recently accepted pair (if
/// any) so that the proposer can adopt it.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct Promise {
    pub seq: SequenceNumber,
    pub accepted_seq: Option<SequenceNumber>,
    pub accepted_value: Option<Value>,
}

/// An acceptor's refusal to promise for round `seq`.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct Nack {
    pub seq: SequenceNumber,
}

#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct Accept {
    pub seq: SequenceNumber,
    pub value: Value,
}

#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct Accepted {
    pub seq: SequenceNumber,
    pub value: Value,
}

/// Broadcast by an acceptor to every peer after it accepts `value` in round `seq`.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct Learn {
    pub seq: SequenceNumber,
    pub value: Value,
}

/// Asks the receiver for every value it learned in rounds after `since`. Also announces the sender.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct CatchUp {
    pub since: Option<SequenceNumber>,
}

/// Reply to [`CatchUp`].
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct Update {
    pub learned_seq: Option<SequenceNumber>,
    pub learned_value: Option<Value>,
    pub updates: BTreeMap<SequenceNumber, Value>,
}
