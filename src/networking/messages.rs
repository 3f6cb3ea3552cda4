/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Exhaustive enumeration of every message variant sent between nodes.

use borsh::{BorshDeserialize, BorshSerialize};

use crate::{
    paxos::messages::PaxosMessage,
    transaction::messages::{Reply, Request},
};

/// All message variants sent between nodes.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub enum Message {
    /// See: [`PaxosMessage`].
    PaxosMessage(PaxosMessage),

    /// A transaction RPC sent by a client to the node serving its transaction.
    RpcRequest(Request),

    /// The serving node's answer to an [`RpcRequest`](Message::RpcRequest).
    RpcReply(Reply),
}

impl Message {
    /// Name of the message kind, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Message::PaxosMessage(msg) => msg.kind(),
            Message::RpcRequest(_) => "REQUEST",
            Message::RpcReply(_) => "REPLY",
        }
    }
}

impl From<PaxosMessage> for Message {
    fn from(value: PaxosMessage) -> Self {
        Message::PaxosMessage(value)
    }
}

impl From<Request> for Message {
    fn from(value: Request) -> Self {
        Message::RpcRequest(value)
    }
}

impl From<Reply> for Message {
    fn from(value: Reply) -> Self {
        Message::RpcReply(value)
    }
}
