/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Functions and types for sending messages to the P2P network.

use crate::types::data_types::NodeAddress;

use super::{codec, messages::Message, network::Network};

/// Handle for encoding and sending messages to the [`Network`].
///
/// It can be used to send instances of any type that implement the [`Into<Message>`] trait.
/// Messages that fail to encode are logged and dropped.
#[derive(Clone)]
pub(crate) struct SenderHandle<N: Network> {
    network: N,
}

impl<N: Network> SenderHandle<N> {
    pub(crate) fn new(network: N) -> Self {
        Self { network }
    }

    pub(crate) fn send<S: Into<Message>>(&mut self, peer: NodeAddress, msg: S) {
        if let Some(bytes) = encode(msg.into()) {
            self.network.send(peer, bytes)
        }
    }

    /// Send the same message to each of `peers`.
    pub(crate) fn send_to_all<'a, S: Into<Message>>(
        &mut self,
        peers: impl IntoIterator<Item = &'a NodeAddress>,
        msg: S,
    ) {
        if let Some(bytes) = encode(msg.into()) {
            for peer in peers {
                self.network.send(*peer, bytes.clone())
            }
        }
    }

    /// Send a message to every node on the network, known peers or not.
    pub(crate) fn broadcast<S: Into<Message>>(&mut self, msg: S) {
        if let Some(bytes) = encode(msg.into()) {
            self.network.broadcast(bytes)
        }
    }
}

fn encode(msg: Message) -> Option<Vec<u8>> {
    match codec::encode(&msg) {
        Ok(bytes) => Some(bytes),
        Err(err) => {
            log::warn!("Dropping outgoing {} message: {}", msg.kind(), err);
            None
        }
    }
}
