/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

use crate::types::data_types::NodeAddress;

/// Unreliable, connectionless transport between nodes.
///
/// Implementations are free to lose, duplicate, delay, or reorder any message. The node tolerates
/// all of these; what it needs from the transport is only that a delivered byte string is delivered
/// unmodified and with its true origin.
pub trait Network: Clone + Send {
    /// Send a message to the specified peer without blocking.
    fn send(&mut self, peer: NodeAddress, bytes: Vec<u8>);

    /// Send a message to every node reachable on the network (including the sender itself)
    /// without blocking. Unlike sending to each member of the peer set, this also reaches nodes the
    /// sender has not discovered yet.
    fn broadcast(&mut self, bytes: Vec<u8>);

    /// Receive a message from any peer. Returns immediately with a None if no message is available now.
    fn recv(&mut self) -> Option<(NodeAddress, Vec<u8>)>;
}
