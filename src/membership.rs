/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The set of peers a node runs Paxos with.
//!
//! The peer set only ever grows: through the `paxos_setup` administrative command, through the
//! configured initial peers, or passively, when a node hears a `CATCH_UP` or `UPDATE` from a peer it
//! did not know about. Quorums are always computed against the peer set as it is at the moment
//! votes are tallied.

use std::collections::BTreeSet;

use crate::{
    journal::{Journal, JournalEntry, JournalError},
    paxos::sequence::quorum,
    types::data_types::NodeAddress,
};

#[derive(Clone, Debug)]
pub struct Membership {
    me: NodeAddress,
    peers: BTreeSet<NodeAddress>,
}

impl Membership {
    /// Create a peer set that contains only `me`.
    pub fn new(me: NodeAddress) -> Self {
        Self {
            me,
            peers: BTreeSet::from([me]),
        }
    }

    pub fn me(&self) -> NodeAddress {
        self.me
    }

    pub fn contains(&self, peer: NodeAddress) -> bool {
        self.peers.contains(&peer)
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    /// Iterate through the peers in ascending address order. Includes this node.
    pub fn peers(&self) -> impl Iterator<Item = &NodeAddress> {
        self.peers.iter()
    }

    /// Number of votes that currently make up a quorum.
    pub fn quorum(&self) -> usize {
        quorum(self.len())
    }

    /// Add `peer` to the peer set, journaling the addition. Returns whether the peer is new.
    pub(crate) fn add<J: Journal>(
        &mut self,
        peer: NodeAddress,
        journal: &mut J,
    ) -> Result<bool, JournalError> {
        if self.contains(peer) {
            return Ok(false);
        }
        journal.append(&JournalEntry::PeerAdded { peer })?;
        self.peers.insert(peer);
        Ok(true)
    }

    pub(crate) fn restore(&mut self, entry: &JournalEntry) {
        if let JournalEntry::PeerAdded { peer } = entry {
            self.peers.insert(*peer);
        }
    }
}
