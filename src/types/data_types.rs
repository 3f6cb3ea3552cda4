/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Types that exist only to store numbers, and do not have any major "active" behavior.

use std::{
    fmt::{self, Display, Formatter},
    num::ParseIntError,
    str::FromStr,
};

use borsh::{BorshDeserialize, BorshSerialize};

/// Integer that uniquely identifies a peer.
///
/// Addresses are assigned by [configuration](crate::config::Configuration) and stay fixed for the
/// lifetime of the process. A node's address also determines the residue class (modulo the size of
/// its peer set) that its Paxos [sequence numbers](SequenceNumber) are drawn from.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, BorshSerialize, BorshDeserialize,
)]
pub struct NodeAddress(u32);

impl NodeAddress {
    /// Create a new `NodeAddress` with an `int` value.
    pub const fn new(int: u32) -> Self {
        Self(int)
    }

    /// Get the `u32` value of this `NodeAddress`.
    pub const fn int(&self) -> u32 {
        self.0
    }
}

impl Display for NodeAddress {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl FromStr for NodeAddress {
    type Err = ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse().map(Self)
    }
}

/// Number of a Paxos round.
///
/// Every round is identified by exactly one sequence number, and every sequence number belongs to
/// exactly one proposer: `seq mod |peers|` is the proposer's address.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, BorshSerialize, BorshDeserialize,
)]
pub struct SequenceNumber(u64);

impl SequenceNumber {
    /// Create a new `SequenceNumber` with an `int` value.
    pub const fn new(int: u64) -> Self {
        Self(int)
    }

    /// Get the `u64` value of this `SequenceNumber`.
    pub const fn int(&self) -> u64 {
        self.0
    }
}

impl Display for SequenceNumber {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

/// Identifies a snapshot on the node that opened it.
///
/// Session ids are also the ordering used for optimistic concurrency control: committing the
/// snapshot of session `s` advances every replica's "last committed session" to at least `s`.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, BorshSerialize, BorshDeserialize,
)]
pub struct SessionId(u64);

impl SessionId {
    pub const fn new(int: u64) -> Self {
        Self(int)
    }

    pub const fn int(&self) -> u64 {
        self.0
    }
}

impl Display for SessionId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

/// Identifies a transaction among all transactions started by the same client node.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, BorshSerialize, BorshDeserialize,
)]
pub struct TransactionId(u64);

impl TransactionId {
    pub const fn new(int: u64) -> Self {
        Self(int)
    }

    pub const fn int(&self) -> u64 {
        self.0
    }
}

impl Display for TransactionId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

/// Identifies a proposed [value](crate::types::value::Value): the node that built it, and that
/// node's proposal counter at the time.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, BorshSerialize, BorshDeserialize,
)]
pub struct ProposalId {
    origin: NodeAddress,
    counter: u64,
}

impl ProposalId {
    pub const fn new(origin: NodeAddress, counter: u64) -> Self {
        Self { origin, counter }
    }

    pub const fn origin(&self) -> NodeAddress {
        self.origin
    }

    pub const fn counter(&self) -> u64 {
        self.counter
    }
}

impl Display for ProposalId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.origin, self.counter)
    }
}

/// Version of a file in [storage](crate::storage::Storage). Every mutation of a file gives it a
/// version greater than any version handed out before.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, BorshSerialize, BorshDeserialize,
)]
pub struct Version(u64);

impl Version {
    pub const fn new(int: u64) -> Self {
        Self(int)
    }

    pub const fn int(&self) -> u64 {
        self.0
    }
}

impl Display for Version {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}
