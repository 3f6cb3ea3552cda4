/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! A versioned file store replicated across a small set of peers with Paxos.
//!
//! Every peer runs a [`Node`](node::Node) that plays all three Paxos roles, serves snapshot
//! transactions to clients, and is itself a client that runs user commands against any peer. Writes
//! made inside a transaction are flattened into a single value at commit time, and that value is
//! decided through Paxos and applied identically on every replica.
//!
//! The store talks to the outside world through three traits that the library user provides:
//! [`Network`](networking::Network), [`Storage`](storage::Storage), and
//! [`Journal`](journal::Journal). In-memory implementations of the latter two are included.
//!
//! To run a node on its own thread, see [`replica`].

pub mod config;

pub(crate) mod event_bus;

pub mod events;

pub mod journal;

pub(crate) mod logging;

pub mod membership;

pub mod networking;

pub mod node;

pub mod paxos;

pub mod replica;

pub mod session;

pub mod storage;

pub mod transaction;

pub mod types;
