/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Snapshot transactions over the replicated store.
//!
//! A client runs a transaction against one serving node through three RPCs:
//! 1. `begin` opens a [`Snapshot`](snapshot::Snapshot) and returns its session id.
//! 2. `do` applies one [`Operation`](messages::Operation) to the snapshot. This is local speculative
//!    execution: no network round trip and no consensus.
//! 3. `commit` flattens the snapshot into a single [`Value`](crate::types::value::Value) and, unless
//!    the snapshot wrote nothing, decides it through [Paxos](crate::paxos).
//!
//! ## Concurrency control
//!
//! Concurrency control is optimistic and works on whole snapshots. A snapshot remembers the last
//! committed session at the time it was opened. If any value has committed since then, on any node,
//! the commit fails with [`StaleSnapshot`](messages::TransactionError::StaleSnapshot), even if the
//! files touched are disjoint. The client must restart the transaction.
//!
//! ## At-most-once execution
//!
//! Every serving node remembers the `(client, transaction id)` pairs that committed through it, and
//! rejects a `begin` that repeats one with
//! [`DuplicateTransaction`](messages::TransactionError::DuplicateTransaction). This makes retrying a
//! transaction safe.

pub mod coordinator;

pub mod messages;

pub mod snapshot;
