/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The client side of snapshot transactions.
//!
//! A client command such as `2 put notes hello` names a serving node and a [procedure](procedure).
//! Procedures are state machines that yield one step at a time: start a transaction, perform an
//! operation, commit, or finish with a result. The [`Client`](client::Client) turns every step into a
//! transaction RPC to the serving node and resumes the procedure when the matching reply arrives.
//!
//! Requests and replies pass through two FIFO queues. Reads go through a [TTL cache](cache) first: a
//! read of a cached file is answered by a reply the client puts into its own inbound queue, and no
//! request goes out. Any write to a file evicts the file from the cache before the write request is
//! sent.
//!
//! Commands are journaled when issued and when completed. A client that restarts re-runs the commands
//! that were pending, from the start.

pub mod cache;

pub(crate) mod client;

pub mod procedure;
