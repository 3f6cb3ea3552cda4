/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Pluggable peer-to-peer (P2P) networking.
//!
//! Nodes exchange opaque byte strings over a user-provided [`Network`]. The transport is allowed
//! to drop, delay, reorder, and duplicate messages. Every byte string is a [`Message`](messages::Message)
//! encoded by the [codec](codec).

pub mod codec;

pub mod messages;

pub mod network;

pub(crate) mod sending;

pub use network::Network;
