/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Subprotocol for deciding [values](crate::types::value::Value).
//!
//! ## Roles
//!
//! Every node plays all three Paxos roles at once. There is no fixed leader: any node may propose at
//! any time. The roles are capability traits, [`Acceptor`](acceptor::Acceptor),
//! [`Proposer`](proposer::Proposer), and [`Learner`](learner::Learner), implemented by a single
//! [`Paxos`](protocol::Paxos) struct that embeds the state of each role and the node's
//! [`Membership`](crate::membership::Membership).
//!
//! ## Rounds
//!
//! A round is identified by its sequence number. Sequence numbers are partitioned among proposers by
//! [residue](sequence::next_seq), so each round has exactly one proposer, and rounds of the same
//! proposer are numbered in strictly increasing order.
//!
//! A round generally proceeds as follows:
//! 1. The proposer broadcasts a [`Prepare`](messages::Prepare) to every peer, itself included.
//! 2. Each acceptor that has not promised a higher round promises this one, replying with a
//!    [`Promise`](messages::Promise) that carries the pair it most recently accepted. Other acceptors
//!    reply with a [`Nack`](messages::Nack).
//! 3. Once a strict majority of the *current* peer set has promised, the proposer broadcasts an
//!    [`Accept`](messages::Accept).
//! 4. Each acceptor that has not promised a higher round accepts, replying with an
//!    [`Accepted`](messages::Accepted) and broadcasting a [`Learn`](messages::Learn) to every peer.
//!    Acceptors that have promised a higher round drop the accept silently.
//! 5. The first `Accepted` for the round ends it: the round succeeds if the accepted value is the one
//!    the proposer originally proposed.
//!
//! A `Nack` received before the accept phase ends the round immediately as a failure. The core never
//! retries: a caller that wants to retry proposes again, in a new round.
//!
//! ## Learning and catching up
//!
//! Every node keeps a write-once history of learned `(seq, value)` pairs. The newest learned value is
//! handed to the [transaction coordinator](crate::transaction::coordinator), which applies it to
//! storage. A node that starts, or falls behind, broadcasts a [`CatchUp`](messages::CatchUp) carrying
//! its newest learned sequence number, and peers reply with an [`Update`](messages::Update) containing
//! the part of their history it is missing. Receiving a `CatchUp` or `Update` from an unknown node
//! adds that node to the peer set.

pub mod messages;

pub(crate) mod acceptor;

pub(crate) mod learner;

pub(crate) mod proposer;

pub(crate) mod protocol;

pub(crate) mod sequence;
