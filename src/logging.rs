/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Functions that log out events.
//!
//! The logs defined in this module are printed if the user enabled them via the node's
//! [configuration](crate::config::Configuration).
//!
//! Nodes log using the [log](https://docs.rs/log/latest/log/) crate. To get these messages
//! printed onto a terminal or to a file, set up a
//! [logging implementation](https://docs.rs/log/latest/log/#available-logging-implementations).
//!
//! ## Log message format
//!
//! Log messages are CSVs (Comma Separated Values) with at least two values. The first two values are
//! always:
//! 1. The name of the [event](crate::events) in PascalCase (defined in this module as constants).
//! 2. The time the event was emitted (as number of seconds since the Unix Epoch).
//!
//! The rest of the values differ depending on the kind of event. For example, the following snippet
//! is how a [Learn](crate::events::LearnEvent) is printed:
//!
//! ```text
//! Learn, 1701329264, 7, fNGCJyk, 2
//! ```
//!
//! In the snippet:
//! - The third value is the sequence number of the round the value was decided in.
//! - The fourth value is the first seven characters of the Base64 encoding of the SHA256 digest of
//!   the learned value.
//! - The fifth value is the number of files the value writes.
//!
//! Absent sequence numbers are printed as `-`.

use std::time::SystemTime;

use base64::{engine::general_purpose::STANDARD_NO_PAD, Engine as _};
use log;

use crate::{events::*, types::data_types::SequenceNumber};

// Names of each event in PascalCase for printing:
pub const LEARN: &str = "Learn";
pub const ADD_PEER: &str = "AddPeer";
pub const APPLY_VALUE: &str = "ApplyValue";

pub const PROPOSE: &str = "Propose";
pub const PROMISE: &str = "Promise";
pub const NACK: &str = "Nack";
pub const ACCEPT: &str = "Accept";
pub const SERVE_CATCH_UP: &str = "ServeCatchUp";

pub const DECIDE: &str = "Decide";

pub const BEGIN_TRANSACTION: &str = "BeginTransaction";
pub const COMMIT_TRANSACTION: &str = "CommitTransaction";

pub const COMPLETE_COMMAND: &str = "CompleteCommand";
pub const CACHE_HIT: &str = "CacheHit";

/// Implemented by event types. Used to get a closure that logs the event.
pub(crate) trait Logger {
    /// Returns a pointer to the default logging handler for a given event type.
    fn get_logger() -> Box<dyn Fn(&Self) + Send>;
}

impl Logger for LearnEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |learn_event: &LearnEvent| {
            log::info!(
                "{}, {}, {}, {}, {}",
                LEARN,
                secs_since_unix_epoch(learn_event.timestamp),
                learn_event.seq,
                first_seven_base64_chars(&learn_event.value.digest()),
                learn_event.value.writes.len()
            )
        };
        Box::new(logger)
    }
}

impl Logger for AddPeerEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |add_peer_event: &AddPeerEvent| {
            log::info!(
                "{}, {}, {}",
                ADD_PEER,
                secs_since_unix_epoch(add_peer_event.timestamp),
                add_peer_event.peer
            )
        };
        Box::new(logger)
    }
}

impl Logger for ApplyValueEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |apply_value_event: &ApplyValueEvent| {
            log::info!(
                "{}, {}, {}, {}",
                APPLY_VALUE,
                secs_since_unix_epoch(apply_value_event.timestamp),
                apply_value_event.proposal,
                apply_value_event.files
            )
        };
        Box::new(logger)
    }
}

impl Logger for ProposeEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |propose_event: &ProposeEvent| {
            log::info!(
                "{}, {}, {}, {}, {}",
                PROPOSE,
                secs_since_unix_epoch(propose_event.timestamp),
                propose_event.seq,
                propose_event.value.proposal,
                first_seven_base64_chars(&propose_event.value.digest())
            )
        };
        Box::new(logger)
    }
}

impl Logger for PromiseEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |promise_event: &PromiseEvent| {
            log::info!(
                "{}, {}, {}, {}",
                PROMISE,
                secs_since_unix_epoch(promise_event.timestamp),
                promise_event.proposer,
                promise_event.seq
            )
        };
        Box::new(logger)
    }
}

impl Logger for NackEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |nack_event: &NackEvent| {
            log::info!(
                "{}, {}, {}, {}",
                NACK,
                secs_since_unix_epoch(nack_event.timestamp),
                nack_event.proposer,
                nack_event.seq
            )
        };
        Box::new(logger)
    }
}

impl Logger for AcceptEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |accept_event: &AcceptEvent| {
            log::info!(
                "{}, {}, {}, {}, {}",
                ACCEPT,
                secs_since_unix_epoch(accept_event.timestamp),
                accept_event.proposer,
                accept_event.seq,
                first_seven_base64_chars(&accept_event.value.digest())
            )
        };
        Box::new(logger)
    }
}

impl Logger for ServeCatchUpEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |serve_catch_up_event: &ServeCatchUpEvent| {
            log::info!(
                "{}, {}, {}, {}, {}",
                SERVE_CATCH_UP,
                secs_since_unix_epoch(serve_catch_up_event.timestamp),
                serve_catch_up_event.peer,
                optional_seq(serve_catch_up_event.since),
                serve_catch_up_event.updates
            )
        };
        Box::new(logger)
    }
}

impl Logger for DecideEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |decide_event: &DecideEvent| {
            log::info!(
                "{}, {}, {}, {}, {}",
                DECIDE,
                secs_since_unix_epoch(decide_event.timestamp),
                decide_event.seq,
                decide_event.proposal,
                decide_event.success
            )
        };
        Box::new(logger)
    }
}

impl Logger for BeginTransactionEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |begin_transaction_event: &BeginTransactionEvent| {
            log::info!(
                "{}, {}, {}, {}, {}",
                BEGIN_TRANSACTION,
                secs_since_unix_epoch(begin_transaction_event.timestamp),
                begin_transaction_event.origin,
                begin_transaction_event.txn,
                begin_transaction_event.session
            )
        };
        Box::new(logger)
    }
}

impl Logger for CommitTransactionEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |commit_transaction_event: &CommitTransactionEvent| {
            log::info!(
                "{}, {}, {}, {}, {}, {}",
                COMMIT_TRANSACTION,
                secs_since_unix_epoch(commit_transaction_event.timestamp),
                commit_transaction_event.origin,
                commit_transaction_event.session,
                commit_transaction_event.proposal,
                commit_transaction_event.success
            )
        };
        Box::new(logger)
    }
}

impl Logger for CompleteCommandEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |complete_command_event: &CompleteCommandEvent| {
            log::info!(
                "{}, {}, {:?}, {}",
                COMPLETE_COMMAND,
                secs_since_unix_epoch(complete_command_event.timestamp),
                complete_command_event.command,
                complete_command_event.success
            )
        };
        Box::new(logger)
    }
}

impl Logger for CacheHitEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |cache_hit_event: &CacheHitEvent| {
            log::info!(
                "{}, {}, {}",
                CACHE_HIT,
                secs_since_unix_epoch(cache_hit_event.timestamp),
                cache_hit_event.filename
            )
        };
        Box::new(logger)
    }
}

fn first_seven_base64_chars(bytes: &[u8]) -> String {
    let encoded = STANDARD_NO_PAD.encode(bytes);
    if encoded.len() > 7 {
        encoded[0..7].to_string()
    } else {
        encoded
    }
}

fn secs_since_unix_epoch(timestamp: SystemTime) -> u64 {
    timestamp
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|duration| duration.as_secs())
        .unwrap_or(0)
}

fn optional_seq(seq: Option<SequenceNumber>) -> String {
    match seq {
        Some(seq) => seq.to_string(),
        None => String::from("-"),
    }
}
