/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Methods to build and run a replica.
//!
//! A replica is a [`Node`] driven by a dedicated thread. The thread polls a command channel and the
//! [network](crate::networking), and hands every input to the node in turn. If event handlers are
//! registered, or event logging is enabled, a second thread runs the [event bus](crate::events).
//!
//! The key components of this module are:
//! - The builder-pattern interface to construct a [specification of the replica](ReplicaSpec) with:
//!   1. `ReplicaSpec::builder` to construct a `ReplicaSpecBuilder`,
//!   2. The setters of the `ReplicaSpecBuilder`, and
//!   3. The `ReplicaSpecBuilder::build` method to construct a [ReplicaSpec],
//! - The function to [start](ReplicaSpec::start) a [Replica] given its specification,
//! - [The type](Replica) which keeps the replica alive.
//!
//! ## Starting a replica
//!
//! ```ignore
//! let replica =
//!     ReplicaSpec::builder()
//!     .network(network)
//!     .storage(storage)
//!     .journal(journal)
//!     .configuration(configuration)
//!     .on_learn(learn_handler)
//!     .build()
//!     .start()?;
//!
//! replica.submit_command("1 put notes hello");
//! ```
//!
//! ### Required setters
//!
//! - `.network(...)`
//! - `.storage(...)`
//! - `.journal(...)`
//! - `.configuration(...)`
//!
//! ### Optional setters
//!
//! The optional setters are for registering user-defined event handlers for events from [crate::events]:
//! - `.on_learn(...)`
//! - `.on_add_peer(...)`
//! - `.on_apply_value(...)`
//! - `.on_propose(...)`
//! - `.on_promise(...)`
//! - `.on_nack(...)`
//! - `.on_accept(...)`
//! - `.on_serve_catch_up(...)`
//! - `.on_decide(...)`
//! - `.on_begin_transaction(...)`
//! - `.on_commit_transaction(...)`
//! - `.on_complete_command(...)`
//! - `.on_cache_hit(...)`

use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::thread::{self, JoinHandle};

use typed_builder::TypedBuilder;

use crate::{
    config::Configuration,
    event_bus::*,
    events::*,
    journal::Journal,
    networking::network::Network,
    node::{Node, NodeError},
    storage::Storage,
};

/// Stores all necessary parameters and trait implementations required to run the [Replica].
#[derive(TypedBuilder)]
#[builder(builder_method(doc = "
    Create a builder for building a [ReplicaSpec]. On the builder call the following methods to construct a valid [ReplicaSpec].

    Required:
    - `.network(...)`
    - `.storage(...)`
    - `.journal(...)`
    - `.configuration(...)`

    Optional:
    - `.on_learn(...)`
    - `.on_add_peer(...)`
    - `.on_apply_value(...)`
    - `.on_propose(...)`
    - `.on_promise(...)`
    - `.on_nack(...)`
    - `.on_accept(...)`
    - `.on_serve_catch_up(...)`
    - `.on_decide(...)`
    - `.on_begin_transaction(...)`
    - `.on_commit_transaction(...)`
    - `.on_complete_command(...)`
    - `.on_cache_hit(...)`
"))]
pub struct ReplicaSpec<N: Network + 'static, S: Storage, J: Journal> {
    // Required parameters
    #[builder(setter(doc = "Set the implementation of peer-to-peer networking. The argument must implement the [Network](crate::networking::Network) trait. Required."))]
    network: N,
    #[builder(setter(doc = "Set the storage the replica applies decided values to. The argument must implement the [Storage](crate::storage::Storage) trait. Required."))]
    storage: S,
    #[builder(setter(doc = "Set the journal the replica's state is recovered from. The argument must implement the [Journal](crate::journal::Journal) trait. Required."))]
    journal: J,
    #[builder(setter(doc = "Set the [configuration](Configuration), which contains the necessary parameters to run a replica. Required."))]
    configuration: Configuration,
    // Optional parameters
    #[builder(default, setter(transform = |handler: impl Fn(&LearnEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<LearnEvent>),
    doc = "Register a handler closure to be invoked after a value becomes the node's newest learned value. Optional."))]
    on_learn: Option<HandlerPtr<LearnEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&AddPeerEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<AddPeerEvent>),
    doc = "Register a handler closure to be invoked after a peer is added to the node's peer set. Optional."))]
    on_add_peer: Option<HandlerPtr<AddPeerEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&ApplyValueEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<ApplyValueEvent>),
    doc = "Register a handler closure to be invoked after a decided value is applied to the node's storage. Optional."))]
    on_apply_value: Option<HandlerPtr<ApplyValueEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&ProposeEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<ProposeEvent>),
    doc = "Register a handler closure to be invoked after the node starts a Paxos round. Optional."))]
    on_propose: Option<HandlerPtr<ProposeEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&PromiseEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<PromiseEvent>),
    doc = "Register a handler closure to be invoked after the node promises a round. Optional."))]
    on_promise: Option<HandlerPtr<PromiseEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&NackEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<NackEvent>),
    doc = "Register a handler closure to be invoked after the node rejects a prepare for a superseded round. Optional."))]
    on_nack: Option<HandlerPtr<NackEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&AcceptEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<AcceptEvent>),
    doc = "Register a handler closure to be invoked after the node accepts a value. Optional."))]
    on_accept: Option<HandlerPtr<AcceptEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&ServeCatchUpEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<ServeCatchUpEvent>),
    doc = "Register a handler closure to be invoked after the node answers a peer's catch-up request. Optional."))]
    on_serve_catch_up: Option<HandlerPtr<ServeCatchUpEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&DecideEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<DecideEvent>),
    doc = "Register a handler closure to be invoked after a round proposed by the node ends. Optional."))]
    on_decide: Option<HandlerPtr<DecideEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&BeginTransactionEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<BeginTransactionEvent>),
    doc = "Register a handler closure to be invoked after the node opens a snapshot for a client. Optional."))]
    on_begin_transaction: Option<HandlerPtr<BeginTransactionEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&CommitTransactionEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<CommitTransactionEvent>),
    doc = "Register a handler closure to be invoked after a commit served by the node is resolved. Optional."))]
    on_commit_transaction: Option<HandlerPtr<CommitTransactionEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&CompleteCommandEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<CompleteCommandEvent>),
    doc = "Register a handler closure to be invoked after a client command completes. Optional."))]
    on_complete_command: Option<HandlerPtr<CompleteCommandEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&CacheHitEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<CacheHitEvent>),
    doc = "Register a handler closure to be invoked after a client read is answered from the read cache. Optional."))]
    on_cache_hit: Option<HandlerPtr<CacheHitEvent>>,
}

impl<N: Network + 'static, S: Storage, J: Journal> ReplicaSpec<N, S, J> {
    /// Restore the node from its journal, start all threads and channels associated with running it,
    /// and return the handles to them in a [Replica] struct.
    pub fn start(self) -> Result<Replica, NodeError> {
        let log_events = self.configuration.log_events;
        let event_handlers = EventHandlers::new(
            log_events,
            self.on_learn,
            self.on_add_peer,
            self.on_apply_value,
            self.on_propose,
            self.on_promise,
            self.on_nack,
            self.on_accept,
            self.on_serve_catch_up,
            self.on_decide,
            self.on_begin_transaction,
            self.on_commit_transaction,
            self.on_complete_command,
            self.on_cache_hit,
        );

        let (event_publisher, event_subscriber) = if !event_handlers.is_empty() {
            Some(mpsc::channel()).unzip()
        } else {
            (None, None)
        };

        let node = Node::new(
            self.configuration,
            self.network.clone(),
            self.storage,
            self.journal,
            event_publisher,
        )?;

        let (event_bus, event_bus_shutdown) = match event_subscriber {
            Some(event_subscriber) => {
                let (shutdown, shutdown_receiver) = mpsc::channel();
                (
                    Some(start_event_bus(
                        event_handlers,
                        event_subscriber,
                        shutdown_receiver,
                    )),
                    Some(shutdown),
                )
            }
            None => (None, None),
        };

        let (commands, command_receiver) = mpsc::channel();
        let (node_shutdown, node_shutdown_receiver) = mpsc::channel();
        let node_thread = start_node(node, self.network, command_receiver, node_shutdown_receiver);

        Ok(Replica {
            commands,
            node_thread: Some(node_thread),
            node_shutdown,
            event_bus,
            event_bus_shutdown,
        })
    }
}

/// Run `node` until a shutdown signal arrives. Commands take priority over network messages.
fn start_node<N: Network + 'static, S: Storage, J: Journal>(
    mut node: Node<N, S, J>,
    mut network: N,
    commands: Receiver<String>,
    shutdown_signal: Receiver<()>,
) -> JoinHandle<()> {
    thread::spawn(move || {
        if let Err(err) = node.start() {
            log::warn!("Node {} failed to start: {}", node.address(), err);
        }

        loop {
            match shutdown_signal.try_recv() {
                Ok(()) | Err(TryRecvError::Disconnected) => return,
                Err(TryRecvError::Empty) => (),
            }

            let result = match commands.try_recv() {
                Ok(command) => node.on_command(&command),
                Err(_) => match network.recv() {
                    Some((origin, bytes)) => node.on_receive(origin, &bytes),
                    None => {
                        thread::yield_now();
                        Ok(())
                    }
                },
            };
            if let Err(err) = result {
                log::warn!("Node {}: {}", node.address(), err);
            }
        }
    })
}

/// A handle to the background threads of a replica. When this value is dropped, all background
/// threads are gracefully shut down.
pub struct Replica {
    commands: Sender<String>,
    node_thread: Option<JoinHandle<()>>,
    node_shutdown: Sender<()>,
    event_bus: Option<JoinHandle<()>>,
    event_bus_shutdown: Option<Sender<()>>,
}

impl Replica {
    /// Hand a command line to the node thread. See [`Node::on_command`].
    pub fn submit_command(&self, command: &str) {
        if self.commands.send(command.to_string()).is_err() {
            log::warn!("Dropping command \"{}\": node thread has stopped", command);
        }
    }
}

impl Drop for Replica {
    fn drop(&mut self) {
        // The node thread publishes to the event bus, so it stops first.
        let _ = self.node_shutdown.send(());
        if let Some(node_thread) = self.node_thread.take() {
            let _ = node_thread.join();
        }

        if let Some(shutdown) = &self.event_bus_shutdown {
            let _ = shutdown.send(());
        }
        if let Some(event_bus) = self.event_bus.take() {
            let _ = event_bus.join();
        }
    }
}
