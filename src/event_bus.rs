/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The event bus thread, which receives published [events](crate::events) and runs the handlers
//! registered for them.

use std::sync::mpsc::Receiver;
use std::sync::mpsc::TryRecvError;
use std::thread;
use std::thread::JoinHandle;

use crate::events::*;
use crate::logging::Logger;

pub(crate) type HandlerPtr<T> = Box<dyn Fn(&T) + Send>;

pub(crate) struct EventHandlers {
    pub(crate) learn_handlers: Vec<HandlerPtr<LearnEvent>>,
    pub(crate) add_peer_handlers: Vec<HandlerPtr<AddPeerEvent>>,
    pub(crate) apply_value_handlers: Vec<HandlerPtr<ApplyValueEvent>>,
    pub(crate) propose_handlers: Vec<HandlerPtr<ProposeEvent>>,
    pub(crate) promise_handlers: Vec<HandlerPtr<PromiseEvent>>,
    pub(crate) nack_handlers: Vec<HandlerPtr<NackEvent>>,
    pub(crate) accept_handlers: Vec<HandlerPtr<AcceptEvent>>,
    pub(crate) serve_catch_up_handlers: Vec<HandlerPtr<ServeCatchUpEvent>>,
    pub(crate) decide_handlers: Vec<HandlerPtr<DecideEvent>>,
    pub(crate) begin_transaction_handlers: Vec<HandlerPtr<BeginTransactionEvent>>,
    pub(crate) commit_transaction_handlers: Vec<HandlerPtr<CommitTransactionEvent>>,
    pub(crate) complete_command_handlers: Vec<HandlerPtr<CompleteCommandEvent>>,
    pub(crate) cache_hit_handlers: Vec<HandlerPtr<CacheHitEvent>>,
}

impl EventHandlers {
    /// Collect the user's handlers, adding the default logging handler for every event type if
    /// `log_events` is set.
    pub(crate) fn new(
        log_events: bool,
        learn_handler: Option<HandlerPtr<LearnEvent>>,
        add_peer_handler: Option<HandlerPtr<AddPeerEvent>>,
        apply_value_handler: Option<HandlerPtr<ApplyValueEvent>>,
        propose_handler: Option<HandlerPtr<ProposeEvent>>,
        promise_handler: Option<HandlerPtr<PromiseEvent>>,
        nack_handler: Option<HandlerPtr<NackEvent>>,
        accept_handler: Option<HandlerPtr<AcceptEvent>>,
        serve_catch_up_handler: Option<HandlerPtr<ServeCatchUpEvent>>,
        decide_handler: Option<HandlerPtr<DecideEvent>>,
        begin_transaction_handler: Option<HandlerPtr<BeginTransactionEvent>>,
        commit_transaction_handler: Option<HandlerPtr<CommitTransactionEvent>>,
        complete_command_handler: Option<HandlerPtr<CompleteCommandEvent>>,
        cache_hit_handler: Option<HandlerPtr<CacheHitEvent>>,
    ) -> EventHandlers {
        EventHandlers {
            learn_handlers: handlers(log_events, learn_handler),
            add_peer_handlers: handlers(log_events, add_peer_handler),
            apply_value_handlers: handlers(log_events, apply_value_handler),
            propose_handlers: handlers(log_events, propose_handler),
            promise_handlers: handlers(log_events, promise_handler),
            nack_handlers: handlers(log_events, nack_handler),
            accept_handlers: handlers(log_events, accept_handler),
            serve_catch_up_handlers: handlers(log_events, serve_catch_up_handler),
            decide_handlers: handlers(log_events, decide_handler),
            begin_transaction_handlers: handlers(log_events, begin_transaction_handler),
            commit_transaction_handlers: handlers(log_events, commit_transaction_handler),
            complete_command_handlers: handlers(log_events, complete_command_handler),
            cache_hit_handlers: handlers(log_events, cache_hit_handler),
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.learn_handlers.is_empty()
            && self.add_peer_handlers.is_empty()
            && self.apply_value_handlers.is_empty()
            && self.propose_handlers.is_empty()
            && self.promise_handlers.is_empty()
            && self.nack_handlers.is_empty()
            && self.accept_handlers.is_empty()
            && self.serve_catch_up_handlers.is_empty()
            && self.decide_handlers.is_empty()
            && self.begin_transaction_handlers.is_empty()
            && self.commit_transaction_handlers.is_empty()
            && self.complete_command_handlers.is_empty()
            && self.cache_hit_handlers.is_empty()
    }

    pub(crate) fn fire_handlers(&self, event: Event) {
        match event {
            Event::Learn(learn_event) =>
                self.learn_handlers.iter().for_each(|handler| handler(&learn_event)),

            Event::AddPeer(add_peer_event) =>
                self.add_peer_handlers.iter().for_each(|handler| handler(&add_peer_event)),

            Event::ApplyValue(apply_value_event) =>
                self.apply_value_handlers.iter().for_each(|handler| handler(&apply_value_event)),

            Event::Propose(propose_event) =>
                self.propose_handlers.iter().for_each(|handler| handler(&propose_event)),

            Event::Promise(promise_event) =>
                self.promise_handlers.iter().for_each(|handler| handler(&promise_event)),

            Event::Nack(nack_event) =>
                self.nack_handlers.iter().for_each(|handler| handler(&nack_event)),

            Event::Accept(accept_event) =>
                self.accept_handlers.iter().for_each(|handler| handler(&accept_event)),

            Event::ServeCatchUp(serve_catch_up_event) =>
                self.serve_catch_up_handlers.iter().for_each(|handler| handler(&serve_catch_up_event)),

            Event::Decide(decide_event) =>
                self.decide_handlers.iter().for_each(|handler| handler(&decide_event)),

            Event::BeginTransaction(begin_transaction_event) =>
                self.begin_transaction_handlers.iter().for_each(|handler| handler(&begin_transaction_event)),

            Event::CommitTransaction(commit_transaction_event) =>
                self.commit_transaction_handlers.iter().for_each(|handler| handler(&commit_transaction_event)),

            Event::CompleteCommand(complete_command_event) =>
                self.complete_command_handlers.iter().for_each(|handler| handler(&complete_command_event)),

            Event::CacheHit(cache_hit_event) =>
                self.cache_hit_handlers.iter().for_each(|handler| handler(&cache_hit_event)),
        }
    }
}

fn handlers<T: Logger>(log_events: bool, user_handler: Option<HandlerPtr<T>>) -> Vec<HandlerPtr<T>> {
    let mut handlers = Vec::new();
    if log_events {
        handlers.push(T::get_logger());
    }
    if let Some(handler) = user_handler {
        handlers.push(handler);
    }
    handlers
}

pub(crate) fn start_event_bus(
    event_handlers: EventHandlers,
    event_subscriber: Receiver<Event>,
    shutdown_signal: Receiver<()>,
) -> JoinHandle<()> {
    thread::spawn(move || loop {
        match shutdown_signal.try_recv() {
            Ok(()) => return,
            Err(TryRecvError::Empty) => (),
            Err(TryRecvError::Disconnected) => {
                panic!("event_bus thread disconnected from main thread")
            }
        }

        match event_subscriber.try_recv() {
            Ok(event) => event_handlers.fire_handlers(event),
            Err(TryRecvError::Empty) => thread::yield_now(),
            // The node thread has exited; keep serving the shutdown signal.
            Err(TryRecvError::Disconnected) => thread::yield_now(),
        }
    })
}
