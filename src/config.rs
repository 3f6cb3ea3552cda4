/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Configuration as specified by the operator.
//!
//! [`Configuration`] is split up into smaller, component specific configuration structs before being
//! passed to the [Paxos](crate::paxos) core and the [client](crate::session).
//!
//! ```ignore
//! let configuration =
//!     Configuration::builder()
//!     .me(NodeAddress::new(0))
//!     .initial_peers(vec![NodeAddress::new(1), NodeAddress::new(2)])
//!     .cache_ttl(Duration::from_secs(5))
//!     .log_events(true)
//!     .build()
//! ```

use std::time::Duration;

use typed_builder::TypedBuilder;

use crate::{
    paxos::protocol::PaxosConfiguration, session::client::ClientConfiguration,
    types::data_types::NodeAddress,
};

/// Stores the user-defined parameters of a node:
/// 1. The node's own address.
/// 2. The peers the node knows about when it starts. More peers can be added at runtime with
///    `paxos_setup`, and are discovered when they ask to catch up.
/// 3. How long a file read by a client command stays in the client's read cache.
/// 4. The "Log Events" flag. If set to "true", every [event](crate::events) is logged.
///
/// ## Log Events
///
/// The node logs using the [log](https://docs.rs/log/latest/log/) crate. To get these messages
/// printed onto a terminal or to a file, set up a [logging
/// implementation](https://docs.rs/log/latest/log/#available-logging-implementations).
#[derive(Clone, Debug, TypedBuilder)]
#[builder(builder_method(doc = "
    Create a builder for building a [Configuration]. On the builder call the following methods to construct a valid [Configuration].

    Required:
    - `.me(...)`

    Optional:
    - `.initial_peers(...)`
    - `.cache_ttl(...)`
    - `.log_events(...)`
"))]
pub struct Configuration {
    #[builder(setter(doc = "Set the node's address. Required."))]
    pub me: NodeAddress,
    #[builder(
        default,
        setter(doc = "Set the peers the node starts with. Defaults to none. Optional.")
    )]
    pub initial_peers: Vec<NodeAddress>,
    #[builder(
        default = Duration::from_secs(10),
        setter(doc = "Set how long a read stays in the client's read cache. Defaults to 10 seconds. Optional.")
    )]
    pub cache_ttl: Duration,
    #[builder(
        default = false,
        setter(doc = "Enable logging of events? Defaults to false. Optional.")
    )]
    pub log_events: bool,
}

impl Into<(PaxosConfiguration, ClientConfiguration)> for Configuration {
    fn into(self) -> (PaxosConfiguration, ClientConfiguration) {
        let paxos_config = PaxosConfiguration { me: self.me };
        let client_config = ClientConfiguration {
            cache_ttl: self.cache_ttl,
        };
        (paxos_config, client_config)
    }
}
