use std::{
    collections::BTreeMap,
    sync::mpsc::{self, Receiver},
    time::Duration,
};

use paxos_store::{
    config::Configuration,
    events::Event,
    journal::MemJournal,
    networking::{codec, messages::Message},
    node::Node,
    storage::MemStorage,
    transaction::messages::{Action, Reply, Request},
    types::data_types::NodeAddress,
};

use super::network::{Datagram, SimBus, SimNetwork};

pub(crate) type TestNode = Node<SimNetwork, MemStorage, MemJournal>;

struct Member {
    node: TestNode,
    storage: MemStorage,
    journal: MemJournal,
    events: Receiver<Event>,
    initial_peers: Vec<NodeAddress>,
}

/// Nodes connected by a [`SimBus`]. Datagrams only move when the test asks the cluster to deliver
/// them.
pub(crate) struct Cluster {
    pub(crate) bus: SimBus,
    cache_ttl: Duration,
    members: BTreeMap<NodeAddress, Member>,
}

impl Cluster {
    /// Start nodes `0..n`, each knowing all the others, and let them finish catching up.
    pub(crate) fn new(n: u32) -> Self {
        Self::with_cache_ttl(n, Duration::from_secs(10))
    }

    pub(crate) fn with_cache_ttl(n: u32, cache_ttl: Duration) -> Self {
        let mut cluster = Cluster {
            bus: SimBus::new(),
            cache_ttl,
            members: BTreeMap::new(),
        };
        let addresses: Vec<NodeAddress> = (0..n).map(NodeAddress::new).collect();
        for address in &addresses {
            cluster.add_node(*address, addresses.clone());
        }
        cluster.run_until_quiet();
        cluster
    }

    /// Start a node with fresh storage and journal. Does not deliver anything.
    pub(crate) fn add_node(&mut self, address: NodeAddress, initial_peers: Vec<NodeAddress>) {
        let storage = MemStorage::new();
        let journal = MemJournal::new();
        let member = self.start_node(address, storage, journal, initial_peers);
        self.members.insert(address, member);
    }

    /// Replace a node by a new one built from the old node's storage and journal. Datagrams in
    /// flight to or from the node are lost.
    pub(crate) fn restart(&mut self, address: NodeAddress) {
        let old = self.members.remove(&address).unwrap();
        drop(old.node);
        self.bus.discard(address);
        let member = self.start_node(address, old.storage, old.journal, old.initial_peers);
        self.members.insert(address, member);
    }

    fn start_node(
        &self,
        address: NodeAddress,
        storage: MemStorage,
        journal: MemJournal,
        initial_peers: Vec<NodeAddress>,
    ) -> Member {
        let configuration = Configuration::builder()
            .me(address)
            .initial_peers(initial_peers.clone())
            .cache_ttl(self.cache_ttl)
            .build();
        let (event_publisher, events) = mpsc::channel();
        let mut node = Node::new(
            configuration,
            self.bus.join(address),
            storage.clone(),
            journal.clone(),
            Some(event_publisher),
        )
        .unwrap();
        node.start().unwrap();
        Member {
            node,
            storage,
            journal,
            events,
            initial_peers,
        }
    }

    pub(crate) fn node(&self, address: u32) -> &TestNode {
        &self.members[&NodeAddress::new(address)].node
    }

    pub(crate) fn storage(&self, address: u32) -> &MemStorage {
        &self.members[&NodeAddress::new(address)].storage
    }

    pub(crate) fn journal(&self, address: u32) -> &MemJournal {
        &self.members[&NodeAddress::new(address)].journal
    }

    pub(crate) fn addresses(&self) -> Vec<NodeAddress> {
        self.members.keys().copied().collect()
    }

    /// Drain the events node `address` published so far.
    pub(crate) fn events(&self, address: u32) -> Vec<Event> {
        self.members[&NodeAddress::new(address)]
            .events
            .try_iter()
            .collect()
    }

    /// Hand a command to a node without delivering anything.
    pub(crate) fn submit(&mut self, address: u32, command: &str) {
        self.members
            .get_mut(&NodeAddress::new(address))
            .unwrap()
            .node
            .on_command(command)
            .unwrap();
    }

    /// Hand a command to a node and deliver until the network is quiet.
    pub(crate) fn command(&mut self, address: u32, command: &str) {
        self.submit(address, command);
        self.run_until_quiet();
    }

    /// Send a transaction RPC as if it came from a client at `from`. Replies to addresses without a
    /// node are not delivered, but can be read back with [`Cluster::replies_to`].
    pub(crate) fn request(&mut self, from: u32, to: u32, action: Action) {
        self.send_request(from, to, action);
        self.run_until_quiet();
    }

    /// Put a transaction RPC in flight without delivering anything.
    pub(crate) fn send_request(&mut self, from: u32, to: u32, action: Action) {
        let request = Message::RpcRequest(Request {
            command: format!("raw {}", from),
            action,
        });
        self.bus.push(
            NodeAddress::new(from),
            NodeAddress::new(to),
            codec::encode(&request).unwrap(),
        );
    }

    pub(crate) fn replies_to(&self, address: u32) -> Vec<Reply> {
        self.bus
            .sent()
            .iter()
            .filter(|datagram| datagram.to == NodeAddress::new(address))
            .filter_map(|datagram| match datagram.message() {
                Message::RpcReply(reply) => Some(reply),
                _ => None,
            })
            .collect()
    }

    /// Deliver datagrams in sending order until none are left in flight.
    pub(crate) fn run_until_quiet(&mut self) {
        let mut steps = 0;
        while let Some(datagram) = self.bus.pop() {
            self.deliver(datagram);
            steps += 1;
            assert!(steps < 100_000, "network did not quiet down");
        }
    }

    /// Deliver only the datagrams that satisfy `filter`, including ones sent while delivering, until
    /// none of those are left in flight.
    pub(crate) fn deliver_matching(&mut self, filter: impl Fn(&Datagram) -> bool) {
        while let Some(datagram) = self.bus.pop_matching(&filter) {
            self.deliver(datagram);
        }
    }

    fn deliver(&mut self, datagram: Datagram) {
        if let Some(member) = self.members.get_mut(&datagram.to) {
            member
                .node
                .on_receive(datagram.from, &datagram.bytes)
                .unwrap();
        }
    }
}
