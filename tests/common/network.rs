use std::{
    collections::{BTreeSet, HashMap, VecDeque},
    sync::{
        mpsc::{self, Receiver, Sender, TryRecvError},
        Arc, Mutex,
    },
};

use paxos_store::{
    networking::{codec, messages::Message, Network},
    types::data_types::NodeAddress,
};

/// A datagram in flight, or one that was sent.
#[derive(Clone)]
pub(crate) struct Datagram {
    pub(crate) from: NodeAddress,
    pub(crate) to: NodeAddress,
    pub(crate) bytes: Vec<u8>,
}

impl Datagram {
    pub(crate) fn message(&self) -> Message {
        codec::decode(&self.bytes).unwrap()
    }

    pub(crate) fn kind(&self) -> &'static str {
        self.message().kind()
    }
}

#[derive(Default)]
struct BusState {
    members: BTreeSet<NodeAddress>,
    in_flight: VecDeque<Datagram>,
    sent: Vec<Datagram>,
    duplicate: bool,
}

/// A single-threaded network that queues every datagram until the test delivers it. Delivery order
/// is the order of sending, so runs are deterministic.
#[derive(Clone, Default)]
pub(crate) struct SimBus(Arc<Mutex<BusState>>);

impl SimBus {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Get the network handle of `me`, and make `me` a receiver of broadcasts.
    pub(crate) fn join(&self, me: NodeAddress) -> SimNetwork {
        self.0.lock().unwrap().members.insert(me);
        SimNetwork {
            me,
            bus: self.clone(),
        }
    }

    pub(crate) fn push(&self, from: NodeAddress, to: NodeAddress, bytes: Vec<u8>) {
        let mut state = self.0.lock().unwrap();
        let datagram = Datagram { from, to, bytes };
        state.sent.push(datagram.clone());
        if state.duplicate {
            state.in_flight.push_back(datagram.clone());
        }
        state.in_flight.push_back(datagram);
    }

    /// Take the oldest datagram in flight.
    pub(crate) fn pop(&self) -> Option<Datagram> {
        self.0.lock().unwrap().in_flight.pop_front()
    }

    /// Take the oldest datagram in flight that satisfies `filter`, leaving the rest in place.
    pub(crate) fn pop_matching(&self, filter: impl Fn(&Datagram) -> bool) -> Option<Datagram> {
        let mut state = self.0.lock().unwrap();
        let position = state.in_flight.iter().position(|datagram| filter(datagram))?;
        state.in_flight.remove(position)
    }

    /// Drop every datagram in flight to or from `node`.
    pub(crate) fn discard(&self, node: NodeAddress) {
        self.0
            .lock()
            .unwrap()
            .in_flight
            .retain(|datagram| datagram.to != node && datagram.from != node);
    }

    /// Deliver every datagram twice from now on.
    pub(crate) fn set_duplicate(&self, duplicate: bool) {
        self.0.lock().unwrap().duplicate = duplicate;
    }

    /// Every datagram sent since the last call to `clear_sent`.
    pub(crate) fn sent(&self) -> Vec<Datagram> {
        self.0.lock().unwrap().sent.clone()
    }

    pub(crate) fn clear_sent(&self) {
        self.0.lock().unwrap().sent.clear();
    }
}

#[derive(Clone)]
pub(crate) struct SimNetwork {
    me: NodeAddress,
    bus: SimBus,
}

impl Network for SimNetwork {
    fn send(&mut self, peer: NodeAddress, bytes: Vec<u8>) {
        self.bus.push(self.me, peer, bytes)
    }

    fn broadcast(&mut self, bytes: Vec<u8>) {
        let members = self.bus.0.lock().unwrap().members.clone();
        for peer in members {
            self.bus.push(self.me, peer, bytes.clone())
        }
    }

    // The cluster delivers datagrams itself.
    fn recv(&mut self) -> Option<(NodeAddress, Vec<u8>)> {
        None
    }
}

/// A mock network stub which passes messages from and to threads using channels.
#[derive(Clone)]
pub(crate) struct NetworkStub {
    my_address: NodeAddress,
    all_peers: HashMap<NodeAddress, Sender<(NodeAddress, Vec<u8>)>>,
    inbox: Arc<Mutex<Receiver<(NodeAddress, Vec<u8>)>>>,
}

impl Network for NetworkStub {
    fn send(&mut self, peer: NodeAddress, bytes: Vec<u8>) {
        if let Some(peer) = self.all_peers.get(&peer) {
            let _ = peer.send((self.my_address, bytes));
        }
    }

    fn broadcast(&mut self, bytes: Vec<u8>) {
        for peer in self.all_peers.values() {
            let _ = peer.send((self.my_address, bytes.clone()));
        }
    }

    fn recv(&mut self) -> Option<(NodeAddress, Vec<u8>)> {
        match self.inbox.lock().unwrap().try_recv() {
            Ok(o_m) => Some(o_m),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => panic!(),
        }
    }
}

pub(crate) fn mock_network(peers: impl Iterator<Item = NodeAddress>) -> Vec<NetworkStub> {
    let mut all_peers = HashMap::new();
    let peer_and_inboxes: Vec<(NodeAddress, Receiver<(NodeAddress, Vec<u8>)>)> = peers
        .map(|peer| {
            let (sender, receiver) = mpsc::channel();
            all_peers.insert(peer, sender);

            (peer, receiver)
        })
        .collect();

    peer_and_inboxes
        .into_iter()
        .map(|(my_address, inbox)| NetworkStub {
            my_address,
            all_peers: all_peers.clone(),
            inbox: Arc::new(Mutex::new(inbox)),
        })
        .collect()
}
