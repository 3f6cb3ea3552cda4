use std::{thread, time::Duration};

use log::LevelFilter;
use paxos_store::{
    events::Event,
    networking::messages::Message,
    transaction::messages::{Action, OpResult, Operation},
    types::data_types::NodeAddress,
};

mod common;

use crate::common::{cluster::Cluster, logging::setup_logger};

/// Count the read requests node `from` sent since the bus's sent log was last cleared.
fn read_requests(cluster: &Cluster, from: u32, filename: &str) -> usize {
    cluster
        .bus
        .sent()
        .iter()
        .filter(|datagram| datagram.from == NodeAddress::new(from))
        .filter(|datagram| match datagram.message() {
            Message::RpcRequest(request) => matches!(
                request.action,
                Action::Do { operation: Operation::Read { filename: ref f }, .. } if f == filename
            ),
            _ => false,
        })
        .count()
}

fn read(cluster: &mut Cluster, from: u32, command: &str) -> usize {
    cluster.bus.clear_sent();
    cluster.command(from, command);
    read_requests(cluster, from, "f")
}

#[test]
fn cached_read_is_served_locally_test() {
    setup_logger(LevelFilter::Trace);

    let mut cluster = Cluster::new(3);
    cluster.command(0, "0 put f v1");

    // 1. The first read goes to the serving node.
    assert_eq!(read(&mut cluster, 1, "0 read f"), 1);
    cluster.events(1);

    // 2. The second read is answered from the cache. The transaction around it still runs.
    assert_eq!(read(&mut cluster, 1, "0 read f"), 0);
    assert_eq!(
        cluster.node(1).command_outcome("0 read f"),
        Some(&Ok(OpResult::Content(Some(b"v1".to_vec()))))
    );
    assert!(cluster
        .events(1)
        .iter()
        .any(|event| matches!(event, Event::CacheHit(hit) if hit.filename == "f")));

    // 3. Other clients have their own caches.
    assert_eq!(read(&mut cluster, 2, "0 read f"), 1);
}

#[test]
fn expired_read_goes_to_server_once_test() {
    setup_logger(LevelFilter::Trace);

    let mut cluster = Cluster::with_cache_ttl(3, Duration::from_millis(200));
    cluster.command(0, "0 put f v1");

    assert_eq!(read(&mut cluster, 1, "0 read f"), 1);
    assert_eq!(read(&mut cluster, 1, "0 read f"), 0);

    // Cache hits do not extend the entry's lifetime.
    thread::sleep(Duration::from_millis(300));
    assert_eq!(read(&mut cluster, 1, "0 read f"), 1);
    assert_eq!(read(&mut cluster, 1, "0 read f"), 0);
}

#[test]
fn write_evicts_cached_file_test() {
    setup_logger(LevelFilter::Trace);

    let mut cluster = Cluster::new(3);
    cluster.command(0, "0 put f v1");
    assert_eq!(read(&mut cluster, 1, "0 read f"), 1);

    // 1. A write by this client evicts the file before the write request goes out.
    cluster.command(1, "0 overwrite f v2");
    assert_eq!(
        cluster.node(1).command_outcome("0 overwrite f v2"),
        Some(&Ok(OpResult::Bool(true)))
    );

    // 2. The next read misses the cache and sees the new content.
    assert_eq!(read(&mut cluster, 1, "0 read f"), 1);
    assert_eq!(
        cluster.node(1).command_outcome("0 read f"),
        Some(&Ok(OpResult::Content(Some(b"v2".to_vec()))))
    );

    // 3. Reads of other files never touch the entry for f.
    cluster.command(1, "0 read g");
    assert_eq!(read(&mut cluster, 1, "0 read f"), 0);
}
