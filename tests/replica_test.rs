use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    thread,
    time::{Duration, Instant},
};

use log::LevelFilter;
use paxos_store::{
    config::Configuration, journal::MemJournal, replica::ReplicaSpec, storage::MemStorage,
    types::data_types::NodeAddress,
};

mod common;

use crate::common::{logging::setup_logger, network::mock_network};

#[test]
fn threaded_replicas_converge_test() {
    setup_logger(LevelFilter::Debug);

    // 1. Initialize test components.

    // 1.1. Create a mock network connecting 3 replicas.
    let addresses: Vec<NodeAddress> = (0..3).map(NodeAddress::new).collect();
    let network_stubs = mock_network(addresses.iter().copied());

    // 1.2. Count the values applied across all replicas.
    let applied = Arc::new(AtomicUsize::new(0));

    // 1.3. Start every replica on its own thread.
    let storages: Vec<MemStorage> = addresses.iter().map(|_| MemStorage::new()).collect();
    let replicas: Vec<_> = addresses
        .iter()
        .zip(network_stubs)
        .zip(storages.iter())
        .map(|((address, network), storage)| {
            let applied = applied.clone();
            ReplicaSpec::builder()
                .network(network)
                .storage(storage.clone())
                .journal(MemJournal::new())
                .configuration(
                    Configuration::builder()
                        .me(*address)
                        .initial_peers(addresses.clone())
                        .log_events(true)
                        .build(),
                )
                .on_apply_value(move |_| {
                    applied.fetch_add(1, Ordering::SeqCst);
                })
                .build()
                .start()
                .unwrap()
        })
        .collect();

    // 2. Run a put from replica 0's client, served by replica 1.
    log::debug!("Submitting \"1 put f hello\" to replica 0.");
    replicas[0].submit_command("1 put f hello");

    // 3. Poll the storage of every replica until the file appears everywhere.
    let deadline = Instant::now() + Duration::from_secs(30);
    while storages
        .iter()
        .any(|storage| storage.content("f") != Some(b"hello".to_vec()))
    {
        assert!(Instant::now() < deadline, "replicas did not converge");
        thread::sleep(Duration::from_millis(50));
    }

    // 4. Every replica applied the value exactly once.
    while applied.load(Ordering::SeqCst) < 3 {
        assert!(Instant::now() < deadline, "apply events were not handled");
        thread::sleep(Duration::from_millis(50));
    }
    thread::sleep(Duration::from_millis(200));
    assert_eq!(applied.load(Ordering::SeqCst), 3);

    drop(replicas);
}
