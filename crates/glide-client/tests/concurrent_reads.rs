//! Concurrent reads never observe a half-applied response.
//!
//! A sync loop runs against the simulated homeserver on a multi-threaded
//! runtime while reader tasks hammer the accessors. Every snapshot a reader
//! takes must satisfy the structural invariants: the list length matches the
//! count it was delivered with, no room fills two slots, and every filled
//! room has a summary.

use std::{
    collections::BTreeSet,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

use glide_client::SlidingSyncBuilder;
use glide_core::View;
use glide_harness::{
    CountMatchesList, FilledRoomsCached, InvariantRegistry, NoDuplicateFilled, SimEnv,
    SimHomeserver, SystemSnapshot,
};
use glide_proto::ListFilters;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn readers_never_see_torn_lists() {
    let server = SimHomeserver::with_rooms(11, 60).unwrap();
    server.set_activity_per_request(3);

    let session = Arc::new(
        SlidingSyncBuilder::new("https://example.org")
            .poll_timeout(Duration::from_millis(20))
            .add_view(View::builder("all").growing(7, None).build().unwrap())
            .add_view(
                View::builder("dms")
                    .filters(ListFilters { is_dm: Some(true), ..ListFilters::default() })
                    .add_range(0, 9)
                    .build()
                    .unwrap(),
            )
            .build(server.clone(), SimEnv::with_seed(11))
            .unwrap(),
    );

    let mut registry = InvariantRegistry::empty();
    registry.add(CountMatchesList);
    registry.add(NoDuplicateFilled);
    registry.add(FilledRoomsCached);
    let registry = Arc::new(registry);

    let done = Arc::new(AtomicBool::new(false));
    let reads = Arc::new(AtomicUsize::new(0));
    let mut readers = Vec::new();
    for reader in 0..4 {
        let session = Arc::clone(&session);
        let registry = Arc::clone(&registry);
        let done = Arc::clone(&done);
        let reads = Arc::clone(&reads);
        readers.push(tokio::spawn(async move {
            let view = session.view("all").unwrap();
            while !done.load(Ordering::SeqCst) {
                let snapshot = SystemSnapshot::from_session(session.as_ref());
                registry.assert_all(&snapshot, &format!("reader {reader}"));

                let list = view.current_rooms_list();
                let filled: Vec<_> = list.filled_room_ids().collect();
                let unique: BTreeSet<_> = filled.iter().collect();
                assert_eq!(filled.len(), unique.len(), "reader {reader}: duplicate room in list");

                reads.fetch_add(1, Ordering::SeqCst);
                tokio::task::yield_now().await;
            }
        }));
    }

    let handle = session.sync().unwrap();
    tokio::time::timeout(Duration::from_secs(30), async {
        while server.request_count() < 40 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();

    done.store(true, Ordering::SeqCst);
    for reader in readers {
        reader.await.unwrap();
    }
    handle.cancel();

    assert!(reads.load(Ordering::SeqCst) > 0);
    assert!(!session.is_stopped());
    let all = session.view("all").unwrap();
    assert_eq!(all.current_room_count(), Some(60));
    assert_eq!(all.current_rooms_list().len(), 60);
}
