//! Observer delivery tests.
//!
//! Callbacks and channels receive per-view diffs, counts and states in
//! server order, session events carry the per-cycle summary, and an observer
//! can unregister itself from inside its own callback. A callback that blocks
//! never holds up the sync loop, whatever the runtime flavor.

use std::{
    sync::{
        Arc, OnceLock,
        atomic::{AtomicUsize, Ordering},
        mpsc as std_mpsc,
    },
    time::Duration,
};

use glide_client::{SessionEvent, SlidingSyncBuilder, TaskCanceller};
use glide_core::View;
use glide_harness::{ScriptedTransport, SimEnv};
use glide_proto::{
    ListUpdate, RoomId, RoomListDiff, RoomListEntry, RoomUpdate, SyncResponse, SyncState,
};
use parking_lot::Mutex;
use tokio::sync::mpsc;

const WAIT: Duration = Duration::from_secs(5);

fn room(n: u32) -> RoomId {
    RoomId::parse(format!("!r{n}:example.org")).unwrap()
}

fn response(pos: &str, update: ListUpdate) -> SyncResponse {
    let mut response = SyncResponse { pos: pos.into(), ..SyncResponse::default() };
    response.lists.insert("all".into(), update);
    response
}

fn script(transport: &ScriptedTransport) {
    let values = (1..=3).map(|n| RoomListEntry::Filled(room(n))).collect();
    let mut first = response(
        "1",
        ListUpdate {
            count: Some(3),
            state: Some(SyncState::Preload),
            diffs: vec![RoomListDiff::Replace { values }],
        },
    );
    for n in 1..=3 {
        first.rooms.insert(room(n), RoomUpdate { initial: true, ..RoomUpdate::default() });
    }
    transport.push_response(first);
    transport.push_response(response(
        "2",
        ListUpdate {
            count: None,
            state: Some(SyncState::Live),
            diffs: vec![RoomListDiff::Move { old_index: 2, new_index: 0 }],
        },
    ));
}

#[tokio::test]
async fn callbacks_see_every_cycle_in_order() {
    let transport = ScriptedTransport::new();
    script(&transport);
    let session = SlidingSyncBuilder::new("https://example.org")
        .add_view(View::builder("all").add_range(0, 9).build().unwrap())
        .build(transport.clone(), SimEnv::new())
        .unwrap();
    let view = session.view("all").unwrap();

    let (diff_tx, mut diffs) = mpsc::unbounded_channel();
    let _diff_feed = view.observe_room_list(move |d: Vec<RoomListDiff>| {
        let _ = diff_tx.send(d);
    });
    let (state_tx, mut states) = mpsc::unbounded_channel();
    let _state_feed = view.observe_state(move |s: SyncState| {
        let _ = state_tx.send(s);
    });
    let mut counts = view.subscribe_room_count();
    let mut events = session.subscribe_events();

    let _handle = session.sync().unwrap();

    let first = tokio::time::timeout(WAIT, diffs.recv()).await.unwrap().unwrap();
    assert!(matches!(first.as_slice(), [RoomListDiff::Replace { values }] if values.len() == 3));
    let second = tokio::time::timeout(WAIT, diffs.recv()).await.unwrap().unwrap();
    assert_eq!(second, vec![RoomListDiff::Move { old_index: 2, new_index: 0 }]);

    assert_eq!(states.recv().await, Some(SyncState::Preload));
    assert_eq!(states.recv().await, Some(SyncState::Live));
    assert_eq!(counts.recv().await, Some(3));
    assert_eq!(counts.try_recv(), None);

    match tokio::time::timeout(WAIT, events.recv()).await.unwrap() {
        Some(SessionEvent::Update(summary)) => {
            assert_eq!(summary.views, vec!["all".to_owned()]);
            assert_eq!(summary.rooms, vec![room(1), room(2), room(3)]);
        },
        other => panic!("expected update, got {other:?}"),
    }
    match tokio::time::timeout(WAIT, events.recv()).await.unwrap() {
        Some(SessionEvent::Update(summary)) => assert!(summary.rooms.is_empty()),
        other => panic!("expected update, got {other:?}"),
    }

    let list = view.current_rooms_list();
    assert_eq!(list[0], RoomListEntry::Filled(room(3)));
    assert_eq!(list[1], RoomListEntry::Filled(room(1)));
}

#[tokio::test]
async fn observer_can_unregister_itself_from_its_callback() {
    let transport = ScriptedTransport::new();
    script(&transport);
    let session = SlidingSyncBuilder::new("https://example.org")
        .add_view(View::builder("all").add_range(0, 9).build().unwrap())
        .build(transport.clone(), SimEnv::new())
        .unwrap();
    let view = session.view("all").unwrap();

    let seen = Arc::new(Mutex::new(Vec::new()));
    let canceller: Arc<OnceLock<TaskCanceller>> = Arc::new(OnceLock::new());
    let feed = view
        .observe_room_list({
            let seen = Arc::clone(&seen);
            let canceller = Arc::clone(&canceller);
            move |diffs: Vec<RoomListDiff>| {
                seen.lock().push(diffs.len());
                if let Some(canceller) = canceller.get() {
                    canceller.cancel();
                }
            }
        })
        .unwrap();
    assert!(canceller.set(feed.canceller()).is_ok());

    let mut witness = view.subscribe_room_list();
    let _handle = session.sync().unwrap();
    tokio::time::timeout(WAIT, witness.recv()).await.unwrap();
    tokio::time::timeout(WAIT, witness.recv()).await.unwrap();

    tokio::time::timeout(WAIT, feed.join()).await.unwrap().unwrap();
    assert_eq!(seen.lock().len(), 1);
}

#[tokio::test]
async fn removed_view_stops_delivering() {
    let transport = ScriptedTransport::new();
    let gate = transport.push_gated(response(
        "1",
        ListUpdate { count: Some(0), state: Some(SyncState::Preload), diffs: Vec::new() },
    ));
    let session = SlidingSyncBuilder::new("https://example.org")
        .add_view(View::builder("all").add_range(0, 9).build().unwrap())
        .build(transport.clone(), SimEnv::new())
        .unwrap();
    let view = session.view("all").unwrap();
    let mut counts = view.subscribe_room_count();

    let _handle = session.sync().unwrap();
    tokio::time::timeout(WAIT, transport.wait_for_requests(1)).await.unwrap();
    assert!(session.remove_view("all"));
    gate.open();

    // Channel closes with the view; nothing was delivered.
    assert_eq!(tokio::time::timeout(WAIT, counts.recv()).await.unwrap(), None);
    assert!(session.view("all").is_none());
    assert_eq!(view.current_room_count(), None);
    assert!(view.add_range(0, 1).is_err());
}

/// Registers `observers` callbacks that each block on every update until
/// released, then checks the loop kept cycling while they were stuck.
async fn blocked_callbacks_leave_the_loop_running(observers: usize) {
    const CYCLES: usize = 6;
    let transport = ScriptedTransport::new();
    script(&transport);
    for pos in 3..=CYCLES {
        transport.push_response(response(
            &pos.to_string(),
            ListUpdate {
                count: None,
                state: Some(SyncState::Live),
                diffs: vec![RoomListDiff::Move { old_index: 2, new_index: 0 }],
            },
        ));
    }
    let session = SlidingSyncBuilder::new("https://example.org")
        .add_view(View::builder("all").add_range(0, 9).build().unwrap())
        .build(transport.clone(), SimEnv::new())
        .unwrap();
    let view = session.view("all").unwrap();

    let delivered = Arc::new(AtomicUsize::new(0));
    let mut releases = Vec::new();
    let mut feeds = Vec::new();
    for _ in 0..observers {
        let (release_tx, release_rx) = std_mpsc::channel::<()>();
        let delivered = Arc::clone(&delivered);
        let feed = view
            .observe_room_list(move |_: Vec<RoomListDiff>| {
                let _ = release_rx.recv();
                delivered.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        releases.push(release_tx);
        feeds.push(feed);
    }

    let _handle = session.sync().unwrap();
    // Every scripted cycle applied, and the loop is waiting on the next one.
    tokio::time::timeout(WAIT, transport.wait_for_requests(CYCLES + 1)).await.unwrap();
    assert_eq!(delivered.load(Ordering::SeqCst), 0);

    drop(releases);
    tokio::time::timeout(WAIT, async {
        while delivered.load(Ordering::SeqCst) < observers * CYCLES {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();
    drop(feeds);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn blocked_callbacks_outnumbering_workers_do_not_stall_the_loop() {
    blocked_callbacks_leave_the_loop_running(4).await;
}

#[tokio::test]
async fn blocked_callback_does_not_stall_a_current_thread_runtime() {
    blocked_callbacks_leave_the_loop_running(1).await;
}
