//! Disposal tests.
//!
//! Verifies:
//! 1. Explicit disposal and the finalizer may fire in either order, any
//!    number of times, and the native teardown still runs exactly once.
//! 2. Disposing a root unlinks every dependent; roots are torn down last.
//! 3. Transient results hand their result set back to the parent.
//! 4. Explicit disposal waits for in-flight lock holders, except on the
//!    holder's own thread. Finalizers never wait: a busy family tears the
//!    resource down when its holder releases.

mod common;

use std::sync::{Arc, Barrier};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use common::{Journal, dependent, ptr, root, within};
use handle_store::{Handle, KindFlags, ResourceId, Store, StoreEvent, Trigger};

// ---------------------------------------------------------------------------
// Exactly-once teardown
// ---------------------------------------------------------------------------

#[test]
fn explicit_dispose_twice_then_finalizer() {
    let store = Store::new();
    let journal = Journal::default();
    let ds = root(&store, &journal, 0x100, "ds");
    let id = ds.id();

    store.dispose(id);
    store.dispose(id);
    assert!(!store.is_alive(id));
    assert!(!ds.is_alive());
    assert_eq!(journal.count("release ds"), 0, "wrapper still reachable");

    drop(ds);
    assert_eq!(journal.count("release ds"), 1);
}

#[test]
fn finalizer_then_explicit_dispose() {
    let store = Store::new();
    let journal = Journal::default();
    let ds = root(&store, &journal, 0x100, "ds");
    let id = ds.id();

    drop(ds);
    assert!(!store.is_alive(id));
    assert_eq!(journal.count("release ds"), 1);

    store.dispose(id);
    assert_eq!(journal.count("release ds"), 1);
}

#[test]
fn clones_keep_the_resource_until_the_last_drop() {
    let store = Store::new();
    let journal = Journal::default();
    let ds = root(&store, &journal, 0x100, "ds");
    let clone = ds.clone();

    drop(ds);
    assert!(clone.is_alive());
    assert_eq!(journal.count("release ds"), 0);

    drop(clone);
    assert_eq!(journal.count("release ds"), 1);
    assert!(store.is_empty());
}

#[test]
fn sentinel_and_unknown_ids_are_ignored() {
    let store = Store::new();
    let journal = Journal::default();
    let ds = root(&store, &journal, 0x100, "ds");

    store.dispose(ResourceId::NONE);
    store.dispose(ResourceId::from(999));
    assert!(ds.is_alive());
    assert!(journal.entries().is_empty());
}

#[test]
fn racing_disposal_paths_tear_down_once() {
    for round in 0..50 {
        let store = Store::new();
        let journal = Journal::default();
        let ds = root(&store, &journal, 0x100 + round, "ds");
        let id = ds.id();

        let droppers: Vec<_> = (0..4)
            .map(|_| {
                let clone = ds.clone();
                thread::spawn(move || drop(clone))
            })
            .collect();
        let disposer = {
            let store = store.clone();
            thread::spawn(move || store.dispose(id))
        };
        drop(ds);

        for dropper in droppers {
            dropper.join().unwrap();
        }
        disposer.join().unwrap();

        assert!(!store.is_alive(id));
        assert_eq!(journal.count("release ds"), 1, "round {round}");
    }
}

// ---------------------------------------------------------------------------
// Cascade
// ---------------------------------------------------------------------------

#[test]
fn root_disposal_unlinks_all_dependents() {
    let store = Store::new();
    let journal = Journal::default();
    let ds = root(&store, &journal, 0x100, "ds");
    let band = dependent(&store, &journal, &ds, 0x200, "band", KindFlags::NONE);
    let mask = dependent(&store, &journal, &band, 0x300, "mask", KindFlags::NONE);

    assert_eq!(store.children(ds.id()), vec![band.id()]);
    assert_eq!(mask.root_id(), ds.id());

    ds.dispose();
    assert!(!ds.is_alive());
    assert!(!band.is_alive());
    assert!(!mask.is_alive());
    assert!(store.is_empty());
    assert_eq!(store.lookup_by_pointer(ptr(0x300)), None);
    assert!(journal.entries().is_empty(), "wrappers still reachable");
}

#[test]
fn root_is_torn_down_after_its_dependents() {
    let store = Store::new();
    let journal = Journal::default();
    let ds = root(&store, &journal, 0x100, "ds");
    let first = dependent(&store, &journal, &ds, 0x200, "first", KindFlags::NONE);
    let second = dependent(&store, &journal, &ds, 0x300, "second", KindFlags::NONE);

    ds.dispose();
    // dropping the root wrapper first must not release it under live dependents
    drop(ds);
    assert_eq!(journal.count("release ds"), 0);

    drop(second);
    drop(first);
    assert_eq!(
        journal.entries(),
        vec!["release second", "release first", "release ds"]
    );
}

#[test]
fn dependent_disposal_leaves_root_alive() {
    let store = Store::new();
    let journal = Journal::default();
    let ds = root(&store, &journal, 0x100, "ds");
    let band = dependent(&store, &journal, &ds, 0x200, "band", KindFlags::NONE);
    let mask = dependent(&store, &journal, &band, 0x300, "mask", KindFlags::NONE);

    band.dispose();
    assert!(ds.is_alive());
    assert!(!band.is_alive());
    assert!(!mask.is_alive());
    assert!(store.children(ds.id()).is_empty());

    drop(band);
    drop(mask);
    assert_eq!(journal.entries(), vec!["release mask", "release band"]);
}

#[test]
fn transient_result_returns_its_result_set() {
    let store = Store::new();
    let journal = Journal::default();
    let ds = root(&store, &journal, 0x100, "ds");
    let layer = dependent(
        &store,
        &journal,
        &ds,
        0x200,
        "layer",
        KindFlags::TRANSIENT_RESULT,
    );
    assert!(layer.flags().is_transient_result());

    drop(layer);
    assert_eq!(
        journal.entries(),
        vec!["release_result_set ds 0x200", "release layer"]
    );
    assert!(ds.is_alive());
}

// ---------------------------------------------------------------------------
// Interaction with locks
// ---------------------------------------------------------------------------

#[test]
fn dispose_waits_for_lock_holder() {
    let store = Store::new();
    let journal = Journal::default();
    let ds = root(&store, &journal, 0x100, "ds");
    let id = ds.id();

    let token = store.acquire_single(id).unwrap();
    let done = Arc::new(AtomicBool::new(false));
    let disposer = {
        let store = store.clone();
        let done = Arc::clone(&done);
        thread::spawn(move || {
            store.dispose(id);
            done.store(true, Ordering::SeqCst);
        })
    };

    thread::sleep(Duration::from_millis(100));
    assert!(!done.load(Ordering::SeqCst), "dispose must wait for the lock");
    assert!(store.is_alive(id));

    drop(token);
    disposer.join().unwrap();
    assert!(!store.is_alive(id));
}

#[test]
fn finalizer_on_lock_holding_thread_does_not_deadlock() {
    let store = Store::new();
    let journal = Journal::default();
    let ds = root(&store, &journal, 0x100, "ds");

    let finished = within(Duration::from_secs(10), {
        let store = store.clone();
        let journal = journal.clone();
        move || {
            let token = store.acquire_single(ds.id()).unwrap();
            let band = dependent(&store, &journal, &ds, 0x200, "band", KindFlags::NONE);
            drop(band);
            store.dispose(ds.id());
            drop(ds);
            drop(token);
        }
    });

    assert!(finished.is_some(), "disposal deadlocked on its own lock");
    assert_eq!(journal.entries(), vec!["release band", "release ds"]);
    assert!(store.is_empty());
}

#[test]
fn cross_family_drops_inside_locked_regions() {
    let store = Store::new();
    let journal = Journal::default();
    let first = root(&store, &journal, 0x100, "first");
    let second = root(&store, &journal, 0x200, "second");
    let (first_id, second_id) = (first.id(), second.id());
    let barrier = Arc::new(Barrier::new(2));

    // each worker holds its own family and drops the last handle of the other
    let worker = |own: ResourceId, foreign: Handle| {
        let store = store.clone();
        let journal = journal.clone();
        let barrier = Arc::clone(&barrier);
        move || {
            let token = store.acquire_single(own).unwrap();
            barrier.wait();
            drop(foreign);
            assert!(journal.entries().is_empty(), "teardown must wait for the holder");
            barrier.wait();
            drop(token);
        }
    };
    let on_first = worker(first_id, second);
    let on_second = worker(second_id, first);

    let finished = within(Duration::from_secs(10), move || {
        let on_first = thread::spawn(on_first);
        let on_second = thread::spawn(on_second);
        on_first.join().is_ok() && on_second.join().is_ok()
    });

    assert_eq!(finished, Some(true), "dropping handles inside locked regions deadlocked");
    let mut entries = journal.entries();
    entries.sort();
    assert_eq!(entries, vec!["release first", "release second"]);
    assert!(store.is_empty());
}

#[test]
fn deferred_teardown_runs_when_holder_releases() {
    let store = Store::new();
    let journal = Journal::default();
    let ds = root(&store, &journal, 0x100, "ds");
    let band = dependent(&store, &journal, &ds, 0x200, "band", KindFlags::NONE);
    let band_id = band.id();
    let mut events = store.subscribe();

    let token = store.acquire_single(ds.id()).unwrap();
    thread::spawn(move || drop(band)).join().unwrap();

    assert!(!store.is_alive(band_id));
    assert!(journal.entries().is_empty());
    assert_eq!(
        events.try_recv().ok(),
        Some(StoreEvent::Disposed {
            id: band_id,
            trigger: Trigger::Finalizer,
            cascaded: 0,
        })
    );

    drop(token);
    assert_eq!(journal.entries(), vec!["release band"]);
    assert_eq!(
        events.try_recv().ok(),
        Some(StoreEvent::TornDown {
            id: band_id,
            kind: "layer",
        })
    );
    assert!(store.try_acquire_single(ds.id()).unwrap().is_some());
}

#[test]
fn waiting_acquire_fails_after_disposal() {
    let store = Store::new();
    let journal = Journal::default();
    let ds = root(&store, &journal, 0x100, "ds");
    let id = ds.id();

    let token = store.acquire_single(id).unwrap();
    let disposer = {
        let store = store.clone();
        thread::spawn(move || store.dispose(id))
    };
    thread::sleep(Duration::from_millis(50));
    drop(token);
    disposer.join().unwrap();

    assert!(store.acquire_single(id).is_err());
    drop(ds);
    assert_eq!(journal.count("release ds"), 1);
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

#[test]
fn disposal_events_report_cascade_and_teardown() {
    let store = Store::new();
    let journal = Journal::default();
    let mut events = store.subscribe();
    let ds = root(&store, &journal, 0x100, "ds");
    let band = dependent(&store, &journal, &ds, 0x200, "band", KindFlags::NONE);
    let (ds_id, band_id) = (ds.id(), band.id());

    ds.dispose();
    drop(band);
    drop(ds);

    let received: Vec<_> = std::iter::from_fn(|| events.try_recv().ok()).collect();
    assert_eq!(
        received,
        vec![
            StoreEvent::Registered {
                id: ds_id,
                parent: ResourceId::NONE,
                kind: "dataset",
            },
            StoreEvent::Registered {
                id: band_id,
                parent: ds_id,
                kind: "layer",
            },
            StoreEvent::Disposed {
                id: ds_id,
                trigger: Trigger::Explicit,
                cascaded: 1,
            },
            StoreEvent::TornDown {
                id: band_id,
                kind: "layer",
            },
            StoreEvent::TornDown {
                id: ds_id,
                kind: "dataset",
            },
        ]
    );
}
