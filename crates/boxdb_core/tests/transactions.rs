//! Transaction scoping, reader bounds, writer serialization and opening
//! failures.

use boxdb_core::{BoxError, BoxResult, Store, StoreConfig, Transaction, TxnMode, TxnState};
use boxdb_testkit::prelude::*;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;
use tempfile::TempDir;

const MAX_READERS_MESSAGE: &str =
    "Could not begin read transaction (maximum of read transactions reached)";

#[test]
fn reader_bound_fails_fast_across_workers() {
    let store = TestStore::memory_with(StoreConfig::memory().max_readers(1));
    assert_eq!(store.max_readers(), 1);

    let outcomes = run_workers(8, |_, barrier| {
        let txn = store.begin_read();
        // Hold the slot until every worker has tried.
        barrier.wait();
        txn.map(Transaction::abort)
    });

    let failures: Vec<&BoxError> = outcomes.iter().filter_map(|r| r.as_ref().err()).collect();
    assert_eq!(failures.len(), 7);
    for err in failures {
        assert_eq!(*err, BoxError::MaxReadersExceeded);
        assert_eq!(err.to_string(), MAX_READERS_MESSAGE);
    }
    assert_eq!(store.active_readers(), 0);
}

#[test]
fn readers_within_the_bound_run_together() {
    let store = TestStore::memory_with(StoreConfig::memory().max_readers(4));
    NotesScenario::create(&store);

    let counts = run_workers(4, |_, barrier| {
        let txn = store.begin_read().unwrap();
        barrier.wait();
        let count = store
            .box_for::<Note>()
            .unwrap()
            .query()
            .build()
            .unwrap()
            .count_in(&txn)
            .unwrap();
        txn.abort();
        count
    });
    assert_eq!(counts, vec![4; 4]);
}

#[test]
fn scoped_write_commits_on_success_and_aborts_on_error() {
    let store = TestStore::memory();
    let notes = store.box_for::<Note>().unwrap();

    let id = store
        .write(|txn| notes.put_in(txn, &mut Note::new("kept")))
        .unwrap();
    assert!(notes.contains(id).unwrap());

    let err = store
        .write(|txn| -> BoxResult<()> {
            notes.put_in(txn, &mut Note::new("dropped"))?;
            Err(BoxError::illegal_argument("changed my mind"))
        })
        .unwrap_err();
    assert_eq!(err.to_string(), "changed my mind");
    assert_eq!(notes.count().unwrap(), 1);
}

#[test]
fn uncommitted_writes_are_visible_only_inside() {
    let store = TestStore::memory();
    let notes = store.box_for::<Note>().unwrap();

    let mut txn = store.begin_write().unwrap();
    assert_eq!(txn.mode(), TxnMode::Write);
    let id = notes.put_in(&mut txn, &mut Note::new("pending")).unwrap();
    assert!(notes.get_in(&txn, id).unwrap().is_some());

    // A reader on the same thread sees committed data only.
    assert!(notes.get(id).unwrap().is_none());

    txn.abort();
    assert!(notes.get(id).unwrap().is_none());
    assert_eq!(notes.count().unwrap(), 0);
}

#[test]
fn failed_transaction_cannot_commit() {
    let store = TestStore::memory();
    let boxed = store.box_for::<AllTypes>().unwrap();
    let keyed = || AllTypes {
        key: Some("same".into()),
        ..AllTypes::default()
    };
    boxed.put(&mut keyed()).unwrap();

    let mut txn = store.begin_write().unwrap();
    boxed.put_in(&mut txn, &mut AllTypes::default()).unwrap();
    let err = boxed.put_in(&mut txn, &mut keyed()).unwrap_err();
    assert!(matches!(err, BoxError::UniqueViolation { .. }));
    assert_eq!(txn.state(), TxnState::Failed);
    assert!(!txn.is_active());

    let err = boxed.put_in(&mut txn, &mut AllTypes::default()).unwrap_err();
    assert!(matches!(err, BoxError::IllegalState { .. }), "{err:?}");

    let err = txn.commit().unwrap_err();
    assert!(matches!(err, BoxError::IllegalState { .. }), "{err:?}");
    assert_eq!(boxed.count().unwrap(), 1);

    // The writer slot was released.
    boxed.put(&mut AllTypes::default()).unwrap();
}

#[test]
fn read_transactions_reject_writes() {
    let store = TestStore::memory();
    let notes = store.box_for::<Note>().unwrap();

    let err = store
        .read(|_| notes.put(&mut Note::new("inside")).map(|_| ()))
        .unwrap_err();
    assert!(
        matches!(err, BoxError::CannotWriteWhileReading { .. }),
        "{err:?}"
    );
    assert_eq!(store.active_readers(), 0);
}

#[test]
fn writers_are_serialized() {
    let store = TestStore::memory();
    let first = store.begin_write().unwrap();
    let finished = AtomicBool::new(false);

    thread::scope(|scope| {
        let waiter = scope.spawn(|| {
            let notes = store.box_for::<Note>().unwrap();
            let id = notes.put(&mut Note::new("second")).unwrap();
            finished.store(true, Ordering::SeqCst);
            id
        });

        thread::sleep(Duration::from_millis(20));
        assert!(!finished.load(Ordering::SeqCst));
        first.commit().unwrap();

        assert!(waiter.join().unwrap().is_stored());
    });
    assert!(finished.load(Ordering::SeqCst));
}

#[test]
fn write_timeout_is_illegal_state() {
    let store = TestStore::memory_with(
        StoreConfig::memory().write_timeout(Duration::from_millis(10)),
    );
    let _first = store.begin_write().unwrap();

    let err = thread::scope(|scope| {
        scope
            .spawn(|| store.begin_write().map(|_| ()))
            .join()
            .unwrap()
            .unwrap_err()
    });
    assert!(matches!(err, BoxError::IllegalState { .. }), "{err:?}");
}

#[test]
fn transactions_from_other_threads_do_not_block_readers() {
    let store = TestStore::memory();
    NotesScenario::create(&store);
    let writer = store.begin_write().unwrap();

    let count = thread::scope(|scope| {
        scope
            .spawn(|| store.box_for::<Note>().unwrap().count().unwrap())
            .join()
            .unwrap()
    });
    assert_eq!(count, 4);
    writer.abort();
}

#[cfg(unix)]
#[test]
fn missing_parent_directory_reports_path_and_os_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("missing").join("store");
    let err = Store::open(StoreConfig::new(&path), fixture_model()).unwrap_err();

    let message = err.to_string();
    assert!(matches!(err, BoxError::StorageGeneral { .. }), "{err:?}");
    assert!(message.starts_with("Could not prepare directory"), "{message}");
    assert!(message.contains(&path.display().to_string()), "{message}");
    assert!(message.contains("(2: No such file or directory)"), "{message}");
}

#[test]
fn second_handle_on_same_directory_is_rejected() {
    let store = TestStore::file();
    let config = store.config().clone();
    let err = Store::open(config, fixture_model()).unwrap_err();
    assert!(matches!(err, BoxError::IllegalState { .. }), "{err:?}");
}
