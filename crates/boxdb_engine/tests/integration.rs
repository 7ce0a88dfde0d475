//! Integration tests for the engine over real store directories.

use boxdb_codec::{property_offset, PropertyFlags, PropertyType, RecordBuilder};
use boxdb_engine::{
    Engine, EngineError, EngineOptions, Model, ModelEntity, ModelProperty, ModelRelation,
    PlanCondition, TextOp, TxnState, MAX_READERS_MESSAGE,
};
use std::fs::OpenOptions;
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;
use tempfile::TempDir;

const ITEM: u32 = 1;
const TAG: u32 = 2;
const ITEM_TAGS: u32 = 1;

fn property(id: u16, name: &str, property_type: PropertyType, flags: PropertyFlags) -> ModelProperty {
    ModelProperty {
        id,
        name: name.into(),
        property_type,
        flags,
    }
}

fn model() -> Model {
    let id_flags = PropertyFlags::ID.with(PropertyFlags::UNSIGNED);
    Model {
        entities: vec![
            ModelEntity {
                id: ITEM,
                name: "Item".into(),
                properties: vec![
                    property(1, "id", PropertyType::Long, id_flags),
                    property(2, "name", PropertyType::String, PropertyFlags::NONE),
                    property(3, "code", PropertyType::String, PropertyFlags::UNIQUE),
                ],
            },
            ModelEntity {
                id: TAG,
                name: "Tag".into(),
                properties: vec![property(1, "id", PropertyType::Long, id_flags)],
            },
        ],
        relations: vec![ModelRelation {
            id: ITEM_TAGS,
            name: "tags".into(),
            source_entity: ITEM,
            target_entity: TAG,
        }],
    }
}

fn item(id: u64, name: &str, code: Option<&str>) -> Vec<u8> {
    let mut builder = RecordBuilder::new();
    builder.put_u64(property_offset(1), id).unwrap();
    builder.put_str(property_offset(2), name).unwrap();
    if let Some(code) = code {
        builder.put_str(property_offset(3), code).unwrap();
    }
    builder.finish().unwrap()
}

fn tag(id: u64) -> Vec<u8> {
    let mut builder = RecordBuilder::new();
    builder.put_u64(property_offset(1), id).unwrap();
    builder.finish().unwrap()
}

fn open(dir: &TempDir) -> Engine {
    Engine::open(&dir.path().join("store"), &EngineOptions::default(), model()).unwrap()
}

#[test]
fn data_survives_reopen() {
    let dir = TempDir::new().unwrap();
    {
        let engine = open(&dir);
        let mut txn = engine.begin_write().unwrap();
        for name in ["a", "b", "c"] {
            let id = txn.next_id(ITEM).unwrap();
            txn.put(ITEM, id, item(id, name, None)).unwrap();
        }
        txn.link(ITEM_TAGS, 1, 7).unwrap();
        txn.commit().unwrap();
    }

    let engine = open(&dir);
    let mut txn = engine.begin_write().unwrap();
    assert_eq!(txn.ids(ITEM).unwrap(), vec![1, 2, 3]);
    assert_eq!(txn.get(ITEM, 2).unwrap(), Some(item(2, "b", None)));
    assert_eq!(txn.targets(ITEM_TAGS, 1).unwrap(), vec![7]);

    // Ids keep counting from the stored sequence.
    assert_eq!(txn.next_id(ITEM).unwrap(), 4);
    txn.abort();
}

#[test]
fn removed_ids_are_not_reused() {
    let dir = TempDir::new().unwrap();
    {
        let engine = open(&dir);
        let mut txn = engine.begin_write().unwrap();
        let id = txn.next_id(ITEM).unwrap();
        txn.put(ITEM, id, item(id, "x", None)).unwrap();
        txn.commit().unwrap();

        let mut txn = engine.begin_write().unwrap();
        assert!(txn.remove(ITEM, id).unwrap());
        txn.commit().unwrap();
    }

    let engine = open(&dir);
    let mut txn = engine.begin_write().unwrap();
    assert_eq!(txn.count(ITEM, 0).unwrap(), 0);
    assert_eq!(txn.next_id(ITEM).unwrap(), 2);
}

#[test]
fn torn_tail_is_dropped_on_open() {
    let dir = TempDir::new().unwrap();
    let store = dir.path().join("store");
    {
        let engine = open(&dir);
        let mut txn = engine.begin_write().unwrap();
        txn.put(ITEM, 1, item(1, "kept", None)).unwrap();
        txn.commit().unwrap();
    }

    let data = store.join("data.bxdb");
    let committed_len = std::fs::metadata(&data).unwrap().len();
    {
        let mut file = OpenOptions::new().append(true).open(&data).unwrap();
        file.write_all(&[0x40, 0, 0, 0, 2, 9, 9]).unwrap();
    }

    let engine = open(&dir);
    assert_eq!(std::fs::metadata(&data).unwrap().len(), committed_len);
    let txn = engine.begin_read().unwrap();
    assert_eq!(txn.get(ITEM, 1).unwrap(), Some(item(1, "kept", None)));
}

#[test]
fn corrupt_header_is_reported() {
    let dir = TempDir::new().unwrap();
    let store = dir.path().join("store");
    std::fs::create_dir(&store).unwrap();
    std::fs::write(store.join("data.bxdb"), b"NOTABOXDBFILE").unwrap();

    let err = Engine::open(&store, &EngineOptions::default(), model()).unwrap_err();
    assert!(matches!(err, EngineError::FileCorrupt { .. }), "{err:?}");
}

#[test]
fn second_handle_on_same_directory_is_rejected() {
    let dir = TempDir::new().unwrap();
    let _first = open(&dir);
    let err = Engine::open(&dir.path().join("store"), &EngineOptions::default(), model())
        .unwrap_err();
    assert!(matches!(err, EngineError::IllegalState { .. }), "{err:?}");
}

#[test]
fn changing_a_property_type_is_a_schema_error() {
    let dir = TempDir::new().unwrap();
    drop(open(&dir));

    let mut changed = model();
    changed.entities[0].properties[1].property_type = PropertyType::Int;
    let err = Engine::open(&dir.path().join("store"), &EngineOptions::default(), changed)
        .unwrap_err();
    assert!(matches!(err, EngineError::Schema { .. }), "{err:?}");
}

#[test]
fn reader_bound_fails_fast_across_workers() {
    let options = EngineOptions {
        max_readers: 1,
        ..EngineOptions::default()
    };
    let engine = Engine::open_in_memory(&options, model()).unwrap();

    let workers = 8;
    let barrier = Arc::new(Barrier::new(workers));
    let failures = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..workers)
        .map(|_| {
            let engine = engine.clone();
            let barrier = Arc::clone(&barrier);
            let failures = Arc::clone(&failures);
            thread::spawn(move || {
                let txn = engine.begin_read();
                // Hold the slot until every worker has tried.
                barrier.wait();
                match txn {
                    Ok(txn) => txn.commit().unwrap(),
                    Err(err) => {
                        assert_eq!(err.to_string(), MAX_READERS_MESSAGE);
                        failures.fetch_add(1, Ordering::SeqCst);
                    }
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(failures.load(Ordering::SeqCst), workers - 1);
    assert_eq!(engine.active_readers(), 0);
}

#[test]
fn writers_are_serialized() {
    let engine = Engine::open_in_memory(&EngineOptions::default(), model()).unwrap();
    let first = engine.begin_write().unwrap();

    let contender = engine.clone();
    let waiter = thread::spawn(move || {
        let mut txn = contender.begin_write().unwrap();
        let id = txn.next_id(ITEM).unwrap();
        txn.put(ITEM, id, item(id, "second", None)).unwrap();
        txn.commit().unwrap();
        id
    });

    thread::sleep(Duration::from_millis(20));
    assert!(!waiter.is_finished());
    first.commit().unwrap();

    assert_eq!(waiter.join().unwrap(), 1);
}

#[test]
fn write_timeout_is_illegal_state() {
    let options = EngineOptions {
        write_timeout: Some(Duration::from_millis(10)),
        ..EngineOptions::default()
    };
    let engine = Engine::open_in_memory(&options, model()).unwrap();
    let _first = engine.begin_write().unwrap();

    let contender = engine.clone();
    let err = thread::spawn(move || contender.begin_write().map(|_| ()))
        .join()
        .unwrap()
        .unwrap_err();
    assert!(err.to_string().contains("timed out"), "{err}");
}

#[test]
fn overflowing_put_is_db_full_and_leaves_nothing_behind() {
    let dir = TempDir::new().unwrap();
    let options = EngineOptions {
        max_size_kb: 4,
        ..EngineOptions::default()
    };
    let engine = Engine::open(&dir.path().join("store"), &options, model()).unwrap();

    let mut txn = engine.begin_write().unwrap();
    txn.put(ITEM, 1, item(1, "small", None)).unwrap();
    txn.commit().unwrap();
    let size_before = engine.size().unwrap();

    let mut txn = engine.begin_write().unwrap();
    let big = "x".repeat(8 * 1024);
    let err = txn.put(ITEM, 2, item(2, &big, None)).unwrap_err();
    assert!(matches!(err, EngineError::DbFull { .. }));
    assert_eq!(err.to_string(), "Could not put");
    assert!(txn.commit().is_err());

    assert_eq!(engine.size().unwrap(), size_before);
    let txn = engine.begin_read().unwrap();
    assert_eq!(txn.ids(ITEM).unwrap(), vec![1]);
}

#[test]
fn unique_properties_reject_duplicates() {
    let engine = Engine::open_in_memory(&EngineOptions::default(), model()).unwrap();
    let mut txn = engine.begin_write().unwrap();
    txn.put(ITEM, 1, item(1, "a", Some("X-1"))).unwrap();
    // Overwriting the same record with its own value is fine.
    txn.put(ITEM, 1, item(1, "a2", Some("X-1"))).unwrap();
    txn.put(ITEM, 2, item(2, "b", None)).unwrap();
    txn.commit().unwrap();

    let mut txn = engine.begin_write().unwrap();
    let err = txn.put(ITEM, 3, item(3, "c", Some("X-1"))).unwrap_err();
    assert!(matches!(err, EngineError::UniqueViolation { .. }), "{err:?}");
    assert!(err.to_string().contains("Item.code"));
}

#[test]
fn transactions_start_active() {
    let engine = Engine::open_in_memory(&EngineOptions::default(), model()).unwrap();
    let txn = engine.begin_read().unwrap();
    assert_eq!(txn.state(), TxnState::Active);
    txn.abort();

    let mut txn = engine.begin_write().unwrap();
    assert_eq!(txn.state(), TxnState::Active);
    assert!(txn.put(ITEM, 0, item(0, "zero", None)).is_err());
    assert_eq!(txn.state(), TxnState::Failed);
    txn.abort();
}

#[test]
fn removing_records_removes_their_relation_rows() {
    let engine = Engine::open_in_memory(&EngineOptions::default(), model()).unwrap();
    let mut txn = engine.begin_write().unwrap();
    txn.put(ITEM, 1, item(1, "a", None)).unwrap();
    txn.put(ITEM, 2, item(2, "b", None)).unwrap();
    txn.put(TAG, 10, tag(10)).unwrap();
    txn.put(TAG, 11, tag(11)).unwrap();
    txn.link(ITEM_TAGS, 1, 10).unwrap();
    txn.link(ITEM_TAGS, 1, 11).unwrap();
    txn.link(ITEM_TAGS, 2, 11).unwrap();
    txn.commit().unwrap();

    let mut txn = engine.begin_write().unwrap();
    assert_eq!(txn.sources(ITEM_TAGS, 11).unwrap(), vec![1, 2]);
    txn.remove(ITEM, 1).unwrap();
    txn.remove(TAG, 11).unwrap();
    assert!(txn.targets(ITEM_TAGS, 1).unwrap().is_empty());
    txn.commit().unwrap();

    let txn = engine.begin_read().unwrap();
    assert!(txn.targets(ITEM_TAGS, 2).unwrap().is_empty());
    assert!(txn.sources(ITEM_TAGS, 10).unwrap().is_empty());
}

#[test]
fn queries_see_uncommitted_writes_of_their_transaction() {
    let engine = Engine::open_in_memory(&EngineOptions::default(), model()).unwrap();
    let plan = engine
        .compile(
            ITEM,
            &PlanCondition::Text {
                property: 2,
                op: TextOp::StartsWith,
                value: "ap".into(),
                case_sensitive: true,
            },
        )
        .unwrap();

    let mut txn = engine.begin_write().unwrap();
    txn.put(ITEM, 1, item(1, "apple", None)).unwrap();
    txn.put(ITEM, 2, item(2, "banana", None)).unwrap();
    txn.put(ITEM, 3, item(3, "apricot", None)).unwrap();
    assert_eq!(txn.query_ids(&plan).unwrap(), vec![1, 3]);

    txn.remove(ITEM, 1).unwrap();
    assert_eq!(txn.query_count(&plan).unwrap(), 1);
    txn.commit().unwrap();

    let txn = engine.begin_read().unwrap();
    let page = txn.query(&engine.compile(ITEM, &PlanCondition::All).unwrap(), 1, Some(1)).unwrap();
    assert_eq!(page.len(), 1);
    assert_eq!(page[0].0, 3);
}

#[cfg(unix)]
#[test]
fn missing_parent_directory_reports_path_and_os_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("missing").join("store");
    let err = Engine::open(&path, &EngineOptions::default(), model()).unwrap_err();

    let message = err.to_string();
    assert!(matches!(err, EngineError::StorageGeneral { .. }));
    assert!(message.starts_with("Could not prepare directory"), "{message}");
    assert!(message.contains(&path.display().to_string()), "{message}");
    assert!(message.contains("(2: No such file or directory)"), "{message}");
}
