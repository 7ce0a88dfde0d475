//! Test stores and common scenarios.

use crate::entities::{AllTypes, Author, Note, Student, Teacher};
use boxdb_core::{Id, Model, Store, StoreConfig};
use std::path::Path;
use std::sync::Once;
use tempfile::TempDir;
use tracing_subscriber::EnvFilter;

/// Returns the model with every fixture entity.
pub fn fixture_model() -> Model {
    Model::builder()
        .entity::<Author>()
        .entity::<Note>()
        .entity::<Teacher>()
        .entity::<Student>()
        .entity::<AllTypes>()
        .build()
        .expect("fixture model is valid")
}

/// Installs a test subscriber honouring `RUST_LOG`. Safe to call from every
/// test.
pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// A store over the fixture model, removed when dropped.
pub struct TestStore {
    store: Store,
    dir: Option<TempDir>,
}

impl TestStore {
    /// Opens an in-memory store.
    pub fn memory() -> Self {
        Self::memory_with(StoreConfig::memory())
    }

    /// Opens an in-memory store with `config`.
    pub fn memory_with(config: StoreConfig) -> Self {
        init_tracing();
        let store = Store::open(config.in_memory(true), fixture_model())
            .expect("Failed to open in-memory store");
        Self { store, dir: None }
    }

    /// Opens a store in a fresh temporary directory.
    pub fn file() -> Self {
        Self::file_with(|config| config)
    }

    /// Opens a store in a fresh temporary directory, adjusting the
    /// configuration with `configure`.
    pub fn file_with(configure: impl FnOnce(StoreConfig) -> StoreConfig) -> Self {
        init_tracing();
        let dir = TempDir::new().expect("Failed to create temp directory");
        let config = configure(StoreConfig::new(dir.path().join("store")));
        let store = Store::open(config, fixture_model()).expect("Failed to open file store");
        Self {
            store,
            dir: Some(dir),
        }
    }

    /// Closes the store and opens it again from the same directory.
    ///
    /// # Panics
    ///
    /// Panics for in-memory stores.
    pub fn reopen(self) -> Self {
        let Self { store, dir } = self;
        let config = store.config().clone();
        drop(store);
        assert!(dir.is_some(), "in-memory stores cannot be reopened");
        let store = Store::open(config, fixture_model()).expect("Failed to reopen store");
        Self { store, dir }
    }

    /// Returns the store directory, or `None` for in-memory stores.
    pub fn path(&self) -> Option<&Path> {
        self.store.directory()
    }

    /// Returns a clone of the store handle.
    pub fn handle(&self) -> Store {
        self.store.clone()
    }
}

impl std::ops::Deref for TestStore {
    type Target = Store;

    fn deref(&self) -> &Self::Target {
        &self.store
    }
}

/// Runs `f` with an in-memory fixture store.
pub fn with_memory_store<F, R>(f: F) -> R
where
    F: FnOnce(&Store) -> R,
{
    let store = TestStore::memory();
    f(&store)
}

/// The notes scenario: two authors and four notes, three of which contain
/// "writing" and two of those by Peter Brett.
#[derive(Debug, Clone, Copy)]
pub struct NotesScenario {
    /// The author of three notes.
    pub peter: Id<Author>,
    /// The author of one note.
    pub other: Id<Author>,
    /// Ids of all notes in insertion order.
    pub notes: [Id<Note>; 4],
}

impl NotesScenario {
    /// Texts of the notes, in insertion order.
    pub const TEXTS: [&'static str; 4] = [
        "Lorem writing ipsum",
        "Tips on writing",
        "More writing to do",
        "Shopping list",
    ];

    /// Puts the scenario into `store`.
    pub fn create(store: &Store) -> Self {
        let authors = store.box_for::<Author>().expect("Author is in the model");
        let notes = store.box_for::<Note>().expect("Note is in the model");

        let peter = authors
            .put(&mut Author::new("PeterBrett"))
            .expect("put author");
        let other = authors
            .put(&mut Author::new("Someone Else"))
            .expect("put author");

        let owners = [peter, peter, other, peter];
        let mut ids = [Id::NONE; 4];
        for (slot, (text, owner)) in ids.iter_mut().zip(Self::TEXTS.iter().zip(owners)) {
            *slot = notes.put(&mut Note::by(*text, owner)).expect("put note");
        }

        Self {
            peter,
            other,
            notes: ids,
        }
    }
}
