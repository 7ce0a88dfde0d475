//! The store handle.

use crate::config::StoreConfig;
use crate::entity::Entity;
use crate::entity_box::EntityBox;
use crate::error::BoxResult;
use crate::schema::Model;
use crate::transaction::Transaction;
use boxdb_engine::Engine;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

struct StoreInner {
    engine: Engine,
    model: Model,
    config: StoreConfig,
}

impl Drop for StoreInner {
    fn drop(&mut self) {
        debug!(directory = ?self.engine.directory(), "store closed");
    }
}

/// An open store.
///
/// `Store` is a cheap handle that can be cloned and shared between threads;
/// the underlying files are closed and unlocked when the last clone is
/// dropped.
///
/// ```rust,ignore
/// let model = Model::builder().entity::<Note>().entity::<Author>().build()?;
/// let store = Store::open(StoreConfig::new("notes-db"), model)?;
///
/// let notes = store.box_for::<Note>()?;
/// let mut note = Note::new("Lorem ipsum");
/// notes.put(&mut note)?;
/// assert!(note.id.is_stored());
/// ```
#[derive(Clone)]
pub struct Store {
    inner: Arc<StoreInner>,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("directory", &self.inner.engine.directory())
            .field("entities", &self.inner.model.len())
            .finish_non_exhaustive()
    }
}

impl Store {
    /// Opens or creates the store described by `config`.
    ///
    /// # Errors
    ///
    /// - `StorageGeneral` if the directory cannot be prepared, for example
    ///   because its parent does not exist; the message names the path and
    ///   the OS error
    /// - `IllegalState` if the store is already open elsewhere
    /// - `Schema` if `model` conflicts with the stored model
    /// - `FileCorrupt` if the data file header is invalid
    pub fn open(config: StoreConfig, model: Model) -> BoxResult<Self> {
        let options = config.engine_options();
        let engine_model = model.engine_model().clone();
        let engine = if config.in_memory {
            Engine::open_in_memory(&options, engine_model)?
        } else {
            Engine::open(&config.directory, &options, engine_model)?
        };
        Ok(Self {
            inner: Arc::new(StoreInner {
                engine,
                model,
                config,
            }),
        })
    }

    /// Returns the box for entity type `E`.
    ///
    /// # Errors
    ///
    /// Returns illegal-argument if `E` is not part of the store's model.
    pub fn box_for<E: Entity>(&self) -> BoxResult<EntityBox<E>> {
        self.inner.model.ensure::<E>()?;
        Ok(EntityBox::new(self.clone()))
    }

    /// Returns the model the store was opened with.
    #[must_use]
    pub fn model(&self) -> &Model {
        &self.inner.model
    }

    /// Returns the configuration the store was opened with.
    #[must_use]
    pub fn config(&self) -> &StoreConfig {
        &self.inner.config
    }

    /// Returns the store directory, or `None` for in-memory stores.
    #[must_use]
    pub fn directory(&self) -> Option<&Path> {
        self.inner.engine.directory()
    }

    /// Returns the effective reader bound.
    #[must_use]
    pub fn max_readers(&self) -> u32 {
        self.inner.engine.max_readers()
    }

    /// Returns the number of open read transactions.
    #[must_use]
    pub fn active_readers(&self) -> u32 {
        self.inner.engine.active_readers()
    }

    /// Returns the size of the data file in bytes.
    ///
    /// # Errors
    ///
    /// Fails if the size cannot be determined.
    pub fn size(&self) -> BoxResult<u64> {
        Ok(self.inner.engine.size()?)
    }

    /// Begins a read transaction.
    ///
    /// # Errors
    ///
    /// Returns [`BoxError::MaxReadersExceeded`] immediately when every
    /// reader slot is taken.
    ///
    /// [`BoxError::MaxReadersExceeded`]: crate::BoxError::MaxReadersExceeded
    pub fn begin_read(&self) -> BoxResult<Transaction> {
        let txn = self.inner.engine.begin_read()?;
        Ok(Transaction::new(txn, self.clone()))
    }

    /// Begins a write transaction, waiting while another one is open.
    ///
    /// # Errors
    ///
    /// Fails if this thread holds a read or write transaction, or when the
    /// configured write timeout elapses.
    pub fn begin_write(&self) -> BoxResult<Transaction> {
        let txn = self.inner.engine.begin_write()?;
        Ok(Transaction::new(txn, self.clone()))
    }

    /// Runs `f` in a read transaction, which is released before returning.
    ///
    /// # Errors
    ///
    /// Returns the error of `f`, or of beginning the transaction.
    pub fn read<R, F>(&self, f: F) -> BoxResult<R>
    where
        F: FnOnce(&Transaction) -> BoxResult<R>,
    {
        let txn = self.begin_read()?;
        let result = f(&txn);
        txn.abort();
        result
    }

    /// Runs `f` in a write transaction.
    ///
    /// The transaction is committed if `f` returns `Ok` and aborted if it
    /// returns `Err` or panics.
    ///
    /// # Errors
    ///
    /// Returns the error of `f`, or of beginning or committing the
    /// transaction.
    pub fn write<R, F>(&self, f: F) -> BoxResult<R>
    where
        F: FnOnce(&mut Transaction) -> BoxResult<R>,
    {
        let mut txn = self.begin_write()?;
        match f(&mut txn) {
            Ok(value) => {
                txn.commit()?;
                Ok(value)
            }
            Err(err) => {
                txn.abort();
                Err(err)
            }
        }
    }

    pub(crate) fn engine(&self) -> &Engine {
        &self.inner.engine
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BoxError;
    use boxdb_engine::{TxnMode, TxnState};

    fn memory_store() -> Store {
        let model = Model::builder().build().unwrap();
        Store::open(StoreConfig::memory().max_readers(2), model).unwrap()
    }

    #[test]
    fn scoped_read_releases_its_slot() {
        let store = memory_store();
        let seen = store.read(|txn| Ok(txn.mode())).unwrap();
        assert_eq!(seen, TxnMode::Read);
        assert_eq!(store.active_readers(), 0);

        let err = store
            .read(|_| -> BoxResult<()> { Err(BoxError::illegal_state("boom")) })
            .unwrap_err();
        assert_eq!(err.to_string(), "boom");
        assert_eq!(store.active_readers(), 0);
    }

    #[test]
    fn scoped_write_releases_the_writer_on_error() {
        let store = memory_store();
        let err = store
            .write(|txn| -> BoxResult<()> {
                assert_eq!(txn.state(), TxnState::Active);
                Err(BoxError::illegal_argument("nope"))
            })
            .unwrap_err();
        assert!(matches!(err, BoxError::IllegalArgument { .. }));

        // The writer slot is free again.
        store.write(|_| Ok(())).unwrap();
    }

    #[test]
    fn reader_bound_fails_fast() {
        let store = memory_store();
        let first = store.begin_read().unwrap();
        let second = store.begin_read().unwrap();
        let err = store.begin_read().unwrap_err();
        assert_eq!(err, BoxError::MaxReadersExceeded);
        assert_eq!(
            err.to_string(),
            "Could not begin read transaction (maximum of read transactions reached)"
        );
        first.abort();
        second.commit().unwrap();
        assert_eq!(store.active_readers(), 0);
    }

    #[test]
    fn write_inside_read_is_rejected() {
        let store = memory_store();
        let err = store
            .read(|_| store.begin_write().map(|_| ()))
            .unwrap_err();
        assert!(matches!(err, BoxError::CannotWriteWhileReading { .. }), "{err:?}");
    }

    #[test]
    fn clones_share_one_engine() {
        let store = memory_store();
        let other = store.clone();
        let txn = store.begin_read().unwrap();
        assert_eq!(other.active_readers(), 1);
        drop(txn);
        assert!(other.directory().is_none());
        assert!(format!("{other:?}").starts_with("Store"));
    }
}
