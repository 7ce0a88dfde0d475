//! Typed access to the objects of one entity type.

use crate::codec::{EntityReader, EntityWriter};
use crate::entity::Entity;
use crate::error::BoxResult;
use crate::id::Id;
use crate::query::QueryBuilder;
use crate::store::Store;
use crate::transaction::{Transaction, TxnTag};
use std::fmt;
use std::marker::PhantomData;
use tracing::debug;

/// The box of entity type `E`: put, get, remove, count and query objects.
///
/// Every operation without the `_in` suffix runs in its own transaction.
/// The `_in` variants take part in a caller-owned one:
///
/// ```rust,ignore
/// let notes = store.box_for::<Note>()?;
///
/// let mut note = Note::new("Lorem ipsum");
/// let id = notes.put(&mut note)?;
/// assert_eq!(note.id, id);
///
/// store.write(|txn| {
///     notes.remove_in(txn, id)?;
///     notes.put_in(txn, &mut Note::new("dolor sit amet"))?;
///     Ok(())
/// })?;
/// ```
pub struct EntityBox<E> {
    store: Store,
    _marker: PhantomData<fn() -> E>,
}

impl<E: Entity> EntityBox<E> {
    pub(crate) fn new(store: Store) -> Self {
        Self {
            store,
            _marker: PhantomData,
        }
    }

    /// Returns the store.
    #[must_use]
    pub fn store(&self) -> &Store {
        &self.store
    }

    // ---- writes ------------------------------------------------------------

    /// Inserts or updates `entity`.
    ///
    /// An object with id 0 gets a new id, which is written back into it. An
    /// object with an id overwrites the stored object with that id. On
    /// failure nothing is stored, a newly assigned id is reset to 0, and
    /// relation targets put along with the object are reset the same way.
    ///
    /// # Errors
    ///
    /// `DbFull` when the store reached its size limit, `UniqueViolation` for
    /// duplicate unique values, and any error of the relation hooks.
    pub fn put(&self, entity: &mut E) -> BoxResult<Id<E>> {
        let was_new = !entity.id().is_stored();
        let mut tag = None;
        let result = self.store.write(|txn| {
            tag = Some(txn.tag());
            self.put_in(txn, entity)
        });
        if result.is_err() {
            abandon(entity, was_new, tag);
        }
        result
    }

    /// Puts `entity` inside `txn`. See [`put`](Self::put).
    ///
    /// Ids assigned here stay in the objects until the caller's transaction
    /// ends; if it aborts, [`Entity::put_aborted`] with `txn`'s tag undoes
    /// them.
    ///
    /// # Errors
    ///
    /// See [`put`](Self::put). Any error leaves `txn` failed.
    pub fn put_in(&self, txn: &mut Transaction, entity: &mut E) -> BoxResult<Id<E>> {
        let was_new = !entity.id().is_stored();
        let result = self.put_inner(txn, entity);
        if result.is_err() {
            abandon(entity, was_new, Some(txn.tag()));
        }
        result
    }

    fn put_inner(&self, txn: &mut Transaction, entity: &mut E) -> BoxResult<Id<E>> {
        entity.attach(&self.store);
        entity.before_put(txn)?;

        if !entity.id().is_stored() {
            let id = txn.raw_mut().next_id(E::DESCRIPTOR.id)?;
            entity.set_id(Id::new(id));
            entity.attach(&self.store);
        }
        let id = entity.id();

        let mut writer = EntityWriter::new();
        entity.write(&mut writer)?;
        txn.raw_mut()
            .put(E::DESCRIPTOR.id, id.get(), writer.finish()?)?;

        entity.after_put(txn)?;
        Ok(id)
    }

    /// Puts all `entities` in one transaction.
    ///
    /// # Errors
    ///
    /// See [`put`](Self::put). On failure nothing is stored and every newly
    /// assigned id is reset to 0.
    pub fn put_many(&self, entities: &mut [E]) -> BoxResult<Vec<Id<E>>> {
        let new: Vec<bool> = entities.iter().map(|e| !e.id().is_stored()).collect();
        let mut tag = None;
        let result = self.store.write(|txn| {
            tag = Some(txn.tag());
            entities
                .iter_mut()
                .map(|entity| self.put_inner(txn, entity))
                .collect::<BoxResult<Vec<_>>>()
        });
        if result.is_err() {
            for (entity, was_new) in entities.iter_mut().zip(new) {
                abandon(entity, was_new, tag);
            }
        }
        result
    }

    /// Removes the object `id`. Returns false if it did not exist.
    ///
    /// # Errors
    ///
    /// Returns the error of the write transaction.
    pub fn remove(&self, id: Id<E>) -> BoxResult<bool> {
        self.store.write(|txn| self.remove_in(txn, id))
    }

    /// Removes the object `id` inside `txn`.
    ///
    /// # Errors
    ///
    /// Fails if `txn` is not an active write transaction.
    pub fn remove_in(&self, txn: &mut Transaction, id: Id<E>) -> BoxResult<bool> {
        if !id.is_stored() {
            return Ok(false);
        }
        Ok(txn.raw_mut().remove(E::DESCRIPTOR.id, id.get())?)
    }

    /// Removes the objects `ids` and returns how many existed.
    ///
    /// # Errors
    ///
    /// Returns the error of the write transaction.
    pub fn remove_many(&self, ids: &[Id<E>]) -> BoxResult<u64> {
        self.store.write(|txn| {
            let mut removed = 0;
            for id in ids {
                if self.remove_in(txn, *id)? {
                    removed += 1;
                }
            }
            Ok(removed)
        })
    }

    /// Removes every object and returns how many there were.
    ///
    /// # Errors
    ///
    /// Returns the error of the write transaction.
    pub fn remove_all(&self) -> BoxResult<u64> {
        let removed = self
            .store
            .write(|txn| Ok(txn.raw_mut().remove_all(E::DESCRIPTOR.id)?))?;
        debug!(entity = E::DESCRIPTOR.name, removed, "removed all objects");
        Ok(removed)
    }

    // ---- reads -------------------------------------------------------------

    /// Returns the object `id`, or `None` if there is none.
    ///
    /// # Errors
    ///
    /// Fails if no read transaction can be started or the record cannot be
    /// decoded.
    pub fn get(&self, id: Id<E>) -> BoxResult<Option<E>> {
        if !id.is_stored() {
            return Ok(None);
        }
        self.store.read(|txn| self.get_in(txn, id))
    }

    /// Returns the object `id` as seen by `txn`, including its own writes.
    ///
    /// # Errors
    ///
    /// Fails if the record cannot be decoded.
    pub fn get_in(&self, txn: &Transaction, id: Id<E>) -> BoxResult<Option<E>> {
        if !id.is_stored() {
            return Ok(None);
        }
        txn.raw()
            .get(E::DESCRIPTOR.id, id.get())?
            .map(|bytes| self.decode(&bytes))
            .transpose()
    }

    /// Returns the objects `ids` in order; missing ones are `None`.
    ///
    /// # Errors
    ///
    /// Fails if no read transaction can be started or a record cannot be
    /// decoded.
    pub fn get_many(&self, ids: &[Id<E>]) -> BoxResult<Vec<Option<E>>> {
        self.store.read(|txn| self.get_many_in(txn, ids))
    }

    /// Returns the objects `ids` as seen by `txn`.
    ///
    /// # Errors
    ///
    /// Fails if a record cannot be decoded.
    pub fn get_many_in(&self, txn: &Transaction, ids: &[Id<E>]) -> BoxResult<Vec<Option<E>>> {
        ids.iter().map(|id| self.get_in(txn, *id)).collect()
    }

    /// Iterates over every stored object.
    ///
    /// The iterator is lazy: objects are decoded one at a time from the
    /// snapshot taken when it was created. It holds a read transaction until
    /// it is exhausted or dropped.
    ///
    /// # Errors
    ///
    /// Fails if no read transaction can be started.
    pub fn all(&self) -> BoxResult<BoxIter<E>> {
        let txn = self.store.begin_read()?;
        let ids = txn.raw().ids(E::DESCRIPTOR.id)?;
        Ok(BoxIter {
            entities: self.clone(),
            txn: Some(txn),
            ids: ids.into_iter(),
        })
    }

    /// Calls `visitor` for every stored object until it returns false.
    ///
    /// # Errors
    ///
    /// Returns the first decoding error.
    pub fn for_each<F>(&self, mut visitor: F) -> BoxResult<()>
    where
        F: FnMut(E) -> bool,
    {
        for entity in self.all()? {
            if !visitor(entity?) {
                break;
            }
        }
        Ok(())
    }

    /// Returns true if the object `id` exists.
    ///
    /// # Errors
    ///
    /// Fails if no read transaction can be started.
    pub fn contains(&self, id: Id<E>) -> BoxResult<bool> {
        if !id.is_stored() {
            return Ok(false);
        }
        self.store
            .read(|txn| Ok(txn.raw().contains(E::DESCRIPTOR.id, id.get())?))
    }

    /// Returns the number of stored objects.
    ///
    /// # Errors
    ///
    /// Fails if no read transaction can be started.
    pub fn count(&self) -> BoxResult<u64> {
        self.count_with_limit(0)
    }

    /// Returns the number of stored objects, counting at most `limit`
    /// (0 counts all).
    ///
    /// # Errors
    ///
    /// Fails if no read transaction can be started.
    pub fn count_with_limit(&self, limit: u64) -> BoxResult<u64> {
        self.store
            .read(|txn| Ok(txn.raw().count(E::DESCRIPTOR.id, limit)?))
    }

    /// Returns true if there are no stored objects.
    ///
    /// # Errors
    ///
    /// Fails if no read transaction can be started.
    pub fn is_empty(&self) -> BoxResult<bool> {
        Ok(self.count_with_limit(1)? == 0)
    }

    /// Starts a query over this box.
    #[must_use]
    pub fn query(&self) -> QueryBuilder<E> {
        QueryBuilder::new(self.clone())
    }

    pub(crate) fn decode(&self, bytes: &[u8]) -> BoxResult<E> {
        let reader = EntityReader::new(bytes)?;
        let mut entity = E::read(&reader)?;
        entity.attach(&self.store);
        Ok(entity)
    }
}

/// Undoes the in-memory effects of a put whose transaction did not commit.
fn abandon<E: Entity>(entity: &mut E, was_new: bool, tag: Option<TxnTag>) {
    if let Some(tag) = tag {
        entity.put_aborted(tag);
    }
    if was_new {
        entity.set_id(Id::NONE);
    }
}

impl<E> Clone for EntityBox<E> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            _marker: PhantomData,
        }
    }
}

impl<E: Entity> fmt::Debug for EntityBox<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityBox")
            .field("entity", &E::DESCRIPTOR.name)
            .finish_non_exhaustive()
    }
}

/// Lazy iterator over the objects of a box, created by
/// [`EntityBox::all`].
pub struct BoxIter<E> {
    entities: EntityBox<E>,
    txn: Option<Transaction>,
    ids: std::vec::IntoIter<u64>,
}

impl<E> BoxIter<E> {
    fn release(&mut self) {
        if let Some(txn) = self.txn.take() {
            txn.abort();
        }
    }
}

impl<E: Entity> Iterator for BoxIter<E> {
    type Item = BoxResult<E>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let txn = self.txn.as_ref()?;
            let Some(id) = self.ids.next() else {
                self.release();
                return None;
            };
            match self.entities.get_in(txn, Id::new(id)) {
                Ok(Some(entity)) => return Some(Ok(entity)),
                Ok(None) => continue,
                Err(err) => {
                    self.release();
                    return Some(Err(err));
                }
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.ids.len()))
    }
}

impl<E: Entity> fmt::Debug for BoxIter<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoxIter")
            .field("entity", &E::DESCRIPTOR.name)
            .field("remaining", &self.ids.len())
            .finish()
    }
}
