//! Multi-target relation proxy.

use crate::entity::Entity;
use crate::error::{BoxError, BoxResult};
use crate::id::Id;
use crate::schema::{PropertyDescriptor, RelationDescriptor};
use crate::store::Store;
use crate::transaction::{Transaction, TxnTag};
use boxdb_codec::Value;
use boxdb_engine::PlanCondition;
use std::cell::{Ref, RefCell};
use std::collections::BTreeSet;
use std::fmt;

#[derive(Clone, Copy)]
enum Kind {
    /// Rows of a relation table owned by the source entity.
    Standalone(&'static RelationDescriptor),
    /// Objects whose to-one property points at the owner.
    Backlink(&'static PropertyDescriptor),
}

struct Loaded<T> {
    items: Vec<T>,
    /// Target ids as last read from or written to the store.
    persisted: BTreeSet<u64>,
}

impl<T> Loaded<T> {
    fn empty() -> Self {
        Self {
            items: Vec::new(),
            persisted: BTreeSet::new(),
        }
    }
}

/// What one [`ToMany::apply_to_db`] changed, kept until another transaction
/// applies changes.
struct Applied {
    txn: TxnTag,
    persisted: BTreeSet<u64>,
    /// Indices of items that got their id in `txn`.
    assigned: Vec<usize>,
}

/// A lazily loaded list of related objects of type `T`.
///
/// The list is loaded on first use. Changes are kept in memory and written
/// by [`apply_to_db`](Self::apply_to_db) when the owner is put: targets
/// without an id are put first, then the relation rows are diffed against
/// the persisted set.
///
/// Backlinks list the objects whose to-one property points at the owner
/// and cannot be modified through this proxy; change the to-one side
/// instead.
pub struct ToMany<T> {
    kind: Kind,
    owner: u64,
    owner_name: &'static str,
    store: Option<Store>,
    state: RefCell<Option<Loaded<T>>>,
    dirty: bool,
    applied: Option<Applied>,
}

impl<T: Entity> ToMany<T> {
    /// Creates a proxy backed by the relation table `relation`.
    #[must_use]
    pub fn standalone(relation: &'static RelationDescriptor) -> Self {
        Self::with_kind(Kind::Standalone(relation))
    }

    /// Creates a read-only proxy over the objects whose `property` (a to-one
    /// relation property of `T`) points at the owner.
    #[must_use]
    pub fn backlink(property: &'static PropertyDescriptor) -> Self {
        Self::with_kind(Kind::Backlink(property))
    }

    fn with_kind(kind: Kind) -> Self {
        Self {
            kind,
            owner: 0,
            owner_name: "",
            store: None,
            state: RefCell::new(None),
            dirty: false,
            applied: None,
        }
    }

    /// Returns true for backlink proxies.
    #[must_use]
    pub fn is_backlink(&self) -> bool {
        matches!(self.kind, Kind::Backlink(_))
    }

    /// Returns true if there are changes not yet applied.
    #[must_use]
    pub fn has_pending_changes(&self) -> bool {
        self.dirty
    }

    /// Returns the number of related objects.
    ///
    /// # Errors
    ///
    /// Returns the error of loading the list.
    pub fn len(&self) -> BoxResult<usize> {
        Ok(self.items()?.len())
    }

    /// Returns true if there are no related objects.
    ///
    /// # Errors
    ///
    /// Returns the error of loading the list.
    pub fn is_empty(&self) -> BoxResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Returns the related objects, including pending changes.
    ///
    /// # Errors
    ///
    /// Returns [`BoxError::NotAttached`] if the list must be loaded but the
    /// owner was never read from or put into a store.
    pub fn items(&self) -> BoxResult<Ref<'_, [T]>> {
        self.load()?;
        Ok(Ref::map(self.state.borrow(), |state| {
            state.as_ref().map_or(&[][..], |loaded| loaded.items.as_slice())
        }))
    }

    /// Returns the ids of the related objects; unsaved ones are
    /// [`Id::NONE`].
    ///
    /// # Errors
    ///
    /// Returns the error of loading the list.
    pub fn ids(&self) -> BoxResult<Vec<Id<T>>> {
        Ok(self.items()?.iter().map(Entity::id).collect())
    }

    /// Appends an object.
    ///
    /// # Errors
    ///
    /// Fails on backlinks and if the list cannot be loaded.
    pub fn push(&mut self, item: T) -> BoxResult<()> {
        self.loaded_mut()?.items.push(item);
        Ok(())
    }

    /// Removes and returns the object at `index`, if any.
    ///
    /// # Errors
    ///
    /// Fails on backlinks and if the list cannot be loaded.
    pub fn remove_at(&mut self, index: usize) -> BoxResult<Option<T>> {
        let loaded = self.loaded_mut()?;
        Ok((index < loaded.items.len()).then(|| loaded.items.remove(index)))
    }

    /// Removes the object with id `id`. Returns false if it is not in the
    /// list.
    ///
    /// # Errors
    ///
    /// Fails on backlinks and if the list cannot be loaded.
    pub fn remove_id(&mut self, id: Id<T>) -> BoxResult<bool> {
        if !id.is_stored() {
            return Ok(false);
        }
        let loaded = self.loaded_mut()?;
        match loaded.items.iter().position(|item| item.id() == id) {
            Some(index) => {
                loaded.items.remove(index);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Removes every object.
    ///
    /// # Errors
    ///
    /// Fails on backlinks and if the list cannot be loaded.
    pub fn clear(&mut self) -> BoxResult<()> {
        self.loaded_mut()?.items.clear();
        Ok(())
    }

    /// Replaces the list.
    ///
    /// # Errors
    ///
    /// Fails on backlinks and if the list cannot be loaded.
    pub fn replace(&mut self, items: Vec<T>) -> BoxResult<()> {
        self.loaded_mut()?.items = items;
        Ok(())
    }

    /// Discards the loaded list and all pending changes.
    pub fn reset(&mut self) {
        *self.state.get_mut() = None;
        self.dirty = false;
        self.applied = None;
    }

    /// Connects the proxy to `store` as a relation of `owner`.
    ///
    /// A proxy that is re-attached to a different owner without pending
    /// changes reloads its list.
    pub fn attach<O: Entity>(&mut self, store: &Store, owner: Id<O>) {
        if owner.get() != self.owner && !self.dirty {
            *self.state.get_mut() = None;
        }
        self.owner = owner.get();
        self.owner_name = O::DESCRIPTOR.name;
        self.store = Some(store.clone());
    }

    /// Writes pending changes in `txn`. Call from [`Entity::after_put`].
    ///
    /// # Errors
    ///
    /// Returns [`BoxError::CannotRelateToUnsavedEntities`] if the owner has
    /// no id, and any error of putting new targets or relation rows.
    pub fn apply_to_db(&mut self, txn: &mut Transaction) -> BoxResult<()> {
        if !self.dirty {
            return Ok(());
        }
        let Kind::Standalone(relation) = self.kind else {
            return Ok(());
        };
        if self.owner == 0 {
            return Err(BoxError::CannotRelateToUnsavedEntities {
                owner: self.owner_name,
            });
        }
        let owner = self.owner;
        let Some(loaded) = self.state.get_mut() else {
            self.dirty = false;
            return Ok(());
        };
        let applied = self.applied.insert(Applied {
            txn: txn.tag(),
            persisted: loaded.persisted.clone(),
            assigned: Vec::new(),
        });

        let targets = txn.store().box_for::<T>()?;
        for (index, item) in loaded.items.iter_mut().enumerate() {
            if !item.id().is_stored() {
                targets.put_in(txn, item)?;
                applied.assigned.push(index);
            }
        }

        let current: BTreeSet<u64> = loaded.items.iter().map(|item| item.id().get()).collect();
        for added in current.difference(&loaded.persisted) {
            txn.raw_mut().link(relation.id, owner, *added)?;
        }
        for removed in loaded.persisted.difference(&current) {
            txn.raw_mut().unlink(relation.id, owner, *removed)?;
        }
        loaded.persisted = current;
        self.dirty = false;
        Ok(())
    }

    /// Undoes [`apply_to_db`](Self::apply_to_db) if it ran in `txn`: items
    /// it put get id 0 again and the changes stay pending. Call from
    /// [`Entity::put_aborted`].
    pub fn rollback(&mut self, txn: TxnTag) {
        if self.applied.as_ref().map(|applied| applied.txn) != Some(txn) {
            return;
        }
        let Some(applied) = self.applied.take() else {
            return;
        };
        if let Some(loaded) = self.state.get_mut() {
            for index in applied.assigned {
                if let Some(item) = loaded.items.get_mut(index) {
                    item.put_aborted(txn);
                    item.set_id(Id::NONE);
                }
            }
            loaded.persisted = applied.persisted;
        }
        self.dirty = true;
    }

    fn loaded_mut(&mut self) -> BoxResult<&mut Loaded<T>> {
        if let Kind::Backlink(property) = self.kind {
            return Err(BoxError::illegal_state(format!(
                "Backlink {}.{} is read-only; modify the to-one side instead",
                T::DESCRIPTOR.name,
                property.name
            )));
        }
        self.load()?;
        self.dirty = true;
        Ok(self.state.get_mut().get_or_insert_with(Loaded::empty))
    }

    fn load(&self) -> BoxResult<()> {
        if self.state.borrow().is_some() {
            return Ok(());
        }
        let loaded = self.fetch()?;
        self.state.replace(Some(loaded));
        Ok(())
    }

    fn fetch(&self) -> BoxResult<Loaded<T>> {
        if self.owner == 0 {
            return Ok(Loaded::empty());
        }
        let store = self.store.as_ref().ok_or(BoxError::NotAttached {
            target: T::DESCRIPTOR.name,
        })?;
        let targets = store.box_for::<T>()?;
        store.read(|txn| {
            let ids = match self.kind {
                Kind::Standalone(relation) => txn.raw().targets(relation.id, self.owner)?,
                Kind::Backlink(property) => {
                    let condition = PlanCondition::Equal {
                        property: property.id,
                        value: Value::UInt(self.owner),
                        case_sensitive: true,
                    };
                    let plan = store.engine().compile(T::DESCRIPTOR.id, &condition)?;
                    txn.raw().query_ids(&plan)?
                }
            };
            let ids: Vec<Id<T>> = ids.into_iter().map(Id::new).collect();
            let items: Vec<T> = targets.get_many_in(txn, &ids)?.into_iter().flatten().collect();
            let persisted = items.iter().map(|item| item.id().get()).collect();
            Ok(Loaded { items, persisted })
        })
    }
}

impl<T: Entity + Clone> Clone for ToMany<T> {
    fn clone(&self) -> Self {
        let state = self.state.borrow().as_ref().map(|loaded| Loaded {
            items: loaded.items.clone(),
            persisted: loaded.persisted.clone(),
        });
        Self {
            kind: self.kind,
            owner: self.owner,
            owner_name: self.owner_name,
            store: self.store.clone(),
            state: RefCell::new(state),
            dirty: self.dirty,
            applied: self.applied.as_ref().map(|applied| Applied {
                txn: applied.txn,
                persisted: applied.persisted.clone(),
                assigned: applied.assigned.clone(),
            }),
        }
    }
}

impl<T: Entity> fmt::Debug for ToMany<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let loaded = self.state.borrow().as_ref().map(|loaded| loaded.items.len());
        f.debug_struct("ToMany")
            .field("target", &T::DESCRIPTOR.name)
            .field("owner", &self.owner)
            .field("backlink", &self.is_backlink())
            .field("loaded", &loaded)
            .field("dirty", &self.dirty)
            .finish()
    }
}
