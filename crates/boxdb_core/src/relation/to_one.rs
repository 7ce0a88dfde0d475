//! Single-target relation proxy.

use crate::entity::Entity;
use crate::error::{BoxError, BoxResult};
use crate::id::Id;
use crate::store::Store;
use crate::transaction::{Transaction, TxnTag};
use std::cell::{Ref, RefCell};
use std::fmt;

enum Slot<T> {
    None,
    /// Target id known, object not loaded yet.
    Lazy(Id<T>),
    /// Loading found no object with this id.
    Unresolvable(Id<T>),
    /// Loaded, or set to an object that already has an id.
    Loaded(Box<T>),
    /// Set to an object that has not been put yet.
    Unstored(Box<T>),
}

/// A lazily resolved reference to one object of type `T`.
///
/// The target id is stored in a relation property of the owner. The target
/// object is fetched through `T`'s box on the first call to
/// [`target`](Self::target) and cached for the lifetime of the proxy; later
/// writes by others are not observed until [`reset`](Self::reset) or a fresh
/// read of the owner.
pub struct ToOne<T> {
    slot: RefCell<Slot<T>>,
    store: Option<Store>,
    /// Transaction in which the target was put by this proxy.
    persisted_in: Option<TxnTag>,
}

impl<T: Entity> ToOne<T> {
    /// Creates an empty relation.
    #[must_use]
    pub fn new() -> Self {
        Self {
            slot: RefCell::new(Slot::None),
            store: None,
            persisted_in: None,
        }
    }

    /// Creates a relation to the object with id `id`; id 0 means none.
    #[must_use]
    pub fn from_id(id: Id<T>) -> Self {
        let relation = Self::new();
        relation.slot.replace(lazy(id));
        relation
    }

    /// Creates a relation to `target`.
    #[must_use]
    pub fn with_target(target: T) -> Self {
        let mut relation = Self::new();
        relation.set_target(Some(target));
        relation
    }

    /// Sets the target object. An object without an id is put together with
    /// the owner.
    pub fn set_target(&mut self, target: Option<T>) {
        self.persisted_in = None;
        *self.slot.get_mut() = match target {
            Some(target) if target.id().is_stored() => Slot::Loaded(Box::new(target)),
            Some(target) => Slot::Unstored(Box::new(target)),
            None => Slot::None,
        };
    }

    /// Sets the target by id; id 0 clears the relation.
    pub fn set_target_id(&mut self, id: Id<T>) {
        self.persisted_in = None;
        *self.slot.get_mut() = lazy(id);
    }

    /// Returns the target id; [`Id::NONE`] if there is no target or the
    /// target has not been put yet.
    #[must_use]
    pub fn target_id(&self) -> Id<T> {
        match &*self.slot.borrow() {
            Slot::None => Id::NONE,
            Slot::Lazy(id) | Slot::Unresolvable(id) => *id,
            Slot::Loaded(target) | Slot::Unstored(target) => target.id(),
        }
    }

    /// Returns true if a target is set, stored or not.
    #[must_use]
    pub fn has_value(&self) -> bool {
        !matches!(&*self.slot.borrow(), Slot::None)
    }

    /// Returns the target object, loading it on first access.
    ///
    /// Returns `None` if no target is set or the target id names no stored
    /// object.
    ///
    /// # Errors
    ///
    /// Returns [`BoxError::NotAttached`] if the target must be loaded but the
    /// owner was never read from or put into a store, and any error of the
    /// load itself.
    pub fn target(&self) -> BoxResult<Option<Ref<'_, T>>> {
        let pending = match &*self.slot.borrow() {
            Slot::Lazy(id) => Some(*id),
            _ => None,
        };
        if let Some(id) = pending {
            let store = self.store.as_ref().ok_or(BoxError::NotAttached {
                target: T::DESCRIPTOR.name,
            })?;
            let loaded = store.box_for::<T>()?.get(id)?;
            self.slot.replace(match loaded {
                Some(target) => Slot::Loaded(Box::new(target)),
                None => Slot::Unresolvable(id),
            });
        }
        Ok(Ref::filter_map(self.slot.borrow(), |slot| match slot {
            Slot::Loaded(target) | Slot::Unstored(target) => Some(&**target),
            _ => None,
        })
        .ok())
    }

    /// Drops the cached object; the next [`target`](Self::target) loads it
    /// again.
    pub fn reset(&mut self) {
        self.persisted_in = None;
        let id = self.target_id();
        let slot = self.slot.get_mut();
        if !matches!(slot, Slot::Unstored(_)) {
            *slot = lazy(id);
        }
    }

    /// Connects the proxy to `store` for lazy loading.
    pub fn attach(&mut self, store: &Store) {
        self.store = Some(store.clone());
        if let Slot::Loaded(target) | Slot::Unstored(target) = self.slot.get_mut() {
            target.attach(store);
        }
    }

    /// Puts a target that has not been put yet, assigning its id. Call from
    /// [`Entity::before_put`] so the owner encodes the new id.
    ///
    /// # Errors
    ///
    /// Returns the error of putting the target.
    pub fn persist_target(&mut self, txn: &mut Transaction) -> BoxResult<()> {
        let slot = self.slot.get_mut();
        if let Slot::Unstored(target) = &mut *slot {
            let targets = txn.store().box_for::<T>()?;
            targets.put_in(txn, target)?;
            let taken = std::mem::replace(slot, Slot::None);
            if let Slot::Unstored(target) = taken {
                *slot = Slot::Loaded(target);
            }
            self.persisted_in = Some(txn.tag());
        }
        Ok(())
    }

    /// Undoes [`persist_target`](Self::persist_target) if it put the target
    /// in `txn`: the target gets id 0 again and is put with the next put of
    /// the owner. Call from [`Entity::put_aborted`].
    pub fn rollback(&mut self, txn: TxnTag) {
        if self.persisted_in != Some(txn) {
            return;
        }
        self.persisted_in = None;
        let slot = self.slot.get_mut();
        if !matches!(slot, Slot::Loaded(_)) {
            return;
        }
        if let Slot::Loaded(mut target) = std::mem::replace(slot, Slot::None) {
            target.put_aborted(txn);
            target.set_id(Id::NONE);
            *slot = Slot::Unstored(target);
        }
    }
}

fn lazy<T>(id: Id<T>) -> Slot<T> {
    if id.is_stored() {
        Slot::Lazy(id)
    } else {
        Slot::None
    }
}

impl<T: Entity> Default for ToOne<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Entity + Clone> Clone for ToOne<T> {
    fn clone(&self) -> Self {
        let slot = match &*self.slot.borrow() {
            Slot::None => Slot::None,
            Slot::Lazy(id) => Slot::Lazy(*id),
            Slot::Unresolvable(id) => Slot::Unresolvable(*id),
            Slot::Loaded(target) => Slot::Loaded(target.clone()),
            Slot::Unstored(target) => Slot::Unstored(target.clone()),
        };
        Self {
            slot: RefCell::new(slot),
            store: self.store.clone(),
            persisted_in: self.persisted_in,
        }
    }
}

/// Relations compare by target id.
impl<T: Entity> PartialEq for ToOne<T> {
    fn eq(&self, other: &Self) -> bool {
        self.target_id() == other.target_id()
    }
}

impl<T: Entity> fmt::Debug for ToOne<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &*self.slot.borrow() {
            Slot::None => "none",
            Slot::Lazy(_) => "lazy",
            Slot::Unresolvable(_) => "unresolvable",
            Slot::Loaded(_) => "loaded",
            Slot::Unstored(_) => "unstored",
        };
        f.debug_struct("ToOne")
            .field("target", &T::DESCRIPTOR.name)
            .field("id", &self.target_id())
            .field("state", &state)
            .finish()
    }
}
