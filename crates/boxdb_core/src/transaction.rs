//! Typed transactions.

use crate::error::BoxResult;
use crate::store::Store;
use boxdb_engine::{Txn, TxnMode, TxnState};
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_TAG: AtomicU64 = AtomicU64::new(1);

/// Identifies one [`Transaction`] for the lifetime of the process.
///
/// Relation proxies remember the tag of the transaction in which they
/// assigned ids, so an aborted put can undo exactly those assignments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TxnTag(u64);

/// A read or write transaction on a [`Store`].
///
/// Box operations ending in `_in` run inside a caller-owned transaction.
/// Dropping a transaction without committing aborts it.
#[derive(Debug)]
pub struct Transaction {
    txn: Txn,
    store: Store,
    tag: TxnTag,
}

impl Transaction {
    pub(crate) fn new(txn: Txn, store: Store) -> Self {
        Self {
            txn,
            store,
            tag: TxnTag(NEXT_TAG.fetch_add(1, Ordering::Relaxed)),
        }
    }

    /// Returns the tag of this transaction.
    #[must_use]
    pub fn tag(&self) -> TxnTag {
        self.tag
    }

    /// Returns the mode.
    #[must_use]
    pub fn mode(&self) -> TxnMode {
        self.txn.mode()
    }

    /// Returns the state.
    #[must_use]
    pub fn state(&self) -> TxnState {
        self.txn.state()
    }

    /// Returns true while operations are accepted.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.txn.is_active()
    }

    /// Returns the store this transaction belongs to.
    #[must_use]
    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Commits all changes.
    ///
    /// # Errors
    ///
    /// A transaction in which an operation failed cannot be committed: it is
    /// aborted and illegal-state is returned.
    pub fn commit(self) -> BoxResult<()> {
        Ok(self.txn.commit()?)
    }

    /// Discards all changes.
    pub fn abort(self) {
        self.txn.abort();
    }

    pub(crate) fn raw(&self) -> &Txn {
        &self.txn
    }

    pub(crate) fn raw_mut(&mut self) -> &mut Txn {
        &mut self.txn
    }
}
