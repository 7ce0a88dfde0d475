//! The binding between a Rust type and its stored representation.

use crate::codec::{EntityReader, EntityWriter};
use crate::error::BoxResult;
use crate::id::Id;
use crate::schema::EntityDescriptor;
use crate::store::Store;
use crate::transaction::{Transaction, TxnTag};

/// A type that can be stored in a [`Store`].
///
/// Implementations are written once per type, usually next to its
/// definition:
///
/// ```ignore
/// impl Entity for Note {
///     const DESCRIPTOR: &'static EntityDescriptor = &NOTE;
///
///     fn id(&self) -> Id<Self> { self.id }
///     fn set_id(&mut self, id: Id<Self>) { self.id = id; }
///
///     fn write(&self, writer: &mut EntityWriter) -> BoxResult<()> {
///         writer.put(&NOTE_ID, &self.id)?;
///         writer.put(&NOTE_TEXT, &self.text)?;
///         writer.put_to_one(&NOTE_AUTHOR, &self.author)
///     }
///
///     fn read(reader: &EntityReader<'_>) -> BoxResult<Self> {
///         Ok(Self {
///             id: reader.read(&NOTE_ID)?,
///             text: reader.read(&NOTE_TEXT)?,
///             author: reader.read_to_one(&NOTE_AUTHOR)?,
///         })
///     }
/// }
/// ```
///
/// The relation hooks have empty defaults; types with [`ToOne`] or
/// [`ToMany`] fields forward them to those fields.
///
/// [`ToOne`]: crate::ToOne
/// [`ToMany`]: crate::ToMany
pub trait Entity: Sized + 'static {
    /// Static schema metadata.
    const DESCRIPTOR: &'static EntityDescriptor;

    /// Returns the id; [`Id::NONE`] until the object is put.
    fn id(&self) -> Id<Self>;

    /// Stores the id assigned by a put.
    fn set_id(&mut self, id: Id<Self>);

    /// Encodes the fields. The id must be written too.
    ///
    /// # Errors
    ///
    /// Fails when a field does not fit its property.
    fn write(&self, writer: &mut EntityWriter) -> BoxResult<()>;

    /// Decodes an object.
    ///
    /// # Errors
    ///
    /// Fails when a stored field cannot be decoded.
    fn read(reader: &EntityReader<'_>) -> BoxResult<Self>;

    /// Connects relation proxies to `store`. Called after every read and
    /// around every put.
    fn attach(&mut self, store: &Store) {
        let _ = store;
    }

    /// Runs inside the put transaction before the object is encoded.
    /// To-one targets that were never put are put here.
    ///
    /// # Errors
    ///
    /// Errors abort the put.
    fn before_put(&mut self, txn: &mut Transaction) -> BoxResult<()> {
        let _ = txn;
        Ok(())
    }

    /// Runs inside the put transaction once the object has its id.
    /// Pending to-many changes are applied here.
    ///
    /// # Errors
    ///
    /// Errors abort the put.
    fn after_put(&mut self, txn: &mut Transaction) -> BoxResult<()> {
        let _ = txn;
        Ok(())
    }

    /// Runs when the put transaction `txn` did not commit, after
    /// [`EntityBox::put`](crate::EntityBox::put) has failed. Relation
    /// targets that received their id in `txn` lose it again, so a retry
    /// puts them anew.
    fn put_aborted(&mut self, txn: TxnTag) {
        let _ = txn;
    }
}
