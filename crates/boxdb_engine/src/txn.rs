//! Transactions.
//!
//! A read transaction pins the snapshot that was current when it began. A
//! write transaction pins the same kind of snapshot and buffers its changes
//! in memory; reads inside it see those changes. Nothing reaches the data file
//! before [`Txn::commit`].

use crate::engine::Shared;
use crate::error::{EngineError, EngineResult};
use crate::frame::Frame;
use crate::model::ModelEntity;
use crate::query::QueryPlan;
use crate::state::{Pending, Snapshot};
use boxdb_codec::RecordReader;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::thread::ThreadId;
use tracing::debug;

/// Mode of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TxnMode {
    /// Read-only; many may be open at once, up to the reader bound.
    Read,
    /// Read-write; at most one is open at a time.
    Write,
}

/// Lifecycle state of a transaction.
///
/// A transaction starts active, with its slot already acquired:
///
/// ```text
/// Active -> Committed
///        -> Aborted
///        -> Failed -> Aborted
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TxnState {
    /// Open for operations.
    Active,
    /// Changes are durable and visible to later transactions.
    Committed,
    /// Changes were discarded.
    Aborted,
    /// A write failed; the transaction can only be aborted.
    Failed,
}

/// An engine transaction.
///
/// Dropping an active transaction aborts it and releases its slot.
pub struct Txn {
    shared: Arc<Shared>,
    mode: TxnMode,
    state: TxnState,
    snapshot: Arc<Snapshot>,
    pending: Pending,
    thread: ThreadId,
}

impl std::fmt::Debug for Txn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Txn")
            .field("mode", &self.mode)
            .field("state", &self.state)
            .field("pending_bytes", &self.pending.bytes)
            .finish_non_exhaustive()
    }
}

impl Txn {
    /// Creates a transaction whose slot has already been acquired.
    pub(crate) fn new(
        shared: Arc<Shared>,
        mode: TxnMode,
        snapshot: Arc<Snapshot>,
        thread: ThreadId,
    ) -> Self {
        Self {
            shared,
            mode,
            state: TxnState::Active,
            snapshot,
            pending: Pending::default(),
            thread,
        }
    }

    /// Returns the mode.
    #[must_use]
    pub fn mode(&self) -> TxnMode {
        self.mode
    }

    /// Returns the current state.
    #[must_use]
    pub fn state(&self) -> TxnState {
        self.state
    }

    /// Returns true while operations are accepted.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.state == TxnState::Active
    }

    // ---- reads -------------------------------------------------------------

    /// Reads the record `id` of `entity`, or `None` if it does not exist.
    ///
    /// # Errors
    ///
    /// Fails if the transaction is not active, the entity is unknown, or the
    /// data file cannot be read.
    pub fn get(&self, entity: u32, id: u64) -> EngineResult<Option<Vec<u8>>> {
        self.ensure_active()?;
        self.entity(entity)?;
        self.load(entity, id)
    }

    /// Returns true if `id` exists for `entity`.
    ///
    /// # Errors
    ///
    /// Fails if the transaction is not active or the entity is unknown.
    pub fn contains(&self, entity: u32, id: u64) -> EngineResult<bool> {
        self.ensure_active()?;
        self.entity(entity)?;
        Ok(self.exists(entity, id))
    }

    /// Returns all ids of `entity` in ascending order.
    ///
    /// # Errors
    ///
    /// Fails if the transaction is not active or the entity is unknown.
    pub fn ids(&self, entity: u32) -> EngineResult<Vec<u64>> {
        self.ensure_active()?;
        self.entity(entity)?;
        Ok(self.visible_ids(entity).into_iter().collect())
    }

    /// Counts records of `entity`, stopping at `limit` unless it is 0.
    ///
    /// # Errors
    ///
    /// Fails if the transaction is not active or the entity is unknown.
    pub fn count(&self, entity: u32, limit: u64) -> EngineResult<u64> {
        self.ensure_active()?;
        self.entity(entity)?;
        let count = self.visible_ids(entity).len() as u64;
        Ok(if limit == 0 { count } else { count.min(limit) })
    }

    /// Runs `plan` and returns matching `(id, record)` pairs in id order,
    /// skipping `offset` matches and returning at most `limit`.
    ///
    /// # Errors
    ///
    /// Fails if the transaction is not active or a record cannot be read.
    pub fn query(
        &self,
        plan: &QueryPlan,
        offset: usize,
        limit: Option<usize>,
    ) -> EngineResult<Vec<(u64, Vec<u8>)>> {
        self.ensure_active()?;
        let entity = plan.entity_id();
        let mut skipped = 0;
        let mut found = Vec::new();

        for id in self.visible_ids(entity) {
            if limit.is_some_and(|limit| found.len() >= limit) {
                break;
            }
            let Some(bytes) = self.load(entity, id)? else {
                continue;
            };
            if !plan.matches(&RecordReader::new(&bytes)?)? {
                continue;
            }
            if skipped < offset {
                skipped += 1;
                continue;
            }
            found.push((id, bytes));
        }
        Ok(found)
    }

    /// Runs `plan` and returns the ids of all matches.
    ///
    /// # Errors
    ///
    /// Fails if the transaction is not active or a record cannot be read.
    pub fn query_ids(&self, plan: &QueryPlan) -> EngineResult<Vec<u64>> {
        Ok(self
            .query(plan, 0, None)?
            .into_iter()
            .map(|(id, _)| id)
            .collect())
    }

    /// Counts the matches of `plan`.
    ///
    /// # Errors
    ///
    /// Fails if the transaction is not active or a record cannot be read.
    pub fn query_count(&self, plan: &QueryPlan) -> EngineResult<u64> {
        Ok(self.query(plan, 0, None)?.len() as u64)
    }

    /// Returns the targets linked from `source` through `relation`.
    ///
    /// # Errors
    ///
    /// Fails if the transaction is not active or the relation is unknown.
    pub fn targets(&self, relation: u32, source: u64) -> EngineResult<Vec<u64>> {
        self.ensure_active()?;
        self.relation(relation)?;
        Ok(self.visible_targets(relation, source).into_iter().collect())
    }

    /// Returns the sources linking to `target` through `relation`.
    ///
    /// # Errors
    ///
    /// Fails if the transaction is not active or the relation is unknown.
    pub fn sources(&self, relation: u32, target: u64) -> EngineResult<Vec<u64>> {
        self.ensure_active()?;
        self.relation(relation)?;
        Ok(self.visible_sources(relation, target).into_iter().collect())
    }

    // ---- writes ------------------------------------------------------------

    /// Reserves the next id of `entity`.
    ///
    /// # Errors
    ///
    /// Fails if this is not an active write transaction or the entity is
    /// unknown.
    pub fn next_id(&mut self, entity: u32) -> EngineResult<u64> {
        let result = self.next_id_inner(entity);
        self.track(result)
    }

    /// Inserts or overwrites the record `id` of `entity`.
    ///
    /// # Errors
    ///
    /// Returns `DbFull` if the transaction would no longer fit into the data
    /// file, `UniqueViolation` if a unique property collides with another
    /// record, and illegal-argument for id 0 or malformed records. Any error
    /// moves the transaction to `Failed`.
    pub fn put(&mut self, entity: u32, id: u64, record: Vec<u8>) -> EngineResult<()> {
        let result = self.put_inner(entity, id, record);
        self.track(result)
    }

    /// Removes the record `id` of `entity` together with the relation rows
    /// that mention it. Returns false if it did not exist.
    ///
    /// # Errors
    ///
    /// Fails if this is not an active write transaction or the entity is
    /// unknown.
    pub fn remove(&mut self, entity: u32, id: u64) -> EngineResult<bool> {
        let result = self.remove_inner(entity, id);
        self.track(result)
    }

    /// Removes every record of `entity` and returns how many there were.
    ///
    /// # Errors
    ///
    /// Fails if this is not an active write transaction or the entity is
    /// unknown.
    pub fn remove_all(&mut self, entity: u32) -> EngineResult<u64> {
        let result = self.remove_all_inner(entity);
        self.track(result)
    }

    /// Adds the row `source -> target` to `relation`.
    ///
    /// # Errors
    ///
    /// Fails for unknown relations, id 0, or when the data file is full.
    pub fn link(&mut self, relation: u32, source: u64, target: u64) -> EngineResult<()> {
        let result = self.link_inner(relation, source, target, true);
        self.track(result)
    }

    /// Removes the row `source -> target` from `relation`.
    ///
    /// # Errors
    ///
    /// Fails for unknown relations or id 0.
    pub fn unlink(&mut self, relation: u32, source: u64, target: u64) -> EngineResult<()> {
        let result = self.link_inner(relation, source, target, false);
        self.track(result)
    }

    // ---- lifecycle ---------------------------------------------------------

    /// Commits the transaction.
    ///
    /// Committing a read transaction just releases it.
    ///
    /// # Errors
    ///
    /// A failed transaction is aborted and reported as illegal-state. Errors
    /// writing the data file abort the transaction and are returned.
    pub fn commit(mut self) -> EngineResult<()> {
        match self.state {
            TxnState::Active => {}
            TxnState::Failed => {
                self.finish(TxnState::Aborted);
                return Err(EngineError::illegal_state(
                    "Transaction failed and was aborted",
                ));
            }
            _ => return Err(EngineError::illegal_state("Transaction is no longer active")),
        }

        if self.mode == TxnMode::Write && !self.pending.is_empty() {
            let pending = std::mem::take(&mut self.pending);
            if let Err(err) = self.shared.commit(&pending) {
                self.finish(TxnState::Aborted);
                return Err(err);
            }
        }
        self.finish(TxnState::Committed);
        Ok(())
    }

    /// Discards all changes and releases the transaction.
    pub fn abort(mut self) {
        self.finish(TxnState::Aborted);
    }

    fn finish(&mut self, state: TxnState) {
        if !matches!(self.state, TxnState::Active | TxnState::Failed) {
            return;
        }
        self.pending = Pending::default();
        self.state = state;
        match self.mode {
            TxnMode::Read => self.shared.readers.release(self.thread),
            TxnMode::Write => self.shared.writer.release(),
        }
        debug!(mode = ?self.mode, state = ?state, "transaction finished");
    }

    // ---- internals ---------------------------------------------------------

    fn track<T>(&mut self, result: EngineResult<T>) -> EngineResult<T> {
        if result.is_err() && self.state == TxnState::Active {
            self.state = TxnState::Failed;
        }
        result
    }

    fn ensure_active(&self) -> EngineResult<()> {
        match self.state {
            TxnState::Active => Ok(()),
            TxnState::Failed => Err(EngineError::illegal_state(
                "Transaction failed and can only be aborted",
            )),
            _ => Err(EngineError::illegal_state("Transaction is no longer active")),
        }
    }

    fn ensure_writable(&self) -> EngineResult<()> {
        self.ensure_active()?;
        if self.mode == TxnMode::Read {
            return Err(EngineError::illegal_state(
                "Cannot write in a read-only transaction",
            ));
        }
        Ok(())
    }

    fn entity(&self, id: u32) -> EngineResult<&ModelEntity> {
        self.shared
            .model
            .entity(id)
            .ok_or_else(|| EngineError::illegal_argument(format!("Unknown entity id {id}")))
    }

    fn relation(&self, id: u32) -> EngineResult<()> {
        self.shared
            .model
            .relation(id)
            .map(|_| ())
            .ok_or_else(|| EngineError::illegal_argument(format!("Unknown relation id {id}")))
    }

    fn exists(&self, entity: u32, id: u64) -> bool {
        match self.pending.records.get(&(entity, id)) {
            Some(write) => write.is_some(),
            None => self.snapshot.record(entity, id).is_some(),
        }
    }

    fn load(&self, entity: u32, id: u64) -> EngineResult<Option<Vec<u8>>> {
        if let Some(write) = self.pending.records.get(&(entity, id)) {
            return Ok(write.clone());
        }
        match self.snapshot.record(entity, id) {
            Some(ptr) => Ok(Some(self.shared.read_record(ptr)?)),
            None => Ok(None),
        }
    }

    fn visible_ids(&self, entity: u32) -> BTreeSet<u64> {
        let mut ids: BTreeSet<u64> = self.snapshot.ids(entity).collect();
        for (&(_, id), write) in self
            .pending
            .records
            .range((entity, 0)..=(entity, u64::MAX))
        {
            if write.is_some() {
                ids.insert(id);
            } else {
                ids.remove(&id);
            }
        }
        ids
    }

    fn visible_targets(&self, relation: u32, source: u64) -> BTreeSet<u64> {
        let mut targets: BTreeSet<u64> = self.snapshot.targets(relation, source).collect();
        for (&(_, _, target), &linked) in self
            .pending
            .links
            .range((relation, source, 0)..=(relation, source, u64::MAX))
        {
            if linked {
                targets.insert(target);
            } else {
                targets.remove(&target);
            }
        }
        targets
    }

    fn visible_sources(&self, relation: u32, target: u64) -> BTreeSet<u64> {
        let mut sources: BTreeSet<u64> = self.snapshot.sources(relation, target).collect();
        for (&(_, source, _), &linked) in self
            .pending
            .links
            .range((relation, 0, 0)..=(relation, u64::MAX, u64::MAX))
            .filter(|((_, _, t), _)| *t == target)
        {
            if linked {
                sources.insert(source);
            } else {
                sources.remove(&source);
            }
        }
        sources
    }

    fn sequence(&self, entity: u32) -> u64 {
        let pending = self.pending.sequences.get(&entity).copied().unwrap_or(0);
        pending.max(self.snapshot.sequence(entity))
    }

    /// Fails with `DbFull` if committing `extra` more bytes would overflow.
    fn ensure_capacity(&self, pending_bytes: u64, message: &str) -> EngineResult<()> {
        let projected = self.shared.size()? + pending_bytes + Frame::COMMIT_SIZE as u64;
        if projected > self.shared.max_bytes {
            return Err(EngineError::db_full(message));
        }
        Ok(())
    }

    fn next_id_inner(&mut self, entity: u32) -> EngineResult<u64> {
        self.ensure_writable()?;
        self.entity(entity)?;
        let id = self.sequence(entity) + 1;
        self.pending.set_sequence(entity, id);
        Ok(id)
    }

    fn put_inner(&mut self, entity_id: u32, id: u64, record: Vec<u8>) -> EngineResult<()> {
        self.ensure_writable()?;
        let entity = self.entity(entity_id)?;
        if id == 0 {
            return Err(EngineError::illegal_argument(format!(
                "Cannot put {} with id 0",
                entity.name
            )));
        }
        let reader = RecordReader::new(&record).map_err(|e| {
            EngineError::illegal_argument(format!("Invalid record for {}: {e}", entity.name))
        })?;

        for property in entity.unique_properties() {
            let Some(value) = reader.value(property.offset(), property.property_type, property.flags)?
            else {
                continue;
            };
            for other in self.visible_ids(entity_id) {
                if other == id {
                    continue;
                }
                let Some(bytes) = self.load(entity_id, other)? else {
                    continue;
                };
                let existing = RecordReader::new(&bytes)?.value(
                    property.offset(),
                    property.property_type,
                    property.flags,
                )?;
                if existing.as_ref() == Some(&value) {
                    return Err(EngineError::UniqueViolation {
                        message: format!(
                            "Unique constraint for {}.{} would be violated",
                            entity.name, property.name
                        ),
                    });
                }
            }
        }

        let bumps_sequence = id > self.sequence(entity_id);
        let mut projected = self.pending.bytes_with_record(entity_id, id, Some(&record));
        if bumps_sequence && !self.pending.sequences.contains_key(&entity_id) {
            projected += Pending::sequence_frame_size();
        }
        self.ensure_capacity(projected, "Could not put")?;

        if bumps_sequence {
            self.pending.set_sequence(entity_id, id);
        }
        self.pending.set_record(entity_id, id, Some(record));
        Ok(())
    }

    fn remove_inner(&mut self, entity: u32, id: u64) -> EngineResult<bool> {
        self.ensure_writable()?;
        self.entity(entity)?;
        if !self.exists(entity, id) {
            return Ok(false);
        }

        let shared = Arc::clone(&self.shared);
        for relation in &shared.model.relations {
            if relation.source_entity == entity {
                for target in self.visible_targets(relation.id, id) {
                    self.pending.set_link(relation.id, id, target, false);
                }
            }
            if relation.target_entity == entity {
                for source in self.visible_sources(relation.id, id) {
                    self.pending.set_link(relation.id, source, id, false);
                }
            }
        }
        self.pending.set_record(entity, id, None);
        Ok(true)
    }

    fn remove_all_inner(&mut self, entity: u32) -> EngineResult<u64> {
        self.ensure_writable()?;
        self.entity(entity)?;
        let ids = self.visible_ids(entity);
        for &id in &ids {
            self.remove_inner(entity, id)?;
        }
        Ok(ids.len() as u64)
    }

    fn link_inner(
        &mut self,
        relation: u32,
        source: u64,
        target: u64,
        linked: bool,
    ) -> EngineResult<()> {
        self.ensure_writable()?;
        self.relation(relation)?;
        if source == 0 || target == 0 {
            return Err(EngineError::illegal_argument(
                "Relation rows require stored objects (id 0 given)",
            ));
        }
        if linked && !self.pending.links.contains_key(&(relation, source, target)) {
            self.ensure_capacity(
                self.pending.bytes + Pending::link_frame_size(),
                "Could not put",
            )?;
        }
        self.pending.set_link(relation, source, target, linked);
        Ok(())
    }
}

impl Drop for Txn {
    fn drop(&mut self) {
        self.finish(TxnState::Aborted);
    }
}
