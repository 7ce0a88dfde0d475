//! The engine handle: open, recovery, transaction slots and commit.

use crate::dir::StoreDir;
use crate::error::{os_error_text, EngineError, EngineResult};
use crate::frame::{check_file_header, file_header, Frame, FrameKind, FILE_HEADER_SIZE};
use crate::model::Model;
use crate::options::EngineOptions;
use crate::query::{PlanCondition, QueryPlan};
use crate::slots::{ReaderSlots, WriterGate};
use crate::state::{Pending, RecordPtr, Snapshot};
use crate::txn::{Txn, TxnMode};
use boxdb_storage::{FileBackend, InMemoryBackend, StorageBackend, StorageError};
use parking_lot::RwLock;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use tracing::{debug, warn};

/// State shared by the engine handle and its transactions.
pub(crate) struct Shared {
    dir: Option<StoreDir>,
    backend: RwLock<Box<dyn StorageBackend>>,
    committed: RwLock<Arc<Snapshot>>,
    pub model: Model,
    options: EngineOptions,
    pub max_bytes: u64,
    pub readers: ReaderSlots,
    pub writer: WriterGate,
    next_seq: AtomicU64,
}

impl Shared {
    pub fn size(&self) -> EngineResult<u64> {
        Ok(self.backend.read().size()?)
    }

    pub fn read_record(&self, ptr: RecordPtr) -> EngineResult<Vec<u8>> {
        Ok(self.backend.read().read_at(ptr.offset, ptr.len as usize)?)
    }

    /// Appends the transaction and publishes the next snapshot.
    pub fn commit(&self, pending: &Pending) -> EngineResult<()> {
        let seq = self.next_seq.fetch_add(1, Ordering::AcqRel);
        let (buf, placements) = pending.encode(seq);

        let base = {
            let mut backend = self.backend.write();
            let base = append_or_rollback(&mut **backend, &buf, "Could not commit")?;
            if self.options.sync_on_commit {
                if let Err(err) = backend.sync() {
                    rollback(&mut **backend, base);
                    return Err(err.into());
                }
            }
            base
        };

        let mut committed = self.committed.write();
        Arc::make_mut(&mut *committed).apply_pending(pending, base, &placements);
        debug!(seq, bytes = buf.len(), "committed");
        Ok(())
    }
}

/// Appends `buf` and flushes, restoring the previous size on failure.
fn append_or_rollback(
    backend: &mut dyn StorageBackend,
    buf: &[u8],
    full_message: &str,
) -> EngineResult<u64> {
    let base = backend.size()?;
    let result = backend.append(buf).and_then(|_| backend.flush());
    match result {
        Ok(()) => Ok(base),
        Err(err) => {
            rollback(backend, base);
            Err(match err {
                StorageError::CapacityExceeded { .. } => EngineError::db_full(full_message),
                other => other.into(),
            })
        }
    }
}

fn rollback(backend: &mut dyn StorageBackend, base: u64) {
    let truncated = backend
        .size()
        .map(|size| size > base)
        .and_then(|grown| if grown { backend.truncate(base) } else { Ok(()) });
    if let Err(err) = truncated {
        warn!(error = %err, base, "could not roll back a failed append");
    }
}

/// State rebuilt from the data file.
struct Recovered {
    snapshot: Snapshot,
    model: Option<Model>,
    last_seq: u64,
}

/// Replays all committed transactions and cuts off anything after the last
/// commit frame.
fn recover(backend: &mut dyn StorageBackend) -> EngineResult<Recovered> {
    let size = backend.size()?;
    let len = usize::try_from(size)
        .map_err(|_| EngineError::file_corrupt("Data file too large for this platform"))?;
    let data = backend.read_at(0, len)?;
    check_file_header(&data)?;

    let mut recovered = Recovered {
        snapshot: Snapshot::default(),
        model: None,
        last_seq: 0,
    };
    let mut batch: Vec<(Frame, usize)> = Vec::new();
    let mut pos = FILE_HEADER_SIZE;
    let mut committed_end = pos;

    while pos < data.len() {
        let (frame, frame_len) = match Frame::decode(&data[pos..]) {
            Ok(decoded) => decoded,
            Err(err) => {
                warn!(offset = pos, error = %err, "stopping recovery at unreadable frame");
                break;
            }
        };

        if frame.kind == FrameKind::Commit {
            if batch.iter().any(|(f, _)| f.seq != frame.seq) {
                warn!(offset = pos, seq = frame.seq, "commit frame does not match its entries");
                break;
            }
            for (entry, at) in batch.drain(..) {
                apply_frame(&mut recovered, &entry, at)?;
            }
            recovered.last_seq = recovered.last_seq.max(frame.seq);
            committed_end = pos + frame_len;
        } else {
            batch.push((frame, pos));
        }
        pos += frame_len;
    }

    if committed_end < data.len() {
        warn!(
            dropped = data.len() - committed_end,
            "truncating uncommitted tail of data file"
        );
        backend.truncate(committed_end as u64)?;
    }
    Ok(recovered)
}

fn apply_frame(recovered: &mut Recovered, frame: &Frame, at: usize) -> EngineResult<()> {
    let snapshot = &mut recovered.snapshot;
    match frame.kind {
        FrameKind::Model => recovered.model = Some(Model::from_bytes(&frame.payload)?),
        FrameKind::Put => {
            let (entity, id) = frame.entity_and_id()?;
            let len = frame.payload.len() - 12;
            snapshot.apply_put(
                entity,
                id,
                RecordPtr {
                    offset: (at + Frame::PUT_RECORD_OFFSET) as u64,
                    len: len as u32,
                },
            );
        }
        FrameKind::Remove => {
            let (entity, id) = frame.entity_and_id()?;
            snapshot.apply_remove(entity, id);
        }
        FrameKind::Sequence => {
            let (entity, value) = frame.entity_and_id()?;
            snapshot.apply_sequence(entity, value);
        }
        FrameKind::Link | FrameKind::Unlink => {
            let (relation, source, target) = frame.relation_row()?;
            snapshot.apply_link(relation, source, target, frame.kind == FrameKind::Link);
        }
        FrameKind::Commit => {}
    }
    Ok(())
}

/// Handle to an open store.
///
/// Cloning is cheap; all clones share the same store. The directory lock is
/// released when the last clone and the last transaction are dropped.
#[derive(Clone)]
pub struct Engine {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("directory", &self.directory())
            .field("max_bytes", &self.shared.max_bytes)
            .field("active_readers", &self.active_readers())
            .finish_non_exhaustive()
    }
}

impl Engine {
    /// Opens or creates the store in `directory`.
    ///
    /// The directory is created if missing; its parent must exist. `model` is
    /// merged into the stored model.
    ///
    /// # Errors
    ///
    /// Returns storage-general errors carrying the path and OS error text
    /// when the directory or data file is unusable, illegal-state if another
    /// handle holds the directory, and schema or corruption errors from the
    /// stored data.
    pub fn open(directory: &Path, options: &EngineOptions, model: Model) -> EngineResult<Self> {
        model.validate()?;
        let dir = StoreDir::open(directory, options.file_mode)?;
        let data_path = dir.data_path();
        let backend =
            FileBackend::open_with(&data_path, options.file_mode, Some(options.max_size_bytes()))
                .map_err(|err| match err {
                    StorageError::Io(io) => EngineError::storage_general(format!(
                        "Could not open data file {} ({})",
                        data_path.display(),
                        os_error_text(&io)
                    )),
                    other => other.into(),
                })?;
        Self::open_with_backend(Some(dir), Box::new(backend), options, model)
    }

    /// Opens a store that lives only in memory.
    ///
    /// # Errors
    ///
    /// Returns a schema error if `model` is inconsistent.
    pub fn open_in_memory(options: &EngineOptions, model: Model) -> EngineResult<Self> {
        model.validate()?;
        let backend = InMemoryBackend::with_limit(options.max_size_bytes());
        Self::open_with_backend(None, Box::new(backend), options, model)
    }

    fn open_with_backend(
        dir: Option<StoreDir>,
        mut backend: Box<dyn StorageBackend>,
        options: &EngineOptions,
        declared: Model,
    ) -> EngineResult<Self> {
        let recovered = if backend.size()? == 0 {
            append_or_rollback(&mut *backend, &file_header(), "Could not put")?;
            Recovered {
                snapshot: Snapshot::default(),
                model: None,
                last_seq: 0,
            }
        } else {
            recover(&mut *backend)?
        };

        let model = match &recovered.model {
            Some(stored) => Model::merge(stored, &declared)?,
            None => declared,
        };

        let mut last_seq = recovered.last_seq;
        if recovered.model.as_ref() != Some(&model) {
            last_seq += 1;
            let mut buf = Frame::model(last_seq, model.to_bytes()?).encode();
            buf.extend_from_slice(&Frame::commit(last_seq).encode());
            append_or_rollback(&mut *backend, &buf, "Could not put")?;
            if options.sync_on_commit {
                backend.sync()?;
            }
        }

        let shared = Shared {
            dir,
            backend: RwLock::new(backend),
            committed: RwLock::new(Arc::new(recovered.snapshot)),
            model,
            options: options.clone(),
            max_bytes: options.max_size_bytes(),
            readers: ReaderSlots::new(options.effective_max_readers()),
            writer: WriterGate::default(),
            next_seq: AtomicU64::new(last_seq + 1),
        };
        let engine = Self {
            shared: Arc::new(shared),
        };
        debug!(
            directory = ?engine.directory(),
            entities = engine.shared.model.entities.len(),
            max_readers = engine.max_readers(),
            "store opened"
        );
        Ok(engine)
    }

    /// Begins a read-only transaction.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::MaxReadersExceeded`] immediately when all reader
    /// slots are taken.
    pub fn begin_read(&self) -> EngineResult<Txn> {
        let thread = thread::current().id();
        self.shared.readers.acquire(thread)?;
        let snapshot = Arc::clone(&*self.shared.committed.read());
        Ok(Txn::new(
            Arc::clone(&self.shared),
            TxnMode::Read,
            snapshot,
            thread,
        ))
    }

    /// Begins a read-write transaction, blocking while another one is open.
    ///
    /// # Errors
    ///
    /// Returns illegal-state if this thread already has a transaction open
    /// that would deadlock, or if the configured write timeout elapses.
    pub fn begin_write(&self) -> EngineResult<Txn> {
        let thread = thread::current().id();
        if self.shared.readers.held_by(thread) {
            return Err(EngineError::illegal_state(
                "Cannot start a write transaction inside a read only transaction",
            ));
        }
        self.shared.writer.acquire(self.shared.options.write_timeout)?;
        let snapshot = Arc::clone(&*self.shared.committed.read());
        Ok(Txn::new(
            Arc::clone(&self.shared),
            TxnMode::Write,
            snapshot,
            thread,
        ))
    }

    /// Compiles `condition` into a plan for `entity`.
    ///
    /// # Errors
    ///
    /// See [`QueryPlan::compile`].
    pub fn compile(&self, entity: u32, condition: &PlanCondition) -> EngineResult<QueryPlan> {
        QueryPlan::compile(&self.shared.model, entity, condition)
    }

    /// Returns the effective model: stored and declared merged.
    #[must_use]
    pub fn model(&self) -> &Model {
        &self.shared.model
    }

    /// Returns the store directory, or `None` for in-memory stores.
    #[must_use]
    pub fn directory(&self) -> Option<&Path> {
        self.shared.dir.as_ref().map(StoreDir::path)
    }

    /// Returns the number of currently open read transactions.
    #[must_use]
    pub fn active_readers(&self) -> u32 {
        self.shared.readers.active()
    }

    /// Returns the reader bound.
    #[must_use]
    pub fn max_readers(&self) -> u32 {
        self.shared.readers.max()
    }

    /// Returns the current size of the data file in bytes.
    ///
    /// # Errors
    ///
    /// Fails if the size cannot be determined.
    pub fn size(&self) -> EngineResult<u64> {
        self.shared.size()
    }

    /// Returns the size limit in bytes.
    #[must_use]
    pub fn max_size_bytes(&self) -> u64 {
        self.shared.max_bytes
    }
}
