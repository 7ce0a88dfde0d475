//! Committed snapshots and per-transaction pending writes.

use crate::frame::Frame;
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Location of a committed record's bytes in the data file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RecordPtr {
    pub offset: u64,
    pub len: u32,
}

/// The committed state visible to a transaction.
///
/// Snapshots are immutable once published; a commit builds the next one.
#[derive(Debug, Clone, Default)]
pub(crate) struct Snapshot {
    records: HashMap<u32, BTreeMap<u64, RecordPtr>>,
    links: HashMap<u32, BTreeMap<u64, BTreeSet<u64>>>,
    sequences: HashMap<u32, u64>,
}

impl Snapshot {
    pub fn record(&self, entity: u32, id: u64) -> Option<RecordPtr> {
        self.records.get(&entity)?.get(&id).copied()
    }

    pub fn ids(&self, entity: u32) -> impl Iterator<Item = u64> + '_ {
        self.records
            .get(&entity)
            .into_iter()
            .flat_map(|records| records.keys().copied())
    }

    pub fn targets(&self, relation: u32, source: u64) -> impl Iterator<Item = u64> + '_ {
        self.links
            .get(&relation)
            .and_then(|rows| rows.get(&source))
            .into_iter()
            .flat_map(|targets| targets.iter().copied())
    }

    pub fn sources(&self, relation: u32, target: u64) -> impl Iterator<Item = u64> + '_ {
        self.links
            .get(&relation)
            .into_iter()
            .flat_map(move |rows| {
                rows.iter()
                    .filter(move |(_, targets)| targets.contains(&target))
                    .map(|(source, _)| *source)
            })
    }

    /// Highest id ever assigned for `entity`.
    pub fn sequence(&self, entity: u32) -> u64 {
        self.sequences.get(&entity).copied().unwrap_or(0)
    }

    pub fn apply_put(&mut self, entity: u32, id: u64, ptr: RecordPtr) {
        self.records.entry(entity).or_default().insert(id, ptr);
        self.apply_sequence(entity, id);
    }

    pub fn apply_remove(&mut self, entity: u32, id: u64) {
        if let Some(records) = self.records.get_mut(&entity) {
            records.remove(&id);
        }
    }

    pub fn apply_link(&mut self, relation: u32, source: u64, target: u64, linked: bool) {
        let rows = self.links.entry(relation).or_default();
        if linked {
            rows.entry(source).or_default().insert(target);
        } else if let Some(targets) = rows.get_mut(&source) {
            targets.remove(&target);
            if targets.is_empty() {
                rows.remove(&source);
            }
        }
    }

    pub fn apply_sequence(&mut self, entity: u32, value: u64) {
        let current = self.sequences.entry(entity).or_insert(0);
        *current = (*current).max(value);
    }

    /// Applies a committed transaction whose frames were appended at `base`.
    pub fn apply_pending(&mut self, pending: &Pending, base: u64, placements: &[Placement]) {
        for (&entity, &value) in &pending.sequences {
            self.apply_sequence(entity, value);
        }
        for placement in placements {
            match placement.record {
                Some((offset, len)) => self.apply_put(
                    placement.entity,
                    placement.id,
                    RecordPtr {
                        offset: base + offset as u64,
                        len,
                    },
                ),
                None => self.apply_remove(placement.entity, placement.id),
            }
        }
        for (&(relation, source, target), &linked) in &pending.links {
            self.apply_link(relation, source, target, linked);
        }
    }
}

/// Where a pending record ended up in an encoded commit buffer.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Placement {
    pub entity: u32,
    pub id: u64,
    /// Offset within the buffer and length of the record bytes, or `None`
    /// for a removal.
    pub record: Option<(usize, u32)>,
}

/// Writes buffered by a write transaction until commit.
#[derive(Debug, Default)]
pub(crate) struct Pending {
    pub records: BTreeMap<(u32, u64), Option<Vec<u8>>>,
    pub links: BTreeMap<(u32, u64, u64), bool>,
    pub sequences: BTreeMap<u32, u64>,
    /// Encoded size of all frames the commit will write, without the commit
    /// frame itself.
    pub bytes: u64,
}

const ENTITY_ID_PAYLOAD: usize = 12;
const LINK_PAYLOAD: usize = 20;

impl Pending {
    pub fn is_empty(&self) -> bool {
        self.records.is_empty() && self.links.is_empty() && self.sequences.is_empty()
    }

    pub fn record_frame_size(write: Option<&[u8]>) -> u64 {
        let payload = ENTITY_ID_PAYLOAD + write.map_or(0, <[u8]>::len);
        Frame::encoded_size(payload) as u64
    }

    pub fn link_frame_size() -> u64 {
        Frame::encoded_size(LINK_PAYLOAD) as u64
    }

    pub fn sequence_frame_size() -> u64 {
        Frame::encoded_size(ENTITY_ID_PAYLOAD) as u64
    }

    /// Bytes the pending set would occupy after writing `write` for the key.
    pub fn bytes_with_record(&self, entity: u32, id: u64, write: Option<&[u8]>) -> u64 {
        let replaced = self
            .records
            .get(&(entity, id))
            .map_or(0, |old| Self::record_frame_size(old.as_deref()));
        self.bytes - replaced + Self::record_frame_size(write)
    }

    pub fn set_record(&mut self, entity: u32, id: u64, write: Option<Vec<u8>>) {
        self.bytes = self.bytes_with_record(entity, id, write.as_deref());
        self.records.insert((entity, id), write);
    }

    pub fn set_link(&mut self, relation: u32, source: u64, target: u64, linked: bool) {
        if self.links.insert((relation, source, target), linked).is_none() {
            self.bytes += Self::link_frame_size();
        }
    }

    pub fn set_sequence(&mut self, entity: u32, value: u64) {
        if self.sequences.insert(entity, value).is_none() {
            self.bytes += Self::sequence_frame_size();
        }
    }

    /// Encodes all frames of the transaction followed by its commit frame.
    pub fn encode(&self, seq: u64) -> (Vec<u8>, Vec<Placement>) {
        let mut buf = Vec::with_capacity(self.bytes as usize + Frame::COMMIT_SIZE);
        let mut placements = Vec::with_capacity(self.records.len());

        for (&entity, &value) in &self.sequences {
            buf.extend_from_slice(&Frame::sequence(seq, entity, value).encode());
        }
        for (&(entity, id), write) in &self.records {
            let record = match write {
                Some(bytes) => {
                    let at = buf.len() + Frame::PUT_RECORD_OFFSET;
                    buf.extend_from_slice(&Frame::put(seq, entity, id, bytes).encode());
                    Some((at, bytes.len() as u32))
                }
                None => {
                    buf.extend_from_slice(&Frame::remove(seq, entity, id).encode());
                    None
                }
            };
            placements.push(Placement { entity, id, record });
        }
        for (&(relation, source, target), &linked) in &self.links {
            buf.extend_from_slice(&Frame::link(seq, relation, source, target, linked).encode());
        }
        buf.extend_from_slice(&Frame::commit(seq).encode());

        (buf, placements)
    }
}
