//! Data file framing.
//!
//! ```text
//! [magic "BXDB"][u16 version][u16 reserved]        file header
//! [u32 len][u8 kind][u64 seq][payload][u32 crc]    frame, repeated
//! ```
//!
//! `len` counts the whole frame including itself and the CRC. The CRC covers
//! every byte before it. A transaction's frames share its sequence number and
//! only take effect once a `Commit` frame with that number follows them.

use crate::error::{EngineError, EngineResult};

/// File magic.
pub(crate) const MAGIC: &[u8; 4] = b"BXDB";
/// Current data file format version.
pub(crate) const FORMAT_VERSION: u16 = 1;
/// Size of the file header.
pub(crate) const FILE_HEADER_SIZE: usize = 8;

/// Encodes the file header.
pub(crate) fn file_header() -> [u8; FILE_HEADER_SIZE] {
    let mut header = [0u8; FILE_HEADER_SIZE];
    header[..4].copy_from_slice(MAGIC);
    header[4..6].copy_from_slice(&FORMAT_VERSION.to_le_bytes());
    header
}

/// Checks the file header.
pub(crate) fn check_file_header(bytes: &[u8]) -> EngineResult<()> {
    if bytes.len() < FILE_HEADER_SIZE || &bytes[..4] != MAGIC {
        return Err(EngineError::file_corrupt("Invalid data file header"));
    }
    let version = u16::from_le_bytes([bytes[4], bytes[5]]);
    if version != FORMAT_VERSION {
        return Err(EngineError::file_corrupt(format!(
            "Unsupported data file version {version}"
        )));
    }
    Ok(())
}

/// Kind of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FrameKind {
    /// CBOR-encoded model.
    Model = 1,
    /// Record insert or overwrite: entity, id, record bytes.
    Put = 2,
    /// Record removal: entity, id.
    Remove = 3,
    /// Relation row added: relation, source, target.
    Link = 4,
    /// Relation row removed: relation, source, target.
    Unlink = 5,
    /// Id sequence: entity, last assigned id.
    Sequence = 6,
    /// Makes all earlier frames of the same sequence number effective.
    Commit = 7,
}

impl FrameKind {
    fn from_byte(b: u8) -> Option<Self> {
        Some(match b {
            1 => Self::Model,
            2 => Self::Put,
            3 => Self::Remove,
            4 => Self::Link,
            5 => Self::Unlink,
            6 => Self::Sequence,
            7 => Self::Commit,
            _ => return None,
        })
    }
}

/// A decoded frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Frame {
    pub kind: FrameKind,
    pub seq: u64,
    pub payload: Vec<u8>,
}

impl Frame {
    /// len (4) + kind (1) + seq (8)
    pub const HEADER_SIZE: usize = 13;
    /// CRC size.
    pub const CRC_SIZE: usize = 4;
    /// Offset of the record bytes within an encoded put frame.
    pub const PUT_RECORD_OFFSET: usize = Self::HEADER_SIZE + 12;
    /// Encoded size of a commit frame.
    pub const COMMIT_SIZE: usize = Self::HEADER_SIZE + Self::CRC_SIZE;

    /// Encoded size of a frame with the given payload length.
    pub const fn encoded_size(payload_len: usize) -> usize {
        Self::HEADER_SIZE + payload_len + Self::CRC_SIZE
    }

    pub fn commit(seq: u64) -> Self {
        Self {
            kind: FrameKind::Commit,
            seq,
            payload: Vec::new(),
        }
    }

    pub fn model(seq: u64, model: Vec<u8>) -> Self {
        Self {
            kind: FrameKind::Model,
            seq,
            payload: model,
        }
    }

    pub fn put(seq: u64, entity: u32, id: u64, record: &[u8]) -> Self {
        let mut payload = Vec::with_capacity(12 + record.len());
        payload.extend_from_slice(&entity.to_le_bytes());
        payload.extend_from_slice(&id.to_le_bytes());
        payload.extend_from_slice(record);
        Self {
            kind: FrameKind::Put,
            seq,
            payload,
        }
    }

    pub fn remove(seq: u64, entity: u32, id: u64) -> Self {
        let mut payload = Vec::with_capacity(12);
        payload.extend_from_slice(&entity.to_le_bytes());
        payload.extend_from_slice(&id.to_le_bytes());
        Self {
            kind: FrameKind::Remove,
            seq,
            payload,
        }
    }

    pub fn sequence(seq: u64, entity: u32, last_id: u64) -> Self {
        let mut frame = Self::remove(seq, entity, last_id);
        frame.kind = FrameKind::Sequence;
        frame
    }

    pub fn link(seq: u64, relation: u32, source: u64, target: u64, linked: bool) -> Self {
        let mut payload = Vec::with_capacity(20);
        payload.extend_from_slice(&relation.to_le_bytes());
        payload.extend_from_slice(&source.to_le_bytes());
        payload.extend_from_slice(&target.to_le_bytes());
        Self {
            kind: if linked {
                FrameKind::Link
            } else {
                FrameKind::Unlink
            },
            seq,
            payload,
        }
    }

    /// Splits an entity/id payload (put, remove, sequence).
    pub fn entity_and_id(&self) -> EngineResult<(u32, u64)> {
        if self.payload.len() < 12 {
            return Err(EngineError::file_corrupt("Frame payload too short"));
        }
        Ok((read_u32(&self.payload[0..4]), read_u64(&self.payload[4..12])))
    }

    /// Splits a relation payload (link, unlink).
    pub fn relation_row(&self) -> EngineResult<(u32, u64, u64)> {
        if self.payload.len() != 20 {
            return Err(EngineError::file_corrupt("Invalid relation frame"));
        }
        Ok((
            read_u32(&self.payload[0..4]),
            read_u64(&self.payload[4..12]),
            read_u64(&self.payload[12..20]),
        ))
    }

    /// Encodes the frame.
    pub fn encode(&self) -> Vec<u8> {
        let len = Self::encoded_size(self.payload.len());
        let mut buf = Vec::with_capacity(len);
        buf.extend_from_slice(&(len as u32).to_le_bytes());
        buf.push(self.kind as u8);
        buf.extend_from_slice(&self.seq.to_le_bytes());
        buf.extend_from_slice(&self.payload);
        let crc = compute_crc32(&buf);
        buf.extend_from_slice(&crc.to_le_bytes());
        buf
    }

    /// Decodes the frame at the start of `data`, returning it and its length.
    pub fn decode(data: &[u8]) -> EngineResult<(Self, usize)> {
        if data.len() < Self::HEADER_SIZE + Self::CRC_SIZE {
            return Err(EngineError::file_corrupt("Frame too short"));
        }
        let len = read_u32(&data[0..4]) as usize;
        if len < Self::HEADER_SIZE + Self::CRC_SIZE || data.len() < len {
            return Err(EngineError::file_corrupt("Incomplete frame"));
        }

        let stored_crc = read_u32(&data[len - 4..len]);
        let computed_crc = compute_crc32(&data[..len - 4]);
        if stored_crc != computed_crc {
            return Err(EngineError::file_corrupt(format!(
                "Frame checksum mismatch: expected {stored_crc:08x}, got {computed_crc:08x}"
            )));
        }

        let kind = FrameKind::from_byte(data[4])
            .ok_or_else(|| EngineError::file_corrupt(format!("Unknown frame kind {}", data[4])))?;
        let seq = read_u64(&data[5..13]);
        let payload = data[Self::HEADER_SIZE..len - 4].to_vec();

        Ok((Self { kind, seq, payload }, len))
    }
}

fn read_u32(bytes: &[u8]) -> u32 {
    u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

fn read_u64(bytes: &[u8]) -> u64 {
    u64::from_le_bytes([
        bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
    ])
}

/// Computes the IEEE CRC32 of `data`.
pub(crate) fn compute_crc32(data: &[u8]) -> u32 {
    const CRC32_TABLE: [u32; 256] = {
        let mut table = [0u32; 256];
        let mut i = 0;
        while i < 256 {
            let mut crc = i as u32;
            let mut j = 0;
            while j < 8 {
                if crc & 1 != 0 {
                    crc = (crc >> 1) ^ 0xEDB8_8320;
                } else {
                    crc >>= 1;
                }
                j += 1;
            }
            table[i] = crc;
            i += 1;
        }
        table
    };

    let mut crc = 0xFFFF_FFFF_u32;
    for &byte in data {
        let index = ((crc ^ u32::from(byte)) & 0xFF) as usize;
        crc = (crc >> 8) ^ CRC32_TABLE[index];
    }
    !crc
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crc_matches_known_vector() {
        assert_eq!(compute_crc32(b"123456789"), 0xCBF4_3926);
    }

    #[test]
    fn put_frame_places_record_at_fixed_offset() {
        let frame = Frame::put(3, 1, 42, b"record");
        let bytes = frame.encode();
        assert_eq!(
            &bytes[Frame::PUT_RECORD_OFFSET..Frame::PUT_RECORD_OFFSET + 6],
            b"record"
        );

        let (decoded, len) = Frame::decode(&bytes).unwrap();
        assert_eq!(len, bytes.len());
        assert_eq!(decoded, frame);
        assert_eq!(decoded.entity_and_id().unwrap(), (1, 42));
    }

    #[test]
    fn flipped_bit_is_detected() {
        let mut bytes = Frame::link(1, 2, 3, 4, true).encode();
        bytes[15] ^= 0x01;
        assert!(Frame::decode(&bytes).is_err());
    }

    #[test]
    fn truncated_frame_is_incomplete() {
        let bytes = Frame::commit(9).encode();
        assert_eq!(bytes.len(), Frame::COMMIT_SIZE);
        assert!(Frame::decode(&bytes[..bytes.len() - 1]).is_err());
    }

    #[test]
    fn header_round_trip() {
        assert!(check_file_header(&file_header()).is_ok());
        assert!(check_file_header(b"NOPE\x01\x00\x00\x00").is_err());
    }
}
