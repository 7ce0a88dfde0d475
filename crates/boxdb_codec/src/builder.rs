//! Record encoding.

use crate::error::{CodecError, CodecResult};
use crate::{HEADER_SIZE, INLINE_MARKER};
use bytes::{BufMut, BytesMut};
use std::collections::BTreeMap;

/// Builds a record by writing typed values at property offsets.
///
/// Offsets may be written in any order. Writing the same offset twice keeps
/// the last value. Offsets that are never written are absent in the result.
#[derive(Debug)]
pub struct RecordBuilder {
    /// Property offset -> position in the inline area.
    slots: BTreeMap<u16, u16>,
    inline: BytesMut,
    /// Inline pointer position -> out-of-line content.
    blobs: Vec<(usize, Vec<u8>)>,
}

impl Default for RecordBuilder {
    fn default() -> Self {
        Self::new()
    }
}

macro_rules! put_scalar {
    ($(#[$doc:meta] $name:ident, $ty:ty, $put:ident;)*) => {
        $(
            #[$doc]
            ///
            /// # Errors
            ///
            /// Fails on an invalid offset or when the inline area is full.
            pub fn $name(&mut self, offset: u16, value: $ty) -> CodecResult<()> {
                self.claim(offset, std::mem::size_of::<$ty>())?;
                self.inline.$put(value);
                Ok(())
            }
        )*
    };
}

impl RecordBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        let mut inline = BytesMut::with_capacity(64);
        inline.put_u32_le(INLINE_MARKER);
        Self {
            slots: BTreeMap::new(),
            inline,
            blobs: Vec::new(),
        }
    }

    /// Writes a boolean.
    ///
    /// # Errors
    ///
    /// Fails on an invalid offset or when the inline area is full.
    pub fn put_bool(&mut self, offset: u16, value: bool) -> CodecResult<()> {
        self.claim(offset, 1)?;
        self.inline.put_u8(u8::from(value));
        Ok(())
    }

    put_scalar! {
        /// Writes a signed 8-bit integer.
        put_i8, i8, put_i8;
        /// Writes an unsigned 8-bit integer.
        put_u8, u8, put_u8;
        /// Writes a signed 16-bit integer.
        put_i16, i16, put_i16_le;
        /// Writes an unsigned 16-bit integer.
        put_u16, u16, put_u16_le;
        /// Writes a signed 32-bit integer.
        put_i32, i32, put_i32_le;
        /// Writes an unsigned 32-bit integer.
        put_u32, u32, put_u32_le;
        /// Writes a signed 64-bit integer.
        put_i64, i64, put_i64_le;
        /// Writes an unsigned 64-bit integer.
        put_u64, u64, put_u64_le;
        /// Writes a 32-bit float.
        put_f32, f32, put_f32_le;
        /// Writes a 64-bit float.
        put_f64, f64, put_f64_le;
    }

    /// Writes a string.
    ///
    /// # Errors
    ///
    /// Fails on an invalid offset or when the inline area is full.
    pub fn put_str(&mut self, offset: u16, value: &str) -> CodecResult<()> {
        self.put_bytes(offset, value.as_bytes())
    }

    /// Writes a byte sequence.
    ///
    /// # Errors
    ///
    /// Fails on an invalid offset or when the inline area is full.
    pub fn put_bytes(&mut self, offset: u16, value: &[u8]) -> CodecResult<()> {
        let position = self.claim(offset, 4)?;
        self.inline.put_u32_le(0);
        self.blobs.push((position, value.to_vec()));
        Ok(())
    }

    /// Returns true if nothing has been written yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Finishes the record and returns its bytes.
    ///
    /// # Errors
    ///
    /// Fails if the data area would exceed 4 GiB.
    pub fn finish(self) -> CodecResult<Vec<u8>> {
        let Self {
            slots,
            mut inline,
            blobs,
        } = self;

        let vtable_len = slots
            .keys()
            .next_back()
            .map_or(HEADER_SIZE, |&offset| usize::from(offset) + 2);
        let inline_len = inline.len();
        let data_start = vtable_len + inline_len;
        let data_len: usize = blobs.iter().map(|(_, blob)| 4 + blob.len()).sum();

        if u32::try_from(data_start + data_len).is_err() {
            return Err(CodecError::too_large("data area exceeds 4 GiB"));
        }

        let mut cursor = data_start;
        for (position, blob) in &blobs {
            inline[*position..*position + 4].copy_from_slice(&(cursor as u32).to_le_bytes());
            cursor += 4 + blob.len();
        }

        let mut out = Vec::with_capacity(data_start + data_len);
        out.extend_from_slice(&(vtable_len as u16).to_le_bytes());
        out.extend_from_slice(&(inline_len as u16).to_le_bytes());
        out.resize(vtable_len, 0);
        for (offset, position) in slots {
            let at = usize::from(offset);
            out[at..at + 2].copy_from_slice(&position.to_le_bytes());
        }
        out.extend_from_slice(&inline);
        for (_, blob) in blobs {
            out.extend_from_slice(&(blob.len() as u32).to_le_bytes());
            out.extend_from_slice(&blob);
        }

        Ok(out)
    }

    /// Reserves `width` inline bytes for `offset` and returns their position.
    fn claim(&mut self, offset: u16, width: usize) -> CodecResult<usize> {
        if usize::from(offset) < HEADER_SIZE || offset % 2 != 0 || offset > u16::MAX - 3 {
            return Err(CodecError::InvalidOffset { offset });
        }
        let position = self.inline.len();
        if position + width > usize::from(u16::MAX) {
            return Err(CodecError::too_large("inline area exceeds 64 KiB"));
        }
        self.slots.insert(offset, position as u16);
        Ok(position)
    }
}
