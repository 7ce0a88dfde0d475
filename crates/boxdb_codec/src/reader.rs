//! Record decoding.

use crate::error::{CodecError, CodecResult};
use crate::types::{PropertyFlags, PropertyType};
use crate::value::Value;
use crate::{HEADER_SIZE, INLINE_MARKER};

/// Read-only view over an encoded record.
///
/// All `read_*` methods return `Ok(None)` for absent fields, including
/// offsets beyond the record's vtable (properties added after the record was
/// written).
#[derive(Debug, Clone, Copy)]
pub struct RecordReader<'a> {
    bytes: &'a [u8],
    vtable_len: usize,
    inline_len: usize,
}

macro_rules! read_scalar {
    ($(#[$doc:meta] $name:ident, $ty:ty;)*) => {
        $(
            #[$doc]
            ///
            /// # Errors
            ///
            /// Fails on an invalid offset or a field outside the record.
            pub fn $name(&self, offset: u16) -> CodecResult<Option<$ty>> {
                const WIDTH: usize = std::mem::size_of::<$ty>();
                Ok(self
                    .field(offset, WIDTH)?
                    .map(|raw| <$ty>::from_le_bytes(fixed::<WIDTH>(raw))))
            }
        )*
    };
}

impl<'a> RecordReader<'a> {
    /// Validates the record header and creates a reader.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::InvalidHeader`] for malformed records.
    pub fn new(bytes: &'a [u8]) -> CodecResult<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(CodecError::invalid_header("record shorter than its header"));
        }
        let vtable_len = usize::from(u16::from_le_bytes([bytes[0], bytes[1]]));
        let inline_len = usize::from(u16::from_le_bytes([bytes[2], bytes[3]]));

        if vtable_len < HEADER_SIZE || vtable_len % 2 != 0 {
            return Err(CodecError::invalid_header(format!(
                "bad vtable length {vtable_len}"
            )));
        }
        if inline_len < 4 || vtable_len + inline_len > bytes.len() {
            return Err(CodecError::invalid_header(format!(
                "bad inline length {inline_len} for a {} byte record",
                bytes.len()
            )));
        }
        let marker = u32::from_le_bytes(fixed::<4>(&bytes[vtable_len..vtable_len + 4]));
        if marker != INLINE_MARKER {
            return Err(CodecError::invalid_header("missing inline marker"));
        }

        Ok(Self {
            bytes,
            vtable_len,
            inline_len,
        })
    }

    /// Returns the raw record bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &'a [u8] {
        self.bytes
    }

    /// Returns true if a value is stored at `offset`.
    ///
    /// # Errors
    ///
    /// Fails on an invalid offset.
    pub fn is_present(&self, offset: u16) -> CodecResult<bool> {
        Ok(self.slot(offset)?.is_some())
    }

    /// Reads a boolean.
    ///
    /// # Errors
    ///
    /// Fails on an invalid offset or a field outside the record.
    pub fn read_bool(&self, offset: u16) -> CodecResult<Option<bool>> {
        Ok(self.field(offset, 1)?.map(|raw| raw[0] != 0))
    }

    read_scalar! {
        /// Reads a signed 8-bit integer.
        read_i8, i8;
        /// Reads an unsigned 8-bit integer.
        read_u8, u8;
        /// Reads a signed 16-bit integer.
        read_i16, i16;
        /// Reads an unsigned 16-bit integer.
        read_u16, u16;
        /// Reads a signed 32-bit integer.
        read_i32, i32;
        /// Reads an unsigned 32-bit integer.
        read_u32, u32;
        /// Reads a signed 64-bit integer.
        read_i64, i64;
        /// Reads an unsigned 64-bit integer.
        read_u64, u64;
        /// Reads a 32-bit float.
        read_f32, f32;
        /// Reads a 64-bit float.
        read_f64, f64;
    }

    /// Reads a byte sequence without copying.
    ///
    /// # Errors
    ///
    /// Fails on an invalid offset or a data entry outside the record.
    pub fn read_bytes(&self, offset: u16) -> CodecResult<Option<&'a [u8]>> {
        let Some(raw) = self.field(offset, 4)? else {
            return Ok(None);
        };
        let start = u32::from_le_bytes(fixed::<4>(raw)) as usize;
        let len_bytes = self.range(start, 4)?;
        let len = u32::from_le_bytes(fixed::<4>(len_bytes)) as usize;
        self.range(start + 4, len).map(Some)
    }

    /// Reads a string without copying.
    ///
    /// # Errors
    ///
    /// Fails on an invalid offset, a data entry outside the record, or
    /// invalid UTF-8.
    pub fn read_str(&self, offset: u16) -> CodecResult<Option<&'a str>> {
        match self.read_bytes(offset)? {
            Some(raw) => std::str::from_utf8(raw)
                .map(Some)
                .map_err(|_| CodecError::InvalidUtf8 { offset }),
            None => Ok(None),
        }
    }

    /// Reads a field as a dynamic [`Value`] according to its storage type.
    ///
    /// Integers with the `UNSIGNED` flag, and relation ids, are zero-extended
    /// into [`Value::UInt`]; other integers and dates are sign-extended into
    /// [`Value::Int`].
    ///
    /// # Errors
    ///
    /// Fails like the typed readers.
    pub fn value(
        &self,
        offset: u16,
        property_type: PropertyType,
        flags: PropertyFlags,
    ) -> CodecResult<Option<Value>> {
        let unsigned = flags.contains(PropertyFlags::UNSIGNED);
        let value = match property_type {
            PropertyType::Bool => self.read_bool(offset)?.map(Value::Bool),
            PropertyType::Byte if unsigned => self.read_u8(offset)?.map(|v| Value::UInt(v.into())),
            PropertyType::Byte => self.read_i8(offset)?.map(|v| Value::Int(v.into())),
            PropertyType::Short if unsigned => {
                self.read_u16(offset)?.map(|v| Value::UInt(v.into()))
            }
            PropertyType::Short => self.read_i16(offset)?.map(|v| Value::Int(v.into())),
            PropertyType::Int if unsigned => self.read_u32(offset)?.map(|v| Value::UInt(v.into())),
            PropertyType::Int => self.read_i32(offset)?.map(|v| Value::Int(v.into())),
            PropertyType::Long if unsigned => self.read_u64(offset)?.map(Value::UInt),
            PropertyType::Relation => self.read_u64(offset)?.map(Value::UInt),
            PropertyType::Long | PropertyType::Date => self.read_i64(offset)?.map(Value::Int),
            PropertyType::Float => self.read_f32(offset)?.map(|v| Value::Float(v.into())),
            PropertyType::Double => self.read_f64(offset)?.map(Value::Float),
            PropertyType::String => self.read_str(offset)?.map(|v| Value::String(v.to_owned())),
            PropertyType::ByteVector => self.read_bytes(offset)?.map(|v| Value::Bytes(v.to_vec())),
        };
        Ok(value)
    }

    /// Looks up the inline position stored for `offset`.
    fn slot(&self, offset: u16) -> CodecResult<Option<usize>> {
        let at = usize::from(offset);
        if at < HEADER_SIZE || offset % 2 != 0 {
            return Err(CodecError::InvalidOffset { offset });
        }
        if at + 2 > self.vtable_len {
            return Ok(None);
        }
        let position = usize::from(u16::from_le_bytes([self.bytes[at], self.bytes[at + 1]]));
        Ok((position != 0).then_some(position))
    }

    fn field(&self, offset: u16, width: usize) -> CodecResult<Option<&'a [u8]>> {
        let Some(position) = self.slot(offset)? else {
            return Ok(None);
        };
        if position < 4 || position + width > self.inline_len {
            return Err(CodecError::Truncated {
                position: self.vtable_len + position,
                needed: width,
                len: self.bytes.len(),
            });
        }
        let start = self.vtable_len + position;
        Ok(Some(&self.bytes[start..start + width]))
    }

    fn range(&self, start: usize, len: usize) -> CodecResult<&'a [u8]> {
        let data_start = self.vtable_len + self.inline_len;
        match start.checked_add(len) {
            Some(end) if start >= data_start && end <= self.bytes.len() => {
                Ok(&self.bytes[start..end])
            }
            _ => Err(CodecError::Truncated {
                position: start,
                needed: len,
                len: self.bytes.len(),
            }),
        }
    }
}

fn fixed<const N: usize>(raw: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&raw[..N]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::RecordBuilder;
    use crate::types::property_offset;
    use proptest::prelude::*;

    fn sample() -> Vec<u8> {
        let mut builder = RecordBuilder::new();
        builder.put_u64(property_offset(1), 42).unwrap();
        builder.put_str(property_offset(2), "writing notes").unwrap();
        builder.put_i32(property_offset(3), -7).unwrap();
        builder.put_bool(property_offset(5), false).unwrap();
        builder.put_bytes(property_offset(6), &[1, 2, 3]).unwrap();
        builder.finish().unwrap()
    }

    #[test]
    fn reads_back_written_fields() {
        let bytes = sample();
        let reader = RecordReader::new(&bytes).unwrap();

        assert_eq!(reader.read_u64(property_offset(1)).unwrap(), Some(42));
        assert_eq!(
            reader.read_str(property_offset(2)).unwrap(),
            Some("writing notes")
        );
        assert_eq!(reader.read_i32(property_offset(3)).unwrap(), Some(-7));
        assert_eq!(reader.read_bool(property_offset(5)).unwrap(), Some(false));
        assert_eq!(
            reader.read_bytes(property_offset(6)).unwrap(),
            Some(&[1u8, 2, 3][..])
        );
    }

    #[test]
    fn absent_fields_read_as_none() {
        let bytes = sample();
        let reader = RecordReader::new(&bytes).unwrap();

        // Gap inside the vtable.
        assert_eq!(reader.read_i64(property_offset(4)).unwrap(), None);
        // Beyond the vtable, e.g. a property added later.
        assert_eq!(reader.read_str(property_offset(40)).unwrap(), None);
        assert!(!reader.is_present(property_offset(4)).unwrap());
        assert!(reader.is_present(property_offset(5)).unwrap());
    }

    #[test]
    fn empty_record_is_valid() {
        let bytes = RecordBuilder::new().finish().unwrap();
        let reader = RecordReader::new(&bytes).unwrap();
        assert_eq!(reader.read_u64(property_offset(1)).unwrap(), None);
    }

    #[test]
    fn last_write_wins() {
        let mut builder = RecordBuilder::new();
        builder.put_str(property_offset(1), "first").unwrap();
        builder.put_str(property_offset(1), "second").unwrap();
        let bytes = builder.finish().unwrap();

        let reader = RecordReader::new(&bytes).unwrap();
        assert_eq!(reader.read_str(property_offset(1)).unwrap(), Some("second"));
    }

    #[test]
    fn invalid_offsets_are_rejected() {
        let mut builder = RecordBuilder::new();
        assert_eq!(
            builder.put_i32(3, 1),
            Err(CodecError::InvalidOffset { offset: 3 })
        );
        assert_eq!(
            builder.put_i32(2, 1),
            Err(CodecError::InvalidOffset { offset: 2 })
        );

        let bytes = sample();
        let reader = RecordReader::new(&bytes).unwrap();
        assert!(reader.read_i32(7).is_err());
    }

    #[test]
    fn malformed_headers_are_rejected() {
        assert!(RecordReader::new(&[]).is_err());
        assert!(RecordReader::new(&[3, 0, 4, 0]).is_err());

        let mut bytes = sample();
        bytes.truncate(6);
        assert!(matches!(
            RecordReader::new(&bytes),
            Err(CodecError::InvalidHeader { .. })
        ));
    }

    #[test]
    fn corrupt_string_pointer_is_detected() {
        let mut bytes = sample();
        let len = bytes.len();
        // Cut the data area short so the byte vector entry no longer fits.
        bytes.truncate(len - 2);
        let reader = RecordReader::new(&bytes).unwrap();
        assert!(matches!(
            reader.read_bytes(property_offset(6)),
            Err(CodecError::Truncated { .. })
        ));
    }

    #[test]
    fn dynamic_values_respect_sign_flag() {
        let mut builder = RecordBuilder::new();
        builder.put_u8(property_offset(1), 200).unwrap();
        builder.put_i8(property_offset(2), -56).unwrap();
        builder.put_u64(property_offset(3), 9).unwrap();
        let bytes = builder.finish().unwrap();
        let reader = RecordReader::new(&bytes).unwrap();

        assert_eq!(
            reader
                .value(property_offset(1), PropertyType::Byte, PropertyFlags::UNSIGNED)
                .unwrap(),
            Some(Value::UInt(200))
        );
        assert_eq!(
            reader
                .value(property_offset(2), PropertyType::Byte, PropertyFlags::NONE)
                .unwrap(),
            Some(Value::Int(-56))
        );
        assert_eq!(
            reader
                .value(property_offset(3), PropertyType::Relation, PropertyFlags::NONE)
                .unwrap(),
            Some(Value::UInt(9))
        );
    }

    proptest! {
        #[test]
        fn arbitrary_fields_survive(
            ints in proptest::collection::btree_map(1u16..64, any::<i64>(), 0..16),
            text in ".{0,64}",
        ) {
            let mut builder = RecordBuilder::new();
            for (&id, &value) in &ints {
                builder.put_i64(property_offset(id), value).unwrap();
            }
            builder.put_str(property_offset(100), &text).unwrap();
            let bytes = builder.finish().unwrap();

            let reader = RecordReader::new(&bytes).unwrap();
            for id in 1u16..64 {
                prop_assert_eq!(reader.read_i64(property_offset(id)).unwrap(), ints.get(&id).copied());
            }
            prop_assert_eq!(reader.read_str(property_offset(100)).unwrap(), Some(text.as_str()));
        }

        #[test]
        fn garbage_never_panics(bytes in proptest::collection::vec(any::<u8>(), 0..128)) {
            if let Ok(reader) = RecordReader::new(&bytes) {
                for id in 1u16..16 {
                    let _ = reader.read_str(property_offset(id));
                    let _ = reader.read_u64(property_offset(id));
                }
            }
        }
    }
}
