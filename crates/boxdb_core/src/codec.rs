//! Typed codec: reading and writing entity fields at property offsets.

use crate::entity::Entity;
use crate::error::{BoxError, BoxResult};
use crate::id::Id;
use crate::relation::ToOne;
use crate::schema::PropertyDescriptor;
use boxdb_codec::{PropertyType, RecordBuilder, RecordReader, Value, PLATFORM_INT};
use chrono::{DateTime, Utc};

/// A Rust type that can be stored in a property.
///
/// Absent fields read as [`Default::default`] through
/// [`EntityReader::read`], so every field type has a zero value.
pub trait FieldValue: Default + Sized {
    /// Storage type this Rust type maps to.
    const TYPE: PropertyType;

    /// Returns true if a property of `property_type` can hold this type.
    fn accepts(property_type: PropertyType) -> bool {
        property_type == Self::TYPE
    }

    /// Writes the value at `offset`.
    ///
    /// # Errors
    ///
    /// Fails if the record cannot take the value.
    fn write_to(&self, builder: &mut RecordBuilder, offset: u16) -> BoxResult<()>;

    /// Reads the value at `offset`, or `None` if absent.
    ///
    /// # Errors
    ///
    /// Fails if the stored bytes cannot be decoded as this type.
    fn read_from(reader: &RecordReader<'_>, offset: u16) -> BoxResult<Option<Self>>;

    /// Converts the value into a query operand.
    fn to_value(&self) -> Value;
}

macro_rules! scalar_field {
    ($($ty:ty => $pt:ident, $put:ident, $read:ident, $variant:ident;)*) => {
        $(
            impl FieldValue for $ty {
                const TYPE: PropertyType = PropertyType::$pt;

                fn write_to(&self, builder: &mut RecordBuilder, offset: u16) -> BoxResult<()> {
                    Ok(builder.$put(offset, *self)?)
                }

                fn read_from(reader: &RecordReader<'_>, offset: u16) -> BoxResult<Option<Self>> {
                    Ok(reader.$read(offset)?)
                }

                fn to_value(&self) -> Value {
                    Value::$variant((*self).into())
                }
            }
        )*
    };
}

scalar_field! {
    bool => Bool, put_bool, read_bool, Bool;
    i8 => Byte, put_i8, read_i8, Int;
    u8 => Byte, put_u8, read_u8, UInt;
    i16 => Short, put_i16, read_i16, Int;
    u16 => Short, put_u16, read_u16, UInt;
    i32 => Int, put_i32, read_i32, Int;
    u32 => Int, put_u32, read_u32, UInt;
    i64 => Long, put_i64, read_i64, Int;
    u64 => Long, put_u64, read_u64, UInt;
    f32 => Float, put_f32, read_f32, Float;
    f64 => Double, put_f64, read_f64, Float;
}

impl FieldValue for isize {
    const TYPE: PropertyType = PLATFORM_INT;

    fn write_to(&self, builder: &mut RecordBuilder, offset: u16) -> BoxResult<()> {
        if Self::TYPE == PropertyType::Int {
            let narrow = i32::try_from(*self)
                .map_err(|_| BoxError::illegal_argument(format!("{self} does not fit in 32 bits")))?;
            Ok(builder.put_i32(offset, narrow)?)
        } else {
            Ok(builder.put_i64(offset, *self as i64)?)
        }
    }

    fn read_from(reader: &RecordReader<'_>, offset: u16) -> BoxResult<Option<Self>> {
        let wide = if Self::TYPE == PropertyType::Int {
            reader.read_i32(offset)?.map(i64::from)
        } else {
            reader.read_i64(offset)?
        };
        wide.map(|v| {
            Self::try_from(v).map_err(|_| {
                BoxError::FileCorrupt {
                    message: format!("Stored value {v} does not fit a platform integer"),
                }
            })
        })
        .transpose()
    }

    fn to_value(&self) -> Value {
        Value::Int(*self as i64)
    }
}

impl FieldValue for usize {
    const TYPE: PropertyType = PLATFORM_INT;

    fn write_to(&self, builder: &mut RecordBuilder, offset: u16) -> BoxResult<()> {
        if Self::TYPE == PropertyType::Int {
            let narrow = u32::try_from(*self)
                .map_err(|_| BoxError::illegal_argument(format!("{self} does not fit in 32 bits")))?;
            Ok(builder.put_u32(offset, narrow)?)
        } else {
            Ok(builder.put_u64(offset, *self as u64)?)
        }
    }

    fn read_from(reader: &RecordReader<'_>, offset: u16) -> BoxResult<Option<Self>> {
        let wide = if Self::TYPE == PropertyType::Int {
            reader.read_u32(offset)?.map(u64::from)
        } else {
            reader.read_u64(offset)?
        };
        wide.map(|v| {
            Self::try_from(v).map_err(|_| BoxError::FileCorrupt {
                message: format!("Stored value {v} does not fit a platform integer"),
            })
        })
        .transpose()
    }

    fn to_value(&self) -> Value {
        Value::UInt(*self as u64)
    }
}

impl FieldValue for String {
    const TYPE: PropertyType = PropertyType::String;

    fn write_to(&self, builder: &mut RecordBuilder, offset: u16) -> BoxResult<()> {
        Ok(builder.put_str(offset, self)?)
    }

    fn read_from(reader: &RecordReader<'_>, offset: u16) -> BoxResult<Option<Self>> {
        Ok(reader.read_str(offset)?.map(str::to_owned))
    }

    fn to_value(&self) -> Value {
        Value::String(self.clone())
    }
}

impl FieldValue for Vec<u8> {
    const TYPE: PropertyType = PropertyType::ByteVector;

    fn write_to(&self, builder: &mut RecordBuilder, offset: u16) -> BoxResult<()> {
        Ok(builder.put_bytes(offset, self)?)
    }

    fn read_from(reader: &RecordReader<'_>, offset: u16) -> BoxResult<Option<Self>> {
        Ok(reader.read_bytes(offset)?.map(<[u8]>::to_vec))
    }

    fn to_value(&self) -> Value {
        Value::Bytes(self.clone())
    }
}

/// Dates are stored as milliseconds since the Unix epoch.
impl FieldValue for DateTime<Utc> {
    const TYPE: PropertyType = PropertyType::Date;

    fn write_to(&self, builder: &mut RecordBuilder, offset: u16) -> BoxResult<()> {
        Ok(builder.put_i64(offset, self.timestamp_millis())?)
    }

    fn read_from(reader: &RecordReader<'_>, offset: u16) -> BoxResult<Option<Self>> {
        reader
            .read_i64(offset)?
            .map(|millis| {
                DateTime::from_timestamp_millis(millis).ok_or_else(|| BoxError::FileCorrupt {
                    message: format!("Stored date {millis} is out of range"),
                })
            })
            .transpose()
    }

    fn to_value(&self) -> Value {
        Value::Int(self.timestamp_millis())
    }
}

/// Typed ids are stored as unsigned 64-bit values: in the entity's own
/// primary key and in to-one relation properties.
impl<E> FieldValue for Id<E> {
    const TYPE: PropertyType = PropertyType::Relation;

    fn accepts(property_type: PropertyType) -> bool {
        matches!(property_type, PropertyType::Long | PropertyType::Relation)
    }

    fn write_to(&self, builder: &mut RecordBuilder, offset: u16) -> BoxResult<()> {
        Ok(builder.put_u64(offset, self.get())?)
    }

    fn read_from(reader: &RecordReader<'_>, offset: u16) -> BoxResult<Option<Self>> {
        Ok(reader.read_u64(offset)?.map(Id::new))
    }

    fn to_value(&self) -> Value {
        Value::UInt(self.get())
    }
}

fn check_type<V: FieldValue>(property: &PropertyDescriptor) -> BoxResult<()> {
    if V::accepts(property.property_type) {
        Ok(())
    } else {
        Err(BoxError::type_mismatch(format!(
            "Property {} is a {} and cannot hold a {} value",
            property.name,
            property.property_type,
            V::TYPE
        )))
    }
}

/// Builds the record of one entity.
///
/// Fields are written at their property's offset; optional fields that are
/// `None` are left out of the record.
#[derive(Debug, Default)]
pub struct EntityWriter {
    builder: RecordBuilder,
}

impl EntityWriter {
    /// Creates an empty writer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes a field.
    ///
    /// # Errors
    ///
    /// Returns a type mismatch if `V` does not fit the property's type.
    pub fn put<V: FieldValue>(&mut self, property: &PropertyDescriptor, value: &V) -> BoxResult<()> {
        check_type::<V>(property)?;
        value.write_to(&mut self.builder, property.offset())
    }

    /// Writes an optional field; `None` is left out.
    ///
    /// # Errors
    ///
    /// Returns a type mismatch if `V` does not fit the property's type.
    pub fn put_optional<V: FieldValue>(
        &mut self,
        property: &PropertyDescriptor,
        value: &Option<V>,
    ) -> BoxResult<()> {
        check_type::<V>(property)?;
        match value {
            Some(value) => value.write_to(&mut self.builder, property.offset()),
            None => Ok(()),
        }
    }

    /// Writes the target id of a to-one relation; no target is left out.
    ///
    /// An unsaved target must have been put before, otherwise its id is 0
    /// and nothing is written.
    ///
    /// # Errors
    ///
    /// Returns a type mismatch unless the property is a relation.
    pub fn put_to_one<T: Entity>(
        &mut self,
        property: &PropertyDescriptor,
        relation: &ToOne<T>,
    ) -> BoxResult<()> {
        if property.property_type != PropertyType::Relation {
            return Err(BoxError::type_mismatch(format!(
                "Property {} is a {} and cannot hold a to-one relation",
                property.name, property.property_type
            )));
        }
        let target = relation.target_id();
        if target.is_stored() {
            target.write_to(&mut self.builder, property.offset())?;
        }
        Ok(())
    }

    /// Finishes the record.
    ///
    /// # Errors
    ///
    /// Fails if the record exceeds the format's limits.
    pub fn finish(self) -> BoxResult<Vec<u8>> {
        Ok(self.builder.finish()?)
    }
}

/// Reads the fields of one stored entity.
#[derive(Debug, Clone, Copy)]
pub struct EntityReader<'a> {
    record: RecordReader<'a>,
}

impl<'a> EntityReader<'a> {
    /// Wraps an encoded record.
    ///
    /// # Errors
    ///
    /// Returns a corruption error for malformed records.
    pub fn new(bytes: &'a [u8]) -> BoxResult<Self> {
        Ok(Self {
            record: RecordReader::new(bytes)?,
        })
    }

    /// Reads a required field; an absent field reads as the type's zero
    /// value.
    ///
    /// # Errors
    ///
    /// Fails on a type mismatch or undecodable bytes.
    pub fn read<V: FieldValue>(&self, property: &PropertyDescriptor) -> BoxResult<V> {
        Ok(self.read_optional(property)?.unwrap_or_default())
    }

    /// Reads an optional field; an absent field reads as `None`.
    ///
    /// # Errors
    ///
    /// Fails on a type mismatch or undecodable bytes.
    pub fn read_optional<V: FieldValue>(&self, property: &PropertyDescriptor) -> BoxResult<Option<V>> {
        check_type::<V>(property)?;
        V::read_from(&self.record, property.offset())
    }

    /// Reads a to-one relation. The proxy is detached until the owning
    /// entity is attached to a store.
    ///
    /// # Errors
    ///
    /// Fails on a type mismatch or undecodable bytes.
    pub fn read_to_one<T: Entity>(&self, property: &PropertyDescriptor) -> BoxResult<ToOne<T>> {
        let id: Option<Id<T>> = self.read_optional(property)?;
        Ok(id.map_or_else(ToOne::new, ToOne::from_id))
    }

    /// Returns true if a value is stored for `property`.
    ///
    /// # Errors
    ///
    /// Fails on an invalid offset.
    pub fn is_present(&self, property: &PropertyDescriptor) -> BoxResult<bool> {
        Ok(self.record.is_present(property.offset())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use boxdb_codec::PropertyFlags;
    use chrono::TimeZone;
    use proptest::prelude::*;

    const FLAG: PropertyDescriptor = PropertyDescriptor::new(2, "flag", PropertyType::Bool);
    const COUNT: PropertyDescriptor = PropertyDescriptor::new(3, "count", PropertyType::Int);
    const SIZE: PropertyDescriptor = PropertyDescriptor::new(4, "size", PLATFORM_INT);
    const TEXT: PropertyDescriptor = PropertyDescriptor::new(5, "text", PropertyType::String);
    const WHEN: PropertyDescriptor = PropertyDescriptor::new(6, "when", PropertyType::Date);
    const RAW: PropertyDescriptor = PropertyDescriptor::new(7, "raw", PropertyType::ByteVector);
    const HITS: PropertyDescriptor = PropertyDescriptor::new(8, "hits", PropertyType::Long)
        .flags(PropertyFlags::UNSIGNED);

    #[test]
    fn absent_fields_read_as_zero_or_none() {
        let bytes = EntityWriter::new().finish().unwrap();
        let reader = EntityReader::new(&bytes).unwrap();

        assert!(!reader.read::<bool>(&FLAG).unwrap());
        assert_eq!(reader.read::<i32>(&COUNT).unwrap(), 0);
        assert_eq!(reader.read::<String>(&TEXT).unwrap(), "");
        assert_eq!(reader.read::<Vec<u8>>(&RAW).unwrap(), Vec::<u8>::new());
        assert_eq!(
            reader.read::<DateTime<Utc>>(&WHEN).unwrap(),
            DateTime::<Utc>::default()
        );

        assert_eq!(reader.read_optional::<i32>(&COUNT).unwrap(), None);
        assert_eq!(reader.read_optional::<String>(&TEXT).unwrap(), None);
    }

    #[test]
    fn stored_zero_differs_from_absent() {
        let mut writer = EntityWriter::new();
        writer.put(&COUNT, &0i32).unwrap();
        writer.put_optional(&TEXT, &Some(String::new())).unwrap();
        writer.put_optional::<Vec<u8>>(&RAW, &None).unwrap();
        let bytes = writer.finish().unwrap();
        let reader = EntityReader::new(&bytes).unwrap();

        assert_eq!(reader.read_optional::<i32>(&COUNT).unwrap(), Some(0));
        assert_eq!(reader.read_optional::<String>(&TEXT).unwrap(), Some(String::new()));
        assert!(!reader.is_present(&RAW).unwrap());
    }

    #[test]
    fn dates_keep_millisecond_precision() {
        let when = Utc.with_ymd_and_hms(2021, 3, 4, 5, 6, 7).unwrap()
            + chrono::Duration::milliseconds(89);
        let mut writer = EntityWriter::new();
        writer.put(&WHEN, &when).unwrap();
        let bytes = writer.finish().unwrap();

        let reader = EntityReader::new(&bytes).unwrap();
        assert_eq!(reader.read::<DateTime<Utc>>(&WHEN).unwrap(), when);
    }

    #[test]
    fn platform_integers_use_the_platform_width() {
        let mut writer = EntityWriter::new();
        writer.put(&SIZE, &-5isize).unwrap();
        let bytes = writer.finish().unwrap();
        let reader = EntityReader::new(&bytes).unwrap();
        assert_eq!(reader.read::<isize>(&SIZE).unwrap(), -5);
        assert_eq!(reader.read::<usize>(&SIZE).unwrap() as u64 & 0xff, 0xfb);
    }

    #[test]
    fn mismatched_types_are_rejected() {
        let mut writer = EntityWriter::new();
        let err = writer.put(&TEXT, &1i32).unwrap_err();
        assert!(matches!(err, BoxError::PropertyTypeMismatch { .. }));

        let bytes = EntityWriter::new().finish().unwrap();
        let reader = EntityReader::new(&bytes).unwrap();
        assert!(reader.read::<String>(&COUNT).is_err());
    }

    proptest! {
        #[test]
        fn fields_survive_a_write_and_read(
            flag in any::<bool>(),
            count in any::<Option<i32>>(),
            text in any::<Option<String>>(),
            raw in proptest::collection::vec(any::<u8>(), 0..64),
            hits in any::<u64>(),
        ) {
            let mut writer = EntityWriter::new();
            writer.put(&FLAG, &flag).unwrap();
            writer.put_optional(&COUNT, &count).unwrap();
            writer.put_optional(&TEXT, &text).unwrap();
            writer.put(&RAW, &raw).unwrap();
            writer.put(&HITS, &hits).unwrap();
            let bytes = writer.finish().unwrap();

            let reader = EntityReader::new(&bytes).unwrap();
            prop_assert_eq!(reader.read::<bool>(&FLAG).unwrap(), flag);
            prop_assert_eq!(reader.read_optional::<i32>(&COUNT).unwrap(), count);
            prop_assert_eq!(reader.read_optional::<String>(&TEXT).unwrap(), text);
            prop_assert_eq!(reader.read::<Vec<u8>>(&RAW).unwrap(), raw);
            prop_assert_eq!(reader.read::<u64>(&HITS).unwrap(), hits);
        }
    }
}
