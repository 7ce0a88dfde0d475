//! Fixture entities with hand-written bindings.
//!
//! | Entity   | id | Relations                                  |
//! |----------|----|--------------------------------------------|
//! | Author   | 1  | `notes`: backlink of `Note.author`         |
//! | Note     | 2  | `author`: to-one                           |
//! | Teacher  | 3  | `students`: standalone relation 1          |
//! | Student  | 4  |                                            |
//! | AllTypes | 5  | one property per supported field type      |

use boxdb_core::{
    BoxResult, Entity, EntityDescriptor, EntityReader, EntityWriter, Id, Property,
    PropertyDescriptor, PropertyFlags, PropertyType, RelationDescriptor, Store, ToMany, ToOne,
    Transaction, TxnTag, PLATFORM_INT,
};
use chrono::{DateTime, Utc};

const ID_FLAGS: PropertyFlags = PropertyFlags::ID.with(PropertyFlags::UNSIGNED);

/// Schema and query handles of [`Author`].
pub mod author {
    use super::*;

    /// Primary key.
    pub const ID_PROPERTY: PropertyDescriptor =
        PropertyDescriptor::new(1, "id", PropertyType::Long).flags(ID_FLAGS);
    /// Name.
    pub const NAME_PROPERTY: PropertyDescriptor =
        PropertyDescriptor::new(2, "name", PropertyType::String);

    /// Entity descriptor.
    pub const ENTITY: EntityDescriptor = EntityDescriptor {
        id: 1,
        name: "Author",
        properties: &[ID_PROPERTY, NAME_PROPERTY],
        relations: &[],
    };

    /// `Author.id`.
    pub const ID: Property<Author, Id<Author>> = Property::new(&ID_PROPERTY);
    /// `Author.name`.
    pub const NAME: Property<Author, String> = Property::new(&NAME_PROPERTY);
}

/// A note author.
#[derive(Debug, Clone)]
pub struct Author {
    /// Id.
    pub id: Id<Author>,
    /// Name.
    pub name: String,
    /// Notes whose `author` is this author.
    pub notes: ToMany<Note>,
}

impl Author {
    /// Creates an unsaved author.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

impl Default for Author {
    fn default() -> Self {
        Self {
            id: Id::NONE,
            name: String::new(),
            notes: ToMany::backlink(&note::AUTHOR_PROPERTY),
        }
    }
}

impl Entity for Author {
    const DESCRIPTOR: &'static EntityDescriptor = &author::ENTITY;

    fn id(&self) -> Id<Self> {
        self.id
    }

    fn set_id(&mut self, id: Id<Self>) {
        self.id = id;
    }

    fn write(&self, writer: &mut EntityWriter) -> BoxResult<()> {
        writer.put(&author::ID_PROPERTY, &self.id)?;
        writer.put(&author::NAME_PROPERTY, &self.name)
    }

    fn read(reader: &EntityReader<'_>) -> BoxResult<Self> {
        Ok(Self {
            id: reader.read(&author::ID_PROPERTY)?,
            name: reader.read(&author::NAME_PROPERTY)?,
            ..Self::default()
        })
    }

    fn attach(&mut self, store: &Store) {
        self.notes.attach(store, self.id);
    }
}

/// Schema and query handles of [`Note`].
pub mod note {
    use super::*;

    /// Primary key.
    pub const ID_PROPERTY: PropertyDescriptor =
        PropertyDescriptor::new(1, "id", PropertyType::Long).flags(ID_FLAGS);
    /// Text.
    pub const TEXT_PROPERTY: PropertyDescriptor =
        PropertyDescriptor::new(2, "text", PropertyType::String);
    /// Author id.
    pub const AUTHOR_PROPERTY: PropertyDescriptor =
        PropertyDescriptor::new(3, "author", PropertyType::Relation).flags(PropertyFlags::INDEXED);

    /// Entity descriptor.
    pub const ENTITY: EntityDescriptor = EntityDescriptor {
        id: 2,
        name: "Note",
        properties: &[ID_PROPERTY, TEXT_PROPERTY, AUTHOR_PROPERTY],
        relations: &[],
    };

    /// `Note.id`.
    pub const ID: Property<Note, Id<Note>> = Property::new(&ID_PROPERTY);
    /// `Note.text`.
    pub const TEXT: Property<Note, String> = Property::new(&TEXT_PROPERTY);
    /// `Note.author`.
    pub const AUTHOR: Property<Note, Id<Author>> = Property::new(&AUTHOR_PROPERTY);
}

/// A note with an optional author.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Note {
    /// Id.
    pub id: Id<Note>,
    /// Text.
    pub text: String,
    /// Author.
    pub author: ToOne<Author>,
}

impl Note {
    /// Creates an unsaved note without author.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    /// Creates an unsaved note by the author with id `author`.
    pub fn by(text: impl Into<String>, author: Id<Author>) -> Self {
        Self {
            text: text.into(),
            author: ToOne::from_id(author),
            ..Self::default()
        }
    }
}

impl Entity for Note {
    const DESCRIPTOR: &'static EntityDescriptor = &note::ENTITY;

    fn id(&self) -> Id<Self> {
        self.id
    }

    fn set_id(&mut self, id: Id<Self>) {
        self.id = id;
    }

    fn write(&self, writer: &mut EntityWriter) -> BoxResult<()> {
        writer.put(&note::ID_PROPERTY, &self.id)?;
        writer.put(&note::TEXT_PROPERTY, &self.text)?;
        writer.put_to_one(&note::AUTHOR_PROPERTY, &self.author)
    }

    fn read(reader: &EntityReader<'_>) -> BoxResult<Self> {
        Ok(Self {
            id: reader.read(&note::ID_PROPERTY)?,
            text: reader.read(&note::TEXT_PROPERTY)?,
            author: reader.read_to_one(&note::AUTHOR_PROPERTY)?,
        })
    }

    fn attach(&mut self, store: &Store) {
        self.author.attach(store);
    }

    fn before_put(&mut self, txn: &mut Transaction) -> BoxResult<()> {
        self.author.persist_target(txn)
    }

    fn put_aborted(&mut self, txn: TxnTag) {
        self.author.rollback(txn);
    }
}

/// Schema and query handles of [`Teacher`].
pub mod teacher {
    use super::*;

    /// Primary key.
    pub const ID_PROPERTY: PropertyDescriptor =
        PropertyDescriptor::new(1, "id", PropertyType::Long).flags(ID_FLAGS);
    /// Name.
    pub const NAME_PROPERTY: PropertyDescriptor =
        PropertyDescriptor::new(2, "name", PropertyType::String);

    /// Teacher to student relation.
    pub const STUDENTS: RelationDescriptor = RelationDescriptor {
        id: 1,
        name: "students",
        source_entity: 3,
        target_entity: 4,
    };

    /// Entity descriptor.
    pub const ENTITY: EntityDescriptor = EntityDescriptor {
        id: 3,
        name: "Teacher",
        properties: &[ID_PROPERTY, NAME_PROPERTY],
        relations: &[STUDENTS],
    };

    /// `Teacher.name`.
    pub const NAME: Property<Teacher, String> = Property::new(&NAME_PROPERTY);
}

/// A teacher with many students.
#[derive(Debug, Clone)]
pub struct Teacher {
    /// Id.
    pub id: Id<Teacher>,
    /// Name.
    pub name: String,
    /// Students.
    pub students: ToMany<Student>,
}

impl Teacher {
    /// Creates an unsaved teacher without students.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

impl Default for Teacher {
    fn default() -> Self {
        Self {
            id: Id::NONE,
            name: String::new(),
            students: ToMany::standalone(&teacher::STUDENTS),
        }
    }
}

impl Entity for Teacher {
    const DESCRIPTOR: &'static EntityDescriptor = &teacher::ENTITY;

    fn id(&self) -> Id<Self> {
        self.id
    }

    fn set_id(&mut self, id: Id<Self>) {
        self.id = id;
    }

    fn write(&self, writer: &mut EntityWriter) -> BoxResult<()> {
        writer.put(&teacher::ID_PROPERTY, &self.id)?;
        writer.put(&teacher::NAME_PROPERTY, &self.name)
    }

    fn read(reader: &EntityReader<'_>) -> BoxResult<Self> {
        Ok(Self {
            id: reader.read(&teacher::ID_PROPERTY)?,
            name: reader.read(&teacher::NAME_PROPERTY)?,
            ..Self::default()
        })
    }

    fn attach(&mut self, store: &Store) {
        self.students.attach(store, self.id);
    }

    fn after_put(&mut self, txn: &mut Transaction) -> BoxResult<()> {
        self.students.apply_to_db(txn)
    }

    fn put_aborted(&mut self, txn: TxnTag) {
        self.students.rollback(txn);
    }
}

/// Schema and query handles of [`Student`].
pub mod student {
    use super::*;

    /// Primary key.
    pub const ID_PROPERTY: PropertyDescriptor =
        PropertyDescriptor::new(1, "id", PropertyType::Long).flags(ID_FLAGS);
    /// Name.
    pub const NAME_PROPERTY: PropertyDescriptor =
        PropertyDescriptor::new(2, "name", PropertyType::String);

    /// Entity descriptor.
    pub const ENTITY: EntityDescriptor = EntityDescriptor {
        id: 4,
        name: "Student",
        properties: &[ID_PROPERTY, NAME_PROPERTY],
        relations: &[],
    };

    /// `Student.name`.
    pub const NAME: Property<Student, String> = Property::new(&NAME_PROPERTY);
}

/// A student.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Student {
    /// Id.
    pub id: Id<Student>,
    /// Name.
    pub name: String,
}

impl Student {
    /// Creates an unsaved student.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Id::NONE,
            name: name.into(),
        }
    }
}

impl Entity for Student {
    const DESCRIPTOR: &'static EntityDescriptor = &student::ENTITY;

    fn id(&self) -> Id<Self> {
        self.id
    }

    fn set_id(&mut self, id: Id<Self>) {
        self.id = id;
    }

    fn write(&self, writer: &mut EntityWriter) -> BoxResult<()> {
        writer.put(&student::ID_PROPERTY, &self.id)?;
        writer.put(&student::NAME_PROPERTY, &self.name)
    }

    fn read(reader: &EntityReader<'_>) -> BoxResult<Self> {
        Ok(Self {
            id: reader.read(&student::ID_PROPERTY)?,
            name: reader.read(&student::NAME_PROPERTY)?,
        })
    }
}

/// Schema and query handles of [`AllTypes`].
pub mod all_types {
    use super::*;

    /// Primary key.
    pub const ID_PROPERTY: PropertyDescriptor =
        PropertyDescriptor::new(1, "id", PropertyType::Long).flags(ID_FLAGS);
    /// `flag: bool`.
    pub const FLAG_PROPERTY: PropertyDescriptor =
        PropertyDescriptor::new(2, "flag", PropertyType::Bool);
    /// `tiny: i8`.
    pub const TINY_PROPERTY: PropertyDescriptor =
        PropertyDescriptor::new(3, "tiny", PropertyType::Byte);
    /// `small: i16`.
    pub const SMALL_PROPERTY: PropertyDescriptor =
        PropertyDescriptor::new(4, "small", PropertyType::Short);
    /// `medium: i32`.
    pub const MEDIUM_PROPERTY: PropertyDescriptor =
        PropertyDescriptor::new(5, "medium", PropertyType::Int);
    /// `large: i64`.
    pub const LARGE_PROPERTY: PropertyDescriptor =
        PropertyDescriptor::new(6, "large", PropertyType::Long);
    /// `ubyte: u8`.
    pub const UBYTE_PROPERTY: PropertyDescriptor =
        PropertyDescriptor::new(7, "ubyte", PropertyType::Byte).flags(PropertyFlags::UNSIGNED);
    /// `ushort: u16`.
    pub const USHORT_PROPERTY: PropertyDescriptor =
        PropertyDescriptor::new(8, "ushort", PropertyType::Short).flags(PropertyFlags::UNSIGNED);
    /// `uint: u32`.
    pub const UINT_PROPERTY: PropertyDescriptor =
        PropertyDescriptor::new(9, "uint", PropertyType::Int).flags(PropertyFlags::UNSIGNED);
    /// `ulong: u64`.
    pub const ULONG_PROPERTY: PropertyDescriptor =
        PropertyDescriptor::new(10, "ulong", PropertyType::Long).flags(PropertyFlags::UNSIGNED);
    /// `size: isize`.
    pub const SIZE_PROPERTY: PropertyDescriptor = PropertyDescriptor::new(11, "size", PLATFORM_INT);
    /// `single: f32`.
    pub const SINGLE_PROPERTY: PropertyDescriptor =
        PropertyDescriptor::new(12, "single", PropertyType::Float);
    /// `double: f64`.
    pub const DOUBLE_PROPERTY: PropertyDescriptor =
        PropertyDescriptor::new(13, "double", PropertyType::Double);
    /// `text: String`.
    pub const TEXT_PROPERTY: PropertyDescriptor =
        PropertyDescriptor::new(14, "text", PropertyType::String);
    /// `bytes: Vec<u8>`.
    pub const BYTES_PROPERTY: PropertyDescriptor =
        PropertyDescriptor::new(15, "bytes", PropertyType::ByteVector);
    /// `date: DateTime<Utc>`.
    pub const DATE_PROPERTY: PropertyDescriptor =
        PropertyDescriptor::new(16, "date", PropertyType::Date);
    /// `maybe_text: Option<String>`.
    pub const MAYBE_TEXT_PROPERTY: PropertyDescriptor =
        PropertyDescriptor::new(17, "maybeText", PropertyType::String);
    /// `maybe_large: Option<i64>`.
    pub const MAYBE_LARGE_PROPERTY: PropertyDescriptor =
        PropertyDescriptor::new(18, "maybeLarge", PropertyType::Long);
    /// `maybe_date: Option<DateTime<Utc>>`.
    pub const MAYBE_DATE_PROPERTY: PropertyDescriptor =
        PropertyDescriptor::new(19, "maybeDate", PropertyType::Date);
    /// `key: Option<String>`, unique when present.
    pub const KEY_PROPERTY: PropertyDescriptor =
        PropertyDescriptor::new(20, "key", PropertyType::String).flags(PropertyFlags::UNIQUE);

    /// Entity descriptor.
    pub const ENTITY: EntityDescriptor = EntityDescriptor {
        id: 5,
        name: "AllTypes",
        properties: &[
            ID_PROPERTY,
            FLAG_PROPERTY,
            TINY_PROPERTY,
            SMALL_PROPERTY,
            MEDIUM_PROPERTY,
            LARGE_PROPERTY,
            UBYTE_PROPERTY,
            USHORT_PROPERTY,
            UINT_PROPERTY,
            ULONG_PROPERTY,
            SIZE_PROPERTY,
            SINGLE_PROPERTY,
            DOUBLE_PROPERTY,
            TEXT_PROPERTY,
            BYTES_PROPERTY,
            DATE_PROPERTY,
            MAYBE_TEXT_PROPERTY,
            MAYBE_LARGE_PROPERTY,
            MAYBE_DATE_PROPERTY,
            KEY_PROPERTY,
        ],
        relations: &[],
    };

    /// `AllTypes.flag`.
    pub const FLAG: Property<AllTypes, bool> = Property::new(&FLAG_PROPERTY);
    /// `AllTypes.medium`.
    pub const MEDIUM: Property<AllTypes, i32> = Property::new(&MEDIUM_PROPERTY);
    /// `AllTypes.large`.
    pub const LARGE: Property<AllTypes, i64> = Property::new(&LARGE_PROPERTY);
    /// `AllTypes.ulong`.
    pub const ULONG: Property<AllTypes, u64> = Property::new(&ULONG_PROPERTY);
    /// `AllTypes.double`.
    pub const DOUBLE: Property<AllTypes, f64> = Property::new(&DOUBLE_PROPERTY);
    /// `AllTypes.text`.
    pub const TEXT: Property<AllTypes, String> = Property::new(&TEXT_PROPERTY);
    /// `AllTypes.date`.
    pub const DATE: Property<AllTypes, DateTime<Utc>> = Property::new(&DATE_PROPERTY);
    /// `AllTypes.maybe_text`.
    pub const MAYBE_TEXT: Property<AllTypes, String> = Property::new(&MAYBE_TEXT_PROPERTY);
    /// `AllTypes.maybe_large`.
    pub const MAYBE_LARGE: Property<AllTypes, i64> = Property::new(&MAYBE_LARGE_PROPERTY);
}

/// One field per supported value type, required and optional.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AllTypes {
    /// Id.
    pub id: Id<AllTypes>,
    /// Bool.
    pub flag: bool,
    /// Byte.
    pub tiny: i8,
    /// Short.
    pub small: i16,
    /// Int.
    pub medium: i32,
    /// Long.
    pub large: i64,
    /// Unsigned byte.
    pub ubyte: u8,
    /// Unsigned short.
    pub ushort: u16,
    /// Unsigned int.
    pub uint: u32,
    /// Unsigned long.
    pub ulong: u64,
    /// Platform integer.
    pub size: isize,
    /// Float.
    pub single: f32,
    /// Double.
    pub double: f64,
    /// String.
    pub text: String,
    /// Byte vector.
    pub bytes: Vec<u8>,
    /// Date.
    pub date: DateTime<Utc>,
    /// Optional string.
    pub maybe_text: Option<String>,
    /// Optional long.
    pub maybe_large: Option<i64>,
    /// Optional date.
    pub maybe_date: Option<DateTime<Utc>>,
    /// Optional unique key.
    pub key: Option<String>,
}

impl Entity for AllTypes {
    const DESCRIPTOR: &'static EntityDescriptor = &all_types::ENTITY;

    fn id(&self) -> Id<Self> {
        self.id
    }

    fn set_id(&mut self, id: Id<Self>) {
        self.id = id;
    }

    fn write(&self, writer: &mut EntityWriter) -> BoxResult<()> {
        use all_types::*;
        writer.put(&ID_PROPERTY, &self.id)?;
        writer.put(&FLAG_PROPERTY, &self.flag)?;
        writer.put(&TINY_PROPERTY, &self.tiny)?;
        writer.put(&SMALL_PROPERTY, &self.small)?;
        writer.put(&MEDIUM_PROPERTY, &self.medium)?;
        writer.put(&LARGE_PROPERTY, &self.large)?;
        writer.put(&UBYTE_PROPERTY, &self.ubyte)?;
        writer.put(&USHORT_PROPERTY, &self.ushort)?;
        writer.put(&UINT_PROPERTY, &self.uint)?;
        writer.put(&ULONG_PROPERTY, &self.ulong)?;
        writer.put(&SIZE_PROPERTY, &self.size)?;
        writer.put(&SINGLE_PROPERTY, &self.single)?;
        writer.put(&DOUBLE_PROPERTY, &self.double)?;
        writer.put(&TEXT_PROPERTY, &self.text)?;
        writer.put(&BYTES_PROPERTY, &self.bytes)?;
        writer.put(&DATE_PROPERTY, &self.date)?;
        writer.put_optional(&MAYBE_TEXT_PROPERTY, &self.maybe_text)?;
        writer.put_optional(&MAYBE_LARGE_PROPERTY, &self.maybe_large)?;
        writer.put_optional(&MAYBE_DATE_PROPERTY, &self.maybe_date)?;
        writer.put_optional(&KEY_PROPERTY, &self.key)
    }

    fn read(reader: &EntityReader<'_>) -> BoxResult<Self> {
        use all_types::*;
        Ok(Self {
            id: reader.read(&ID_PROPERTY)?,
            flag: reader.read(&FLAG_PROPERTY)?,
            tiny: reader.read(&TINY_PROPERTY)?,
            small: reader.read(&SMALL_PROPERTY)?,
            medium: reader.read(&MEDIUM_PROPERTY)?,
            large: reader.read(&LARGE_PROPERTY)?,
            ubyte: reader.read(&UBYTE_PROPERTY)?,
            ushort: reader.read(&USHORT_PROPERTY)?,
            uint: reader.read(&UINT_PROPERTY)?,
            ulong: reader.read(&ULONG_PROPERTY)?,
            size: reader.read(&SIZE_PROPERTY)?,
            single: reader.read(&SINGLE_PROPERTY)?,
            double: reader.read(&DOUBLE_PROPERTY)?,
            text: reader.read(&TEXT_PROPERTY)?,
            bytes: reader.read(&BYTES_PROPERTY)?,
            date: reader.read(&DATE_PROPERTY)?,
            maybe_text: reader.read_optional(&MAYBE_TEXT_PROPERTY)?,
            maybe_large: reader.read_optional(&MAYBE_LARGE_PROPERTY)?,
            maybe_date: reader.read_optional(&MAYBE_DATE_PROPERTY)?,
            key: reader.read_optional(&KEY_PROPERTY)?,
        })
    }
}
