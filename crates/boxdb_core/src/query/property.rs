//! Typed property references.

use super::Condition;
use crate::codec::FieldValue;
use crate::id::Id;
use crate::schema::PropertyDescriptor;
use boxdb_engine::{PlanCondition, TextOp};
use chrono::{DateTime, Utc};
use std::fmt;
use std::marker::PhantomData;

/// A property of entity `E` holding values of type `T`.
///
/// Bindings declare one constant per queryable property:
///
/// ```rust,ignore
/// pub const TEXT: Property<Note, String> = Property::new(&NOTE_TEXT);
/// pub const AUTHOR: Property<Note, Id<Author>> = Property::new(&NOTE_AUTHOR);
/// ```
pub struct Property<E, T> {
    descriptor: &'static PropertyDescriptor,
    _marker: PhantomData<fn() -> (E, T)>,
}

impl<E, T> Property<E, T> {
    /// Creates a reference to `descriptor`.
    #[must_use]
    pub const fn new(descriptor: &'static PropertyDescriptor) -> Self {
        Self {
            descriptor,
            _marker: PhantomData,
        }
    }

    /// Returns the descriptor.
    #[must_use]
    pub const fn descriptor(&self) -> &'static PropertyDescriptor {
        self.descriptor
    }

    fn id(&self) -> u16 {
        self.descriptor.id
    }
}

impl<E, T: FieldValue> Property<E, T> {
    /// `property == value`.
    #[must_use]
    pub fn equals(&self, value: impl Into<T>) -> Condition<E> {
        Condition::new(PlanCondition::Equal {
            property: self.id(),
            value: value.into().to_value(),
            case_sensitive: true,
        })
    }

    /// `property != value`. Objects where the property is absent do not
    /// match.
    #[must_use]
    pub fn not_equals(&self, value: impl Into<T>) -> Condition<E> {
        Condition::new(PlanCondition::NotEqual {
            property: self.id(),
            value: value.into().to_value(),
            case_sensitive: true,
        })
    }

    /// The property equals one of `values`.
    #[must_use]
    pub fn one_of<I>(&self, values: I) -> Condition<E>
    where
        I: IntoIterator,
        I::Item: Into<T>,
    {
        Condition::new(self.one_of_plan(values, true))
    }

    /// The property is present and equals none of `values`.
    #[must_use]
    pub fn not_one_of<I>(&self, values: I) -> Condition<E>
    where
        I: IntoIterator,
        I::Item: Into<T>,
    {
        Condition::new(PlanCondition::And(vec![
            PlanCondition::NotNull {
                property: self.id(),
            },
            PlanCondition::Not(Box::new(self.one_of_plan(values, true))),
        ]))
    }

    /// The property is absent.
    #[must_use]
    pub fn is_null(&self) -> Condition<E> {
        Condition::new(PlanCondition::IsNull {
            property: self.id(),
        })
    }

    /// The property is present.
    #[must_use]
    pub fn is_not_null(&self) -> Condition<E> {
        Condition::new(PlanCondition::NotNull {
            property: self.id(),
        })
    }

    fn one_of_plan<I>(&self, values: I, case_sensitive: bool) -> PlanCondition
    where
        I: IntoIterator,
        I::Item: Into<T>,
    {
        PlanCondition::OneOf {
            property: self.id(),
            values: values.into_iter().map(|v| v.into().to_value()).collect(),
            case_sensitive,
        }
    }
}

/// Field types with a total order usable in range conditions.
pub trait Ordered: FieldValue {}

macro_rules! ordered {
    ($($ty:ty),*) => {
        $(impl Ordered for $ty {})*
    };
}

ordered!(i8, u8, i16, u16, i32, u32, i64, u64, isize, usize, f32, f64, String);

impl Ordered for DateTime<Utc> {}

impl<E, T: Ordered> Property<E, T> {
    /// `property < value`.
    #[must_use]
    pub fn less_than(&self, value: impl Into<T>) -> Condition<E> {
        self.less(value, false)
    }

    /// `property <= value`.
    #[must_use]
    pub fn less_or_equal(&self, value: impl Into<T>) -> Condition<E> {
        self.less(value, true)
    }

    /// `property > value`.
    #[must_use]
    pub fn greater_than(&self, value: impl Into<T>) -> Condition<E> {
        self.greater(value, false)
    }

    /// `property >= value`.
    #[must_use]
    pub fn greater_or_equal(&self, value: impl Into<T>) -> Condition<E> {
        self.greater(value, true)
    }

    /// `low <= property <= high`.
    #[must_use]
    pub fn between(&self, low: impl Into<T>, high: impl Into<T>) -> Condition<E> {
        Condition::new(PlanCondition::Between {
            property: self.id(),
            low: low.into().to_value(),
            high: high.into().to_value(),
        })
    }

    fn less(&self, value: impl Into<T>, inclusive: bool) -> Condition<E> {
        Condition::new(PlanCondition::Less {
            property: self.id(),
            value: value.into().to_value(),
            inclusive,
        })
    }

    fn greater(&self, value: impl Into<T>, inclusive: bool) -> Condition<E> {
        Condition::new(PlanCondition::Greater {
            property: self.id(),
            value: value.into().to_value(),
            inclusive,
        })
    }
}

impl<E> Property<E, String> {
    /// Case-insensitive equality.
    #[must_use]
    pub fn equals_ignore_case(&self, value: &str) -> Condition<E> {
        Condition::new(PlanCondition::Equal {
            property: self.id(),
            value: value.to_string().to_value(),
            case_sensitive: false,
        })
    }

    /// Case-insensitive set membership.
    #[must_use]
    pub fn one_of_ignore_case<I>(&self, values: I) -> Condition<E>
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        Condition::new(self.one_of_plan(values, false))
    }

    /// The property contains `needle`.
    #[must_use]
    pub fn contains(&self, needle: &str) -> Condition<E> {
        self.text(TextOp::Contains, needle, true)
    }

    /// The property contains `needle`, ignoring case.
    #[must_use]
    pub fn contains_ignore_case(&self, needle: &str) -> Condition<E> {
        self.text(TextOp::Contains, needle, false)
    }

    /// The property starts with `prefix`.
    #[must_use]
    pub fn starts_with(&self, prefix: &str) -> Condition<E> {
        self.text(TextOp::StartsWith, prefix, true)
    }

    /// The property starts with `prefix`, ignoring case.
    #[must_use]
    pub fn starts_with_ignore_case(&self, prefix: &str) -> Condition<E> {
        self.text(TextOp::StartsWith, prefix, false)
    }

    /// The property ends with `suffix`.
    #[must_use]
    pub fn ends_with(&self, suffix: &str) -> Condition<E> {
        self.text(TextOp::EndsWith, suffix, true)
    }

    /// The property ends with `suffix`, ignoring case.
    #[must_use]
    pub fn ends_with_ignore_case(&self, suffix: &str) -> Condition<E> {
        self.text(TextOp::EndsWith, suffix, false)
    }

    fn text(&self, op: TextOp, value: &str, case_sensitive: bool) -> Condition<E> {
        Condition::new(PlanCondition::Text {
            property: self.id(),
            op,
            value: value.to_string(),
            case_sensitive,
        })
    }
}

impl<E, T> Property<E, Id<T>> {
    /// The relation points at `target`.
    #[must_use]
    pub fn points_to(&self, target: Id<T>) -> Condition<E> {
        self.equals(target)
    }
}

impl<E, T> Clone for Property<E, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<E, T> Copy for Property<E, T> {}

impl<E, T> fmt::Debug for Property<E, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Property").field(&self.descriptor.name).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use boxdb_codec::{PropertyType, Value};

    struct Note;
    struct Author;

    const TEXT: PropertyDescriptor = PropertyDescriptor::new(2, "text", PropertyType::String);
    const AUTHOR: PropertyDescriptor = PropertyDescriptor::new(3, "author", PropertyType::Relation);
    const RANK: PropertyDescriptor = PropertyDescriptor::new(4, "rank", PropertyType::Int);

    const NOTE_TEXT: Property<Note, String> = Property::new(&TEXT);
    const NOTE_AUTHOR: Property<Note, Id<Author>> = Property::new(&AUTHOR);
    const NOTE_RANK: Property<Note, i32> = Property::new(&RANK);

    #[test]
    fn leaf_conditions_carry_typed_operands() {
        assert_eq!(
            NOTE_TEXT.equals("x").plan(),
            &PlanCondition::Equal {
                property: 2,
                value: Value::String("x".into()),
                case_sensitive: true,
            }
        );
        assert_eq!(
            NOTE_AUTHOR.points_to(Id::new(7)).plan(),
            &PlanCondition::Equal {
                property: 3,
                value: Value::UInt(7),
                case_sensitive: true,
            }
        );
        assert_eq!(
            NOTE_RANK.between(1, 3).plan(),
            &PlanCondition::Between {
                property: 4,
                low: Value::Int(1),
                high: Value::Int(3),
            }
        );
    }

    #[test]
    fn string_operators() {
        assert_eq!(
            NOTE_TEXT.contains_ignore_case("Writing").plan(),
            &PlanCondition::Text {
                property: 2,
                op: TextOp::Contains,
                value: "Writing".into(),
                case_sensitive: false,
            }
        );
        assert!(matches!(
            NOTE_TEXT.one_of_ignore_case(["a", "b"]).plan(),
            PlanCondition::OneOf { case_sensitive: false, values, .. } if values.len() == 2
        ));
    }

    #[test]
    fn not_one_of_excludes_absent_fields() {
        let condition = NOTE_RANK.not_one_of([1, 2]);
        let PlanCondition::And(children) = condition.plan() else {
            panic!("expected a conjunction");
        };
        assert_eq!(children[0], PlanCondition::NotNull { property: 4 });
    }
}
