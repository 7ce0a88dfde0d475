//! Property-based test generators using proptest.

use crate::entities::AllTypes;
use boxdb_core::Id;
use chrono::{DateTime, Utc};
use proptest::prelude::*;

/// Dates between 1900 and 2200 with millisecond precision.
pub fn date_strategy() -> impl Strategy<Value = DateTime<Utc>> {
    (-2_208_988_800_000i64..7_258_118_400_000i64)
        .prop_map(|millis| DateTime::from_timestamp_millis(millis).unwrap_or_default())
}

/// Finite floating-point values, so stored objects compare equal.
pub fn finite_f64() -> impl Strategy<Value = f64> {
    -1.0e12..1.0e12f64
}

/// Unsaved [`AllTypes`] objects with arbitrary field values, optional fields
/// included or left out at random. The unique key is left out.
pub fn all_types_strategy() -> impl Strategy<Value = AllTypes> {
    let integers = (
        any::<bool>(),
        any::<i8>(),
        any::<i16>(),
        any::<i32>(),
        any::<i64>(),
        any::<u8>(),
        any::<u16>(),
        any::<u32>(),
        any::<u64>(),
        any::<i32>(),
    );
    let others = (
        -1.0e6..1.0e6f32,
        finite_f64(),
        any::<String>(),
        prop::collection::vec(any::<u8>(), 0..256),
        date_strategy(),
        prop::option::of(any::<String>()),
        prop::option::of(any::<i64>()),
        prop::option::of(date_strategy()),
    );
    (integers, others).prop_map(
        |(
            (flag, tiny, small, medium, large, ubyte, ushort, uint, ulong, size),
            (single, double, text, bytes, date, maybe_text, maybe_large, maybe_date),
        )| AllTypes {
            id: Id::NONE,
            flag,
            tiny,
            small,
            medium,
            large,
            ubyte,
            ushort,
            uint,
            ulong,
            size: size as isize,
            single,
            double,
            text,
            bytes,
            date,
            maybe_text,
            maybe_large,
            maybe_date,
            key: None,
        },
    )
}

/// Short note texts, some of which contain "writing".
pub fn note_text_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        prop::string::string_regex("[a-z ]{0,20}").expect("Invalid regex"),
        prop::string::string_regex("[a-z ]{0,8}writing[a-z ]{0,8}").expect("Invalid regex"),
    ]
}
