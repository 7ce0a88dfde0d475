//! Query builder and execution.

use boxdb_core::{BoxError, Id, Property};
use boxdb_testkit::prelude::*;
use chrono::{TimeZone, Utc};
use proptest::prelude::*;
use std::collections::HashSet;

fn id_set<E>(ids: impl IntoIterator<Item = Id<E>>) -> HashSet<u64> {
    ids.into_iter().map(Id::get).collect()
}

fn numbered(store: &TestStore, values: &[(i32, &str, Option<i64>)]) -> Vec<Id<AllTypes>> {
    let boxed = store.box_for::<AllTypes>().unwrap();
    values
        .iter()
        .map(|&(medium, text, maybe_large)| {
            boxed
                .put(&mut AllTypes {
                    medium,
                    text: text.into(),
                    maybe_large,
                    ..AllTypes::default()
                })
                .unwrap()
        })
        .collect()
}

#[test]
fn notes_by_text_and_author() {
    let store = TestStore::memory();
    let scenario = NotesScenario::create(&store);
    let notes = store.box_for::<Note>().unwrap();

    let writing = notes
        .query()
        .filter(note::TEXT.contains("writing"))
        .build()
        .unwrap();
    let found = writing.find().unwrap();
    assert_eq!(found.len(), 3);
    assert_eq!(
        id_set(found.iter().map(|n| n.id)),
        id_set(scenario.notes[..3].iter().copied())
    );

    let by_peter = notes
        .query()
        .filter(note::TEXT.contains("writing"))
        .filter(note::AUTHOR.equals(scenario.peter))
        .build()
        .unwrap();
    let found = by_peter.find().unwrap();
    assert_eq!(found.len(), 2);
    assert_eq!(
        id_set(found.iter().map(|n| n.id)),
        id_set(scenario.notes[..2].iter().copied())
    );
    assert!(found.iter().all(|n| n.author.target_id() == scenario.peter));
    assert_eq!(by_peter.count().unwrap(), 2);
}

#[test]
fn explicit_and_matches_chained_filters() {
    let store = TestStore::memory();
    let scenario = NotesScenario::create(&store);
    let notes = store.box_for::<Note>().unwrap();

    let combined = notes
        .query()
        .filter(note::TEXT.contains("writing") & note::AUTHOR.points_to(scenario.peter))
        .build()
        .unwrap();
    assert_eq!(
        id_set(combined.find_ids().unwrap()),
        id_set(scenario.notes[..2].iter().copied())
    );
}

#[test]
fn or_and_not() {
    let store = TestStore::memory();
    let scenario = NotesScenario::create(&store);
    let notes = store.box_for::<Note>().unwrap();

    let either = notes
        .query()
        .filter(note::TEXT.starts_with("Tips") | note::TEXT.ends_with("list"))
        .build()
        .unwrap();
    assert_eq!(
        id_set(either.find_ids().unwrap()),
        id_set([scenario.notes[1], scenario.notes[3]])
    );

    let without = notes
        .query()
        .filter(!note::TEXT.contains("writing"))
        .build()
        .unwrap();
    assert_eq!(
        id_set(without.find_ids().unwrap()),
        id_set([scenario.notes[3]])
    );

    let by_other = notes
        .query()
        .filter(!note::AUTHOR.equals(scenario.peter))
        .build()
        .unwrap();
    assert_eq!(
        id_set(by_other.find_ids().unwrap()),
        id_set([scenario.notes[2]])
    );
}

#[test]
fn no_conditions_matches_everything() {
    let store = TestStore::memory();
    NotesScenario::create(&store);
    let notes = store.box_for::<Note>().unwrap();
    let query = notes.query().build().unwrap();
    assert_eq!(query.count().unwrap(), 4);
}

#[test]
fn case_insensitive_text_matching() {
    let store = TestStore::memory();
    let scenario = NotesScenario::create(&store);
    let notes = store.box_for::<Note>().unwrap();

    let sensitive = notes
        .query()
        .filter(note::TEXT.contains("WRITING"))
        .build()
        .unwrap();
    assert_eq!(sensitive.count().unwrap(), 0);

    let insensitive = notes
        .query()
        .filter(note::TEXT.contains_ignore_case("WRITING"))
        .build()
        .unwrap();
    assert_eq!(insensitive.count().unwrap(), 3);

    let exact = notes
        .query()
        .filter(note::TEXT.equals_ignore_case("shopping LIST"))
        .build()
        .unwrap();
    assert_eq!(exact.find_ids().unwrap(), vec![scenario.notes[3]]);

    let prefixed = notes
        .query()
        .filter(note::TEXT.starts_with_ignore_case("more"))
        .build()
        .unwrap();
    assert_eq!(prefixed.find_ids().unwrap(), vec![scenario.notes[2]]);
}

#[test]
fn numeric_ranges() {
    let store = TestStore::memory();
    let ids = numbered(
        &store,
        &[(1, "a", None), (5, "b", None), (10, "c", None), (-3, "d", None)],
    );
    let boxed = store.box_for::<AllTypes>().unwrap();

    let between = boxed
        .query()
        .filter(all_types::MEDIUM.between(1, 5))
        .build()
        .unwrap();
    assert_eq!(id_set(between.find_ids().unwrap()), id_set([ids[0], ids[1]]));

    let greater = boxed
        .query()
        .filter(all_types::MEDIUM.greater_than(1))
        .build()
        .unwrap();
    assert_eq!(id_set(greater.find_ids().unwrap()), id_set([ids[1], ids[2]]));

    let less = boxed
        .query()
        .filter(all_types::MEDIUM.less_or_equal(1))
        .build()
        .unwrap();
    assert_eq!(id_set(less.find_ids().unwrap()), id_set([ids[0], ids[3]]));

    let one_of = boxed
        .query()
        .filter(all_types::MEDIUM.one_of([10, -3, 42]))
        .build()
        .unwrap();
    assert_eq!(id_set(one_of.find_ids().unwrap()), id_set([ids[2], ids[3]]));

    let text_order = boxed
        .query()
        .filter(all_types::TEXT.greater_or_equal("c"))
        .build()
        .unwrap();
    assert_eq!(id_set(text_order.find_ids().unwrap()), id_set([ids[2], ids[3]]));
}

#[test]
fn dates_and_doubles_compare_by_value() {
    let store = TestStore::memory();
    let boxed = store.box_for::<AllTypes>().unwrap();
    let early = Utc.with_ymd_and_hms(1969, 7, 20, 20, 17, 0).unwrap();
    let late = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();

    let old = boxed
        .put(&mut AllTypes {
            date: early,
            double: -0.5,
            ..AllTypes::default()
        })
        .unwrap();
    let new = boxed
        .put(&mut AllTypes {
            date: late,
            double: 2.5,
            ..AllTypes::default()
        })
        .unwrap();

    let before_2000 = boxed
        .query()
        .filter(all_types::DATE.less_than(Utc.with_ymd_and_hms(2000, 1, 1, 0, 0, 0).unwrap()))
        .build()
        .unwrap();
    assert_eq!(before_2000.find_ids().unwrap(), vec![old]);

    let positive = boxed
        .query()
        .filter(all_types::DOUBLE.greater_than(0.0))
        .build()
        .unwrap();
    assert_eq!(positive.find_ids().unwrap(), vec![new]);
}

#[test]
fn absent_values_match_null_checks_and_negation() {
    let store = TestStore::memory();
    let ids = numbered(
        &store,
        &[(1, "a", Some(7)), (2, "b", None), (3, "c", Some(-7))],
    );
    let boxed = store.box_for::<AllTypes>().unwrap();

    let null = boxed
        .query()
        .filter(all_types::MAYBE_LARGE.is_null())
        .build()
        .unwrap();
    assert_eq!(null.find_ids().unwrap(), vec![ids[1]]);

    let not_null = boxed
        .query()
        .filter(all_types::MAYBE_LARGE.is_not_null())
        .build()
        .unwrap();
    assert_eq!(id_set(not_null.find_ids().unwrap()), id_set([ids[0], ids[2]]));

    let not_seven = boxed
        .query()
        .filter(all_types::MAYBE_LARGE.not_equals(7))
        .build()
        .unwrap();
    assert_eq!(not_seven.find_ids().unwrap(), vec![ids[2]]);

    let not_one_of = boxed
        .query()
        .filter(all_types::MAYBE_LARGE.not_one_of([7]))
        .build()
        .unwrap();
    assert_eq!(not_one_of.find_ids().unwrap(), vec![ids[2]]);

    // Negation is the complement, absent values included.
    let negated = boxed
        .query()
        .filter(!all_types::MAYBE_LARGE.equals(7))
        .build()
        .unwrap();
    assert_eq!(id_set(negated.find_ids().unwrap()), id_set([ids[1], ids[2]]));

    let text_absent = boxed
        .query()
        .filter(all_types::MAYBE_TEXT.contains(""))
        .build()
        .unwrap();
    assert_eq!(text_absent.count().unwrap(), 0);
}

#[test]
fn offset_limit_and_first() {
    let store = TestStore::memory();
    let ids = numbered(
        &store,
        &[(1, "a", None), (2, "b", None), (3, "c", None), (4, "d", None)],
    );
    let boxed = store.box_for::<AllTypes>().unwrap();
    let query = boxed
        .query()
        .filter(all_types::MEDIUM.greater_than(1))
        .build()
        .unwrap();

    let page = query.find_with_offset_limit(1, 1).unwrap();
    assert_eq!(page.len(), 1);
    assert_eq!(query.find_with_offset_limit(0, 0).unwrap().len(), 3);
    assert!(query.find_with_offset_limit(5, 0).unwrap().is_empty());

    let first = query.find_first().unwrap().unwrap();
    assert!(ids[1..].contains(&first.id));
}

#[test]
fn find_unique_rejects_multiple_results() {
    let store = TestStore::memory();
    let scenario = NotesScenario::create(&store);
    let notes = store.box_for::<Note>().unwrap();

    let single = notes
        .query()
        .filter(note::TEXT.equals("Tips on writing"))
        .build()
        .unwrap();
    assert_eq!(single.find_unique().unwrap().unwrap().id, scenario.notes[1]);

    let none = notes
        .query()
        .filter(note::TEXT.equals("missing"))
        .build()
        .unwrap();
    assert!(none.find_unique().unwrap().is_none());

    let many = notes
        .query()
        .filter(note::TEXT.contains("writing"))
        .build()
        .unwrap();
    let err = many.find_unique().unwrap_err();
    assert!(matches!(err, BoxError::NonUniqueResult { .. }), "{err:?}");
}

#[test]
fn queries_see_later_writes() {
    let store = TestStore::memory();
    NotesScenario::create(&store);
    let notes = store.box_for::<Note>().unwrap();
    let query = notes
        .query()
        .filter(note::TEXT.contains("writing"))
        .build()
        .unwrap();
    assert_eq!(query.count().unwrap(), 3);

    notes.put(&mut Note::new("writing again")).unwrap();
    assert_eq!(query.count().unwrap(), 4);
}

#[test]
fn query_remove_deletes_matches() {
    let store = TestStore::memory();
    NotesScenario::create(&store);
    let notes = store.box_for::<Note>().unwrap();

    let removed = notes
        .query()
        .filter(note::TEXT.contains("writing"))
        .build()
        .unwrap()
        .remove()
        .unwrap();
    assert_eq!(removed, 3);
    assert_eq!(notes.count().unwrap(), 1);
}

#[test]
fn mismatched_operand_fails_at_build() {
    let store = TestStore::memory();
    let boxed = store.box_for::<AllTypes>().unwrap();
    let mislabeled: Property<AllTypes, String> = Property::new(&all_types::FLAG_PROPERTY);

    let err = boxed
        .query()
        .filter(mislabeled.equals("yes"))
        .build()
        .unwrap_err();
    assert!(matches!(err, BoxError::PropertyTypeMismatch { .. }), "{err:?}");
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn contains_agrees_with_str_contains(texts in prop::collection::vec(note_text_strategy(), 0..12)) {
        let store = TestStore::memory();
        let notes = store.box_for::<Note>().unwrap();
        let mut expected = HashSet::new();
        for text in &texts {
            let id = notes.put(&mut Note::new(text.as_str())).unwrap();
            if text.contains("writing") {
                expected.insert(id.get());
            }
        }

        let query = notes
            .query()
            .filter(note::TEXT.contains("writing"))
            .build()
            .unwrap();
        prop_assert_eq!(id_set(query.find_ids().unwrap()), expected);
    }
}
