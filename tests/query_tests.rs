/*
  Query Tests

  These exercise the query engine against a small in-memory dictionary, both
  through the filter pipeline directly and through compiled patterns.
*/

use rant::*;
use rant::lang::Identifier;
use rant::query::*;

fn ident(name: &str) -> Identifier {
  Identifier::new(InternalString::from(name))
}

fn test_dictionary() -> RantDictionary {
  let mut dict = RantDictionary::new();

  let mut nouns = RantTable::new("noun", &["singular", "plural"]);
  nouns.add_entry(RantEntry::new(&["cat", "cats"]).with_classes(&["animal"]).with_syllables(1));
  nouns.add_entry(RantEntry::new(&["dog", "dogs"]).with_classes(&["animal"]).with_syllables(1));
  nouns.add_entry(RantEntry::new(&["apple", "apples"]).with_classes(&["fruit", "red"]).with_syllables(2));
  nouns.add_entry(RantEntry::new(&["banana", "bananas"]).with_classes(&["fruit"]).with_syllables(3));
  nouns.add_entry(RantEntry::new(&["university", "universities"]).with_syllables(5));
  dict.add_table(nouns);

  let mut adjs = RantTable::new("adj", &[]);
  adjs.add_entry(RantEntry::new(&["red"]).with_classes(&["color"]).with_attribute("rhyme", "ed"));
  adjs.add_entry(RantEntry::new(&["loud"]).with_syllables(1));
  dict.add_table(adjs);

  dict
}

/// Runs a query against the test dictionary over many seeds and collects the
/// distinct results.
fn results_over_seeds(query: &Query) -> Vec<String> {
  let dict = test_dictionary();
  let mut results: Vec<String> = vec![];
  for seed in 0..64 {
    let rng = RantRng::new(seed);
    let mut carriers = CarrierState::new();
    if let Ok(term) = run_query(query, &dict, &rng, &mut carriers) {
      let term = term.to_string();
      if !results.contains(&term) {
        results.push(term);
      }
    }
  }
  results.sort();
  results
}

#[test]
fn unfiltered_query_reaches_all_entries() {
  let query = Query::of(ident("noun"));
  assert_eq!(results_over_seeds(&query), vec!["apple", "banana", "cat", "dog", "university"]);
}

#[test]
fn subtype_selects_column() {
  let mut query = Query::of(ident("noun"));
  query.subtype = Some(ident("plural"));
  assert_eq!(results_over_seeds(&query), vec!["apples", "bananas", "cats", "dogs", "universities"]);
}

#[test]
fn include_rule_filters() {
  let mut query = Query::of(ident("noun"));
  query.class_filter.push(ClassFilterRule { class_name: ident("animal"), include: true });
  assert_eq!(results_over_seeds(&query), vec!["cat", "dog"]);
}

#[test]
fn exclude_rule_filters() {
  let mut query = Query::of(ident("noun"));
  query.class_filter.push(ClassFilterRule { class_name: ident("animal"), include: false });
  assert_eq!(results_over_seeds(&query), vec!["apple", "banana", "university"]);
}

#[test]
fn include_rules_are_conjunctive() {
  let mut query = Query::of(ident("noun"));
  query.class_filter.push(ClassFilterRule { class_name: ident("fruit"), include: true });
  query.class_filter.push(ClassFilterRule { class_name: ident("red"), include: true });
  assert_eq!(results_over_seeds(&query), vec!["apple"]);
}

#[test]
fn mixed_rules_combine() {
  // Every include rule must match AND no exclude rule may match
  let mut query = Query::of(ident("noun"));
  query.class_filter.push(ClassFilterRule { class_name: ident("fruit"), include: true });
  query.class_filter.push(ClassFilterRule { class_name: ident("red"), include: false });
  assert_eq!(results_over_seeds(&query), vec!["banana"]);
}

#[test]
fn exclusive_mode_forbids_extra_classes() {
  // apple carries "red" beyond the include set, so only banana survives
  let mut query = Query::of(ident("noun"));
  query.exclusive = true;
  query.class_filter.push(ClassFilterRule { class_name: ident("fruit"), include: true });
  assert_eq!(results_over_seeds(&query), vec!["banana"]);
}

#[test]
fn filters_never_enlarge_the_result_set() {
  let mut base = Query::of(ident("noun"));
  base.class_filter.push(ClassFilterRule { class_name: ident("fruit"), include: true });
  let base_results = results_over_seeds(&base);

  // Adding an include rule
  let mut narrowed = Query::of(ident("noun"));
  narrowed.class_filter.push(ClassFilterRule { class_name: ident("fruit"), include: true });
  narrowed.class_filter.push(ClassFilterRule { class_name: ident("red"), include: true });
  for result in results_over_seeds(&narrowed) {
    assert!(base_results.contains(&result));
  }

  // Adding an exclude rule
  let mut excluded = Query::of(ident("noun"));
  excluded.class_filter.push(ClassFilterRule { class_name: ident("fruit"), include: true });
  excluded.class_filter.push(ClassFilterRule { class_name: ident("red"), include: false });
  for result in results_over_seeds(&excluded) {
    assert!(base_results.contains(&result));
  }
}

#[test]
fn regex_filters() {
  let mut query = Query::of(ident("noun"));
  query.regex_filters.push(RegexFilterRule {
    positive: true,
    regex: lang::RantRegex::compile("^c", false).unwrap(),
  });
  assert_eq!(results_over_seeds(&query), vec!["cat"]);

  let mut query = Query::of(ident("noun"));
  query.regex_filters.push(RegexFilterRule {
    positive: false,
    regex: lang::RantRegex::compile("a", false).unwrap(),
  });
  assert_eq!(results_over_seeds(&query), vec!["dog", "university"]);
}

#[test]
fn syllable_ranges() {
  let mut query = Query::of(ident("noun"));
  query.syllable_range = Some(SyllableRange { min: Some(2), max: Some(3) });
  assert_eq!(results_over_seeds(&query), vec!["apple", "banana"]);

  let mut query = Query::of(ident("noun"));
  query.syllable_range = Some(SyllableRange { min: Some(3), max: None });
  assert_eq!(results_over_seeds(&query), vec!["banana", "university"]);

  let mut query = Query::of(ident("noun"));
  query.syllable_range = Some(SyllableRange::exactly(1));
  assert_eq!(results_over_seeds(&query), vec!["cat", "dog"]);
}

#[test]
fn entries_without_syllable_data_fail_ranges() {
  let mut query = Query::of(ident("adj"));
  query.syllable_range = Some(SyllableRange { min: Some(1), max: None });
  assert_eq!(results_over_seeds(&query), vec!["loud"]);
}

#[test]
fn missing_table_is_a_miss() {
  let dict = test_dictionary();
  let rng = RantRng::new(0);
  let mut carriers = CarrierState::new();
  let query = Query::of(ident("verb"));
  assert_eq!(run_query(&query, &dict, &rng, &mut carriers), Err(QueryMiss::NoSuchTable));
}

#[test]
fn missing_subtype_is_a_miss() {
  let dict = test_dictionary();
  let rng = RantRng::new(0);
  let mut carriers = CarrierState::new();
  let mut query = Query::of(ident("noun"));
  query.subtype = Some(ident("bogus"));
  assert_eq!(run_query(&query, &dict, &rng, &mut carriers), Err(QueryMiss::NoSuchSubtype));
}

#[test]
fn empty_result_is_a_miss() {
  let dict = test_dictionary();
  let rng = RantRng::new(0);
  let mut carriers = CarrierState::new();
  let mut query = Query::of(ident("noun"));
  query.class_filter.push(ClassFilterRule { class_name: ident("animal"), include: true });
  query.class_filter.push(ClassFilterRule { class_name: ident("fruit"), include: true });
  assert_eq!(run_query(&query, &dict, &rng, &mut carriers), Err(QueryMiss::NoMatch));
}

#[test]
fn match_carrier_repeats_the_first_choice() {
  let dict = test_dictionary();
  for seed in 0..16 {
    let rng = RantRng::new(seed);
    let mut carriers = CarrierState::new();
    let mut query = Query::of(ident("noun"));
    query.carrier = Some(Carrier { id: ident("c"), kind: CarrierKind::Match });
    let first = run_query(&query, &dict, &rng, &mut carriers).unwrap();
    for _ in 0..8 {
      let again = run_query(&query, &dict, &rng, &mut carriers).unwrap();
      assert_eq!(first, again);
    }
  }
}

#[test]
fn unique_carrier_never_repeats() {
  let dict = test_dictionary();
  for seed in 0..16 {
    let rng = RantRng::new(seed);
    let mut carriers = CarrierState::new();
    let mut query = Query::of(ident("noun"));
    query.carrier = Some(Carrier { id: ident("u"), kind: CarrierKind::Unique });
    let mut seen: Vec<InternalString> = vec![];
    for _ in 0..5 {
      let term = run_query(&query, &dict, &rng, &mut carriers).unwrap();
      assert!(!seen.contains(&term), "unique carrier repeated '{}'", term);
      seen.push(term);
    }
    // All five entries are used up now
    assert_eq!(run_query(&query, &dict, &rng, &mut carriers), Err(QueryMiss::NoMatch));
  }
}

// ================================================================
// Pattern-level behavior
// ================================================================

#[test]
fn query_in_pattern() {
  let mut r = Rant::new();
  r.set_dictionary(test_dictionary());
  let pgm = r.compile_quiet("<noun-animal>").expect("failed to compile program");
  for seed in 0..16 {
    let out = r.run_seeded(&pgm, None, seed).expect("program failed").main;
    assert!(out == "cat" || out == "dog", "unexpected query result: {}", out);
  }
}

#[test]
fn query_subtype_in_pattern() {
  let mut r = Rant::new();
  r.set_dictionary(test_dictionary());
  let pgm = r.compile_quiet("<noun.plural-animal>").expect("failed to compile program");
  let out = r.run(&pgm).expect("program failed").main;
  assert!(out == "cats" || out == "dogs", "unexpected query result: {}", out);
}

#[test]
fn carrier_in_pattern() {
  let mut r = Rant::new();
  r.set_dictionary(test_dictionary());
  let pgm = r.compile_quiet("<noun::=pair> <noun::=pair>").expect("failed to compile program");
  for seed in 0..16 {
    let out = r.run_seeded(&pgm, None, seed).expect("program failed").main;
    let halves: Vec<&str> = out.split(' ').collect();
    assert_eq!(halves[0], halves[1]);
  }
}

#[test]
fn query_miss_is_soft() {
  let mut r = Rant::new();
  r.set_dictionary(test_dictionary());
  let pgm = r.compile_quiet("before <verb> after").expect("failed to compile program");
  let out = r.run(&pgm).expect("program failed").main;
  assert_eq!(out, "before [?verb] after");
}

#[test]
fn query_miss_without_dictionary() {
  let r = Rant::new();
  let pgm = r.compile_quiet("<noun.plural>").expect("failed to compile program");
  let out = r.run(&pgm).expect("program failed").main;
  assert_eq!(out, "[?noun.plural]");
}

#[test]
fn dictionary_capability_surface() {
  let dict = test_dictionary();
  let mut tables: Vec<&str> = dict.tables().collect();
  tables.sort_unstable();
  assert_eq!(tables, vec!["adj", "noun"]);

  let mut plurals = dict.entries("noun", Some("plural")).unwrap();
  plurals.sort_unstable();
  assert_eq!(plurals, vec!["apples", "bananas", "cats", "dogs", "universities"]);

  assert!(dict.entries("verb", None).is_none());

  let table = dict.table("adj").unwrap();
  let red = table.entries().find(|e| e.term(0) == "red").unwrap();
  assert_eq!(red.attribute("rhyme"), Some("ed"));
  assert_eq!(red.attributes_of().count(), 1);
}
