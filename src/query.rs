//! The `query` module contains the dictionary query model and the filter engine
//! that resolves a query to a single entry.

use std::fmt::Display;
use fnv::{FnvHashMap, FnvHashSet};
use crate::InternalString;
use crate::lang::{Identifier, RantRegex};
use crate::random::RantRng;
use crate::table::RantDictionary;

/// A compiled dictionary query, e.g. `<noun-animal.plural?`^a`(2-3)$>`.
#[derive(Debug, PartialEq)]
pub struct Query {
  /// Name of the table to query.
  pub table: Identifier,
  /// Subtype column; the table's default subtype if unset.
  pub subtype: Option<Identifier>,
  /// Class filter rules, combined per the exclusivity mode.
  pub class_filter: Vec<ClassFilterRule>,
  /// Regex filters applied to the entry's surface form.
  pub regex_filters: Vec<RegexFilterRule>,
  /// Inclusive syllable-count range.
  pub syllable_range: Option<SyllableRange>,
  /// In exclusive mode, entries may carry no class outside the include set.
  pub exclusive: bool,
  /// Optional result carrier shared between queries.
  pub carrier: Option<Carrier>,
}

impl Query {
  /// Creates a query over a table with no filters.
  pub fn of(table: Identifier) -> Self {
    Self {
      table,
      subtype: None,
      class_filter: vec![],
      regex_filters: vec![],
      syllable_range: None,
      exclusive: false,
      carrier: None,
    }
  }
}

impl Display for Query {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.table)?;
    if let Some(subtype) = &self.subtype {
      write!(f, ".{}", subtype)?;
    }
    Ok(())
  }
}

/// A single class filter term. `include == false` blacklists the class.
#[derive(Debug, PartialEq)]
pub struct ClassFilterRule {
  pub class_name: Identifier,
  pub include: bool,
}

/// A single regex filter term. Positive rules must match the surface form;
/// negative rules must not.
#[derive(Debug, PartialEq)]
pub struct RegexFilterRule {
  pub positive: bool,
  pub regex: RantRegex,
}

/// An inclusive syllable-count range; an open side imposes no bound.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct SyllableRange {
  pub min: Option<usize>,
  pub max: Option<usize>,
}

impl SyllableRange {
  /// Creates the range matching exactly `n` syllables.
  pub fn exactly(n: usize) -> Self {
    Self { min: Some(n), max: Some(n) }
  }

  #[inline]
  pub fn contains(&self, syllables: usize) -> bool {
    self.min.map_or(true, |min| syllables >= min)
      && self.max.map_or(true, |max| syllables <= max)
  }
}

/// Identifies a query result across queries sharing the carrier id.
#[derive(Debug, Clone, PartialEq)]
pub struct Carrier {
  pub id: Identifier,
  pub kind: CarrierKind,
}

/// Defines available carrier behaviors.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u8)]
pub enum CarrierKind {
  /// All queries sharing the carrier yield the entry chosen by the first.
  Match,
  /// All queries sharing the carrier yield pairwise distinct entries.
  Unique,
}

/// Reasons a query can miss. Misses are soft: the runtime appends a
/// diagnostic token to the output and continues.
#[derive(Debug, PartialEq)]
pub enum QueryMiss {
  /// The requested table does not exist in the dictionary.
  NoSuchTable,
  /// The requested subtype is not a column of the table.
  NoSuchSubtype,
  /// No entry survived the query's filters.
  NoMatch,
}

/// Per-execution carrier memory. Keys pair the carrier id with the table name
/// so that unrelated tables sharing a carrier id do not collide.
#[derive(Debug, Default)]
pub struct CarrierState {
  matched: FnvHashMap<(InternalString, InternalString), usize>,
  used: FnvHashMap<(InternalString, InternalString), FnvHashSet<usize>>,
}

impl CarrierState {
  pub fn new() -> Self {
    Default::default()
  }

  #[inline]
  fn key(carrier: &Carrier, table: &str) -> (InternalString, InternalString) {
    (InternalString::from(carrier.id.as_str()), InternalString::from(table))
  }
}

/// Resolves a query against a dictionary, returning the chosen entry's surface form.
///
/// Filters are applied in a fixed order (classes, regexes, syllables, carrier),
/// but rule ordering never affects the surviving set; the final pick is uniform
/// over the survivors using the engine RNG.
pub fn run_query(
  query: &Query,
  dict: &RantDictionary,
  rng: &RantRng,
  carriers: &mut CarrierState,
) -> Result<InternalString, QueryMiss> {
  let table = dict.table(query.table.as_str()).ok_or(QueryMiss::NoSuchTable)?;

  let subtype_index = match &query.subtype {
    Some(subtype) => table.subtype_index(subtype.as_str()).ok_or(QueryMiss::NoSuchSubtype)?,
    None => 0,
  };

  let mut candidates: Vec<usize> = (0..table.len()).collect();

  // Class rules: includes are conjunctive, excludes remove matches
  candidates.retain(|&i| {
    let entry = table.entry(i).unwrap();
    query.class_filter.iter().all(|rule| {
      entry.has_class(rule.class_name.as_str()) == rule.include
    })
  });

  // Exclusive mode additionally forbids classes beyond the include set
  if query.exclusive {
    candidates.retain(|&i| {
      let entry = table.entry(i).unwrap();
      entry.classes().all(|class| {
        query.class_filter.iter().any(|rule| rule.include && rule.class_name.as_str() == class)
      })
    });
  }

  for rule in &query.regex_filters {
    candidates.retain(|&i| {
      let term = table.entry(i).unwrap().term(subtype_index);
      rule.regex.is_match(term) == rule.positive
    });
  }

  if let Some(range) = &query.syllable_range {
    candidates.retain(|&i| {
      table.entry(i).unwrap().syllables().map_or(false, |n| range.contains(n))
    });
  }

  let chosen = match &query.carrier {
    Some(carrier @ Carrier { kind: CarrierKind::Match, .. }) => {
      let key = CarrierState::key(carrier, table.name());
      match carriers.matched.get(&key) {
        // Later queries inherit the first query's choice
        Some(&index) => index,
        None => {
          if candidates.is_empty() {
            return Err(QueryMiss::NoMatch)
          }
          let index = candidates[rng.next_usize(candidates.len())];
          carriers.matched.insert(key, index);
          index
        }
      }
    },
    Some(carrier @ Carrier { kind: CarrierKind::Unique, .. }) => {
      let key = CarrierState::key(carrier, table.name());
      let used = carriers.used.entry(key).or_default();
      candidates.retain(|i| !used.contains(i));
      if candidates.is_empty() {
        return Err(QueryMiss::NoMatch)
      }
      let index = candidates[rng.next_usize(candidates.len())];
      used.insert(index);
      index
    },
    None => {
      if candidates.is_empty() {
        return Err(QueryMiss::NoMatch)
      }
      candidates[rng.next_usize(candidates.len())]
    },
  };

  Ok(InternalString::from(table.entry(chosen).unwrap().term(subtype_index)))
}
