//! Dictionary model: tables of entries queried by patterns.
//!
//! The on-disk dictionary format is host-defined; dictionaries are built
//! programmatically through this module and handed to the runtime.

use fnv::FnvHashMap;
use crate::InternalString;

/// A set of named tables queryable from Rant patterns.
#[derive(Debug, Default)]
pub struct RantDictionary {
  tables: FnvHashMap<InternalString, RantTable>,
}

impl RantDictionary {
  /// Creates an empty dictionary.
  pub fn new() -> Self {
    Default::default()
  }

  /// Adds a table, replacing any existing table with the same name.
  pub fn add_table(&mut self, table: RantTable) {
    self.tables.insert(InternalString::from(table.name()), table);
  }

  /// Iterates over the names of all tables.
  pub fn tables(&self) -> impl Iterator<Item = &str> {
    self.tables.keys().map(|k| k.as_str())
  }

  /// Gets a table by name.
  pub fn table(&self, name: &str) -> Option<&RantTable> {
    self.tables.get(name)
  }

  /// Gets the surface forms of every entry in a table under the specified subtype.
  /// The default subtype is used when `subtype` is `None`.
  pub fn entries(&self, table: &str, subtype: Option<&str>) -> Option<Vec<&str>> {
    let table = self.table(table)?;
    let index = match subtype {
      Some(subtype) => table.subtype_index(subtype)?,
      None => 0,
    };
    Some(table.entries().map(|e| e.term(index)).collect())
  }
}

/// A single dictionary table: a list of entries sharing a set of subtype columns.
#[derive(Debug)]
pub struct RantTable {
  name: InternalString,
  subtypes: Vec<InternalString>,
  entries: Vec<RantEntry>,
}

impl RantTable {
  /// Creates an empty table. The first subtype is the default one;
  /// a table with no subtypes gets a single anonymous column.
  pub fn new(name: &str, subtypes: &[&str]) -> Self {
    Self {
      name: InternalString::from(name),
      subtypes: subtypes.iter().map(|s| InternalString::from(*s)).collect(),
      entries: vec![],
    }
  }

  pub fn name(&self) -> &str {
    self.name.as_str()
  }

  /// Number of term columns per entry.
  #[inline]
  pub fn subtype_count(&self) -> usize {
    self.subtypes.len().max(1)
  }

  /// Resolves a subtype name to its column index.
  pub fn subtype_index(&self, subtype: &str) -> Option<usize> {
    self.subtypes.iter().position(|s| s == subtype)
  }

  pub fn add_entry(&mut self, entry: RantEntry) {
    self.entries.push(entry);
  }

  pub fn entries(&self) -> impl Iterator<Item = &RantEntry> {
    self.entries.iter()
  }

  #[inline]
  pub fn entry(&self, index: usize) -> Option<&RantEntry> {
    self.entries.get(index)
  }

  #[inline]
  pub fn len(&self) -> usize {
    self.entries.len()
  }

  #[inline]
  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }
}

/// One dictionary entry: a term per subtype, classes, optional syllable count,
/// and an opaque attribute set (pronunciation data and the like).
#[derive(Debug, Default)]
pub struct RantEntry {
  terms: Vec<InternalString>,
  classes: Vec<InternalString>,
  syllables: Option<usize>,
  attributes: FnvHashMap<InternalString, InternalString>,
}

impl RantEntry {
  /// Creates an entry from its terms, in subtype column order.
  /// Missing columns fall back to the first term.
  pub fn new(terms: &[&str]) -> Self {
    Self {
      terms: terms.iter().map(|t| InternalString::from(*t)).collect(),
      .. Default::default()
    }
  }

  pub fn with_classes(mut self, classes: &[&str]) -> Self {
    self.classes = classes.iter().map(|c| InternalString::from(*c)).collect();
    self
  }

  pub fn with_syllables(mut self, syllables: usize) -> Self {
    self.syllables = Some(syllables);
    self
  }

  pub fn with_attribute(mut self, key: &str, value: &str) -> Self {
    self.attributes.insert(InternalString::from(key), InternalString::from(value));
    self
  }

  /// Gets the surface form for a subtype column.
  pub fn term(&self, subtype_index: usize) -> &str {
    self.terms.get(subtype_index)
      .or_else(|| self.terms.first())
      .map(|t| t.as_str())
      .unwrap_or("")
  }

  #[inline]
  pub fn has_class(&self, class: &str) -> bool {
    self.classes.iter().any(|c| c == class)
  }

  pub fn classes(&self) -> impl Iterator<Item = &str> {
    self.classes.iter().map(|c| c.as_str())
  }

  #[inline]
  pub fn syllables(&self) -> Option<usize> {
    self.syllables
  }

  /// Gets an attribute value by key.
  pub fn attribute(&self, key: &str) -> Option<&str> {
    self.attributes.get(key).map(|v| v.as_str())
  }

  /// Iterates over the entry's attribute set.
  pub fn attributes_of(&self) -> impl Iterator<Item = (&str, &str)> {
    self.attributes.iter().map(|(k, v)| (k.as_str(), v.as_str()))
  }
}
