use once_cell::sync::Lazy;

/// Defines resolution behaviors for deferred indefinite articles.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u8)]
pub enum ArticleMode {
  /// Choose "a" or "an" heuristically from the following word.
  Auto,
  /// Always produce "a".
  A,
  /// Always produce "an".
  An,
}

impl Default for ArticleMode {
  fn default() -> Self {
    Self::Auto
  }
}

impl ArticleMode {
  pub fn from_name(name: &str) -> Option<Self> {
    Some(match name {
      "auto" => Self::Auto,
      "a" => Self::A,
      "an" => Self::An,
      _ => return None,
    })
  }
}

// Words that start with a vowel letter but an initial consonant sound
static A_PREFIXES: Lazy<Vec<&'static str>> = Lazy::new(|| vec![
  "eu", "ewe", "once", "one", "ubiq", "ufo", "uke", "unanim", "uni", "url",
  "usab", "usag", "use", "usin", "usu", "utah", "utens", "util", "uv",
]);

// Words that start with a consonant letter but an initial vowel sound
static AN_PREFIXES: Lazy<Vec<&'static str>> = Lazy::new(|| vec![
  "heir", "herb", "honest", "honor", "honour", "hour", "x-", "xbox", "xml",
]);

// Digits pronounced with an initial vowel sound
const AN_DIGITS: &[char] = &['8'];

/// Selects the indefinite article for the word that follows it.
pub fn indefinite_article_for(mode: ArticleMode, next_word: &str) -> &'static str {
  match mode {
    ArticleMode::A => return "a",
    ArticleMode::An => return "an",
    ArticleMode::Auto => {},
  }

  // Work from the first alphanumeric character onward
  let word: String = next_word.chars()
    .skip_while(|c| !c.is_alphanumeric())
    .flat_map(|c| c.to_lowercase())
    .collect();

  let first = match word.chars().next() {
    Some(c) => c,
    None => return "a",
  };

  if first.is_ascii_digit() {
    // "11" and "18" also open with a vowel sound
    if AN_DIGITS.contains(&first) || word.starts_with("11") || word.starts_with("18") {
      return "an"
    }
    return "a"
  }

  if A_PREFIXES.iter().any(|p| word.starts_with(p)) {
    return "a"
  }
  if AN_PREFIXES.iter().any(|p| word.starts_with(p)) {
    return "an"
  }

  if matches!(first, 'a' | 'e' | 'i' | 'o' | 'u') {
    "an"
  } else {
    "a"
  }
}
