/*
  Codec Tests

  These verify the binary program format: round-tripping, magic validation,
  and behavioral equivalence of loaded programs.
*/

use rant::*;

use assert_matches::*;

const ROUND_TRIP_SOURCES: &[&str] = &[
  "",
  "hello world",
  "{a|b|c}",
  "[rep:4][sep:,\\s]{a|b}",
  "[rep:3]{[repnum]}",
  "{(2)a|(0.5)b|c}",
  "$[greet:name]{Hello, [:name]!}[$greet:World]",
  "[:x;1][add:[:x];2]",
  "[if:true;yes;no][unless:false;also]",
  "@(a;b;c)",
  "%`[aeiou]`i:pattern;_%",
  "[chan:extra;public;bonus]main",
  "[mark:a]text[mark:b][get:t][send:t;[dist:a;b]]",
  "\\a apple and \\3,x",
  "<noun-animal.plural?`^a`~`q`(2-3)$::=c>",
  "[numfmt:verbal-en][num:1;10][caps:word]words here",
];

fn dictionary() -> RantDictionary {
  let mut dict = RantDictionary::new();
  let mut nouns = RantTable::new("noun", &["singular", "plural"]);
  nouns.add_entry(RantEntry::new(&["apple", "apples"]).with_classes(&["animal"]).with_syllables(2));
  nouns.add_entry(RantEntry::new(&["ant", "ants"]).with_classes(&["animal"]).with_syllables(1));
  dict.add_table(nouns);
  dict
}

#[test]
fn saved_programs_open_with_magic() {
  let r = Rant::new();
  let pgm = r.compile_quiet("hello").expect("failed to compile program");
  let bytes = pgm.save();
  assert_eq!(&bytes[..4], &PROGRAM_MAGIC[..]);
}

#[test]
fn binary_round_trip_is_stable() {
  let r = Rant::new();
  for source in ROUND_TRIP_SOURCES {
    let pgm = r.compile_quiet(source).unwrap_or_else(|_| panic!("failed to compile: {}", source));
    let bytes = pgm.save();
    let loaded = RantProgram::load(&bytes).unwrap_or_else(|_| panic!("failed to load: {}", source));
    // Re-serializing the loaded tree reproduces the bytes exactly
    assert_eq!(loaded.save(), bytes, "round trip altered program: {}", source);
  }
}

#[test]
fn loaded_programs_behave_identically() {
  let mut r = Rant::new();
  r.set_dictionary(dictionary());
  for source in ROUND_TRIP_SOURCES {
    let pgm = r.compile_quiet(source).unwrap_or_else(|_| panic!("failed to compile: {}", source));
    let loaded = RantProgram::load(&pgm.save()).expect("failed to load program");
    for seed in 0..8 {
      let original = r.run_seeded(&pgm, None, seed).expect("original program failed");
      let reloaded = r.run_seeded(&loaded, None, seed).expect("loaded program failed");
      assert_eq!(original.main, reloaded.main, "output diverged for: {}", source);
      assert_eq!(original.channels, reloaded.channels, "channels diverged for: {}", source);
    }
  }
}

#[test]
fn query_survives_round_trip() {
  let mut r = Rant::new();
  r.set_dictionary(dictionary());
  let pgm = r.compile_quiet("<noun.plural>").expect("failed to compile program");
  let loaded = RantProgram::load(&pgm.save()).expect("failed to load program");
  for seed in 0..8 {
    let original = r.run_seeded(&pgm, None, seed).expect("original program failed").main;
    let reloaded = r.run_seeded(&loaded, None, seed).expect("loaded program failed").main;
    assert!(original == "apples" || original == "ants");
    assert_eq!(original, reloaded);
  }
}

#[test]
fn loaded_programs_report_stream_origin() {
  let r = Rant::new();
  let pgm = r.compile_quiet("x").expect("failed to compile program");
  let loaded = RantProgram::load(&pgm.save()).expect("failed to load program");
  assert_eq!(loaded.origin(), &ProgramOrigin::Stream);
}

#[test]
fn module_table_rebuilt_on_load() {
  let r = Rant::new();
  let pgm = r.compile_quiet("$[alpha]{a}$[beta:x]{[:x]}").expect("failed to compile program");
  let loaded = RantProgram::load(&pgm.save()).expect("failed to load program");
  assert!(loaded.module("alpha").is_some());
  assert!(loaded.module("beta").is_some());
}

#[test]
fn bad_magic_is_rejected() {
  assert_matches!(RantProgram::load(b"NOPE"), Err(ProgramLoadError::BadMagic));
  assert_matches!(RantProgram::load(b""), Err(ProgramLoadError::BadMagic));
  assert_matches!(RantProgram::load(b"RPG"), Err(ProgramLoadError::BadMagic));
}

#[test]
fn unknown_type_id_is_rejected() {
  let mut bytes = PROGRAM_MAGIC.to_vec();
  // One node with a type id far outside the known set
  bytes.push(1);
  bytes.push(0x7f);
  bytes.push(0);
  bytes.push(0);
  assert_matches!(RantProgram::load(&bytes), Err(ProgramLoadError::UnknownTypeId(0x7f)));
}

#[test]
fn truncated_programs_are_rejected() {
  let r = Rant::new();
  let pgm = r.compile_quiet("[rep:3][sep:,]{a|b}").expect("failed to compile program");
  let bytes = pgm.save();
  for len in 4..bytes.len() {
    assert!(RantProgram::load(&bytes[..len]).is_err(), "truncation to {} bytes loaded", len);
  }
}

#[test]
fn trailing_garbage_is_rejected() {
  let r = Rant::new();
  let pgm = r.compile_quiet("abc").expect("failed to compile program");
  let mut bytes = pgm.save();
  bytes.push(0);
  assert_matches!(RantProgram::load(&bytes), Err(ProgramLoadError::InvalidData(_)));
}
