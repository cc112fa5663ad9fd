/*
  Compiler Tests

  These verify diagnostics and error recovery in the lexer/parser pipeline.
*/

use rant::*;

use assert_matches::*;

/// Compiles a source and returns the collected messages along with the result.
fn compile(source: &str) -> (CompileResult, Vec<CompilerMessage>) {
  let r = Rant::new();
  let mut messages: Vec<CompilerMessage> = vec![];
  let result = r.compile(source, &mut messages);
  (result, messages)
}

macro_rules! assert_compiles {
  ($src:literal) => {{
    let (result, messages) = compile($src);
    assert!(result.is_ok(), "expected successful compile, got messages: {:?}", messages);
  }};
}

macro_rules! assert_fails_with {
  ($src:literal, $code:literal) => {{
    let (result, messages) = compile($src);
    assert_matches!(result, Err(CompilerErrorKind::SyntaxError));
    assert!(
      messages.iter().any(|m| m.code() == $code),
      "expected message {}, got: {:?}", $code, messages
    );
  }};
}

#[test]
fn benign_sources_compile() {
  assert_compiles!("");
  assert_compiles!("hello world");
  assert_compiles!("{a|b|c}");
  assert_compiles!("[rep:3][sep:,]{a}");
  assert_compiles!("$[f:x]{[:x]}[$f:1]");
  assert_compiles!("<noun-animal.plural?`^a`(2-3)$>");
  assert_compiles!("@(a;b;c)");
  assert_compiles!("%`a`:banana;o%");
  assert_compiles!("nested {a|{b|{c|d}}} blocks");
}

#[test]
fn unclosed_block_is_fatal() {
  let (result, messages) = compile("{a|b");
  assert_matches!(result, Err(CompilerErrorKind::SyntaxError));
  assert!(messages.iter().any(|m| m.code() == "R-0002" && m.severity() == Severity::Fatal));
}

#[test]
fn unclosed_tag_is_fatal() {
  assert_fails_with!("[rep:3", "R-0003");
}

#[test]
fn unclosed_query_is_fatal() {
  assert_fails_with!("<noun", "R-0040");
}

#[test]
fn unknown_function() {
  assert_fails_with!("[frobnicate]", "R-0030");
}

#[test]
fn special_constant_names_are_closed() {
  assert_compiles!("[@seed] [@version]");
  // '@' doesn't work as an alternate sigil for ordinary functions
  assert_fails_with!("[@rep:5]", "R-0033");
  assert_fails_with!("[@bogus]", "R-0033");
}

#[test]
fn wrong_arity() {
  assert_fails_with!("[rep]", "R-0031");
  assert_fails_with!("[rep:1;2]", "R-0031");
  assert_fails_with!("[if:a]", "R-0031");
  assert_fails_with!("[add:1]", "R-0031");
}

#[test]
fn trailing_backslash() {
  assert_fails_with!("oops\\", "R-0009");
}

#[test]
fn invalid_regex_pattern() {
  assert_fails_with!("%`(`:x;y%", "R-0010");
}

#[test]
fn unknown_regex_flag_is_warning_only() {
  let (result, messages) = compile("%`a`q:x;y%");
  assert!(result.is_ok());
  assert!(messages.iter().any(|m| m.code() == "R-1000" && m.severity() == Severity::Warning));
}

#[test]
fn duplicate_subroutine_parameter() {
  assert_fails_with!("$[f:a;a]{x}", "R-0022");
}

#[test]
fn query_with_multiple_subtypes() {
  assert_fails_with!("<noun.plural.singular>", "R-0041");
}

#[test]
fn query_subtype_after_exclusive() {
  assert_fails_with!("<noun$.plural>", "R-0042");
}

#[test]
fn query_empty_syllable_range() {
  assert_fails_with!("<noun()>", "R-0044");
}

#[test]
fn query_bad_syllable_range() {
  assert_fails_with!("<noun(x)>", "R-0045");
}

#[test]
fn query_unknown_clause_is_skipped() {
  // The bogus clause is reported, but the rest of the query still parses
  let (result, messages) = compile("<noun * -animal>");
  assert_matches!(result, Err(CompilerErrorKind::SyntaxError));
  assert!(messages.iter().any(|m| m.code() == "R-0046"));
  assert_eq!(messages.iter().filter(|m| m.is_error()).count(), 1);
}

#[test]
fn messages_carry_positions() {
  let (_, messages) = compile("abc\ndef[frobnicate]");
  let msg = messages.iter().find(|m| m.code() == "R-0030").expect("missing diagnostic");
  let pos = msg.pos().expect("diagnostic has no position");
  assert_eq!(pos.line(), 2);
}

#[test]
fn multiple_errors_accumulate() {
  let (result, messages) = compile("[nope][alsonope]");
  assert_matches!(result, Err(CompilerErrorKind::SyntaxError));
  assert_eq!(messages.iter().filter(|m| m.code() == "R-0030").count(), 2);
}

#[test]
fn error_recovery_after_bad_tag() {
  // A bad tag doesn't cascade into the rest of the program
  let (result, messages) = compile("[nope]{a|b}[rep:2]{c}");
  assert_matches!(result, Err(CompilerErrorKind::SyntaxError));
  assert_eq!(messages.iter().filter(|m| m.is_error()).count(), 1);
}

#[test]
fn program_name_canonicalization() {
  assert_eq!(canonicalize_program_name("a/ b /c").unwrap(), "a/b/c");
  assert_eq!(canonicalize_program_name("  story  ").unwrap(), "story");
  assert_eq!(canonicalize_program_name("a//b").unwrap(), "a/b");

  // Idempotence
  let once = canonicalize_program_name("x / y/z ").unwrap();
  assert_eq!(canonicalize_program_name(&once).unwrap(), once);

  assert!(canonicalize_program_name("").is_err());
  assert!(canonicalize_program_name("   ").is_err());
  assert!(canonicalize_program_name("bad?name").is_err());
  assert!(canonicalize_program_name("bad[name]").is_err());
  assert!(canonicalize_program_name("no|pipes").is_err());
}

#[test]
fn compile_named_rejects_bad_names() {
  let r = Rant::new();
  assert!(r.compile_named("hello", "greetings/basic", &mut ()).is_ok());
  assert!(r.compile_named("hello", "bad{name", &mut ()).is_err());
}

#[test]
fn named_program_uses_canonical_form() {
  let r = Rant::new();
  let pgm = r.compile_named("hello", "dir / name", &mut ()).unwrap();
  assert_eq!(pgm.name(), Some("dir/name"));
}

#[test]
fn function_registry_discovery() {
  let r = Rant::new();
  let funcs = r.functions();
  assert!(funcs.exists("rep"));
  assert!(funcs.exists("REP"), "lookup should be case-insensitive");
  assert!(funcs.exists("n"), "aliases should resolve");
  assert!(!funcs.exists("frobnicate"));
  assert!(funcs.get("sync").is_some());
  assert!(funcs.names().any(|n| n == "sep"));
  assert!(funcs.names_and_aliases().any(|n| n == "x"));
  assert!(funcs.description("rep", 1).is_some());
  assert!(funcs.description("rep", 5).is_none());
  assert!(funcs.aliases("sync").iter().any(|a| a == "x"));
}
