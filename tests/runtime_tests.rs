/*
  Runtime Tests

  These verify that the runtime (+ stdlib) works as expected.
  It is assumed that all test programs in this file compile successfully.
*/

use rant::*;

use assert_matches::*;

macro_rules! test_rant {
  ($src:literal, $expected:literal) => {{
    let r = Rant::new();
    let pgm = r.compile_quiet($src).expect("failed to compile program");
    assert_matches!(r.run(&pgm).as_ref().map(|o| o.main.as_str()), Ok($expected));
  }};
}

macro_rules! test_rant_raises {
  ($src:literal, $err_variant:pat) => {{
    let r = Rant::new();
    let pgm = r.compile_quiet($src).expect("failed to compile program");
    assert_matches!(r.run(&pgm).map(|o| o.main), Err(RuntimeError { error_type: $err_variant, .. }));
  }};
}

#[test]
fn empty_program() {
  test_rant!("", "");
}

#[test]
fn single_fragment() {
  test_rant!("foo", "foo");
}

#[test]
fn spaced_fragments() {
  test_rant!("foo bar", "foo bar");
}

#[test]
fn plain_punctuation() {
  test_rant!("Wait... really?!", "Wait... really?!");
}

#[test]
fn line_breaks_are_structural() {
  test_rant!("foo\n   bar", "foobar");
}

#[test]
fn single_branch_block() {
  test_rant!("{test}", "test");
}

#[test]
fn repeater() {
  test_rant!("[rep:10]{a}", "aaaaaaaaaa");
}

#[test]
fn repeater_each() {
  test_rant!("[rep:each][sync:s;ordered]{a|b|c}", "abc");
}

#[test]
fn repeater_with_separator() {
  test_rant!(r"[rep:3][sep:,\s]{a}", "a, a, a");
}

#[test]
fn repeater_with_block_separator() {
  test_rant!(r"[rep:3][sep:{b}]{a}", "ababa");
}

#[test]
fn separator_count() {
  test_rant!("[rep:5][sep:,]{x}", "x,x,x,x,x");
}

#[test]
fn separator_skipped_for_single_iteration() {
  test_rant!("[rep:1][sep:,]{x}", "x");
}

#[test]
fn before_and_after() {
  test_rant!(r"[rep:2][before:\<][after:\>]{x}", "<x><x>");
}

#[test]
fn repeater_hex_groups() {
  let r = Rant::new();
  let pgm = r.compile_quiet(r"[rep:4][sep:\s]{\8,x}").expect("failed to compile program");
  let out = r.run(&pgm).expect("program failed").main;
  assert_eq!(out.len(), 35);
  let groups: Vec<&str> = out.split(' ').collect();
  assert_eq!(groups.len(), 4);
  for group in groups {
    assert_eq!(group.len(), 8);
    assert!(group.chars().all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
  }
}

#[test]
fn counted_literal_escape() {
  test_rant!(r"\3,z", "zzz");
}

#[test]
fn selector_ordered() {
  test_rant!("[rep:16][sync:s;ordered]{a|b|c|d|e|f|g|h}", "abcdefghabcdefgh");
}

#[test]
fn selector_ping_pong() {
  test_rant!("[rep:16][sync:s;ping-pong]{a|b|c|d|e|f|g|h}", "abcdefghgfedcbab");
}

#[test]
fn selector_locked() {
  let r = Rant::new();
  let pgm = r.compile_quiet("[rep:8][sync:s;locked]{a|b|c|d}").expect("failed to compile program");
  let out = r.run(&pgm).expect("program failed").main;
  assert_eq!(out.len(), 8);
  let first = out.chars().next().unwrap();
  assert!(out.chars().all(|c| c == first));
}

#[test]
fn selector_no_repeat() {
  let r = Rant::new();
  for seed in 0..10 {
    let pgm = r.compile_quiet("[rep:40][sync:s;no-repeat]{a|b|c}").expect("failed to compile program");
    let out = r.run_seeded(&pgm, None, seed).expect("program failed").main;
    for pair in out.as_bytes().windows(2) {
      assert_ne!(pair[0], pair[1], "no-repeat selector repeated an index (seed {})", seed);
    }
  }
}

#[test]
fn selector_rand_shuffle() {
  let r = Rant::new();
  for seed in 0..10 {
    let pgm = r.compile_quiet("[rep:20][sync:s;rand-shuffle]{a|b|c|d}").expect("failed to compile program");
    let out = r.run_seeded(&pgm, None, seed).expect("program failed").main;
    let chars: Vec<char> = out.chars().collect();
    // Every cycle visits each branch exactly once
    for cycle in chars.chunks(4) {
      let mut sorted: Vec<char> = cycle.to_vec();
      sorted.sort_unstable();
      assert_eq!(sorted, vec!['a', 'b', 'c', 'd'], "cycle is not a permutation (seed {})", seed);
    }
    // A cycle never opens with the branch that closed the previous one
    for boundary in (4..20).step_by(4) {
      assert_ne!(chars[boundary - 1], chars[boundary], "shuffle repeated across cycle boundary (seed {})", seed);
    }
  }
}

#[test]
fn selector_continuous_deck() {
  let r = Rant::new();
  let pgm = r.compile_quiet("[rep:12][sync:s;cdeck]{a|b|c|d}").expect("failed to compile program");
  let out = r.run(&pgm).expect("program failed").main;
  let chars: Vec<char> = out.chars().collect();
  let first_cycle = &chars[..4];
  let mut sorted: Vec<char> = first_cycle.to_vec();
  sorted.sort_unstable();
  assert_eq!(sorted, vec!['a', 'b', 'c', 'd']);
  // Cycles continue cold: the same permutation repeats without reshuffling
  assert_eq!(first_cycle, &chars[4..8]);
  assert_eq!(first_cycle, &chars[8..12]);
}

#[test]
fn synchronized_blocks_share_sequence() {
  test_rant!(
    "[rep:4][sync:x;ordered]{a|b|c} [rep:4][sync:x;ordered]{a|b|c}",
    "abca abca"
  );
}

#[test]
fn pinned_synchronizer_holds_index() {
  test_rant!(
    "[rep:2][sync:x;ordered]{a|b|c}[syncpin:x][rep:3][sync:x]{a|b|c}[syncunpin:x][rep:4][sync:x]{a|b|c}",
    "abbbbabca"
  );
}

#[test]
fn weighted_branch_zero_never_picked() {
  test_rant!("[rep:10]{(0)a|b}", "bbbbbbbbbb");
}

#[test]
fn repeater_introspection() {
  test_rant!("[rep:3]{[repnum]}", "123");
  test_rant!("[rep:3]{[repindex]}", "012");
  test_rant!("[rep:3]{[repcount]}", "333");
}

#[test]
fn iteration_predicates() {
  test_rant!(r"[rep:3][sep:,]{[first:\<]x[last:\>]}", "<x,x,x>");
  test_rant!("[rep:4]{[odd:a][even:b]}", "abab");
  test_rant!("[rep:4][sep:-]{x[notlast:!]}", "x!-x!-x!-x");
  test_rant!("[rep:3]{x[notfirst:?]}", "xx?x?");
}

#[test]
fn nth_iterations() {
  test_rant!("[rep:6]{[nth:3;0;a]b}", "abbbabbb");
}

#[test]
fn conditionals() {
  test_rant!("[if:true;yes;no]", "yes");
  test_rant!("[if:false;yes;no]", "no");
  test_rant!("[if:0;yes;no]", "no");
  test_rant!("[if:1;yes]", "yes");
  test_rant!("[unless:false;yes]", "yes");
}

#[test]
fn arithmetic() {
  test_rant!("[add:2;3]", "5");
  test_rant!("[sub:2;3]", "-1");
  test_rant!("[mul:4;8]", "32");
  test_rant!("[div:1;2]", "0.5");
  test_rant!("[mod:7;3]", "1");
  test_rant!("[neg:4]", "-4");
  test_rant!("[add:[mul:2;3];1]", "7");
}

#[test]
fn division_by_zero_raises() {
  test_rant_raises!("[div:1;0]", RuntimeErrorType::ArgumentError);
}

#[test]
fn variables() {
  test_rant!("[:x;Rant][:x]", "Rant");
  test_rant!("[:x;a]{[:x;b]}[:x]", "b");
}

#[test]
fn branch_locals_are_scoped() {
  test_rant_raises!("{[:inner;5]}[:inner]", RuntimeErrorType::InvalidAccess);
}

#[test]
fn undefined_variable_raises() {
  test_rant_raises!("[:nope]", RuntimeErrorType::InvalidAccess);
}

#[test]
fn subroutines() {
  test_rant!("$[greet]{hello}[$greet]", "hello");
  test_rant!("$[greet:name]{Hello, [:name]!}[$greet:World]", "Hello, World!");
  test_rant!("$[pair:a;b]{[:a]-[:b]}[$pair:x;y]", "x-y");
}

#[test]
fn subroutine_wrong_arity_raises() {
  test_rant_raises!("$[f:a]{[:a]}[$f]", RuntimeErrorType::ArgumentMismatch);
}

#[test]
fn undefined_subroutine_raises() {
  test_rant_raises!("[$ghost]", RuntimeErrorType::UnknownSubroutine);
}

#[test]
fn module_table_collects_definitions() {
  let r = Rant::new();
  let pgm = r.compile_quiet("$[alpha]{a}$[beta:x]{[:x]}").expect("failed to compile program");
  assert!(pgm.module("alpha").is_some());
  assert!(pgm.module("beta").is_some());
  assert!(pgm.module("gamma").is_none());
  assert_eq!(pgm.modules().count(), 2);
}

#[test]
fn channels() {
  let r = Rant::new();
  let pgm = r.compile_quiet("[chan:extra;public;bonus]main").expect("failed to compile program");
  let out = r.run(&pgm).expect("program failed");
  // Public channels write through to the channels below them
  assert_eq!(out.main, "bonusmain");
  assert_eq!(out.channel("extra"), Some("bonus"));
}

#[test]
fn private_channel_excluded_from_result() {
  let r = Rant::new();
  let pgm = r.compile_quiet("[chan:secret;private;hidden]visible").expect("failed to compile program");
  let out = r.run(&pgm).expect("program failed");
  assert_eq!(out.main, "visible");
  assert_eq!(out.channel("secret"), None);
}

#[test]
fn internal_channel_merges_into_parent() {
  let r = Rant::new();
  let pgm = r.compile_quiet("a[chan:inner;internal;b]c").expect("failed to compile program");
  let out = r.run(&pgm).expect("program failed");
  assert_eq!(out.main, "abc");
  assert_eq!(out.channel("inner"), None);
}

#[test]
fn marks_and_deferred_send() {
  test_rant!(
    r#"The following word is [get:N] characters long: "[mark:a]X[mark:b]"[send:N;[dist:a;b]]"#,
    r#"The following word is 1 characters long: "X""#
  );
}

#[test]
fn send_to_undeclared_target_raises() {
  test_rant_raises!("[send:nope;x]", RuntimeErrorType::InvalidTarget);
}

#[test]
fn dist_on_unknown_mark_raises() {
  test_rant_raises!("[dist:a;b]", RuntimeErrorType::InvalidMark);
}

#[test]
fn verbal_english_numbers() {
  test_rant!("[numfmt:verbal-en][num:1;1]", "one");
  test_rant!("[numfmt:verbal-en][num:42;42]", "forty-two");
  test_rant!("[numfmt:verbal-en][num:1234;1234]", "one thousand two hundred thirty-four");
  test_rant!("[numfmt:verbal-en][num:0;0]", "zero");
}

#[test]
fn numeral_systems() {
  test_rant!("[numfmt:roman][num:12;12]", "xii");
  test_rant!("[numfmt:binary][num:5;5]", "101");
  test_rant!("[numfmt:hex][num:255;255]", "ff");
  test_rant!("[numfmt:octal][num:9;9]", "11");
}

#[test]
fn digit_endianness() {
  test_rant!("[digits:little][num:123;123]", "321");
  test_rant!("[digits:little][num:-45;-45]", "-54");
}

#[test]
fn number_format_scoped_to_branch() {
  test_rant!("{[numfmt:roman][num:4;4]}-[num:4;4]", "iv-4");
}

#[test]
fn capitalization() {
  test_rant!("[caps:upper]hello", "HELLO");
  test_rant!("[caps:lower]HELLO", "hello");
  test_rant!("[caps:first]hello world", "Hello world");
  test_rant!("[caps:word]hello world", "Hello World");
  test_rant!("[caps:sentence]hi there. bye now.", "Hi there. Bye now.");
}

#[test]
fn indefinite_articles() {
  test_rant!(r"\a apple", "an apple");
  test_rant!(r"\a banana", "a banana");
  test_rant!(r"\a hour", "an hour");
  test_rant!(r"\a university", "a university");
  test_rant!(r"[caps:first]\a apple", "An apple");
}

#[test]
fn replacer() {
  test_rant!("%`a`:banana;o%", "bonono");
  test_rant!("%`[aeiou]`:hello world;_%", "h_ll_ w_rld");
  test_rant!("%`A`i:banana;o%", "bonono");
}

#[test]
fn list_literal() {
  test_rant!("@(a;b;c)", "a, b, c");
  test_rant!("[sep:-]@(a;b;c)", "a-b-c");
}

#[test]
fn generators() {
  test_rant!("[maybe:1;x]", "x");
  test_rant!("[maybe:0;x]", "");
  test_rant!("[num:7;7]", "7");
}

#[test]
fn hex_function() {
  let r = Rant::new();
  let pgm = r.compile_quiet("[hex:16]").expect("failed to compile program");
  let out = r.run(&pgm).expect("program failed").main;
  assert_eq!(out.len(), 16);
  assert!(out.chars().all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
}

#[test]
fn string_length() {
  test_rant!("[len:hello]", "5");
}

#[test]
fn special_constants() {
  test_rant!("[@seed]", "0");
  test_rant!("[@version]", "3.0");
}

#[test]
fn program_args() {
  let r = Rant::new();
  let pgm = r.compile_quiet("Hello, [arg:name]! You are [:age].").expect("failed to compile program");
  let args = ProgramArgs::new()
    .arg("name", "Rant")
    .arg_as("years", "age", "9");
  let out = r.run_with(&pgm, &args).expect("program failed");
  assert_eq!(out.main, "Hello, Rant! You are 9.");
}

#[test]
fn determinism() {
  let r = Rant::new();
  let pgm = r.compile_quiet(r"[rep:8][sep:\s]{\4,x|[num:0;100]|{a|b|c}}").expect("failed to compile program");
  let a = r.run_seeded(&pgm, None, 123).expect("program failed").main;
  let b = r.run_seeded(&pgm, None, 123).expect("program failed").main;
  assert_eq!(a, b);
}

#[test]
fn step_budget_enforced() {
  let r = Rant::with_options(RantOptions {
    limits: RuntimeLimits {
      max_steps: 500,
      .. Default::default()
    },
    .. Default::default()
  });
  let pgm = r.compile_quiet("[rep:100000]{a}").expect("failed to compile program");
  assert_matches!(
    r.run(&pgm).map(|o| o.main),
    Err(RuntimeError { error_type: RuntimeErrorType::StepBudgetExceeded, .. })
  );
}

#[test]
fn output_budget_enforced() {
  let r = Rant::with_options(RantOptions {
    limits: RuntimeLimits {
      max_output: 64,
      .. Default::default()
    },
    .. Default::default()
  });
  let pgm = r.compile_quiet("[rep:100000]{abcdefgh}").expect("failed to compile program");
  assert_matches!(
    r.run(&pgm).map(|o| o.main),
    Err(RuntimeError { error_type: RuntimeErrorType::OutputBudgetExceeded, .. })
  );
}

#[test]
fn runtime_error_carries_span() {
  let r = Rant::new();
  let pgm = r.compile_quiet("abc[dist:a;b]").expect("failed to compile program");
  let err = r.run(&pgm).map(|o| o.main).expect_err("expected a runtime error");
  assert_eq!(err.span, Some(3..13));
}
