//! The built-in function catalog. Every function is registered explicitly at
//! startup; the compiler resolves tag names and arities against this set.

use std::rc::Rc;

use crate::format::{ArticleMode, CapsMode, Endianness, NumeralSystem};
use crate::func::*;
use crate::runtime::{RuntimeError, RuntimeErrorType, RuntimeResult, SelectorMode, VM};
use crate::runtime::resolver::Reps;

fn argument_error(description: String) -> RuntimeError {
  RuntimeError {
    error_type: RuntimeErrorType::ArgumentError,
    description,
    span: None,
    stack_trace: None,
  }
}

fn op_error(description: &str) -> RuntimeError {
  RuntimeError {
    error_type: RuntimeErrorType::InvalidOperation,
    description: description.to_owned(),
    span: None,
    stack_trace: None,
  }
}

fn parse_int(text: &str) -> RuntimeResult<i64> {
  text.trim().parse().map_err(|_| argument_error(format!("cannot convert '{}' to an integer", text)))
}

fn parse_float(text: &str) -> RuntimeResult<f64> {
  text.trim().parse().map_err(|_| argument_error(format!("cannot convert '{}' to a number", text)))
}

/// Reads the active block's (iteration, total) pair, for the repeater functions.
fn block_iteration(vm: &VM) -> RuntimeResult<(usize, usize)> {
  match vm.active_block() {
    Some(state) => Ok((state.iteration(), state.total_reps())),
    None => Err(op_error("this function may only be called inside a block")),
  }
}

// ================================================================
// Block attributes
// ================================================================

fn rep(vm: &mut VM, args: Vec<RantFuncArg>) -> RantStdResult {
  let count = args[0].as_cooked()?;
  let reps = if count.trim().eq_ignore_ascii_case("each") {
    Reps::Each
  } else {
    let n = parse_int(count)?;
    if n < 0 {
      return Err(argument_error(format!("repetition count cannot be negative: {}", n)))
    }
    Reps::Finite(n as usize)
  };
  vm.resolver_mut().attrs_mut().reps = reps;
  Ok(())
}

fn sep(vm: &mut VM, args: Vec<RantFuncArg>) -> RantStdResult {
  vm.resolver_mut().attrs_mut().sep = Some(Rc::clone(args[0].as_raw()?));
  Ok(())
}

fn before(vm: &mut VM, args: Vec<RantFuncArg>) -> RantStdResult {
  vm.resolver_mut().attrs_mut().before = Some(Rc::clone(args[0].as_raw()?));
  Ok(())
}

fn after(vm: &mut VM, args: Vec<RantFuncArg>) -> RantStdResult {
  vm.resolver_mut().attrs_mut().after = Some(Rc::clone(args[0].as_raw()?));
  Ok(())
}

// ================================================================
// Synchronizers
// ================================================================

fn sync(vm: &mut VM, args: Vec<RantFuncArg>) -> RantStdResult {
  let name = args[0].as_cooked()?.trim().to_owned();
  let sync = if args.len() > 1 {
    let mode_name = args[1].as_cooked()?.trim().to_owned();
    let mode = SelectorMode::from_name(&mode_name)
      .ok_or_else(|| argument_error(format!("unknown selector mode: '{}'", mode_name)))?;
    vm.resolver_mut().get_or_create_sync(&name, mode)
  } else {
    match vm.resolver_mut().sync(&name) {
      Some(sync) => Rc::clone(sync),
      None => return Err(argument_error(format!("synchronizer '{}' does not exist", name))),
    }
  };
  vm.resolver_mut().attrs_mut().sync = Some(sync);
  Ok(())
}

fn syncpin(vm: &mut VM, args: Vec<RantFuncArg>) -> RantStdResult {
  let name = args[0].as_cooked()?.trim().to_owned();
  match vm.resolver_mut().sync(&name) {
    Some(sync) => {
      sync.borrow_mut().set_pinned(true);
      Ok(())
    },
    None => Err(argument_error(format!("synchronizer '{}' does not exist", name))),
  }
}

fn syncunpin(vm: &mut VM, args: Vec<RantFuncArg>) -> RantStdResult {
  let name = args[0].as_cooked()?.trim().to_owned();
  match vm.resolver_mut().sync(&name) {
    Some(sync) => {
      sync.borrow_mut().set_pinned(false);
      Ok(())
    },
    None => Err(argument_error(format!("synchronizer '{}' does not exist", name))),
  }
}

fn syncreset(vm: &mut VM, args: Vec<RantFuncArg>) -> RantStdResult {
  let name = args[0].as_cooked()?.trim().to_owned();
  match vm.resolver_mut().sync(&name) {
    Some(sync) => {
      sync.borrow_mut().reset();
      Ok(())
    },
    None => Err(argument_error(format!("synchronizer '{}' does not exist", name))),
  }
}

// ================================================================
// Repeater introspection
// ================================================================

fn repnum(vm: &mut VM, _: Vec<RantFuncArg>) -> RantStdResult {
  let (iteration, _) = block_iteration(vm)?;
  vm.print_integer(iteration as i64)
}

fn repindex(vm: &mut VM, _: Vec<RantFuncArg>) -> RantStdResult {
  let (iteration, _) = block_iteration(vm)?;
  vm.print_integer(iteration as i64 - 1)
}

fn repcount(vm: &mut VM, _: Vec<RantFuncArg>) -> RantStdResult {
  let (_, total) = block_iteration(vm)?;
  vm.print_integer(total as i64)
}

fn run_on_iteration<F: FnOnce(usize, usize) -> bool>(vm: &mut VM, args: Vec<RantFuncArg>, predicate: F) -> RantStdResult {
  let body = Rc::clone(args.last().unwrap().as_raw()?);
  let (iteration, total) = block_iteration(vm)?;
  if predicate(iteration, total) {
    vm.exec_seq(&body)?;
  }
  Ok(())
}

fn first(vm: &mut VM, args: Vec<RantFuncArg>) -> RantStdResult {
  run_on_iteration(vm, args, |iteration, _| iteration == 1)
}

fn notfirst(vm: &mut VM, args: Vec<RantFuncArg>) -> RantStdResult {
  run_on_iteration(vm, args, |iteration, _| iteration > 1)
}

fn last(vm: &mut VM, args: Vec<RantFuncArg>) -> RantStdResult {
  run_on_iteration(vm, args, |iteration, total| iteration == total)
}

fn notlast(vm: &mut VM, args: Vec<RantFuncArg>) -> RantStdResult {
  run_on_iteration(vm, args, |iteration, total| iteration < total)
}

fn even(vm: &mut VM, args: Vec<RantFuncArg>) -> RantStdResult {
  run_on_iteration(vm, args, |iteration, _| iteration % 2 == 0)
}

fn odd(vm: &mut VM, args: Vec<RantFuncArg>) -> RantStdResult {
  run_on_iteration(vm, args, |iteration, _| iteration % 2 == 1)
}

fn nth(vm: &mut VM, args: Vec<RantFuncArg>) -> RantStdResult {
  let interval = parse_int(args[0].as_cooked()?)?;
  let offset = parse_int(args[1].as_cooked()?)?;
  if interval <= 0 {
    return Err(argument_error(format!("nth interval must be positive: {}", interval)))
  }
  run_on_iteration(vm, args, |iteration, _| {
    (iteration as i64 - 1) % interval == offset
  })
}

// ================================================================
// Generators
// ================================================================

fn num(vm: &mut VM, args: Vec<RantFuncArg>) -> RantStdResult {
  let a = parse_int(args[0].as_cooked()?)?;
  let b = parse_int(args[1].as_cooked()?)?;
  let n = vm.rng().next_i64(a, b);
  vm.print_integer(n)
}

fn numf(vm: &mut VM, args: Vec<RantFuncArg>) -> RantStdResult {
  let a = parse_float(args[0].as_cooked()?)?;
  let b = parse_float(args[1].as_cooked()?)?;
  let n = vm.rng().next_f64(a, b);
  vm.print_number(n)
}

fn random_chars(vm: &mut VM, charset: &[u8], count: usize) -> RantStdResult {
  let mut text = String::with_capacity(count);
  for _ in 0..count {
    text.push(charset[vm.rng().next_usize(charset.len())] as char);
  }
  vm.print(&text)
}

fn hex(vm: &mut VM, args: Vec<RantFuncArg>) -> RantStdResult {
  let count = match args.first() {
    Some(arg) => parse_int(arg.as_cooked()?)?.max(0) as usize,
    None => 1,
  };
  random_chars(vm, b"0123456789abcdef", count)
}

fn dec(vm: &mut VM, args: Vec<RantFuncArg>) -> RantStdResult {
  let count = match args.first() {
    Some(arg) => parse_int(arg.as_cooked()?)?.max(0) as usize,
    None => 1,
  };
  random_chars(vm, b"0123456789", count)
}

fn maybe(vm: &mut VM, args: Vec<RantFuncArg>) -> RantStdResult {
  let p = parse_float(args[0].as_cooked()?)?;
  if args.len() > 1 {
    let body = Rc::clone(args[1].as_raw()?);
    if vm.rng().next_bool(p) {
      vm.exec_seq(&body)?;
    }
    Ok(())
  } else {
    let b = vm.rng().next_bool(p);
    vm.print(if b { "true" } else { "false" })
  }
}

fn either(vm: &mut VM, args: Vec<RantFuncArg>) -> RantStdResult {
  let pick = vm.rng().next_bool(0.5);
  let text = if pick { args[0].as_cooked()? } else { args[1].as_cooked()? }.to_owned();
  vm.print(&text)
}

fn seed(vm: &mut VM, _: Vec<RantFuncArg>) -> RantStdResult {
  let seed = vm.seed() as i64;
  vm.print_integer(seed)
}

fn version(vm: &mut VM, _: Vec<RantFuncArg>) -> RantStdResult {
  let version = vm.version();
  vm.print(version)
}

// ================================================================
// Formatting
// ================================================================

fn numfmt(vm: &mut VM, args: Vec<RantFuncArg>) -> RantStdResult {
  let name = args[0].as_cooked()?.trim().to_owned();
  let system = NumeralSystem::from_name(&name)
    .ok_or_else(|| argument_error(format!("unknown numeral system: '{}'", name)))?;
  vm.fmt_mut().number_format.system = system;
  Ok(())
}

fn digits(vm: &mut VM, args: Vec<RantFuncArg>) -> RantStdResult {
  let name = args[0].as_cooked()?.trim().to_owned();
  let endianness = Endianness::from_name(&name)
    .ok_or_else(|| argument_error(format!("unknown digit endianness: '{}'", name)))?;
  vm.fmt_mut().number_format.endianness = endianness;
  Ok(())
}

fn caps(vm: &mut VM, args: Vec<RantFuncArg>) -> RantStdResult {
  let name = args[0].as_cooked()?.trim().to_owned();
  let mode = CapsMode::from_name(&name)
    .ok_or_else(|| argument_error(format!("unknown capitalization mode: '{}'", name)))?;
  vm.fmt_mut().caps = mode;
  vm.reset_caps_state();
  Ok(())
}

fn article(vm: &mut VM, args: Vec<RantFuncArg>) -> RantStdResult {
  let name = args[0].as_cooked()?.trim().to_owned();
  let mode = ArticleMode::from_name(&name)
    .ok_or_else(|| argument_error(format!("unknown article mode: '{}'", name)))?;
  vm.fmt_mut().article = mode;
  Ok(())
}

// ================================================================
// Miscellaneous
// ================================================================

fn arg(vm: &mut VM, args: Vec<RantFuncArg>) -> RantStdResult {
  let name = args[0].as_cooked()?.to_owned();
  if let Some(value) = vm.program_arg(name.trim()).map(|v| v.to_owned()) {
    vm.print(&value)?;
  }
  Ok(())
}

fn len(vm: &mut VM, args: Vec<RantFuncArg>) -> RantStdResult {
  let n = args[0].as_cooked()?.chars().count();
  vm.print_integer(n as i64)
}

/// Registers the standard library into a function registry.
pub(crate) fn register_stdlib(registry: &mut FunctionRegistry) {
  macro_rules! overload {
    ($handler:expr, $desc:literal) => {
      FunctionOverload::new(&[], $desc, $handler)
    };
    ($handler:expr, $desc:literal, $($pname:ident : $mode:ident),+) => {
      FunctionOverload::new(
        &[$(FunctionParam { name: stringify!($pname), mode: ParamMode::$mode }),+],
        $desc,
        $handler,
      )
    };
  }

  macro_rules! load_funcs {
    ($($name:literal $(as $alias:literal)? => [$($ov:expr),+ $(,)?]),+ $(,)?) => {
      $(registry.register($name, &[$($alias)?], vec![$($ov),+]);)+
    };
  }

  load_funcs! {
    // Block attributes
    "rep" => [overload!(rep, "Sets the iteration count for the next block.", count: Cooked)],
    "sep" => [overload!(sep, "Sets the separator pattern run between block iterations.", separator: Raw)],
    "before" => [overload!(before, "Sets a pattern run before each block iteration.", pattern: Raw)],
    "after" => [overload!(after, "Sets a pattern run after each block iteration.", pattern: Raw)],

    // Synchronizers
    "sync" as "x" => [
      overload!(sync, "Binds the next block to an existing synchronizer.", name: Cooked),
      overload!(sync, "Binds the next block to a synchronizer, creating it with the given selector mode.", name: Cooked, mode: Cooked),
    ],
    "syncpin" as "xpin" => [overload!(syncpin, "Pins a synchronizer.", name: Cooked)],
    "syncunpin" as "xunpin" => [overload!(syncunpin, "Unpins a synchronizer.", name: Cooked)],
    "syncreset" as "xreset" => [overload!(syncreset, "Resets a synchronizer's sequence.", name: Cooked)],

    // Repeater introspection
    "repnum" => [overload!(repnum, "Prints the 1-based number of the current block iteration.")],
    "repindex" => [overload!(repindex, "Prints the 0-based index of the current block iteration.")],
    "repcount" => [overload!(repcount, "Prints the total iteration count of the current block.")],
    "first" => [overload!(first, "Runs a pattern only on the first block iteration.", pattern: Raw)],
    "notfirst" => [overload!(notfirst, "Runs a pattern on all but the first block iteration.", pattern: Raw)],
    "last" => [overload!(last, "Runs a pattern only on the last block iteration.", pattern: Raw)],
    "notlast" => [overload!(notlast, "Runs a pattern on all but the last block iteration.", pattern: Raw)],
    "even" => [overload!(even, "Runs a pattern on even-numbered block iterations.", pattern: Raw)],
    "odd" => [overload!(odd, "Runs a pattern on odd-numbered block iterations.", pattern: Raw)],
    "nth" => [overload!(nth, "Runs a pattern on every nth block iteration, starting at an offset.", interval: Cooked, offset: Cooked, pattern: Raw)],

    // Generators
    "num" as "n" => [overload!(num, "Prints a random integer between two inclusive bounds.", min: Cooked, max: Cooked)],
    "numf" as "nf" => [overload!(numf, "Prints a random real number between two inclusive bounds.", min: Cooked, max: Cooked)],
    "hex" => [
      overload!(hex, "Prints a random lowercase hex digit."),
      overload!(hex, "Prints random lowercase hex digits.", count: Cooked),
    ],
    "dec" => [
      overload!(dec, "Prints a random decimal digit."),
      overload!(dec, "Prints random decimal digits.", count: Cooked),
    ],
    "maybe" => [
      overload!(maybe, "Prints 'true' with probability p.", p: Cooked),
      overload!(maybe, "Runs a pattern with probability p.", p: Cooked, pattern: Raw),
    ],
    "either" => [overload!(either, "Prints one of two values with equal probability.", a: Cooked, b: Cooked)],
    "seed" => [overload!(seed, "Prints the seed of the engine RNG.")],
    "version" => [overload!(version, "Prints the Rant language version.")],

    // Formatting
    "numfmt" => [overload!(numfmt, "Sets the numeral system for formatted numbers.", system: Cooked)],
    "digits" => [overload!(digits, "Sets the digit ordering for positional numeral systems.", endianness: Cooked)],
    "caps" as "case" => [overload!(caps, "Sets the capitalization mode.", mode: Cooked)],
    "article" => [overload!(article, "Sets the indefinite article resolution mode.", mode: Cooked)],

    // Miscellaneous
    "arg" => [overload!(arg, "Prints the value of a program argument.", name: Cooked)],
    "len" => [overload!(len, "Prints the character count of its argument.", value: Cooked)],
  }
}
