//! Function registry: maps lowercased names (and aliases) to groups of
//! overloads resolved by exact arity.
//!
//! The registry is populated by an explicit registration step at startup
//! (see `stdlib`); there is no runtime discovery.

use std::rc::Rc;
use fnv::FnvHashMap;
use crate::InternalString;
use crate::lang::Sequence;
use crate::runtime::{RuntimeError, RuntimeErrorType, RuntimeResult, VM};

/// Result type returned by all native function handlers.
pub type RantStdResult = RuntimeResult<()>;

/// Signature shared by all native function handlers.
pub type NativeFunction = fn(&mut VM, Vec<RantFuncArg>) -> RantStdResult;

/// An argument value as handed to a native function.
#[derive(Debug)]
pub enum RantFuncArg {
  /// The argument was evaluated in a sub-output.
  Cooked(InternalString),
  /// The argument was passed unevaluated.
  Raw(Rc<Sequence>),
}

impl RantFuncArg {
  /// Borrows the argument as an evaluated string.
  pub fn as_cooked(&self) -> RuntimeResult<&str> {
    match self {
      RantFuncArg::Cooked(s) => Ok(s.as_str()),
      RantFuncArg::Raw(_) => Err(RuntimeError {
        error_type: RuntimeErrorType::ArgumentError,
        description: "expected evaluated argument, but found pattern argument".to_owned(),
        span: None,
        stack_trace: None,
      }),
    }
  }

  /// Borrows the argument as an unevaluated sequence.
  pub fn as_raw(&self) -> RuntimeResult<&Rc<Sequence>> {
    match self {
      RantFuncArg::Raw(seq) => Ok(seq),
      RantFuncArg::Cooked(_) => Err(RuntimeError {
        error_type: RuntimeErrorType::ArgumentError,
        description: "expected pattern argument, but found evaluated argument".to_owned(),
        span: None,
        stack_trace: None,
      }),
    }
  }
}

/// Defines how an argument is delivered to its parameter.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ParamMode {
  /// Argument sequence is executed in a sub-output and passed as a string.
  Cooked,
  /// Argument sequence is passed unevaluated.
  Raw,
}

/// Describes a declared function parameter.
#[derive(Debug, Copy, Clone)]
pub struct FunctionParam {
  pub name: &'static str,
  pub mode: ParamMode,
}

/// A single overload of a registry function.
pub struct FunctionOverload {
  params: Vec<FunctionParam>,
  description: &'static str,
  handler: NativeFunction,
}

impl FunctionOverload {
  pub fn new(params: &[FunctionParam], description: &'static str, handler: NativeFunction) -> Self {
    Self {
      params: params.to_vec(),
      description,
      handler,
    }
  }

  /// Number of arguments the overload accepts.
  #[inline]
  pub fn arity(&self) -> usize {
    self.params.len()
  }

  #[inline]
  pub fn params(&self) -> &[FunctionParam] {
    &self.params
  }

  #[inline]
  pub fn description(&self) -> &'static str {
    self.description
  }

  #[inline]
  pub fn handler(&self) -> NativeFunction {
    self.handler
  }
}

/// A named group of overloads.
pub struct FunctionGroup {
  name: InternalString,
  overloads: Vec<FunctionOverload>,
}

impl FunctionGroup {
  pub fn new(name: &str, overloads: Vec<FunctionOverload>) -> Self {
    Self {
      name: InternalString::from(name),
      overloads,
    }
  }

  #[inline]
  pub fn name(&self) -> &str {
    self.name.as_str()
  }

  /// Resolves an overload by exact arity.
  pub fn overload_for_arity(&self, arity: usize) -> Option<&FunctionOverload> {
    self.overloads.iter().find(|o| o.arity() == arity)
  }

  pub fn overloads(&self) -> impl Iterator<Item = &FunctionOverload> {
    self.overloads.iter()
  }
}

/// The function registry consulted by the compiler (name + arity resolution)
/// and the runtime (invocation).
#[derive(Default)]
pub struct FunctionRegistry {
  groups: FnvHashMap<InternalString, Rc<FunctionGroup>>,
  canonical_names: Vec<InternalString>,
  aliases: FnvHashMap<InternalString, Vec<InternalString>>,
}

impl FunctionRegistry {
  /// Creates an empty registry.
  pub fn new() -> Self {
    Default::default()
  }

  /// Registers a function group under its canonical name and aliases.
  /// Names are lowercased; re-registering a name replaces it.
  pub fn register(&mut self, name: &str, aliases: &[&str], overloads: Vec<FunctionOverload>) {
    let canonical = InternalString::from(name.to_lowercase());
    let group = Rc::new(FunctionGroup::new(canonical.as_str(), overloads));
    if !self.groups.contains_key(&canonical) {
      self.canonical_names.push(canonical.clone());
    }
    self.groups.insert(canonical.clone(), Rc::clone(&group));
    let mut alias_list = vec![];
    for alias in aliases {
      let alias = InternalString::from(alias.to_lowercase());
      self.groups.insert(alias.clone(), Rc::clone(&group));
      alias_list.push(alias);
    }
    self.aliases.insert(canonical, alias_list);
  }

  /// Checks whether a name (or alias) is registered.
  pub fn exists(&self, name: &str) -> bool {
    self.groups.contains_key(name.to_lowercase().as_str())
  }

  /// Gets the group registered under a name or alias.
  pub fn get(&self, name: &str) -> Option<&Rc<FunctionGroup>> {
    self.groups.get(name.to_lowercase().as_str())
  }

  /// Iterates over canonical function names in registration order.
  pub fn names(&self) -> impl Iterator<Item = &str> {
    self.canonical_names.iter().map(|n| n.as_str())
  }

  /// Iterates over all registered names, aliases included.
  pub fn names_and_aliases(&self) -> impl Iterator<Item = &str> {
    self.groups.keys().map(|n| n.as_str())
  }

  /// Gets the description of the overload of `name` with the given arity.
  pub fn description(&self, name: &str, arity: usize) -> Option<&'static str> {
    self.get(name)?.overload_for_arity(arity).map(|o| o.description())
  }

  /// Gets the aliases declared for a canonical name.
  pub fn aliases(&self, name: &str) -> &[InternalString] {
    self.aliases.get(name.to_lowercase().as_str()).map(|v| v.as_slice()).unwrap_or(&[])
  }
}
