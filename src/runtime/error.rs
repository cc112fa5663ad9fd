use std::{error::Error, fmt::Display, ops::Range};

use crate::runtime::resolver::SelectorError;

/// Type alias for `Result<T, RuntimeError>`
pub type RuntimeResult<T> = Result<T, RuntimeError>;

/// A runtime error raised by a Rant program.
#[derive(Debug)]
pub struct RuntimeError {
  /// The type of runtime error.
  pub error_type: RuntimeErrorType,
  /// A description of what went wrong.
  pub description: String,
  /// Source span of the offending syntax tree node, when known.
  pub span: Option<Range<usize>>,
  /// A stack trace describing the location of the error.
  pub stack_trace: Option<String>,
}

impl Error for RuntimeError {
  fn source(&self) -> Option<&(dyn Error + 'static)> {
    match &self.error_type {
      RuntimeErrorType::SelectorError(err) => Some(err),
      _ => None,
    }
  }
}

impl Display for RuntimeError {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "[{}] {}", self.error_type, self.description)
  }
}

/// Provides general categories of runtime errors encountered in Rant.
#[derive(Debug)]
pub enum RuntimeErrorType {
  /// Execution depth limit was reached.
  ///
  /// Rant error ID: `STACK_OVERFLOW_ERROR`
  StackOverflow,
  /// An internal stack was popped while empty.
  ///
  /// Rant error ID: `STACK_UNDERFLOW_ERROR`
  StackUnderflow,
  /// The step budget was exhausted.
  ///
  /// Rant error ID: `STEP_BUDGET_ERROR`
  StepBudgetExceeded,
  /// The output length budget was exhausted.
  ///
  /// Rant error ID: `OUTPUT_BUDGET_ERROR`
  OutputBudgetExceeded,
  /// A tag referenced a function that is not registered.
  ///
  /// Rant error ID: `UNKNOWN_FUNCTION_ERROR`
  UnknownFunction,
  /// No overload of the called function accepts the supplied argument count.
  ///
  /// Rant error ID: `ARG_MISMATCH_ERROR`
  ArgumentMismatch,
  /// Invalid argument passed to a function.
  ///
  /// Rant error ID: `ARG_ERROR`
  ArgumentError,
  /// A subroutine call referenced an undefined subroutine.
  ///
  /// Rant error ID: `UNKNOWN_SUB_ERROR`
  UnknownSubroutine,
  /// A variable access referenced an undefined variable.
  ///
  /// Rant error ID: `INVALID_ACCESS_ERROR`
  InvalidAccess,
  /// A send referenced a target that was never declared.
  ///
  /// Rant error ID: `TARGET_ERROR`
  InvalidTarget,
  /// A distance operation referenced an unknown mark.
  ///
  /// Rant error ID: `MARK_ERROR`
  InvalidMark,
  /// Operation is not valid for the current program state.
  ///
  /// Rant error ID: `INVALID_OP_ERROR`
  InvalidOperation,
  /// Error occurred while iterating a selector.
  ///
  /// Rant error ID: `SELECTOR_ERROR`
  SelectorError(SelectorError),
  /// Internal VM error, usually indicating a bug or corrupted data.
  ///
  /// Rant error ID: `INTERNAL_ERROR`
  InternalError,
}

impl Display for RuntimeErrorType {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", match self {
      Self::StackOverflow => "STACK_OVERFLOW_ERROR",
      Self::StackUnderflow => "STACK_UNDERFLOW_ERROR",
      Self::StepBudgetExceeded => "STEP_BUDGET_ERROR",
      Self::OutputBudgetExceeded => "OUTPUT_BUDGET_ERROR",
      Self::UnknownFunction => "UNKNOWN_FUNCTION_ERROR",
      Self::ArgumentMismatch => "ARG_MISMATCH_ERROR",
      Self::ArgumentError => "ARG_ERROR",
      Self::UnknownSubroutine => "UNKNOWN_SUB_ERROR",
      Self::InvalidAccess => "INVALID_ACCESS_ERROR",
      Self::InvalidTarget => "TARGET_ERROR",
      Self::InvalidMark => "MARK_ERROR",
      Self::InvalidOperation => "INVALID_OP_ERROR",
      Self::SelectorError(_) => "SELECTOR_ERROR",
      Self::InternalError => "INTERNAL_ERROR",
    })
  }
}

pub(crate) trait IntoRuntimeResult<T> {
  fn into_runtime_result(self) -> RuntimeResult<T>;
}

/// Returns a `RuntimeError` from the current function with the specified error type
/// and a formatted description.
macro_rules! runtime_error {
  ($err_type:expr, $($fmt_args:expr),+) => {
    return Err($crate::runtime::RuntimeError {
      error_type: $err_type,
      description: format!($($fmt_args),+),
      span: None,
      stack_trace: None,
    })
  };
}

pub(crate) use runtime_error;
