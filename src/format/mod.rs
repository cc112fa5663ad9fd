mod num;
mod case;
mod article;

pub use self::num::*;
pub use self::case::*;
pub use self::article::*;

/// The formatting state applied to output as it is written.
/// Formatting tags mutate the top of a small stack of these, which is
/// pushed and popped around each enclosing scope (block branch or
/// subroutine body).
#[derive(Debug, Clone, Default)]
pub struct OutputFormat {
  pub number_format: NumberFormat,
  pub caps: CapsMode,
  pub article: ArticleMode,
}
