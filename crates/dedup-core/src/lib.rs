pub mod cli;
pub mod error;

pub use cli::{parse_args, parse_weight_prefix, strip_trailing_separator, Args, HARD_EXCLUDE_DIRS, HARD_EXCLUDE_FILES};
pub use error::{DedupError, DedupResult};
