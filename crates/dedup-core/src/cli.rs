use std::path::PathBuf;

use clap::Parser;

// ============================================================================
// Hard-Exclude Sets
// ============================================================================

/// Directory basenames that are never descended into or recorded, regardless
/// of whether they duplicate something elsewhere.
pub const HARD_EXCLUDE_DIRS: &[&str] = &[".git", ".svn", ".hg", ".dropbox.cache", "__MACOSX"];

/// File basenames that are never recorded, regardless of content.
pub const HARD_EXCLUDE_FILES: &[&str] = &["Thumbs.db", ".DS_Store", "desktop.ini", ".directory"];

/// dedup - generate a review-then-execute script that removes redundant
/// files and directories
///
/// Builds a content-addressed index of one or more input trees and emits a
/// shell script (to stdout) that, once reviewed, deletes the redundant
/// copies it found.
#[derive(Parser, Debug)]
#[command(name = "dedup")]
#[command(about = "Find duplicate files and directories and emit a removal script")]
pub struct Args {
    /// Paths to scan, each optionally prefixed "N:" with a signed integer
    /// weight (e.g. "10:some/mirror")
    pub paths: Vec<String>,

    /// Name of the on-disk digest cache to use
    #[arg(short = 'd', long = "database")]
    pub database: Option<PathBuf>,

    /// Delete the cache before starting this run (no-op if absent)
    #[arg(short = 'n', long = "nuke-database")]
    pub nuke_database: bool,

    /// Scan the cache for entries whose file no longer exists and drop them,
    /// instead of performing a normal run (requires --database)
    #[arg(short = 'c', long = "clean-database")]
    pub clean_database: bool,

    /// Do not delete empty directories (default: delete them)
    #[arg(short = 'e', long = "keep-empty-dirs")]
    pub keep_empty_dirs: bool,

    /// Do not delete zero-byte files (default: delete them)
    #[arg(short = 'f', long = "keep-empty-files")]
    pub keep_empty_files: bool,

    /// Reverse the dir/file selection choices: prefer deeper, longer paths
    /// as the kept copy instead of shallower, shorter ones
    #[arg(short = 'r', long = "reverse-selection")]
    pub reverse_selection: bool,

    /// Always prefer files from earlier path arguments over later ones
    #[arg(short = 's', long = "stagger-paths")]
    pub stagger_paths: bool,

    /// Increase output verbosity (repeatable: -v, -vv, -vvv)
    #[arg(short = 'v', long = "verbosity", action = clap::ArgAction::Count)]
    pub verbosity: u8,

    /// Run the integration harness in tests/ instead of a normal scan,
    /// optionally restricted to one named test case
    #[arg(short = 't', long = "run-tests", num_args = 0..=1, default_missing_value = "")]
    pub run_tests: Option<String>,
}

pub fn parse_args() -> Args {
    Args::parse()
}

impl Args {
    /// True if the argument basename should be treated as hard-excluded
    /// directory metadata and never descended into or recorded.
    pub fn is_excluded_dir(name: &str) -> bool {
        HARD_EXCLUDE_DIRS.iter().any(|excluded| *excluded == name)
    }

    /// True if the argument basename should be treated as hard-excluded
    /// file metadata and never recorded.
    pub fn is_excluded_file(name: &str) -> bool {
        HARD_EXCLUDE_FILES.iter().any(|excluded| *excluded == name)
    }
}

/// Splits an optional `N:path` weight prefix off of a raw path argument.
///
/// If the segment before the first `:` parses as a signed integer, that
/// integer is the weight and the remainder (which may itself contain `:`)
/// is the path. Otherwise the weight is 0 and the whole string is the path.
/// A path that legitimately starts with `<digits>:` cannot be disambiguated
/// from a weight prefix; this is inherited, documented behavior, not a bug.
pub fn parse_weight_prefix(arg: &str) -> (i64, &str) {
    if let Some(colon) = arg.find(':') {
        let (head, rest) = arg.split_at(colon);
        if let Ok(weight) = head.parse::<i64>() {
            return (weight, &rest[1..]);
        }
    }
    (0, arg)
}

/// Strips exactly one trailing path separator from an argument, so
/// `"some/dir/"` and `"some/dir"` are treated identically.
pub fn strip_trailing_separator(arg: &str) -> &str {
    arg.strip_suffix(std::path::MAIN_SEPARATOR).unwrap_or(arg)
}
