//! Integration test harness (`--run-tests`): round-trips `before/` through
//! the core, diffing the result against `after/`. Fixtures live under
//! `tests/<case>/{before,after}` (plus an optional `opts.json`); this
//! module is secondary to the duplicate-resolution core and is implemented
//! just far enough to run the fixtures and report pass/fail.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use serde::Deserialize;
use walkdir::WalkDir;

use dedup_cache::DigestCache;
use dedup_core::{parse_weight_prefix, Args};
use dedup_report::generate_script;
use dedup_resolver::analyze;
use dedup_tree::build_forest;

/// The contents of an optional `tests/<case>/opts.json`.
#[derive(Debug, Default, Deserialize)]
struct TestOpts {
    /// Extra CLI arguments (besides the ephemeral path itself), parsed the
    /// same way the real binary parses `args::parse_args()`.
    #[serde(default)]
    args: Vec<String>,
    /// Paths to scan, relative to the case's `ephemeral/` directory.
    /// Defaults to `["."]` (the whole ephemeral tree) when absent.
    #[serde(default)]
    paths: Vec<String>,
    /// When true, the core runs a second time over the post-script
    /// `ephemeral/` tree and asserts that second run produces an empty
    /// script, proof the first run actually reached a fixed point.
    #[serde(default)]
    twice: bool,
    /// When true, this case is expected to fail (diff nonempty, or a
    /// fatal error), inverting pass/fail interpretation for fixtures that
    /// intentionally exercise an error path.
    #[serde(default)]
    expected_pass: Option<bool>,
}

/// Runs every fixture under `tests/`, or only `filter` if given (matched
/// either against the case's directory name or, if `filter` parses as an
/// integer, its position in sorted order). Returns the process exit code:
/// `0` if every selected case passed, `1` otherwise.
pub fn run_tests(filter: Option<&str>) -> Result<i32> {
    let tests_root = Path::new("tests");
    if !tests_root.is_dir() {
        println!("# no tests/ directory found, nothing to run");
        return Ok(0);
    }

    let mut case_names: Vec<String> = fs::read_dir(tests_root)?
        .filter_map(|e| e.ok())
        .filter(|e| e.path().is_dir())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .collect();
    case_names.sort();

    let selected: Vec<String> = match filter {
        None => case_names,
        Some(f) => {
            if let Ok(index) = f.parse::<usize>() {
                case_names.into_iter().nth(index).into_iter().collect()
            } else {
                case_names.into_iter().filter(|n| n == f).collect()
            }
        }
    };

    let mut all_passed = true;
    for case_name in &selected {
        let passed = run_one(tests_root, case_name)?;
        if !passed {
            all_passed = false;
        }
    }

    Ok(if all_passed { 0 } else { 1 })
}

fn run_one(tests_root: &Path, case_name: &str) -> Result<bool> {
    println!("# running test {case_name}");

    let case_dir = tests_root.join(case_name);
    let before_dir = case_dir.join("before");
    let ephemeral_dir = case_dir.join("ephemeral");
    let after_dir = case_dir.join("after");
    let opts_path = case_dir.join("opts.json");

    let _ = fs::remove_dir_all(&ephemeral_dir);
    copy_tree(&before_dir, &ephemeral_dir)?;

    let opts: TestOpts = match fs::read_to_string(&opts_path) {
        Ok(raw) => serde_json::from_str(&raw).unwrap_or_default(),
        Err(_) => TestOpts::default(),
    };

    let result = drive_case(&ephemeral_dir, &opts);

    let expected_pass = opts.expected_pass.unwrap_or(true);
    let actually_passed = match &result {
        Ok(()) => diff_trees(&ephemeral_dir, &after_dir)?,
        Err(_) => false,
    };
    let outcome_matches_expectation = actually_passed == expected_pass;

    if outcome_matches_expectation {
        println!("# PASSED {case_name}");
    } else {
        println!("# FAILED {case_name}");
        if let Err(err) = &result {
            println!("# {err:#}");
        }
    }

    Ok(outcome_matches_expectation)
}

/// Runs the core once (twice if `opts.twice`) over the ephemeral tree and
/// executes the emitted script via `sh`.
fn drive_case(ephemeral_dir: &Path, opts: &TestOpts) -> Result<()> {
    let paths: Vec<String> = if opts.paths.is_empty() {
        vec![ephemeral_dir.to_string_lossy().into_owned()]
    } else {
        opts.paths.iter().map(|p| resolve_path_arg(ephemeral_dir, p)).collect()
    };

    let first_script = run_core_once(&opts.args, &paths)?;
    execute_script(&first_script, ephemeral_dir)?;

    if opts.twice {
        let second_script = run_core_once(&opts.args, &paths)?;
        if !second_script_is_empty(&second_script) {
            anyhow::bail!("second pass over the post-script tree was not a fixed point");
        }
    }

    Ok(())
}

/// Joins a fixture's `opts.paths` entry onto `ephemeral_dir`, preserving a
/// leading `N:` weight prefix rather than letting it be swallowed into the
/// joined path as a literal (nonexistent) filename.
fn resolve_path_arg(ephemeral_dir: &Path, raw: &str) -> String {
    let (weight, path_part) = parse_weight_prefix(raw);
    let joined = ephemeral_dir.join(path_part);
    format!("{weight}:{}", joined.to_string_lossy())
}

fn second_script_is_empty(script: &str) -> bool {
    !script.lines().any(|line| line.trim_start().starts_with("rm -rf"))
}

fn run_core_once(extra_args: &[String], paths: &[String]) -> Result<String> {
    let mut full_args: Vec<String> = vec!["dedup".to_string()];
    full_args.extend(extra_args.iter().cloned());
    full_args.extend(paths.iter().cloned());
    let args = Args::parse_from(full_args);

    let mut cache = match &args.database {
        Some(path) => DigestCache::open(path)?,
        None => DigestCache::default(),
    };

    let start = Instant::now();
    let (mut forest, mut diagnostics) = build_forest(&args, &mut cache)?;
    analyze(&mut forest, &args, &mut diagnostics)?;
    Ok(generate_script(&forest, start.elapsed()))
}

fn execute_script(script: &str, cwd: &Path) -> Result<()> {
    use std::io::Write;
    use std::process::{Command, Stdio};

    let mut child = Command::new("sh")
        .current_dir(cwd)
        .stdin(Stdio::piped())
        .spawn()
        .context("spawning sh to execute the generated script")?;
    child
        .stdin
        .as_mut()
        .expect("stdin was piped")
        .write_all(script.as_bytes())?;
    let status = child.wait()?;
    if !status.success() {
        anyhow::bail!("generated script exited with status {status}");
    }
    Ok(())
}

/// Recursive `diff --recursive --brief`-equivalent: true when the two
/// trees have identical relative paths and identical file contents.
fn diff_trees(left: &Path, right: &Path) -> Result<bool> {
    let left_entries = relative_file_set(left)?;
    let right_entries = relative_file_set(right)?;
    if left_entries != right_entries {
        return Ok(false);
    }

    for rel in left_entries {
        let l = left.join(&rel);
        let r = right.join(&rel);
        if l.is_file() && r.is_file() {
            if fs::read(&l)? != fs::read(&r)? {
                return Ok(false);
            }
        } else if l.is_dir() != r.is_dir() {
            return Ok(false);
        }
    }
    Ok(true)
}

fn relative_file_set(root: &Path) -> Result<std::collections::BTreeSet<PathBuf>> {
    let mut set = std::collections::BTreeSet::new();
    if !root.is_dir() {
        return Ok(set);
    }
    for entry in WalkDir::new(root).min_depth(1) {
        let entry = entry?;
        let rel = entry.path().strip_prefix(root)?.to_path_buf();
        set.insert(rel);
    }
    Ok(set)
}

fn copy_tree(src: &Path, dst: &Path) -> Result<()> {
    fs::create_dir_all(dst)?;
    for entry in WalkDir::new(src).min_depth(1) {
        let entry = entry?;
        let rel = entry.path().strip_prefix(src)?;
        let target = dst.join(rel);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)?;
        } else if entry.file_type().is_file() {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}
