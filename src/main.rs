use std::time::Instant;

use anyhow::Result;
use dedup_cache::DigestCache;
use dedup_core::{parse_args, DedupError};
use dedup_report::generate_script;
use dedup_resolver::analyze;
use dedup_tree::build_forest;

mod harness;

fn main() {
    match run() {
        Ok(exit_code) => std::process::exit(exit_code),
        Err(err) => {
            eprintln!("dedup: error: {err:#}");
            std::process::exit(exit_code_for(&err));
        }
    }
}

/// Maps a fatal error to a distinct small exit code so operators and
/// scripts can tell "found a thing we must not trust" (the birthday
/// lottery) apart from a plain bad-input or cache failure.
fn exit_code_for(err: &anyhow::Error) -> i32 {
    match err.downcast_ref::<DedupError>() {
        Some(DedupError::BirthdayLottery { .. }) => 3,
        Some(DedupError::AncestryMismatch(_)) => 4,
        Some(DedupError::UnknownPathType(_)) => 2,
        Some(DedupError::Cache(_)) | Some(DedupError::Serialization(_)) => 5,
        Some(DedupError::Harness(_)) => 6,
        _ => 1,
    }
}

fn run() -> Result<i32> {
    let args = parse_args();

    if args.nuke_database {
        if let Some(db_path) = &args.database {
            DigestCache::nuke(db_path)?;
        }
    }

    if let Some(test_filter) = &args.run_tests {
        let filter = if test_filter.is_empty() { None } else { Some(test_filter.as_str()) };
        return harness::run_tests(filter);
    }

    if args.clean_database {
        let db_path = args
            .database
            .as_ref()
            .ok_or_else(|| DedupError::Cache("--clean-database requires --database".to_string()))?;
        let mut cache = DigestCache::open(db_path)?;
        let removed = cache.remove_missing();
        cache.save()?;
        println!("# removed {removed} stale entries from the cache");
        return Ok(0);
    }

    let start = Instant::now();

    let mut cache = match &args.database {
        Some(path) => DigestCache::open(path)?,
        None => DigestCache::default(),
    };

    let (mut forest, mut diagnostics) = build_forest(&args, &mut cache)?;

    if args.database.is_some() {
        cache.save()?;
    }

    analyze(&mut forest, &args, &mut diagnostics)?;

    for line in &diagnostics {
        println!("{line}");
    }

    let script = generate_script(&forest, start.elapsed());
    print!("{script}");

    Ok(0)
}
