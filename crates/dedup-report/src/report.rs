use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::time::Duration;

use dedup_tree::{Arena, Forest, NodeId, NodeKind};

use crate::format::sizeof_fmt;

/// Report names that group their deletions by the node that survived
/// ("winner : N to keep and M to remove"). Order here has no effect on
/// the emitted script (categories are re-sorted by bytes reclaimed), it
/// only fixes which bucket a name maps to while walking the forest.
const REGULAR_REPORT_NAMES: [&str; 2] = ["directories", "files"];

/// Report names with no winner to group by: every entry in these sections
/// was marked to-delete without a winner back-reference, so they render
/// as a flat, pathname-sorted list under a synthetic heading instead.
const EMPTY_REPORT_NAMES: [&str; 3] = [
    "directories that are empty after reduction",
    "directories that started empty",
    "empty files",
];

/// The synthetic group key used for the winner-less categories: they have
/// no winner to group by, so every loser in the category shares this one
/// key, letting them reuse the same winner-grouped data structure.
const NO_WINNER_KEY: &str = "";

struct WinnerGroup {
    winner_path: String,
    losers: Vec<NodeId>,
    total_bytes: u64,
}

struct Category {
    name: &'static str,
    is_empty_style: bool,
    groups: Vec<WinnerGroup>,
    winner_count: usize,
    marked_count: usize,
    total_bytes: u64,
}

/// Walks the forest collecting every to-delete node into its report
/// bucket. A to-delete directory is reported once, as itself, since its
/// descendants are already implied by the cascade and are never visited.
fn collect(arena: &Arena, id: NodeId, buckets: &mut BTreeMap<&'static str, BTreeMap<String, Vec<NodeId>>>) {
    let node = arena.get(id);
    if node.to_delete {
        match &node.kind {
            NodeKind::Dir(_) => {
                let bucket = if let Some(winner) = node.winner {
                    ("directories", arena.pathname(winner).display().to_string())
                } else if arena.started_empty(id) {
                    ("directories that started empty", NO_WINNER_KEY.to_string())
                } else {
                    ("directories that are empty after reduction", NO_WINNER_KEY.to_string())
                };
                buckets.get_mut(bucket.0).unwrap().entry(bucket.1).or_default().push(id);
            }
            NodeKind::File(_) => {
                let bucket = if let Some(winner) = node.winner {
                    ("files", arena.pathname(winner).display().to_string())
                } else {
                    ("empty files", NO_WINNER_KEY.to_string())
                };
                buckets.get_mut(bucket.0).unwrap().entry(bucket.1).or_default().push(id);
            }
        }
        return;
    }

    if let Some(dir) = node.as_dir() {
        let children: Vec<NodeId> = dir.files.values().chain(dir.subdirs.values()).copied().collect();
        for child in children {
            collect(arena, child, buckets);
        }
    }
}

fn synthesize_category(arena: &Arena, name: &'static str, groups: BTreeMap<String, Vec<NodeId>>) -> Category {
    let is_empty_style = EMPTY_REPORT_NAMES.contains(&name);
    let mut marked_count = 0;
    let mut total_bytes = 0u64;
    let mut out_groups = Vec::new();

    for (winner_path, mut losers) in groups {
        marked_count += losers.len();
        losers.sort_by_key(|&id| arena.pathname(id).display().to_string());
        let group_bytes: u64 = losers.iter().map(|&id| arena.count_bytes(id, true)).sum();
        total_bytes += group_bytes;
        out_groups.push(WinnerGroup {
            winner_path,
            losers,
            total_bytes: group_bytes,
        });
    }

    out_groups.sort_by(|a, b| b.total_bytes.cmp(&a.total_bytes));
    let winner_count = out_groups.len();

    Category {
        name,
        is_empty_style,
        groups: out_groups,
        winner_count,
        marked_count,
        total_bytes,
    }
}

/// Single-quotes a path for `rm -rf`, falling back to double-quoting when
/// the path contains `'`, `(`, or `)`. Paths containing both a `'` and a
/// `(`/`)` are not perfectly escaped by this scheme, a known limitation
/// left as is rather than silently fixed.
fn quote_for_rm(path: &str) -> String {
    if path.contains(['\'', '(', ')']) {
        format!("\"{path}\"")
    } else {
        format!("'{path}'")
    }
}

fn render_category(arena: &Arena, category: &Category, out: &mut String) {
    if category.groups.is_empty() {
        return;
    }

    let _ = writeln!(out, "\n{}", "#".repeat(72));
    if category.is_empty_style {
        let _ = writeln!(out, "# {}: {} to remove", category.name, category.marked_count);
        let _ = writeln!(out, "# This section could make {} of file data redundant", sizeof_fmt(category.total_bytes));
    } else {
        let _ = writeln!(
            out,
            "# {} : {} to keep and {} to remove",
            category.name, category.winner_count, category.marked_count
        );
        let _ = writeln!(out, "# This section could make {} of file data redundant", sizeof_fmt(category.total_bytes));
    }

    for group in &category.groups {
        let _ = writeln!(out, "\n# This subsection could save {}", sizeof_fmt(group.total_bytes));
        if !category.is_empty_style {
            let _ = writeln!(out, "#      '{}'", group.winner_path);
        }
        for &loser in &group.losers {
            let path = arena.pathname(loser).display().to_string();
            let _ = writeln!(out, "rm -rf {}", quote_for_rm(&path));
        }
    }
}

/// Generates the complete review-then-execute shell script: one titled
/// section per non-empty category (directories, files, and the three
/// winner-less "became empty" / "started empty" / "zero-byte" categories),
/// ordered by descending bytes reclaimed, followed by a grand-total
/// summary line.
pub fn generate_script(forest: &Forest, elapsed: Duration) -> String {
    let mut buckets: BTreeMap<&'static str, BTreeMap<String, Vec<NodeId>>> = BTreeMap::new();
    for name in REGULAR_REPORT_NAMES.iter().chain(EMPTY_REPORT_NAMES.iter()) {
        buckets.insert(name, BTreeMap::new());
    }

    for root_id in forest.root_ids() {
        collect(&forest.arena, root_id, &mut buckets);
    }

    let mut categories: Vec<Category> = buckets
        .into_iter()
        .map(|(name, groups)| synthesize_category(&forest.arena, name, groups))
        .collect();
    categories.sort_by(|a, b| b.total_bytes.cmp(&a.total_bytes));

    let mut out = String::new();
    for category in &categories {
        render_category(&forest.arena, category, &mut out);
    }

    let total_bytes: u64 = categories.iter().map(|c| c.total_bytes).sum();
    let _ = writeln!(out, "\n# total file data bytes marked for deletion {}", sizeof_fmt(total_bytes));
    let _ = writeln!(out, "# total dedup running time: {:.3} seconds.", elapsed.as_secs_f64());
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use dedup_cache::DigestCache;
    use dedup_core::Args;
    use dedup_resolver::analyze;
    use dedup_tree::build_forest;
    use std::fs;

    fn parse(args: &[&str]) -> Args {
        let mut full = vec!["dedup"];
        full.extend_from_slice(args);
        Args::parse_from(full)
    }

    #[test]
    fn quoting_falls_back_to_double_quotes_for_special_chars() {
        assert_eq!(quote_for_rm("plain/path"), "'plain/path'");
        assert_eq!(quote_for_rm("has(parens)"), "\"has(parens)\"");
        assert_eq!(quote_for_rm("it's mine"), "\"it's mine\"");
    }

    #[test]
    fn duplicate_file_script_contains_one_rm_and_a_files_section() -> anyhow::Result<()> {
        let dir = std::env::temp_dir().join("dedup_test_report_dup_file");
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(dir.join("a"))?;
        fs::create_dir_all(dir.join("b"))?;
        fs::write(dir.join("a/x.txt"), b"hello\n")?;
        fs::write(dir.join("b/x.txt"), b"hello\n")?;

        let args = parse(&[dir.to_str().unwrap()]);
        let mut cache = DigestCache::open(&dir.join("cache.dat"))?;
        let (mut forest, _) = build_forest(&args, &mut cache)?;
        let mut diagnostics = Vec::new();
        analyze(&mut forest, &args, &mut diagnostics)?;

        let script = generate_script(&forest, Duration::from_secs(0));
        assert_eq!(script.matches("rm -rf").count(), 1);
        assert!(script.contains("# files : "));

        let _ = fs::remove_dir_all(&dir);
        Ok(())
    }

    #[test]
    fn whole_directory_duplication_reports_one_directory_removal() -> anyhow::Result<()> {
        let dir = std::env::temp_dir().join("dedup_test_report_dup_dir");
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(dir.join("A"))?;
        fs::create_dir_all(dir.join("B"))?;
        fs::write(dir.join("A/f1"), b"one")?;
        fs::write(dir.join("A/f2"), b"two")?;
        fs::write(dir.join("B/f1"), b"one")?;
        fs::write(dir.join("B/f2"), b"two")?;

        let args = parse(&[dir.to_str().unwrap()]);
        let mut cache = DigestCache::open(&dir.join("cache.dat"))?;
        let (mut forest, _) = build_forest(&args, &mut cache)?;
        let mut diagnostics = Vec::new();
        analyze(&mut forest, &args, &mut diagnostics)?;

        let script = generate_script(&forest, Duration::from_secs(0));
        assert_eq!(script.matches("rm -rf").count(), 1);
        assert!(script.contains("# directories : "));
        assert!(!script.contains("# files : "));

        let _ = fs::remove_dir_all(&dir);
        Ok(())
    }

    #[test]
    fn zero_byte_file_lands_in_its_own_section() -> anyhow::Result<()> {
        let dir = std::env::temp_dir().join("dedup_test_report_empty_file");
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir)?;
        fs::write(dir.join("empty.txt"), b"")?;

        let args = parse(&[dir.to_str().unwrap()]);
        let mut cache = DigestCache::open(&dir.join("cache.dat"))?;
        let (mut forest, _) = build_forest(&args, &mut cache)?;
        let mut diagnostics = Vec::new();
        analyze(&mut forest, &args, &mut diagnostics)?;

        let script = generate_script(&forest, Duration::from_secs(0));
        assert!(script.contains("empty files: "));
        assert_eq!(script.matches("rm -rf").count(), 1);

        let _ = fs::remove_dir_all(&dir);
        Ok(())
    }
}
