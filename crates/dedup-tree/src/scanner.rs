use std::fs;
use std::path::Path;

use dedup_cache::DigestCache;
use dedup_core::{parse_weight_prefix, strip_trailing_separator, Args, DedupError, DedupResult};

use crate::hash::{fold_directory_digest, hash_file_cached};
use crate::node::{Arena, DirData, FileData, Node, NodeId, NodeKind};

/// A root argument's built subtree, plus the original argument string it
/// was built from. The Forest keeps arguments in the order they were given
/// since `--stagger-paths` depends on that order.
pub struct Forest {
    pub arena: Arena,
    pub roots: Vec<(String, NodeId)>,
}

impl Forest {
    pub fn root_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.roots.iter().map(|(_, id)| *id)
    }

    pub fn count_deleted(&self) -> usize {
        self.root_ids().map(|id| self.arena.count_deleted(id)).sum()
    }

    pub fn count_bytes(&self, to_delete: bool) -> u64 {
        self.root_ids().map(|id| self.arena.count_bytes(id, to_delete)).sum()
    }
}

#[cfg(unix)]
fn is_socket(metadata: &fs::Metadata) -> bool {
    use std::os::unix::fs::FileTypeExt;
    metadata.file_type().is_socket()
}

#[cfg(not(unix))]
fn is_socket(_metadata: &fs::Metadata) -> bool {
    false
}

/// Builds a [`Forest`] from the command line's path arguments, hashing
/// every file it records (consulting and updating `cache` as it goes) and
/// folding directory digests bottom-up as each directory finishes. Diagnostic
/// lines (skipped sockets) are returned rather than printed directly so the
/// caller can gate them on verbosity.
pub fn build_forest(args: &Args, cache: &mut DigestCache) -> DedupResult<(Forest, Vec<String>)> {
    let mut arena = Arena::new();
    let mut roots = Vec::new();
    let mut diagnostics = Vec::new();
    let mut stagger: i64 = 0;

    for raw_arg in &args.paths {
        let trimmed = strip_trailing_separator(raw_arg);
        let (mut weight_adjust, path_str) = parse_weight_prefix(trimmed);
        let path = Path::new(path_str);
        let metadata = fs::metadata(path).map_err(DedupError::Io)?;

        if args.stagger_paths {
            weight_adjust += stagger;
        }

        if metadata.is_file() {
            let name = path_str.to_string();
            let file_id = build_file_node(&mut arena, path, &name, None, weight_adjust, args, cache)?;
            if args.stagger_paths {
                stagger += arena.get(file_id).depth;
            }
            roots.push((raw_arg.clone(), file_id));
        } else if is_socket(&metadata) {
            diagnostics.push(format!("# Skipping a socket {path_str}"));
        } else if metadata.is_dir() {
            let name = path_str.to_string();
            let dir_id = build_dir_node(&mut arena, path, &name, None, weight_adjust, args, cache, &mut diagnostics)?;
            if args.stagger_paths {
                stagger += arena.max_depth(dir_id);
            }
            roots.push((raw_arg.clone(), dir_id));
        } else {
            return Err(DedupError::UnknownPathType(path_str.to_string()));
        }
    }

    Ok((Forest { arena, roots }, diagnostics))
}

fn build_file_node(
    arena: &mut Arena,
    path: &Path,
    name: &str,
    parent: Option<NodeId>,
    weight_adjust: i64,
    args: &Args,
    cache: &mut DigestCache,
) -> DedupResult<NodeId> {
    let metadata = fs::metadata(path).map_err(DedupError::Io)?;
    let size = metadata.len();
    let modified = metadata.modified().map_err(DedupError::Io)?;
    let digest = hash_file_cached(path, modified, cache)?;

    let id = arena.alloc(Node {
        name: name.to_string(),
        parent,
        weight_adjust,
        depth: 0,
        to_delete: false,
        winner: None,
        kind: NodeKind::File(FileData {
            size,
            modified,
            digest: Some(digest),
        }),
    });
    arena.recompute_depth(id);

    if size == 0 && !args.keep_empty_files {
        arena.get_mut(id).to_delete = true;
    }

    Ok(id)
}

#[allow(clippy::too_many_arguments)]
fn build_file_node_with_digest(
    arena: &mut Arena,
    name: &str,
    parent: Option<NodeId>,
    weight_adjust: i64,
    args: &Args,
    size: u64,
    modified: std::time::SystemTime,
    digest: String,
) -> NodeId {
    let id = arena.alloc(Node {
        name: name.to_string(),
        parent,
        weight_adjust,
        depth: 0,
        to_delete: false,
        winner: None,
        kind: NodeKind::File(FileData {
            size,
            modified,
            digest: Some(digest),
        }),
    });
    arena.recompute_depth(id);

    if size == 0 && !args.keep_empty_files {
        arena.get_mut(id).to_delete = true;
    }

    id
}

/// Recursively builds a directory subtree in post-order: children are
/// built (and their digests computed) before the parent folds its own
/// digest from them. Hard-excluded basenames are skipped entirely, both
/// for recursion and for recording, so they neither protect nor count
/// toward anything.
fn build_dir_node(
    arena: &mut Arena,
    path: &Path,
    name: &str,
    parent: Option<NodeId>,
    weight_adjust: i64,
    args: &Args,
    cache: &mut DigestCache,
    diagnostics: &mut Vec<String>,
) -> DedupResult<NodeId> {
    let id = arena.alloc(Node {
        name: name.to_string(),
        parent,
        weight_adjust,
        depth: 0,
        to_delete: false,
        winner: None,
        kind: NodeKind::Dir(DirData::default()),
    });
    arena.recompute_depth(id);

    let mut entries: Vec<_> = fs::read_dir(path).map_err(DedupError::Io)?.collect::<Result<Vec<_>, _>>().map_err(DedupError::Io)?;
    entries.sort_by_key(|e| e.file_name());

    // Regular files are gathered first and hashed as a batch so cache
    // misses among siblings can run through a bounded rayon pool; the
    // cache itself is only ever touched back on this thread afterward.
    let mut file_candidates = Vec::new();

    for entry in &entries {
        let entry_name = entry.file_name().to_string_lossy().into_owned();
        let entry_path = entry.path();
        let metadata = fs::metadata(&entry_path).map_err(DedupError::Io)?;

        if metadata.is_dir() {
            if Args::is_excluded_dir(&entry_name) {
                continue;
            }
            let child_id = build_dir_node(arena, &entry_path, &entry_name, Some(id), weight_adjust, args, cache, diagnostics)?;
            arena.get_mut(id).as_dir_mut().unwrap().subdirs.insert(entry_name, child_id);
        } else if is_socket(&metadata) {
            diagnostics.push(format!("# Skipping a socket {}", entry_path.display()));
        } else if metadata.is_file() {
            if Args::is_excluded_file(&entry_name) {
                continue;
            }
            let modified = metadata.modified().map_err(DedupError::Io)?;
            file_candidates.push((entry_name, entry_path, metadata.len(), modified));
        } else {
            return Err(DedupError::UnknownPathType(entry_path.display().to_string()));
        }
    }

    // BTreeSet so both the parallel-hash input order and the later
    // consumption order walk indices ascending, they must line up 1:1.
    let miss_indices: std::collections::BTreeSet<usize> = file_candidates
        .iter()
        .enumerate()
        .filter(|(_, (_, path, _, modified))| !(cache.is_fresh(*modified) && cache.contains(path)))
        .map(|(i, _)| i)
        .collect();
    let miss_paths: Vec<std::path::PathBuf> = miss_indices.iter().map(|&i| file_candidates[i].1.clone()).collect();
    let mut miss_digests = crate::hash::hash_files_parallel(&miss_paths).into_iter();

    for (i, (entry_name, entry_path, size, modified)) in file_candidates.into_iter().enumerate() {
        let digest = if miss_indices.contains(&i) {
            let digest = miss_digests.next().expect("one digest per miss path")?;
            cache.insert(entry_path.clone(), digest.clone(), modified);
            digest
        } else {
            cache.get(&entry_path).expect("checked fresh and present above").to_string()
        };
        let child_id = build_file_node_with_digest(arena, &entry_name, Some(id), weight_adjust, args, size, modified, digest);
        arena.get_mut(id).as_dir_mut().unwrap().files.insert(entry_name, child_id);
    }

    finalize_dir(arena, id, args);
    Ok(id)
}

/// Folds the directory's digest from its now-complete children, and marks
/// directories that had zero recorded children to delete immediately
/// (unless `--keep-empty-dirs`). This is distinct from a directory that
/// becomes empty later as a side effect of resolution; that case is
/// handled by the resolver's empty-propagation pass.
fn finalize_dir(arena: &mut Arena, id: NodeId, args: &Args) {
    let child_digests: Vec<String> = {
        let dir = arena.get(id).as_dir().unwrap();
        dir.files
            .values()
            .chain(dir.subdirs.values())
            .map(|&child| arena.get(child).digest().unwrap_or_default().to_string())
            .collect()
    };
    let digest = fold_directory_digest(child_digests.iter().map(|s| s.as_str()));
    arena.get_mut(id).as_dir_mut().unwrap().digest = Some(digest);

    if arena.started_empty(id) && !args.keep_empty_dirs {
        arena.get_mut(id).to_delete = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::fs;

    fn parse(args: &[&str]) -> Args {
        let mut full = vec!["dedup"];
        full.extend_from_slice(args);
        Args::parse_from(full)
    }

    #[test]
    fn builds_tree_with_duplicate_file_digests() -> DedupResult<()> {
        let dir = std::env::temp_dir().join("dedup_test_scanner_dup_files");
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(dir.join("a"))?;
        fs::create_dir_all(dir.join("b"))?;
        fs::write(dir.join("a/one.txt"), b"same content")?;
        fs::write(dir.join("b/two.txt"), b"same content")?;

        let args = parse(&[dir.to_str().unwrap()]);
        let mut cache = DigestCache::open(&dir.join("cache.dat"))?;
        let (forest, diagnostics) = build_forest(&args, &mut cache)?;
        assert!(diagnostics.is_empty());

        let root_id = forest.roots[0].1;
        let root = forest.arena.get(root_id).as_dir().unwrap();
        let a_id = root.subdirs["a"];
        let b_id = root.subdirs["b"];
        let a_dir = forest.arena.get(a_id).as_dir().unwrap();
        let b_dir = forest.arena.get(b_id).as_dir().unwrap();
        let one_digest = forest.arena.get(a_dir.files["one.txt"]).digest().unwrap();
        let two_digest = forest.arena.get(b_dir.files["two.txt"]).digest().unwrap();
        assert_eq!(one_digest, two_digest);

        let _ = fs::remove_dir_all(&dir);
        Ok(())
    }

    #[test]
    fn hard_excluded_directory_is_never_recorded() -> DedupResult<()> {
        let dir = std::env::temp_dir().join("dedup_test_scanner_exclude_dir");
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(dir.join(".git"))?;
        fs::write(dir.join(".git/config"), b"ignored")?;
        fs::write(dir.join("keep.txt"), b"kept")?;

        let args = parse(&[dir.to_str().unwrap()]);
        let mut cache = DigestCache::open(&dir.join("cache.dat"))?;
        let (forest, _) = build_forest(&args, &mut cache)?;

        let root_id = forest.roots[0].1;
        let root = forest.arena.get(root_id).as_dir().unwrap();
        assert!(!root.subdirs.contains_key(".git"));
        assert!(root.files.contains_key("keep.txt"));

        let _ = fs::remove_dir_all(&dir);
        Ok(())
    }

    #[test]
    fn zero_byte_file_is_marked_to_delete_by_default() -> DedupResult<()> {
        let dir = std::env::temp_dir().join("dedup_test_scanner_zero_byte");
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir)?;
        fs::write(dir.join("empty.txt"), b"")?;

        let args = parse(&[dir.to_str().unwrap()]);
        let mut cache = DigestCache::open(&dir.join("cache.dat"))?;
        let (forest, _) = build_forest(&args, &mut cache)?;

        let root_id = forest.roots[0].1;
        let root = forest.arena.get(root_id).as_dir().unwrap();
        let file_id = root.files["empty.txt"];
        assert!(forest.arena.get(file_id).to_delete);

        let _ = fs::remove_dir_all(&dir);
        Ok(())
    }

    #[test]
    fn started_empty_directory_is_marked_to_delete_by_default() -> DedupResult<()> {
        let dir = std::env::temp_dir().join("dedup_test_scanner_empty_dir");
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(dir.join("empty_sub"))?;

        let args = parse(&[dir.to_str().unwrap()]);
        let mut cache = DigestCache::open(&dir.join("cache.dat"))?;
        let (forest, _) = build_forest(&args, &mut cache)?;

        let root_id = forest.roots[0].1;
        let root = forest.arena.get(root_id).as_dir().unwrap();
        let sub_id = root.subdirs["empty_sub"];
        assert!(forest.arena.get(sub_id).to_delete);

        let _ = fs::remove_dir_all(&dir);
        Ok(())
    }

    #[test]
    fn keep_empty_dirs_flag_spares_started_empty_directories() -> DedupResult<()> {
        let dir = std::env::temp_dir().join("dedup_test_scanner_keep_empty_dir");
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(dir.join("empty_sub"))?;

        let args = parse(&["-e", dir.to_str().unwrap()]);
        let mut cache = DigestCache::open(&dir.join("cache.dat"))?;
        let (forest, _) = build_forest(&args, &mut cache)?;

        let root_id = forest.roots[0].1;
        let root = forest.arena.get(root_id).as_dir().unwrap();
        let sub_id = root.subdirs["empty_sub"];
        assert!(!forest.arena.get(sub_id).to_delete);

        let _ = fs::remove_dir_all(&dir);
        Ok(())
    }
}
