use dedup_core::{Args, DedupError, DedupResult};
use dedup_tree::{Arena, Forest, NodeId};

use crate::index::Index;

/// Composite ordering key: depth first, then pathname length, then the
/// pathname itself lexicographically. Ascending order prefers the
/// shallowest, shortest, earliest path as the winner; `--reverse-selection`
/// reverses the whole ordering rather than any single field.
fn sort_key(arena: &Arena, id: NodeId) -> (i64, usize, String) {
    let node = arena.get(id);
    let path = arena.pathname(id).to_string_lossy().into_owned();
    (node.depth, path.len(), path)
}

/// Picks a winner from `candidates` (a digest-sharing bucket) and marks
/// the rest to-delete. Diagnostic lines are appended rather than printed
/// so the caller can gate them on `--verbosity`.
fn resolve_candidates(arena: &mut Arena, candidates: &[NodeId], args: &Args, diagnostics: &mut Vec<String>) -> DedupResult<()> {
    if candidates.is_empty() {
        return Ok(());
    }

    let mut ordered: Vec<NodeId> = candidates.to_vec();
    ordered.sort_by(|&a, &b| sort_key(arena, a).cmp(&sort_key(arena, b)));
    if args.reverse_selection {
        ordered.reverse();
    }

    let winner = ordered[0];
    let losers = &ordered[1..];

    let winner_node = arena.get(winner);
    if winner_node.is_dir() {
        if arena.is_empty(winner) {
            return Ok(());
        }
    } else if winner_node.as_file().map(|f| f.size) == Some(0) {
        return Ok(());
    }

    let winner_path = arena.pathname(winner).display().to_string();
    let winner_size = arena.get(winner).as_file().map(|f| f.size);

    for &loser in losers {
        if arena.get(loser).to_delete {
            continue;
        }

        if let (Some(winner_size), Some(loser_file)) = (winner_size, arena.get(loser).as_file()) {
            if loser_file.size != winner_size {
                let loser_path = arena.pathname(loser).display().to_string();
                return Err(DedupError::BirthdayLottery {
                    winner: winner_path,
                    winner_size,
                    loser: loser_path,
                    loser_size: loser_file.size,
                });
            }
        }

        if args.verbosity > 0 {
            let kind = if arena.get(loser).is_dir() { "dir " } else { "file" };
            let loser_path = arena.pathname(loser).display().to_string();
            diagnostics.push(format!("# {kind} \"{loser_path}\" covered by \"{winner_path}\""));
        }

        arena.mark_for_delete(loser);
        arena.get_mut(loser).winner = Some(winner);
    }

    Ok(())
}

/// Phase A: resolves every digest-sharing bucket with at least two live
/// members, directories before files, directory buckets walked in depth
/// order. Returns the number of newly to-delete nodes.
pub fn resolve(forest: &mut Forest, args: &Args, diagnostics: &mut Vec<String>) -> DedupResult<usize> {
    let prev = forest.count_deleted();
    let index = Index::build(forest);

    let depths: Vec<i64> = {
        let mut d: Vec<i64> = (index.min_depth() - 1..=index.max_depth()).collect();
        if args.reverse_selection {
            d.reverse();
        }
        d
    };

    for depth_filter in depths {
        let dir_buckets: Vec<Vec<NodeId>> = index
            .duplicate_buckets()
            .filter(|b| forest.arena.get(b[0]).is_dir())
            .cloned()
            .collect();
        for bucket in dir_buckets {
            let maybes: Vec<NodeId> = bucket
                .into_iter()
                .filter(|&id| {
                    let depth = forest.arena.get(id).depth;
                    if args.reverse_selection {
                        depth < depth_filter
                    } else {
                        depth > depth_filter
                    }
                })
                .collect();
            if !maybes.is_empty() {
                resolve_candidates(&mut forest.arena, &maybes, args, diagnostics)?;
            }
        }
    }

    let file_buckets: Vec<Vec<NodeId>> = index.duplicate_buckets().filter(|b| !forest.arena.get(b[0]).is_dir()).cloned().collect();
    for bucket in file_buckets {
        resolve_candidates(&mut forest.arena, &bucket, args, diagnostics)?;
    }

    Ok(forest.count_deleted() - prev)
}

/// Phase B: marks the shallowest directories that are empty (every live
/// child file to-delete, every live child directory to-delete or itself
/// empty) to-delete. A directory already empty whose parent is also
/// currently empty is deliberately left unmarked this pass. The parent
/// either gets marked in this same walk (cascading down to it anyway) or,
/// if the parent defers too, the whole chain resolves once an ancestor's
/// own check succeeds.
pub fn prune_empty(forest: &mut Forest, args: &Args) -> usize {
    if args.keep_empty_dirs {
        return 0;
    }
    let prev = forest.count_deleted();
    let root_ids: Vec<NodeId> = forest.root_ids().collect();
    for root_id in root_ids {
        if forest.arena.get(root_id).is_dir() {
            prune_dir(&mut forest.arena, root_id);
        }
    }
    forest.count_deleted() - prev
}

fn prune_dir(arena: &mut Arena, id: NodeId) {
    let node = arena.get(id);
    if node.to_delete {
        return;
    }

    if arena.is_empty(id) {
        let parent_is_empty = match node.parent {
            None => false,
            Some(p) => arena.is_empty(p),
        };
        if !parent_is_empty {
            arena.mark_for_delete(id);
            return;
        }
    }

    let subdirs: Vec<NodeId> = match arena.get(id).as_dir() {
        Some(d) => d.subdirs.values().copied().collect(),
        None => return,
    };
    for child in subdirs {
        prune_dir(arena, child);
    }
}

/// Runs Phase B then Phase A to a fixed point: each outer pass rebuilds
/// state from the previous pass's results, and the loop stops the moment
/// a pass marks nothing new.
pub fn analyze(forest: &mut Forest, args: &Args, diagnostics: &mut Vec<String>) -> DedupResult<usize> {
    let mut total = 0;
    loop {
        let deleted_dirs = prune_empty(forest, args);
        let deleted_hashes = resolve(forest, args, diagnostics)?;
        let deleted = deleted_dirs + deleted_hashes;
        total += deleted;
        if deleted == 0 {
            break;
        }
        if args.verbosity > 0 {
            diagnostics.push(format!("# {deleted} entries deleted this pass"));
        }
    }
    Ok(total)
}
