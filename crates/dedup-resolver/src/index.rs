use std::collections::HashMap;

use dedup_tree::{Arena, Forest, NodeId};

/// A digest-keyed bucket map over the currently-live forest, rebuilt fresh
/// for every Resolver pass rather than patched incrementally. Directory
/// digests never need recomputation here: they were folded once, bottom-up,
/// during scanning and do not depend on any node's to-delete flag, so the
/// Index only has to re-walk which nodes are still live.
#[derive(Debug, Default)]
pub struct Index {
    buckets: HashMap<String, Vec<NodeId>>,
    min_depth: i64,
    max_depth: i64,
}

impl Index {
    /// Walks every root, descending into live directories only (a
    /// to-delete directory's descendants are, by the cascade invariant,
    /// all to-delete too, so skipping the subtree entirely is safe and
    /// avoids a redundant walk).
    pub fn build(forest: &Forest) -> Index {
        let mut index = Index {
            buckets: HashMap::new(),
            min_depth: 1,
            max_depth: 0,
        };
        for root_id in forest.root_ids() {
            index.walk(&forest.arena, root_id);
        }
        index
    }

    fn walk(&mut self, arena: &Arena, id: NodeId) {
        let node = arena.get(id);
        if node.to_delete {
            return;
        }
        match node.as_dir() {
            None => self.add(arena, id),
            Some(dir) => {
                let children: Vec<NodeId> = dir.files.values().chain(dir.subdirs.values()).copied().collect();
                for child in children {
                    self.walk(arena, child);
                }
                self.add(arena, id);
            }
        }
    }

    fn add(&mut self, arena: &Arena, id: NodeId) {
        let node = arena.get(id);
        if let Some(digest) = node.digest() {
            self.buckets.entry(digest.to_string()).or_default().push(id);
        }
        if node.depth < self.min_depth {
            self.min_depth = node.depth;
        }
        if node.depth > self.max_depth {
            self.max_depth = node.depth;
        }
    }

    pub fn min_depth(&self) -> i64 {
        self.min_depth
    }

    pub fn max_depth(&self) -> i64 {
        self.max_depth
    }

    /// Buckets with at least two members, dropping singletons before the
    /// expensive candidate-ordering work in the Resolver.
    pub fn duplicate_buckets(&self) -> impl Iterator<Item = &Vec<NodeId>> {
        self.buckets.values().filter(|v| v.len() > 1)
    }
}
