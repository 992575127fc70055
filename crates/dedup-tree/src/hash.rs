use std::fmt::Write as _;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use dedup_cache::DigestCache;
use dedup_core::DedupResult;
use digest::Digest;

/// Bytes read per `update()` call when streaming a file through the
/// hasher. Large enough to amortize syscall overhead, small enough to
/// keep memory flat regardless of file size.
const CHUNK_SIZE: usize = 64 * 1024;

/// The SHA-1 digest of the empty string. Every directory with no live
/// children folds to this constant, so two unrelated empty directories
/// are always considered duplicates of each other.
pub const EMPTY_DIGEST: &str = "da39a3ee5e6b4b0d3255bfef95601890afd80709";

/// Streaming SHA-1 hasher. A thin wrapper over the `sha1` crate so callers
/// never name the underlying implementation directly.
#[derive(Clone, Debug, Default)]
pub struct StreamingHasher {
    inner: sha1::Sha1,
}

impl StreamingHasher {
    pub fn new() -> Self {
        StreamingHasher { inner: sha1::Sha1::new() }
    }

    pub fn update(&mut self, data: &[u8]) {
        self.inner.update(data);
    }

    pub fn finalize_hex(self) -> String {
        to_hex(&self.inner.finalize())
    }
}

fn to_hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        write!(&mut out, "{byte:02x}").expect("write! to String cannot fail");
    }
    out
}

/// Hashes a regular file's full contents, streaming it in fixed-size
/// chunks rather than reading it into memory at once.
pub fn hash_file(path: &Path) -> DedupResult<String> {
    let mut file = File::open(path)?;
    let mut hasher = StreamingHasher::new();
    let mut buf = vec![0u8; CHUNK_SIZE];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hasher.finalize_hex())
}

/// Looks up a file's digest in the cache, falling back to hashing it from
/// disk when the entry is missing or the cache is stale relative to the
/// file's modification time. Freshly computed digests are inserted back
/// into the cache for the caller to persist later.
pub fn hash_file_cached(path: &Path, modified: std::time::SystemTime, cache: &mut DigestCache) -> DedupResult<String> {
    if cache.is_fresh(modified) {
        if let Some(digest) = cache.get(path) {
            return Ok(digest.to_string());
        }
    }
    let digest = hash_file(path)?;
    cache.insert(path.to_path_buf(), digest.clone(), modified);
    Ok(digest)
}

/// Hashes many files concurrently across a bounded `rayon` pool. Pure and
/// cache-free by design: the directory walk decides which siblings are
/// cache misses, this function only does the I/O-bound hashing, and the
/// caller serializes the results back into the cache afterward. This
/// keeps the one shared mutable resource (the cache) off the worker
/// threads entirely.
pub fn hash_files_parallel(paths: &[std::path::PathBuf]) -> Vec<DedupResult<String>> {
    use rayon::prelude::*;
    paths.par_iter().map(|p| hash_file(p)).collect()
}

/// Folds a directory's digest from its immediate children's digests:
/// sort the child digest strings lexicographically, concatenate their
/// raw bytes in that order, and hash the result. Lexicographic sort
/// (rather than by name) keeps the fold order-independent of renames
/// that don't change the underlying content.
pub fn fold_directory_digest<'a>(child_digests: impl IntoIterator<Item = &'a str>) -> String {
    let mut digests: Vec<&str> = child_digests.into_iter().collect();
    digests.sort_unstable();

    let mut hasher = StreamingHasher::new();
    for digest in &digests {
        hasher.update(digest.as_bytes());
    }
    hasher.finalize_hex()
}
