pub mod hash;
pub mod node;
pub mod scanner;

pub use hash::{fold_directory_digest, hash_file, hash_file_cached, hash_files_parallel, StreamingHasher, EMPTY_DIGEST};
pub use node::{Arena, DirData, FileData, Node, NodeId, NodeKind};
pub use scanner::{build_forest, Forest};
