use std::io;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DedupError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("cache error: {0}")]
    Cache(String),

    #[error("cache serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("don't know what to do with path: {0}")]
    UnknownPathType(String),

    /// Reserved for a scanner bug where a node's ancestry doesn't match
    /// the path it was built from. The arena-based scanner builds a
    /// node's path purely from its own `parent` chain, so this can't
    /// currently be constructed, but the variant and its exit code stay
    /// reserved for that class of bug.
    #[error("directory digest mismatch while inserting {0}: scanner produced a node whose ancestry does not match its path")]
    AncestryMismatch(String),

    #[error(
        "birthday lottery crisis: '{loser}' ({loser_size} bytes) hashes the same as '{winner}' ({winner_size} bytes) but their sizes differ"
    )]
    BirthdayLottery {
        winner: String,
        winner_size: u64,
        loser: String,
        loser_size: u64,
    },

    #[error("test harness failure: {0}")]
    Harness(String),
}

pub type DedupResult<T> = Result<T, DedupError>;
