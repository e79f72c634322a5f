use std::path::PathBuf;

use refdb_hash::ObjectId;

/// Error type for reference-database operations.
#[derive(Debug, thiserror::Error)]
pub enum RefDbError {
    #[error("invalid ref name: {0}")]
    InvalidName(String),

    #[error("ref not found: {0}")]
    NotFound(String),

    #[error("ref already exists: {0}")]
    AlreadyExists(String),

    #[error("cannot write ref '{name}': it crosses existing ref '{existing}'")]
    Collision { name: String, existing: String },

    #[error("corrupt packed-refs file: {reason}")]
    CorruptPacked { reason: &'static str },

    #[error("corrupt loose ref '{path}': {reason}")]
    CorruptLoose { path: PathBuf, reason: &'static str },

    #[error("object lookup failed for {oid}")]
    ObjectLookup { oid: ObjectId },

    #[error("symbolic ref loop detected: {0}")]
    SymrefLoop(String),

    #[error("failed to prune {failed} of {attempted} loose refs after packing")]
    Prune { attempted: usize, failed: usize },

    #[error(transparent)]
    Util(#[from] refdb_utils::UtilError),

    #[error("I/O error on {path}: {source}")]
    IoPath {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Hash(#[from] refdb_hash::HashError),
}
