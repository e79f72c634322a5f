//! Foundation utilities for the refdb reference database.
//!
//! Two primitives the backend consumes everywhere: the atomic-rename lock
//! file writer (`LockFile`) and a byte-oriented glob matcher (`glob`).

pub mod error;
pub mod glob;
pub mod lockfile;

pub use error::{LockError, UtilError};
pub use lockfile::LockFile;

pub type Result<T> = std::result::Result<T, UtilError>;
