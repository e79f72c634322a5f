//! Object identity for the refdb reference database.
//!
//! References name immutable objects by a 160-bit identifier, rendered as 40
//! hex digits on disk. This crate provides the `ObjectId` type and the hex
//! encoding/decoding it is built on. Hash *computation* is not a concern
//! here; identifiers arrive pre-computed from the object database.

mod error;
pub mod hex;
mod oid;

pub use error::HashError;
pub use oid::{ObjectId, HEX_LEN, RAW_LEN};
