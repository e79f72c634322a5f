//! The slice of the object database this backend consumes.
//!
//! Compaction needs exactly one question answered: what kind of object does
//! an OID name, and (for tags) which object does the tag point at. The
//! [`ObjectSource`] trait captures that single lookup; any real object
//! database implements it at the seam.

use std::collections::HashMap;

use refdb_hash::ObjectId;

use crate::error::RefDbError;

/// The four kinds of stored objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    Blob,
    Tree,
    Commit,
    Tag,
}

/// What a lookup reveals about an object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectInfo {
    pub kind: ObjectKind,
    /// For tag objects, the object the tag points at.
    pub tag_target: Option<ObjectId>,
}

/// Object lookup as consumed by tag peeling.
pub trait ObjectSource {
    /// Classify `oid`. `Ok(None)` means the object does not exist.
    fn lookup(&self, oid: &ObjectId) -> Result<Option<ObjectInfo>, RefDbError>;
}

/// A `HashMap`-backed [`ObjectSource`] for tests and lightweight embedding.
#[derive(Debug, Clone, Default)]
pub struct MemoryObjects {
    objects: HashMap<ObjectId, ObjectInfo>,
}

impl MemoryObjects {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an object.
    pub fn insert(&mut self, oid: ObjectId, info: ObjectInfo) {
        self.objects.insert(oid, info);
    }

    /// Register a commit object.
    pub fn insert_commit(&mut self, oid: ObjectId) {
        self.insert(
            oid,
            ObjectInfo {
                kind: ObjectKind::Commit,
                tag_target: None,
            },
        );
    }

    /// Register a blob object.
    pub fn insert_blob(&mut self, oid: ObjectId) {
        self.insert(
            oid,
            ObjectInfo {
                kind: ObjectKind::Blob,
                tag_target: None,
            },
        );
    }

    /// Register a tag object pointing at `target`.
    pub fn insert_tag(&mut self, oid: ObjectId, target: ObjectId) {
        self.insert(
            oid,
            ObjectInfo {
                kind: ObjectKind::Tag,
                tag_target: Some(target),
            },
        );
    }
}

impl ObjectSource for MemoryObjects {
    fn lookup(&self, oid: &ObjectId) -> Result<Option<ObjectInfo>, RefDbError> {
        Ok(self.objects.get(oid).copied())
    }
}
