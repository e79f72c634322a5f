//! The reference database backend.

use std::fs;
use std::path::{Path, PathBuf};

use refdb_hash::ObjectId;
use refdb_utils::LockFile;

use crate::cache::RefCache;
use crate::error::RefDbError;
use crate::iter::RefIter;
use crate::loose;
use crate::name::RefName;
use crate::odb::ObjectSource;
use crate::packed::{self, EntryFlags, PackedEntry};
use crate::peel;
use crate::Reference;

const PACKED_REFS_FILE: &str = "packed-refs";

/// Maximum depth for following symbolic ref chains.
const MAX_SYMREF_DEPTH: usize = 10;

/// Filesystem-backed reference database: loose refs under the refs root,
/// packed refs in a single `packed-refs` file, loose shadowing packed.
///
/// A `RefDb` is a single-writer handle: every operation may refresh the
/// internal packed cache, so the API takes `&mut self` throughout. Sharing
/// a view across readers means opening one handle per reader.
pub struct RefDb {
    /// Repository root; `packed-refs` lives here.
    repo_dir: PathBuf,
    /// Root of the loose tree: `repo_dir`, plus the expanded namespace.
    refs_root: PathBuf,
    cache: RefCache,
}

impl RefDb {
    /// Open the reference database of the repository at `repo_dir`.
    pub fn open(repo_dir: impl AsRef<Path>) -> Result<Self, RefDbError> {
        Self::new_inner(repo_dir.as_ref().to_path_buf(), None)
    }

    /// Open rooted inside a namespace. A namespace string `a/b` expands to
    /// `refs/namespaces/a/refs/namespaces/b` below the repository root; the
    /// loose tree lives under that prefix while `packed-refs` stays at the
    /// repository root.
    pub fn with_namespace(
        repo_dir: impl AsRef<Path>,
        namespace: &str,
    ) -> Result<Self, RefDbError> {
        Self::new_inner(repo_dir.as_ref().to_path_buf(), Some(namespace))
    }

    fn new_inner(repo_dir: PathBuf, namespace: Option<&str>) -> Result<Self, RefDbError> {
        let refs_root = match namespace {
            Some(ns) => repo_dir.join(expand_namespace(ns)),
            None => repo_dir.clone(),
        };
        let refs_dir = refs_root.join("refs");
        fs::create_dir_all(&refs_dir).map_err(|e| RefDbError::IoPath {
            path: refs_dir,
            source: e,
        })?;
        Ok(Self {
            repo_dir,
            refs_root,
            cache: RefCache::default(),
        })
    }

    /// The repository root this database was opened on.
    pub fn repo_dir(&self) -> &Path {
        &self.repo_dir
    }

    /// The directory the loose tree hangs off (differs from `repo_dir` only
    /// under a namespace).
    pub fn refs_root(&self) -> &Path {
        &self.refs_root
    }

    fn packed_path(&self) -> PathBuf {
        self.repo_dir.join(PACKED_REFS_FILE)
    }

    /// Does `name` exist in either store?
    pub fn exists(&mut self, name: &RefName) -> Result<bool, RefDbError> {
        let packed_path = self.packed_path();
        self.cache.refresh(&packed_path)?;
        if loose::ref_path(&self.refs_root, name).is_file() {
            return Ok(true);
        }
        Ok(self.cache.contains(name))
    }

    /// Look up `name`, loose store first, then packed.
    pub fn lookup(&mut self, name: &RefName) -> Result<Reference, RefDbError> {
        if let Some(reference) = loose::read(&self.refs_root, name)? {
            return Ok(reference);
        }
        let packed_path = self.packed_path();
        self.cache.refresh(&packed_path)?;
        match self.cache.get(name) {
            Some(entry) => Ok(Reference::Direct {
                name: entry.name.clone(),
                target: entry.oid,
                peel: entry.peel,
            }),
            None => Err(RefDbError::NotFound(name.to_string())),
        }
    }

    /// Write `reference` as a loose file.
    ///
    /// Without `force`, an existing ref of the same name is rejected. A
    /// packed entry of the same name is left in place; the new loose file
    /// shadows it until the next compaction overwrites it.
    pub fn write(&mut self, reference: &Reference, force: bool) -> Result<(), RefDbError> {
        self.ensure_available(reference.name(), None, force)?;
        loose::write(&self.refs_root, reference)
    }

    /// Delete `name` from both stores.
    ///
    /// The loose file is unlinked first, then the packed file is rewritten
    /// without the entry. A failure between the two leaves the packed entry
    /// live; a retry completes the removal. `NotFound` when the name was in
    /// neither store.
    pub fn delete(&mut self, name: &RefName) -> Result<(), RefDbError> {
        let had_loose = loose::remove(&self.refs_root, name)?;
        let packed_path = self.packed_path();
        self.cache.refresh(&packed_path)?;
        let had_packed = self.cache.remove(name).is_some();
        if had_packed {
            self.write_packed()?;
        }
        if !had_loose && !had_packed {
            return Err(RefDbError::NotFound(name.to_string()));
        }
        Ok(())
    }

    /// Rename `old` to `new`, carrying the value over.
    ///
    /// `new` must be available (its existence is tolerated only when
    /// forcing; colliding with anything but `old` never is). Not atomic: a
    /// failure after the delete surfaces with `old` already gone.
    pub fn rename(
        &mut self,
        old: &RefName,
        new: &RefName,
        force: bool,
    ) -> Result<(), RefDbError> {
        self.ensure_available(new, Some(old), force)?;
        let value = self.lookup(old)?;
        let moved = match value {
            Reference::Direct { target, peel, .. } => Reference::Direct {
                name: new.clone(),
                target,
                peel,
            },
            Reference::Symbolic { target, .. } => Reference::Symbolic {
                name: new.clone(),
                target,
            },
        };
        self.delete(old)?;
        loose::write(&self.refs_root, &moved)
    }

    /// Fold every loose ref into the packed file, then delete the absorbed
    /// loose files.
    ///
    /// The packed file is committed before any loose file is unlinked, so a
    /// crash in between leaves every name readable (the surviving loose
    /// value equals the packed one). Loose deletions that fail are counted
    /// and reported as a single [`RefDbError::Prune`] after the sweep; the
    /// packed file is never rolled back.
    pub fn compress(&mut self, objects: &dyn ObjectSource) -> Result<(), RefDbError> {
        let packed_path = self.packed_path();
        self.cache.refresh(&packed_path)?;

        // Absorb the loose tree. Symbolic refs have no packed representation
        // and stay loose.
        for name in loose::walk(&self.refs_root)? {
            let Some(reference) = loose::read(&self.refs_root, &name)? else {
                continue;
            };
            if let Reference::Direct { target, .. } = reference {
                let mut entry = PackedEntry::new(name, target);
                entry.flags |= EntryFlags::WAS_LOOSE;
                self.cache.insert(entry);
            }
        }

        // Settle every peel before emission; lookups hitting a missing
        // object abort the compaction with the disk untouched.
        for entry in self.cache.entries_mut() {
            peel::resolve(entry, objects)?;
        }

        self.write_packed()?;

        // Past the atomic cut: prune absorbed loose files, keeping going on
        // failure and reporting the aggregate at the end.
        let absorbed: Vec<RefName> = self
            .cache
            .entries()
            .filter(|e| e.flags.contains(EntryFlags::WAS_LOOSE))
            .map(|e| e.name.clone())
            .collect();
        let mut failed = 0usize;
        for name in &absorbed {
            match loose::remove(&self.refs_root, name) {
                Ok(_) => {
                    if let Some(entry) = self.cache.get_mut(name) {
                        entry.flags.remove(EntryFlags::WAS_LOOSE);
                    }
                }
                Err(_) => failed += 1,
            }
        }
        if failed > 0 {
            return Err(RefDbError::Prune {
                attempted: absorbed.len(),
                failed,
            });
        }
        Ok(())
    }

    /// Iterate the merged namespace, loose refs first, packed entries not
    /// shadowed by a loose file after. `glob` filters names when given.
    pub fn iter(&mut self, glob: Option<&str>) -> Result<RefIter, RefDbError> {
        let packed_path = self.packed_path();
        self.cache.refresh(&packed_path)?;
        RefIter::new(self.refs_root.clone(), &self.cache, glob)
    }

    /// Resolve `name` to an OID, following symbolic chains through both
    /// stores. `Ok(None)` when the chain dangles (e.g. an unborn branch).
    pub fn resolve_to_oid(&mut self, name: &RefName) -> Result<Option<ObjectId>, RefDbError> {
        let mut current = name.clone();
        for _ in 0..=MAX_SYMREF_DEPTH {
            match self.lookup(&current) {
                Ok(Reference::Direct { target, .. }) => return Ok(Some(target)),
                Ok(Reference::Symbolic { target, .. }) => current = target,
                Err(RefDbError::NotFound(_)) => return Ok(None),
                Err(e) => return Err(e),
            }
        }
        Err(RefDbError::SymrefLoop(name.to_string()))
    }

    /// Serialize the cache to the packed file and record the new mtime.
    fn write_packed(&mut self) -> Result<(), RefDbError> {
        let path = self.packed_path();
        let snapshot = self.cache.snapshot();
        let mut lock = LockFile::acquire(&path)?;
        packed::emit(&mut lock, &snapshot).map_err(|e| RefDbError::IoPath {
            path: path.clone(),
            source: e,
        })?;
        lock.commit()?;
        let mtime = fs::metadata(&path).and_then(|m| m.modified()).ok();
        self.cache.set_mtime(mtime);
        Ok(())
    }

    /// Availability check for `name`: existence (unless forcing) and the
    /// prefix-collision rule against the packed namespace. Loose-vs-loose
    /// conflicts surface later, at write time, through the directory/file
    /// checks of the loose writer.
    fn ensure_available(
        &mut self,
        name: &RefName,
        being_renamed: Option<&RefName>,
        force: bool,
    ) -> Result<(), RefDbError> {
        if !force && self.exists(name)? {
            return Err(RefDbError::AlreadyExists(name.to_string()));
        }
        let packed_path = self.packed_path();
        self.cache.refresh(&packed_path)?;
        for entry in self.cache.entries() {
            if Some(&entry.name) == being_renamed {
                continue;
            }
            if name.collides_with(&entry.name) {
                return Err(RefDbError::Collision {
                    name: name.to_string(),
                    existing: entry.name.to_string(),
                });
            }
        }
        Ok(())
    }
}

/// Expand a namespace string: each `/`-separated segment becomes a
/// `refs/namespaces/<segment>` path component.
fn expand_namespace(namespace: &str) -> PathBuf {
    let mut path = PathBuf::new();
    for segment in namespace.split('/').filter(|s| !s.is_empty()) {
        path.push("refs");
        path.push("namespaces");
        path.push(segment);
    }
    path
}
