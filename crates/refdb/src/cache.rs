//! The in-memory view of the packed-refs file.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::Path;
use std::time::SystemTime;

use crate::error::RefDbError;
use crate::name::RefName;
use crate::packed::{self, PackedEntry};

/// Packed entries keyed by name, plus the packed file's modification time as
/// observed at the last load.
///
/// Lazily (re)loaded: `refresh` compares the file's mtime against the
/// recorded one and reparses only on change. A parse failure empties the
/// cache, so the next operation retries from disk. The map is ordered
/// byte-wise by name, which is the order emission wants.
#[derive(Debug, Default)]
pub(crate) struct RefCache {
    entries: BTreeMap<RefName, PackedEntry>,
    mtime: Option<SystemTime>,
}

impl RefCache {
    /// Bring the cache up to date with the packed file at `path`.
    pub fn refresh(&mut self, path: &Path) -> Result<(), RefDbError> {
        let meta = match fs::metadata(path) {
            Ok(m) => m,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                self.entries.clear();
                self.mtime = None;
                return Ok(());
            }
            Err(e) => {
                return Err(RefDbError::IoPath {
                    path: path.to_path_buf(),
                    source: e,
                })
            }
        };
        let mtime = meta.modified().map_err(|e| RefDbError::IoPath {
            path: path.to_path_buf(),
            source: e,
        })?;
        if self.mtime == Some(mtime) {
            return Ok(());
        }

        self.entries.clear();
        self.mtime = None;
        let data = fs::read(path).map_err(|e| RefDbError::IoPath {
            path: path.to_path_buf(),
            source: e,
        })?;
        let (entries, _) = packed::parse(&data)?;
        for entry in entries {
            self.entries.insert(entry.name.clone(), entry);
        }
        self.mtime = Some(mtime);
        Ok(())
    }

    pub fn contains(&self, name: &RefName) -> bool {
        self.entries.contains_key(name)
    }

    pub fn get(&self, name: &RefName) -> Option<&PackedEntry> {
        self.entries.get(name)
    }

    pub fn get_mut(&mut self, name: &RefName) -> Option<&mut PackedEntry> {
        self.entries.get_mut(name)
    }

    /// Insert `entry`, replacing any previous entry of the same name.
    pub fn insert(&mut self, entry: PackedEntry) {
        self.entries.insert(entry.name.clone(), entry);
    }

    pub fn remove(&mut self, name: &RefName) -> Option<PackedEntry> {
        self.entries.remove(name)
    }

    /// Entries in ascending name order.
    pub fn entries(&self) -> impl Iterator<Item = &PackedEntry> {
        self.entries.values()
    }

    pub fn entries_mut(&mut self) -> impl Iterator<Item = &mut PackedEntry> {
        self.entries.values_mut()
    }

    /// An owned, name-sorted copy of all entries.
    pub fn snapshot(&self) -> Vec<PackedEntry> {
        self.entries.values().cloned().collect()
    }

    /// Record the mtime of a packed file this process just wrote, so the
    /// next refresh does not reparse our own output.
    pub fn set_mtime(&mut self, mtime: Option<SystemTime>) {
        self.mtime = mtime;
    }
}
