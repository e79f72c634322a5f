//! Merged iteration over the loose and packed stores.

use std::collections::HashSet;
use std::path::PathBuf;

use refdb_utils::glob::glob_match;

use crate::cache::RefCache;
use crate::error::RefDbError;
use crate::loose;
use crate::name::RefName;
use crate::packed::PackedEntry;
use crate::Reference;

/// An owning cursor over the merged reference namespace.
///
/// Construction snapshots everything it needs: the loose names below the
/// refs root (lock files and glob misses excluded), and a copy of the packed
/// entries that are neither shadowed by a loose file nor filtered by the
/// glob. The cache itself is never touched after construction, so walks stay
/// valid across later cache refreshes.
///
/// Loose names are yielded first; reading a loose file is deferred to the
/// step that yields it, and names whose file has meanwhile vanished or gone
/// bad are skipped.
pub struct RefIter {
    refs_root: PathBuf,
    loose: Vec<RefName>,
    packed: Vec<PackedEntry>,
    loose_pos: usize,
    packed_pos: usize,
}

impl RefIter {
    pub(crate) fn new(
        refs_root: PathBuf,
        cache: &RefCache,
        glob: Option<&str>,
    ) -> Result<Self, RefDbError> {
        let matches = |name: &RefName| match glob {
            Some(pattern) => glob_match(pattern.as_bytes(), name.as_bytes()),
            None => true,
        };

        let loose: Vec<RefName> = loose::walk(&refs_root)?
            .into_iter()
            .filter(|name| matches(name))
            .collect();

        let shadowed: HashSet<&RefName> = loose.iter().collect();
        let packed: Vec<PackedEntry> = cache
            .entries()
            .filter(|entry| !shadowed.contains(&entry.name) && matches(&entry.name))
            .cloned()
            .collect();

        Ok(Self {
            refs_root,
            loose,
            packed,
            loose_pos: 0,
            packed_pos: 0,
        })
    }

    /// Advance to the next reference name without reading loose content.
    pub fn next_name(&mut self) -> Option<RefName> {
        if self.loose_pos < self.loose.len() {
            let name = self.loose[self.loose_pos].clone();
            self.loose_pos += 1;
            return Some(name);
        }
        if self.packed_pos < self.packed.len() {
            let name = self.packed[self.packed_pos].name.clone();
            self.packed_pos += 1;
            return Some(name);
        }
        None
    }
}

impl Iterator for RefIter {
    type Item = Reference;

    fn next(&mut self) -> Option<Reference> {
        while self.loose_pos < self.loose.len() {
            let name = &self.loose[self.loose_pos];
            self.loose_pos += 1;
            // A file that disappeared or no longer parses is dropped from
            // the walk rather than failing it.
            if let Ok(Some(reference)) = loose::read(&self.refs_root, name) {
                return Some(reference);
            }
        }
        if self.packed_pos < self.packed.len() {
            let entry = &self.packed[self.packed_pos];
            self.packed_pos += 1;
            return Some(Reference::Direct {
                name: entry.name.clone(),
                target: entry.oid,
                peel: entry.peel,
            });
        }
        None
    }
}
