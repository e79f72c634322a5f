//! The loose-reference codec and the refs-tree walker.
//!
//! A loose reference is one file whose path below the refs root equals the
//! ref name. Content is either 40 hex digits (direct) or `ref: <name>`
//! (symbolic), with optional trailing whitespace.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use bstr::ByteSlice;
use refdb_hash::{ObjectId, HEX_LEN};
use refdb_utils::LockFile;

use crate::error::RefDbError;
use crate::name::RefName;
use crate::Reference;

const SYMBOLIC_PREFIX: &[u8] = b"ref: ";
const LOCK_EXT: &str = ".lock";

/// The on-disk path of `name` below `root`.
pub(crate) fn ref_path(root: &Path, name: &RefName) -> PathBuf {
    root.join(name.as_str())
}

/// Read the loose file for `name`. `Ok(None)` when no file exists.
pub(crate) fn read(root: &Path, name: &RefName) -> Result<Option<Reference>, RefDbError> {
    let path = ref_path(root, name);
    if !path.is_file() {
        return Ok(None);
    }
    let contents = fs::read(&path).map_err(|e| RefDbError::IoPath {
        path: path.clone(),
        source: e,
    })?;
    parse(&path, name, &contents).map(Some)
}

/// Decode loose-file content into a [`Reference`].
fn parse(path: &Path, name: &RefName, contents: &[u8]) -> Result<Reference, RefDbError> {
    let corrupt = |reason: &'static str| RefDbError::CorruptLoose {
        path: path.to_path_buf(),
        reason,
    };

    if let Some(rest) = contents.strip_prefix(SYMBOLIC_PREFIX) {
        let target = rest.trim_end_with(|c| c.is_ascii_whitespace());
        let target = RefName::new(target).map_err(|_| corrupt("invalid symbolic target"))?;
        return Ok(Reference::symbolic(name.clone(), target));
    }

    if contents.len() < HEX_LEN {
        return Err(corrupt("truncated ref content"));
    }
    let oid =
        ObjectId::from_hex(&contents[..HEX_LEN]).map_err(|_| corrupt("invalid object id"))?;
    if let Some(&after) = contents.get(HEX_LEN) {
        if !after.is_ascii_whitespace() {
            return Err(corrupt("trailing garbage after object id"));
        }
    }
    Ok(Reference::direct(name.clone(), oid))
}

/// Write `reference` as a loose file, atomically via a lock file.
///
/// An empty directory squatting on the target path is removed first; a
/// non-empty one, or a file occupying an ancestor of the path, is a
/// collision.
pub(crate) fn write(root: &Path, reference: &Reference) -> Result<(), RefDbError> {
    let name = reference.name();
    let path = ref_path(root, name);

    ensure_path_free(root, name, &path)?;

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| RefDbError::IoPath {
            path: parent.to_path_buf(),
            source: e,
        })?;
    }

    let mut lock = LockFile::acquire(&path)?;
    let content = match reference {
        Reference::Direct { target, .. } => format!("{}\n", target.to_hex()),
        Reference::Symbolic { target, .. } => format!("ref: {target}\n"),
    };
    io::Write::write_all(&mut lock, content.as_bytes()).map_err(|e| RefDbError::IoPath {
        path: path.clone(),
        source: e,
    })?;
    lock.commit()?;
    Ok(())
}

/// Reject paths where the name cannot become a plain file: an ancestor that
/// is already a file, or the name itself being a non-empty directory.
fn ensure_path_free(root: &Path, name: &RefName, path: &Path) -> Result<(), RefDbError> {
    let mut current = root.to_path_buf();
    let components: Vec<&str> = name.as_str().split('/').collect();
    for prefix in &components[..components.len().saturating_sub(1)] {
        current.push(prefix);
        if current.is_file() {
            let upto = current
                .strip_prefix(root)
                .unwrap_or(&current)
                .to_string_lossy()
                .replace('\\', "/");
            return Err(RefDbError::Collision {
                name: name.to_string(),
                existing: upto,
            });
        }
    }

    if path.is_dir() {
        // An empty directory is leftover namespace structure; take it over.
        if fs::remove_dir(path).is_err() {
            return Err(RefDbError::Collision {
                name: name.to_string(),
                existing: format!("{name}/"),
            });
        }
    }
    Ok(())
}

/// Remove the loose file for `name`, pruning directories it leaves empty.
/// Returns whether a file existed.
pub(crate) fn remove(root: &Path, name: &RefName) -> Result<bool, RefDbError> {
    let path = ref_path(root, name);
    match fs::remove_file(&path) {
        Ok(()) => {
            prune_empty_parents(root, &path);
            Ok(true)
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(RefDbError::IoPath { path, source: e }),
    }
}

/// Walk parent directories upwards, deleting while they are empty. Stops at
/// the refs root (or the first non-empty directory).
fn prune_empty_parents(root: &Path, path: &Path) {
    let refs_root = root.join("refs");
    let mut dir = path.parent().map(Path::to_path_buf);
    while let Some(d) = dir {
        if d == refs_root || d == *root || fs::remove_dir(&d).is_err() {
            break;
        }
        dir = d.parent().map(Path::to_path_buf);
    }
}

/// Collect the names of all loose refs under `<root>/refs`, sorted by name.
/// Lock files and names that fail validation are skipped.
pub(crate) fn walk(root: &Path) -> Result<Vec<RefName>, RefDbError> {
    let mut names = Vec::new();
    let base = root.join("refs");
    if base.is_dir() {
        collect(&base, "refs", &mut names)?;
    }
    names.sort();
    Ok(names)
}

fn collect(dir: &Path, prefix: &str, out: &mut Vec<RefName>) -> Result<(), RefDbError> {
    let entries = match fs::read_dir(dir) {
        Ok(e) => e,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => {
            return Err(RefDbError::IoPath {
                path: dir.to_path_buf(),
                source: e,
            })
        }
    };

    for entry in entries {
        let entry = entry.map_err(|e| RefDbError::IoPath {
            path: dir.to_path_buf(),
            source: e,
        })?;
        let file_name = entry.file_name();
        let Some(utf8) = file_name.to_str() else {
            continue;
        };
        let child_name = format!("{prefix}/{utf8}");
        let path = entry.path();

        if path.is_dir() {
            collect(&path, &child_name, out)?;
        } else if path.is_file() {
            if child_name.ends_with(LOCK_EXT) {
                continue;
            }
            if let Ok(name) = RefName::new(child_name.as_str()) {
                out.push(name);
            }
        }
    }
    Ok(())
}
