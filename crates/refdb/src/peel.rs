//! Tag peeling for packed entries.

use refdb_hash::ObjectId;

use crate::error::RefDbError;
use crate::odb::{ObjectKind, ObjectSource};
use crate::packed::{EntryFlags, PackedEntry};

/// Upper bound on the length of a tag-to-tag chain we will follow.
const MAX_TAG_CHAIN: usize = 10;

/// Settle the peel state of `entry`.
///
/// Entries already flagged `HAS_PEEL` or `CANNOT_PEEL` are left alone.
/// Otherwise the referenced object is classified: a tag contributes the
/// first non-tag object behind its chain as the peel; anything else marks
/// the entry unpeelable. After this, an emitter can truthfully claim
/// fully-peeled output.
pub(crate) fn resolve(
    entry: &mut PackedEntry,
    objects: &dyn ObjectSource,
) -> Result<(), RefDbError> {
    if entry.peel_settled() {
        return Ok(());
    }

    let info = lookup(objects, &entry.oid)?;
    if info.kind != ObjectKind::Tag {
        entry.flags |= EntryFlags::CANNOT_PEEL;
        return Ok(());
    }

    let mut target = info
        .tag_target
        .ok_or(RefDbError::ObjectLookup { oid: entry.oid })?;
    for _ in 0..MAX_TAG_CHAIN {
        let next = lookup(objects, &target)?;
        if next.kind != ObjectKind::Tag {
            entry.peel = Some(target);
            entry.flags |= EntryFlags::HAS_PEEL;
            return Ok(());
        }
        target = next
            .tag_target
            .ok_or(RefDbError::ObjectLookup { oid: target })?;
    }
    Err(RefDbError::ObjectLookup { oid: target })
}

fn lookup(
    objects: &dyn ObjectSource,
    oid: &ObjectId,
) -> Result<crate::odb::ObjectInfo, RefDbError> {
    objects
        .lookup(oid)?
        .ok_or(RefDbError::ObjectLookup { oid: *oid })
}
