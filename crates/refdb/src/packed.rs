//! The packed-refs codec.
//!
//! UTF-8-ish, line-oriented text. An optional traits header on the first
//! line declares how much peeling the writer performed; each entry is a
//! 40-hex OID, one space, and the ref name, optionally followed by a `^`
//! line carrying the peeled OID of an annotated tag:
//!
//! ```text
//! # pack-refs with: peeled fully-peeled
//! 6fa8a902cc1d18527e1355773c86721945475d37 refs/tags/v0.4
//! ^2ec0cb7959b0bf965d54f95453f5b4b34e8d3100
//! ```

use std::io::Write;

use bstr::ByteSlice;
use refdb_hash::{ObjectId, HEX_LEN};

use crate::error::RefDbError;
use crate::name::RefName;

/// The header the emitter always writes: output is peeled exhaustively.
pub const HEADER: &[u8] = b"# pack-refs with: peeled fully-peeled \n";

const TRAITS_PREFIX: &[u8] = b"# pack-refs with: ";

bitflags::bitflags! {
    /// Per-entry state tracked alongside the packed record.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct EntryFlags: u8 {
        /// `peel` is populated and authoritative.
        const HAS_PEEL = 1 << 0;
        /// Peeling was attempted or declared impossible (non-tag object, or
        /// declared unpeelable by the file header).
        const CANNOT_PEEL = 1 << 1;
        /// Absorbed from a loose file by the running compaction; the loose
        /// file is scheduled for deletion once the packed file is committed.
        const WAS_LOOSE = 1 << 2;
    }
}

/// One record of the packed-refs file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackedEntry {
    pub name: RefName,
    pub oid: ObjectId,
    pub peel: Option<ObjectId>,
    pub flags: EntryFlags,
}

impl PackedEntry {
    /// A fresh, unpeeled entry.
    pub fn new(name: RefName, oid: ObjectId) -> Self {
        Self {
            name,
            oid,
            peel: None,
            flags: EntryFlags::empty(),
        }
    }

    /// Whether the peel question is settled either way.
    pub fn peel_settled(&self) -> bool {
        self.flags
            .intersects(EntryFlags::HAS_PEEL | EntryFlags::CANNOT_PEEL)
    }
}

/// How much peeling the file's writer declared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Peeling {
    /// No declaration; peel state is unknown for unannotated entries.
    #[default]
    None,
    /// `peeled`: tag-domain entries without a `^` line are unpeelable.
    Standard,
    /// `fully-peeled`: every entry without a `^` line is unpeelable.
    Fully,
}

fn corrupt(reason: &'static str) -> RefDbError {
    RefDbError::CorruptPacked { reason }
}

/// Take the next line from `data[pos..]`.
///
/// Returns the line without its terminator (tolerating `\r\n`), the position
/// just past it, and whether a `\n` was present. The final line may end at
/// the end of the buffer.
fn take_line(data: &[u8], pos: usize) -> (&[u8], usize, bool) {
    match data[pos..].find_byte(b'\n') {
        Some(nl) => {
            let mut line = &data[pos..pos + nl];
            if line.last() == Some(&b'\r') {
                line = &line[..line.len() - 1];
            }
            (line, pos + nl + 1, true)
        }
        None => (&data[pos..], data.len(), false),
    }
}

fn parse_oid(field: &[u8], reason: &'static str) -> Result<ObjectId, RefDbError> {
    if field.len() != HEX_LEN {
        return Err(corrupt(reason));
    }
    ObjectId::from_hex_strict(field).map_err(|_| corrupt(reason))
}

/// Parse a packed-refs buffer into its entries and declared peeling mode.
///
/// Strict about shape: a malformed OID, a separator that is not a single
/// space, a `^` line with no entry before it, or an unterminated header all
/// surface as corruption. The final entry may omit its trailing newline.
pub fn parse(data: &[u8]) -> Result<(Vec<PackedEntry>, Peeling), RefDbError> {
    let mut entries: Vec<PackedEntry> = Vec::new();
    let mut peeling = Peeling::None;
    let mut pos = 0;

    // Header block: '#' lines before the first entry. Only the first line of
    // the file may carry the traits declaration.
    let mut first_line = true;
    while pos < data.len() && data[pos] == b'#' {
        let (line, next, terminated) = take_line(data, pos);
        if !terminated {
            return Err(corrupt("unterminated header line"));
        }
        if first_line {
            if let Some(traits) = line.strip_prefix(TRAITS_PREFIX) {
                for word in traits.split(|&b| b == b' ') {
                    match word {
                        b"fully-peeled" => peeling = Peeling::Fully,
                        b"peeled" if peeling == Peeling::None => peeling = Peeling::Standard,
                        _ => {}
                    }
                }
            }
        }
        first_line = false;
        pos = next;
    }

    while pos < data.len() {
        let (line, next, _) = take_line(data, pos);
        pos = next;

        if line.first() == Some(&b'^') {
            let Some(last) = entries.last_mut() else {
                return Err(corrupt("peel line without a preceding entry"));
            };
            if last.peel.is_some() {
                return Err(corrupt("peel line without a preceding entry"));
            }
            let oid = parse_oid(&line[1..], "invalid object id in peel line")?;
            last.peel = Some(oid);
            last.flags |= EntryFlags::HAS_PEEL;
            continue;
        }

        if line.len() < HEX_LEN + 2 {
            return Err(corrupt("truncated entry line"));
        }
        let oid = parse_oid(&line[..HEX_LEN], "invalid object id in entry line")?;
        if line[HEX_LEN] != b' ' {
            return Err(corrupt("malformed entry separator"));
        }
        let name = &line[HEX_LEN + 1..];
        entries.push(PackedEntry::new(RefName::new_unchecked(name), oid));
    }

    match peeling {
        Peeling::Fully => {
            for entry in &mut entries {
                if !entry.flags.contains(EntryFlags::HAS_PEEL) {
                    entry.flags |= EntryFlags::CANNOT_PEEL;
                }
            }
        }
        Peeling::Standard => {
            for entry in &mut entries {
                if !entry.flags.contains(EntryFlags::HAS_PEEL) && entry.name.is_tag() {
                    entry.flags |= EntryFlags::CANNOT_PEEL;
                }
            }
        }
        Peeling::None => {}
    }

    Ok((entries, peeling))
}

/// Write a packed-refs file: the fixed fully-peeled header, then the entries
/// sorted ascending by name, each peeled entry followed by its `^` line.
pub fn emit<W: Write>(out: &mut W, entries: &[PackedEntry]) -> std::io::Result<()> {
    let mut sorted: Vec<&PackedEntry> = entries.iter().collect();
    sorted.sort_by(|a, b| a.name.cmp(&b.name));

    out.write_all(HEADER)?;
    for entry in sorted {
        out.write_all(entry.oid.to_hex().as_bytes())?;
        out.write_all(b" ")?;
        out.write_all(entry.name.as_bytes())?;
        out.write_all(b"\n")?;
        if entry.flags.contains(EntryFlags::HAS_PEEL) {
            if let Some(peel) = entry.peel {
                out.write_all(b"^")?;
                out.write_all(peel.to_hex().as_bytes())?;
                out.write_all(b"\n")?;
            }
        }
    }
    Ok(())
}
