//! Property-based test: emitting any well-formed entry list and parsing it
//! back reproduces the records.

use proptest::prelude::*;

use refdb::packed::{self, EntryFlags, PackedEntry};
use refdb::RefName;
use refdb_hash::ObjectId;

fn arb_oid() -> impl Strategy<Value = ObjectId> {
    proptest::array::uniform20(any::<u8>()).prop_map(ObjectId::from_bytes)
}

fn arb_name() -> impl Strategy<Value = RefName> {
    "refs/[a-z]{1,8}(/[a-z0-9]{1,8}){0,2}"
        .prop_map(|s| RefName::new(s).expect("generated name is valid"))
}

fn arb_entry() -> impl Strategy<Value = PackedEntry> {
    (arb_name(), arb_oid(), proptest::option::of(arb_oid())).prop_map(|(name, oid, peel)| {
        let mut entry = PackedEntry::new(name, oid);
        if let Some(peel) = peel {
            entry.peel = Some(peel);
            entry.flags |= EntryFlags::HAS_PEEL;
        }
        entry
    })
}

proptest! {
    /// parse(emit(sort(E))) reproduces sort(E), record for record.
    #[test]
    fn emit_parse_roundtrip(mut entries in proptest::collection::vec(arb_entry(), 0..32)) {
        let mut out = Vec::new();
        packed::emit(&mut out, &entries).unwrap();

        let (parsed, _) = packed::parse(&out).unwrap();

        entries.sort_by(|a, b| a.name.cmp(&b.name));
        prop_assert_eq!(parsed.len(), entries.len());
        for (got, want) in parsed.iter().zip(entries.iter()) {
            prop_assert_eq!(&got.name, &want.name);
            prop_assert_eq!(got.oid, want.oid);
            prop_assert_eq!(got.peel, want.peel);
            // The emitter claims fully-peeled output, so unpeeled records
            // come back marked unpeelable.
            if want.peel.is_some() {
                prop_assert!(got.flags.contains(EntryFlags::HAS_PEEL));
            } else {
                prop_assert!(got.flags.contains(EntryFlags::CANNOT_PEEL));
            }
        }
    }

    /// The emitter's output always begins with the fully-peeled header and
    /// contains one entry line per record.
    #[test]
    fn emit_shape(entries in proptest::collection::vec(arb_entry(), 0..16)) {
        let mut out = Vec::new();
        packed::emit(&mut out, &entries).unwrap();

        prop_assert!(out.starts_with(packed::HEADER));
        let body = &out[packed::HEADER.len()..];
        let entry_lines = body
            .split(|&b| b == b'\n')
            .filter(|l| !l.is_empty() && l[0] != b'^')
            .count();
        prop_assert_eq!(entry_lines, entries.len());
    }
}
