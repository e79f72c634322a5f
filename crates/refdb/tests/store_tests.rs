//! Integration tests for the backend operations: write, lookup, exists,
//! delete, rename, and the shadowing/collision rules between the stores.

use std::fs;
use std::path::Path;
use std::time::{Duration, SystemTime};

use refdb::{RefDb, RefDbError, RefName, Reference};
use refdb_hash::ObjectId;

const A: &str = "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";
const B: &str = "bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb";
const C: &str = "cccccccccccccccccccccccccccccccccccccccc";

fn oid(hex: &str) -> ObjectId {
    ObjectId::from_hex(hex).unwrap()
}

fn name(s: &str) -> RefName {
    RefName::new(s).unwrap()
}

/// Write a packed-refs file directly, bumping its mtime past whatever the
/// backend may have recorded.
fn plant_packed(repo: &Path, body: &str) {
    let path = repo.join("packed-refs");
    fs::write(&path, body).unwrap();
    let file = fs::OpenOptions::new().write(true).open(&path).unwrap();
    file.set_modified(SystemTime::now() + Duration::from_secs(5))
        .unwrap();
}

#[test]
fn write_then_lookup_and_exists() {
    let dir = tempfile::tempdir().unwrap();
    let mut db = RefDb::open(dir.path()).unwrap();

    let main = name("refs/heads/main");
    db.write(&Reference::direct(main.clone(), oid(A)), false)
        .unwrap();

    assert!(db.exists(&main).unwrap());
    let found = db.lookup(&main).unwrap();
    assert_eq!(found.target_oid(), Some(oid(A)));
    assert_eq!(found.peel_target(), None);

    assert!(!db.exists(&name("refs/heads/other")).unwrap());
    assert!(matches!(
        db.lookup(&name("refs/heads/other")),
        Err(RefDbError::NotFound(_))
    ));
}

#[test]
fn write_without_force_rejects_existing() {
    let dir = tempfile::tempdir().unwrap();
    let mut db = RefDb::open(dir.path()).unwrap();

    let main = name("refs/heads/main");
    db.write(&Reference::direct(main.clone(), oid(A)), false)
        .unwrap();

    let err = db
        .write(&Reference::direct(main.clone(), oid(B)), false)
        .unwrap_err();
    assert!(matches!(err, RefDbError::AlreadyExists(_)));

    // Forcing replaces the value.
    db.write(&Reference::direct(main.clone(), oid(B)), true)
        .unwrap();
    assert_eq!(db.lookup(&main).unwrap().target_oid(), Some(oid(B)));
}

#[test]
fn write_without_force_rejects_packed_entry() {
    let dir = tempfile::tempdir().unwrap();
    let mut db = RefDb::open(dir.path()).unwrap();
    plant_packed(dir.path(), &format!("{A} refs/heads/main\n"));

    let err = db
        .write(&Reference::direct(name("refs/heads/main"), oid(B)), false)
        .unwrap_err();
    assert!(matches!(err, RefDbError::AlreadyExists(_)));
}

#[test]
fn loose_shadows_packed() {
    let dir = tempfile::tempdir().unwrap();
    let mut db = RefDb::open(dir.path()).unwrap();
    plant_packed(dir.path(), &format!("{C} refs/heads/main\n"));

    let main = name("refs/heads/main");
    assert_eq!(db.lookup(&main).unwrap().target_oid(), Some(oid(C)));

    db.write(&Reference::direct(main.clone(), oid(B)), true)
        .unwrap();
    assert_eq!(db.lookup(&main).unwrap().target_oid(), Some(oid(B)));
}

#[test]
fn lookup_from_packed_carries_peel() {
    let dir = tempfile::tempdir().unwrap();
    let mut db = RefDb::open(dir.path()).unwrap();
    plant_packed(
        dir.path(),
        &format!("# pack-refs with: peeled fully-peeled \n{A} refs/tags/v1\n^{B}\n"),
    );

    let found = db.lookup(&name("refs/tags/v1")).unwrap();
    assert_eq!(found.target_oid(), Some(oid(A)));
    assert_eq!(found.peel_target(), Some(oid(B)));
}

#[test]
fn lookup_surfaces_loose_corruption() {
    let dir = tempfile::tempdir().unwrap();
    let mut db = RefDb::open(dir.path()).unwrap();
    fs::create_dir_all(dir.path().join("refs/heads")).unwrap();
    fs::write(dir.path().join("refs/heads/main"), "not a ref\n").unwrap();

    let err = db.lookup(&name("refs/heads/main")).unwrap_err();
    assert!(matches!(err, RefDbError::CorruptLoose { .. }));
}

#[test]
fn operations_surface_packed_corruption() {
    let dir = tempfile::tempdir().unwrap();
    let mut db = RefDb::open(dir.path()).unwrap();
    plant_packed(dir.path(), "^deadbeef orphan\n");

    let err = db.lookup(&name("refs/heads/main")).unwrap_err();
    assert!(matches!(err, RefDbError::CorruptPacked { .. }));
}

#[test]
fn external_packed_update_is_picked_up() {
    let dir = tempfile::tempdir().unwrap();
    let mut db = RefDb::open(dir.path()).unwrap();

    plant_packed(dir.path(), &format!("{A} refs/heads/main\n"));
    assert_eq!(
        db.lookup(&name("refs/heads/main")).unwrap().target_oid(),
        Some(oid(A))
    );

    // Another process rewrites the packed file.
    let path = dir.path().join("packed-refs");
    fs::write(&path, format!("{B} refs/heads/main\n")).unwrap();
    let file = fs::OpenOptions::new().write(true).open(&path).unwrap();
    file.set_modified(SystemTime::now() + Duration::from_secs(10))
        .unwrap();

    assert_eq!(
        db.lookup(&name("refs/heads/main")).unwrap().target_oid(),
        Some(oid(B))
    );
}

#[test]
fn delete_loose_only() {
    let dir = tempfile::tempdir().unwrap();
    let mut db = RefDb::open(dir.path()).unwrap();

    let main = name("refs/heads/main");
    db.write(&Reference::direct(main.clone(), oid(A)), false)
        .unwrap();
    db.delete(&main).unwrap();

    assert!(!db.exists(&main).unwrap());
    assert!(!dir.path().join("refs/heads/main").exists());
}

#[test]
fn delete_packed_only_rewrites_packed_file() {
    let dir = tempfile::tempdir().unwrap();
    let mut db = RefDb::open(dir.path()).unwrap();
    plant_packed(
        dir.path(),
        &format!("{A} refs/heads/keep\n{B} refs/heads/main\n"),
    );

    db.delete(&name("refs/heads/main")).unwrap();

    assert!(!db.exists(&name("refs/heads/main")).unwrap());
    assert!(db.exists(&name("refs/heads/keep")).unwrap());
    let body = fs::read_to_string(dir.path().join("packed-refs")).unwrap();
    assert!(!body.contains("refs/heads/main"));
    assert!(body.contains("refs/heads/keep"));
}

#[test]
fn delete_present_in_both_stores() {
    let dir = tempfile::tempdir().unwrap();
    let mut db = RefDb::open(dir.path()).unwrap();
    plant_packed(dir.path(), &format!("{A} refs/heads/main\n"));
    db.write(&Reference::direct(name("refs/heads/main"), oid(B)), true)
        .unwrap();

    db.delete(&name("refs/heads/main")).unwrap();
    assert!(matches!(
        db.lookup(&name("refs/heads/main")),
        Err(RefDbError::NotFound(_))
    ));
}

#[test]
fn delete_absent_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let mut db = RefDb::open(dir.path()).unwrap();
    assert!(matches!(
        db.delete(&name("refs/heads/ghost")),
        Err(RefDbError::NotFound(_))
    ));
}

#[test]
fn rename_moves_the_value() {
    let dir = tempfile::tempdir().unwrap();
    let mut db = RefDb::open(dir.path()).unwrap();

    let a = name("refs/heads/a");
    let b = name("refs/heads/b");
    db.write(&Reference::direct(a.clone(), oid(A)), false)
        .unwrap();

    db.rename(&a, &b, false).unwrap();

    assert!(!db.exists(&a).unwrap());
    assert_eq!(db.lookup(&b).unwrap().target_oid(), Some(oid(A)));
}

#[test]
fn rename_preserves_symbolic_value() {
    let dir = tempfile::tempdir().unwrap();
    let mut db = RefDb::open(dir.path()).unwrap();

    db.write(
        &Reference::symbolic(name("refs/heads/link"), name("refs/heads/main")),
        false,
    )
    .unwrap();
    db.rename(&name("refs/heads/link"), &name("refs/heads/alias"), false)
        .unwrap();

    let moved = db.lookup(&name("refs/heads/alias")).unwrap();
    assert_eq!(moved.symbolic_target(), Some(&name("refs/heads/main")));
}

#[test]
fn rename_onto_existing_requires_force() {
    let dir = tempfile::tempdir().unwrap();
    let mut db = RefDb::open(dir.path()).unwrap();

    db.write(&Reference::direct(name("refs/heads/a"), oid(A)), false)
        .unwrap();
    db.write(&Reference::direct(name("refs/heads/b"), oid(B)), false)
        .unwrap();

    let err = db
        .rename(&name("refs/heads/a"), &name("refs/heads/b"), false)
        .unwrap_err();
    assert!(matches!(err, RefDbError::AlreadyExists(_)));

    db.rename(&name("refs/heads/a"), &name("refs/heads/b"), true)
        .unwrap();
    assert_eq!(
        db.lookup(&name("refs/heads/b")).unwrap().target_oid(),
        Some(oid(A))
    );
}

#[test]
fn rename_into_occupied_hierarchy_is_collision_even_forced() {
    let dir = tempfile::tempdir().unwrap();
    let mut db = RefDb::open(dir.path()).unwrap();
    plant_packed(dir.path(), &format!("{C} refs/heads/b/x\n"));
    db.write(&Reference::direct(name("refs/heads/a"), oid(A)), false)
        .unwrap();

    let err = db
        .rename(&name("refs/heads/a"), &name("refs/heads/b"), true)
        .unwrap_err();
    assert!(matches!(err, RefDbError::Collision { .. }));
    // The collision was detected up front; the source is untouched.
    assert_eq!(
        db.lookup(&name("refs/heads/a")).unwrap().target_oid(),
        Some(oid(A))
    );
}

#[test]
fn rename_missing_source_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let mut db = RefDb::open(dir.path()).unwrap();
    assert!(matches!(
        db.rename(&name("refs/heads/ghost"), &name("refs/heads/b"), false),
        Err(RefDbError::NotFound(_))
    ));
}

#[test]
fn collision_against_packed_parent() {
    let dir = tempfile::tempdir().unwrap();
    let mut db = RefDb::open(dir.path()).unwrap();
    plant_packed(dir.path(), &format!("{A} refs/heads/x\n"));

    let err = db
        .write(&Reference::direct(name("refs/heads/x/y"), oid(B)), false)
        .unwrap_err();
    assert!(matches!(err, RefDbError::Collision { .. }));
}

#[test]
fn collision_against_packed_child() {
    let dir = tempfile::tempdir().unwrap();
    let mut db = RefDb::open(dir.path()).unwrap();
    plant_packed(dir.path(), &format!("{A} refs/heads/x/y\n"));

    let err = db
        .write(&Reference::direct(name("refs/heads/x"), oid(B)), false)
        .unwrap_err();
    assert!(matches!(err, RefDbError::Collision { .. }));
}

#[test]
fn collision_against_loose_hierarchy() {
    let dir = tempfile::tempdir().unwrap();
    let mut db = RefDb::open(dir.path()).unwrap();

    db.write(&Reference::direct(name("refs/heads/x"), oid(A)), false)
        .unwrap();
    let err = db
        .write(&Reference::direct(name("refs/heads/x/y"), oid(B)), false)
        .unwrap_err();
    assert!(matches!(err, RefDbError::Collision { .. }));

    let dir2 = tempfile::tempdir().unwrap();
    let mut db2 = RefDb::open(dir2.path()).unwrap();
    db2.write(&Reference::direct(name("refs/heads/x/y"), oid(A)), false)
        .unwrap();
    let err = db2
        .write(&Reference::direct(name("refs/heads/x"), oid(B)), false)
        .unwrap_err();
    assert!(matches!(err, RefDbError::Collision { .. }));
}

#[test]
fn sibling_prefix_without_boundary_coexists() {
    let dir = tempfile::tempdir().unwrap();
    let mut db = RefDb::open(dir.path()).unwrap();

    db.write(&Reference::direct(name("refs/heads/x"), oid(A)), false)
        .unwrap();
    db.write(&Reference::direct(name("refs/heads/xy"), oid(B)), false)
        .unwrap();

    assert_eq!(
        db.lookup(&name("refs/heads/x")).unwrap().target_oid(),
        Some(oid(A))
    );
    assert_eq!(
        db.lookup(&name("refs/heads/xy")).unwrap().target_oid(),
        Some(oid(B))
    );
}

#[test]
fn symbolic_write_and_lookup() {
    let dir = tempfile::tempdir().unwrap();
    let mut db = RefDb::open(dir.path()).unwrap();

    db.write(
        &Reference::symbolic(name("HEAD"), name("refs/heads/main")),
        false,
    )
    .unwrap();

    let head = db.lookup(&name("HEAD")).unwrap();
    assert!(head.is_symbolic());
    assert_eq!(head.symbolic_target(), Some(&name("refs/heads/main")));
}
