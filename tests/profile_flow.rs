// tests/profile_flow.rs

//! Profile assembly, activation, supersession, and crash recovery of
//! the live pointer.

mod common;

use common::{build_pkg, setup_root, tmp_debris};
use pandora::profile::{self, ProfileEntry};
use pandora::store;
use pandora::{Error, PackageId};
use std::fs;
use std::os::unix::fs::symlink;

fn entry_for(root: &pandora::PandoraRoot, id: &PackageId) -> ProfileEntry {
    let files = store::entry_files(&root.store_dir(), id).unwrap();
    ProfileEntry {
        relpath: id.name.clone(),
        target_path: files,
        pkg_name: id.name.clone(),
        pkg_version: id.version.clone(),
    }
}

#[test]
fn assemble_activate_and_read_back() {
    let (tmp, root) = setup_root();
    let (pkg, digest) = build_pkg(tmp.path(), "snake", "1.0");
    let id = PackageId::parse("snake@1.0").unwrap();
    store::import(&root.store_dir(), &pkg, &id, &digest).unwrap();

    let staged = profile::assemble(&root.profiles_dir(), &[entry_for(&root, &id)]).unwrap();
    let live = profile::activate(root.path(), &staged, "default").unwrap();

    // vir resolves to an existing directory and through it to the store
    let via_vir = root.vir().join("snake/bin/snake");
    assert!(fs::metadata(&via_vir).unwrap().is_file());
    assert_eq!(profile::current(root.path()).unwrap(), live);
}

#[test]
fn conflicting_entries_leave_no_debris() {
    let (tmp, root) = setup_root();
    let (pkg, digest) = build_pkg(tmp.path(), "snake", "1.0");
    let a = PackageId::parse("snake@1.0").unwrap();
    store::import(&root.store_dir(), &pkg, &a, &digest).unwrap();
    let files = store::entry_files(&root.store_dir(), &a).unwrap();

    let mk = |owner: &str| {
        let (name, version) = owner.split_once('@').unwrap();
        ProfileEntry {
            relpath: "bin/x".to_string(),
            target_path: files.clone(),
            pkg_name: name.to_string(),
            pkg_version: version.to_string(),
        }
    };

    let err = profile::assemble(&root.profiles_dir(), &[mk("a@1"), mk("b@1")]).unwrap_err();
    match err {
        Error::ProfileConflict { path, first, second } => {
            assert_eq!(path, "bin/x");
            assert_eq!(first, "a@1");
            assert_eq!(second, "b@1");
        }
        other => panic!("expected conflict, got {other:?}"),
    }
    assert!(tmp_debris(&root.profiles_dir(), ".tmp-profile-").is_empty());
}

#[test]
fn superseded_profiles_survive_until_reaped() {
    let (tmp, root) = setup_root();
    let (pkg, digest) = build_pkg(tmp.path(), "snake", "1.0");
    let id = PackageId::parse("snake@1.0").unwrap();
    store::import(&root.store_dir(), &pkg, &id, &digest).unwrap();

    let s1 = profile::assemble(&root.profiles_dir(), &[entry_for(&root, &id)]).unwrap();
    let live1 = profile::activate(root.path(), &s1, "default").unwrap();
    let s2 = profile::assemble(&root.profiles_dir(), &[entry_for(&root, &id)]).unwrap();
    let live2 = profile::activate(root.path(), &s2, "default").unwrap();

    assert_ne!(live1, live2);
    assert!(live1.is_dir(), "prior activation must still exist");
    assert_eq!(profile::current(root.path()).unwrap(), live2);
}

/// An activation interrupted after staging but before the vir swap
/// leaves a vir-new symlink; recovery must clear it only when its
/// target is gone, and must never damage vir itself.
#[test]
fn interrupted_activation_recovers_cleanly() {
    let (tmp, root) = setup_root();
    let (pkg, digest) = build_pkg(tmp.path(), "snake", "1.0");
    let id = PackageId::parse("snake@1.0").unwrap();
    store::import(&root.store_dir(), &pkg, &id, &digest).unwrap();

    // a completed activation first
    let staged = profile::assemble(&root.profiles_dir(), &[entry_for(&root, &id)]).unwrap();
    let live = profile::activate(root.path(), &staged, "default").unwrap();

    // crash artifact: vir-new pointing at a profile that never landed
    symlink(root.profiles_dir().join("ghost-1-1"), root.vir_new()).unwrap();
    // crash artifact: a half-assembled profile
    fs::create_dir_all(root.profiles_dir().join(".tmp-profile-crashed")).unwrap();

    let summary = root.recover().unwrap();
    assert!(summary.cleared_vir_new);
    assert_eq!(summary.removed_profiles, 1);

    // vir still points at the valid live profile
    assert_eq!(profile::current(root.path()).unwrap(), live);
}

#[test]
fn activation_writes_txn_log() {
    let (tmp, root) = setup_root();
    let (pkg, digest) = build_pkg(tmp.path(), "snake", "1.0");
    let id = PackageId::parse("snake@1.0").unwrap();
    store::import(&root.store_dir(), &pkg, &id, &digest).unwrap();

    let staged = profile::assemble(&root.profiles_dir(), &[entry_for(&root, &id)]).unwrap();
    let live = profile::activate(root.path(), &staged, "default").unwrap();

    let log = fs::read_dir(root.tmp_dir())
        .unwrap()
        .filter_map(|e| e.ok())
        .find(|e| e.file_name().to_string_lossy().starts_with("txn-"))
        .expect("transaction log written");
    let text = fs::read_to_string(log.path()).unwrap();
    assert_eq!(text, format!("activated={}\n", live.display()));
}
