// tests/install_flow.rs

//! End-to-end install pipeline against a local-path registry: index to
//! manifest closure to download, verification, import, and activation.
//! No network involved; the fetcher treats non-http URLs as files.

mod common;

use common::{build_pkg, setup_root, write_index, write_manifest};
use pandora::fetch::Fetcher;
use pandora::profile::{self, ProfileEntry};
use pandora::registry::RegistryClient;
use pandora::{store, Error, MutationLock, PackageId};
use std::fs;

fn client_for(root: &pandora::PandoraRoot, index_path: &std::path::Path) -> RegistryClient {
    let fetcher = Fetcher::new(root.tmp_dir()).unwrap();
    let mut client = RegistryClient::new(fetcher, root.manifests_dir());
    client.set_index(index_path.to_string_lossy().into_owned());
    client
}

#[test]
fn install_single_package_end_to_end() {
    let (tmp, root) = setup_root();
    let work = tmp.path();

    let (pkg, digest) = build_pkg(work, "snake", "1.0");
    let manifest_path = work.join("snake-manifest.acl");
    write_manifest(&manifest_path, "snake", "1.0", &digest.to_hex(), pkg.to_str().unwrap(), &[]);
    let index_path = work.join("index.acl");
    write_index(&index_path, &[("snake", "1.0", &manifest_path, &pkg)]);

    let mut client = client_for(&root, &index_path);
    let id = PackageId::parse("snake@1.0").unwrap();
    let manifests = client.resolve_closure(&id).unwrap();
    assert_eq!(manifests.len(), 1);

    // the manifest is now cached under manifests/
    assert!(root.manifests_dir().join("snake-1.0-manifest.acl").is_file());

    let _lock = MutationLock::acquire(root.lock_file()).unwrap();
    let manifest = &manifests[0];
    let dl = client.fetcher().fetch(&manifest.pkg_url).unwrap();
    assert!(dl.digest.ct_eq(&manifest.sha256));

    let entry = store::import(&root.store_dir(), &dl.path, &manifest.id, &manifest.sha256).unwrap();
    fs::remove_file(&dl.path).unwrap();

    let staged = profile::assemble(
        &root.profiles_dir(),
        &[ProfileEntry {
            relpath: "snake".to_string(),
            target_path: entry.join("files"),
            pkg_name: "snake".to_string(),
            pkg_version: "1.0".to_string(),
        }],
    )
    .unwrap();
    profile::activate(root.path(), &staged, "default").unwrap();

    let installed = root.vir().join("snake/bin/snake");
    let body = fs::read_to_string(installed).unwrap();
    assert!(body.contains("snake 1.0"));
}

#[test]
fn install_resolves_exact_pair_closure() {
    let (tmp, root) = setup_root();
    let work = tmp.path();

    let (lib_pkg, lib_digest) = build_pkg(work, "libfb", "0.3");
    let lib_manifest = work.join("libfb-manifest.acl");
    write_manifest(&lib_manifest, "libfb", "0.3", &lib_digest.to_hex(), lib_pkg.to_str().unwrap(), &[]);

    let (app_pkg, app_digest) = build_pkg(work, "snake", "1.0");
    let app_manifest = work.join("snake-manifest.acl");
    write_manifest(
        &app_manifest,
        "snake",
        "1.0",
        &app_digest.to_hex(),
        app_pkg.to_str().unwrap(),
        &["libfb@0.3"],
    );

    let index_path = work.join("index.acl");
    write_index(
        &index_path,
        &[
            ("snake", "1.0", &app_manifest, &app_pkg),
            ("libfb", "0.3", &lib_manifest, &lib_pkg),
        ],
    );

    let mut client = client_for(&root, &index_path);
    let manifests = client
        .resolve_closure(&PackageId::parse("snake@1.0").unwrap())
        .unwrap();

    let ids: Vec<String> = manifests.iter().map(|m| m.id.to_string()).collect();
    assert_eq!(ids, ["snake@1.0", "libfb@0.3"]);

    // install the whole closure, then activate both
    let _lock = MutationLock::acquire(root.lock_file()).unwrap();
    let mut entries = Vec::new();
    for manifest in &manifests {
        let dl = client.fetcher().fetch(&manifest.pkg_url).unwrap();
        assert!(dl.digest.ct_eq(&manifest.sha256));
        let entry = store::import(&root.store_dir(), &dl.path, &manifest.id, &manifest.sha256).unwrap();
        fs::remove_file(&dl.path).unwrap();
        entries.push(ProfileEntry {
            relpath: manifest.id.name.clone(),
            target_path: entry.join("files"),
            pkg_name: manifest.id.name.clone(),
            pkg_version: manifest.id.version.clone(),
        });
    }

    let staged = profile::assemble(&root.profiles_dir(), &entries).unwrap();
    profile::activate(root.path(), &staged, "default").unwrap();

    assert!(root.vir().join("snake/bin/snake").exists());
    assert!(root.vir().join("libfb/bin/libfb").exists());
}

#[test]
fn hash_mismatch_aborts_before_store() {
    let (tmp, root) = setup_root();
    let work = tmp.path();

    let (pkg, _real_digest) = build_pkg(work, "snake", "1.0");
    // manifest lies about the digest
    let wrong = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";
    let manifest_path = work.join("snake-manifest.acl");
    write_manifest(&manifest_path, "snake", "1.0", wrong, pkg.to_str().unwrap(), &[]);
    let index_path = work.join("index.acl");
    write_index(&index_path, &[("snake", "1.0", &manifest_path, &pkg)]);

    let mut client = client_for(&root, &index_path);
    let manifests = client
        .resolve_closure(&PackageId::parse("snake@1.0").unwrap())
        .unwrap();
    let manifest = &manifests[0];

    let dl = client.fetcher().fetch(&manifest.pkg_url).unwrap();
    let verified = dl.digest.ct_eq(&manifest.sha256);
    assert!(!verified, "digest check must fail");
    // pipeline aborts here: nothing ever reaches the store
    fs::remove_file(&dl.path).unwrap();

    assert!(!root.store_dir().join("snake/1.0").exists());
}

#[test]
fn unknown_package_is_not_found() {
    let (tmp, root) = setup_root();
    let work = tmp.path();

    let (pkg, digest) = build_pkg(work, "snake", "1.0");
    let manifest_path = work.join("snake-manifest.acl");
    write_manifest(&manifest_path, "snake", "1.0", &digest.to_hex(), pkg.to_str().unwrap(), &[]);
    let index_path = work.join("index.acl");
    write_index(&index_path, &[("snake", "1.0", &manifest_path, &pkg)]);

    let mut client = client_for(&root, &index_path);
    let err = client
        .resolve_closure(&PackageId::parse("ladder@2.0").unwrap())
        .unwrap_err();
    assert!(matches!(err, Error::NotFound { .. }));
}

#[test]
fn manifest_pair_mismatch_is_rejected() {
    let (tmp, root) = setup_root();
    let work = tmp.path();

    let (pkg, digest) = build_pkg(work, "snake", "1.0");
    // manifest claims to be a different package than the index promised
    let manifest_path = work.join("imposter-manifest.acl");
    write_manifest(&manifest_path, "imposter", "9.9", &digest.to_hex(), pkg.to_str().unwrap(), &[]);
    let index_path = work.join("index.acl");
    write_index(&index_path, &[("snake", "1.0", &manifest_path, &pkg)]);

    let mut client = client_for(&root, &index_path);
    let err = client
        .resolve_closure(&PackageId::parse("snake@1.0").unwrap())
        .unwrap_err();
    assert!(matches!(err, Error::ParseFailed(_)));
}

#[test]
fn cached_manifest_is_reused_without_index() {
    let (tmp, root) = setup_root();
    let work = tmp.path();

    let (pkg, digest) = build_pkg(work, "snake", "1.0");
    let manifest_path = work.join("snake-manifest.acl");
    write_manifest(&manifest_path, "snake", "1.0", &digest.to_hex(), pkg.to_str().unwrap(), &[]);
    let index_path = work.join("index.acl");
    write_index(&index_path, &[("snake", "1.0", &manifest_path, &pkg)]);

    let id = PackageId::parse("snake@1.0").unwrap();
    let mut client = client_for(&root, &index_path);
    client.manifest_for(&id).unwrap();

    // delete the upstream manifest; the cached copy must carry a
    // fresh client through
    fs::remove_file(&manifest_path).unwrap();
    let mut fresh = client_for(&root, &index_path);
    let manifest = fresh.manifest_for(&id).unwrap();
    assert_eq!(manifest.id, id);
}
