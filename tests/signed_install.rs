// tests/signed_install.rs

//! Detached manifest signatures over the local-path registry: a signed
//! manifest verifies against the trust store, a tampered one does not.

mod common;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use common::{build_pkg, setup_root, write_index, write_manifest};
use ed25519_dalek::{Signer, SigningKey};
use pandora::fetch::Fetcher;
use pandora::registry::RegistryClient;
use pandora::{PackageId, SignatureVerifier};
use std::fs;

fn signing_key() -> SigningKey {
    SigningKey::from_bytes(&[42u8; 32])
}

#[test]
fn signed_manifest_verifies_end_to_end() {
    let (tmp, root) = setup_root();
    let work = tmp.path();

    let (pkg, digest) = build_pkg(work, "snake", "1.0");
    let manifest_path = work.join("snake-manifest.acl");
    write_manifest(&manifest_path, "snake", "1.0", &digest.to_hex(), pkg.to_str().unwrap(), &[]);
    let index_path = work.join("index.acl");
    write_index(&index_path, &[("snake", "1.0", &manifest_path, &pkg)]);

    // publisher signs the manifest document; the detached signature
    // sits beside it at <manifest_url>.sig
    let key = signing_key();
    let body = fs::read(&manifest_path).unwrap();
    let sig = BASE64.encode(key.sign(&body).to_bytes());
    let sig_path = work.join("snake-manifest.acl.sig");
    fs::write(&sig_path, &sig).unwrap();

    // the user trusts the publisher's key
    let verifier = SignatureVerifier::new(root.keys_dir()).unwrap();
    let pub_b64 = BASE64.encode(key.verifying_key().to_bytes());
    verifier.import_key(pub_b64.as_bytes(), "atlas-release").unwrap();

    // install-side: fetch the manifest, fetch the signature, verify
    let fetcher = Fetcher::new(root.tmp_dir()).unwrap();
    let mut client = RegistryClient::new(fetcher, root.manifests_dir());
    client.set_index(index_path.to_string_lossy().into_owned());

    let id = PackageId::parse("snake@1.0").unwrap();
    client.manifest_for(&id).unwrap();
    let cached = fs::read(client.manifest_cache_path(&id)).unwrap();

    let sig_url = format!("{}.sig", client.manifest_url_for(&id).unwrap());
    let dl = client.fetcher().fetch(&sig_url).unwrap();
    let sig_bytes = fs::read(&dl.path).unwrap();
    fs::remove_file(&dl.path).unwrap();

    assert!(verifier.verify(&cached, &sig_bytes).is_ok());
}

#[test]
fn tampered_manifest_fails_verification() {
    let (tmp, root) = setup_root();
    let work = tmp.path();

    let (pkg, digest) = build_pkg(work, "snake", "1.0");
    let manifest_path = work.join("snake-manifest.acl");
    write_manifest(&manifest_path, "snake", "1.0", &digest.to_hex(), pkg.to_str().unwrap(), &[]);

    let key = signing_key();
    let body = fs::read(&manifest_path).unwrap();
    let sig = BASE64.encode(key.sign(&body).to_bytes());

    let verifier = SignatureVerifier::new(root.keys_dir()).unwrap();
    let pub_b64 = BASE64.encode(key.verifying_key().to_bytes());
    verifier.import_key(pub_b64.as_bytes(), "atlas-release").unwrap();

    // attacker swaps the digest after signing
    let tampered = String::from_utf8(body).unwrap().replace(
        &digest.to_hex(),
        "0000000000000000000000000000000000000000000000000000000000000000",
    );

    assert!(verifier
        .verify(tampered.as_bytes(), sig.as_bytes())
        .is_err());
}
