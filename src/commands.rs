// src/commands.rs

//! Command implementations for the CLI.
//!
//! Each `cmd_*` function is a thin shell over the library: argument
//! massaging, the mutation lock where required, and terminal output.
//! This is the only layer that prints.

use anyhow::Result;
use pandora::fetch::Fetcher;
use pandora::ident::PackageId;
use pandora::layout::PandoraRoot;
use pandora::lock::MutationLock;
use pandora::profile::{self, ProfileEntry};
use pandora::registry::RegistryClient;
use pandora::signature::SignatureVerifier;
use pandora::{archive, store, Error};
use std::fs;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Initialize the pandora root: directory skeleton, a seeded default
/// profile, and a recovery sweep.
pub fn cmd_init() -> Result<()> {
    let root = PandoraRoot::discover()?;
    let _lock = MutationLock::acquire(root.lock_file())?;
    root.fs_init(true)?;
    let summary = root.recover()?;
    if !summary.is_empty() {
        println!(
            "recovered: {} import(s), {} profile(s), {} download(s)",
            summary.removed_imports, summary.removed_profiles, summary.removed_downloads
        );
    }
    println!("initialized {}", root.path().display());
    Ok(())
}

/// Download and cache a package's manifest, printing what an install
/// would use.
pub fn cmd_fetch(name: &str, version: &str, index_url: &str) -> Result<()> {
    let root = PandoraRoot::discover()?;
    root.fs_init(false)?;
    {
        // the sweep deletes under store/ and profiles/, so it runs locked
        let _lock = MutationLock::acquire(root.lock_file())?;
        root.recover()?;
    }

    let id = PackageId::new(name, version)?;
    let mut client = new_client(&root, index_url)?;

    let manifest = client.manifest_for(&id)?;
    let pkg_url = if manifest.pkg_url.is_empty() {
        client.pkg_url_for(&id)?
    } else {
        manifest.pkg_url.clone()
    };

    println!("manifest: {}", client.manifest_cache_path(&id).display());
    println!("package:  {pkg_url}");
    println!("sha256:   {}", manifest.sha256);
    if !manifest.deps.is_empty() {
        let deps: Vec<String> = manifest.deps.iter().map(|d| d.to_string()).collect();
        println!("deps:     {}", deps.join(", "));
    }
    Ok(())
}

/// The full install pipeline: index, manifest closure, download,
/// verify, import, and (unless declined) profile activation.
pub fn cmd_install(
    spec: &str,
    index_url: &str,
    no_activate: bool,
    profile_label: &str,
    assume_yes: bool,
) -> Result<()> {
    let root = PandoraRoot::discover()?;
    root.fs_init(false)?;
    {
        let _lock = MutationLock::acquire(root.lock_file())?;
        root.recover()?;
    }

    let id = PackageId::parse(spec)?;
    let mut client = new_client(&root, index_url)?;

    let require_signatures = client
        .fetch_index()?
        .get_bool("Registry.require_signatures")
        .unwrap_or(false);

    let manifests = client.resolve_closure(&id)?;
    if manifests.len() > 1 {
        println!("resolved {} packages (closure of {id})", manifests.len());
    }

    if require_signatures {
        verify_manifest_signatures(&root, &mut client, &manifests)?;
    }

    let _lock = MutationLock::acquire(root.lock_file())?;

    let mut installed: Vec<(PackageId, PathBuf)> = Vec::new();
    for manifest in &manifests {
        let pkg_url = if manifest.pkg_url.is_empty() {
            client.pkg_url_for(&manifest.id)?
        } else {
            manifest.pkg_url.clone()
        };

        eprintln!("downloading {pkg_url} ...");
        let dl = client.fetcher().fetch(&pkg_url)?;
        if !dl.digest.ct_eq(&manifest.sha256) {
            let _ = fs::remove_file(&dl.path);
            return Err(Error::HashMismatch {
                expected: manifest.sha256.to_hex(),
                actual: dl.digest.to_hex(),
            }
            .into());
        }
        println!("sha256 verified: {}", dl.digest);

        let entry = store::import(&root.store_dir(), &dl.path, &manifest.id, &manifest.sha256);
        let _ = fs::remove_file(&dl.path);
        let entry = entry?;
        println!("imported {} -> {}", manifest.id, entry.display());
        installed.push((manifest.id.clone(), entry));
    }

    if no_activate {
        println!("installed {id} but did not activate (--no-activate)");
        return Ok(());
    }

    let question = format!("Activate {id} into profile '{profile_label}' now?");
    if !assume_yes && !prompt_yes(&question)? {
        println!("skipping activation; run install again with -y to activate");
        return Ok(());
    }

    let entries: Vec<ProfileEntry> = installed
        .iter()
        .map(|(pkg, entry)| ProfileEntry {
            relpath: pkg.name.clone(),
            target_path: entry.join("files"),
            pkg_name: pkg.name.clone(),
            pkg_version: pkg.version.clone(),
        })
        .collect();

    let staged = profile::assemble(&root.profiles_dir(), &entries)?;
    let live = profile::activate(root.path(), &staged, profile_label)?;
    println!("activated {id} -> {}", live.display());
    Ok(())
}

/// Pack files or directories into a `.pnd` archive.
pub fn cmd_pack(archive_path: &Path, inputs: &[PathBuf]) -> Result<()> {
    let count = archive::pack(archive_path, inputs)?;
    println!("packed {count} entries into {}", archive_path.display());
    Ok(())
}

/// Unpack a `.pnd` archive.
pub fn cmd_unpack(archive_path: &Path, dest: Option<&Path>) -> Result<()> {
    let dest = dest.unwrap_or_else(|| Path::new("."));
    let accepted = archive::unpack(archive_path, dest)?;
    for path in &accepted {
        println!("extracted: {}", dest.join(path).display());
    }
    Ok(())
}

/// Show the live profile and everything in the store.
pub fn cmd_show() -> Result<()> {
    let root = PandoraRoot::discover()?;

    match profile::current(root.path()) {
        Some(live) => println!("active profile: {}", live.display()),
        None => println!("active profile: (none)"),
    }

    let entries = store::list_entries(&root.store_dir())?;
    if entries.is_empty() {
        println!("store: empty");
    } else {
        println!("store:");
        for id in entries {
            println!("  {id}");
        }
    }
    Ok(())
}

/// Import a trusted manifest-signing key.
pub fn cmd_key_add(file: &Path, key_id: Option<&str>) -> Result<()> {
    let root = PandoraRoot::discover()?;
    root.fs_init(false)?;

    let derived;
    let key_id = match key_id {
        Some(id) => id,
        None => {
            derived = file
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .ok_or_else(|| Error::InvalidInput(format!("bad key path {}", file.display())))?;
            &derived
        }
    };

    let data = fs::read(file)?;
    let verifier = SignatureVerifier::new(root.keys_dir())?;
    let stored = verifier.import_key(&data, key_id)?;
    println!("imported key '{key_id}' -> {}", stored.display());
    Ok(())
}

fn new_client(root: &PandoraRoot, index_url: &str) -> Result<RegistryClient> {
    let fetcher = Fetcher::new(root.tmp_dir())?;
    let mut client = RegistryClient::new(fetcher, root.manifests_dir());
    client.set_index(index_url);
    Ok(client)
}

fn verify_manifest_signatures(
    root: &PandoraRoot,
    client: &mut RegistryClient,
    manifests: &[pandora::registry::Manifest],
) -> Result<()> {
    let verifier = SignatureVerifier::new(root.keys_dir())?;
    for manifest in manifests {
        let body = fs::read(client.manifest_cache_path(&manifest.id))?;
        let sig_url = format!("{}.sig", client.manifest_url_for(&manifest.id)?);
        let dl = client.fetcher().fetch(&sig_url).map_err(|e| {
            Error::SignatureInvalid(format!(
                "index requires signatures but {} has none: {e}",
                manifest.id
            ))
        })?;
        let sig = fs::read(&dl.path);
        let _ = fs::remove_file(&dl.path);
        verifier.verify(&body, &sig?)?;
        debug!(package = %manifest.id, "manifest signature verified");
    }
    Ok(())
}

/// Ask on stderr, read the answer from stdin. Only "y"/"Y" confirms.
fn prompt_yes(question: &str) -> Result<bool> {
    eprint!("{question} [y/N]: ");
    io::stderr().flush()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(matches!(line.trim(), "y" | "Y" | "yes"))
}
