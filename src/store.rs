// src/store.rs

//! The immutable package store.
//!
//! A store entry lives at `store/<name>/<version>/` and holds `files/`
//! (the unpacked tree), `.manifest` (the relative paths accepted at
//! unpack time), and `.sha256` (the archive digest the manifest
//! asserted). Entries are built in a hidden temp directory and
//! published with a single `rename`; an entry that exists is complete,
//! and nothing mutates it afterwards.
//!
//! Reinstalling the same `(name, version, digest)` is a no-op success.
//! The same pair with a different digest is a conflict: the published
//! entry is never overwritten.

use crate::archive;
use crate::error::{Error, Result};
use crate::hash::Sha256Digest;
use crate::ident::PackageId;
use crate::paths;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Prefix for in-flight import directories under `store/`; swept by
/// recovery on the next start if a crash strands one.
pub const IMPORT_TMP_PREFIX: &str = ".tmp-import-";

/// Name of the digest record inside a store entry.
const DIGEST_FILE: &str = ".sha256";

/// Atomically import a verified package archive into the store.
///
/// The caller must hold the mutation lock and must already have checked
/// the archive digest against `expected`; `expected` is recorded in the
/// entry so later reinstalls can be classified as idempotent or
/// conflicting. Returns the published entry path.
///
/// Any failure before the final rename leaves `store/` unchanged.
pub fn import(
    store_dir: &Path,
    pkg_file: &Path,
    id: &PackageId,
    expected: &Sha256Digest,
) -> Result<PathBuf> {
    fs::create_dir_all(store_dir)?;

    let final_dir = store_dir.join(&id.name).join(&id.version);

    let tmp = tempfile::Builder::new()
        .prefix(IMPORT_TMP_PREFIX)
        .tempdir_in(store_dir)?;
    fs::set_permissions(tmp.path(), fs::Permissions::from_mode(0o700))?;

    let staged_entry = tmp.path().join(&id.name).join(&id.version);
    let files_dir = staged_entry.join("files");
    fs::create_dir_all(&files_dir)?;

    archive::unpack(pkg_file, &files_dir)?;

    // the unpacker leaves .manifest beside the files; it belongs at the
    // entry root, out of the tree a profile will link into
    fs::rename(files_dir.join(".manifest"), staged_entry.join(".manifest"))?;
    fs::write(
        staged_entry.join(DIGEST_FILE),
        format!("{}\n", expected.to_hex()),
    )?;

    paths::validate_tree(&files_dir)?;

    fs::create_dir_all(store_dir.join(&id.name))?;

    if final_dir.exists() {
        // the staged tree is dropped with `tmp` either way
        let recorded = entry_digest(store_dir, id)?;
        return if recorded.ct_eq(expected) {
            debug!(package = %id, "store entry already present, reinstall is a no-op");
            Ok(final_dir)
        } else {
            Err(Error::StoreConflict {
                name: id.name.clone(),
                version: id.version.clone(),
                existing: recorded.to_hex(),
            })
        };
    }

    // commit point: everything before this leaves the store untouched
    fs::rename(&staged_entry, &final_dir)?;

    info!(package = %id, path = %final_dir.display(), "imported into store");
    Ok(final_dir)
}

/// Read the digest recorded when an entry was published.
pub fn entry_digest(store_dir: &Path, id: &PackageId) -> Result<Sha256Digest> {
    let path = store_dir
        .join(&id.name)
        .join(&id.version)
        .join(DIGEST_FILE);
    let text = fs::read_to_string(&path).map_err(|e| {
        Error::Internal(format!(
            "store entry {} has no digest record: {e}",
            id
        ))
    })?;
    Sha256Digest::from_hex(text.trim())
}

/// Path of a published entry's `files/` tree, or `NotFound` if the
/// pair has not been imported.
pub fn entry_files(store_dir: &Path, id: &PackageId) -> Result<PathBuf> {
    let files = store_dir.join(&id.name).join(&id.version).join("files");
    if files.is_dir() {
        Ok(files)
    } else {
        Err(Error::NotFound {
            name: id.name.clone(),
            version: id.version.clone(),
        })
    }
}

/// List every published `(name, version)` pair.
pub fn list_entries(store_dir: &Path) -> Result<Vec<PackageId>> {
    let mut out = Vec::new();
    if !store_dir.is_dir() {
        return Ok(out);
    }
    for name_entry in fs::read_dir(store_dir)? {
        let name_entry = name_entry?;
        let name = name_entry.file_name().to_string_lossy().into_owned();
        if name.starts_with('.') || !name_entry.file_type()?.is_dir() {
            continue;
        }
        for ver_entry in fs::read_dir(name_entry.path())? {
            let ver_entry = ver_entry?;
            if !ver_entry.file_type()?.is_dir() {
                continue;
            }
            let version = ver_entry.file_name().to_string_lossy().into_owned();
            if let Ok(id) = PackageId::new(&name, &version) {
                out.push(id);
            }
        }
    }
    out.sort_by(|a, b| a.file_stem().cmp(&b.file_stem()));
    Ok(out)
}
