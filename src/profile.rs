// src/profile.rs

//! Profile assembly and atomic activation.
//!
//! A profile is a symlink forest: every leaf is an absolute symlink
//! into some store entry's `files/` tree. Profiles are assembled in a
//! hidden temp directory under `profiles/`, promoted to a permanent
//! name by the activator, and made live by swapping the `vir` pointer
//! with a single `rename`. A profile moves through
//! `ASSEMBLING -> STAGED -> LIVE -> SUPERSEDED` and is only ever
//! reaped lazily; `vir` never points at a missing directory.

use crate::error::{Error, Result};
use crate::paths;
use std::collections::HashMap;
use std::fs;
use std::os::unix::fs::symlink;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};

/// Prefix for in-flight profile directories; swept by recovery.
pub const PROFILE_TMP_PREFIX: &str = ".tmp-profile-";

/// One requested link in a profile.
#[derive(Debug, Clone)]
pub struct ProfileEntry {
    /// Path of the symlink relative to the profile root.
    pub relpath: String,
    /// Absolute target the symlink will point at.
    pub target_path: PathBuf,
    /// Owner, for conflict diagnostics.
    pub pkg_name: String,
    pub pkg_version: String,
}

impl ProfileEntry {
    fn owner(&self) -> String {
        format!("{}@{}", self.pkg_name, self.pkg_version)
    }
}

/// Assemble a profile in a temp directory under `profiles_dir`.
///
/// Entries are processed in order; each relpath is normalized, its
/// target checked for existence, and collisions on a normalized path
/// reported as a conflict naming both owners. On success the caller
/// owns the returned directory and must either activate it or delete
/// it. On any failure the temp directory is removed before returning.
pub fn assemble(profiles_dir: &Path, entries: &[ProfileEntry]) -> Result<PathBuf> {
    if entries.is_empty() {
        return Err(Error::InvalidInput("no profile entries".to_string()));
    }
    fs::create_dir_all(profiles_dir)?;

    // dropped on every early return, deleting the half-built profile
    let tmp = tempfile::Builder::new()
        .prefix(PROFILE_TMP_PREFIX)
        .tempdir_in(profiles_dir)?;

    let mut claimed: HashMap<String, String> = HashMap::new();

    for entry in entries {
        let nrel = paths::normalize(&entry.relpath)?;

        if fs::metadata(&entry.target_path).is_err() {
            return Err(Error::ProfileMissingTarget(entry.target_path.clone()));
        }

        if let Some(first) = claimed.get(&nrel) {
            return Err(Error::ProfileConflict {
                path: nrel,
                first: first.clone(),
                second: entry.owner(),
            });
        }

        let link_path = tmp.path().join(&nrel);
        if let Some(parent) = link_path.parent() {
            fs::create_dir_all(parent)?;
        }

        // a directory here means an earlier entry claimed this path as
        // a parent; a file or link is stale and replaceable
        match fs::symlink_metadata(&link_path) {
            Ok(meta) if meta.is_dir() => {
                return Err(Error::ProfileConflict {
                    path: nrel,
                    first: "(directory)".to_string(),
                    second: entry.owner(),
                });
            }
            Ok(_) => fs::remove_file(&link_path)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        symlink(&entry.target_path, &link_path)?;
        claimed.insert(nrel, entry.owner());
    }

    let path = tmp.keep();
    debug!(profile = %path.display(), links = entries.len(), "assembled profile");
    Ok(path)
}

/// Promote a staged profile and atomically make it live.
///
/// The staged directory is renamed to `profiles/<label>-<pid>-<nsec>`,
/// a `vir-new` symlink is staged, and `rename(vir-new, vir)` performs
/// the user-visible commit. After the first rename the caller has
/// relinquished the temp path. The transaction log written last is
/// diagnostic only: `vir` is the sole truth, so a log failure does not
/// fail the activation.
pub fn activate(root: &Path, tmp_profile: &Path, label: &str) -> Result<PathBuf> {
    let profiles_dir = root.join("profiles");
    fs::create_dir_all(&profiles_dir)?;

    let nsec = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    let pid = std::process::id();
    let final_path = profiles_dir.join(format!("{label}-{pid}-{nsec}"));

    fs::rename(tmp_profile, &final_path)?;

    let vir_new = root.join("vir-new");
    match fs::symlink_metadata(&vir_new) {
        Ok(_) => fs::remove_file(&vir_new)?,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }
    symlink(&final_path, &vir_new)?;

    // the commit point: readers see the old profile or the new one,
    // never anything in between
    fs::rename(&vir_new, root.join("vir"))?;

    write_txn_log(root, &final_path, pid, nsec);

    info!(profile = %final_path.display(), "activated");
    Ok(final_path)
}

/// The currently live profile, if `vir` points anywhere valid.
pub fn current(root: &Path) -> Option<PathBuf> {
    let target = fs::read_link(root.join("vir")).ok()?;
    let resolved = if target.is_absolute() {
        target
    } else {
        root.join(target)
    };
    resolved.is_dir().then_some(resolved)
}

fn write_txn_log(root: &Path, final_path: &Path, pid: u32, nsec: u32) {
    let tmp_dir = root.join("tmp");
    let log_path = tmp_dir.join(format!("txn-{pid}-{nsec}.log"));
    let write = || -> std::io::Result<()> {
        fs::create_dir_all(&tmp_dir)?;
        fs::write(&log_path, format!("activated={}\n", final_path.display()))
    };
    if let Err(e) = write() {
        warn!(path = %log_path.display(), %e, "could not write transaction log");
    }
}
