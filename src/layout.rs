// src/layout.rs

//! The pandora root: discovery, bootstrap, and crash recovery.
//!
//! All mutable state lives under one per-user directory, either
//! `$PANDORA_HOME` or `$HOME/pandora`:
//!
//! ```text
//! store/<name>/<version>/files/…     immutable entries
//! profiles/<label>-<pid>-<nsec>/     symlink forests
//! manifests/                         cached manifest documents
//! cache/  tmp/  keys/                scratch and trust store
//! vir -> profiles/<current>          the live pointer
//! .lock                              whole-program mutation lock
//! ```
//!
//! Every mutating command runs the recovery sweep on startup, deleting
//! debris a crashed predecessor left behind. The sweep only removes
//! things that were never published: hidden temp directories, partial
//! downloads, and a `vir-new` staging link whose target is gone. It
//! never touches `vir`.

use crate::error::{Error, Result};
use crate::fetch::DOWNLOAD_PREFIX;
use crate::profile::PROFILE_TMP_PREFIX;
use crate::store::IMPORT_TMP_PREFIX;
use std::fs;
use std::os::unix::fs::symlink;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const SUBDIRS: &[&str] = &["store", "profiles", "manifests", "cache", "tmp", "keys"];

/// Handle to a pandora root directory.
#[derive(Debug, Clone)]
pub struct PandoraRoot {
    root: PathBuf,
}

impl PandoraRoot {
    /// Discover the root from the environment: `$PANDORA_HOME` when
    /// non-empty, else `$HOME/pandora`. A missing `$HOME` is fatal.
    pub fn discover() -> Result<Self> {
        if let Ok(home) = std::env::var("PANDORA_HOME") {
            if !home.is_empty() {
                return Ok(Self { root: PathBuf::from(home) });
            }
        }
        let home = std::env::var("HOME")
            .map_err(|_| Error::ConfigMissing("HOME environment variable not set".to_string()))?;
        if home.is_empty() {
            return Err(Error::ConfigMissing(
                "HOME environment variable is empty".to_string(),
            ));
        }
        Ok(Self {
            root: Path::new(&home).join("pandora"),
        })
    }

    /// Use an explicit directory as the root (tests, tooling).
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { root: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    pub fn store_dir(&self) -> PathBuf {
        self.root.join("store")
    }

    pub fn profiles_dir(&self) -> PathBuf {
        self.root.join("profiles")
    }

    pub fn manifests_dir(&self) -> PathBuf {
        self.root.join("manifests")
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.root.join("cache")
    }

    pub fn tmp_dir(&self) -> PathBuf {
        self.root.join("tmp")
    }

    pub fn keys_dir(&self) -> PathBuf {
        self.root.join("keys")
    }

    pub fn vir(&self) -> PathBuf {
        self.root.join("vir")
    }

    pub fn vir_new(&self) -> PathBuf {
        self.root.join("vir-new")
    }

    pub fn lock_file(&self) -> PathBuf {
        self.root.join(".lock")
    }

    /// Idempotently create the directory skeleton. With `seed_vir`, a
    /// `default` profile with `bin` and `lib` placeholders is created
    /// and `vir` is pointed at it if no live pointer exists yet.
    pub fn fs_init(&self, seed_vir: bool) -> Result<()> {
        fs::create_dir_all(&self.root)?;
        for sub in SUBDIRS {
            fs::create_dir_all(self.root.join(sub))?;
        }

        if seed_vir {
            let default_profile = self.profiles_dir().join("default");
            fs::create_dir_all(default_profile.join("bin"))?;
            fs::create_dir_all(default_profile.join("lib"))?;
            if fs::symlink_metadata(self.vir()).is_err() {
                symlink(&default_profile, self.vir())?;
            }
        }

        debug!(root = %self.root.display(), "filesystem layout ready");
        Ok(())
    }

    /// Sweep debris left by interrupted operations.
    pub fn recover(&self) -> Result<RecoverySummary> {
        let mut summary = RecoverySummary::default();

        summary.removed_imports =
            remove_prefixed_dirs(&self.store_dir(), IMPORT_TMP_PREFIX)?;
        summary.removed_profiles =
            remove_prefixed_dirs(&self.profiles_dir(), PROFILE_TMP_PREFIX)?;
        summary.removed_downloads =
            remove_prefixed_files(&self.tmp_dir(), DOWNLOAD_PREFIX)?;

        // a vir-new left behind mid-activation is only junk if the
        // profile it points at never made it
        let vir_new = self.vir_new();
        if fs::symlink_metadata(&vir_new).is_ok() && fs::metadata(&vir_new).is_err() {
            fs::remove_file(&vir_new)?;
            summary.cleared_vir_new = true;
        }

        if !summary.is_empty() {
            info!(
                imports = summary.removed_imports,
                profiles = summary.removed_profiles,
                downloads = summary.removed_downloads,
                vir_new = summary.cleared_vir_new,
                "recovery sweep removed stale state"
            );
        }
        Ok(summary)
    }
}

/// What a recovery sweep cleaned up.
#[derive(Debug, Default, Clone, Copy)]
pub struct RecoverySummary {
    pub removed_imports: usize,
    pub removed_profiles: usize,
    pub removed_downloads: usize,
    pub cleared_vir_new: bool,
}

impl RecoverySummary {
    pub fn is_empty(&self) -> bool {
        self.removed_imports == 0
            && self.removed_profiles == 0
            && self.removed_downloads == 0
            && !self.cleared_vir_new
    }
}

fn remove_prefixed_dirs(dir: &Path, prefix: &str) -> Result<usize> {
    let mut removed = 0;
    if !dir.is_dir() {
        return Ok(removed);
    }
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_name().to_string_lossy().starts_with(prefix) {
            fs::remove_dir_all(entry.path())?;
            removed += 1;
        }
    }
    Ok(removed)
}

fn remove_prefixed_files(dir: &Path, prefix: &str) -> Result<usize> {
    let mut removed = 0;
    if !dir.is_dir() {
        return Ok(removed);
    }
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let is_file = entry.file_type()?.is_file();
        if is_file && entry.file_name().to_string_lossy().starts_with(prefix) {
            fs::remove_file(entry.path())?;
            removed += 1;
        }
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_fs_init_creates_skeleton() {
        let tmp = TempDir::new().unwrap();
        let root = PandoraRoot::at(tmp.path().join("pandora"));
        root.fs_init(false).unwrap();

        for sub in SUBDIRS {
            assert!(root.path().join(sub).is_dir(), "missing {sub}");
        }
        // idempotent
        root.fs_init(false).unwrap();
    }

    #[test]
    fn test_fs_init_seeds_vir() {
        let tmp = TempDir::new().unwrap();
        let root = PandoraRoot::at(tmp.path().join("pandora"));
        root.fs_init(true).unwrap();

        assert!(root.profiles_dir().join("default/bin").is_dir());
        assert!(root.profiles_dir().join("default/lib").is_dir());
        let target = fs::read_link(root.vir()).unwrap();
        assert!(target.ends_with("profiles/default"));

        // a second init must not clobber an existing pointer
        root.fs_init(true).unwrap();
        assert_eq!(fs::read_link(root.vir()).unwrap(), target);
    }

    #[test]
    fn test_recover_removes_debris() {
        let tmp = TempDir::new().unwrap();
        let root = PandoraRoot::at(tmp.path().join("pandora"));
        root.fs_init(false).unwrap();

        fs::create_dir_all(root.store_dir().join(".tmp-import-abc123/pkg/1.0")).unwrap();
        fs::create_dir_all(root.profiles_dir().join(".tmp-profile-xyz")).unwrap();
        fs::write(root.tmp_dir().join("dl-partial"), b"half a package").unwrap();
        fs::write(root.tmp_dir().join("txn-1-2.log"), b"activated=x\n").unwrap();
        symlink(
            root.profiles_dir().join("never-existed"),
            root.vir_new(),
        )
        .unwrap();

        let summary = root.recover().unwrap();
        assert_eq!(summary.removed_imports, 1);
        assert_eq!(summary.removed_profiles, 1);
        assert_eq!(summary.removed_downloads, 1);
        assert!(summary.cleared_vir_new);

        // txn logs survive the sweep
        assert!(root.tmp_dir().join("txn-1-2.log").is_file());
    }

    #[test]
    fn test_recover_keeps_valid_vir_new() {
        let tmp = TempDir::new().unwrap();
        let root = PandoraRoot::at(tmp.path().join("pandora"));
        root.fs_init(false).unwrap();

        let staged = root.profiles_dir().join("default-1-2");
        fs::create_dir_all(&staged).unwrap();
        symlink(&staged, root.vir_new()).unwrap();

        let summary = root.recover().unwrap();
        assert!(!summary.cleared_vir_new);
        assert!(fs::symlink_metadata(root.vir_new()).is_ok());
    }

    #[test]
    fn test_recover_on_empty_root() {
        let tmp = TempDir::new().unwrap();
        let root = PandoraRoot::at(tmp.path().join("missing"));
        let summary = root.recover().unwrap();
        assert!(summary.is_empty());
    }
}
