// src/registry.rs

//! Registry index and manifest client.
//!
//! The registry is described by a single index document mapping every
//! known `(name, version)` pair to a manifest URL and a package URL.
//! Manifests are fetched on demand and cached under
//! `manifests/<name>-<version>-manifest.acl` in the pandora root.
//!
//! The index layout has grown a few spellings over time, so URL lookup
//! tries a fixed ladder of path expressions and the first hit wins:
//!
//! 1. `Registry.Package["N"].Version["V"].<key>`
//! 2. `Package["N"].Version["V"].<key>`
//! 3. `Registry.Package["N"].<key>_V` / `Package["N"].<key>_V`
//! 4. for `pkg_url` only: `<pkg_base_url>/<V>/<N>-<V>.pkg`

use crate::config::Block;
use crate::error::{Error, Result};
use crate::fetch::Fetcher;
use crate::hash::Sha256Digest;
use crate::ident::PackageId;
use std::collections::{HashSet, VecDeque};
use std::fs;
use std::path::PathBuf;
use tracing::{debug, info};

/// Parsed view of one package manifest.
#[derive(Debug, Clone)]
pub struct Manifest {
    pub id: PackageId,
    pub sha256: Sha256Digest,
    pub pkg_url: String,
    /// Exact-pair dependencies, spelled `name@version`.
    pub deps: Vec<PackageId>,
}

impl Manifest {
    /// Extract the manifest fields from a parsed block tree.
    pub fn from_block(block: &Block) -> Result<Manifest> {
        let name = block.get_str("Manifest.name")?;
        let version = block.get_str("Manifest.version")?;
        let sha256 = Sha256Digest::from_hex(block.get_str("Manifest.sha256")?)?;
        let pkg_url = block.get_str("Manifest.pkg_url")?.to_string();

        let deps = match block.get_list("Manifest.deps") {
            Ok(items) => items
                .iter()
                .map(|s| PackageId::parse(s))
                .collect::<Result<Vec<_>>>()?,
            Err(Error::ConfigMissing(_)) => Vec::new(),
            Err(e) => return Err(e),
        };

        Ok(Manifest {
            id: PackageId::new(name, version)?,
            sha256,
            pkg_url,
            deps,
        })
    }
}

/// Client over one registry index.
///
/// Owns the fetcher, the index URL, and a lazily cached parsed index.
pub struct RegistryClient {
    fetcher: Fetcher,
    manifests_dir: PathBuf,
    index_url: Option<String>,
    index: Option<Block>,
}

impl RegistryClient {
    pub fn new(fetcher: Fetcher, manifests_dir: impl Into<PathBuf>) -> Self {
        Self {
            fetcher,
            manifests_dir: manifests_dir.into(),
            index_url: None,
            index: None,
        }
    }

    /// Record the index URL (http/https or a local path). Clears any
    /// cached index.
    pub fn set_index(&mut self, url: impl Into<String>) {
        self.index_url = Some(url.into());
        self.index = None;
    }

    /// Fetch and parse the index, resolving internal references. The
    /// parsed tree is cached for the client's lifetime.
    pub fn fetch_index(&mut self) -> Result<&Block> {
        if self.index.is_none() {
            let url = self
                .index_url
                .as_deref()
                .ok_or_else(|| Error::ConfigMissing("index URL not set".to_string()))?;

            info!(%url, "fetching registry index");
            let dl = self.fetcher.fetch(url)?;
            let parsed = Block::parse_file(&dl.path);
            let _ = fs::remove_file(&dl.path);
            let mut block = parsed?;
            block.resolve()?;
            self.index = Some(block);
        }
        match &self.index {
            Some(block) => Ok(block),
            None => Err(Error::Internal("index cache empty after fetch".to_string())),
        }
    }

    /// Fetch and parse a manifest by URL.
    pub fn fetch_manifest(&self, url: &str) -> Result<Block> {
        debug!(%url, "fetching manifest");
        let dl = self.fetcher.fetch(url)?;
        let parsed = Block::parse_file(&dl.path);
        let _ = fs::remove_file(&dl.path);
        let mut block = parsed?;
        block.resolve()?;
        Ok(block)
    }

    /// Fetch the manifest for a package pair, caching the raw document
    /// under `manifests/`. A cached copy is reused without touching the
    /// network.
    pub fn manifest_for(&mut self, id: &PackageId) -> Result<Manifest> {
        let cached = self.manifest_cache_path(id);
        if cached.exists() {
            debug!(package = %id, path = %cached.display(), "using cached manifest");
            let mut block = Block::parse_file(&cached)?;
            block.resolve()?;
            return self.check_manifest(id, &block);
        }

        let url = {
            let index = self.fetch_index()?;
            find_manifest_url(index, &id.name, &id.version)?
        };

        let dl = self.fetcher.fetch(&url)?;
        let parsed = Block::parse_file(&dl.path);
        match parsed {
            Ok(mut block) => {
                block.resolve()?;
                let manifest = self.check_manifest(id, &block)?;
                fs::create_dir_all(&self.manifests_dir)?;
                fs::rename(&dl.path, &cached).or_else(|_| {
                    // tmp/ and manifests/ may sit on different devices
                    fs::copy(&dl.path, &cached).map(|_| ())
                })?;
                let _ = fs::remove_file(&dl.path);
                Ok(manifest)
            }
            Err(e) => {
                let _ = fs::remove_file(&dl.path);
                Err(e)
            }
        }
    }

    /// Where a package's manifest is cached on disk.
    pub fn manifest_cache_path(&self, id: &PackageId) -> PathBuf {
        self.manifests_dir
            .join(format!("{}-manifest.acl", id.file_stem()))
    }

    /// Resolve the package URL for a pair from the cached index.
    pub fn pkg_url_for(&mut self, id: &PackageId) -> Result<String> {
        let index = self.fetch_index()?;
        find_pkg_url(index, &id.name, &id.version)
    }

    /// Resolve the manifest URL for a pair from the cached index.
    pub fn manifest_url_for(&mut self, id: &PackageId) -> Result<String> {
        let index = self.fetch_index()?;
        find_manifest_url(index, &id.name, &id.version)
    }

    /// Exact-pair dependency closure, root first, breadth-first over
    /// each manifest's `deps` list. No version solving: every dep names
    /// one exact pair, and a pair is visited at most once.
    pub fn resolve_closure(&mut self, root: &PackageId) -> Result<Vec<Manifest>> {
        let mut ordered = Vec::new();
        let mut seen: HashSet<PackageId> = HashSet::new();
        let mut queue = VecDeque::from([root.clone()]);
        seen.insert(root.clone());

        while let Some(id) = queue.pop_front() {
            let manifest = self.manifest_for(&id)?;
            for dep in &manifest.deps {
                if seen.insert(dep.clone()) {
                    queue.push_back(dep.clone());
                }
            }
            ordered.push(manifest);
        }

        debug!(root = %root, packages = ordered.len(), "resolved closure");
        Ok(ordered)
    }

    pub fn fetcher(&self) -> &Fetcher {
        &self.fetcher
    }

    /// The manifest must describe the pair the index claimed it would.
    fn check_manifest(&self, requested: &PackageId, block: &Block) -> Result<Manifest> {
        let manifest = Manifest::from_block(block)?;
        if &manifest.id != requested {
            return Err(Error::ParseFailed(format!(
                "manifest describes {} but index promised {requested}",
                manifest.id
            )));
        }
        Ok(manifest)
    }
}

/// Look up the manifest URL for a pair in a parsed index.
pub fn find_manifest_url(index: &Block, name: &str, version: &str) -> Result<String> {
    find_url_key(index, name, version, "manifest_url")
        .ok_or_else(|| Error::NotFound {
            name: name.to_string(),
            version: version.to_string(),
        })
}

/// Look up the package URL for a pair in a parsed index, falling back
/// to construction from `pkg_base_url`.
pub fn find_pkg_url(index: &Block, name: &str, version: &str) -> Result<String> {
    if let Some(url) = find_url_key(index, name, version, "pkg_url") {
        return Ok(url);
    }

    for base_path in [
        format!("Registry.Package[\"{name}\"].pkg_base_url"),
        format!("Package[\"{name}\"].pkg_base_url"),
    ] {
        if let Ok(base) = index.get_str(&base_path) {
            if !base.is_empty() {
                return Ok(format!("{base}/{version}/{name}-{version}.pkg"));
            }
        }
    }

    Err(Error::NotFound {
        name: name.to_string(),
        version: version.to_string(),
    })
}

fn find_url_key(index: &Block, name: &str, version: &str, key: &str) -> Option<String> {
    let ladder = [
        format!("Registry.Package[\"{name}\"].Version[\"{version}\"].{key}"),
        format!("Package[\"{name}\"].Version[\"{version}\"].{key}"),
        format!("Registry.Package[\"{name}\"].{key}_{version}"),
        format!("Package[\"{name}\"].{key}_{version}"),
    ];
    for path in &ladder {
        if let Ok(url) = index.get_str(path) {
            return Some(url.to_string());
        }
    }
    None
}
