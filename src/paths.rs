// src/paths.rs

//! Path safety for untrusted input.
//!
//! Archive entries and profile relpaths come from the network. A lenient
//! `..` resolution would let a crafted archive escape the store by
//! chaining components, so `..` is rejected outright rather than popped.

use crate::error::{Error, Result};
use std::path::{Component, Path};
use walkdir::WalkDir;

/// Longest normalized path accepted, matching the usual system limit.
const MAX_PATH: usize = 4096;

/// Normalize a slash-separated relative path from an untrusted source.
///
/// Rules:
/// - absolute paths and empty input are rejected;
/// - empty components and `.` components are dropped;
/// - `..` is rejected outright (never resolved);
/// - NUL bytes anywhere are rejected;
/// - the result has single `/` separators, no leading or trailing slash.
pub fn normalize(raw: &str) -> Result<String> {
    if raw.is_empty() {
        return Err(Error::InvalidInput("empty path".to_string()));
    }
    if raw.starts_with('/') {
        return Err(Error::InvalidInput(format!("absolute path '{raw}'")));
    }
    if raw.len() >= MAX_PATH {
        return Err(Error::InvalidInput("path too long".to_string()));
    }
    if raw.contains('\0') {
        return Err(Error::InvalidInput("path contains NUL".to_string()));
    }

    let mut parts: Vec<&str> = Vec::new();
    for comp in raw.split('/') {
        match comp {
            "" | "." => continue,
            ".." => {
                return Err(Error::InvalidInput(format!(
                    "parent-traversal component in '{raw}'"
                )));
            }
            other => parts.push(other),
        }
    }

    if parts.is_empty() {
        return Err(Error::InvalidInput(format!(
            "path '{raw}' is empty after normalization"
        )));
    }

    Ok(parts.join("/"))
}

/// Validate an unpacked tree before it is renamed into the store.
///
/// Walks without following symlinks and rejects the tree if any path
/// under `root` contains a `..` component, or any symlink has an
/// absolute target or a target containing `..`. A successful return
/// means the tree is safe to publish.
pub fn validate_tree(root: &Path) -> Result<()> {
    for entry in WalkDir::new(root).follow_links(false) {
        let entry = entry.map_err(|e| Error::Internal(format!("tree walk failed: {e}")))?;
        let path = entry.path();

        let rel = path.strip_prefix(root).unwrap_or(path);
        if rel.as_os_str().len() >= MAX_PATH {
            return Err(Error::UnsafeArchive(format!(
                "path too long: {}",
                path.display()
            )));
        }
        for comp in rel.components() {
            if matches!(comp, Component::ParentDir) {
                return Err(Error::UnsafeArchive(format!(
                    "parent-traversal component in {}",
                    path.display()
                )));
            }
        }

        if entry.path_is_symlink() {
            let target = std::fs::read_link(path)?;
            if target.is_absolute() {
                return Err(Error::UnsafeArchive(format!(
                    "symlink with absolute target: {} -> {}",
                    path.display(),
                    target.display()
                )));
            }
            if target.components().any(|c| matches!(c, Component::ParentDir)) {
                return Err(Error::UnsafeArchive(format!(
                    "symlink target contains '..': {} -> {}",
                    path.display(),
                    target.display()
                )));
            }
        } else {
            // device, fifo, and socket nodes never belong in a package
            let ftype = entry.file_type();
            if !ftype.is_file() && !ftype.is_dir() {
                return Err(Error::UnsafeArchive(format!(
                    "special file in tree: {}",
                    path.display()
                )));
            }
        }
    }
    Ok(())
}
