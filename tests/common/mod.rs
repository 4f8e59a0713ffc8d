// tests/common/mod.rs

//! Shared test utilities and helpers for integration tests.

#![allow(dead_code)]

use pandora::archive;
use pandora::hash::{self, Sha256Digest};
use pandora::layout::PandoraRoot;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Create a pandora root in a temp directory.
///
/// Returns (TempDir, root) - keep the TempDir alive to prevent cleanup.
pub fn setup_root() -> (TempDir, PandoraRoot) {
    let temp_dir = tempfile::tempdir().unwrap();
    let root = PandoraRoot::at(temp_dir.path().join("pandora"));
    root.fs_init(false).unwrap();
    (temp_dir, root)
}

/// Build a small package tree, pack it, and return the archive path
/// and its digest. The tree has `bin/<name>` plus a relative symlink.
pub fn build_pkg(work: &Path, name: &str, version: &str) -> (PathBuf, Sha256Digest) {
    let tree = work.join(format!("{name}-{version}-tree"));
    fs::create_dir_all(tree.join("bin")).unwrap();
    fs::write(
        tree.join("bin").join(name),
        format!("#!/bin/sh\necho {name} {version}\n"),
    )
    .unwrap();
    std::os::unix::fs::symlink(format!("bin/{name}"), tree.join("run")).unwrap();

    let pkg = work.join(format!("{name}-{version}.pkg"));
    archive::pack(&pkg, &[tree]).unwrap();
    let digest = hash::hash_file(&pkg).unwrap();
    (pkg, digest)
}

/// Write a manifest document for a local package file.
pub fn write_manifest(
    path: &Path,
    name: &str,
    version: &str,
    sha256_hex: &str,
    pkg_url: &str,
    deps: &[&str],
) {
    let mut text = String::from("Manifest {\n");
    text.push_str(&format!("    string name = \"{name}\";\n"));
    text.push_str(&format!("    string version = \"{version}\";\n"));
    text.push_str(&format!("    string sha256 = \"{sha256_hex}\";\n"));
    text.push_str(&format!("    string pkg_url = \"{pkg_url}\";\n"));
    if !deps.is_empty() {
        let quoted: Vec<String> = deps.iter().map(|d| format!("\"{d}\"")).collect();
        text.push_str(&format!("    string[] deps = {{ {} }};\n", quoted.join(", ")));
    }
    text.push_str("    bool signed = false;\n}\n");
    fs::write(path, text).unwrap();
}

/// Write an index mapping `(name, version)` pairs to local manifest
/// and package paths.
pub fn write_index(path: &Path, packages: &[(&str, &str, &Path, &Path)]) {
    let mut text = String::from("Registry {\n");
    text.push_str("    bool require_signatures = false;\n");
    for (name, version, manifest_path, pkg_path) in packages {
        text.push_str(&format!("    Package \"{name}\" {{\n"));
        text.push_str(&format!("        Version \"{version}\" {{\n"));
        text.push_str(&format!(
            "            string manifest_url = \"{}\";\n",
            manifest_path.display()
        ));
        text.push_str(&format!(
            "            string pkg_url = \"{}\";\n",
            pkg_path.display()
        ));
        text.push_str("        }\n    }\n");
    }
    text.push_str("}\n");
    fs::write(path, text).unwrap();
}

/// Names of hidden temp dirs under a directory matching a prefix.
pub fn tmp_debris(dir: &Path, prefix: &str) -> Vec<String> {
    if !dir.is_dir() {
        return Vec::new();
    }
    fs::read_dir(dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .filter(|n| n.starts_with(prefix))
        .collect()
}
