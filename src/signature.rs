// src/signature.rs

//! Detached manifest signatures.
//!
//! The trust store is a directory of ed25519 public keys at
//! `R/keys/<keyid>.pub`, each file holding the base64 encoding of a
//! 32-byte verifying key. A manifest's detached signature (64 bytes,
//! base64, conventionally fetched from `<manifest_url>.sig`) must
//! verify against at least one trusted key.
//!
//! Whether signatures are required is the registry's call: an index
//! with `require_signatures = true` makes a missing or invalid
//! signature fatal before anything touches the store. Without it the
//! manifest digest remains the sole integrity gate.

use crate::error::{Error, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use ed25519_dalek::{Signature, VerifyingKey, PUBLIC_KEY_LENGTH, SIGNATURE_LENGTH};
use std::fs;
use std::path::PathBuf;
use tracing::{debug, info};

/// Verifier over the on-disk trust store.
pub struct SignatureVerifier {
    keys_dir: PathBuf,
}

impl SignatureVerifier {
    /// Open (creating if needed) the trust store directory.
    pub fn new(keys_dir: impl Into<PathBuf>) -> Result<Self> {
        let keys_dir = keys_dir.into();
        fs::create_dir_all(&keys_dir)?;
        Ok(Self { keys_dir })
    }

    /// Import a public key under the given id. `data` is the base64
    /// text of a 32-byte ed25519 key; surrounding whitespace is
    /// tolerated. Returns the path the key was stored at.
    pub fn import_key(&self, data: &[u8], key_id: &str) -> Result<PathBuf> {
        if key_id.is_empty() || key_id.contains('/') || key_id.contains('\0') {
            return Err(Error::InvalidInput(format!("bad key id '{key_id}'")));
        }
        // parse first so a corrupt key never lands in the trust store
        parse_key(data)?;

        let path = self.key_path(key_id);
        fs::write(&path, data)?;
        info!(key_id, path = %path.display(), "imported trusted key");
        Ok(path)
    }

    /// True when at least one trusted key is installed.
    pub fn has_keys(&self) -> bool {
        self.list_keys().map(|k| !k.is_empty()).unwrap_or(false)
    }

    /// Ids of every installed key.
    pub fn list_keys(&self) -> Result<Vec<String>> {
        let mut out = Vec::new();
        if !self.keys_dir.is_dir() {
            return Ok(out);
        }
        for entry in fs::read_dir(&self.keys_dir)? {
            let path = entry?.path();
            if path.extension().and_then(|s| s.to_str()) == Some("pub") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    out.push(stem.to_string());
                }
            }
        }
        out.sort();
        Ok(out)
    }

    /// Verify a detached signature over `message` against every
    /// trusted key; the first key that verifies wins.
    pub fn verify(&self, message: &[u8], signature: &[u8]) -> Result<()> {
        let sig = parse_signature(signature)?;

        let keys = self.list_keys()?;
        if keys.is_empty() {
            return Err(Error::SignatureInvalid(format!(
                "no trusted keys in {}",
                self.keys_dir.display()
            )));
        }

        for key_id in &keys {
            let data = fs::read(self.key_path(key_id))?;
            let key = parse_key(&data)?;
            if key.verify_strict(message, &sig).is_ok() {
                debug!(key_id = %key_id, "signature verified");
                return Ok(());
            }
        }

        Err(Error::SignatureInvalid(
            "signature does not match any trusted key".to_string(),
        ))
    }

    fn key_path(&self, key_id: &str) -> PathBuf {
        self.keys_dir.join(format!("{key_id}.pub"))
    }
}

fn parse_key(data: &[u8]) -> Result<VerifyingKey> {
    let text = std::str::from_utf8(data)
        .map_err(|_| Error::ParseFailed("key file is not UTF-8".to_string()))?;
    let raw = BASE64
        .decode(text.trim())
        .map_err(|e| Error::ParseFailed(format!("key is not valid base64: {e}")))?;
    let raw: [u8; PUBLIC_KEY_LENGTH] = raw
        .try_into()
        .map_err(|_| Error::ParseFailed("key is not 32 bytes".to_string()))?;
    VerifyingKey::from_bytes(&raw)
        .map_err(|e| Error::ParseFailed(format!("invalid ed25519 key: {e}")))
}

fn parse_signature(data: &[u8]) -> Result<Signature> {
    let text = std::str::from_utf8(data)
        .map_err(|_| Error::ParseFailed("signature is not UTF-8".to_string()))?;
    let raw = BASE64
        .decode(text.trim())
        .map_err(|e| Error::ParseFailed(format!("signature is not valid base64: {e}")))?;
    let raw: [u8; SIGNATURE_LENGTH] = raw
        .try_into()
        .map_err(|_| Error::ParseFailed("signature is not 64 bytes".to_string()))?;
    Ok(Signature::from_bytes(&raw))
}
