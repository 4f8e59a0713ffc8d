// src/hash.rs

//! SHA-256 digests for package integrity.
//!
//! Everything security-relevant in pandora keys off a single algorithm:
//! the archive a manifest names, the store entry it becomes, and the
//! idempotency check on reinstall all compare SHA-256 digests. The
//! comparison used on untrusted input is constant-time.

use crate::error::{Error, Result};
use sha2::{Digest as _, Sha256};
use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;

/// Digest length in bytes.
pub const DIGEST_LEN: usize = 32;

/// Read buffer for file hashing; memory use is bounded by this
/// regardless of file size.
const HASH_CHUNK: usize = 64 * 1024;

/// A SHA-256 digest value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Sha256Digest(pub [u8; DIGEST_LEN]);

impl Sha256Digest {
    /// Render as 64 lowercase hex characters.
    pub fn to_hex(&self) -> String {
        let mut out = String::with_capacity(DIGEST_LEN * 2);
        for b in self.0 {
            out.push(char::from_digit((b >> 4) as u32, 16).unwrap_or('0'));
            out.push(char::from_digit((b & 0xf) as u32, 16).unwrap_or('0'));
        }
        out
    }

    /// Parse a hex string. Odd length, wrong size, and non-hex
    /// characters are all `InvalidInput`.
    pub fn from_hex(s: &str) -> Result<Self> {
        if s.len() % 2 != 0 {
            return Err(Error::InvalidInput(format!(
                "hex string has odd length {}",
                s.len()
            )));
        }
        if s.len() != DIGEST_LEN * 2 {
            return Err(Error::InvalidInput(format!(
                "hex string has length {}, expected {}",
                s.len(),
                DIGEST_LEN * 2
            )));
        }
        let mut out = [0u8; DIGEST_LEN];
        for (i, chunk) in s.as_bytes().chunks(2).enumerate() {
            let hi = hex_nibble(chunk[0])?;
            let lo = hex_nibble(chunk[1])?;
            out[i] = (hi << 4) | lo;
        }
        Ok(Sha256Digest(out))
    }

    /// Constant-time equality. Accumulates the XOR of every byte pair
    /// and never exits early on a mismatched position.
    pub fn ct_eq(&self, other: &Sha256Digest) -> bool {
        let mut acc = 0u8;
        for i in 0..DIGEST_LEN {
            acc |= self.0[i] ^ other.0[i];
        }
        acc == 0
    }
}

impl fmt::Display for Sha256Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl FromStr for Sha256Digest {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Sha256Digest::from_hex(s)
    }
}

fn hex_nibble(c: u8) -> Result<u8> {
    match c {
        b'0'..=b'9' => Ok(c - b'0'),
        b'a'..=b'f' => Ok(c - b'a' + 10),
        b'A'..=b'F' => Ok(c - b'A' + 10),
        _ => Err(Error::InvalidInput(format!(
            "invalid hex character {:?}",
            c as char
        ))),
    }
}

/// Incremental hasher for streaming input.
pub struct Sha256Stream {
    inner: Sha256,
}

impl Sha256Stream {
    pub fn new() -> Self {
        Self {
            inner: Sha256::new(),
        }
    }

    pub fn update(&mut self, data: &[u8]) {
        self.inner.update(data);
    }

    pub fn finalize(self) -> Sha256Digest {
        let out = self.inner.finalize();
        let mut digest = [0u8; DIGEST_LEN];
        digest.copy_from_slice(&out);
        Sha256Digest(digest)
    }
}

impl Default for Sha256Stream {
    fn default() -> Self {
        Self::new()
    }
}

/// One-shot hash of a byte slice.
pub fn sha256(data: &[u8]) -> Sha256Digest {
    let mut h = Sha256Stream::new();
    h.update(data);
    h.finalize()
}

/// Hash a file by streaming it in 64 KiB chunks.
///
/// I/O failures surface as the crate's I/O kind, distinct from the
/// `InvalidInput` hex errors.
pub fn hash_file(path: &Path) -> Result<Sha256Digest> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256Stream::new();
    let mut buf = vec![0u8; HASH_CHUNK];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const EMPTY_HEX: &str = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";
    const ABC_HEX: &str = "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad";

    #[test]
    fn test_nist_empty_string() {
        assert_eq!(sha256(b"").to_hex(), EMPTY_HEX);
    }

    #[test]
    fn test_nist_abc() {
        assert_eq!(sha256(b"abc").to_hex(), ABC_HEX);
    }

    #[test]
    fn test_hex_round_trip() {
        let digest = sha256(b"round trip");
        let parsed = Sha256Digest::from_hex(&digest.to_hex()).unwrap();
        assert_eq!(digest, parsed);
    }

    #[test]
    fn test_from_hex_rejects_bad_input() {
        assert!(Sha256Digest::from_hex("abc").is_err());
        assert!(Sha256Digest::from_hex("ab").is_err());
        let mut bad = String::from(EMPTY_HEX);
        bad.replace_range(0..1, "g");
        assert!(Sha256Digest::from_hex(&bad).is_err());
    }

    #[test]
    fn test_from_hex_accepts_uppercase() {
        let parsed = Sha256Digest::from_hex(&ABC_HEX.to_uppercase()).unwrap();
        assert_eq!(parsed.to_hex(), ABC_HEX);
    }

    #[test]
    fn test_incremental_matches_one_shot() {
        let mut h = Sha256Stream::new();
        h.update(b"a");
        h.update(b"b");
        h.update(b"c");
        assert_eq!(h.finalize(), sha256(b"abc"));
    }

    #[test]
    fn test_ct_eq() {
        let a = sha256(b"same");
        let b = sha256(b"same");
        let c = sha256(b"different");
        assert!(a.ct_eq(&b));
        assert!(!a.ct_eq(&c));
    }

    #[test]
    fn test_hash_file_streams() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        // larger than one chunk so the loop runs more than once
        let data = vec![0x5au8; HASH_CHUNK + 1234];
        tmp.write_all(&data).unwrap();
        tmp.flush().unwrap();

        assert_eq!(hash_file(tmp.path()).unwrap(), sha256(&data));
    }

    #[test]
    fn test_hash_file_missing() {
        let err = hash_file(Path::new("/nonexistent/pandora-test")).unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_display_is_hex() {
        let digest = sha256(b"");
        assert_eq!(format!("{digest}"), EMPTY_HEX);
    }
}
