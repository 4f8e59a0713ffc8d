// src/archive.rs

//! The `.pnd` package container.
//!
//! A flat archive of regular files and symlinks:
//!
//! ```text
//! offset  bytes   field
//!   0       8     magic "PNDARCH\x01"
//!   8       8     entry_count (u64 LE)
//!  16     varies  entry table
//!   …     varies  blobs, concatenated in table order
//! ```
//!
//! Each table entry is `u32 path_len, u64 blob_size, u64 blob_offset,
//! u32 flags`, followed by the stored path. `blob_offset` is absolute
//! from the start of the file but advisory: the writer produces
//! sequential offsets, and the reader recomputes positions from the
//! header and table sizes so a crafted offset cannot redirect reads.
//! Flag bit 0 marks a symlink whose blob is the link target bytes.
//!
//! Stored paths are untrusted. On unpack every path goes through
//! [`crate::paths::normalize`]; entries that fail are skipped (their
//! blob is still consumed to keep the stream aligned) so a hostile
//! archive cannot place anything outside the destination.

use crate::error::{Error, Result};
use crate::paths;
use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::os::unix::fs::symlink;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

const MAGIC: &[u8; 8] = b"PNDARCH\x01";
const HEADER_SIZE: u64 = 16;
const ENTRY_HDR_SIZE: u64 = 4 + 8 + 8 + 4;
const FLAG_SYMLINK: u32 = 0x1;
const COPY_CHUNK: usize = 64 * 1024;

/// One planned archive entry, carried through the pack pass instead of
/// module-level state.
#[derive(Debug)]
struct PackEntry {
    /// Archive-relative stored path.
    path: String,
    /// Absolute source path to read at streaming time.
    src: PathBuf,
    /// Size recorded in the table (bytes, or symlink target length).
    size: u64,
    flags: u32,
}

/// Pack `inputs` into a `.pnd` archive at `out`.
///
/// A file input is stored under its basename; a directory input
/// contributes every regular file and symlink beneath it, stored
/// relative to the directory, in a stable depth-first order. Device,
/// fifo, and socket nodes are skipped without failing. Returns the
/// number of entries written.
pub fn pack(out: &Path, inputs: &[PathBuf]) -> Result<u64> {
    let mut entries = Vec::new();
    for input in inputs {
        collect_input(input, &mut entries)?;
    }
    if entries.is_empty() {
        return Err(Error::InvalidInput("no files collected".to_string()));
    }

    let table_size: u64 = entries
        .iter()
        .map(|e| ENTRY_HDR_SIZE + e.path.len() as u64)
        .sum();
    let blob_start = HEADER_SIZE + table_size;

    let mut offsets = Vec::with_capacity(entries.len());
    let mut cur = blob_start;
    for e in &entries {
        offsets.push(cur);
        cur += e.size;
    }

    let file = File::create(out)?;
    let mut w = BufWriter::new(file);

    w.write_all(MAGIC)?;
    w.write_all(&(entries.len() as u64).to_le_bytes())?;

    for (e, off) in entries.iter().zip(&offsets) {
        w.write_all(&(e.path.len() as u32).to_le_bytes())?;
        w.write_all(&e.size.to_le_bytes())?;
        w.write_all(&off.to_le_bytes())?;
        w.write_all(&e.flags.to_le_bytes())?;
        w.write_all(e.path.as_bytes())?;
    }

    for e in &entries {
        if e.flags & FLAG_SYMLINK != 0 {
            let target = fs::read_link(&e.src)?;
            let bytes = target.as_os_str().as_encoded_bytes();
            if bytes.len() as u64 != e.size {
                warn!(
                    path = %e.path,
                    expected = e.size,
                    actual = bytes.len(),
                    "symlink target changed while packing"
                );
            }
            w.write_all(bytes)?;
        } else {
            let wrote = copy_file_contents(&e.src, &mut w)?;
            if wrote != e.size {
                warn!(
                    path = %e.path,
                    expected = e.size,
                    actual = wrote,
                    "file size changed while packing"
                );
            }
        }
    }

    w.flush()?;
    debug!(entries = entries.len(), archive = %out.display(), "packed archive");
    Ok(entries.len() as u64)
}

fn collect_input(input: &Path, entries: &mut Vec<PackEntry>) -> Result<()> {
    let meta = fs::symlink_metadata(input)?;

    if meta.file_type().is_file() || meta.file_type().is_symlink() {
        let name = input
            .file_name()
            .ok_or_else(|| Error::InvalidInput(format!("bad input path {}", input.display())))?
            .to_string_lossy()
            .into_owned();
        let src = absolutize(input)?;
        let (size, flags) = if meta.file_type().is_symlink() {
            let target = fs::read_link(&src)?;
            (target.as_os_str().len() as u64, FLAG_SYMLINK)
        } else {
            (meta.len(), 0)
        };
        entries.push(PackEntry {
            path: name,
            src,
            size,
            flags,
        });
        return Ok(());
    }

    // directory: store paths relative to its resolved root
    let base = input.canonicalize()?;
    for item in WalkDir::new(&base)
        .min_depth(1)
        .follow_links(false)
        .sort_by_file_name()
    {
        let item = item.map_err(|e| Error::Internal(format!("walk failed: {e}")))?;
        let ftype = item.file_type();
        let rel = item
            .path()
            .strip_prefix(&base)
            .map_err(|e| Error::Internal(format!("walk escaped base: {e}")))?
            .to_string_lossy()
            .into_owned();

        if ftype.is_symlink() {
            let target = fs::read_link(item.path())?;
            entries.push(PackEntry {
                path: rel,
                src: item.path().to_path_buf(),
                size: target.as_os_str().len() as u64,
                flags: FLAG_SYMLINK,
            });
        } else if ftype.is_file() {
            let meta = item
                .metadata()
                .map_err(|e| Error::Internal(format!("stat failed: {e}")))?;
            entries.push(PackEntry {
                path: rel,
                src: item.path().to_path_buf(),
                size: meta.len(),
                flags: 0,
            });
        }
        // directories are implied by their children; special nodes skipped
    }
    Ok(())
}

fn absolutize(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}

fn copy_file_contents<W: Write>(src: &Path, out: &mut W) -> Result<u64> {
    let mut f = File::open(src)?;
    let mut buf = vec![0u8; COPY_CHUNK];
    let mut total = 0u64;
    loop {
        let n = f.read(&mut buf)?;
        if n == 0 {
            break;
        }
        out.write_all(&buf[..n])?;
        total += n as u64;
    }
    Ok(total)
}

/// One parsed table entry; `path` is `None` when the stored path was
/// rejected by normalization.
#[derive(Debug)]
struct UnpackEntry {
    path: Option<String>,
    size: u64,
    flags: u32,
}

/// Unpack `archive` into `dest`, creating it if needed.
///
/// Writes a `.manifest` file in `dest` listing the accepted relative
/// paths, one per line, in table order, and returns them. Two unpacks
/// of the same archive into empty directories yield identical trees
/// and identical manifests.
pub fn unpack(archive: &Path, dest: &Path) -> Result<Vec<String>> {
    let file = File::open(archive)?;
    let file_len = file.metadata()?.len();
    let mut r = BufReader::new(file);

    let mut magic = [0u8; 8];
    r.read_exact(&mut magic)?;
    if &magic != MAGIC {
        return Err(Error::ParseFailed(format!(
            "{} is not a pnd archive",
            archive.display()
        )));
    }

    let entry_count = read_u64(&mut r)?;
    // the table alone needs this many bytes; reject before allocating
    if HEADER_SIZE.saturating_add(entry_count.saturating_mul(ENTRY_HDR_SIZE)) > file_len {
        return Err(Error::ParseFailed(format!(
            "entry count {entry_count} exceeds archive size"
        )));
    }

    let mut entries = Vec::with_capacity(entry_count as usize);
    let mut table_size = 0u64;
    for i in 0..entry_count {
        let path_len = read_u32(&mut r)?;
        let size = read_u64(&mut r)?;
        let _offset = read_u64(&mut r)?; // advisory, recomputed below
        let flags = read_u32(&mut r)?;
        table_size += ENTRY_HDR_SIZE + path_len as u64;

        let path = if path_len == 0 {
            None
        } else {
            let mut raw = vec![0u8; path_len as usize];
            r.read_exact(&mut raw)?;
            let raw = String::from_utf8_lossy(&raw).into_owned();
            match paths::normalize(&raw) {
                Ok(p) => Some(p),
                Err(e) => {
                    warn!(index = i, path = %raw, %e, "skipping invalid archive entry");
                    None
                }
            }
        };
        entries.push(UnpackEntry { path, size, flags });
    }

    fs::create_dir_all(dest)?;

    let blob_start = HEADER_SIZE + table_size;
    let mut accepted = Vec::new();
    let mut offset = blob_start;

    for entry in &entries {
        let Some(path) = &entry.path else {
            // keep the stream aligned past the skipped blob
            offset += entry.size;
            continue;
        };

        r.seek(SeekFrom::Start(offset))?;
        let out_path = dest.join(path);
        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent)?;
        }

        if entry.flags & FLAG_SYMLINK != 0 {
            let mut target = vec![0u8; entry.size as usize];
            r.read_exact(&mut target)?;
            let target = String::from_utf8_lossy(&target).into_owned();
            // replace an existing file or link, never descend into one
            match fs::symlink_metadata(&out_path) {
                Ok(_) => fs::remove_file(&out_path)?,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
            symlink(&target, &out_path)?;
        } else {
            let mut out = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&out_path)?;
            let mut remaining = entry.size;
            let mut buf = vec![0u8; COPY_CHUNK];
            while remaining > 0 {
                let chunk = remaining.min(COPY_CHUNK as u64) as usize;
                r.read_exact(&mut buf[..chunk])?;
                out.write_all(&buf[..chunk])?;
                remaining -= chunk as u64;
            }
        }

        offset += entry.size;
        accepted.push(path.clone());
    }

    let mut manifest = File::create(dest.join(".manifest"))?;
    for path in &accepted {
        writeln!(manifest, "{path}")?;
    }

    debug!(
        entries = accepted.len(),
        skipped = entries.len() - accepted.len(),
        dest = %dest.display(),
        "unpacked archive"
    );
    Ok(accepted)
}

fn read_u32<R: Read>(r: &mut R) -> Result<u32> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

fn read_u64<R: Read>(r: &mut R) -> Result<u64> {
    let mut buf = [0u8; 8];
    r.read_exact(&mut buf)?;
    Ok(u64::from_le_bytes(buf))
}
