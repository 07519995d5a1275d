//! Local content fingerprints comparable to S3 ETags.
//!
//! S3 reports one of two ETag shapes for an object uploaded without
//! server-side encryption:
//!
//! - **Single PUT**: the hex MD5 of the body, e.g.
//!   `"5d41402abc4b2a76b9719d911017c592"`.
//! - **Multipart upload**: the hex MD5 of the concatenated *raw* MD5 digests
//!   of every part, suffixed with the part count, e.g.
//!   `"42248132da61be10812ed6f6878c87af-2"`.
//!
//! Whole-file hashing a multipart object never matches its ETag, so the
//! remote ETag decides which algorithm runs locally
//! ([`local_fingerprint`]). Multipart digests assume fixed-size parts of
//! [`MULTIPART_CHUNK_SIZE`] (configurable), which is what common upload
//! tools use.
//!
//! A zero-byte file split into parts has zero parts: its multipart digest is
//! the MD5 of nothing, `d41d8cd98f00b204e9800998ecf8427e-0`.
//!
//! Files are streamed; nothing here holds more than one part in memory.

use md5::{Digest, Md5};
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

/// Default multipart part size: 8 MiB.
pub const MULTIPART_CHUNK_SIZE: u64 = 8 * 1024 * 1024;

/// Strip the surrounding quotes S3 puts around ETags.
pub fn normalize_etag(etag: &str) -> &str {
    etag.trim().trim_matches('"')
}

/// Part count of a multipart ETag (`<hex>-<N>`), or `None` for a plain one.
pub fn multipart_part_count(etag: &str) -> Option<u64> {
    let (hash, count) = normalize_etag(etag).rsplit_once('-')?;
    if hash.is_empty() || count.is_empty() || !count.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    count.parse().ok()
}

/// Hex MD5 of everything `reader` yields.
pub fn md5_reader(mut reader: impl Read) -> io::Result<String> {
    let mut hasher = Md5::new();
    io::copy(&mut reader, &mut hasher)?;
    Ok(hex::encode(hasher.finalize()))
}

/// Hex MD5 of a file's contents.
pub fn md5_file(path: &Path) -> io::Result<String> {
    md5_reader(BufReader::new(File::open(path)?))
}

/// Multipart-style digest of everything `reader` yields, split into
/// `chunk_size` parts: `hex(md5(md5(part_1) ‖ … ‖ md5(part_k))) + "-" + k`.
pub fn multipart_reader(mut reader: impl Read, chunk_size: u64) -> io::Result<String> {
    if chunk_size == 0 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "multipart chunk size must be non-zero",
        ));
    }

    let mut part_digests = Vec::new();
    let mut parts = 0u64;
    let mut buffer = Vec::new();
    loop {
        buffer.clear();
        let read = reader.by_ref().take(chunk_size).read_to_end(&mut buffer)?;
        if read == 0 {
            break;
        }
        part_digests.extend_from_slice(&Md5::digest(&buffer));
        parts += 1;
    }

    let composite = Md5::digest(&part_digests);
    Ok(format!("{}-{}", hex::encode(composite), parts))
}

/// Multipart-style digest of a file.
pub fn multipart_file(path: &Path, chunk_size: u64) -> io::Result<String> {
    multipart_reader(File::open(path)?, chunk_size)
}

/// Compute the local fingerprint in the same shape as `remote_etag`.
pub fn local_fingerprint(path: &Path, remote_etag: &str, chunk_size: u64) -> io::Result<String> {
    if multipart_part_count(remote_etag).is_some() {
        multipart_file(path, chunk_size)
    } else {
        md5_file(path)
    }
}

/// Whether the file at `path` has the content `remote_etag` fingerprints.
pub fn matches_remote(path: &Path, remote_etag: &str, chunk_size: u64) -> io::Result<bool> {
    let local = local_fingerprint(path, remote_etag, chunk_size)?;
    Ok(local.eq_ignore_ascii_case(normalize_etag(remote_etag)))
}
