use crate::identity::{Fingerprint, FINGERPRINT_LEN};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::Hasher as _;
use std::io::{self, Read};
use twox_hash::xxh3::HasherExt;
use twox_hash::Xxh3Hash128;

/// Streaming hash primitive selectable from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    /// XXH3 128-bit, stored little-endian (low word first).
    #[default]
    Xxh3,
    /// BLAKE3 truncated to its first 16 bytes.
    Blake3,
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HashAlgorithm::Xxh3 => f.write_str("xxh3"),
            HashAlgorithm::Blake3 => f.write_str("blake3"),
        }
    }
}

/// Incremental update/digest state for one file.
pub enum StreamDigest {
    Xxh3(Xxh3Hash128),
    Blake3(Box<blake3::Hasher>),
}

impl StreamDigest {
    pub fn new(algorithm: HashAlgorithm) -> Self {
        match algorithm {
            HashAlgorithm::Xxh3 => StreamDigest::Xxh3(Xxh3Hash128::with_seed(0)),
            HashAlgorithm::Blake3 => StreamDigest::Blake3(Box::new(blake3::Hasher::new())),
        }
    }

    pub fn update(&mut self, data: &[u8]) {
        match self {
            StreamDigest::Xxh3(h) => h.write(data),
            StreamDigest::Blake3(h) => {
                h.update(data);
            }
        }
    }

    pub fn finish(self) -> Fingerprint {
        match self {
            StreamDigest::Xxh3(h) => Fingerprint::from_u128_le(h.finish_ext()),
            StreamDigest::Blake3(h) => {
                let digest = h.finalize();
                let mut out = [0u8; FINGERPRINT_LEN];
                out.copy_from_slice(&digest.as_bytes()[..FINGERPRINT_LEN]);
                Fingerprint(out)
            }
        }
    }
}

/// Fill `buf` as far as the reader allows. Returns the number of bytes read,
/// which is only short of `buf.len()` at end of file. Keeping chunk
/// boundaries fixed makes the update sequence identical for identical bytes.
pub fn read_chunk<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Stream at most `limit` bytes from `reader` into `digest` through `buf`.
/// Returns how many bytes were consumed.
pub fn stream_into<R: Read>(
    reader: &mut R,
    digest: &mut StreamDigest,
    buf: &mut [u8],
    limit: u64,
) -> io::Result<u64> {
    let mut consumed = 0u64;
    while consumed < limit {
        let want = (limit - consumed).min(buf.len() as u64) as usize;
        let n = read_chunk(reader, &mut buf[..want])?;
        if n == 0 {
            break;
        }
        digest.update(&buf[..n]);
        consumed += n as u64;
    }
    Ok(consumed)
}
