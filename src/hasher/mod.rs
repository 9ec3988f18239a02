pub mod digest;
pub mod pool;

pub use digest::HashAlgorithm;
pub use pool::{hash_all, HashSlot};

use crate::identity::ContentIdentity;
use digest::{stream_into, StreamDigest};
use std::fs::File;
use std::io::{self, Seek, SeekFrom};
use std::path::Path;
use tracing::trace;

pub const DEFAULT_CHUNK_SIZE: usize = 256 * 1024; // 256 KiB
pub const MIN_CHUNK_SIZE: usize = 4 * 1024;
pub const MAX_CHUNK_SIZE: usize = 4 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashMode {
    /// Every byte of the file.
    Full,
    /// The first and last `window` bytes plus the file size. Files no larger
    /// than two windows are read whole.
    Partial { window: u64 },
}

/// Turns "hash this path" into a [`ContentIdentity`] or an io error.
///
/// Reads go through a fixed-size buffer so memory use does not depend on
/// file size.
#[derive(Debug, Clone)]
pub struct ContentHasher {
    algorithm: HashAlgorithm,
    mode: HashMode,
    chunk_size: usize,
}

impl Default for ContentHasher {
    fn default() -> Self {
        Self::new(HashAlgorithm::default())
    }
}

impl ContentHasher {
    pub fn new(algorithm: HashAlgorithm) -> Self {
        Self {
            algorithm,
            mode: HashMode::Full,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    pub fn with_mode(mut self, mode: HashMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.clamp(MIN_CHUNK_SIZE, MAX_CHUNK_SIZE);
        self
    }

    pub fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    pub fn mode(&self) -> HashMode {
        self.mode
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn hash(&self, path: &Path) -> io::Result<ContentIdentity> {
        let mut file = File::open(path).map_err(|err| {
            io::Error::new(err.kind(), format!("Error opening {}: {}", path.display(), err))
        })?;
        let mut buf = vec![0u8; self.chunk_size];

        let identity = match self.mode {
            HashMode::Full => {
                let mut digest = StreamDigest::new(self.algorithm);
                let size = stream_into(&mut file, &mut digest, &mut buf, u64::MAX)?;
                ContentIdentity::full(size, digest.finish())
            }
            HashMode::Partial { window } => {
                let size = file.metadata()?.len();
                let mut digest = StreamDigest::new(self.algorithm);
                digest.update(&size.to_le_bytes());
                if size <= window.saturating_mul(2) {
                    stream_into(&mut file, &mut digest, &mut buf, size)?;
                } else {
                    stream_into(&mut file, &mut digest, &mut buf, window)?;
                    file.seek(SeekFrom::Start(size - window))?;
                    stream_into(&mut file, &mut digest, &mut buf, window)?;
                }
                ContentIdentity::partial(size, digest.finish())
            }
        };

        trace!(
            "Hashed {} ({} bytes): {}",
            path.display(),
            identity.size,
            identity.hex().unwrap_or_default()
        );
        Ok(identity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn identical_files_hash_identically() {
        let tmp = tempdir().unwrap();
        let a = tmp.path().join("a");
        let b = tmp.path().join("b");
        let data = vec![0x5Au8; 300 * 1024];
        fs::write(&a, &data).unwrap();
        fs::write(&b, &data).unwrap();

        let hasher = ContentHasher::default();
        let ia = hasher.hash(&a).unwrap();
        let ib = hasher.hash(&b).unwrap();
        assert_eq!(ia, ib);
        assert!(ia.has_full());
        assert!(!ia.has_partial());
        assert_eq!(ia.size, data.len() as u64);
    }

    #[test]
    fn last_byte_difference_is_detected() {
        let tmp = tempdir().unwrap();
        let mut data = vec![1u8; 70_000];
        fs::write(tmp.path().join("a"), &data).unwrap();
        *data.last_mut().unwrap() = 2;
        fs::write(tmp.path().join("b"), &data).unwrap();

        let hasher = ContentHasher::new(HashAlgorithm::Blake3).with_chunk_size(MIN_CHUNK_SIZE);
        let ia = hasher.hash(&tmp.path().join("a")).unwrap();
        let ib = hasher.hash(&tmp.path().join("b")).unwrap();
        assert_ne!(ia, ib);
    }

    #[test]
    fn chunk_size_does_not_affect_blake3() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("f");
        fs::write(&path, vec![9u8; 50_000]).unwrap();
        let small = ContentHasher::new(HashAlgorithm::Blake3).with_chunk_size(MIN_CHUNK_SIZE);
        let large = ContentHasher::new(HashAlgorithm::Blake3).with_chunk_size(MAX_CHUNK_SIZE);
        assert_eq!(small.hash(&path).unwrap(), large.hash(&path).unwrap());
    }

    #[test]
    fn chunk_size_is_clamped() {
        assert_eq!(ContentHasher::default().with_chunk_size(1).chunk_size(), MIN_CHUNK_SIZE);
        assert_eq!(
            ContentHasher::default().with_chunk_size(usize::MAX).chunk_size(),
            MAX_CHUNK_SIZE
        );
    }

    #[test]
    fn partial_mode_ignores_the_middle() {
        let tmp = tempdir().unwrap();
        let mut data = vec![0u8; 64 * 1024];
        fs::write(tmp.path().join("a"), &data).unwrap();
        data[32 * 1024] = 0xFF;
        fs::write(tmp.path().join("b"), &data).unwrap();

        let partial = ContentHasher::default().with_mode(HashMode::Partial { window: 4096 });
        let pa = partial.hash(&tmp.path().join("a")).unwrap();
        let pb = partial.hash(&tmp.path().join("b")).unwrap();
        assert!(pa.has_partial() && !pa.has_full());
        assert_eq!(pa, pb);

        let full = ContentHasher::default();
        let fa = full.hash(&tmp.path().join("a")).unwrap();
        assert_ne!(full.hash(&tmp.path().join("b")).unwrap(), fa);
        // a full and a partial identity are never comparable
        assert_ne!(fa, pa);
    }

    #[test]
    fn empty_file_has_an_identity() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("empty");
        fs::write(&path, b"").unwrap();
        let identity = ContentHasher::default().hash(&path).unwrap();
        assert_eq!(identity.size, 0);
        assert!(identity.key().is_some());
    }

    #[test]
    fn missing_file_is_an_error() {
        let tmp = tempdir().unwrap();
        let err = ContentHasher::default().hash(&tmp.path().join("nope")).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }
}
