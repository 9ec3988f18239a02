use crate::error::Error;
use crate::identity::Fingerprint;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// Pure `src -> dst` function. Must not touch the filesystem.
pub trait Mapper: Send + Sync {
    fn map(&self, src: &Path) -> Result<PathBuf, Error>;
}

impl<F> Mapper for F
where
    F: Fn(&Path) -> Result<PathBuf, Error> + Send + Sync,
{
    fn map(&self, src: &Path) -> Result<PathBuf, Error> {
        self(src)
    }
}

/// Mirrors a path's position under `src_root` beneath `dst_root`.
#[derive(Debug, Clone)]
pub struct MirrorMapper {
    src_root: PathBuf,
    dst_root: PathBuf,
}

impl MirrorMapper {
    pub fn new(src_root: impl Into<PathBuf>, dst_root: impl Into<PathBuf>) -> Self {
        Self {
            src_root: src_root.into(),
            dst_root: dst_root.into(),
        }
    }
}

impl Mapper for MirrorMapper {
    fn map(&self, src: &Path) -> Result<PathBuf, Error> {
        let rel = src.strip_prefix(&self.src_root).map_err(|_| {
            Error::Argument(format!(
                "{} is not under {}",
                src.display(),
                self.src_root.display()
            ))
        })?;
        Ok(self.dst_root.join(rel))
    }
}

/// `dir/name` becomes `dir/<fingerprint hex>-name`.
pub fn fingerprint_prefixed(target: &Path, fingerprint: &Fingerprint) -> PathBuf {
    let mut renamed = OsString::from(format!("{}-", fingerprint.to_hex()));
    if let Some(name) = target.file_name() {
        renamed.push(name);
    }
    match target.parent() {
        Some(parent) => parent.join(renamed),
        None => PathBuf::from(renamed),
    }
}
