use crate::error::Error;
use crate::model::FileRecord;
use glob::Pattern;
use rayon::prelude::*;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, error, warn};
use walkdir::WalkDir;

#[derive(Debug, Clone)]
pub struct CrawlConfig {
    pub follow_symlinks: bool,
    /// Sort records by path relative to the root before handing them on.
    pub deterministic: bool,
    /// 1 walks serially; more walks sub-directories in parallel.
    pub workers: usize,
    pub ignore_patterns: Vec<String>,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            follow_symlinks: false,
            deterministic: true,
            workers: 1,
            ignore_patterns: Vec::new(),
        }
    }
}

/// Recursive walk over a root directory yielding regular files.
///
/// A crawler can be walked any number of times; every call to [`Crawler::walk`]
/// takes a fresh snapshot.
#[derive(Debug)]
pub struct Crawler {
    root: PathBuf,
    config: CrawlConfig,
    ignore: Vec<Pattern>,
}

impl Crawler {
    pub fn new(root: impl Into<PathBuf>, config: CrawlConfig) -> Result<Self, Error> {
        let root = root.into();
        if !root.is_dir() {
            return Err(Error::NotFound(root));
        }

        let ignore = config
            .ignore_patterns
            .iter()
            .filter_map(|glob| match Pattern::new(glob) {
                Ok(p) => Some(p),
                Err(e) => {
                    error!("Invalid glob pattern '{}': {}", glob, e);
                    None
                }
            })
            .collect();

        Ok(Self {
            root,
            config,
            ignore,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &CrawlConfig {
        &self.config
    }

    pub fn walk(&self) -> Result<Vec<FileRecord>, Error> {
        if !self.root.is_dir() {
            return Err(Error::NotFound(self.root.clone()));
        }

        let mut records = if self.config.workers > 1 {
            self.walk_parallel()?
        } else {
            self.walk_serial()?
        };

        if self.config.deterministic {
            let root = &self.root;
            records.sort_by(|a, b| {
                let ra = a.path.strip_prefix(root).unwrap_or(&a.path);
                let rb = b.path.strip_prefix(root).unwrap_or(&b.path);
                ra.cmp(rb)
            });
        }

        debug!("Crawled {} files under {}", records.len(), self.root.display());
        Ok(records)
    }

    fn is_ignored(&self, path: &Path) -> bool {
        self.ignore.iter().any(|pattern| pattern.matches_path(path))
    }

    fn walk_serial(&self) -> Result<Vec<FileRecord>, Error> {
        let mut records = Vec::new();
        let walker = WalkDir::new(&self.root)
            .follow_links(self.config.follow_symlinks)
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !self.is_ignored(e.path()));

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    if err.loop_ancestor().is_some() {
                        warn!("Skipping symlink loop: {}", err);
                        continue;
                    }
                    let path = err.path().map(Path::to_path_buf).unwrap_or_default();
                    let io_err: io::Error = err.into();
                    if io_err.kind() == io::ErrorKind::PermissionDenied {
                        error!("Access denied reading {}: {}", path.display(), io_err);
                        continue;
                    }
                    return Err(Error::io_at(&path, "walking", io_err));
                }
            };

            if !entry.file_type().is_file() {
                continue;
            }
            let metadata = entry
                .metadata()
                .map_err(|err| Error::io_at(entry.path(), "getting metadata for", err.into()))?;
            records.push(FileRecord::from_metadata(
                entry.path(),
                &metadata,
                entry.path_is_symlink(),
            ));
        }

        Ok(records)
    }

    fn walk_parallel(&self) -> Result<Vec<FileRecord>, Error> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.workers)
            .thread_name(|i| format!("unduper-crawl-{}", i))
            .build()
            .map_err(|e| Error::Io(io::Error::new(io::ErrorKind::Other, e)))?;

        pool.install(|| self.visit_dir(&self.root))
    }

    fn visit_dir(&self, dir: &Path) -> Result<Vec<FileRecord>, Error> {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::PermissionDenied => {
                error!("Access denied reading directory {}: {}", dir.display(), err);
                return Ok(Vec::new());
            }
            Err(err) => return Err(Error::io_at(dir, "reading directory", err)),
        };

        let nested: Vec<Vec<FileRecord>> = entries
            .par_bridge()
            .map(|entry_result| {
                let entry = entry_result
                    .map_err(|err| Error::io_at(dir, "reading entry in directory", err))?;
                let path = entry.path();
                if self.is_ignored(&path) {
                    return Ok(Vec::new());
                }

                let file_type = entry
                    .file_type()
                    .map_err(|err| Error::io_at(&path, "getting file type for", err))?;
                let is_symlink = file_type.is_symlink();
                if is_symlink && !self.config.follow_symlinks {
                    return Ok(Vec::new());
                }

                let metadata = match fs::metadata(&path) {
                    Ok(m) => m,
                    Err(err) if is_symlink && err.kind() == io::ErrorKind::NotFound => {
                        warn!("Skipping dangling symlink {}", path.display());
                        return Ok(Vec::new());
                    }
                    Err(err) => return Err(Error::io_at(&path, "getting metadata for", err)),
                };

                if metadata.is_dir() {
                    if is_symlink && self.links_to_ancestor(dir, &path)? {
                        warn!("Skipping symlink loop at {}", path.display());
                        return Ok(Vec::new());
                    }
                    self.visit_dir(&path)
                } else if metadata.is_file() {
                    Ok(vec![FileRecord::from_metadata(&path, &metadata, is_symlink)])
                } else {
                    Ok(Vec::new())
                }
            })
            .collect::<Result<_, Error>>()?;

        Ok(nested.into_iter().flatten().collect())
    }

    fn links_to_ancestor(&self, dir: &Path, link: &Path) -> Result<bool, Error> {
        let here = fs::canonicalize(dir).map_err(|err| Error::io_at(dir, "resolving", err))?;
        let target = fs::canonicalize(link).map_err(|err| Error::io_at(link, "resolving", err))?;
        Ok(here.starts_with(target))
    }
}
