//! Append-only action log.
//!
//! Each row pairs an [`Action`] with the [`ContentIdentity`] that justified
//! it. Rows are written as CSV so the file can be read by a human after a
//! partial run, and replayed by the engine to resume one.

use crate::identity::{ContentIdentity, Fingerprint, IdentityKey};
use crate::model::{Action, ActionKind, Transform};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fs::{self, File, OpenOptions};
use std::io::{self, ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryStatus {
    Planned,
    Applied,
}

#[derive(Debug, Serialize, Deserialize)]
struct JournalRow {
    recorded_at: String,
    status: EntryStatus,
    kind: ActionKind,
    transform: Transform,
    src: PathBuf,
    dst: Option<PathBuf>,
    flags: u64,
    size: u64,
    partial: Option<String>,
    full: Option<String>,
}

impl JournalRow {
    fn new(status: EntryStatus, action: &Action, identity: &ContentIdentity) -> Self {
        Self {
            recorded_at: chrono::Utc::now().to_rfc3339(),
            status,
            kind: action.kind,
            transform: action.transform,
            src: action.src.clone(),
            dst: action.dst.clone(),
            flags: action.flags,
            size: identity.size,
            partial: identity.partial.map(|f| f.to_hex()),
            full: identity.full.map(|f| f.to_hex()),
        }
    }

    fn into_entry(self) -> Result<JournalEntry, String> {
        let parse = |hex: Option<String>| -> Result<Option<Fingerprint>, String> {
            hex.filter(|h| !h.is_empty())
                .map(|h| h.parse::<Fingerprint>().map_err(|e| e.to_string()))
                .transpose()
        };
        let identity = ContentIdentity {
            size: self.size,
            partial: parse(self.partial)?,
            full: parse(self.full)?,
        };
        Ok(JournalEntry {
            recorded_at: self.recorded_at,
            status: self.status,
            action: Action {
                kind: self.kind,
                transform: self.transform,
                src: self.src,
                dst: self.dst,
                flags: self.flags,
            },
            identity,
        })
    }
}

#[derive(Debug, Clone)]
pub struct JournalEntry {
    pub recorded_at: String,
    pub status: EntryStatus,
    pub action: Action,
    pub identity: ContentIdentity,
}

/// What earlier runs already did, rebuilt from the journal.
#[derive(Debug, Default)]
pub struct JournalIndex {
    retained: HashMap<IdentityKey, PathBuf>,
    applied: HashMap<PathBuf, HashSet<IdentityKey>>,
    planned: usize,
    applied_rows: usize,
    skipped_rows: usize,
}

impl JournalIndex {
    fn record(&mut self, entry: JournalEntry) {
        match entry.status {
            EntryStatus::Planned => self.planned += 1,
            EntryStatus::Applied => {
                self.applied_rows += 1;
                if let Some(key) = entry.identity.key() {
                    let kept = entry.action.dst.clone().unwrap_or_else(|| entry.action.src.clone());
                    if matches!(entry.action.kind, ActionKind::Move | ActionKind::Copy) {
                        self.retained.entry(key).or_insert(kept);
                    }
                    self.applied.entry(entry.action.src).or_default().insert(key);
                }
            }
        }
    }

    /// True when an applied row exists for `src` with this same content.
    /// New content at a previously handled path is not applied.
    pub fn is_applied(&self, src: &Path, identity: &ContentIdentity) -> bool {
        match (self.applied.get(src), identity.key()) {
            (Some(keys), Some(key)) => keys.contains(&key),
            _ => false,
        }
    }

    /// Identities that an earlier run retained, with where they ended up.
    pub fn retained(&self) -> impl Iterator<Item = (&IdentityKey, &PathBuf)> {
        self.retained.iter()
    }

    pub fn planned_count(&self) -> usize {
        self.planned
    }

    pub fn applied_count(&self) -> usize {
        self.applied_rows
    }

    /// Rows that could not be read back (e.g. a line torn by a crash).
    pub fn skipped_rows(&self) -> usize {
        self.skipped_rows
    }

    pub fn is_empty(&self) -> bool {
        self.planned == 0 && self.applied_rows == 0
    }
}

/// Scoped journal handle.
///
/// The file is opened on the first append and flushed and closed when the
/// handle is closed or dropped, whichever happens first.
pub struct Journal {
    path: PathBuf,
    writer: Option<csv::Writer<File>>,
}

impl Journal {
    pub fn open(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        if path.is_dir() {
            return Err(io::Error::new(
                ErrorKind::InvalidInput,
                format!("Journal path {} is a directory", path.display()),
            ));
        }
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|err| {
                io::Error::new(
                    err.kind(),
                    format!("Error creating journal directory {}: {}", parent.display(), err),
                )
            })?;
        }
        debug!("Using journal {}", path.display());
        Ok(Self { path, writer: None })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn writer(&mut self) -> io::Result<&mut csv::Writer<File>> {
        if self.writer.is_none() {
            let mut file = OpenOptions::new()
                .create(true)
                .read(true)
                .append(true)
                .open(&self.path)
                .map_err(|err| {
                    io::Error::new(
                        err.kind(),
                        format!("Error opening journal {}: {}", self.path.display(), err),
                    )
                })?;
            terminate_torn_row(&mut file)?;
            self.writer = Some(
                csv::WriterBuilder::new()
                    .has_headers(false)
                    .from_writer(file),
            );
        }
        self.writer
            .as_mut()
            .ok_or_else(|| io::Error::new(ErrorKind::Other, "journal writer unavailable"))
    }

    /// Append one entry and push it to disk before returning.
    pub fn append(
        &mut self,
        status: EntryStatus,
        action: &Action,
        identity: &ContentIdentity,
    ) -> io::Result<()> {
        let row = JournalRow::new(status, action, identity);
        let writer = self.writer()?;
        writer.serialize(&row)?;
        writer.flush()?;
        writer.get_ref().sync_data()
    }

    /// Read back every entry, oldest first.
    pub fn entries(&self) -> io::Result<Vec<JournalEntry>> {
        let mut entries = Vec::new();
        self.read_rows(|entry| entries.push(entry))?;
        Ok(entries)
    }

    /// Rebuild the index of already-recorded actions. A missing journal file
    /// is an empty index.
    pub fn replay(&self) -> io::Result<JournalIndex> {
        let mut index = JournalIndex::default();
        let skipped = self.read_rows(|entry| index.record(entry))?;
        index.skipped_rows = skipped;
        debug!(
            "Replayed journal {}: {} planned, {} applied",
            self.path.display(),
            index.planned,
            index.applied_rows
        );
        Ok(index)
    }

    fn read_rows(&self, mut sink: impl FnMut(JournalEntry)) -> io::Result<usize> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(0),
            Err(err) => {
                return Err(io::Error::new(
                    err.kind(),
                    format!("Error reading journal {}: {}", self.path.display(), err),
                ))
            }
        };

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(file);

        let mut skipped = 0;
        for (line, row) in reader.deserialize::<JournalRow>().enumerate() {
            let entry = row
                .map_err(|e| e.to_string())
                .and_then(JournalRow::into_entry);
            match entry {
                Ok(entry) => sink(entry),
                Err(e) => {
                    warn!(
                        "Skipping unreadable journal row {} in {}: {}",
                        line + 1,
                        self.path.display(),
                        e
                    );
                    skipped += 1;
                }
            }
        }
        Ok(skipped)
    }

    pub fn close(mut self) -> io::Result<()> {
        match self.writer.take() {
            Some(mut writer) => writer.flush(),
            None => Ok(()),
        }
    }
}

/// A crash can leave the last row without its newline. Close it off so the
/// next append starts on a line of its own.
fn terminate_torn_row(file: &mut File) -> io::Result<()> {
    if file.metadata()?.len() == 0 {
        return Ok(());
    }
    let mut last = [0u8; 1];
    file.seek(SeekFrom::End(-1))?;
    file.read_exact(&mut last)?;
    if last[0] != b'\n' {
        warn!("Journal ends in a partial row; starting a new line");
        file.write_all(b"\n")?;
    }
    Ok(())
}

impl Drop for Journal {
    fn drop(&mut self) {
        if let Some(mut writer) = self.writer.take() {
            if let Err(e) = writer.flush() {
                warn!("Error flushing journal {}: {}", self.path.display(), e);
            }
        }
    }
}

impl std::fmt::Debug for Journal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Journal")
            .field("path", &self.path)
            .field("open", &self.writer.is_some())
            .finish()
    }
}
