use super::Classifier;
use crate::error::Error;
use crate::identity::{ContentIdentity, IdentityKey};
use crate::model::{Action, ActionKind, FileRecord, Transform};
use glob::Pattern;
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::trace;

/// Retain the first file seen for each content identity; every later file
/// with the same identity is skipped and stays where it is.
///
/// Files without an identity are skipped too: without evidence there is
/// nothing to compare.
#[derive(Debug, Default)]
pub struct FirstSeenWins {
    seen: HashMap<IdentityKey, PathBuf>,
}

impl FirstSeenWins {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark an identity as already retained, e.g. by an earlier run.
    pub fn seed(&mut self, key: IdentityKey, retained: PathBuf) {
        self.seen.entry(key).or_insert(retained);
    }

    pub fn retained(&self, key: &IdentityKey) -> Option<&PathBuf> {
        self.seen.get(key)
    }

    pub fn distinct(&self) -> usize {
        self.seen.len()
    }
}

impl Classifier for FirstSeenWins {
    fn decide(&mut self, record: &FileRecord, identity: Option<&ContentIdentity>) -> Action {
        let Some(key) = identity.and_then(ContentIdentity::key) else {
            return Action::skip(&record.path);
        };

        match self.seen.get(&key) {
            Some(first) => {
                trace!(
                    "{} duplicates {}",
                    record.path.display(),
                    first.display()
                );
                Action::skip(&record.path)
            }
            None => {
                self.seen.insert(key, record.path.clone());
                Action::move_file(&record.path)
            }
        }
    }
}

/// Emits a fixed action for every file whose path matches one of the globs.
#[derive(Debug, Clone)]
pub struct GlobRule {
    patterns: Vec<Pattern>,
    kind: ActionKind,
    transform: Transform,
}

impl GlobRule {
    pub fn new(patterns: &[&str], kind: ActionKind, transform: Transform) -> Result<Self, Error> {
        let patterns = patterns
            .iter()
            .map(|p| {
                Pattern::new(p)
                    .map_err(|e| Error::Argument(format!("invalid glob pattern '{}': {}", p, e)))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            patterns,
            kind,
            transform,
        })
    }

    pub fn delete(patterns: &[&str]) -> Result<Self, Error> {
        Self::new(patterns, ActionKind::Delete, Transform::None)
    }

    pub fn copy(patterns: &[&str]) -> Result<Self, Error> {
        Self::new(patterns, ActionKind::Copy, Transform::None)
    }

    pub fn xor(patterns: &[&str]) -> Result<Self, Error> {
        Self::new(patterns, ActionKind::Transform, Transform::Xor)
    }

    fn matches(&self, record: &FileRecord) -> bool {
        self.patterns.iter().any(|p| p.matches_path(&record.path))
    }
}

impl Classifier for GlobRule {
    fn decide(&mut self, record: &FileRecord, _identity: Option<&ContentIdentity>) -> Action {
        if !self.matches(record) {
            return Action::skip(&record.path);
        }
        Action {
            transform: self.transform,
            ..Action::new(self.kind, &record.path)
        }
    }
}
