//! Pluggable per-file decisions.
//!
//! A [`Classifier`] looks at a crawled file (and its content identity, when
//! one has been computed) and returns an [`Action`]. A [`Chain`] asks its
//! classifiers in registration order and stops at the first one that returns
//! anything other than `skip`. When the winning action needs a destination the
//! classifier did not pick, a [`Mapper`] computes one.

pub mod mapper;
pub mod rules;

pub use mapper::{fingerprint_prefixed, Mapper, MirrorMapper};
pub use rules::{FirstSeenWins, GlobRule};

use crate::error::Error;
use crate::identity::ContentIdentity;
use crate::model::{Action, FileRecord};

pub trait Classifier: Send {
    fn decide(&mut self, record: &FileRecord, identity: Option<&ContentIdentity>) -> Action;
}

impl<F> Classifier for F
where
    F: FnMut(&FileRecord, Option<&ContentIdentity>) -> Action + Send,
{
    fn decide(&mut self, record: &FileRecord, identity: Option<&ContentIdentity>) -> Action {
        self(record, identity)
    }
}

#[derive(Default)]
pub struct Chain {
    classifiers: Vec<Box<dyn Classifier>>,
}

impl Chain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, classifier: impl Classifier + 'static) -> Self {
        self.push(Box::new(classifier));
        self
    }

    pub fn push(&mut self, classifier: Box<dyn Classifier>) {
        self.classifiers.push(classifier);
    }

    pub fn len(&self) -> usize {
        self.classifiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classifiers.is_empty()
    }

    /// First non-skip decision wins; later classifiers are not consulted.
    pub fn decide(&mut self, record: &FileRecord, identity: Option<&ContentIdentity>) -> Action {
        for classifier in self.classifiers.iter_mut() {
            let action = classifier.decide(record, identity);
            if !action.is_skip() {
                return action;
            }
        }
        Action::skip(&record.path)
    }

    /// [`Chain::decide`] followed by mapping, when the action asks for it.
    pub fn resolve(
        &mut self,
        mapper: &dyn Mapper,
        record: &FileRecord,
        identity: Option<&ContentIdentity>,
    ) -> Result<Action, Error> {
        let mut action = self.decide(record, identity);
        if action.wants_mapping() {
            action.dst = Some(mapper.map(&action.src)?);
        }
        Ok(action)
    }
}

impl std::fmt::Debug for Chain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Chain")
            .field("classifiers", &self.classifiers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ActionKind;
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn record(path: &str) -> FileRecord {
        FileRecord {
            path: PathBuf::from(path),
            size: 1,
            mtime: 0,
            is_regular: true,
            is_symlink: false,
        }
    }

    #[test]
    fn empty_chain_skips() {
        let mut chain = Chain::new();
        assert!(chain.is_empty());
        let action = chain.decide(&record("/src/a"), None);
        assert_eq!(action.kind, ActionKind::Skip);
        assert_eq!(action.src, PathBuf::from("/src/a"));
    }

    #[test]
    fn first_non_skip_wins_and_short_circuits() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);

        let mut chain = Chain::new()
            .with(|r: &FileRecord, _: Option<&ContentIdentity>| Action::skip(&r.path))
            .with(|r: &FileRecord, _: Option<&ContentIdentity>| Action::delete(&r.path))
            .with(move |r: &FileRecord, _: Option<&ContentIdentity>| {
                counter.fetch_add(1, Ordering::SeqCst);
                Action::move_file(&r.path)
            });
        assert_eq!(chain.len(), 3);

        let action = chain.decide(&record("/src/a"), None);
        assert_eq!(action.kind, ActionKind::Delete);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn resolve_maps_only_when_needed() {
        let mapper = |src: &Path| -> Result<PathBuf, Error> {
            Ok(PathBuf::from("/dst").join(src.file_name().unwrap()))
        };

        let mut movers = Chain::new()
            .with(|r: &FileRecord, _: Option<&ContentIdentity>| Action::move_file(&r.path));
        let action = movers.resolve(&mapper, &record("/src/a"), None).unwrap();
        assert_eq!(action.dst, Some(PathBuf::from("/dst/a")));

        let mut pinned = Chain::new().with(|r: &FileRecord, _: Option<&ContentIdentity>| {
            Action::copy_file(&r.path).with_dst("/elsewhere/a")
        });
        let action = pinned.resolve(&mapper, &record("/src/a"), None).unwrap();
        assert_eq!(action.dst, Some(PathBuf::from("/elsewhere/a")));

        let mut deleters = Chain::new()
            .with(|r: &FileRecord, _: Option<&ContentIdentity>| Action::delete(&r.path));
        let action = deleters.resolve(&mapper, &record("/src/a"), None).unwrap();
        assert_eq!(action.dst, None);
    }
}
