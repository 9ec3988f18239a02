use crate::classify::{fingerprint_prefixed, Chain, Classifier, FirstSeenWins, MirrorMapper};
use crate::config::AppConfig;
use crate::error::Error;
use crate::executor::Executor;
use crate::hasher::{self, pool, ContentHasher};
use crate::identity::ContentIdentity;
use crate::journal::{EntryStatus, Journal, JournalIndex};
use crate::model::{Action, FileRecord, FLAG_COLLISION_RENAMED};
use crate::plan;
use crate::progress::ProgressReporter;
use crate::scanner::{CrawlConfig, Crawler};
use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Scanning,
    Hashing,
    Planning,
    DryRunWriting,
    Executing,
    Done,
    Failed,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Scanning => "scanning",
            Phase::Hashing => "hashing",
            Phase::Planning => "planning",
            Phase::DryRunWriting => "writing plan",
            Phase::Executing => "executing",
            Phase::Done => "done",
            Phase::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Result of the Scanning phase: validated roots and the crawl snapshot.
#[derive(Debug, Clone)]
pub struct Scan {
    pub src_root: PathBuf,
    pub dst_root: PathBuf,
    pub records: Vec<FileRecord>,
    pub duration: Duration,
}

#[derive(Debug, Default)]
pub struct DedupOutcome {
    /// Planned actions in plan order. Already applied unless `dry_run`.
    pub actions: Vec<Action>,
    pub plan_file: Option<PathBuf>,
    pub dry_run: bool,
    pub files_scanned: usize,
    /// Files the chain decided to leave alone, i.e. duplicates.
    pub duplicates: usize,
    /// Files skipped because the journal shows them already applied.
    pub resumed: usize,
    pub renamed: usize,
    pub bytes_retained: u64,
    pub scan_duration: Duration,
    pub hash_duration: Duration,
    pub plan_duration: Duration,
    pub apply_duration: Duration,
}

/// Moves one copy of every distinct file content from `src` into `dst`,
/// mirroring the relative layout, and leaves the duplicates where they are.
///
/// The pipeline runs `Scanning -> Hashing -> Planning -> DryRunWriting |
/// Executing -> Done`. Hashing is parallel and fully joined before
/// planning starts; everything else runs on the calling thread. Any hash
/// failure aborts the run before the filesystem is touched. Execution stops
/// at the first failing action and does not roll back the ones before it.
pub struct DedupEngine {
    src: PathBuf,
    dst: PathBuf,
    config: AppConfig,
    dry_run: bool,
    plan_dir: Option<PathBuf>,
    journal_path: Option<PathBuf>,
    classifiers: Vec<Box<dyn Classifier>>,
    executor: Executor,
}

impl DedupEngine {
    pub fn new(src: impl Into<PathBuf>, dst: impl Into<PathBuf>) -> Self {
        Self {
            src: src.into(),
            dst: dst.into(),
            config: AppConfig::default(),
            dry_run: true,
            plan_dir: None,
            journal_path: None,
            classifiers: Vec::new(),
            executor: Executor::new(),
        }
    }

    pub fn with_config(mut self, config: AppConfig) -> Self {
        if self.journal_path.is_none() {
            self.journal_path = config.journal_path.clone();
        }
        self.config = config;
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn with_plan_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.plan_dir = Some(dir.into());
        self
    }

    pub fn with_journal(mut self, path: impl Into<PathBuf>) -> Self {
        self.journal_path = Some(path.into());
        self
    }

    /// Consulted, in order, before the built-in first-seen-wins rule.
    pub fn with_classifier(mut self, classifier: impl Classifier + 'static) -> Self {
        self.classifiers.push(Box::new(classifier));
        self
    }

    pub fn with_xor_key(mut self, key: impl Into<Vec<u8>>) -> Self {
        self.executor = self.executor.with_xor_key(key);
        self
    }

    pub fn run(self, reporter: &dyn ProgressReporter) -> Result<DedupOutcome, Error> {
        let scan = match self.scan(reporter) {
            Ok(scan) => scan,
            Err(err) => {
                fail(Phase::Scanning, &err, reporter);
                return Err(err);
            }
        };
        self.process(scan, reporter)
    }

    /// Validate the arguments, make sure the destination exists and crawl
    /// the source.
    pub fn scan(&self, reporter: &dyn ProgressReporter) -> Result<Scan, Error> {
        enter(Phase::Scanning, reporter);
        let start = Instant::now();

        if self.src.as_os_str().is_empty() {
            return Err(Error::Argument("source path is empty".to_string()));
        }
        if self.dst.as_os_str().is_empty() {
            return Err(Error::Argument("destination path is empty".to_string()));
        }
        if !self.src.is_dir() {
            return Err(Error::NotFound(self.src.clone()));
        }

        let src_root = fs::canonicalize(&self.src)
            .map_err(|err| Error::io_at(&self.src, "resolving", err))?;
        let dst_root = resolve_destination(&self.dst)?;
        if dst_root.starts_with(&src_root) {
            return Err(Error::Argument(format!(
                "destination {} must not be inside source {}",
                dst_root.display(),
                src_root.display()
            )));
        }

        if !dst_root.exists() {
            info!("Creating destination {}", dst_root.display());
        }
        fs::create_dir_all(&dst_root)
            .map_err(|err| Error::io_at(&dst_root, "creating destination", err))?;

        let crawler = Crawler::new(
            &src_root,
            CrawlConfig {
                follow_symlinks: self.config.follow_symlinks,
                deterministic: self.config.deterministic,
                workers: self.config.crawl_workers,
                ignore_patterns: self.config.ignore_patterns.clone(),
            },
        )?;
        if !self.config.deterministic {
            warn!("Deterministic ordering is off; first-seen-wins follows raw directory order");
        }
        let records = crawler.walk()?;
        let duration = start.elapsed();

        info!("Found {} files under {}", records.len(), src_root.display());
        reporter.on_scan_complete(records.len(), duration.as_secs_f64());

        Ok(Scan {
            src_root,
            dst_root,
            records,
            duration,
        })
    }

    /// Everything after Scanning: hash, plan, then write the plan or apply it.
    pub fn process(
        self,
        scan: Scan,
        reporter: &dyn ProgressReporter,
    ) -> Result<DedupOutcome, Error> {
        let mut phase = Phase::Hashing;
        let result = self.process_inner(scan, reporter, &mut phase);
        match &result {
            Ok(_) => enter(Phase::Done, reporter),
            Err(err) => fail(phase, err, reporter),
        }
        result
    }

    fn process_inner(
        self,
        scan: Scan,
        reporter: &dyn ProgressReporter,
        phase: &mut Phase,
    ) -> Result<DedupOutcome, Error> {
        let mut outcome = DedupOutcome {
            dry_run: self.dry_run,
            files_scanned: scan.records.len(),
            scan_duration: scan.duration,
            ..DedupOutcome::default()
        };

        if scan.records.is_empty() {
            info!("Nothing to do: {} is empty", scan.src_root.display());
            return Ok(outcome);
        }

        // Hashing
        *phase = Phase::Hashing;
        enter(Phase::Hashing, reporter);
        let hash_start = Instant::now();
        let hasher = ContentHasher::new(self.config.hash_algorithm)
            .with_chunk_size(self.config.chunk_size);
        let workers = match self.config.hash_workers {
            0 => pool::default_workers(),
            n => n,
        };
        reporter.on_hash_start(scan.records.len());
        let slots = hasher::hash_all(scan.records, &hasher, workers, reporter)?;
        outcome.hash_duration = hash_start.elapsed();
        reporter.on_hash_complete(outcome.hash_duration.as_secs_f64());
        debug!(
            "Hash completed in {:.2}s",
            outcome.hash_duration.as_secs_f64()
        );

        // Planning
        *phase = Phase::Planning;
        enter(Phase::Planning, reporter);
        let plan_start = Instant::now();
        let hashed = pool::into_identities(slots)?;

        let mut journal = self
            .journal_path
            .as_ref()
            .map(Journal::open)
            .transpose()?;
        let index = match &journal {
            Some(j) => Some(j.replay()?),
            None => None,
        };

        let planned = plan_actions(
            hashed,
            self.classifiers,
            &scan.src_root,
            &scan.dst_root,
            index.as_ref(),
            &mut outcome,
        )?;
        self.executor.check(planned.iter().map(|(action, _)| action))?;
        outcome.plan_duration = plan_start.elapsed();
        reporter.on_plan_complete(planned.len(), outcome.duplicates);
        info!(
            "{} files to retain, {} duplicates left in place",
            planned.len(),
            outcome.duplicates
        );

        if self.dry_run {
            *phase = Phase::DryRunWriting;
            enter(Phase::DryRunWriting, reporter);
            let actions: Vec<Action> = planned.iter().map(|(a, _)| a.clone()).collect();
            let plan_dir = self.plan_dir.clone().unwrap_or_else(|| self.config.plan_dir());
            outcome.plan_file = Some(plan::write_plan(&plan_dir, &actions)?);
            if let Some(journal) = journal.as_mut() {
                for (action, identity) in &planned {
                    journal.append(EntryStatus::Planned, action, identity)?;
                }
            }
            outcome.actions = actions;
        } else {
            *phase = Phase::Executing;
            enter(Phase::Executing, reporter);
            let apply_start = Instant::now();
            let total = planned.len();
            for (i, (action, identity)) in planned.iter().enumerate() {
                self.executor.apply(action).map_err(|err| {
                    error!(
                        "Stopped after {} of {} actions; earlier actions stay applied",
                        i, total
                    );
                    err
                })?;
                if let Some(journal) = journal.as_mut() {
                    journal.append(EntryStatus::Applied, action, identity)?;
                }
                reporter.on_action_applied(i + 1, total, action);
            }
            outcome.apply_duration = apply_start.elapsed();
            debug!(
                "Applied {} actions in {:.2}s",
                total,
                outcome.apply_duration.as_secs_f64()
            );
            outcome.actions = planned.into_iter().map(|(a, _)| a).collect();
        }

        if let Some(journal) = journal {
            journal.close()?;
        }
        Ok(outcome)
    }
}

impl fmt::Debug for DedupEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DedupEngine")
            .field("src", &self.src)
            .field("dst", &self.dst)
            .field("dry_run", &self.dry_run)
            .field("plan_dir", &self.plan_dir)
            .field("journal_path", &self.journal_path)
            .field("classifiers", &self.classifiers.len())
            .finish()
    }
}

fn enter(phase: Phase, reporter: &dyn ProgressReporter) {
    debug!("Entering phase: {}", phase);
    reporter.on_phase(phase);
}

fn fail(phase: Phase, err: &Error, reporter: &dyn ProgressReporter) {
    error!("Dedup failed while {}: {}", phase, err);
    reporter.on_phase(Phase::Failed);
}

/// Single-threaded, in file-list order. The chain is the caller's
/// classifiers followed by first-seen-wins; the mapper mirrors `src_root`
/// under `dst_root`.
fn plan_actions(
    hashed: Vec<(FileRecord, ContentIdentity)>,
    classifiers: Vec<Box<dyn Classifier>>,
    src_root: &Path,
    dst_root: &Path,
    index: Option<&JournalIndex>,
    outcome: &mut DedupOutcome,
) -> Result<Vec<(Action, ContentIdentity)>, Error> {
    let mut first_seen = FirstSeenWins::new();
    if let Some(index) = index {
        for (key, retained) in index.retained() {
            first_seen.seed(*key, retained.clone());
        }
    }

    let mut chain = Chain::new();
    for classifier in classifiers {
        chain.push(classifier);
    }
    chain.push(Box::new(first_seen));
    let mapper = MirrorMapper::new(src_root, dst_root);

    let mut claimed: HashSet<PathBuf> = HashSet::new();
    let mut planned = Vec::new();

    for (record, identity) in hashed {
        if index.is_some_and(|i| i.is_applied(&record.path, &identity)) {
            debug!("Already applied in journal: {}", record.path.display());
            outcome.resumed += 1;
            continue;
        }

        let mut action = chain.resolve(&mapper, &record, Some(&identity))?;
        if action.is_skip() {
            outcome.duplicates += 1;
            continue;
        }

        if let Some(natural) = action.dst.take() {
            let (target, renamed) = place(natural, &identity, &claimed)?;
            if renamed {
                outcome.renamed += 1;
                action.flags |= FLAG_COLLISION_RENAMED;
            }
            claimed.insert(target.clone());
            action.dst = Some(target);
            outcome.bytes_retained += identity.size;
        }

        planned.push((action, identity));
    }

    Ok(planned)
}

/// Pick the destination: the natural one if free, otherwise the same name
/// prefixed with the content fingerprint.
fn place(
    natural: PathBuf,
    identity: &ContentIdentity,
    claimed: &HashSet<PathBuf>,
) -> Result<(PathBuf, bool), Error> {
    let occupied = |p: &Path| claimed.contains(p) || fs::symlink_metadata(p).is_ok();

    if !occupied(&natural) {
        return Ok((natural, false));
    }

    let fingerprint = identity.fingerprint().ok_or_else(|| {
        Error::Argument(format!(
            "{} is taken and there is no fingerprint to rename with",
            natural.display()
        ))
    })?;
    let renamed = fingerprint_prefixed(&natural, &fingerprint);
    if occupied(&renamed) {
        return Err(Error::Io(io::Error::new(
            io::ErrorKind::AlreadyExists,
            format!(
                "Both {} and {} are already taken",
                natural.display(),
                renamed.display()
            ),
        )));
    }
    debug!("{} is taken, using {}", natural.display(), renamed.display());
    Ok((renamed, true))
}

/// Absolute, symlink-free form of a destination that may not exist yet:
/// `.` and `..` are folded lexically, then the deepest existing ancestor is
/// canonicalized and the missing tail appended.
fn resolve_destination(dst: &Path) -> Result<PathBuf, Error> {
    let absolute = if dst.is_absolute() {
        dst.to_path_buf()
    } else {
        std::env::current_dir()?.join(dst)
    };

    let mut lexical = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::ParentDir => {
                lexical.pop();
            }
            Component::CurDir => {}
            other => lexical.push(other.as_os_str()),
        }
    }

    let mut existing = lexical.as_path();
    let mut rest: Vec<&std::ffi::OsStr> = Vec::new();
    while !existing.exists() {
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                rest.push(name);
                existing = parent;
            }
            _ => break,
        }
    }

    let mut resolved = fs::canonicalize(existing)
        .map_err(|err| Error::io_at(existing, "resolving", err))?;
    for name in rest.into_iter().rev() {
        resolved.push(name);
    }
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::Fingerprint;
    use crate::progress::SilentReporter;
    use tempfile::tempdir;

    #[test]
    fn empty_arguments_are_rejected() {
        let err = DedupEngine::new("", "/tmp/x").scan(&SilentReporter).unwrap_err();
        assert!(matches!(err, Error::Argument(_)));

        let tmp = tempdir().unwrap();
        let err = DedupEngine::new(tmp.path(), "").scan(&SilentReporter).unwrap_err();
        assert!(matches!(err, Error::Argument(_)));
    }

    #[test]
    fn missing_source_is_not_found() {
        let tmp = tempdir().unwrap();
        let err = DedupEngine::new(tmp.path().join("nope"), tmp.path().join("dst"))
            .run(&SilentReporter)
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
        assert!(!tmp.path().join("dst").exists());
    }

    #[test]
    fn destination_inside_source_is_rejected_before_creation() {
        let tmp = tempdir().unwrap();
        let dst = tmp.path().join("inner/dst");
        let err = DedupEngine::new(tmp.path(), &dst).scan(&SilentReporter).unwrap_err();
        assert!(matches!(err, Error::Argument(_)));
        assert!(!dst.exists());
    }

    #[test]
    fn scan_creates_destination() {
        let tmp = tempdir().unwrap();
        let src = tmp.path().join("src");
        fs::create_dir_all(&src).unwrap();
        fs::write(src.join("a"), "a").unwrap();
        let scan = DedupEngine::new(&src, tmp.path().join("d1/d2"))
            .scan(&SilentReporter)
            .unwrap();
        assert!(scan.dst_root.is_dir());
        assert_eq!(scan.records.len(), 1);
        assert!(scan.src_root.is_absolute());
    }

    #[test]
    fn resolve_destination_handles_missing_tail() {
        let tmp = tempdir().unwrap();
        let base = fs::canonicalize(tmp.path()).unwrap();
        let resolved = resolve_destination(&tmp.path().join("x/../y/z")).unwrap();
        assert_eq!(resolved, base.join("y/z"));
    }

    #[test]
    fn place_prefers_natural_then_prefixed() {
        let tmp = tempdir().unwrap();
        let identity = ContentIdentity::full(2, Fingerprint([0x11; 16]));
        let natural = tmp.path().join("a.txt");

        let (target, renamed) = place(natural.clone(), &identity, &HashSet::new()).unwrap();
        assert_eq!(target, natural);
        assert!(!renamed);

        fs::write(&natural, "taken").unwrap();
        let (target, renamed) = place(natural.clone(), &identity, &HashSet::new()).unwrap();
        assert!(renamed);
        assert_eq!(
            target.file_name().unwrap().to_string_lossy(),
            format!("{}-a.txt", "11".repeat(16))
        );

        let claimed: HashSet<PathBuf> = [target.clone()].into_iter().collect();
        assert!(place(natural, &identity, &claimed).is_err());
    }
}
