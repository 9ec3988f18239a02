use crate::engine::Phase;
use crate::model::Action;

/// Trait for reporting dedup progress.
///
/// The CLI implements it with indicatif bars; tests use [`SilentReporter`].
/// All methods have default no-op implementations and may be called from
/// hashing worker threads.
pub trait ProgressReporter: Send + Sync {
    fn on_phase(&self, _phase: Phase) {}
    fn on_scan_complete(&self, _total_files: usize, _duration_secs: f64) {}
    fn on_hash_start(&self, _total_files: usize) {}
    fn on_hash_progress(&self, _files_hashed: usize, _total_files: usize) {}
    fn on_hash_complete(&self, _duration_secs: f64) {}
    fn on_plan_complete(&self, _actions: usize, _duplicates: usize) {}
    fn on_action_applied(&self, _index: usize, _total: usize, _action: &Action) {}
}

/// No-op progress reporter for silent operation.
pub struct SilentReporter;

impl ProgressReporter for SilentReporter {}
