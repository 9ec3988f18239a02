use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Mutex;
use std::time::Duration;
use unduper::{Action, Phase, ProgressReporter};

const TICKS: &str = "⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏";

/// CLI progress reporter using indicatif progress bars.
///
/// - Scan phase: spinner (unknown total files upfront)
/// - Hash phase: progress bar (total files known from scan)
/// - Execute phase: progress bar over planned actions
pub struct CliReporter {
    bar: Mutex<Option<ProgressBar>>,
}

impl CliReporter {
    pub fn new() -> Self {
        Self {
            bar: Mutex::new(None),
        }
    }

    fn set_bar(&self, pb: ProgressBar) {
        if let Ok(mut guard) = self.bar.lock() {
            if let Some(old) = guard.take() {
                old.finish_and_clear();
            }
            *guard = Some(pb);
        }
    }

    fn finish_bar(&self) {
        if let Ok(mut guard) = self.bar.lock() {
            if let Some(pb) = guard.take() {
                pb.finish_and_clear();
            }
        }
    }

    fn with_bar(&self, f: impl FnOnce(&ProgressBar)) {
        if let Ok(guard) = self.bar.lock() {
            if let Some(pb) = guard.as_ref() {
                f(pb);
            }
        }
    }

    fn spinner(&self, message: &'static str) {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_chars(TICKS),
        );
        pb.set_message(message);
        pb.enable_steady_tick(Duration::from_millis(80));
        self.set_bar(pb);
    }

    fn counter(&self, total: usize, template: &str) {
        let pb = ProgressBar::new(total as u64);
        pb.set_style(
            ProgressStyle::with_template(template)
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("━╸─")
                .tick_chars(TICKS),
        );
        pb.enable_steady_tick(Duration::from_millis(80));
        self.set_bar(pb);
    }
}

impl ProgressReporter for CliReporter {
    fn on_phase(&self, phase: Phase) {
        match phase {
            Phase::Scanning => self.spinner("Scanning files..."),
            Phase::Planning => self.spinner("Planning..."),
            Phase::DryRunWriting => self.spinner("Writing plan..."),
            Phase::Done | Phase::Failed => self.finish_bar(),
            Phase::Hashing | Phase::Executing => {}
        }
    }

    fn on_scan_complete(&self, total_files: usize, duration_secs: f64) {
        self.finish_bar();
        eprintln!(
            "  {} Scan complete: {} files in {:.2}s",
            "✓".green(),
            total_files,
            duration_secs
        );
    }

    fn on_hash_start(&self, total_files: usize) {
        self.counter(
            total_files,
            "  {spinner:.cyan} Hashing [{bar:30.cyan/dim}] {pos}/{len} files ({eta} remaining)",
        );
    }

    fn on_hash_progress(&self, files_hashed: usize, _total_files: usize) {
        self.with_bar(|pb| pb.set_position(files_hashed as u64));
    }

    fn on_hash_complete(&self, duration_secs: f64) {
        self.finish_bar();
        eprintln!("  {} Hash complete in {:.2}s", "✓".green(), duration_secs);
    }

    fn on_plan_complete(&self, actions: usize, duplicates: usize) {
        self.finish_bar();
        eprintln!(
            "  {} Plan complete: {} to retain, {} duplicates",
            "✓".green(),
            actions,
            duplicates
        );
        self.counter(
            actions,
            "  {spinner:.cyan} Applying [{bar:30.cyan/dim}] {pos}/{len} actions",
        );
    }

    fn on_action_applied(&self, index: usize, _total: usize, _action: &Action) {
        self.with_bar(|pb| pb.set_position(index as u64));
    }
}
