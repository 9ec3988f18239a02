pub mod classify;
pub mod config;
pub mod engine;
pub mod error;
pub mod executor;
pub mod hasher;
pub mod identity;
pub mod journal;
pub mod model;
pub mod plan;
pub mod progress;
pub mod scanner;

pub use config::AppConfig;
pub use engine::{DedupEngine, DedupOutcome, Phase, Scan};
pub use error::Error;
pub use hasher::{ContentHasher, HashAlgorithm, HashMode};
pub use identity::{ContentIdentity, Fingerprint};
pub use journal::{Journal, JournalIndex};
pub use model::{Action, ActionKind, FileRecord, Transform};
pub use progress::{ProgressReporter, SilentReporter};
