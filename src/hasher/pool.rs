use super::ContentHasher;
use crate::error::Error;
use crate::identity::ContentIdentity;
use crate::model::FileRecord;
use crate::progress::ProgressReporter;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::OnceLock;
use std::thread;
use tracing::{debug, warn};

/// A crawled file and the result of hashing it.
#[derive(Debug)]
pub struct HashSlot {
    pub record: FileRecord,
    pub outcome: io::Result<ContentIdentity>,
}

/// `max(1, hardware_concurrency)`.
pub fn default_workers() -> usize {
    thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        .max(1)
}

/// Hash every record on `workers` threads.
///
/// Workers share one atomic cursor: each claims the next index, hashes that
/// file and writes the slot at the same index. Index ownership is disjoint,
/// so every slot is written exactly once and no lock is taken. All workers
/// are joined before any slot is read; the returned slots are in the same
/// order as `records`.
pub fn hash_all(
    records: Vec<FileRecord>,
    hasher: &ContentHasher,
    workers: usize,
    reporter: &dyn ProgressReporter,
) -> Result<Vec<HashSlot>, Error> {
    let total = records.len();
    let workers = workers.max(1).min(total.max(1));
    let slots: Vec<OnceLock<io::Result<ContentIdentity>>> =
        (0..total).map(|_| OnceLock::new()).collect();
    let cursor = AtomicUsize::new(0);
    let finished = AtomicUsize::new(0);

    debug!("Hashing {} files on {} workers", total, workers);

    let worker = || loop {
        let i = cursor.fetch_add(1, Ordering::Relaxed);
        if i >= total {
            break;
        }
        let outcome = hasher.hash(&records[i].path);
        if let Err(err) = &outcome {
            warn!("Hash failed for {}: {}", records[i].path.display(), err);
        }
        // The index was claimed by this worker alone, so the slot is empty.
        let _ = slots[i].set(outcome);
        let done = finished.fetch_add(1, Ordering::Relaxed) + 1;
        reporter.on_hash_progress(done, total);
    };

    thread::scope(|scope| -> io::Result<()> {
        let mut handles = Vec::with_capacity(workers);
        for id in 0..workers {
            let handle = thread::Builder::new()
                .name(format!("unduper-hash-{}", id))
                .spawn_scoped(scope, worker)?;
            handles.push(handle);
        }
        for handle in handles {
            if handle.join().is_err() {
                return Err(io::Error::new(io::ErrorKind::Other, "hash worker panicked"));
            }
        }
        Ok(())
    })?;

    Ok(records
        .into_iter()
        .zip(slots)
        .map(|(record, slot)| {
            let outcome = slot.into_inner().unwrap_or_else(|| {
                Err(io::Error::new(io::ErrorKind::Other, "file was never hashed"))
            });
            HashSlot { record, outcome }
        })
        .collect())
}

/// Check the slots in file-list order and stop at the first failure.
/// Nothing is returned unless every file has an identity.
pub fn into_identities(slots: Vec<HashSlot>) -> Result<Vec<(FileRecord, ContentIdentity)>, Error> {
    slots
        .into_iter()
        .map(|slot| match slot.outcome {
            Ok(identity) => Ok((slot.record, identity)),
            Err(source) => Err(Error::HashFailure {
                path: slot.record.path,
                source,
            }),
        })
        .collect()
}
