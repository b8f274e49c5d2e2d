//! Snapshot replay
//!
//! Rebuilds the document store from the post-images recorded in completed
//! transactions.
//!
//! # Replay Properties
//!
//! - **Last state wins**: transactions are visited newest first (by end
//!   time) and each subject is written once, from the newest post-image in
//!   the window. An older image never overwrites a newer one, deletions
//!   included.
//! - **Idempotent**: replaying the same window twice yields the same store.
//! - **Windowed**: `from`/`to` bound the transactions' end times, inclusive;
//!   either may be open.
//!
//! # Usage
//!
//! ```ignore
//! let stats = replay(&log, &store, None, None)?;
//! assert_eq!(stats.skipped, 0);
//! ```

use crate::log::TransactionLog;
use std::collections::HashSet;
use tracing::{debug, info};
use tripod_core::{DocumentStore, Result, SubjectId, Timestamp};

/// Counters reported by `replay`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayStats {
    /// Completed transactions inside the window
    pub transactions: usize,
    /// Descriptions written
    pub written: usize,
    /// Descriptions deleted
    pub deleted: usize,
    /// Post-images skipped because a newer one was already applied
    pub skipped: usize,
}

/// Replay completed transactions ending in `[from, to]` into `store`
pub fn replay(
    log: &dyn TransactionLog,
    store: &dyn DocumentStore,
    from: Option<Timestamp>,
    to: Option<Timestamp>,
) -> Result<ReplayStats> {
    let mut records = log.completed_between(from, to)?;
    records.sort_by(|a, b| {
        b.end_time
            .cmp(&a.end_time)
            .then_with(|| b.start_time.cmp(&a.start_time))
    });

    let mut stats = ReplayStats {
        transactions: records.len(),
        ..ReplayStats::default()
    };
    let mut resolved: HashSet<SubjectId> = HashSet::new();

    for record in &records {
        for snapshot in &record.new_bdds {
            if resolved.contains(&snapshot.id) {
                stats.skipped += 1;
                continue;
            }
            match &snapshot.document {
                Some(bdd) => {
                    store.put_bdd(bdd.clone())?;
                    stats.written += 1;
                }
                None => {
                    store.delete_bdd(&snapshot.id)?;
                    stats.deleted += 1;
                }
            }
            debug!(
                target: "tripod::replay",
                txn_id = %record.id,
                subject = %snapshot.id,
                deleted = snapshot.is_absent(),
                "Subject resolved"
            );
            resolved.insert(snapshot.id.clone());
        }
    }

    info!(
        target: "tripod::replay",
        transactions = stats.transactions,
        written = stats.written,
        deleted = stats.deleted,
        skipped = stats.skipped,
        "Replay finished"
    );
    Ok(stats)
}
