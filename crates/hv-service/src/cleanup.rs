//! Background sweep of unconfirmed notes and expired deposit sessions.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::db::{unix_now, Db, DbError};
use crate::memstore::SessionStore;

pub const SWEEP_BATCH_SIZE: usize = 256;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub promoted: usize,
    pub discarded: usize,
    pub retained: usize,
}

/// Resolve unconfirmed notes whose fate is now known.
///
/// A note whose commitment has since appeared in `txns` made it on-chain
/// and is promoted. One older than `retention` is discarded. The rest wait
/// for the next sweep.
pub fn sweep_unconfirmed(
    db: &Db,
    retention: Duration,
    batch_size: usize,
    cancel: &CancellationToken,
) -> Result<SweepReport, DbError> {
    let mut report = SweepReport::default();
    let now = unix_now();
    let mut after_id = 0;

    loop {
        if cancel.is_cancelled() {
            tracing::info!("unconfirmed sweep cancelled");
            break;
        }
        let batch = db.unconfirmed_batch(after_id, batch_size.max(1))?;
        let Some(last) = batch.last() else { break };
        after_id = last.id;

        let mut stale = Vec::new();
        for record in &batch {
            match db.leaf_index_by_commitment(&record.commitment) {
                Ok(leaf_index) => {
                    db.promote_unconfirmed(record, leaf_index)?;
                    tracing::info!(id = record.id, leaf_index, "promoted unconfirmed note");
                    report.promoted += 1;
                }
                Err(DbError::NotFound) => {
                    if now.saturating_sub(record.created_at) >= retention.as_secs() {
                        stale.push(record.id);
                    } else {
                        report.retained += 1;
                    }
                }
                Err(e) => return Err(e),
            }
        }
        report.discarded += db.delete_unconfirmed_batch(&stale)?;
    }

    Ok(report)
}

/// Run the sweeps until `cancel` fires.
pub fn spawn_cleanup(
    db: Arc<Db>,
    sessions: Arc<SessionStore>,
    cleanup_interval: Duration,
    session_sweep_interval: Duration,
    retention: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        run_unconfirmed_sweep(&db, retention, &cancel).await;

        let min = Duration::from_secs(1);
        let mut cleanup_tick = tokio::time::interval(cleanup_interval.max(min));
        let mut session_tick = tokio::time::interval(session_sweep_interval.max(min));
        // both fire immediately on the first tick
        cleanup_tick.tick().await;
        session_tick.tick().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("cleanup task stopping");
                    break;
                }
                _ = cleanup_tick.tick() => {
                    run_unconfirmed_sweep(&db, retention, &cancel).await;
                }
                _ = session_tick.tick() => {
                    let evicted = sessions.sweep_expired();
                    if evicted > 0 {
                        tracing::debug!(evicted, "expired deposit sessions evicted");
                    }
                }
            }
        }
    })
}

async fn run_unconfirmed_sweep(db: &Arc<Db>, retention: Duration, cancel: &CancellationToken) {
    let db = db.clone();
    let cancel = cancel.clone();
    let result = tokio::task::spawn_blocking(move || {
        sweep_unconfirmed(&db, retention, SWEEP_BATCH_SIZE, &cancel)
    })
    .await;
    match result {
        Ok(Ok(report)) => tracing::info!(
            promoted = report.promoted,
            discarded = report.discarded,
            retained = report.retained,
            "unconfirmed sweep finished"
        ),
        Ok(Err(e)) => tracing::error!(error = %e, "unconfirmed sweep failed"),
        Err(e) => tracing::error!(error = %e, "unconfirmed sweep panicked"),
    }
}
