//! Persistence of a call's lifecycle facts.
//!
//! Start and end are each written at most once per session, whichever task
//! observes them first. All writes are best-effort: failures are logged and
//! never affect the live call.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use annie_db::DbPool;
use annie_types::CallStatus;
use chrono::Utc;
use tokio::sync::watch;

use crate::run_store_op;

/// How long the end write waits for an in-flight start write.
const START_WRITE_WAIT: Duration = Duration::from_secs(5);

/// Writes one call's lifecycle to the store. Start and end are each written
/// at most once; transcript lines are appended as they arrive.
pub struct LifecycleRecorder {
    pool: DbPool,
    call_id: Option<i64>,
    started: AtomicBool,
    ended: AtomicBool,
    /// Flips to `true` once the start write has finished, successfully or not.
    start_written: Arc<watch::Sender<bool>>,
}

impl LifecycleRecorder {
    /// A recorder for `call_id`. Without an ID every write is skipped.
    pub fn new(pool: DbPool, call_id: Option<i64>) -> Self {
        let (start_written, _) = watch::channel(false);
        Self {
            pool,
            call_id,
            started: AtomicBool::new(false),
            ended: AtomicBool::new(false),
            start_written: Arc::new(start_written),
        }
    }

    pub fn call_id(&self) -> Option<i64> {
        self.call_id
    }

    pub fn has_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    pub fn has_ended(&self) -> bool {
        self.ended.load(Ordering::SeqCst)
    }

    /// Records the start of the media stream. Later calls are no-ops.
    ///
    /// The write runs on its own task, so it completes even if the caller
    /// is cancelled mid-await.
    pub async fn record_start(&self) {
        if self.started.swap(true, Ordering::SeqCst) {
            tracing::debug!("duplicate start ignored");
            return;
        }
        let Some(call_id) = self.call_id else {
            self.start_written.send_replace(true);
            return;
        };

        let pool = self.pool.clone();
        let done = Arc::clone(&self.start_written);
        let mut written = done.subscribe();
        let now = Utc::now();
        tokio::spawn(async move {
            match run_store_op(&pool, move |conn| {
                annie_db::mark_call_started(conn, call_id, now)
            })
            .await
            {
                Ok(true) => tracing::info!(call_id, "call start recorded"),
                Ok(false) => tracing::debug!(call_id, "call already had a start time"),
                Err(e) => tracing::warn!(call_id, error = %e, "failed to record call start"),
            }
            done.send_replace(true);
        });
        if let Err(e) = written.wait_for(|w| *w).await {
            tracing::debug!(call_id, error = %e, "start write signal dropped");
        };
    }

    /// Records the end of the call with `status`. Later calls are no-ops.
    ///
    /// Waits for a pending start write so the duration is computed from it.
    pub async fn record_end(&self, status: CallStatus) {
        if self.ended.swap(true, Ordering::SeqCst) {
            return;
        }
        let Some(call_id) = self.call_id else {
            return;
        };
        if self.has_started() {
            let mut written = self.start_written.subscribe();
            if tokio::time::timeout(START_WRITE_WAIT, written.wait_for(|w| *w))
                .await
                .is_err()
            {
                tracing::warn!(call_id, "start write still pending, recording end anyway");
            }
        }

        let now = Utc::now();
        match run_store_op(&self.pool, move |conn| {
            annie_db::mark_call_ended(conn, call_id, now, status)
        })
        .await
        {
            Ok(duration) => tracing::info!(
                call_id,
                status = %status,
                duration_seconds = duration,
                "call end recorded"
            ),
            Err(e) => tracing::warn!(call_id, error = %e, "failed to record call end"),
        }
    }

    /// Marks the call failed if it never started.
    pub async fn record_failure(&self) {
        let Some(call_id) = self.call_id else {
            return;
        };
        match run_store_op(&self.pool, move |conn| annie_db::mark_call_failed(conn, call_id)).await {
            Ok(true) => tracing::info!(call_id, "call marked failed"),
            Ok(false) => {}
            Err(e) => tracing::warn!(call_id, error = %e, "failed to mark call failed"),
        }
    }

    /// Appends one conversational turn to the transcript.
    pub async fn append_transcript(&self, role: &str, text: &str) {
        let Some(call_id) = self.call_id else {
            return;
        };
        let fragment = format!("\n[{role}] {text}");
        if let Err(e) = run_store_op(&self.pool, move |conn| {
            annie_db::append_transcript(conn, call_id, &fragment)
        })
        .await
        {
            tracing::warn!(call_id, error = %e, "failed to append transcript");
        }
    }
}
