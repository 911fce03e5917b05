//! `JobQueue` — the background-task abstraction unifying in-process
//! workers and (were one ever wired in) a broker-backed queue behind one
//! interface (spec.md §9 redesign flag: "Background tasks").
//!
//! This crate implements the in-process variant: a bounded `mpsc` channel
//! plus a fixed pool of `tokio::task::spawn` workers sized to physical
//! cores, the same sizing heuristic this codebase's docs use for
//! CPU-bound work (SPEC_FULL.md §5).

use std::sync::Arc;

use tokio::sync::mpsc;
use uuid::Uuid;

use crate::pipeline::Pipeline;

/// Bounds the number of documents in flight at once; a full queue makes
/// `submit` block the producer, surfaced by the upload handler as 429/503
/// if that would exceed a request-side deadline (spec.md §4.2
/// "Back-pressure").
const QUEUE_CAPACITY: usize = 64;

pub struct JobQueue {
    sender: mpsc::Sender<Uuid>,
}

impl JobQueue {
    /// Spawns `worker_count` (or physical-core count if `None`) workers,
    /// each pulling document ids off the shared channel and running the
    /// ingestion pipeline for them end to end.
    pub fn start(pipeline: Arc<Pipeline>, worker_count: Option<usize>) -> Self {
        let (sender, receiver) = mpsc::channel(QUEUE_CAPACITY);
        let receiver = Arc::new(tokio::sync::Mutex::new(receiver));

        let workers = worker_count.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4)
        });

        for worker_id in 0..workers {
            let pipeline = pipeline.clone();
            let receiver = receiver.clone();
            tokio::spawn(async move {
                loop {
                    let document_id = {
                        let mut receiver = receiver.lock().await;
                        receiver.recv().await
                    };
                    let Some(document_id) = document_id else {
                        break;
                    };
                    tracing::info!(worker_id, document_id = %document_id, "picked up ingestion job");
                    if let Err(e) = pipeline.run(document_id).await {
                        tracing::error!(worker_id, document_id = %document_id, error = %e, "ingestion job errored");
                    }
                }
            });
        }

        Self { sender }
    }

    /// Enqueues a document for ingestion. Blocks (backpressure) if the
    /// queue is full rather than dropping the job.
    pub async fn submit(&self, document_id: Uuid) -> Result<(), JobQueueFull> {
        self.sender.send(document_id).await.map_err(|_| JobQueueFull)
    }
}

/// The queue's worker pool has shut down (all receivers dropped); a
/// caller should treat this as a fatal startup/shutdown race, not a
/// transient condition to retry.
#[derive(Debug)]
pub struct JobQueueFull;

impl std::fmt::Display for JobQueueFull {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("job queue workers are no longer running")
    }
}

impl std::error::Error for JobQueueFull {}
