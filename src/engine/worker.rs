//! One execution unit of the pool: pull, run, reply.

use chrono::Utc;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug};

use crate::config::ShutdownPolicy;
use crate::model::{Task, TaskResult};
use crate::processor::{Processor, ProcessorError};
use crate::queue::WorkQueue;
use crate::telemetry::task::{record_task_outcome, start_task_span};

use super::stats::Counters;

pub(crate) struct Worker {
    pub(crate) id: usize,
    pub(crate) queue: WorkQueue,
    pub(crate) processor: Arc<dyn Processor>,
    pub(crate) shutdown: CancellationToken,
    pub(crate) policy: ShutdownPolicy,
    pub(crate) counters: Arc<Counters>,
}

impl Worker {
    /// Pull and execute tasks until shutdown is signalled.
    pub(crate) async fn run(self) {
        debug!(worker_id = self.id, "worker started");

        loop {
            let next = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                task = self.queue.pop() => task,
            };

            match next {
                Some(task) => self.execute(task).await,
                None => {
                    debug!(worker_id = self.id, "queue closed");
                    return;
                }
            }
        }

        if self.policy == ShutdownPolicy::Drain {
            let mut drained = 0usize;
            while let Some(task) = self.queue.try_pop().await {
                self.execute(task).await;
                drained += 1;
            }
            debug!(worker_id = self.id, drained, "worker drained queue");
        }

        debug!(worker_id = self.id, "worker exited");
    }

    async fn execute(&self, task: Task) {
        let (context, request, reply) = task.into_parts();
        let span = start_task_span(&request.workflow_id, &request.id, self.id);

        async {
            let started = Instant::now();
            let outcome = self
                .processor
                .process(&context, &request)
                .await
                .map_err(ProcessorError::from);
            let duration_ms = started.elapsed().as_millis() as u64;

            record_task_outcome(&span, outcome.is_ok(), duration_ms);
            self.counters
                .record_executed(&request.workflow_id, outcome.is_ok(), duration_ms);
            if let Err(ref e) = outcome {
                debug!(task_id = %request.id, error = %e, "processor returned error");
            }

            let result = TaskResult {
                task_id: request.id,
                worker_id: self.id,
                outcome,
                duration_ms,
                completed_at: Utc::now(),
            };

            // Never wait on the submitter: if nobody holds the handle anymore
            // the result is discarded.
            if reply.send(result).is_err() {
                self.counters.record_dropped();
                debug!(task_id = %request.id, "submitter gone, result dropped");
            }
        }
        .instrument(span.clone())
        .await
    }
}
