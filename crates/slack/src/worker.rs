use std::{sync::Arc, time::Duration};

use tokio::{
    sync::{mpsc, oneshot},
    task::JoinSet,
};
use tracing::{debug, info, warn};

use crate::orchestrator::{CommandOrchestrator, FulfillmentJob};

/// Longest a job waits for its acknowledgment to leave. Slack gives up on the ack after
/// three seconds, so past this point nothing is gained by holding the reply back.
pub const ACK_GATE_TIMEOUT: Duration = Duration::from_secs(3);

/// Held by the transport while the acknowledgment is being written. Dropping it releases
/// the job's [`AckGate`].
#[derive(Debug)]
pub struct AckSent(Option<oneshot::Sender<()>>);

impl Drop for AckSent {
    fn drop(&mut self) {
        if let Some(sender) = self.0.take() {
            let _ = sender.send(());
        }
    }
}

/// Fulfillment side of the acknowledgment ordering. A job does not start until its gate
/// opens.
#[derive(Debug)]
pub struct AckGate(oneshot::Receiver<()>);

pub fn ack_gate() -> (AckSent, AckGate) {
    let (sender, receiver) = oneshot::channel();
    (AckSent(Some(sender)), AckGate(receiver))
}

impl AckGate {
    async fn opened(self, correlation_id: &str) {
        if tokio::time::timeout(ACK_GATE_TIMEOUT, self.0).await.is_err() {
            warn!(
                event_name = "worker.ack_gate_timeout",
                correlation_id,
                "acknowledgment still in flight, fulfilling anyway"
            );
        }
    }
}

struct QueuedJob {
    job: FulfillmentJob,
    gate: AckGate,
}

impl QueuedJob {
    async fn run(self, orchestrator: Arc<CommandOrchestrator>) {
        let QueuedJob { job, gate } = self;
        gate.opened(&job.invocation.correlation_id).await;
        orchestrator.fulfill(job).await;
    }
}

/// Sending half of the fulfillment hand-off. Cloned into every request handler.
#[derive(Clone)]
pub struct FulfillmentQueue {
    sender: mpsc::UnboundedSender<QueuedJob>,
    orchestrator: Arc<CommandOrchestrator>,
}

/// Receives jobs and runs each on its own task so a slow backend call never delays the next
/// invocation.
pub struct FulfillmentWorker {
    receiver: mpsc::UnboundedReceiver<QueuedJob>,
    orchestrator: Arc<CommandOrchestrator>,
    tasks: JoinSet<()>,
}

pub fn fulfillment_channel(
    orchestrator: Arc<CommandOrchestrator>,
) -> (FulfillmentQueue, FulfillmentWorker) {
    let (sender, receiver) = mpsc::unbounded_channel();
    (
        FulfillmentQueue { sender, orchestrator: orchestrator.clone() },
        FulfillmentWorker { receiver, orchestrator, tasks: JoinSet::new() },
    )
}

impl FulfillmentQueue {
    /// `false` once the worker has stopped receiving.
    pub fn is_accepting(&self) -> bool {
        !self.sender.is_closed()
    }

    /// Hands the job to the worker. It starts once `gate` opens, i.e. after the
    /// acknowledgment has been written. If the worker is gone the job still runs on a
    /// detached task, since an accepted invocation is owed a reply.
    pub fn submit(&self, job: FulfillmentJob, gate: AckGate) {
        if let Err(mpsc::error::SendError(queued)) = self.sender.send(QueuedJob { job, gate }) {
            warn!(
                event_name = "worker.queue_closed",
                correlation_id = %queued.job.invocation.correlation_id,
                "fulfillment worker is not running, fulfilling on a detached task"
            );
            tokio::spawn(queued.run(self.orchestrator.clone()));
        }
    }
}

impl FulfillmentWorker {
    /// Runs until every queue handle is dropped, then waits for in-flight jobs.
    pub async fn run(mut self) {
        info!(event_name = "worker.started", "fulfillment worker started");

        loop {
            tokio::select! {
                queued = self.receiver.recv() => {
                    let Some(queued) = queued else { break };
                    debug!(
                        event_name = "worker.job_received",
                        correlation_id = %queued.job.invocation.correlation_id,
                        in_flight = self.tasks.len(),
                        "fulfillment job received"
                    );
                    self.tasks.spawn(queued.run(self.orchestrator.clone()));
                }
                Some(joined) = self.tasks.join_next(), if !self.tasks.is_empty() => {
                    log_join(joined);
                }
            }
        }

        let remaining = self.tasks.len();
        info!(event_name = "worker.draining", remaining, "fulfillment queue closed, draining");
        while let Some(joined) = self.tasks.join_next().await {
            log_join(joined);
        }
        info!(event_name = "worker.stopped", "fulfillment worker stopped");
    }
}

fn log_join(joined: Result<(), tokio::task::JoinError>) {
    if let Err(error) = joined {
        warn!(event_name = "worker.job_panicked", error = %error, "fulfillment task did not finish");
    }
}
