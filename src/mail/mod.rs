//! Outbound mail dispatch
//!
//! Callers hand messages to `MailDispatcher::dispatch`, which never waits on the
//! mail server. A fixed pool of workers drains one bounded queue and delivers
//! through a `MailTransport`. Delivery failures go to a separate bounded channel
//! and are only ever logged; they never reach the request that sent the mail.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tracing::Instrument;

/// Mail errors
#[derive(Error, Debug)]
pub enum MailError {
    #[error("Mail delivery failed: {0}")]
    Delivery(String),
}

/// A rendered outbound message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailMessage {
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// A delivery that did not succeed
#[derive(Debug, Clone)]
pub struct MailFailure {
    pub to: String,
    pub subject: String,
    pub error: String,
}

/// Mail delivery abstraction used by the dispatcher workers
#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn send(&self, message: &MailMessage) -> Result<(), MailError>;
}

/// Transport that logs instead of sending, for local development
#[derive(Debug, Clone)]
pub struct LogTransport {
    from: String,
}

impl LogTransport {
    pub fn new(from: impl Into<String>) -> Self {
        Self { from: from.into() }
    }
}

#[async_trait]
impl MailTransport for LogTransport {
    async fn send(&self, message: &MailMessage) -> Result<(), MailError> {
        tracing::info!(
            from = %self.from,
            to = %message.to,
            subject = %message.subject,
            "Mail send stub"
        );
        Ok(())
    }
}

/// Worker pool sizing
#[derive(Debug, Clone)]
pub struct MailConfig {
    pub workers: usize,
    pub queue_capacity: usize,
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            queue_capacity: 256,
        }
    }
}

/// Handle for enqueueing mail
#[derive(Clone)]
pub struct MailDispatcher {
    queue: mpsc::Sender<MailMessage>,
}

/// Hand a failure to the reader, or say why it was dropped
fn report_failure(
    failure_tx: &mpsc::Sender<MailFailure>,
    failure: MailFailure,
) -> Result<(), &'static str> {
    match failure_tx.try_send(failure) {
        Ok(()) => Ok(()),
        Err(mpsc::error::TrySendError::Full(_)) => Err("failure channel full"),
        Err(mpsc::error::TrySendError::Closed(_)) => Err("failure channel closed"),
    }
}

impl MailDispatcher {
    /// Start the worker pool.
    ///
    /// Returns the dispatcher and the receiving end of the failure channel. The
    /// workers stop once every dispatcher clone has been dropped and the queue
    /// is drained.
    pub fn spawn(
        transport: Arc<dyn MailTransport>,
        config: &MailConfig,
    ) -> (Self, mpsc::Receiver<MailFailure>) {
        let capacity = config.queue_capacity.max(1);
        let (queue_tx, queue_rx) = mpsc::channel::<MailMessage>(capacity);
        let (failure_tx, failure_rx) = mpsc::channel::<MailFailure>(capacity);
        let queue_rx = Arc::new(Mutex::new(queue_rx));

        for worker in 0..config.workers.max(1) {
            let queue_rx = queue_rx.clone();
            let failure_tx = failure_tx.clone();
            let transport = transport.clone();

            tokio::spawn(
                async move {
                    loop {
                        let next = queue_rx.lock().await.recv().await;
                        let Some(message) = next else { break };

                        if let Err(e) = transport.send(&message).await {
                            let failure = MailFailure {
                                to: message.to,
                                subject: message.subject,
                                error: e.to_string(),
                            };
                            if let Err(reason) = report_failure(&failure_tx, failure) {
                                tracing::warn!(reason, "Dropping mail failure report");
                            }
                        }
                    }
                    tracing::debug!("Mail worker stopped");
                }
                .instrument(tracing::debug_span!("mail_worker", worker)),
            );
        }

        (Self { queue: queue_tx }, failure_rx)
    }

    /// Enqueue a message without waiting.
    ///
    /// A full or closed queue drops the message with a warning.
    pub fn dispatch(&self, message: MailMessage) {
        if let Err(e) = self.queue.try_send(message) {
            let (reason, message) = match e {
                mpsc::error::TrySendError::Full(m) => ("queue full", m),
                mpsc::error::TrySendError::Closed(m) => ("queue closed", m),
            };
            tracing::warn!(
                to = %message.to,
                subject = %message.subject,
                reason,
                "Dropping outbound mail"
            );
        }
    }
}

/// Drain the failure channel into the log
pub async fn log_failures(mut failures: mpsc::Receiver<MailFailure>) {
    while let Some(failure) = failures.recv().await {
        tracing::error!(
            to = %failure.to,
            subject = %failure.subject,
            error = %failure.error,
            "Mail delivery failed"
        );
    }
}
