//! Push-style status relay.
//!
//! A read-only consumer of the same status values the poll path serves.
//! Each subscription is a spawned poll loop publishing snapshots into a
//! `watch` channel, which carries exactly the delivery contract the relay
//! promises: subscribers always see the latest status, with no guarantee
//! of observing every intermediate progress tick. The relay never mutates
//! job state.

use std::time::Duration;

use tokio::sync::watch;
use tracing::warn;

use crate::engine::Dispatcher;
use crate::error::Result;
use crate::model::JobId;
use crate::status::StatusPayload;

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Fans job status out to push subscribers.
#[derive(Clone)]
pub struct StatusRelay {
    dispatcher: Dispatcher,
    poll_interval: Duration,
}

impl StatusRelay {
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self {
            dispatcher,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Subscribe to a job's status stream.
    ///
    /// The receiver starts at the current status and follows updates
    /// until the first terminal payload, after which the sender side
    /// closes. Jobs that complete between polls simply skip ahead to the
    /// terminal value.
    pub async fn subscribe(
        &self,
        job_id: JobId,
        resource_key: Option<String>,
    ) -> Result<watch::Receiver<StatusPayload>> {
        let initial = self
            .dispatcher
            .status(job_id, resource_key.as_deref())
            .await?;
        let (tx, rx) = watch::channel(initial.clone());

        if initial.is_terminal() {
            return Ok(rx);
        }

        let dispatcher = self.dispatcher.clone();
        let interval = self.poll_interval;
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                let payload = match dispatcher.status(job_id, resource_key.as_deref()).await {
                    Ok(p) => p,
                    Err(e) => {
                        warn!(%job_id, error = %e, "status poll failed, retrying");
                        continue;
                    }
                };
                let terminal = payload.is_terminal();
                if tx.send(payload).is_err() {
                    // All subscribers gone.
                    return;
                }
                if terminal {
                    return;
                }
            }
        });

        Ok(rx)
    }
}
