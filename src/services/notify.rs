// src/services/notify.rs

//! Waiting for asynchronous job completion notifications.
//!
//! A long-running job (a DLP inspection) publishes a message when it
//! finishes. The waiter pulls the subscription, acknowledges the message
//! whose job attribute matches, and hands every other message back
//! unacknowledged.
//!
//! One waiter per subscription: two concurrent waits on the same
//! subscription would each release the other's message and keep
//! re-pulling it. Pipelines run scans one at a time, so this does not
//! arise within a process; separate processes need separate subscriptions.

use std::time::Duration;

use log::{debug, info, warn};

use crate::error::Result;
use crate::services::Subscription;

/// Attribute carrying the job resource name on completion messages.
pub const JOB_ATTRIBUTE: &str = "DlpJobName";

/// Block until the job's completion message arrives or the timeout elapses.
///
/// Returns `Ok(false)` on timeout. The job itself is not cancelled and may
/// still finish later with nobody observing it.
pub async fn await_completion(
    subscription: &dyn Subscription,
    job_name: &str,
    timeout: Duration,
    poll_interval: Duration,
) -> Result<bool> {
    let wait = async {
        loop {
            let messages = subscription.pull().await?;
            let mut others = Vec::new();

            for message in messages {
                let matches = message
                    .attributes
                    .get(JOB_ATTRIBUTE)
                    .is_some_and(|name| name == job_name);
                if matches {
                    subscription.acknowledge(&[message.ack_id]).await?;
                    if !others.is_empty() {
                        subscription.release(&others).await?;
                    }
                    return Ok(true);
                }
                debug!("Ignoring notification {} for another job", message.message_id);
                others.push(message.ack_id);
            }

            if !others.is_empty() {
                subscription.release(&others).await?;
            }
            tokio::time::sleep(poll_interval).await;
        }
    };

    match tokio::time::timeout(timeout, wait).await {
        Ok(result) => {
            if let Ok(true) = result {
                info!("Job {} reported completion", job_name);
            }
            result
        }
        Err(_) => {
            warn!("Timed out after {:?} waiting for job {}", timeout, job_name);
            Ok(false)
        }
    }
}
