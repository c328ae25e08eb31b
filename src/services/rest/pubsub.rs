// src/services/rest/pubsub.rs

//! Pull subscription for job completion notices.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::error::Result;
use crate::services::rest::ApiClient;
use crate::services::{Notification, Subscription};

const MAX_MESSAGES: u32 = 10;

pub struct RestSubscription {
    api: ApiClient,
    path: String,
}

impl RestSubscription {
    pub(crate) fn new(api: ApiClient, project_id: &str, subscription_id: &str) -> Self {
        Self {
            api,
            path: format!("projects/{project_id}/subscriptions/{subscription_id}"),
        }
    }

    async fn call(&self, verb: &str, body: Value) -> Result<Value> {
        let url = self.api.url(&format!("{}:{}", self.path, verb))?;
        self.api.post(url, &body).await
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PullResponse {
    #[serde(default)]
    received_messages: Vec<ReceivedMessage>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReceivedMessage {
    ack_id: String,
    message: PubsubMessage,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PubsubMessage {
    #[serde(default)]
    message_id: String,
    #[serde(default)]
    attributes: BTreeMap<String, String>,
}

impl From<ReceivedMessage> for Notification {
    fn from(received: ReceivedMessage) -> Self {
        Notification {
            ack_id: received.ack_id,
            message_id: received.message.message_id,
            attributes: received.message.attributes,
        }
    }
}

#[async_trait]
impl Subscription for RestSubscription {
    async fn pull(&self) -> Result<Vec<Notification>> {
        let url = self.api.url(&format!("{}:pull", self.path))?;
        let response: PullResponse = self
            .api
            .post(url, &json!({"maxMessages": MAX_MESSAGES}))
            .await?;
        Ok(response
            .received_messages
            .into_iter()
            .map(Notification::from)
            .collect())
    }

    async fn acknowledge(&self, ack_ids: &[String]) -> Result<()> {
        if ack_ids.is_empty() {
            return Ok(());
        }
        self.call("acknowledge", json!({"ackIds": ack_ids})).await?;
        Ok(())
    }

    /// Hand messages back for immediate redelivery.
    async fn release(&self, ack_ids: &[String]) -> Result<()> {
        if ack_ids.is_empty() {
            return Ok(());
        }
        self.call(
            "modifyAckDeadline",
            json!({"ackIds": ack_ids, "ackDeadlineSeconds": 0}),
        )
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::notify::JOB_ATTRIBUTE;

    #[test]
    fn test_pull_response_decoding() {
        let response: PullResponse = serde_json::from_value(json!({
            "receivedMessages": [{
                "ackId": "ack-1",
                "message": {
                    "messageId": "42",
                    "attributes": {"DlpJobName": "projects/p/dlpJobs/i-1"},
                    "publishTime": "2026-01-01T00:00:00Z"
                }
            }]
        }))
        .unwrap();
        let notes: Vec<Notification> = response
            .received_messages
            .into_iter()
            .map(Notification::from)
            .collect();
        assert_eq!(notes[0].ack_id, "ack-1");
        assert_eq!(notes[0].attributes[JOB_ATTRIBUTE], "projects/p/dlpJobs/i-1");
    }

    #[test]
    fn test_empty_pull_decodes() {
        let response: PullResponse = serde_json::from_value(json!({})).unwrap();
        assert!(response.received_messages.is_empty());
    }
}
