use std::sync::Arc;

use {
    async_trait::async_trait,
    botbridge_channels::{ReplyHandle, Result},
    botbridge_common::ReplyMarkup,
    serde_json::Value,
};

use crate::client::GemClient;

/// Reply capability bound to one gem sender.
///
/// Holds the shared client rather than a session snapshot, so replies sent
/// after a re-authentication use the new session.
#[derive(Clone)]
pub struct GemReply {
    client: Arc<GemClient>,
    receiver: Value,
}

impl GemReply {
    /// `receiver` is the sender id with the JSON type the remote used.
    pub fn new(client: Arc<GemClient>, receiver: impl Into<Value>) -> Self {
        Self {
            client,
            receiver: receiver.into(),
        }
    }

    pub fn receiver(&self) -> &Value {
        &self.receiver
    }
}

#[async_trait]
impl ReplyHandle for GemReply {
    async fn reply(&self, text: &str, markup: &ReplyMarkup) -> Result<()> {
        self.client
            .send_message(&self.receiver, text, markup)
            .await?;
        Ok(())
    }

    async fn reply_with_photo(&self, url: &str) -> Result<()> {
        self.client.send_photo(&self.receiver, url).await?;
        Ok(())
    }
}
