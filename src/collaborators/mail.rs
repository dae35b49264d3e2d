//! Mail collaborator: an optional HTTP notifier used by the Reservation
//! Coordinator and the inbox subcommand. Availability is probed with a
//! health call before use; absence degrades notifications to a no-op,
//! never a hard failure (spec §6).

use async_trait::async_trait;
use std::time::Duration;

#[cfg(test)]
use mockall::automock;

#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("mail request failed: {0}")]
    Request(String),
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait MailClient: Send + Sync {
    async fn is_available(&self) -> bool;
    async fn notify(&self, to: &str, message: &str) -> Result<(), MailError>;
}

/// A thin `reqwest`-based client against the bundled mail server.
pub struct HttpMailClient {
    base_url: String,
    client: reqwest::Client,
}

impl HttpMailClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .unwrap_or_default();
        Self { base_url: base_url.into(), client }
    }
}

#[async_trait]
impl MailClient for HttpMailClient {
    async fn is_available(&self) -> bool {
        self.client
            .get(format!("{}/healthz", self.base_url))
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }

    async fn notify(&self, to: &str, message: &str) -> Result<(), MailError> {
        let body = serde_json::json!({ "to": to, "message": message });
        let response = self
            .client
            .post(format!("{}/notify", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| MailError::Request(e.to_string()))?;

        if !response.status().is_success() {
            return Err(MailError::Request(format!("status {}", response.status())));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_mail_client_reports_unavailable_by_default() {
        let mut mock = MockMailClient::new();
        mock.expect_is_available().returning(|| false);
        assert!(!mock.is_available().await);
    }
}
