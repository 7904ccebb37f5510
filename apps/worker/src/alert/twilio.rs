use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

use super::{AlertDispatcher, DispatchError};
use crate::config::TwilioConfig;

/// SMS bodies longer than this are cut by the gateway anyway
const MAX_MESSAGE_CHARS: usize = 1600;
const RECIPIENT_DIGITS: usize = 10;

/// Sends alerts as SMS through the Twilio Messages API.
pub struct TwilioSmsDispatcher {
    client: Client,
    config: TwilioConfig,
}

impl TwilioSmsDispatcher {
    pub fn new(config: TwilioConfig) -> Result<Self, DispatchError> {
        let client = Client::builder().timeout(Duration::from_secs(10)).build()?;
        Ok(Self { client, config })
    }

    fn messages_url(&self) -> String {
        format!(
            "{}/2010-04-01/Accounts/{}/Messages.json",
            self.config.api_base.trim_end_matches('/'),
            self.config.account_sid
        )
    }
}

#[async_trait]
impl AlertDispatcher for TwilioSmsDispatcher {
    async fn notify(&self, recipient: &str, message: &str) -> Result<(), DispatchError> {
        let recipient = recipient.trim();
        if recipient.len() != RECIPIENT_DIGITS || !recipient.chars().all(|c| c.is_ascii_digit()) {
            return Err(DispatchError::InvalidRecipient(recipient.to_string()));
        }

        let message = message.trim();
        if message.is_empty() {
            return Err(DispatchError::EmptyMessage);
        }
        let body: String = message.chars().take(MAX_MESSAGE_CHARS).collect();
        let to = format!("{}{}", self.config.country_code, recipient);

        let response = self
            .client
            .post(self.messages_url())
            .basic_auth(&self.config.account_sid, Some(&self.config.auth_token))
            .form(&[("From", self.config.from_number.as_str()), ("To", to.as_str()), ("Body", body.as_str())])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DispatchError::Rejected { status: status.as_u16(), body });
        }

        debug!(to = %to, "sms accepted by gateway");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::serve_once;

    fn config(api_base: String) -> TwilioConfig {
        TwilioConfig {
            account_sid: "AC123".to_string(),
            auth_token: "secret".to_string(),
            from_number: "+15550000000".to_string(),
            country_code: "+1".to_string(),
            api_base,
        }
    }

    #[tokio::test]
    async fn test_posts_form_to_messages_endpoint() {
        let (addr, server) = serve_once("201 Created").await;
        let dispatcher = TwilioSmsDispatcher::new(config(format!("http://{addr}"))).unwrap();

        dispatcher.notify("5551234567", "Alert: check is down").await.unwrap();

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /2010-04-01/Accounts/AC123/Messages.json HTTP/1.1"));
        assert!(request.to_ascii_lowercase().contains("authorization: basic"));
        assert!(request.contains("To=%2B15551234567"));
        assert!(request.contains("Body=Alert%3A+check+is+down"));
    }

    #[tokio::test]
    async fn test_gateway_rejection_is_reported() {
        let (addr, _server) = serve_once("400 Bad Request").await;
        let dispatcher = TwilioSmsDispatcher::new(config(format!("http://{addr}"))).unwrap();

        let err = dispatcher.notify("5551234567", "Alert").await.unwrap_err();
        assert!(matches!(err, DispatchError::Rejected { status: 400, .. }));
    }

    #[tokio::test]
    async fn test_invalid_recipient_never_hits_network() {
        let dispatcher = TwilioSmsDispatcher::new(config("http://127.0.0.1:9".to_string())).unwrap();

        for recipient in ["555", "55512345678", "555-123-45"] {
            let err = dispatcher.notify(recipient, "Alert").await.unwrap_err();
            assert!(matches!(err, DispatchError::InvalidRecipient(_)));
        }
    }
}
