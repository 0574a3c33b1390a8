use crate::api::AppError;
use crate::notification::model::{EmailMessage, RelayRequest};
use reqwest::{Client, Url};
use std::future::Future;
use tracing::{debug, info};

/// Outbound mail. One call delivers `message` to one recipient.
pub trait Mailer: Send + Sync {
    fn send(
        &self,
        recipient: &str,
        message: &EmailMessage,
    ) -> impl Future<Output = Result<(), AppError>> + Send;
}

/// Delivers mail by posting JSON to an HTTP mail relay.
#[derive(Clone)]
pub struct HttpMailer {
    client: Client,
    relay_url: Url,
}

impl HttpMailer {
    pub fn new(relay_url: String) -> Result<Self, AppError> {
        let relay_url = Url::parse(&relay_url)
            .map_err(|e| AppError::Config(format!("mail relay url {:?}: {}", relay_url, e)))?;
        Ok(Self {
            client: Client::new(),
            relay_url,
        })
    }

    fn build_request(recipient: &str, message: &EmailMessage) -> RelayRequest {
        RelayRequest {
            id: format!("{}/{}", message.id, recipient),
            to: recipient.to_string(),
            subject: message.subject.clone(),
            html: message.html_body.clone(),
        }
    }
}

impl Mailer for HttpMailer {
    async fn send(&self, recipient: &str, message: &EmailMessage) -> Result<(), AppError> {
        let request = Self::build_request(recipient, message);
        debug!(to = %recipient, subject = %message.subject, "posting mail to relay");
        let response = self
            .client
            .post(self.relay_url.clone())
            .json(&request)
            .send()
            .await
            .map_err(|e| AppError::Mail(e.to_string()))?;
        let status_code = response.status();
        if status_code.is_success() {
            info!(to = %recipient, id = %request.id, "mail accepted by relay");
            Ok(())
        } else {
            let text = response.text().await.unwrap_or_default();
            Err(AppError::Mail(format!("relay answered {}: {}", status_code, text)))
        }
    }
}
