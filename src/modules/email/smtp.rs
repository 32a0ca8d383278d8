use chrono::Duration;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::transport::smtp::client::{Tls, TlsParameters};
use lettre::transport::smtp::PoolConfig;
use lettre::{Message, SmtpTransport, Transport};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::notifier::{DeliveryError, Notifier, RecipientDirectory};
use super::templates::{reset_email_body, RESET_EMAIL_SUBJECT};
use crate::modules::utils::io::is_valid_email;

/// SMTP relay settings
#[derive(Serialize, Deserialize, Clone, PartialEq)]
pub struct SmtpSettings {
    // SMTP server hostname (e.g., smtp.gmail.com)
    pub host: String,
    // SMTP server port (typically 587 for TLS)
    pub port: u16,
    // The email address/username for SMTP authentication
    pub username: String,
    // The password or app-specific password for SMTP
    pub password: String,
    #[serde(default = "default_from_name")]
    pub from_name: String,
}

fn default_from_name() -> String {
    "Reset Warden".to_string()
}

impl std::fmt::Debug for SmtpSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("from_name", &self.from_name)
            .finish()
    }
}

/// Emails reset tokens through an SMTP relay
pub struct SmtpNotifier {
    settings: SmtpSettings,
    ttl: Duration,
    directory: Option<Arc<dyn RecipientDirectory>>,
}

impl SmtpNotifier {
    /// `ttl` is only used to tell the recipient how long the token lasts
    pub fn new(settings: SmtpSettings, ttl: Duration) -> Self {
        Self {
            settings,
            ttl,
            directory: None,
        }
    }

    /// Look up addresses for account ids that are not emails themselves
    pub fn with_directory(mut self, directory: Arc<dyn RecipientDirectory>) -> Self {
        self.directory = Some(directory);
        self
    }

    fn recipient_for(&self, account_id: &str) -> Result<String, DeliveryError> {
        if is_valid_email(account_id) {
            return Ok(account_id.to_string());
        }
        self.directory
            .as_ref()
            .and_then(|directory| directory.email_for(account_id))
            .ok_or_else(|| DeliveryError::InvalidAddress(format!("no email address for {}", account_id)))
    }

    fn build_message(&self, to_email: &str, token: &str) -> Result<Message, DeliveryError> {
        Message::builder()
            .from(
                format!("{} <{}>", self.settings.from_name, self.settings.username)
                    .parse()
                    .map_err(|e| DeliveryError::Configuration(format!("Invalid from address: {}", e)))?,
            )
            .to(to_email
                .parse()
                .map_err(|e| DeliveryError::InvalidAddress(format!("{}: {}", to_email, e)))?)
            .subject(RESET_EMAIL_SUBJECT)
            .header(ContentType::TEXT_PLAIN)
            .body(reset_email_body(token, self.ttl))
            .map_err(|e| DeliveryError::Configuration(format!("Failed to create email: {}", e)))
    }

    fn transport(&self) -> Result<SmtpTransport, DeliveryError> {
        let tls_parameters = TlsParameters::builder(self.settings.host.clone())
            .build()
            .map_err(|e| DeliveryError::Configuration(format!("Failed to build TLS parameters: {}", e)))?;

        Ok(SmtpTransport::relay(&self.settings.host)
            .map_err(|e| DeliveryError::Configuration(format!("Failed to create SMTP transport: {}", e)))?
            .credentials(Credentials::new(
                self.settings.username.clone(),
                self.settings.password.clone(),
            ))
            .port(self.settings.port)
            .tls(Tls::Required(tls_parameters))
            .pool_config(PoolConfig::new().max_size(1))
            .timeout(Some(std::time::Duration::from_secs(10)))
            .build())
    }
}

impl Notifier for SmtpNotifier {
    fn deliver(&self, account_id: &str, token: &str) -> Result<(), DeliveryError> {
        let to_email = self.recipient_for(account_id)?;
        let message = self.build_message(&to_email, token)?;

        self.transport()?
            .send(&message)
            .map(|_| log::info!("Reset email sent for {}", account_id))
            .map_err(|e| DeliveryError::Transport(e.to_string()))
    }
}
