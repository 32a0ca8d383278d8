use std::io::Write;
use std::sync::Mutex;
use thiserror::Error;

use crate::modules::auth::store::InMemoryAccountStore;

/// Failures while handing a token to the user
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("delivery not configured: {0}")]
    Configuration(String),
    #[error("invalid recipient address: {0}")]
    InvalidAddress(String),
    #[error("transport failure: {0}")]
    Transport(String),
}

/// Out-of-band delivery of reset tokens
pub trait Notifier: Send + Sync {
    fn deliver(&self, account_id: &str, token: &str) -> Result<(), DeliveryError>;
}

/// Resolves an account identifier to the email address it is reachable at
pub trait RecipientDirectory: Send + Sync {
    fn email_for(&self, account_id: &str) -> Option<String>;
}

impl RecipientDirectory for InMemoryAccountStore {
    fn email_for(&self, account_id: &str) -> Option<String> {
        InMemoryAccountStore::email_for(self, account_id)
    }
}

/// Writes the token to a console-like sink instead of sending it anywhere
pub struct ConsoleNotifier {
    out: Mutex<Box<dyn Write + Send>>,
}

impl ConsoleNotifier {
    pub fn new() -> Self {
        Self::with_writer(Box::new(std::io::stdout()))
    }

    pub fn with_writer(out: Box<dyn Write + Send>) -> Self {
        Self { out: Mutex::new(out) }
    }
}

impl Default for ConsoleNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl Notifier for ConsoleNotifier {
    fn deliver(&self, account_id: &str, token: &str) -> Result<(), DeliveryError> {
        let mut out = self.out.lock().unwrap_or_else(|e| e.into_inner());
        writeln!(out, "Password reset token for {}: {}", account_id, token)
            .and_then(|_| out.flush())
            .map_err(|e| DeliveryError::Transport(e.to_string()))
    }
}
