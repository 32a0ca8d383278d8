mod notifier;
mod smtp;
mod templates;

pub use notifier::{ConsoleNotifier, DeliveryError, Notifier, RecipientDirectory};
pub use smtp::{SmtpNotifier, SmtpSettings};
pub use templates::{reset_email_body, RESET_EMAIL_SUBJECT};
