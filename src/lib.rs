// First, declare the modules folder itself
mod modules;

// Re-export everything from modules for easier access
pub use modules::{auth, config, email, utils};

// Re-export commonly used types
pub use modules::auth::clock::{Clock, ManualClock, SystemClock};
pub use modules::auth::store::{AccountStore, InMemoryAccountStore, StoreError};
pub use modules::auth::tokens::{ConsumeOutcome, PendingReset, ResetError, ResetTokenManager, Validation};
pub use modules::config::ResetConfig;
pub use modules::email::{ConsoleNotifier, DeliveryError, Notifier, SmtpNotifier};

// Constants
pub const DEFAULT_TOKEN_TTL_SECS: u64 = 1800;
pub const DEFAULT_TOKEN_BYTES: usize = 32;
pub const MIN_TOKEN_BYTES: usize = 16;
pub const MAX_TOKEN_BYTES: usize = 128;
pub const MAX_TOKEN_TTL_SECS: u64 = 7 * 86400;
pub const PASSWORD_HASH_ITERATIONS: u32 = 100_000;
pub const MAX_TOKEN_ATTEMPTS: u32 = 3;

// Type aliases
pub type HmacSha256 = hmac::Hmac<sha2::Sha256>;
