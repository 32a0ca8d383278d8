pub mod clock;
pub mod password;
pub mod store;
pub mod tokens;

// Re-export the main types and functions
pub use clock::{Clock, ManualClock, SystemClock};
pub use password::{hash_password, validate_password, verify_password, PasswordError};
pub use store::{Account, AccountStore, InMemoryAccountStore, StoreError};
pub use tokens::{ConsumeOutcome, PendingReset, ResetError, ResetTokenManager, TokenGenerator, Validation};
