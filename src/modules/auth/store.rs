use dashmap::DashMap;
use thiserror::Error;

use super::password::{generate_salt, hash_password, validate_password, verify_password, PasswordError};
use crate::modules::utils::logging::log_data_operation;
use crate::modules::utils::time::get_current_timestamp;
use crate::PASSWORD_HASH_ITERATIONS;

/// Failures reported by an account store
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("account not found")]
    UnknownAccount,
    #[error("username already exists")]
    AlreadyExists,
    #[error("weak password: {0}")]
    WeakPassword(#[from] PasswordError),
    #[error("account store unavailable: {0}")]
    Unavailable(String),
}

/// Credential persistence consumed by the reset token manager
pub trait AccountStore: Send + Sync {
    /// The single key an identifier (username or email) resolves to, if the
    /// account is known. Every alias of one account maps to the same key.
    fn canonical_id(&self, account_id: &str) -> Option<String>;

    /// Whether the identifier belongs to a known account
    fn exists(&self, account_id: &str) -> bool {
        self.canonical_id(account_id).is_some()
    }

    /// Replace the stored secret for the account
    fn set_credential(&self, account_id: &str, new_secret: &str) -> Result<(), StoreError>;
}

/// Represents a single registered account
#[derive(Debug, Clone)]
pub struct Account {
    pub username: String,            // Original username as entered (for display)
    pub username_normalized: String, // Lowercase version for lookups
    pub email: String,
    pub password_hash: String,
    pub created_at: u64,
    pub password_changed_at: u64,
}

/// Accounts kept in memory, keyed by normalized username
pub struct InMemoryAccountStore {
    accounts: DashMap<String, Account>,
    salt: Vec<u8>,
    iterations: u32,
}

impl InMemoryAccountStore {
    pub fn new() -> Self {
        Self::with_iterations(PASSWORD_HASH_ITERATIONS)
    }

    /// Store with a custom PBKDF2 iteration count
    pub fn with_iterations(iterations: u32) -> Self {
        Self {
            accounts: DashMap::new(),
            salt: generate_salt(),
            iterations,
        }
    }

    /// Add a new account to the store
    pub fn register(&self, username: &str, email: &str, password: &str) -> Result<(), StoreError> {
        let original_username = username.trim().to_string();
        let username_normalized = original_username.to_lowercase();

        validate_password(password)?;

        let current_time = get_current_timestamp();
        let account = Account {
            username: original_username,
            username_normalized: username_normalized.clone(),
            email: email.trim().to_string(),
            password_hash: hash_password(password, &self.salt, self.iterations),
            created_at: current_time,
            password_changed_at: current_time,
        };

        match self.accounts.entry(username_normalized) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(StoreError::AlreadyExists),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                log_data_operation("register", &account.username, "account_store", true, None);
                slot.insert(account);
                Ok(())
            }
        }
    }

    /// Check a username/email and password pair
    pub fn verify_credentials(&self, account_id: &str, password: &str) -> bool {
        let Some(key) = self.resolve(account_id) else {
            return false;
        };
        self.accounts
            .get(&key)
            .map(|account| verify_password(password, &self.salt, self.iterations, &account.password_hash))
            .unwrap_or(false)
    }

    /// Email address registered for the account, if any
    pub fn email_for(&self, account_id: &str) -> Option<String> {
        let key = self.resolve(account_id)?;
        self.accounts.get(&key).map(|account| account.email.clone())
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    /// Map a username (any case) or email to the store key
    fn resolve(&self, account_id: &str) -> Option<String> {
        let normalized = account_id.trim().to_lowercase();
        if self.accounts.contains_key(&normalized) {
            return Some(normalized);
        }
        self.accounts
            .iter()
            .find(|entry| entry.email.eq_ignore_ascii_case(account_id.trim()))
            .map(|entry| entry.key().clone())
    }
}

impl Default for InMemoryAccountStore {
    fn default() -> Self {
        Self::new()
    }
}

impl AccountStore for InMemoryAccountStore {
    fn canonical_id(&self, account_id: &str) -> Option<String> {
        self.resolve(account_id)
    }

    fn set_credential(&self, account_id: &str, new_secret: &str) -> Result<(), StoreError> {
        validate_password(new_secret)?;

        let key = self.resolve(account_id).ok_or(StoreError::UnknownAccount)?;
        let new_hash = hash_password(new_secret, &self.salt, self.iterations);

        let mut account = self.accounts.get_mut(&key).ok_or(StoreError::UnknownAccount)?;
        account.password_hash = new_hash;
        account.password_changed_at = get_current_timestamp();
        log_data_operation(
            "set_credential",
            &account.username,
            "account_store",
            true,
            Some("Password updated"),
        );
        Ok(())
    }
}
