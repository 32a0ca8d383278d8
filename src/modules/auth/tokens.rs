use chrono::{DateTime, Duration, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use rand::RngCore;
use std::fmt;
use std::sync::Arc;
use subtle::ConstantTimeEq;
use thiserror::Error;

use super::clock::{Clock, SystemClock};
use super::store::{AccountStore, StoreError};
use crate::modules::config::ResetConfig;
use crate::modules::utils::logging::log_auth_event;
use crate::{DEFAULT_TOKEN_BYTES, DEFAULT_TOKEN_TTL_SECS, MAX_TOKEN_BYTES, MIN_TOKEN_BYTES};

/// Outstanding password reset for a single account
#[derive(Clone, PartialEq, Eq)]
pub struct PendingReset {
    pub account_id: String,
    pub token: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl PendingReset {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    fn matches(&self, token: &str) -> bool {
        self.token.as_bytes().ct_eq(token.as_bytes()).into()
    }
}

// The token never appears in debug output
impl fmt::Debug for PendingReset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingReset")
            .field("account_id", &self.account_id)
            .field("token", &"<redacted>")
            .field("issued_at", &self.issued_at)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Result of checking a token without using it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Validation {
    Valid,
    NoPendingRequest,
    Mismatch,
    Expired,
}

/// Result of attempting to use a token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumeOutcome {
    Success,
    NoPendingRequest,
    Mismatch,
    Expired,
}

/// Errors raised by the reset token manager
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ResetError {
    #[error("unknown account")]
    UnknownAccount,
    #[error("token lifetime must be positive and representable")]
    InvalidTtl,
    #[error("credential update failed: {0}")]
    Store(#[from] StoreError),
}

/// Produces hex-encoded secrets from the operating system RNG
#[derive(Debug, Clone, Copy)]
pub struct TokenGenerator {
    bytes: usize,
}

impl TokenGenerator {
    /// Sizes outside `MIN_TOKEN_BYTES..=MAX_TOKEN_BYTES` are clamped into it
    pub fn new(bytes: usize) -> Self {
        Self {
            bytes: bytes.clamp(MIN_TOKEN_BYTES, MAX_TOKEN_BYTES),
        }
    }

    pub fn bytes(&self) -> usize {
        self.bytes
    }

    pub fn generate(&self) -> String {
        let mut buf = vec![0u8; self.bytes];
        rand::rngs::OsRng.fill_bytes(&mut buf);
        hex::encode(buf)
    }
}

impl Default for TokenGenerator {
    fn default() -> Self {
        Self::new(DEFAULT_TOKEN_BYTES)
    }
}

/// Issues, validates and retires single-use password reset tokens.
///
/// Records live in a sharded map keyed by the account store's canonical id,
/// so every alias of an account shares one record. Every operation on one
/// account runs under that account's entry lock, so two callers racing on
/// the same token see a consistent record and only one of them can remove it.
pub struct ResetTokenManager {
    pending: DashMap<String, PendingReset>,
    accounts: Arc<dyn AccountStore>,
    clock: Arc<dyn Clock>,
    generator: TokenGenerator,
    default_ttl: Duration,
}

impl ResetTokenManager {
    pub fn new(accounts: Arc<dyn AccountStore>) -> Self {
        Self::with_clock(accounts, Arc::new(SystemClock))
    }

    pub fn with_clock(accounts: Arc<dyn AccountStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            pending: DashMap::new(),
            accounts,
            clock,
            generator: TokenGenerator::default(),
            default_ttl: Duration::seconds(DEFAULT_TOKEN_TTL_SECS as i64),
        }
    }

    pub fn from_config(
        accounts: Arc<dyn AccountStore>,
        clock: Arc<dyn Clock>,
        config: &ResetConfig,
    ) -> Self {
        Self {
            generator: TokenGenerator::new(config.token_bytes),
            default_ttl: config.token_ttl(),
            ..Self::with_clock(accounts, clock)
        }
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Issue a token for the account, replacing any outstanding one
    pub fn issue(&self, account_id: &str, ttl: Duration) -> Result<String, ResetError> {
        if ttl <= Duration::zero() {
            return Err(ResetError::InvalidTtl);
        }
        let Some(key) = self.accounts.canonical_id(account_id) else {
            log_auth_event("reset_issue", account_id, false, Some("unknown account"));
            return Err(ResetError::UnknownAccount);
        };

        let issued_at = self.clock.now();
        let expires_at = issued_at
            .checked_add_signed(ttl)
            .ok_or(ResetError::InvalidTtl)?;
        let token = self.generator.generate();

        let replaced = self
            .pending
            .insert(
                key.clone(),
                PendingReset {
                    account_id: key,
                    token: token.clone(),
                    issued_at,
                    expires_at,
                },
            )
            .is_some();

        log_auth_event(
            "reset_issue",
            account_id,
            true,
            Some(if replaced { "replaced pending token" } else { "new token" }),
        );
        Ok(token)
    }

    /// Issue a token using the configured lifetime
    pub fn issue_default(&self, account_id: &str) -> Result<String, ResetError> {
        self.issue(account_id, self.default_ttl)
    }

    /// Check a token without consuming it. Expired records are purged.
    pub fn validate(&self, account_id: &str, token: &str) -> Validation {
        // Unknown accounts and accounts without a record look the same
        let Some(key) = self.pending_key(account_id) else {
            return Validation::NoPendingRequest;
        };
        let now = self.clock.now();
        let result = match self.pending.entry(key) {
            Entry::Vacant(_) => Validation::NoPendingRequest,
            Entry::Occupied(record) => Self::check(record, token, now, false).0,
        };
        self.log_rejection("reset_validate", account_id, result);
        result
    }

    /// Use a token. On a valid token the record is removed and then `setter`
    /// is called with the canonical account id; a setter failure is returned as
    /// [`ResetError::Store`] and the token stays spent.
    pub fn consume<F>(
        &self,
        account_id: &str,
        token: &str,
        setter: F,
    ) -> Result<ConsumeOutcome, ResetError>
    where
        F: FnOnce(&str) -> Result<(), StoreError>,
    {
        let Some(key) = self.pending_key(account_id) else {
            return Ok(ConsumeOutcome::NoPendingRequest);
        };
        let now = self.clock.now();
        let (result, _taken) = match self.pending.entry(key.clone()) {
            Entry::Vacant(_) => (Validation::NoPendingRequest, None),
            Entry::Occupied(record) => Self::check(record, token, now, true),
        };
        // entry lock released here

        match result {
            Validation::Valid => {}
            Validation::NoPendingRequest => return Ok(ConsumeOutcome::NoPendingRequest),
            Validation::Mismatch => {
                self.log_rejection("reset_consume", account_id, result);
                return Ok(ConsumeOutcome::Mismatch);
            }
            Validation::Expired => {
                self.log_rejection("reset_consume", account_id, result);
                return Ok(ConsumeOutcome::Expired);
            }
        }

        match setter(&key) {
            Ok(()) => {
                log_auth_event("password_reset", account_id, true, Some("token consumed"));
                Ok(ConsumeOutcome::Success)
            }
            Err(e) => {
                log::error!("Credential update failed after token use: {}", e);
                log_auth_event("password_reset", account_id, false, Some("credential update failed"));
                Err(ResetError::Store(e))
            }
        }
    }

    /// Consume a token and store `new_secret` through the account store
    pub fn reset_password(
        &self,
        account_id: &str,
        token: &str,
        new_secret: &str,
    ) -> Result<ConsumeOutcome, ResetError> {
        let accounts = Arc::clone(&self.accounts);
        self.consume(account_id, token, |id| accounts.set_credential(id, new_secret))
    }

    /// Cancel the outstanding reset for an account
    pub fn revoke(&self, account_id: &str) -> bool {
        let removed = self
            .pending_key(account_id)
            .map(|key| self.pending.remove(&key).is_some())
            .unwrap_or(false);
        if removed {
            log_auth_event("reset_revoke", account_id, true, None);
        }
        removed
    }

    /// Whether an unexpired token is outstanding for the account
    pub fn has_pending(&self, account_id: &str) -> bool {
        self.expires_at(account_id).is_some()
    }

    /// Expiry time of the outstanding token, if one is still live
    pub fn expires_at(&self, account_id: &str) -> Option<DateTime<Utc>> {
        let key = self.pending_key(account_id)?;
        let now = self.clock.now();
        self.pending
            .get(&key)
            .filter(|record| !record.is_expired(now))
            .map(|record| record.expires_at)
    }

    /// Remove every expired record, returning how many were dropped
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let before = self.pending.len();
        self.pending.retain(|_, record| !record.is_expired(now));
        let purged = before.saturating_sub(self.pending.len());
        if purged > 0 {
            log::info!("Purged {} expired reset tokens", purged);
        }
        purged
    }

    /// Number of stored records, expired ones included until purged
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Canonical key for an identifier, or `None` when no record can exist
    fn pending_key(&self, account_id: &str) -> Option<String> {
        let key = self.accounts.canonical_id(account_id)?;
        // Skip the write lock taken by `entry` when nothing is stored
        self.pending.contains_key(&key).then_some(key)
    }

    /// Shared check for validate/consume. Expired records are always removed;
    /// a valid record is removed only when `take` is set.
    fn check(
        record: dashmap::mapref::entry::OccupiedEntry<'_, String, PendingReset>,
        token: &str,
        now: DateTime<Utc>,
        take: bool,
    ) -> (Validation, Option<PendingReset>) {
        if record.get().is_expired(now) {
            record.remove();
            return (Validation::Expired, None);
        }
        if !record.get().matches(token) {
            return (Validation::Mismatch, None);
        }
        if take {
            (Validation::Valid, Some(record.remove()))
        } else {
            (Validation::Valid, None)
        }
    }

    fn log_rejection(&self, event: &str, account_id: &str, result: Validation) {
        match result {
            Validation::Mismatch => log_auth_event(event, account_id, false, Some("token mismatch")),
            Validation::Expired => log_auth_event(event, account_id, false, Some("token expired")),
            Validation::Valid | Validation::NoPendingRequest => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::auth::clock::ManualClock;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Barrier, Mutex};
    use std::thread;

    // Mock account store recording every credential update
    struct MockAccountStore {
        known: HashSet<String>,
        updates: Mutex<Vec<(String, String)>>,
        fail_updates: bool,
    }

    impl MockAccountStore {
        fn with_accounts(names: &[&str]) -> Self {
            Self {
                known: names.iter().map(|n| n.to_string()).collect(),
                updates: Mutex::new(Vec::new()),
                fail_updates: false,
            }
        }

        fn failing(names: &[&str]) -> Self {
            Self {
                fail_updates: true,
                ..Self::with_accounts(names)
            }
        }

        fn updates(&self) -> Vec<(String, String)> {
            self.updates.lock().unwrap().clone()
        }
    }

    impl AccountStore for MockAccountStore {
        fn canonical_id(&self, account_id: &str) -> Option<String> {
            self.known.get(account_id).cloned()
        }

        fn set_credential(&self, account_id: &str, new_secret: &str) -> Result<(), StoreError> {
            if self.fail_updates {
                return Err(StoreError::Unavailable("disk full".to_string()));
            }
            self.updates
                .lock()
                .unwrap()
                .push((account_id.to_string(), new_secret.to_string()));
            Ok(())
        }
    }

    fn setup_manager(
        store: MockAccountStore,
    ) -> (ResetTokenManager, Arc<MockAccountStore>, Arc<ManualClock>) {
        let store = Arc::new(store);
        let clock = Arc::new(ManualClock::default());
        let manager = ResetTokenManager::with_clock(store.clone(), clock.clone());
        (manager, store, clock)
    }

    #[test]
    fn test_issue_then_validate() {
        let (manager, _, _) = setup_manager(MockAccountStore::with_accounts(&["alice", "bob"]));

        for account in ["alice", "bob"] {
            let token = manager.issue(account, Duration::minutes(5)).unwrap();
            assert_eq!(manager.validate(account, &token), Validation::Valid);
            // Validation does not spend the token
            assert_eq!(manager.validate(account, &token), Validation::Valid);
            assert!(manager.has_pending(account));
        }
    }

    #[test]
    fn test_unknown_account_gets_no_token() {
        let (manager, _, _) = setup_manager(MockAccountStore::with_accounts(&["alice"]));

        assert_eq!(
            manager.issue("mallory", Duration::minutes(5)),
            Err(ResetError::UnknownAccount)
        );
        assert_eq!(manager.pending_count(), 0);
        assert_eq!(manager.validate("mallory", "anything"), Validation::NoPendingRequest);
    }

    #[test]
    fn test_non_positive_ttl_rejected() {
        let (manager, _, _) = setup_manager(MockAccountStore::with_accounts(&["alice"]));

        assert_eq!(manager.issue("alice", Duration::zero()), Err(ResetError::InvalidTtl));
        assert_eq!(manager.issue("alice", Duration::seconds(-1)), Err(ResetError::InvalidTtl));
        assert_eq!(manager.pending_count(), 0);
    }

    #[test]
    fn test_token_shape_and_uniqueness() {
        let (manager, _, _) = setup_manager(MockAccountStore::with_accounts(&["alice"]));

        let mut seen = HashSet::new();
        for _ in 0..50 {
            let token = manager.issue("alice", Duration::minutes(5)).unwrap();
            assert_eq!(token.len(), DEFAULT_TOKEN_BYTES * 2);
            assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
            assert!(!token.contains("alice"));
            assert!(seen.insert(token));
        }
    }

    #[test]
    fn test_generator_clamps_size() {
        let token = TokenGenerator::new(4).generate();
        assert_eq!(token.len(), MIN_TOKEN_BYTES * 2);

        let huge = TokenGenerator::new(usize::MAX);
        assert_eq!(huge.bytes(), MAX_TOKEN_BYTES);
        assert_eq!(huge.generate().len(), MAX_TOKEN_BYTES * 2);
    }

    #[test]
    fn test_from_config_clamps_oversized_tokens() {
        let store = Arc::new(MockAccountStore::with_accounts(&["alice"]));
        // Built by hand, so never passed through ResetConfig::validate
        let config = ResetConfig {
            token_bytes: usize::MAX,
            ..ResetConfig::default()
        };
        let manager = ResetTokenManager::from_config(store, Arc::new(ManualClock::default()), &config);

        let token = manager.issue_default("alice").unwrap();
        assert_eq!(token.len(), MAX_TOKEN_BYTES * 2);
    }

    #[test]
    fn test_never_issued_token_never_validates() {
        let (manager, store, _) = setup_manager(MockAccountStore::with_accounts(&["alice"]));

        assert_eq!(manager.validate("alice", "deadbeef"), Validation::NoPendingRequest);
        assert_eq!(
            manager.consume("alice", "deadbeef", |_| Ok(())),
            Ok(ConsumeOutcome::NoPendingRequest)
        );

        manager.issue("alice", Duration::minutes(5)).unwrap();
        assert_eq!(manager.validate("alice", "deadbeef"), Validation::Mismatch);
        assert_eq!(
            manager.reset_password("alice", "deadbeef", "NewPassword1!"),
            Ok(ConsumeOutcome::Mismatch)
        );
        assert!(store.updates().is_empty());
    }

    #[test]
    fn test_mismatch_keeps_record() {
        let (manager, _, _) = setup_manager(MockAccountStore::with_accounts(&["alice"]));
        let token = manager.issue("alice", Duration::minutes(5)).unwrap();

        for _ in 0..5 {
            assert_eq!(manager.validate("alice", "wrong"), Validation::Mismatch);
        }
        assert_eq!(manager.validate("alice", &token), Validation::Valid);
    }

    #[test]
    fn test_double_consume() {
        let (manager, store, _) = setup_manager(MockAccountStore::with_accounts(&["alice"]));
        let token = manager.issue("alice", Duration::minutes(5)).unwrap();

        assert_eq!(
            manager.reset_password("alice", &token, "NewPassword1!"),
            Ok(ConsumeOutcome::Success)
        );
        assert_eq!(
            manager.reset_password("alice", &token, "NewPassword2!"),
            Ok(ConsumeOutcome::NoPendingRequest)
        );
        assert_eq!(store.updates().len(), 1);
    }

    #[test]
    fn test_expired_token_is_purged_on_access() {
        let (manager, _, clock) = setup_manager(MockAccountStore::with_accounts(&["alice"]));
        let token = manager.issue("alice", Duration::minutes(5)).unwrap();

        // Still valid exactly at the expiry instant
        clock.advance(Duration::minutes(5));
        assert_eq!(manager.validate("alice", &token), Validation::Valid);

        clock.advance(Duration::seconds(1));
        assert!(!manager.has_pending("alice"));
        assert_eq!(manager.validate("alice", &token), Validation::Expired);
        assert_eq!(manager.validate("alice", &token), Validation::NoPendingRequest);
        assert_eq!(manager.pending_count(), 0);
    }

    #[test]
    fn test_expired_token_cannot_be_consumed() {
        let (manager, store, clock) = setup_manager(MockAccountStore::with_accounts(&["alice"]));
        let token = manager.issue("alice", Duration::minutes(5)).unwrap();

        clock.advance(Duration::minutes(6));
        assert_eq!(
            manager.reset_password("alice", &token, "NewPassword1!"),
            Ok(ConsumeOutcome::Expired)
        );
        assert_eq!(
            manager.reset_password("alice", &token, "NewPassword1!"),
            Ok(ConsumeOutcome::NoPendingRequest)
        );
        assert!(store.updates().is_empty());
    }

    #[test]
    fn test_reissue_invalidates_previous_token() {
        let (manager, _, _) = setup_manager(MockAccountStore::with_accounts(&["alice"]));

        let first = manager.issue("alice", Duration::minutes(5)).unwrap();
        let second = manager.issue("alice", Duration::minutes(5)).unwrap();

        assert_ne!(first, second);
        assert_eq!(manager.pending_count(), 1);
        assert_eq!(manager.validate("alice", &first), Validation::Mismatch);
        assert_eq!(manager.validate("alice", &second), Validation::Valid);
    }

    #[test]
    fn test_reissue_resets_expiry() {
        let (manager, _, clock) = setup_manager(MockAccountStore::with_accounts(&["alice"]));

        manager.issue("alice", Duration::minutes(5)).unwrap();
        clock.advance(Duration::minutes(4));
        let token = manager.issue("alice", Duration::minutes(5)).unwrap();
        clock.advance(Duration::minutes(4));

        assert_eq!(manager.validate("alice", &token), Validation::Valid);
        assert_eq!(manager.expires_at("alice"), Some(clock.now() + Duration::minutes(1)));
    }

    #[test]
    fn test_setter_failure_still_spends_token() {
        let (manager, store, _) = setup_manager(MockAccountStore::failing(&["alice"]));
        let token = manager.issue("alice", Duration::minutes(5)).unwrap();

        assert_eq!(
            manager.reset_password("alice", &token, "NewPassword1!"),
            Err(ResetError::Store(StoreError::Unavailable("disk full".to_string())))
        );
        assert_eq!(manager.validate("alice", &token), Validation::NoPendingRequest);
        assert!(store.updates().is_empty());
    }

    #[test]
    fn test_setter_runs_without_holding_entry_lock() {
        let (manager, _, _) = setup_manager(MockAccountStore::with_accounts(&["alice"]));
        let token = manager.issue("alice", Duration::minutes(5)).unwrap();

        // The callback touches the same account; this would deadlock if the
        // entry were still locked.
        let outcome = manager.consume("alice", &token, |id| {
            assert!(!manager.has_pending(id));
            Ok(())
        });
        assert_eq!(outcome, Ok(ConsumeOutcome::Success));
    }

    #[test]
    fn test_parallel_consume_succeeds_once() {
        const CALLERS: usize = 16;

        let (manager, _, _) = setup_manager(MockAccountStore::with_accounts(&["alice"]));
        let manager = Arc::new(manager);
        let token = manager.issue("alice", Duration::minutes(5)).unwrap();
        let setter_calls = Arc::new(AtomicUsize::new(0));
        let barrier = Arc::new(Barrier::new(CALLERS));

        let handles: Vec<_> = (0..CALLERS)
            .map(|_| {
                let manager = Arc::clone(&manager);
                let token = token.clone();
                let setter_calls = Arc::clone(&setter_calls);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    manager
                        .consume("alice", &token, |_| {
                            setter_calls.fetch_add(1, Ordering::SeqCst);
                            Ok(())
                        })
                        .unwrap()
                })
            })
            .collect();

        let outcomes: Vec<ConsumeOutcome> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        let successes = outcomes.iter().filter(|o| **o == ConsumeOutcome::Success).count();
        assert_eq!(successes, 1);
        assert!(outcomes
            .iter()
            .all(|o| matches!(o, ConsumeOutcome::Success | ConsumeOutcome::NoPendingRequest)));
        assert_eq!(setter_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_parallel_accounts_do_not_interfere() {
        let names: Vec<String> = (0..8).map(|i| format!("user{}", i)).collect();
        let refs: Vec<&str> = names.iter().map(String::as_str).collect();
        let (manager, store, _) = setup_manager(MockAccountStore::with_accounts(&refs));
        let manager = Arc::new(manager);

        let handles: Vec<_> = names
            .iter()
            .cloned()
            .map(|name| {
                let manager = Arc::clone(&manager);
                thread::spawn(move || {
                    let token = manager.issue(&name, Duration::minutes(5)).unwrap();
                    assert_eq!(manager.validate(&name, &token), Validation::Valid);
                    manager.reset_password(&name, &token, "NewPassword1!").unwrap()
                })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.join().unwrap(), ConsumeOutcome::Success);
        }
        assert_eq!(store.updates().len(), names.len());
        assert_eq!(manager.pending_count(), 0);
    }

    #[test]
    fn test_alice_scenario() {
        let (manager, store, _) = setup_manager(MockAccountStore::with_accounts(&["alice"]));
        let token = manager.issue("alice", Duration::minutes(5)).unwrap();

        assert_eq!(manager.validate("alice", "wrong"), Validation::Mismatch);

        let mut seen = None;
        let outcome = manager.consume("alice", &token, |id| {
            seen = Some((id.to_string(), "NewSecret1!".to_string()));
            store.set_credential(id, "NewSecret1!")
        });
        assert_eq!(outcome, Ok(ConsumeOutcome::Success));
        assert_eq!(seen, Some(("alice".to_string(), "NewSecret1!".to_string())));
        assert_eq!(
            store.updates(),
            vec![("alice".to_string(), "NewSecret1!".to_string())]
        );

        assert_eq!(manager.validate("alice", &token), Validation::NoPendingRequest);
    }

    #[test]
    fn test_revoke_and_purge() {
        let (manager, _, clock) =
            setup_manager(MockAccountStore::with_accounts(&["alice", "bob", "carol"]));

        let alice = manager.issue("alice", Duration::minutes(5)).unwrap();
        manager.issue("bob", Duration::minutes(1)).unwrap();
        manager.issue("carol", Duration::minutes(10)).unwrap();

        assert!(manager.revoke("alice"));
        assert!(!manager.revoke("alice"));
        assert_eq!(manager.validate("alice", &alice), Validation::NoPendingRequest);

        clock.advance(Duration::minutes(2));
        assert_eq!(manager.purge_expired(), 1);
        assert!(!manager.has_pending("bob"));
        assert!(manager.has_pending("carol"));
        assert_eq!(manager.pending_count(), 1);
    }

    #[test]
    fn test_from_config() {
        let store = Arc::new(MockAccountStore::with_accounts(&["alice"]));
        let clock = Arc::new(ManualClock::default());
        let config = ResetConfig {
            token_ttl_secs: 60,
            token_bytes: 20,
            ..ResetConfig::default()
        };
        let manager = ResetTokenManager::from_config(store, clock.clone(), &config);

        assert_eq!(manager.default_ttl(), Duration::seconds(60));
        let token = manager.issue_default("alice").unwrap();
        assert_eq!(token.len(), 40);

        clock.advance(Duration::seconds(61));
        assert_eq!(manager.validate("alice", &token), Validation::Expired);
    }

    #[test]
    fn test_reset_through_account_store() {
        use crate::modules::auth::store::InMemoryAccountStore;

        let accounts = Arc::new(InMemoryAccountStore::with_iterations(1_000));
        accounts
            .register("Alice", "alice@example.com", "Password123!")
            .unwrap();
        let manager = ResetTokenManager::new(accounts.clone());

        let token = manager.issue_default("alice@example.com").unwrap();

        // Policy failure in the store still spends the token
        assert_eq!(
            manager.reset_password("alice@example.com", &token, "weak"),
            Err(ResetError::Store(StoreError::WeakPassword(
                crate::modules::auth::password::PasswordError::TooShort
            )))
        );
        assert!(accounts.verify_credentials("alice", "Password123!"));

        let token = manager.issue_default("alice@example.com").unwrap();
        assert_eq!(
            manager.reset_password("alice@example.com", &token, "NewPassword456!"),
            Ok(ConsumeOutcome::Success)
        );
        assert!(accounts.verify_credentials("alice", "NewPassword456!"));
        assert!(!accounts.verify_credentials("alice", "Password123!"));
    }

    #[test]
    fn test_aliases_share_one_pending_reset() {
        use crate::modules::auth::store::InMemoryAccountStore;

        let accounts = Arc::new(InMemoryAccountStore::with_iterations(1_000));
        accounts
            .register("Alice", "alice@example.com", "Password123!")
            .unwrap();
        let manager = ResetTokenManager::new(accounts.clone());

        let by_name = manager.issue_default("alice").unwrap();
        let by_caps = manager.issue_default("ALICE").unwrap();
        let by_email = manager.issue_default("alice@example.com").unwrap();

        // Only the newest token is live, whichever alias is used
        assert_eq!(manager.pending_count(), 1);
        for alias in ["alice", "ALICE", "Alice", "alice@example.com"] {
            assert_eq!(manager.validate(alias, &by_name), Validation::Mismatch);
            assert_eq!(manager.validate(alias, &by_caps), Validation::Mismatch);
            assert_eq!(manager.validate(alias, &by_email), Validation::Valid);
            assert!(manager.has_pending(alias));
        }

        assert_eq!(
            manager.reset_password("alice", &by_name, "NewPassword456!"),
            Ok(ConsumeOutcome::Mismatch)
        );
        assert_eq!(
            manager.reset_password("ALICE", &by_email, "NewPassword456!"),
            Ok(ConsumeOutcome::Success)
        );
        assert_eq!(
            manager.reset_password("alice@example.com", &by_email, "NewPassword789!"),
            Ok(ConsumeOutcome::NoPendingRequest)
        );
        assert!(accounts.verify_credentials("alice", "NewPassword456!"));
        assert_eq!(manager.pending_count(), 0);
    }

    #[test]
    fn test_revoke_through_alias() {
        use crate::modules::auth::store::InMemoryAccountStore;

        let accounts = Arc::new(InMemoryAccountStore::with_iterations(1_000));
        accounts
            .register("Bob", "bob@example.com", "Password123!")
            .unwrap();
        let manager = ResetTokenManager::new(accounts);

        let token = manager.issue_default("bob@example.com").unwrap();
        assert!(manager.expires_at("BOB").is_some());
        assert!(manager.revoke("bob"));
        assert_eq!(manager.validate("bob@example.com", &token), Validation::NoPendingRequest);
        assert!(!manager.revoke("nobody"));
    }

    #[test]
    fn test_debug_redacts_token() {
        let now = Utc::now();
        let record = PendingReset {
            account_id: "alice".to_string(),
            token: "supersecret".to_string(),
            issued_at: now,
            expires_at: now + Duration::minutes(5),
        };
        let rendered = format!("{:?}", record);
        assert!(rendered.contains("alice"));
        assert!(!rendered.contains("supersecret"));
    }
}
