//! # Auth Provider
//!
//! Obtains and refreshes the tokens sessions present during login.
//!
//! The provider wraps an [`Authenticator`] (the actual network flow,
//! collaborator-supplied) with:
//! - a process-wide token cache keyed by [`AccountRef`] — the only state
//!   shared across sessions, synchronized here
//! - per-account coalescing: concurrent requests for one account fold
//!   into a single in-flight flow, all callers get the resulting token
//! - proactive refresh when remaining validity falls under the configured
//!   margin; a failed refresh invalidates the token and falls back to a
//!   full re-authentication
//! - bounded exponential backoff around every network flow, surfacing
//!   [`AuthError`] to the requesting session once the attempt ceiling is
//!   reached — fatal to that session, never to the orchestrator
//!
//! ## Usage
//! ```ignore
//! let provider = AuthProvider::new(
//!     Arc::new(OfflineAuthenticator::default()),
//!     AuthSettings::default(),
//! );
//! let token = provider.token_for(&AccountRef::new("swarm_01")).await?;
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::auth::token::{AccountRef, AuthToken};
use crate::config::AuthSettings;
use crate::error::AuthError;
use crate::utils::backoff::Backoff;

/// The concrete authentication flow against an account service.
///
/// Implementations own the network side (or the lack of one); the
/// provider owns caching, coalescing and retries.
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Perform a full authentication for `account`.
    async fn authenticate(&self, account: &AccountRef) -> Result<AuthToken, AuthError>;

    /// Exchange a refresh token for a replacement token.
    async fn refresh(&self, token: &AuthToken) -> Result<AuthToken, AuthError>;
}

/// No-service authenticator: derives deterministic credentials from the
/// account name. Used when no real account service is configured, e.g.
/// for fleets of generated identities against private servers.
pub struct OfflineAuthenticator {
    ttl: Duration,
}

impl OfflineAuthenticator {
    pub fn new(ttl: Duration) -> Self {
        Self { ttl }
    }
}

impl Default for OfflineAuthenticator {
    fn default() -> Self {
        Self::new(Duration::from_secs(24 * 3600))
    }
}

#[async_trait]
impl Authenticator for OfflineAuthenticator {
    async fn authenticate(&self, account: &AccountRef) -> Result<AuthToken, AuthError> {
        let mut hasher = Sha256::new();
        hasher.update(b"offline:");
        hasher.update(account.as_str().as_bytes());
        let digest = hasher.finalize();

        let mut id_bytes = [0u8; 16];
        id_bytes.copy_from_slice(&digest[..16]);

        Ok(AuthToken {
            account_id: Uuid::from_bytes(id_bytes),
            username: account.as_str().to_owned(),
            access_token: hex(&digest[16..]),
            refresh_token: String::new(),
            expires_at: Instant::now() + self.ttl,
        })
    }

    async fn refresh(&self, token: &AuthToken) -> Result<AuthToken, AuthError> {
        let mut refreshed = token.clone();
        refreshed.expires_at = Instant::now() + self.ttl;
        Ok(refreshed)
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Process-wide token store plus coalescing and retry policy.
///
/// One instance is shared (`Arc`) by every session the orchestrator
/// spawns; it is passed in explicitly, never ambient.
pub struct AuthProvider {
    authenticator: Arc<dyn Authenticator>,
    settings: AuthSettings,
    tokens: Mutex<HashMap<AccountRef, AuthToken>>,
    /// Per-account gates serializing acquisition: at most one outstanding
    /// auth flow per account.
    gates: Mutex<HashMap<AccountRef, Arc<Mutex<()>>>>,
}

impl AuthProvider {
    pub fn new(authenticator: Arc<dyn Authenticator>, settings: AuthSettings) -> Self {
        Self {
            authenticator,
            settings,
            tokens: Mutex::new(HashMap::new()),
            gates: Mutex::new(HashMap::new()),
        }
    }

    /// A token for `account`, valid for at least the refresh margin.
    ///
    /// Fast path: a cached fresh token. Slow path: one coalesced refresh
    /// or full authentication flow.
    ///
    /// # Errors
    /// [`AuthError`] once every retry is exhausted or the service rejects
    /// the account outright.
    pub async fn token_for(&self, account: &AccountRef) -> Result<AuthToken, AuthError> {
        if let Some(token) = self.cached_fresh(account).await {
            return Ok(token);
        }

        let gate = self.gate(account).await;
        let _held = gate.lock().await;

        // Re-check under the gate: a coalesced caller finds the token the
        // first one acquired.
        if let Some(token) = self.cached_fresh(account).await {
            debug!(%account, "coalesced into completed auth flow");
            return Ok(token);
        }

        let stale = self.tokens.lock().await.get(account).cloned();
        let token = match stale {
            Some(stale) if !stale.refresh_token.is_empty() => {
                match self.refresh_with_backoff(&stale).await {
                    Ok(refreshed) => refreshed,
                    Err(err) => {
                        warn!(%account, error = %err, "refresh failed, re-authenticating");
                        self.invalidate(account).await;
                        self.acquire_with_backoff(account).await?
                    }
                }
            }
            _ => self.acquire_with_backoff(account).await?,
        };

        self.tokens
            .lock()
            .await
            .insert(account.clone(), token.clone());
        Ok(token)
    }

    /// Drop the cached token for `account`; the next request performs a
    /// full re-authentication.
    pub async fn invalidate(&self, account: &AccountRef) {
        self.tokens.lock().await.remove(account);
    }

    /// Number of cached tokens, expired or not.
    pub async fn cached_count(&self) -> usize {
        self.tokens.lock().await.len()
    }

    async fn cached_fresh(&self, account: &AccountRef) -> Option<AuthToken> {
        let tokens = self.tokens.lock().await;
        tokens
            .get(account)
            .filter(|t| !t.expires_within(self.settings.refresh_margin()))
            .cloned()
    }

    async fn gate(&self, account: &AccountRef) -> Arc<Mutex<()>> {
        let mut gates = self.gates.lock().await;
        Arc::clone(
            gates
                .entry(account.clone())
                .or_insert_with(|| Arc::new(Mutex::new(()))),
        )
    }

    fn backoff(&self) -> Backoff {
        Backoff::new(
            Duration::from_millis(self.settings.backoff_base_ms),
            Duration::from_millis(self.settings.backoff_max_ms),
            self.settings.max_attempts,
        )
    }

    async fn acquire_with_backoff(&self, account: &AccountRef) -> Result<AuthToken, AuthError> {
        let mut backoff = self.backoff();
        loop {
            match self.authenticator.authenticate(account).await {
                Ok(token) => {
                    info!(%account, "authenticated");
                    return Ok(token);
                }
                Err(err @ AuthError::Rejected(_)) => return Err(err),
                Err(err) => match backoff.next_delay() {
                    Some(delay) => {
                        warn!(%account, error = %err, delay_ms = delay.as_millis() as u64,
                            "authentication attempt failed, backing off");
                        tokio::time::sleep(delay).await;
                    }
                    None => return Err(AuthError::AttemptsExhausted(backoff.attempts())),
                },
            }
        }
    }

    async fn refresh_with_backoff(&self, stale: &AuthToken) -> Result<AuthToken, AuthError> {
        let mut backoff = self.backoff();
        loop {
            match self.authenticator.refresh(stale).await {
                Ok(token) => {
                    debug!(username = %stale.username, "token refreshed");
                    return Ok(token);
                }
                Err(err @ AuthError::Rejected(_)) => return Err(err),
                Err(err) => match backoff.next_delay() {
                    Some(delay) => {
                        warn!(username = %stale.username, error = %err,
                            "refresh attempt failed, backing off");
                        tokio::time::sleep(delay).await;
                    }
                    None => return Err(AuthError::TokenExpired(stale.username.clone())),
                },
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Authenticator that counts flows and can be told to fail.
    struct CountingAuthenticator {
        auth_calls: AtomicU32,
        refresh_calls: AtomicU32,
        fail_auth: AtomicU32,
        fail_refresh: bool,
        ttl: Duration,
    }

    impl CountingAuthenticator {
        fn new(ttl: Duration) -> Self {
            Self {
                auth_calls: AtomicU32::new(0),
                refresh_calls: AtomicU32::new(0),
                fail_auth: AtomicU32::new(0),
                fail_refresh: false,
                ttl,
            }
        }
    }

    #[async_trait]
    impl Authenticator for CountingAuthenticator {
        async fn authenticate(&self, account: &AccountRef) -> Result<AuthToken, AuthError> {
            self.auth_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_auth.load(Ordering::SeqCst) > 0 {
                self.fail_auth.fetch_sub(1, Ordering::SeqCst);
                return Err(AuthError::Service("unavailable".into()));
            }
            // Slow enough that concurrent callers pile onto the gate.
            tokio::time::sleep(Duration::from_millis(20)).await;
            Ok(AuthToken {
                account_id: Uuid::from_u128(7),
                username: account.as_str().to_owned(),
                access_token: "access".into(),
                refresh_token: "refresh".into(),
                expires_at: Instant::now() + self.ttl,
            })
        }

        async fn refresh(&self, token: &AuthToken) -> Result<AuthToken, AuthError> {
            self.refresh_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_refresh {
                return Err(AuthError::Service("refresh rejected".into()));
            }
            let mut refreshed = token.clone();
            refreshed.expires_at = Instant::now() + self.ttl;
            Ok(refreshed)
        }
    }

    fn settings() -> AuthSettings {
        AuthSettings {
            refresh_margin_secs: 1,
            max_attempts: 3,
            backoff_base_ms: 1,
            backoff_max_ms: 5,
        }
    }

    #[tokio::test]
    async fn test_concurrent_acquisitions_coalesce() {
        let auth = Arc::new(CountingAuthenticator::new(Duration::from_secs(3600)));
        let provider = Arc::new(AuthProvider::new(auth.clone(), settings()));
        let account = AccountRef::new("swarm_01");

        let mut handles = Vec::new();
        for _ in 0..16 {
            let provider = Arc::clone(&provider);
            let account = account.clone();
            handles.push(tokio::spawn(
                async move { provider.token_for(&account).await },
            ));
        }

        for handle in handles {
            let token = handle.await.unwrap().unwrap();
            assert_eq!(token.username, "swarm_01");
        }

        // All sixteen callers, exactly one network flow.
        assert_eq!(auth.auth_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_distinct_accounts_do_not_coalesce() {
        let auth = Arc::new(CountingAuthenticator::new(Duration::from_secs(3600)));
        let provider = Arc::new(AuthProvider::new(auth.clone(), settings()));

        let a = provider.token_for(&AccountRef::new("a")).await.unwrap();
        let b = provider.token_for(&AccountRef::new("b")).await.unwrap();
        assert_ne!(a.username, b.username);
        assert_eq!(auth.auth_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_token_under_margin_is_refreshed() {
        // TTL below the refresh margin: every use finds the token stale.
        let auth = Arc::new(CountingAuthenticator::new(Duration::from_millis(500)));
        let provider = AuthProvider::new(auth.clone(), settings());
        let account = AccountRef::new("swarm_01");

        provider.token_for(&account).await.unwrap();
        provider.token_for(&account).await.unwrap();

        assert_eq!(auth.auth_calls.load(Ordering::SeqCst), 1);
        assert_eq!(auth.refresh_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_refresh_falls_back_to_full_auth() {
        let mut inner = CountingAuthenticator::new(Duration::from_millis(500));
        inner.fail_refresh = true;
        let auth = Arc::new(inner);
        let provider = AuthProvider::new(auth.clone(), settings());
        let account = AccountRef::new("swarm_01");

        provider.token_for(&account).await.unwrap();
        provider.token_for(&account).await.unwrap();

        // Second call: refresh retried to exhaustion, then re-auth.
        assert_eq!(auth.refresh_calls.load(Ordering::SeqCst), 3);
        assert_eq!(auth.auth_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_transient_failures_retried_then_succeed() {
        let inner = CountingAuthenticator::new(Duration::from_secs(3600));
        inner.fail_auth.store(2, Ordering::SeqCst);
        let auth = Arc::new(inner);
        let provider = AuthProvider::new(auth.clone(), settings());

        let token = provider.token_for(&AccountRef::new("x")).await.unwrap();
        assert_eq!(token.username, "x");
        assert_eq!(auth.auth_calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_attempts_exhausted_surfaces_auth_error() {
        let inner = CountingAuthenticator::new(Duration::from_secs(3600));
        inner.fail_auth.store(10, Ordering::SeqCst);
        let auth = Arc::new(inner);
        let provider = AuthProvider::new(auth, settings());

        let err = provider
            .token_for(&AccountRef::new("x"))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::AttemptsExhausted(3)));
    }

    #[tokio::test]
    async fn test_offline_authenticator_is_deterministic() {
        let auth = OfflineAuthenticator::default();
        let a = auth
            .authenticate(&AccountRef::new("swarm_01"))
            .await
            .unwrap();
        let b = auth
            .authenticate(&AccountRef::new("swarm_01"))
            .await
            .unwrap();
        assert_eq!(a.account_id, b.account_id);
        assert_eq!(a.access_token, b.access_token);

        let other = auth
            .authenticate(&AccountRef::new("swarm_02"))
            .await
            .unwrap();
        assert_ne!(a.account_id, other.account_id);
    }
}
