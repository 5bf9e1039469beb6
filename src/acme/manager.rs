//! On-demand certificate management.
//!
//! # Responsibilities
//! - Enforce the host allow-list before any issuance
//! - Serve certificates from memory, then disk, then the issuer
//! - Renew inside the renewal window, keeping the old certificate on failure
//!
//! # Design Decisions
//! - At most one issuance in flight per host. It runs in its own task and
//!   callers only wait on it, so a caller giving up (a handshake timeout)
//!   never cancels an order
//! - The in-flight entry is removed by the task itself once it settles
//! - The fast path is a lock-free map read
//! - All waiters observe the same `Arc<IssuedCertificate>`

use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use rustls::ServerConfig;
use tokio::sync::watch;

use crate::acme::cache::DirCache;
use crate::acme::certificate::IssuedCertificate;
use crate::acme::challenge::ChallengeStore;
use crate::acme::error::{AcmeError, AcmeResult};
use crate::acme::issuer::Issuer;
use crate::acme::policy::HostPolicy;
use crate::config::AcmeConfig;
use crate::observability::metrics;

const SECS_PER_DAY: u64 = 86_400;

type Outcome = Result<Arc<IssuedCertificate>, Arc<AcmeError>>;

pub struct CertManager<I> {
    policy: HostPolicy,
    store: Arc<Store<I>>,
}

/// State shared with issuance tasks.
struct Store<I> {
    cache: DirCache,
    issuer: I,
    renew_before: Duration,
    certs: DashMap<String, Arc<IssuedCertificate>>,
    in_flight: DashMap<String, watch::Receiver<Option<Outcome>>>,
    challenges: ChallengeStore,
}

impl<I: Issuer> CertManager<I> {
    pub fn new(config: &AcmeConfig, issuer: I) -> Self {
        Self {
            policy: HostPolicy::new(&config.allowed_hosts),
            store: Arc::new(Store {
                cache: DirCache::new(&config.cache_dir),
                issuer,
                renew_before: Duration::from_secs(
                    config.renew_before_days.saturating_mul(SECS_PER_DAY),
                ),
                certs: DashMap::new(),
                in_flight: DashMap::new(),
                challenges: ChallengeStore::new(),
            }),
        }
    }

    pub fn challenges(&self) -> &ChallengeStore {
        &self.store.challenges
    }

    /// Number of hosts with an issuance task still running.
    pub fn in_flight(&self) -> usize {
        self.store.in_flight.len()
    }

    /// TLS configuration answering a pending TLS-ALPN-01 challenge.
    pub fn challenge_config(&self, host: &str) -> Option<Arc<ServerConfig>> {
        let host = self.policy.check(host).ok()?;
        self.store.challenges.get(&host)
    }

    /// Certificate for `host`, issuing or renewing it if needed.
    ///
    /// Dropping the returned future stops waiting; the issuance itself
    /// carries on and its result is kept for the next caller.
    pub async fn get_certificate(&self, host: &str) -> AcmeResult<Arc<IssuedCertificate>> {
        let host = self.policy.check(host)?;
        if let Some(cert) = self.store.fresh(&host) {
            return Ok(cert);
        }

        let mut rx = self.join_or_spawn(&host);
        let outcome = {
            let settled = rx
                .wait_for(Option::is_some)
                .await
                .map_err(|_| AcmeError::Aborted(host.clone()))?;
            Option::clone(&settled)
        };

        match outcome {
            Some(Ok(cert)) => Ok(cert),
            Some(Err(e)) => Err(AcmeError::Issuance(e)),
            None => Err(AcmeError::Aborted(host)),
        }
    }

    fn join_or_spawn(&self, host: &str) -> watch::Receiver<Option<Outcome>> {
        match self.store.in_flight.entry(host.to_string()) {
            Entry::Occupied(entry) => entry.get().clone(),
            Entry::Vacant(entry) => {
                let (tx, rx) = watch::channel(None);
                entry.insert(rx.clone());

                let store = Arc::clone(&self.store);
                let host = host.to_string();
                tokio::spawn(async move {
                    let outcome = store.resolve(&host).await.map_err(Arc::new);
                    store.in_flight.remove(&host);
                    let _ = tx.send(Some(outcome));
                });
                rx
            }
        }
    }
}

impl<I: Issuer> Store<I> {
    fn fresh(&self, host: &str) -> Option<Arc<IssuedCertificate>> {
        self.certs
            .get(host)
            .map(|entry| Arc::clone(entry.value()))
            .filter(|cert| !cert.needs_renewal(self.renew_before))
    }

    async fn resolve(&self, host: &str) -> AcmeResult<Arc<IssuedCertificate>> {
        // A task that finished just before this one was spawned.
        if let Some(cert) = self.fresh(host) {
            return Ok(cert);
        }

        let in_memory = self.certs.get(host).map(|entry| Arc::clone(entry.value()));
        let stale = match in_memory {
            Some(cert) => Some(cert),
            None => match self.load_cached(host).await? {
                Some(cert) if !cert.needs_renewal(self.renew_before) => {
                    tracing::info!(host, "Using cached certificate");
                    self.certs.insert(host.to_string(), Arc::clone(&cert));
                    return Ok(cert);
                }
                other => other,
            },
        };

        match self.issue(host).await {
            Ok(cert) => Ok(cert),
            Err(e) => match stale {
                Some(cert) if !cert.is_expired() => {
                    tracing::warn!(host, error = %e, "Renewal failed, serving current certificate");
                    self.certs.insert(host.to_string(), Arc::clone(&cert));
                    Ok(cert)
                }
                _ => Err(e),
            },
        }
    }

    async fn load_cached(&self, host: &str) -> AcmeResult<Option<Arc<IssuedCertificate>>> {
        let Some(data) = self.cache.get(host).await? else {
            return Ok(None);
        };

        let parsed = String::from_utf8(data)
            .map_err(|e| AcmeError::InvalidCertificate(e.to_string()))
            .and_then(|pem| IssuedCertificate::from_pem(&pem));
        match parsed {
            Ok(cert) => Ok(Some(Arc::new(cert))),
            Err(e) => {
                tracing::warn!(host, error = %e, "Ignoring unreadable cached certificate");
                Ok(None)
            }
        }
    }

    async fn issue(&self, host: &str) -> AcmeResult<Arc<IssuedCertificate>> {
        tracing::info!(host, "Requesting certificate");
        let issued = {
            let _challenge = self.challenges.guard(host);
            self.issuer.issue(host, &self.challenges).await
        };
        let cert = match issued {
            Ok(cert) => Arc::new(cert),
            Err(e) => {
                metrics::record_issuance("failure");
                tracing::error!(host, error = %e, "Certificate issuance failed");
                return Err(e);
            }
        };
        metrics::record_issuance("success");

        if let Err(e) = self.cache.put(host, cert.pem().as_bytes()).await {
            tracing::error!(host, error = %e, "Failed to persist certificate");
        }
        self.certs.insert(host.to_string(), Arc::clone(&cert));

        tracing::info!(host, not_after = ?cert.not_after(), "Certificate issued");
        Ok(cert)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rcgen::{CertificateParams, KeyPair};
    use std::sync::atomic::{AtomicUsize, Ordering};

    const HOST: &str = "relay.example.com";

    /// Issues self-signed certificates and counts how often it is asked.
    struct FakeIssuer {
        calls: Arc<AtomicUsize>,
        delay: Duration,
        expired_first: bool,
        fail_from: usize,
        register_challenge: bool,
    }

    impl FakeIssuer {
        fn new(calls: Arc<AtomicUsize>) -> Self {
            Self {
                calls,
                delay: Duration::from_millis(20),
                expired_first: false,
                fail_from: usize::MAX,
                register_challenge: false,
            }
        }
    }

    impl Issuer for FakeIssuer {
        async fn issue(&self, host: &str, challenges: &ChallengeStore) -> AcmeResult<IssuedCertificate> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if self.register_challenge {
                challenges.register(host, &[5u8; 32])?;
            }
            tokio::time::sleep(self.delay).await;
            if call >= self.fail_from {
                return Err(AcmeError::OrderFailed {
                    host: host.to_string(),
                    reason: "challenge rejected".into(),
                });
            }

            let key = KeyPair::generate()?;
            let mut params = CertificateParams::new(vec![host.to_string()])?;
            if call == 0 && self.expired_first {
                params.not_before = rcgen::date_time_ymd(2000, 1, 1);
                params.not_after = rcgen::date_time_ymd(2001, 1, 1);
            }
            let cert = params.self_signed(&key)?;
            IssuedCertificate::from_pem(&format!("{}{}", key.serialize_pem(), cert.pem()))
        }
    }

    fn config(dir: &std::path::Path) -> AcmeConfig {
        AcmeConfig {
            allowed_hosts: vec![HOST.to_string()],
            cache_dir: dir.to_string_lossy().into_owned(),
            ..AcmeConfig::default()
        }
    }

    #[tokio::test]
    async fn test_disallowed_host_never_issues() {
        let dir = tempfile::tempdir().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let manager = CertManager::new(&config(dir.path()), FakeIssuer::new(calls.clone()));

        let err = manager.get_certificate("attacker.example.net").await.unwrap_err();
        assert!(matches!(err, AcmeError::HostNotAllowed(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(manager.challenge_config("attacker.example.net").is_none());
    }

    #[tokio::test]
    async fn test_concurrent_first_requests_issue_once() {
        let dir = tempfile::tempdir().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let mut issuer = FakeIssuer::new(calls.clone());
        issuer.delay = Duration::from_millis(200);
        let manager = Arc::new(CertManager::new(&config(dir.path()), issuer));

        let m1 = manager.clone();
        let m2 = manager.clone();
        let t1 = tokio::spawn(async move { m1.get_certificate(HOST).await });
        let t2 = tokio::spawn(async move { m2.get_certificate("Relay.Example.com.").await });

        let c1 = t1.await.unwrap().unwrap();
        let c2 = t2.await.unwrap().unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1, "exactly one issuance");
        assert!(Arc::ptr_eq(&c1, &c2), "both callers see the same certificate");
    }

    #[tokio::test]
    async fn test_cached_certificate_survives_restart() {
        let dir = tempfile::tempdir().unwrap();

        let first_calls = Arc::new(AtomicUsize::new(0));
        let first = CertManager::new(&config(dir.path()), FakeIssuer::new(first_calls.clone()));
        let issued = first.get_certificate(HOST).await.unwrap();
        assert_eq!(first_calls.load(Ordering::SeqCst), 1);
        assert!(dir.path().join(HOST).exists());

        let second_calls = Arc::new(AtomicUsize::new(0));
        let second = CertManager::new(&config(dir.path()), FakeIssuer::new(second_calls.clone()));
        let loaded = second.get_certificate(HOST).await.unwrap();

        assert_eq!(second_calls.load(Ordering::SeqCst), 0);
        assert_eq!(loaded.chain(), issued.chain());
    }

    #[tokio::test]
    async fn test_expired_certificate_is_renewed() {
        let dir = tempfile::tempdir().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let mut issuer = FakeIssuer::new(calls.clone());
        issuer.expired_first = true;
        let manager = CertManager::new(&config(dir.path()), issuer);

        let expired = manager.get_certificate(HOST).await.unwrap();
        assert!(expired.is_expired());

        let renewed = manager.get_certificate(HOST).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(!renewed.is_expired());

        // The renewed certificate is now served without further issuance.
        let again = manager.get_certificate(HOST).await.unwrap();
        assert!(Arc::ptr_eq(&renewed, &again));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_failed_renewal_keeps_valid_certificate() {
        let dir = tempfile::tempdir().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let mut issuer = FakeIssuer::new(calls.clone());
        issuer.fail_from = 1;

        // A window wider than the certificate lifetime puts it up for renewal
        // immediately while it is still valid.
        let mut cfg = config(dir.path());
        cfg.renew_before_days = 365 * 3000;
        let manager = CertManager::new(&cfg, issuer);

        let first = manager.get_certificate(HOST).await.unwrap();
        let second = manager.get_certificate(HOST).await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn test_failed_issuance_is_scoped_to_the_call() {
        let dir = tempfile::tempdir().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let mut issuer = FakeIssuer::new(calls.clone());
        issuer.fail_from = 0;
        let manager = CertManager::new(&config(dir.path()), issuer);

        let err = manager.get_certificate(HOST).await.unwrap_err();
        assert!(matches!(err.root(), AcmeError::OrderFailed { .. }));
        assert!(manager.get_certificate(HOST).await.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 2, "each attempt retries issuance");
    }

    #[tokio::test]
    async fn test_corrupt_cache_entry_is_reissued() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(HOST), "not a pem bundle").unwrap();

        let calls = Arc::new(AtomicUsize::new(0));
        let manager = CertManager::new(&config(dir.path()), FakeIssuer::new(calls.clone()));
        manager.get_certificate(HOST).await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let cached = std::fs::read_to_string(dir.path().join(HOST)).unwrap();
        assert!(cached.contains("BEGIN CERTIFICATE"));
    }

    #[tokio::test]
    async fn test_abandoned_wait_does_not_cancel_issuance() {
        let dir = tempfile::tempdir().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let mut issuer = FakeIssuer::new(calls.clone());
        issuer.delay = Duration::from_millis(300);
        let manager = CertManager::new(&config(dir.path()), issuer);

        let waited = tokio::time::timeout(Duration::from_millis(100), manager.get_certificate(HOST)).await;
        assert!(waited.is_err(), "caller gave up before issuance finished");
        assert_eq!(manager.in_flight(), 1);

        // Nobody is waiting any more; the order still completes and persists.
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(manager.in_flight(), 0);
        assert!(dir.path().join(HOST).exists());

        manager.get_certificate(HOST).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1, "no second issuance");
    }

    #[tokio::test]
    async fn test_late_caller_joins_running_issuance() {
        let dir = tempfile::tempdir().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let mut issuer = FakeIssuer::new(calls.clone());
        issuer.delay = Duration::from_millis(300);
        let manager = CertManager::new(&config(dir.path()), issuer);

        let _ = tokio::time::timeout(Duration::from_millis(50), manager.get_certificate(HOST)).await;
        manager.get_certificate(HOST).await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(manager.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_challenge_cleared_after_issuance() {
        let dir = tempfile::tempdir().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let mut issuer = FakeIssuer::new(calls.clone());
        issuer.register_challenge = true;
        issuer.delay = Duration::from_millis(200);
        let manager = Arc::new(CertManager::new(&config(dir.path()), issuer));

        let pending = {
            let manager = manager.clone();
            tokio::spawn(async move { manager.get_certificate(HOST).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(manager.challenge_config(HOST).is_some(), "challenge served while the order is pending");

        pending.await.unwrap().unwrap();
        assert!(manager.challenges().is_empty());
        assert!(manager.challenge_config(HOST).is_none());
    }

    #[tokio::test]
    async fn test_challenge_cleared_after_failed_issuance() {
        let dir = tempfile::tempdir().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let mut issuer = FakeIssuer::new(calls.clone());
        issuer.register_challenge = true;
        issuer.fail_from = 0;
        let manager = CertManager::new(&config(dir.path()), issuer);

        assert!(manager.get_certificate(HOST).await.is_err());
        assert!(manager.challenges().is_empty());
        assert_eq!(manager.in_flight(), 0);
    }
}
