//! Certificate issuance.
//!
//! # Responsibilities
//! - Load or register the ACME account (credentials cached on disk)
//! - Place an order for one host and answer its TLS-ALPN-01 challenge
//! - Poll the order, finalize with a fresh key, download the chain
//!
//! # Design Decisions
//! - Issuance sits behind the `Issuer` trait so the manager can be driven
//!   without a CA
//! - The challenge certificate is removed on every exit path, including
//!   cancellation
//! - Polling is bounded by `acme.order_timeout_secs`

use std::future::Future;
use std::time::Duration;

use instant_acme::{
    Account, AccountCredentials, AuthorizationStatus, ChallengeType, Identifier, NewAccount,
    NewOrder, Order, OrderStatus,
};
use rcgen::{CertificateParams, KeyPair};
use tokio::sync::OnceCell;

use crate::acme::cache::{DirCache, ACCOUNT_KEY};
use crate::acme::certificate::IssuedCertificate;
use crate::acme::challenge::ChallengeStore;
use crate::acme::error::{AcmeError, AcmeResult};
use crate::config::AcmeConfig;
use crate::resilience::backoff::Backoff;

const POLL_BASE: Duration = Duration::from_millis(250);
const POLL_MAX: Duration = Duration::from_secs(5);

/// Something that can obtain a certificate for a host.
pub trait Issuer: Send + Sync + 'static {
    /// Obtain a fresh certificate for `host`.
    ///
    /// Implementations answering TLS-ALPN-01 register their validation
    /// certificate in `challenges` while the order is pending.
    fn issue(
        &self,
        host: &str,
        challenges: &ChallengeStore,
    ) -> impl Future<Output = AcmeResult<IssuedCertificate>> + Send;
}

/// Issuer speaking ACME to a public CA.
pub struct AcmeIssuer {
    directory_url: String,
    contact: Vec<String>,
    order_timeout: Duration,
    cache: DirCache,
    account: OnceCell<Account>,
}

impl AcmeIssuer {
    pub fn new(config: &AcmeConfig) -> Self {
        Self {
            directory_url: config.directory_url.clone(),
            contact: config.contact.clone(),
            order_timeout: Duration::from_secs(config.order_timeout_secs),
            cache: DirCache::new(&config.cache_dir),
            account: OnceCell::new(),
        }
    }

    async fn account(&self) -> AcmeResult<&Account> {
        self.account.get_or_try_init(|| self.load_or_create_account()).await
    }

    async fn load_or_create_account(&self) -> AcmeResult<Account> {
        if let Some(data) = self.cache.get(ACCOUNT_KEY).await? {
            let credentials: AccountCredentials = serde_json::from_slice(&data)?;
            let account = Account::from_credentials(credentials).await?;
            tracing::info!("Loaded ACME account from cache");
            return Ok(account);
        }

        let contact: Vec<&str> = self.contact.iter().map(String::as_str).collect();
        let (account, credentials) = Account::create(
            &NewAccount {
                contact: &contact,
                terms_of_service_agreed: true,
                only_return_existing: false,
            },
            &self.directory_url,
            None,
        )
        .await?;

        self.cache
            .put(ACCOUNT_KEY, &serde_json::to_vec(&credentials)?)
            .await?;
        tracing::info!(directory = %self.directory_url, "Registered ACME account");
        Ok(account)
    }

    async fn complete_order(
        &self,
        order: &mut Order,
        host: &str,
        challenges: &ChallengeStore,
    ) -> AcmeResult<IssuedCertificate> {
        let authorizations = order.authorizations().await?;
        for authz in &authorizations {
            match authz.status {
                AuthorizationStatus::Pending => {}
                AuthorizationStatus::Valid => continue,
                status => {
                    return Err(AcmeError::OrderFailed {
                        host: host.to_string(),
                        reason: format!("authorization is {status:?}"),
                    })
                }
            }

            let challenge = authz
                .challenges
                .iter()
                .find(|c| c.r#type == ChallengeType::TlsAlpn01)
                .ok_or_else(|| AcmeError::NoChallenge(host.to_string()))?;

            let key_auth = order.key_authorization(challenge);
            challenges.register(host, key_auth.digest().as_ref())?;
            order.set_challenge_ready(&challenge.url).await?;
        }

        self.wait_until_ready(order, host).await?;

        let key = KeyPair::generate()?;
        let csr = CertificateParams::new(vec![host.to_string()])?.serialize_request(&key)?;
        order.finalize(csr.der()).await?;

        let chain_pem = self.download_chain(order, host).await?;
        IssuedCertificate::from_pem(&format!("{}{}", key.serialize_pem(), chain_pem))
    }

    async fn wait_until_ready(&self, order: &mut Order, host: &str) -> AcmeResult<()> {
        let mut backoff = Backoff::new(POLL_BASE, POLL_MAX, self.order_timeout);
        loop {
            let state = order.refresh().await?;
            match state.status {
                OrderStatus::Ready | OrderStatus::Valid => return Ok(()),
                OrderStatus::Invalid => {
                    return Err(AcmeError::OrderFailed {
                        host: host.to_string(),
                        reason: format!("order became invalid: {:?}", state.error),
                    })
                }
                _ => {}
            }

            tracing::debug!(host, attempt = backoff.attempts(), "Order not ready yet");
            if !backoff.wait().await {
                return Err(AcmeError::OrderTimeout(host.to_string()));
            }
        }
    }

    async fn download_chain(&self, order: &mut Order, host: &str) -> AcmeResult<String> {
        let mut backoff = Backoff::new(POLL_BASE, POLL_MAX, self.order_timeout);
        loop {
            if let Some(chain) = order.certificate().await? {
                return Ok(chain);
            }
            if !backoff.wait().await {
                return Err(AcmeError::OrderTimeout(host.to_string()));
            }
        }
    }
}

impl Issuer for AcmeIssuer {
    async fn issue(&self, host: &str, challenges: &ChallengeStore) -> AcmeResult<IssuedCertificate> {
        let account = self.account().await?;
        let identifiers = [Identifier::Dns(host.to_string())];
        let mut order = account
            .new_order(&NewOrder {
                identifiers: &identifiers,
            })
            .await?;

        let _challenge = challenges.guard(host);
        self.complete_order(&mut order, host, challenges).await
    }
}
