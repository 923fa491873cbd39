//! Clients for the external token ledger.
//!
//! The ledger owns quota; this crate only asks it how many tokens a user
//! has left. Deducting is the ledger's business once it consumes turn
//! events.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use personachat_config::{AccountConfig, AccountKind};
use personachat_core::error::AccountError;
use personachat_core::AccountService;
use reqwest::Url;
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::debug;

/// Every user gets the same balance unless individually overridden.
pub struct FixedAccountService {
    default_remaining: u64,
    overrides: RwLock<HashMap<String, u64>>,
}

impl FixedAccountService {
    pub fn new(default_remaining: u64) -> Self {
        Self {
            default_remaining,
            overrides: RwLock::new(HashMap::new()),
        }
    }

    pub async fn set_remaining(&self, user_id: impl Into<String>, remaining: u64) {
        self.overrides.write().await.insert(user_id.into(), remaining);
    }
}

#[async_trait]
impl AccountService for FixedAccountService {
    fn name(&self) -> &str {
        "fixed"
    }

    async fn remaining_tokens(&self, user_id: &str) -> Result<u64, AccountError> {
        Ok(self
            .overrides
            .read()
            .await
            .get(user_id)
            .copied()
            .unwrap_or(self.default_remaining))
    }
}

/// Asks a remote ledger: `GET {base_url}/users/{user_id}/remaining-tokens`
/// answering `{"remaining_tokens": <n>}`. The user id is sent as one
/// percent-encoded path segment.
pub struct HttpAccountService {
    base_url: Url,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct RemainingTokensResponse {
    remaining_tokens: u64,
}

impl HttpAccountService {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, AccountError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| AccountError::Unavailable(format!("Invalid ledger URL '{base_url}': {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(AccountError::Unavailable(format!(
                "Ledger URL '{base_url}' cannot carry a path"
            )));
        }
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Ok(Self { base_url, client })
    }

    fn url_for(&self, user_id: &str) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments
                .pop_if_empty()
                .push("users")
                .push(user_id)
                .push("remaining-tokens");
        }
        url
    }
}

#[async_trait]
impl AccountService for HttpAccountService {
    fn name(&self) -> &str {
        "http"
    }

    async fn remaining_tokens(&self, user_id: &str) -> Result<u64, AccountError> {
        let response = self
            .client
            .get(self.url_for(user_id))
            .send()
            .await
            .map_err(|e| AccountError::Unavailable(e.to_string()))?;

        let status = response.status().as_u16();
        if status == 404 {
            return Err(AccountError::UnknownUser(user_id.to_string()));
        }
        if !response.status().is_success() {
            return Err(AccountError::Unavailable(format!("ledger returned status {status}")));
        }

        let body: RemainingTokensResponse = response
            .json()
            .await
            .map_err(|e| AccountError::InvalidResponse(e.to_string()))?;

        debug!(user_id, remaining = body.remaining_tokens, "Fetched remaining tokens");
        Ok(body.remaining_tokens)
    }
}

/// Build the configured account service.
pub fn build_from_config(config: &AccountConfig) -> Result<Arc<dyn AccountService>, AccountError> {
    match config.kind {
        AccountKind::Fixed => Ok(Arc::new(FixedAccountService::new(config.fixed_remaining))),
        AccountKind::Http => {
            let base_url = config.base_url.as_deref().ok_or_else(|| {
                AccountError::Unavailable("account.base_url is required for the http ledger".into())
            })?;
            Ok(Arc::new(HttpAccountService::new(
                base_url,
                Duration::from_secs(config.timeout_secs),
            )?))
        }
    }
}
