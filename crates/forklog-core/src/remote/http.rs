//! REST client for the hosted remote ledger.

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use reqwest::{RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};

use super::{RemoteError, RemoteLedger, RemoteResult};
use crate::config::EngineConfig;
use crate::models::{AccountId, Entry, EntryId};
use crate::util::{compact_text, is_http_url, normalize_text_option};

/// HTTP client for `accounts/{accountId}/entries/{entryId}` on the ledger API.
#[derive(Clone)]
pub struct HttpLedger {
    base_url: String,
    client: reqwest::Client,
    access_token: Arc<RwLock<Option<String>>>,
}

impl fmt::Debug for HttpLedger {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let has_token = self
            .access_token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some();
        formatter
            .debug_struct("HttpLedger")
            .field("base_url", &self.base_url)
            .field("access_token", &if has_token { "[REDACTED]" } else { "None" })
            .finish_non_exhaustive()
    }
}

impl HttpLedger {
    /// Builds a client for an explicit API base URL.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> crate::Result<Self> {
        let base_url = normalize_base_url(base_url.into())?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| {
                crate::Error::Config(format!("Failed to construct HTTP client: {error}"))
            })?;
        Ok(Self {
            base_url,
            client,
            access_token: Arc::new(RwLock::new(None)),
        })
    }

    /// Builds a client from engine config; `None` when no ledger URL is configured.
    pub fn from_config(config: &EngineConfig) -> crate::Result<Option<Self>> {
        config
            .ledger_base_url
            .as_deref()
            .map(|base_url| Self::new(base_url, config.ledger_timeout()))
            .transpose()
    }

    /// Returns the base URL this client was configured with.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Replace the bearer token used for ledger requests.
    pub fn set_access_token(&self, token: Option<String>) {
        let token = normalize_text_option(token);
        *self
            .access_token
            .write()
            .unwrap_or_else(PoisonError::into_inner) = token;
    }

    fn entries_url(&self, account_id: &AccountId) -> String {
        format!(
            "{}/v1/accounts/{}/entries",
            self.base_url,
            urlencoding::encode(account_id.as_str())
        )
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        let token = self
            .access_token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let request = request.header("Accept", "application/json");
        match token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

impl RemoteLedger for HttpLedger {
    async fn list_entries(&self, account_id: &AccountId) -> RemoteResult<Vec<Entry>> {
        let request = self.authorize(self.client.get(self.entries_url(account_id)));
        let response = send(request).await?;
        let payload = response
            .json::<ListEntriesResponse>()
            .await
            .map_err(|error| RemoteError::InvalidPayload(error.to_string()))?;
        Ok(payload.entries)
    }

    async fn commit_group(&self, account_id: &AccountId, entries: &[Entry]) -> RemoteResult<()> {
        let url = format!("{}:commit", self.entries_url(account_id));
        let request = self.authorize(
            self.client
                .post(url)
                .json(&CommitRequest { writes: entries }),
        );
        let response = send(request).await?;
        let payload = response
            .json::<CommitResponse>()
            .await
            .map_err(|error| RemoteError::InvalidPayload(error.to_string()))?;

        if payload.committed != entries.len() {
            return Err(RemoteError::InvalidPayload(format!(
                "ledger acknowledged {} of {} writes",
                payload.committed,
                entries.len()
            )));
        }
        Ok(())
    }

    async fn delete_entry(&self, account_id: &AccountId, entry_id: &EntryId) -> RemoteResult<()> {
        let url = format!("{}/{}", self.entries_url(account_id), entry_id);
        let request = self.authorize(self.client.delete(url));
        send(request).await?;
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct CommitRequest<'a> {
    writes: &'a [Entry],
}

#[derive(Debug, Deserialize)]
struct CommitResponse {
    committed: usize,
}

#[derive(Debug, Deserialize)]
struct ListEntriesResponse {
    #[serde(default)]
    entries: Vec<Entry>,
}

#[derive(Debug, Deserialize)]
struct LedgerErrorBody {
    error: Option<String>,
    message: Option<String>,
}

async fn send(request: RequestBuilder) -> RemoteResult<Response> {
    let response = request
        .send()
        .await
        .map_err(|error| RemoteError::Unreachable(error.to_string()))?;

    if response.status().is_success() {
        return Ok(response);
    }

    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    Err(classify_status(status, &body))
}

fn classify_status(status: StatusCode, body: &str) -> RemoteError {
    let message = parse_api_error(status, body);
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => RemoteError::PermissionDenied(message),
        StatusCode::NOT_FOUND => RemoteError::NotFound(message),
        StatusCode::PAYLOAD_TOO_LARGE | StatusCode::TOO_MANY_REQUESTS => {
            RemoteError::QuotaExceeded(message)
        }
        status if status.is_client_error() => RemoteError::InvalidPayload(message),
        _ => RemoteError::Unreachable(message),
    }
}

fn parse_api_error(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<LedgerErrorBody>(body) {
        if let Some(message) = payload.message.or(payload.error) {
            return format!("{} ({})", message.trim(), status.as_u16());
        }
    }

    let trimmed = compact_text(body);
    if trimmed.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        format!("{} ({})", trimmed, status.as_u16())
    }
}

fn normalize_base_url(raw: String) -> crate::Result<String> {
    let base_url = normalize_text_option(Some(raw))
        .ok_or_else(|| crate::Error::Config("ledger base URL must not be empty".to_string()))?;
    if is_http_url(&base_url) {
        Ok(base_url.trim_end_matches('/').to_string())
    } else {
        Err(crate::Error::Config(
            "ledger base URL must include http:// or https://".to_string(),
        ))
    }
}
