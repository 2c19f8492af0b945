//! HTTP integration with the fleet platform.
//!
//! Three services hide behind this module: the task manager that
//! assigns remote package locations (`jobs`), the per-package status
//! notification channel (`notify`), and the disk/bag record service
//! the batch strategy cross-references (`remote_ledger`). All of
//! them share one JSON-over-HTTP convention: a response counts as
//! accepted only when the HTTP status is ok AND the body carries
//! `code == 0` (the platform emits it both as a number and a string).

pub mod jobs;
pub mod notify;
pub mod remote_ledger;

use std::fmt;
use std::time::Duration;

use anyhow::{Context, Result};
use log::{error, warn};
use serde_json::Value;
use tokio::time::sleep;

use crate::constants::{HTTP_RETRY_WAIT_SECS, HTTP_TIMEOUT_SECS, MAX_HTTP_RETRIES};

/// A platform exchange that ran out of attempts. Errors carrying this
/// in their chain map to the connection exit code rather than the
/// general one.
#[derive(Debug)]
pub struct PlatformUnreachable(pub String);

impl fmt::Display for PlatformUnreachable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for PlatformUnreachable {}

/// True when the platform body signals acceptance.
fn code_is_zero(body: &Value) -> bool {
    match body.get("code") {
        Some(Value::Number(n)) => n.as_i64() == Some(0),
        Some(Value::String(s)) => s == "0",
        _ => false,
    }
}

/// Shared HTTP client for every platform call.
#[derive(Clone)]
pub struct PlatformClient {
    http: reqwest::Client,
}

impl PlatformClient {
    pub fn new() -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(PlatformClient { http })
    }

    /// POST a JSON payload with bounded retry.
    ///
    /// Transport failures wait before the next attempt; a reachable
    /// platform that answers with a bad status or a nonzero code is
    /// retried immediately. Returns the accepted body, or `None` once
    /// the attempts run out.
    pub async fn post_json(&self, url: &str, payload: &Value) -> Option<Value> {
        for attempt in 1..=MAX_HTTP_RETRIES {
            match self.try_post(url, payload).await {
                Ok(Some(body)) => {
                    if code_is_zero(&body) {
                        return Some(body);
                    }
                    warn!(
                        "Platform rejected POST {} (attempt {}): {}",
                        url, attempt, body
                    );
                }
                Ok(None) => {}
                Err(e) => {
                    warn!("POST {} attempt {} failed: {}", url, attempt, e);
                    if attempt < MAX_HTTP_RETRIES {
                        sleep(Duration::from_secs(HTTP_RETRY_WAIT_SECS)).await;
                    }
                }
            }
        }

        error!("POST {} failed after {} attempts", url, MAX_HTTP_RETRIES);
        None
    }

    async fn try_post(&self, url: &str, payload: &Value) -> Result<Option<Value>, reqwest::Error> {
        let response = self.http.post(url).json(payload).send().await?;

        let status = response.status();
        if !status.is_success() {
            warn!("POST {} returned {}", url, status);
            return Ok(None);
        }

        Ok(Some(response.json::<Value>().await?))
    }

    /// Single-attempt GET returning the `data` field of an accepted body.
    pub async fn get_json(&self, url: &str, params: &[(&str, &str)]) -> Option<Value> {
        let response = match self.http.get(url).query(params).send().await {
            Ok(response) => response,
            Err(e) => {
                warn!("GET {} failed: {}", url, e);
                return None;
            }
        };

        let status = response.status();
        if !status.is_success() {
            warn!("GET {} returned {}", url, status);
            return None;
        }

        let body: Value = match response.json().await {
            Ok(body) => body,
            Err(e) => {
                warn!("GET {} returned undecodable body: {}", url, e);
                return None;
            }
        };

        if !code_is_zero(&body) {
            warn!("Platform rejected GET {}: {}", url, body);
            return None;
        }

        body.get("data").cloned()
    }
}
