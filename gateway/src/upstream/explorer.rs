use anyhow::{Context, Result};
use reqwest::Url;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::warn;

use super::UpstreamClient;
use crate::config::ExplorerConfig;
use crate::error::FetchFailure;
use crate::types::{timestamp, TokenClaim, TokenSummary, TokenSupply};

const RECENT_CLAIMS: usize = 10;

/// Block-explorer adapter for the reward token: transfer history per wallet
/// and total supply.
#[derive(Clone)]
pub struct ExplorerClient {
    upstream: UpstreamClient,
    base_url: Url,
    api_key: Option<String>,
    chain_id: u64,
    token_contract: String,
    decimals: u32,
    page_size: u32,
    max_pages: u32,
}

#[derive(Debug, Deserialize)]
struct ExplorerEnvelope {
    status: String,
    #[serde(default)]
    message: String,
    #[serde(default)]
    result: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenTransfer {
    #[serde(default)]
    hash: String,
    #[serde(default)]
    block_number: String,
    #[serde(default)]
    time_stamp: String,
    #[serde(default)]
    to: String,
    #[serde(default)]
    value: String,
}

impl ExplorerClient {
    pub fn new(upstream: UpstreamClient, config: &ExplorerConfig) -> Result<Self> {
        let base_url = Url::parse(&config.base_url).context("Invalid explorer base URL")?;
        let api_key = config
            .api_key
            .as_ref()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty());

        Ok(Self {
            upstream,
            base_url,
            api_key,
            chain_id: config.chain_id,
            token_contract: config.token_contract.clone(),
            decimals: config.token_decimals,
            page_size: config.transfer_page_size.max(1),
            max_pages: config.max_transfer_pages.max(1),
        })
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Claim summary for `wallet`, built from its incoming token transfers.
    /// Pages are read until one comes back short or `max_pages` is reached.
    pub async fn token_summary(
        &self,
        wallet: &str,
        timeout: Duration,
    ) -> Result<TokenSummary, FetchFailure> {
        let offset = self.page_size.to_string();
        let mut transfers: Vec<TokenTransfer> = Vec::new();
        let mut truncated = false;

        for page in 1..=self.max_pages {
            let page_number = page.to_string();
            let result = self
                .call(
                    &[
                        ("module", "account"),
                        ("action", "tokentx"),
                        ("address", wallet),
                        ("page", page_number.as_str()),
                        ("offset", offset.as_str()),
                        ("sort", "desc"),
                    ],
                    timeout,
                )
                .await?;

            let batch = parse_transfers(result)?;
            let short = batch.len() < self.page_size as usize;
            transfers.extend(batch);
            if short {
                break;
            }
            if page == self.max_pages {
                warn!(
                    "Transfer history for {} exceeds {} pages, summary is partial",
                    wallet, self.max_pages
                );
                truncated = true;
            }
        }

        let mut summary = summarize(wallet, &transfers, self.decimals);
        summary.truncated = truncated;
        Ok(summary)
    }

    pub async fn token_supply(&self, timeout: Duration) -> Result<TokenSupply, FetchFailure> {
        let result = self
            .call(&[("module", "stats"), ("action", "tokensupply")], timeout)
            .await?;

        let raw = match result {
            Value::String(s) => s,
            Value::Number(n) => n.to_string(),
            other => {
                return Err(FetchFailure::invalid_body(format!(
                    "unexpected supply result: {}",
                    other
                )))
            }
        };
        let formatted = scale(&raw, self.decimals)
            .ok_or_else(|| FetchFailure::invalid_body(format!("supply is not a number: {}", raw)))?;

        Ok(TokenSupply { raw, formatted })
    }

    async fn call(&self, params: &[(&str, &str)], timeout: Duration) -> Result<Value, FetchFailure> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| FetchFailure::rejected("explorer API key not configured"))?;

        let mut url = self.base_url.clone();
        {
            let chain_id = self.chain_id.to_string();
            let mut query = url.query_pairs_mut();
            query.append_pair("chainid", &chain_id);
            query.append_pair("contractaddress", &self.token_contract);
            for (k, v) in params {
                query.append_pair(k, v);
            }
            query.append_pair("apikey", api_key);
        }

        let body = self.upstream.fetch_json(url, timeout).await?;
        let envelope: ExplorerEnvelope =
            serde_json::from_value(body).map_err(|e| FetchFailure::invalid_body(e.to_string()))?;
        unwrap_envelope(envelope)
    }
}

fn unwrap_envelope(envelope: ExplorerEnvelope) -> Result<Value, FetchFailure> {
    if envelope.status == "1" {
        return Ok(envelope.result);
    }
    if envelope.message.starts_with("No transactions found") {
        return Ok(Value::Array(Vec::new()));
    }
    let detail = match &envelope.result {
        Value::String(s) if !s.is_empty() => s.clone(),
        _ => envelope.message.clone(),
    };
    Err(FetchFailure::rejected(detail))
}

/// A successful `tokentx` result must be a list; "no transactions" has
/// already been turned into an empty one.
fn parse_transfers(result: Value) -> Result<Vec<TokenTransfer>, FetchFailure> {
    match result {
        Value::Array(_) => {
            serde_json::from_value(result).map_err(|e| FetchFailure::invalid_body(e.to_string()))
        }
        other => Err(FetchFailure::invalid_body(format!(
            "transfer result is not a list: {}",
            other
        ))),
    }
}

fn scale(raw: &str, decimals: u32) -> Option<f64> {
    let n = raw.trim().parse::<f64>().ok()?;
    Some(n / 10f64.powi(decimals as i32))
}

fn summarize(wallet: &str, transfers: &[TokenTransfer], decimals: u32) -> TokenSummary {
    let mut claims: Vec<TokenClaim> = transfers
        .iter()
        .filter(|t| t.to.eq_ignore_ascii_case(wallet))
        .map(|t| TokenClaim {
            tx_hash: t.hash.clone(),
            block_number: t.block_number.parse().unwrap_or(0),
            amount: scale(&t.value, decimals).unwrap_or(0.0),
            timestamp: timestamp::parse(&Value::String(t.time_stamp.clone())),
        })
        .collect();

    claims.sort_by(|a, b| b.block_number.cmp(&a.block_number));

    let total_npt_claimed = claims.iter().map(|c| c.amount).sum();
    let last_claim_time = claims.iter().filter_map(|c| c.timestamp).max();
    let total_claims = claims.len();
    claims.truncate(RECENT_CLAIMS);

    TokenSummary {
        total_claims,
        total_npt_claimed,
        last_claim_time,
        recent_claims: claims,
        truncated: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upstream::test_support;
    use axum::{extract::Query, routing::get, Json, Router};
    use serde_json::json;
    use std::collections::HashMap;

    const WALLET: &str = "0x828F40DcCD14FAd59F7dCfb5C57F3642Ec37f89f";

    fn transfer(to: &str, value: &str, block: &str, ts: &str) -> TokenTransfer {
        TokenTransfer {
            hash: format!("0xhash{}", block),
            block_number: block.into(),
            time_stamp: ts.into(),
            to: to.into(),
            value: value.into(),
        }
    }

    #[test]
    fn test_summarize_counts_incoming_only() {
        let transfers = vec![
            transfer(&WALLET.to_lowercase(), "1500000000000000000", "10", "1735689600"),
            transfer("0xsomeoneelse", "9000000000000000000", "11", "1735689700"),
            transfer(WALLET, "500000000000000000", "12", "1735689800"),
        ];

        let summary = summarize(WALLET, &transfers, 18);
        assert_eq!(summary.total_claims, 2);
        assert!((summary.total_npt_claimed - 2.0).abs() < 1e-9);
        assert_eq!(summary.recent_claims[0].block_number, 12);
        assert_eq!(
            summary.last_claim_time.unwrap().unix_timestamp(),
            1735689800
        );
    }

    #[test]
    fn test_envelope_handling() {
        let ok = ExplorerEnvelope {
            status: "1".into(),
            message: "OK".into(),
            result: json!("42"),
        };
        assert_eq!(unwrap_envelope(ok).unwrap(), json!("42"));

        let empty = ExplorerEnvelope {
            status: "0".into(),
            message: "No transactions found".into(),
            result: json!([]),
        };
        assert_eq!(unwrap_envelope(empty).unwrap(), json!([]));

        let bad_key = ExplorerEnvelope {
            status: "0".into(),
            message: "NOTOK".into(),
            result: json!("Invalid API Key"),
        };
        assert_eq!(
            unwrap_envelope(bad_key).unwrap_err(),
            FetchFailure::rejected("Invalid API Key")
        );
    }

    #[tokio::test]
    async fn test_missing_api_key_fails_without_network() {
        let config = ExplorerConfig {
            base_url: "http://127.0.0.1:9/api".into(),
            api_key: Some("   ".into()),
            ..ExplorerConfig::default()
        };
        let client = ExplorerClient::new(UpstreamClient::new().unwrap(), &config).unwrap();
        assert!(!client.has_api_key());

        let err = client.token_supply(Duration::from_secs(1)).await.unwrap_err();
        assert_eq!(err.code(), "rejected");
    }

    #[tokio::test]
    async fn test_supply_over_http_sends_fixed_params() {
        let router = Router::new().route(
            "/api",
            get(|Query(q): Query<HashMap<String, String>>| async move {
                let ok = q.get("chainid").map(String::as_str) == Some("8453")
                    && q.get("action").map(String::as_str) == Some("tokensupply")
                    && q.get("apikey").map(String::as_str) == Some("k");
                if ok {
                    Json(json!({"status": "1", "message": "OK", "result": "2500000000000000000000"}))
                } else {
                    Json(json!({"status": "0", "message": "NOTOK", "result": "bad params"}))
                }
            }),
        );
        let base = test_support::serve(router).await;

        let config = ExplorerConfig {
            base_url: format!("{}/api", base),
            api_key: Some("k".into()),
            ..ExplorerConfig::default()
        };
        let client = ExplorerClient::new(UpstreamClient::new().unwrap(), &config).unwrap();

        let supply = client.token_supply(Duration::from_secs(2)).await.unwrap();
        assert_eq!(supply.raw, "2500000000000000000000");
        assert!((supply.formatted - 2500.0).abs() < 1e-6);
    }

    /// Explorer serving `total` incoming one-token transfers to `WALLET`,
    /// sliced by the `page`/`offset` query parameters.
    async fn paged_explorer(total: usize) -> String {
        let router = Router::new().route(
            "/api",
            get(move |Query(q): Query<HashMap<String, String>>| async move {
                let page: usize = q.get("page").and_then(|p| p.parse().ok()).unwrap_or(1);
                let offset: usize = q.get("offset").and_then(|o| o.parse().ok()).unwrap_or(100);
                let start = (page - 1) * offset;
                let rows: Vec<_> = (start..total.min(start + offset))
                    .map(|i| {
                        json!({
                            "hash": format!("0x{:x}", i),
                            "blockNumber": (total - i).to_string(),
                            "timeStamp": (1735689600 + total - i).to_string(),
                            "to": WALLET,
                            "value": "1000000000000000000"
                        })
                    })
                    .collect();
                if rows.is_empty() {
                    Json(json!({"status": "0", "message": "No transactions found", "result": []}))
                } else {
                    Json(json!({"status": "1", "message": "OK", "result": rows}))
                }
            }),
        );
        test_support::serve(router).await
    }

    fn paged_client(base: &str, max_pages: u32) -> ExplorerClient {
        let config = ExplorerConfig {
            base_url: format!("{}/api", base),
            api_key: Some("k".into()),
            max_transfer_pages: max_pages,
            ..ExplorerConfig::default()
        };
        ExplorerClient::new(UpstreamClient::new().unwrap(), &config).unwrap()
    }

    #[tokio::test]
    async fn test_summary_reads_every_page() {
        let base = paged_explorer(150).await;
        let summary = paged_client(&base, 10)
            .token_summary(WALLET, Duration::from_secs(2))
            .await
            .unwrap();

        assert_eq!(summary.total_claims, 150);
        assert!((summary.total_npt_claimed - 150.0).abs() < 1e-9);
        assert_eq!(summary.recent_claims.len(), RECENT_CLAIMS);
        assert_eq!(summary.recent_claims[0].block_number, 150);
        assert!(!summary.truncated);
    }

    #[tokio::test]
    async fn test_exact_page_multiple_stops_on_empty_page() {
        let base = paged_explorer(200).await;
        let summary = paged_client(&base, 10)
            .token_summary(WALLET, Duration::from_secs(2))
            .await
            .unwrap();
        assert_eq!(summary.total_claims, 200);
        assert!(!summary.truncated);
    }

    #[tokio::test]
    async fn test_page_cap_marks_summary_truncated() {
        let base = paged_explorer(350).await;
        let summary = paged_client(&base, 2)
            .token_summary(WALLET, Duration::from_secs(2))
            .await
            .unwrap();
        assert_eq!(summary.total_claims, 200);
        assert!(summary.truncated);
    }

    #[tokio::test]
    async fn test_non_list_transfer_result_is_invalid_body() {
        let router = Router::new().route(
            "/api",
            get(|| async { Json(json!({"status": "1", "message": "OK", "result": "rate limit reached"})) }),
        );
        let base = test_support::serve(router).await;

        let err = paged_client(&base, 10)
            .token_summary(WALLET, Duration::from_secs(2))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "invalid_body");
    }
}
