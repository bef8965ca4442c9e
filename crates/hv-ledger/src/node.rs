// Copyright 2026 abhirupbanerjee
// Licensed under the Apache License, Version 2.0

//! REST client for a ledger node.

use std::path::Path;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as B64, Engine};
use hv_types::Address;
use reqwest::header::CONTENT_TYPE;
use serde::Deserialize;

use crate::client::{AccountInfo, ChainParams, LedgerClient, NodeStatus, PendingTransaction};
use crate::error::LedgerError;

const TOKEN_HEADER: &str = "X-Algod-API-Token";

/// Validity window given to freshly built transactions.
pub const VALIDITY_WINDOW: u64 = 1_000;

pub struct NodeClient {
    base_url: String,
    token: String,
    http: reqwest::Client,
}

// ---------------------------------------------------------------------------
// Node response types
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
#[serde(rename_all = "kebab-case")]
struct ParamsResponse {
    fee: u64,
    min_fee: u64,
    last_round: u64,
    genesis_id: String,
    genesis_hash: String,
}

#[derive(Deserialize)]
struct SubmitResponse {
    #[serde(rename = "txId")]
    tx_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "kebab-case")]
struct PendingResponse {
    #[serde(default)]
    confirmed_round: Option<u64>,
    #[serde(default)]
    pool_error: String,
    #[serde(default)]
    logs: Vec<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "kebab-case")]
struct StatusResponse {
    last_round: u64,
}

#[derive(Deserialize)]
#[serde(rename_all = "kebab-case")]
struct AccountResponse {
    amount: u64,
    #[serde(default)]
    min_balance: u64,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

impl NodeClient {
    pub fn new(base_url: &str, token: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            http: reqwest::Client::new(),
        }
    }

    /// Read `algod.net` and `algod.token` from a node data directory.
    pub fn from_dir(dir: &Path) -> Result<Self, LedgerError> {
        let (url, token) = read_node_dir(dir)?;
        Ok(Self::new(&url, &token))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get<T: for<'de> Deserialize<'de>>(&self, path: &str) -> Result<T, LedgerError> {
        let resp = self
            .http
            .get(format!("{}{path}", self.base_url))
            .header(TOKEN_HEADER, &self.token)
            .send()
            .await?;
        decode(resp).await
    }
}

async fn decode<T: for<'de> Deserialize<'de>>(resp: reqwest::Response) -> Result<T, LedgerError> {
    let status = resp.status();
    if !status.is_success() {
        let text = resp.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorBody>(&text)
            .map(|b| b.message)
            .unwrap_or(text);
        return Err(LedgerError::Api {
            status: status.as_u16(),
            message,
        });
    }
    Ok(resp.json().await?)
}

fn decode_b64(field: &str, value: &str) -> Result<Vec<u8>, LedgerError> {
    B64.decode(value)
        .map_err(|e| LedgerError::Decode(format!("{field}: {e}")))
}

pub(crate) fn read_node_dir(dir: &Path) -> Result<(String, String), LedgerError> {
    let net = std::fs::read_to_string(dir.join("algod.net"))
        .map_err(|e| LedgerError::Config(format!("failed to read node url: {e}")))?;
    let mut addr = net.trim().to_string();
    if addr.starts_with("[::]") {
        // bound on all interfaces; reach it through localhost
        let port = addr.rsplit(':').next().unwrap_or_default().to_string();
        addr = format!("localhost:{port}");
    }
    let token = std::fs::read_to_string(dir.join("algod.token"))
        .map_err(|e| LedgerError::Config(format!("failed to read node token: {e}")))?;
    Ok((format!("http://{addr}"), token.trim().to_string()))
}

#[async_trait]
impl LedgerClient for NodeClient {
    async fn suggested_params(&self) -> Result<ChainParams, LedgerError> {
        let p: ParamsResponse = self.get("/v2/transactions/params").await?;
        let hash = decode_b64("genesis-hash", &p.genesis_hash)?;
        let genesis_hash: [u8; 32] = hash
            .as_slice()
            .try_into()
            .map_err(|_| LedgerError::Decode(format!("genesis-hash: {} bytes", hash.len())))?;
        Ok(ChainParams {
            fee: p.fee,
            min_fee: p.min_fee,
            first_valid: p.last_round,
            last_valid: p.last_round + VALIDITY_WINDOW,
            genesis_id: p.genesis_id,
            genesis_hash,
        })
    }

    async fn submit_raw_transaction(&self, group: &[u8]) -> Result<String, LedgerError> {
        let resp = self
            .http
            .post(format!("{}/v2/transactions", self.base_url))
            .header(TOKEN_HEADER, &self.token)
            .header(CONTENT_TYPE, "application/x-binary")
            .body(group.to_vec())
            .send()
            .await?;
        let body: SubmitResponse = decode(resp).await?;
        Ok(body.tx_id)
    }

    async fn pending_transaction(&self, txid: &str) -> Result<PendingTransaction, LedgerError> {
        let p: PendingResponse = self
            .get(&format!("/v2/transactions/pending/{txid}"))
            .await?;
        let logs = p
            .logs
            .iter()
            .map(|l| decode_b64("logs", l))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(PendingTransaction {
            confirmed_round: p.confirmed_round.filter(|r| *r > 0),
            pool_error: p.pool_error,
            logs,
        })
    }

    async fn status(&self) -> Result<NodeStatus, LedgerError> {
        let s: StatusResponse = self.get("/v2/status").await?;
        Ok(NodeStatus {
            last_round: s.last_round,
        })
    }

    async fn status_after_block(&self, round: u64) -> Result<NodeStatus, LedgerError> {
        let s: StatusResponse = self
            .get(&format!("/v2/status/wait-for-block-after/{round}"))
            .await?;
        Ok(NodeStatus {
            last_round: s.last_round,
        })
    }

    async fn account_info(&self, address: &Address) -> Result<AccountInfo, LedgerError> {
        let a: AccountResponse = self.get(&format!("/v2/accounts/{address}")).await?;
        Ok(AccountInfo {
            amount: a.amount,
            min_balance: a.min_balance,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_dir_rewrites_wildcard_bind() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path();
        std::fs::write(dir.join("algod.net"), "[::]:4001\n").unwrap();
        std::fs::write(dir.join("algod.token"), " secret-token \n").unwrap();

        let (url, token) = read_node_dir(dir).unwrap();
        assert_eq!(url, "http://localhost:4001");
        assert_eq!(token, "secret-token");

        std::fs::write(dir.join("algod.net"), "127.0.0.1:8080").unwrap();
        let client = NodeClient::from_dir(dir).unwrap();
        assert_eq!(client.base_url(), "http://127.0.0.1:8080");
    }

    #[test]
    fn node_dir_missing_files() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(matches!(read_node_dir(tmp.path()), Err(LedgerError::Config(_))));
    }

    #[test]
    fn pending_response_shape() {
        let raw = r#"{"confirmed-round": 12, "pool-error": "", "logs": ["FR98dQAAAAAAAAAF"]}"#;
        let p: PendingResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(p.confirmed_round, Some(12));
        let log = decode_b64("logs", &p.logs[0]).unwrap();
        assert_eq!(&log[..4], &[0x15, 0x1f, 0x7c, 0x75]);
        assert_eq!(u64::from_be_bytes(log[4..12].try_into().unwrap()), 5);

        let empty: PendingResponse = serde_json::from_str("{}").unwrap();
        assert_eq!(empty.confirmed_round, None);
        assert!(empty.logs.is_empty());
    }
}
