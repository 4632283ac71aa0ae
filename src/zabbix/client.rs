use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::{debug, instrument};

use super::{
    ApiError, DiscoveryRule, HistoryQuery, HistoryRow, Item, ItemId, MonitoringApi, Problem,
    Trigger,
};
use crate::config::ZabbixConfig;

const ITEM_OUTPUT: &[&str] = &[
    "itemid",
    "hostid",
    "name",
    "key_",
    "units",
    "lastvalue",
    "value_type",
];

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    #[serde(default)]
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
    #[serde(default)]
    data: String,
}

/// JSON-RPC client for the Zabbix frontend API, authenticated with an API token.
pub struct ZabbixClient {
    http: Client,
    endpoint: String,
    token: String,
    next_id: AtomicU64,
}

impl ZabbixClient {
    pub fn new(config: &ZabbixConfig, token: String) -> Result<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("pgwidget/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            http,
            endpoint: endpoint_for(&config.url),
            token,
            next_id: AtomicU64::new(1),
        })
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &'static str,
        params: Value,
    ) -> Result<T, ApiError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": id,
        });

        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await
            .map_err(|source| ApiError::Transport { method, source })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::Status { method, status });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|source| ApiError::Transport { method, source })?;
        let decoded: RpcResponse<T> = serde_json::from_slice(&bytes)
            .map_err(|source| ApiError::Decode { method, source })?;

        if let Some(err) = decoded.error {
            return Err(ApiError::Rpc {
                method,
                code: err.code,
                message: err.message,
                data: err.data,
            });
        }

        decoded.result.ok_or_else(|| ApiError::Rpc {
            method,
            code: 0,
            message: "response carried neither result nor error".into(),
            data: String::new(),
        })
    }
}

fn endpoint_for(url: &str) -> String {
    let trimmed = url.trim().trim_end_matches('/');
    if trimmed.ends_with(".php") {
        trimmed.to_string()
    } else {
        format!("{trimmed}/api_jsonrpc.php")
    }
}

#[async_trait]
impl MonitoringApi for ZabbixClient {
    #[instrument(skip(self))]
    async fn host_items(&self, hostid: &str) -> Result<Vec<Item>, ApiError> {
        let items: Vec<Item> = self
            .call(
                "item.get",
                json!({
                    "output": ITEM_OUTPUT,
                    "hostids": [hostid],
                    "monitored": true,
                    "webitems": true,
                }),
            )
            .await?;
        debug!(count = items.len(), "fetched host items");
        Ok(items)
    }

    #[instrument(skip(self))]
    async fn item(&self, itemid: &ItemId) -> Result<Option<Item>, ApiError> {
        let items: Vec<Item> = self
            .call(
                "item.get",
                json!({
                    "output": ITEM_OUTPUT,
                    "itemids": [itemid],
                    "webitems": true,
                }),
            )
            .await?;
        Ok(items.into_iter().next())
    }

    #[instrument(skip(self))]
    async fn discovery_rules(
        &self,
        hostid: &str,
        key_search: &str,
    ) -> Result<Vec<DiscoveryRule>, ApiError> {
        self.call(
            "discoveryrule.get",
            json!({
                "output": ["itemid", "key_"],
                "hostids": [hostid],
                "search": { "key_": key_search },
                "sortfield": "itemid",
                "sortorder": "DESC",
            }),
        )
        .await
    }

    #[instrument(skip(self, query), fields(items = query.itemids.len(), limit = query.limit))]
    async fn history(&self, query: &HistoryQuery) -> Result<Vec<HistoryRow>, ApiError> {
        self.call(
            "history.get",
            json!({
                "output": ["itemid", "clock", "value"],
                "history": query.value_type.code(),
                "itemids": query.itemids,
                "sortfield": "clock",
                "sortorder": "DESC",
                "limit": query.limit,
            }),
        )
        .await
    }

    #[instrument(skip(self))]
    async fn active_problems(
        &self,
        hostid: &str,
        severities: &[u8],
    ) -> Result<Vec<Problem>, ApiError> {
        self.call(
            "problem.get",
            json!({
                "output": ["eventid", "objectid", "severity", "name"],
                "hostids": [hostid],
                "severities": severities,
                "suppressed": false,
                "recent": false,
                "sortfield": ["eventid"],
                "sortorder": "DESC",
            }),
        )
        .await
    }

    #[instrument(skip(self), fields(triggers = triggerids.len()))]
    async fn triggers_with_items(&self, triggerids: &[String]) -> Result<Vec<Trigger>, ApiError> {
        self.call(
            "trigger.get",
            json!({
                "output": ["triggerid"],
                "triggerids": triggerids,
                "selectItems": ["itemid"],
            }),
        )
        .await
    }
}
