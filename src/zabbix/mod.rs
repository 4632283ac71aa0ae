use async_trait::async_trait;
use thiserror::Error;

mod client;
mod instrumented;
mod types;

pub use client::ZabbixClient;
pub use instrumented::InstrumentedApi;
pub use types::{
    DiscoveryRule, HistoryQuery, HistoryRow, Item, ItemId, Problem, Trigger,
    TriggerItem, ValueType,
};

/// Upstream failure. Callers decide whether a failure is fatal for the render
/// or just means "nothing to show" for their stage.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{method} request failed: {source}")]
    Transport {
        method: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("{method} returned HTTP {status}")]
    Status {
        method: &'static str,
        status: reqwest::StatusCode,
    },
    #[error("{method} failed: {message} {data}")]
    Rpc {
        method: &'static str,
        code: i64,
        message: String,
        data: String,
    },
    #[error("failed to decode {method} response: {source}")]
    Decode {
        method: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

impl ApiError {
    pub fn method(&self) -> &'static str {
        match self {
            ApiError::Transport { method, .. }
            | ApiError::Status { method, .. }
            | ApiError::Rpc { method, .. }
            | ApiError::Decode { method, .. } => method,
        }
    }
}

/// Everything the widget reads from the monitoring platform.
#[async_trait]
pub trait MonitoringApi: Send + Sync {
    /// Monitored, web-visible items of a host.
    async fn host_items(&self, hostid: &str) -> Result<Vec<Item>, ApiError>;

    /// A single item by id, `None` when it does not exist or is not visible.
    async fn item(&self, itemid: &ItemId) -> Result<Option<Item>, ApiError>;

    /// Discovery rules of a host whose key contains `key_search`.
    async fn discovery_rules(
        &self,
        hostid: &str,
        key_search: &str,
    ) -> Result<Vec<DiscoveryRule>, ApiError>;

    async fn history(&self, query: &HistoryQuery) -> Result<Vec<HistoryRow>, ApiError>;

    /// Active, unsuppressed problems of a host with severity in `severities`.
    async fn active_problems(
        &self,
        hostid: &str,
        severities: &[u8],
    ) -> Result<Vec<Problem>, ApiError>;

    /// Triggers by id, each with the items its expression references.
    async fn triggers_with_items(&self, triggerids: &[String]) -> Result<Vec<Trigger>, ApiError>;
}
