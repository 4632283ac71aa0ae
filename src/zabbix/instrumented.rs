use async_trait::async_trait;
use tracing::warn;

use super::{
    ApiError, DiscoveryRule, HistoryQuery, HistoryRow, Item, ItemId, MonitoringApi, Problem,
    Trigger,
};
use crate::metrics::AppMetrics;

/// Decorator that records every failed upstream call in the metrics registry.
pub struct InstrumentedApi<A> {
    inner: A,
    metrics: AppMetrics,
}

impl<A> InstrumentedApi<A> {
    pub fn new(inner: A, metrics: AppMetrics) -> Self {
        Self { inner, metrics }
    }

    fn observe<T>(&self, result: Result<T, ApiError>) -> Result<T, ApiError> {
        if let Err(err) = &result {
            warn!(method = err.method(), error = %err, "upstream call failed");
            self.metrics.inc_upstream_error(err.method());
        }
        result
    }
}

#[async_trait]
impl<A: MonitoringApi> MonitoringApi for InstrumentedApi<A> {
    async fn host_items(&self, hostid: &str) -> Result<Vec<Item>, ApiError> {
        self.observe(self.inner.host_items(hostid).await)
    }

    async fn item(&self, itemid: &ItemId) -> Result<Option<Item>, ApiError> {
        self.observe(self.inner.item(itemid).await)
    }

    async fn discovery_rules(
        &self,
        hostid: &str,
        key_search: &str,
    ) -> Result<Vec<DiscoveryRule>, ApiError> {
        self.observe(self.inner.discovery_rules(hostid, key_search).await)
    }

    async fn history(&self, query: &HistoryQuery) -> Result<Vec<HistoryRow>, ApiError> {
        self.observe(self.inner.history(query).await)
    }

    async fn active_problems(
        &self,
        hostid: &str,
        severities: &[u8],
    ) -> Result<Vec<Problem>, ApiError> {
        self.observe(self.inner.active_problems(hostid, severities).await)
    }

    async fn triggers_with_items(&self, triggerids: &[String]) -> Result<Vec<Trigger>, ApiError> {
        self.observe(self.inner.triggers_with_items(triggerids).await)
    }
}
