use std::sync::Arc;

use anyhow::Result;

use crate::config::AppConfig;
use crate::metrics::AppMetrics;
use crate::zabbix::{InstrumentedApi, MonitoringApi, ZabbixClient};

/// Shared application context passed to HTTP handlers and the render command.
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<AppConfig>,
    pub api: Arc<dyn MonitoringApi>,
    pub metrics: AppMetrics,
}

impl AppContext {
    pub fn new(config: AppConfig, api: Arc<dyn MonitoringApi>, metrics: AppMetrics) -> Self {
        Self {
            config: Arc::new(config),
            api,
            metrics,
        }
    }

    /// Context backed by the configured Zabbix frontend, with upstream
    /// failures counted in `metrics`.
    pub fn connect(config: AppConfig, metrics: AppMetrics) -> Result<Self> {
        let client = ZabbixClient::new(&config.zabbix, config.token.clone())?;
        let api = InstrumentedApi::new(client, metrics.clone());
        Ok(Self::new(config, Arc::new(api), metrics))
    }

    pub fn history_concurrency(&self) -> usize {
        self.config.zabbix.history_concurrency.max(1)
    }
}
