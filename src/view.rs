use std::collections::BTreeMap;
use std::time::Instant;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, info, instrument, warn};

use crate::alerts;
use crate::annotate;
use crate::app::AppContext;
use crate::discovery;
use crate::extract;
use crate::fields::{DEFAULT_CPU_HIGH, DEFAULT_CPU_WARN, DEFAULT_GRAPH_PERIOD, WidgetFields};
use crate::health::{self, HealthScore, ScoringHints};
use crate::history;
use crate::metrics::{HostReport, RenderOutcome};
use crate::model::{Database, MetricSet};
use crate::zabbix::ItemId;

pub const MISSING_HOST_ERROR: &str = "Select a host first.";

/// Everything the rendering layer needs for one widget.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WidgetPayload {
    pub databases: Vec<Database>,
    pub cluster_metrics: MetricSet,
    pub host_metrics: MetricSet,
    pub visibility: BTreeMap<String, bool>,
    pub visible_metric_keys: Vec<String>,
    pub visible_host_metric_keys: Vec<String>,
    pub cpu_warn_threshold: f64,
    pub cpu_high_threshold: f64,
    pub health_weights: BTreeMap<String, f64>,
    pub default_db: String,
    pub show_optional: bool,
    pub zabbix_base_url: String,
    pub graph_period: u64,
    pub selected_db: Option<String>,
    pub health: Option<HealthScore>,
    pub generated_at: DateTime<Utc>,
    pub error: Option<String>,
}

impl WidgetPayload {
    /// Payload carrying the configuration echo but no data.
    fn empty(fields: &WidgetFields) -> Self {
        Self {
            databases: Vec::new(),
            cluster_metrics: MetricSet::new(),
            host_metrics: MetricSet::new(),
            visibility: fields.visibility.clone(),
            visible_metric_keys: fields.visible_metric_keys(),
            visible_host_metric_keys: fields.visible_host_metric_keys(),
            cpu_warn_threshold: fields.cpu_warn_threshold,
            cpu_high_threshold: fields.cpu_high_threshold,
            health_weights: fields.health_weights.to_map(),
            default_db: fields.default_db.clone(),
            show_optional: fields.show_optional,
            zabbix_base_url: fields.zabbix_base_url.clone(),
            graph_period: fields.graph_period,
            selected_db: None,
            health: None,
            generated_at: Utc::now(),
            error: None,
        }
    }

    pub fn missing_host(fields: &WidgetFields) -> Self {
        Self {
            error: Some(MISSING_HOST_ERROR.to_string()),
            ..Self::empty(fields)
        }
    }

    /// Payload for a render that failed unexpectedly; nothing of the request survives.
    pub fn failure(message: impl std::fmt::Display) -> Self {
        Self {
            databases: Vec::new(),
            cluster_metrics: MetricSet::new(),
            host_metrics: MetricSet::new(),
            visibility: BTreeMap::new(),
            visible_metric_keys: Vec::new(),
            visible_host_metric_keys: Vec::new(),
            cpu_warn_threshold: DEFAULT_CPU_WARN,
            cpu_high_threshold: DEFAULT_CPU_HIGH,
            health_weights: BTreeMap::new(),
            default_db: String::new(),
            show_optional: true,
            zabbix_base_url: String::new(),
            graph_period: DEFAULT_GRAPH_PERIOD,
            selected_db: None,
            health: None,
            generated_at: Utc::now(),
            error: Some(format!("View action error: {message}")),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Render the widget for `request`. Never fails: faults become an error payload.
pub async fn render(ctx: &AppContext, request: &Map<String, Value>) -> WidgetPayload {
    let started = Instant::now();

    let (payload, outcome) = match try_render(ctx, request).await {
        Ok(payload) if payload.is_error() => (payload, RenderOutcome::MissingHost),
        Ok(payload) => (payload, RenderOutcome::Ok),
        Err(err) => {
            warn!(error = ?err, "widget render failed");
            (WidgetPayload::failure(format!("{err:#}")), RenderOutcome::Failed)
        }
    };

    ctx.metrics.observe_render(outcome, started.elapsed());
    payload
}

/// Host whose items are shown and the discovery item feeding the database list.
struct Target {
    hostid: String,
    discovery_itemid: Option<ItemId>,
}

/// A configured discovery item decides the host; an unknown one is dropped and
/// the host's own discovery rules are searched instead.
async fn resolve_target(ctx: &AppContext, fields: &WidgetFields) -> Option<Target> {
    let api = ctx.api.as_ref();
    let hostid = fields.hostid.clone();

    if let Some(configured) = &fields.discovery_itemid {
        if let Some(item) = discovery::lookup_discovery_item(api, configured).await {
            let hostid = item.hostid.clone().or(hostid)?;
            return Some(Target {
                hostid,
                discovery_itemid: Some(item.itemid),
            });
        }
        debug!(itemid = %configured, "ignoring unknown discovery item");
    }

    let hostid = hostid?;
    let discovery_itemid = discovery::find_discovery_item(api, &hostid).await;
    Some(Target {
        hostid,
        discovery_itemid,
    })
}

#[instrument(skip_all)]
pub async fn try_render(ctx: &AppContext, request: &Map<String, Value>) -> Result<WidgetPayload> {
    let fields = WidgetFields::parse(request, &ctx.config.widget);
    if !fields.has_target() {
        return Ok(WidgetPayload::missing_host(&fields));
    }
    let Some(target) = resolve_target(ctx, &fields).await else {
        return Ok(WidgetPayload::missing_host(&fields));
    };
    let api = ctx.api.as_ref();
    let hostid = target.hostid.as_str();

    let discovered = match &target.discovery_itemid {
        Some(itemid) => discovery::discovered_databases(api, itemid).await,
        None => Vec::new(),
    };

    let items = api
        .host_items(hostid)
        .await
        .with_context(|| format!("failed to list items of host {hostid}"))?;

    let keys = fields.key_config();
    let mut metrics_by_db = extract::database_metrics(&items, &keys);
    let mut cluster_metrics = extract::cluster_metrics(&items, &keys);
    let mut host_metrics = extract::host_metrics(&items, &keys);

    let names = discovery::resolve_database_names(discovered, &metrics_by_db);
    let mut databases: Vec<Database> = names
        .into_iter()
        .map(|name| Database {
            metrics: metrics_by_db.remove(&name).unwrap_or_default(),
            name,
            health: None,
        })
        .collect();

    let targets = history::history_targets(
        &items,
        [&cluster_metrics, &host_metrics]
            .into_iter()
            .chain(databases.iter().map(|db| &db.metrics)),
    );
    let windows = history::fetch_windows(api, &targets, ctx.history_concurrency()).await;
    let samples: usize = windows.values().map(Vec::len).sum();

    history::attach_history(&mut cluster_metrics, &windows);
    history::attach_history(&mut host_metrics, &windows);
    for db in &mut databases {
        history::attach_history(&mut db.metrics, &windows);
    }

    let referenced = alerts::referenced_items(
        [&cluster_metrics, &host_metrics]
            .into_iter()
            .chain(databases.iter().map(|db| &db.metrics)),
    );
    let active = alerts::correlate(api, hostid, fields.alert_min_severity, &referenced).await;
    alerts::attach_alerts(&mut cluster_metrics, &active);
    alerts::attach_alerts(&mut host_metrics, &active);
    for db in &mut databases {
        alerts::attach_alerts(&mut db.metrics, &active);
    }

    let link = fields.graph_link();
    annotate::annotate(&mut cluster_metrics, link.as_ref(), None);
    annotate::annotate(&mut host_metrics, link.as_ref(), Some(fields.cpu_thresholds()));
    for db in &mut databases {
        annotate::annotate(&mut db.metrics, link.as_ref(), None);
    }

    let hints = ScoringHints {
        custom_connections_key: keys.is_customized("active_connections"),
    };
    for db in &mut databases {
        db.health = Some(health::compute(
            &cluster_metrics,
            Some(&db.metrics),
            &fields.health_weights,
            hints,
        ));
    }

    let selected = databases
        .iter()
        .find(|db| db.name == fields.default_db)
        .or_else(|| databases.first());
    let selected_db = selected.map(|db| db.name.clone());
    let health = match selected {
        Some(db) => db.health.clone(),
        None => Some(health::compute(
            &cluster_metrics,
            None,
            &fields.health_weights,
            hints,
        )),
    }
    .filter(|score| score.total.is_some());
    ctx.metrics.record_host(
        hostid,
        HostReport {
            items: items.len(),
            history_samples: samples,
            health: health.as_ref().and_then(|score| score.total),
        },
    );

    info!(
        host = hostid,
        items = items.len(),
        databases = databases.len(),
        history_samples = samples,
        alerts = active.len(),
        health = ?health.as_ref().and_then(|score| score.total),
        "widget rendered"
    );

    Ok(WidgetPayload {
        databases,
        cluster_metrics,
        host_metrics,
        selected_db,
        health,
        ..WidgetPayload::empty(&fields)
    })
}
