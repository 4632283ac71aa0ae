#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use pgwidget::app::AppContext;
use pgwidget::config::AppConfig;
use pgwidget::metrics::AppMetrics;
use pgwidget::zabbix::{
    ApiError, DiscoveryRule, HistoryQuery, HistoryRow, Item, ItemId, MonitoringApi, Problem,
    Trigger, TriggerItem, ValueType,
};
use serde_json::{Map, Value};

pub const HOST: &str = "10084";

/// In-memory monitoring API with canned responses.
#[derive(Default)]
pub struct FakeApi {
    pub items: Vec<Item>,
    pub rules: Vec<DiscoveryRule>,
    pub history: HashMap<ItemId, Vec<HistoryRow>>,
    pub problems: Vec<Problem>,
    pub triggers: Vec<Trigger>,
    /// JSON-RPC methods that fail.
    pub failing: HashSet<&'static str>,
    pub calls: Mutex<Vec<String>>,
}

impl FakeApi {
    pub fn with_items(items: Vec<Item>) -> Self {
        Self {
            items,
            ..Self::default()
        }
    }

    pub fn add_history(&mut self, itemid: &str, values: &[f64]) {
        let rows = values
            .iter()
            .enumerate()
            .map(|(idx, value)| HistoryRow {
                itemid: ItemId::from(itemid),
                clock: 1_700_000_000 + idx as i64 * 60,
                value: value.to_string(),
            })
            .collect();
        self.history.insert(ItemId::from(itemid), rows);
    }

    pub fn add_discovery(&mut self, itemid: &str, payload: &str) {
        self.rules.push(DiscoveryRule {
            itemid: ItemId::from(itemid),
            key: "pgsql.db.discovery[\"{$PG.URI}\"]".into(),
        });
        self.history.insert(
            ItemId::from(itemid),
            vec![HistoryRow {
                itemid: ItemId::from(itemid),
                clock: 1_700_000_000,
                value: payload.into(),
            }],
        );
    }

    pub fn add_problem(&mut self, eventid: &str, triggerid: &str, severity: u8, name: &str, items: &[&str]) {
        self.problems.push(Problem {
            eventid: eventid.into(),
            objectid: triggerid.into(),
            severity,
            name: name.into(),
        });
        self.triggers.push(Trigger {
            triggerid: triggerid.into(),
            items: items
                .iter()
                .map(|id| TriggerItem {
                    itemid: ItemId::from(*id),
                })
                .collect(),
        });
    }

    pub fn fail(mut self, method: &'static str) -> Self {
        self.failing.insert(method);
        self
    }

    pub fn calls_to(&self, method: &str) -> usize {
        self.calls
            .lock()
            .expect("calls lock")
            .iter()
            .filter(|call| call.as_str() == method)
            .count()
    }

    fn enter(&self, method: &'static str) -> Result<(), ApiError> {
        self.calls.lock().expect("calls lock").push(method.to_string());
        if self.failing.contains(method) {
            return Err(ApiError::Rpc {
                method,
                code: -32500,
                message: "Application error.".into(),
                data: "simulated failure".into(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl MonitoringApi for FakeApi {
    async fn host_items(&self, hostid: &str) -> Result<Vec<Item>, ApiError> {
        self.enter("item.get")?;
        Ok(self
            .items
            .iter()
            .filter(|item| item.hostid.as_deref().is_none_or(|host| host == hostid))
            .cloned()
            .collect())
    }

    async fn item(&self, itemid: &ItemId) -> Result<Option<Item>, ApiError> {
        self.enter("item.get")?;
        let from_rules = self.rules.iter().find(|rule| &rule.itemid == itemid).map(|rule| Item {
            itemid: rule.itemid.clone(),
            hostid: Some(HOST.into()),
            name: "Database discovery".into(),
            key: rule.key.clone(),
            units: String::new(),
            lastvalue: None,
            value_type: ValueType::Text,
        });
        Ok(from_rules.or_else(|| self.items.iter().find(|item| &item.itemid == itemid).cloned()))
    }

    async fn discovery_rules(
        &self,
        _hostid: &str,
        key_search: &str,
    ) -> Result<Vec<DiscoveryRule>, ApiError> {
        self.enter("discoveryrule.get")?;
        Ok(self
            .rules
            .iter()
            .filter(|rule| rule.key.contains(key_search))
            .cloned()
            .collect())
    }

    async fn history(&self, query: &HistoryQuery) -> Result<Vec<HistoryRow>, ApiError> {
        self.enter("history.get")?;
        let mut rows: Vec<HistoryRow> = query
            .itemids
            .iter()
            .filter_map(|id| self.history.get(id))
            .flatten()
            .cloned()
            .collect();
        rows.sort_by_key(|row| std::cmp::Reverse(row.clock));
        rows.truncate(query.limit);
        Ok(rows)
    }

    async fn active_problems(
        &self,
        _hostid: &str,
        severities: &[u8],
    ) -> Result<Vec<Problem>, ApiError> {
        self.enter("problem.get")?;
        Ok(self
            .problems
            .iter()
            .filter(|problem| severities.contains(&problem.severity))
            .cloned()
            .collect())
    }

    async fn triggers_with_items(&self, triggerids: &[String]) -> Result<Vec<Trigger>, ApiError> {
        self.enter("trigger.get")?;
        Ok(self
            .triggers
            .iter()
            .filter(|trigger| triggerids.contains(&trigger.triggerid))
            .cloned()
            .collect())
    }
}

pub fn item(id: &str, key: &str, value: &str, units: &str) -> Item {
    Item {
        itemid: ItemId::from(id),
        hostid: Some(HOST.into()),
        name: format!("Item {id}"),
        key: key.into(),
        units: units.into(),
        lastvalue: Some(value.into()),
        value_type: ValueType::Float,
    }
}

pub fn context(api: FakeApi) -> (AppContext, Arc<FakeApi>) {
    context_with(api, AppConfig::default())
}

pub fn context_with(api: FakeApi, config: AppConfig) -> (AppContext, Arc<FakeApi>) {
    let api = Arc::new(api);
    let metrics = AppMetrics::new().expect("metrics");
    let ctx = AppContext::new(config, api.clone(), metrics);
    (ctx, api)
}

pub fn fields(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        other => panic!("expected JSON object, got {other}"),
    }
}

/// A small but complete cluster: two databases, cluster and host metrics.
pub fn cluster_items() -> Vec<Item> {
    vec![
        item("100", "pgsql.connections.sum.total_pct", "40", "%"),
        item("101", "pgsql.connections.sum.idle_in_transaction", "0", ""),
        item("102", "pgsql.wal.count", "40", ""),
        item("103", r#"pgsql.cache.hit["{$PG.URI}"]"#, "99.5", "%"),
        item("104", r#"pgsql.oldest.xid["{$PG.URI}"]"#, "5000000", ""),
        item("200", r#"pgsql.db.size["app"]"#, "1048576", "B"),
        item("201", r#"pgsql.dbstat.xact_commit.rate["app"]"#, "340", "tps"),
        item("202", r#"pgsql.dbstat.xact_rollback.rate["app"]"#, "12", "tps"),
        item("203", r#"pgsql.queries.query.slow_count["app"]"#, "0", ""),
        item("204", r#"pgsql.db.bloating_tables["app"]"#, "0", ""),
        item("210", r#"pgsql.db.size["billing"]"#, "2048", "B"),
        item("211", r#"pgsql.db.bloating_tables["billing"]"#, "12", ""),
        item("300", "system.cpu.load[all,avg1]", "2.5", ""),
        item("301", "vm.memory.size[total]", "8589934592", "B"),
    ]
}
