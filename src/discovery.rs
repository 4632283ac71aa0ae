use std::collections::{BTreeMap, BTreeSet};

use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::model::MetricSet;
use crate::zabbix::{HistoryQuery, Item, ItemId, MonitoringApi, ValueType};

/// Substring identifying the database discovery rule key.
pub const DISCOVERY_KEY: &str = "pgsql.db.discovery";
/// Discovery macro carrying the database name.
pub const DBNAME_MACRO: &str = "{#DBNAME}";

/// Look up a configured discovery item. Unknown ids resolve to `None`.
#[instrument(skip(api))]
pub async fn lookup_discovery_item(api: &dyn MonitoringApi, itemid: &ItemId) -> Option<Item> {
    match api.item(itemid).await {
        Ok(Some(item)) => Some(item),
        Ok(None) => {
            debug!("configured discovery item not found");
            None
        }
        Err(err) => {
            warn!(error = %err, "failed to look up discovery item");
            None
        }
    }
}

/// Newest discovery rule of the host whose key contains [`DISCOVERY_KEY`].
#[instrument(skip(api))]
pub async fn find_discovery_item(api: &dyn MonitoringApi, hostid: &str) -> Option<ItemId> {
    let rules = match api.discovery_rules(hostid, DISCOVERY_KEY).await {
        Ok(rules) => rules,
        Err(err) => {
            warn!(error = %err, "failed to list discovery rules");
            return None;
        }
    };

    rules
        .into_iter()
        .filter(|rule| rule.key.contains(DISCOVERY_KEY))
        .max_by_key(|rule| rule.itemid.numeric().unwrap_or(0))
        .map(|rule| rule.itemid)
}

/// Database names from the latest discovery payload, sorted and de-duplicated.
#[instrument(skip(api))]
pub async fn discovered_databases(api: &dyn MonitoringApi, itemid: &ItemId) -> Vec<String> {
    let query = HistoryQuery {
        value_type: ValueType::Text,
        itemids: vec![itemid.clone()],
        limit: 1,
    };

    let rows = match api.history(&query).await {
        Ok(rows) => rows,
        Err(err) => {
            warn!(error = %err, "failed to fetch discovery history");
            return Vec::new();
        }
    };

    let Some(latest) = rows.into_iter().max_by_key(|row| row.clock) else {
        debug!("discovery item has no history");
        return Vec::new();
    };

    let names = parse_discovery_payload(&latest.value);
    debug!(count = names.len(), collected_at = ?latest.collected_at(), "parsed discovery payload");
    names
}

/// Accepts a bare array of rows or `{"data": [rows]}`; anything else is empty.
pub fn parse_discovery_payload(raw: &str) -> Vec<String> {
    let parsed: Value = match serde_json::from_str(raw) {
        Ok(value) => value,
        Err(err) => {
            debug!(error = %err, "discovery payload is not JSON");
            return Vec::new();
        }
    };

    let rows = match &parsed {
        Value::Array(rows) => rows,
        Value::Object(map) => match map.get("data") {
            Some(Value::Array(rows)) => rows,
            _ => return Vec::new(),
        },
        _ => return Vec::new(),
    };

    let names: BTreeSet<String> = rows
        .iter()
        .filter_map(|row| row.get(DBNAME_MACRO))
        .filter_map(|value| match value {
            Value::String(name) => Some(name.clone()),
            Value::Number(number) => Some(number.to_string()),
            _ => None,
        })
        .filter(|name| !name.is_empty())
        .collect();

    names.into_iter().collect()
}

/// Discovered names, or the databases seen in extracted metrics when discovery gave nothing.
pub fn resolve_database_names(
    discovered: Vec<String>,
    metrics_by_db: &BTreeMap<String, MetricSet>,
) -> Vec<String> {
    if discovered.is_empty() {
        metrics_by_db.keys().cloned().collect()
    } else {
        discovered
    }
}
