use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;

use crate::keys::{KeyConfig, Scope, host_label};
use crate::model::{Metric, MetricSet};
use crate::zabbix::Item;

/// Last quoted key parameter, directly before the closing bracket.
static DB_NAME_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""([^"]+)"\]$"#).expect("valid database name pattern"));

/// Database name embedded in an item key, e.g. `pgsql.db.size["app"]` gives `app`.
pub fn database_name(item_key: &str) -> Option<&str> {
    DB_NAME_PATTERN
        .captures(item_key)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

/// Per-database metric sets keyed by database name.
pub fn database_metrics(items: &[Item], keys: &KeyConfig) -> BTreeMap<String, MetricSet> {
    let mut result: BTreeMap<String, MetricSet> = BTreeMap::new();

    for item in items {
        let Some(name) = keys.classify_in(Scope::Database, &item.key) else {
            continue;
        };
        let Some(db_name) = database_name(&item.key) else {
            continue;
        };

        result
            .entry(db_name.to_string())
            .or_default()
            .entry(name.to_string())
            .or_insert_with(|| Metric::from_item(item));
    }

    result
}

/// Cluster-wide metrics; the first item seen for a semantic name wins.
pub fn cluster_metrics(items: &[Item], keys: &KeyConfig) -> MetricSet {
    let mut result = MetricSet::new();

    for item in items {
        if let Some(name) = keys.classify_in(Scope::Cluster, &item.key) {
            result
                .entry(name.to_string())
                .or_insert_with(|| Metric::from_item(item));
        }
    }

    result
}

/// Host OS metrics, labelled with fixed card titles.
pub fn host_metrics(items: &[Item], keys: &KeyConfig) -> MetricSet {
    let mut result = MetricSet::new();

    for item in items {
        if let Some(name) = keys.classify_in(Scope::Host, &item.key) {
            let label = host_label(name).unwrap_or(item.name.as_str());
            result
                .entry(name.to_string())
                .or_insert_with(|| Metric::labelled(item, label));
        }
    }

    result
}
