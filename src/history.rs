use std::collections::{BTreeMap, HashMap};

use futures::stream::{self, StreamExt};
use tracing::{debug, instrument, warn};

use crate::model::MetricSet;
use crate::zabbix::{HistoryQuery, HistoryRow, Item, ItemId, MonitoringApi, ValueType};

/// Samples kept per item.
pub const HISTORY_LIMIT: usize = 20;

/// Numeric items referenced by `sets`, with the history table each lives in.
pub fn history_targets<'a>(
    items: &[Item],
    sets: impl IntoIterator<Item = &'a MetricSet>,
) -> BTreeMap<ItemId, ValueType> {
    let value_types: HashMap<&ItemId, ValueType> = items
        .iter()
        .map(|item| (&item.itemid, item.value_type))
        .collect();

    let mut targets = BTreeMap::new();
    for set in sets {
        for metric in set.values() {
            let Some(itemid) = &metric.itemid else {
                continue;
            };
            if let Some(value_type) = value_types.get(itemid) {
                if value_type.is_numeric() {
                    targets.insert(itemid.clone(), *value_type);
                }
            }
        }
    }
    targets
}

/// Fetch the trailing window of every target, one request per item.
///
/// Items without history or whose request fails are absent from the result.
#[instrument(skip_all, fields(items = targets.len()))]
pub async fn fetch_windows(
    api: &dyn MonitoringApi,
    targets: &BTreeMap<ItemId, ValueType>,
    concurrency: usize,
) -> HashMap<ItemId, Vec<f64>> {
    let owned: Vec<(ItemId, ValueType)> = targets
        .iter()
        .map(|(itemid, value_type)| (itemid.clone(), *value_type))
        .collect();

    let windows: Vec<(ItemId, Vec<f64>)> = stream::iter(owned)
        .map(|(itemid, value_type)| async move {
            let window = fetch_window(api, &itemid, value_type).await;
            (itemid, window)
        })
        .buffered(concurrency.max(1))
        .collect()
        .await;

    let windows: HashMap<ItemId, Vec<f64>> = windows
        .into_iter()
        .filter(|(_, window)| !window.is_empty())
        .collect();
    debug!(with_history = windows.len(), "history windows fetched");
    windows
}

async fn fetch_window(api: &dyn MonitoringApi, itemid: &ItemId, value_type: ValueType) -> Vec<f64> {
    if !value_type.is_numeric() {
        return Vec::new();
    }

    let query = HistoryQuery {
        value_type,
        itemids: vec![itemid.clone()],
        limit: HISTORY_LIMIT,
    };

    match api.history(&query).await {
        Ok(rows) => window_from_rows(itemid, rows, HISTORY_LIMIT),
        Err(err) => {
            warn!(%itemid, error = %err, "history unavailable");
            Vec::new()
        }
    }
}

/// Newest `limit` samples of `itemid`, returned oldest first. `rows` come
/// newest first, as `history.get` returns them with `clock DESC`. Rows of other
/// items and non-numeric values are dropped.
pub fn window_from_rows(itemid: &ItemId, rows: Vec<HistoryRow>, limit: usize) -> Vec<f64> {
    let mut samples: Vec<f64> = rows
        .into_iter()
        .filter(|row| &row.itemid == itemid)
        .filter_map(|row| {
            let value = row.value.trim().parse::<f64>().ok()?;
            value.is_finite().then_some(value)
        })
        .take(limit)
        .collect();

    samples.reverse();
    samples
}

/// Attach windows to the metrics of a set; metrics without one get `[]`.
pub fn attach_history(set: &mut MetricSet, windows: &HashMap<ItemId, Vec<f64>>) {
    for metric in set.values_mut() {
        if let Some(itemid) = &metric.itemid {
            metric.history = windows.get(itemid).cloned().unwrap_or_default();
        }
    }
}
