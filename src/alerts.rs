use std::collections::{BTreeSet, HashMap, HashSet};

use tracing::{debug, instrument, warn};

use crate::model::{Alert, MetricSet, Severity};
use crate::zabbix::{ItemId, MonitoringApi, Problem};

/// Item ids of every metric in `sets`.
pub fn referenced_items<'a>(sets: impl IntoIterator<Item = &'a MetricSet>) -> HashSet<ItemId> {
    sets.into_iter()
        .flat_map(|set| set.values())
        .filter_map(|metric| metric.itemid.clone())
        .collect()
}

/// Highest-severity active problem per referenced item.
///
/// Upstream failures and empty results mean no alerts at all.
#[instrument(skip(api, referenced), fields(items = referenced.len()))]
pub async fn correlate(
    api: &dyn MonitoringApi,
    hostid: &str,
    min_severity: Severity,
    referenced: &HashSet<ItemId>,
) -> HashMap<ItemId, Alert> {
    if referenced.is_empty() {
        return HashMap::new();
    }

    let problems = match api.active_problems(hostid, &min_severity.and_above()).await {
        Ok(problems) => problems,
        Err(err) => {
            warn!(error = %err, "failed to fetch active problems");
            return HashMap::new();
        }
    };
    if problems.is_empty() {
        return HashMap::new();
    }

    let triggerids: Vec<String> = problems
        .iter()
        .map(|problem| problem.objectid.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let triggers = match api.triggers_with_items(&triggerids).await {
        Ok(triggers) => triggers,
        Err(err) => {
            warn!(error = %err, "failed to resolve problem triggers");
            return HashMap::new();
        }
    };

    let trigger_items: HashMap<String, Vec<ItemId>> = triggers
        .into_iter()
        .map(|trigger| {
            let items = trigger.items.into_iter().map(|item| item.itemid).collect();
            (trigger.triggerid, items)
        })
        .collect();

    let alerts = pick_alerts(&problems, &trigger_items, referenced);
    debug!(
        problems = problems.len(),
        alerted_items = alerts.len(),
        "correlated problems"
    );
    alerts
}

/// Walk problems in order; an item keeps its first alert unless a later one is
/// strictly more severe.
pub fn pick_alerts(
    problems: &[Problem],
    trigger_items: &HashMap<String, Vec<ItemId>>,
    referenced: &HashSet<ItemId>,
) -> HashMap<ItemId, Alert> {
    let mut alerts: HashMap<ItemId, Alert> = HashMap::new();

    for problem in problems {
        let Some(items) = trigger_items.get(&problem.objectid) else {
            continue;
        };
        let severity = Severity::new(problem.severity);

        for itemid in items.iter().filter(|itemid| referenced.contains(*itemid)) {
            let replace = alerts
                .get(itemid)
                .is_none_or(|current| severity > current.severity);
            if replace {
                alerts.insert(itemid.clone(), Alert::new(severity, problem.name.clone()));
            }
        }
    }

    alerts
}

/// Attach alerts to a set's metrics; metrics without one are left untouched.
pub fn attach_alerts(set: &mut MetricSet, alerts: &HashMap<ItemId, Alert>) {
    for metric in set.values_mut() {
        if let Some(alert) = metric.itemid.as_ref().and_then(|id| alerts.get(id)) {
            metric.alert = Some(alert.clone());
        }
    }
}
