use std::collections::BTreeMap;

use serde::Serialize;
use tracing::warn;

use crate::model::{MetricSet, metric_value};

const XID_WARN_AGE: f64 = 100_000_000.0;
const XID_CRIT_AGE: f64 = 150_000_000.0;

/// Category weights as configured, in percent. Any sum is accepted.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HealthWeights {
    pub connectivity: f64,
    pub integrity: f64,
    pub stability: f64,
    pub efficiency: f64,
    pub replication: f64,
    pub bloat: f64,
}

impl Default for HealthWeights {
    fn default() -> Self {
        Self {
            connectivity: 25.0,
            integrity: 20.0,
            stability: 20.0,
            efficiency: 20.0,
            replication: 10.0,
            bloat: 5.0,
        }
    }
}

impl HealthWeights {
    fn as_array(&self) -> [f64; 6] {
        [
            self.connectivity,
            self.integrity,
            self.stability,
            self.efficiency,
            self.replication,
            self.bloat,
        ]
    }

    /// Weights scaled to sum to 1. Negative or non-finite entries count as 0;
    /// an all-zero configuration falls back to the defaults.
    pub fn normalized(&self) -> [f64; 6] {
        let raw = self
            .as_array()
            .map(|w| if w.is_finite() && w > 0.0 { w } else { 0.0 });
        let sum: f64 = raw.iter().sum();
        if sum <= 0.0 {
            return Self::default().normalized();
        }
        raw.map(|w| w / sum)
    }

    pub fn to_map(&self) -> BTreeMap<String, f64> {
        CATEGORY_KEYS
            .iter()
            .zip(self.as_array())
            .map(|(key, weight)| (key.to_string(), weight))
            .collect()
    }
}

/// Field-name stems of the six categories, in scoring order.
pub const CATEGORY_KEYS: [&str; 6] = [
    "connectivity",
    "integrity",
    "stability",
    "efficiency",
    "replication",
    "bloat",
];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryScore {
    pub label: &'static str,
    pub score: Option<f64>,
    pub weight: f64,
    pub detail: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthScore {
    pub total: Option<u8>,
    pub categories: Vec<CategoryScore>,
}

/// Extra context the scorer cannot read from metric values alone.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScoringHints {
    /// The active-connections key was overridden by the user.
    pub custom_connections_key: bool,
}

/// Score the cluster together with one database's metrics.
pub fn compute(
    cluster: &MetricSet,
    database: Option<&MetricSet>,
    weights: &HealthWeights,
    hints: ScoringHints,
) -> HealthScore {
    let empty = MetricSet::new();
    let database = database.unwrap_or(&empty);
    let normalized = weights.normalized();

    let scored = [
        ("Connectivity", connectivity(cluster, hints)),
        ("Integrity", integrity(database)),
        ("Stability", stability(cluster)),
        ("Efficiency", efficiency(cluster, database)),
        ("Replication", replication(cluster)),
        ("Bloat", bloat(database)),
    ];

    let categories: Vec<CategoryScore> = scored
        .into_iter()
        .zip(normalized)
        .map(|((label, (score, detail)), weight)| CategoryScore {
            label,
            score: score.map(clamp_score),
            weight,
            detail,
        })
        .collect();

    HealthScore {
        total: weighted_total(&categories),
        categories,
    }
}

fn weighted_total(categories: &[CategoryScore]) -> Option<u8> {
    let scored: Vec<(f64, f64)> = categories
        .iter()
        .filter_map(|cat| cat.score.map(|score| (score, cat.weight)))
        .collect();
    if scored.is_empty() {
        return None;
    }

    let weight_sum: f64 = scored.iter().map(|(_, weight)| weight).sum();
    let mean = if weight_sum > 0.0 {
        scored.iter().map(|(score, weight)| score * weight).sum::<f64>() / weight_sum
    } else {
        // Only zero-weight categories produced a score.
        scored.iter().map(|(score, _)| score).sum::<f64>() / scored.len() as f64
    };
    Some(clamp_score(mean).round() as u8)
}

fn clamp_score(score: f64) -> f64 {
    if score.is_nan() {
        0.0
    } else {
        score.clamp(0.0, 100.0)
    }
}

/// Linear interpolation of `value` from `[x0, x1]` onto `[y0, y1]`.
fn lerp(value: f64, x0: f64, x1: f64, y0: f64, y1: f64) -> f64 {
    y0 + (value - x0) / (x1 - x0) * (y1 - y0)
}

type Scored = (Option<f64>, Option<String>);

pub fn connectivity_score(pct: f64) -> f64 {
    if pct <= 50.0 {
        100.0
    } else if pct <= 80.0 {
        lerp(pct, 50.0, 80.0, 100.0, 60.0)
    } else {
        lerp(pct, 80.0, 100.0, 60.0, 0.0).max(0.0)
    }
}

fn connectivity(cluster: &MetricSet, hints: ScoringHints) -> Scored {
    let Some(pct) = metric_value(cluster, "active_connections") else {
        return (None, None);
    };

    let mut detail = format!("{pct:.1}% connections used");
    let units = cluster
        .get("active_connections")
        .and_then(|metric| metric.units.as_deref());
    if hints.custom_connections_key && units != Some("%") {
        warn!(
            units = units.unwrap_or(""),
            "active connections key does not report a percentage; connectivity score assumes one"
        );
        detail.push_str(" (value is not a percentage)");
    }

    (Some(connectivity_score(pct)), Some(detail))
}

/// Rollback share of all finished transactions, 0 when there were none.
pub fn rollback_percentage(commits: f64, rollbacks: f64) -> f64 {
    let total = commits + rollbacks;
    if total > 0.0 {
        rollbacks / total * 100.0
    } else {
        0.0
    }
}

pub fn integrity_score(rollback_pct: f64) -> f64 {
    let score = if rollback_pct <= 5.0 {
        lerp(rollback_pct, 0.0, 5.0, 100.0, 90.0)
    } else if rollback_pct <= 15.0 {
        lerp(rollback_pct, 5.0, 15.0, 90.0, 60.0)
    } else if rollback_pct <= 30.0 {
        lerp(rollback_pct, 15.0, 30.0, 60.0, 0.0)
    } else {
        0.0
    };
    score.max(0.0)
}

fn integrity(database: &MetricSet) -> Scored {
    let (Some(commits), Some(rollbacks)) = (
        metric_value(database, "commit_rate"),
        metric_value(database, "rollback_rate"),
    ) else {
        return (None, None);
    };

    let pct = rollback_percentage(commits, rollbacks);
    (
        Some(integrity_score(pct)),
        Some(format!("{rollbacks:.1} rb / {commits:.1} commits ({pct:.1}%)")),
    )
}

pub fn idle_in_transaction_score(idle: f64) -> f64 {
    if idle <= 0.0 {
        100.0
    } else if idle <= 1.0 {
        80.0
    } else if idle <= 3.0 {
        50.0
    } else {
        (50.0 - (idle - 3.0) * 10.0).max(0.0)
    }
}

pub fn xid_age_score(age: f64) -> f64 {
    if age < XID_WARN_AGE {
        100.0
    } else if age < XID_CRIT_AGE {
        lerp(age, XID_WARN_AGE, XID_CRIT_AGE, 100.0, 0.0)
    } else {
        0.0
    }
}

fn stability(cluster: &MetricSet) -> Scored {
    let idle = metric_value(cluster, "idle_in_transaction");
    let xid = metric_value(cluster, "xid_age");

    let score = average_present(idle.map(idle_in_transaction_score), xid.map(xid_age_score));
    let mut parts = Vec::new();
    if let Some(idle) = idle {
        parts.push(format!("{idle} idle-in-txn"));
    }
    if let Some(xid) = xid {
        parts.push(format!("{:.0}M XID age", xid / 1_000_000.0));
    }
    (score, join_details(parts))
}

pub fn cache_hit_score(ratio: f64) -> f64 {
    if ratio >= 100.0 {
        100.0
    } else if ratio >= 95.0 {
        lerp(ratio, 95.0, 100.0, 80.0, 100.0)
    } else if ratio >= 90.0 {
        lerp(ratio, 90.0, 95.0, 50.0, 80.0)
    } else if ratio >= 85.0 {
        lerp(ratio, 85.0, 90.0, 0.0, 50.0)
    } else {
        0.0
    }
}

pub fn slow_query_score(count: f64) -> f64 {
    if count <= 0.0 {
        100.0
    } else if count <= 2.0 {
        80.0
    } else if count <= 5.0 {
        60.0
    } else if count < 10.0 {
        30.0
    } else {
        0.0
    }
}

fn efficiency(cluster: &MetricSet, database: &MetricSet) -> Scored {
    let cache = metric_value(cluster, "cache_hit");
    let slow = metric_value(database, "slow_queries");

    let score = match (cache.map(cache_hit_score), slow.map(slow_query_score)) {
        (Some(c), Some(s)) => Some(c * 0.6 + s * 0.4),
        (Some(c), None) => Some(c),
        (None, Some(s)) => Some(s),
        (None, None) => None,
    };
    let mut parts = Vec::new();
    if let Some(cache) = cache {
        parts.push(format!("{cache:.1}% cache hit"));
    }
    if let Some(slow) = slow {
        parts.push(format!("{slow} slow queries"));
    }
    (score, join_details(parts))
}

pub fn replication_lag_score(lag: f64) -> f64 {
    let score = if lag <= 0.0 {
        100.0
    } else if lag <= 5.0 {
        lerp(lag, 0.0, 5.0, 100.0, 80.0)
    } else if lag <= 30.0 {
        lerp(lag, 5.0, 30.0, 80.0, 50.0)
    } else if lag <= 60.0 {
        lerp(lag, 30.0, 60.0, 50.0, 0.0)
    } else {
        0.0
    };
    score.max(0.0)
}

pub fn wal_segment_score(count: f64) -> f64 {
    if count <= 50.0 {
        100.0
    } else if count <= 100.0 {
        lerp(count, 50.0, 100.0, 100.0, 80.0)
    } else if count <= 300.0 {
        lerp(count, 100.0, 300.0, 80.0, 30.0)
    } else {
        lerp(count, 300.0, 400.0, 30.0, 0.0).max(0.0)
    }
}

fn replication(cluster: &MetricSet) -> Scored {
    // Nothing observed for the cluster at all: nothing to judge.
    if cluster.is_empty() {
        return (None, None);
    }

    let lag = metric_value(cluster, "replication_lag");
    let wal = metric_value(cluster, "wal_count");

    // No lag metric means no standby, which is not penalized.
    let lag_score = lag.map(replication_lag_score).unwrap_or(100.0);
    let score = match wal.map(wal_segment_score) {
        Some(wal_score) => lag_score * 0.7 + wal_score * 0.3,
        None => lag_score,
    };

    let mut parts = vec![match lag {
        Some(lag) => format!("{lag}s lag"),
        None => "no standby".to_string(),
    }];
    if let Some(wal) = wal {
        parts.push(format!("{wal} WAL seg."));
    }
    (Some(score), join_details(parts))
}

pub fn bloat_score(tables: f64) -> f64 {
    if tables <= 0.0 {
        100.0
    } else if tables <= 2.0 {
        85.0
    } else if tables <= 5.0 {
        65.0
    } else if tables <= 10.0 {
        40.0
    } else {
        10.0
    }
}

fn bloat(database: &MetricSet) -> Scored {
    match metric_value(database, "bloat") {
        Some(tables) => (
            Some(bloat_score(tables)),
            Some(format!("{tables} bloating tables")),
        ),
        None => (None, None),
    }
}

fn average_present(a: Option<f64>, b: Option<f64>) -> Option<f64> {
    match (a, b) {
        (Some(a), Some(b)) => Some((a + b) / 2.0),
        (Some(v), None) | (None, Some(v)) => Some(v),
        (None, None) => None,
    }
}

fn join_details(parts: Vec<String>) -> Option<String> {
    if parts.is_empty() {
        None
    } else {
        Some(parts.join(" · "))
    }
}
