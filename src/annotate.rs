use serde::Serialize;

use crate::model::MetricSet;

/// Smallest history that yields a trend.
const TREND_MIN_POINTS: usize = 4;
/// Relative change between the first and last third that counts as movement.
const TREND_SENSITIVITY: f64 = 0.05;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Up,
    Down,
    Stable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ThresholdLevel {
    Warn,
    Crit,
}

/// Compare the mean of the newest third of `history` with the oldest third.
pub fn trend(history: &[f64]) -> Option<Trend> {
    let points: Vec<f64> = history.iter().copied().filter(|v| v.is_finite()).collect();
    if points.len() < TREND_MIN_POINTS {
        return None;
    }

    let third = (points.len() / 3).max(1);
    let early = points[..third].iter().sum::<f64>() / third as f64;
    let late = points[points.len() - third..].iter().sum::<f64>() / third as f64;
    let change = if early > 0.0 { (late - early) / early } else { 0.0 };

    Some(if change > TREND_SENSITIVITY {
        Trend::Up
    } else if change < -TREND_SENSITIVITY {
        Trend::Down
    } else {
        Trend::Stable
    })
}

struct Bounds {
    warn: f64,
    crit: f64,
    higher_is_worse: bool,
}

const fn higher(warn: f64, crit: f64) -> Bounds {
    Bounds {
        warn,
        crit,
        higher_is_worse: true,
    }
}

fn bounds(metric: &str) -> Option<Bounds> {
    Some(match metric {
        "active_connections" => higher(50.0, 80.0),
        "rollback_rate" => higher(0.5, 2.0),
        "deadlocks_rate" => higher(0.1, 1.0),
        "slow_queries" => higher(1.0, 5.0),
        "replication_lag" => higher(10.0, 30.0),
        "idle_in_transaction" => higher(1.0, 3.0),
        "bloat" => higher(3.0, 8.0),
        "locks_total" => higher(50.0, 200.0),
        "xid_age" => higher(100_000_000.0, 150_000_000.0),
        "cache_hit" => Bounds {
            warn: 95.0,
            crit: 90.0,
            higher_is_worse: false,
        },
        _ => return None,
    })
}

/// Threshold status of a known metric; unknown names and missing values give `None`.
pub fn threshold(metric: &str, value: Option<f64>) -> Option<ThresholdLevel> {
    let value = value?;
    let Bounds {
        warn,
        crit,
        higher_is_worse,
    } = bounds(metric)?;

    let reached = |limit: f64| {
        if higher_is_worse {
            value >= limit
        } else {
            value <= limit
        }
    };
    if reached(crit) {
        Some(ThresholdLevel::Crit)
    } else if reached(warn) {
        Some(ThresholdLevel::Warn)
    } else {
        None
    }
}

/// Host CPU load against the widget's warn/high thresholds.
pub fn cpu_level(load: Option<f64>, warn: f64, high: f64) -> Option<ThresholdLevel> {
    let load = load?;
    if load >= high {
        Some(ThresholdLevel::Crit)
    } else if load >= warn {
        Some(ThresholdLevel::Warn)
    } else {
        None
    }
}

/// Where metric cards link to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphLink {
    base: String,
    period: u64,
}

impl GraphLink {
    /// `None` when no frontend base URL is configured.
    pub fn new(base: &str, period: u64) -> Option<Self> {
        let base = base.trim().trim_end_matches('/');
        if base.is_empty() {
            return None;
        }
        Some(Self {
            base: base.to_string(),
            period,
        })
    }

    pub fn url(&self, itemid: &str) -> String {
        format!(
            "{}/history.php?action=showgraph&itemids[]={}&from=now-{}s&to=now",
            self.base, itemid, self.period
        )
    }
}

/// CPU thresholds applied to the avg1 host load card.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CpuThresholds {
    pub warn: f64,
    pub high: f64,
}

/// Metric whose value is checked against [`CpuThresholds`].
pub const CPU_METRIC: &str = "host_cpu_load_avg1_key";

/// Fill trend, threshold and graph link on every metric of `set`.
pub fn annotate(set: &mut MetricSet, link: Option<&GraphLink>, cpu: Option<CpuThresholds>) {
    for (name, metric) in set.iter_mut() {
        metric.trend = trend(&metric.history);
        metric.threshold = match cpu {
            Some(cpu) if name == CPU_METRIC => cpu_level(metric.numeric_value(), cpu.warn, cpu.high),
            _ => threshold(name, metric.numeric_value()),
        };
        metric.graph_url = match (link, &metric.itemid) {
            (Some(link), Some(itemid)) => Some(link.url(itemid.as_str())),
            _ => None,
        };
    }
}
