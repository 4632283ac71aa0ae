use std::collections::BTreeMap;

use serde::Serialize;

use crate::annotate::{ThresholdLevel, Trend};
use crate::health::HealthScore;
use crate::zabbix::{Item, ItemId};

/// Semantic metric name to metric, serialized with a stable key order.
pub type MetricSet = BTreeMap<String, Metric>;

/// Problem severity on the platform's 0 (not classified) to 5 (disaster) scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct Severity(u8);

impl Severity {
    pub const WARNING: Severity = Severity(2);
    pub const DISASTER: Severity = Severity(5);

    /// Out-of-range ordinals are clamped into the 0..=5 scale.
    pub fn new(ordinal: u8) -> Self {
        Severity(ordinal.min(Self::DISASTER.0))
    }

    pub fn ordinal(self) -> u8 {
        self.0
    }

    pub fn label(self) -> &'static str {
        match self.0 {
            0 => "Not classified",
            1 => "Information",
            2 => "Warning",
            3 => "Average",
            4 => "High",
            _ => "Disaster",
        }
    }

    pub fn color(self) -> &'static str {
        match self.0 {
            0 => "#97AAB3",
            1 => "#7499FF",
            2 => "#FFC859",
            3 => "#FFA059",
            4 => "#E97659",
            _ => "#E45959",
        }
    }

    /// Every ordinal from `self` up to disaster, as sent to `problem.get`.
    pub fn and_above(self) -> Vec<u8> {
        (self.0..=Self::DISASTER.0).collect()
    }
}

impl Default for Severity {
    fn default() -> Self {
        Self::WARNING
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Alert {
    pub severity: Severity,
    pub label: String,
    pub color: String,
    pub name: String,
}

impl Alert {
    pub fn new(severity: Severity, name: impl Into<String>) -> Self {
        Self {
            severity,
            label: severity.label().to_string(),
            color: severity.color().to_string(),
            name: name.into(),
        }
    }
}

/// One observed telemetry point as rendered on a card.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Metric {
    pub itemid: Option<ItemId>,
    pub label: String,
    pub value: Option<String>,
    pub units: Option<String>,
    pub history: Vec<f64>,
    #[serde(rename = "problem")]
    pub alert: Option<Alert>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trend: Option<Trend>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threshold: Option<ThresholdLevel>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub graph_url: Option<String>,
}

impl Metric {
    /// Metric for an item, labelled with the item's own name.
    pub fn from_item(item: &Item) -> Self {
        Self::labelled(item, item.name.clone())
    }

    pub fn labelled(item: &Item, label: impl Into<String>) -> Self {
        Self {
            itemid: Some(item.itemid.clone()),
            label: label.into(),
            value: item.lastvalue.clone(),
            units: Some(item.units.clone()).filter(|units| !units.is_empty()),
            history: Vec::new(),
            alert: None,
            trend: None,
            threshold: None,
            graph_url: None,
        }
    }

    /// Current value as a finite number, if it is one.
    pub fn numeric_value(&self) -> Option<f64> {
        self.value
            .as_deref()
            .map(str::trim)
            .filter(|raw| !raw.is_empty())
            .and_then(|raw| raw.parse::<f64>().ok())
            .filter(|value| value.is_finite())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Database {
    pub name: String,
    pub metrics: MetricSet,
    pub health: Option<HealthScore>,
}

/// Numeric value of `key` in `set`, when present and parseable.
pub fn metric_value(set: &MetricSet, key: &str) -> Option<f64> {
    set.get(key).and_then(Metric::numeric_value)
}
