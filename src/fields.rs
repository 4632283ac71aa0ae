use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::annotate::{CpuThresholds, GraphLink};
use crate::health::{CATEGORY_KEYS, HealthWeights};
use crate::keys::{self, KeyConfig, Scope};
use crate::model::Severity;
use crate::zabbix::ItemId;

pub const DEFAULT_CPU_WARN: f64 = 1.0;
pub const DEFAULT_CPU_HIGH: f64 = 2.0;
pub const DEFAULT_GRAPH_PERIOD: u64 = 86_400;

/// Keys under which an object carries its payload, in lookup order.
const NESTED_KEYS: &[&str] = &["value", "hostid", "itemid"];

/// A loosely typed field value. Dashboards store a host as `"10084"`,
/// `["10084"]`, `[{"hostid": "10084"}]` or `{"value": "10084"}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Absent,
    Scalar(String),
    /// Payload found inside an array or wrapper object.
    Nested(Box<FieldValue>),
}

impl FieldValue {
    pub fn from_json(value: Option<&Value>) -> Self {
        match value {
            None | Some(Value::Null) => FieldValue::Absent,
            Some(Value::Bool(flag)) => FieldValue::Scalar(if *flag { "1" } else { "0" }.into()),
            Some(Value::Number(number)) => FieldValue::Scalar(number.to_string()),
            Some(Value::String(text)) => FieldValue::Scalar(text.clone()),
            Some(Value::Array(values)) => match values.first() {
                Some(first) => FieldValue::Nested(Box::new(Self::from_json(Some(first)))),
                None => FieldValue::Absent,
            },
            Some(Value::Object(map)) => NESTED_KEYS
                .iter()
                .find_map(|key| map.get(*key))
                .map(|inner| FieldValue::Nested(Box::new(Self::from_json(Some(inner)))))
                .unwrap_or(FieldValue::Absent),
        }
    }

    /// The innermost scalar, trimmed; blank counts as absent.
    pub fn text(&self) -> Option<&str> {
        match self {
            FieldValue::Absent => None,
            FieldValue::Scalar(raw) => Some(raw.trim()).filter(|text| !text.is_empty()),
            FieldValue::Nested(inner) => inner.text(),
        }
    }

    /// `1`, `true`, `yes` and `on` are true, any other text false.
    pub fn flag(&self, default: bool) -> bool {
        match self.text() {
            Some(text) => matches!(
                text.to_ascii_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            ),
            None => default,
        }
    }

    pub fn number(&self, default: f64) -> f64 {
        self.text()
            .and_then(|text| text.parse::<f64>().ok())
            .filter(|value| value.is_finite())
            .unwrap_or(default)
    }
}

/// Request fields layered over configured defaults.
struct FieldSource<'a> {
    request: &'a Map<String, Value>,
    defaults: &'a Map<String, Value>,
}

impl FieldSource<'_> {
    fn get(&self, name: &str) -> FieldValue {
        let from_request = FieldValue::from_json(self.request.get(name));
        if from_request.text().is_some() {
            return from_request;
        }
        FieldValue::from_json(self.defaults.get(name))
    }
}

/// Field name of the visibility toggle for a semantic metric.
pub fn visibility_field(metric: &str) -> String {
    match metric {
        "temp_bytes_rate" => "show_temp_bytes".into(),
        "host_cpu_load_avg1_key" => "show_host_cpu_avg1".into(),
        "host_cpu_load_avg5_key" => "show_host_cpu_avg5".into(),
        "host_cpu_load_avg15_key" => "show_host_cpu_avg15".into(),
        "host_memory_total_key" => "show_host_mem_total".into(),
        "host_memory_available_key" => "show_host_mem_available".into(),
        other => format!("show_{other}"),
    }
}

/// Database and cluster card metrics, in display order.
fn card_metrics() -> impl Iterator<Item = &'static str> {
    keys::names(Scope::Cluster).chain(keys::names(Scope::Database))
}

/// Typed widget configuration for one render.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WidgetFields {
    pub hostid: Option<String>,
    pub discovery_itemid: Option<ItemId>,
    pub default_db: String,
    pub show_optional: bool,
    pub cpu_warn_threshold: f64,
    pub cpu_high_threshold: f64,
    pub visibility: BTreeMap<String, bool>,
    pub key_overrides: BTreeMap<String, String>,
    pub health_weights: HealthWeights,
    pub alert_min_severity: Severity,
    pub zabbix_base_url: String,
    pub graph_period: u64,
}

impl WidgetFields {
    /// Normalize `request`, falling back to `defaults` field by field.
    pub fn parse(request: &Map<String, Value>, defaults: &Map<String, Value>) -> Self {
        let source = FieldSource { request, defaults };

        let visibility = card_metrics()
            .chain(keys::names(Scope::Host))
            .map(|metric| {
                let field = visibility_field(metric);
                let shown = source.get(&field).flag(true);
                (field, shown)
            })
            .collect();

        let key_overrides = keys::override_fields()
            .filter_map(|field| {
                let value = source.get(&field).text()?.to_string();
                Some((field, value))
            })
            .collect();

        let defaults_weights = HealthWeights::default();
        let weight = |key: &str, default: f64| source.get(&format!("weight_{key}")).number(default);
        let health_weights = HealthWeights {
            connectivity: weight(CATEGORY_KEYS[0], defaults_weights.connectivity),
            integrity: weight(CATEGORY_KEYS[1], defaults_weights.integrity),
            stability: weight(CATEGORY_KEYS[2], defaults_weights.stability),
            efficiency: weight(CATEGORY_KEYS[3], defaults_weights.efficiency),
            replication: weight(CATEGORY_KEYS[4], defaults_weights.replication),
            bloat: weight(CATEGORY_KEYS[5], defaults_weights.bloat),
        };

        let severity = source
            .get("alert_min_severity")
            .number(f64::from(Severity::default().ordinal()))
            .round()
            .clamp(0.0, 5.0) as u8;

        let graph_period = source
            .get("graph_period")
            .number(DEFAULT_GRAPH_PERIOD as f64)
            .round();
        let graph_period = if graph_period >= 1.0 {
            graph_period as u64
        } else {
            DEFAULT_GRAPH_PERIOD
        };

        Self {
            hostid: source.get("hostids").text().map(str::to_string),
            discovery_itemid: source.get("discovery_itemid").text().map(ItemId::from),
            default_db: source.get("default_db").text().unwrap_or_default().to_string(),
            show_optional: source.get("show_optional").flag(true),
            cpu_warn_threshold: source.get("cpu_warn_threshold").number(DEFAULT_CPU_WARN),
            cpu_high_threshold: source.get("cpu_high_threshold").number(DEFAULT_CPU_HIGH),
            visibility,
            key_overrides,
            health_weights,
            alert_min_severity: Severity::new(severity),
            zabbix_base_url: source
                .get("zabbix_base_url")
                .text()
                .unwrap_or_default()
                .trim_end_matches('/')
                .to_string(),
            graph_period,
        }
    }

    /// Neither a host nor a discovery item was selected.
    pub fn has_target(&self) -> bool {
        self.hostid.is_some() || self.discovery_itemid.is_some()
    }

    fn visible(&self, metric: &'static str) -> bool {
        self.visibility
            .get(&visibility_field(metric))
            .copied()
            .unwrap_or(true)
    }

    pub fn visible_metric_keys(&self) -> Vec<String> {
        card_metrics()
            .filter(|metric| self.visible(metric))
            .map(str::to_string)
            .collect()
    }

    pub fn visible_host_metric_keys(&self) -> Vec<String> {
        keys::names(Scope::Host)
            .filter(|metric| self.visible(metric))
            .map(str::to_string)
            .collect()
    }

    pub fn key_config(&self) -> KeyConfig {
        KeyConfig::with_overrides(&self.key_overrides)
    }

    pub fn cpu_thresholds(&self) -> CpuThresholds {
        CpuThresholds {
            warn: self.cpu_warn_threshold,
            high: self.cpu_high_threshold,
        }
    }

    pub fn graph_link(&self) -> Option<GraphLink> {
        GraphLink::new(&self.zabbix_base_url, self.graph_period)
    }
}
