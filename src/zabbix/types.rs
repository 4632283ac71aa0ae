use std::fmt;

use chrono::{DateTime, TimeZone, Utc};
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};

/// Opaque Zabbix object identifier (`itemid`), kept as the platform's string form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(String);

impl ItemId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Numeric form used to pick the newest of several objects.
    pub fn numeric(&self) -> Option<u64> {
        self.0.trim().parse().ok()
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ItemId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Storage type of an item's values; selects the history table to query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    Float,
    Character,
    Log,
    Unsigned,
    Text,
    Binary,
    Other(u8),
}

impl ValueType {
    pub fn from_code(code: u8) -> Self {
        match code {
            0 => ValueType::Float,
            1 => ValueType::Character,
            2 => ValueType::Log,
            3 => ValueType::Unsigned,
            4 => ValueType::Text,
            5 => ValueType::Binary,
            other => ValueType::Other(other),
        }
    }

    pub fn code(self) -> u8 {
        match self {
            ValueType::Float => 0,
            ValueType::Character => 1,
            ValueType::Log => 2,
            ValueType::Unsigned => 3,
            ValueType::Text => 4,
            ValueType::Binary => 5,
            ValueType::Other(code) => code,
        }
    }

    pub fn is_numeric(self) -> bool {
        matches!(self, ValueType::Float | ValueType::Unsigned)
    }
}

impl<'de> Deserialize<'de> for ValueType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let code: u8 = deserialize_stringly(deserializer)?;
        Ok(ValueType::from_code(code))
    }
}

/// One host item as returned by `item.get`.
#[derive(Debug, Clone, Deserialize)]
pub struct Item {
    pub itemid: ItemId,
    #[serde(default)]
    pub hostid: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "key_")]
    pub key: String,
    #[serde(default)]
    pub units: String,
    #[serde(default)]
    pub lastvalue: Option<String>,
    pub value_type: ValueType,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DiscoveryRule {
    pub itemid: ItemId,
    #[serde(rename = "key_")]
    pub key: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HistoryRow {
    pub itemid: ItemId,
    #[serde(deserialize_with = "deserialize_stringly")]
    pub clock: i64,
    pub value: String,
}

impl HistoryRow {
    pub fn collected_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_opt(self.clock, 0).single()
    }
}

/// Active problem event. `objectid` is the id of the trigger that fired it.
#[derive(Debug, Clone, Deserialize)]
pub struct Problem {
    pub eventid: String,
    pub objectid: String,
    #[serde(deserialize_with = "deserialize_stringly")]
    pub severity: u8,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TriggerItem {
    pub itemid: ItemId,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Trigger {
    pub triggerid: String,
    #[serde(default)]
    pub items: Vec<TriggerItem>,
}

/// Newest `limit` history rows of `itemids`, returned newest first.
#[derive(Debug, Clone)]
pub struct HistoryQuery {
    pub value_type: ValueType,
    pub itemids: Vec<ItemId>,
    pub limit: usize,
}

/// Zabbix serializes most numbers as JSON strings; accept both shapes.
fn deserialize_stringly<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: std::str::FromStr,
    T::Err: fmt::Display,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Stringly {
        Text(String),
        Number(serde_json::Number),
    }

    let raw = match Stringly::deserialize(deserializer)? {
        Stringly::Text(text) => text,
        Stringly::Number(number) => number.to_string(),
    };
    raw.trim().parse().map_err(de::Error::custom)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn item_accepts_string_encoded_value_type() {
        let raw = r#"{
            "itemid": "42",
            "name": "DB size",
            "key_": "pgsql.db.size[\"app\"]",
            "units": "B",
            "lastvalue": "1024",
            "value_type": "3"
        }"#;
        let item: Item = serde_json::from_str(raw).expect("item");
        assert_eq!(item.itemid.as_str(), "42");
        assert_eq!(item.value_type, ValueType::Unsigned);
        assert!(item.value_type.is_numeric());
    }

    #[test]
    fn history_row_parses_clock() {
        let raw = r#"{"itemid": "7", "clock": "1700000000", "value": "0.25"}"#;
        let row: HistoryRow = serde_json::from_str(raw).expect("row");
        assert_eq!(row.clock, 1_700_000_000);
        assert_eq!(
            row.collected_at().map(|ts| ts.timestamp()),
            Some(1_700_000_000)
        );
    }

    #[test]
    fn unknown_value_type_is_not_numeric() {
        assert_eq!(ValueType::from_code(9), ValueType::Other(9));
        assert!(!ValueType::Text.is_numeric());
        assert_eq!(ValueType::Other(9).code(), 9);
    }

    #[test]
    fn item_id_numeric_ordering() {
        assert_eq!(ItemId::from("10045").numeric(), Some(10045));
        assert_eq!(ItemId::from("abc").numeric(), None);
    }
}
