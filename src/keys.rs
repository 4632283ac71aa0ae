use std::collections::{BTreeMap, HashMap};

/// Delimiter that opens an item key's parameter list.
pub const PARAM_DELIMITER: char = '[';

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    Database,
    Cluster,
    Host,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    Exact,
    Prefix,
}

struct RuleDefault {
    scope: Scope,
    name: &'static str,
    kind: MatchKind,
    key: &'static str,
}

const fn rule(scope: Scope, name: &'static str, kind: MatchKind, key: &'static str) -> RuleDefault {
    RuleDefault {
        scope,
        name,
        kind,
        key,
    }
}

const DEFAULT_RULES: &[RuleDefault] = &[
    rule(Scope::Database, "db_size", MatchKind::Prefix, "pgsql.db.size["),
    rule(Scope::Database, "backends", MatchKind::Prefix, "pgsql.dbstat.numbackends["),
    rule(Scope::Database, "temp_bytes_rate", MatchKind::Prefix, "pgsql.dbstat.temp_bytes.rate["),
    rule(Scope::Database, "commit_rate", MatchKind::Prefix, "pgsql.dbstat.xact_commit.rate["),
    rule(Scope::Database, "rollback_rate", MatchKind::Prefix, "pgsql.dbstat.xact_rollback.rate["),
    rule(Scope::Database, "deadlocks_rate", MatchKind::Prefix, "pgsql.dbstat.deadlocks.rate["),
    rule(Scope::Database, "locks_total", MatchKind::Prefix, "pgsql.locks.total["),
    rule(Scope::Database, "slow_queries", MatchKind::Prefix, "pgsql.queries.query.slow_count["),
    rule(Scope::Database, "bloat", MatchKind::Prefix, "pgsql.db.bloating_tables["),
    rule(Scope::Cluster, "active_connections", MatchKind::Exact, "pgsql.connections.sum.total_pct"),
    rule(Scope::Cluster, "idle_in_transaction", MatchKind::Exact, "pgsql.connections.sum.idle_in_transaction"),
    rule(Scope::Cluster, "wal_write", MatchKind::Exact, "pgsql.wal.write"),
    rule(Scope::Cluster, "wal_receive", MatchKind::Exact, "pgsql.wal.receive"),
    rule(Scope::Cluster, "wal_count", MatchKind::Exact, "pgsql.wal.count"),
    rule(Scope::Cluster, "checkpoint_req", MatchKind::Exact, "pgsql.bgwriter.checkpoints_req.rate"),
    rule(Scope::Cluster, "checkpoint_sch", MatchKind::Exact, "pgsql.bgwriter.checkpoints_timed.rate"),
    rule(Scope::Cluster, "checkpoint_write_time", MatchKind::Exact, "pgsql.bgwriter.checkpoint_write_time.rate"),
    rule(Scope::Cluster, "cache_hit", MatchKind::Prefix, "pgsql.cache.hit["),
    rule(Scope::Cluster, "replication_lag", MatchKind::Prefix, "pgsql.replication.lag.sec["),
    rule(Scope::Cluster, "xid_age", MatchKind::Prefix, "pgsql.oldest.xid["),
    rule(Scope::Host, "host_cpu_load_avg1_key", MatchKind::Exact, "system.cpu.load[all,avg1]"),
    rule(Scope::Host, "host_cpu_load_avg5_key", MatchKind::Exact, "system.cpu.load[all,avg5]"),
    rule(Scope::Host, "host_cpu_load_avg15_key", MatchKind::Exact, "system.cpu.load[all,avg15]"),
    rule(Scope::Host, "host_memory_total_key", MatchKind::Exact, "vm.memory.size[total]"),
    rule(Scope::Host, "host_memory_available_key", MatchKind::Exact, "vm.memory.size[available]"),
];

/// Fixed card labels for host metrics (their item names vary between templates).
pub const HOST_LABELS: &[(&str, &str)] = &[
    ("host_cpu_load_avg1_key", "Host CPU load (avg1)"),
    ("host_cpu_load_avg5_key", "Host CPU load (avg5)"),
    ("host_cpu_load_avg15_key", "Host CPU load (avg15)"),
    ("host_memory_total_key", "Host memory total"),
    ("host_memory_available_key", "Host memory available"),
];

pub fn host_label(name: &str) -> Option<&'static str> {
    HOST_LABELS
        .iter()
        .find(|(key, _)| *key == name)
        .map(|(_, label)| *label)
}

/// Semantic names of one scope, in rule order.
pub fn names(scope: Scope) -> impl Iterator<Item = &'static str> {
    DEFAULT_RULES
        .iter()
        .filter(move |rule| rule.scope == scope)
        .map(|rule| rule.name)
}

/// Configuration field that overrides the key of a semantic metric.
pub fn override_field(scope: Scope, name: &str) -> String {
    match scope {
        Scope::Host => name.to_string(),
        Scope::Database | Scope::Cluster => format!("key_{name}"),
    }
}

/// Every configuration field that can carry a key override.
pub fn override_fields() -> impl Iterator<Item = String> {
    DEFAULT_RULES
        .iter()
        .map(|rule| override_field(rule.scope, rule.name))
}

/// Bring a prefix into its comparable form: cut at the first delimiter if the
/// value still carries parameters, otherwise append the delimiter.
pub fn normalize_prefix(raw: &str) -> String {
    let trimmed = raw.trim();
    match trimmed.find(PARAM_DELIMITER) {
        Some(idx) => trimmed[..=idx].to_string(),
        None => format!("{trimmed}{PARAM_DELIMITER}"),
    }
}

/// Resolved rule table for one request: defaults merged with overrides.
///
/// An item key is classified once across every scope. Exact keys are looked
/// up before prefixes, and among prefixes the first in rule order wins.
#[derive(Debug, Clone)]
pub struct KeyConfig {
    exact: HashMap<String, (Scope, &'static str)>,
    prefixes: Vec<(String, Scope, &'static str)>,
    customized: Vec<&'static str>,
}

impl KeyConfig {
    pub fn defaults() -> Self {
        Self::with_overrides(&BTreeMap::new())
    }

    /// `overrides` maps override field names (see [`override_field`]) to keys.
    /// Blank overrides keep the default.
    pub fn with_overrides(overrides: &BTreeMap<String, String>) -> Self {
        let mut config = Self {
            exact: HashMap::new(),
            prefixes: Vec::new(),
            customized: Vec::new(),
        };

        for rule in DEFAULT_RULES {
            let field = override_field(rule.scope, rule.name);
            let key = match overrides.get(&field).map(|raw| raw.trim()) {
                Some(custom) if !custom.is_empty() => {
                    if custom != rule.key {
                        config.customized.push(rule.name);
                    }
                    custom
                }
                _ => rule.key,
            };
            match rule.kind {
                MatchKind::Exact => {
                    config
                        .exact
                        .entry(key.to_string())
                        .or_insert((rule.scope, rule.name));
                }
                MatchKind::Prefix => {
                    config
                        .prefixes
                        .push((normalize_prefix(key), rule.scope, rule.name));
                }
            }
        }

        config
    }

    /// Scope and semantic name for an item key; `None` leaves the item unclassified.
    pub fn classify(&self, item_key: &str) -> Option<(Scope, &'static str)> {
        if let Some(found) = self.exact.get(item_key) {
            return Some(*found);
        }
        self.prefixes
            .iter()
            .find(|(prefix, _, _)| item_key.starts_with(prefix.as_str()))
            .map(|(_, scope, name)| (*scope, *name))
    }

    /// Semantic name for an item key if it belongs to `scope`.
    pub fn classify_in(&self, scope: Scope, item_key: &str) -> Option<&'static str> {
        self.classify(item_key)
            .filter(|(found, _)| *found == scope)
            .map(|(_, name)| name)
    }

    /// Whether the key of a semantic metric differs from its default.
    pub fn is_customized(&self, name: &str) -> bool {
        self.customized.iter().any(|custom| *custom == name)
    }
}
