mod common;

use common::{FakeApi, HOST, cluster_items, context, context_with, fields, item};
use pgwidget::annotate::{ThresholdLevel, Trend};
use pgwidget::config::AppConfig;
use pgwidget::model::Severity;
use pgwidget::render;
use pgwidget::zabbix::{ItemId, ValueType};
use serde_json::json;

const DISCOVERY_PAYLOAD: &str =
    r#"{"data":[{"{#DBNAME}":"app"},{"{#DBNAME}":"app"},{"{#DBNAME}":""}]}"#;

#[tokio::test]
async fn full_render_assembles_every_stage() {
    let mut api = FakeApi::with_items(cluster_items());
    api.add_discovery("500", DISCOVERY_PAYLOAD);
    api.add_history("100", &(1..=25).map(f64::from).collect::<Vec<_>>());
    api.add_problem("9001", "t1", 4, "Too many connections", &["100"]);
    let (ctx, api) = context(api);

    let payload = render(
        &ctx,
        &fields(json!({
            "hostids": [HOST],
            "zabbix_base_url": "https://zabbix.example.com/",
        })),
    )
    .await;

    assert_eq!(payload.error, None);
    let names: Vec<&str> = payload.databases.iter().map(|db| db.name.as_str()).collect();
    assert_eq!(names, vec!["app"]);
    assert_eq!(payload.selected_db.as_deref(), Some("app"));

    let connections = &payload.cluster_metrics["active_connections"];
    assert_eq!(connections.history.len(), 20);
    assert_eq!(connections.history.first().copied(), Some(6.0));
    assert_eq!(connections.history.last().copied(), Some(25.0));
    assert_eq!(connections.trend, Some(Trend::Up));
    let alert = connections.alert.as_ref().expect("alert attached");
    assert_eq!(alert.severity, Severity::new(4));
    assert_eq!(alert.name, "Too many connections");
    assert_eq!(
        connections.graph_url.as_deref(),
        Some("https://zabbix.example.com/history.php?action=showgraph&itemids[]=100&from=now-86400s&to=now")
    );

    let cpu = &payload.host_metrics["host_cpu_load_avg1_key"];
    assert_eq!(cpu.label, "Host CPU load (avg1)");
    assert_eq!(cpu.threshold, Some(ThresholdLevel::Crit));

    let health = payload.health.as_ref().expect("health");
    assert_eq!(health.total, Some(98));
    let integrity = health
        .categories
        .iter()
        .find(|cat| cat.label == "Integrity")
        .expect("integrity");
    assert_eq!(
        integrity.detail.as_deref(),
        Some("12.0 rb / 340.0 commits (3.4%)")
    );
    assert_eq!(payload.databases[0].health.as_ref(), Some(health));

    // No discovery item configured: the host's rules were searched once.
    assert_eq!(api.calls_to("discoveryrule.get"), 1);
    assert_eq!(api.calls_to("problem.get"), 1);
}

#[tokio::test]
async fn zero_items_render_empty_payload() {
    let (ctx, _api) = context(FakeApi::default());

    let payload = render(&ctx, &fields(json!({ "hostids": HOST }))).await;

    assert_eq!(payload.error, None);
    assert!(payload.databases.is_empty());
    assert!(payload.cluster_metrics.is_empty());
    assert!(payload.host_metrics.is_empty());
    assert!(payload.health.is_none());
    assert_eq!(payload.selected_db, None);

    let json = serde_json::to_value(&payload).expect("json");
    assert!(json["error"].is_null());
    assert!(json["health"].is_null());

    let exposition = ctx.metrics.encode().expect("encode");
    assert!(!exposition.contains("host=\"10084\""), "{exposition}");
}

#[tokio::test]
async fn missing_host_asks_for_selection() {
    let (ctx, api) = context(FakeApi::with_items(cluster_items()));

    let payload = render(&ctx, &fields(json!({ "default_db": "app" }))).await;

    assert_eq!(payload.error.as_deref(), Some("Select a host first."));
    assert_eq!(payload.default_db, "app");
    assert!(payload.databases.is_empty());
    assert_eq!(api.calls_to("item.get"), 0);
}

#[tokio::test]
async fn item_listing_failure_becomes_error_payload() {
    let (ctx, _api) = context(FakeApi::with_items(cluster_items()).fail("item.get"));

    let payload = render(
        &ctx,
        &fields(json!({ "hostids": HOST, "cpu_warn_threshold": 4, "weight_bloat": 50 })),
    )
    .await;

    let error = payload.error.as_deref().expect("error");
    assert!(error.starts_with("View action error: "), "{error}");
    assert!(error.contains("item.get"), "{error}");
    assert_eq!(payload.cpu_warn_threshold, 1.0);
    assert_eq!(payload.cpu_high_threshold, 2.0);
    assert!(payload.health_weights.is_empty());
    assert!(payload.show_optional);
    assert!(payload.cluster_metrics.is_empty());
}

#[tokio::test]
async fn databases_fall_back_to_extracted_names() {
    let (ctx, _api) = context(FakeApi::with_items(cluster_items()));

    let payload = render(
        &ctx,
        &fields(json!({ "hostids": HOST, "default_db": "billing" })),
    )
    .await;

    let names: Vec<&str> = payload.databases.iter().map(|db| db.name.as_str()).collect();
    assert_eq!(names, vec!["app", "billing"]);
    assert_eq!(payload.selected_db.as_deref(), Some("billing"));

    // Connectivity 100, stability 100, efficiency 98, replication 100, bloat 10.
    let health = payload.health.as_ref().expect("health");
    assert_eq!(health.total, Some(94));
    let bloat = &payload.databases[1].metrics["bloat"];
    assert_eq!(bloat.threshold, Some(ThresholdLevel::Crit));
}

#[tokio::test]
async fn unknown_discovery_item_falls_back_to_host_rules() {
    let mut api = FakeApi::with_items(cluster_items());
    api.add_discovery("500", r#"[{"{#DBNAME}":"billing"}]"#);
    let (ctx, api) = context(api);

    let payload = render(
        &ctx,
        &fields(json!({ "hostids": HOST, "discovery_itemid": "999" })),
    )
    .await;

    assert_eq!(payload.error, None);
    let names: Vec<&str> = payload.databases.iter().map(|db| db.name.as_str()).collect();
    assert_eq!(names, vec!["billing"]);
    assert_eq!(api.calls_to("discoveryrule.get"), 1);
}

#[tokio::test]
async fn discovery_item_alone_resolves_the_host() {
    let mut api = FakeApi::with_items(cluster_items());
    api.add_discovery("500", DISCOVERY_PAYLOAD);
    let (ctx, api) = context(api);

    let payload = render(&ctx, &fields(json!({ "discovery_itemid": [{"itemid": "500"}] }))).await;

    assert_eq!(payload.error, None);
    assert_eq!(payload.databases.len(), 1);
    assert!(payload.cluster_metrics.contains_key("wal_count"));
    assert_eq!(api.calls_to("discoveryrule.get"), 0);
}

#[tokio::test]
async fn alert_failures_leave_metrics_unalerted() {
    let mut api = FakeApi::with_items(cluster_items()).fail("problem.get");
    api.add_problem("1", "t1", 5, "Disk full", &["200"]);
    let (ctx, api) = context(api);

    let payload = render(&ctx, &fields(json!({ "hostids": HOST }))).await;

    assert_eq!(payload.error, None);
    assert!(payload.databases.iter().all(|db| db.metrics.values().all(|m| m.alert.is_none())));
    assert_eq!(api.calls_to("trigger.get"), 0);
}

#[tokio::test]
async fn trigger_failure_leaves_metrics_unalerted() {
    let mut api = FakeApi::with_items(cluster_items()).fail("trigger.get");
    api.add_problem("1", "t1", 5, "Disk full", &["200"]);
    let (ctx, api) = context(api);

    let payload = render(&ctx, &fields(json!({ "hostids": HOST }))).await;

    assert_eq!(payload.error, None);
    assert_eq!(payload.databases[0].metrics["db_size"].alert, None);
    assert_eq!(api.calls_to("problem.get"), 1);
    assert_eq!(api.calls_to("trigger.get"), 1);
}

#[tokio::test]
async fn problems_without_trigger_items_attach_nothing() {
    let mut api = FakeApi::with_items(cluster_items());
    api.add_problem("1", "t1", 5, "Disk full", &["200"]);
    api.triggers.clear();
    let (ctx, _api) = context(api);

    let payload = render(&ctx, &fields(json!({ "hostids": HOST }))).await;

    assert_eq!(payload.error, None);
    assert!(payload.databases.iter().all(|db| db.metrics.values().all(|m| m.alert.is_none())));
    assert!(payload.cluster_metrics.values().all(|m| m.alert.is_none()));
}

#[tokio::test]
async fn history_failure_leaves_empty_windows() {
    let mut api = FakeApi::with_items(cluster_items()).fail("history.get");
    api.add_history("100", &[1.0, 2.0, 3.0, 4.0]);
    let (ctx, api) = context(api);

    let payload = render(&ctx, &fields(json!({ "hostids": HOST }))).await;

    assert_eq!(payload.error, None);
    assert_eq!(payload.databases.len(), 2);
    assert!(payload.cluster_metrics.values().all(|m| m.history.is_empty()));
    assert!(payload.cluster_metrics.values().all(|m| m.trend.is_none()));
    assert!(payload.databases.iter().all(|db| db.metrics.values().all(|m| m.history.is_empty())));
    assert!(api.calls_to("history.get") > 1);
}

#[tokio::test]
async fn overlapping_key_override_claims_item_once() {
    let (ctx, _api) = context(FakeApi::with_items(cluster_items()));

    let payload = render(
        &ctx,
        &fields(json!({ "hostids": HOST, "key_cache_hit": "pgsql.db.size" })),
    )
    .await;

    assert_eq!(payload.error, None);
    assert!(payload.databases[0].metrics.contains_key("db_size"));
    assert!(!payload.cluster_metrics.contains_key("cache_hit"));
    let efficiency = payload
        .health
        .as_ref()
        .expect("health")
        .categories
        .iter()
        .find(|cat| cat.label == "Efficiency")
        .expect("efficiency");
    assert!(!efficiency.detail.as_deref().unwrap_or_default().contains("cache hit"));
}

#[tokio::test]
async fn alert_threshold_follows_minimum_severity() {
    let mut api = FakeApi::with_items(cluster_items());
    api.add_problem("1", "t1", 2, "Slow queries", &["203"]);
    api.add_problem("2", "t2", 3, "Slow queries (average)", &["203"]);
    api.add_problem("3", "t3", 3, "Later equal severity", &["203"]);
    let (ctx, _api) = context(api);

    let payload = render(
        &ctx,
        &fields(json!({ "hostids": HOST, "alert_min_severity": "3" })),
    )
    .await;
    let slow = &payload.databases[0].metrics["slow_queries"];
    let alert = slow.alert.as_ref().expect("alert");
    assert_eq!(alert.name, "Slow queries (average)");
    assert_eq!(alert.label, "Average");
}

#[tokio::test]
async fn history_windows_are_per_item() {
    let mut api = FakeApi::with_items(cluster_items());
    api.add_history("100", &(0..30).map(f64::from).collect::<Vec<_>>());
    api.add_history("102", &[1.0, 2.0, 3.0]);
    let mut text_item = item("400", "pgsql.wal.write", "n/a", "");
    text_item.value_type = ValueType::Text;
    api.items.push(text_item);
    api.add_history("400", &[1.0, 2.0]);
    let (ctx, _api) = context(api);

    let payload = render(&ctx, &fields(json!({ "hostids": HOST }))).await;

    assert_eq!(payload.cluster_metrics["active_connections"].history.len(), 20);
    assert_eq!(payload.cluster_metrics["wal_count"].history, vec![1.0, 2.0, 3.0]);
    assert!(payload.cluster_metrics["wal_write"].history.is_empty());
    assert!(payload.cluster_metrics["idle_in_transaction"].history.is_empty());
}

#[tokio::test]
async fn configured_widget_defaults_apply_under_request_fields() {
    let mut config = AppConfig::default();
    config.widget = fields(json!({
        "hostids": HOST,
        "key_active_connections": "custom.connections",
        "show_db_size": 0,
    }));
    let mut items = cluster_items();
    items.push(item("900", "custom.connections", "12", ""));
    let (ctx, _api) = context_with(FakeApi::with_items(items), config);

    let payload = render(&ctx, &fields(json!({}))).await;

    assert_eq!(payload.error, None);
    let connections = &payload.cluster_metrics["active_connections"];
    assert_eq!(connections.itemid, Some(ItemId::from("900")));
    assert!(!payload.visible_metric_keys.contains(&"db_size".to_string()));

    let health = payload.health.as_ref().expect("health");
    let connectivity = &health.categories[0];
    assert_eq!(
        connectivity.detail.as_deref(),
        Some("12.0% connections used (value is not a percentage)")
    );
}
