use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGaugeVec, Opts, Registry, TextEncoder,
};

/// Metrics registry for the widget backend scraped by Prometheus.
#[derive(Clone)]
pub struct AppMetrics {
    registry: Arc<Registry>,
    renders: RenderMetrics,
    upstream: UpstreamMetrics,
    widget: WidgetMetrics,
}

/// How a widget render ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderOutcome {
    Ok,
    /// No host or discovery item selected.
    MissingHost,
    Failed,
}

/// What one render saw of a host.
#[derive(Debug, Clone, Copy, Default)]
pub struct HostReport {
    pub items: usize,
    pub history_samples: usize,
    pub health: Option<u8>,
}

impl RenderOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            RenderOutcome::Ok => "ok",
            RenderOutcome::MissingHost => "missing_host",
            RenderOutcome::Failed => "failed",
        }
    }
}

impl AppMetrics {
    pub fn new() -> Result<Self> {
        let registry = Arc::new(Registry::new_custom(Some("pgwidget".into()), None)?);

        let renders = RenderMetrics::register(&registry)?;
        let upstream = UpstreamMetrics::register(&registry)?;
        let widget = WidgetMetrics::register(&registry)?;

        Ok(Self {
            registry,
            renders,
            upstream,
            widget,
        })
    }

    /// Record one finished render and how long it took.
    pub fn observe_render(&self, outcome: RenderOutcome, duration: Duration) {
        let labels = &[outcome.as_str()];
        self.renders
            .duration
            .with_label_values(labels)
            .observe(duration.as_secs_f64());
        self.renders.total.with_label_values(labels).inc();
    }

    /// Increment the failure counter of a JSON-RPC method.
    pub fn inc_upstream_error(&self, method: &str) {
        self.upstream
            .errors_total
            .with_label_values(&[sanitize_label(method).as_str()])
            .inc();
    }

    /// Publish the per-host gauges of a finished render.
    ///
    /// Only hosts that returned items keep series, so request-supplied host
    /// ids without items never add label values. A `None` score drops the
    /// health series of the host.
    pub fn record_host(&self, host: &str, report: HostReport) {
        let host = sanitize_label(host);
        let labels = &[host.as_str()];

        if report.items == 0 {
            // Absent series are fine: the host never had any.
            let _ = self.widget.health_score.remove_label_values(labels);
            let _ = self.widget.history_samples.remove_label_values(labels);
            return;
        }

        self.widget
            .history_samples
            .with_label_values(labels)
            .set(i64::try_from(report.history_samples).unwrap_or(i64::MAX));
        match report.health {
            Some(total) => self
                .widget
                .health_score
                .with_label_values(labels)
                .set(i64::from(total)),
            None => {
                let _ = self.widget.health_score.remove_label_values(labels);
            }
        }
    }

    /// Encode metrics into Prometheus exposition format.
    pub fn encode(&self) -> Result<String> {
        let families = self.registry.gather();
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

#[derive(Clone)]
struct RenderMetrics {
    duration: HistogramVec,
    total: IntCounterVec,
}

impl RenderMetrics {
    fn register(registry: &Registry) -> Result<Self> {
        let duration = HistogramVec::new(
            HistogramOpts::new("render_duration_seconds", "Widget render duration")
                .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]),
            &["outcome"],
        )?;
        registry.register(Box::new(duration.clone()))?;

        let total = IntCounterVec::new(
            Opts::new("renders_total", "Widget renders by outcome"),
            &["outcome"],
        )?;
        registry.register(Box::new(total.clone()))?;

        Ok(Self { duration, total })
    }
}

#[derive(Clone)]
struct UpstreamMetrics {
    errors_total: IntCounterVec,
}

impl UpstreamMetrics {
    fn register(registry: &Registry) -> Result<Self> {
        let errors_total = IntCounterVec::new(
            Opts::new(
                "upstream_errors_total",
                "Failed monitoring API calls per JSON-RPC method",
            ),
            &["method"],
        )?;
        registry.register(Box::new(errors_total.clone()))?;

        Ok(Self { errors_total })
    }
}

#[derive(Clone)]
struct WidgetMetrics {
    health_score: IntGaugeVec,
    history_samples: IntGaugeVec,
}

impl WidgetMetrics {
    fn register(registry: &Registry) -> Result<Self> {
        let health_score = IntGaugeVec::new(
            Opts::new(
                "health_score",
                "Composite health score of the last render (0-100)",
            ),
            &["host"],
        )?;
        registry.register(Box::new(health_score.clone()))?;

        let history_samples = IntGaugeVec::new(
            Opts::new(
                "history_samples",
                "History samples attached in the last render",
            ),
            &["host"],
        )?;
        registry.register(Box::new(history_samples.clone()))?;

        Ok(Self {
            health_score,
            history_samples,
        })
    }
}

fn sanitize_label(value: &str) -> String {
    value
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || ch == '_' || ch == ':' || ch == '.' {
                ch
            } else {
                '_'
            }
        })
        .collect()
}
