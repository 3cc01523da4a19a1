//! Prometheus text-format metrics for `GET /metrics`. Grounded on
//! `kimberlite-server::metrics::Metrics`'s role (a registry rendered to
//! text on demand by the HTTP sidecar); the gauges/counters themselves are
//! this daemon's own (service/check counts, request totals).

use prometheus::{Encoder, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

pub struct Metrics {
    registry: Registry,
    pub services_total: IntGauge,
    pub checks_down: IntGauge,
    pub requests_total: IntCounterVec,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let services_total = IntGauge::new("warden_services_total", "Services known to the current plan").expect("metric name is valid");
        let checks_down = IntGauge::new("warden_checks_down", "Checks currently in the down state").expect("metric name is valid");
        let requests_total = IntCounterVec::new(
            Opts::new("warden_api_requests_total", "API requests handled, by route"),
            &["route"],
        )
        .expect("metric name is valid");

        registry.register(Box::new(services_total.clone())).expect("metric registered once");
        registry.register(Box::new(checks_down.clone())).expect("metric registered once");
        registry.register(Box::new(requests_total.clone())).expect("metric registered once");

        Self {
            registry,
            services_total,
            checks_down,
            requests_total,
        }
    }

    /// Renders the registry in Prometheus text exposition format (§B.4).
    pub fn render(&self) -> String {
        let families = self.registry.gather();
        let mut buf = Vec::new();
        TextEncoder::new().encode(&families, &mut buf).expect("prometheus text encoding is infallible");
        String::from_utf8(buf).expect("prometheus text output is valid utf-8")
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rendered_output_includes_registered_metric_names() {
        let metrics = Metrics::new();
        metrics.services_total.set(3);
        metrics.requests_total.with_label_values(&["/v1/system-info"]).inc();
        let rendered = metrics.render();
        assert!(rendered.contains("warden_services_total 3"));
        assert!(rendered.contains("warden_api_requests_total"));
    }
}
