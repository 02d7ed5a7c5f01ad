//! Time-series identity and metric-type naming rules.
//!
//! The backend refuses a request holding two series with the same metric
//! type and label values, so the signature here is the unit of
//! de-duplication for the whole pipeline.

use crate::types::Metric;

/// Domain used for metric names that don't already carry one.
pub const DEFAULT_METRIC_DOMAIN: &str = "custom.googleapis.com/opencensus/";

/// Prefixes under which metric types are user-defined rather than built in.
const EXTERNAL_METRIC_PREFIXES: &[&str] = &["custom.googleapis.com/", "external.googleapis.com/"];

/// Domains that mark a metric name as already fully qualified.
const KNOWN_DOMAINS: &[&str] = &["googleapis.com", "kubernetes.io", "istio.io"];

/// Canonical identity of a metric: its type, then its label values sorted
/// lexicographically.
///
/// Sorting values keeps the signature independent of label iteration order.
pub fn metric_signature(metric: &Metric) -> String {
    let mut values: Vec<&str> = metric.labels.values().map(String::as_str).collect();
    values.sort_unstable();
    format!("{}:{}", metric.metric_type, values.join(","))
}

/// Whether `metric_type` names a metric owned by the backend itself.
///
/// Built-in metrics need no descriptor creation and are written through the
/// service time-series endpoint.
pub fn is_builtin_metric(metric_type: &str) -> bool {
    !EXTERNAL_METRIC_PREFIXES
        .iter()
        .any(|prefix| metric_type.starts_with(prefix))
}

/// Full metric type for a locally named metric.
///
/// `prefix` is prepended first; names without a known domain are then placed
/// under [`DEFAULT_METRIC_DOMAIN`].
pub fn metric_type(prefix: &str, name: &str) -> String {
    let name = format!("{prefix}{name}");
    if KNOWN_DOMAINS.iter().any(|domain| name.contains(domain)) {
        return name;
    }
    format!("{DEFAULT_METRIC_DOMAIN}{}", name.trim_start_matches('/'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_sorts_label_values() {
        let a = Metric::new("a/b/c")
            .with_label("k1", "zeta")
            .with_label("k2", "alpha");
        assert_eq!(metric_signature(&a), "a/b/c:alpha,zeta");
    }

    #[test]
    fn signature_ignores_keys() {
        // Values alone form the identity, matching the backend's own check.
        let a = Metric::new("t").with_label("k1", "v");
        let b = Metric::new("t").with_label("k2", "v");
        assert_eq!(metric_signature(&a), metric_signature(&b));
    }

    #[test]
    fn signature_without_labels() {
        assert_eq!(metric_signature(&Metric::new("X/Y/Z")), "X/Y/Z:");
    }

    #[test]
    fn signature_distinguishes_types() {
        let a = Metric::new("a/b/c").with_label("k1", "v1");
        let b = Metric::new("A/b/c").with_label("k1", "v1");
        assert_ne!(metric_signature(&a), metric_signature(&b));
    }

    #[test]
    fn builtin_detection() {
        assert!(is_builtin_metric("kubernetes.io/container/cpu/usage"));
        assert!(is_builtin_metric("agent.googleapis.com/system.swap.page_faults"));
        assert!(!is_builtin_metric("custom.googleapis.com/opencensus/latency"));
        assert!(!is_builtin_metric("external.googleapis.com/prometheus/up"));
    }

    #[test]
    fn metric_type_adds_default_domain() {
        assert_eq!(
            metric_type("", "http/latency"),
            "custom.googleapis.com/opencensus/http/latency"
        );
        assert_eq!(
            metric_type("", "/http/latency"),
            "custom.googleapis.com/opencensus/http/latency"
        );
    }

    #[test]
    fn metric_type_keeps_known_domain() {
        assert_eq!(
            metric_type("", "kubernetes.io/container/restarts"),
            "kubernetes.io/container/restarts"
        );
        assert_eq!(
            metric_type("external.googleapis.com/prom/", "up"),
            "external.googleapis.com/prom/up"
        );
    }

    #[test]
    fn metric_type_applies_prefix() {
        assert_eq!(
            metric_type("myapp/", "requests"),
            "custom.googleapis.com/opencensus/myapp/requests"
        );
    }
}
