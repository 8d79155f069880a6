//! Metrics definitions for the function resolver.

use shared::metrics_defs::{MetricDef, MetricType};

pub const VERSION_PAGES_FETCHED: MetricDef = MetricDef {
    name: "resolver.version_pages.fetched",
    metric_type: MetricType::Counter,
    description: "Number of version listing pages requested from the function service",
};

pub const FUNCTIONS_RESOLVED: MetricDef = MetricDef {
    name: "resolver.functions.resolved",
    metric_type: MetricType::Counter,
    description: "Number of functions resolved to a published version",
};

pub const ALL_METRICS: &[MetricDef] = &[VERSION_PAGES_FETCHED, FUNCTIONS_RESOLVED];
