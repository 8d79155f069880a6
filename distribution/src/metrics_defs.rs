//! Metrics definitions for the distribution merge and store.

use shared::metrics_defs::{MetricDef, MetricType};

pub const BEHAVIORS_UPDATED: MetricDef = MetricDef {
    name: "merge.behaviors.updated",
    metric_type: MetricType::Counter,
    description: "Number of behaviors whose associations or cookie whitelist were replaced",
};

pub const BEHAVIORS_DISABLED: MetricDef = MetricDef {
    name: "merge.behaviors.disabled",
    metric_type: MetricType::Counter,
    description: "Number of behaviors cleared by a disabled route",
};

pub const ROUTES_UNMATCHED: MetricDef = MetricDef {
    name: "merge.routes.unmatched",
    metric_type: MetricType::Counter,
    description: "Number of route table entries without a behavior in the distribution",
};

pub const STORE_CONFLICTS: MetricDef = MetricDef {
    name: "store.conflicts",
    metric_type: MetricType::Counter,
    description: "Number of updates rejected because the distribution changed since it was fetched",
};

pub const ALL_METRICS: &[MetricDef] = &[
    BEHAVIORS_UPDATED,
    BEHAVIORS_DISABLED,
    ROUTES_UNMATCHED,
    STORE_CONFLICTS,
];
