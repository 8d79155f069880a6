use shared::metrics_defs::{MetricDef, MetricType};

pub const DEPLOY_DURATION: MetricDef = MetricDef {
    name: "deploy.duration",
    metric_type: MetricType::Histogram,
    description: "Duration of a deployment run in seconds, from validation to the final write",
};

pub const DEPLOYS_COMPLETED: MetricDef = MetricDef {
    name: "deploy.completed",
    metric_type: MetricType::Counter,
    description: "Number of deployment runs that finished, dry runs included",
};

pub const DEPLOYS_FAILED: MetricDef = MetricDef {
    name: "deploy.failed",
    metric_type: MetricType::Counter,
    description: "Number of deployment runs that failed",
};

pub const ALL_METRICS: &[MetricDef] = &[DEPLOY_DURATION, DEPLOYS_COMPLETED, DEPLOYS_FAILED];
