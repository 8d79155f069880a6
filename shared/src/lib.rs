pub mod aws;
pub mod metrics_defs;
