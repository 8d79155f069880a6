//! Logging, error reporting and metrics setup for the binary.

use crate::config::CommonConfig;
use metrics_exporter_statsd::StatsdBuilder;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

const METRICS_PREFIX: &str = "edgesync";

#[derive(thiserror::Error, Debug)]
pub enum ObservabilityError {
    #[error("invalid sentry dsn: {0}")]
    SentryDsn(String),
    #[error("could not install tracing subscriber: {0}")]
    Subscriber(#[from] tracing_subscriber::util::TryInitError),
    #[error("could not create statsd recorder: {0}")]
    Statsd(String),
    #[error("a metrics recorder is already installed")]
    RecorderInstalled,
}

/// Keeps the sentry client alive; events still queued are flushed on drop.
pub struct Guard {
    _sentry: Option<sentry::ClientInitGuard>,
}

/// `RUST_LOG` takes precedence over `log_level`.
pub fn init(log_level: &str, common: &CommonConfig) -> Result<Guard, ObservabilityError> {
    let sentry = match &common.logging {
        Some(logging) => {
            let dsn = logging
                .sentry_dsn
                .parse()
                .map_err(|err| ObservabilityError::SentryDsn(format!("{err}")))?;

            Some(sentry::init(sentry::ClientOptions {
                dsn: Some(dsn),
                release: sentry::release_name!(),
                ..Default::default()
            }))
        }
        None => None,
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(sentry.as_ref().map(|_| sentry::integrations::tracing::layer()))
        .try_init()?;

    if let Some(metrics) = &common.metrics {
        let recorder = StatsdBuilder::from(metrics.statsd_host.clone(), metrics.statsd_port)
            .build(Some(METRICS_PREFIX))
            .map_err(|err| ObservabilityError::Statsd(err.to_string()))?;

        metrics::set_global_recorder(recorder)
            .map_err(|_| ObservabilityError::RecorderInstalled)?;

        tracing::info!(
            host = %metrics.statsd_host,
            port = metrics.statsd_port,
            "Sending metrics to statsd"
        );
    }

    shared::metrics_defs::describe(resolver::metrics_defs::ALL_METRICS);
    shared::metrics_defs::describe(distribution::metrics_defs::ALL_METRICS);
    shared::metrics_defs::describe(crate::metrics_defs::ALL_METRICS);

    Ok(Guard { _sentry: sentry })
}
