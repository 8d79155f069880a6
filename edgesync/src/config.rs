use distribution::{LifecycleEvent, RouteTable};
use indexmap::IndexMap;
use serde::Deserialize;
use shared::aws::AwsConfig;
use std::collections::BTreeMap;
use std::fs::File;
use std::path::Path;

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum ValidationError {
    #[error("distribution_id cannot be empty")]
    EmptyDistributionId,

    #[error("deployment has no routes")]
    MissingRoutes,

    #[error("function {0} has an empty deployed name")]
    EmptyFunctionName(String),

    #[error("route {route} uses undeclared function {function} for {event}")]
    UnknownFunction {
        route: String,
        event: LifecycleEvent,
        function: String,
    },
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct MetricsConfig {
    pub statsd_host: String,
    pub statsd_port: u16,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct LoggingConfig {
    pub sentry_dsn: String,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct CommonConfig {
    pub metrics: Option<MetricsConfig>,
    pub logging: Option<LoggingConfig>,
}

/// What to deploy and where.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct DeploymentConfig {
    #[serde(default)]
    pub distribution_id: String,
    /// User-facing function name to the name it is deployed under.
    #[serde(default)]
    pub functions: IndexMap<String, String>,
    pub routes: Option<RouteTable>,
}

impl DeploymentConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.distribution_id.trim().is_empty() {
            return Err(ValidationError::EmptyDistributionId);
        }

        let routes = self.route_table()?;

        for (name, function_name) in &self.functions {
            if function_name.trim().is_empty() {
                return Err(ValidationError::EmptyFunctionName(name.clone()));
            }
        }

        for (key, behavior) in routes.iter() {
            for (event, function) in behavior.referenced_functions() {
                if !self.functions.contains_key(function) {
                    return Err(ValidationError::UnknownFunction {
                        route: key.to_string(),
                        event,
                        function: function.to_string(),
                    });
                }
            }
        }

        Ok(())
    }

    pub fn route_table(&self) -> Result<&RouteTable, ValidationError> {
        self.routes.as_ref().ok_or(ValidationError::MissingRoutes)
    }

    /// Declared functions used by at least one route, mapped to their
    /// deployed names. Declared but unused functions are not resolved.
    pub fn referenced_functions(&self) -> BTreeMap<String, String> {
        let referenced = self
            .routes
            .as_ref()
            .map(RouteTable::referenced_functions)
            .unwrap_or_default();

        self.functions
            .iter()
            .filter(|(name, _)| referenced.contains(name.as_str()))
            .map(|(name, function_name)| (name.clone(), function_name.clone()))
            .collect()
    }
}

#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(flatten)]
    pub common: CommonConfig,
    #[serde(default)]
    pub aws: AwsConfig,
    pub deployment: DeploymentConfig,
}

impl Config {
    /// Loads and validates the config. Nothing external is contacted.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let file = File::open(path)?;
        let config: Config = serde_yaml::from_reader(file)?;
        config.deployment.validate()?;

        Ok(config)
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("could not load config from file: {0}")]
    LoadError(#[from] std::io::Error),
    #[error("could not parse config: {0}")]
    ParseError(#[from] serde_yaml::Error),
    #[error("invalid config: {0}")]
    Invalid(#[from] ValidationError),
}
