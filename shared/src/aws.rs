//! Explicit AWS execution context.
//!
//! Clients are constructed from an `SdkConfig` built here instead of relying on
//! whatever region happens to be configured in the environment. Lambda@Edge
//! functions live in us-east-1, so that is the default region.

use aws_config::{BehaviorVersion, Region, SdkConfig};
use serde::Deserialize;
use url::Url;

pub const DEFAULT_REGION: &str = "us-east-1";

fn default_region() -> String {
    DEFAULT_REGION.into()
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct AwsConfig {
    #[serde(default = "default_region")]
    pub region: String,
    /// Named profile from the shared AWS config files
    pub profile: Option<String>,
    /// Overrides the service endpoints (e.g. a local emulator)
    pub endpoint_url: Option<Url>,
}

impl Default for AwsConfig {
    fn default() -> Self {
        AwsConfig {
            region: default_region(),
            profile: None,
            endpoint_url: None,
        }
    }
}

impl AwsConfig {
    /// Builds the SDK configuration every AWS client in a run is created from.
    /// Credentials are still resolved through the default provider chain.
    pub async fn load(&self) -> SdkConfig {
        let mut loader =
            aws_config::defaults(BehaviorVersion::latest()).region(Region::new(self.region.clone()));

        if let Some(profile) = &self.profile {
            loader = loader.profile_name(profile);
        }

        if let Some(endpoint_url) = &self.endpoint_url {
            loader = loader.endpoint_url(endpoint_url.as_str());
        }

        tracing::debug!(region = %self.region, profile = ?self.profile, "Loading AWS configuration");
        loader.load().await
    }
}
