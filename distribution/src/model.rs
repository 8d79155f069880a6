//! Provider-neutral view of a distribution configuration.
//!
//! Carries the fields the merge reads or writes, plus the origin each behavior
//! targets so behaviors can be told apart in logs and tests. Store adapters
//! translate between this view and the provider's own representation.

use crate::behavior::{CacheBehavior, CookiePolicy, Distribution, FunctionAssociation};
use crate::route_table::RouteKey;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BehaviorSettings {
    pub target_origin_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cookies: Option<CookiePolicy>,
    #[serde(default)]
    pub function_associations: Vec<FunctionAssociation>,
}

impl BehaviorSettings {
    pub fn new(target_origin_id: impl Into<String>) -> Self {
        BehaviorSettings {
            target_origin_id: target_origin_id.into(),
            cookies: None,
            function_associations: Vec::new(),
        }
    }

    pub fn with_cookies(mut self, cookies: CookiePolicy) -> Self {
        self.cookies = Some(cookies);
        self
    }

    pub fn with_associations(mut self, associations: Vec<FunctionAssociation>) -> Self {
        self.function_associations = associations;
        self
    }
}

impl CacheBehavior for BehaviorSettings {
    fn function_associations(&self) -> &[FunctionAssociation] {
        &self.function_associations
    }

    fn cookie_policy(&self) -> Option<&CookiePolicy> {
        self.cookies.as_ref()
    }

    fn set_function_associations(&mut self, associations: Vec<FunctionAssociation>) {
        self.function_associations = associations;
    }

    fn set_cookie_policy(&mut self, policy: CookiePolicy) {
        self.cookies = Some(policy);
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RoutedBehavior {
    pub path_pattern: String,
    #[serde(flatten)]
    pub settings: BehaviorSettings,
}

impl RoutedBehavior {
    pub fn new(path_pattern: impl Into<String>, settings: BehaviorSettings) -> Self {
        RoutedBehavior {
            path_pattern: path_pattern.into(),
            settings,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DistributionConfig {
    pub default_behavior: BehaviorSettings,
    /// Ordered by matching priority. The order is never changed.
    #[serde(default)]
    pub behaviors: Vec<RoutedBehavior>,
}

impl DistributionConfig {
    pub fn new(default_behavior: BehaviorSettings) -> Self {
        DistributionConfig {
            default_behavior,
            behaviors: Vec::new(),
        }
    }

    pub fn with_behavior(mut self, behavior: RoutedBehavior) -> Self {
        self.behaviors.push(behavior);
        self
    }

    pub fn behavior(&self, key: RouteKey<'_>) -> Option<&BehaviorSettings> {
        match key {
            RouteKey::Default => Some(&self.default_behavior),
            RouteKey::Pattern(pattern) => self
                .behaviors
                .iter()
                .find(|b| b.path_pattern == pattern)
                .map(|b| &b.settings),
        }
    }
}

impl Distribution for DistributionConfig {
    fn for_each_behavior(&mut self, visit: &mut dyn FnMut(RouteKey<'_>, &mut dyn CacheBehavior)) {
        visit(RouteKey::Default, &mut self.default_behavior);
        for behavior in &mut self.behaviors {
            visit(RouteKey::Pattern(&behavior.path_pattern), &mut behavior.settings);
        }
    }
}
