use crate::route_table::{LifecycleEvent, RouteKey};
use serde::{Deserialize, Serialize};

/// Which cookies a behavior forwards to the origin.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ForwardMode {
    None,
    Whitelist,
    All,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CookiePolicy {
    pub forward: ForwardMode,
    // None means the policy carries no whitelist at all, which is distinct
    // from an empty one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub whitelisted_names: Option<Vec<String>>,
}

impl CookiePolicy {
    /// Forward no cookies, with an empty whitelist.
    pub fn none() -> Self {
        CookiePolicy {
            forward: ForwardMode::None,
            whitelisted_names: Some(Vec::new()),
        }
    }

    pub fn whitelist(names: Vec<String>) -> Self {
        CookiePolicy {
            forward: ForwardMode::Whitelist,
            whitelisted_names: Some(names),
        }
    }
}

/// A function attached to one lifecycle event of a behavior.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionAssociation {
    pub event: LifecycleEvent,
    pub function_identity: String,
}

impl FunctionAssociation {
    pub fn new(event: LifecycleEvent, function_identity: impl Into<String>) -> Self {
        FunctionAssociation {
            event,
            function_identity: function_identity.into(),
        }
    }
}

/// The settings of a single behavior the merge rewrites.
pub trait CacheBehavior {
    fn function_associations(&self) -> &[FunctionAssociation];
    fn cookie_policy(&self) -> Option<&CookiePolicy>;
    fn set_function_associations(&mut self, associations: Vec<FunctionAssociation>);
    fn set_cookie_policy(&mut self, policy: CookiePolicy);
}

/// A distribution configuration: one default behavior plus an ordered list
/// of behaviors addressed by route pattern.
pub trait Distribution {
    /// Visits the default behavior first, then every other behavior in order.
    fn for_each_behavior(&mut self, visit: &mut dyn FnMut(RouteKey<'_>, &mut dyn CacheBehavior));
}
