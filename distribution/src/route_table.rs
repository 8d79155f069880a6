//! The route-keyed table of behavior updates to apply to a distribution.
//!
//! Route entries are parsed once at load time into a [`RouteBehavior`], so the
//! merge never has to probe which fields an entry happens to carry:
//!
//! ```yaml
//! default:
//!   event_associations:
//!     viewer-request: rewriter
//! /pages_contents/*:
//!   event_associations:
//!     viewer-request: auth
//!     origin-response: headers
//!   cookie_whitelist: [oatmeal_cookie, chocolate-cookie]
//! /legacy/*:
//!   disable: true
//! ```

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Table key addressing the distribution's default (catch-all) behavior.
pub const DEFAULT_ROUTE_KEY: &str = "default";

/// The points in the request lifecycle a function can be attached to.
///
/// Variants are declared in emission order; `Ord` follows declaration order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum LifecycleEvent {
    ViewerRequest,
    ViewerResponse,
    OriginRequest,
    OriginResponse,
}

impl LifecycleEvent {
    pub const ALL: [LifecycleEvent; 4] = [
        LifecycleEvent::ViewerRequest,
        LifecycleEvent::ViewerResponse,
        LifecycleEvent::OriginRequest,
        LifecycleEvent::OriginResponse,
    ];

    pub const fn as_str(&self) -> &'static str {
        match self {
            LifecycleEvent::ViewerRequest => "viewer-request",
            LifecycleEvent::ViewerResponse => "viewer-response",
            LifecycleEvent::OriginRequest => "origin-request",
            LifecycleEvent::OriginResponse => "origin-response",
        }
    }
}

impl fmt::Display for LifecycleEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle event to user-facing function name. Iterates in event order.
pub type EventAssociations = BTreeMap<LifecycleEvent, String>;

/// Identifies a behavior within a distribution.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RouteKey<'a> {
    Default,
    Pattern(&'a str),
}

impl<'a> From<&'a str> for RouteKey<'a> {
    fn from(key: &'a str) -> Self {
        if key == DEFAULT_ROUTE_KEY {
            RouteKey::Default
        } else {
            RouteKey::Pattern(key)
        }
    }
}

impl fmt::Display for RouteKey<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouteKey::Default => f.write_str(DEFAULT_ROUTE_KEY),
            RouteKey::Pattern(pattern) => f.write_str(pattern),
        }
    }
}

/// Route entry as written in the configuration file.
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawRouteBehavior {
    #[serde(default)]
    disable: bool,
    event_associations: Option<EventAssociations>,
    cookie_whitelist: Option<Vec<String>>,
}

/// What to do with one behavior of the distribution.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(from = "RawRouteBehavior")]
pub enum RouteBehavior {
    /// Remove every function association and stop forwarding cookies.
    Disabled,
    /// Replace the associations and/or the cookie whitelist. `None` leaves the
    /// corresponding setting untouched.
    Update {
        associations: Option<EventAssociations>,
        cookie_whitelist: Option<Vec<String>>,
    },
}

impl From<RawRouteBehavior> for RouteBehavior {
    fn from(raw: RawRouteBehavior) -> Self {
        // disable wins over anything else the entry carries
        if raw.disable {
            return RouteBehavior::Disabled;
        }

        RouteBehavior::Update {
            associations: raw.event_associations,
            // An empty whitelist does not change the cookie policy; only
            // `disable` clears it.
            cookie_whitelist: raw.cookie_whitelist.filter(|names| !names.is_empty()),
        }
    }
}

impl RouteBehavior {
    /// An update replacing the function associations only.
    pub fn associations<I, N>(associations: I) -> Self
    where
        I: IntoIterator<Item = (LifecycleEvent, N)>,
        N: Into<String>,
    {
        RouteBehavior::Update {
            associations: Some(
                associations
                    .into_iter()
                    .map(|(event, name)| (event, name.into()))
                    .collect(),
            ),
            cookie_whitelist: None,
        }
    }

    /// An update replacing the cookie whitelist only.
    pub fn cookies<I, N>(names: I) -> Self
    where
        I: IntoIterator<Item = N>,
        N: Into<String>,
    {
        RouteBehavior::Update {
            associations: None,
            cookie_whitelist: None,
        }
        .with_cookies(names)
    }

    /// Adds a cookie whitelist to an update. Has no effect on `Disabled`.
    pub fn with_cookies<I, N>(self, names: I) -> Self
    where
        I: IntoIterator<Item = N>,
        N: Into<String>,
    {
        match self {
            RouteBehavior::Disabled => RouteBehavior::Disabled,
            RouteBehavior::Update { associations, .. } => {
                let names: Vec<String> = names.into_iter().map(Into::into).collect();
                RouteBehavior::Update {
                    associations,
                    cookie_whitelist: (!names.is_empty()).then_some(names),
                }
            }
        }
    }

    /// Function names referenced by this entry, with the events using them.
    pub fn referenced_functions(&self) -> impl Iterator<Item = (LifecycleEvent, &str)> {
        let associations = match self {
            RouteBehavior::Update {
                associations: Some(associations),
                ..
            } => Some(associations),
            _ => None,
        };

        associations
            .into_iter()
            .flatten()
            .map(|(event, name)| (*event, name.as_str()))
    }
}

/// Behavior updates keyed by route pattern, plus an optional entry for the
/// default behavior.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(from = "IndexMap<String, RouteBehavior>")]
pub struct RouteTable {
    default: Option<RouteBehavior>,
    patterns: IndexMap<String, RouteBehavior>,
}

impl From<IndexMap<String, RouteBehavior>> for RouteTable {
    fn from(entries: IndexMap<String, RouteBehavior>) -> Self {
        let mut table = RouteTable::new();
        for (key, behavior) in entries {
            table.insert(RouteKey::from(key.as_str()), behavior);
        }
        table
    }
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: RouteKey<'_>, behavior: RouteBehavior) {
        match key {
            RouteKey::Default => self.default = Some(behavior),
            RouteKey::Pattern(pattern) => {
                self.patterns.insert(pattern.to_string(), behavior);
            }
        }
    }

    pub fn with(mut self, key: RouteKey<'_>, behavior: RouteBehavior) -> Self {
        self.insert(key, behavior);
        self
    }

    pub fn get(&self, key: RouteKey<'_>) -> Option<&RouteBehavior> {
        match key {
            RouteKey::Default => self.default.as_ref(),
            RouteKey::Pattern(pattern) => self.patterns.get(pattern),
        }
    }

    /// Entries in table order, default first.
    pub fn iter(&self) -> impl Iterator<Item = (RouteKey<'_>, &RouteBehavior)> {
        self.default
            .as_ref()
            .map(|behavior| (RouteKey::Default, behavior))
            .into_iter()
            .chain(
                self.patterns
                    .iter()
                    .map(|(pattern, behavior)| (RouteKey::Pattern(pattern), behavior)),
            )
    }

    pub fn len(&self) -> usize {
        self.patterns.len() + usize::from(self.default.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Distinct function names referenced anywhere in the table.
    pub fn referenced_functions(&self) -> BTreeSet<&str> {
        self.iter()
            .flat_map(|(_, behavior)| behavior.referenced_functions())
            .map(|(_, name)| name)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_route_table() {
        let yaml = r#"
default:
  event_associations:
    viewer-request: rewriter
/pages_contents/*:
  event_associations:
    origin-response: headers
    viewer-request: auth
  cookie_whitelist:
    - oatmeal_cookie
    - chocolate-cookie
/legacy/*:
  disable: true
"#;
        let table: RouteTable = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(table.len(), 3);
        assert_eq!(
            table.get(RouteKey::Default),
            Some(&RouteBehavior::associations([(
                LifecycleEvent::ViewerRequest,
                "rewriter"
            )]))
        );
        assert_eq!(
            table.get(RouteKey::Pattern("/pages_contents/*")),
            Some(
                &RouteBehavior::associations([
                    (LifecycleEvent::ViewerRequest, "auth"),
                    (LifecycleEvent::OriginResponse, "headers"),
                ])
                .with_cookies(["oatmeal_cookie", "chocolate-cookie"])
            )
        );
        assert_eq!(
            table.get(RouteKey::Pattern("/legacy/*")),
            Some(&RouteBehavior::Disabled)
        );
        assert_eq!(table.get(RouteKey::Pattern("/missing/*")), None);
    }

    #[test]
    fn test_disable_wins() {
        let yaml = r#"
disable: true
event_associations:
  viewer-request: auth
cookie_whitelist: [session]
"#;
        let behavior: RouteBehavior = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(behavior, RouteBehavior::Disabled);
        assert_eq!(behavior.referenced_functions().count(), 0);
    }

    #[test]
    fn test_disable_false_is_an_update() {
        let yaml = "disable: false\ncookie_whitelist: [session]";
        let behavior: RouteBehavior = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(behavior, RouteBehavior::cookies(["session"]));
    }

    #[test]
    fn test_empty_cookie_whitelist_is_ignored() {
        let behavior: RouteBehavior = serde_yaml::from_str("cookie_whitelist: []").unwrap();
        assert_eq!(
            behavior,
            RouteBehavior::Update {
                associations: None,
                cookie_whitelist: None,
            }
        );
    }

    #[test]
    fn test_unknown_fields_are_rejected() {
        let result: Result<RouteBehavior, _> = serde_yaml::from_str("cookie_whitelists: [a]");
        assert!(result.is_err());

        let result: Result<RouteBehavior, _> =
            serde_yaml::from_str("event_associations:\n  viewer-requests: auth");
        assert!(result.is_err());
    }

    #[test]
    fn test_associations_iterate_in_event_order() {
        let yaml = r#"
event_associations:
  origin-response: d
  origin-request: c
  viewer-response: b
  viewer-request: a
"#;
        let behavior: RouteBehavior = serde_yaml::from_str(yaml).unwrap();
        let events: Vec<LifecycleEvent> =
            behavior.referenced_functions().map(|(e, _)| e).collect();
        assert_eq!(events, LifecycleEvent::ALL.to_vec());
    }

    #[test]
    fn test_referenced_functions_are_distinct() {
        let table = RouteTable::new()
            .with(
                RouteKey::Default,
                RouteBehavior::associations([(LifecycleEvent::ViewerRequest, "auth")]),
            )
            .with(
                RouteKey::Pattern("/api/*"),
                RouteBehavior::associations([
                    (LifecycleEvent::ViewerRequest, "auth"),
                    (LifecycleEvent::OriginResponse, "headers"),
                ]),
            )
            .with(RouteKey::Pattern("/old/*"), RouteBehavior::Disabled);

        assert_eq!(
            table.referenced_functions(),
            BTreeSet::from(["auth", "headers"])
        );
    }

    #[test]
    fn test_iter_yields_default_first() {
        let table = RouteTable::new()
            .with(RouteKey::Pattern("/b/*"), RouteBehavior::Disabled)
            .with(RouteKey::Default, RouteBehavior::Disabled)
            .with(RouteKey::Pattern("/a/*"), RouteBehavior::Disabled);

        let keys: Vec<String> = table.iter().map(|(k, _)| k.to_string()).collect();
        assert_eq!(keys, vec!["default", "/b/*", "/a/*"]);
    }
}
