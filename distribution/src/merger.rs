//! Applies a route table onto a distribution configuration.
//!
//! For every behavior whose route is present in the table:
//! - `Disabled`: associations cleared, cookie forwarding set to none with an
//!   empty whitelist
//! - `Update`: associations replaced in full when given, emitted in lifecycle
//!   event order; cookie policy replaced by a whitelist when given
//!
//! Behaviors without a table entry are left exactly as they were, and table
//! entries without a matching behavior are skipped. Both updates replace
//! rather than append, so merging the same table twice gives the same result.

use crate::behavior::{CacheBehavior, CookiePolicy, Distribution, FunctionAssociation};
use crate::metrics_defs::{BEHAVIORS_DISABLED, BEHAVIORS_UPDATED, ROUTES_UNMATCHED};
use crate::route_table::{EventAssociations, RouteBehavior, RouteKey, RouteTable};
use resolver::ResolvedFunctions;
use shared::counter;
use std::collections::HashSet;

/// Merges `table` into `config`.
///
/// # Panics
///
/// Panics if the table references a function missing from `functions`. Every
/// referenced function has to be resolved before merging.
pub fn merge<D>(mut config: D, functions: &ResolvedFunctions, table: &RouteTable) -> D
where
    D: Distribution,
{
    let mut matched: HashSet<String> = HashSet::new();

    config.for_each_behavior(&mut |key, behavior| {
        if let Some(route) = table.get(key) {
            apply_route(key, route, functions, behavior);
            matched.insert(key.to_string());
        }
    });

    for (key, _) in table.iter() {
        if !matched.contains(&key.to_string()) {
            counter!(ROUTES_UNMATCHED).increment(1);
            tracing::warn!(route = %key, "Route has no behavior in the distribution, skipping");
        }
    }

    config
}

/// Applies a single table entry to the behavior it addresses. Returns
/// whether any setting of the behavior was replaced.
pub fn apply_route(
    key: RouteKey<'_>,
    route: &RouteBehavior,
    functions: &ResolvedFunctions,
    behavior: &mut dyn CacheBehavior,
) -> bool {
    match route {
        RouteBehavior::Disabled => {
            behavior.set_function_associations(Vec::new());
            behavior.set_cookie_policy(CookiePolicy::none());

            counter!(BEHAVIORS_DISABLED).increment(1);
            tracing::info!(route = %key, "Cleared function associations and cookie forwarding");
            true
        }
        RouteBehavior::Update {
            associations,
            cookie_whitelist,
        } => {
            let mut updated = false;

            if let Some(associations) = associations {
                let resolved = resolve_associations(key, associations, functions);
                tracing::info!(
                    route = %key,
                    associations = resolved.len(),
                    "Replacing function associations"
                );
                behavior.set_function_associations(resolved);
                updated = true;
            }

            if let Some(names) = cookie_whitelist
                && !names.is_empty()
            {
                tracing::info!(route = %key, cookies = ?names, "Replacing cookie whitelist");
                behavior.set_cookie_policy(CookiePolicy::whitelist(names.clone()));
                updated = true;
            }

            if updated {
                counter!(BEHAVIORS_UPDATED).increment(1);
            }
            updated
        }
    }
}

fn resolve_associations(
    key: RouteKey<'_>,
    associations: &EventAssociations,
    functions: &ResolvedFunctions,
) -> Vec<FunctionAssociation> {
    // EventAssociations iterates in lifecycle event order.
    associations
        .iter()
        .map(|(event, name)| {
            let Some(identity) = functions.identity(name) else {
                panic!("function {name} used by route {key} ({event}) was not resolved");
            };
            FunctionAssociation::new(*event, identity)
        })
        .collect()
}
