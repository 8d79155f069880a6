//! CloudFront-backed distribution store.
//!
//! The configuration returned by `GetDistributionConfig` is kept as-is and a
//! provider-neutral view of it is handed to the merge. When writing back, only
//! the behaviors whose view changed are patched into the original document,
//! so every other field goes back to CloudFront exactly as it was read.

use crate::behavior::{
    CacheBehavior, CookiePolicy, Distribution, ForwardMode, FunctionAssociation,
};
use crate::model::{BehaviorSettings, DistributionConfig, RoutedBehavior};
use crate::route_table::{LifecycleEvent, RouteKey};
use crate::store::{DistributionStore, Fetched, StoreError};
use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_cloudfront::Client;
use aws_sdk_cloudfront::error::DisplayErrorContext;
use aws_sdk_cloudfront::types::{
    CookieNames, CookiePreference, DistributionConfig as SdkDistributionConfig, EventType,
    ForwardedValues, ItemSelection, LambdaFunctionAssociation, LambdaFunctionAssociations,
};
use std::fmt::Display;

fn lifecycle_event(event_type: &EventType) -> Option<LifecycleEvent> {
    match event_type {
        EventType::ViewerRequest => Some(LifecycleEvent::ViewerRequest),
        EventType::ViewerResponse => Some(LifecycleEvent::ViewerResponse),
        EventType::OriginRequest => Some(LifecycleEvent::OriginRequest),
        EventType::OriginResponse => Some(LifecycleEvent::OriginResponse),
        _ => None,
    }
}

fn event_type(event: LifecycleEvent) -> EventType {
    match event {
        LifecycleEvent::ViewerRequest => EventType::ViewerRequest,
        LifecycleEvent::ViewerResponse => EventType::ViewerResponse,
        LifecycleEvent::OriginRequest => EventType::OriginRequest,
        LifecycleEvent::OriginResponse => EventType::OriginResponse,
    }
}

fn forward_mode(selection: &ItemSelection) -> Option<ForwardMode> {
    match selection {
        ItemSelection::None => Some(ForwardMode::None),
        ItemSelection::Whitelist => Some(ForwardMode::Whitelist),
        ItemSelection::All => Some(ForwardMode::All),
        _ => None,
    }
}

fn item_selection(mode: ForwardMode) -> ItemSelection {
    match mode {
        ForwardMode::None => ItemSelection::None,
        ForwardMode::Whitelist => ItemSelection::Whitelist,
        ForwardMode::All => ItemSelection::All,
    }
}

fn invalid_config(err: impl Display) -> StoreError {
    StoreError::Backend(format!("invalid distribution config: {err}"))
}

fn has_unsupported_events(lambdas: Option<&LambdaFunctionAssociations>) -> bool {
    lambdas
        .and_then(|l| l.items.as_ref())
        .into_iter()
        .flatten()
        .any(|association| lifecycle_event(&association.event_type).is_none())
}

// Cookie settings live in the legacy `ForwardedValues`, which the SDK marks
// deprecated in favor of cache policies.
#[allow(deprecated)]
fn read_settings(
    target_origin_id: &str,
    lambdas: Option<&LambdaFunctionAssociations>,
    forwarded: Option<&ForwardedValues>,
) -> BehaviorSettings {
    let function_associations = lambdas
        .and_then(|l| l.items.as_ref())
        .into_iter()
        .flatten()
        .filter_map(|association| {
            let Some(event) = lifecycle_event(&association.event_type) else {
                tracing::warn!(
                    target_origin_id,
                    event_type = %association.event_type.as_str(),
                    "Ignoring association with unsupported event type"
                );
                return None;
            };
            Some(FunctionAssociation::new(
                event,
                association.lambda_function_arn.clone(),
            ))
        })
        .collect();

    let cookies = forwarded
        .and_then(|f| f.cookies.as_ref())
        .and_then(|preference| {
            Some(CookiePolicy {
                forward: forward_mode(&preference.forward)?,
                whitelisted_names: preference
                    .whitelisted_names
                    .as_ref()
                    .map(|names| names.items.clone().unwrap_or_default()),
            })
        });

    BehaviorSettings {
        target_origin_id: target_origin_id.to_string(),
        cookies,
        function_associations,
    }
}

fn lambda_associations(
    associations: &[FunctionAssociation],
) -> Result<LambdaFunctionAssociations, StoreError> {
    let items = associations
        .iter()
        .map(|association| {
            LambdaFunctionAssociation::builder()
                .lambda_function_arn(&association.function_identity)
                .event_type(event_type(association.event))
                .build()
        })
        .collect::<Result<Vec<_>, _>>()
        .map_err(invalid_config)?;

    LambdaFunctionAssociations::builder()
        .quantity(items.len() as i32)
        .set_items((!items.is_empty()).then_some(items))
        .build()
        .map_err(invalid_config)
}

fn cookie_preference(policy: &CookiePolicy) -> Result<CookiePreference, StoreError> {
    let whitelisted_names = policy
        .whitelisted_names
        .as_ref()
        .map(|names| {
            CookieNames::builder()
                .quantity(names.len() as i32)
                .set_items((!names.is_empty()).then(|| names.clone()))
                .build()
        })
        .transpose()
        .map_err(invalid_config)?;

    CookiePreference::builder()
        .forward(item_selection(policy.forward))
        .set_whitelisted_names(whitelisted_names)
        .build()
        .map_err(invalid_config)
}

/// Writes the changed parts of `after` into a CloudFront behavior.
#[allow(deprecated)]
fn patch_behavior(
    key: RouteKey<'_>,
    state: &BehaviorState,
    before: &BehaviorSettings,
    after: &BehaviorSettings,
    lambdas: &mut Option<LambdaFunctionAssociations>,
    forwarded: &mut Option<ForwardedValues>,
) -> Result<(), StoreError> {
    if state.must_rewrite_associations()
        || before.function_associations != after.function_associations
    {
        *lambdas = Some(lambda_associations(&after.function_associations)?);
    }

    if before.cookies != after.cookies
        && let Some(policy) = &after.cookies
    {
        match forwarded.as_mut() {
            Some(forwarded) => forwarded.cookies = Some(cookie_preference(policy)?),
            // Behaviors using a cache policy have no legacy cookie settings,
            // so there is nothing to clear.
            None if policy.forward == ForwardMode::None => {
                tracing::debug!(route = %key, "No legacy cookie settings to clear");
            }
            None => {
                return Err(StoreError::Backend(format!(
                    "behavior {key} uses a cache policy; a cookie whitelist requires legacy cache settings"
                )));
            }
        }
    }

    Ok(())
}

/// What the view of one behavior cannot show on its own.
#[derive(Clone, Debug, Default)]
struct BehaviorState {
    /// The SDK list holds associations the view leaves out.
    unsupported_associations: bool,
    /// The merge replaced the association list.
    associations_replaced: bool,
}

impl BehaviorState {
    fn new(lambdas: Option<&LambdaFunctionAssociations>) -> Self {
        BehaviorState {
            unsupported_associations: has_unsupported_events(lambdas),
            associations_replaced: false,
        }
    }

    /// A replaced list has to be written even when the view looks unchanged,
    /// or the associations left out of the view would survive.
    fn must_rewrite_associations(&self) -> bool {
        self.associations_replaced && self.unsupported_associations
    }
}

/// A view behavior that records when its associations are replaced.
struct TrackedBehavior<'a> {
    settings: &'a mut BehaviorSettings,
    state: &'a mut BehaviorState,
}

impl CacheBehavior for TrackedBehavior<'_> {
    fn function_associations(&self) -> &[FunctionAssociation] {
        self.settings.function_associations()
    }

    fn cookie_policy(&self) -> Option<&CookiePolicy> {
        self.settings.cookie_policy()
    }

    fn set_function_associations(&mut self, associations: Vec<FunctionAssociation>) {
        self.state.associations_replaced = true;
        self.settings.set_function_associations(associations);
    }

    fn set_cookie_policy(&mut self, policy: CookiePolicy) {
        self.settings.set_cookie_policy(policy);
    }
}

/// A CloudFront distribution config with the view the merge operates on.
#[derive(Clone, Debug)]
pub struct CloudFrontConfig {
    view: DistributionConfig,
    original: DistributionConfig,
    /// The default behavior first, then every other behavior in order.
    states: Vec<BehaviorState>,
    raw: SdkDistributionConfig,
}

impl CloudFrontConfig {
    #[allow(deprecated)]
    pub fn from_sdk(raw: SdkDistributionConfig) -> Result<Self, StoreError> {
        let default = raw.default_cache_behavior.as_ref().ok_or_else(|| {
            invalid_config("distribution config has no default cache behavior")
        })?;

        let default_behavior = read_settings(
            &default.target_origin_id,
            default.lambda_function_associations.as_ref(),
            default.forwarded_values.as_ref(),
        );

        let sdk_behaviors = raw
            .cache_behaviors
            .as_ref()
            .and_then(|b| b.items.as_ref())
            .map(Vec::as_slice)
            .unwrap_or_default();

        let states = std::iter::once(default.lambda_function_associations.as_ref())
            .chain(
                sdk_behaviors
                    .iter()
                    .map(|behavior| behavior.lambda_function_associations.as_ref()),
            )
            .map(BehaviorState::new)
            .collect();

        let behaviors = sdk_behaviors
            .iter()
            .map(|behavior| {
                RoutedBehavior::new(
                    behavior.path_pattern.clone(),
                    read_settings(
                        &behavior.target_origin_id,
                        behavior.lambda_function_associations.as_ref(),
                        behavior.forwarded_values.as_ref(),
                    ),
                )
            })
            .collect();

        let view = DistributionConfig {
            default_behavior,
            behaviors,
        };

        Ok(CloudFrontConfig {
            original: view.clone(),
            view,
            states,
            raw,
        })
    }

    pub fn view(&self) -> &DistributionConfig {
        &self.view
    }

    /// The original document with every changed behavior patched in.
    #[allow(deprecated)]
    pub fn into_sdk(self) -> Result<SdkDistributionConfig, StoreError> {
        let CloudFrontConfig {
            view,
            original,
            states,
            mut raw,
        } = self;

        let Some((default_state, behavior_states)) = states.split_first() else {
            return Err(invalid_config("behavior state is missing"));
        };

        if default_state.must_rewrite_associations()
            || view.default_behavior != original.default_behavior
        {
            let target = raw.default_cache_behavior.as_mut().ok_or_else(|| {
                invalid_config("distribution config has no default cache behavior")
            })?;
            patch_behavior(
                RouteKey::Default,
                default_state,
                &original.default_behavior,
                &view.default_behavior,
                &mut target.lambda_function_associations,
                &mut target.forwarded_values,
            )?;
        }

        let targets = raw
            .cache_behaviors
            .as_mut()
            .and_then(|b| b.items.as_mut())
            .map(|items| items.as_mut_slice())
            .unwrap_or_default();

        if targets.len() != view.behaviors.len()
            || behavior_states.len() != view.behaviors.len()
        {
            return Err(invalid_config(format!(
                "expected {} cache behaviors, found {}",
                view.behaviors.len(),
                targets.len()
            )));
        }

        for (((target, state), before), after) in targets
            .iter_mut()
            .zip(behavior_states)
            .zip(&original.behaviors)
            .zip(&view.behaviors)
        {
            if state.must_rewrite_associations() || before != after {
                patch_behavior(
                    RouteKey::Pattern(&after.path_pattern),
                    state,
                    &before.settings,
                    &after.settings,
                    &mut target.lambda_function_associations,
                    &mut target.forwarded_values,
                )?;
            }
        }

        Ok(raw)
    }
}

impl Distribution for CloudFrontConfig {
    fn for_each_behavior(
        &mut self,
        visit: &mut dyn FnMut(RouteKey<'_>, &mut dyn CacheBehavior),
    ) {
        let Some((default_state, behavior_states)) = self.states.split_first_mut() else {
            return;
        };

        visit(
            RouteKey::Default,
            &mut TrackedBehavior {
                settings: &mut self.view.default_behavior,
                state: default_state,
            },
        );

        for (behavior, state) in self.view.behaviors.iter_mut().zip(behavior_states) {
            visit(
                RouteKey::Pattern(&behavior.path_pattern),
                &mut TrackedBehavior {
                    settings: &mut behavior.settings,
                    state,
                },
            );
        }
    }
}

pub struct CloudFrontStore {
    client: Client,
}

impl CloudFrontStore {
    pub fn new(sdk_config: &SdkConfig) -> Self {
        CloudFrontStore {
            client: Client::new(sdk_config),
        }
    }
}

#[async_trait]
impl DistributionStore for CloudFrontStore {
    type Config = CloudFrontConfig;

    async fn fetch(&self, distribution_id: &str) -> Result<Fetched<CloudFrontConfig>, StoreError> {
        let output = self
            .client
            .get_distribution_config()
            .id(distribution_id)
            .send()
            .await
            .map_err(|err| match err.as_service_error() {
                Some(service_err) if service_err.is_no_such_distribution() => {
                    StoreError::NotFound(distribution_id.to_string())
                }
                _ => StoreError::Backend(DisplayErrorContext(&err).to_string()),
            })?;

        let etag = output.e_tag().map(String::from).ok_or_else(|| {
            StoreError::Backend(format!("no ETag returned for distribution {distribution_id}"))
        })?;

        let raw = output.distribution_config().cloned().ok_or_else(|| {
            StoreError::Backend(format!(
                "no config returned for distribution {distribution_id}"
            ))
        })?;

        tracing::info!(distribution_id, %etag, "Fetched distribution config");

        Ok(Fetched {
            config: CloudFrontConfig::from_sdk(raw)?,
            etag,
        })
    }

    async fn compare_and_swap(
        &self,
        distribution_id: &str,
        etag: &str,
        config: CloudFrontConfig,
    ) -> Result<(), StoreError> {
        let distribution_config = config.into_sdk()?;

        self.client
            .update_distribution()
            .id(distribution_id)
            .if_match(etag)
            .distribution_config(distribution_config)
            .send()
            .await
            .map_err(|err| match err.as_service_error() {
                Some(service_err) if service_err.is_precondition_failed() => {
                    StoreError::conflict(distribution_id, DisplayErrorContext(&err).to_string())
                }
                Some(service_err) if service_err.is_no_such_distribution() => {
                    StoreError::NotFound(distribution_id.to_string())
                }
                _ => StoreError::Backend(DisplayErrorContext(&err).to_string()),
            })?;

        tracing::info!(distribution_id, etag, "Updated distribution config");
        Ok(())
    }
}
