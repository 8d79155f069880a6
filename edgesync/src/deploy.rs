//! A single deployment run.
//!
//! validate -> resolve -> fetch -> merge -> compare-and-swap
//!
//! Every step that contacts an external service happens after validation, and
//! the distribution is written at most once. A write rejected because the
//! distribution changed after it was fetched fails the run; it is not retried.

use crate::config::{DeploymentConfig, ValidationError};
use crate::metrics_defs::{DEPLOY_DURATION, DEPLOYS_COMPLETED, DEPLOYS_FAILED};
use distribution::{DistributionStore, StoreError, merge};
use resolver::{FunctionResolver, ResolveError, ResolvedFunctions, VersionSource};
use shared::{counter, histogram};
use std::time::Instant;

#[derive(thiserror::Error, Debug)]
pub enum DeployError {
    #[error("invalid deployment: {0}")]
    Config(#[from] ValidationError),
    #[error("function resolution failed: {0}")]
    Resolve(#[from] ResolveError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug)]
pub struct DeployReport {
    pub distribution_id: String,
    pub functions: ResolvedFunctions,
    /// False on a dry run.
    pub updated: bool,
}

pub struct Deployer<S, D> {
    resolver: FunctionResolver<S>,
    store: D,
}

impl<S, D> Deployer<S, D>
where
    S: VersionSource + 'static,
    D: DistributionStore,
{
    pub fn new(resolver: FunctionResolver<S>, store: D) -> Self {
        Deployer { resolver, store }
    }

    pub async fn run(
        &self,
        deployment: &DeploymentConfig,
        dry_run: bool,
    ) -> Result<DeployReport, DeployError> {
        let start = Instant::now();
        let result = self.deploy(deployment, dry_run).await;
        histogram!(DEPLOY_DURATION).record(start.elapsed().as_secs_f64());

        match &result {
            Ok(_) => counter!(DEPLOYS_COMPLETED).increment(1),
            Err(_) => counter!(DEPLOYS_FAILED).increment(1),
        }

        result
    }

    async fn deploy(
        &self,
        deployment: &DeploymentConfig,
        dry_run: bool,
    ) -> Result<DeployReport, DeployError> {
        deployment.validate()?;
        let table = deployment.route_table()?;
        let distribution_id = deployment.distribution_id.as_str();

        let functions = self
            .resolver
            .resolve(&deployment.referenced_functions())
            .await?;

        let fetched = self.store.fetch(distribution_id).await?;
        let merged = merge(fetched.config, &functions, table);

        if dry_run {
            tracing::info!(distribution_id, etag = %fetched.etag, "Dry run, not updating distribution");
        } else {
            self.store
                .compare_and_swap(distribution_id, &fetched.etag, merged)
                .await?;
        }

        Ok(DeployReport {
            distribution_id: distribution_id.to_string(),
            functions,
            updated: !dry_run,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use distribution::{
        BehaviorSettings, CookiePolicy, DistributionConfig, Fetched, FunctionAssociation,
        InMemoryStore, LifecycleEvent, RouteKey, RoutedBehavior,
    };
    use resolver::testutils::{PagedVersionSource, version_arn};

    const DISTRIBUTION_ID: &str = "E2EXAMPLE";

    fn deployment(yaml: &str) -> DeploymentConfig {
        serde_yaml::from_str(yaml).expect("parse deployment")
    }

    fn standard_deployment() -> DeploymentConfig {
        deployment(
            r#"
            distribution_id: E2EXAMPLE
            functions:
                auth: svc-prod-auth
                headers: svc-prod-headers
                unused: svc-prod-unused
            routes:
                /pages_contents/*:
                    cookie_whitelist: [oatmeal_cookie, chocolate-cookie]
                    event_associations:
                        viewer-request: auth
                        origin-response: headers
                "*special-route/*":
                    disable: true
            "#,
        )
    }

    fn distribution() -> DistributionConfig {
        DistributionConfig::new(BehaviorSettings::new("s3-site"))
            .with_behavior(RoutedBehavior::new(
                "/pages_contents/*",
                BehaviorSettings::new("pages"),
            ))
            .with_behavior(RoutedBehavior::new(
                "*special-route/*",
                BehaviorSettings::new("special")
                    .with_cookies(CookiePolicy::whitelist(vec!["a".into(), "b".into()]))
                    .with_associations(vec![FunctionAssociation::new(
                        LifecycleEvent::ViewerRequest,
                        "arn:old",
                    )]),
            ))
    }

    fn source() -> PagedVersionSource {
        PagedVersionSource::new()
            .with_versions("svc-prod-auth", 107, 50)
            .with_versions("svc-prod-headers", 3, 50)
            .with_versions("svc-prod-unused", 1, 50)
    }

    fn deployer() -> Deployer<PagedVersionSource, InMemoryStore<DistributionConfig>> {
        let store = InMemoryStore::new();
        store.put(DISTRIBUTION_ID, distribution());
        Deployer::new(FunctionResolver::new(source()), store)
    }

    #[tokio::test]
    async fn test_deploy_updates_distribution() {
        let deployer = deployer();
        let etag = deployer.store.etag(DISTRIBUTION_ID);

        let report = deployer
            .run(&standard_deployment(), false)
            .await
            .unwrap();

        assert!(report.updated);
        assert_eq!(report.distribution_id, DISTRIBUTION_ID);
        assert_eq!(report.functions.len(), 2);
        assert_ne!(deployer.store.etag(DISTRIBUTION_ID), etag);

        let stored = deployer.store.get(DISTRIBUTION_ID).unwrap();
        let pages = stored.behavior(RouteKey::Pattern("/pages_contents/*")).unwrap();
        assert_eq!(
            pages.function_associations,
            vec![
                FunctionAssociation::new(
                    LifecycleEvent::ViewerRequest,
                    version_arn("svc-prod-auth", 107)
                ),
                FunctionAssociation::new(
                    LifecycleEvent::OriginResponse,
                    version_arn("svc-prod-headers", 3)
                ),
            ]
        );
        assert_eq!(
            pages.cookies,
            Some(CookiePolicy::whitelist(vec![
                "oatmeal_cookie".into(),
                "chocolate-cookie".into()
            ]))
        );

        let special = stored.behavior(RouteKey::Pattern("*special-route/*")).unwrap();
        assert!(special.function_associations.is_empty());
        assert_eq!(special.cookies, Some(CookiePolicy::none()));

        // Not addressed by the route table
        assert_eq!(stored.default_behavior, distribution().default_behavior);
    }

    #[tokio::test]
    async fn test_only_referenced_functions_are_resolved() {
        let deployer = deployer();
        deployer.run(&standard_deployment(), true).await.unwrap();

        let requested: Vec<String> = deployer
            .resolver
            .source()
            .requests()
            .into_iter()
            .map(|(function_name, _)| function_name)
            .collect();

        assert!(requested.contains(&"svc-prod-auth".to_string()));
        assert!(requested.contains(&"svc-prod-headers".to_string()));
        assert!(!requested.contains(&"svc-prod-unused".to_string()));
    }

    #[tokio::test]
    async fn test_dry_run_leaves_distribution_unchanged() {
        let deployer = deployer();
        let etag = deployer.store.etag(DISTRIBUTION_ID);

        let report = deployer.run(&standard_deployment(), true).await.unwrap();

        assert!(!report.updated);
        assert_eq!(report.functions.len(), 2);
        assert_eq!(deployer.store.etag(DISTRIBUTION_ID), etag);
        assert_eq!(deployer.store.get(DISTRIBUTION_ID), Some(distribution()));
    }

    #[tokio::test]
    async fn test_invalid_deployment_fails_before_any_request() {
        let deployer = deployer();
        let config = deployment(
            r#"
            distribution_id: E2EXAMPLE
            functions:
                auth: svc-prod-auth
            routes:
                /pages_contents/*:
                    event_associations:
                        viewer-request: auth
                        origin-request: undeclared
            "#,
        );

        let result = deployer.run(&config, false).await;

        assert!(matches!(
            result,
            Err(DeployError::Config(ValidationError::UnknownFunction { .. }))
        ));
        assert!(deployer.resolver.source().requests().is_empty());
        assert_eq!(deployer.store.get(DISTRIBUTION_ID), Some(distribution()));
    }

    #[tokio::test]
    async fn test_resolution_failure_leaves_distribution_unchanged() {
        let store = InMemoryStore::new();
        store.put(DISTRIBUTION_ID, distribution());
        let source = PagedVersionSource::new()
            .with_versions("svc-prod-auth", 0, 50)
            .with_versions("svc-prod-headers", 3, 50);
        let deployer = Deployer::new(FunctionResolver::new(source), store);

        let result = deployer.run(&standard_deployment(), false).await;

        assert!(matches!(
            result,
            Err(DeployError::Resolve(ResolveError::NoPublishedVersions { function, .. }))
                if function == "auth"
        ));
        assert_eq!(deployer.store.get(DISTRIBUTION_ID), Some(distribution()));
    }

    #[tokio::test]
    async fn test_missing_distribution() {
        let deployer = Deployer::new(FunctionResolver::new(source()), InMemoryStore::<DistributionConfig>::new());

        let result = deployer.run(&standard_deployment(), false).await;

        assert!(matches!(
            result,
            Err(DeployError::Store(StoreError::NotFound(id))) if id == DISTRIBUTION_ID
        ));
    }

    /// Lets another writer update the distribution right after every fetch.
    struct RacingStore {
        inner: InMemoryStore<DistributionConfig>,
        concurrent: DistributionConfig,
    }

    #[async_trait]
    impl DistributionStore for RacingStore {
        type Config = DistributionConfig;

        async fn fetch(
            &self,
            distribution_id: &str,
        ) -> Result<Fetched<DistributionConfig>, StoreError> {
            let fetched = self.inner.fetch(distribution_id).await?;
            self.inner.put(distribution_id, self.concurrent.clone());
            Ok(fetched)
        }

        async fn compare_and_swap(
            &self,
            distribution_id: &str,
            etag: &str,
            config: DistributionConfig,
        ) -> Result<(), StoreError> {
            self.inner
                .compare_and_swap(distribution_id, etag, config)
                .await
        }
    }

    #[tokio::test]
    async fn test_conflict_is_not_retried() {
        let concurrent = DistributionConfig::new(BehaviorSettings::new("someone-else"));
        let inner = InMemoryStore::new();
        inner.put(DISTRIBUTION_ID, distribution());
        let store = RacingStore {
            inner,
            concurrent: concurrent.clone(),
        };
        let deployer = Deployer::new(FunctionResolver::new(source()), store);

        let result = deployer.run(&standard_deployment(), false).await;

        assert!(matches!(
            result,
            Err(DeployError::Store(StoreError::Conflict { .. }))
        ));
        // The concurrent write survives and nothing else was written
        assert_eq!(deployer.store.inner.get(DISTRIBUTION_ID), Some(concurrent));
        assert_eq!(
            deployer.store.inner.etag(DISTRIBUTION_ID),
            Some("E2".to_string())
        );
    }
}
