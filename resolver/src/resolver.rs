use crate::metrics_defs::{FUNCTIONS_RESOLVED, VERSION_PAGES_FETCHED};
use crate::source::{SourceError, VersionSource};
use crate::types::{FunctionReference, ResolvedFunctions};
use shared::counter;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tokio::task::JoinSet;

/// Maximum number of versions the function service returns per page.
pub const MAX_PAGE_SIZE: usize = 50;

/// Upper bound on pages fetched for a single function. A well-behaved service
/// never gets near this; it only stops an endless cursor chain.
pub const MAX_PAGES: usize = 1000;

#[derive(thiserror::Error, Debug)]
pub enum ResolveError {
    #[error("function {function} ({function_name}) has no published versions")]
    NoPublishedVersions {
        function: String,
        function_name: String,
    },
    #[error("version listing for {function_name} returned cursor {cursor} more than once")]
    RepeatedCursor {
        function_name: String,
        cursor: String,
    },
    #[error("version listing for {function_name} did not finish after {pages} pages")]
    TooManyPages { function_name: String, pages: usize },
    #[error("could not list versions of {function_name}: {source}")]
    Source {
        function_name: String,
        #[source]
        source: SourceError,
    },
    #[error("resolution task failed: {0}")]
    TaskFailed(#[from] tokio::task::JoinError),
}

/// Walks the version listing of `function_name` page by page and returns the
/// newest version, or None if the function has no published versions.
///
/// Pages are ordered oldest to newest, so the newest version is the last
/// element of the final page. Empty pages carry nothing forward, so the last
/// version seen on any page is kept.
pub async fn latest_version<S>(
    source: &S,
    function_name: &str,
) -> Result<Option<String>, ResolveError>
where
    S: VersionSource + ?Sized,
{
    let mut cursor: Option<String> = None;
    let mut seen_cursors = HashSet::new();
    let mut latest = None;

    for page_number in 1..=MAX_PAGES {
        let page = source
            .list_versions(function_name, cursor.as_deref())
            .await
            .map_err(|source| ResolveError::Source {
                function_name: function_name.to_string(),
                source,
            })?;

        counter!(VERSION_PAGES_FETCHED).increment(1);
        tracing::debug!(
            function_name,
            page = page_number,
            versions = page.versions.len(),
            has_more = page.next_cursor.is_some(),
            "Fetched version page"
        );

        if page.versions.len() > MAX_PAGE_SIZE {
            tracing::warn!(
                function_name,
                versions = page.versions.len(),
                "Version page is larger than the documented maximum"
            );
        }

        if let Some(last) = page.versions.into_iter().next_back() {
            latest = Some(last);
        }

        match page.next_cursor.filter(|c| !c.is_empty()) {
            None => return Ok(latest),
            Some(next) => {
                if !seen_cursors.insert(next.clone()) {
                    return Err(ResolveError::RepeatedCursor {
                        function_name: function_name.to_string(),
                        cursor: next,
                    });
                }
                cursor = Some(next);
            }
        }
    }

    Err(ResolveError::TooManyPages {
        function_name: function_name.to_string(),
        pages: MAX_PAGES,
    })
}

/// Resolves functions to their latest published versions.
///
/// Distinct functions are resolved concurrently. Results are not cached
/// between calls to `resolve`.
pub struct FunctionResolver<S> {
    source: Arc<S>,
}

impl<S> FunctionResolver<S>
where
    S: VersionSource + 'static,
{
    pub fn new(source: S) -> Self {
        FunctionResolver {
            source: Arc::new(source),
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// `functions` maps each user-facing name to the name the function is
    /// deployed under. Fails if any function cannot be resolved; no partial
    /// result is returned.
    pub async fn resolve(
        &self,
        functions: &BTreeMap<String, String>,
    ) -> Result<ResolvedFunctions, ResolveError> {
        let mut join_set = JoinSet::new();

        for (name, function_name) in functions {
            let source = self.source.clone();
            let name = name.clone();
            let function_name = function_name.clone();

            join_set.spawn(async move {
                let latest = latest_version(source.as_ref(), &function_name).await;
                (name, function_name, latest)
            });
        }

        let mut resolved = ResolvedFunctions::new();

        // Returning early drops the join set, which aborts the remaining tasks.
        while let Some(joined) = join_set.join_next().await {
            let (name, function_name, latest) = joined?;
            let identity = latest?.ok_or_else(|| ResolveError::NoPublishedVersions {
                function: name.clone(),
                function_name: function_name.clone(),
            })?;

            tracing::info!(function = %name, %function_name, %identity, "Resolved function");
            counter!(FUNCTIONS_RESOLVED).increment(1);
            resolved.insert(FunctionReference::new(name, identity));
        }

        Ok(resolved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::VersionPage;
    use crate::testutils::{PagedVersionSource, version_arn};

    fn functions(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(name, function_name)| (name.to_string(), function_name.to_string()))
            .collect()
    }

    #[tokio::test]
    async fn test_latest_version_single_page() {
        let source = PagedVersionSource::new().with_versions("svc-prod-auth", 3, MAX_PAGE_SIZE);

        let latest = latest_version(&source, "svc-prod-auth").await.unwrap();

        assert_eq!(latest, Some(version_arn("svc-prod-auth", 3)));
        assert_eq!(source.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_latest_version_is_last_of_final_page() {
        // 50 + 50 + 7 versions across three chained pages
        let source = PagedVersionSource::new().with_versions("svc-prod-auth", 107, MAX_PAGE_SIZE);

        let latest = latest_version(&source, "svc-prod-auth").await.unwrap();

        assert_eq!(latest, Some(version_arn("svc-prod-auth", 107)));
        assert_ne!(latest, Some(version_arn("svc-prod-auth", 50)));
        assert_ne!(latest, Some(version_arn("svc-prod-auth", 100)));

        let cursors: Vec<Option<String>> =
            source.requests().into_iter().map(|(_, c)| c).collect();
        assert_eq!(
            cursors,
            vec![
                None,
                Some("svc-prod-auth/page-1".to_string()),
                Some("svc-prod-auth/page-2".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_empty_final_page_keeps_previous_latest() {
        let source = PagedVersionSource::new().with_pages(
            "fn",
            vec![
                VersionPage {
                    versions: vec!["fn:1".into(), "fn:2".into()],
                    next_cursor: Some("c1".into()),
                },
                VersionPage {
                    versions: vec![],
                    next_cursor: None,
                },
            ],
        );

        let latest = latest_version(&source, "fn").await.unwrap();
        assert_eq!(latest.as_deref(), Some("fn:2"));
    }

    #[tokio::test]
    async fn test_empty_cursor_terminates() {
        let source = PagedVersionSource::new().with_pages(
            "fn",
            vec![VersionPage {
                versions: vec!["fn:1".into()],
                next_cursor: Some(String::new()),
            }],
        );

        let latest = latest_version(&source, "fn").await.unwrap();
        assert_eq!(latest.as_deref(), Some("fn:1"));
        assert_eq!(source.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_repeated_cursor_is_rejected() {
        let source = PagedVersionSource::new().with_pages(
            "fn",
            vec![
                VersionPage {
                    versions: vec!["fn:1".into()],
                    next_cursor: Some("again".into()),
                },
                VersionPage {
                    versions: vec!["fn:2".into()],
                    next_cursor: Some("again".into()),
                },
            ],
        );

        let result = latest_version(&source, "fn").await;
        assert!(matches!(
            result,
            Err(ResolveError::RepeatedCursor { ref cursor, .. }) if cursor == "again"
        ));
        // The repeated cursor is never requested a second time.
        assert_eq!(source.requests().len(), 2);
    }

    #[tokio::test]
    async fn test_endless_cursor_chain_is_capped() {
        // Every page points at a new cursor, so the listing never ends on its own
        let pages = (0..=MAX_PAGES)
            .map(|i| VersionPage {
                versions: vec![format!("fn:{i}")],
                next_cursor: Some(format!("cursor-{i}")),
            })
            .collect();
        let source = PagedVersionSource::new().with_pages("fn", pages);

        let result = latest_version(&source, "fn").await;

        assert!(matches!(
            result,
            Err(ResolveError::TooManyPages { ref function_name, pages })
                if function_name == "fn" && pages == MAX_PAGES
        ));
        assert_eq!(source.requests().len(), MAX_PAGES);
    }

    #[tokio::test]
    async fn test_no_versions() {
        let source = PagedVersionSource::new().with_versions("fn", 0, MAX_PAGE_SIZE);
        assert_eq!(latest_version(&source, "fn").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_resolve_multiple_functions() {
        let source = PagedVersionSource::new()
            .with_versions("svc-prod-auth", 120, MAX_PAGE_SIZE)
            .with_versions("svc-prod-headers", 2, MAX_PAGE_SIZE);
        let resolver = FunctionResolver::new(source);

        let resolved = resolver
            .resolve(&functions(&[
                ("auth", "svc-prod-auth"),
                ("headers", "svc-prod-headers"),
            ]))
            .await
            .unwrap();

        assert_eq!(resolved.len(), 2);
        assert_eq!(
            resolved.identity("auth"),
            Some(version_arn("svc-prod-auth", 120).as_str())
        );
        assert_eq!(
            resolved.get("headers"),
            Some(&FunctionReference::new(
                "headers",
                version_arn("svc-prod-headers", 2)
            ))
        );
    }

    #[tokio::test]
    async fn test_resolve_fails_without_published_versions() {
        let source = PagedVersionSource::new()
            .with_versions("svc-prod-auth", 4, MAX_PAGE_SIZE)
            .with_versions("svc-prod-empty", 0, MAX_PAGE_SIZE);
        let resolver = FunctionResolver::new(source);

        let result = resolver
            .resolve(&functions(&[
                ("auth", "svc-prod-auth"),
                ("empty", "svc-prod-empty"),
            ]))
            .await;

        match result {
            Err(ResolveError::NoPublishedVersions {
                function,
                function_name,
            }) => {
                assert_eq!(function, "empty");
                assert_eq!(function_name, "svc-prod-empty");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_resolve_propagates_source_errors() {
        let resolver = FunctionResolver::new(PagedVersionSource::new());

        let result = resolver
            .resolve(&functions(&[("missing", "svc-prod-missing")]))
            .await;

        assert!(matches!(
            result,
            Err(ResolveError::Source {
                source: SourceError::FunctionNotFound(_),
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_resolve_nothing() {
        let resolver = FunctionResolver::new(PagedVersionSource::new());
        let resolved = resolver.resolve(&BTreeMap::new()).await.unwrap();
        assert!(resolved.is_empty());
        assert!(resolver.source().requests().is_empty());
    }
}
