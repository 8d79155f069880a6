//! Version source backed by the AWS Lambda `ListVersionsByFunction` API.

use crate::resolver::MAX_PAGE_SIZE;
use crate::source::{SourceError, VersionPage, VersionSource};
use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_lambda::Client;
use aws_sdk_lambda::error::DisplayErrorContext;
use aws_sdk_lambda::types::FunctionConfiguration;

/// The unpublished working copy Lambda lists alongside numbered versions.
/// CloudFront only accepts numbered versions, so it is never a candidate.
const UNPUBLISHED_VERSION: &str = "$LATEST";

pub struct LambdaVersionSource {
    client: Client,
}

impl LambdaVersionSource {
    pub fn new(sdk_config: &SdkConfig) -> Self {
        LambdaVersionSource {
            client: Client::new(sdk_config),
        }
    }
}

/// Qualified ARNs of the published versions in a listing, in listing order.
fn published_versions(versions: &[FunctionConfiguration]) -> Vec<String> {
    versions
        .iter()
        .filter(|v| v.version() != Some(UNPUBLISHED_VERSION))
        .filter_map(|v| v.function_arn().map(String::from))
        .collect()
}

#[async_trait]
impl VersionSource for LambdaVersionSource {
    async fn list_versions(
        &self,
        function_name: &str,
        cursor: Option<&str>,
    ) -> Result<VersionPage, SourceError> {
        let output = self
            .client
            .list_versions_by_function()
            .function_name(function_name)
            .max_items(MAX_PAGE_SIZE as i32)
            .set_marker(cursor.map(String::from))
            .send()
            .await
            .map_err(|err| match err.as_service_error() {
                Some(service_err) if service_err.is_resource_not_found_exception() => {
                    SourceError::FunctionNotFound(function_name.to_string())
                }
                _ => SourceError::Request(DisplayErrorContext(&err).to_string()),
            })?;

        Ok(VersionPage {
            versions: published_versions(output.versions()),
            next_cursor: output.next_marker().map(String::from),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn version(number: &str) -> FunctionConfiguration {
        FunctionConfiguration::builder()
            .function_name("svc-prod-auth")
            .version(number)
            .function_arn(format!(
                "arn:aws:lambda:us-east-1:123456789012:function:svc-prod-auth:{number}"
            ))
            .build()
    }

    #[test]
    fn test_unpublished_version_is_skipped() {
        let listing = vec![version("$LATEST"), version("1"), version("2")];

        assert_eq!(
            published_versions(&listing),
            vec![
                "arn:aws:lambda:us-east-1:123456789012:function:svc-prod-auth:1",
                "arn:aws:lambda:us-east-1:123456789012:function:svc-prod-auth:2",
            ]
        );
    }

    #[test]
    fn test_only_unpublished_version() {
        assert!(published_versions(&[version("$LATEST")]).is_empty());
    }
}
