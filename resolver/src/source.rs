use async_trait::async_trait;

/// One page of a function's version listing, ordered oldest to newest.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct VersionPage {
    pub versions: Vec<String>,
    // None means this is the final page.
    pub next_cursor: Option<String>,
}

#[derive(thiserror::Error, Debug)]
pub enum SourceError {
    #[error("function not found: {0}")]
    FunctionNotFound(String),
    #[error("version listing failed: {0}")]
    Request(String),
}

/// Lists the published versions of a function. Implementations make a single
/// request per call; following the cursor is left to the caller.
#[async_trait]
pub trait VersionSource: Send + Sync {
    async fn list_versions(
        &self,
        function_name: &str,
        cursor: Option<&str>,
    ) -> Result<VersionPage, SourceError>;
}
