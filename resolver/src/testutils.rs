use crate::source::{SourceError, VersionPage, VersionSource};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

/// Builds a qualified ARN for version `version` of `function_name`.
pub fn version_arn(function_name: &str, version: usize) -> String {
    format!("arn:aws:lambda:us-east-1:123456789012:function:{function_name}:{version}")
}

/// In-memory version source serving pre-built pages.
///
/// A request without a cursor returns the first page. A request with a cursor
/// returns the page following the first page whose `next_cursor` matches it.
#[derive(Default)]
pub struct PagedVersionSource {
    pages: HashMap<String, Vec<VersionPage>>,
    requests: Mutex<Vec<(String, Option<String>)>>,
}

impl PagedVersionSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `count` versions of a function split into pages of `page_size`.
    pub fn with_versions(self, function_name: &str, count: usize, page_size: usize) -> Self {
        let versions: Vec<String> = (1..=count).map(|v| version_arn(function_name, v)).collect();
        let chunks: Vec<&[String]> = versions.chunks(page_size.max(1)).collect();
        let last = chunks.len().saturating_sub(1);

        let pages = chunks
            .iter()
            .enumerate()
            .map(|(i, chunk)| VersionPage {
                versions: chunk.to_vec(),
                next_cursor: (i < last).then(|| format!("{function_name}/page-{}", i + 1)),
            })
            .collect::<Vec<_>>();

        // A function without versions still answers with a single empty page.
        let pages = if pages.is_empty() {
            vec![VersionPage::default()]
        } else {
            pages
        };

        self.with_pages(function_name, pages)
    }

    pub fn with_pages(mut self, function_name: &str, pages: Vec<VersionPage>) -> Self {
        self.pages.insert(function_name.to_string(), pages);
        self
    }

    /// Every (function_name, cursor) pair requested so far, in order.
    pub fn requests(&self) -> Vec<(String, Option<String>)> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl VersionSource for PagedVersionSource {
    async fn list_versions(
        &self,
        function_name: &str,
        cursor: Option<&str>,
    ) -> Result<VersionPage, SourceError> {
        self.requests
            .lock()
            .unwrap()
            .push((function_name.to_string(), cursor.map(String::from)));

        let pages = self
            .pages
            .get(function_name)
            .ok_or_else(|| SourceError::FunctionNotFound(function_name.to_string()))?;

        let index = match cursor {
            None => 0,
            Some(cursor) => pages
                .iter()
                .position(|page| page.next_cursor.as_deref() == Some(cursor))
                .map(|i| i + 1)
                .ok_or_else(|| SourceError::Request(format!("unknown cursor {cursor}")))?,
        };

        pages
            .get(index)
            .cloned()
            .ok_or_else(|| SourceError::Request(format!("no page at index {index}")))
    }
}
