//! This modules defines the common functionality for paging data.

use serde::Serialize;

/// The config for pagination
#[derive(Debug, Clone, PartialEq)]
pub struct PaginationConfig {
    /// The page number to default to when not specified in a request.
    pub default_page: u64,
    /// The maximum number of records to return per page.
    pub page_limit: u64,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            default_page: 1,
            page_limit: 50,
        }
    }
}

impl PaginationConfig {
    /// The number of rows to skip to get to the 1-based `page`.
    ///
    /// Page 0 is treated the same as page 1.
    pub fn offset(&self, page: u64) -> u64 {
        page.saturating_sub(1).saturating_mul(self.page_limit)
    }
}

/// One page of query results.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<T> {
    /// The total number of rows matching the query, not just those in this page.
    pub count: u64,
    /// The rows in this page.
    pub data: Vec<T>,
}
