//! Pagination types shared by the listing operations
use crate::config::AppConfig;
use serde::{Deserialize, Serialize};

const MAX_OFFSET: u64 = i64::MAX as u64;

/// Requested page. Both fields are optional; see [`PaginationParams::resolve`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaginationParams {
    /// 1-based page number
    #[serde(default)]
    pub page: Option<u64>,
    #[serde(default)]
    pub limit: Option<u64>,
}

impl PaginationParams {
    pub fn new(page: u64, limit: u64) -> Self {
        Self {
            page: Some(page),
            limit: Some(limit),
        }
    }

    /// Resolves to a concrete `(page, limit)`.
    ///
    /// Page 0 is treated as page 1. The limit falls back to the configured
    /// default and is clamped to `1..=api_max_page_size`. The page is capped
    /// so the row offset `(page - 1) * limit` stays within `i64::MAX`.
    pub fn resolve(&self, config: &AppConfig) -> (u64, u64) {
        let limit = config.page_size(self.limit);
        let last_addressable = MAX_OFFSET / limit + 1;
        let page = self.page.unwrap_or(1).clamp(1, last_addressable);
        (page, limit)
    }
}

/// Standard pagination response metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaginationMeta {
    pub page: u64,
    pub limit: u64,
    pub total: u64,
    pub total_pages: u64,
}

impl PaginationMeta {
    pub fn new(page: u64, limit: u64, total: u64) -> Self {
        let total_pages = if total == 0 || limit == 0 {
            0
        } else {
            (total + limit - 1) / limit
        };
        Self {
            page,
            limit,
            total,
            total_pages,
        }
    }
}

/// Standard paginated response wrapper
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaginatedResponse<T> {
    pub items: Vec<T>,
    pub pagination: PaginationMeta,
}

impl<T> PaginatedResponse<T> {
    pub fn new(items: Vec<T>, page: u64, limit: u64, total: u64) -> Self {
        Self {
            items,
            pagination: PaginationMeta::new(page, limit, total),
        }
    }
}
