//! Offset-based pagination.
//!
//! Clients send `limit`/`offset`; responses carry [`PageMetadata`] so a UI can
//! also render page numbers.

use serde::{Deserialize, Serialize};

use super::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};

// ═══════════════════════════════════════════════════════════════════════════════
// Page Metadata
// ═══════════════════════════════════════════════════════════════════════════════

/// Metadata about a paginated result set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageMetadata {
    /// Total number of matching items.
    pub total: u64,
    pub limit: u64,
    pub offset: u64,
    /// Current page number (1-indexed), derived from offset and limit.
    pub page: u64,
    /// Total number of pages; at least 1.
    pub total_pages: u64,
    pub has_next: bool,
    pub has_previous: bool,
}

impl PageMetadata {
    pub fn new(offset: u64, limit: u64, total: u64) -> Self {
        let limit = limit.max(1);
        let total_pages = total.div_ceil(limit).max(1);

        Self {
            total,
            limit,
            offset,
            page: offset / limit + 1,
            total_pages,
            has_next: offset + limit < total,
            has_previous: offset > 0,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Offset Pagination
// ═══════════════════════════════════════════════════════════════════════════════

/// Offset-based pagination parameters, already clamped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OffsetPagination {
    pub offset: u64,
    pub limit: u64,
}

impl Default for OffsetPagination {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: DEFAULT_PAGE_SIZE,
        }
    }
}

impl OffsetPagination {
    /// Build from optional query values; `limit` is clamped to `1..=MAX_PAGE_SIZE`.
    pub fn new(offset: Option<u64>, limit: Option<u64>) -> Self {
        Self {
            offset: offset.unwrap_or(0),
            limit: limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE),
        }
    }

    pub fn metadata(&self, total: u64) -> PageMetadata {
        PageMetadata::new(self.offset, self.limit, total)
    }

    /// Apply pagination to an iterator.
    pub fn paginate_iter<T, I: Iterator<Item = T>>(&self, iter: I) -> Vec<T> {
        iter.skip(self.offset as usize)
            .take(self.limit as usize)
            .collect()
    }
}

/// A page of items with its metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Paginated<T> {
    pub items: Vec<T>,
    pub pagination: PageMetadata,
}

impl<T> Paginated<T> {
    pub fn new(items: Vec<T>, pagination: &OffsetPagination, total: u64) -> Self {
        Self {
            items,
            pagination: pagination.metadata(total),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_and_clamping() {
        assert_eq!(OffsetPagination::new(None, None), OffsetPagination::default());
        assert_eq!(OffsetPagination::new(None, None).limit, 50);
        assert_eq!(OffsetPagination::new(None, Some(0)).limit, 1);
        assert_eq!(OffsetPagination::new(None, Some(1000)).limit, 100);
    }

    #[test]
    fn test_metadata_first_page() {
        let meta = PageMetadata::new(0, 10, 25);
        assert_eq!(meta.page, 1);
        assert_eq!(meta.total_pages, 3);
        assert!(meta.has_next);
        assert!(!meta.has_previous);
    }

    #[test]
    fn test_metadata_last_page() {
        let meta = PageMetadata::new(20, 10, 25);
        assert_eq!(meta.page, 3);
        assert!(!meta.has_next);
        assert!(meta.has_previous);
    }

    #[test]
    fn test_metadata_empty() {
        let meta = PageMetadata::new(0, 50, 0);
        assert_eq!(meta.total_pages, 1);
        assert!(!meta.has_next);
        assert!(!meta.has_previous);
    }

    #[test]
    fn test_paginate_iter() {
        let pagination = OffsetPagination::new(Some(2), Some(2));
        let page = pagination.paginate_iter(1..=5);
        assert_eq!(page, vec![3, 4]);
    }
}
