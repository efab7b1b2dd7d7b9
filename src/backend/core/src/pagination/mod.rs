//! Offset/limit pagination for list endpoints.

pub mod offset;

pub use offset::{OffsetPagination, PageMetadata, Paginated};

/// Default number of items per page.
pub const DEFAULT_PAGE_SIZE: u64 = 50;

/// Maximum allowed page size.
pub const MAX_PAGE_SIZE: u64 = 100;
