/// Pagination compiler.
///
/// Pages are one-based; `offset = (page - 1) * page_size`. Out-of-domain
/// input is rejected when the [`PageSpec`] is built, nothing is clamped.

use crate::core::{ClubhouseError, Result};

/// A validated page request: `page >= 1`, `page_size >= 1`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageSpec {
    page: u64,
    page_size: u64,
}

impl PageSpec {
    /// # Errors
    ///
    /// `ClubhouseError::Validation` when either value is below 1.
    pub fn new(page: i64, page_size: i64) -> Result<Self> {
        if page < 1 {
            return Err(ClubhouseError::Validation(format!("page must be at least 1, got {}", page)));
        }
        if page_size < 1 {
            return Err(ClubhouseError::Validation(format!(
                "page size must be at least 1, got {}",
                page_size
            )));
        }
        Ok(PageSpec {
            page: page as u64,
            page_size: page_size as u64,
        })
    }

    /// Builds a spec from optional request parameters. Paging only applies
    /// when both are present.
    pub fn from_optional(page: Option<i64>, page_size: Option<i64>) -> Result<Option<Self>> {
        match (page, page_size) {
            (Some(page), Some(page_size)) => PageSpec::new(page, page_size).map(Some),
            _ => Ok(None),
        }
    }

    pub fn page(&self) -> u64 {
        self.page
    }

    pub fn page_size(&self) -> u64 {
        self.page_size
    }

    pub fn offset(&self) -> u64 {
        (self.page - 1).saturating_mul(self.page_size)
    }
}

/// Compiled `LIMIT`/`OFFSET` pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub limit: u64,
    pub offset: u64,
}

impl Pagination {
    /// Renders the fixed `LIMIT n OFFSET m` shape.
    pub fn to_sql(&self) -> String {
        format!("LIMIT {} OFFSET {}", self.limit, self.offset)
    }
}

/// No spec means no limit: the full result, or whatever default a
/// procedure applies on its side.
pub fn compile(page: Option<PageSpec>) -> Option<Pagination> {
    page.map(|spec| Pagination {
        limit: spec.page_size(),
        offset: spec.offset(),
    })
}
