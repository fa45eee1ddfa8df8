//! Paging state and paged results

use serde::{Deserialize, Serialize};

use crate::error::{ModelError, ModelResult};

/// Page window of a paged criteria.
///
/// Pages are 1-based. A `total_rows` of zero means the total has not been
/// counted yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Paging {
    page_size: u64,
    page: u64,
    total_rows: u64,
    enabled: bool,
}

impl Paging {
    pub fn new(page_size: u64) -> ModelResult<Self> {
        Self::with_page(page_size, 1)
    }

    pub fn with_page(page_size: u64, page: u64) -> ModelResult<Self> {
        if page_size == 0 {
            return Err(ModelError::InvalidInput("Page size must be at least 1".to_string()));
        }
        let mut paging = Self {
            page_size,
            page: 1,
            total_rows: 0,
            enabled: true,
        };
        paging.set_page(page)?;
        Ok(paging)
    }

    pub fn page_size(&self) -> u64 {
        self.page_size
    }

    pub fn page(&self) -> u64 {
        self.page
    }

    pub fn set_page(&mut self, page: u64) -> ModelResult<()> {
        if page == 0 {
            return Err(ModelError::InvalidInput("Pages are numbered from 1".to_string()));
        }
        let offset = (page - 1)
            .checked_mul(self.page_size)
            .filter(|offset| *offset <= i64::MAX as u64);
        if offset.is_none() {
            return Err(ModelError::InvalidInput(format!(
                "Page {} of {} rows is out of range",
                page, self.page_size
            )));
        }
        self.page = page;
        Ok(())
    }

    pub fn total_rows(&self) -> u64 {
        self.total_rows
    }

    pub fn set_total_rows(&mut self, total_rows: u64) {
        self.total_rows = total_rows;
    }

    pub fn is_total_known(&self) -> bool {
        self.total_rows > 0
    }

    /// Forget the counted total so the next paged find counts again
    pub fn reset_total(&mut self) {
        self.total_rows = 0;
    }

    /// Offset of the first row of the current page
    pub fn start_index(&self) -> u64 {
        self.page.saturating_sub(1).saturating_mul(self.page_size)
    }

    pub fn page_count(&self) -> u64 {
        self.total_rows.div_ceil(self.page_size)
    }

    pub fn has_next(&self) -> bool {
        self.page < self.page_count()
    }

    pub fn has_previous(&self) -> bool {
        self.page > 1
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }
}

/// One page of results
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PagedList<T> {
    pub items: Vec<T>,
    pub page: u64,
    pub page_size: u64,
    pub total_rows: u64,
    pub page_count: u64,
}

impl<T> PagedList<T> {
    pub fn new(items: Vec<T>, paging: &Paging) -> Self {
        Self {
            items,
            page: paging.page(),
            page_size: paging.page_size(),
            total_rows: paging.total_rows(),
            page_count: paging.page_count(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn has_next(&self) -> bool {
        self.page < self.page_count
    }

    pub fn map<U, F: FnMut(T) -> U>(self, f: F) -> PagedList<U> {
        PagedList {
            items: self.items.into_iter().map(f).collect(),
            page: self.page,
            page_size: self.page_size,
            total_rows: self.total_rows,
            page_count: self.page_count,
        }
    }
}
