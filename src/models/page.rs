//! Paging models
//!
//! A page of results plus the metadata needed to tell whether it is the
//! whole answer or only a slice of it.

use serde::{Deserialize, Serialize};

use crate::error::{require, Result};

/// Position and size of a page within a larger collection.
///
/// `offset` counts items, not pages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageInfo {
    /// Index of the first item in the page
    pub offset: usize,
    /// Maximum number of items the page was asked to hold
    pub limit: usize,
    /// Number of items actually in the page
    pub returned: usize,
    /// Size of the whole collection, when known
    #[serde(default)]
    pub total: Option<usize>,
}

impl PageInfo {
    /// Page size used when the caller does not give one, and when a whole
    /// collection is split into pages.
    pub const DEFAULT_LIMIT: usize = 50;

    /// True if the page ends exactly at `cap` items, so more items may have
    /// existed than were fetched.
    ///
    /// A known total smaller than the cap rules truncation out.
    pub fn was_truncated_at(&self, cap: usize) -> bool {
        if let Some(total) = self.total {
            if cap > total {
                return false;
            }
        }
        self.offset.saturating_add(self.returned) == cap
    }
}

/// A page of items together with its [`PageInfo`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageEnvelope<M> {
    pub page_info: PageInfo,
    pub data: Vec<M>,
}

impl<M> PageEnvelope<M> {
    /// Builds a page, deriving `returned` from `data`.
    pub fn new(offset: usize, limit: usize, total: Option<usize>, data: Vec<M>) -> Self {
        Self {
            page_info: PageInfo {
                offset,
                limit,
                returned: data.len(),
                total,
            },
            data,
        }
    }

    /// Checks that the page metadata agrees with its content.
    pub fn validate(&self) -> Result<()> {
        require(self.page_info.limit > 0, || {
            "Page limit must be greater than zero".to_string()
        })?;
        require(self.page_info.returned == self.data.len(), || {
            format!(
                "Page claims {} returned items but holds {}",
                self.page_info.returned,
                self.data.len()
            )
        })?;
        require(self.data.len() <= self.page_info.limit, || {
            format!(
                "Page holds {} items, more than its limit of {}",
                self.data.len(),
                self.page_info.limit
            )
        })
    }
}
