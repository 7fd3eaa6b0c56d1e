use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PageError {
    #[error("offset must not be negative, got {0}")]
    NegativeOffset(i64),
}

/// A pagination window over an ordered result set.
///
/// `limit <= 0` means "every matching row"; there is no implicit page size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Page {
    limit: Option<usize>,
    offset: usize,
}

impl Page {
    pub fn new(limit: i64, offset: i64) -> Result<Self, PageError> {
        if offset < 0 {
            return Err(PageError::NegativeOffset(offset));
        }
        Ok(Self {
            limit: usize::try_from(limit).ok().filter(|&l| l > 0),
            offset: usize::try_from(offset).unwrap_or(usize::MAX),
        })
    }

    /// Every row, no offset.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn limit(&self) -> Option<usize> {
        self.limit
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    /// SQL `LIMIT` value; SQLite treats a negative limit as unbounded.
    pub fn sql_limit(&self) -> i64 {
        self.limit
            .map(|l| i64::try_from(l).unwrap_or(i64::MAX))
            .unwrap_or(-1)
    }

    pub fn sql_offset(&self) -> i64 {
        i64::try_from(self.offset).unwrap_or(i64::MAX)
    }

    /// Apply the window to an already filtered and ordered sequence.
    pub fn apply<T>(&self, items: impl IntoIterator<Item = T>) -> Vec<T> {
        let skipped = items.into_iter().skip(self.offset);
        match self.limit {
            Some(limit) => skipped.take(limit).collect(),
            None => skipped.collect(),
        }
    }
}
