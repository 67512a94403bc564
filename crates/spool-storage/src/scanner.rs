//! Forward cursor over a group
//!
//! The scanner pages through a group by id (`after = last emitted id`) and
//! takes the store lock once per page. It holds nothing between pages, so
//! mutations may interleave; ids it yields are still strictly increasing
//! and never repeated.

use std::collections::VecDeque;

use spool_core::{GroupNameError, Record, RecordId, validate_group};
use tracing::trace;

use crate::LogBackend;
use crate::error::StorageError;
use crate::store::LogStore;

/// Lazy iterator over the records of one group
pub struct Scanner<'a, B: LogBackend> {
    store: &'a LogStore<B>,
    group: String,
    /// Last id handed out
    after: Option<RecordId>,
    buffer: VecDeque<Record>,
    emitted: usize,
    exhausted: bool,
    /// Set when the group name is unusable; nothing is read then
    invalid: Option<GroupNameError>,
}

impl<'a, B: LogBackend> Scanner<'a, B> {
    pub(crate) fn new(store: &'a LogStore<B>, group: &str) -> Self {
        Self {
            store,
            group: group.to_string(),
            after: None,
            buffer: VecDeque::new(),
            emitted: 0,
            exhausted: false,
            invalid: validate_group(group).err(),
        }
    }

    /// Group being scanned
    pub fn group(&self) -> &str {
        &self.group
    }

    /// Records yielded since creation or the last restart
    pub fn emitted(&self) -> usize {
        self.emitted
    }

    /// Rewind to the start of the group
    pub fn restart(&mut self) {
        self.after = None;
        self.buffer.clear();
        self.emitted = 0;
        self.exhausted = false;
    }

    fn fill(&mut self) -> Result<(), StorageError> {
        let page = self.store.page(&self.group, self.after)?;

        // A short page means the end was reached at read time
        if page.len() < self.store.page_size() {
            self.exhausted = true;
        }
        self.buffer.extend(page);
        Ok(())
    }
}

impl<B: LogBackend> Iterator for Scanner<'_, B> {
    type Item = Result<Record, StorageError>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(reason) = self.invalid {
            if self.exhausted {
                return None;
            }
            self.exhausted = true;
            return Some(Err(StorageError::invalid_group(&self.group, reason)));
        }

        if self.buffer.is_empty() && !self.exhausted {
            if let Err(e) = self.fill() {
                self.exhausted = true;
                return Some(Err(e));
            }
        }

        let record = self.buffer.pop_front()?;
        self.after = Some(record.id);
        self.emitted += 1;
        Some(Ok(record))
    }
}

impl<B: LogBackend> Drop for Scanner<'_, B> {
    fn drop(&mut self) {
        trace!(group = %self.group, emitted = self.emitted, "Scanner closed");
    }
}
