//! Page partitioning for child key lists
//!
//! A [`PagingEngine`] owns the most recently supplied key list, split into
//! pages of a fixed size. Concatenating all pages always gives back that list.

use serde::Serialize;

use crate::refresh::RefreshEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PagingState {
    /// No keys; a single empty page once keys have been supplied
    Empty,
    Paged,
}

/// Splits an ordered key list into pages and tracks the current one
#[derive(Debug, Clone)]
pub struct PagingEngine<K> {
    pages: Vec<Vec<K>>,
    /// `<= 0` means everything goes on one page
    page_size: i64,
    /// 1-based; 0 only before any keys were supplied
    current_page: usize,
    state: PagingState,
}

impl<K: Clone> PagingEngine<K> {
    pub fn new(page_size: i64) -> Self {
        Self {
            pages: Vec::new(),
            page_size,
            current_page: 0,
            state: PagingState::Empty,
        }
    }

    pub fn state(&self) -> PagingState {
        self.state
    }

    pub fn page_size(&self) -> i64 {
        self.page_size
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// 1-based index of the current page, 0 before any keys were supplied
    pub fn current_page(&self) -> usize {
        self.current_page
    }

    /// Replace the key list. The current page is kept, clamped to the new
    /// page count.
    pub fn set_keys(&mut self, keys: Vec<K>) -> Option<RefreshEvent> {
        let previous_count = self.page_count();
        self.repartition(keys);
        self.current_page = self.current_page.clamp(1, self.page_count());
        self.page_count_event(previous_count)
    }

    /// Re-page the keys already held using a new size and go back to page 1
    pub fn set_page_size(&mut self, page_size: i64) -> Option<RefreshEvent> {
        self.page_size = page_size;
        if self.pages.is_empty() {
            return None;
        }
        let previous_count = self.page_count();
        let keys = self.all_keys();
        self.repartition(keys);
        self.current_page = 1;
        self.page_count_event(previous_count)
    }

    /// Move to page `page`, clamped into `[1, page_count]`
    pub fn set_current_page(&mut self, page: usize) {
        if self.pages.is_empty() {
            return;
        }
        self.current_page = page.clamp(1, self.page_count());
    }

    /// Keys on the current page
    pub fn current_page_keys(&self) -> Vec<K> {
        if self.current_page == 0 {
            return Vec::new();
        }
        self.pages
            .get(self.current_page - 1)
            .cloned()
            .unwrap_or_default()
    }

    pub fn pages(&self) -> &[Vec<K>] {
        &self.pages
    }

    /// Flattened key list, in order
    pub fn all_keys(&self) -> Vec<K> {
        self.pages.iter().flatten().cloned().collect()
    }

    pub fn key_count(&self) -> usize {
        self.pages.iter().map(Vec::len).sum()
    }

    fn repartition(&mut self, keys: Vec<K>) {
        if keys.is_empty() {
            self.pages = vec![Vec::new()];
            self.state = PagingState::Empty;
            return;
        }

        self.pages = if self.page_size <= 0 {
            vec![keys]
        } else {
            keys.chunks(self.page_size as usize)
                .map(|chunk| chunk.to_vec())
                .collect()
        };
        self.state = PagingState::Paged;
    }

    fn page_count_event(&self, previous_count: usize) -> Option<RefreshEvent> {
        let count = self.page_count();
        (count != previous_count).then_some(RefreshEvent::PageCountChanged(count))
    }
}
