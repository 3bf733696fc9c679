//! Page-windowed list replication.
//!
//! The local side holds the whole sequence; each subscriber sees one page of
//! it, chosen by its last `get`. Mutations are translated into page-relative
//! deltas for subscribers whose page contains the index, and into a bare
//! `set_count` for everyone else.

mod local;
mod remote;

pub use local::LocalList;
pub use remote::RemoteList;

use std::ops::Range;

/// The page a subscriber last requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PageCursor {
    /// Zero-based page number.
    pub page: usize,
    /// Items per page.
    pub page_size: usize,
}

impl PageCursor {
    /// Creates a cursor.
    pub fn new(page: usize, page_size: usize) -> Self {
        Self { page, page_size }
    }

    /// Global index of the first item of the page, if it is addressable.
    pub fn start(&self) -> Option<usize> {
        self.page.checked_mul(self.page_size)
    }

    /// Translates a global index into a page-relative one.
    ///
    /// Returns `None` when the index falls outside the page.
    pub fn window_index(&self, index: usize) -> Option<usize> {
        let offset = index.checked_sub(self.start()?)?;
        (offset < self.page_size).then_some(offset)
    }

    /// The slice of a list of `len` items covered by the page.
    pub fn range(&self, len: usize) -> Range<usize> {
        let start = self.start().unwrap_or(usize::MAX).min(len);
        let end = start.saturating_add(self.page_size).min(len);
        start..end
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn window_translation() {
        let cursor = PageCursor::new(1, 2);
        assert_eq!(cursor.window_index(1), None);
        assert_eq!(cursor.window_index(2), Some(0));
        assert_eq!(cursor.window_index(3), Some(1));
        assert_eq!(cursor.window_index(4), None);
    }

    #[test]
    fn empty_pages() {
        assert_eq!(PageCursor::new(0, 0).window_index(0), None);
        assert_eq!(PageCursor::new(3, 2).range(3), 3..3);
        assert_eq!(PageCursor::new(1, 2).range(3), 2..3);
    }

    #[test]
    fn huge_pages_do_not_overflow() {
        let cursor = PageCursor::new(usize::MAX, 2);
        assert_eq!(cursor.start(), None);
        assert_eq!(cursor.window_index(usize::MAX), None);
        assert_eq!(cursor.range(10), 10..10);
    }

    proptest! {
        #[test]
        fn window_index_agrees_with_range(page in 0usize..50, page_size in 0usize..50, index in 0usize..3000) {
            let cursor = PageCursor::new(page, page_size);
            let range = cursor.range(usize::MAX);
            match cursor.window_index(index) {
                Some(offset) => {
                    prop_assert!(range.contains(&index));
                    prop_assert_eq!(range.start + offset, index);
                }
                None => prop_assert!(!range.contains(&index)),
            }
        }
    }
}
