//! Generic pagination cursor.
//!
//! Sites expose one of three ways to walk a listing: a page number, an item offset, or a
//! "next page" link on each page. A [`Pager`] tracks the position for any of them and decides
//! when the listing is exhausted:
//!
//! - numbered and offset listings stop after a page with fewer entries than a full page
//!   (an empty page included),
//! - linked listings stop on the first page without a next link.
use log::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cursor {
    Page { page: u64, size: usize },
    Offset { offset: u64, size: usize },
    Link { url: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pager {
    cursor: Cursor,
    done: bool,
}

impl Pager {
    /// Page numbers starting at `start`, `size` entries per full page.
    pub fn pages(start: u64, size: usize) -> Self {
        Self {
            cursor: Cursor::Page { page: start, size },
            done: false,
        }
    }

    /// Item offsets starting at `start`, advancing by `size`.
    pub fn offsets(start: u64, size: usize) -> Self {
        Self {
            cursor: Cursor::Offset { offset: start, size },
            done: false,
        }
    }

    /// Follow "next" links starting from `first`.
    pub fn links(first: &str) -> Self {
        Self {
            cursor: Cursor::Link {
                url: first.to_string(),
            },
            done: false,
        }
    }

    #[inline]
    pub const fn is_done(&self) -> bool {
        self.done
    }

    #[inline]
    pub const fn cursor(&self) -> &Cursor {
        &self.cursor
    }

    /// Current page number or offset. `0` for linked listings.
    pub const fn value(&self) -> u64 {
        match &self.cursor {
            Cursor::Page { page, .. } => *page,
            Cursor::Offset { offset, .. } => *offset,
            Cursor::Link { .. } => 0,
        }
    }

    /// URL of the current page of a linked listing.
    pub fn url(&self) -> Option<&str> {
        match &self.cursor {
            Cursor::Link { url } => Some(url),
            _ => None,
        }
    }

    /// Record that the current page held `count` entries and move to the next one.
    pub fn advance(&mut self, count: usize) {
        match &mut self.cursor {
            Cursor::Page { page, size } => {
                if count == 0 || count < *size {
                    self.done = true;
                } else {
                    *page += 1;
                }
            }
            Cursor::Offset { offset, size } => {
                if count == 0 || count < *size {
                    self.done = true;
                } else {
                    *offset += *size as u64;
                }
            }
            Cursor::Link { .. } => {
                if count == 0 {
                    self.done = true;
                }
            }
        }
        if self.done {
            debug!("Listing exhausted after a page of {} entries", count);
        }
    }

    /// Move a linked listing to `next`, or finish it when the page had no next link.
    pub fn advance_link(&mut self, next: Option<String>) {
        match next {
            Some(next) => self.cursor = Cursor::Link { url: next },
            None => {
                debug!("No next page link, listing exhausted");
                self.done = true;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Feed page sizes until the pager stops, returning the total and the cursors visited.
    fn drain(mut pager: Pager, sizes: &[usize]) -> (usize, Vec<u64>) {
        let mut total = 0;
        let mut visited = Vec::new();
        for size in sizes {
            if pager.is_done() {
                break;
            }
            visited.push(pager.value());
            total += size;
            pager.advance(*size);
        }
        (total, visited)
    }

    #[test]
    fn short_page_ends_numbered_listing() {
        let (total, visited) = drain(Pager::pages(1, 20), &[20, 20, 20, 7, 20]);
        assert_eq!(total, 3 * 20 + 7);
        assert_eq!(visited, [1, 2, 3, 4]);
    }

    #[test]
    fn offsets_advance_by_page_size() {
        let (total, visited) = drain(Pager::offsets(0, 24), &[24, 24, 3]);
        assert_eq!(total, 51);
        assert_eq!(visited, [0, 24, 48]);
    }

    #[test]
    fn empty_page_ends_listing() {
        let (total, visited) = drain(Pager::pages(0, 100), &[100, 0, 100]);
        assert_eq!(total, 100);
        assert_eq!(visited, [0, 1]);
    }

    #[test]
    fn missing_next_link_ends_listing() {
        let mut pager = Pager::links("/image/1");
        assert_eq!(pager.url(), Some("/image/1"));

        pager.advance_link(Some("/image/2".into()));
        assert_eq!(pager.url(), Some("/image/2"));
        assert!(!pager.is_done());

        pager.advance_link(None);
        assert!(pager.is_done());
    }
}
