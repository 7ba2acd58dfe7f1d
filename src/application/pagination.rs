//! Page-number pagination shared by every feed.
//!
//! Page resolution is forgiving: a missing or non-numeric `page` parameter
//! yields the first page and any number outside `1..=num_pages` yields the
//! last page. An empty listing still has exactly one (empty) page.

use std::num::NonZeroU32;

pub const DEFAULT_PAGE_SIZE: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Paginator {
    per_page: NonZeroU32,
    total_count: u64,
}

impl Paginator {
    pub fn new(total_count: u64, per_page: NonZeroU32) -> Self {
        Self {
            per_page,
            total_count,
        }
    }

    pub fn num_pages(&self) -> u64 {
        let per_page = u64::from(self.per_page.get());
        self.total_count.div_ceil(per_page).max(1)
    }

    /// Resolve the raw `page` query value into a concrete window.
    pub fn window(&self, raw_page: Option<&str>) -> PageWindow {
        let num_pages = self.num_pages();
        let number = match raw_page.and_then(|value| value.trim().parse::<i64>().ok()) {
            None => 1,
            Some(requested) if requested < 1 => num_pages,
            Some(requested) => u64::try_from(requested)
                .ok()
                .filter(|value| *value <= num_pages)
                .unwrap_or(num_pages),
        };

        let limit = u64::from(self.per_page.get());
        PageWindow {
            number,
            num_pages,
            total_count: self.total_count,
            offset: (number - 1) * limit,
            limit,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageWindow {
    pub number: u64,
    pub num_pages: u64,
    pub total_count: u64,
    pub offset: u64,
    pub limit: u64,
}

impl PageWindow {
    pub fn has_previous(&self) -> bool {
        self.number > 1
    }

    pub fn has_next(&self) -> bool {
        self.number < self.num_pages
    }

    pub fn previous_number(&self) -> Option<u64> {
        self.has_previous().then(|| self.number - 1)
    }

    pub fn next_number(&self) -> Option<u64> {
        self.has_next().then(|| self.number + 1)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub window: PageWindow,
}

impl<T> Page<T> {
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            window: self.window,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paginator(total: u64) -> Paginator {
        Paginator::new(total, NonZeroU32::new(10).expect("non-zero"))
    }

    #[test]
    fn empty_listing_has_one_page() {
        let window = paginator(0).window(None);
        assert_eq!(window.number, 1);
        assert_eq!(window.num_pages, 1);
        assert!(!window.has_next());
        assert!(!window.has_previous());
    }

    #[test]
    fn garbage_page_falls_back_to_first() {
        let window = paginator(25).window(Some("abc"));
        assert_eq!(window.number, 1);
        assert_eq!(window.offset, 0);
    }

    #[test]
    fn out_of_range_page_clamps_to_last() {
        let p = paginator(25);
        assert_eq!(p.window(Some("9")).number, 3);
        assert_eq!(p.window(Some("0")).number, 3);
        assert_eq!(p.window(Some("-4")).number, 3);
    }

    #[test]
    fn middle_page_exposes_neighbours() {
        let window = paginator(25).window(Some("2"));
        assert_eq!(window.offset, 10);
        assert_eq!(window.limit, 10);
        assert_eq!(window.previous_number(), Some(1));
        assert_eq!(window.next_number(), Some(3));
    }

    #[test]
    fn exact_multiple_does_not_add_trailing_page() {
        assert_eq!(paginator(20).num_pages(), 2);
        assert_eq!(paginator(21).num_pages(), 3);
    }
}
