//! Lenient page-number resolution for listing views.
//!
//! A listing never fails because of its `page` parameter: anything that is not
//! an integer resolves to the first page, numbers below one resolve to the first
//! page and numbers past the end resolve to the last page.

use std::num::IntErrorKind;

/// Articles shown per page on the home listing.
pub const ARTICLES_PER_PAGE: i64 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Paginator {
    count: i64,
    per_page: i64,
}

impl Paginator {
    pub fn new(count: i64, per_page: i64) -> Self {
        Self {
            count: count.max(0),
            per_page: per_page.max(1),
        }
    }

    /// Number of pages. An empty listing still has one (empty) page.
    pub fn num_pages(&self) -> i64 {
        if self.count == 0 {
            1
        } else {
            (self.count + self.per_page - 1) / self.per_page
        }
    }

    /// Resolves a raw `page` query value to a concrete window.
    pub fn page(&self, raw: Option<&str>) -> PageWindow {
        let num_pages = self.num_pages();
        let requested = match raw.map(|value| value.trim().parse::<i64>()) {
            Some(Ok(number)) => number,
            // Still an integer, just a huge one: past the end.
            Some(Err(e)) if *e.kind() == IntErrorKind::PosOverflow => num_pages,
            _ => 1,
        };
        let number = requested.clamp(1, num_pages);

        PageWindow {
            number,
            num_pages,
            count: self.count,
            offset: (number - 1) * self.per_page,
            limit: self.per_page,
        }
    }
}

/// PageWindow
///
/// The resolved page: its 1-based number plus the offset/limit pair handed to
/// the repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageWindow {
    pub number: i64,
    pub num_pages: i64,
    pub count: i64,
    pub offset: i64,
    pub limit: i64,
}

impl PageWindow {
    pub fn has_previous(&self) -> bool {
        self.number > 1
    }

    pub fn has_next(&self) -> bool {
        self.number < self.num_pages
    }

    pub fn previous_page_number(&self) -> Option<i64> {
        self.has_previous().then(|| self.number - 1)
    }

    pub fn next_page_number(&self) -> Option<i64> {
        self.has_next().then(|| self.number + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_or_garbage_page_is_first_page() {
        let paginator = Paginator::new(12, ARTICLES_PER_PAGE);
        for raw in [
            None,
            Some("abc"),
            Some(""),
            Some("2.0"),
            Some("0"),
            Some("-3"),
            Some("-99999999999999999999"),
            Some("9e99"),
        ] {
            let window = paginator.page(raw);
            assert_eq!(window.number, 1, "raw page {raw:?}");
            assert_eq!(window.offset, 0);
        }
    }

    #[test]
    fn page_past_the_end_is_clamped_to_last() {
        let window = Paginator::new(12, ARTICLES_PER_PAGE).page(Some("999"));
        assert_eq!(window.number, 3);
        assert_eq!(window.num_pages, 3);
        assert_eq!(window.offset, 10);
        assert!(window.has_previous());
        assert!(!window.has_next());
        assert_eq!(window.previous_page_number(), Some(2));
    }

    #[test]
    fn integer_too_large_for_i64_is_clamped_to_last() {
        let paginator = Paginator::new(12, ARTICLES_PER_PAGE);
        for raw in ["99999999999999999999", " +99999999999999999999 "] {
            let window = paginator.page(Some(raw));
            assert_eq!(window.number, 3, "raw page {raw:?}");
            assert_eq!(window.offset, 10);
        }
    }

    #[test]
    fn empty_listing_has_one_page() {
        let paginator = Paginator::new(0, ARTICLES_PER_PAGE);
        assert_eq!(paginator.num_pages(), 1);
        let window = paginator.page(Some("4"));
        assert_eq!(window.number, 1);
        assert!(!window.has_next());
        assert_eq!(window.next_page_number(), None);
    }

    #[test]
    fn exact_multiple_does_not_add_a_page() {
        assert_eq!(Paginator::new(10, 5).num_pages(), 2);
        assert_eq!(Paginator::new(11, 5).num_pages(), 3);
    }
}
