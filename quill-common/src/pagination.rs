use serde::Serialize;

pub const PAGE_SIZE: u64 = 10;

/// Splits `count` ordered items into fixed-size pages.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash)]
pub struct Paginator {
    count: u64,
    per_page: u64,
}

/// The slice of the ordered items one page covers.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash)]
pub struct PageWindow {
    pub number: u64,
    pub offset: u64,
    pub limit: u64,
}

impl Paginator {
    #[must_use]
    pub fn new(count: u64) -> Self {
        Self::with_page_size(count, PAGE_SIZE)
    }

    /// # Panics
    /// If `per_page` is zero.
    #[must_use]
    pub fn with_page_size(count: u64, per_page: u64) -> Self {
        assert!(per_page > 0, "Page size must be positive.");
        Self { count, per_page }
    }

    #[must_use]
    pub fn count(self) -> u64 {
        self.count
    }

    /// Number of pages; an empty list still has one (empty) page.
    #[must_use]
    pub fn num_pages(self) -> u64 {
        self.count.div_ceil(self.per_page).max(1)
    }

    /// Clamps a requested page number into `1..=num_pages`.
    #[must_use]
    pub fn clamp(self, requested: i64) -> u64 {
        match u64::try_from(requested) {
            Ok(number) => number.clamp(1, self.num_pages()),
            Err(_) => 1,
        }
    }

    #[must_use]
    pub fn window(self, requested: i64) -> PageWindow {
        let number = self.clamp(requested);
        PageWindow {
            number,
            offset: (number - 1) * self.per_page,
            limit: self.per_page,
        }
    }

    #[must_use]
    pub fn page<T>(self, window: PageWindow, items: Vec<T>) -> Page<T> {
        let num_pages = self.num_pages();
        Page {
            number: window.number,
            num_pages,
            count: self.count,
            has_previous: window.number > 1,
            has_next: window.number < num_pages,
            items,
        }
    }
}

/// Parses a `?page=` query value. Anything that is not an integer means page 1.
#[must_use]
pub fn parse_page_number(raw: Option<&str>) -> i64 {
    raw.and_then(|raw| raw.trim().parse().ok()).unwrap_or(1)
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, Serialize)]
pub struct Page<T> {
    pub number: u64,
    pub num_pages: u64,
    pub count: u64,
    pub has_previous: bool,
    pub has_next: bool,
    pub items: Vec<T>,
}

#[cfg(test)]
mod tests {
    use crate::pagination::{PageWindow, Paginator, parse_page_number};

    #[test]
    fn thirteen_items_make_two_pages() {
        let paginator = Paginator::new(13);
        assert_eq!(paginator.num_pages(), 2);

        assert_eq!(
            paginator.window(1),
            PageWindow {
                number: 1,
                offset: 0,
                limit: 10
            }
        );
        assert_eq!(
            paginator.window(2),
            PageWindow {
                number: 2,
                offset: 10,
                limit: 10
            }
        );
    }

    #[test]
    fn page_count_is_ceiling() {
        for (count, pages) in [(0, 1), (1, 1), (10, 1), (11, 2), (20, 2), (21, 3), (100, 10)] {
            assert_eq!(Paginator::new(count).num_pages(), pages, "{count}");
        }
    }

    #[test]
    fn out_of_range_pages_clamp() {
        let paginator = Paginator::new(25);
        assert_eq!(paginator.clamp(0), 1);
        assert_eq!(paginator.clamp(-3), 1);
        assert_eq!(paginator.clamp(3), 3);
        assert_eq!(paginator.clamp(4), 3);
        assert_eq!(paginator.clamp(i64::MAX), 3);

        assert_eq!(Paginator::new(0).window(7).offset, 0);
    }

    #[test]
    fn page_numbers_from_query() {
        assert_eq!(parse_page_number(None), 1);
        assert_eq!(parse_page_number(Some("2")), 2);
        assert_eq!(parse_page_number(Some(" 5 ")), 5);
        assert_eq!(parse_page_number(Some("-1")), -1);
        assert_eq!(parse_page_number(Some("last")), 1);
        assert_eq!(parse_page_number(Some("")), 1);
    }

    #[test]
    fn page_flags() {
        let paginator = Paginator::new(13);
        let first = paginator.page(paginator.window(1), vec![(); 10]);
        assert!(!first.has_previous);
        assert!(first.has_next);

        let second = paginator.page(paginator.window(2), vec![(); 3]);
        assert!(second.has_previous);
        assert!(!second.has_next);
        assert_eq!(second.count, 13);
    }
}
