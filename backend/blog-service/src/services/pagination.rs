/// Page-number pagination for feed listings
///
/// Page parameter handling is forgiving: a missing or non-numeric value
/// yields page 1, values below 1 clamp to 1 and values past the end clamp to
/// the last page. An empty listing still has a single empty page.
use serde::Serialize;
use std::num::IntErrorKind;

/// One page of a listing
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<T> {
    pub object_list: Vec<T>,
    pub number: usize,
    pub num_pages: usize,
    pub count: usize,
    pub has_next: bool,
    pub has_previous: bool,
    pub next_page_number: Option<usize>,
    pub previous_page_number: Option<usize>,
}

/// Page arithmetic for a listing of `count` items
#[derive(Debug, Clone, Copy)]
pub struct Paginator {
    count: usize,
    per_page: usize,
}

impl Paginator {
    pub fn new(count: usize, per_page: usize) -> Self {
        Self {
            count,
            per_page: per_page.max(1),
        }
    }

    pub fn per_page(&self) -> usize {
        self.per_page
    }

    pub fn num_pages(&self) -> usize {
        if self.count == 0 {
            1
        } else {
            self.count.div_ceil(self.per_page)
        }
    }

    /// Resolve a raw page parameter to a valid page number
    pub fn resolve(&self, raw: Option<&str>) -> usize {
        let last = self.num_pages();
        let Some(raw) = raw.map(str::trim) else {
            return 1;
        };

        match raw.parse::<i64>() {
            Ok(n) if n < 1 => 1,
            Ok(n) if n as u64 > last as u64 => last,
            Ok(n) => n as usize,
            Err(e) if matches!(e.kind(), IntErrorKind::PosOverflow) => last,
            Err(_) => 1,
        }
    }

    /// Zero-based offset of the first item on `number`
    pub fn offset(&self, number: usize) -> usize {
        (number.max(1) - 1) * self.per_page
    }

    /// Wrap the items fetched for `number` into a `Page`
    pub fn page<T>(&self, number: usize, object_list: Vec<T>) -> Page<T> {
        let num_pages = self.num_pages();
        let has_next = number < num_pages;
        let has_previous = number > 1;

        Page {
            object_list,
            number,
            num_pages,
            count: self.count,
            has_next,
            has_previous,
            next_page_number: has_next.then_some(number + 1),
            previous_page_number: has_previous.then(|| number - 1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Slice `items` the way the store does with limit/offset
    fn page_of(paginator: &Paginator, items: &[usize], raw: Option<&str>) -> Page<usize> {
        let number = paginator.resolve(raw);
        let start = paginator.offset(number).min(items.len());
        let end = (start + paginator.per_page()).min(items.len());
        paginator.page(number, items[start..end].to_vec())
    }

    fn items(n: usize) -> Vec<usize> {
        (1..=n).collect()
    }

    #[test]
    fn test_thirteen_items_split_ten_and_three() {
        let data = items(13);
        let paginator = Paginator::new(data.len(), 10);

        let first = page_of(&paginator, &data, Some("1"));
        assert_eq!(first.object_list.len(), 10);
        assert!(first.has_next);
        assert!(!first.has_previous);
        assert_eq!(first.next_page_number, Some(2));

        let second = page_of(&paginator, &data, Some("2"));
        assert_eq!(second.object_list, vec![11, 12, 13]);
        assert!(!second.has_next);
        assert_eq!(second.previous_page_number, Some(1));
        assert_eq!(second.count, 13);
    }

    #[test]
    fn test_out_of_range_clamps_to_last_page() {
        let data = items(13);
        let paginator = Paginator::new(data.len(), 10);

        let third = page_of(&paginator, &data, Some("3"));
        assert_eq!(third.number, 2);
        assert_eq!(third.object_list, vec![11, 12, 13]);
        assert_eq!(paginator.resolve(Some("99999999999999999999")), 2);
        assert_eq!(paginator.resolve(Some("-99999999999999999999")), 1);
    }

    #[test]
    fn test_forgiving_page_parameter() {
        let paginator = Paginator::new(25, 10);

        assert_eq!(paginator.resolve(None), 1);
        assert_eq!(paginator.resolve(Some("")), 1);
        assert_eq!(paginator.resolve(Some("abc")), 1);
        assert_eq!(paginator.resolve(Some("last")), 1);
        assert_eq!(paginator.resolve(Some("0")), 1);
        assert_eq!(paginator.resolve(Some("-4")), 1);
        assert_eq!(paginator.resolve(Some(" 2 ")), 2);
    }

    #[test]
    fn test_empty_listing_has_one_empty_page() {
        let paginator = Paginator::new(0, 10);
        let page = page_of(&paginator, &[], Some("5"));

        assert_eq!(paginator.num_pages(), 1);
        assert_eq!(page.number, 1);
        assert!(page.object_list.is_empty());
        assert!(!page.has_next);
        assert!(!page.has_previous);
    }

    #[test]
    fn test_exact_multiple_has_no_trailing_page() {
        let paginator = Paginator::new(20, 10);
        assert_eq!(paginator.num_pages(), 2);
        assert_eq!(paginator.offset(2), 10);
    }
}
