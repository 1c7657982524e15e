use serde::Serialize;

/// Default page number
pub const DEFAULT_PAGE: u32 = 1;

/// Default page length
pub const DEFAULT_LIMIT: u32 = 10;

/// 1-based page request. Both fields are at least 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    page: u32,
    limit: u32,
}

impl PageRequest {
    /// Create a request, clamping `page` and `limit` to at least 1.
    pub fn new(page: u32, limit: u32) -> Self {
        Self {
            page: page.max(1),
            limit: limit.max(1),
        }
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    /// Index of the first item on this page.
    pub fn offset(&self) -> usize {
        (self.page as usize - 1).saturating_mul(self.limit as usize)
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(DEFAULT_PAGE, DEFAULT_LIMIT)
    }
}

/// Pagination block of a list response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
    pub total: usize,
    pub total_pages: usize,
    pub has_more: bool,
}

/// Slice `items` to the requested page.
pub fn paginate<T>(items: Vec<T>, request: PageRequest) -> (Vec<T>, Pagination) {
    let total = items.len();
    let limit = request.limit() as usize;
    let offset = request.offset();

    let slice: Vec<T> = items.into_iter().skip(offset).take(limit).collect();
    let end = offset.saturating_add(slice.len());

    let pagination = Pagination {
        page: request.page(),
        limit: request.limit(),
        total,
        total_pages: total.div_ceil(limit),
        has_more: end < total,
    };

    (slice, pagination)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamps_to_one() {
        let request = PageRequest::new(0, 0);
        assert_eq!(request.page(), 1);
        assert_eq!(request.limit(), 1);
        assert_eq!(request.offset(), 0);
    }

    #[test]
    fn test_second_page_of_twenty_five() {
        let (items, pagination) = paginate((0..25).collect::<Vec<_>>(), PageRequest::new(2, 10));

        assert_eq!(items, (10..20).collect::<Vec<_>>());
        assert_eq!(pagination.total, 25);
        assert_eq!(pagination.total_pages, 3);
        assert!(pagination.has_more);
    }

    #[test]
    fn test_last_and_past_last_page() {
        let (items, pagination) = paginate((0..25).collect::<Vec<_>>(), PageRequest::new(3, 10));
        assert_eq!(items.len(), 5);
        assert!(!pagination.has_more);

        let (items, pagination) = paginate((0..25).collect::<Vec<_>>(), PageRequest::new(7, 10));
        assert!(items.is_empty());
        assert!(!pagination.has_more);
    }

    #[test]
    fn test_length_and_has_more_hold_for_all_pages() {
        for total in [0usize, 1, 9, 10, 11, 37] {
            for limit in 1..=12u32 {
                for page in 1..=8u32 {
                    let (items, p) = paginate(vec![(); total], PageRequest::new(page, limit));
                    let start = (page as usize - 1) * limit as usize;
                    let expected = total.saturating_sub(start).min(limit as usize);

                    assert_eq!(items.len(), expected);
                    assert_eq!(p.has_more, start + items.len() < total);
                }
            }
        }
    }

    #[test]
    fn test_serializes_camel_case() {
        let (_, pagination) = paginate(vec![1, 2, 3], PageRequest::new(1, 2));
        let json = serde_json::to_value(pagination).unwrap();
        assert_eq!(json["totalPages"], 2);
        assert_eq!(json["hasMore"], true);
    }
}
