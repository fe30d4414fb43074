use serde::{Deserialize, Serialize};

pub const DEFAULT_PER_PAGE: i64 = 10;
pub const MAX_PER_PAGE: i64 = 100;

/// Query parameters shared by every list endpoint.
///
/// Out-of-range values are clamped rather than rejected: `page` is floored at
/// 1 and `per_page` is clamped to 1..=100, defaulting to 10.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct PaginationParams {
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

impl PaginationParams {
    pub fn page(&self) -> i64 {
        self.page.unwrap_or(1).max(1)
    }

    pub fn per_page(&self) -> i64 {
        self.per_page
            .unwrap_or(DEFAULT_PER_PAGE)
            .clamp(1, MAX_PER_PAGE)
    }
}

#[derive(Debug, Serialize)]
pub struct PageMeta {
    pub page: i64,
    pub limit: i64,
    pub total: i64,
    #[serde(rename = "totalPages")]
    pub total_pages: i64,
}

/// List response envelope: `{data, pagination: {page, limit, total, totalPages}}`.
#[derive(Debug, Serialize)]
pub struct Paginated<T> {
    pub data: Vec<T>,
    pub pagination: PageMeta,
}

impl<T> Paginated<T> {
    pub fn new(data: Vec<T>, params: &PaginationParams, total: i64) -> Self {
        let page = params.page();
        let limit = params.per_page();
        let total_pages = if total == 0 {
            0
        } else {
            (total + limit - 1) / limit
        };
        Paginated {
            data,
            pagination: PageMeta {
                page,
                limit,
                total,
                total_pages,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(page: Option<i64>, per_page: Option<i64>) -> PaginationParams {
        PaginationParams { page, per_page }
    }

    #[test]
    fn test_defaults() {
        let p = params(None, None);
        assert_eq!(p.page(), 1);
        assert_eq!(p.per_page(), DEFAULT_PER_PAGE);
    }

    #[test]
    fn test_page_floored_at_one() {
        assert_eq!(params(Some(0), None).page(), 1);
        assert_eq!(params(Some(-3), None).page(), 1);
        assert_eq!(params(Some(7), None).page(), 7);
    }

    #[test]
    fn test_per_page_clamped() {
        assert_eq!(params(None, Some(0)).per_page(), 1);
        assert_eq!(params(None, Some(500)).per_page(), MAX_PER_PAGE);
        assert_eq!(params(None, Some(25)).per_page(), 25);
    }

    #[test]
    fn test_total_pages_rounds_up() {
        let page = Paginated::new(vec![1, 2, 3], &params(Some(1), Some(10)), 21);
        assert_eq!(page.pagination.total_pages, 3);
        assert_eq!(page.pagination.total, 21);
        assert_eq!(page.pagination.limit, 10);
    }

    #[test]
    fn test_total_pages_exact_multiple() {
        let page = Paginated::<i32>::new(vec![], &params(Some(2), Some(10)), 20);
        assert_eq!(page.pagination.total_pages, 2);
    }

    #[test]
    fn test_empty_result_has_zero_pages() {
        let page = Paginated::<i32>::new(vec![], &params(None, None), 0);
        assert_eq!(page.pagination.total_pages, 0);
        assert_eq!(page.pagination.total, 0);
    }

    #[test]
    fn test_envelope_field_names() {
        let page = Paginated::new(vec!["a"], &params(None, None), 1);
        let json = serde_json::to_value(&page).unwrap();
        assert_eq!(json["pagination"]["totalPages"], 1);
        assert_eq!(json["pagination"]["limit"], DEFAULT_PER_PAGE);
        assert_eq!(json["data"][0], "a");
    }
}
