use serde::{Deserialize, Serialize};

pub mod conversation;
pub mod event;
pub mod user;

#[inline]
const fn default_offset() -> i64 {
    0
}

#[inline]
const fn default_limit() -> i64 {
    50
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Pagination {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default = "default_offset")]
    pub page: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PaginatedResponse<T> {
    pub items: Vec<T>,
    pub page: i64,
    pub total_items: i64,
    pub total_pages: i64,
    #[serde(default = "default_limit")]
    pub page_size: i64,
}

impl<T> PaginatedResponse<T> {
    pub fn new(items: Vec<T>, total_items: i64, page_size: i64, page: i64) -> Self {
        let total_pages = (total_items as f64 / page_size as f64).ceil() as i64;
        Self {
            items,
            page,
            page_size,
            total_items,
            total_pages,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_total_pages_rounds_up() {
        let page = PaginatedResponse::new(vec![1, 2, 3], 11, 5, 0);
        assert_eq!(page.total_pages, 3);
    }
}
