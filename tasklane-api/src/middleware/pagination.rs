/// Page/limit query parameters and the list envelope
///
/// ```text
/// GET /v1/projects?page=2&limit=50
/// { "items": [...], "total": 134, "page": 2, "limit": 50 }
/// ```

use serde::{Deserialize, Serialize};

pub const DEFAULT_LIMIT: u32 = 20;
pub const MAX_LIMIT: u32 = 100;

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct PageParams {
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

impl PageParams {
    /// 1-based page, at least 1
    pub fn page(&self) -> u32 {
        self.page.unwrap_or(1).max(1)
    }

    /// Page size clamped to 1..=100
    pub fn limit(&self) -> u32 {
        self.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)
    }

    pub fn offset(&self) -> i64 {
        i64::from(self.page() - 1) * i64::from(self.limit())
    }

    pub fn sql_limit(&self) -> i64 {
        i64::from(self.limit())
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Paginated<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: u32,
    pub limit: u32,
}

impl<T> Paginated<T> {
    pub fn new(items: Vec<T>, total: i64, params: &PageParams) -> Self {
        Self {
            items,
            total,
            page: params.page(),
            limit: params.limit(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(page: Option<u32>, limit: Option<u32>) -> PageParams {
        PageParams { page, limit }
    }

    #[test]
    fn test_defaults() {
        let p = params(None, None);
        assert_eq!((p.page(), p.limit(), p.offset()), (1, 20, 0));
    }

    #[test]
    fn test_clamping() {
        assert_eq!(params(Some(0), Some(0)).page(), 1);
        assert_eq!(params(Some(0), Some(0)).limit(), 1);
        assert_eq!(params(None, Some(1000)).limit(), MAX_LIMIT);
    }

    #[test]
    fn test_offset() {
        assert_eq!(params(Some(3), Some(25)).offset(), 50);
    }

    #[test]
    fn test_envelope_shape() {
        let page = Paginated::new(vec![1, 2], 12, &params(Some(2), Some(2)));
        let json = serde_json::to_value(&page).unwrap();
        assert_eq!(json, serde_json::json!({"items": [1, 2], "total": 12, "page": 2, "limit": 2}));
    }
}
