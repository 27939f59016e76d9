//! Offset pagination shared by list endpoints.

use serde::Deserialize;

pub const DEFAULT_LIMIT: u32 = 100;
pub const MAX_LIMIT: u32 = 1000;

/// Raw `skip`/`limit` query parameters.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct PageParams {
    pub skip: Option<u32>,
    pub limit: Option<u32>,
}

/// A normalized offset window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub skip: u32,
    pub limit: u32,
}

impl PageRequest {
    /// Limit is clamped to `1..=MAX_LIMIT`.
    pub fn new(skip: u32, limit: u32) -> Self {
        Self {
            skip,
            limit: limit.clamp(1, MAX_LIMIT),
        }
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(0, DEFAULT_LIMIT)
    }
}

impl From<PageParams> for PageRequest {
    fn from(params: PageParams) -> Self {
        Self::new(
            params.skip.unwrap_or(0),
            params.limit.unwrap_or(DEFAULT_LIMIT),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_to_missing_params() {
        let page = PageRequest::from(PageParams::default());
        assert_eq!(page, PageRequest { skip: 0, limit: 100 });
    }

    #[test]
    fn limit_is_clamped() {
        assert_eq!(PageRequest::new(5, 0).limit, 1);
        assert_eq!(PageRequest::new(5, 50_000).limit, MAX_LIMIT);
        assert_eq!(PageRequest::new(5, 20).skip, 5);
    }
}
