use serde::{Deserialize, Serialize};

use crate::error::QueryError;

/// Extra rows past `offset` fetched when an offset comes without a limit.
/// The resulting window is `[offset, offset + DEFAULT_PAGE_SPAN]`, 51 rows.
pub const DEFAULT_PAGE_SPAN: u64 = 50;

/// Ordering for a query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBy {
    pub column: String,
    #[serde(default = "default_true")]
    pub ascending: bool,
}

fn default_true() -> bool {
    true
}

impl OrderBy {
    pub fn asc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            ascending: true,
        }
    }

    pub fn desc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            ascending: false,
        }
    }
}

/// Pagination, ordering, projection and count options.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryOptions {
    #[serde(default)]
    pub limit: Option<u64>,
    #[serde(default)]
    pub offset: Option<u64>,
    #[serde(default)]
    pub order_by: Option<OrderBy>,
    /// Projection. `None` selects every column.
    #[serde(default)]
    pub columns: Option<Vec<String>>,
    /// Request an exact row count alongside the data.
    #[serde(default)]
    pub count: bool,
}

impl QueryOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn limit(mut self, n: u64) -> Self {
        self.limit = Some(n);
        self
    }

    pub fn offset(mut self, n: u64) -> Self {
        self.offset = Some(n);
        self
    }

    pub fn order_by(mut self, column: impl Into<String>, ascending: bool) -> Self {
        self.order_by = Some(OrderBy {
            column: column.into(),
            ascending,
        });
        self
    }

    pub fn columns<I, S>(mut self, cols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns = Some(cols.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_count(mut self) -> Self {
        self.count = true;
        self
    }

    /// The `select` list: the projected columns joined by commas, or `*`.
    pub fn projection(&self) -> String {
        match &self.columns {
            Some(cols) if !cols.is_empty() => cols.join(","),
            _ => "*".to_string(),
        }
    }

    /// Inclusive row window derived from `offset`/`limit`, if any.
    ///
    /// The end of the window saturates at `u64::MAX`.
    pub fn range(&self) -> Option<(u64, u64)> {
        match (self.offset, self.limit) {
            (Some(offset), Some(limit)) => {
                Some((offset, offset.saturating_add(limit.saturating_sub(1))))
            }
            (Some(offset), None) => Some((offset, offset.saturating_add(DEFAULT_PAGE_SPAN))),
            _ => None,
        }
    }

    pub fn validate(&self) -> Result<(), QueryError> {
        if self.limit == Some(0) {
            return Err(QueryError::validation("limit must be a positive integer"));
        }
        if let Some(order) = &self.order_by {
            if order.column.trim().is_empty() {
                return Err(QueryError::validation("order column must not be empty"));
            }
        }
        if let Some(cols) = &self.columns {
            if cols.iter().any(|c| c.trim().is_empty()) {
                return Err(QueryError::validation("projected column names must not be empty"));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range_with_offset_and_limit() {
        let opts = QueryOptions::new().offset(10).limit(20);
        assert_eq!(opts.range(), Some((10, 29)));
    }

    #[test]
    fn test_range_with_offset_only_uses_default_window() {
        let opts = QueryOptions::new().offset(10);
        assert_eq!(opts.range(), Some((10, 60)));
    }

    #[test]
    fn test_range_saturates_near_u64_max() {
        assert_eq!(
            QueryOptions::new().offset(u64::MAX).range(),
            Some((u64::MAX, u64::MAX))
        );
        assert_eq!(
            QueryOptions::new().offset(u64::MAX - 1).limit(5).range(),
            Some((u64::MAX - 1, u64::MAX))
        );
        assert_eq!(
            QueryOptions::new().offset(u64::MAX - 60).range(),
            Some((u64::MAX - 60, u64::MAX - 10))
        );
    }

    #[test]
    fn test_limit_alone_has_no_range() {
        assert_eq!(QueryOptions::new().limit(5).range(), None);
    }

    #[test]
    fn test_projection() {
        assert_eq!(QueryOptions::new().projection(), "*");
        assert_eq!(QueryOptions::new().columns(["id", "name"]).projection(), "id,name");
    }

    #[test]
    fn test_zero_limit_rejected() {
        assert!(QueryOptions::new().limit(0).validate().is_err());
        assert!(QueryOptions::new().limit(1).validate().is_ok());
    }

    #[test]
    fn test_deserialize_camel_case() {
        let opts: QueryOptions =
            serde_json::from_str(r#"{"limit":5,"orderBy":{"column":"id"},"count":true}"#).unwrap();
        assert_eq!(opts.limit, Some(5));
        assert_eq!(opts.order_by, Some(OrderBy::asc("id")));
        assert!(opts.count);
    }
}
