use serde::{Deserialize, Serialize};

use crate::ast::{FilterOperator, FilterValue, Scalar};
use crate::error::QueryError;

/// A single column/operator/value predicate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterClause {
    pub column: String,
    pub operator: FilterOperator,
    pub value: FilterValue,
}

impl FilterClause {
    pub fn new(
        column: impl Into<String>,
        operator: impl Into<FilterOperator>,
        value: impl Into<FilterValue>,
    ) -> Self {
        Self {
            column: column.into(),
            operator: operator.into(),
            value: value.into(),
        }
    }

    pub fn eq(column: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        Self::new(column, FilterOperator::Eq, value)
    }

    pub fn is_in(column: impl Into<String>, values: impl Into<FilterValue>) -> Self {
        Self::new(column, FilterOperator::In, values)
    }

    /// Check the clause shape: a non-empty column, a list for `in`, a single
    /// scalar otherwise, and only `null`/`true`/`false` for `is`.
    ///
    /// Unknown operators are accepted; the builder skips them.
    pub fn validate(&self) -> Result<(), QueryError> {
        if self.column.trim().is_empty() {
            return Err(QueryError::validation(format!(
                "filter column must not be empty (operator '{}')",
                self.operator
            )));
        }

        match (&self.operator, &self.value) {
            (FilterOperator::Unknown(_), _) => Ok(()),
            (FilterOperator::In, FilterValue::List(_)) => Ok(()),
            (FilterOperator::In, FilterValue::Scalar(_)) => Err(QueryError::validation(format!(
                "operator 'in' on '{}' requires a list of values",
                self.column
            ))),
            (op, FilterValue::List(_)) => Err(QueryError::validation(format!(
                "operator '{}' on '{}' requires a single value",
                op, self.column
            ))),
            (FilterOperator::Is, FilterValue::Scalar(Scalar::Null | Scalar::Bool(_))) => Ok(()),
            (FilterOperator::Is, FilterValue::Scalar(other)) => Err(QueryError::validation(format!(
                "operator 'is' on '{}' accepts only null, true or false (got '{}')",
                self.column, other
            ))),
            (_, FilterValue::Scalar(_)) => Ok(()),
        }
    }
}

impl std::fmt::Display for FilterClause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} {}", self.column, self.operator, self.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_valid_shapes() {
        assert!(FilterClause::eq("status", "active").validate().is_ok());
        assert!(FilterClause::is_in("status", vec!["a", "b"]).validate().is_ok());
        assert!(FilterClause::new("deleted_at", "is", Scalar::Null).validate().is_ok());
        assert!(FilterClause::new("x", "cs", vec![1, 2]).validate().is_ok());
    }

    #[test]
    fn test_in_requires_list() {
        let err = FilterClause::is_in("status", "a").validate().unwrap_err();
        assert_eq!(err.kind, ErrorKind::Validation);
        assert!(err.message.contains("requires a list"));
    }

    #[test]
    fn test_single_value_operator_rejects_list() {
        let err = FilterClause::new("age", "gte", vec![1, 2]).validate().unwrap_err();
        assert!(err.message.contains("requires a single value"));
    }

    #[test]
    fn test_empty_column_rejected() {
        let err = FilterClause::eq("  ", 1).validate().unwrap_err();
        assert!(err.message.contains("must not be empty"));
    }

    #[test]
    fn test_is_accepts_only_null_and_bools() {
        assert!(FilterClause::new("flag", "is", true).validate().is_ok());
        assert!(FilterClause::new("flag", "is", "maybe").validate().is_err());
    }

    #[test]
    fn test_deserialize_from_json() {
        let clause: FilterClause =
            serde_json::from_str(r#"{"column":"status","operator":"in","value":["a","b"]}"#).unwrap();
        assert_eq!(clause, FilterClause::is_in("status", vec!["a", "b"]));
    }
}
