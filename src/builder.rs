//! Query builder.
//!
//! Translates an ordered list of [`FilterClause`]s and a [`QueryOptions`]
//! into calls on a backend query handle. The handle is threaded through by
//! value: every application returns the next handle state and nothing is
//! sent until the handle is executed.

use tracing::{debug, warn};

use crate::ast::{FilterClause, FilterOperator, FilterValue, QueryOptions, Scalar};
use crate::error::QueryError;

/// The capability set the builder needs from a backend query handle.
pub trait FilterableQuery: Sized {
    fn eq(self, column: &str, value: &Scalar) -> Self;
    fn neq(self, column: &str, value: &Scalar) -> Self;
    fn gt(self, column: &str, value: &Scalar) -> Self;
    fn gte(self, column: &str, value: &Scalar) -> Self;
    fn lt(self, column: &str, value: &Scalar) -> Self;
    fn lte(self, column: &str, value: &Scalar) -> Self;
    fn like(self, column: &str, pattern: &Scalar) -> Self;
    fn ilike(self, column: &str, pattern: &Scalar) -> Self;
    fn is(self, column: &str, value: &Scalar) -> Self;
    /// Set membership (`in`).
    fn in_list(self, column: &str, values: &[Scalar]) -> Self;

    fn order(self, column: &str, ascending: bool) -> Self;
    fn limit(self, n: u64) -> Self;
    /// Inclusive zero-based row window.
    fn range(self, from: u64, to: u64) -> Self;
}

/// Apply filters in the order given.
///
/// Unknown operators leave the handle unchanged. A scalar given to `in` is
/// treated as a one-element set; a list given to a single-value operator is
/// skipped. Run [`validate_filters`] first to reject those shapes instead.
pub fn apply_filters<Q: FilterableQuery>(query: Q, filters: &[FilterClause]) -> Q {
    filters.iter().fold(query, apply_filter)
}

fn apply_filter<Q: FilterableQuery>(query: Q, filter: &FilterClause) -> Q {
    let column = filter.column.as_str();
    match &filter.operator {
        FilterOperator::Eq => single(query, filter, Q::eq),
        FilterOperator::Neq => single(query, filter, Q::neq),
        FilterOperator::Gt => single(query, filter, Q::gt),
        FilterOperator::Gte => single(query, filter, Q::gte),
        FilterOperator::Lt => single(query, filter, Q::lt),
        FilterOperator::Lte => single(query, filter, Q::lte),
        FilterOperator::Like => single(query, filter, Q::like),
        FilterOperator::ILike => single(query, filter, Q::ilike),
        FilterOperator::Is => single(query, filter, Q::is),
        FilterOperator::In => match &filter.value {
            FilterValue::List(values) => query.in_list(column, values),
            FilterValue::Scalar(value) => query.in_list(column, std::slice::from_ref(value)),
        },
        FilterOperator::Unknown(token) => {
            debug!(column, operator = %token, "skipping filter with unrecognized operator");
            query
        }
    }
}

fn single<Q: FilterableQuery>(
    query: Q,
    filter: &FilterClause,
    apply: fn(Q, &str, &Scalar) -> Q,
) -> Q {
    match &filter.value {
        FilterValue::Scalar(value) => apply(query, &filter.column, value),
        FilterValue::List(_) => {
            warn!(
                column = %filter.column,
                operator = %filter.operator,
                "skipping single-value filter given a list"
            );
            query
        }
    }
}

/// Apply ordering, row cap and range, in that order.
///
/// Projection and exact counting are not applied here; they are part of
/// creating the select handle.
pub fn apply_query_options<Q: FilterableQuery>(query: Q, options: &QueryOptions) -> Q {
    let mut next = query;

    if let Some(order) = &options.order_by {
        next = next.order(&order.column, order.ascending);
    }

    if let Some(limit) = options.limit {
        next = next.limit(limit);
    }

    if let Some((from, to)) = options.range() {
        next = next.range(from, to);
    }

    next
}

/// Validate every clause, returning the first failure.
pub fn validate_filters(filters: &[FilterClause]) -> Result<(), QueryError> {
    filters.iter().try_for_each(FilterClause::validate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Filter(&'static str, String, Scalar),
        In(String, Vec<Scalar>),
        Order(String, bool),
        Limit(u64),
        Range(u64, u64),
    }

    #[derive(Debug, Default, PartialEq)]
    struct Recorder {
        calls: Vec<Call>,
    }

    impl Recorder {
        fn push(mut self, call: Call) -> Self {
            self.calls.push(call);
            self
        }
    }

    impl FilterableQuery for Recorder {
        fn eq(self, c: &str, v: &Scalar) -> Self {
            self.push(Call::Filter("eq", c.into(), v.clone()))
        }
        fn neq(self, c: &str, v: &Scalar) -> Self {
            self.push(Call::Filter("neq", c.into(), v.clone()))
        }
        fn gt(self, c: &str, v: &Scalar) -> Self {
            self.push(Call::Filter("gt", c.into(), v.clone()))
        }
        fn gte(self, c: &str, v: &Scalar) -> Self {
            self.push(Call::Filter("gte", c.into(), v.clone()))
        }
        fn lt(self, c: &str, v: &Scalar) -> Self {
            self.push(Call::Filter("lt", c.into(), v.clone()))
        }
        fn lte(self, c: &str, v: &Scalar) -> Self {
            self.push(Call::Filter("lte", c.into(), v.clone()))
        }
        fn like(self, c: &str, v: &Scalar) -> Self {
            self.push(Call::Filter("like", c.into(), v.clone()))
        }
        fn ilike(self, c: &str, v: &Scalar) -> Self {
            self.push(Call::Filter("ilike", c.into(), v.clone()))
        }
        fn is(self, c: &str, v: &Scalar) -> Self {
            self.push(Call::Filter("is", c.into(), v.clone()))
        }
        fn in_list(self, c: &str, v: &[Scalar]) -> Self {
            self.push(Call::In(c.into(), v.to_vec()))
        }
        fn order(self, c: &str, ascending: bool) -> Self {
            self.push(Call::Order(c.into(), ascending))
        }
        fn limit(self, n: u64) -> Self {
            self.push(Call::Limit(n))
        }
        fn range(self, from: u64, to: u64) -> Self {
            self.push(Call::Range(from, to))
        }
    }

    #[test]
    fn test_in_uses_set_membership() {
        let q = apply_filters(
            Recorder::default(),
            &[FilterClause::is_in("status", vec!["a", "b"])],
        );
        assert_eq!(
            q.calls,
            vec![Call::In("status".into(), vec![Scalar::from("a"), Scalar::from("b")])]
        );
    }

    #[test]
    fn test_eq_uses_single_value() {
        let q = apply_filters(Recorder::default(), &[FilterClause::eq("status", "a")]);
        assert_eq!(q.calls, vec![Call::Filter("eq", "status".into(), Scalar::from("a"))]);
    }

    #[test]
    fn test_every_single_value_operator_dispatches() {
        let filters: Vec<FilterClause> = FilterOperator::ALL
            .iter()
            .filter(|op| !op.takes_list())
            .map(|op| FilterClause::new("c", op.clone(), Scalar::Null))
            .collect();
        let q = apply_filters(Recorder::default(), &filters);
        let names: Vec<&str> = q
            .calls
            .iter()
            .map(|c| match c {
                Call::Filter(name, _, _) => *name,
                other => panic!("unexpected call {:?}", other),
            })
            .collect();
        assert_eq!(names, vec!["eq", "neq", "gt", "gte", "lt", "lte", "like", "ilike", "is"]);
    }

    #[test]
    fn test_unknown_operator_is_identity() {
        let q = apply_filters(
            Recorder::default(),
            &[FilterClause::new("tags", "cs", vec!["x"])],
        );
        assert_eq!(q, Recorder::default());
        assert_eq!(apply_filters(Recorder::default(), &[]), Recorder::default());
    }

    #[test]
    fn test_filter_order_is_preserved() {
        let filters = vec![
            FilterClause::new("b", "gt", 1),
            FilterClause::new("a", "lt", 9),
        ];
        let q = apply_filters(Recorder::default(), &filters);
        assert_eq!(
            q.calls,
            vec![
                Call::Filter("gt", "b".into(), Scalar::Int(1)),
                Call::Filter("lt", "a".into(), Scalar::Int(9)),
            ]
        );
    }

    #[test]
    fn test_scalar_for_in_becomes_single_element_set() {
        let q = apply_filters(Recorder::default(), &[FilterClause::is_in("id", 4)]);
        assert_eq!(q.calls, vec![Call::In("id".into(), vec![Scalar::Int(4)])]);
    }

    #[test]
    fn test_list_for_single_value_operator_is_skipped() {
        let q = apply_filters(Recorder::default(), &[FilterClause::new("id", "eq", vec![1, 2])]);
        assert!(q.calls.is_empty());
    }

    #[test]
    fn test_offset_only_range() {
        let q = apply_query_options(Recorder::default(), &QueryOptions::new().offset(10));
        assert_eq!(q.calls, vec![Call::Range(10, 60)]);
    }

    #[test]
    fn test_offset_with_limit_range() {
        let q = apply_query_options(Recorder::default(), &QueryOptions::new().offset(10).limit(20));
        assert_eq!(q.calls, vec![Call::Limit(20), Call::Range(10, 29)]);
    }

    #[test]
    fn test_filters_then_options_sequence() {
        let filters = vec![FilterClause::new("age", "gte", 18)];
        let options = QueryOptions::new().order_by("id", false).limit(5);
        let q = apply_query_options(apply_filters(Recorder::default(), &filters), &options);
        assert_eq!(
            q.calls,
            vec![
                Call::Filter("gte", "age".into(), Scalar::Int(18)),
                Call::Order("id".into(), false),
                Call::Limit(5),
            ]
        );
    }

    #[test]
    fn test_validate_filters_reports_first_failure() {
        let filters = vec![
            FilterClause::eq("ok", 1),
            FilterClause::is_in("status", "a"),
            FilterClause::eq("", 1),
        ];
        let err = validate_filters(&filters).unwrap_err();
        assert!(err.message.contains("'in' on 'status'"));
    }
}
