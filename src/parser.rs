//! Filter and order expression parser using nom.
//!
//! # Syntax Overview
//!
//! ```text
//! age >= 18
//! status in (active, "on hold")
//! deleted_at is null
//! name ilike '%smith%'
//! created_at.desc
//! ```
//!
//! A filter is `<column> <operator> <value>`. The operator is a token
//! (`eq`, `ilike`, ...) or one of the symbols `=`, `!=`, `<>`, `>`, `>=`,
//! `<`, `<=`. Unquoted values are inferred (`null`, `true`, `false`,
//! numbers, text); quoted values are always text.

use nom::{
    IResult,
    branch::alt,
    bytes::complete::{tag, tag_no_case, take_while, take_while1},
    character::complete::{alpha1, char, multispace0, multispace1},
    combinator::{map, opt, rest, value, verify},
    multi::{separated_list0, separated_list1},
    sequence::{delimited, preceded},
};

use crate::ast::{FilterClause, FilterOperator, FilterValue, OrderBy, Scalar};
use crate::error::{RowlensError, RowlensResult};

/// Parse one filter expression.
pub fn parse_filter(input: &str) -> RowlensResult<FilterClause> {
    let (rest, column) = preceded(multispace0, parse_identifier)(input)
        .map_err(|e| stage_error(input, e, "expected a column name"))?;
    let (rest, operator) = preceded(multispace0, parse_operator)(rest)
        .map_err(|e| stage_error(input, e, "expected an operator"))?;

    let (rest, value) = if operator.takes_list() {
        preceded(multispace0, map(parse_list, FilterValue::List))(rest)
            .map_err(|e| stage_error(input, e, "expected a comma separated list"))?
    } else {
        preceded(multispace0, map(parse_scalar, FilterValue::Scalar))(rest)
            .map_err(|e| stage_error(input, e, "expected a value"))?
    };

    expect_end(input, rest)?;
    Ok(FilterClause {
        column: column.to_string(),
        operator,
        value,
    })
}

/// Parse several filter expressions, failing on the first bad one.
pub fn parse_filters<S: AsRef<str>>(inputs: &[S]) -> RowlensResult<Vec<FilterClause>> {
    inputs.iter().map(|s| parse_filter(s.as_ref())).collect()
}

/// Parse an order spec: `column`, `column.asc`, `column.desc` or
/// `column desc`.
pub fn parse_order(input: &str) -> RowlensResult<OrderBy> {
    let (rest, column) = preceded(multispace0, parse_identifier)(input)
        .map_err(|e| stage_error(input, e, "expected a column name"))?;
    let (rest, ascending) = opt(preceded(alt((tag("."), multispace1)), parse_direction))(rest)
        .map_err(|e| stage_error(input, e, "expected asc or desc"))?;

    expect_end(input, rest)?;
    Ok(OrderBy {
        column: column.to_string(),
        ascending: ascending.unwrap_or(true),
    })
}

fn expect_end(input: &str, rest: &str) -> RowlensResult<()> {
    let rest = rest.trim_start();
    if rest.is_empty() {
        Ok(())
    } else {
        Err(RowlensError::parse(
            input.len() - rest.len(),
            format!("unexpected trailing input '{}'", rest),
        ))
    }
}

fn stage_error(input: &str, err: nom::Err<nom::error::Error<&str>>, expected: &str) -> RowlensError {
    let position = match &err {
        nom::Err::Error(e) | nom::Err::Failure(e) => input.len() - e.input.len(),
        nom::Err::Incomplete(_) => input.len(),
    };
    RowlensError::parse(position, expected)
}

/// Parse an identifier (column name).
fn parse_identifier(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| c.is_alphanumeric() || c == '_')(input)
}

fn parse_operator(input: &str) -> IResult<&str, FilterOperator> {
    alt((
        value(FilterOperator::Gte, tag(">=")),
        value(FilterOperator::Lte, tag("<=")),
        value(FilterOperator::Neq, tag("!=")),
        value(FilterOperator::Neq, tag("<>")),
        value(FilterOperator::Gt, char('>')),
        value(FilterOperator::Lt, char('<')),
        value(FilterOperator::Eq, char('=')),
        map(alpha1, |token: &str| {
            FilterOperator::from_token(&token.to_ascii_lowercase())
        }),
    ))(input)
}

fn parse_direction(input: &str) -> IResult<&str, bool> {
    alt((
        value(true, tag_no_case("asc")),
        value(false, tag_no_case("desc")),
    ))(input)
}

/// A single value: quoted text, or the rest of the input inferred.
fn parse_scalar(input: &str) -> IResult<&str, Scalar> {
    alt((
        map(parse_quoted, Scalar::Text),
        map(verify(rest, |s: &str| !s.trim().is_empty()), |s: &str| {
            Scalar::infer(s.trim_end())
        }),
    ))(input)
}

/// `a, b, c` or `(a, b, c)`. Only the parenthesised form may be empty.
fn parse_list(input: &str) -> IResult<&str, Vec<Scalar>> {
    alt((
        delimited(
            char('('),
            separated_list0(char(','), delimited(multispace0, parse_list_item, multispace0)),
            preceded(multispace0, char(')')),
        ),
        separated_list1(char(','), delimited(multispace0, parse_list_item, multispace0)),
    ))(input)
}

fn parse_list_item(input: &str) -> IResult<&str, Scalar> {
    alt((
        map(parse_quoted, Scalar::Text),
        map(take_while1(|c: char| c != ',' && c != ')'), |s: &str| {
            Scalar::infer(s.trim())
        }),
    ))(input)
}

/// Parse a single or double quoted string.
fn parse_quoted(input: &str) -> IResult<&str, String> {
    map(
        alt((
            delimited(char('\''), take_while(|c| c != '\''), char('\'')),
            delimited(char('"'), take_while(|c| c != '"'), char('"')),
        )),
        |s: &str| s.to_string(),
    )(input)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_symbol_operator() {
        let clause = parse_filter("age >= 18").unwrap();
        assert_eq!(clause, FilterClause::new("age", FilterOperator::Gte, 18));
        assert_eq!(parse_filter("age>=18").unwrap(), clause);
    }

    #[test]
    fn test_word_operator_and_quoted_text() {
        let clause = parse_filter("name ilike '%smith%'").unwrap();
        assert_eq!(clause.operator, FilterOperator::ILike);
        assert_eq!(clause.value, FilterValue::from("%smith%"));
    }

    #[test]
    fn test_quoted_number_stays_text() {
        let clause = parse_filter("zip = \"02134\"").unwrap();
        assert_eq!(clause.value, FilterValue::from("02134"));
        let clause = parse_filter("zip = 02134").unwrap();
        assert_eq!(clause.value, FilterValue::from(2134));
    }

    #[test]
    fn test_bare_value_keeps_inner_spaces() {
        let clause = parse_filter("city eq New York  ").unwrap();
        assert_eq!(clause.value, FilterValue::from("New York"));
    }

    #[test]
    fn test_is_null() {
        let clause = parse_filter("deleted_at is null").unwrap();
        assert_eq!(clause.operator, FilterOperator::Is);
        assert_eq!(clause.value, FilterValue::Scalar(Scalar::Null));
    }

    #[test]
    fn test_in_list_forms() {
        let expected = FilterValue::List(vec![
            Scalar::from("active"),
            Scalar::from("on hold"),
            Scalar::Int(3),
        ]);
        assert_eq!(parse_filter("status in (active, \"on hold\", 3)").unwrap().value, expected);
        assert_eq!(parse_filter("status IN active,'on hold',3").unwrap().value, expected);
        assert_eq!(parse_filter("status in ()").unwrap().value, FilterValue::List(vec![]));
    }

    #[test]
    fn test_unknown_operator_is_kept() {
        let clause = parse_filter("tags cs {a,b}").unwrap();
        assert_eq!(clause.operator, FilterOperator::Unknown("cs".into()));
        assert_eq!(clause.value, FilterValue::from("{a,b}"));
    }

    #[test]
    fn test_error_positions() {
        match parse_filter("= 5") {
            Err(RowlensError::Parse { position, .. }) => assert_eq!(position, 0),
            other => panic!("expected parse error, got {:?}", other),
        }
        match parse_filter("age ?? 5") {
            Err(RowlensError::Parse { position, message }) => {
                assert_eq!(position, 4);
                assert_eq!(message, "expected an operator");
            }
            other => panic!("expected parse error, got {:?}", other),
        }
        match parse_filter("name = 'bob' extra") {
            Err(RowlensError::Parse { position, .. }) => assert_eq!(position, 13),
            other => panic!("expected parse error, got {:?}", other),
        }
        assert!(parse_filter("age >=").is_err());
    }

    #[test]
    fn test_parse_filters_collects() {
        let clauses = parse_filters(&["a = 1", "b != x"]).unwrap();
        assert_eq!(clauses.len(), 2);
        assert_eq!(clauses[1].operator, FilterOperator::Neq);
        assert!(parse_filters(&["a = 1", "oops"]).is_err());
    }

    #[test]
    fn test_parse_order() {
        assert_eq!(parse_order("id.desc").unwrap(), OrderBy::desc("id"));
        assert_eq!(parse_order("created_at").unwrap(), OrderBy::asc("created_at"));
        assert_eq!(parse_order("name ASC").unwrap(), OrderBy::asc("name"));
        assert!(parse_order("id.sideways").is_err());
    }
}
