use serde::{Deserialize, Serialize};

/// Filter operators understood by the query builder.
///
/// Tokens that are not one of the ten recognized operators are kept as
/// [`FilterOperator::Unknown`]; the builder passes those through as no-ops.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum FilterOperator {
    /// Equal (=)
    Eq,
    /// Not equal (<>)
    Neq,
    /// Greater than (>)
    Gt,
    /// Greater than or equal (>=)
    Gte,
    /// Less than (<)
    Lt,
    /// Less than or equal (<=)
    Lte,
    /// LIKE pattern
    Like,
    /// ILIKE pattern (case-insensitive)
    ILike,
    /// IS null / true / false
    Is,
    /// IN set membership
    In,
    /// Anything else.
    Unknown(String),
}

impl FilterOperator {
    /// All recognized operators, in display order.
    pub const ALL: [FilterOperator; 10] = [
        FilterOperator::Eq,
        FilterOperator::Neq,
        FilterOperator::Gt,
        FilterOperator::Gte,
        FilterOperator::Lt,
        FilterOperator::Lte,
        FilterOperator::Like,
        FilterOperator::ILike,
        FilterOperator::Is,
        FilterOperator::In,
    ];

    /// Map a token to an operator. Never fails: unrecognized tokens become
    /// [`FilterOperator::Unknown`].
    pub fn from_token(token: &str) -> Self {
        match token {
            "eq" => FilterOperator::Eq,
            "neq" => FilterOperator::Neq,
            "gt" => FilterOperator::Gt,
            "gte" => FilterOperator::Gte,
            "lt" => FilterOperator::Lt,
            "lte" => FilterOperator::Lte,
            "like" => FilterOperator::Like,
            "ilike" => FilterOperator::ILike,
            "is" => FilterOperator::Is,
            "in" => FilterOperator::In,
            other => FilterOperator::Unknown(other.to_string()),
        }
    }

    /// The lowercase token, as used in the PostgREST query grammar.
    pub fn token(&self) -> &str {
        match self {
            FilterOperator::Eq => "eq",
            FilterOperator::Neq => "neq",
            FilterOperator::Gt => "gt",
            FilterOperator::Gte => "gte",
            FilterOperator::Lt => "lt",
            FilterOperator::Lte => "lte",
            FilterOperator::Like => "like",
            FilterOperator::ILike => "ilike",
            FilterOperator::Is => "is",
            FilterOperator::In => "in",
            FilterOperator::Unknown(token) => token,
        }
    }

    /// SQL spelling for the Postgres backend. `None` for unknown tokens.
    pub fn sql(&self) -> Option<&'static str> {
        match self {
            FilterOperator::Eq => Some("="),
            FilterOperator::Neq => Some("<>"),
            FilterOperator::Gt => Some(">"),
            FilterOperator::Gte => Some(">="),
            FilterOperator::Lt => Some("<"),
            FilterOperator::Lte => Some("<="),
            FilterOperator::Like => Some("LIKE"),
            FilterOperator::ILike => Some("ILIKE"),
            FilterOperator::Is => Some("IS"),
            FilterOperator::In => Some("IN"),
            FilterOperator::Unknown(_) => None,
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, FilterOperator::Unknown(_))
    }

    /// `in` is the only operator taking a sequence of values.
    pub fn takes_list(&self) -> bool {
        matches!(self, FilterOperator::In)
    }
}

impl std::fmt::Display for FilterOperator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.token())
    }
}

impl From<&str> for FilterOperator {
    fn from(token: &str) -> Self {
        FilterOperator::from_token(token)
    }
}

impl From<String> for FilterOperator {
    fn from(token: String) -> Self {
        FilterOperator::from_token(&token)
    }
}

impl From<FilterOperator> for String {
    fn from(op: FilterOperator) -> Self {
        op.token().to_string()
    }
}
