use serde::{Deserialize, Serialize};

/// A row as returned by the backend when no typed row is requested.
pub type Row = serde_json::Map<String, serde_json::Value>;

/// A single filter value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl Scalar {
    pub fn is_null(&self) -> bool {
        matches!(self, Scalar::Null)
    }

    /// Infer a scalar from user-typed text: `null`, `true`, `false`, numbers,
    /// everything else stays text.
    pub fn infer(raw: &str) -> Self {
        match raw {
            "null" => Scalar::Null,
            "true" => Scalar::Bool(true),
            "false" => Scalar::Bool(false),
            _ => {
                if let Ok(n) = raw.parse::<i64>() {
                    Scalar::Int(n)
                } else if let Ok(f) = raw.parse::<f64>() {
                    if f.is_finite() {
                        Scalar::Float(f)
                    } else {
                        Scalar::Text(raw.to_string())
                    }
                } else {
                    Scalar::Text(raw.to_string())
                }
            }
        }
    }
}

impl std::fmt::Display for Scalar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Scalar::Null => write!(f, "null"),
            Scalar::Bool(b) => write!(f, "{}", b),
            Scalar::Int(n) => write!(f, "{}", n),
            Scalar::Float(n) => write!(f, "{}", n),
            Scalar::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<bool> for Scalar {
    fn from(b: bool) -> Self {
        Scalar::Bool(b)
    }
}

impl From<i32> for Scalar {
    fn from(n: i32) -> Self {
        Scalar::Int(n as i64)
    }
}

impl From<i64> for Scalar {
    fn from(n: i64) -> Self {
        Scalar::Int(n)
    }
}

impl From<f64> for Scalar {
    fn from(n: f64) -> Self {
        Scalar::Float(n)
    }
}

impl From<&str> for Scalar {
    fn from(s: &str) -> Self {
        Scalar::Text(s.to_string())
    }
}

impl From<String> for Scalar {
    fn from(s: String) -> Self {
        Scalar::Text(s)
    }
}

impl<T: Into<Scalar>> From<Option<T>> for Scalar {
    fn from(opt: Option<T>) -> Self {
        opt.map(Into::into).unwrap_or(Scalar::Null)
    }
}

/// The right hand side of a filter clause: one scalar, or a list for `in`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    List(Vec<Scalar>),
    Scalar(Scalar),
}

impl FilterValue {
    pub fn as_scalar(&self) -> Option<&Scalar> {
        match self {
            FilterValue::Scalar(v) => Some(v),
            FilterValue::List(_) => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Scalar]> {
        match self {
            FilterValue::List(items) => Some(items),
            FilterValue::Scalar(_) => None,
        }
    }
}

impl std::fmt::Display for FilterValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FilterValue::Scalar(v) => write!(f, "{}", v),
            FilterValue::List(items) => {
                write!(f, "(")?;
                for (i, v) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{}", v)?;
                }
                write!(f, ")")
            }
        }
    }
}

impl From<Scalar> for FilterValue {
    fn from(v: Scalar) -> Self {
        FilterValue::Scalar(v)
    }
}

macro_rules! scalar_filter_value {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for FilterValue {
                fn from(v: $ty) -> Self {
                    FilterValue::Scalar(v.into())
                }
            }
        )*
    };
}

scalar_filter_value!(bool, i32, i64, f64, &str, String);

impl<T: Into<Scalar>> From<Vec<T>> for FilterValue {
    fn from(items: Vec<T>) -> Self {
        FilterValue::List(items.into_iter().map(Into::into).collect())
    }
}
