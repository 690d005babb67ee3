//! Query model: filters, values and options.
//!
//! These are plain values. Nothing here checks a clause when it is built;
//! [`FilterClause::validate`] and [`QueryOptions::validate`] run when a query
//! is about to be constructed.

pub mod filter;
pub mod operators;
pub mod options;
pub mod values;

pub use filter::FilterClause;
pub use operators::FilterOperator;
pub use options::{DEFAULT_PAGE_SPAN, OrderBy, QueryOptions};
pub use values::{FilterValue, Row, Scalar};
