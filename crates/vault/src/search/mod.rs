//! Search query parsing and SQL lowering
//!
//! [`parse_query`] turns a Gmail-style search string into a structured
//! [`Query`]; [`sql`] lowers a [`Query`] into predicates and bound
//! arguments for either backend.

mod parser;
mod query;
pub(crate) mod sql;

pub use parser::parse_query;
pub use query::{Query, merge_filter_into_query};
pub use sql::escape_like;
