//! JPQL string assembly.

mod jpql;
mod query;

pub use jpql::{JoinKind, Jpql};
pub use query::QuerySpec;
