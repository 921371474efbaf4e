//! Operation pipeline → query AST
//!
//! Walks a pipeline bottom-up and emits one query layer per operation,
//! translating expressions through an [`ExpressionOracle`] for a target
//! [`Dialect`]. Window functions in filters are hoisted into a helper layer
//! and join column clashes are resolved with suffixes before the join node
//! is emitted.
//!
//! ```ignore
//! let pipeline = Operation::remote("t", ["a", "b"])
//!     .select(vec![Projection::column("a")])
//!     .filter(vec![Expr::col("a").gt(Expr::int(1))]);
//! let query = sqlplan_builder::build(&pipeline, &Dialect::ansi())?;
//! ```

mod builder;
mod error;
pub mod oracle;

pub use builder::QueryBuilder;
pub use error::BuildError;
pub use oracle::{
    partial_eval, Clause, ExpressionOracle, OracleError, SqlOracle, TranslateContext, TranslateError, WindowExtraction,
};

use sqlplan_ir::{Operation, Query};
use sqlplan_registry::Dialect;

/// Build with the registry-backed oracle and default join suffixes
pub fn build(pipeline: &Operation, dialect: &Dialect) -> Result<Query, BuildError> {
    QueryBuilder::new(&SqlOracle, dialect).build(pipeline)
}
