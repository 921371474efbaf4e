//! Function registry and dialect capability descriptors

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

mod dialect;
pub use dialect::{Capability, Dialect};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("Function not found: {0}")]
    FunctionNotFound(String),

    #[error("Function {func} takes {expected} argument(s), got {actual}")]
    Arity {
        func: String,
        expected: String,
        actual: usize,
    },

    #[error("Unknown dialect: {0}")]
    UnknownDialect(String),
}

/// How a function evaluates over rows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FunctionKind {
    /// Row-wise
    Scalar,
    /// Collapses rows in a summary; becomes a partitioned window elsewhere
    Aggregate,
    /// Window-only, ordered (ranks, offsets)
    Ranking,
    /// Aggregate over a running frame
    Cumulative,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionSignature {
    pub name: String,
    pub sql_name: String,
    pub kind: FunctionKind,
    pub min_args: usize,
    pub max_args: Option<usize>,
    /// The first argument orders the window instead of being passed through
    #[serde(default)]
    pub order_by_arg: bool,
}

impl FunctionSignature {
    pub fn new(name: &str, sql_name: &str, kind: FunctionKind, min_args: usize, max_args: Option<usize>) -> Self {
        Self {
            name: name.to_string(),
            sql_name: sql_name.to_string(),
            kind,
            min_args,
            max_args,
            order_by_arg: false,
        }
    }

    fn ordered_by_first_arg(mut self) -> Self {
        self.order_by_arg = true;
        self
    }

    pub fn is_window(&self) -> bool {
        self.kind != FunctionKind::Scalar
    }

    pub fn is_aggregate(&self) -> bool {
        self.kind == FunctionKind::Aggregate
    }

    pub fn accepts(&self, arity: usize) -> bool {
        arity >= self.min_args && self.max_args.map_or(true, |max| arity <= max)
    }

    fn expected_arity(&self) -> String {
        match self.max_args {
            Some(max) if max == self.min_args => max.to_string(),
            Some(max) => format!("{}..={}", self.min_args, max),
            None => format!("at least {}", self.min_args),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FunctionRegistry {
    functions: HashMap<String, FunctionSignature>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        let mut registry = Self {
            functions: HashMap::new(),
        };
        registry.register_builtins();
        registry
    }

    fn register_builtins(&mut self) {
        use FunctionKind::*;

        // Row-wise functions
        for (name, sql, min, max) in [
            ("abs", "ABS", 1, Some(1)),
            ("round", "ROUND", 1, Some(2)),
            ("floor", "FLOOR", 1, Some(1)),
            ("ceiling", "CEIL", 1, Some(1)),
            ("sqrt", "SQRT", 1, Some(1)),
            ("exp", "EXP", 1, Some(1)),
            ("log", "LN", 1, Some(1)),
            ("lower", "LOWER", 1, Some(1)),
            ("upper", "UPPER", 1, Some(1)),
            ("nchar", "LENGTH", 1, Some(1)),
            ("trim", "TRIM", 1, Some(1)),
            ("substr", "SUBSTR", 2, Some(3)),
            ("coalesce", "COALESCE", 1, None),
            ("nullif", "NULLIF", 2, Some(2)),
            ("paste0", "CONCAT", 1, None),
            ("is_na", "IS NULL", 1, Some(1)),
            ("if_else", "CASE", 3, Some(3)),
        ] {
            self.register(FunctionSignature::new(name, sql, Scalar, min, max));
        }

        // Standard aggregates
        for (name, sql, min, max) in [
            ("n", "COUNT", 0, Some(0)),
            ("n_distinct", "COUNT", 1, Some(1)),
            ("sum", "SUM", 1, Some(1)),
            ("mean", "AVG", 1, Some(1)),
            ("min", "MIN", 1, Some(1)),
            ("max", "MAX", 1, Some(1)),
            ("sd", "STDDEV_SAMP", 1, Some(1)),
            ("var", "VAR_SAMP", 1, Some(1)),
        ] {
            self.register(FunctionSignature::new(name, sql, Aggregate, min, max));
        }

        // Ranks are ordered by their argument when one is given
        for (name, sql) in [
            ("row_number", "ROW_NUMBER"),
            ("min_rank", "RANK"),
            ("rank", "RANK"),
            ("dense_rank", "DENSE_RANK"),
            ("percent_rank", "PERCENT_RANK"),
            ("cume_dist", "CUME_DIST"),
        ] {
            self.register(FunctionSignature::new(name, sql, Ranking, 0, Some(1)).ordered_by_first_arg());
        }
        self.register(FunctionSignature::new("ntile", "NTILE", Ranking, 2, Some(2)).ordered_by_first_arg());

        // Offsets use the ordering of the pipeline
        for (name, sql, min, max) in [
            ("lag", "LAG", 1, Some(3)),
            ("lead", "LEAD", 1, Some(3)),
            ("first", "FIRST_VALUE", 1, Some(1)),
            ("last", "LAST_VALUE", 1, Some(1)),
        ] {
            self.register(FunctionSignature::new(name, sql, Ranking, min, max));
        }

        for (name, sql) in [
            ("cumsum", "SUM"),
            ("cummean", "AVG"),
            ("cummin", "MIN"),
            ("cummax", "MAX"),
        ] {
            self.register(FunctionSignature::new(name, sql, Cumulative, 1, Some(1)));
        }
    }

    /// Add or replace a function
    pub fn register(&mut self, sig: FunctionSignature) {
        self.functions.insert(sig.name.clone(), sig);
    }

    pub fn remove(&mut self, name: &str) -> Option<FunctionSignature> {
        self.functions.remove(name)
    }

    pub fn get(&self, name: &str) -> Option<&FunctionSignature> {
        self.functions.get(name)
    }

    pub fn lookup(&self, name: &str, arity: usize) -> Result<&FunctionSignature, RegistryError> {
        let sig = self
            .functions
            .get(name)
            .ok_or_else(|| RegistryError::FunctionNotFound(name.to_string()))?;

        if sig.accepts(arity) {
            Ok(sig)
        } else {
            Err(RegistryError::Arity {
                func: name.to_string(),
                expected: sig.expected_arity(),
                actual: arity,
            })
        }
    }

    pub fn is_window(&self, name: &str) -> bool {
        self.functions.get(name).is_some_and(FunctionSignature::is_window)
    }

    /// Names of every function that needs a window outside a summary, sorted
    pub fn window_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .functions
            .values()
            .filter(|sig| sig.is_window())
            .map(|sig| sig.name.as_str())
            .collect();
        names.sort_unstable();
        names
    }
}

impl Default for FunctionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_lookup() {
        let registry = FunctionRegistry::default();

        let sig = registry.lookup("lower", 1).unwrap();
        assert_eq!(sig.sql_name, "LOWER");
        assert_eq!(sig.kind, FunctionKind::Scalar);
    }

    #[test]
    fn test_aggregate_lookup() {
        let registry = FunctionRegistry::default();

        let sig = registry.lookup("mean", 1).unwrap();
        assert!(sig.is_aggregate());
        assert!(sig.is_window());
    }

    #[test]
    fn test_arity_mismatch() {
        let registry = FunctionRegistry::default();

        let err = registry.lookup("round", 3).unwrap_err();
        assert_eq!(
            err,
            RegistryError::Arity {
                func: "round".to_string(),
                expected: "1..=2".to_string(),
                actual: 3,
            }
        );
        assert!(matches!(registry.lookup("nope", 0), Err(RegistryError::FunctionNotFound(_))));
    }

    #[test]
    fn test_window_names() {
        let registry = FunctionRegistry::default();
        let names = registry.window_names();

        assert!(names.contains(&"row_number"));
        assert!(names.contains(&"cumsum"));
        assert!(names.contains(&"sum"));
        assert!(!names.contains(&"abs"));
        assert!(names.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_ranking_orders_by_argument() {
        let registry = FunctionRegistry::default();
        assert!(registry.get("min_rank").unwrap().order_by_arg);
        assert!(!registry.get("lag").unwrap().order_by_arg);
    }
}
