//! Expression oracle
//!
//! Translates pipeline expressions into SQL fragments for a dialect and
//! answers the window-function questions the filter rewrite depends on.

use sqlplan_ir::{BinOp, Expr, NamedExpr, SortKey, Sql, UnOp, Value};
use sqlplan_registry::{Capability, Dialect, FunctionKind, FunctionSignature, RegistryError};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum TranslateError {
    #[error("Column '{name}' not found. Available columns: {available:?}")]
    UnknownColumn { name: String, available: Vec<String> },

    #[error(transparent)]
    Function(#[from] RegistryError),

    #[error("Function '{func}' is not allowed in {clause}")]
    NotAllowed { func: String, clause: Clause },

    #[error("Unsupported expression: {0}")]
    Unsupported(String),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum OracleError {
    #[error(transparent)]
    Translation(#[from] TranslateError),

    #[error("Dialect '{dialect}' does not support {capability}")]
    MissingCapability { dialect: String, capability: Capability },
}

/// Clause an expression is translated for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Clause {
    Where,
    OrderBy,
    Mutate,
    Summarise,
}

impl Clause {
    /// Whether aggregates and window functions may be emitted with `OVER`
    pub fn allows_window(self) -> bool {
        self == Clause::Mutate
    }

    pub fn is_aggregate(self) -> bool {
        self == Clause::Summarise
    }
}

impl fmt::Display for Clause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Clause::Where => "where",
            Clause::OrderBy => "order by",
            Clause::Mutate => "mutate",
            Clause::Summarise => "summarise",
        })
    }
}

/// What an expression can see while being translated
#[derive(Debug, Clone, Copy)]
pub struct TranslateContext<'c> {
    pub vars: &'c [String],
    pub group_vars: &'c [String],
    pub order_by: &'c [SortKey],
    pub clause: Clause,
}

impl<'c> TranslateContext<'c> {
    pub fn new(vars: &'c [String], clause: Clause) -> Self {
        Self {
            vars,
            group_vars: &[],
            order_by: &[],
            clause,
        }
    }

    pub fn with_groups(mut self, group_vars: &'c [String]) -> Self {
        self.group_vars = group_vars;
        self
    }

    pub fn with_order(mut self, order_by: &'c [SortKey]) -> Self {
        self.order_by = order_by;
        self
    }

    pub fn allow_window(&self) -> bool {
        self.clause.allows_window()
    }
}

/// Window subexpressions lifted out of a predicate list
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WindowExtraction {
    /// Synthetic name → window expression
    pub comp: Vec<NamedExpr>,
    /// Predicates rewritten to reference the synthetic names
    pub expr: Vec<Expr>,
}

/// Translator seam between the builder and a dialect
pub trait ExpressionOracle: Send + Sync {
    fn translate_expr(&self, expr: &Expr, dialect: &Dialect, ctx: &TranslateContext<'_>) -> Result<Sql, OracleError>;

    fn uses_window_function(&self, exprs: &[Expr], dialect: &Dialect) -> bool;

    fn extract_window(&self, exprs: &[Expr], vars: &[String], dialect: &Dialect) -> Result<WindowExtraction, OracleError>;

    fn translate(
        &self,
        exprs: &[NamedExpr],
        dialect: &Dialect,
        ctx: &TranslateContext<'_>,
    ) -> Result<Vec<(String, Sql)>, OracleError> {
        exprs
            .iter()
            .map(|item| Ok((item.name.clone(), self.translate_expr(&item.expr, dialect, ctx)?)))
            .collect()
    }

    fn translate_sort_keys(
        &self,
        keys: &[SortKey],
        dialect: &Dialect,
        ctx: &TranslateContext<'_>,
    ) -> Result<Vec<Sql>, OracleError> {
        keys.iter()
            .map(|key| {
                let sql = self.translate_expr(&key.expr, dialect, ctx)?;
                Ok(if key.desc { Sql::new(format!("{} DESC", sql)) } else { sql })
            })
            .collect()
    }

    fn ident(&self, name: &str, dialect: &Dialect) -> Sql {
        Sql::new(dialect.quote_ident(name))
    }

    fn require(&self, capability: Capability, dialect: &Dialect) -> Result<(), OracleError> {
        if dialect.supports(capability) {
            Ok(())
        } else {
            Err(OracleError::MissingCapability {
                dialect: dialect.name().to_string(),
                capability,
            })
        }
    }
}

/// Oracle backed by the dialect's function registry
#[derive(Debug, Clone, Copy, Default)]
pub struct SqlOracle;

impl ExpressionOracle for SqlOracle {
    fn translate_expr(&self, expr: &Expr, dialect: &Dialect, ctx: &TranslateContext<'_>) -> Result<Sql, OracleError> {
        self.sql(expr, dialect, ctx, false).map(Sql::new)
    }

    fn uses_window_function(&self, exprs: &[Expr], dialect: &Dialect) -> bool {
        exprs.iter().any(|expr| contains_window(expr, dialect))
    }

    fn extract_window(&self, exprs: &[Expr], vars: &[String], dialect: &Dialect) -> Result<WindowExtraction, OracleError> {
        let mut extraction = WindowExtraction::default();
        let mut taken: Vec<String> = vars.to_vec();
        let windows = dialect.functions().window_names();
        for expr in exprs {
            let evaluated = partial_eval(expr, vars)?;
            let rewritten = extract_into(evaluated, &windows, &mut extraction.comp, &mut taken);
            extraction.expr.push(rewritten);
        }
        Ok(extraction)
    }
}

impl SqlOracle {
    fn sql(&self, expr: &Expr, dialect: &Dialect, ctx: &TranslateContext<'_>, nested: bool) -> Result<String, OracleError> {
        match expr {
            Expr::Literal { value } => Ok(literal(value)?),
            Expr::Column { name } => {
                if !ctx.vars.iter().any(|v| v == name) {
                    return Err(TranslateError::UnknownColumn {
                        name: name.clone(),
                        available: ctx.vars.to_vec(),
                    }
                    .into());
                }
                Ok(dialect.quote_ident(name))
            }
            Expr::BinaryOp { op, left, right } => {
                let lhs = self.sql(left, dialect, ctx, true)?;
                if matches!(right.as_ref(), Expr::Literal { value: Value::Null }) {
                    match op {
                        BinOp::Eq => return Ok(wrap(format!("{} IS NULL", lhs), nested)),
                        BinOp::Ne => return Ok(wrap(format!("{} IS NOT NULL", lhs), nested)),
                        _ => {}
                    }
                }
                let rhs = self.sql(right, dialect, ctx, true)?;
                let sql = match op {
                    BinOp::ILike if dialect.supports(Capability::ILike) => format!("{} ILIKE {}", lhs, rhs),
                    BinOp::ILike => format!("LOWER({}) LIKE LOWER({})", lhs, rhs),
                    _ => format!("{} {} {}", lhs, binary_operator(*op), rhs),
                };
                Ok(wrap(sql, nested))
            }
            Expr::UnaryOp { op, expr: inner } => {
                let inner = self.sql(inner, dialect, ctx, true)?;
                Ok(match op {
                    UnOp::Not => wrap(format!("NOT {}", inner), nested),
                    // `--` would open a line comment
                    UnOp::Neg if inner.starts_with('-') => format!("-({})", inner),
                    UnOp::Neg => format!("-{}", inner),
                })
            }
            Expr::FuncCall { func, args } => self.function(func, args, dialect, ctx, nested),
            Expr::InSet { expr: inner, set } => {
                if set.is_empty() {
                    return Ok("FALSE".to_string());
                }
                let lhs = self.sql(inner, dialect, ctx, true)?;
                let items = self.sql_list(set, dialect, ctx)?;
                Ok(wrap(format!("{} IN ({})", lhs, items.join(", ")), nested))
            }
            Expr::Cast { expr: inner, to } => {
                let inner = self.sql(inner, dialect, ctx, false)?;
                Ok(format!("CAST({} AS {})", inner, dialect.type_name(to)))
            }
        }
    }

    fn sql_list(&self, exprs: &[Expr], dialect: &Dialect, ctx: &TranslateContext<'_>) -> Result<Vec<String>, OracleError> {
        exprs.iter().map(|e| self.sql(e, dialect, ctx, false)).collect()
    }

    fn function(
        &self,
        func: &str,
        args: &[Expr],
        dialect: &Dialect,
        ctx: &TranslateContext<'_>,
        nested: bool,
    ) -> Result<String, OracleError> {
        let sig = dialect
            .functions()
            .lookup(func, args.len())
            .map_err(TranslateError::from)?;

        match sig.kind {
            FunctionKind::Scalar => self.scalar(sig, args, dialect, ctx, nested),
            FunctionKind::Aggregate if ctx.clause.is_aggregate() => self.call(sig, args, dialect, ctx),
            _ if !ctx.allow_window() => Err(TranslateError::NotAllowed {
                func: func.to_string(),
                clause: ctx.clause,
            }
            .into()),
            _ => {
                self.require(Capability::WindowFunctions, dialect)?;
                self.window(sig, args, dialect, ctx)
            }
        }
    }

    fn scalar(
        &self,
        sig: &FunctionSignature,
        args: &[Expr],
        dialect: &Dialect,
        ctx: &TranslateContext<'_>,
        nested: bool,
    ) -> Result<String, OracleError> {
        match (sig.name.as_str(), args) {
            ("is_na", [value]) => {
                let value = self.sql(value, dialect, ctx, true)?;
                Ok(wrap(format!("{} IS NULL", value), nested))
            }
            ("if_else", [condition, yes, no]) => Ok(format!(
                "CASE WHEN {} THEN {} ELSE {} END",
                self.sql(condition, dialect, ctx, false)?,
                self.sql(yes, dialect, ctx, false)?,
                self.sql(no, dialect, ctx, false)?,
            )),
            _ => self.call(sig, args, dialect, ctx),
        }
    }

    fn call(
        &self,
        sig: &FunctionSignature,
        args: &[Expr],
        dialect: &Dialect,
        ctx: &TranslateContext<'_>,
    ) -> Result<String, OracleError> {
        let args = self.sql_list(args, dialect, ctx)?;
        Ok(match sig.name.as_str() {
            "n" => "COUNT(*)".to_string(),
            "n_distinct" => format!("COUNT(DISTINCT {})", args.join(", ")),
            _ => format!("{}({})", sig.sql_name, args.join(", ")),
        })
    }

    fn window(
        &self,
        sig: &FunctionSignature,
        args: &[Expr],
        dialect: &Dialect,
        ctx: &TranslateContext<'_>,
    ) -> Result<String, OracleError> {
        let (order, call_args) = match args.split_first() {
            Some((first, rest)) if sig.order_by_arg => (vec![sort_key(first)], rest),
            _ => (ctx.order_by.to_vec(), args),
        };
        let call = self.call(sig, call_args, dialect, ctx)?;

        let mut over = Vec::new();
        if !ctx.group_vars.is_empty() {
            let partition: Vec<String> = ctx.group_vars.iter().map(|g| dialect.quote_ident(g)).collect();
            over.push(format!("PARTITION BY {}", partition.join(", ")));
        }
        // Plain aggregates span the whole partition
        if sig.kind != FunctionKind::Aggregate && !order.is_empty() {
            let order_ctx = TranslateContext::new(ctx.vars, Clause::OrderBy);
            let keys: Vec<String> = self
                .translate_sort_keys(&order, dialect, &order_ctx)?
                .into_iter()
                .map(|sql| sql.to_string())
                .collect();
            over.push(format!("ORDER BY {}", keys.join(", ")));
        }
        if sig.kind == FunctionKind::Cumulative {
            over.push("ROWS BETWEEN UNBOUNDED PRECEDING AND CURRENT ROW".to_string());
        }
        Ok(format!("{} OVER ({})", call, over.join(" ")))
    }
}

/// `desc(x)` orders descending; anything else ascending
fn sort_key(expr: &Expr) -> SortKey {
    match expr {
        Expr::FuncCall { func, args } if func == "desc" && args.len() == 1 => SortKey::desc(args[0].clone()),
        _ => SortKey::asc(expr.clone()),
    }
}

fn wrap(sql: String, nested: bool) -> String {
    if nested {
        format!("({})", sql)
    } else {
        sql
    }
}

fn binary_operator(op: BinOp) -> &'static str {
    match op {
        BinOp::Add => "+",
        BinOp::Sub => "-",
        BinOp::Mul => "*",
        BinOp::Div => "/",
        BinOp::Mod => "%",
        BinOp::Eq => "=",
        BinOp::Ne => "<>",
        BinOp::Lt => "<",
        BinOp::Le => "<=",
        BinOp::Gt => ">",
        BinOp::Ge => ">=",
        BinOp::And => "AND",
        BinOp::Or => "OR",
        BinOp::Like => "LIKE",
        BinOp::ILike => "ILIKE",
    }
}

fn literal(value: &Value) -> Result<String, TranslateError> {
    Ok(match value {
        Value::Null => "NULL".to_string(),
        Value::Bool(true) => "TRUE".to_string(),
        Value::Bool(false) => "FALSE".to_string(),
        Value::Int(i) => i.to_string(),
        Value::Float(f) if f.is_finite() => format!("{:?}", f),
        Value::Float(f) => return Err(TranslateError::Unsupported(format!("non-finite literal {}", f))),
        Value::String(s) => format!("'{}'", s.replace('\'', "''")),
    })
}

fn contains_window(expr: &Expr, dialect: &Dialect) -> bool {
    match expr {
        Expr::Literal { .. } | Expr::Column { .. } => false,
        Expr::BinaryOp { left, right, .. } => contains_window(left, dialect) || contains_window(right, dialect),
        Expr::UnaryOp { expr, .. } | Expr::Cast { expr, .. } => contains_window(expr, dialect),
        Expr::FuncCall { func, args } => {
            dialect.functions().is_window(func) || args.iter().any(|a| contains_window(a, dialect))
        }
        Expr::InSet { expr, set } => contains_window(expr, dialect) || set.iter().any(|e| contains_window(e, dialect)),
    }
}

/// Check column references against `vars` and fold literal-only arithmetic
pub fn partial_eval(expr: &Expr, vars: &[String]) -> Result<Expr, TranslateError> {
    Ok(match expr {
        Expr::Literal { .. } => expr.clone(),
        Expr::Column { name } => {
            if !vars.iter().any(|v| v == name) {
                return Err(TranslateError::UnknownColumn {
                    name: name.clone(),
                    available: vars.to_vec(),
                });
            }
            expr.clone()
        }
        Expr::BinaryOp { op, left, right } => {
            let left = partial_eval(left, vars)?;
            let right = partial_eval(right, vars)?;
            match (&left, &right) {
                (Expr::Literal { value: l }, Expr::Literal { value: r }) => match fold_binary(*op, l, r) {
                    Some(value) => Expr::lit(value),
                    None => Expr::binary(*op, left, right),
                },
                _ => Expr::binary(*op, left, right),
            }
        }
        Expr::UnaryOp { op, expr: inner } => {
            let inner = partial_eval(inner, vars)?;
            let folded = match (op, &inner) {
                (UnOp::Neg, Expr::Literal { value: Value::Int(i) }) => i.checked_neg().map(Value::Int),
                (UnOp::Neg, Expr::Literal { value: Value::Float(f) }) => Some(Value::Float(-f)),
                (UnOp::Not, Expr::Literal { value: Value::Bool(b) }) => Some(Value::Bool(!b)),
                _ => None,
            };
            match folded {
                Some(value) => Expr::lit(value),
                None => Expr::UnaryOp {
                    op: *op,
                    expr: Box::new(inner),
                },
            }
        }
        Expr::FuncCall { func, args } => Expr::FuncCall {
            func: func.clone(),
            args: args.iter().map(|a| partial_eval(a, vars)).collect::<Result<_, _>>()?,
        },
        Expr::InSet { expr: inner, set } => Expr::InSet {
            expr: Box::new(partial_eval(inner, vars)?),
            set: set.iter().map(|e| partial_eval(e, vars)).collect::<Result<_, _>>()?,
        },
        Expr::Cast { expr: inner, to } => Expr::Cast {
            expr: Box::new(partial_eval(inner, vars)?),
            to: to.clone(),
        },
    })
}

fn fold_binary(op: BinOp, left: &Value, right: &Value) -> Option<Value> {
    match (left, right) {
        (Value::Int(a), Value::Int(b)) => match op {
            BinOp::Add => a.checked_add(*b),
            BinOp::Sub => a.checked_sub(*b),
            BinOp::Mul => a.checked_mul(*b),
            _ => None,
        }
        .map(Value::Int),
        (Value::Float(a), Value::Float(b)) => match op {
            BinOp::Add => Some(a + b),
            BinOp::Sub => Some(a - b),
            BinOp::Mul => Some(a * b),
            BinOp::Div if *b != 0.0 => Some(a / b),
            _ => None,
        }
        .map(Value::Float),
        _ => None,
    }
}

/// Replace each window call with a reference to a synthetic column
///
/// Identical window expressions share one synthetic name. Names already in
/// `taken` are skipped.
fn extract_into(expr: Expr, windows: &[&str], comp: &mut Vec<NamedExpr>, taken: &mut Vec<String>) -> Expr {
    let is_window = matches!(&expr, Expr::FuncCall { func, .. } if windows.contains(&func.as_str()));
    if is_window {
        if let Some(existing) = comp.iter().find(|c| c.expr == expr) {
            return Expr::col(existing.name.clone());
        }
        let name = synthetic_name(taken);
        taken.push(name.clone());
        comp.push(NamedExpr::new(name.clone(), expr));
        return Expr::col(name);
    }

    match expr {
        Expr::BinaryOp { op, left, right } => Expr::BinaryOp {
            op,
            left: Box::new(extract_into(*left, windows, comp, taken)),
            right: Box::new(extract_into(*right, windows, comp, taken)),
        },
        Expr::UnaryOp { op, expr } => Expr::UnaryOp {
            op,
            expr: Box::new(extract_into(*expr, windows, comp, taken)),
        },
        Expr::FuncCall { func, args } => Expr::FuncCall {
            func,
            args: args.into_iter().map(|a| extract_into(a, windows, comp, taken)).collect(),
        },
        Expr::InSet { expr, set } => Expr::InSet {
            expr: Box::new(extract_into(*expr, windows, comp, taken)),
            set: set.into_iter().map(|e| extract_into(e, windows, comp, taken)).collect(),
        },
        Expr::Cast { expr, to } => Expr::Cast {
            expr: Box::new(extract_into(*expr, windows, comp, taken)),
            to,
        },
        other => other,
    }
}

fn synthetic_name(taken: &[String]) -> String {
    let mut n = 1;
    loop {
        let name = format!("q{:02}", n);
        if !taken.contains(&name) {
            return name;
        }
        n += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlplan_ir::DataType;

    fn vars(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn translate(expr: &Expr, ctx: &TranslateContext<'_>) -> Result<String, OracleError> {
        SqlOracle
            .translate_expr(expr, &Dialect::ansi(), ctx)
            .map(|sql| sql.to_string())
    }

    #[test]
    fn test_comparison_and_nesting() {
        let v = vars(&["a", "b"]);
        let ctx = TranslateContext::new(&v, Clause::Where);

        let expr = Expr::col("a").gt(Expr::int(1)).and(Expr::col("b").lt(Expr::float(2.5)));
        assert_eq!(translate(&expr, &ctx).unwrap(), "(\"a\" > 1) AND (\"b\" < 2.5)");
        assert_eq!(translate(&Expr::col("a").gt(Expr::int(1)), &ctx).unwrap(), "\"a\" > 1");
    }

    #[test]
    fn test_null_comparison_and_literals() {
        let v = vars(&["a"]);
        let ctx = TranslateContext::new(&v, Clause::Where);

        let expr = Expr::binary(BinOp::Ne, Expr::col("a"), Expr::lit(Value::Null));
        assert_eq!(translate(&expr, &ctx).unwrap(), "\"a\" IS NOT NULL");
        assert_eq!(translate(&Expr::string("it's"), &ctx).unwrap(), "'it''s'");
        assert!(translate(&Expr::float(f64::NAN), &ctx).is_err());
    }

    #[test]
    fn test_unknown_column() {
        let v = vars(&["a"]);
        let ctx = TranslateContext::new(&v, Clause::Where);

        let err = translate(&Expr::col("zz"), &ctx).unwrap_err();
        assert!(matches!(
            err,
            OracleError::Translation(TranslateError::UnknownColumn { ref name, .. }) if name == "zz"
        ));
    }

    #[test]
    fn test_double_negation_stays_arithmetic() {
        let v = vars(&["x"]);
        let ctx = TranslateContext::new(&v, Clause::Mutate);
        let neg = |expr: Expr| Expr::UnaryOp {
            op: UnOp::Neg,
            expr: Box::new(expr),
        };

        let twice = translate(&neg(neg(Expr::col("x"))), &ctx).unwrap();
        let literal = translate(&neg(Expr::int(-1)), &ctx).unwrap();
        assert_eq!(twice, "-(-\"x\")");
        assert_eq!(literal, "-(-1)");
        assert!(!twice.contains("--") && !literal.contains("--"));
        assert_eq!(translate(&neg(Expr::col("x")), &ctx).unwrap(), "-\"x\"");

        // A comment marker in WHERE would swallow every later predicate
        let where_ctx = TranslateContext::new(&v, Clause::Where);
        let predicate = neg(neg(Expr::col("x"))).gt(Expr::int(0)).and(Expr::col("x").lt(Expr::int(9)));
        let sql = translate(&predicate, &where_ctx).unwrap();
        assert_eq!(sql, "(-(-\"x\") > 0) AND (\"x\" < 9)");
    }

    #[test]
    fn test_ilike_fallback() {
        let v = vars(&["name"]);
        let ctx = TranslateContext::new(&v, Clause::Where);
        let expr = Expr::binary(BinOp::ILike, Expr::col("name"), Expr::string("a%"));

        assert_eq!(translate(&expr, &ctx).unwrap(), "LOWER(\"name\") LIKE LOWER('a%')");
        let pg = SqlOracle.translate_expr(&expr, &Dialect::postgres(), &ctx).unwrap();
        assert_eq!(pg.as_str(), "\"name\" ILIKE 'a%'");
    }

    #[test]
    fn test_scalar_specials() {
        let v = vars(&["a", "b"]);
        let ctx = TranslateContext::new(&v, Clause::Mutate);

        let expr = Expr::call(
            "if_else",
            vec![Expr::call("is_na", vec![Expr::col("a")]), Expr::int(0), Expr::col("a")],
        );
        assert_eq!(translate(&expr, &ctx).unwrap(), "CASE WHEN \"a\" IS NULL THEN 0 ELSE \"a\" END");

        let cast = Expr::Cast {
            expr: Box::new(Expr::col("b")),
            to: DataType::String,
        };
        let sql = SqlOracle.translate_expr(&cast, &Dialect::sqlite(), &ctx).unwrap();
        assert_eq!(sql.as_str(), "CAST(\"b\" AS TEXT)");

        let set = Expr::InSet {
            expr: Box::new(Expr::col("a")),
            set: vec![Expr::int(1), Expr::int(2)],
        };
        assert_eq!(translate(&set, &ctx).unwrap(), "\"a\" IN (1, 2)");
    }

    #[test]
    fn test_aggregate_by_clause() {
        let v = vars(&["g", "x"]);
        let g = vars(&["g"]);
        let sum = Expr::call("sum", vec![Expr::col("x")]);

        let summarise = TranslateContext::new(&v, Clause::Summarise).with_groups(&g);
        assert_eq!(translate(&sum, &summarise).unwrap(), "SUM(\"x\")");
        assert_eq!(translate(&Expr::call("n", vec![]), &summarise).unwrap(), "COUNT(*)");

        let mutate = TranslateContext::new(&v, Clause::Mutate).with_groups(&g);
        assert_eq!(translate(&sum, &mutate).unwrap(), "SUM(\"x\") OVER (PARTITION BY \"g\")");

        let filter = TranslateContext::new(&v, Clause::Where);
        let err = translate(&sum, &filter).unwrap_err();
        assert!(matches!(
            err,
            OracleError::Translation(TranslateError::NotAllowed { clause: Clause::Where, .. })
        ));
    }

    #[test]
    fn test_ranking_and_cumulative_windows() {
        let v = vars(&["g", "x", "t"]);
        let g = vars(&["g"]);
        let order = vec![SortKey::asc(Expr::col("t"))];
        let ctx = TranslateContext::new(&v, Clause::Mutate).with_groups(&g).with_order(&order);

        let rank = Expr::call("min_rank", vec![Expr::call("desc", vec![Expr::col("x")])]);
        assert_eq!(
            translate(&rank, &ctx).unwrap(),
            "RANK() OVER (PARTITION BY \"g\" ORDER BY \"x\" DESC)"
        );

        let running = Expr::call("cumsum", vec![Expr::col("x")]);
        assert_eq!(
            translate(&running, &ctx).unwrap(),
            "SUM(\"x\") OVER (PARTITION BY \"g\" ORDER BY \"t\" ROWS BETWEEN UNBOUNDED PRECEDING AND CURRENT ROW)"
        );

        let summarise = TranslateContext::new(&v, Clause::Summarise);
        assert!(translate(&running, &summarise).is_err());
    }

    #[test]
    fn test_window_requires_capability() {
        let v = vars(&["x"]);
        let ctx = TranslateContext::new(&v, Clause::Mutate);
        let dialect = Dialect::ansi().with_window_functions(false);

        let err = SqlOracle
            .translate_expr(&Expr::call("row_number", vec![]), &dialect, &ctx)
            .unwrap_err();
        assert_eq!(
            err,
            OracleError::MissingCapability {
                dialect: "ansi".to_string(),
                capability: Capability::WindowFunctions,
            }
        );
    }

    #[test]
    fn test_uses_window_function() {
        let dialect = Dialect::ansi();
        let plain = vec![Expr::call("abs", vec![Expr::col("x")]).gt(Expr::int(1))];
        let windowed = vec![Expr::col("x").gt(Expr::call("mean", vec![Expr::col("x")]))];

        assert!(!SqlOracle.uses_window_function(&plain, &dialect));
        assert!(SqlOracle.uses_window_function(&windowed, &dialect));
    }

    #[test]
    fn test_extract_window_shares_names() {
        let v = vars(&["x", "q01"]);
        let mean = Expr::call("mean", vec![Expr::col("x")]);
        let predicates = vec![
            Expr::col("x").gt(mean.clone()),
            Expr::col("x").lt(Expr::binary(BinOp::Mul, mean.clone(), Expr::int(2))),
        ];

        let extraction = SqlOracle.extract_window(&predicates, &v, &Dialect::ansi()).unwrap();

        assert_eq!(extraction.comp, vec![NamedExpr::new("q02", mean)]);
        assert_eq!(extraction.expr[0], Expr::col("x").gt(Expr::col("q02")));
        assert_eq!(
            extraction.expr[1],
            Expr::col("x").lt(Expr::binary(BinOp::Mul, Expr::col("q02"), Expr::int(2)))
        );
    }

    #[test]
    fn test_partial_eval_folds_literals() {
        let v = vars(&["x"]);
        let expr = Expr::col("x").gt(Expr::binary(BinOp::Add, Expr::int(1), Expr::int(2)));
        assert_eq!(partial_eval(&expr, &v).unwrap(), Expr::col("x").gt(Expr::int(3)));

        let negated = Expr::UnaryOp {
            op: UnOp::Neg,
            expr: Box::new(Expr::float(1.5)),
        };
        assert_eq!(partial_eval(&negated, &v).unwrap(), Expr::float(-1.5));
        assert!(partial_eval(&Expr::col("y"), &v).is_err());
    }
}
