//! Pipeline → query AST builder
//!
//! Every operation except `GroupBy`/`Ungroup` contributes exactly one node.
//! Column names, grouping and ordering are threaded through as metadata so
//! each handler can validate and translate against what its input exposes.

use sqlplan_ir::names;
use sqlplan_ir::{
    ColumnRename, Expr, JoinKind, JoinQuery, KeyPair, NamedExpr, OpKind, Operation, Projection, Query, SelectItem,
    SelectQuery, SemiJoinQuery, SetOpKind, SetOpQuery, SortKey, Sql, Suffixes, TableRef, Value,
};
use sqlplan_registry::{Capability, Dialect};
use tracing::debug;

use crate::error::BuildError;
use crate::oracle::{Clause, ExpressionOracle, TranslateContext, TranslateError};

/// A built node with the metadata downstream operations see
#[derive(Debug, Clone)]
struct Relation {
    query: Query,
    vars: Vec<String>,
    groups: Vec<String>,
    order: Vec<SortKey>,
}

impl Relation {
    fn ctx(&self, clause: Clause) -> TranslateContext<'_> {
        TranslateContext::new(&self.vars, clause)
            .with_groups(&self.groups)
            .with_order(&self.order)
    }
}

/// Builds a query AST from an operation pipeline
pub struct QueryBuilder<'a> {
    oracle: &'a dyn ExpressionOracle,
    dialect: &'a Dialect,
    suffixes: Suffixes,
}

impl<'a> QueryBuilder<'a> {
    pub fn new(oracle: &'a dyn ExpressionOracle, dialect: &'a Dialect) -> Self {
        Self {
            oracle,
            dialect,
            suffixes: Suffixes::default(),
        }
    }

    /// Suffixes for joins that do not carry their own
    pub fn with_suffixes(mut self, suffixes: Suffixes) -> Self {
        self.suffixes = suffixes;
        self
    }

    pub fn build(&self, op: &Operation) -> Result<Query, BuildError> {
        self.build_relation(op).map(|relation| relation.query)
    }

    /// Output column names of `op`, in order
    pub fn output_vars(&self, op: &Operation) -> Result<Vec<String>, BuildError> {
        self.build_relation(op).map(|relation| relation.vars)
    }

    fn build_relation(&self, op: &Operation) -> Result<Relation, BuildError> {
        let relation = match op {
            Operation::BaseRemote { table, vars } => self.base(op.kind(), table.clone(), vars)?,
            Operation::BaseLocal { vars } => self.base(op.kind(), TableRef::local(), vars)?,
            Operation::Select { upstream, columns } => {
                let input = self.build_relation(upstream)?;
                self.select(input, columns)?
            }
            Operation::Rename { upstream, renames } => {
                let input = self.build_relation(upstream)?;
                self.rename(OpKind::Rename, input, renames)?
            }
            Operation::Arrange { upstream, keys } => {
                let input = self.build_relation(upstream)?;
                self.arrange(input, keys)?
            }
            Operation::Summarise { upstream, aggregates } => {
                let input = self.build_relation(upstream)?;
                self.summarise(input, aggregates)?
            }
            Operation::Mutate { upstream, derived } => {
                let input = self.build_relation(upstream)?;
                self.mutate(OpKind::Mutate, input, derived)?
            }
            Operation::GroupBy { upstream, group_vars } => {
                let input = self.build_relation(upstream)?;
                self.group_by(input, group_vars)?
            }
            Operation::Ungroup { upstream } => {
                let mut input = self.build_relation(upstream)?;
                input.groups.clear();
                input
            }
            Operation::Filter { upstream, predicates } => {
                let input = self.build_relation(upstream)?;
                self.filter(input, predicates)?
            }
            Operation::Distinct {
                upstream,
                columns,
                keep_all,
            } => {
                let input = self.build_relation(upstream)?;
                self.distinct(input, columns, *keep_all)?
            }
            Operation::Take { upstream, limit } => {
                let input = self.build_relation(upstream)?;
                self.take(input, *limit)
            }
            Operation::Join {
                left,
                right,
                kind,
                by,
                suffixes,
            } => {
                let l = self.build_relation(left)?;
                let r = self.build_relation(right)?;
                self.join(l, r, *kind, by, suffixes.as_ref().unwrap_or(&self.suffixes))?
            }
            Operation::SemiJoin { left, right, anti, by } => {
                let l = self.build_relation(left)?;
                let r = self.build_relation(right)?;
                self.semi_join(l, r, *anti, by)?
            }
            Operation::SetOp { left, right, kind } => {
                let l = self.build_relation(left)?;
                let r = self.build_relation(right)?;
                self.set_op(l, r, *kind)?
            }
        };

        debug!(
            op = %op.kind(),
            vars = ?relation.vars,
            groups = ?relation.groups,
            "built operation"
        );
        Ok(relation)
    }

    fn base(&self, op: OpKind, table: TableRef, vars: &[String]) -> Result<Relation, BuildError> {
        names::ensure_unique(vars.iter().map(String::as_str)).map_err(|e| BuildError::from_names(op, e))?;
        Ok(Relation {
            query: Query::Table(table),
            vars: vars.to_vec(),
            groups: Vec::new(),
            order: Vec::new(),
        })
    }

    fn select(&self, input: Relation, columns: &[Projection]) -> Result<Relation, BuildError> {
        let op = OpKind::Select;
        let requested = columns
            .iter()
            .map(|projection| {
                let name = projection.expr.as_column().ok_or_else(|| BuildError::Translation {
                    op,
                    source: TranslateError::Unsupported(format!(
                        "select accepts column references only, got {:?}",
                        projection.expr
                    )),
                })?;
                Ok(ColumnRename::new(name, projection.alias.as_deref().unwrap_or(name)))
            })
            .collect::<Result<Vec<_>, BuildError>>()?;

        let mapping =
            names::resolve_select(&input.vars, &requested, &input.groups).map_err(|e| BuildError::from_names(op, e))?;
        Ok(self.project(input, &mapping))
    }

    fn rename(&self, op: OpKind, input: Relation, renames: &[ColumnRename]) -> Result<Relation, BuildError> {
        let mapping = names::resolve_rename(&input.vars, renames).map_err(|e| BuildError::from_names(op, e))?;
        Ok(self.project(input, &mapping))
    }

    /// One projection layer; grouping and ordering follow the renames and
    /// lose whatever the mapping drops
    fn project(&self, input: Relation, mapping: &[ColumnRename]) -> Relation {
        let renamed = |name: &str| mapping.iter().find(|m| m.from == name).map(|m| m.to.clone());

        let groups = input.groups.iter().filter_map(|g| renamed(g.as_str())).collect();
        let order = input
            .order
            .iter()
            .filter(|key| key.expr.columns().iter().all(|c| renamed(*c).is_some()))
            .map(|key| SortKey {
                expr: substitute(&key.expr, &|name: &str| renamed(name).map(Expr::col)),
                desc: key.desc,
            })
            .collect();

        let mut select = SelectQuery::new(input.query);
        select.select = mapping
            .iter()
            .map(|m| {
                let alias = (!m.is_identity()).then(|| m.to.clone());
                SelectItem::new(self.oracle.ident(&m.from, self.dialect), alias)
            })
            .collect();

        Relation {
            query: select.into(),
            vars: mapping.iter().map(|m| m.to.clone()).collect(),
            groups,
            order,
        }
    }

    fn arrange(&self, input: Relation, keys: &[SortKey]) -> Result<Relation, BuildError> {
        let order_by = self
            .oracle
            .translate_sort_keys(keys, self.dialect, &input.ctx(Clause::OrderBy))
            .map_err(|e| BuildError::from_oracle(OpKind::Arrange, e))?;

        let mut select = SelectQuery::new(input.query);
        select.order_by = order_by;
        Ok(Relation {
            query: select.into(),
            vars: input.vars,
            groups: input.groups,
            order: keys.to_vec(),
        })
    }

    fn summarise(&self, input: Relation, aggregates: &[NamedExpr]) -> Result<Relation, BuildError> {
        let op = OpKind::Summarise;
        let translated = self
            .oracle
            .translate(aggregates, self.dialect, &input.ctx(Clause::Summarise))
            .map_err(|e| BuildError::from_oracle(op, e))?;

        let vars: Vec<String> = input
            .groups
            .iter()
            .cloned()
            .chain(aggregates.iter().map(|a| a.name.clone()))
            .collect();
        names::ensure_unique(vars.iter().map(String::as_str)).map_err(|e| BuildError::from_names(op, e))?;

        let group_by: Vec<_> = input.groups.iter().map(|g| self.oracle.ident(g, self.dialect)).collect();
        let mut select = SelectQuery::new(input.query);
        select.select = group_by
            .iter()
            .cloned()
            .map(|sql| SelectItem::new(sql, None))
            .chain(translated.into_iter().map(|(name, sql)| SelectItem::new(sql, Some(name))))
            .collect();
        select.group_by = group_by;

        // Each summary peels off the innermost grouping level
        let mut groups = input.groups;
        groups.pop();

        Ok(Relation {
            query: select.into(),
            vars,
            groups,
            order: Vec::new(),
        })
    }

    fn mutate(&self, op: OpKind, input: Relation, derived: &[NamedExpr]) -> Result<Relation, BuildError> {
        // Inline references to names defined earlier in the same call
        let mut resolved: Vec<NamedExpr> = Vec::new();
        for item in derived {
            // SQL has no window of a window
            let windowed = |name: &str| {
                resolved.iter().any(|r| {
                    r.name == name && self.oracle.uses_window_function(std::slice::from_ref(&r.expr), self.dialect)
                })
            };
            let mut nested = Vec::new();
            self.window_arg_refs(&item.expr, false, &windowed, &mut nested);
            if let Some(inner) = nested.first() {
                return Err(BuildError::UnsupportedOperation {
                    op,
                    message: format!(
                        "'{}' applies a window function to window column '{}' defined in the same mutate; \
                         compute '{}' in an earlier mutate",
                        item.name, inner, inner
                    ),
                });
            }

            let expr = substitute(&item.expr, &|name: &str| {
                resolved.iter().find(|r| r.name == name).map(|r| r.expr.clone())
            });
            match resolved.iter_mut().find(|r| r.name == item.name) {
                Some(existing) => existing.expr = expr,
                None => resolved.push(NamedExpr::new(item.name.clone(), expr)),
            }
        }

        let translated = self
            .oracle
            .translate(&resolved, self.dialect, &input.ctx(Clause::Mutate))
            .map_err(|e| BuildError::from_oracle(op, e))?;

        let unchanged: Vec<String> = input
            .vars
            .iter()
            .filter(|v| !resolved.iter().any(|r| &r.name == *v))
            .cloned()
            .collect();

        let mut select = SelectQuery::new(input.query);
        select.select = unchanged
            .iter()
            .map(|v| SelectItem::new(self.oracle.ident(v, self.dialect), None))
            .chain(translated.into_iter().map(|(name, sql)| SelectItem::new(sql, Some(name))))
            .collect();

        Ok(Relation {
            query: select.into(),
            vars: unchanged.into_iter().chain(resolved.into_iter().map(|r| r.name)).collect(),
            groups: input.groups,
            order: input.order,
        })
    }

    /// Columns matching `windowed` that appear inside a window call's arguments
    fn window_arg_refs(&self, expr: &Expr, in_window: bool, windowed: &impl Fn(&str) -> bool, out: &mut Vec<String>) {
        match expr {
            Expr::Column { name } => {
                if in_window && windowed(name) && !out.contains(name) {
                    out.push(name.clone());
                }
            }
            Expr::Literal { .. } => {}
            Expr::BinaryOp { left, right, .. } => {
                self.window_arg_refs(left, in_window, windowed, out);
                self.window_arg_refs(right, in_window, windowed, out);
            }
            Expr::UnaryOp { expr, .. } | Expr::Cast { expr, .. } => self.window_arg_refs(expr, in_window, windowed, out),
            Expr::FuncCall { func, args } => {
                let in_window = in_window || self.dialect.functions().is_window(func);
                for arg in args {
                    self.window_arg_refs(arg, in_window, windowed, out);
                }
            }
            Expr::InSet { expr, set } => {
                self.window_arg_refs(expr, in_window, windowed, out);
                for item in set {
                    self.window_arg_refs(item, in_window, windowed, out);
                }
            }
        }
    }

    fn group_by(&self, input: Relation, group_vars: &[String]) -> Result<Relation, BuildError> {
        let op = OpKind::GroupBy;
        for name in group_vars {
            names::require_column(&input.vars, name).map_err(|e| BuildError::from_names(op, e))?;
        }
        names::ensure_unique(group_vars.iter().map(String::as_str)).map_err(|e| BuildError::from_names(op, e))?;
        Ok(Relation {
            groups: group_vars.to_vec(),
            ..input
        })
    }

    fn filter(&self, input: Relation, predicates: &[Expr]) -> Result<Relation, BuildError> {
        let op = OpKind::Filter;

        if !self.oracle.uses_window_function(predicates, self.dialect) {
            let where_ = self.translate_predicates(op, predicates, &input.ctx(Clause::Where))?;
            let mut select = SelectQuery::new(input.query);
            select.where_ = where_;
            return Ok(Relation {
                query: select.into(),
                vars: input.vars,
                groups: input.groups,
                order: input.order,
            });
        }

        // WHERE cannot see window results: compute them in a mutate layer,
        // filter on the helper columns, then project them away
        let extraction = self
            .oracle
            .extract_window(predicates, &input.vars, self.dialect)
            .map_err(|e| BuildError::from_oracle(op, e))?;
        debug!(
            helpers = ?extraction.comp.iter().map(|c| c.name.as_str()).collect::<Vec<_>>(),
            "hoisting window functions out of filter"
        );

        let original = input.vars.clone();
        let mutated = self.mutate(op, input, &extraction.comp)?;
        let where_ = self.translate_predicates(op, &extraction.expr, &mutated.ctx(Clause::Where))?;

        let mut select = SelectQuery::new(mutated.query);
        select.select = original
            .iter()
            .map(|v| SelectItem::new(self.oracle.ident(v, self.dialect), None))
            .collect();
        select.where_ = where_;

        Ok(Relation {
            query: select.into(),
            vars: original,
            groups: mutated.groups,
            order: mutated.order,
        })
    }

    fn translate_predicates(
        &self,
        op: OpKind,
        predicates: &[Expr],
        ctx: &TranslateContext<'_>,
    ) -> Result<Vec<Sql>, BuildError> {
        predicates
            .iter()
            .map(|p| self.oracle.translate_expr(p, self.dialect, ctx))
            .collect::<Result<_, _>>()
            .map_err(|e| BuildError::from_oracle(op, e))
    }

    fn distinct(&self, input: Relation, columns: &[String], keep_all: bool) -> Result<Relation, BuildError> {
        let op = OpKind::Distinct;
        if !columns.is_empty() && !keep_all {
            return Err(BuildError::UnsupportedOperation {
                op,
                message: format!(
                    "distinct on {:?} without keep_all would need per-group row selection",
                    columns
                ),
            });
        }
        for name in columns {
            names::require_column(&input.vars, name).map_err(|e| BuildError::from_names(op, e))?;
        }

        let mut select = SelectQuery::new(input.query);
        select.distinct = true;
        Ok(Relation {
            query: select.into(),
            vars: input.vars,
            groups: input.groups,
            order: input.order,
        })
    }

    fn take(&self, input: Relation, limit: u64) -> Relation {
        let mut select = SelectQuery::new(input.query);
        select.limit = Some(limit);
        Relation {
            query: select.into(),
            vars: input.vars,
            groups: input.groups,
            order: input.order,
        }
    }

    fn check_keys(&self, op: OpKind, left: &Relation, right: &Relation, by: &[KeyPair]) -> Result<(), BuildError> {
        for key in by {
            names::require_column(&left.vars, &key.left).map_err(|e| BuildError::from_names(op, e))?;
            names::require_column(&right.vars, &key.right).map_err(|e| BuildError::from_names(op, e))?;
        }
        Ok(())
    }

    fn require(&self, op: OpKind, capability: Capability) -> Result<(), BuildError> {
        self.oracle
            .require(capability, self.dialect)
            .map_err(|e| BuildError::from_oracle(op, e))
    }

    fn join(
        &self,
        left: Relation,
        right: Relation,
        kind: JoinKind,
        by: &[KeyPair],
        suffixes: &Suffixes,
    ) -> Result<Relation, BuildError> {
        let op = OpKind::Join;
        self.check_keys(op, &left, &right, by)?;
        if kind == JoinKind::Full {
            self.require(op, Capability::FullJoin)?;
        }

        let plan = names::disambiguate(&left.vars, &right.vars, by, suffixes)
            .map_err(|e| BuildError::from_names(op, e))?;
        let (left, right, by) = if plan.is_noop() {
            (left, right, by.to_vec())
        } else {
            debug!(left = ?plan.left, right = ?plan.right, "disambiguating join columns");
            let left = self.wrap_renamed(op, left, &plan.left)?;
            let right = self.wrap_renamed(op, right, &plan.right)?;
            (left, right, plan.remap_keys(by))
        };

        let vars = names::join_vars(&left.vars, &right.vars, &by);
        Ok(Relation {
            query: Query::Join(Box::new(JoinQuery {
                left: left.query,
                right: right.query,
                kind,
                by,
            })),
            vars,
            groups: left.groups,
            order: Vec::new(),
        })
    }

    fn wrap_renamed(&self, op: OpKind, input: Relation, renames: &[ColumnRename]) -> Result<Relation, BuildError> {
        if renames.is_empty() {
            return Ok(input);
        }
        self.rename(op, input, renames)
    }

    fn semi_join(&self, left: Relation, right: Relation, anti: bool, by: &[KeyPair]) -> Result<Relation, BuildError> {
        self.check_keys(OpKind::SemiJoin, &left, &right, by)?;
        Ok(Relation {
            query: Query::SemiJoin(Box::new(SemiJoinQuery {
                left: left.query,
                right: right.query,
                anti,
                by: by.to_vec(),
            })),
            vars: left.vars,
            groups: left.groups,
            order: Vec::new(),
        })
    }

    /// Set operations pair columns by position, so each side is projected
    /// onto the union of both name lists, padding missing names with NULL
    fn set_op(&self, left: Relation, right: Relation, kind: SetOpKind) -> Result<Relation, BuildError> {
        let op = OpKind::SetOp;
        self.require(op, Capability::SetOp(kind))?;

        let mut vars = left.vars.clone();
        for name in &right.vars {
            if !vars.contains(name) {
                vars.push(name.clone());
            }
        }

        let left = self.align(op, left, &vars)?;
        let right = self.align(op, right, &vars)?;
        Ok(Relation {
            query: Query::SetOp(Box::new(SetOpQuery {
                left: left.query,
                right: right.query,
                kind,
            })),
            vars,
            groups: Vec::new(),
            order: Vec::new(),
        })
    }

    fn align(&self, op: OpKind, input: Relation, vars: &[String]) -> Result<Relation, BuildError> {
        if input.vars == vars {
            return Ok(input);
        }
        debug!(from = ?input.vars, to = ?vars, "aligning set operation columns");

        let null = self
            .oracle
            .translate_expr(&Expr::lit(Value::Null), self.dialect, &input.ctx(Clause::Mutate))
            .map_err(|e| BuildError::from_oracle(op, e))?;
        let mut select = SelectQuery::new(input.query);
        select.select = vars
            .iter()
            .map(|v| {
                if input.vars.contains(v) {
                    SelectItem::new(self.oracle.ident(v, self.dialect), None)
                } else {
                    SelectItem::new(null.clone(), Some(v.clone()))
                }
            })
            .collect();

        Ok(Relation {
            query: select.into(),
            vars: vars.to_vec(),
            groups: Vec::new(),
            order: Vec::new(),
        })
    }
}

/// Rebuild `expr` with column references replaced where `replace` says so
fn substitute(expr: &Expr, replace: &impl Fn(&str) -> Option<Expr>) -> Expr {
    match expr {
        Expr::Column { name } => replace(name).unwrap_or_else(|| expr.clone()),
        Expr::Literal { .. } => expr.clone(),
        Expr::BinaryOp { op, left, right } => Expr::BinaryOp {
            op: *op,
            left: Box::new(substitute(left, replace)),
            right: Box::new(substitute(right, replace)),
        },
        Expr::UnaryOp { op, expr: inner } => Expr::UnaryOp {
            op: *op,
            expr: Box::new(substitute(inner, replace)),
        },
        Expr::FuncCall { func, args } => Expr::FuncCall {
            func: func.clone(),
            args: args.iter().map(|a| substitute(a, replace)).collect(),
        },
        Expr::InSet { expr: inner, set } => Expr::InSet {
            expr: Box::new(substitute(inner, replace)),
            set: set.iter().map(|e| substitute(e, replace)).collect(),
        },
        Expr::Cast { expr: inner, to } => Expr::Cast {
            expr: Box::new(substitute(inner, replace)),
            to: to.clone(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::SqlOracle;
    use sqlplan_ir::BinOp;

    fn build(op: &Operation) -> Result<Query, BuildError> {
        let dialect = Dialect::ansi();
        QueryBuilder::new(&SqlOracle, &dialect).build(op)
    }

    #[test]
    fn test_base_local_is_table_leaf() {
        let query = build(&Operation::local(["a", "b"])).unwrap();
        assert_eq!(query, Query::Table(TableRef::local()));
    }

    #[test]
    fn test_base_duplicate_vars() {
        let err = build(&Operation::remote("t", ["a", "a"])).unwrap_err();
        assert!(matches!(err, BuildError::NameCollision { op: OpKind::BaseRemote, .. }));
    }

    #[test]
    fn test_group_by_adds_no_layer() {
        let query = build(&Operation::remote("t", ["g", "x"]).group_by(["g"]).ungroup()).unwrap();
        assert_eq!(query.select_depth(), 0);
    }

    #[test]
    fn test_select_rejects_expressions() {
        let op = Operation::remote("t", ["a"]).select(vec![Projection {
            expr: Expr::int(1),
            alias: Some("one".to_string()),
        }]);
        let err = build(&op).unwrap_err();
        assert!(matches!(
            err,
            BuildError::Translation {
                op: OpKind::Select,
                source: TranslateError::Unsupported(_)
            }
        ));
    }

    #[test]
    fn test_rename_carries_ordering() {
        let dialect = Dialect::ansi();
        let builder = QueryBuilder::new(&SqlOracle, &dialect);
        let op = Operation::remote("t", ["a", "b"])
            .arrange(vec![SortKey::asc(Expr::col("a"))])
            .rename([("a", "alpha")])
            .mutate(vec![NamedExpr::new("r", Expr::call("row_number", vec![]))]);

        let query = builder.build(&op).unwrap();
        let select = query.as_select().unwrap();
        assert_eq!(select.select[2].expr.as_str(), "ROW_NUMBER() OVER (ORDER BY \"alpha\")");
        assert_eq!(builder.output_vars(&op).unwrap(), vec!["alpha", "b", "r"]);
    }

    #[test]
    fn test_window_arg_refs_only_inside_window_calls() {
        let dialect = Dialect::ansi();
        let builder = QueryBuilder::new(&SqlOracle, &dialect);
        let windowed = |name: &str| name == "r";

        let mut out = Vec::new();
        let expr = Expr::binary(BinOp::Add, Expr::col("r"), Expr::call("abs", vec![Expr::col("r")]));
        builder.window_arg_refs(&expr, false, &windowed, &mut out);
        assert!(out.is_empty());

        let expr = Expr::call("abs", vec![Expr::call("max", vec![Expr::binary(BinOp::Add, Expr::col("r"), Expr::col("x"))])]);
        builder.window_arg_refs(&expr, false, &windowed, &mut out);
        assert_eq!(out, vec!["r"]);
    }

    #[test]
    fn test_substitute_replaces_columns() {
        let expr = Expr::col("a").gt(Expr::col("b"));
        let out = substitute(&expr, &|name: &str| (name == "a").then(|| Expr::int(1)));
        assert_eq!(out, Expr::int(1).gt(Expr::col("b")));
    }
}
