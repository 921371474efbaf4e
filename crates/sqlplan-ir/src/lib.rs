//! sqlplan Intermediate Representation (IR)
//!
//! The operation pipeline consumed by the query builder and the query AST it
//! produces. All types are deterministically serializable for caching and
//! provenance.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

pub mod names;
pub mod query;
mod types;

pub use query::{JoinQuery, Query, SelectItem, SelectQuery, SemiJoinQuery, SetOpQuery, Sql};
pub use types::*;

/// Placeholder identifier for tables materialized locally
pub const LOCAL_TABLE: &str = "df";

/// Relational operation pipeline
///
/// Every variant owns its upstream operation(s), so a pipeline is a tree
/// built bottom-up and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op")]
pub enum Operation {
    BaseRemote {
        table: TableRef,
        vars: Vec<String>,
    },
    BaseLocal {
        vars: Vec<String>,
    },
    Select {
        upstream: Box<Operation>,
        columns: Vec<Projection>,
    },
    Rename {
        upstream: Box<Operation>,
        renames: Vec<ColumnRename>,
    },
    Arrange {
        upstream: Box<Operation>,
        keys: Vec<SortKey>,
    },
    Summarise {
        upstream: Box<Operation>,
        aggregates: Vec<NamedExpr>,
    },
    Mutate {
        upstream: Box<Operation>,
        derived: Vec<NamedExpr>,
    },
    GroupBy {
        upstream: Box<Operation>,
        group_vars: Vec<String>,
    },
    Ungroup {
        upstream: Box<Operation>,
    },
    Filter {
        upstream: Box<Operation>,
        predicates: Vec<Expr>,
    },
    Distinct {
        upstream: Box<Operation>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        columns: Vec<String>,
        #[serde(default)]
        keep_all: bool,
    },
    Take {
        upstream: Box<Operation>,
        limit: u64,
    },
    Join {
        left: Box<Operation>,
        right: Box<Operation>,
        #[serde(default)]
        kind: JoinKind,
        by: Vec<KeyPair>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        suffixes: Option<Suffixes>,
    },
    SemiJoin {
        left: Box<Operation>,
        right: Box<Operation>,
        #[serde(default)]
        anti: bool,
        by: Vec<KeyPair>,
    },
    SetOp {
        left: Box<Operation>,
        right: Box<Operation>,
        kind: SetOpKind,
    },
}

impl Operation {
    /// Leaf referencing a physical table
    pub fn remote<S: Into<String>>(table: impl Into<TableRef>, vars: impl IntoIterator<Item = S>) -> Self {
        Operation::BaseRemote {
            table: table.into(),
            vars: vars.into_iter().map(Into::into).collect(),
        }
    }

    /// Leaf for a locally materialized table
    pub fn local<S: Into<String>>(vars: impl IntoIterator<Item = S>) -> Self {
        Operation::BaseLocal {
            vars: vars.into_iter().map(Into::into).collect(),
        }
    }

    pub fn select(self, columns: Vec<Projection>) -> Self {
        Operation::Select { upstream: Box::new(self), columns }
    }

    pub fn rename<A: Into<String>, B: Into<String>>(self, renames: impl IntoIterator<Item = (A, B)>) -> Self {
        Operation::Rename {
            upstream: Box::new(self),
            renames: renames
                .into_iter()
                .map(|(from, to)| ColumnRename::new(from, to))
                .collect(),
        }
    }

    pub fn arrange(self, keys: Vec<SortKey>) -> Self {
        Operation::Arrange { upstream: Box::new(self), keys }
    }

    pub fn summarise(self, aggregates: Vec<NamedExpr>) -> Self {
        Operation::Summarise { upstream: Box::new(self), aggregates }
    }

    pub fn mutate(self, derived: Vec<NamedExpr>) -> Self {
        Operation::Mutate { upstream: Box::new(self), derived }
    }

    pub fn group_by<S: Into<String>>(self, group_vars: impl IntoIterator<Item = S>) -> Self {
        Operation::GroupBy {
            upstream: Box::new(self),
            group_vars: group_vars.into_iter().map(Into::into).collect(),
        }
    }

    pub fn ungroup(self) -> Self {
        Operation::Ungroup { upstream: Box::new(self) }
    }

    pub fn filter(self, predicates: Vec<Expr>) -> Self {
        Operation::Filter { upstream: Box::new(self), predicates }
    }

    pub fn distinct<S: Into<String>>(self, columns: impl IntoIterator<Item = S>, keep_all: bool) -> Self {
        Operation::Distinct {
            upstream: Box::new(self),
            columns: columns.into_iter().map(Into::into).collect(),
            keep_all,
        }
    }

    pub fn take(self, limit: u64) -> Self {
        Operation::Take { upstream: Box::new(self), limit }
    }

    pub fn join(self, right: Operation, kind: JoinKind, by: Vec<KeyPair>) -> Self {
        Operation::Join {
            left: Box::new(self),
            right: Box::new(right),
            kind,
            by,
            suffixes: None,
        }
    }

    /// Join with explicit disambiguation suffixes
    pub fn join_with_suffixes(self, right: Operation, kind: JoinKind, by: Vec<KeyPair>, suffixes: Suffixes) -> Self {
        Operation::Join {
            left: Box::new(self),
            right: Box::new(right),
            kind,
            by,
            suffixes: Some(suffixes),
        }
    }

    pub fn semi_join(self, right: Operation, anti: bool, by: Vec<KeyPair>) -> Self {
        Operation::SemiJoin {
            left: Box::new(self),
            right: Box::new(right),
            anti,
            by,
        }
    }

    pub fn set_op(self, right: Operation, kind: SetOpKind) -> Self {
        Operation::SetOp {
            left: Box::new(self),
            right: Box::new(right),
            kind,
        }
    }

    pub fn kind(&self) -> OpKind {
        match self {
            Operation::BaseRemote { .. } => OpKind::BaseRemote,
            Operation::BaseLocal { .. } => OpKind::BaseLocal,
            Operation::Select { .. } => OpKind::Select,
            Operation::Rename { .. } => OpKind::Rename,
            Operation::Arrange { .. } => OpKind::Arrange,
            Operation::Summarise { .. } => OpKind::Summarise,
            Operation::Mutate { .. } => OpKind::Mutate,
            Operation::GroupBy { .. } => OpKind::GroupBy,
            Operation::Ungroup { .. } => OpKind::Ungroup,
            Operation::Filter { .. } => OpKind::Filter,
            Operation::Distinct { .. } => OpKind::Distinct,
            Operation::Take { .. } => OpKind::Take,
            Operation::Join { .. } => OpKind::Join,
            Operation::SemiJoin { .. } => OpKind::SemiJoin,
            Operation::SetOp { .. } => OpKind::SetOp,
        }
    }

    /// Calculate fingerprint (SHA-256) for deterministic caching
    pub fn fingerprint(&self) -> String {
        let json = serde_json::to_string(self).expect("IR should always serialize");
        let mut hasher = Sha256::new();
        hasher.update(json.as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

/// Operation discriminant, used in diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OpKind {
    BaseRemote,
    BaseLocal,
    Select,
    Rename,
    Arrange,
    Summarise,
    Mutate,
    GroupBy,
    Ungroup,
    Filter,
    Distinct,
    Take,
    Join,
    SemiJoin,
    SetOp,
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OpKind::BaseRemote => "base_remote",
            OpKind::BaseLocal => "base_local",
            OpKind::Select => "select",
            OpKind::Rename => "rename",
            OpKind::Arrange => "arrange",
            OpKind::Summarise => "summarise",
            OpKind::Mutate => "mutate",
            OpKind::GroupBy => "group_by",
            OpKind::Ungroup => "ungroup",
            OpKind::Filter => "filter",
            OpKind::Distinct => "distinct",
            OpKind::Take => "take",
            OpKind::Join => "join",
            OpKind::SemiJoin => "semi_join",
            OpKind::SetOp => "set_op",
        };
        f.write_str(name)
    }
}

/// Physical table identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TableRef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    pub name: String,
}

impl TableRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self { schema: None, name: name.into() }
    }

    pub fn qualified(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema: Some(schema.into()),
            name: name.into(),
        }
    }

    /// The placeholder used for local tables
    pub fn local() -> Self {
        Self::new(LOCAL_TABLE)
    }
}

impl From<&str> for TableRef {
    fn from(name: &str) -> Self {
        TableRef::new(name)
    }
}

impl From<String> for TableRef {
    fn from(name: String) -> Self {
        TableRef::new(name)
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.schema {
            Some(schema) => write!(f, "{}.{}", schema, self.name),
            None => f.write_str(&self.name),
        }
    }
}

/// Select item: a column reference with an optional output alias
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Projection {
    pub expr: Expr,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
}

impl Projection {
    pub fn column(name: impl Into<String>) -> Self {
        Self { expr: Expr::col(name), alias: None }
    }

    pub fn aliased(name: impl Into<String>, alias: impl Into<String>) -> Self {
        Self {
            expr: Expr::col(name),
            alias: Some(alias.into()),
        }
    }
}

/// Old name → new name
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ColumnRename {
    pub from: String,
    pub to: String,
}

impl ColumnRename {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }

    pub fn is_identity(&self) -> bool {
        self.from == self.to
    }
}

/// Output name bound to an expression (summarise / mutate)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedExpr {
    pub name: String,
    pub expr: Expr,
}

impl NamedExpr {
    pub fn new(name: impl Into<String>, expr: Expr) -> Self {
        Self { name: name.into(), expr }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SortKey {
    pub expr: Expr,
    #[serde(default)]
    pub desc: bool,
}

impl SortKey {
    pub fn asc(expr: Expr) -> Self {
        Self { expr, desc: false }
    }

    pub fn desc(expr: Expr) -> Self {
        Self { expr, desc: true }
    }
}

/// Join key: left column name paired with right column name
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KeyPair {
    pub left: String,
    pub right: String,
}

impl KeyPair {
    pub fn new(left: impl Into<String>, right: impl Into<String>) -> Self {
        Self {
            left: left.into(),
            right: right.into(),
        }
    }

    /// Key with the same name on both sides
    pub fn same(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            left: name.clone(),
            right: name,
        }
    }

    pub fn is_shared(&self) -> bool {
        self.left == self.right
    }
}

/// Markers appended to colliding non-key columns of a join
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Suffixes {
    pub left: String,
    pub right: String,
}

impl Suffixes {
    pub fn new(left: impl Into<String>, right: impl Into<String>) -> Self {
        Self {
            left: left.into(),
            right: right.into(),
        }
    }
}

impl Default for Suffixes {
    fn default() -> Self {
        Self::new("_x", "_y")
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JoinKind {
    #[default]
    Inner,
    Left,
    Right,
    Full,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SetOpKind {
    Union,
    UnionAll,
    Intersect,
    Except,
}

impl fmt::Display for SetOpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SetOpKind::Union => "UNION",
            SetOpKind::UnionAll => "UNION ALL",
            SetOpKind::Intersect => "INTERSECT",
            SetOpKind::Except => "EXCEPT",
        })
    }
}

/// Expression types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Expr {
    Literal { value: Value },
    Column { name: String },
    BinaryOp { op: BinOp, left: Box<Expr>, right: Box<Expr> },
    UnaryOp { op: UnOp, expr: Box<Expr> },
    FuncCall { func: String, args: Vec<Expr> },
    InSet { expr: Box<Expr>, set: Vec<Expr> },
    Cast { expr: Box<Expr>, to: DataType },
}

impl Expr {
    pub fn col(name: impl Into<String>) -> Self {
        Expr::Column { name: name.into() }
    }

    pub fn lit(value: Value) -> Self {
        Expr::Literal { value }
    }

    pub fn int(value: i64) -> Self {
        Expr::lit(Value::Int(value))
    }

    pub fn float(value: f64) -> Self {
        Expr::lit(Value::Float(value))
    }

    pub fn string(value: impl Into<String>) -> Self {
        Expr::lit(Value::String(value.into()))
    }

    pub fn call(func: impl Into<String>, args: Vec<Expr>) -> Self {
        Expr::FuncCall { func: func.into(), args }
    }

    pub fn binary(op: BinOp, left: Expr, right: Expr) -> Self {
        Expr::BinaryOp {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn gt(self, rhs: Expr) -> Self {
        Expr::binary(BinOp::Gt, self, rhs)
    }

    pub fn lt(self, rhs: Expr) -> Self {
        Expr::binary(BinOp::Lt, self, rhs)
    }

    pub fn equals(self, rhs: Expr) -> Self {
        Expr::binary(BinOp::Eq, self, rhs)
    }

    pub fn and(self, rhs: Expr) -> Self {
        Expr::binary(BinOp::And, self, rhs)
    }

    pub fn negated(self) -> Self {
        Expr::UnaryOp {
            op: UnOp::Not,
            expr: Box::new(self),
        }
    }

    /// Name of the column this expression references directly, if any
    pub fn as_column(&self) -> Option<&str> {
        match self {
            Expr::Column { name } => Some(name),
            _ => None,
        }
    }

    /// Column names referenced anywhere in the expression, in visit order
    pub fn columns(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_columns(&mut out);
        out
    }

    fn collect_columns<'e>(&'e self, out: &mut Vec<&'e str>) {
        match self {
            Expr::Literal { .. } => {}
            Expr::Column { name } => out.push(name),
            Expr::BinaryOp { left, right, .. } => {
                left.collect_columns(out);
                right.collect_columns(out);
            }
            Expr::UnaryOp { expr, .. } | Expr::Cast { expr, .. } => expr.collect_columns(out),
            Expr::FuncCall { args, .. } => args.iter().for_each(|a| a.collect_columns(out)),
            Expr::InSet { expr, set } => {
                expr.collect_columns(out);
                set.iter().for_each(|e| e.collect_columns(out));
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinOp {
    // Arithmetic
    Add, Sub, Mul, Div, Mod,
    // Comparison
    Eq, Ne, Lt, Le, Gt, Ge,
    // Logical
    And, Or,
    // String
    Like, ILike,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sales() -> Operation {
        Operation::remote(TableRef::qualified("public", "sales"), ["region", "amount"])
            .filter(vec![Expr::col("region").equals(Expr::string("EU"))])
            .arrange(vec![SortKey::desc(Expr::col("amount"))])
    }

    #[test]
    fn test_fingerprint_deterministic() {
        let pipeline1 = sales();
        let pipeline2 = pipeline1.clone();

        assert_eq!(pipeline1.fingerprint(), pipeline2.fingerprint());
        assert_ne!(pipeline1.fingerprint(), sales().take(5).fingerprint());
    }

    #[test]
    fn test_json_round_trip() {
        let pipeline = sales()
            .join(
                Operation::local(["region", "manager"]),
                JoinKind::Left,
                vec![KeyPair::same("region")],
            )
            .distinct(Vec::<String>::new(), false);

        let json = serde_json::to_string(&pipeline).unwrap();
        let parsed: Operation = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed, pipeline);
        assert_eq!(pipeline.fingerprint(), parsed.fingerprint());
    }

    #[test]
    fn test_join_defaults_from_json() {
        let json = r#"{
            "op": "Join",
            "left": {"op": "BaseLocal", "vars": ["a"]},
            "right": {"op": "BaseLocal", "vars": ["a"]},
            "by": [{"left": "a", "right": "a"}]
        }"#;
        let parsed: Operation = serde_json::from_str(json).unwrap();

        match parsed {
            Operation::Join { kind, suffixes, .. } => {
                assert_eq!(kind, JoinKind::Inner);
                assert!(suffixes.is_none());
            }
            other => panic!("expected join, got {:?}", other.kind()),
        }
    }

    #[test]
    fn test_expr_columns() {
        let expr = Expr::call("sum", vec![Expr::col("x")]).gt(Expr::col("y")).and(Expr::col("x").negated());
        assert_eq!(expr.columns(), vec!["x", "y", "x"]);
        assert_eq!(Expr::col("a").as_column(), Some("a"));
        assert_eq!(Expr::int(1).as_column(), None);
    }

    #[test]
    fn test_table_ref_display() {
        assert_eq!(TableRef::local().to_string(), "df");
        assert_eq!(TableRef::qualified("s", "t").to_string(), "s.t");
    }
}
