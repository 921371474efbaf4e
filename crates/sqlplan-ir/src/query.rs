//! Query AST
//!
//! Dialect-neutral query tree produced by the builder and consumed by a
//! per-database renderer. Leaves are table references; every other node wraps
//! fully built child queries.

use serde::{Deserialize, Serialize};
use std::fmt::{self, Write};

use crate::{JoinKind, KeyPair, SetOpKind, TableRef};

/// A translated SQL fragment
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Sql(String);

impl Sql {
    pub fn new(sql: impl Into<String>) -> Self {
        Sql(sql.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Sql {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Query {
    Table(TableRef),
    Select(Box<SelectQuery>),
    Join(Box<JoinQuery>),
    SemiJoin(Box<SemiJoinQuery>),
    SetOp(Box<SetOpQuery>),
}

/// Select list entry; `alias` is `None` when `expr` is a bare column that
/// keeps its name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectItem {
    pub expr: Sql,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
}

impl SelectItem {
    pub fn new(expr: Sql, alias: Option<String>) -> Self {
        Self { expr, alias }
    }
}

/// One `SELECT` layer. An empty `select` list means every column of `from`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectQuery {
    pub from: Query,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub select: Vec<SelectItem>,
    #[serde(rename = "where", default, skip_serializing_if = "Vec::is_empty")]
    pub where_: Vec<Sql>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub group_by: Vec<Sql>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub order_by: Vec<Sql>,
    #[serde(default)]
    pub distinct: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,
}

impl SelectQuery {
    /// A pass-through layer over `from`
    pub fn new(from: Query) -> Self {
        Self {
            from,
            select: Vec::new(),
            where_: Vec::new(),
            group_by: Vec::new(),
            order_by: Vec::new(),
            distinct: false,
            limit: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinQuery {
    pub left: Query,
    pub right: Query,
    pub kind: JoinKind,
    pub by: Vec<KeyPair>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SemiJoinQuery {
    pub left: Query,
    pub right: Query,
    pub anti: bool,
    pub by: Vec<KeyPair>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetOpQuery {
    pub left: Query,
    pub right: Query,
    pub kind: SetOpKind,
}

impl From<SelectQuery> for Query {
    fn from(select: SelectQuery) -> Self {
        Query::Select(Box::new(select))
    }
}

impl Query {
    pub fn as_select(&self) -> Option<&SelectQuery> {
        match self {
            Query::Select(select) => Some(select),
            _ => None,
        }
    }

    pub fn as_join(&self) -> Option<&JoinQuery> {
        match self {
            Query::Join(join) => Some(join),
            _ => None,
        }
    }

    /// Number of nested `SelectQuery` layers above the first non-select node
    pub fn select_depth(&self) -> usize {
        let mut depth = 0;
        let mut node = self;
        while let Query::Select(select) = node {
            depth += 1;
            node = &select.from;
        }
        depth
    }

    /// Indented tree for diagnostics
    pub fn explain(&self) -> String {
        let mut out = String::new();
        self.explain_into(&mut out, 0);
        out
    }

    fn explain_into(&self, out: &mut String, depth: usize) {
        let pad = "  ".repeat(depth);
        // Writing to a String cannot fail
        match self {
            Query::Table(table) => {
                let _ = writeln!(out, "{}Table {}", pad, table);
            }
            Query::Select(select) => {
                let _ = write!(out, "{}Select", pad);
                if select.distinct {
                    out.push_str(" DISTINCT");
                }
                if !select.select.is_empty() {
                    let items: Vec<String> = select
                        .select
                        .iter()
                        .map(|item| match &item.alias {
                            Some(alias) => format!("{} AS {}", item.expr, alias),
                            None => item.expr.to_string(),
                        })
                        .collect();
                    let _ = write!(out, " [{}]", items.join(", "));
                }
                explain_clause(out, "where", &select.where_);
                explain_clause(out, "group_by", &select.group_by);
                explain_clause(out, "order_by", &select.order_by);
                if let Some(limit) = select.limit {
                    let _ = write!(out, " limit={}", limit);
                }
                out.push('\n');
                select.from.explain_into(out, depth + 1);
            }
            Query::Join(join) => {
                let _ = writeln!(out, "{}Join {:?} on {}", pad, join.kind, explain_keys(&join.by));
                join.left.explain_into(out, depth + 1);
                join.right.explain_into(out, depth + 1);
            }
            Query::SemiJoin(join) => {
                let label = if join.anti { "AntiJoin" } else { "SemiJoin" };
                let _ = writeln!(out, "{}{} on {}", pad, label, explain_keys(&join.by));
                join.left.explain_into(out, depth + 1);
                join.right.explain_into(out, depth + 1);
            }
            Query::SetOp(set_op) => {
                let _ = writeln!(out, "{}{}", pad, set_op.kind);
                set_op.left.explain_into(out, depth + 1);
                set_op.right.explain_into(out, depth + 1);
            }
        }
    }
}

fn explain_clause(out: &mut String, label: &str, parts: &[Sql]) {
    if parts.is_empty() {
        return;
    }
    let joined: Vec<&str> = parts.iter().map(Sql::as_str).collect();
    let _ = write!(out, " {}=[{}]", label, joined.join(", "));
}

fn explain_keys(by: &[KeyPair]) -> String {
    by.iter()
        .map(|k| format!("{} = {}", k.left, k.right))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filtered() -> Query {
        let mut inner = SelectQuery::new(Query::Table(TableRef::new("t")));
        inner.select = vec![SelectItem::new(Sql::new("\"a\""), None)];
        let mut outer = SelectQuery::new(inner.into());
        outer.where_ = vec![Sql::new("\"a\" > 1")];
        outer.into()
    }

    #[test]
    fn test_select_depth() {
        assert_eq!(filtered().select_depth(), 2);
        assert_eq!(Query::Table(TableRef::local()).select_depth(), 0);
    }

    #[test]
    fn test_explain_tree() {
        let explained = filtered().explain();
        assert_eq!(
            explained,
            "Select where=[\"a\" > 1]\n  Select [\"a\"]\n    Table t\n"
        );
    }

    #[test]
    fn test_serialize_where_key() {
        let json = serde_json::to_value(filtered()).unwrap();
        assert_eq!(json["type"], "Select");
        assert_eq!(json["where"][0], "\"a\" > 1");
        assert_eq!(json["from"]["from"]["type"], "Table");
        assert_eq!(json["from"]["from"]["name"], "t");
    }
}
