//! Name resolution over ordered column lists
//!
//! Pure functions: each takes the current variable names and returns the
//! ordered source → output mapping a projection layer needs.

use std::collections::HashSet;
use thiserror::Error;

use crate::{ColumnRename, KeyPair, Suffixes};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NameError {
    #[error("Column '{name}' not found. Available columns: {available:?}")]
    UnknownColumn { name: String, available: Vec<String> },

    #[error("Duplicate output columns: {0:?}")]
    Duplicate(Vec<String>),
}

/// Per-side renames that make a join's non-key columns unique
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Disambiguation {
    pub left: Vec<ColumnRename>,
    pub right: Vec<ColumnRename>,
}

impl Disambiguation {
    pub fn is_noop(&self) -> bool {
        self.left.is_empty() && self.right.is_empty()
    }

    /// Rewrite key pairs to the disambiguated names
    pub fn remap_keys(&self, by: &[KeyPair]) -> Vec<KeyPair> {
        by.iter()
            .map(|key| KeyPair {
                left: lookup(&self.left, &key.left).to_string(),
                right: lookup(&self.right, &key.right).to_string(),
            })
            .collect()
    }
}

fn lookup<'m>(renames: &'m [ColumnRename], name: &'m str) -> &'m str {
    renames
        .iter()
        .find(|r| r.from == name)
        .map(|r| r.to.as_str())
        .unwrap_or(name)
}

/// Fail with `UnknownColumn` unless `name` is one of `vars`
pub fn require_column(vars: &[String], name: &str) -> Result<(), NameError> {
    if vars.iter().any(|v| v == name) {
        Ok(())
    } else {
        Err(NameError::UnknownColumn {
            name: name.to_string(),
            available: vars.to_vec(),
        })
    }
}

/// Fail with `Duplicate` listing every name that appears more than once
pub fn ensure_unique<'n>(names: impl IntoIterator<Item = &'n str>) -> Result<(), NameError> {
    let mut seen = HashSet::new();
    let mut dups: Vec<String> = Vec::new();
    for name in names {
        if !seen.insert(name) && !dups.iter().any(|d| d == name) {
            dups.push(name.to_string());
        }
    }
    if dups.is_empty() {
        Ok(())
    } else {
        Err(NameError::Duplicate(dups))
    }
}

/// Output order of a select
///
/// Grouping variables that were not requested are kept and placed first, in
/// grouping order. Requested columns keep their requested order.
pub fn resolve_select(
    vars: &[String],
    requested: &[ColumnRename],
    group_vars: &[String],
) -> Result<Vec<ColumnRename>, NameError> {
    for item in requested {
        require_column(vars, &item.from)?;
    }

    let mut out: Vec<ColumnRename> = group_vars
        .iter()
        .filter(|g| !requested.iter().any(|r| &r.from == *g))
        .map(|g| ColumnRename::new(g.as_str(), g.as_str()))
        .collect();
    out.extend(requested.iter().cloned());

    ensure_unique(out.iter().map(|r| r.to.as_str()))?;
    Ok(out)
}

/// Every variable in its original position, renamed where mapped
pub fn resolve_rename(vars: &[String], renames: &[ColumnRename]) -> Result<Vec<ColumnRename>, NameError> {
    for rename in renames {
        require_column(vars, &rename.from)?;
    }
    // A second mapping for the same source would be ignored
    ensure_unique(renames.iter().map(|r| r.from.as_str()))?;

    let out: Vec<ColumnRename> = vars
        .iter()
        .map(|v| ColumnRename::new(v.as_str(), lookup(renames, v)))
        .collect();

    ensure_unique(out.iter().map(|r| r.to.as_str()))?;
    Ok(out)
}

/// Suffix names present on both sides of a join
///
/// A name is exempt when it is declared as a key on both sides, since those
/// columns collapse into one logical join key. Returns empty maps when nothing
/// collides, and `Duplicate` when a suffixed name still clashes.
pub fn disambiguate(
    left_vars: &[String],
    right_vars: &[String],
    by: &[KeyPair],
    suffixes: &Suffixes,
) -> Result<Disambiguation, NameError> {
    let collisions: Vec<&String> = left_vars
        .iter()
        .filter(|v| right_vars.contains(v))
        .filter(|v| !by.iter().any(|k| k.is_shared() && &k.left == *v))
        .collect();

    let suffixed = |suffix: &str| -> Vec<ColumnRename> {
        if suffix.is_empty() {
            return Vec::new();
        }
        collisions
            .iter()
            .map(|v| ColumnRename::new(v.as_str(), format!("{}{}", v, suffix)))
            .collect()
    };

    let result = Disambiguation {
        left: suffixed(&suffixes.left),
        right: suffixed(&suffixes.right),
    };

    let left_out: Vec<&str> = left_vars.iter().map(|v| lookup(&result.left, v)).collect();
    let right_out: Vec<&str> = right_vars
        .iter()
        .filter(|v| !by.iter().any(|k| k.is_shared() && &k.right == *v))
        .map(|v| lookup(&result.right, v))
        .collect();
    ensure_unique(left_out.into_iter().chain(right_out))?;

    Ok(result)
}

/// Columns produced by a join: left side, then the right side without the
/// right copies of same-named keys
pub fn join_vars(left_vars: &[String], right_vars: &[String], by: &[KeyPair]) -> Vec<String> {
    left_vars
        .iter()
        .cloned()
        .chain(
            right_vars
                .iter()
                .filter(|v| !by.iter().any(|k| k.is_shared() && &k.right == *v))
                .cloned(),
        )
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_select_prepends_missing_groups() {
        let out = resolve_select(
            &vars(&["g", "a", "b"]),
            &[ColumnRename::new("b", "b"), ColumnRename::new("a", "alpha")],
            &vars(&["g"]),
        )
        .unwrap();

        let names: Vec<&str> = out.iter().map(|r| r.to.as_str()).collect();
        assert_eq!(names, vec!["g", "b", "alpha"]);
    }

    #[test]
    fn test_select_unknown_column() {
        let err = resolve_select(&vars(&["a"]), &[ColumnRename::new("z", "z")], &[]).unwrap_err();
        assert!(matches!(err, NameError::UnknownColumn { ref name, .. } if name == "z"));
    }

    #[test]
    fn test_select_duplicate_alias() {
        let err = resolve_select(
            &vars(&["a", "b"]),
            &[ColumnRename::new("a", "x"), ColumnRename::new("b", "x")],
            &[],
        )
        .unwrap_err();
        assert_eq!(err, NameError::Duplicate(vec!["x".to_string()]));
    }

    #[test]
    fn test_rename_keeps_positions() {
        let out = resolve_rename(&vars(&["a", "b", "c"]), &[ColumnRename::new("b", "beta")]).unwrap();
        let names: Vec<&str> = out.iter().map(|r| r.to.as_str()).collect();
        assert_eq!(names, vec!["a", "beta", "c"]);
    }

    #[test]
    fn test_rename_swap_is_allowed() {
        let out = resolve_rename(
            &vars(&["a", "b"]),
            &[ColumnRename::new("a", "b"), ColumnRename::new("b", "a")],
        )
        .unwrap();
        assert_eq!(out[0], ColumnRename::new("a", "b"));
        assert_eq!(out[1], ColumnRename::new("b", "a"));
    }

    #[test]
    fn test_rename_onto_existing_column() {
        let err = resolve_rename(&vars(&["a", "b"]), &[ColumnRename::new("a", "b")]).unwrap_err();
        assert_eq!(err, NameError::Duplicate(vec!["b".to_string()]));
    }

    #[test]
    fn test_rename_same_source_twice() {
        let err = resolve_rename(
            &vars(&["a", "b"]),
            &[ColumnRename::new("a", "x"), ColumnRename::new("a", "y")],
        )
        .unwrap_err();
        assert_eq!(err, NameError::Duplicate(vec!["a".to_string()]));
    }

    #[test]
    fn test_disambiguate_disjoint_is_noop() {
        let result = disambiguate(
            &vars(&["a", "b"]),
            &vars(&["a", "c"]),
            &[KeyPair::same("a")],
            &Suffixes::default(),
        )
        .unwrap();
        assert!(result.is_noop());
    }

    #[test]
    fn test_disambiguate_shared_non_key() {
        let result = disambiguate(
            &vars(&["a", "val"]),
            &vars(&["a", "val"]),
            &[KeyPair::same("a")],
            &Suffixes::default(),
        )
        .unwrap();
        assert_eq!(result.left, vec![ColumnRename::new("val", "val_x")]);
        assert_eq!(result.right, vec![ColumnRename::new("val", "val_y")]);
    }

    #[test]
    fn test_disambiguate_differently_named_key() {
        // `b` is a key on the right only, so it still collides with the left's `b`
        let result = disambiguate(
            &vars(&["a", "b"]),
            &vars(&["b"]),
            &[KeyPair::new("a", "b")],
            &Suffixes::default(),
        )
        .unwrap();
        assert_eq!(
            result.remap_keys(&[KeyPair::new("a", "b")]),
            vec![KeyPair::new("a", "b_y")]
        );
    }

    #[test]
    fn test_disambiguate_suffix_collision() {
        let err = disambiguate(
            &vars(&["a", "val", "val_x"]),
            &vars(&["a", "val"]),
            &[KeyPair::same("a")],
            &Suffixes::default(),
        )
        .unwrap_err();
        assert_eq!(err, NameError::Duplicate(vec!["val_x".to_string()]));
    }

    #[test]
    fn test_disambiguate_empty_suffix() {
        let result = disambiguate(
            &vars(&["a", "val"]),
            &vars(&["a", "val"]),
            &[KeyPair::same("a")],
            &Suffixes::new("", "_right"),
        )
        .unwrap();
        assert!(result.left.is_empty());
        assert_eq!(result.right, vec![ColumnRename::new("val", "val_right")]);

        let err = disambiguate(
            &vars(&["val"]),
            &vars(&["val"]),
            &[],
            &Suffixes::new("", ""),
        )
        .unwrap_err();
        assert!(matches!(err, NameError::Duplicate(_)));
    }

    #[test]
    fn test_join_vars_collapse_shared_keys() {
        let out = join_vars(
            &vars(&["a", "val_x"]),
            &vars(&["a", "val_y", "b"]),
            &[KeyPair::same("a")],
        );
        assert_eq!(out, vars(&["a", "val_x", "val_y", "b"]));
    }
}
