//! Dialect capability descriptors
//!
//! A `Dialect` is an immutable description of what a target database accepts:
//! identifier quoting, the function table, type spellings and optional SQL
//! features. It is consulted, never mutated, while a pipeline is built.

use serde::{Deserialize, Serialize};
use sqlplan_ir::{DataType, SetOpKind};
use std::collections::HashMap;
use std::fmt;

use crate::{FunctionKind, FunctionRegistry, FunctionSignature, RegistryError};

/// Optional SQL feature a dialect may lack
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Capability {
    WindowFunctions,
    ILike,
    FullJoin,
    SetOp(SetOpKind),
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Capability::WindowFunctions => f.write_str("window functions"),
            Capability::ILike => f.write_str("ILIKE"),
            Capability::FullJoin => f.write_str("FULL JOIN"),
            Capability::SetOp(kind) => write!(f, "{}", kind),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Dialect {
    name: String,
    quote_open: char,
    quote_close: char,
    window_functions: bool,
    ilike: bool,
    full_join: bool,
    intersect: bool,
    except: bool,
    functions: FunctionRegistry,
    type_names: HashMap<DataType, String>,
}

impl Dialect {
    /// Standard SQL with every optional feature available
    pub fn ansi() -> Self {
        Self {
            name: "ansi".to_string(),
            quote_open: '"',
            quote_close: '"',
            window_functions: true,
            ilike: false,
            full_join: true,
            intersect: true,
            except: true,
            functions: FunctionRegistry::new(),
            type_names: HashMap::new(),
        }
    }

    pub fn postgres() -> Self {
        let mut dialect = Self::ansi();
        dialect.name = "postgres".to_string();
        dialect.ilike = true;
        dialect.type_names.insert(DataType::String, "TEXT".to_string());
        dialect
    }

    pub fn mysql() -> Self {
        let mut dialect = Self::ansi();
        dialect.name = "mysql".to_string();
        dialect.quote_open = '`';
        dialect.quote_close = '`';
        dialect.full_join = false;
        dialect.intersect = false;
        dialect.except = false;
        dialect
            .functions
            .register(FunctionSignature::new("nchar", "CHAR_LENGTH", FunctionKind::Scalar, 1, Some(1)));
        for (data_type, name) in [
            (DataType::Int32, "SIGNED"),
            (DataType::Int64, "SIGNED"),
            (DataType::Float64, "DOUBLE"),
            (DataType::String, "CHAR"),
            (DataType::Varchar(None), "CHAR"),
            (DataType::Timestamp, "DATETIME"),
        ] {
            dialect.type_names.insert(data_type, name.to_string());
        }
        dialect
    }

    pub fn sqlite() -> Self {
        let mut dialect = Self::ansi();
        dialect.name = "sqlite".to_string();
        dialect.full_join = false;
        // No sample variance/deviation without extensions
        dialect.functions.remove("sd");
        dialect.functions.remove("var");
        dialect
            .functions
            .register(FunctionSignature::new("log", "LOG", FunctionKind::Scalar, 1, Some(1)));
        for (data_type, name) in [
            (DataType::Int32, "INTEGER"),
            (DataType::Int64, "INTEGER"),
            (DataType::Float64, "REAL"),
            (DataType::String, "TEXT"),
            (DataType::Bool, "INTEGER"),
        ] {
            dialect.type_names.insert(data_type, name.to_string());
        }
        dialect
    }

    pub fn by_name(name: &str) -> Result<Self, RegistryError> {
        match name.to_lowercase().as_str() {
            "ansi" | "default" => Ok(Self::ansi()),
            "postgres" | "postgresql" => Ok(Self::postgres()),
            "mysql" | "mariadb" => Ok(Self::mysql()),
            "sqlite" => Ok(Self::sqlite()),
            other => Err(RegistryError::UnknownDialect(other.to_string())),
        }
    }

    pub fn with_window_functions(mut self, enabled: bool) -> Self {
        self.window_functions = enabled;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn functions(&self) -> &FunctionRegistry {
        &self.functions
    }

    pub fn supports(&self, capability: Capability) -> bool {
        match capability {
            Capability::WindowFunctions => self.window_functions,
            Capability::ILike => self.ilike,
            Capability::FullJoin => self.full_join,
            Capability::SetOp(SetOpKind::Union | SetOpKind::UnionAll) => true,
            Capability::SetOp(SetOpKind::Intersect) => self.intersect,
            Capability::SetOp(SetOpKind::Except) => self.except,
        }
    }

    /// Quote an identifier, doubling any embedded closing quote
    pub fn quote_ident(&self, name: &str) -> String {
        let escaped = name.replace(self.quote_close, &format!("{0}{0}", self.quote_close));
        format!("{}{}{}", self.quote_open, escaped, self.quote_close)
    }

    pub fn type_name(&self, data_type: &DataType) -> String {
        self.type_names
            .get(data_type)
            .cloned()
            .unwrap_or_else(|| data_type.sql_name())
    }
}

impl Default for Dialect {
    fn default() -> Self {
        Self::ansi()
    }
}
