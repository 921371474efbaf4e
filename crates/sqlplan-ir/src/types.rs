//! Type system for sqlplan IR

use serde::{Deserialize, Serialize};

/// Target type of a cast expression
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    // Primitives
    Bool,
    Int32,
    Int64,
    Float64,
    Decimal { precision: u8, scale: u8 },

    // Text
    String,
    Varchar(Option<u32>),

    // Temporal
    Date,
    Time,
    Timestamp,
}

impl DataType {
    /// ANSI spelling of the type; dialects may override it
    pub fn sql_name(&self) -> String {
        match self {
            DataType::Bool => "BOOLEAN".to_string(),
            DataType::Int32 => "INTEGER".to_string(),
            DataType::Int64 => "BIGINT".to_string(),
            DataType::Float64 => "DOUBLE PRECISION".to_string(),
            DataType::Decimal { precision, scale } => format!("DECIMAL({}, {})", precision, scale),
            DataType::String => "VARCHAR".to_string(),
            DataType::Varchar(Some(len)) => format!("VARCHAR({})", len),
            DataType::Varchar(None) => "VARCHAR".to_string(),
            DataType::Date => "DATE".to_string(),
            DataType::Time => "TIME".to_string(),
            DataType::Timestamp => "TIMESTAMP".to_string(),
        }
    }
}
