use sqlplan_ir::names::NameError;
use sqlplan_ir::OpKind;
use sqlplan_registry::Capability;
use thiserror::Error;

use crate::oracle::{OracleError, TranslateError};

/// Failure while building a pipeline; carries the offending operation
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BuildError {
    #[error("{op}: unsupported operation: {message}")]
    UnsupportedOperation { op: OpKind, message: String },

    #[error("{op}: duplicate output columns {names:?}")]
    NameCollision { op: OpKind, names: Vec<String> },

    #[error("{op}: {source}")]
    Translation {
        op: OpKind,
        #[source]
        source: TranslateError,
    },

    #[error("{op}: dialect '{dialect}' does not support {capability}")]
    MissingCapability {
        op: OpKind,
        dialect: String,
        capability: Capability,
    },
}

impl BuildError {
    pub(crate) fn from_oracle(op: OpKind, err: OracleError) -> Self {
        match err {
            OracleError::Translation(source) => BuildError::Translation { op, source },
            OracleError::MissingCapability { dialect, capability } => BuildError::MissingCapability {
                op,
                dialect,
                capability,
            },
        }
    }

    pub(crate) fn from_names(op: OpKind, err: NameError) -> Self {
        match err {
            NameError::UnknownColumn { name, available } => BuildError::Translation {
                op,
                source: TranslateError::UnknownColumn { name, available },
            },
            NameError::Duplicate(names) => BuildError::NameCollision { op, names },
        }
    }

    /// The operation that failed
    pub fn op(&self) -> OpKind {
        match self {
            BuildError::UnsupportedOperation { op, .. }
            | BuildError::NameCollision { op, .. }
            | BuildError::Translation { op, .. }
            | BuildError::MissingCapability { op, .. } => *op,
        }
    }
}
