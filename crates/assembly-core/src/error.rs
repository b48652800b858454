use crate::objects::{ObjectId, Slot};
use crate::path::FieldPath;
use thiserror::Error;

pub type Result<T, E = Error> = core::result::Result<T, E>;

/// Schema authoring mistakes. These are programmer errors and surface when
/// the schema catalogue is built, before any configuration is read.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum SchemaError {
    #[error("kind already registered: {0}")]
    DuplicateKind(String),
    #[error("unknown kind: {0}")]
    UnknownKind(String),
    #[error("field `{field}` declared twice in schema `{schema}`")]
    DuplicateField { schema: String, field: String },
    #[error("field `{field}` of schema `{schema}` is redefined incompatibly")]
    ConflictingField { schema: String, field: String },
    #[error("slot field `{field}` of `{schema}` must be a required integer")]
    InvalidSlotField { schema: String, field: String },
    #[error("default for `{schema}.{field}` is invalid: {reason}")]
    InvalidDefault {
        schema: String,
        field: String,
        reason: String,
    },
}

/// User configuration errors. All of them are collected in one pass.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("{path}: required field is missing")]
    MissingRequiredField { path: FieldPath },
    #[error("{path}: expected {expected}, got {actual}")]
    ConstraintViolation {
        path: FieldPath,
        expected: String,
        actual: String,
    },
    #[error("{path}: unknown field")]
    UnknownField { path: FieldPath },
}

impl ValidationError {
    pub fn path(&self) -> &FieldPath {
        match self {
            ValidationError::MissingRequiredField { path }
            | ValidationError::ConstraintViolation { path, .. }
            | ValidationError::UnknownField { path } => path,
        }
    }
}

/// Cross-reference and graph errors, reported per failing object.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum AssemblyError {
    #[error("{path}: unresolved reference `{identifier}`")]
    UnresolvedReference { path: FieldPath, identifier: String },
    #[error("{path}: `{identifier}` is a {actual}, expected something providing {expected}")]
    KindMismatch {
        path: FieldPath,
        identifier: String,
        expected: String,
        actual: String,
    },
    #[error("{path}: slot {slot} already taken on `{parent}`")]
    DuplicateSlot {
        path: FieldPath,
        parent: ObjectId,
        slot: Slot,
    },
    #[error("{path}: slot {slot} outside {min}..={max} accepted by `{parent}`")]
    SlotOutOfRange {
        path: FieldPath,
        parent: ObjectId,
        slot: Slot,
        min: i64,
        max: i64,
    },
    #[error("{path}: id `{identifier}` is already in use")]
    DuplicateId { path: FieldPath, identifier: String },
    #[error("{path}: reference cycle through {}", .chain.join(" -> "))]
    ReferenceCycle { path: FieldPath, chain: Vec<String> },
    #[error("{path}: {source}")]
    Schema {
        path: FieldPath,
        #[source]
        source: SchemaError,
    },
}

impl AssemblyError {
    pub fn path(&self) -> &FieldPath {
        match self {
            AssemblyError::UnresolvedReference { path, .. }
            | AssemblyError::KindMismatch { path, .. }
            | AssemblyError::DuplicateSlot { path, .. }
            | AssemblyError::SlotOutOfRange { path, .. }
            | AssemblyError::DuplicateId { path, .. }
            | AssemblyError::ReferenceCycle { path, .. }
            | AssemblyError::Schema { path, .. } => path,
        }
    }
}

/// Any diagnostic the compiler can report.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum Error {
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Assembly(#[from] AssemblyError),
}

impl Error {
    /// Path of the offending configuration node, if the error has one.
    pub fn path(&self) -> Option<&FieldPath> {
        match self {
            Error::Schema(_) => None,
            Error::Validation(e) => Some(e.path()),
            Error::Assembly(e) => Some(e.path()),
        }
    }

    pub fn category(&self) -> &'static str {
        match self {
            Error::Schema(_) => "schema",
            Error::Validation(_) => "validation",
            Error::Assembly(_) => "assembly",
        }
    }
}
