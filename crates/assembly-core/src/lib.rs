//! assembly-core: schema-driven validation and assembly of declarative device configuration

mod path;
pub use path::{FieldPath, Segment};

mod error;
pub use error::{AssemblyError, Error, Result, SchemaError, ValidationError};

mod value;
pub use value::{RawNode, ReferenceHandle, ValidatedNode, Value};

mod schema;
pub use schema::{
    ChildSpec, Constraint, FieldDescriptor, FieldType, Presence, ReferenceRole, ReferenceTarget,
    Schema, SchemaBuilder, SlotPolicy,
};

mod registry;
pub use registry::SchemaRegistry;

mod validate;
pub use validate::{is_identifier, validate, validate_at};

mod objects;
pub use objects::{
    AssembledObject, Checkpoint, Dependency, ObjectGraph, ObjectId, ObjectRegistry,
    RegistrationEdge, Resolved, Setting, Slot,
};

mod assemble;
pub use assemble::{Assembler, AssemblySettings, Entry, FailurePolicy};

mod loader;
pub use loader::{
    load_document_dir, load_document_file, load_document_str, Document, RawEntry, SETTINGS_KEY,
};

mod compile;
pub use compile::{compile, compile_observed, validate_document, BuildReport, Diagnostic};

mod metrics;
pub use metrics::{AssemblyMetrics, MetricsHub};

mod backend;
pub use backend::{Backend, BackendError, JsonBackend};
