//! Schema model and the builder used to declare device kinds.
//!
//! A [`Schema`] is an immutable, ordered list of field descriptors. Schemas are
//! composed from smaller fragments (a sensor fragment, a polling fragment) with
//! [`SchemaBuilder::extend`] or [`Schema::extend`]; mistakes such as a field
//! declared twice inside one fragment, or a default that fails its own
//! constraint, are reported by [`SchemaBuilder::build`].

use crate::error::SchemaError;
use crate::validate::normalize_scalar;
use crate::value::RawNode;
use serde::Serialize;
use std::sync::Arc;

/// Value constraint of a scalar field.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Constraint {
    Bool,
    Int {
        min: Option<i64>,
        max: Option<i64>,
    },
    Float {
        min: Option<f64>,
        max: Option<f64>,
    },
    /// Unsigned 64-bit, written as an integer or a hex string.
    HexU64,
    Text,
    OneOf {
        options: Vec<String>,
    },
    /// `prefix:name`, e.g. `mdi:counter`.
    Icon,
    /// `60s`, `500ms`, `1min`; bare integers are milliseconds.
    Duration,
    Identifier,
}

impl Constraint {
    pub fn int_range(min: i64, max: i64) -> Self {
        Constraint::Int {
            min: Some(min),
            max: Some(max),
        }
    }

    pub fn one_of(options: &[&str]) -> Self {
        Constraint::OneOf {
            options: options.iter().map(|s| s.to_ascii_lowercase()).collect(),
        }
    }

    /// Human-readable description used as the `expected` part of diagnostics.
    pub fn describe(&self) -> String {
        match self {
            Constraint::Bool => "boolean".to_string(),
            Constraint::Int { min, max } => match (min, max) {
                (Some(lo), Some(hi)) => format!("integer in {lo}..={hi}"),
                (Some(lo), None) => format!("integer >= {lo}"),
                (None, Some(hi)) => format!("integer <= {hi}"),
                (None, None) => "integer".to_string(),
            },
            Constraint::Float { min, max } => match (min, max) {
                (Some(lo), Some(hi)) => format!("number in {lo}..={hi}"),
                (Some(lo), None) => format!("number >= {lo}"),
                (None, Some(hi)) => format!("number <= {hi}"),
                (None, None) => "number".to_string(),
            },
            Constraint::HexU64 => "unsigned 64-bit hex value".to_string(),
            Constraint::Text => "string".to_string(),
            Constraint::OneOf { options } => format!("one of [{}]", options.join(", ")),
            Constraint::Icon => "icon of the form prefix:name".to_string(),
            Constraint::Duration => "time period (e.g. 60s, 500ms)".to_string(),
            Constraint::Identifier => "identifier".to_string(),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceRole {
    /// The referenced object becomes the parent (the bus or hub).
    Parent,
    Dependency,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct ReferenceTarget {
    pub capability: String,
    pub role: ReferenceRole,
}

impl ReferenceTarget {
    pub fn parent(capability: impl Into<String>) -> Self {
        Self {
            capability: capability.into(),
            role: ReferenceRole::Parent,
        }
    }

    pub fn dependency(capability: impl Into<String>) -> Self {
        Self {
            capability: capability.into(),
            role: ReferenceRole::Dependency,
        }
    }
}

/// How a child produced by a field is slotted into its parent.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum SlotPolicy {
    /// Slot is the field name, e.g. `temperature`.
    Role,
    /// Slot is read from an integer field of the child, e.g. `pin`.
    Indexed {
        field: String,
        min: i64,
        max: i64,
        unique: bool,
    },
    /// Slot is the element position in the list.
    Sequential,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct ChildSpec {
    pub kind: String,
    pub slot: SlotPolicy,
}

impl ChildSpec {
    pub fn role(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            slot: SlotPolicy::Role,
        }
    }

    pub fn indexed(kind: impl Into<String>, field: impl Into<String>, min: i64, max: i64) -> Self {
        Self {
            kind: kind.into(),
            slot: SlotPolicy::Indexed {
                field: field.into(),
                min,
                max,
                unique: true,
            },
        }
    }

    pub fn sequential(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            slot: SlotPolicy::Sequential,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "presence", rename_all = "snake_case")]
pub enum Presence {
    Required,
    Optional {
        #[serde(skip_serializing_if = "Option::is_none")]
        default: Option<RawNode>,
    },
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FieldType {
    /// The object's own identity.
    Id,
    Scalar { constraint: Constraint },
    Reference { target: ReferenceTarget },
    /// A single optional sub-node.
    Nested {
        schema: Arc<Schema>,
        #[serde(skip_serializing_if = "Option::is_none")]
        child: Option<ChildSpec>,
    },
    /// A list of sub-nodes, each validated on its own.
    Repeated {
        schema: Arc<Schema>,
        #[serde(skip_serializing_if = "Option::is_none")]
        child: Option<ChildSpec>,
    },
}

impl FieldType {
    pub fn child(&self) -> Option<&ChildSpec> {
        match self {
            FieldType::Nested { child, .. } | FieldType::Repeated { child, .. } => child.as_ref(),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FieldDescriptor {
    pub name: String,
    #[serde(flatten)]
    pub presence: Presence,
    #[serde(rename = "field")]
    pub ty: FieldType,
}

impl FieldDescriptor {
    pub fn is_required(&self) -> bool {
        matches!(self.presence, Presence::Required)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Schema {
    name: String,
    fields: Vec<FieldDescriptor>,
    open: bool,
    provides: Vec<String>,
}

impl Schema {
    pub fn builder(name: impl Into<String>) -> SchemaBuilder {
        SchemaBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Open schemas pass unknown keys through instead of rejecting them.
    pub fn is_open(&self) -> bool {
        self.open
    }

    /// Capability tags satisfied by objects of this kind, its own name first.
    pub fn provides(&self) -> Vec<String> {
        let mut out = vec![self.name.clone()];
        for cap in &self.provides {
            if !out.contains(cap) {
                out.push(cap.clone());
            }
        }
        out
    }

    /// Compose `additions` onto this schema. A field present in both is
    /// replaced by the additional one and a warning is logged when the two
    /// definitions differ.
    pub fn extend(&self, additions: &Schema) -> Schema {
        let mut out = self.clone();
        for field in &additions.fields {
            out.merge_field(field.clone(), true);
        }
        out.merge_meta(additions);
        out
    }

    /// Like [`Schema::extend`] but refuses incompatible redefinitions.
    pub fn try_extend(&self, additions: &Schema) -> Result<Schema, SchemaError> {
        for field in &additions.fields {
            if let Some(existing) = self.field(&field.name) {
                if existing != field {
                    return Err(SchemaError::ConflictingField {
                        schema: self.name.clone(),
                        field: field.name.clone(),
                    });
                }
            }
        }
        Ok(self.extend(additions))
    }

    fn merge_field(&mut self, field: FieldDescriptor, warn: bool) {
        match self.fields.iter_mut().find(|f| f.name == field.name) {
            Some(existing) => {
                if warn && *existing != field {
                    tracing::warn!(
                        schema = %self.name,
                        field = %field.name,
                        "field redefined by extension; the later definition wins"
                    );
                }
                *existing = field;
            }
            None => self.fields.push(field),
        }
    }

    fn merge_meta(&mut self, additions: &Schema) {
        self.open |= additions.open;
        for cap in &additions.provides {
            if !self.provides.contains(cap) {
                self.provides.push(cap.clone());
            }
        }
    }
}

/// Incremental schema declaration. Errors are deferred to [`build`](Self::build)
/// so a declaration reads as one expression.
#[derive(Debug)]
pub struct SchemaBuilder {
    schema: Schema,
    error: Option<SchemaError>,
}

impl SchemaBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            schema: Schema {
                name: name.into(),
                fields: Vec::new(),
                open: false,
                provides: Vec::new(),
            },
            error: None,
        }
    }

    /// Optional `id`; objects without one get a derived id at assembly.
    pub fn generated_id(self) -> Self {
        self.field(FieldDescriptor {
            name: "id".into(),
            presence: Presence::Optional { default: None },
            ty: FieldType::Id,
        })
    }

    pub fn required_id(self) -> Self {
        self.field(FieldDescriptor {
            name: "id".into(),
            presence: Presence::Required,
            ty: FieldType::Id,
        })
    }

    pub fn required(self, name: impl Into<String>, constraint: Constraint) -> Self {
        self.field(FieldDescriptor {
            name: name.into(),
            presence: Presence::Required,
            ty: FieldType::Scalar { constraint },
        })
    }

    pub fn optional(self, name: impl Into<String>, constraint: Constraint) -> Self {
        self.field(FieldDescriptor {
            name: name.into(),
            presence: Presence::Optional { default: None },
            ty: FieldType::Scalar { constraint },
        })
    }

    pub fn optional_default(
        self,
        name: impl Into<String>,
        constraint: Constraint,
        default: impl Into<RawNode>,
    ) -> Self {
        self.field(FieldDescriptor {
            name: name.into(),
            presence: Presence::Optional {
                default: Some(default.into()),
            },
            ty: FieldType::Scalar { constraint },
        })
    }

    pub fn reference(self, name: impl Into<String>, target: ReferenceTarget) -> Self {
        self.field(FieldDescriptor {
            name: name.into(),
            presence: Presence::Required,
            ty: FieldType::Reference { target },
        })
    }

    pub fn nested(self, name: impl Into<String>, schema: Schema, child: ChildSpec) -> Self {
        self.field(FieldDescriptor {
            name: name.into(),
            presence: Presence::Optional { default: None },
            ty: FieldType::Nested {
                schema: Arc::new(schema),
                child: Some(child),
            },
        })
    }

    pub fn repeated(self, name: impl Into<String>, schema: Schema, child: ChildSpec) -> Self {
        self.field(FieldDescriptor {
            name: name.into(),
            presence: Presence::Optional { default: None },
            ty: FieldType::Repeated {
                schema: Arc::new(schema),
                child: Some(child),
            },
        })
    }

    /// Add a field. Declaring the same name twice in one builder is an error.
    pub fn field(mut self, field: FieldDescriptor) -> Self {
        if self.error.is_some() {
            return self;
        }
        if self.schema.field(&field.name).is_some() {
            self.error = Some(SchemaError::DuplicateField {
                schema: self.schema.name.clone(),
                field: field.name,
            });
            return self;
        }
        if let Some(err) = check_default(&self.schema.name, &field) {
            self.error = Some(err);
            return self;
        }
        if let Some(err) = check_slot_field(&field) {
            self.error = Some(err);
            return self;
        }
        self.schema.fields.push(field);
        self
    }

    pub fn open(mut self) -> Self {
        self.schema.open = true;
        self
    }

    pub fn provides(mut self, capability: impl Into<String>) -> Self {
        let cap = capability.into();
        if !self.schema.provides.contains(&cap) {
            self.schema.provides.push(cap);
        }
        self
    }

    /// Merge a fragment; its fields override same-named ones with a warning.
    pub fn extend(mut self, fragment: &Schema) -> Self {
        self.schema = self.schema.extend(fragment);
        self
    }

    /// Merge a fragment, failing the build on an incompatible redefinition.
    pub fn extend_strict(mut self, fragment: &Schema) -> Self {
        if self.error.is_some() {
            return self;
        }
        match self.schema.try_extend(fragment) {
            Ok(schema) => self.schema = schema,
            Err(err) => self.error = Some(err),
        }
        self
    }

    pub fn build(self) -> Result<Schema, SchemaError> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.schema),
        }
    }
}

fn check_default(schema: &str, field: &FieldDescriptor) -> Option<SchemaError> {
    let (Presence::Optional { default: Some(raw) }, FieldType::Scalar { constraint }) =
        (&field.presence, &field.ty)
    else {
        return None;
    };
    normalize_scalar(constraint, raw)
        .err()
        .map(|actual| SchemaError::InvalidDefault {
            schema: schema.to_string(),
            field: field.name.clone(),
            reason: format!("expected {}, got {actual}", constraint.describe()),
        })
}

/// An indexed slot must come from a required integer field of the child.
fn check_slot_field(field: &FieldDescriptor) -> Option<SchemaError> {
    let (FieldType::Nested { schema, child } | FieldType::Repeated { schema, child }) = &field.ty
    else {
        return None;
    };
    let Some(ChildSpec {
        slot: SlotPolicy::Indexed { field: slot, .. },
        ..
    }) = child
    else {
        return None;
    };
    let valid = schema.field(slot).map_or(false, |f| {
        f.is_required()
            && matches!(
                f.ty,
                FieldType::Scalar {
                    constraint: Constraint::Int { .. }
                }
            )
    });
    (!valid).then(|| SchemaError::InvalidSlotField {
        schema: schema.name().to_string(),
        field: slot.clone(),
    })
}
