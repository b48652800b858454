//! Turning validated configuration into registered objects.
//!
//! Per object the steps are: resolve references, instantiate, register the
//! object under its id, then build and register children in field
//! declaration order. [`Assembler::assemble_all`] runs this over every
//! top-level entry of a document in two phases so entries may reference
//! each other regardless of the order they were written in.

use crate::error::{AssemblyError, SchemaError};
use crate::objects::{
    AssembledObject, Dependency, ObjectGraph, ObjectId, ObjectRegistry, Setting, Slot,
};
use crate::path::FieldPath;
use crate::registry::SchemaRegistry;
use crate::schema::{ChildSpec, FieldType, ReferenceRole, Schema, SlotPolicy};
use crate::value::{ReferenceHandle, ValidatedNode, Value};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, warn};

/// What happens to objects already registered when a later step of the same
/// top-level object fails.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Keep the parent and every sibling registered before the failure.
    #[default]
    KeepCommitted,
    /// Discard everything the failing top-level object registered.
    RollBack,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AssemblySettings {
    pub failure_policy: FailurePolicy,
}

/// A validated top-level configuration entry.
#[derive(Clone, Debug, PartialEq)]
pub struct Entry {
    pub kind: String,
    pub node: ValidatedNode,
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum Progress {
    Pending,
    InProgress,
    Done,
    Failed,
}

/// Bookkeeping for one [`Assembler::assemble_all`] pass.
struct Pass<'e> {
    entries: &'e [Entry],
    ids: Vec<Option<ObjectId>>,
    declared: HashMap<ObjectId, usize>,
    progress: Vec<Progress>,
    stack: Vec<ObjectId>,
    errors: Vec<AssemblyError>,
}

/// Single-threaded assembler. The registry it owns is scoped to one build
/// invocation; [`finish`](Self::finish) hands the result to the backend.
pub struct Assembler<'s> {
    schemas: &'s SchemaRegistry,
    settings: AssemblySettings,
    registry: ObjectRegistry,
}

impl<'s> Assembler<'s> {
    pub fn new(schemas: &'s SchemaRegistry, settings: AssemblySettings) -> Self {
        Self {
            schemas,
            settings,
            registry: ObjectRegistry::new(),
        }
    }

    pub fn settings(&self) -> &AssemblySettings {
        &self.settings
    }

    pub fn registry(&self) -> &ObjectRegistry {
        &self.registry
    }

    pub fn finish(self) -> ObjectGraph {
        self.registry.into_graph()
    }

    /// Assemble one object of `kind` against what is registered so far.
    pub fn assemble(
        &mut self,
        kind: &str,
        node: &ValidatedNode,
    ) -> Result<ObjectId, AssemblyError> {
        let id = root_id(kind, node, self.registry.count_kind(kind));
        self.assemble_as(kind, node, id)
    }

    /// Two-phase assembly of a whole document. Phase one declares every
    /// entry's id; phase two assembles entries in order, assembling a
    /// declared dependency first when an entry refers to it. Returns every
    /// error met; failing entries never become visible to later lookups.
    pub fn assemble_all(&mut self, entries: &[Entry]) -> Vec<AssemblyError> {
        let mut pass = Pass {
            entries,
            ids: Vec::with_capacity(entries.len()),
            declared: HashMap::new(),
            progress: vec![Progress::Pending; entries.len()],
            stack: Vec::new(),
            errors: Vec::new(),
        };

        let mut ordinals: HashMap<&str, usize> = HashMap::new();
        for (i, entry) in entries.iter().enumerate() {
            let ordinal = ordinals.entry(entry.kind.as_str()).or_insert(0);
            let id = root_id(&entry.kind, &entry.node, *ordinal);
            *ordinal += 1;
            if pass.declared.contains_key(&id) || self.registry.contains(&id) {
                pass.errors.push(AssemblyError::DuplicateId {
                    path: entry.node.path().clone(),
                    identifier: id.to_string(),
                });
                pass.progress[i] = Progress::Failed;
                pass.ids.push(None);
            } else {
                pass.declared.insert(id.clone(), i);
                pass.ids.push(Some(id));
            }
        }

        for i in 0..entries.len() {
            self.visit(&mut pass, i);
        }

        info!(
            entries = entries.len(),
            objects = self.registry.len(),
            edges = self.registry.edges().len(),
            errors = pass.errors.len(),
            "assembly pass complete"
        );
        pass.errors
    }

    fn visit(&mut self, pass: &mut Pass<'_>, i: usize) {
        if pass.progress[i] != Progress::Pending {
            return;
        }
        let Some(id) = pass.ids[i].clone() else {
            return;
        };
        let entries = pass.entries;
        let entry = &entries[i];
        pass.progress[i] = Progress::InProgress;
        pass.stack.push(id.clone());

        let mut refs = Vec::new();
        collect_references(&entry.node, &mut refs);
        for (path, handle) in refs {
            let target = ObjectId::new(handle.identifier.as_str());
            let Some(&j) = pass.declared.get(&target) else {
                continue;
            };
            match pass.progress[j] {
                Progress::Pending => self.visit(pass, j),
                Progress::InProgress => {
                    let start = pass.stack.iter().position(|s| s == &target).unwrap_or(0);
                    let mut chain: Vec<String> =
                        pass.stack[start..].iter().map(|s| s.to_string()).collect();
                    chain.push(target.to_string());
                    warn!(object = %id, "reference cycle");
                    pass.errors.push(AssemblyError::ReferenceCycle { path, chain });
                    pass.progress[i] = Progress::Failed;
                    pass.stack.pop();
                    return;
                }
                Progress::Done | Progress::Failed => {}
            }
        }

        pass.progress[i] = match self.assemble_as(&entry.kind, &entry.node, id) {
            Ok(_) => Progress::Done,
            Err(err) => {
                pass.errors.push(err);
                Progress::Failed
            }
        };
        pass.stack.pop();
    }

    fn assemble_as(
        &mut self,
        kind: &str,
        node: &ValidatedNode,
        id: ObjectId,
    ) -> Result<ObjectId, AssemblyError> {
        let schema = self
            .schemas
            .lookup(kind)
            .map_err(|source| AssemblyError::Schema {
                path: node.path().clone(),
                source,
            })?
            .clone();

        // Every reference in the subtree must resolve before anything is
        // registered.
        let mut refs = Vec::new();
        collect_references(node, &mut refs);
        for (path, handle) in &refs {
            self.registry.resolve(handle, path)?;
        }

        let checkpoint = self.registry.checkpoint();
        let result = self.build(kind, &schema, node, id.clone(), None);
        if let Err(err) = &result {
            warn!(object = %id, kind, error = %err, "assembly failed");
            self.registry.mark_failed(&id);
            if self.settings.failure_policy == FailurePolicy::RollBack {
                self.registry.rollback(checkpoint);
            }
        }
        result
    }

    fn build(
        &mut self,
        kind: &str,
        schema: &Schema,
        node: &ValidatedNode,
        id: ObjectId,
        owner: Option<&ObjectId>,
    ) -> Result<ObjectId, AssemblyError> {
        let mut dependencies = Vec::new();
        let mut parent = owner.cloned();
        let mut settings = Vec::new();

        for (name, value) in node.fields() {
            let field = schema.field(name);
            match (field.map(|f| &f.ty), value) {
                (Some(FieldType::Reference { target }), Value::Reference(handle)) => {
                    let resolved = self.registry.resolve(handle, &node.path().key(name))?;
                    if parent.is_none() && target.role == ReferenceRole::Parent {
                        parent = Some(resolved.id.clone());
                    }
                    dependencies.push(Dependency {
                        field: name.to_string(),
                        id: resolved.id,
                        kind: resolved.kind,
                    });
                }
                (Some(FieldType::Id), _) => {}
                (Some(FieldType::Scalar { .. }), _) | (None, _) => settings.push(Setting {
                    name: name.to_string(),
                    value: value.clone(),
                }),
                _ => {}
            }
        }

        let mut provides = schema.provides();
        if !provides.iter().any(|p| p == kind) {
            provides.insert(0, kind.to_string());
        }
        self.registry.commit(AssembledObject {
            id: id.clone(),
            kind: kind.to_string(),
            provides,
            parent,
            dependencies,
            settings,
            path: node.path().clone(),
        })?;
        debug!(object = %id, kind, "registered");

        for field in schema.fields() {
            let Some(spec) = field.ty.child() else {
                continue;
            };
            let mut taken: HashSet<Slot> = HashSet::new();
            let child_schema = match &field.ty {
                FieldType::Nested { schema, .. } | FieldType::Repeated { schema, .. } => schema,
                _ => continue,
            };
            let children: Vec<&ValidatedNode> = match node.get(&field.name) {
                Some(Value::Node(child)) => vec![child],
                Some(Value::List(items)) => items.iter().collect(),
                _ => continue,
            };
            let nested = matches!(field.ty, FieldType::Nested { .. });
            for (position, child) in children.into_iter().enumerate() {
                let slot = slot_for(spec, &field.name, position, nested, child)?;
                self.check_slot(spec, &id, &slot, child.path(), &mut taken)?;
                let child_id = match child.id() {
                    Some(explicit) => ObjectId::new(explicit),
                    None if nested => ObjectId::new(format!("{id}_{}", field.name)),
                    None => {
                        let unique = matches!(spec.slot, SlotPolicy::Indexed { unique: true, .. });
                        let suffix = if unique {
                            slot.to_string()
                        } else {
                            position.to_string()
                        };
                        ObjectId::new(format!("{id}_{}_{suffix}", field.name))
                    }
                };
                let child_id = self.build(&spec.kind, child_schema, child, child_id, Some(&id))?;
                self.registry.register_child(&id, &child_id, slot.clone());
                debug!(parent = %id, child = %child_id, slot = %slot, "child registered");
            }
        }
        Ok(id)
    }

    fn check_slot(
        &self,
        spec: &ChildSpec,
        parent: &ObjectId,
        slot: &Slot,
        path: &FieldPath,
        taken: &mut HashSet<Slot>,
    ) -> Result<(), AssemblyError> {
        let SlotPolicy::Indexed {
            min, max, unique, ..
        } = &spec.slot
        else {
            return Ok(());
        };
        if let Slot::Index(i) = slot {
            if i < min || i > max {
                return Err(AssemblyError::SlotOutOfRange {
                    path: path.clone(),
                    parent: parent.clone(),
                    slot: slot.clone(),
                    min: *min,
                    max: *max,
                });
            }
        }
        if *unique && !taken.insert(slot.clone()) {
            return Err(AssemblyError::DuplicateSlot {
                path: path.clone(),
                parent: parent.clone(),
                slot: slot.clone(),
            });
        }
        Ok(())
    }
}

fn slot_for(
    spec: &ChildSpec,
    field: &str,
    position: usize,
    nested: bool,
    child: &ValidatedNode,
) -> Result<Slot, AssemblyError> {
    match &spec.slot {
        SlotPolicy::Indexed { field: slot, .. } => child
            .get(slot)
            .and_then(Value::as_i64)
            .map(Slot::Index)
            .ok_or_else(|| AssemblyError::Schema {
                path: child.path().key(slot.as_str()),
                source: SchemaError::InvalidSlotField {
                    schema: child.schema().to_string(),
                    field: slot.clone(),
                },
            }),
        SlotPolicy::Role if nested => Ok(Slot::Role(field.to_string())),
        SlotPolicy::Role | SlotPolicy::Sequential => {
            Ok(Slot::Index(i64::try_from(position).unwrap_or(i64::MAX)))
        }
    }
}

/// Explicit id, else derived from the entry path, else `<kind>_<ordinal>`.
fn root_id(kind: &str, node: &ValidatedNode, ordinal: usize) -> ObjectId {
    if let Some(id) = node.id() {
        return ObjectId::new(id);
    }
    if node.path().is_root() {
        ObjectId::new(format!("{kind}_{ordinal}"))
    } else {
        ObjectId::new(node.path().to_identifier())
    }
}

fn collect_references(node: &ValidatedNode, out: &mut Vec<(FieldPath, ReferenceHandle)>) {
    for (name, value) in node.fields() {
        match value {
            Value::Reference(handle) => out.push((node.path().key(name), handle.clone())),
            Value::Node(child) => collect_references(child, out),
            Value::List(items) => items.iter().for_each(|c| collect_references(c, out)),
            _ => {}
        }
    }
}
