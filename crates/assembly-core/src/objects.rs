use crate::error::AssemblyError;
use crate::path::FieldPath;
use crate::value::{ReferenceHandle, Value};
use core::fmt;
use serde::Serialize;
use std::collections::{HashMap, HashSet};

#[derive(Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ObjectId(String);

impl ObjectId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ObjectId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Position or role under which a child is registered against its parent.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize)]
#[serde(untagged)]
pub enum Slot {
    Index(i64),
    Role(String),
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Slot::Index(i) => write!(f, "{i}"),
            Slot::Role(r) => f.write_str(r),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Dependency {
    pub field: String,
    pub id: ObjectId,
    pub kind: String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Setting {
    pub name: String,
    pub value: Value,
}

/// One instantiated device or sensor, as handed to the runtime backend.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AssembledObject {
    pub id: ObjectId,
    pub kind: String,
    #[serde(skip)]
    pub provides: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<ObjectId>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<Dependency>,
    pub settings: Vec<Setting>,
    #[serde(skip)]
    pub path: FieldPath,
}

impl AssembledObject {
    pub fn setting(&self, name: &str) -> Option<&Value> {
        self.settings
            .iter()
            .find(|s| s.name == name)
            .map(|s| &s.value)
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct RegistrationEdge {
    pub parent: ObjectId,
    pub child: ObjectId,
    pub slot: Slot,
}

/// Result of looking a reference up in the registry.
#[derive(Clone, Debug, PartialEq)]
pub struct Resolved {
    pub id: ObjectId,
    pub kind: String,
}

/// Position in the registry's append log, used to discard a failed subtree.
#[derive(Clone, Copy, Debug)]
pub struct Checkpoint {
    objects: usize,
    edges: usize,
}

/// Objects assembled during one build invocation. Append-only: entries are
/// only removed by rolling back to a checkpoint taken in the same pass.
#[derive(Debug, Default)]
pub struct ObjectRegistry {
    objects: Vec<AssembledObject>,
    index: HashMap<ObjectId, usize>,
    edges: Vec<RegistrationEdge>,
    failed: HashSet<ObjectId>,
}

impl ObjectRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &ObjectId) -> Option<&AssembledObject> {
        self.index.get(id).map(|&i| &self.objects[i])
    }

    pub fn contains(&self, id: &ObjectId) -> bool {
        self.index.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn objects(&self) -> &[AssembledObject] {
        &self.objects
    }

    pub fn edges(&self) -> &[RegistrationEdge] {
        &self.edges
    }

    /// Whether `id` was registered by an assembly that later failed.
    pub fn is_failed(&self, id: &ObjectId) -> bool {
        self.failed.contains(id)
    }

    pub fn count_kind(&self, kind: &str) -> usize {
        self.objects.iter().filter(|o| o.kind == kind).count()
    }

    /// Look up `handle` and check the found object provides the requested
    /// capability. Objects whose assembly failed are never resolved.
    pub fn resolve(
        &self,
        handle: &ReferenceHandle,
        path: &FieldPath,
    ) -> Result<Resolved, AssemblyError> {
        let id = ObjectId::new(handle.identifier.as_str());
        let obj = self
            .get(&id)
            .filter(|_| !self.failed.contains(&id))
            .ok_or_else(|| AssemblyError::UnresolvedReference {
                path: path.clone(),
                identifier: handle.identifier.clone(),
            })?;
        if !obj.provides.iter().any(|c| c == &handle.capability) {
            return Err(AssemblyError::KindMismatch {
                path: path.clone(),
                identifier: handle.identifier.clone(),
                expected: handle.capability.clone(),
                actual: obj.kind.clone(),
            });
        }
        Ok(Resolved {
            id,
            kind: obj.kind.clone(),
        })
    }

    pub(crate) fn commit(&mut self, object: AssembledObject) -> Result<(), AssemblyError> {
        if self.index.contains_key(&object.id) {
            return Err(AssemblyError::DuplicateId {
                path: object.path.clone(),
                identifier: object.id.to_string(),
            });
        }
        self.failed.remove(&object.id);
        self.index.insert(object.id.clone(), self.objects.len());
        self.objects.push(object);
        Ok(())
    }

    pub(crate) fn register_child(&mut self, parent: &ObjectId, child: &ObjectId, slot: Slot) {
        self.edges.push(RegistrationEdge {
            parent: parent.clone(),
            child: child.clone(),
            slot,
        });
    }

    pub(crate) fn mark_failed(&mut self, id: &ObjectId) {
        self.failed.insert(id.clone());
    }

    pub(crate) fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            objects: self.objects.len(),
            edges: self.edges.len(),
        }
    }

    pub(crate) fn rollback(&mut self, cp: Checkpoint) {
        for obj in self.objects.drain(cp.objects..) {
            self.index.remove(&obj.id);
        }
        self.edges.truncate(cp.edges);
    }

    pub fn into_graph(self) -> ObjectGraph {
        ObjectGraph {
            objects: self.objects,
            edges: self.edges,
        }
    }
}

/// Final hand-off to the runtime backend: objects and edges in commit order.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ObjectGraph {
    pub objects: Vec<AssembledObject>,
    pub edges: Vec<RegistrationEdge>,
}

impl ObjectGraph {
    pub fn get(&self, id: &ObjectId) -> Option<&AssembledObject> {
        self.objects.iter().find(|o| &o.id == id)
    }

    /// Registration edges of `parent`, in registration order.
    pub fn children_of<'a>(
        &'a self,
        parent: &'a ObjectId,
    ) -> impl Iterator<Item = &'a RegistrationEdge> + 'a {
        self.edges.iter().filter(move |e| &e.parent == parent)
    }

    /// Objects that are not registered as anyone's child.
    pub fn roots(&self) -> impl Iterator<Item = &AssembledObject> {
        self.objects
            .iter()
            .filter(move |o| !self.edges.iter().any(|e| e.child == o.id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn object(id: &str, kind: &str, provides: &[&str]) -> AssembledObject {
        AssembledObject {
            id: ObjectId::new(id),
            kind: kind.into(),
            provides: provides.iter().map(|s| s.to_string()).collect(),
            parent: None,
            dependencies: Vec::new(),
            settings: Vec::new(),
            path: FieldPath::root().key(kind),
        }
    }

    fn handle(id: &str, cap: &str) -> ReferenceHandle {
        ReferenceHandle {
            identifier: id.into(),
            capability: cap.into(),
        }
    }

    #[test]
    fn failed_objects_do_not_resolve() {
        let mut reg = ObjectRegistry::new();
        reg.commit(object("hub", "hub", &["hub", "hub_bus"])).unwrap();
        reg.mark_failed(&"hub".into());
        let path = FieldPath::root().key("bus_id");
        assert_eq!(
            reg.resolve(&handle("hub", "hub_bus"), &path).unwrap_err(),
            AssemblyError::UnresolvedReference {
                path,
                identifier: "hub".into()
            }
        );
        assert!(reg.contains(&"hub".into()));
        assert!(reg.is_failed(&"hub".into()));
    }

    #[test]
    fn resolve_checks_capability() {
        let mut reg = ObjectRegistry::new();
        reg.commit(object("bus_7", "one_wire", &["one_wire", "one_wire_bus"]))
            .unwrap();
        reg.commit(object("temp", "sensor", &["sensor"])).unwrap();
        let path = FieldPath::root().key("one_wire_id");

        let ok = reg.resolve(&handle("bus_7", "one_wire_bus"), &path).unwrap();
        assert_eq!(ok.kind, "one_wire");

        let err = reg.resolve(&handle("temp", "one_wire_bus"), &path).unwrap_err();
        assert!(matches!(err, AssemblyError::KindMismatch { ref actual, .. } if actual == "sensor"));

        let err = reg.resolve(&handle("bus_8", "one_wire_bus"), &path).unwrap_err();
        assert_eq!(
            err,
            AssemblyError::UnresolvedReference {
                path,
                identifier: "bus_8".into()
            }
        );
    }

    #[test]
    fn duplicate_ids_are_refused() {
        let mut reg = ObjectRegistry::new();
        reg.commit(object("a", "one_wire", &[])).unwrap();
        let err = reg.commit(object("a", "ds2408", &[])).unwrap_err();
        assert!(matches!(err, AssemblyError::DuplicateId { .. }));
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn rollback_discards_everything_after_checkpoint() {
        let mut reg = ObjectRegistry::new();
        reg.commit(object("bus", "one_wire", &[])).unwrap();
        let cp = reg.checkpoint();
        reg.commit(object("dev", "ds2408", &[])).unwrap();
        reg.commit(object("dev_0", "binary_sensor", &[])).unwrap();
        reg.register_child(&"dev".into(), &"dev_0".into(), Slot::Index(0));
        reg.rollback(cp);
        assert_eq!(reg.len(), 1);
        assert!(reg.edges().is_empty());
        assert!(!reg.contains(&"dev".into()));
        assert!(reg.contains(&"bus".into()));
    }

    #[test]
    fn graph_children_and_roots() {
        let mut reg = ObjectRegistry::new();
        reg.commit(object("dev", "ds2438", &[])).unwrap();
        reg.commit(object("t", "sensor", &[])).unwrap();
        reg.commit(object("v", "sensor", &[])).unwrap();
        reg.register_child(&"dev".into(), &"t".into(), Slot::Role("temperature".into()));
        reg.register_child(&"dev".into(), &"v".into(), Slot::Role("voltage".into()));
        let graph = reg.into_graph();
        let dev = ObjectId::new("dev");
        let slots: Vec<String> = graph.children_of(&dev).map(|e| e.slot.to_string()).collect();
        assert_eq!(slots, vec!["temperature", "voltage"]);
        let roots: Vec<&str> = graph.roots().map(|o| o.id.as_str()).collect();
        assert_eq!(roots, vec!["dev"]);
    }
}
