use crate::objects::{ObjectGraph, ObjectId};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("no emitter for kind `{kind}` (object `{object}`)")]
    UnsupportedKind { object: ObjectId, kind: String },
    #[error("object `{object}` lacks setting `{setting}`")]
    MissingSetting { object: ObjectId, setting: String },
    #[error("object `{object}` has no parent")]
    MissingParent { object: ObjectId },
    #[error("edge points at unknown object `{0}`")]
    UnknownObject(ObjectId),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Consumer of a finished object graph.
pub trait Backend {
    type Output;

    fn emit(&mut self, graph: &ObjectGraph) -> Result<Self::Output, BackendError>;
}

/// Renders the graph as JSON.
#[derive(Clone, Copy, Debug, Default)]
pub struct JsonBackend {
    pub pretty: bool,
}

impl Backend for JsonBackend {
    type Output = String;

    fn emit(&mut self, graph: &ObjectGraph) -> Result<String, BackendError> {
        let out = if self.pretty {
            serde_json::to_string_pretty(graph)?
        } else {
            serde_json::to_string(graph)?
        };
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::objects::{AssembledObject, RegistrationEdge, Setting, Slot};
    use crate::path::FieldPath;
    use crate::value::Value;

    fn graph() -> ObjectGraph {
        let obj = |id: &str, kind: &str, parent: Option<&str>, settings: Vec<Setting>| {
            AssembledObject {
                id: id.into(),
                kind: kind.into(),
                provides: vec![kind.into()],
                parent: parent.map(ObjectId::from),
                dependencies: Vec::new(),
                settings,
                path: FieldPath::root(),
            }
        };
        ObjectGraph {
            objects: vec![
                obj(
                    "relay",
                    "ds2408",
                    None,
                    vec![Setting {
                        name: "address".into(),
                        value: Value::UInt(0x29),
                    }],
                ),
                obj("relay_channels_3", "binary_sensor", Some("relay"), Vec::new()),
            ],
            edges: vec![RegistrationEdge {
                parent: "relay".into(),
                child: "relay_channels_3".into(),
                slot: Slot::Index(3),
            }],
        }
    }

    #[test]
    fn json_carries_objects_and_edges() {
        let out = JsonBackend::default().emit(&graph()).unwrap();
        let v: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(v["objects"][0]["id"], "relay");
        assert_eq!(v["objects"][1]["parent"], "relay");
        assert_eq!(v["edges"][0]["slot"], 3);
        assert_eq!(v["edges"][0]["child"], "relay_channels_3");
    }

    #[test]
    fn pretty_output_is_multiline() {
        let out = JsonBackend { pretty: true }.emit(&graph()).unwrap();
        assert!(out.contains('\n'));
    }
}
