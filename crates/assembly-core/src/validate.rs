//! Schema validation of raw configuration trees.
//!
//! Validation is a pure function of `(schema, raw)`. Every problem found is
//! collected so one pass reports all of them; a failing element of a repeated
//! field does not stop its siblings from being checked.

use crate::error::ValidationError;
use crate::path::FieldPath;
use crate::schema::{Constraint, FieldDescriptor, FieldType, Presence, Schema};
use crate::value::{RawNode, ReferenceHandle, ValidatedNode, Value};
use time::Duration;

/// Validate `raw` against `schema`, rooted at the empty path.
pub fn validate(schema: &Schema, raw: &RawNode) -> Result<ValidatedNode, Vec<ValidationError>> {
    validate_at(schema, raw, &FieldPath::root())
}

/// Validate `raw` against `schema`; diagnostics are reported relative to `path`.
pub fn validate_at(
    schema: &Schema,
    raw: &RawNode,
    path: &FieldPath,
) -> Result<ValidatedNode, Vec<ValidationError>> {
    let mut errors = Vec::new();
    match validate_node(schema, raw, path, &mut errors) {
        Some(node) if errors.is_empty() => Ok(node),
        _ => Err(errors),
    }
}

fn validate_node(
    schema: &Schema,
    raw: &RawNode,
    path: &FieldPath,
    errors: &mut Vec<ValidationError>,
) -> Option<ValidatedNode> {
    let Some(map) = raw.as_mapping() else {
        errors.push(ValidationError::ConstraintViolation {
            path: path.clone(),
            expected: "mapping".to_string(),
            actual: describe_raw(raw),
        });
        return None;
    };
    let start = errors.len();
    let mut fields = Vec::with_capacity(schema.fields().len());

    for field in schema.fields() {
        let field_path = path.key(field.name.as_str());
        let present = map
            .get(field.name.as_str())
            .filter(|v| !v.is_null() || matches!(field.ty, FieldType::Nested { .. }));
        match present {
            Some(value) => {
                if let Some(v) = validate_field(field, value, &field_path, errors) {
                    fields.push((field.name.clone(), v));
                }
            }
            None => match &field.presence {
                Presence::Required => {
                    errors.push(ValidationError::MissingRequiredField { path: field_path })
                }
                Presence::Optional { default: Some(default) } => {
                    if let Some(v) = validate_field(field, default, &field_path, errors) {
                        fields.push((field.name.clone(), v));
                    }
                }
                Presence::Optional { default: None } => {}
            },
        }
    }

    for (key, value) in map {
        let name = match key.as_str() {
            Some(name) => name.to_string(),
            None => describe_raw(key),
        };
        if schema.field(&name).is_some() {
            continue;
        }
        if schema.is_open() {
            fields.push((name, Value::Raw(value.clone())));
        } else {
            errors.push(ValidationError::UnknownField {
                path: path.key(name),
            });
        }
    }

    if errors.len() > start {
        return None;
    }
    Some(ValidatedNode::new(schema.name(), path.clone(), fields))
}

fn validate_field(
    field: &FieldDescriptor,
    raw: &RawNode,
    path: &FieldPath,
    errors: &mut Vec<ValidationError>,
) -> Option<Value> {
    match &field.ty {
        FieldType::Id => scalar(&Constraint::Identifier, raw, path, errors),
        FieldType::Scalar { constraint } => scalar(constraint, raw, path, errors),
        FieldType::Reference { target } => match raw.as_str() {
            Some(id) if is_identifier(id) => Some(Value::Reference(ReferenceHandle {
                identifier: id.to_string(),
                capability: target.capability.clone(),
            })),
            _ => {
                errors.push(ValidationError::ConstraintViolation {
                    path: path.clone(),
                    expected: format!("id of a {}", target.capability),
                    actual: describe_raw(raw),
                });
                None
            }
        },
        FieldType::Nested { schema, .. } => {
            let empty = RawNode::Mapping(Default::default());
            let raw = if raw.is_null() { &empty } else { raw };
            validate_node(schema, raw, path, errors).map(Value::Node)
        }
        FieldType::Repeated { schema, .. } => {
            let items: Vec<&RawNode> = match raw {
                RawNode::Sequence(seq) => seq.iter().collect(),
                RawNode::Mapping(_) => vec![raw],
                other => {
                    errors.push(ValidationError::ConstraintViolation {
                        path: path.clone(),
                        expected: "list of mappings".to_string(),
                        actual: describe_raw(other),
                    });
                    return None;
                }
            };
            let start = errors.len();
            let nodes: Vec<ValidatedNode> = items
                .into_iter()
                .enumerate()
                .filter_map(|(i, item)| validate_node(schema, item, &path.index(i), errors))
                .collect();
            (errors.len() == start).then_some(Value::List(nodes))
        }
    }
}

fn scalar(
    constraint: &Constraint,
    raw: &RawNode,
    path: &FieldPath,
    errors: &mut Vec<ValidationError>,
) -> Option<Value> {
    match normalize_scalar(constraint, raw) {
        Ok(v) => Some(v),
        Err(actual) => {
            errors.push(ValidationError::ConstraintViolation {
                path: path.clone(),
                expected: constraint.describe(),
                actual,
            });
            None
        }
    }
}

/// Check one scalar against its constraint. The error is a description of
/// the offending value.
pub(crate) fn normalize_scalar(constraint: &Constraint, raw: &RawNode) -> Result<Value, String> {
    let actual = || describe_raw(raw);
    match constraint {
        Constraint::Bool => match raw {
            RawNode::Bool(b) => Ok(Value::Bool(*b)),
            RawNode::String(s) => match s.to_ascii_lowercase().as_str() {
                "true" | "yes" | "on" | "enable" => Ok(Value::Bool(true)),
                "false" | "no" | "off" | "disable" => Ok(Value::Bool(false)),
                _ => Err(actual()),
            },
            _ => Err(actual()),
        },
        Constraint::Int { min, max } => {
            let v = raw.as_i64().ok_or_else(actual)?;
            let below = min.map_or(false, |lo| v < lo);
            let above = max.map_or(false, |hi| v > hi);
            if below || above {
                return Err(actual());
            }
            Ok(Value::Int(v))
        }
        Constraint::Float { min, max } => {
            let v = match raw {
                RawNode::Number(n) => n.as_f64().ok_or_else(actual)?,
                _ => return Err(actual()),
            };
            let below = min.map_or(false, |lo| v < lo);
            let above = max.map_or(false, |hi| v > hi);
            if !v.is_finite() || below || above {
                return Err(actual());
            }
            Ok(Value::Float(v))
        }
        Constraint::HexU64 => match raw {
            RawNode::Number(n) => n.as_u64().map(Value::UInt).ok_or_else(actual),
            RawNode::String(s) => {
                let t = s.trim();
                let digits = t
                    .strip_prefix("0x")
                    .or_else(|| t.strip_prefix("0X"))
                    .unwrap_or(t);
                u64::from_str_radix(digits, 16)
                    .map(Value::UInt)
                    .map_err(|_| actual())
            }
            _ => Err(actual()),
        },
        Constraint::Text => match raw {
            RawNode::String(s) => Ok(Value::Text(s.clone())),
            RawNode::Number(n) => Ok(Value::Text(n.to_string())),
            RawNode::Bool(b) => Ok(Value::Text(b.to_string())),
            _ => Err(actual()),
        },
        Constraint::OneOf { options } => {
            let s = raw.as_str().ok_or_else(actual)?.to_ascii_lowercase();
            if options.contains(&s) {
                Ok(Value::Text(s))
            } else {
                Err(actual())
            }
        }
        Constraint::Icon => {
            let s = raw.as_str().ok_or_else(actual)?;
            match s.split_once(':') {
                Some((prefix, name)) if !prefix.is_empty() && !name.is_empty() => {
                    Ok(Value::Text(s.to_string()))
                }
                _ => Err(actual()),
            }
        }
        Constraint::Duration => {
            let parsed = match raw {
                RawNode::Number(n) => match n.as_u64() {
                    Some(ms) => i64::try_from(ms).ok().map(Duration::milliseconds),
                    None => n.as_f64().and_then(|ms| millis(ms, 1.0)),
                },
                RawNode::String(s) => parse_duration(s),
                _ => None,
            };
            parsed.map(Value::Duration).ok_or_else(actual)
        }
        Constraint::Identifier => match raw.as_str() {
            Some(s) if is_identifier(s) => Ok(Value::Text(s.to_string())),
            _ => Err(actual()),
        },
    }
}

/// `[A-Za-z_][A-Za-z0-9_]*`
pub fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn parse_duration(text: &str) -> Option<Duration> {
    let t = text.trim();
    let split = t
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(t.len());
    let (number, unit) = t.split_at(split);
    let amount: f64 = number.parse().ok()?;
    let unit_ms = match unit.trim() {
        "" | "ms" => 1.0,
        "s" | "sec" => 1_000.0,
        "min" => 60_000.0,
        "h" => 3_600_000.0,
        "d" => 86_400_000.0,
        _ => return None,
    };
    millis(amount, unit_ms)
}

/// `amount` units of `unit_ms` milliseconds, rounded to whole milliseconds.
fn millis(amount: f64, unit_ms: f64) -> Option<Duration> {
    let ms = (amount * unit_ms).round();
    if !ms.is_finite() || ms < 0.0 || ms > i64::MAX as f64 {
        return None;
    }
    Some(Duration::milliseconds(ms as i64))
}

fn describe_raw(raw: &RawNode) -> String {
    match raw {
        RawNode::Null => "null".to_string(),
        RawNode::Bool(b) => format!("boolean {b}"),
        RawNode::Number(n) if n.is_f64() => format!("number {n}"),
        RawNode::Number(n) => format!("integer {n}"),
        RawNode::String(s) => format!("string {s:?}"),
        RawNode::Sequence(_) => "list".to_string(),
        RawNode::Mapping(_) => "mapping".to_string(),
        RawNode::Tagged(t) => format!("tagged value {}", t.tag),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ChildSpec, ReferenceTarget};

    fn yaml(s: &str) -> RawNode {
        serde_yaml::from_str(s).unwrap()
    }

    fn sensor() -> Schema {
        Schema::builder("sensor")
            .generated_id()
            .optional("name", Constraint::Text)
            .optional_default("accuracy_decimals", Constraint::int_range(0, 6), 1i64)
            .build()
            .unwrap()
    }

    fn channel() -> Schema {
        Schema::builder("binary_sensor")
            .generated_id()
            .required("pin", Constraint::int_range(0, 7))
            .build()
            .unwrap()
    }

    fn device() -> Schema {
        Schema::builder("device")
            .generated_id()
            .reference("bus_id", ReferenceTarget::parent("one_wire_bus"))
            .required("address", Constraint::HexU64)
            .optional_default("update_interval", Constraint::Duration, "60s")
            .nested("temperature", sensor(), ChildSpec::role("sensor"))
            .repeated(
                "channels",
                channel(),
                ChildSpec::indexed("binary_sensor", "pin", 0, 7),
            )
            .build()
            .unwrap()
    }

    #[test]
    fn fills_defaults_and_omits_absent_optionals() {
        let node = validate(&device(), &yaml("{bus_id: bus_7, address: 0x1F}")).unwrap();
        assert_eq!(node.get("address"), Some(&Value::UInt(0x1F)));
        assert_eq!(
            node.get("update_interval"),
            Some(&Value::Duration(Duration::seconds(60)))
        );
        assert!(!node.contains("temperature"));
        assert!(!node.contains("channels"));
        assert!(!node.contains("id"));
        let names: Vec<_> = node.fields().map(|(k, _)| k).collect();
        assert_eq!(names, vec!["bus_id", "address", "update_interval"]);
    }

    #[test]
    fn missing_required_fields_are_reported_with_paths() {
        let errs = validate(&device(), &yaml("{}")).unwrap_err();
        assert_eq!(
            errs,
            vec![
                ValidationError::MissingRequiredField {
                    path: FieldPath::root().key("bus_id")
                },
                ValidationError::MissingRequiredField {
                    path: FieldPath::root().key("address")
                },
            ]
        );
    }

    #[test]
    fn range_is_inclusive_and_not_clamped() {
        let ok = validate(
            &device(),
            &yaml("{bus_id: b, address: 1, channels: [{pin: 0}, {pin: 7}]}"),
        );
        assert!(ok.is_ok());

        let errs = validate(&device(), &yaml("{bus_id: b, address: 1, channels: [{pin: 8}]}"))
            .unwrap_err();
        assert_eq!(errs.len(), 1);
        match &errs[0] {
            ValidationError::ConstraintViolation {
                path,
                expected,
                actual,
            } => {
                assert_eq!(path.to_string(), "channels[0].pin");
                assert_eq!(expected, "integer in 0..=7");
                assert_eq!(actual, "integer 8");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn sibling_errors_are_all_collected() {
        let errs = validate(
            &device(),
            &yaml("{bus_id: b, address: 1, channels: [{pin: 9}, {pin: 2}, {}, {pin: 1, colour: red}]}"),
        )
        .unwrap_err();
        let paths: Vec<String> = errs.iter().map(|e| e.path().to_string()).collect();
        assert_eq!(
            paths,
            vec!["channels[0].pin", "channels[2].pin", "channels[3].colour"]
        );
        assert!(matches!(errs[2], ValidationError::UnknownField { .. }));
    }

    #[test]
    fn unknown_fields_rejected_unless_open() {
        let errs = validate(&sensor(), &yaml("{name: t, filters: []}")).unwrap_err();
        assert_eq!(
            errs,
            vec![ValidationError::UnknownField {
                path: FieldPath::root().key("filters")
            }]
        );

        let open = Schema::builder("sensor").open().extend(&sensor()).build().unwrap();
        let node = validate(&open, &yaml("{name: t, filters: []}")).unwrap();
        assert_eq!(node.get("filters"), Some(&Value::Raw(yaml("[]"))));
    }

    #[test]
    fn reference_shape_only() {
        let node = validate(&device(), &yaml("{bus_id: nowhere, address: 2}")).unwrap();
        assert_eq!(
            node.get("bus_id"),
            Some(&Value::Reference(ReferenceHandle {
                identifier: "nowhere".into(),
                capability: "one_wire_bus".into()
            }))
        );
        let errs = validate(&device(), &yaml("{bus_id: '7bus', address: 2}")).unwrap_err();
        assert!(matches!(errs[0], ValidationError::ConstraintViolation { .. }));
    }

    #[test]
    fn scalar_normalization() {
        let hex = Constraint::HexU64;
        assert_eq!(
            normalize_scalar(&hex, &yaml("'0x3A00000012345629'")),
            Ok(Value::UInt(0x3A00_0000_1234_5629))
        );
        assert_eq!(normalize_scalar(&hex, &yaml("'ff'")), Ok(Value::UInt(255)));
        assert!(normalize_scalar(&hex, &yaml("-1")).is_err());

        assert_eq!(
            normalize_scalar(&Constraint::Bool, &yaml("'ON'")),
            Ok(Value::Bool(true))
        );
        assert_eq!(
            normalize_scalar(&Constraint::one_of(&["measurement"]), &yaml("Measurement")),
            Ok(Value::Text("measurement".into()))
        );
        assert!(normalize_scalar(&Constraint::Icon, &yaml("counter")).is_err());
        assert_eq!(
            normalize_scalar(&Constraint::Duration, &yaml("1min")),
            Ok(Value::Duration(Duration::minutes(1)))
        );
        assert_eq!(
            normalize_scalar(&Constraint::Duration, &yaml("250")),
            Ok(Value::Duration(Duration::milliseconds(250)))
        );
        assert!(normalize_scalar(&Constraint::Duration, &yaml("5 weeks")).is_err());
    }

    #[test]
    fn fractional_durations_agree_between_numbers_and_strings() {
        let d = Constraint::Duration;
        assert_eq!(
            normalize_scalar(&d, &yaml("1.6")),
            normalize_scalar(&d, &yaml("'1.6'"))
        );
        assert_eq!(
            normalize_scalar(&d, &yaml("1.6")),
            Ok(Value::Duration(Duration::milliseconds(2)))
        );
        assert_eq!(
            normalize_scalar(&d, &yaml("'0.5s'")),
            Ok(Value::Duration(Duration::milliseconds(500)))
        );
        assert!(normalize_scalar(&d, &yaml("-1")).is_err());
        assert!(normalize_scalar(&d, &yaml("-0.5")).is_err());
    }

    #[test]
    fn nested_null_enables_child_with_defaults() {
        let node = validate(&device(), &yaml("{bus_id: b, address: 1, temperature: }")).unwrap();
        match node.get("temperature") {
            Some(Value::Node(t)) => {
                assert_eq!(t.get("accuracy_decimals"), Some(&Value::Int(1)));
                assert_eq!(t.path().to_string(), "temperature");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn single_mapping_is_accepted_as_list() {
        let node = validate(&device(), &yaml("{bus_id: b, address: 1, channels: {pin: 4}}")).unwrap();
        match node.get("channels") {
            Some(Value::List(items)) => assert_eq!(items.len(), 1),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn revalidation_is_idempotent() {
        let schema = device();
        let raw = yaml(
            "{bus_id: b, address: '0x1F', update_interval: 1s, temperature: {name: t}, \
             channels: [{pin: 0}, {pin: 3, id: door}]}",
        );
        let first = validate(&schema, &raw).unwrap();
        let second = validate(&schema, &first.to_raw()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn non_mapping_root_is_a_violation() {
        let errs = validate(&device(), &yaml("[1, 2]")).unwrap_err();
        assert_eq!(
            errs,
            vec![ValidationError::ConstraintViolation {
                path: FieldPath::root(),
                expected: "mapping".into(),
                actual: "list".into()
            }]
        );
    }
}
