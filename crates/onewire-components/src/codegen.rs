//! Renders an assembled graph as driver setup statements: one constructor per
//! device taking its bus and address, component registration, then creation
//! and wiring of each child sensor.

use crate::drivers::DriverKind;
use crate::fragments::{BINARY_SENSOR, SENSOR};
use assembly_core::{
    AssembledObject, Backend, BackendError, ObjectGraph, RegistrationEdge, Slot, Value,
};

#[derive(Debug, Default)]
pub struct SetupCodeBackend {
    lines: Vec<String>,
}

impl Backend for SetupCodeBackend {
    type Output = String;

    fn emit(&mut self, graph: &ObjectGraph) -> Result<String, BackendError> {
        self.lines.clear();
        for obj in graph.roots() {
            self.root(graph, obj)?;
        }
        let mut out = self.lines.join("\n");
        out.push('\n');
        Ok(out)
    }
}

impl SetupCodeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&mut self, line: String) {
        self.lines.push(line);
    }

    fn root(&mut self, graph: &ObjectGraph, obj: &AssembledObject) -> Result<(), BackendError> {
        let driver =
            DriverKind::from_kind(&obj.kind).ok_or_else(|| BackendError::UnsupportedKind {
                object: obj.id.clone(),
                kind: obj.kind.clone(),
            })?;
        let id = &obj.id;
        let class = driver.class();

        if driver == DriverKind::OneWire {
            self.push(format!("auto *{id} = new {class}();"));
            if let Some(pin) = obj.setting("pin") {
                self.push(format!("{id}->set_pin({pin});"));
            }
            self.push(format!("App.register_component({id});"));
            return Ok(());
        }

        let bus = obj
            .parent
            .as_ref()
            .ok_or_else(|| BackendError::MissingParent { object: id.clone() })?;
        let address = obj
            .setting("address")
            .and_then(Value::as_u64)
            .ok_or_else(|| BackendError::MissingSetting {
                object: id.clone(),
                setting: "address".into(),
            })?;
        self.push(format!("auto *{id} = new {class}({bus}, 0x{address:016X}ULL);"));
        if let Some(Value::Duration(interval)) = obj.setting("update_interval") {
            self.push(format!(
                "{id}->set_update_interval({});",
                interval.whole_milliseconds()
            ));
        }
        self.push(format!("App.register_component({id});"));

        for edge in graph.children_of(&obj.id) {
            self.child(graph, edge)?;
        }
        Ok(())
    }

    fn child(&mut self, graph: &ObjectGraph, edge: &RegistrationEdge) -> Result<(), BackendError> {
        let child = graph
            .get(&edge.child)
            .ok_or_else(|| BackendError::UnknownObject(edge.child.clone()))?;
        let (class, register) = match child.kind.as_str() {
            SENSOR => ("sensor::Sensor", "register_sensor"),
            BINARY_SENSOR => ("binary_sensor::BinarySensor", "register_binary_sensor"),
            other => {
                return Err(BackendError::UnsupportedKind {
                    object: child.id.clone(),
                    kind: other.to_string(),
                })
            }
        };
        let var = &child.id;
        self.push(format!("auto *{var} = new {class}();"));
        self.push(format!("App.{register}({var});"));
        for setting in &child.settings {
            // the pin is the slot, not a setting of the sensor itself
            if setting.name == "pin" {
                continue;
            }
            self.push(format!(
                "{var}->set_{}({});",
                setting.name,
                literal(&setting.name, &setting.value)
            ));
        }
        let parent = &edge.parent;
        match &edge.slot {
            Slot::Index(pin) => self.push(format!("{parent}->register_channel({pin}, {var});")),
            Slot::Role(role) => self.push(format!("{parent}->set_{role}_sensor({var});")),
        }
        Ok(())
    }
}

fn literal(name: &str, value: &Value) -> String {
    match value {
        Value::Text(s) if name == "state_class" => {
            format!("sensor::STATE_CLASS_{}", s.to_ascii_uppercase())
        }
        Value::Text(s) => format!("{s:?}"),
        Value::UInt(v) => format!("0x{v:X}ULL"),
        Value::Duration(d) => d.whole_milliseconds().to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog;
    use assembly_core::{compile, load_document_str, ObjectId, Setting};

    fn emit(src: &str) -> String {
        let doc = load_document_str(src).unwrap();
        let report = compile(&catalog().unwrap(), &doc, &doc.settings);
        assert!(report.is_ok(), "{:?}", report.diagnostics);
        SetupCodeBackend::new().emit(&report.graph).unwrap()
    }

    #[test]
    fn ds2408_channels_are_registered_by_pin() {
        let code = emit(
            "one_wire:\n  - id: bus_7\n    pin: 4\nds2408:\n  - id: relays\n    one_wire_id: bus_7\n    address: 0x2900000012345678\n    channels:\n      - {pin: 0, name: Door}\n      - {pin: 3}\n",
        );
        let lines: Vec<&str> = code.lines().collect();
        assert_eq!(
            lines[..6],
            [
                "auto *bus_7 = new one_wire::GPIOOneWireBus();",
                "bus_7->set_pin(4);",
                "App.register_component(bus_7);",
                "auto *relays = new ds2408_custom::DS2408Component(bus_7, 0x2900000012345678ULL);",
                "relays->set_update_interval(1000);",
                "App.register_component(relays);",
            ]
        );
        assert!(code.contains("auto *relays_channels_0 = new binary_sensor::BinarySensor();"));
        assert!(code.contains("relays_channels_0->set_name(\"Door\");"));
        assert!(code.contains("relays_channels_0->set_inverted(false);"));
        assert!(code.contains("relays->register_channel(0, relays_channels_0);"));
        assert!(code.contains("relays->register_channel(3, relays_channels_3);"));
        assert!(!code.contains("set_pin(0)"));
    }

    #[test]
    fn ds2438_wires_only_configured_sensors() {
        let code = emit(
            "one_wire: {id: ow}\nds2438:\n  - one_wire_id: ow\n    address: 0x26\n    voltage:\n      name: VAD\n    bus_voltage:\n",
        );
        assert!(code.contains("new ds2438_custom::DS2438Sensor(ow, 0x0000000000000026ULL);"));
        assert!(code.contains("ds2438_0->set_update_interval(60000);"));
        assert!(code.contains("ds2438_0->set_voltage_sensor(ds2438_0_voltage);"));
        assert!(code.contains("ds2438_0->set_bus_voltage_sensor(ds2438_0_bus_voltage);"));
        assert!(code.contains("ds2438_0_voltage->set_accuracy_decimals(2);"));
        assert!(code.contains("ds2438_0_voltage->set_state_class(sensor::STATE_CLASS_MEASUREMENT);"));
        assert!(!code.contains("temperature"));
    }

    #[test]
    fn ds2423_counters_use_counter_defaults() {
        let code = emit(
            "one_wire: {id: ow}\nds2423:\n  - id: meter\n    one_wire_id: ow\n    address: 0x1D\n    counter_a: {name: Water}\n",
        );
        assert!(code.contains("meter->set_counter_a_sensor(meter_counter_a);"));
        assert!(code.contains("meter_counter_a->set_icon(\"mdi:counter\");"));
        assert!(code.contains(
            "meter_counter_a->set_state_class(sensor::STATE_CLASS_TOTAL_INCREASING);"
        ));
        assert!(!code.contains("counter_b"));
    }

    #[test]
    fn unknown_root_kind_is_rejected() {
        let graph = ObjectGraph {
            objects: vec![AssembledObject {
                id: ObjectId::new("x"),
                kind: "ds18b20".into(),
                provides: Vec::new(),
                parent: None,
                dependencies: Vec::new(),
                settings: vec![Setting {
                    name: "address".into(),
                    value: Value::UInt(1),
                }],
                path: Default::default(),
            }],
            edges: Vec::new(),
        };
        let err = SetupCodeBackend::new().emit(&graph).unwrap_err();
        assert!(matches!(err, BackendError::UnsupportedKind { kind, .. } if kind == "ds18b20"));
    }
}
