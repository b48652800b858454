use crate::fragments::{
    binary_sensor_schema, polling_component_schema, sensor_schema, SensorDefaults, BINARY_SENSOR,
    SENSOR,
};
use assembly_core::{
    ChildSpec, Constraint, ReferenceTarget, Schema, SchemaBuilder, SchemaError, SchemaRegistry,
};
use serde::{Deserialize, Serialize};

/// Capability provided by bus objects and required by every device's
/// `one_wire_id`.
pub const ONE_WIRE_BUS: &str = "one_wire_bus";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriverKind {
    OneWire,
    Ds2408,
    Ds2423,
    Ds2438,
}

impl DriverKind {
    pub const ALL: [DriverKind; 4] = [
        DriverKind::OneWire,
        DriverKind::Ds2408,
        DriverKind::Ds2423,
        DriverKind::Ds2438,
    ];

    /// Configuration key of the kind.
    pub fn kind(self) -> &'static str {
        match self {
            DriverKind::OneWire => "one_wire",
            DriverKind::Ds2408 => "ds2408",
            DriverKind::Ds2423 => "ds2423",
            DriverKind::Ds2438 => "ds2438",
        }
    }

    pub fn from_kind(kind: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|d| d.kind() == kind)
    }

    /// Runtime class instantiated for objects of this kind.
    pub fn class(self) -> &'static str {
        match self {
            DriverKind::OneWire => "one_wire::GPIOOneWireBus",
            DriverKind::Ds2408 => "ds2408_custom::DS2408Component",
            DriverKind::Ds2423 => "ds2423_custom::DS2423Sensor",
            DriverKind::Ds2438 => "ds2438_custom::DS2438Sensor",
        }
    }

    pub fn default_update_interval(self) -> Option<&'static str> {
        match self {
            DriverKind::OneWire => None,
            DriverKind::Ds2408 => Some("1s"),
            DriverKind::Ds2423 | DriverKind::Ds2438 => Some("60s"),
        }
    }

    pub fn schema(self) -> Result<Schema, SchemaError> {
        match self {
            DriverKind::OneWire => Schema::builder(self.kind())
                .required_id()
                .optional("pin", Constraint::int_range(0, 39))
                .provides(ONE_WIRE_BUS)
                .build(),
            DriverKind::Ds2408 => {
                let channel = Schema::builder(BINARY_SENSOR)
                    .extend(&binary_sensor_schema()?)
                    .required("pin", Constraint::int_range(0, 7))
                    .build()?;
                self.device()?
                    .repeated(
                        "channels",
                        channel,
                        ChildSpec::indexed(BINARY_SENSOR, "pin", 0, 7),
                    )
                    .build()
            }
            DriverKind::Ds2423 => {
                let counter = sensor_schema(&SensorDefaults::counter())?;
                self.device()?
                    .nested("counter_a", counter.clone(), ChildSpec::role(SENSOR))
                    .nested("counter_b", counter, ChildSpec::role(SENSOR))
                    .build()
            }
            DriverKind::Ds2438 => {
                let voltage = sensor_schema(&SensorDefaults::voltage())?;
                self.device()?
                    .nested(
                        "temperature",
                        sensor_schema(&SensorDefaults::temperature())?,
                        ChildSpec::role(SENSOR),
                    )
                    .nested("voltage", voltage.clone(), ChildSpec::role(SENSOR))
                    .nested("bus_voltage", voltage, ChildSpec::role(SENSOR))
                    .build()
            }
        }
    }

    /// Fields shared by the addressed devices hanging off a bus.
    fn device(self) -> Result<SchemaBuilder, SchemaError> {
        let mut b = Schema::builder(self.kind())
            .generated_id()
            .reference("one_wire_id", ReferenceTarget::parent(ONE_WIRE_BUS))
            .required("address", Constraint::HexU64);
        if let Some(interval) = self.default_update_interval() {
            b = b.extend_strict(&polling_component_schema(interval)?);
        }
        Ok(b)
    }
}

/// Every 1-Wire kind, registered under its configuration key.
pub fn catalog() -> Result<SchemaRegistry, SchemaError> {
    let mut reg = SchemaRegistry::new();
    for driver in DriverKind::ALL {
        reg.define(driver.kind(), driver.schema()?)?;
    }
    Ok(reg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assembly_core::{validate, FieldType, RawNode, ValidationError, Value};

    fn yaml(s: &str) -> RawNode {
        serde_yaml::from_str(s).unwrap()
    }

    #[test]
    fn catalog_registers_all_kinds() {
        let reg = catalog().unwrap();
        assert_eq!(reg.kinds(), vec!["ds2408", "ds2423", "ds2438", "one_wire"]);
        for d in DriverKind::ALL {
            assert_eq!(DriverKind::from_kind(d.kind()), Some(d));
        }
        assert_eq!(DriverKind::from_kind("ds18b20"), None);
    }

    #[test]
    fn device_fields_keep_declaration_order() {
        let schema = DriverKind::Ds2438.schema().unwrap();
        let names: Vec<&str> = schema.fields().iter().map(|f| f.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "id",
                "one_wire_id",
                "address",
                "update_interval",
                "temperature",
                "voltage",
                "bus_voltage"
            ]
        );
        assert!(matches!(
            schema.field("temperature").map(|f| &f.ty),
            Some(FieldType::Nested { .. })
        ));
    }

    #[test]
    fn ds2408_polls_every_second_by_default() {
        let schema = DriverKind::Ds2408.schema().unwrap();
        let node = validate(&schema, &yaml("{one_wire_id: bus_7, address: 0x29}")).unwrap();
        assert_eq!(
            node.get("update_interval"),
            Some(&Value::Duration(time::Duration::seconds(1)))
        );
        assert!(!node.contains("channels"));
    }

    #[test]
    fn ds2408_channel_pin_out_of_range() {
        let schema = DriverKind::Ds2408.schema().unwrap();
        let errs = validate(
            &schema,
            &yaml("{one_wire_id: bus_7, address: 1, channels: [{pin: 8}, {pin: 2}]}"),
        )
        .unwrap_err();
        assert_eq!(errs.len(), 1);
        assert_eq!(errs[0].path().to_string(), "channels[0].pin");
    }

    #[test]
    fn missing_required_device_fields() {
        let schema = DriverKind::Ds2423.schema().unwrap();
        let errs = validate(&schema, &yaml("{counter_a: {}}")).unwrap_err();
        let paths: Vec<String> = errs
            .iter()
            .filter(|e| matches!(e, ValidationError::MissingRequiredField { .. }))
            .map(|e| e.path().to_string())
            .collect();
        assert_eq!(paths, vec!["one_wire_id", "address"]);
    }

    #[test]
    fn bus_requires_an_id() {
        let schema = DriverKind::OneWire.schema().unwrap();
        assert!(validate(&schema, &yaml("{pin: 4}")).is_err());
        assert!(validate(&schema, &yaml("{id: bus_7, pin: 40}")).is_err());
        assert!(validate(&schema, &yaml("{id: bus_7, pin: 4}")).is_ok());
        assert!(schema.provides().iter().any(|c| c == ONE_WIRE_BUS));
    }
}
