//! Schema fragments shared by the 1-Wire device kinds.

use assembly_core::{Constraint, RawNode, Schema, SchemaBuilder, SchemaError};

pub const SENSOR: &str = "sensor";
pub const BINARY_SENSOR: &str = "binary_sensor";

pub const STATE_CLASSES: &[&str] = &["measurement", "total", "total_increasing"];

/// Per-slot defaults of a [`sensor_schema`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SensorDefaults {
    pub unit_of_measurement: Option<&'static str>,
    pub accuracy_decimals: Option<i64>,
    pub icon: Option<&'static str>,
    pub device_class: Option<&'static str>,
    pub state_class: Option<&'static str>,
}

impl SensorDefaults {
    pub fn counter() -> Self {
        Self {
            unit_of_measurement: Some(""),
            accuracy_decimals: Some(0),
            icon: Some("mdi:counter"),
            device_class: None,
            state_class: Some("total_increasing"),
        }
    }

    pub fn temperature() -> Self {
        Self {
            unit_of_measurement: Some("°C"),
            accuracy_decimals: Some(1),
            icon: None,
            device_class: Some("temperature"),
            state_class: Some("measurement"),
        }
    }

    pub fn voltage() -> Self {
        Self {
            unit_of_measurement: Some("V"),
            accuracy_decimals: Some(2),
            icon: None,
            device_class: Some("voltage"),
            state_class: Some("measurement"),
        }
    }
}

fn with_default<T: Into<RawNode>>(
    builder: SchemaBuilder,
    name: &str,
    constraint: Constraint,
    default: Option<T>,
) -> SchemaBuilder {
    match default {
        Some(value) => builder.optional_default(name, constraint, value),
        None => builder.optional(name, constraint),
    }
}

/// Fields every entity carries, sensor or binary sensor.
fn entity(name: &str) -> SchemaBuilder {
    Schema::builder(name)
        .generated_id()
        .optional("name", Constraint::Text)
}

pub fn sensor_schema(defaults: &SensorDefaults) -> Result<Schema, SchemaError> {
    let b = entity(SENSOR);
    let b = with_default(
        b,
        "unit_of_measurement",
        Constraint::Text,
        defaults.unit_of_measurement,
    );
    let b = with_default(
        b,
        "accuracy_decimals",
        Constraint::int_range(0, 6),
        defaults.accuracy_decimals,
    );
    let b = with_default(b, "icon", Constraint::Icon, defaults.icon);
    let b = with_default(b, "device_class", Constraint::Text, defaults.device_class);
    let b = with_default(
        b,
        "state_class",
        Constraint::one_of(STATE_CLASSES),
        defaults.state_class,
    );
    b.optional("internal", Constraint::Bool)
        .optional("disabled_by_default", Constraint::Bool)
        .build()
}

pub fn binary_sensor_schema() -> Result<Schema, SchemaError> {
    entity(BINARY_SENSOR)
        .optional("device_class", Constraint::Text)
        .optional_default("inverted", Constraint::Bool, false)
        .optional("internal", Constraint::Bool)
        .optional("disabled_by_default", Constraint::Bool)
        .build()
}

/// `update_interval` with a per-kind default.
pub fn polling_component_schema(default_interval: &str) -> Result<Schema, SchemaError> {
    Schema::builder("polling_component")
        .optional_default("update_interval", Constraint::Duration, default_interval)
        .build()
}
