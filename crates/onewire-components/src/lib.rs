//! onewire-components: schemas and setup-code backend for 1-Wire buses and DS24xx devices

mod fragments;
pub use fragments::{
    binary_sensor_schema, polling_component_schema, sensor_schema, SensorDefaults, BINARY_SENSOR,
    SENSOR, STATE_CLASSES,
};

mod drivers;
pub use drivers::{catalog, DriverKind, ONE_WIRE_BUS};

mod codegen;
pub use codegen::SetupCodeBackend;
