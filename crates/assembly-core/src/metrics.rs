use prometheus::{Encoder, IntCounter, Registry, TextEncoder};

#[derive(Clone)]
pub struct AssemblyMetrics {
    pub objects_assembled: IntCounter,
    pub edges_registered: IntCounter,
    pub validation_errors: IntCounter,
    pub assembly_errors: IntCounter,
}

#[derive(Clone)]
pub struct MetricsHub {
    pub registry: Registry,
    pub assembly: AssemblyMetrics,
}

impl MetricsHub {
    pub fn new() -> Result<Self, String> {
        let registry = Registry::new();
        let counter = |name: &str, help: &str| {
            IntCounter::new(name, help).map_err(|e| format!("metrics init error: {e}"))
        };
        let assembly = AssemblyMetrics {
            objects_assembled: counter("owa_objects_assembled", "Objects registered")?,
            edges_registered: counter("owa_edges_registered", "Parent/child edges registered")?,
            validation_errors: counter("owa_validation_errors", "Validation errors reported")?,
            assembly_errors: counter("owa_assembly_errors", "Assembly errors reported")?,
        };
        let _ = registry.register(Box::new(assembly.objects_assembled.clone()));
        let _ = registry.register(Box::new(assembly.edges_registered.clone()));
        let _ = registry.register(Box::new(assembly.validation_errors.clone()));
        let _ = registry.register(Box::new(assembly.assembly_errors.clone()));
        Ok(Self { registry, assembly })
    }

    pub fn encode_text(&self) -> String {
        let mut buf = Vec::new();
        let encoder = TextEncoder::new();
        if let Err(e) = encoder.encode(&self.registry.gather(), &mut buf) {
            return format!("error encoding metrics: {e}");
        }
        String::from_utf8(buf).unwrap_or_default()
    }
}
