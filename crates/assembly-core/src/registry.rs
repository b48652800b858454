use crate::error::SchemaError;
use crate::schema::Schema;
use std::collections::HashMap;
use std::sync::Arc;

/// Schemas by device kind. Built once at startup and read-only afterwards.
#[derive(Debug, Default, Clone)]
pub struct SchemaRegistry {
    schemas: HashMap<String, Arc<Schema>>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn define(&mut self, kind: impl Into<String>, schema: Schema) -> Result<(), SchemaError> {
        let kind = kind.into();
        if self.schemas.contains_key(&kind) {
            return Err(SchemaError::DuplicateKind(kind));
        }
        tracing::debug!(kind = %kind, fields = schema.fields().len(), "schema defined");
        self.schemas.insert(kind, Arc::new(schema));
        Ok(())
    }

    pub fn lookup(&self, kind: &str) -> Result<&Arc<Schema>, SchemaError> {
        self.schemas
            .get(kind)
            .ok_or_else(|| SchemaError::UnknownKind(kind.to_string()))
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.schemas.contains_key(kind)
    }

    /// Registered kinds, sorted.
    pub fn kinds(&self) -> Vec<&str> {
        let mut kinds: Vec<&str> = self.schemas.keys().map(String::as_str).collect();
        kinds.sort_unstable();
        kinds
    }

    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Constraint;

    fn bus() -> Schema {
        Schema::builder("one_wire")
            .required_id()
            .optional("pin", Constraint::int_range(0, 39))
            .build()
            .unwrap()
    }

    #[test]
    fn define_and_lookup() {
        let mut reg = SchemaRegistry::new();
        reg.define("one_wire", bus()).unwrap();
        assert_eq!(reg.lookup("one_wire").unwrap().name(), "one_wire");
        assert_eq!(
            reg.lookup("ds9999").unwrap_err(),
            SchemaError::UnknownKind("ds9999".into())
        );
    }

    #[test]
    fn duplicate_kind_is_rejected() {
        let mut reg = SchemaRegistry::new();
        reg.define("one_wire", bus()).unwrap();
        assert_eq!(
            reg.define("one_wire", bus()).unwrap_err(),
            SchemaError::DuplicateKind("one_wire".into())
        );
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn kinds_are_sorted() {
        let mut reg = SchemaRegistry::new();
        reg.define("ds2438", bus()).unwrap();
        reg.define("ds2408", bus()).unwrap();
        reg.define("ds2423", bus()).unwrap();
        assert_eq!(reg.kinds(), vec!["ds2408", "ds2423", "ds2438"]);
    }
}
