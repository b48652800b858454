//! Whole-document driver: validate every entry, then assemble the ones that
//! validated.

use crate::assemble::{Assembler, AssemblySettings, Entry};
use crate::error::{Error, ValidationError};
use crate::loader::Document;
use crate::metrics::AssemblyMetrics;
use crate::objects::ObjectGraph;
use crate::registry::SchemaRegistry;
use crate::validate::validate_at;
use serde::Serialize;
use tracing::{debug, info};

/// Result of one build: whatever assembled, plus every diagnostic.
#[derive(Clone, Debug, Default)]
pub struct BuildReport {
    pub graph: ObjectGraph,
    pub diagnostics: Vec<Error>,
}

/// Flat, serializable form of one diagnostic.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Diagnostic {
    pub category: &'static str,
    pub path: Option<String>,
    pub message: String,
}

impl From<&Error> for Diagnostic {
    fn from(err: &Error) -> Self {
        Self {
            category: err.category(),
            path: err.path().map(ToString::to_string),
            message: err.to_string(),
        }
    }
}

impl BuildReport {
    pub fn is_ok(&self) -> bool {
        self.diagnostics.is_empty()
    }

    pub fn count(&self, category: &str) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.category() == category)
            .count()
    }

    pub fn diagnostic_records(&self) -> Vec<Diagnostic> {
        self.diagnostics.iter().map(Diagnostic::from).collect()
    }

    pub fn record(&self, metrics: &AssemblyMetrics) {
        metrics
            .objects_assembled
            .inc_by(self.graph.objects.len() as u64);
        metrics.edges_registered.inc_by(self.graph.edges.len() as u64);
        metrics
            .validation_errors
            .inc_by(self.count("validation") as u64);
        metrics.assembly_errors.inc_by(self.count("assembly") as u64);
    }
}

/// Validate every entry of `doc`. Unknown kinds are reported as an unknown
/// field at the entry's path.
pub fn validate_document(schemas: &SchemaRegistry, doc: &Document) -> (Vec<Entry>, Vec<Error>) {
    let mut entries = Vec::with_capacity(doc.entries.len());
    let mut errors = Vec::new();
    for raw in &doc.entries {
        let Ok(schema) = schemas.lookup(&raw.kind) else {
            errors.push(
                ValidationError::UnknownField {
                    path: raw.path.clone(),
                }
                .into(),
            );
            continue;
        };
        match validate_at(schema, &raw.node, &raw.path) {
            Ok(node) => entries.push(Entry {
                kind: raw.kind.clone(),
                node,
            }),
            Err(errs) => {
                debug!(path = %raw.path, errors = errs.len(), "entry failed validation");
                errors.extend(errs.into_iter().map(Error::from));
            }
        }
    }
    (entries, errors)
}

pub fn compile(
    schemas: &SchemaRegistry,
    doc: &Document,
    settings: &AssemblySettings,
) -> BuildReport {
    let (entries, mut diagnostics) = validate_document(schemas, doc);
    let validated = entries.len();
    let mut assembler = Assembler::new(schemas, settings.clone());
    diagnostics.extend(assembler.assemble_all(&entries).into_iter().map(Error::from));
    let graph = assembler.finish();
    info!(
        entries = doc.entries.len(),
        validated,
        objects = graph.objects.len(),
        diagnostics = diagnostics.len(),
        "compile finished"
    );
    BuildReport { graph, diagnostics }
}

/// [`compile`] and add the outcome to `metrics`.
pub fn compile_observed(
    schemas: &SchemaRegistry,
    doc: &Document,
    settings: &AssemblySettings,
    metrics: &AssemblyMetrics,
) -> BuildReport {
    let report = compile(schemas, doc, settings);
    report.record(metrics);
    report
}
