use anyhow::{bail, Context, Result};
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::time::Instant;
use tracing::info;

use assembly_core as asm;
use assembly_core::Backend;
use onewire_components as onewire;

#[derive(Parser, Debug)]
#[command(
    name = "owa",
    version,
    about = "1-Wire device configuration assembler",
    disable_help_subcommand = true
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List the device kinds that can be configured
    Kinds,
    /// Print the schema of one kind as JSON
    Schema {
        #[arg(long)]
        kind: String,
    },
    /// Validate a configuration without assembling it
    Validate {
        /// YAML file path
        #[arg(long)]
        file: Option<String>,
        /// Directory of YAML files, merged in name order
        #[arg(long)]
        dir: Option<String>,
        /// Print normalized entries and diagnostics as JSON
        #[arg(long, action = ArgAction::SetTrue)]
        json: bool,
    },
    /// Validate and assemble a configuration, then emit the object graph
    Assemble {
        /// YAML file path
        #[arg(long)]
        file: Option<String>,
        /// Directory of YAML files, merged in name order
        #[arg(long)]
        dir: Option<String>,
        #[arg(long, value_enum, default_value_t = Emit::Json)]
        emit: Emit,
        /// Overrides `assembly.failure_policy` of the document
        #[arg(long, value_enum)]
        policy: Option<Policy>,
        /// Print counters in Prometheus text format after the build
        #[arg(long, action = ArgAction::SetTrue)]
        metrics: bool,
    },
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum Emit {
    Json,
    Code,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum Policy {
    KeepCommitted,
    RollBack,
}

impl From<Policy> for asm::FailurePolicy {
    fn from(p: Policy) -> Self {
        match p {
            Policy::KeepCommitted => asm::FailurePolicy::KeepCommitted,
            Policy::RollBack => asm::FailurePolicy::RollBack,
        }
    }
}

fn main() -> Result<()> {
    setup_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Kinds => kinds(),
        Commands::Schema { kind } => schema(&kind),
        Commands::Validate { file, dir, json } => validate(file.as_deref(), dir.as_deref(), json),
        Commands::Assemble {
            file,
            dir,
            emit,
            policy,
            metrics,
        } => assemble(file.as_deref(), dir.as_deref(), emit, policy, metrics),
    }
}

fn setup_tracing() {
    // Best-effort; avoid panics if already set
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .try_init();
}

fn catalog() -> Result<asm::SchemaRegistry> {
    onewire::catalog().context("building schema catalogue")
}

fn load(file: Option<&str>, dir: Option<&str>) -> Result<asm::Document> {
    match (file, dir) {
        (Some(f), None) => asm::load_document_file(f),
        (None, Some(d)) => asm::load_document_dir(d)
            .with_context(|| format!("loading configuration directory: {d}")),
        _ => bail!("provide --file <path> or --dir <dir>"),
    }
}

fn report_diagnostics(diagnostics: &[asm::Error]) -> Result<()> {
    if diagnostics.is_empty() {
        return Ok(());
    }
    for d in diagnostics {
        eprintln!("{}: {d}", d.category());
    }
    bail!("{} problem(s) found", diagnostics.len())
}

fn kinds() -> Result<()> {
    let reg = catalog()?;
    for kind in reg.kinds() {
        let schema = reg.lookup(kind)?;
        println!("{kind}\tfields={}", schema.fields().len());
    }
    Ok(())
}

fn schema(kind: &str) -> Result<()> {
    let reg = catalog()?;
    let schema = reg.lookup(kind)?;
    println!("{}", serde_json::to_string_pretty(schema.as_ref())?);
    Ok(())
}

#[derive(Serialize)]
struct ValidateOutput<'a> {
    entries: Vec<ValidatedEntry<'a>>,
    diagnostics: Vec<asm::Diagnostic>,
}

#[derive(Serialize)]
struct ValidatedEntry<'a> {
    kind: &'a str,
    path: String,
    config: &'a asm::ValidatedNode,
}

fn validate(file: Option<&str>, dir: Option<&str>, json: bool) -> Result<()> {
    let reg = catalog()?;
    let doc = load(file, dir)?;
    let (entries, diagnostics) = asm::validate_document(&reg, &doc);
    for e in &entries {
        println!("ok: {} ({})", e.node.path(), e.kind);
    }
    if json {
        let out = ValidateOutput {
            entries: entries
                .iter()
                .map(|e| ValidatedEntry {
                    kind: &e.kind,
                    path: e.node.path().to_string(),
                    config: &e.node,
                })
                .collect(),
            diagnostics: diagnostics.iter().map(asm::Diagnostic::from).collect(),
        };
        println!("{}", serde_json::to_string_pretty(&out)?);
    }
    report_diagnostics(&diagnostics)
}

fn assemble(
    file: Option<&str>,
    dir: Option<&str>,
    emit: Emit,
    policy: Option<Policy>,
    metrics: bool,
) -> Result<()> {
    let reg = catalog()?;
    let doc = load(file, dir)?;
    let mut settings = doc.settings.clone();
    if let Some(p) = policy {
        settings.failure_policy = p.into();
    }

    let hub = asm::MetricsHub::new().map_err(anyhow::Error::msg)?;
    let started = Instant::now();
    let report = asm::compile_observed(&reg, &doc, &settings, &hub.assembly);
    info!(
        objects = report.graph.objects.len(),
        edges = report.graph.edges.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "build finished"
    );

    let out = match emit {
        Emit::Json => asm::JsonBackend { pretty: true }.emit(&report.graph)?,
        Emit::Code => onewire::SetupCodeBackend::new().emit(&report.graph)?,
    };
    print!("{out}");
    if !out.ends_with('\n') {
        println!();
    }
    if metrics {
        print!("{}", hub.encode_text());
    }
    report_diagnostics(&report.diagnostics)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn policy_flag_uses_kebab_case() {
        let cli = Cli::try_parse_from([
            "owa",
            "assemble",
            "--file",
            "conf.yaml",
            "--emit",
            "code",
            "--policy",
            "roll-back",
        ])
        .unwrap();
        match cli.command {
            Commands::Assemble { emit, policy, .. } => {
                assert_eq!(emit, Emit::Code);
                assert_eq!(
                    policy.map(asm::FailurePolicy::from),
                    Some(asm::FailurePolicy::RollBack)
                );
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn load_needs_exactly_one_source() {
        assert!(load(None, None).is_err());
        assert!(load(Some("a.yaml"), Some("dir")).is_err());
    }
}
