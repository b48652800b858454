use crate::assemble::AssemblySettings;
use crate::path::FieldPath;
use crate::value::RawNode;
use anyhow::{bail, Context};
use std::fs;
use std::path::{Path, PathBuf};

/// Top-level key reserved for [`AssemblySettings`].
pub const SETTINGS_KEY: &str = "assembly";

/// One top-level configuration entry before validation.
#[derive(Debug, Clone, PartialEq)]
pub struct RawEntry {
    pub kind: String,
    pub path: FieldPath,
    pub node: RawNode,
}

/// A configuration document: `<kind>: mapping` or `<kind>: [mapping, ...]`
/// per device kind, plus optional `assembly:` settings.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Document {
    pub entries: Vec<RawEntry>,
    pub settings: AssemblySettings,
}

impl Document {
    pub fn from_value(root: RawNode) -> anyhow::Result<Self> {
        Self::from_value_at(root, &FieldPath::root())
    }

    /// Like [`from_value`](Self::from_value) with entry paths rooted at `base`.
    pub fn from_value_at(root: RawNode, base: &FieldPath) -> anyhow::Result<Self> {
        let mut doc = Document::default();
        let map = match root {
            RawNode::Null => return Ok(doc),
            RawNode::Mapping(map) => map,
            other => bail!("configuration root must be a mapping, got {other:?}"),
        };
        for (key, value) in map {
            let Some(kind) = key.as_str() else {
                bail!("top-level keys must be strings, got {key:?}");
            };
            if kind == SETTINGS_KEY {
                doc.settings =
                    serde_yaml::from_value(value).context("decoding assembly settings")?;
                continue;
            }
            let kind = kind.to_string();
            match value {
                RawNode::Sequence(items) => {
                    for (i, node) in items.into_iter().enumerate() {
                        doc.entries.push(RawEntry {
                            kind: kind.clone(),
                            path: base.key(kind.as_str()).index(i),
                            node,
                        });
                    }
                }
                RawNode::Null => doc.entries.push(RawEntry {
                    path: base.key(kind.as_str()),
                    kind,
                    node: RawNode::Mapping(Default::default()),
                }),
                node => doc.entries.push(RawEntry {
                    path: base.key(kind.as_str()),
                    kind,
                    node,
                }),
            }
        }
        Ok(doc)
    }
}

pub fn load_document_str(src: &str) -> anyhow::Result<Document> {
    let val: RawNode = serde_yaml::from_str(src).context("parsing yaml")?;
    Document::from_value(val)
}

pub fn load_document_file(path: impl AsRef<Path>) -> anyhow::Result<Document> {
    let path = path.as_ref();
    let raw = fs::read_to_string(path)
        .with_context(|| format!("reading configuration: {}", path.display()))?;
    let val: RawNode =
        serde_yaml::from_str(&raw).with_context(|| format!("parsing yaml: {}", path.display()))?;
    Document::from_value(val)
        .with_context(|| format!("decoding configuration: {}", path.display()))
}

/// Merge every `.yml`/`.yaml` file of `dir`, in file name order. Entry paths
/// are prefixed with the file stem so derived ids stay distinct.
pub fn load_document_dir(dir: impl AsRef<Path>) -> anyhow::Result<Document> {
    let mut files: Vec<PathBuf> = Vec::new();
    for entry in fs::read_dir(dir.as_ref())? {
        let entry = entry?;
        let path = entry.path();
        if let Some(ext) = path.extension() {
            if ext == "yml" || ext == "yaml" {
                files.push(path);
            }
        }
    }
    files.sort();

    let mut merged = Document::default();
    let mut settings_from: Option<PathBuf> = None;
    for p in files {
        let raw = fs::read_to_string(&p)
            .with_context(|| format!("reading configuration: {}", p.display()))?;
        let val: RawNode =
            serde_yaml::from_str(&raw).with_context(|| format!("parsing yaml: {}", p.display()))?;
        let has_settings = val
            .as_mapping()
            .map_or(false, |m| m.contains_key(SETTINGS_KEY));
        let stem = p
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let doc = Document::from_value_at(val, &FieldPath::root().key(stem))
            .with_context(|| format!("decoding configuration: {}", p.display()))?;
        if has_settings {
            if let Some(prev) = &settings_from {
                tracing::warn!(
                    previous = %prev.display(),
                    file = %p.display(),
                    "assembly settings given more than once; the later file wins"
                );
            }
            merged.settings = doc.settings;
            settings_from = Some(p.clone());
        }
        merged.entries.extend(doc.entries);
    }
    Ok(merged)
}
