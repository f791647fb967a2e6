//! Config resolution.
//!
//! A pipeline is described by one JSON document: which task and model family to run,
//! where its artifacts live, and the knobs for preprocessing and the model. [`resolve_with`]
//! turns a [`ConfigSource`] into an immutable [`PipelineConfig`], checking it against the
//! task's [`ConfigSchema`].
//!
//! ```json
//! {
//!   "task": "sentiment",
//!   "family": "bag_of_embeddings",
//!   "labels": ["negative", "positive"],
//!   "artifacts": {
//!     "weights": { "path": "model.safetensors", "crc32": "1a2b3c4d" },
//!     "vocab": { "repo": "org/model", "filename": "vocab.json" }
//!   },
//!   "preprocessing": { "max_seq_len": 64 },
//!   "hyperparameters": { "embed_dim": 8 },
//!   "device": "cpu"
//! }
//! ```
//!
//! Resolution only reads the source. Relative artifact paths are joined onto the directory of
//! the config file; mapping sources keep them as written.

use crate::error::{PipelineError, Result};
use crate::pipelines::utils::DeviceRequest;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

const TOP_LEVEL_FIELDS: &[&str] = &[
    "task",
    "family",
    "labels",
    "artifacts",
    "preprocessing",
    "hyperparameters",
    "device",
    "cache_dir",
];

// ============ Sources ============

/// Where a config document comes from.
#[derive(Debug, Clone)]
pub enum ConfigSource {
    /// A JSON file on disk.
    File(PathBuf),
    /// An in-memory JSON mapping.
    Mapping(Value),
}

impl From<PathBuf> for ConfigSource {
    fn from(path: PathBuf) -> Self {
        ConfigSource::File(path)
    }
}

impl From<&Path> for ConfigSource {
    fn from(path: &Path) -> Self {
        ConfigSource::File(path.to_path_buf())
    }
}

impl From<&str> for ConfigSource {
    fn from(path: &str) -> Self {
        ConfigSource::File(PathBuf::from(path))
    }
}

impl From<Value> for ConfigSource {
    fn from(mapping: Value) -> Self {
        ConfigSource::Mapping(mapping)
    }
}

// ============ Artifacts ============

/// Where an artifact file lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactLocation {
    /// A file on the local filesystem.
    Local(PathBuf),
    /// A file in a HuggingFace hub model repository.
    Hub {
        /// Repository id, e.g. `answerdotai/ModernBERT-base`.
        repo: String,
        /// File name inside the repository.
        filename: String,
        /// Branch, tag or commit. `None` means `main`.
        revision: Option<String>,
    },
}

impl ArtifactLocation {
    /// Stable identifier used in cache keys.
    pub fn identifier(&self) -> String {
        match self {
            ArtifactLocation::Local(path) => format!("local:{}", path.display()),
            ArtifactLocation::Hub {
                repo,
                filename,
                revision,
            } => format!(
                "hub:{repo}@{}/{filename}",
                revision.as_deref().unwrap_or("main")
            ),
        }
    }
}

/// One declared artifact with its optional integrity pins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactSpec {
    location: ArtifactLocation,
    crc32: Option<u32>,
    size: Option<u64>,
}

impl ArtifactSpec {
    /// Where the file lives.
    pub fn location(&self) -> &ArtifactLocation {
        &self.location
    }

    /// Expected CRC-32 (IEEE) of the file contents.
    pub fn crc32(&self) -> Option<u32> {
        self.crc32
    }

    /// Expected file size in bytes.
    pub fn size(&self) -> Option<u64> {
        self.size
    }

    fn identifier(&self) -> String {
        let mut id = self.location.identifier();
        if let Some(crc) = self.crc32 {
            id.push_str(&format!("#crc32:{crc:08x}"));
        }
        if let Some(size) = self.size {
            id.push_str(&format!("#size:{size}"));
        }
        id
    }
}

// ============ Preprocessing ============

/// Tokenization options shared by every task.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PreprocessingConfig {
    /// Maximum number of tokens fed to the model.
    pub max_seq_len: usize,
    /// Lowercase text before tokenizing (word-level families).
    pub lowercase: bool,
    /// Cut overlong encodings to `max_seq_len` instead of rejecting them.
    pub truncate: bool,
    /// Vocabulary entry substituted for out-of-vocabulary words.
    pub unknown_token: String,
    /// Vocabulary entry used to pad batches.
    pub pad_token: String,
}

impl Default for PreprocessingConfig {
    fn default() -> Self {
        Self {
            max_seq_len: 128,
            lowercase: true,
            truncate: true,
            unknown_token: "[UNK]".to_string(),
            pad_token: "[PAD]".to_string(),
        }
    }
}

// ============ Schema ============

/// Semantic type a hyperparameter must have.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Integer greater than zero.
    PositiveInteger,
    /// Any JSON number.
    Number,
    /// `true` or `false`.
    Boolean,
    /// Any JSON string.
    String,
}

impl FieldKind {
    fn accepts(self, value: &Value) -> bool {
        match self {
            FieldKind::PositiveInteger => value.as_u64().is_some_and(|n| n > 0),
            FieldKind::Number => value.is_number(),
            FieldKind::Boolean => value.is_boolean(),
            FieldKind::String => value.is_string(),
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FieldKind::PositiveInteger => "positive integer",
            FieldKind::Number => "number",
            FieldKind::Boolean => "boolean",
            FieldKind::String => "string",
        };
        write!(f, "{name}")
    }
}

#[derive(Debug, Clone)]
struct FieldRule {
    name: &'static str,
    kind: FieldKind,
    required: bool,
}

/// Artifacts and hyperparameters one model family needs.
#[derive(Debug, Clone)]
pub struct FamilySchema {
    name: &'static str,
    required_artifacts: Vec<&'static str>,
    optional_artifacts: Vec<&'static str>,
    hyperparameters: Vec<FieldRule>,
}

impl FamilySchema {
    /// Start a family schema.
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            required_artifacts: Vec::new(),
            optional_artifacts: Vec::new(),
            hyperparameters: Vec::new(),
        }
    }

    /// Artifacts that must be declared.
    pub fn artifacts(mut self, names: &[&'static str]) -> Self {
        self.required_artifacts.extend_from_slice(names);
        self
    }

    /// Artifacts that may be declared.
    pub fn optional_artifacts(mut self, names: &[&'static str]) -> Self {
        self.optional_artifacts.extend_from_slice(names);
        self
    }

    /// A hyperparameter that must be present with the given kind.
    pub fn hyperparameter(mut self, name: &'static str, kind: FieldKind) -> Self {
        self.hyperparameters.push(FieldRule {
            name,
            kind,
            required: true,
        });
        self
    }

    /// A hyperparameter that, when present, must have the given kind.
    pub fn optional_hyperparameter(mut self, name: &'static str, kind: FieldKind) -> Self {
        self.hyperparameters.push(FieldRule {
            name,
            kind,
            required: false,
        });
        self
    }

    /// Family name as written in the config.
    pub fn name(&self) -> &'static str {
        self.name
    }
}

/// How many labels a task accepts, and what to use when none are given.
#[derive(Debug, Clone)]
pub struct LabelRule {
    min: usize,
    max: Option<usize>,
    default: Option<&'static [&'static str]>,
}

impl LabelRule {
    /// At least `min` labels, no default.
    pub fn at_least(min: usize) -> Self {
        Self {
            min,
            max: None,
            default: None,
        }
    }

    /// Exactly `count` labels, falling back to `default`.
    pub fn exactly(count: usize, default: &'static [&'static str]) -> Self {
        Self {
            min: count,
            max: Some(count),
            default: Some(default),
        }
    }
}

/// Everything a task requires of its config document.
#[derive(Debug, Clone)]
pub struct ConfigSchema {
    task: &'static str,
    families: Vec<FamilySchema>,
    labels: LabelRule,
}

impl ConfigSchema {
    /// Start a schema for `task`.
    pub fn new(task: &'static str, labels: LabelRule) -> Self {
        Self {
            task,
            families: Vec::new(),
            labels,
        }
    }

    /// Add a supported model family.
    pub fn family(mut self, family: FamilySchema) -> Self {
        self.families.push(family);
        self
    }

    /// Task name this schema belongs to.
    pub fn task(&self) -> &'static str {
        self.task
    }

    /// Names of the supported families.
    pub fn family_names(&self) -> Vec<&'static str> {
        self.families.iter().map(|f| f.name).collect()
    }

    fn find_family(&self, name: &str) -> Option<&FamilySchema> {
        self.families.iter().find(|f| f.name == name)
    }
}

// ============ Resolved config ============

/// A validated, immutable pipeline configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    task: String,
    family: String,
    labels: Vec<String>,
    artifacts: BTreeMap<String, ArtifactSpec>,
    preprocessing: PreprocessingConfig,
    hyperparameters: Map<String, Value>,
    device: DeviceRequest,
    cache_dir: Option<PathBuf>,
}

impl PipelineConfig {
    /// Task name (registry key).
    pub fn task(&self) -> &str {
        &self.task
    }

    /// Model family within the task.
    pub fn family(&self) -> &str {
        &self.family
    }

    /// Output labels in class-index order.
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Declared artifacts by name.
    pub fn artifacts(&self) -> &BTreeMap<String, ArtifactSpec> {
        &self.artifacts
    }

    /// Tokenization options.
    pub fn preprocessing(&self) -> &PreprocessingConfig {
        &self.preprocessing
    }

    /// Raw hyperparameter mapping.
    pub fn hyperparameters(&self) -> &Map<String, Value> {
        &self.hyperparameters
    }

    /// Requested inference device.
    pub fn device(&self) -> &DeviceRequest {
        &self.device
    }

    /// Root directory for hub downloads, if overridden.
    pub fn cache_dir(&self) -> Option<&Path> {
        self.cache_dir.as_deref()
    }

    /// A required positive-integer hyperparameter.
    pub fn usize_param(&self, name: &str) -> Result<usize> {
        let value = self.hyperparameters.get(name).ok_or_else(|| {
            PipelineError::config(format!("hyperparameters.{name}"), "missing required field")
        })?;
        value
            .as_u64()
            .filter(|&n| n > 0)
            .map(|n| n as usize)
            .ok_or_else(|| {
                PipelineError::config(
                    format!("hyperparameters.{name}"),
                    format!("expected positive integer, got {value}"),
                )
            })
    }

    /// An optional positive-integer hyperparameter.
    pub fn usize_param_or(&self, name: &str, default: usize) -> Result<usize> {
        if self.hyperparameters.contains_key(name) {
            self.usize_param(name)
        } else {
            Ok(default)
        }
    }

    /// An optional numeric hyperparameter.
    pub fn f64_param_or(&self, name: &str, default: f64) -> Result<f64> {
        match self.hyperparameters.get(name) {
            None => Ok(default),
            Some(value) => value.as_f64().ok_or_else(|| {
                PipelineError::config(
                    format!("hyperparameters.{name}"),
                    format!("expected number, got {value}"),
                )
            }),
        }
    }

    /// Stable key identifying the artifact set this config loads.
    ///
    /// Two configs with the same key share a cached bundle.
    pub fn artifact_key(&self) -> String {
        let mut key = format!("{}/{}@{}", self.task, self.family, self.device);
        for (name, spec) in &self.artifacts {
            key.push_str(&format!("|{name}={}", spec.identifier()));
        }
        // Loaded resources also depend on these.
        key.push_str(&format!(
            "|labels={}|unk={}|pad={}|hp={}",
            self.labels.join(","),
            self.preprocessing.unknown_token,
            self.preprocessing.pad_token,
            Value::Object(self.hyperparameters.clone())
        ));
        key
    }

    pub(crate) fn with_device(mut self, device: DeviceRequest) -> Self {
        self.device = device;
        self
    }
}

// ============ Resolution ============

/// Resolve `source` into a [`PipelineConfig`].
///
/// `schema_for` maps the document's `task` to its schema and decides what an unknown
/// task means for the caller.
pub fn resolve_with<F>(source: impl Into<ConfigSource>, schema_for: F) -> Result<PipelineConfig>
where
    F: FnOnce(&str) -> Result<ConfigSchema>,
{
    let (document, base_dir) = match source.into() {
        ConfigSource::File(path) => {
            let content = std::fs::read_to_string(&path).map_err(|e| {
                PipelineError::config(
                    "<source>",
                    format!("cannot read '{}': {e}", path.display()),
                )
            })?;
            let document: Value = serde_json::from_str(&content).map_err(|e| {
                PipelineError::config(
                    "<source>",
                    format!("'{}' is not valid JSON: {e}", path.display()),
                )
            })?;
            (document, path.parent().map(Path::to_path_buf))
        }
        ConfigSource::Mapping(document) => (document, None),
    };

    let root = document.as_object().ok_or_else(|| {
        PipelineError::config("<root>", format!("expected JSON object, got {}", kind_of(&document)))
    })?;

    if let Some(unknown) = root.keys().find(|k| !TOP_LEVEL_FIELDS.contains(&k.as_str())) {
        return Err(PipelineError::config(unknown.as_str(), "unknown field"));
    }

    let task = required_str(root, "task")?;
    let schema = schema_for(task)?;
    let family_name = required_str(root, "family")?;
    let family = schema.find_family(family_name).ok_or_else(|| {
        PipelineError::config(
            "family",
            format!(
                "task `{task}` has no family `{family_name}` (available: {})",
                schema.family_names().join(", ")
            ),
        )
    })?;

    let labels = resolve_labels(root.get("labels"), &schema.labels)?;
    let artifacts = resolve_artifacts(root.get("artifacts"), family, base_dir.as_deref())?;
    let preprocessing = resolve_preprocessing(root.get("preprocessing"))?;
    let hyperparameters = resolve_hyperparameters(root.get("hyperparameters"), family)?;

    let device = match root.get("device") {
        None => DeviceRequest::Cpu,
        Some(Value::String(s)) => s.parse()?,
        Some(other) => {
            return Err(PipelineError::config(
                "device",
                format!("expected string, got {}", kind_of(other)),
            ))
        }
    };

    let cache_dir = match root.get("cache_dir") {
        None => None,
        Some(Value::String(s)) => Some(join_base(base_dir.as_deref(), Path::new(s))),
        Some(other) => {
            return Err(PipelineError::config(
                "cache_dir",
                format!("expected string, got {}", kind_of(other)),
            ))
        }
    };

    Ok(PipelineConfig {
        task: task.to_string(),
        family: family_name.to_string(),
        labels,
        artifacts,
        preprocessing,
        hyperparameters,
        device,
        cache_dir,
    })
}

fn required_str<'a>(root: &'a Map<String, Value>, field: &str) -> Result<&'a str> {
    match root.get(field) {
        None => Err(PipelineError::config(field, "missing required field")),
        Some(Value::String(s)) if !s.trim().is_empty() => Ok(s.as_str()),
        Some(Value::String(_)) => Err(PipelineError::config(field, "must not be empty")),
        Some(other) => Err(PipelineError::config(
            field,
            format!("expected string, got {}", kind_of(other)),
        )),
    }
}

fn resolve_labels(value: Option<&Value>, rule: &LabelRule) -> Result<Vec<String>> {
    let labels: Vec<String> = match value {
        None => match rule.default {
            Some(default) => default.iter().map(|s| s.to_string()).collect(),
            None => return Err(PipelineError::config("labels", "missing required field")),
        },
        Some(Value::Array(items)) => items
            .iter()
            .enumerate()
            .map(|(i, item)| match item {
                Value::String(s) if !s.is_empty() => Ok(s.clone()),
                other => Err(PipelineError::config(
                    format!("labels[{i}]"),
                    format!("expected non-empty string, got {other}"),
                )),
            })
            .collect::<Result<_>>()?,
        Some(other) => {
            return Err(PipelineError::config(
                "labels",
                format!("expected array of strings, got {}", kind_of(other)),
            ))
        }
    };

    if labels.len() < rule.min || rule.max.is_some_and(|max| labels.len() > max) {
        let expected = match rule.max {
            Some(max) if max == rule.min => format!("exactly {max}"),
            Some(max) => format!("{} to {max}", rule.min),
            None => format!("at least {}", rule.min),
        };
        return Err(PipelineError::config(
            "labels",
            format!("expected {expected} labels, got {}", labels.len()),
        ));
    }

    for (i, label) in labels.iter().enumerate() {
        if labels[..i].contains(label) {
            return Err(PipelineError::config(
                format!("labels[{i}]"),
                format!("duplicate label `{label}`"),
            ));
        }
    }

    Ok(labels)
}

fn resolve_artifacts(
    value: Option<&Value>,
    family: &FamilySchema,
    base_dir: Option<&Path>,
) -> Result<BTreeMap<String, ArtifactSpec>> {
    let empty = Map::new();
    let declared = match value {
        None => &empty,
        Some(Value::Object(map)) => map,
        Some(other) => {
            return Err(PipelineError::config(
                "artifacts",
                format!("expected object, got {}", kind_of(other)),
            ))
        }
    };

    if let Some(missing) = family
        .required_artifacts
        .iter()
        .find(|name| !declared.contains_key(**name))
    {
        return Err(PipelineError::config(
            format!("artifacts.{missing}"),
            format!("family `{}` requires this artifact", family.name),
        ));
    }

    let mut artifacts = BTreeMap::new();
    for (name, spec) in declared {
        let known = family.required_artifacts.contains(&name.as_str())
            || family.optional_artifacts.contains(&name.as_str());
        if !known {
            return Err(PipelineError::config(
                format!("artifacts.{name}"),
                format!("not an artifact of family `{}`", family.name),
            ));
        }
        artifacts.insert(name.clone(), resolve_artifact(name, spec, base_dir)?);
    }
    Ok(artifacts)
}

fn resolve_artifact(name: &str, value: &Value, base_dir: Option<&Path>) -> Result<ArtifactSpec> {
    let field = |sub: &str| format!("artifacts.{name}.{sub}");
    let map = value.as_object().ok_or_else(|| {
        PipelineError::config(
            format!("artifacts.{name}"),
            format!("expected object, got {}", kind_of(value)),
        )
    })?;

    if let Some(unknown) = map
        .keys()
        .find(|k| !["path", "repo", "filename", "revision", "crc32", "size"].contains(&k.as_str()))
    {
        return Err(PipelineError::config(field(unknown.as_str()), "unknown field"));
    }

    let get_str = |key: &str| -> Result<Option<&str>> {
        match map.get(key) {
            None => Ok(None),
            Some(Value::String(s)) if !s.is_empty() => Ok(Some(s.as_str())),
            Some(other) => Err(PipelineError::config(
                field(key),
                format!("expected non-empty string, got {other}"),
            )),
        }
    };

    let location = match (get_str("path")?, get_str("repo")?, get_str("filename")?) {
        (Some(path), None, None) => {
            if map.contains_key("revision") {
                return Err(PipelineError::config(
                    field("revision"),
                    "only valid for hub artifacts",
                ));
            }
            ArtifactLocation::Local(join_base(base_dir, Path::new(path)))
        }
        (None, Some(repo), Some(filename)) => ArtifactLocation::Hub {
            repo: repo.to_string(),
            filename: filename.to_string(),
            revision: get_str("revision")?.map(str::to_string),
        },
        (None, Some(_), None) => {
            return Err(PipelineError::config(field("filename"), "missing required field"))
        }
        (None, None, Some(_)) => {
            return Err(PipelineError::config(field("repo"), "missing required field"))
        }
        (None, None, None) => {
            return Err(PipelineError::config(
                format!("artifacts.{name}"),
                "expected either `path` or `repo` + `filename`",
            ))
        }
        (Some(_), _, _) => {
            return Err(PipelineError::config(
                format!("artifacts.{name}"),
                "`path` cannot be combined with `repo`/`filename`",
            ))
        }
    };

    let crc32 = match get_str("crc32")? {
        None => None,
        Some(hex) if hex.len() == 8 => Some(u32::from_str_radix(hex, 16).map_err(|_| {
            PipelineError::config(field("crc32"), format!("expected 8 hex digits, got `{hex}`"))
        })?),
        Some(hex) => {
            return Err(PipelineError::config(
                field("crc32"),
                format!("expected 8 hex digits, got `{hex}`"),
            ))
        }
    };

    let size = match map.get("size") {
        None => None,
        Some(v) => Some(v.as_u64().ok_or_else(|| {
            PipelineError::config(field("size"), format!("expected byte count, got {v}"))
        })?),
    };

    Ok(ArtifactSpec {
        location,
        crc32,
        size,
    })
}

const PREPROCESSING_FIELDS: &[(&str, FieldKind)] = &[
    ("max_seq_len", FieldKind::PositiveInteger),
    ("lowercase", FieldKind::Boolean),
    ("truncate", FieldKind::Boolean),
    ("unknown_token", FieldKind::String),
    ("pad_token", FieldKind::String),
];

fn resolve_preprocessing(value: Option<&Value>) -> Result<PreprocessingConfig> {
    let map = match value {
        None => return Ok(PreprocessingConfig::default()),
        Some(Value::Object(map)) => map,
        Some(other) => {
            return Err(PipelineError::config(
                "preprocessing",
                format!("expected object, got {}", kind_of(other)),
            ))
        }
    };

    for (key, v) in map {
        let field = format!("preprocessing.{key}");
        let Some((_, kind)) = PREPROCESSING_FIELDS
            .iter()
            .find(|(name, _)| *name == key.as_str())
        else {
            return Err(PipelineError::config(field, "unknown field"));
        };
        if !kind.accepts(v) {
            return Err(PipelineError::config(
                field,
                format!("expected {kind}, got {}", kind_of(v)),
            ));
        }
    }

    let preprocessing = PreprocessingConfig::deserialize(&Value::Object(map.clone()))
        .map_err(|e| PipelineError::config("preprocessing", e.to_string()))?;
    if preprocessing.unknown_token.is_empty() {
        return Err(PipelineError::config(
            "preprocessing.unknown_token",
            "must not be empty",
        ));
    }
    Ok(preprocessing)
}

fn resolve_hyperparameters(
    value: Option<&Value>,
    family: &FamilySchema,
) -> Result<Map<String, Value>> {
    let params = match value {
        None => Map::new(),
        Some(Value::Object(map)) => map.clone(),
        Some(other) => {
            return Err(PipelineError::config(
                "hyperparameters",
                format!("expected object, got {}", kind_of(other)),
            ))
        }
    };

    for rule in &family.hyperparameters {
        match params.get(rule.name) {
            None if rule.required => {
                return Err(PipelineError::config(
                    format!("hyperparameters.{}", rule.name),
                    format!("missing required field ({})", rule.kind),
                ))
            }
            Some(v) if !rule.kind.accepts(v) => {
                return Err(PipelineError::config(
                    format!("hyperparameters.{}", rule.name),
                    format!("expected {}, got {v}", rule.kind),
                ))
            }
            _ => {}
        }
    }

    Ok(params)
}

fn join_base(base_dir: Option<&Path>, path: &Path) -> PathBuf {
    match base_dir {
        Some(base) if path.is_relative() => base.join(path),
        _ => path.to_path_buf(),
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema() -> ConfigSchema {
        ConfigSchema::new("sentiment", LabelRule::at_least(2)).family(
            FamilySchema::new("bag_of_embeddings")
                .artifacts(&["weights", "vocab"])
                .hyperparameter("embed_dim", FieldKind::PositiveInteger)
                .optional_hyperparameter("min_score", FieldKind::Number),
        )
    }

    fn lookup(task: &str) -> Result<ConfigSchema> {
        if task == "sentiment" {
            Ok(schema())
        } else {
            Err(PipelineError::config("task", format!("unknown task `{task}`")))
        }
    }

    fn valid() -> Value {
        json!({
            "task": "sentiment",
            "family": "bag_of_embeddings",
            "labels": ["negative", "positive"],
            "artifacts": {
                "weights": { "path": "/models/w.safetensors", "crc32": "0000ABCD", "size": 10 },
                "vocab": { "repo": "org/model", "filename": "vocab.json" }
            },
            "hyperparameters": { "embed_dim": 4 }
        })
    }

    fn field_of(err: PipelineError) -> String {
        match err {
            PipelineError::Config { field, .. } => field,
            other => panic!("expected config error, got {other:?}"),
        }
    }

    #[test]
    fn test_resolves_valid_mapping() {
        let config = resolve_with(valid(), lookup).unwrap();
        assert_eq!(config.task(), "sentiment");
        assert_eq!(config.labels(), ["negative", "positive"]);
        assert_eq!(config.usize_param("embed_dim").unwrap(), 4);
        assert_eq!(config.preprocessing(), &PreprocessingConfig::default());
        assert_eq!(config.device(), &DeviceRequest::Cpu);

        let weights = &config.artifacts()["weights"];
        assert_eq!(weights.crc32(), Some(0xabcd));
        assert_eq!(weights.size(), Some(10));
        assert_eq!(
            config.artifacts()["vocab"].location().identifier(),
            "hub:org/model@main/vocab.json"
        );
    }

    #[test]
    fn test_resolution_is_repeatable() {
        let a = resolve_with(valid(), lookup).unwrap();
        let b = resolve_with(valid(), lookup).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.artifact_key(), b.artifact_key());
    }

    #[test]
    fn test_missing_required_fields() {
        let mut doc = valid();
        doc.as_object_mut().unwrap().remove("family");
        assert_eq!(field_of(resolve_with(doc, lookup).unwrap_err()), "family");

        let mut doc = valid();
        doc["artifacts"].as_object_mut().unwrap().remove("vocab");
        assert_eq!(
            field_of(resolve_with(doc, lookup).unwrap_err()),
            "artifacts.vocab"
        );

        let mut doc = valid();
        doc["hyperparameters"] = json!({});
        assert_eq!(
            field_of(resolve_with(doc, lookup).unwrap_err()),
            "hyperparameters.embed_dim"
        );
    }

    #[test]
    fn test_wrong_semantic_types() {
        let mut doc = valid();
        doc["hyperparameters"]["embed_dim"] = json!(0);
        assert_eq!(
            field_of(resolve_with(doc, lookup).unwrap_err()),
            "hyperparameters.embed_dim"
        );

        let mut doc = valid();
        doc["hyperparameters"]["min_score"] = json!("high");
        assert_eq!(
            field_of(resolve_with(doc, lookup).unwrap_err()),
            "hyperparameters.min_score"
        );

        let mut doc = valid();
        doc["artifacts"]["weights"]["crc32"] = json!("xyz");
        assert_eq!(
            field_of(resolve_with(doc, lookup).unwrap_err()),
            "artifacts.weights.crc32"
        );

        let mut doc = valid();
        doc["labels"] = json!(["only-one"]);
        assert_eq!(field_of(resolve_with(doc, lookup).unwrap_err()), "labels");

        let mut doc = valid();
        doc["labels"] = json!(["a", "a"]);
        assert_eq!(field_of(resolve_with(doc, lookup).unwrap_err()), "labels[1]");

        let mut doc = valid();
        doc["preprocessing"] = json!({ "max_seq_len": "long" });
        assert_eq!(
            field_of(resolve_with(doc, lookup).unwrap_err()),
            "preprocessing.max_seq_len"
        );
    }

    #[test]
    fn test_preprocessing_errors_name_the_sub_field() {
        let cases = [
            (json!({ "truncate": "yes" }), "preprocessing.truncate", "expected boolean, got string"),
            (json!({ "max_seq_len": 0 }), "preprocessing.max_seq_len", "expected positive integer"),
            (json!({ "lowercase": 1 }), "preprocessing.lowercase", "expected boolean, got number"),
            (json!({ "pad_token": null }), "preprocessing.pad_token", "expected string, got null"),
            (json!({ "stride": 16 }), "preprocessing.stride", "unknown field"),
            (json!({ "unknown_token": "" }), "preprocessing.unknown_token", "must not be empty"),
            (json!(["max_seq_len"]), "preprocessing", "expected object, got array"),
        ];
        for (preprocessing, expected_field, expected_reason) in cases {
            let mut doc = valid();
            doc["preprocessing"] = preprocessing;
            match resolve_with(doc, lookup).unwrap_err() {
                PipelineError::Config { field, reason } => {
                    assert_eq!(field, expected_field);
                    assert!(reason.contains(expected_reason), "{field}: {reason}");
                }
                other => panic!("unexpected error {other:?}"),
            }
        }

        let mut doc = valid();
        doc["preprocessing"] = json!({ "max_seq_len": 64, "truncate": false });
        let config = resolve_with(doc, lookup).unwrap();
        assert_eq!(config.preprocessing().max_seq_len, 64);
        assert!(!config.preprocessing().truncate);
        assert!(config.preprocessing().lowercase);
    }

    #[test]
    fn test_unknown_task_family_and_fields() {
        let mut doc = valid();
        doc["task"] = json!("translation");
        assert_eq!(field_of(resolve_with(doc, lookup).unwrap_err()), "task");

        let mut doc = valid();
        doc["family"] = json!("lstm");
        assert_eq!(field_of(resolve_with(doc, lookup).unwrap_err()), "family");

        let mut doc = valid();
        doc["epochs"] = json!(3);
        assert_eq!(field_of(resolve_with(doc, lookup).unwrap_err()), "epochs");

        let mut doc = valid();
        doc["artifacts"]["extra"] = json!({ "path": "x" });
        assert_eq!(
            field_of(resolve_with(doc, lookup).unwrap_err()),
            "artifacts.extra"
        );
    }

    #[test]
    fn test_artifact_location_must_be_unambiguous() {
        let mut doc = valid();
        doc["artifacts"]["weights"] = json!({ "path": "a", "repo": "b", "filename": "c" });
        assert_eq!(
            field_of(resolve_with(doc, lookup).unwrap_err()),
            "artifacts.weights"
        );

        let mut doc = valid();
        doc["artifacts"]["vocab"] = json!({ "repo": "org/model" });
        assert_eq!(
            field_of(resolve_with(doc, lookup).unwrap_err()),
            "artifacts.vocab.filename"
        );
    }

    #[test]
    fn test_device_parsing() {
        let mut doc = valid();
        doc["device"] = json!("cuda:1");
        let config = resolve_with(doc, lookup).unwrap();
        assert_eq!(config.device(), &DeviceRequest::Cuda(1));

        let mut doc = valid();
        doc["device"] = json!("tpu");
        assert_eq!(field_of(resolve_with(doc, lookup).unwrap_err()), "device");
    }

    #[test]
    fn test_artifact_key_tracks_pins() {
        let a = resolve_with(valid(), lookup).unwrap();
        let mut doc = valid();
        doc["artifacts"]["weights"]["crc32"] = json!("0000abce");
        let b = resolve_with(doc, lookup).unwrap();
        assert_ne!(a.artifact_key(), b.artifact_key());
        assert!(a.artifact_key().starts_with("sentiment/bag_of_embeddings@cpu|"));
    }

    #[test]
    fn test_non_object_root() {
        let err = resolve_with(json!([1, 2]), lookup).unwrap_err();
        assert_eq!(field_of(err), "<root>");
    }
}
