//! # Executable Manifest Schema and Validation
//!
//! This module turns the raw `manifest.json` published in a repository into a
//! [`ValidatedManifest`] that is safe to hand to the job scheduler.
//!
//! Manifests are semi-trusted input: they are written by repository owners,
//! not by the platform. Validation is therefore lenient about shape and
//! strict about outcome. Missing top-level fields are filled from defaults,
//! individual rules that cannot be made valid are dropped with a debug log,
//! and only a document that is not a JSON object at all is rejected.
//!
//! ## Rules
//!
//! Both rule mappings hold values of one of three shapes: integer rules
//! (`default_value`, `min`, `max`, `step`, `unit`), string-option rules
//! (`default_value`, `options`) and string-input rules (`default_value`).
//!
//! - **Cluster-resource rules** (`slurm_input_rules`) are keyed by a closed
//!   catalog of scheduler settings. The catalog entry, not the rule, decides
//!   the shape and the allowed units; see [`ResourceCategory`].
//! - **Parameter rules** (`param_rules`) are open-ended, and each declares its
//!   shape through a `type` tag.
//!
//! Every surviving rule has a default value; every surviving integer rule
//! satisfies `min <= default_value <= max` with a positive `step`; every
//! surviving string-option rule lists its default among its options.

use std::collections::BTreeMap;

use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// Cluster assumed when a manifest names none.
pub const DEFAULT_CLUSTER: &str = "keeling_community";

/// Units accepted for time-valued resource rules.
pub const TIME_UNITS: [&str; 3] = ["Minutes", "Hours", "Days"];

/// Units accepted for storage-valued resource rules.
pub const STORAGE_UNITS: [&str; 2] = ["GB", "MB"];

/// Unit forced onto unitless integer resource rules.
pub const NO_UNIT: &str = "None";

/// Shape and unit policy of a recognized cluster-resource rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceCategory {
    /// Integer measured in one of [`TIME_UNITS`].
    Time,
    /// Integer measured in one of [`STORAGE_UNITS`].
    Storage,
    /// Integer count without a unit.
    Unitless,
    /// One string out of a declared option set.
    StringOption,
}

impl ResourceCategory {
    /// Looks up the catalog entry for a resource rule name.
    pub fn of(name: &str) -> Option<Self> {
        match name {
            "time" => Some(ResourceCategory::Time),
            "memory" | "memory_per_cpu" | "memory_per_gpu" => Some(ResourceCategory::Storage),
            "num_of_node" | "num_of_task" | "cpu_per_task" | "gpus" | "gpus_per_node"
            | "gpus_per_socket" | "gpus_per_task" => Some(ResourceCategory::Unitless),
            "partition" => Some(ResourceCategory::StringOption),
            _ => None,
        }
    }

    fn allowed_units(self) -> Option<&'static [&'static str]> {
        match self {
            ResourceCategory::Time => Some(&TIME_UNITS),
            ResourceCategory::Storage => Some(&STORAGE_UNITS),
            ResourceCategory::Unitless | ResourceCategory::StringOption => None,
        }
    }
}

/// A bounded integer setting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegerRule {
    pub default_value: i64,
    pub min: i64,
    pub max: i64,
    pub step: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
}

/// A string chosen from a fixed option set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StringOptionRule {
    pub default_value: String,
    pub options: Vec<String>,
}

/// Free text with a default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StringInputRule {
    pub default_value: String,
}

/// A validated cluster-resource rule. The shape follows from the rule name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResourceRule {
    Integer(IntegerRule),
    StringOption(StringOptionRule),
}

/// A validated parameter rule, tagged with its `type`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ParamRule {
    Integer(IntegerRule),
    StringOption(StringOptionRule),
    StringInput(StringInputRule),
}

/// A normalized executable manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidatedManifest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connector: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pre_processing_stage: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_stage: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub post_processing_stage: Option<Value>,
    pub description: String,
    pub estimated_runtime: String,
    pub supported_hpc: Vec<String>,
    pub default_hpc: String,
    pub repository: String,
    pub require_upload_data: bool,
    pub slurm_input_rules: BTreeMap<String, ResourceRule>,
    pub param_rules: BTreeMap<String, ParamRule>,
}

/// The document as published, before defaults are applied.
#[derive(Debug, Default, Deserialize)]
struct RawManifest {
    name: Option<String>,
    container: Option<String>,
    connector: Option<String>,
    pre_processing_stage: Option<Value>,
    execution_stage: Option<Value>,
    post_processing_stage: Option<Value>,
    description: Option<String>,
    estimated_runtime: Option<String>,
    supported_hpc: Option<Vec<String>>,
    default_hpc: Option<String>,
    repository: Option<String>,
    require_upload_data: Option<bool>,
    slurm_input_rules: Option<BTreeMap<String, Value>>,
    param_rules: Option<BTreeMap<String, Value>>,
}

/// Why a rule was dropped.
type Rejection = &'static str;

/// Normalizes raw manifest documents.
#[derive(Debug, Clone)]
pub struct ManifestValidator {
    default_cluster: String,
}

impl Default for ManifestValidator {
    fn default() -> Self {
        Self::new(DEFAULT_CLUSTER)
    }
}

impl ManifestValidator {
    pub fn new(default_cluster: &str) -> Self {
        Self {
            default_cluster: default_cluster.to_string(),
        }
    }

    /// Parses `raw_text` and normalizes it into a [`ValidatedManifest`].
    ///
    /// `fallback_address` becomes the manifest's `repository` when the
    /// document does not name one. Fails with `ManifestParse` only when the
    /// text is not a JSON object or a top-level field has the wrong type.
    pub fn normalize(&self, raw_text: &str, fallback_address: &str) -> Result<ValidatedManifest> {
        let document: Value = serde_json::from_str(raw_text).map_err(parse_error)?;
        if !document.is_object() {
            return Err(Error::ManifestParse {
                origin: "manifest document".to_string(),
                message: "top level must be a JSON object".to_string(),
            });
        }
        let raw: RawManifest = serde_json::from_value(document).map_err(parse_error)?;

        let mut supported_hpc = raw
            .supported_hpc
            .unwrap_or_else(|| vec![self.default_cluster.clone()]);
        let default_hpc = match raw.default_hpc.filter(|hpc| !hpc.is_empty()) {
            Some(hpc) => hpc,
            None => supported_hpc
                .first()
                .cloned()
                .unwrap_or_else(|| self.default_cluster.clone()),
        };
        if !supported_hpc.contains(&default_hpc) {
            supported_hpc.push(default_hpc.clone());
        }

        Ok(ValidatedManifest {
            name: raw.name,
            container: raw.container,
            connector: raw.connector,
            pre_processing_stage: raw.pre_processing_stage,
            execution_stage: raw.execution_stage,
            post_processing_stage: raw.post_processing_stage,
            description: raw.description.unwrap_or_else(|| "none".to_string()),
            estimated_runtime: raw.estimated_runtime.unwrap_or_else(|| "unknown".to_string()),
            supported_hpc,
            default_hpc,
            repository: raw
                .repository
                .unwrap_or_else(|| fallback_address.to_string()),
            require_upload_data: raw.require_upload_data.unwrap_or(false),
            slurm_input_rules: normalize_resource_rules(raw.slurm_input_rules.unwrap_or_default()),
            param_rules: normalize_param_rules(raw.param_rules.unwrap_or_default()),
        })
    }
}

fn parse_error(e: serde_json::Error) -> Error {
    Error::ManifestParse {
        origin: "manifest document".to_string(),
        message: e.to_string(),
    }
}

fn normalize_resource_rules(rules: BTreeMap<String, Value>) -> BTreeMap<String, ResourceRule> {
    rules
        .into_iter()
        .filter_map(|(name, value)| match normalize_resource_rule(&name, &value) {
            Ok(rule) => Some((name, rule)),
            Err(reason) => {
                debug!("Dropping slurm input rule '{}': {}", name, reason);
                None
            }
        })
        .collect()
}

fn normalize_resource_rule(name: &str, value: &Value) -> std::result::Result<ResourceRule, Rejection> {
    let category = ResourceCategory::of(name).ok_or("not a recognized slurm setting")?;
    let fields = value.as_object().ok_or("rule is not an object")?;
    if !has_default(fields) {
        return Err("missing default_value");
    }

    match category {
        ResourceCategory::StringOption => string_option_rule(fields).map(ResourceRule::StringOption),
        ResourceCategory::Unitless => {
            integer_rule(fields, Some(NO_UNIT.to_string())).map(ResourceRule::Integer)
        }
        ResourceCategory::Time | ResourceCategory::Storage => {
            let unit = match fields.get("unit") {
                None | Some(Value::Null) => None,
                Some(Value::String(unit)) => Some(unit.clone()),
                Some(_) => return Err("unit is not a string"),
            };
            if let (Some(unit), Some(allowed)) = (&unit, category.allowed_units()) {
                if !allowed.contains(&unit.as_str()) {
                    return Err("unit not allowed for this setting");
                }
            }
            integer_rule(fields, unit).map(ResourceRule::Integer)
        }
    }
}

fn normalize_param_rules(rules: BTreeMap<String, Value>) -> BTreeMap<String, ParamRule> {
    rules
        .into_iter()
        .filter_map(|(name, value)| match normalize_param_rule(&value) {
            Ok(rule) => Some((name, rule)),
            Err(reason) => {
                debug!("Dropping param rule '{}': {}", name, reason);
                None
            }
        })
        .collect()
}

fn normalize_param_rule(value: &Value) -> std::result::Result<ParamRule, Rejection> {
    let fields = value.as_object().ok_or("rule is not an object")?;
    if !has_default(fields) {
        return Err("missing default_value");
    }

    match fields.get("type").and_then(Value::as_str) {
        Some("integer") => {
            let unit = fields.get("unit").and_then(Value::as_str).map(str::to_string);
            integer_rule(fields, unit).map(ParamRule::Integer)
        }
        Some("string_option") => string_option_rule(fields).map(ParamRule::StringOption),
        Some("string_input") => {
            let default_value = text(fields.get("default_value")).ok_or("default_value is not text")?;
            Ok(ParamRule::StringInput(StringInputRule { default_value }))
        }
        Some(_) => Err("unrecognized type"),
        None => Err("missing type"),
    }
}

fn has_default(fields: &Map<String, Value>) -> bool {
    match fields.get("default_value") {
        None | Some(Value::Null) => false,
        Some(Value::String(s)) => !s.is_empty(),
        Some(_) => true,
    }
}

/// Builds an integer rule, defaulting `max` to twice the default, `min` to
/// zero and `step` to one.
fn integer_rule(
    fields: &Map<String, Value>,
    unit: Option<String>,
) -> std::result::Result<IntegerRule, Rejection> {
    let default_value = integer(fields.get("default_value")).ok_or("default_value is not an integer")?;
    let rule = IntegerRule {
        default_value,
        min: integer(fields.get("min")).unwrap_or(0),
        max: integer(fields.get("max")).unwrap_or_else(|| default_value.saturating_mul(2)),
        step: integer(fields.get("step")).unwrap_or(1),
        unit,
    };

    if rule.step <= 0 {
        return Err("step must be positive");
    }
    if rule.min > rule.default_value || rule.default_value > rule.max {
        return Err("default_value outside [min, max]");
    }
    Ok(rule)
}

/// Builds a string-option rule whose options always contain the default.
///
/// Numeric and boolean options are kept in their JSON text form. Options
/// that are null, arrays or objects are dropped.
fn string_option_rule(fields: &Map<String, Value>) -> std::result::Result<StringOptionRule, Rejection> {
    let default_value = text(fields.get("default_value")).ok_or("default_value is not text")?;
    let mut options: Vec<String> = match fields.get("options") {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| {
                let option = text(Some(item));
                if option.is_none() {
                    debug!("Dropping option {} of '{}': not a scalar", item, default_value);
                }
                option
            })
            .collect(),
        _ => vec![default_value.clone()],
    };
    if !options.contains(&default_value) {
        options.push(default_value.clone());
    }
    Ok(StringOptionRule {
        default_value,
        options,
    })
}

fn integer(value: Option<&Value>) -> Option<i64> {
    let value = value?;
    value.as_i64().or_else(|| {
        // Accept whole floats such as `4.0`.
        let float = value.as_f64()?;
        (float.fract() == 0.0 && float >= i64::MIN as f64 && float <= i64::MAX as f64)
            .then_some(float as i64)
    })
}

fn text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
