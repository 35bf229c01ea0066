//! Stack documents - declarative stacks written as TOML or JSON
//!
//! ```toml
//! name = "devops-task"
//!
//! [[resources]]
//! id = "rg"
//! kind = "azurerm_resource_group"
//! config = { name = "devops-task-rg", location = "eastus" }
//!
//! [[resources]]
//! id = "identity"
//! kind = "azurerm_user_assigned_identity"
//! config = { location = "${rg.location}", resource_group_name = "${rg.name}" }
//!
//! [[outputs]]
//! name = "principal"
//! value = "${identity.principal_id}"
//! ```
//!
//! A string that is exactly `${id.attr}` becomes a reference, a string
//! mixing text and `${...}` becomes an interpolated string, and `$${`
//! escapes a literal `${`.

use anyhow::{Context, Result};
use declarative::{ResourceMode, Stack, Value};
use serde::Deserialize;
use serde_json::Map;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use thiserror::Error;

type JsonMap = Map<String, serde_json::Value>;

/// Errors specific to reading a stack document
#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("unsupported stack document extension '{0}' (expected .toml or .json)")]
    UnsupportedFormat(String),

    #[error("invalid value at {path}")]
    InvalidValue {
        path: String,
        #[source]
        source: declarative::Error,
    },
}

/// Serialization format of a document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Toml,
    Json,
}

impl Format {
    /// Pick the format from a file extension
    pub fn from_path(path: &Path) -> Result<Self, DocumentError> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => Ok(Self::Toml),
            Some("json") => Ok(Self::Json),
            other => Err(DocumentError::UnsupportedFormat(
                other.unwrap_or_default().to_string(),
            )),
        }
    }
}

// ============================================================================
// Document Structures
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StackDocument {
    pub name: String,
    #[serde(default)]
    pub backend: Option<BackendDoc>,
    #[serde(default)]
    pub providers: Vec<ProviderDoc>,
    #[serde(default)]
    pub resources: Vec<ResourceDoc>,
    #[serde(default)]
    pub outputs: Vec<OutputDoc>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BackendDoc {
    pub kind: String,
    #[serde(default)]
    pub settings: JsonMap,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderDoc {
    pub name: String,
    #[serde(default)]
    pub config: JsonMap,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResourceDoc {
    /// Generated from the kind when omitted
    #[serde(default)]
    pub id: Option<String>,
    pub kind: String,
    #[serde(default)]
    pub mode: ResourceMode,
    #[serde(default)]
    pub config: JsonMap,
    #[serde(default)]
    pub depends_on: Vec<String>,
    /// Identity override
    #[serde(default)]
    pub external_name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OutputDoc {
    pub name: String,
    pub value: serde_json::Value,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub sensitive: bool,
}

// ============================================================================
// Loading
// ============================================================================

/// Read a stack document from disk
pub fn load(path: &Path) -> Result<StackDocument> {
    let format = Format::from_path(path)?;
    let content = fs::read_to_string(path)
        .with_context(|| format!("Could not read {}", path.display()))?;
    parse(&content, format).with_context(|| format!("Invalid stack document {}", path.display()))
}

/// Read a stack document and build its stack
pub fn load_stack(path: &Path) -> Result<Stack> {
    load(path)?.into_stack()
}

/// Parse document text
pub fn parse(content: &str, format: Format) -> Result<StackDocument> {
    let document = match format {
        Format::Toml => toml::from_str(content).context("Invalid TOML")?,
        Format::Json => serde_json::from_str(content).context("Invalid JSON")?,
    };
    Ok(document)
}

impl StackDocument {
    /// Declare every resource, override and output on a fresh stack
    pub fn into_stack(self) -> Result<Stack> {
        let mut stack = Stack::new(&self.name);

        if let Some(backend) = self.backend {
            let settings = convert_map(&backend.settings, "backend.settings")?;
            stack.set_backend(backend.kind, settings);
        }
        for provider in self.providers {
            let config = convert_map(&provider.config, &format!("providers.{}", provider.name))?;
            stack.add_provider(provider.name, config);
        }

        for (index, resource) in self.resources.into_iter().enumerate() {
            let label = resource
                .id
                .clone()
                .unwrap_or_else(|| format!("resources[{index}]"));
            let config = convert_map(&resource.config, &label)?;

            let mut builder = match resource.mode {
                ResourceMode::Managed => stack.resource(&resource.kind),
                ResourceMode::Data => stack.data(&resource.kind),
            };
            if let Some(id) = &resource.id {
                builder = builder.id(id);
            }
            for dep in &resource.depends_on {
                builder = builder.depends_on(dep);
            }
            let handle = builder
                .config(config)
                .create()
                .with_context(|| format!("Could not declare {label} ({})", resource.kind))?;

            if let Some(name) = resource.external_name {
                stack
                    .override_name(handle.id(), name)
                    .with_context(|| format!("Could not rename {label}"))?;
            }
        }

        for output in self.outputs {
            let value = convert(&output.value, &format!("outputs.{}", output.name))?;
            let mut builder = stack.output(&output.name).value(value);
            if let Some(description) = output.description {
                builder = builder.description(description);
            }
            if output.sensitive {
                builder = builder.sensitive();
            }
            builder
                .declare()
                .with_context(|| format!("Could not declare output {}", output.name))?;
        }

        log::debug!(
            "loaded stack {} with {} resources",
            stack.name(),
            stack.nodes().len()
        );
        Ok(stack)
    }
}

fn convert_map(map: &JsonMap, path: &str) -> Result<BTreeMap<String, Value>, DocumentError> {
    map.iter()
        .map(|(key, value)| Ok((key.clone(), convert(value, &format!("{path}.{key}"))?)))
        .collect()
}

/// Convert a JSON value, parsing `${...}` references in strings
fn convert(json: &serde_json::Value, path: &str) -> Result<Value, DocumentError> {
    use serde_json::Value as Json;

    Ok(match json {
        Json::Null => Value::Null,
        Json::Bool(b) => Value::Bool(*b),
        Json::Number(n) => match n.as_i64() {
            Some(i) => Value::Integer(i),
            None => Value::Number(n.as_f64().unwrap_or_default()),
        },
        Json::String(s) => Value::parse_str(s).map_err(|source| DocumentError::InvalidValue {
            path: path.to_string(),
            source,
        })?,
        Json::Array(items) => Value::List(
            items
                .iter()
                .enumerate()
                .map(|(i, item)| convert(item, &format!("{path}.{i}")))
                .collect::<Result<_, _>>()?,
        ),
        Json::Object(entries) => Value::Map(convert_map(entries, path)?),
    })
}

// ============================================================================
// Tests
// ============================================================================
