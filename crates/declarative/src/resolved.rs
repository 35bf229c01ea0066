//! Resolved values - config after reference resolution
//!
//! Synthesis turns every [`Value`](crate::Value) into a [`ResolvedValue`].
//! A reference becomes either the concrete value it points at or a
//! [`Placeholder`] the provisioning executor fills in once the target
//! exists.

use serde::{Deserialize, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;

/// Stand-in for "attribute X of resource Y once provisioned".
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Placeholder {
    /// Internal id of the resource
    pub node: String,
    /// Kind of the resource
    pub kind: String,
    /// External name of the resource at synthesis time
    pub external_name: String,
    /// Attribute path being read
    pub attribute: String,
}

impl fmt::Display for Placeholder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "${{{}.{}.{}}}",
            self.kind, self.external_name, self.attribute
        )
    }
}

/// A configuration value after resolution.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum ResolvedValue {
    #[default]
    Null,
    Bool(bool),
    Integer(i64),
    Number(f64),
    String(String),
    List(Vec<ResolvedValue>),
    Map(BTreeMap<String, ResolvedValue>),
    /// Known only after the referenced resource is provisioned
    Deferred(Placeholder),
    /// Interpolated string with at least one deferred part
    Template(Vec<TemplatePart>),
}

/// One piece of a template string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplatePart {
    Literal(String),
    Deferred(Placeholder),
}

impl ResolvedValue {
    /// Whether the value (recursively) contains no placeholders.
    pub fn is_concrete(&self) -> bool {
        match self {
            Self::Deferred(_) | Self::Template(_) => false,
            Self::List(items) => items.iter().all(Self::is_concrete),
            Self::Map(entries) => entries.values().all(Self::is_concrete),
            Self::Null | Self::Bool(_) | Self::Integer(_) | Self::Number(_) | Self::String(_) => {
                true
            }
        }
    }

    /// Look up a dotted path inside this value.
    ///
    /// Map segments select keys, numeric segments index lists. An empty
    /// path returns the value itself.
    pub fn lookup(&self, path: &str) -> Option<&ResolvedValue> {
        if path.is_empty() {
            return Some(self);
        }
        path.split('.').try_fold(self, |current, segment| match current {
            Self::Map(entries) => entries.get(segment),
            Self::List(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        })
    }

    /// Collect every placeholder in this value.
    pub fn placeholders(&self) -> Vec<&Placeholder> {
        let mut found = Vec::new();
        self.collect_placeholders(&mut found);
        found
    }

    fn collect_placeholders<'a>(&'a self, found: &mut Vec<&'a Placeholder>) {
        match self {
            Self::Deferred(p) => found.push(p),
            Self::Template(parts) => {
                for part in parts {
                    if let TemplatePart::Deferred(p) = part {
                        found.push(p);
                    }
                }
            }
            Self::List(items) => {
                for item in items {
                    item.collect_placeholders(found);
                }
            }
            Self::Map(entries) => {
                for value in entries.values() {
                    value.collect_placeholders(found);
                }
            }
            Self::Null | Self::Bool(_) | Self::Integer(_) | Self::Number(_) | Self::String(_) => {}
        }
    }

    /// Replace placeholders for which `known` returns a value.
    ///
    /// Templates whose parts all become known collapse into a plain string.
    pub fn substitute<F>(&self, known: &F) -> ResolvedValue
    where
        F: Fn(&Placeholder) -> Option<ResolvedValue>,
    {
        match self {
            Self::Deferred(p) => known(p).unwrap_or_else(|| self.clone()),
            Self::Template(parts) => {
                let parts = parts
                    .iter()
                    .map(|part| match part {
                        TemplatePart::Deferred(p) => match known(p) {
                            Some(value) if value.is_concrete() => {
                                TemplatePart::Literal(value.to_text())
                            }
                            _ => part.clone(),
                        },
                        TemplatePart::Literal(_) => part.clone(),
                    })
                    .collect();
                Self::from_template(parts)
            }
            Self::List(items) => Self::List(items.iter().map(|v| v.substitute(known)).collect()),
            Self::Map(entries) => Self::Map(
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), v.substitute(known)))
                    .collect(),
            ),
            _ => self.clone(),
        }
    }

    /// Build a string value from template parts, collapsing when fully literal.
    pub fn from_template(parts: Vec<TemplatePart>) -> ResolvedValue {
        if parts.iter().all(|p| matches!(p, TemplatePart::Literal(_))) {
            let text = parts
                .into_iter()
                .map(|p| match p {
                    TemplatePart::Literal(s) => s,
                    TemplatePart::Deferred(_) => String::new(),
                })
                .collect();
            return Self::String(text);
        }

        // Merge adjacent literals so equal templates compare equal.
        let mut merged: Vec<TemplatePart> = Vec::with_capacity(parts.len());
        for part in parts {
            match (merged.last_mut(), part) {
                (Some(TemplatePart::Literal(prev)), TemplatePart::Literal(next)) => {
                    prev.push_str(&next);
                }
                (_, part) => merged.push(part),
            }
        }
        Self::Template(merged)
    }

    /// Text form used when a value is spliced into a string.
    pub fn to_text(&self) -> String {
        match self {
            Self::String(s) => s.clone(),
            Self::Null => String::new(),
            Self::Bool(b) => b.to_string(),
            Self::Integer(n) => n.to_string(),
            Self::Number(n) => n.to_string(),
            Self::Deferred(p) => p.to_string(),
            Self::Template(parts) => parts
                .iter()
                .map(|part| match part {
                    TemplatePart::Literal(s) => s.clone(),
                    TemplatePart::Deferred(p) => p.to_string(),
                })
                .collect(),
            Self::List(_) | Self::Map(_) => self.to_json().to_string(),
        }
    }

    /// JSON form: placeholders render as `${kind.name.attribute}` strings.
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value as Json;

        match self {
            Self::Null => Json::Null,
            Self::Bool(b) => Json::Bool(*b),
            Self::Integer(n) => Json::from(*n),
            Self::Number(n) => serde_json::Number::from_f64(*n).map_or(Json::Null, Json::Number),
            Self::String(s) => Json::String(s.clone()),
            Self::List(items) => Json::Array(items.iter().map(Self::to_json).collect()),
            Self::Map(entries) => Json::Object(
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
            Self::Deferred(_) | Self::Template(_) => Json::String(self.to_text()),
        }
    }

    /// Convert plain JSON (e.g. attributes reported by a provisioner).
    pub fn from_json(json: &serde_json::Value) -> ResolvedValue {
        use serde_json::Value as Json;

        match json {
            Json::Null => Self::Null,
            Json::Bool(b) => Self::Bool(*b),
            Json::Number(n) => match n.as_i64() {
                Some(i) => Self::Integer(i),
                None => Self::Number(n.as_f64().unwrap_or_default()),
            },
            Json::String(s) => Self::String(s.clone()),
            Json::Array(items) => Self::List(items.iter().map(Self::from_json).collect()),
            Json::Object(entries) => Self::Map(
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), Self::from_json(v)))
                    .collect(),
            ),
        }
    }
}

impl Serialize for ResolvedValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl From<&str> for ResolvedValue {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for ResolvedValue {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}
