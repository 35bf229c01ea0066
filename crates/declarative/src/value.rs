//! Configuration values
//!
//! A resource's config is a tree of [`Value`]s. References to other
//! resources are ordinary variants of the tree, so walking it is enough to
//! find every dependency.

use crate::error::{Error, Result};
use crate::reference::AttributeRef;
use std::collections::BTreeMap;

/// A configuration value: literal, reference, or a container of values.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Integer(i64),
    Number(f64),
    String(String),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
    /// Attribute of another resource
    Ref(AttributeRef),
    /// String built from literal text and references
    Interpolated(Vec<Part>),
}

/// One piece of an interpolated string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Part {
    Literal(String),
    Ref(AttributeRef),
}

impl Value {
    /// Build a map value from key/value pairs.
    pub fn map<K, V, I>(entries: I) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        Self::Map(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// Build a list value.
    pub fn list<V: Into<Value>, I: IntoIterator<Item = V>>(items: I) -> Self {
        Self::List(items.into_iter().map(Into::into).collect())
    }

    /// Parse a string that may contain `${target.attribute}` interpolations.
    ///
    /// - `"${rg.location}"` becomes a [`Value::Ref`]
    /// - `"${acr.login_server}/app:v2"` becomes a [`Value::Interpolated`]
    /// - anything without interpolations stays a [`Value::String`]
    ///
    /// `$${` produces a literal `${`.
    pub fn parse_str(input: &str) -> Result<Self> {
        let parts = parse_parts(input)?;
        let has_refs = parts.iter().any(|p| matches!(p, Part::Ref(_)));

        if !has_refs {
            let text: String = parts
                .into_iter()
                .map(|p| match p {
                    Part::Literal(s) => s,
                    Part::Ref(_) => String::new(),
                })
                .collect();
            return Ok(Self::String(text));
        }

        match <[Part; 1]>::try_from(parts) {
            Ok([Part::Ref(r)]) => Ok(Self::Ref(r)),
            Ok([literal]) => Ok(Self::Interpolated(vec![literal])),
            Err(parts) => Ok(Self::Interpolated(parts)),
        }
    }

    /// Visit every reference in this value, depth first, in key order.
    pub fn visit_refs<'a>(&'a self, visit: &mut impl FnMut(&'a AttributeRef)) {
        match self {
            Self::Ref(r) => visit(r),
            Self::Interpolated(parts) => {
                for part in parts {
                    if let Part::Ref(r) = part {
                        visit(r);
                    }
                }
            }
            Self::List(items) => {
                for item in items {
                    item.visit_refs(visit);
                }
            }
            Self::Map(entries) => {
                for value in entries.values() {
                    value.visit_refs(visit);
                }
            }
            Self::Null | Self::Bool(_) | Self::Integer(_) | Self::Number(_) | Self::String(_) => {}
        }
    }

    /// Collect every reference in this value.
    pub fn references(&self) -> Vec<&AttributeRef> {
        let mut refs = Vec::new();
        self.visit_refs(&mut |r| refs.push(r));
        refs
    }

    /// Whether the value contains no references.
    pub fn is_literal(&self) -> bool {
        self.references().is_empty()
    }
}

fn parse_parts(input: &str) -> Result<Vec<Part>> {
    let invalid = |reason| Error::InvalidInterpolation {
        input: input.to_string(),
        reason,
    };

    let mut parts = Vec::new();
    let mut literal = String::new();
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '$' {
            literal.push(c);
            continue;
        }
        match chars.peek() {
            // `$${` escapes a literal `${`
            Some('$') => {
                chars.next();
                if chars.peek() == Some(&'{') {
                    chars.next();
                    literal.push_str("${");
                } else {
                    literal.push_str("$$");
                }
            }
            Some('{') => {
                chars.next();
                let mut inner = String::new();
                let mut closed = false;
                for ic in chars.by_ref() {
                    if ic == '}' {
                        closed = true;
                        break;
                    }
                    inner.push(ic);
                }
                if !closed {
                    return Err(invalid("unterminated '${'"));
                }
                let reference = AttributeRef::parse(&inner)
                    .ok_or_else(|| invalid("expected '${resource.attribute}'"))?;
                if !literal.is_empty() {
                    parts.push(Part::Literal(std::mem::take(&mut literal)));
                }
                parts.push(Part::Ref(reference));
            }
            _ => literal.push(c),
        }
    }

    if !literal.is_empty() || parts.is_empty() {
        parts.push(Part::Literal(literal));
    }
    Ok(parts)
}

impl From<AttributeRef> for Value {
    fn from(r: AttributeRef) -> Self {
        Self::Ref(r)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Self::Integer(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Self::Integer(i64::from(n))
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Self::Integer(i64::from(n))
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Self::List(items)
    }
}

impl From<BTreeMap<String, Value>> for Value {
    fn from(entries: BTreeMap<String, Value>) -> Self {
        Self::Map(entries)
    }
}

impl From<Vec<Part>> for Value {
    fn from(parts: Vec<Part>) -> Self {
        Self::Interpolated(parts)
    }
}
