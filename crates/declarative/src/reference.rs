//! Attribute references - "attribute X of resource Y", resolved at synthesis

use serde::{Deserialize, Serialize};
use std::fmt;

/// A lazy pointer from one resource's config to another resource's attribute.
///
/// A reference is a plain value: it names its target by id and never holds
/// the target itself. Renaming a resource through an identity override does
/// not invalidate references to it.
///
/// The attribute may be a dotted path (`ingress.fqdn`, `registry.0.server`)
/// addressing a nested field of the target's configuration.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AttributeRef {
    /// Id of the referenced resource
    pub target: String,
    /// Attribute (or dotted attribute path) being read
    pub attribute: String,
}

impl AttributeRef {
    /// Create a reference to `attribute` of the resource `target`.
    pub fn new(target: impl Into<String>, attribute: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            attribute: attribute.into(),
        }
    }

    /// Parse `target.attribute` (the attribute part may itself contain dots).
    ///
    /// Returns `None` when either side is empty or the dot is missing.
    pub fn parse(expr: &str) -> Option<Self> {
        let (target, attribute) = expr.trim().split_once('.')?;
        if target.is_empty() || attribute.is_empty() || attribute.split('.').any(str::is_empty) {
            return None;
        }
        Some(Self::new(target, attribute))
    }

    /// Segments of the attribute path.
    pub fn path(&self) -> impl Iterator<Item = &str> {
        self.attribute.split('.')
    }
}

impl fmt::Display for AttributeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.target, self.attribute)
    }
}
