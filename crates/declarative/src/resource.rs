//! Resource nodes - typed units of desired state
//!
//! A node is created through its owning [`Stack`](crate::Stack) and is
//! never mutated afterwards. Callers keep a [`ResourceHandle`] to build
//! references to the node's attributes.

use crate::reference::AttributeRef;
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// How the executor treats a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceMode {
    /// Created and owned by the executor
    #[default]
    Managed,
    /// Looked up from existing infrastructure, never modified
    Data,
}

impl fmt::Display for ResourceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Managed => write!(f, "managed"),
            Self::Data => write!(f, "data"),
        }
    }
}

/// A declared resource.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceNode {
    pub(crate) id: String,
    pub(crate) kind: String,
    pub(crate) mode: ResourceMode,
    pub(crate) config: BTreeMap<String, Value>,
    pub(crate) depends_on: BTreeSet<String>,
    pub(crate) seq: usize,
}

impl ResourceNode {
    /// Stack-unique internal id
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Resource type tag (e.g. `azurerm_resource_group`)
    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn mode(&self) -> ResourceMode {
        self.mode
    }

    /// Declared configuration, references unresolved
    pub fn config(&self) -> &BTreeMap<String, Value> {
        &self.config
    }

    /// Explicitly declared dependencies
    pub fn depends_on(&self) -> &BTreeSet<String> {
        &self.depends_on
    }

    /// Construction order within the stack
    pub fn seq(&self) -> usize {
        self.seq
    }

    /// Every attribute reference in the config, in key order.
    pub fn references(&self) -> Vec<&AttributeRef> {
        let mut refs = Vec::new();
        for value in self.config.values() {
            value.visit_refs(&mut |r| refs.push(r));
        }
        refs
    }

    /// Ids this node must be provisioned after: referenced targets plus
    /// explicit `depends_on`, deduplicated.
    pub fn dependency_ids(&self) -> BTreeSet<&str> {
        self.references()
            .into_iter()
            .map(|r| r.target.as_str())
            .chain(self.depends_on.iter().map(String::as_str))
            .collect()
    }
}

/// Lightweight handle to a declared resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceHandle {
    id: String,
}

impl ResourceHandle {
    pub(crate) fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Reference to one of this resource's attributes.
    pub fn attr(&self, attribute: impl Into<String>) -> AttributeRef {
        AttributeRef::new(self.id.clone(), attribute)
    }
}

impl AsRef<str> for ResourceHandle {
    fn as_ref(&self) -> &str {
        &self.id
    }
}

impl fmt::Display for ResourceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}

/// Check that a resource id (or external name) can be used in references.
pub(crate) fn validate_id(id: &str) -> crate::Result<()> {
    let reason = if id.is_empty() {
        Some("must not be empty")
    } else if id.contains('.') {
        Some("must not contain '.'")
    } else if id.chars().any(char::is_whitespace) {
        Some("must not contain whitespace")
    } else if id.contains(['$', '{', '}']) {
        Some("must not contain '$', '{' or '}'")
    } else {
        None
    };

    match reason {
        Some(reason) => Err(crate::Error::InvalidId {
            id: id.to_string(),
            reason,
        }),
        None => Ok(()),
    }
}
