//! Identity overrides - external names decoupled from internal ids

use std::collections::BTreeMap;

/// Side-table mapping internal resource ids to external names.
///
/// A resource without an entry is addressed externally by its id. The table
/// only renames; it never changes graph edges or plan order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentityOverrides {
    names: BTreeMap<String, String>,
}

impl IdentityOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the external name for `id`, returning the previous override.
    pub fn set(&mut self, id: impl Into<String>, external_name: impl Into<String>) -> Option<String> {
        self.names.insert(id.into(), external_name.into())
    }

    /// The override for `id`, if any.
    pub fn get(&self, id: &str) -> Option<&str> {
        self.names.get(id).map(String::as_str)
    }

    /// External name for `id`: the override, or the id itself.
    pub fn resolve<'a>(&'a self, id: &'a str) -> &'a str {
        self.get(id).unwrap_or(id)
    }

    /// Iterate overrides in id order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.names.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}
