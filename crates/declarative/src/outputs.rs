//! Output registry - named values surfaced after synthesis

use crate::error::{Error, Result};
use crate::value::Value;
use std::collections::BTreeMap;

/// A declared output.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputDecl {
    /// Reference or literal value to surface
    pub value: Value,
    /// Human-readable description
    pub description: Option<String>,
    /// Hide the value when printing
    pub sensitive: bool,
}

impl OutputDecl {
    pub fn new(value: impl Into<Value>) -> Self {
        Self {
            value: value.into(),
            description: None,
            sensitive: false,
        }
    }
}

/// Output declarations keyed by unique name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OutputRegistry {
    entries: BTreeMap<String, OutputDecl>,
}

impl OutputRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an output. Names are unique for the registry's lifetime.
    pub fn declare(&mut self, name: impl Into<String>, decl: OutputDecl) -> Result<()> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(Error::InvalidId {
                id: name,
                reason: "output name must not be empty",
            });
        }
        if self.entries.contains_key(&name) {
            return Err(Error::DuplicateOutput { name });
        }
        self.entries.insert(name, decl);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&OutputDecl> {
        self.entries.get(name)
    }

    /// Iterate outputs in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &OutputDecl)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reference::AttributeRef;

    #[test]
    fn test_duplicate_output_rejected() {
        let mut registry = OutputRegistry::new();
        registry
            .declare("url", OutputDecl::new(AttributeRef::new("app", "fqdn")))
            .unwrap();

        let err = registry
            .declare("url", OutputDecl::new("other"))
            .unwrap_err();
        assert_eq!(err, Error::DuplicateOutput { name: "url".into() });
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_empty_name_rejected() {
        let mut registry = OutputRegistry::new();
        assert!(matches!(
            registry.declare(" ", OutputDecl::new(1)),
            Err(Error::InvalidId { .. })
        ));
        assert!(registry.is_empty());
    }
}
