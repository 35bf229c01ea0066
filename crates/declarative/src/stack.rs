//! The stack - owner of every declaration that is synthesized together
//!
//! There is no ambient "current stack": every resource, override and output
//! is declared through an explicit `&mut Stack`.

use crate::error::{Error, Result};
use crate::outputs::{OutputDecl, OutputRegistry};
use crate::overrides::IdentityOverrides;
use crate::resource::{ResourceHandle, ResourceMode, ResourceNode, validate_id};
use crate::synth::{self, Synthesis};
use crate::value::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Where the executor keeps state for this stack. Carried into the plan
/// untouched by the graph.
#[derive(Debug, Clone, PartialEq)]
pub struct BackendConfig {
    /// Backend type (e.g. `azurerm`, `local`)
    pub kind: String,
    pub settings: BTreeMap<String, Value>,
}

/// Provider configuration handed to the executor.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderConfig {
    pub name: String,
    pub config: BTreeMap<String, Value>,
}

/// A single synthesis unit: resources, overrides, outputs and stack settings.
#[derive(Debug, Clone, Default)]
pub struct Stack {
    name: String,
    nodes: Vec<ResourceNode>,
    index: HashMap<String, usize>,
    counters: HashMap<String, usize>,
    overrides: IdentityOverrides,
    outputs: OutputRegistry,
    backend: Option<BackendConfig>,
    providers: Vec<ProviderConfig>,
}

impl Stack {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    // =========================================================================
    // Resources
    // =========================================================================

    /// Start declaring a managed resource of `kind`.
    pub fn resource(&mut self, kind: impl Into<String>) -> ResourceBuilder<'_> {
        ResourceBuilder::new(self, kind.into(), ResourceMode::Managed)
    }

    /// Start declaring a data-source lookup of `kind`.
    pub fn data(&mut self, kind: impl Into<String>) -> ResourceBuilder<'_> {
        ResourceBuilder::new(self, kind.into(), ResourceMode::Data)
    }

    /// Declare a managed resource in one call.
    ///
    /// When `id` is `None` an id is generated from the kind and a per-kind
    /// counter. Caller-supplied ids fail with [`Error::DuplicateId`] on
    /// collision.
    pub fn create<I, S>(
        &mut self,
        kind: &str,
        id: Option<&str>,
        config: BTreeMap<String, Value>,
        depends_on: I,
    ) -> Result<ResourceHandle>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let depends_on = depends_on
            .into_iter()
            .map(|d| d.as_ref().to_string())
            .collect();
        self.register(
            kind.to_string(),
            ResourceMode::Managed,
            id.map(str::to_string),
            config,
            depends_on,
        )
    }

    fn register(
        &mut self,
        kind: String,
        mode: ResourceMode,
        id: Option<String>,
        config: BTreeMap<String, Value>,
        depends_on: BTreeSet<String>,
    ) -> Result<ResourceHandle> {
        if kind.trim().is_empty() {
            return Err(Error::InvalidId {
                id: kind,
                reason: "resource kind must not be empty",
            });
        }

        let id = match id {
            Some(id) => {
                validate_id(&id)?;
                if self.index.contains_key(&id) {
                    return Err(Error::DuplicateId { id });
                }
                id
            }
            None => self.next_id(&kind),
        };

        let seq = self.nodes.len();
        log::trace!("registered {mode} resource {id} ({kind}) at position {seq}");

        self.index.insert(id.clone(), seq);
        self.nodes.push(ResourceNode {
            id: id.clone(),
            kind,
            mode,
            config,
            depends_on,
            seq,
        });
        Ok(ResourceHandle::new(id))
    }

    /// Generate `<kind>_<n>`, skipping ids a caller already took.
    fn next_id(&mut self, kind: &str) -> String {
        let stem: String = kind
            .chars()
            .map(|c| {
                if c.is_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();

        let counter = self.counters.entry(kind.to_string()).or_insert(0);
        loop {
            *counter += 1;
            let candidate = format!("{stem}_{counter}");
            if !self.index.contains_key(&candidate) {
                return candidate;
            }
        }
    }

    /// Look up a declared resource.
    pub fn node(&self, id: &str) -> Option<&ResourceNode> {
        self.index.get(id).map(|&i| &self.nodes[i])
    }

    /// Handle to a declared resource.
    pub fn handle(&self, id: &str) -> Option<ResourceHandle> {
        self.index.contains_key(id).then(|| ResourceHandle::new(id))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// All resources in construction order.
    pub fn nodes(&self) -> &[ResourceNode] {
        &self.nodes
    }

    // =========================================================================
    // Identity overrides
    // =========================================================================

    /// Rename the external identity of a resource.
    ///
    /// Re-overriding replaces the previous name. The internal id, graph
    /// edges and existing references are unaffected.
    pub fn override_name(&mut self, id: &str, external_name: impl Into<String>) -> Result<()> {
        if !self.contains(id) {
            return Err(Error::UnknownNode { id: id.to_string() });
        }
        let external_name = external_name.into();
        validate_id(&external_name)?;

        if let Some(previous) = self.overrides.set(id, external_name.clone()) {
            log::debug!("external name of {id} changed from {previous} to {external_name}");
        }
        Ok(())
    }

    /// External name of a resource: its override, or its id.
    pub fn external_name<'a>(&'a self, id: &'a str) -> &'a str {
        self.overrides.resolve(id)
    }

    pub fn overrides(&self) -> &IdentityOverrides {
        &self.overrides
    }

    // =========================================================================
    // Outputs
    // =========================================================================

    /// Declare an output bound to a reference or literal value.
    pub fn declare_output(&mut self, name: impl Into<String>, value: impl Into<Value>) -> Result<()> {
        self.outputs.declare(name, OutputDecl::new(value))
    }

    /// Start declaring an output with description or sensitivity.
    pub fn output(&mut self, name: impl Into<String>) -> OutputBuilder<'_> {
        OutputBuilder {
            stack: self,
            name: name.into(),
            decl: OutputDecl::new(Value::Null),
        }
    }

    pub fn outputs(&self) -> &OutputRegistry {
        &self.outputs
    }

    // =========================================================================
    // Stack settings
    // =========================================================================

    pub fn set_backend(&mut self, kind: impl Into<String>, settings: BTreeMap<String, Value>) {
        self.backend = Some(BackendConfig {
            kind: kind.into(),
            settings,
        });
    }

    pub fn backend(&self) -> Option<&BackendConfig> {
        self.backend.as_ref()
    }

    /// Add a provider configuration. A later provider with the same name
    /// replaces the earlier one.
    pub fn add_provider(&mut self, name: impl Into<String>, config: BTreeMap<String, Value>) {
        let name = name.into();
        self.providers.retain(|p| p.name != name);
        self.providers.push(ProviderConfig { name, config });
    }

    pub fn providers(&self) -> &[ProviderConfig] {
        &self.providers
    }

    /// Synthesize this stack into a plan and output map.
    pub fn synthesize(&self) -> Result<Synthesis> {
        synth::synthesize(self)
    }
}

/// Builder returned by [`Stack::resource`] and [`Stack::data`].
pub struct ResourceBuilder<'a> {
    stack: &'a mut Stack,
    kind: String,
    mode: ResourceMode,
    id: Option<String>,
    config: BTreeMap<String, Value>,
    depends_on: BTreeSet<String>,
}

impl<'a> ResourceBuilder<'a> {
    fn new(stack: &'a mut Stack, kind: String, mode: ResourceMode) -> Self {
        Self {
            stack,
            kind,
            mode,
            id: None,
            config: BTreeMap::new(),
            depends_on: BTreeSet::new(),
        }
    }

    /// Use a caller-chosen id instead of a generated one.
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Set one config field.
    pub fn set(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.config.insert(key.into(), value.into());
        self
    }

    /// Merge a whole config map.
    pub fn config(mut self, config: BTreeMap<String, Value>) -> Self {
        self.config.extend(config);
        self
    }

    /// Order this resource after `id` even without a reference to it.
    pub fn depends_on(mut self, id: impl AsRef<str>) -> Self {
        self.depends_on.insert(id.as_ref().to_string());
        self
    }

    /// Register the resource in the stack.
    pub fn create(self) -> Result<ResourceHandle> {
        self.stack
            .register(self.kind, self.mode, self.id, self.config, self.depends_on)
    }
}

/// Builder returned by [`Stack::output`].
pub struct OutputBuilder<'a> {
    stack: &'a mut Stack,
    name: String,
    decl: OutputDecl,
}

impl OutputBuilder<'_> {
    pub fn value(mut self, value: impl Into<Value>) -> Self {
        self.decl.value = value.into();
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.decl.description = Some(description.into());
        self
    }

    pub fn sensitive(mut self) -> Self {
        self.decl.sensitive = true;
        self
    }

    pub fn declare(self) -> Result<()> {
        self.stack.outputs.declare(self.name, self.decl)
    }
}
