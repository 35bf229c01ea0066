//! # Declarative
//!
//! Declarative resource graphs: declare resources and the attributes they
//! read from each other, then synthesize a deterministic provisioning plan.
//!
//! ## Core Concepts
//!
//! - **Stack**: owns every resource node, identity override and output
//! - **ResourceNode**: a typed unit of desired state with a config tree
//! - **AttributeRef**: "attribute X of resource Y", resolved at synthesis
//! - **Plan**: resources in dependency order, grouped into waves
//! - **Provisioner**: the external executor that realizes a plan
//!
//! ## Example
//!
//! ```
//! use declarative::{Stack, Value};
//!
//! let mut stack = Stack::new("devops-task");
//! let rg = stack
//!     .resource("resource-group")
//!     .id("rg")
//!     .set("location", "eastus")
//!     .create()?;
//! let identity = stack
//!     .resource("user-assigned-identity")
//!     .set("location", rg.attr("location"))
//!     .set("resource_group_name", rg.attr("name"))
//!     .create()?;
//! stack
//!     .resource("role-assignment")
//!     .set("principal_id", identity.attr("principal_id"))
//!     .set("image", Value::parse_str("${rg.location}/app:v2")?)
//!     .create()?;
//! stack.declare_output("principal", identity.attr("principal_id"))?;
//!
//! let synthesis = stack.synthesize()?;
//! assert_eq!(synthesis.plan.entries[0].id, "rg");
//! # Ok::<(), declarative::Error>(())
//! ```
//!
//! ## Provider Traits
//!
//! The crate uses traits for dependency injection:
//!
//! - [`Provisioner`]: creates, updates, reads and destroys resources
//! - [`ProgressCallback`]: receives progress updates
//! - [`ConfirmCallback`]: handles user confirmations
//!
//! This allows the crate to be used without hard dependencies on a cloud
//! SDK or a specific terminal UI.

pub mod context;
pub mod diff;
pub mod error;
pub mod executor;
pub mod graph;
pub mod outputs;
pub mod overrides;
pub mod planner;
pub mod reference;
pub mod resolved;
pub mod resource;
pub mod stack;
pub mod synth;
pub mod types;
pub mod value;

// Re-export main types at crate root
pub use context::{AutoConfirm, AutoDecline, ConfirmCallback, NoProgress, ProgressCallback};
pub use diff::{
    DiffAction, DiffSummary, PriorResource, PriorState, ResourceDiff, compute_diffs, group_by_kind,
};
pub use error::{Error, Result};
pub use executor::{
    Attributes, Execution, ProvisionRequest, Provisioned, Provisioner, execute, execute_simple,
};
pub use graph::DependencyGraph;
pub use outputs::{OutputDecl, OutputRegistry};
pub use overrides::IdentityOverrides;
pub use planner::{Plan, PlanEntry, PlannedBackend, PlannedProvider};
pub use reference::AttributeRef;
pub use resolved::{Placeholder, ResolvedValue, TemplatePart};
pub use resource::{ResourceHandle, ResourceMode, ResourceNode};
pub use stack::{BackendConfig, OutputBuilder, ProviderConfig, ResourceBuilder, Stack};
pub use synth::{OutputMap, ResolvedOutput, Synthesis, synthesize};
pub use types::{ApplyResult, ExecuteOptions, ExecuteSummary};
pub use value::{Part, Value};
