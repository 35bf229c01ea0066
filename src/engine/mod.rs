//! Execution engine for stackplan
//!
//! The engine orchestrates:
//! 1. Planning - load a stack document and synthesize it
//! 2. Diffing - compare the plan with recorded state
//! 3. Executing - provision wave by wave with progress and confirmation

pub mod differ;
pub mod executor;
pub mod planner;
pub mod provisioner;

pub use provisioner::SimulatedProvisioner;
