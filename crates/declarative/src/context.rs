//! Execution callbacks
//!
//! These traits let the executor report progress and ask for confirmation
//! without depending on a specific terminal UI.

use crate::types::ApplyResult;
use anyhow::Result;

/// Progress callback for execution operations
///
/// Implement this trait to receive progress updates during execution.
pub trait ProgressCallback: Send {
    /// Called when starting a wave of independent resources
    fn on_wave_start(&mut self, index: usize, count: usize);

    /// Called when a resource is handed to the provisioner
    fn on_resource_start(&mut self, id: &str, external_name: &str);

    /// Called when a resource finishes (including skips)
    fn on_resource_complete(&mut self, id: &str, result: &ApplyResult);

    /// Called when a wave completes
    fn on_wave_complete(&mut self);
}

/// Confirmation callback for user interaction
pub trait ConfirmCallback: Send {
    /// Ask the user to confirm an action
    ///
    /// # Returns
    /// `true` if the user confirmed, `false` otherwise
    fn confirm(&mut self, prompt: &str) -> Result<bool>;
}

/// No-op progress callback
pub struct NoProgress;

impl ProgressCallback for NoProgress {
    fn on_wave_start(&mut self, _index: usize, _count: usize) {}
    fn on_resource_start(&mut self, _id: &str, _external_name: &str) {}
    fn on_resource_complete(&mut self, _id: &str, _result: &ApplyResult) {}
    fn on_wave_complete(&mut self) {}
}

/// Auto-confirm callback (always returns true)
pub struct AutoConfirm;

impl ConfirmCallback for AutoConfirm {
    fn confirm(&mut self, _prompt: &str) -> Result<bool> {
        Ok(true)
    }
}

/// Auto-decline callback (always returns false)
pub struct AutoDecline;

impl ConfirmCallback for AutoDecline {
    fn confirm(&mut self, _prompt: &str) -> Result<bool> {
        Ok(false)
    }
}
