use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use declarative::PriorState;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

// ============================================================================
// State Structures
// ============================================================================

/// What the last apply left behind for one stack
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct StackState {
    /// Stack the state belongs to
    pub stack: String,

    /// Fingerprint of the last applied plan
    #[serde(default)]
    pub fingerprint: Option<String>,

    /// Last time the state was updated
    pub last_updated: DateTime<Utc>,

    /// Recorded resources keyed by address
    #[serde(flatten)]
    pub prior: PriorState,
}

impl StackState {
    pub fn new(stack: &str) -> Self {
        Self {
            stack: stack.to_string(),
            fingerprint: None,
            last_updated: Utc::now(),
            prior: PriorState::new(),
        }
    }

    /// Load state from disk, or return empty state if the file doesn't exist
    pub fn load(path: &Path, stack: &str) -> Result<Self> {
        if !path.exists() {
            log::debug!("State file {} does not exist, starting empty", path.display());
            return Ok(Self::new(stack));
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read state file: {}", path.display()))?;

        let state: Self = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse state file: {}", path.display()))?;

        if state.stack != stack {
            anyhow::bail!(
                "State file {} belongs to stack '{}', not '{}'",
                path.display(),
                state.stack,
                stack
            );
        }

        log::debug!(
            "Loaded state for {} ({} resources) from {}",
            stack,
            state.prior.len(),
            path.display()
        );
        Ok(state)
    }

    /// Save state to disk
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create state directory: {}", dir.display()))?;
        }

        let content =
            serde_json::to_string_pretty(&self).context("Failed to serialize state to JSON")?;

        fs::write(path, &content)
            .with_context(|| format!("Failed to write state file: {}", path.display()))?;

        log::debug!("Saved state to {}", path.display());
        Ok(())
    }

    /// Replace the recorded resources and stamp the update
    pub fn update(&mut self, prior: PriorState, fingerprint: &str) {
        self.prior = prior;
        self.fingerprint = Some(fingerprint.to_string());
        self.last_updated = Utc::now();
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use declarative::Stack;
    use tempfile::TempDir;

    fn plan() -> declarative::Plan {
        let mut stack = Stack::new("test");
        let rg = stack
            .resource("resource-group")
            .id("rg")
            .set("location", "eastus")
            .create()
            .unwrap();
        stack
            .resource("user-assigned-identity")
            .id("mi")
            .set("location", rg.attr("location"))
            .create()
            .unwrap();
        stack.synthesize().unwrap().plan
    }

    #[test]
    fn test_missing_file_is_empty_state() {
        let dir = TempDir::new().unwrap();
        let state = StackState::load(&dir.path().join("nope.json"), "test").unwrap();
        assert_eq!(state.stack, "test");
        assert!(state.prior.is_empty());
        assert!(state.fingerprint.is_none());
    }

    #[test]
    fn test_save_and_reload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("test.json");
        let plan = plan();

        let mut state = StackState::new("test");
        state.update(PriorState::from_plan(&plan), &plan.fingerprint());
        state.save(&path).unwrap();

        let loaded = StackState::load(&path, "test").unwrap();
        assert_eq!(loaded.prior, state.prior);
        assert_eq!(loaded.fingerprint, Some(plan.fingerprint()));
        assert!(loaded.prior.get("resource-group.rg").is_some());

        let raw: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert!(raw["resources"]["user-assigned-identity.mi"].is_object());
    }

    #[test]
    fn test_state_of_other_stack_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");
        StackState::new("other").save(&path).unwrap();
        assert!(StackState::load(&path, "test").is_err());
    }
}
