//! Path resolution for stackplan state
//!
//! # Environment Variables
//!
//! - `STACKPLAN_STATE_DIR` - Override the state directory
//!
//! # Path Resolution Priority
//!
//! For state_dir():
//! 1. `STACKPLAN_STATE_DIR` environment variable
//! 2. `XDG_STATE_HOME/stackplan` (if set)
//! 3. Platform default:
//!    - Windows: `%LOCALAPPDATA%\stackplan`
//!    - macOS/Linux: `~/.local/state/stackplan`

use anyhow::{Context, Result};
use std::path::PathBuf;

/// Environment variable for state directory override
pub const ENV_STATE_DIR: &str = "STACKPLAN_STATE_DIR";

/// Get the stackplan state directory path
pub fn state_dir() -> Result<PathBuf> {
    // 1. Check environment variable override
    if let Ok(dir) = std::env::var(ENV_STATE_DIR) {
        let path = expand(&dir);
        log::debug!("Using state dir from {}: {}", ENV_STATE_DIR, path.display());
        return Ok(path);
    }

    // 2. Check XDG_STATE_HOME
    if let Ok(xdg_state) = std::env::var("XDG_STATE_HOME") {
        let path = PathBuf::from(xdg_state).join("stackplan");
        log::debug!("Using XDG_STATE_HOME: {}", path.display());
        return Ok(path);
    }

    // 3. Platform default
    #[cfg(windows)]
    {
        if let Some(local_app_data) = dirs::data_local_dir() {
            let path = local_app_data.join("stackplan");
            log::debug!("Using Windows state dir: {}", path.display());
            return Ok(path);
        }
    }

    // Unix default: ~/.local/state/stackplan
    let home = dirs::home_dir().context("Could not determine home directory")?;
    let path = home.join(".local").join("state").join("stackplan");
    log::debug!("Using default state dir: {}", path.display());
    Ok(path)
}

/// State file for a stack: an explicit path wins, otherwise
/// `<state_dir>/<stack>.json`.
pub fn state_file(explicit: Option<&str>, stack: &str) -> Result<PathBuf> {
    match explicit {
        Some(path) => Ok(expand(path)),
        None => Ok(state_dir()?.join(format!("{stack}.json"))),
    }
}

/// Expand ~ and environment variables in a path string.
pub fn expand(path: &str) -> PathBuf {
    let expanded = shellexpand::full(path).unwrap_or(std::borrow::Cow::Borrowed(path));
    PathBuf::from(expanded.as_ref())
}

// ============================================================================
// Tests
// ============================================================================
