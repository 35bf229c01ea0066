//! Progress indicators for stackplan.

use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Bar for `len` resources, in the style used across the CLI.
pub fn bar(len: u64, msg: &str) -> ProgressBar {
    let pb = ProgressBar::new(len);
    if let Ok(style) =
        ProgressStyle::default_bar().template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
    {
        pb.set_style(style.progress_chars("=>-"));
    }
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

/// Bar that draws nothing, for `--quiet` runs.
pub fn hidden() -> ProgressBar {
    ProgressBar::hidden()
}
