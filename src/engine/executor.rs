//! Execution engine - terminal progress, confirmation and summaries around
//! the declarative executor

use anyhow::Result;
use colored::Colorize;
use declarative::{
    ApplyResult, ConfirmCallback, ExecuteOptions, ExecuteSummary, Execution, PriorState,
    ProgressCallback, Provisioner, Synthesis,
};
use indicatif::ProgressBar;

use crate::progress;

/// Progress bar over every resource in the plan
pub struct BarProgress {
    pb: ProgressBar,
}

impl BarProgress {
    pub fn new(total: usize, quiet: bool) -> Self {
        let pb = if quiet {
            progress::hidden()
        } else {
            progress::bar(total as u64, "Applying")
        };
        Self { pb }
    }

    pub fn finish(&self) {
        self.pb.finish_and_clear();
    }
}

impl ProgressCallback for BarProgress {
    fn on_wave_start(&mut self, index: usize, count: usize) {
        log::debug!("starting wave {} ({count} resources)", index + 1);
        self.pb.set_message(format!("wave {}", index + 1));
    }

    fn on_resource_start(&mut self, _id: &str, external_name: &str) {
        self.pb.set_message(external_name.to_string());
    }

    fn on_resource_complete(&mut self, id: &str, result: &ApplyResult) {
        self.pb.set_message(format!("{} {}", symbol(result), id));
        if let ApplyResult::Failed { error } = result {
            self.pb
                .println(format!("  {} {}: {}", "✗".red(), id, error));
        }
        self.pb.inc(1);
    }

    fn on_wave_complete(&mut self) {}
}

/// Interactive confirmation, skipped with `--yes`
pub struct PromptConfirm {
    pub yes: bool,
}

impl ConfirmCallback for PromptConfirm {
    fn confirm(&mut self, prompt: &str) -> Result<bool> {
        use dialoguer::Confirm;

        if self.yes {
            return Ok(true);
        }
        let confirmed = Confirm::new()
            .with_prompt(prompt)
            .default(true)
            .interact()?;
        Ok(confirmed)
    }
}

fn symbol(result: &ApplyResult) -> &'static str {
    match result {
        ApplyResult::NoChange => "○",
        ApplyResult::Read => "↓",
        ApplyResult::Created
        | ApplyResult::Updated
        | ApplyResult::Replaced
        | ApplyResult::Deleted => "✓",
        ApplyResult::Failed { .. } => "✗",
        ApplyResult::Skipped { .. } => "⊘",
    }
}

/// Run the declarative executor with a progress bar and prompt
pub fn run<V: Provisioner>(
    synthesis: &Synthesis,
    prior: &PriorState,
    opts: &ExecuteOptions,
    provisioner: &V,
    yes: bool,
    quiet: bool,
) -> Result<Execution> {
    // Deletions are reported through the same bar.
    let total = synthesis.plan.len() + prior.len().saturating_sub(synthesis.plan.len());
    let mut progress = BarProgress::new(total, quiet || opts.dry_run);
    let mut confirm = PromptConfirm { yes };

    let execution = declarative::execute(
        synthesis,
        prior,
        opts,
        provisioner,
        &mut progress,
        &mut confirm,
    );
    progress.finish();
    execution
}

/// Print failed and skipped resources
pub fn print_problems(execution: &Execution) {
    for (address, result) in &execution.results {
        match result {
            ApplyResult::Failed { error } => {
                println!("    {} {} {}", "✗".red(), address, error.dimmed());
            }
            ApplyResult::Skipped { reason } => {
                println!("    {} {} {}", "⊘".yellow(), address, reason.dimmed());
            }
            _ => {}
        }
    }
}

/// Print final summary
pub fn print_summary(summary: &ExecuteSummary) {
    println!();
    if summary.is_success() {
        println!("  {} Stack applied successfully!", "✓".green().bold());
    } else {
        println!("  {} Stack applied with errors", "⚠".yellow().bold());
    }

    if summary.created > 0 {
        println!("    • {} resources created", summary.created);
    }
    if summary.updated > 0 {
        println!("    • {} resources updated", summary.updated);
    }
    if summary.replaced > 0 {
        println!("    • {} resources replaced", summary.replaced);
    }
    if summary.deleted > 0 {
        println!("    • {} resources deleted", summary.deleted);
    }
    if summary.read > 0 {
        println!("    • {} data sources read", summary.read);
    }
    if summary.no_change > 0 {
        println!("    • {} resources unchanged", summary.no_change);
    }
    if summary.skipped > 0 {
        println!("    • {} resources skipped", summary.skipped);
    }
    if summary.failed > 0 {
        println!("    • {} {} failed", summary.failed, "resources".red());
    }
}
