//! Diff display

use colored::{ColoredString, Colorize};
use declarative::{DiffAction, DiffSummary, ResourceDiff, group_by_kind};

fn colored_symbol(action: DiffAction) -> ColoredString {
    let symbol = action.symbol();
    match action {
        DiffAction::Create => symbol.green(),
        DiffAction::Update => symbol.yellow(),
        DiffAction::Replace => symbol.magenta(),
        DiffAction::Delete => symbol.red(),
        DiffAction::Read => symbol.blue(),
        DiffAction::NoChange => symbol.dimmed(),
    }
}

/// Display a list of diffs grouped by kind
///
/// Unchanged resources are only listed when `verbose` is set.
pub fn display_diff(diffs: &[ResourceDiff], verbose: bool) {
    let summary = DiffSummary::from_diffs(diffs);

    if !summary.has_changes() && !verbose {
        println!();
        println!("  {} No changes needed", "✓".green());
        return;
    }

    println!();
    println!(
        "┌─ {} ─────────────────────────────────────────┐",
        "Stack Diff".bold()
    );
    println!("│");

    for (kind, kind_diffs) in group_by_kind(diffs) {
        let shown: Vec<_> = kind_diffs
            .into_iter()
            .filter(|d| verbose || d.action != DiffAction::NoChange)
            .collect();
        if shown.is_empty() {
            continue;
        }

        println!("│ {}", kind.bold());
        for diff in shown {
            println!(
                "│   {:<3} {:<30} {}",
                colored_symbol(diff.action),
                diff.external_name,
                describe(diff).dimmed()
            );
            if diff.action == DiffAction::Update || (verbose && diff.action == DiffAction::Replace) {
                print_config_diff(diff);
            }
        }
        println!("│");
    }

    println!("├─────────────────────────────────────────────────────┤");
    println!(
        "│ Summary: {} to create, {} to update, {} to replace, {} to delete",
        summary.creates.to_string().green(),
        summary.updates.to_string().yellow(),
        summary.replaces.to_string().magenta(),
        summary.deletes.to_string().red()
    );
    if summary.reads > 0 {
        println!("│          {} data sources to read", summary.reads.to_string().blue());
    }
    println!("└─────────────────────────────────────────────────────┘");
}

/// Short description of what happens to one resource
fn describe(diff: &ResourceDiff) -> String {
    match diff.action {
        DiffAction::Create => "(new)".to_string(),
        DiffAction::Update => format!("({})", diff.changed_keys.join(", ")),
        DiffAction::Replace => match &diff.replaces {
            Some(old) => format!("(replaces {}.{})", old.kind, old.external_name),
            None => "(replace)".to_string(),
        },
        DiffAction::Delete => "(no longer declared)".to_string(),
        DiffAction::Read => "(data source)".to_string(),
        DiffAction::NoChange => String::new(),
    }
}

/// Line diff of recorded vs planned config
fn print_config_diff(diff: &ResourceDiff) {
    let pretty = |value: &Option<serde_json::Value>| {
        value
            .as_ref()
            .and_then(|v| serde_json::to_string_pretty(v).ok())
            .map(|s| s + "\n")
            .unwrap_or_default()
    };
    let before = pretty(&diff.before);
    let after = pretty(&diff.after);

    let text_diff = similar::TextDiff::from_lines(&before, &after);
    for change in text_diff.iter_all_changes() {
        match change.tag() {
            similar::ChangeTag::Delete => {
                print!("│       {}", format!("- {change}").red());
            }
            similar::ChangeTag::Insert => {
                print!("│       {}", format!("+ {change}").green());
            }
            similar::ChangeTag::Equal => {}
        }
    }
}
