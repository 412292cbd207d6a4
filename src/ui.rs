use colored::Colorize;
use reconcile::{Action, Summary, Target};

/// Print an info message
pub fn info(msg: &str) {
    println!("{} {}", "ℹ".blue(), msg);
}

/// Print a success message
pub fn success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

/// Print a warning message
pub fn warn(msg: &str) {
    println!("{} {}", "⚠".yellow(), msg);
}

/// Print an error message
pub fn error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

/// Print a dim/muted message
pub fn dim(msg: &str) {
    println!("  {}", msg.dimmed());
}

/// Print a header/title
pub fn header(title: &str) {
    println!();
    println!("{}", title.bold());
    println!("{}", "─".repeat(title.chars().count()).dimmed());
}

/// Print a section header
pub fn section(title: &str) {
    println!();
    println!("{}", title.cyan().bold());
}

/// Print a key-value pair
pub fn kv(key: &str, value: &str) {
    println!("  {}: {}", key.dimmed(), value);
}

/// Print one planned or applied change
pub fn change(action: Action, target: &Target) {
    let symbol = action.symbol();
    let symbol = match action {
        Action::Created => symbol.green().bold(),
        Action::Updated => symbol.yellow().bold(),
        Action::Deleted => symbol.red().bold(),
        Action::Unchanged => symbol.dimmed(),
    };
    let line = format!("{symbol} {target}");
    if action == Action::Unchanged {
        println!("  {}", line.dimmed());
    } else {
        println!("  {line}");
    }
}

/// One-line summary, e.g. "2 created, 1 updated, 4 unchanged"
pub fn format_summary(summary: &Summary) -> String {
    let parts: Vec<String> = [
        (summary.created, "created"),
        (summary.updated, "updated"),
        (summary.deleted, "deleted"),
        (summary.unchanged, "unchanged"),
        (summary.failed, "failed"),
    ]
    .into_iter()
    .filter(|(count, _)| *count > 0)
    .map(|(count, label)| format!("{count} {label}"))
    .collect();

    if parts.is_empty() {
        "nothing to do".to_string()
    } else {
        parts.join(", ")
    }
}

/// Print the summary of a run
pub fn summary(summary: &Summary) {
    println!();
    let line = format_summary(summary);
    if summary.is_success() {
        success(&line);
    } else {
        error(&line);
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_summary_empty() {
        assert_eq!(format_summary(&Summary::default()), "nothing to do");
    }

    #[test]
    fn test_format_summary_skips_zero_counts() {
        let summary = Summary {
            created: 2,
            unchanged: 4,
            failed: 1,
            ..Default::default()
        };
        assert_eq!(format_summary(&summary), "2 created, 4 unchanged, 1 failed");
    }
}
