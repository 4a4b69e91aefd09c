//! Unified diff rendering for `--diff` and dry runs.

use colored::Colorize;
use similar::{ChangeTag, TextDiff};
use std::fmt::Write;
use std::path::Path;

/// Render a line diff between the original and patched text.
///
/// Colors follow the global `colored` override, so callers can switch them
/// off for non-terminal output.
pub fn render_diff(file: &Path, original: &str, patched: &str) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{}",
        format!("--- {} (original)", file.display()).dimmed()
    );
    let _ = writeln!(out, "{}", format!("+++ {} (patched)", file.display()).dimmed());

    let diff = TextDiff::from_lines(original, patched);

    for (idx, group) in diff.grouped_ops(3).iter().enumerate() {
        if idx > 0 {
            let _ = writeln!(out, "{}", "...".dimmed());
        }
        for op in group {
            for change in diff.iter_changes(op) {
                let line = match change.tag() {
                    ChangeTag::Delete => format!("-{}", change).red(),
                    ChangeTag::Insert => format!("+{}", change).green(),
                    ChangeTag::Equal => format!(" {}", change).normal(),
                };
                let _ = write!(out, "{}", line);
                if change.missing_newline() {
                    out.push('\n');
                }
            }
        }
    }

    out
}
