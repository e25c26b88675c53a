//! Plain-text rendering of a presentation tree

use crate::tree::LockNode;
use std::fmt::Write;

const NAME_WIDTH: usize = 56;
const RULE_WIDTH: usize = 94;

/// What to include in a rendered report
#[derive(Debug, Clone, Copy, Default)]
pub struct ReportOptions {
    /// Skip the per-monitor half of the tree
    pub threads_only: bool,
}

/// Render the tree below `root`, depth first, children indented by two spaces
pub fn render(root: &LockNode, options: ReportOptions) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "╔{}╗", "═".repeat(RULE_WIDTH - 2));
    let _ = writeln!(out, "║  {:<width$}║", "Lock Contention Summary", width = RULE_WIDTH - 4);
    let _ = writeln!(out, "╚{}╝", "═".repeat(RULE_WIDTH - 2));
    let _ = writeln!(out);

    let top: Vec<&LockNode> = root
        .children()
        .iter()
        .filter(|n| !(options.threads_only && n.is_monitor_node()))
        .collect();
    if top.is_empty() {
        let _ = writeln!(out, "No lock contention recorded.");
        return out;
    }

    let _ = writeln!(
        out,
        "{:<NAME_WIDTH$} {:>14} {:>10} {:>10}",
        "Name", "Wait Time", "Waits", "% Parent"
    );
    let _ = writeln!(out, "{}", "─".repeat(RULE_WIDTH));
    for node in top {
        render_node(&mut out, node, 0);
    }
    let _ = writeln!(out, "{}", "─".repeat(RULE_WIDTH));
    let _ = writeln!(
        out,
        "{:<NAME_WIDTH$} {:>14} {:>10}",
        "Total",
        root.time(),
        root.wait_count()
    );
    out
}

fn render_node(out: &mut String, node: &LockNode, depth: usize) {
    let label = format!("{}{}", "  ".repeat(depth), node.name());
    let _ = writeln!(
        out,
        "{:<NAME_WIDTH$} {:>14} {:>10} {:>9.1}%",
        truncate(&label, NAME_WIDTH),
        node.time(),
        node.wait_count(),
        node.percent_of_parent()
    );
    for child in node.children() {
        render_node(out, child, depth + 1);
    }
}

fn truncate(s: &str, width: usize) -> String {
    if s.chars().count() <= width {
        s.to_string()
    } else {
        let mut cut: String = s.chars().take(width - 1).collect();
        cut.push('…');
        cut
    }
}
