use crate::analysis::{Analysis, Issue, IssueDetail, Severity};
use crate::discovery::file_name;
use crate::error::Result;
use std::path::Path;

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Render the markdown report for one analysis.
pub fn render_markdown(analysis: &Analysis, workspace: &Path, generated_at: &str) -> String {
    let stats = &analysis.stats;
    let mut lines: Vec<String> = Vec::new();

    lines.push("# Memory Optimization Report".to_string());
    lines.push(format!("Workspace: {}", workspace.display()));
    lines.push(format!("Analyzed: {}", generated_at));
    lines.push(String::new());
    lines.push(format!("## Memory Efficiency Score: {}/100", analysis.score));
    lines.push(String::new());
    lines.push("### Summary".to_string());
    lines.push(format!("- Files scanned: {}", stats.files_scanned));
    lines.push(format!("- Total size: {:.1} KB", stats.total_bytes as f64 / 1024.0));
    lines.push(format!("- Total entries: {}", stats.total_entries));
    lines.push(format!("- Duplicates found: {}", stats.duplicates));
    lines.push(format!("- Stale entries: {}", stats.stale_entries));
    lines.push(format!("- Missing indexes: {}", stats.missing_indexes));
    lines.push(format!("- Structure issues: {}", stats.structure_issues));
    lines.push(String::new());

    if !analysis.load_warnings.is_empty() {
        lines.push("### Unreadable Files".to_string());
        for warning in &analysis.load_warnings {
            lines.push(format!("- {}", warning));
        }
        lines.push(String::new());
    }

    let sections = [
        (Severity::Critical, "## Critical Issues", 10),
        (Severity::Warning, "## Warnings", 8),
        (Severity::Suggestion, "## Suggestions", 5),
    ];
    for (severity, title, max_details) in sections {
        let issues: Vec<&Issue> = analysis.issues_by_severity(severity).collect();
        if issues.is_empty() {
            continue;
        }
        lines.push(title.to_string());
        lines.push(String::new());
        for (i, issue) in issues.iter().enumerate() {
            lines.push(format!("{}. **{}**", i + 1, issue.message));
            for detail in issue.details.iter().take(max_details) {
                lines.extend(render_detail(detail));
            }
            lines.push(String::new());
        }
    }

    lines.push("## Recommended Actions".to_string());
    lines.push(String::new());
    if stats.duplicates > 0 {
        lines.push(format!("- [ ] Remove {} duplicate entries", stats.duplicates));
    }
    if stats.stale_entries > 0 {
        lines.push(format!("- [ ] Archive {} stale entries", stats.stale_entries));
    }
    if stats.missing_indexes > 0 {
        lines.push(format!("- [ ] Add index/TOC to {} large files", stats.missing_indexes));
    }
    if stats.structure_issues > 0 {
        lines.push(format!("- [ ] Fix {} structural issues", stats.structure_issues));
    }
    if stats.duplicates == 0 && stats.stale_entries == 0 && stats.structure_issues == 0 {
        lines.push("No critical actions needed, memory is well-organized.".to_string());
    }
    lines.push(String::new());
    lines.push("---".to_string());
    lines.push(format!("*Generated by memopt v{}*", VERSION));

    lines.join("\n")
}

fn render_detail(detail: &IssueDetail) -> Vec<String> {
    match detail {
        IssueDetail::Duplicate(d) => vec![
            format!(
                "   - `{}` ({}:{})",
                truncate(&d.entry1.text, 60),
                file_name(&d.entry1.document),
                d.entry1.line
            ),
            format!(
                "     <-> `{}` ({}:{}) [{}% similar]",
                truncate(&d.entry2.text, 60),
                file_name(&d.entry2.document),
                d.entry2.line,
                d.similarity
            ),
        ],
        IssueDetail::Stale(s) => vec![format!("   - `{}` ({} days old)", truncate(&s.text, 80), s.age_days)],
        IssueDetail::Structure(s) => vec![format!("   - {} ({}:{})", s.message, file_name(&s.document), s.line)],
        IssueDetail::MissingIndex(m) => vec![format!("   - {}", m.message)],
    }
}

/// Cut to `max` characters, marking the cut.
fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let cut: String = text.chars().take(max).collect();
    format!("{}...", cut)
}

pub fn render_json(analysis: &Analysis) -> Result<String> {
    Ok(serde_json::to_string_pretty(analysis)?)
}
