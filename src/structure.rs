use crate::discovery::Document;
use crate::error::Result;
use crate::extract::{Extraction, Heading};
use regex::Regex;
use serde::Serialize;
use std::path::{Path, PathBuf};

const MAX_LINES_WITHOUT_HEADINGS: usize = 50;
const MAX_SECTION_LINES: usize = 100;
const INDEX_MIN_HEADINGS: usize = 5;
const INDEX_MIN_LINES: usize = 80;

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StructureRule {
    HeadingJump,
    NoHeadings,
    LongSection,
    EmptySection,
    BrokenLink,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct StructureFinding {
    pub rule: StructureRule,
    pub document: PathBuf,
    pub line: usize,
    pub message: String,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct MissingIndex {
    pub document: PathBuf,
    pub headings: usize,
    pub lines: usize,
    pub message: String,
}

/// Heading titles that already act as a table of contents.
pub fn is_toc_title(title: &str) -> bool {
    let t = title.trim().trim_end_matches(':').trim().to_lowercase();
    matches!(t.as_str(), "table of contents" | "toc" | "index" | "contents")
}

/// Check every document independently against the structural rules.
pub fn lint(documents: &[Document], extraction: &Extraction) -> Result<Vec<StructureFinding>> {
    let link_re = Regex::new(r"\[([^\]]+)\]\(([^)]+)\)")?;
    let mut findings = Vec::new();

    for doc in documents {
        let lines: Vec<&str> = doc.content.split('\n').collect();
        let headings: Vec<&Heading> = extraction.headings_for(doc).collect();
        let name = doc.file_name();

        check_hierarchy(doc, &headings, &mut findings);

        if lines.len() > MAX_LINES_WITHOUT_HEADINGS && headings.is_empty() {
            findings.push(StructureFinding {
                rule: StructureRule::NoHeadings,
                document: doc.path.clone(),
                line: 1,
                message: format!(
                    "{} has {} lines but no headings, consider adding structure",
                    name,
                    lines.len()
                ),
            });
        }

        for pair in headings.windows(2) {
            let (prev, h) = (pair[0], pair[1]);
            let gap = h.line - prev.line;
            if gap > MAX_SECTION_LINES {
                findings.push(StructureFinding {
                    rule: StructureRule::LongSection,
                    document: doc.path.clone(),
                    line: prev.line,
                    message: format!(
                        "Very long section ({} lines) before \"{}\", consider splitting",
                        gap, h.title
                    ),
                });
            }
        }

        check_empty_sections(doc, &headings, &lines, &mut findings);
        check_links(doc, &lines, &link_re, &mut findings);
    }

    tracing::debug!(found = findings.len(), "structure lint");
    Ok(findings)
}

fn check_hierarchy(doc: &Document, headings: &[&Heading], out: &mut Vec<StructureFinding>) {
    for pair in headings.windows(2) {
        let (prev, h) = (pair[0], pair[1]);
        if h.level > prev.level + 1 {
            out.push(StructureFinding {
                rule: StructureRule::HeadingJump,
                document: doc.path.clone(),
                line: h.line,
                message: format!(
                    "Heading level jumps from {} to {}: \"{}\"",
                    prev.level, h.level, h.title
                ),
            });
        }
    }
}

fn check_empty_sections(doc: &Document, headings: &[&Heading], lines: &[&str], out: &mut Vec<StructureFinding>) {
    for (i, h) in headings.iter().enumerate() {
        // Heading lines are 1-indexed; the body starts right after.
        let start = h.line.min(lines.len());
        let end = headings
            .get(i + 1)
            .map(|next| next.line - 1)
            .unwrap_or(lines.len())
            .max(start);

        if lines[start..end].iter().all(|l| l.trim().is_empty()) {
            out.push(StructureFinding {
                rule: StructureRule::EmptySection,
                document: doc.path.clone(),
                line: h.line,
                message: format!("Empty section: \"{}\"", h.title),
            });
        }
    }
}

fn check_links(doc: &Document, lines: &[&str], link_re: &Regex, out: &mut Vec<StructureFinding>) {
    let base = doc.path.parent().unwrap_or_else(|| Path::new(""));

    for (i, line) in lines.iter().enumerate() {
        for caps in link_re.captures_iter(line) {
            let text = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
            let target = caps.get(2).map(|m| m.as_str()).unwrap_or_default();
            if target.starts_with('#') || target.starts_with("http") || target.starts_with("mailto") {
                continue;
            }

            let file_part = target.split('#').next().unwrap_or_default().trim();
            if file_part.is_empty() || base.join(file_part).exists() {
                continue;
            }

            out.push(StructureFinding {
                rule: StructureRule::BrokenLink,
                document: doc.path.clone(),
                line: i + 1,
                message: format!("Broken link: [{}]({})", text, target),
            });
        }
    }
}

/// Large, sectioned documents without a table of contents.
pub fn find_missing_indexes(documents: &[Document], extraction: &Extraction) -> Vec<MissingIndex> {
    let mut missing = Vec::new();

    for doc in documents {
        let headings: Vec<&Heading> = extraction.headings_for(doc).collect();
        let lines = doc.content.split('\n').count();

        if headings.len() <= INDEX_MIN_HEADINGS || lines <= INDEX_MIN_LINES {
            continue;
        }
        if headings.iter().any(|h| is_toc_title(&h.title)) {
            continue;
        }

        missing.push(MissingIndex {
            document: doc.path.clone(),
            headings: headings.len(),
            lines,
            message: format!(
                "{} has {} sections and {} lines, consider adding a table of contents",
                doc.file_name(),
                headings.len(),
                lines
            ),
        });
    }

    missing
}
