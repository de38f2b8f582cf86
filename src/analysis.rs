use crate::config::Config;
use crate::discovery::{Document, Loaded, WorkspaceLayout};
use crate::duplicates::{find_duplicates, DuplicatePair};
use crate::error::Result;
use crate::extract::extract;
use crate::score::{calculate_score, IssueCounts};
use crate::staleness::{find_stale, StaleFinding};
use crate::structure::{find_missing_indexes, lint, MissingIndex, StructureFinding};
use chrono::NaiveDateTime;
use serde::Serialize;

const MAX_DUPLICATE_DETAILS: usize = 20;
const MAX_STALE_DETAILS: usize = 15;
const MAX_STRUCTURE_DETAILS: usize = 15;
/// More stale findings than this is critical.
const STALE_CRITICAL_ABOVE: usize = 10;
/// This many structural findings or more is critical.
const STRUCTURE_CRITICAL_FROM: usize = 5;

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Critical,
    Warning,
    Suggestion,
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    Duplicates,
    Stale,
    Structure,
    MissingIndex,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum IssueDetail {
    Duplicate(DuplicatePair),
    Stale(StaleFinding),
    Structure(StructureFinding),
    MissingIndex(MissingIndex),
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct Issue {
    pub severity: Severity,
    pub kind: IssueKind,
    pub message: String,
    pub details: Vec<IssueDetail>,
}

#[derive(Serialize, Debug, Clone, Default, PartialEq)]
pub struct Stats {
    pub files_scanned: usize,
    pub unreadable_files: usize,
    pub total_bytes: usize,
    pub total_entries: usize,
    pub duplicates: usize,
    pub stale_entries: usize,
    pub structure_issues: usize,
    pub missing_indexes: usize,
}

impl Stats {
    pub fn counts(&self) -> IssueCounts {
        IssueCounts {
            duplicates: self.duplicates,
            stale: self.stale_entries,
            structure: self.structure_issues,
            missing_index: self.missing_indexes,
        }
    }
}

/// Everything one analysis run produces. Owned by the caller.
#[derive(Serialize, Debug, Clone)]
pub struct Analysis {
    pub score: u8,
    pub stats: Stats,
    pub issues: Vec<Issue>,
    pub load_warnings: Vec<String>,
}

impl Analysis {
    pub fn issues_by_severity(&self, severity: Severity) -> impl Iterator<Item = &Issue> {
        self.issues.iter().filter(move |i| i.severity == severity)
    }

    pub fn count(&self, severity: Severity) -> usize {
        self.issues_by_severity(severity).count()
    }
}

/// Inputs that do not come from the documents themselves.
#[derive(Debug, Clone)]
pub struct AnalysisContext {
    pub now: NaiveDateTime,
    pub stale_days: u32,
    pub similarity_threshold: f64,
    pub layout: WorkspaceLayout,
}

impl AnalysisContext {
    pub fn new(config: &Config, layout: WorkspaceLayout, now: NaiveDateTime) -> Self {
        Self {
            now,
            stale_days: config.stale_days,
            similarity_threshold: config.similarity_threshold,
            layout,
        }
    }
}

/// Run the read path over a loaded snapshot.
///
/// Returns `Ok(None)` when there is nothing to analyze.
pub fn analyze(loaded: &Loaded, ctx: &AnalysisContext) -> Result<Option<Analysis>> {
    let documents: &[Document] = &loaded.documents;
    if documents.is_empty() {
        return Ok(None);
    }

    let extraction = extract(documents)?;
    let duplicates = find_duplicates(&extraction.entries, ctx.similarity_threshold)?;
    let stale = find_stale(&extraction.entries, documents, ctx.now, ctx.stale_days)?;
    let structure = lint(documents, &extraction)?;
    let missing = find_missing_indexes(documents, &extraction);

    let stats = Stats {
        files_scanned: documents.len(),
        unreadable_files: loaded.warnings.len(),
        total_bytes: documents.iter().map(|d| d.bytes).sum(),
        total_entries: extraction.entries.len(),
        duplicates: duplicates.len(),
        stale_entries: stale.len(),
        structure_issues: structure.len(),
        missing_indexes: missing.len(),
    };

    let mut issues = Vec::new();

    if !duplicates.is_empty() {
        issues.push(Issue {
            severity: Severity::Critical,
            kind: IssueKind::Duplicates,
            message: format!("{} duplicate entries found", duplicates.len()),
            details: duplicates
                .into_iter()
                .take(MAX_DUPLICATE_DETAILS)
                .map(IssueDetail::Duplicate)
                .collect(),
        });
    }

    if !stale.is_empty() {
        issues.push(Issue {
            severity: if stale.len() > STALE_CRITICAL_ABOVE {
                Severity::Critical
            } else {
                Severity::Warning
            },
            kind: IssueKind::Stale,
            message: format!("{} stale entries with outdated dates", stale.len()),
            details: stale.into_iter().take(MAX_STALE_DETAILS).map(IssueDetail::Stale).collect(),
        });
    }

    if !structure.is_empty() {
        issues.push(Issue {
            severity: if structure.len() >= STRUCTURE_CRITICAL_FROM {
                Severity::Critical
            } else {
                Severity::Warning
            },
            kind: IssueKind::Structure,
            message: format!("{} structural issues found", structure.len()),
            details: structure
                .into_iter()
                .take(MAX_STRUCTURE_DETAILS)
                .map(IssueDetail::Structure)
                .collect(),
        });
    }

    if !missing.is_empty() {
        issues.push(Issue {
            severity: Severity::Suggestion,
            kind: IssueKind::MissingIndex,
            message: format!("{} files would benefit from an index/TOC", missing.len()),
            details: missing.into_iter().map(IssueDetail::MissingIndex).collect(),
        });
    }

    let score = calculate_score(&stats.counts(), &ctx.layout);

    Ok(Some(Analysis {
        score,
        stats,
        issues,
        load_warnings: loaded.warnings.clone(),
    }))
}
