//! Destructive fixes for the issues the analyzer reports.
//!
//! Four operations, each independently runnable and idempotent: a second run
//! over its own output changes nothing. Every operation re-reads the files it
//! touches, so in apply mode later operations see earlier rewrites. In dry-run
//! mode nothing is written, but byte deltas and the change log are computed
//! exactly as for a real run.

use crate::config::Config;
use crate::discovery::{load_documents, Document};
use crate::error::{MemoptError, Result};
use crate::similarity::similarity;
use crate::staleness::{cutoff, midnight, StalePatterns};
use crate::structure::is_toc_title;
use chrono::NaiveDateTime;
use regex::Regex;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Normalized list items shorter than this are never deduplicated.
const MIN_DEDUP_CHARS: usize = 15;
/// Fuzzy candidates must share this many leading characters.
const FUZZY_PREFIX_CHARS: usize = 20;
const TOC_MIN_LINES: usize = 80;
const TOC_MIN_SECTIONS: usize = 4;
const TOC_TITLE: &str = "## Table of Contents";
const ARCHIVED_MARKER: &str = "[ARCHIVED] ";

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq, Hash, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Dedup,
    Reindex,
    Stale,
    Structure,
}

impl Operation {
    pub const ALL: [Operation; 4] = [Operation::Dedup, Operation::Reindex, Operation::Stale, Operation::Structure];

    pub fn name(self) -> &'static str {
        match self {
            Operation::Dedup => "dedup",
            Operation::Reindex => "reindex",
            Operation::Stale => "stale",
            Operation::Structure => "structure",
        }
    }
}

#[derive(Debug, Clone)]
pub struct RewriteOptions {
    pub dry_run: bool,
    pub backup: bool,
    pub stale_days: u32,
    pub similarity_threshold: f64,
    pub primary_document: String,
    pub now: NaiveDateTime,
}

impl RewriteOptions {
    pub fn new(config: &Config, dry_run: bool, backup: bool, now: NaiveDateTime) -> Self {
        Self {
            dry_run,
            backup,
            stale_days: config.stale_days,
            similarity_threshold: config.similarity_threshold,
            primary_document: config.primary_document.clone(),
            now,
        }
    }
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct RewriteRecord {
    pub operation: Operation,
    pub document: PathBuf,
    pub before_bytes: usize,
    pub after_bytes: usize,
    pub dry_run: bool,
}

/// Accumulated over one run, never persisted.
#[derive(Serialize, Debug, Clone, Default)]
pub struct RewriteReport {
    pub changes: Vec<String>,
    pub records: Vec<RewriteRecord>,
    /// Files written, or that would be written in dry-run mode.
    pub files_modified: usize,
    /// Encoded-length delta from dedup and structure fixes.
    pub bytes_saved: i64,
    pub failures: Vec<String>,
    /// Unreadable files, skipped by every operation.
    pub warnings: Vec<String>,
}

pub struct Optimizer {
    documents: Vec<PathBuf>,
    options: RewriteOptions,
    report: RewriteReport,
}

impl Optimizer {
    pub fn new(documents: Vec<PathBuf>, options: RewriteOptions) -> Self {
        Self {
            documents,
            options,
            report: RewriteReport::default(),
        }
    }

    pub fn report(&self) -> &RewriteReport {
        &self.report
    }

    pub fn into_report(self) -> RewriteReport {
        self.report
    }

    /// Run one operation; returns how many items it changed.
    ///
    /// A failure aborts only this operation and is recorded in the report.
    pub fn run(&mut self, op: Operation) -> Result<usize> {
        let result = match op {
            Operation::Dedup => self.dedup(),
            Operation::Reindex => self.reindex(),
            Operation::Stale => self.archive_stale(),
            Operation::Structure => self.normalize_structure(),
        };

        if let Err(e) = &result {
            tracing::warn!(operation = op.name(), error = %e, "operation failed");
            self.report.failures.push(format!("{}: {}", op.name(), e));
        }
        result
    }

    /// Read every candidate up front. Unreadable files are left out and
    /// recorded once as warnings.
    fn load(&mut self) -> Vec<Document> {
        let loaded = load_documents(&self.documents);
        for warning in loaded.warnings {
            if !self.report.warnings.contains(&warning) {
                self.report.warnings.push(warning);
            }
        }
        loaded.documents
    }

    /// Remove duplicate list items across the whole corpus.
    pub fn dedup(&mut self) -> Result<usize> {
        let patterns = DedupPatterns::new()?;
        let docs = self.load();

        let plan = plan_dedup(
            &docs,
            &patterns,
            &self.options.primary_document,
            self.options.similarity_threshold,
        );
        let mut total_removed = 0;

        for (idx, doc) in docs.iter().enumerate() {
            let Some(lines) = plan.get(&idx) else {
                continue;
            };
            let new_content = remove_lines(&doc.content, lines, &patterns);
            self.report.bytes_saved += doc.content.len() as i64 - new_content.len() as i64;
            total_removed += lines.len();

            self.report
                .changes
                .push(format!("  Removed {} duplicates from {}", lines.len(), doc.file_name()));
            self.write(Operation::Dedup, &doc.path, &doc.content, &new_content)?;
        }

        Ok(total_removed)
    }

    /// Add a table of contents to large sectioned files that lack one.
    pub fn reindex(&mut self) -> Result<usize> {
        let patterns = TocPatterns::new()?;
        let mut added = 0;

        for doc in self.load() {
            match build_toc(&doc.content, &patterns) {
                TocOutcome::Added { content: new_content, sections } => {
                    self.report
                        .changes
                        .push(format!("  Added TOC to {} ({} sections)", doc.file_name(), sections));
                    self.write(Operation::Reindex, &doc.path, &doc.content, &new_content)?;
                    added += 1;
                }
                TocOutcome::AlreadyIndexed => {
                    self.report
                        .changes
                        .push(format!("  {}: TOC already exists", doc.file_name()));
                }
                TocOutcome::Skipped => {}
            }
        }

        Ok(added)
    }

    /// Mark live-status list items in old dated files as archived.
    pub fn archive_stale(&mut self) -> Result<usize> {
        let stale = StalePatterns::new()?;
        let item_re = archive_pattern()?;
        let cutoff = cutoff(self.options.now, self.options.stale_days);
        let mut archived = 0;

        for doc in self.load() {
            let name = doc.file_name();
            let Some(date) = stale.file_date(&name) else {
                continue;
            };
            if midnight(date) >= cutoff {
                continue;
            }

            let (new_content, count) = archive_items(&doc.content, &item_re);
            if count == 0 {
                continue;
            }
            archived += count;
            self.report
                .changes
                .push(format!("  Archived {} stale entries in {}", count, name));
            self.write(Operation::Stale, &doc.path, &doc.content, &new_content)?;
        }

        Ok(archived)
    }

    /// Whitespace and heading-spacing cleanup.
    pub fn normalize_structure(&mut self) -> Result<usize> {
        let patterns = NormalizePatterns::new()?;
        let mut fixed = 0;

        for doc in self.load() {
            let new_content = normalize(&doc.content, &patterns);
            if new_content == doc.content {
                continue;
            }
            self.report.bytes_saved += doc.content.len() as i64 - new_content.len() as i64;
            fixed += 1;
            self.write(Operation::Structure, &doc.path, &doc.content, &new_content)?;
        }

        Ok(fixed)
    }

    fn write(&mut self, op: Operation, path: &Path, before: &str, after: &str) -> Result<()> {
        self.report.records.push(RewriteRecord {
            operation: op,
            document: path.to_path_buf(),
            before_bytes: before.len(),
            after_bytes: after.len(),
            dry_run: self.options.dry_run,
        });
        self.report.files_modified += 1;

        if self.options.dry_run {
            self.report
                .changes
                .push(format!("[DRY RUN] Would modify: {}", path.display()));
            return Ok(());
        }

        if self.options.backup {
            let bak = backup_path(path);
            fs::copy(path, &bak).map_err(|source| MemoptError::Backup {
                path: path.to_path_buf(),
                source,
            })?;
            tracing::info!(path = %bak.display(), "created backup");
            self.report.changes.push(format!("Created backup: {}", bak.display()));
        }

        write_atomic(path, after)?;
        tracing::info!(path = %path.display(), operation = op.name(), "modified");
        self.report.changes.push(format!("Modified: {}", path.display()));
        Ok(())
    }
}

pub fn backup_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".bak");
    PathBuf::from(name)
}

/// Write through a temp file in the same directory, then rename over the
/// target. A failure leaves the original untouched.
fn write_atomic(path: &Path, content: &str) -> Result<()> {
    let err = |source| MemoptError::Write {
        path: path.to_path_buf(),
        source,
    };
    let dir = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or_else(|| Path::new("."));

    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(err)?;
    tmp.write_all(content.as_bytes()).map_err(err)?;
    tmp.persist(path).map_err(|e| err(e.error))?;
    Ok(())
}

// ============================================================================
// Dedup
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Loc {
    doc: usize,
    /// 0-indexed line.
    line: usize,
}

enum Loser {
    Current,
    Seen,
}

struct DedupPatterns {
    list_item: Regex,
    whitespace: Regex,
    blank_run: Regex,
}

impl DedupPatterns {
    fn new() -> Result<Self> {
        Ok(Self {
            list_item: Regex::new(r"^(\s*[-*+]\s+)(.+)")?,
            whitespace: Regex::new(r"\s+")?,
            blank_run: Regex::new(r"\n{3,}")?,
        })
    }
}

/// Lines to delete per document index, computed in a single ordered pass.
///
/// The first occurrence of a normalized item is kept unless a later copy
/// lives in the canonical document, or the first copy sits in a
/// lexicographically later path. Within one document the later line goes.
fn plan_dedup(
    docs: &[Document],
    patterns: &DedupPatterns,
    primary: &str,
    threshold: f64,
) -> BTreeMap<usize, BTreeSet<usize>> {
    let canonical: Vec<bool> = docs.iter().map(|d| d.file_name() == primary).collect();
    let path_keys: Vec<String> = docs.iter().map(|d| d.path.to_string_lossy().to_string()).collect();

    let loser = |cur: Loc, seen: Loc| -> Loser {
        match (canonical[cur.doc], canonical[seen.doc]) {
            (false, true) => Loser::Current,
            (true, false) => Loser::Seen,
            _ => {
                if path_keys[cur.doc] >= path_keys[seen.doc] {
                    Loser::Current
                } else {
                    Loser::Seen
                }
            }
        }
    };

    let mut exact: HashMap<String, Loc> = HashMap::new();
    // First 20 chars -> surviving normalized texts, in insertion order.
    let mut buckets: BTreeMap<String, Vec<String>> = BTreeMap::new();
    let mut removals: BTreeMap<usize, BTreeSet<usize>> = BTreeMap::new();

    for (doc, document) in docs.iter().enumerate() {
        for (line, raw) in document.content.split('\n').enumerate() {
            let Some(caps) = patterns.list_item.captures(raw) else {
                continue;
            };
            let text = caps.get(2).map(|m| m.as_str()).unwrap_or_default();
            let normalized = patterns.whitespace.replace_all(text.to_lowercase().trim(), " ").to_string();
            if normalized.chars().count() < MIN_DEDUP_CHARS {
                continue;
            }

            let cur = Loc { doc, line };
            let seen_text = if exact.contains_key(&normalized) {
                Some(normalized.clone())
            } else {
                fuzzy_match(&buckets, &normalized, threshold)
            };

            let Some(seen_text) = seen_text else {
                buckets.entry(prefix(&normalized)).or_default().push(normalized.clone());
                exact.insert(normalized, cur);
                continue;
            };

            let Some(seen) = exact.get(&seen_text).copied() else {
                continue;
            };
            match loser(cur, seen) {
                Loser::Current => {
                    removals.entry(cur.doc).or_default().insert(cur.line);
                }
                Loser::Seen => {
                    removals.entry(seen.doc).or_default().insert(seen.line);
                    exact.remove(&seen_text);
                    if let Some(bucket) = buckets.get_mut(&prefix(&seen_text)) {
                        if let Some(slot) = bucket.iter_mut().find(|t| **t == seen_text) {
                            *slot = normalized.clone();
                        }
                    }
                    exact.insert(normalized, cur);
                }
            }
        }
    }

    tracing::debug!(
        documents = removals.len(),
        lines = removals.values().map(|s| s.len()).sum::<usize>(),
        "dedup plan"
    );
    removals
}

fn prefix(text: &str) -> String {
    text.chars().take(FUZZY_PREFIX_CHARS).collect()
}

/// First surviving text that starts with the same 20 characters, has a
/// comparable length, and clears the similarity threshold.
fn fuzzy_match(buckets: &BTreeMap<String, Vec<String>>, normalized: &str, threshold: f64) -> Option<String> {
    let key = prefix(normalized);
    let len = normalized.chars().count();

    buckets
        .range(key.clone()..)
        .take_while(|(k, _)| k.starts_with(&key))
        .flat_map(|(_, texts)| texts.iter())
        .find(|seen| {
            let seen_len = seen.chars().count();
            if len.abs_diff(seen_len) as f64 > len.max(seen_len) as f64 * 0.3 {
                return false;
            }
            similarity(normalized, seen) >= threshold
        })
        .cloned()
}

/// Drop the given 0-indexed lines, then squeeze runs of 3+ newlines to 2.
fn remove_lines(content: &str, remove: &BTreeSet<usize>, patterns: &DedupPatterns) -> String {
    let kept: Vec<&str> = content
        .split('\n')
        .enumerate()
        .filter(|(i, _)| !remove.contains(i))
        .map(|(_, l)| l)
        .collect();
    patterns.blank_run.replace_all(&kept.join("\n"), "\n\n").to_string()
}

// ============================================================================
// Reindex
// ============================================================================

struct TocPatterns {
    heading: Regex,
    title: Regex,
    slug_strip: Regex,
}

impl TocPatterns {
    fn new() -> Result<Self> {
        Ok(Self {
            heading: Regex::new(r"^(#{1,6})\s+(.+)")?,
            title: Regex::new(r"^#\s+")?,
            slug_strip: Regex::new(r"[^\w\s-]")?,
        })
    }

    fn anchor(&self, title: &str) -> String {
        self.slug_strip
            .replace_all(&title.to_lowercase(), "")
            .replace(' ', "-")
    }
}

#[derive(Debug, PartialEq)]
enum TocOutcome {
    Added { content: String, sections: usize },
    AlreadyIndexed,
    Skipped,
}

fn build_toc(content: &str, patterns: &TocPatterns) -> TocOutcome {
    let lines: Vec<&str> = content.split('\n').collect();
    if lines.len() < TOC_MIN_LINES {
        return TocOutcome::Skipped;
    }

    let headings: Vec<(usize, String)> = lines
        .iter()
        .filter_map(|l| patterns.heading.captures(l))
        .map(|caps| {
            let level = caps.get(1).map(|m| m.as_str().len()).unwrap_or(1);
            let title = caps.get(2).map(|m| m.as_str().trim().to_string()).unwrap_or_default();
            (level, title)
        })
        .collect();

    let sections: Vec<&(usize, String)> = headings.iter().filter(|(level, _)| *level > 1).collect();
    if sections.len() < TOC_MIN_SECTIONS {
        return TocOutcome::Skipped;
    }
    if headings.iter().any(|(_, title)| is_toc_title(title)) {
        return TocOutcome::AlreadyIndexed;
    }

    let Some(first_title) = lines.iter().position(|l| patterns.title.is_match(l)) else {
        return TocOutcome::Skipped;
    };
    let mut insert_at = first_title + 1;
    while insert_at < lines.len() && lines[insert_at].trim().is_empty() {
        insert_at += 1;
    }

    let mut block: Vec<String> = Vec::new();
    if insert_at == first_title + 1 {
        block.push(String::new());
    }
    block.push(TOC_TITLE.to_string());
    block.push(String::new());
    for (level, title) in &sections {
        let indent = "  ".repeat(level - 2);
        block.push(format!("{}- [{}](#{})", indent, title, patterns.anchor(title)));
    }
    block.push(String::new());

    let mut out: Vec<&str> = Vec::with_capacity(lines.len() + block.len());
    out.extend_from_slice(&lines[..insert_at]);
    out.extend(block.iter().map(String::as_str));
    out.extend_from_slice(&lines[insert_at..]);

    TocOutcome::Added {
        content: out.join("\n"),
        sections: sections.len(),
    }
}

// ============================================================================
// Archive stale
// ============================================================================

fn archive_pattern() -> Result<Regex> {
    Ok(Regex::new(
        r"(?im)^([ \t]*[-*+][ \t]+)((?:current|active|ongoing|in progress|todo)\b.*)$",
    )?)
}

fn archive_items(content: &str, item_re: &Regex) -> (String, usize) {
    let count = item_re.find_iter(content).count();
    if count == 0 {
        return (content.to_string(), 0);
    }
    let replaced = item_re.replace_all(content, |caps: &regex::Captures| {
        format!("{}{}{}", &caps[1], ARCHIVED_MARKER, &caps[2])
    });
    (replaced.to_string(), count)
}

// ============================================================================
// Normalize structure
// ============================================================================

struct NormalizePatterns {
    heading_gap: Regex,
    blank_run: Regex,
}

impl NormalizePatterns {
    fn new() -> Result<Self> {
        Ok(Self {
            heading_gap: Regex::new(r"([^\n])\n(#{1,6}[ \t])")?,
            blank_run: Regex::new(r"\n{4,}")?,
        })
    }
}

/// Trailing whitespace stripped, a blank line before every heading, runs of
/// 4+ newlines squeezed to 3, and exactly one final newline.
fn normalize(content: &str, patterns: &NormalizePatterns) -> String {
    let stripped: Vec<&str> = content.split('\n').map(|l| l.trim_end_matches([' ', '\t'])).collect();
    let stripped = stripped.join("\n");

    let spaced = patterns.heading_gap.replace_all(&stripped, "$1\n\n$2");
    let squeezed = patterns.blank_run.replace_all(&spaced, "\n\n\n");

    let body = squeezed.trim_end_matches('\n');
    if body.is_empty() {
        return String::new();
    }
    format!("{}\n", body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use tempfile::TempDir;

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 6, 1).unwrap().and_hms_opt(12, 0, 0).unwrap()
    }

    fn options(dry_run: bool, backup: bool) -> RewriteOptions {
        RewriteOptions {
            dry_run,
            backup,
            stale_days: 30,
            similarity_threshold: 0.80,
            primary_document: "MEMORY.md".to_string(),
            now: now(),
        }
    }

    fn write_files(tmp: &TempDir, files: &[(&str, &str)]) -> Vec<PathBuf> {
        files
            .iter()
            .map(|(name, content)| {
                let path = tmp.path().join(name);
                if let Some(parent) = path.parent() {
                    fs::create_dir_all(parent).unwrap();
                }
                fs::write(&path, content).unwrap();
                path
            })
            .collect()
    }

    fn docs(files: &[(&str, &str)]) -> Vec<Document> {
        files.iter().map(|(p, c)| Document::new(*p, *c)).collect()
    }

    fn plan(docs: &[Document]) -> BTreeMap<usize, BTreeSet<usize>> {
        plan_dedup(docs, &DedupPatterns::new().unwrap(), "MEMORY.md", 0.80)
    }

    fn big_doc() -> String {
        let mut content = String::from("# Agent Memory\n\nIntro line.\n");
        let titles = ["Setup & Install", "API Keys", "Deploy Steps", "Known Issues", "Team Notes"];
        for (i, title) in titles.iter().enumerate() {
            let level = if i == 2 { 3 } else { 2 };
            content.push_str(&format!("{} {}\n", "#".repeat(level), title));
            content.push_str(&"- detail line\n".repeat(16));
        }
        content
    }

    #[test]
    fn test_plan_prefers_canonical_document() {
        let docs = docs(&[
            ("ws/memory/2025-01-01.md", "- Use exponential backoff for retries\n"),
            ("ws/MEMORY.md", "# M\n- use   exponential backoff for retries\n"),
        ]);
        let plan = plan(&docs);
        assert_eq!(plan.len(), 1);
        assert_eq!(plan[&0], BTreeSet::from([0]));
    }

    #[test]
    fn test_plan_removes_lexicographically_later_path() {
        let docs = docs(&[
            ("ws/TOOLS.md", "- the build cache lives in target dir\n"),
            ("ws/AGENTS.md", "- the build cache lives in target dir\n"),
        ]);
        let plan = plan(&docs);
        // "ws/TOOLS.md" > "ws/AGENTS.md"
        assert_eq!(plan.keys().copied().collect::<Vec<_>>(), vec![0]);
    }

    #[test]
    fn test_plan_within_document_removes_later_line() {
        let docs = docs(&[("ws/MEMORY.md", "- repeated memory item here\n- other\n- repeated memory item here\n")]);
        let plan = plan(&docs);
        assert_eq!(plan[&0], BTreeSet::from([2]));
    }

    #[test]
    fn test_plan_fuzzy_match() {
        let docs = docs(&[
            ("ws/MEMORY.md", "- always run the migrations before deploying\n"),
            ("ws/memory/a.md", "- always run the migrations before deploying!\n"),
            ("ws/memory/b.md", "- always run the linter on changed files\n"),
        ]);
        let plan = plan(&docs);
        assert_eq!(plan.len(), 1);
        assert!(plan.contains_key(&1));
    }

    #[test]
    fn test_plan_fuzzy_match_evicts_earlier_copy() {
        let docs = docs(&[
            ("ws/TOOLS.md", "- always run the migrations before deploying\n"),
            ("ws/AGENTS.md", "- always run the migrations before deploying!\n"),
            ("ws/memory/a.md", "- always run the migrations before deploying.\n"),
        ]);
        // AGENTS.md sorts first, so it survives both fuzzy matches.
        let plan = plan(&docs);
        assert_eq!(
            plan,
            BTreeMap::from([(0, BTreeSet::from([0])), (2, BTreeSet::from([0]))])
        );
    }

    #[test]
    fn test_plan_skips_short_items() {
        let docs = docs(&[("a.md", "- short item\n"), ("b.md", "- short item\n")]);
        assert!(plan(&docs).is_empty());
    }

    #[test]
    fn test_remove_lines_squeezes_blank_runs() {
        let content = "# T\n\n- dup\n\nnext\n";
        let out = remove_lines(content, &BTreeSet::from([2]), &DedupPatterns::new().unwrap());
        assert_eq!(out, "# T\n\nnext\n");
    }

    #[test]
    fn test_dedup_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        let paths = write_files(
            &tmp,
            &[
                ("MEMORY.md", "# Memory\n\n- use exponential backoff for retries\n- keep secrets in the vault\n"),
                (
                    "memory/2025-05-20.md",
                    "# Day\n\n- use exponential backoff for retries.\n\n- unique note for the day\n",
                ),
            ],
        );

        let mut optimizer = Optimizer::new(paths.clone(), options(false, false));
        assert_eq!(optimizer.dedup().unwrap(), 1);
        let day = fs::read_to_string(&paths[1]).unwrap();
        assert_eq!(day, "# Day\n\n- unique note for the day\n");
        assert!(optimizer.report().bytes_saved > 0);

        let mut again = Optimizer::new(paths.clone(), options(false, false));
        assert_eq!(again.dedup().unwrap(), 0);
        assert_eq!(again.report().files_modified, 0);
        assert_eq!(fs::read_to_string(&paths[1]).unwrap(), day);
    }

    #[test]
    fn test_dry_run_leaves_files_alone() {
        let tmp = TempDir::new().unwrap();
        let original = "# Memory\n- repeated memory item here\n- other\n- repeated memory item here\n";
        let paths = write_files(&tmp, &[("MEMORY.md", original)]);

        let mut optimizer = Optimizer::new(paths.clone(), options(true, true));
        assert_eq!(optimizer.dedup().unwrap(), 1);
        let report = optimizer.into_report();

        assert_eq!(fs::read_to_string(&paths[0]).unwrap(), original);
        assert!(!backup_path(&paths[0]).exists());
        assert_eq!(report.files_modified, 1);
        assert_eq!(report.bytes_saved, "- repeated memory item here\n".len() as i64);
        assert!(report.records[0].dry_run);
        assert!(report.changes.iter().any(|c| c.starts_with("[DRY RUN] Would modify:")));
    }

    #[test]
    fn test_backup_before_write() {
        let tmp = TempDir::new().unwrap();
        let original = "# Notes   \nbody\n\n\n\n\nend";
        let paths = write_files(&tmp, &[("MEMORY.md", original)]);

        let mut optimizer = Optimizer::new(paths.clone(), options(false, true));
        assert_eq!(optimizer.normalize_structure().unwrap(), 1);

        assert_eq!(fs::read_to_string(backup_path(&paths[0])).unwrap(), original);
        assert_eq!(fs::read_to_string(&paths[0]).unwrap(), "# Notes\nbody\n\n\nend\n");
        assert!(optimizer
            .report()
            .changes
            .iter()
            .any(|c| c.starts_with("Created backup:")));
    }

    #[test]
    fn test_toc_inserted_after_title() {
        let patterns = TocPatterns::new().unwrap();
        let content = big_doc();
        assert!(content.split('\n').count() >= 80);

        let TocOutcome::Added { content: out, sections } = build_toc(&content, &patterns) else {
            panic!("expected a TOC");
        };
        assert_eq!(sections, 5);

        let lines: Vec<&str> = out.split('\n').collect();
        assert_eq!(
            &lines[..10],
            &[
                "# Agent Memory",
                "",
                "## Table of Contents",
                "",
                "- [Setup & Install](#setup--install)",
                "- [API Keys](#api-keys)",
                "  - [Deploy Steps](#deploy-steps)",
                "- [Known Issues](#known-issues)",
                "- [Team Notes](#team-notes)",
                "",
            ]
        );
        assert_eq!(lines[10], "Intro line.");

        assert_eq!(build_toc(&out, &patterns), TocOutcome::AlreadyIndexed);
    }

    #[test]
    fn test_toc_needs_title_and_sections() {
        let patterns = TocPatterns::new().unwrap();
        let no_title = big_doc().replacen("# Agent Memory", "Agent Memory", 1);
        assert_eq!(build_toc(&no_title, &patterns), TocOutcome::Skipped);

        let short = "# T\n## A\n## B\n## C\n## D\n";
        assert_eq!(build_toc(short, &patterns), TocOutcome::Skipped);
    }

    #[test]
    fn test_reindex_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        let paths = write_files(&tmp, &[("MEMORY.md", &big_doc())]);

        let mut optimizer = Optimizer::new(paths.clone(), options(false, false));
        assert_eq!(optimizer.reindex().unwrap(), 1);
        let once = fs::read_to_string(&paths[0]).unwrap();

        let mut again = Optimizer::new(paths.clone(), options(false, false));
        assert_eq!(again.reindex().unwrap(), 0);
        assert_eq!(fs::read_to_string(&paths[0]).unwrap(), once);
        assert!(again.report().changes[0].contains("TOC already exists"));
    }

    #[test]
    fn test_archive_old_dated_file() {
        let tmp = TempDir::new().unwrap();
        let paths = write_files(
            &tmp,
            &[
                (
                    "memory/2020-01-01-notes.md",
                    "# Notes\n- current: migrate auth service\n  * TODO rotate keys\n- done: ship v1\n- Active work\n",
                ),
                ("memory/2025-05-30.md", "- current: fresh work\n"),
            ],
        );

        let mut optimizer = Optimizer::new(paths.clone(), options(false, false));
        assert_eq!(optimizer.archive_stale().unwrap(), 3);
        assert_eq!(
            fs::read_to_string(&paths[0]).unwrap(),
            "# Notes\n- [ARCHIVED] current: migrate auth service\n  * [ARCHIVED] TODO rotate keys\n- done: ship v1\n- [ARCHIVED] Active work\n"
        );
        assert_eq!(fs::read_to_string(&paths[1]).unwrap(), "- current: fresh work\n");

        let mut again = Optimizer::new(paths, options(false, false));
        assert_eq!(again.archive_stale().unwrap(), 0);
    }

    #[test]
    fn test_normalize() {
        let patterns = NormalizePatterns::new().unwrap();
        let content = "# Title  \ntext\t\n## Section\n\n\n\n\n\nmore\n   \n### Deep\nend\n\n\n";
        let out = normalize(content, &patterns);
        assert_eq!(out, "# Title\ntext\n\n## Section\n\n\nmore\n\n### Deep\nend\n");
        assert_eq!(normalize(&out, &patterns), out);
    }

    #[test]
    fn test_normalize_adds_final_newline() {
        let patterns = NormalizePatterns::new().unwrap();
        assert_eq!(normalize("text", &patterns), "text\n");
        assert_eq!(normalize("", &patterns), "");
    }

    #[test]
    fn test_run_records_write_failure() {
        let tmp = TempDir::new().unwrap();
        let paths = write_files(&tmp, &[("MEMORY.md", "# Notes   \nbody\n")]);
        // A directory in the backup's place makes the backup copy fail.
        fs::create_dir(backup_path(&paths[0])).unwrap();

        let mut optimizer = Optimizer::new(paths.clone(), options(false, true));
        assert!(optimizer.run(Operation::Structure).is_err());
        assert_eq!(optimizer.report().failures.len(), 1);
        assert!(optimizer.report().failures[0].starts_with("structure:"));
        assert_eq!(fs::read_to_string(&paths[0]).unwrap(), "# Notes   \nbody\n");
    }

    #[test]
    fn test_unreadable_candidate_is_skipped() {
        let tmp = TempDir::new().unwrap();
        let unreadable = tmp.path().join("TOOLS.md");
        fs::create_dir(&unreadable).unwrap();
        let paths = write_files(
            &tmp,
            &[
                ("MEMORY.md", "# Notes   \nbody\n"),
                (
                    "memory/2025-05-20.md",
                    "# Day\n\n- keep the staging database small\n- keep the staging database small\n",
                ),
            ],
        );
        let candidates = vec![unreadable, paths[0].clone(), paths[1].clone()];

        let mut optimizer = Optimizer::new(candidates, options(false, false));
        assert_eq!(optimizer.run(Operation::Dedup).unwrap(), 1);
        assert_eq!(optimizer.run(Operation::Structure).unwrap(), 1);

        assert_eq!(fs::read_to_string(&paths[0]).unwrap(), "# Notes\nbody\n");
        assert_eq!(
            fs::read_to_string(&paths[1]).unwrap(),
            "# Day\n\n- keep the staging database small\n"
        );
        let report = optimizer.into_report();
        assert!(report.failures.is_empty());
        assert_eq!(report.warnings.len(), 1);
        assert!(report.warnings[0].contains("TOOLS.md"));
    }
}
