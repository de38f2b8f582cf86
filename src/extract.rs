use crate::discovery::Document;
use crate::error::Result;
use regex::Regex;
use serde::Serialize;
use std::path::PathBuf;

const MIN_LIST_ITEM_CHARS: usize = 10;
const MIN_PARAGRAPH_CHARS: usize = 20;

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct Heading {
    pub document: PathBuf,
    pub line: usize,
    pub level: usize,
    pub title: String,
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    ListItem,
    Paragraph,
}

/// One extracted line of content. `line` is 1-indexed.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct Entry {
    pub text: String,
    pub document: PathBuf,
    pub line: usize,
    pub heading: String,
    pub kind: EntryKind,
}

#[derive(Debug, Default)]
pub struct Extraction {
    pub entries: Vec<Entry>,
    /// Corpus-wide, in document order.
    pub headings: Vec<Heading>,
}

impl Extraction {
    pub fn headings_for<'a>(&'a self, doc: &'a Document) -> impl Iterator<Item = &'a Heading> + 'a {
        self.headings.iter().filter(move |h| h.document == doc.path)
    }
}

pub struct LinePatterns {
    pub heading: Regex,
    pub list_item: Regex,
}

impl LinePatterns {
    pub fn new() -> Result<Self> {
        Ok(Self {
            heading: Regex::new(r"^(#{1,6})\s+(.+)")?,
            list_item: Regex::new(r"^\s*[-*+]\s+(.+)")?,
        })
    }
}

/// Turn every document into entries and headings, in corpus order.
pub fn extract(documents: &[Document]) -> Result<Extraction> {
    let patterns = LinePatterns::new()?;
    let mut extraction = Extraction::default();

    for doc in documents {
        extract_document(doc, &patterns, &mut extraction);
    }

    tracing::debug!(
        entries = extraction.entries.len(),
        headings = extraction.headings.len(),
        "extracted entries"
    );
    Ok(extraction)
}

fn extract_document(doc: &Document, patterns: &LinePatterns, out: &mut Extraction) {
    // Most recent heading title, not a stack.
    let mut current_heading = String::new();

    for (i, line) in doc.content.split('\n').enumerate() {
        let line_no = i + 1;

        if let Some(caps) = patterns.heading.captures(line) {
            let title = caps.get(2).map(|m| m.as_str().trim().to_string()).unwrap_or_default();
            out.headings.push(Heading {
                document: doc.path.clone(),
                line: line_no,
                level: caps.get(1).map(|m| m.as_str().len()).unwrap_or(1),
                title: title.clone(),
            });
            current_heading = title;
            continue;
        }

        if let Some(caps) = patterns.list_item.captures(line) {
            let text = caps.get(1).map(|m| m.as_str().trim()).unwrap_or_default();
            if text.chars().count() > MIN_LIST_ITEM_CHARS {
                out.entries.push(Entry {
                    text: text.to_string(),
                    document: doc.path.clone(),
                    line: line_no,
                    heading: current_heading.clone(),
                    kind: EntryKind::ListItem,
                });
            }
            continue;
        }

        let trimmed = line.trim();
        if trimmed.is_empty() || is_block_marker(trimmed) {
            continue;
        }
        if trimmed.chars().count() > MIN_PARAGRAPH_CHARS {
            out.entries.push(Entry {
                text: trimmed.to_string(),
                document: doc.path.clone(),
                line: line_no,
                heading: current_heading.clone(),
                kind: EntryKind::Paragraph,
            });
        }
    }
}

/// Table rows, code fences and rules are never paragraph content.
fn is_block_marker(trimmed: &str) -> bool {
    ["```", "|", "---", "==="].iter().any(|m| trimmed.starts_with(m))
}
