use crate::discovery::Document;
use crate::error::Result;
use crate::extract::Entry;
use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use regex::Regex;
use serde::Serialize;
use std::path::PathBuf;

/// Tried in order; the first successful parse wins.
const DATE_FORMATS: [&str; 4] = ["%Y-%m-%d", "%m/%d/%Y", "%B %d, %Y", "%B %d %Y"];

/// `%B` in chrono also takes "Jan"; only full month names count as dates.
const MONTH_NAMES: [&str; 12] = [
    "january",
    "february",
    "march",
    "april",
    "may",
    "june",
    "july",
    "august",
    "september",
    "october",
    "november",
    "december",
];

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StaleScope {
    Entry,
    File,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct StaleFinding {
    pub scope: StaleScope,
    pub document: PathBuf,
    /// 0 for file-level findings.
    pub line: usize,
    pub text: String,
    pub date_found: String,
    pub age_days: i64,
}

/// Dates and live-status words used by both the detector and the optimizer.
pub struct StalePatterns {
    pub dates: Vec<Regex>,
    pub file_date: Regex,
    pub live_status: Regex,
}

impl StalePatterns {
    pub fn new() -> Result<Self> {
        Ok(Self {
            dates: vec![
                Regex::new(r"(\d{4}-\d{2}-\d{2})")?,
                Regex::new(r"(\d{1,2}/\d{1,2}/\d{4})")?,
                Regex::new(r"(\w+ \d{1,2},?\s*\d{4})")?,
            ],
            file_date: Regex::new(r"^(\d{4}-\d{2}-\d{2})")?,
            live_status: Regex::new(r"(?i)\b(current|active|ongoing|in progress|todo)\b")?,
        })
    }

    /// Date prefix of a file name such as `2025-01-15-standup.md`.
    pub fn file_date(&self, file_name: &str) -> Option<NaiveDate> {
        let caps = self.file_date.captures(file_name)?;
        NaiveDate::parse_from_str(caps.get(1)?.as_str(), "%Y-%m-%d").ok()
    }
}

/// `now` minus the staleness window.
pub fn cutoff(now: NaiveDateTime, stale_days: u32) -> NaiveDateTime {
    now - Duration::days(i64::from(stale_days))
}

pub fn midnight(date: NaiveDate) -> NaiveDateTime {
    date.and_time(NaiveTime::MIN)
}

/// Parse free-text date; malformed text yields `None`.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let cleaned = raw.trim().trim_end_matches(',');
    DATE_FORMATS
        .iter()
        .filter(|fmt| !fmt.starts_with("%B") || starts_with_full_month(cleaned))
        .find_map(|fmt| NaiveDate::parse_from_str(cleaned, fmt).ok())
}

fn starts_with_full_month(text: &str) -> bool {
    let word = text.split_whitespace().next().unwrap_or_default();
    MONTH_NAMES.iter().any(|m| m.eq_ignore_ascii_case(word))
}

/// Entries that mention dates older than the cutoff, plus old dated files
/// that still claim something is current or in progress.
pub fn find_stale(
    entries: &[Entry],
    documents: &[Document],
    now: NaiveDateTime,
    stale_days: u32,
) -> Result<Vec<StaleFinding>> {
    let patterns = StalePatterns::new()?;
    let cutoff = cutoff(now, stale_days);
    let mut stale = Vec::new();

    for entry in entries {
        for pattern in &patterns.dates {
            for m in pattern.find_iter(&entry.text) {
                let Some(date) = parse_date(m.as_str()) else {
                    continue;
                };
                let dated = midnight(date);
                if dated < cutoff {
                    stale.push(StaleFinding {
                        scope: StaleScope::Entry,
                        document: entry.document.clone(),
                        line: entry.line,
                        text: entry.text.clone(),
                        date_found: m.as_str().to_string(),
                        age_days: (now - dated).num_days(),
                    });
                }
            }
        }
    }

    for doc in documents {
        let name = doc.file_name();
        let Some(date) = patterns.file_date(&name) else {
            continue;
        };
        let dated = midnight(date);
        if dated >= cutoff || !patterns.live_status.is_match(&doc.content) {
            continue;
        }
        let age_days = (now - dated).num_days();
        stale.push(StaleFinding {
            scope: StaleScope::File,
            document: doc.path.clone(),
            line: 0,
            text: format!(
                "File {} contains \"current/active\" references but is {} days old",
                name, age_days
            ),
            date_found: date.format("%Y-%m-%d").to_string(),
            age_days,
        });
    }

    tracing::debug!(found = stale.len(), %cutoff, "staleness detection");
    Ok(stale)
}
