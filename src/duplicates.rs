use crate::error::Result;
use crate::extract::Entry;
use crate::similarity::similarity;
use ahash::AHashSet;
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeMap;

/// Entries compared against each following entry in the windowed sweep.
const SWEEP_WINDOW: usize = 49;
/// Leading significant tokens forming a bucket key.
const BUCKET_TOKENS: usize = 3;

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct DuplicatePair {
    pub entry1: Entry,
    pub entry2: Entry,
    /// Percentage, rounded to one decimal.
    pub similarity: f64,
}

/// Find near-duplicate entries across the corpus.
///
/// Two bounded passes share one set of already-compared index pairs: entries
/// sharing their first three significant tokens are compared pairwise, then
/// every entry is compared with the next 49 entries in corpus order.
pub fn find_duplicates(entries: &[Entry], threshold: f64) -> Result<Vec<DuplicatePair>> {
    let lowered: Vec<String> = entries.iter().map(|e| e.text.to_lowercase()).collect();
    let mut seen_pairs: AHashSet<(usize, usize)> = AHashSet::new();
    let mut duplicates = Vec::new();
    let mut compared = 0usize;

    // Bucketed pass. BTreeMap keeps report order stable across runs.
    let buckets = bucket_entries(&lowered)?;
    for indices in buckets.values().filter(|v| v.len() > 1) {
        for a in 0..indices.len() {
            for b in (a + 1)..indices.len() {
                let pair = ordered(indices[a], indices[b]);
                if !seen_pairs.insert(pair) {
                    continue;
                }
                compared += 1;
                if let Some(dup) = compare(entries, &lowered, pair, threshold) {
                    duplicates.push(dup);
                }
            }
        }
    }

    // Windowed sweep for near-duplicates whose leading words differ.
    for i in 0..lowered.len() {
        let end = (i + 1 + SWEEP_WINDOW).min(lowered.len());
        for j in (i + 1)..end {
            if seen_pairs.contains(&(i, j)) {
                continue;
            }
            if lengths_too_different(&lowered[i], &lowered[j]) {
                continue;
            }
            compared += 1;
            if let Some(dup) = compare(entries, &lowered, (i, j), threshold) {
                seen_pairs.insert((i, j));
                duplicates.push(dup);
            }
        }
    }

    tracing::debug!(compared, found = duplicates.len(), "duplicate detection");
    Ok(duplicates)
}

/// Key every entry by its first three alphanumeric runs of length >= 3.
fn bucket_entries(lowered: &[String]) -> Result<BTreeMap<String, Vec<usize>>> {
    let token_re = Regex::new(r"\b\w{3,}\b")?;
    let mut buckets: BTreeMap<String, Vec<usize>> = BTreeMap::new();

    for (i, text) in lowered.iter().enumerate() {
        let words: Vec<&str> = token_re.find_iter(text).take(BUCKET_TOKENS).map(|m| m.as_str()).collect();
        if words.is_empty() {
            continue;
        }
        buckets.entry(words.join(" ")).or_default().push(i);
    }

    Ok(buckets)
}

fn compare(entries: &[Entry], lowered: &[String], (i, j): (usize, usize), threshold: f64) -> Option<DuplicatePair> {
    let ratio = similarity(&lowered[i], &lowered[j]);
    if ratio < threshold {
        return None;
    }

    let (e1, e2) = (&entries[i], &entries[j]);
    // A list item and its own continuation line are not duplicates.
    if e1.document == e2.document && e1.line.abs_diff(e2.line) <= 1 {
        return None;
    }

    Some(DuplicatePair {
        entry1: e1.clone(),
        entry2: e2.clone(),
        similarity: (ratio * 1000.0).round() / 10.0,
    })
}

fn lengths_too_different(a: &str, b: &str) -> bool {
    let (la, lb) = (a.chars().count(), b.chars().count());
    la.abs_diff(lb) as f64 > la.max(lb) as f64 * 0.5
}

fn ordered(i: usize, j: usize) -> (usize, usize) {
    (i.min(j), i.max(j))
}
