use crate::discovery::WorkspaceLayout;
use serde::Serialize;

/// Issue counts the score is computed from.
#[derive(Serialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IssueCounts {
    pub duplicates: usize,
    pub stale: usize,
    pub structure: usize,
    pub missing_index: usize,
}

/// Memory efficiency score in `0..=100`. Pure: reads no files.
///
/// Each issue kind deducts a fixed amount per issue up to a cap; an organized
/// memory directory and a primary memory document each add 5.
pub fn calculate_score(counts: &IssueCounts, layout: &WorkspaceLayout) -> u8 {
    let mut score: i64 = 100;

    score -= deduction(counts.duplicates, 3, 30);
    score -= deduction(counts.stale, 2, 20);
    score -= deduction(counts.structure, 3, 15);
    score -= deduction(counts.missing_index, 5, 10);

    if layout.has_memory_dir {
        score += 5;
    }
    if layout.has_primary {
        score += 5;
    }

    score.clamp(0, 100) as u8
}

fn deduction(count: usize, per_issue: i64, cap: i64) -> i64 {
    (count as i64).saturating_mul(per_issue).min(cap)
}

/// Human band for a score.
pub fn score_band(score: u8) -> &'static str {
    match score {
        80..=100 => "good",
        60..=79 => "fair",
        _ => "poor",
    }
}
