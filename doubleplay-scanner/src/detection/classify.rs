//! Double play classification
//!
//! Decided from the first two occurrences of a group:
//! - durations known for every play: first play under 30s is a mistake,
//!   otherwise a length difference above 10% marks a partial play
//! - durations missing: fall back to the gap between the first two starts

use doubleplay_common::{Classification, DoublePlayOccurrence};

/// A first play shorter than this was aborted by accident
pub const MISTAKE_THRESHOLD_SECS: i64 = 30;

/// Without durations, gaps below this count as partial plays
pub const PARTIAL_GAP_SECS: i64 = 60;

/// Relative length difference (percent) above which a repeat is partial
pub const PARTIAL_DIFFERENCE_PERCENT: f64 = 10.0;

/// Classify a group's occurrences (chronological order)
pub fn classify(occurrences: &[DoublePlayOccurrence]) -> Classification {
    if occurrences.len() < 2 {
        return Classification::Legitimate;
    }

    let durations: Option<Vec<i64>> = occurrences.iter().map(|o| o.duration).collect();

    match durations {
        Some(durations) => classify_by_duration(durations[0], durations[1]),
        None => {
            let gap = (occurrences[1].timestamp - occurrences[0].timestamp).num_seconds();
            classify_by_gap(gap)
        }
    }
}

fn classify_by_duration(first: i64, second: i64) -> Classification {
    if first < MISTAKE_THRESHOLD_SECS {
        return Classification::Mistake;
    }

    let longest = first.max(second);
    let shortest = first.min(second);
    let difference_percent = (longest - shortest) as f64 / longest as f64 * 100.0;

    if difference_percent > PARTIAL_DIFFERENCE_PERCENT {
        Classification::Partial
    } else {
        Classification::Legitimate
    }
}

fn classify_by_gap(gap_secs: i64) -> Classification {
    if gap_secs < MISTAKE_THRESHOLD_SECS {
        Classification::Mistake
    } else if gap_secs < PARTIAL_GAP_SECS {
        Classification::Partial
    } else {
        Classification::Legitimate
    }
}
