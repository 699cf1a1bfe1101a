//! Merging newly detected groups into the dataset
//!
//! An incoming group joins an existing group for the same track when their
//! spans overlap; occurrences are deduplicated by upstream play id so that
//! rescanning a window never duplicates anything.

use super::classify::classify;
use doubleplay_common::{DoublePlayGroup, DoublePlayOccurrence};

/// What a merge did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeSummary {
    /// Groups appended as new
    pub added: usize,
    /// Groups folded into an existing one
    pub merged: usize,
    /// Occurrences that were not already known
    pub new_occurrences: usize,
}

/// Merge `incoming` into `existing` in place
pub fn merge_groups(
    existing: &mut Vec<DoublePlayGroup>,
    incoming: Vec<DoublePlayGroup>,
) -> MergeSummary {
    let mut summary = MergeSummary::default();

    for group in incoming {
        match existing.iter_mut().find(|g| overlaps(g, &group)) {
            Some(target) => {
                summary.merged += 1;
                summary.new_occurrences += absorb(target, group);
            }
            None => {
                summary.added += 1;
                summary.new_occurrences += group.plays.len();
                existing.push(group);
            }
        }
    }

    summary
}

/// Same track and intersecting time spans
fn overlaps(a: &DoublePlayGroup, b: &DoublePlayGroup) -> bool {
    if !a.same_track(b) {
        return false;
    }
    match (a.span(), b.span()) {
        (Some((start_a, end_a)), Some((start_b, end_b))) => start_a <= end_b && end_a >= start_b,
        _ => false,
    }
}

/// Fold `incoming` into `target`; returns the number of occurrences added
fn absorb(target: &mut DoublePlayGroup, incoming: DoublePlayGroup) -> usize {
    let mut added = 0;

    for occurrence in incoming.plays {
        match target
            .plays
            .iter_mut()
            .find(|o| o.play_id == occurrence.play_id)
        {
            Some(known) => backfill_end(known, &occurrence),
            None => {
                target.plays.push(occurrence);
                added += 1;
            }
        }
    }

    target.plays.sort_by_key(|o| o.timestamp);

    if target.dj.is_none() {
        target.dj = incoming.dj;
    }
    if target.show.is_none() {
        target.show = incoming.show;
    }

    target.classification = classify(&target.plays);
    added
}

/// A later scan may know where a play ended when the earlier one did not
fn backfill_end(known: &mut DoublePlayOccurrence, other: &DoublePlayOccurrence) {
    if known.end_timestamp.is_none() {
        if let Some(end) = other.end_timestamp {
            known.set_end(end);
        }
    }
    if known.play.is_none() {
        known.play = other.play.clone();
    }
}
