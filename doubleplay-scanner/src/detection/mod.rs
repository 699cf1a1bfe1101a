//! Double play detection engine
//!
//! Turns one polling window of aired plays into double play groups:
//!
//! 1. **Order repair**: walk plays by upstream id and drop any play that aired
//!    earlier than one already accepted (upstream clock/id skew)
//! 2. **Chronological pass**: sort the survivors by air time
//! 3. **Grouping**: absorb consecutive plays of the same (artist, title, album),
//!    stepping over non-music interstitials; runs of two or more form a group
//! 4. **End resolution**: each play ends when the next item airs; the window's
//!    very last play may need a short lookahead fetch ([`resolve_boundary`])
//! 5. **Classification**: see [`classify`]
//!
//! Everything here is pure; the scan queue performs the lookahead fetch and
//! show enrichment through the upstream client.

pub mod classify;
pub mod merge;

pub use classify::classify;
pub use merge::{merge_groups, MergeSummary};

use chrono::{DateTime, Utc};
use doubleplay_common::{DoublePlayGroup, DoublePlayOccurrence, PlayEvent, PlayKind};

/// Result of analysing one window
#[derive(Debug, Clone, Default)]
pub struct DetectionOutcome {
    pub groups: Vec<DoublePlayGroup>,
    /// Plays discarded by the order-repair filter, repeated ids included
    pub dropped_out_of_order: usize,
    /// Plays left after filtering
    pub analysed: usize,
    /// Set when the last play of the last group has no successor in the window;
    /// holds the instant the window's upstream data ends
    pub open_boundary: Option<DateTime<Utc>>,
}

/// Detect double plays in one window of plays.
///
/// `window_end` is the instant the fetched data ends; it is only used to tell
/// the caller where a boundary lookahead should start.
pub fn detect(events: &[PlayEvent], window_end: DateTime<Utc>) -> DetectionOutcome {
    let (mut ordered, dropped) = repair_order(events);
    ordered.sort_by_key(|e| e.airdate);

    if dropped > 0 {
        tracing::debug!(dropped, kept = ordered.len(), "Dropped out-of-order plays");
    }

    let mut groups = Vec::new();
    let mut open_boundary = None;
    let mut i = 0;

    while i < ordered.len() {
        let run = collect_run(&ordered, i);
        if run.len() < 2 {
            i += 1;
            continue;
        }

        let plays: Vec<DoublePlayOccurrence> = run
            .iter()
            .map(|&idx| {
                let mut occurrence = DoublePlayOccurrence::from_play(&ordered[idx]);
                if let Some(next) = ordered.get(idx + 1) {
                    occurrence.set_end(next.airdate);
                }
                occurrence
            })
            .collect();

        let last_index = run[run.len() - 1];
        open_boundary = if last_index + 1 == ordered.len() {
            Some(window_end)
        } else {
            None
        };

        groups.push(build_group(&ordered[i], plays));
        i = last_index + 1;
    }

    DetectionOutcome {
        groups,
        dropped_out_of_order: dropped,
        analysed: ordered.len(),
        open_boundary,
    }
}

/// Drop repeated ids and plays that aired before an earlier-id play already accepted
fn repair_order(events: &[PlayEvent]) -> (Vec<PlayEvent>, usize) {
    let mut by_id: Vec<&PlayEvent> = events.iter().collect();
    by_id.sort_by_key(|e| e.id);

    let mut kept: Vec<PlayEvent> = Vec::with_capacity(by_id.len());
    let mut latest: Option<DateTime<Utc>> = None;
    let mut dropped = 0;

    for event in by_id {
        let repeated = kept.last().is_some_and(|prev| prev.id == event.id);
        if repeated || matches!(latest, Some(t) if event.airdate < t) {
            dropped += 1;
            continue;
        }
        latest = Some(event.airdate);
        kept.push(event.clone());
    }

    (kept, dropped)
}

/// Indices of the same-track run starting at `start` (just `start` if none)
fn collect_run(ordered: &[PlayEvent], start: usize) -> Vec<usize> {
    let head = &ordered[start];
    if !head.is_identifiable_track() {
        return Vec::new();
    }

    let mut run = vec![start];
    for (offset, event) in ordered[start + 1..].iter().enumerate() {
        match event.kind {
            PlayKind::NonMusic => continue,
            PlayKind::Track if event.same_track(head) => run.push(start + 1 + offset),
            _ => break,
        }
    }
    run
}

fn build_group(head: &PlayEvent, plays: Vec<DoublePlayOccurrence>) -> DoublePlayGroup {
    let classification = classify(&plays);
    DoublePlayGroup {
        artist: head.artist.trim().to_string(),
        title: head.title.trim().to_string(),
        plays,
        dj: head.dj.clone(),
        show: head.show_name.clone(),
        classification,
    }
}

/// Close the open boundary of the last group with lookahead plays.
///
/// The end becomes the earliest lookahead play airing after the last
/// occurrence started. Returns whether an end was found.
pub fn resolve_boundary(outcome: &mut DetectionOutcome, lookahead: &[PlayEvent]) -> bool {
    if outcome.open_boundary.is_none() {
        return false;
    }
    let Some(group) = outcome.groups.last_mut() else {
        return false;
    };
    let Some(last) = group.plays.last_mut() else {
        return false;
    };

    let next_start = lookahead
        .iter()
        .filter(|e| e.id != last.play_id && e.airdate > last.timestamp)
        .map(|e| e.airdate)
        .min();

    match next_start {
        Some(end) => {
            last.set_end(end);
            group.classification = classify(&group.plays);
            outcome.open_boundary = None;
            true
        }
        None => false,
    }
}

/// Copy DJ/show names from a group's first (enriched) play
pub fn apply_first_play_metadata(group: &mut DoublePlayGroup) {
    let Some(play) = group.plays.first().and_then(|o| o.play.as_ref()) else {
        return;
    };
    if group.dj.is_none() {
        group.dj = play.dj.clone();
    }
    if group.show.is_none() {
        group.show = play.show_name.clone();
    }
}
