//! Play, double play and dataset models
//!
//! All timestamps are UTC. Artist/title/album comparisons are case-insensitive
//! and ignore surrounding whitespace.

use crate::{Error, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of item aired by the station
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PlayKind {
    /// A music track
    Track,
    /// Station identification, ad, talk break
    NonMusic,
    /// Anything the upstream reports that we don't recognise
    Other,
}

/// One aired item as reported by the upstream playlist
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayEvent {
    /// Upstream identifier (increases with insertion order, mostly)
    pub id: i64,
    /// When the item started airing
    pub airdate: DateTime<Utc>,
    pub kind: PlayKind,
    #[serde(default)]
    pub artist: String,
    #[serde(default)]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub album: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub show_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_id: Option<i64>,
    /// Host names, filled in by show enrichment
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dj: Option<String>,
    /// Program name, filled in by show enrichment
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub show_name: Option<String>,
}

impl PlayEvent {
    /// Track with both artist and title present
    pub fn is_identifiable_track(&self) -> bool {
        self.kind == PlayKind::Track && !self.artist.trim().is_empty() && !self.title.trim().is_empty()
    }

    /// Same (artist, title, album), ignoring case. A missing album equals an empty one.
    pub fn same_track(&self, other: &PlayEvent) -> bool {
        same_text(&self.artist, &other.artist)
            && same_text(&self.title, &other.title)
            && same_text(
                self.album.as_deref().unwrap_or(""),
                other.album.as_deref().unwrap_or(""),
            )
    }
}

/// Case-insensitive, whitespace-trimmed text equality
pub fn same_text(a: &str, b: &str) -> bool {
    a.trim().to_lowercase() == b.trim().to_lowercase()
}

/// Scan direction of a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanDirection {
    /// Catch up from the dataset end towards now
    Forward,
    /// Walk from the dataset start into history
    Backward,
}

impl fmt::Display for ScanDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScanDirection::Forward => write!(f, "forward"),
            ScanDirection::Backward => write!(f, "backward"),
        }
    }
}

/// Legitimacy of a double play
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Classification {
    /// Deliberate repeat (both plays full length)
    Legitimate,
    /// One of the plays was cut noticeably short
    Partial,
    /// The first play was aborted almost immediately
    Mistake,
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Classification::Legitimate => write!(f, "legitimate"),
            Classification::Partial => write!(f, "partial"),
            Classification::Mistake => write!(f, "mistake"),
        }
    }
}

/// One play inside a double play group
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DoublePlayOccurrence {
    pub timestamp: DateTime<Utc>,
    /// Start of whatever aired next, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_timestamp: Option<DateTime<Utc>>,
    pub play_id: i64,
    /// Whole seconds between `timestamp` and `end_timestamp`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<i64>,
    /// Originating play, kept in memory for enrichment only
    #[serde(skip)]
    pub play: Option<PlayEvent>,
}

impl DoublePlayOccurrence {
    pub fn from_play(play: &PlayEvent) -> Self {
        Self {
            timestamp: play.airdate,
            end_timestamp: None,
            play_id: play.id,
            duration: None,
            play: Some(play.clone()),
        }
    }

    /// Set the end timestamp and derive the rounded duration
    pub fn set_end(&mut self, end: DateTime<Utc>) {
        self.end_timestamp = Some(end);
        let millis = (end - self.timestamp).num_milliseconds();
        self.duration = Some((millis as f64 / 1000.0).round() as i64);
    }
}

impl PartialEq for DoublePlayOccurrence {
    fn eq(&self, other: &Self) -> bool {
        self.timestamp == other.timestamp
            && self.end_timestamp == other.end_timestamp
            && self.play_id == other.play_id
            && self.duration == other.duration
    }
}

/// The same track aired twice (or more) back to back
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DoublePlayGroup {
    pub artist: String,
    pub title: String,
    /// Chronological; always at least two entries
    pub plays: Vec<DoublePlayOccurrence>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dj: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub show: Option<String>,
    pub classification: Classification,
}

impl DoublePlayGroup {
    /// Timestamp of the first occurrence
    pub fn first_timestamp(&self) -> Option<DateTime<Utc>> {
        self.plays.first().map(|p| p.timestamp)
    }

    /// Covered span: first start to last end (or last start when the end is unknown)
    pub fn span(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        let first = self.plays.first()?;
        let last = self.plays.last()?;
        Some((first.timestamp, last.end_timestamp.unwrap_or(last.timestamp)))
    }

    /// Same (artist, title), ignoring case
    pub fn same_track(&self, other: &DoublePlayGroup) -> bool {
        same_text(&self.artist, &other.artist) && same_text(&self.title, &other.title)
    }
}

/// Number of groups per classification
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationCounts {
    pub legitimate: usize,
    pub partial: usize,
    pub mistake: usize,
}

impl ClassificationCounts {
    pub fn total(&self) -> usize {
        self.legitimate + self.partial + self.mistake
    }

    fn add(&mut self, classification: Classification) {
        match classification {
            Classification::Legitimate => self.legitimate += 1,
            Classification::Partial => self.partial += 1,
            Classification::Mistake => self.mistake += 1,
        }
    }
}

/// The persisted historical record: covered span plus every group found in it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetWindow {
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub double_plays: Vec<DoublePlayGroup>,
    pub counts: ClassificationCounts,
}

impl DatasetWindow {
    /// Empty window covering `[start, end]`
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            start_date: start,
            end_date: end,
            double_plays: Vec::new(),
            counts: ClassificationCounts::default(),
        }
    }

    /// Empty window covering the day before `now`
    pub fn empty_default(now: DateTime<Utc>) -> Self {
        Self::new(now - Duration::days(1), now)
    }

    /// Recompute the classification tallies from the groups
    pub fn recount(&mut self) {
        let mut counts = ClassificationCounts::default();
        for group in &self.double_plays {
            counts.add(group.classification);
        }
        self.counts = counts;
    }

    /// Order groups by first occurrence, oldest first
    pub fn sort_groups(&mut self) {
        self.double_plays
            .sort_by_key(|g| g.first_timestamp().unwrap_or(DateTime::<Utc>::MIN_UTC));
    }

    /// Move the end forward; never shrinks the window
    pub fn extend_end(&mut self, end: DateTime<Utc>) {
        if end > self.end_date {
            self.end_date = end;
        }
    }

    /// Move the start back; never shrinks the window
    pub fn extend_start(&mut self, start: DateTime<Utc>) {
        if start < self.start_date {
            self.start_date = start;
        }
    }

    /// Shape checks run before every write
    pub fn validate(&self) -> Result<()> {
        if self.start_date > self.end_date {
            return Err(Error::Validation(format!(
                "window start {} is after end {}",
                self.start_date, self.end_date
            )));
        }

        let mut counts = ClassificationCounts::default();
        for (index, group) in self.double_plays.iter().enumerate() {
            if group.artist.trim().is_empty() || group.title.trim().is_empty() {
                return Err(Error::Validation(format!(
                    "group {} has an empty artist or title",
                    index
                )));
            }
            if group.plays.len() < 2 {
                return Err(Error::Validation(format!(
                    "group {} ({} - {}) has {} plays, expected at least 2",
                    index,
                    group.artist,
                    group.title,
                    group.plays.len()
                )));
            }
            for occurrence in &group.plays {
                if let Some(play) = &occurrence.play {
                    if !same_text(&play.artist, &group.artist)
                        || !same_text(&play.title, &group.title)
                    {
                        return Err(Error::Validation(format!(
                            "play {} in group {} is '{} - {}', not '{} - {}'",
                            occurrence.play_id,
                            index,
                            play.artist,
                            play.title,
                            group.artist,
                            group.title
                        )));
                    }
                }
            }
            counts.add(group.classification);
        }

        if counts != self.counts {
            return Err(Error::Validation(format!(
                "tallies {:?} do not match groups {:?}",
                self.counts, counts
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(minutes: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap() + Duration::minutes(minutes)
    }

    fn track(id: i64, minutes: i64, artist: &str, title: &str) -> PlayEvent {
        PlayEvent {
            id,
            airdate: at(minutes),
            kind: PlayKind::Track,
            artist: artist.to_string(),
            title: title.to_string(),
            album: None,
            show_id: None,
            host_id: None,
            dj: None,
            show_name: None,
        }
    }

    fn group(classification: Classification) -> DoublePlayGroup {
        let a = track(1, 0, "Artist", "Song");
        let b = track(2, 5, "Artist", "Song");
        DoublePlayGroup {
            artist: "Artist".to_string(),
            title: "Song".to_string(),
            plays: vec![
                DoublePlayOccurrence::from_play(&a),
                DoublePlayOccurrence::from_play(&b),
            ],
            dj: None,
            show: None,
            classification,
        }
    }

    #[test]
    fn test_same_track_ignores_case_and_missing_album() {
        let a = track(1, 0, "The Band", "Song");
        let mut b = track(2, 4, "the band ", "SONG");
        assert!(a.same_track(&b));

        b.album = Some(String::new());
        assert!(a.same_track(&b));

        b.album = Some("Live".to_string());
        assert!(!a.same_track(&b));
    }

    #[test]
    fn test_identifiable_track_requires_artist_and_title() {
        let mut play = track(1, 0, "Artist", "Song");
        assert!(play.is_identifiable_track());
        play.title = "  ".to_string();
        assert!(!play.is_identifiable_track());
        play.title = "Song".to_string();
        play.kind = PlayKind::NonMusic;
        assert!(!play.is_identifiable_track());
    }

    #[test]
    fn test_set_end_rounds_to_whole_seconds() {
        let play = track(1, 0, "Artist", "Song");
        let mut occurrence = DoublePlayOccurrence::from_play(&play);
        occurrence.set_end(at(0) + Duration::milliseconds(239_600));
        assert_eq!(occurrence.duration, Some(240));
    }

    #[test]
    fn test_recount_and_validate() {
        let mut window = DatasetWindow::new(at(0), at(60));
        window.double_plays.push(group(Classification::Partial));
        window.double_plays.push(group(Classification::Legitimate));
        assert!(window.validate().is_err(), "stale tallies must fail validation");

        window.recount();
        assert_eq!(window.counts.partial, 1);
        assert_eq!(window.counts.legitimate, 1);
        assert_eq!(window.counts.total(), 2);
        assert!(window.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_inverted_window() {
        let window = DatasetWindow::new(at(10), at(0));
        assert!(matches!(window.validate(), Err(Error::Validation(_))));
    }

    #[test]
    fn test_validate_rejects_single_play_group() {
        let mut window = DatasetWindow::new(at(0), at(60));
        let mut g = group(Classification::Legitimate);
        g.plays.truncate(1);
        window.double_plays.push(g);
        window.recount();
        assert!(window.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_mismatched_play() {
        let mut window = DatasetWindow::new(at(0), at(60));
        let mut g = group(Classification::Legitimate);
        g.plays[1].play = Some(track(2, 5, "Someone Else", "Song"));
        window.double_plays.push(g);
        window.recount();
        assert!(window.validate().is_err());
    }

    #[test]
    fn test_extend_never_shrinks() {
        let mut window = DatasetWindow::new(at(0), at(60));
        window.extend_end(at(30));
        window.extend_start(at(10));
        assert_eq!(window.start_date, at(0));
        assert_eq!(window.end_date, at(60));

        window.extend_end(at(90));
        window.extend_start(at(-30));
        assert_eq!(window.start_date, at(-30));
        assert_eq!(window.end_date, at(90));
    }

    #[test]
    fn test_dataset_json_shape() {
        let mut window = DatasetWindow::new(at(0), at(60));
        window.double_plays.push(group(Classification::Mistake));
        window.recount();

        let json = serde_json::to_value(&window).unwrap();
        assert!(json.get("startDate").is_some());
        assert!(json.get("doublePlays").is_some());
        assert_eq!(json["counts"]["mistake"], 1);
        assert_eq!(json["doublePlays"][0]["classification"], "mistake");
        assert!(json["doublePlays"][0]["plays"][0].get("play").is_none());

        let restored: DatasetWindow = serde_json::from_value(json).unwrap();
        assert_eq!(restored, window);
    }
}
