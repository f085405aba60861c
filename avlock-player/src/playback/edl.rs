//! Edit decision lists
//!
//! An EDL marks regions of the media timeline to cut, mute or treat as a
//! commercial break. Regions are half-open `[start, end)` in milliseconds of
//! the original (uncut) timeline.
//!
//! Cut regions disappear from the user-visible timeline: [`EditDecisionList::remove_cut_time`]
//! maps a media time onto the cut timeline and
//! [`EditDecisionList::restore_cut_time`] maps it back.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EditAction {
    Cut,
    Mute,
    CommercialBreak,
}

/// One region of the timeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditDecision {
    pub start_ms: i64,
    pub end_ms: i64,
    pub action: EditAction,
}

impl EditDecision {
    pub fn new(start_ms: i64, end_ms: i64, action: EditAction) -> Self {
        Self { start_ms, end_ms, action }
    }

    pub fn contains(&self, time_ms: i64) -> bool {
        self.start_ms <= time_ms && time_ms < self.end_ms
    }

    pub fn duration_ms(&self) -> i64 {
        self.end_ms - self.start_ms
    }
}

/// Validated, start-ordered set of edit decisions
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EditDecisionList {
    edits: Vec<EditDecision>,
}

impl EditDecisionList {
    /// Build a list, rejecting empty, negative or overlapping regions
    pub fn new(mut edits: Vec<EditDecision>) -> Result<Self> {
        edits.sort_by_key(|e| e.start_ms);
        for edit in &edits {
            if edit.start_ms < 0 || edit.end_ms <= edit.start_ms {
                return Err(Error::Edl(format!(
                    "invalid region [{}, {}) ms",
                    edit.start_ms, edit.end_ms
                )));
            }
        }
        for pair in edits.windows(2) {
            if pair[1].start_ms < pair[0].end_ms {
                return Err(Error::Edl(format!(
                    "region [{}, {}) ms overlaps [{}, {}) ms",
                    pair[1].start_ms, pair[1].end_ms, pair[0].start_ms, pair[0].end_ms
                )));
            }
        }
        Ok(Self { edits })
    }

    /// Parse MPlayer-style EDL text
    ///
    /// Each non-empty line is `start end action` where times are seconds
    /// (`12.5`) or `[hh:]mm:ss[.fff]`, and action is 0 (cut), 1 (mute),
    /// 2 (scene marker, ignored) or 3 (commercial break).
    pub fn from_mplayer_str(text: &str) -> Result<Self> {
        let mut edits = Vec::new();
        for (number, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() != 3 {
                return Err(Error::Edl(format!("line {}: expected 3 fields: {}", number + 1, line)));
            }
            let start_ms = parse_time_ms(fields[0])
                .ok_or_else(|| Error::Edl(format!("line {}: bad start time {}", number + 1, fields[0])))?;
            let end_ms = parse_time_ms(fields[1])
                .ok_or_else(|| Error::Edl(format!("line {}: bad end time {}", number + 1, fields[1])))?;
            let action = match fields[2] {
                "0" => EditAction::Cut,
                "1" => EditAction::Mute,
                "2" => {
                    debug!("Skipping EDL scene marker at {} ms", start_ms);
                    continue;
                }
                "3" => EditAction::CommercialBreak,
                other => {
                    return Err(Error::Edl(format!("line {}: unknown action {}", number + 1, other)));
                }
            };
            edits.push(EditDecision::new(start_ms, end_ms, action));
        }
        Self::new(edits)
    }

    /// Load an EDL file from disk
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let edl = Self::from_mplayer_str(&text)?;
        info!(
            "Loaded EDL {}: {} regions ({} ms cut)",
            path.display(),
            edl.edits.len(),
            edl.total_cut_ms()
        );
        Ok(edl)
    }

    pub fn is_empty(&self) -> bool {
        self.edits.is_empty()
    }

    pub fn edits(&self) -> &[EditDecision] {
        &self.edits
    }

    pub fn has_cuts(&self) -> bool {
        self.edits.iter().any(|e| e.action == EditAction::Cut)
    }

    /// Region covering `time_ms`, if any
    pub fn edit_at(&self, time_ms: i64) -> Option<&EditDecision> {
        self.edits.iter().find(|e| e.contains(time_ms))
    }

    pub fn in_cut(&self, time_ms: i64) -> bool {
        self.edit_at(time_ms).map_or(false, |e| e.action == EditAction::Cut)
    }

    pub fn in_mute(&self, time_ms: i64) -> bool {
        self.edit_at(time_ms).map_or(false, |e| e.action == EditAction::Mute)
    }

    pub fn total_cut_ms(&self) -> i64 {
        self.cuts().map(EditDecision::duration_ms).sum()
    }

    /// Map a media time onto the timeline with cuts removed
    pub fn remove_cut_time(&self, time_ms: i64) -> i64 {
        let mut removed = 0;
        for cut in self.cuts().filter(|c| c.start_ms <= time_ms) {
            if cut.contains(time_ms) {
                removed += time_ms - cut.start_ms;
            } else {
                removed += cut.duration_ms();
            }
        }
        time_ms - removed
    }

    /// Map a time on the cut timeline back to media time
    pub fn restore_cut_time(&self, cut_time_ms: i64) -> i64 {
        let mut restored = cut_time_ms;
        for cut in self.cuts() {
            if cut.start_ms <= restored {
                restored += cut.duration_ms();
            }
        }
        restored
    }

    /// Where playback should begin when starting from the top
    ///
    /// A cut or commercial break covering time 0 is skipped.
    pub fn start_time_ms(&self) -> i64 {
        match self.edit_at(0) {
            Some(edit) if matches!(edit.action, EditAction::Cut | EditAction::CommercialBreak) => edit.end_ms,
            _ => 0,
        }
    }

    fn cuts(&self) -> impl Iterator<Item = &EditDecision> {
        self.edits.iter().filter(|e| e.action == EditAction::Cut)
    }
}

/// Parse `12.5`, `mm:ss[.fff]` or `hh:mm:ss[.fff]` into milliseconds
fn parse_time_ms(field: &str) -> Option<i64> {
    let mut seconds = 0.0f64;
    for part in field.split(':') {
        let value: f64 = part.parse().ok()?;
        if !value.is_finite() || value < 0.0 {
            return None;
        }
        seconds = seconds * 60.0 + value;
    }
    Some((seconds * 1000.0).round() as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn cuts(regions: &[(i64, i64)]) -> EditDecisionList {
        EditDecisionList::new(
            regions
                .iter()
                .map(|(s, e)| EditDecision::new(*s, *e, EditAction::Cut))
                .collect(),
        )
        .unwrap()
    }

    #[test]
    fn test_regions_are_half_open() {
        let edl = cuts(&[(1000, 2000)]);
        assert!(!edl.in_cut(999));
        assert!(edl.in_cut(1000));
        assert!(edl.in_cut(1999));
        assert!(!edl.in_cut(2000));
    }

    #[test]
    fn test_remove_and_restore_cut_time() {
        let edl = cuts(&[(1000, 2000), (5000, 5500)]);
        assert_eq!(edl.remove_cut_time(500), 500);
        assert_eq!(edl.remove_cut_time(1500), 1000);
        assert_eq!(edl.remove_cut_time(3000), 2000);
        assert_eq!(edl.remove_cut_time(6000), 4500);

        assert_eq!(edl.restore_cut_time(500), 500);
        assert_eq!(edl.restore_cut_time(2000), 3000);
        assert_eq!(edl.restore_cut_time(4500), 6000);
        assert_eq!(edl.total_cut_ms(), 1500);
    }

    #[test]
    fn test_mute_and_breaks_do_not_shift_timeline() {
        let edl = EditDecisionList::new(vec![
            EditDecision::new(0, 3000, EditAction::CommercialBreak),
            EditDecision::new(4000, 4500, EditAction::Mute),
        ])
        .unwrap();
        assert!(!edl.has_cuts());
        assert!(edl.in_mute(4200));
        assert_eq!(edl.remove_cut_time(4200), 4200);
        assert_eq!(edl.start_time_ms(), 3000);
    }

    #[test]
    fn test_cut_at_zero_moves_start() {
        assert_eq!(cuts(&[(0, 1500)]).start_time_ms(), 1500);
        assert_eq!(cuts(&[(10, 1500)]).start_time_ms(), 0);
    }

    #[test]
    fn test_overlapping_regions_rejected() {
        let result = EditDecisionList::new(vec![
            EditDecision::new(0, 2000, EditAction::Cut),
            EditDecision::new(1500, 2500, EditAction::Mute),
        ]);
        assert!(matches!(result, Err(Error::Edl(_))));
        assert!(EditDecisionList::new(vec![EditDecision::new(10, 10, EditAction::Cut)]).is_err());
    }

    #[test]
    fn test_parse_mplayer_text() {
        let edl = EditDecisionList::from_mplayer_str(
            "1.0 2.0 0\n\n00:10 00:12.5 1\n30 31 2\n0:01:00 0:01:30 3\n",
        )
        .unwrap();
        assert_eq!(
            edl.edits(),
            &[
                EditDecision::new(1000, 2000, EditAction::Cut),
                EditDecision::new(10_000, 12_500, EditAction::Mute),
                EditDecision::new(60_000, 90_000, EditAction::CommercialBreak),
            ]
        );
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(EditDecisionList::from_mplayer_str("1 2").is_err());
        assert!(EditDecisionList::from_mplayer_str("1 x 0").is_err());
        assert!(EditDecisionList::from_mplayer_str("1 2 9").is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "1 2 0").unwrap();
        let edl = EditDecisionList::load(file.path()).unwrap();
        assert!(edl.has_cuts());

        let missing = EditDecisionList::load(Path::new("/nonexistent/movie.edl"));
        assert!(matches!(missing, Err(Error::Io(_))));
    }
}
