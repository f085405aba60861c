//! EDL auto-skip scheduling
//!
//! Each control cycle the displayed time is checked against the EDL. Cuts
//! are jumped over in the play direction; commercial breaks are skipped once
//! each when playing forward. Markers remember the last skip so a region is
//! never skipped twice in a row.

use super::edl::{EditAction, EditDecisionList};
use super::seek::SeekRequest;
use tracing::info;

#[derive(Debug, Clone, Default)]
pub struct AutoSkipScheduler {
    /// Target of the last cut skip
    cut_marker: Option<i64>,
    commbreak_start: Option<i64>,
    commbreak_end: Option<i64>,
}

impl AutoSkipScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// User seeks make previously skipped cuts eligible again
    pub fn reset_cut_marker(&mut self) {
        self.cut_marker = None;
    }

    pub fn cut_marker(&self) -> Option<i64> {
        self.cut_marker
    }

    /// Record a break skipped outside the scheduler (playback started past it)
    pub fn mark_commercial_break(&mut self, start_ms: i64, end_ms: i64) {
        self.commbreak_start = Some(start_ms);
        self.commbreak_end = Some(end_ms);
    }

    pub fn last_commercial_break(&self) -> Option<(i64, i64)> {
        self.commbreak_start.zip(self.commbreak_end)
    }

    /// Seek needed at displayed time `time_ms`, if any
    pub fn check(&mut self, edl: &EditDecisionList, time_ms: i64, speed: i32) -> Option<SeekRequest> {
        let edit = *edl.edit_at(time_ms)?;
        match edit.action {
            EditAction::Cut => {
                // a cut already skipped in either direction stays skipped
                if self.cut_marker == Some(edit.end_ms) || self.cut_marker == Some(edit.start_ms) {
                    return None;
                }
                if speed >= 0 {
                    info!("Auto-skipping cut [{}, {}) ms forward", edit.start_ms, edit.end_ms);
                    self.cut_marker = Some(edit.end_ms);
                    Some(SeekRequest::to(edit.end_ms).without_restore())
                } else {
                    info!("Auto-skipping cut [{}, {}) ms backward", edit.start_ms, edit.end_ms);
                    self.cut_marker = Some(edit.start_ms);
                    Some(SeekRequest::to(edit.start_ms).without_restore().backward(true))
                }
            }
            EditAction::CommercialBreak if speed >= 0 => {
                if self.commbreak_end.map_or(false, |end| edit.start_ms <= end) {
                    return None;
                }
                info!("Skipping commercial break [{}, {}) ms", edit.start_ms, edit.end_ms);
                self.commbreak_start = Some(edit.start_ms);
                self.commbreak_end = Some(edit.end_ms);
                Some(SeekRequest::to(edit.end_ms + 1).without_restore())
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::playback::edl::EditDecision;

    fn edl(edits: Vec<EditDecision>) -> EditDecisionList {
        EditDecisionList::new(edits).unwrap()
    }

    #[test]
    fn test_cut_skipped_exactly_once() {
        let edl = edl(vec![EditDecision::new(1000, 2000, EditAction::Cut)]);
        let mut scheduler = AutoSkipScheduler::new();

        assert_eq!(scheduler.check(&edl, 950, 1000), None);
        let seek = scheduler.check(&edl, 1050, 1000).unwrap();
        assert_eq!(seek.time_ms, 2000);
        assert!(seek.accurate);
        assert!(!seek.backward);
        assert_eq!(scheduler.cut_marker(), Some(2000));

        // still inside the cut while the seek is in flight
        assert_eq!(scheduler.check(&edl, 1090, 1000), None);
        assert_eq!(scheduler.check(&edl, 2000, 1000), None);
    }

    #[test]
    fn test_rewinding_into_cut_seeks_to_start() {
        let edl = edl(vec![EditDecision::new(1000, 2000, EditAction::Cut)]);
        let mut scheduler = AutoSkipScheduler::new();
        let seek = scheduler.check(&edl, 1900, -2000).unwrap();
        assert_eq!(seek.time_ms, 1000);
        assert!(seek.backward);
        assert_eq!(scheduler.check(&edl, 1800, -2000), None);
    }

    #[test]
    fn test_reversing_inside_skipped_cut_does_not_seek_back() {
        let edl = edl(vec![EditDecision::new(1000, 2000, EditAction::Cut)]);
        let mut scheduler = AutoSkipScheduler::new();
        assert_eq!(scheduler.check(&edl, 1050, 1000).map(|s| s.time_ms), Some(2000));

        // rewinding before the forward seek landed
        assert_eq!(scheduler.check(&edl, 1040, -2000), None);
        assert_eq!(scheduler.cut_marker(), Some(2000));

        let mut rewound = AutoSkipScheduler::new();
        assert_eq!(rewound.check(&edl, 1900, -2000).map(|s| s.time_ms), Some(1000));
        assert_eq!(rewound.check(&edl, 1950, 1000), None);
    }

    #[test]
    fn test_user_seek_rearms_cut() {
        let edl = edl(vec![EditDecision::new(1000, 2000, EditAction::Cut)]);
        let mut scheduler = AutoSkipScheduler::new();
        assert!(scheduler.check(&edl, 1050, 1000).is_some());
        scheduler.reset_cut_marker();
        assert!(scheduler.check(&edl, 1050, 1000).is_some());
    }

    #[test]
    fn test_commercial_break_skipped_once_forward_only() {
        let edl = edl(vec![
            EditDecision::new(5000, 8000, EditAction::CommercialBreak),
            EditDecision::new(20_000, 22_000, EditAction::CommercialBreak),
        ]);
        let mut scheduler = AutoSkipScheduler::new();
        assert_eq!(scheduler.check(&edl, 6000, -1000), None);

        let seek = scheduler.check(&edl, 5001, 1000).unwrap();
        assert_eq!(seek.time_ms, 8001);
        assert_eq!(scheduler.last_commercial_break(), Some((5000, 8000)));

        // user seeks back into the same break: watch it
        assert_eq!(scheduler.check(&edl, 6000, 1000), None);

        assert_eq!(scheduler.check(&edl, 20_500, 1000).map(|s| s.time_ms), Some(22_001));
    }

    #[test]
    fn test_mute_regions_never_seek() {
        let edl = edl(vec![EditDecision::new(0, 5000, EditAction::Mute)]);
        let mut scheduler = AutoSkipScheduler::new();
        assert_eq!(scheduler.check(&edl, 100, 1000), None);
    }
}
