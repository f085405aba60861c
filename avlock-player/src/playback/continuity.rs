//! Continuity and clock-offset correction
//!
//! Detects timestamp jumps in the audio and video streams and folds them into
//! a running offset so the timeline seen by the pipelines stays continuous.
//! A jump is only committed once the counterpart stream corroborates it;
//! until then the offending packet's timestamps are made unknown.

use super::cursor::{AvSyncState, CurrentStream};
use crate::collaborators::DemuxPacket;
use crate::config::SyncTuning;
use avlock_common::timing::{Timestamp, PLAYSPEED_PAUSE};
use tracing::debug;

/// Outcome of a continuity check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Continuity {
    /// Not evaluated (rewinding or unknown timestamps)
    Skipped,
    Continuous,
    /// Jump committed; the packet was shifted by this correction
    Corrected(Timestamp),
    /// Jump seen but not corroborated; the packet's timestamps were cleared
    Unconfirmed,
}

/// Running timestamp offset and its jump detector
#[derive(Debug, Clone)]
pub struct ContinuityCorrector {
    offset: Timestamp,
    forward_jump: Timestamp,
    backward_jump: Timestamp,
    corroboration_window: Timestamp,
}

impl ContinuityCorrector {
    pub fn new(tuning: &SyncTuning) -> Self {
        Self::with_thresholds(
            tuning.forward_jump(),
            tuning.backward_jump(),
            tuning.corroboration_window(),
        )
    }

    pub fn with_thresholds(forward_jump: Timestamp, backward_jump: Timestamp, corroboration_window: Timestamp) -> Self {
        Self {
            offset: 0,
            forward_jump,
            backward_jump,
            corroboration_window,
        }
    }

    /// Accumulated correction subtracted from every packet
    pub fn offset(&self) -> Timestamp {
        self.offset
    }

    pub fn reset(&mut self) {
        self.offset = 0;
    }

    /// Shift a freshly read packet onto the corrected timeline
    pub fn apply_offset(&self, packet: &mut DemuxPacket) {
        if self.offset != 0 {
            packet.apply_correction(self.offset);
        }
    }

    /// Check `packet` (already offset) against `cursor` and its counterpart
    ///
    /// Must run before the cursor records the packet's timestamps.
    pub fn check(
        &mut self,
        cursor: &mut CurrentStream,
        other: &CurrentStream,
        packet: &mut DemuxPacket,
        play_speed: i32,
    ) -> Continuity {
        if play_speed < PLAYSPEED_PAUSE {
            return Continuity::Skipped;
        }
        let (Some(packet_dts), Some(cursor_dts)) = (packet.dts, cursor.dts) else {
            return Continuity::Skipped;
        };

        let bounds = [cursor.dts, other.dts, cursor.dts_end(), other.dts_end()];
        let Some(max_dts) = bounds.iter().flatten().copied().max() else {
            return Continuity::Skipped;
        };
        let dts_end = cursor.dts_end().unwrap_or(cursor_dts);

        let mut correction = 0;
        if packet_dts > max_dts + self.forward_jump {
            debug!(
                "{} stream jumped forward: prev {}us, curr {}us, max {}us",
                cursor.stream_type, cursor_dts, packet_dts, max_dts
            );
            correction = packet_dts - max_dts;
        }

        if packet_dts + self.backward_jump < dts_end {
            debug!(
                "{} stream jumped backward: prev {}us, curr {}us, diff {}us",
                cursor.stream_type,
                cursor_dts,
                packet_dts,
                packet_dts - cursor_dts
            );
            correction = packet_dts - dts_end;
        } else if packet_dts < cursor_dts {
            debug!(
                "{} stream wrapped back: prev {}us, curr {}us",
                cursor.stream_type, cursor_dts, packet_dts
            );
        }

        let mut last_dts = packet_dts;
        let result = if correction != 0 {
            let corroborated = !other.is_active()
                || cursor.last_dts.is_none()
                || other
                    .last_dts
                    .map_or(false, |that| (packet_dts - that).abs() < self.corroboration_window);

            if corroborated {
                self.offset += correction;
                packet.apply_correction(correction);
                last_dts = packet.dts.unwrap_or(packet_dts);
                debug!("Committed timestamp correction {}us (offset {}us)", correction, self.offset);
                if cursor.avsync == AvSyncState::Check {
                    cursor.avsync = AvSyncState::Cont;
                }
                Continuity::Corrected(correction)
            } else {
                // wait for the other stream to confirm the jump
                packet.dts = None;
                packet.pts = None;
                Continuity::Unconfirmed
            }
        } else {
            if cursor.avsync == AvSyncState::Check {
                cursor.avsync = AvSyncState::Cont;
            }
            Continuity::Continuous
        };

        cursor.last_dts = Some(last_dts);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use avlock_common::timing::{msec_to_time, PLAYSPEED_NORMAL};
    use avlock_common::StreamType;
    use crate::playback::cursor::Cursors;

    const MS: Timestamp = 1000;

    fn corrector() -> ContinuityCorrector {
        ContinuityCorrector::new(&SyncTuning::default())
    }

    fn av_cursors() -> Cursors {
        let mut cursors = Cursors::new(msec_to_time(40));
        cursors.get_mut(StreamType::Video).id = 0;
        cursors.get_mut(StreamType::Audio).id = 1;
        cursors
    }

    /// Run one packet through offset, check and timestamp update
    fn feed(
        corrector: &mut ContinuityCorrector,
        cursors: &mut Cursors,
        stream_type: StreamType,
        mut packet: DemuxPacket,
    ) -> (DemuxPacket, Continuity) {
        corrector.apply_offset(&mut packet);
        let (cursor, other) = cursors.av_pair_mut(stream_type).unwrap();
        let result = corrector.check(cursor, other, &mut packet, PLAYSPEED_NORMAL);
        cursors.get_mut(stream_type).update_timestamps(&packet, 200 * MS);
        (packet, result)
    }

    fn run(inputs: &[(StreamType, DemuxPacket)]) -> Vec<DemuxPacket> {
        let mut corrector = corrector();
        let mut cursors = av_cursors();
        inputs
            .iter()
            .map(|(t, p)| feed(&mut corrector, &mut cursors, *t, p.clone()).0)
            .collect()
    }

    fn interleaved(count: i64, jump_at: i64, jump: Timestamp) -> Vec<(StreamType, DemuxPacket)> {
        let mut packets = Vec::new();
        for i in 0..count {
            let ts = i * 40 * MS + if i >= jump_at { jump } else { 0 };
            packets.push((StreamType::Video, DemuxPacket::new(0, Some(ts), Some(ts))));
            packets.push((StreamType::Audio, DemuxPacket::new(1, Some(ts), Some(ts))));
        }
        packets
    }

    #[test]
    fn test_uncorroborated_audio_jump_becomes_unknown() {
        let mut corrector = corrector();
        let mut cursors = av_cursors();
        for ts in [0, 40, 80, 120, 160] {
            feed(&mut corrector, &mut cursors, StreamType::Video, DemuxPacket::new(0, Some(ts * MS), None));
        }

        let mut results = Vec::new();
        for ts in [0, 40, 80, 5000] {
            results.push(feed(&mut corrector, &mut cursors, StreamType::Audio, DemuxPacket::new(1, Some(ts * MS), Some(ts * MS))));
        }

        let (last, verdict) = &results[3];
        assert_eq!(*verdict, Continuity::Unconfirmed);
        assert_eq!(last.dts, None);
        assert_eq!(last.pts, None);
        assert_eq!(corrector.offset(), 0);
        assert_eq!(results[2].1, Continuity::Continuous);
    }

    #[test]
    fn test_jump_committed_once_both_streams_agree() {
        let inputs = interleaved(10, 5, 10_000 * MS);
        let mut corrector = corrector();
        let mut cursors = av_cursors();
        let mut verdicts = Vec::new();
        for (t, p) in inputs {
            verdicts.push(feed(&mut corrector, &mut cursors, t, p));
        }

        // video sees the jump first and cannot confirm it
        assert_eq!(verdicts[10].1, Continuity::Unconfirmed);
        // audio jumps too and matches video's last dts
        assert_eq!(verdicts[11].1, Continuity::Corrected(10_000 * MS));
        assert_eq!(verdicts[11].0.dts, Some(200 * MS));
        assert_eq!(corrector.offset(), 10_000 * MS);
        // later packets arrive already shifted
        assert_eq!(verdicts[12].0.dts, Some(240 * MS));
        assert_eq!(verdicts[12].1, Continuity::Continuous);
    }

    #[test]
    fn test_backward_jump_without_counterpart_commits() {
        let mut corrector = corrector();
        let mut cursors = Cursors::new(msec_to_time(40));
        cursors.get_mut(StreamType::Audio).id = 1;
        for ts in [10_000, 10_040] {
            feed(&mut corrector, &mut cursors, StreamType::Audio, DemuxPacket::new(1, Some(ts * MS), None));
        }
        let (packet, verdict) = feed(&mut corrector, &mut cursors, StreamType::Audio, DemuxPacket::new(1, Some(2_000 * MS), None));
        assert_eq!(verdict, Continuity::Corrected(2_000 * MS - 10_080 * MS));
        assert_eq!(packet.dts, Some(10_080 * MS));
    }

    #[test]
    fn test_offset_accumulates_per_jump_corrections() {
        let mut corrector = corrector();
        let mut cursors = Cursors::new(msec_to_time(40));
        cursors.get_mut(StreamType::Audio).id = 1;
        let mut corrections = Vec::new();
        for ts in [10_000, 10_040, 2_000, 2_040, 500] {
            let (packet, verdict) = feed(&mut corrector, &mut cursors, StreamType::Audio, DemuxPacket::new(1, Some(ts * MS), None));
            if let Continuity::Corrected(correction) = verdict {
                corrections.push(correction);
            }
            assert!(packet.dts.is_some());
        }

        assert_eq!(corrections.len(), 2);
        assert_eq!(corrector.offset(), corrections.iter().sum::<Timestamp>());
        assert_eq!(cursors.audio().dts, Some(10_160 * MS));
    }

    #[test]
    fn test_small_gaps_are_continuous_and_confirm_check() {
        let mut corrector = corrector();
        let mut cursors = av_cursors();
        cursors.get_mut(StreamType::Audio).avsync = AvSyncState::Check;
        feed(&mut corrector, &mut cursors, StreamType::Audio, DemuxPacket::new(1, Some(0), None));
        assert_eq!(cursors.audio().avsync, AvSyncState::Check);
        let (_, verdict) = feed(&mut corrector, &mut cursors, StreamType::Audio, DemuxPacket::new(1, Some(900 * MS), None));
        assert_eq!(verdict, Continuity::Continuous);
        assert_eq!(cursors.audio().avsync, AvSyncState::Cont);
    }

    #[test]
    fn test_rewind_is_not_checked() {
        let mut corrector = corrector();
        let mut cursors = av_cursors();
        cursors.get_mut(StreamType::Audio).dts = Some(10_000 * MS);
        let mut packet = DemuxPacket::new(1, Some(0), None);
        let (cursor, other) = cursors.av_pair_mut(StreamType::Audio).unwrap();
        assert_eq!(corrector.check(cursor, other, &mut packet, -2000), Continuity::Skipped);
        assert_eq!(packet.dts, Some(0));
    }

    #[test]
    fn test_replaying_corrected_output_is_identity() {
        let first = run(&interleaved(12, 5, 10_000 * MS));
        let inputs: Vec<(StreamType, DemuxPacket)> = first
            .iter()
            .map(|p| {
                let t = if p.stream_id == 0 { StreamType::Video } else { StreamType::Audio };
                (t, p.clone())
            })
            .collect();
        assert_eq!(run(&inputs), first);
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn correction_is_idempotent(
                jump_ms in -20_000i64..20_000,
                jump_at in 1i64..10,
                count in 10i64..16,
            ) {
                let first = run(&interleaved(count, jump_at, jump_ms * MS));
                let replay: Vec<(StreamType, DemuxPacket)> = first
                    .iter()
                    .map(|p| {
                        let t = if p.stream_id == 0 { StreamType::Video } else { StreamType::Audio };
                        (t, p.clone())
                    })
                    .collect();
                prop_assert_eq!(run(&replay), first);
            }
        }
    }
}
