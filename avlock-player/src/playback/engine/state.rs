//! Play-state assembly and publication

use super::core::PlayerEngine;
use crate::collaborators::MenuType;
use crate::playback::cursor::SyncState;
use crate::playback::snapshot::{ChapterInfo, PlayStateSnapshot};
use avlock_common::timing::{msec_to_time, time_to_msec, Timestamp};
use avlock_common::StreamType;

impl PlayerEngine {
    /// dts to publish: the demuxed video, then audio, then the seek targets
    fn published_dts(&self) -> Option<Timestamp> {
        let (audio, video) = (self.cursors.audio(), self.cursors.video());
        video
            .dts
            .or(audio.dts)
            .or(video.startpts)
            .or(audio.startpts)
            .or(self.state_dts)
    }

    /// Position on the media timeline
    ///
    /// Follows the clock once a pipeline presents in sync, the demuxed
    /// timestamps before that.
    pub(super) fn media_time(&self) -> Option<Timestamp> {
        let offset = self.continuity.offset();
        let presenting = [StreamType::Audio, StreamType::Video].into_iter().any(|t| {
            let cursor = self.cursors.get(t);
            cursor.is_active() && cursor.sync_state == SyncState::InSync
        });
        if presenting {
            return Some(self.clock.get_clock() + offset);
        }
        self.published_dts().map(|dts| dts + offset)
    }

    /// Playback time in milliseconds with EDL cuts removed
    pub(super) fn current_time_ms(&self) -> i64 {
        if let Some(display) = self.display_time.as_ref().filter(|d| d.total_time_ms() > 0) {
            return display.time_ms();
        }
        let media_ms = self.media_time().map_or(0, time_to_msec).max(0);
        self.edl.remove_cut_time(media_ms)
    }

    /// Rebuild and publish the snapshot
    ///
    /// Without `force` this happens at most once per publication interval.
    pub(super) fn update_play_state(&mut self, force: bool) {
        let now = self.clock.absolute();
        if !force && now < self.next_publish {
            return;
        }
        self.next_publish = now + msec_to_time(self.config.sync.play_state_interval_ms);

        let snapshot = self.build_snapshot();
        self.published_time_ms = snapshot.time_ms;
        self.shared.publish_snapshot(snapshot);
    }

    fn build_snapshot(&self) -> PlayStateSnapshot {
        let dts = self.published_dts();
        let in_menu = self.in_menu();

        let (chapters, chapter, stream_length_ms) = match self.demuxer.as_ref() {
            Some(demuxer) => {
                let chapters = (1..=demuxer.chapter_count())
                    .map(|index| ChapterInfo {
                        name: demuxer.chapter_name(index),
                        start_ms: demuxer.chapter_pos_ms(index),
                    })
                    .collect();
                let chapter = if in_menu { 0 } else { demuxer.chapter() };
                (chapters, chapter, demuxer.stream_length_ms())
            }
            None => (Vec::new(), 0, 0),
        };

        let display = self.display_time.as_ref().filter(|d| d.total_time_ms() > 0);
        let (time_ms, time_max_ms, disp_time_ms) = match display {
            Some(display) => (display.time_ms(), display.total_time_ms(), Some(display.time_ms())),
            None => (
                self.current_time_ms(),
                self.edl.remove_cut_time(stream_length_ms),
                None,
            ),
        };
        let time_offset = match (display, dts) {
            (Some(_), Some(dts)) => msec_to_time(time_ms) - dts,
            _ => self.continuity.offset(),
        };

        let queue_ms = self.queue_time_ms();
        let runway_ms = self.config.sync.cache_runway_ms.max(1);
        let (cache_delay, cache_level, cache_offset) = match self.caching_metrics() {
            Some(times) => (times.delay.max(0.0), times.level.clamp(0.0, 1.0), times.offset),
            None => {
                let level = (queue_ms as f64 / runway_ms as f64).min(1.0);
                let offset = if time_max_ms > 0 {
                    queue_ms as f64 / time_max_ms as f64
                } else {
                    0.0
                };
                (0.0, level, offset)
            }
        };

        let realtime = self.input.is_realtime();
        PlayStateSnapshot {
            dts,
            time_ms,
            time_min_ms: 0,
            time_max_ms,
            start_time_ms: self.edl.start_time_ms(),
            disp_time_ms,
            time_offset,
            chapters,
            chapter,
            can_pause: self.input.can_pause(),
            can_seek: self.input.can_seek() && time_max_ms > 0,
            can_tempo: self.has_audio && !realtime && !in_menu,
            is_in_menu: in_menu,
            menu_type: self.navigator.as_ref().map_or(MenuType::None, |nav| nav.menu_type()),
            caching: self.caching.state().is_caching(),
            cache_delay,
            cache_level,
            cache_offset,
            cache_time: queue_ms as f64 / 1000.0,
            cache_bytes: self.input.cache_status().map_or(0, |status| status.forward),
            player_state: self
                .navigator
                .as_ref()
                .and_then(|nav| nav.get_state())
                .or_else(|| self.player_state.clone()),
            speed: self.play_speed,
            subtitles_visible: self.subtitles_visible,
            has_video: self.has_video,
            has_audio: self.has_audio,
            timestamp: chrono::Utc::now(),
        }
    }
}
