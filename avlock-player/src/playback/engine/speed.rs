//! Per-cycle playback speed handling
//!
//! **Responsibilities:**
//! - Committing caching transitions and pausing/resuming the clock with them
//! - Resolving the audio/video clock handshake
//! - Stall recovery and live clock nudging once caching is done
//! - Trick-play drift correction and EDL auto-skip

use super::core::PlayerEngine;
use crate::collaborators::PipelineMessage;
use crate::playback::caching::{
    caching_times, queue_time_ms, CachingInputs, CachingMachine, CachingTimes, PipelineView, StallAction,
    StallInputs,
};
use crate::playback::clock_sync::{Handshake, HandshakeSide};
use crate::playback::cursor::{AvSyncState, SyncState};
use crate::playback::messages::ControlMessage;
use crate::playback::seek::SeekRequest;
use crate::playback::trick_play::TrickPlayObservation;
use avlock_common::events::{CachingState, PlayerEvent};
use avlock_common::timing::{is_trick_play, msec_to_time, time_to_msec, PLAYSPEED_NORMAL, PLAYSPEED_PAUSE};
use avlock_common::StreamType;
use tracing::{debug, info};

/// Caching transitions committed in one cycle at most
const MAX_CACHING_STEPS: usize = 4;

impl PlayerEngine {
    /// Request a caching state; FLUSH resolves according to the input metrics
    pub(super) fn set_caching(&mut self, requested: CachingState) {
        let has_metrics = requested == CachingState::Flush && self.caching_metrics().is_some();
        let state = CachingMachine::resolve(requested, has_metrics);
        let Some(from) = self.caching.transition(state) else {
            return;
        };
        info!("Caching {} -> {}", from, state);

        match state {
            CachingState::Full | CachingState::Init => {
                self.clock.pause(true);
                self.set_av_pipeline_speed(PLAYSPEED_PAUSE);
            }
            CachingState::Play => self.resume_playback(),
            CachingState::Done if from != CachingState::Play => self.resume_playback(),
            _ => {}
        }
        self.clock.set_speed_adjust(0.0);

        self.shared.broadcast_event(PlayerEvent::CachingChanged {
            from,
            to: state,
            timestamp: chrono::Utc::now(),
        });
    }

    fn resume_playback(&mut self) {
        self.clock.set_speed(self.play_speed);
        self.clock.pause(false);
        self.set_av_pipeline_speed(self.play_speed);
    }

    fn set_av_pipeline_speed(&mut self, speed: i32) {
        for stream_type in [StreamType::Audio, StreamType::Video] {
            if let Some(player) = self.pipelines.get_mut(stream_type) {
                player.set_speed(speed);
            }
        }
    }

    /// Cache runway projection, `None` when the input reports no metrics
    pub(super) fn caching_metrics(&self) -> Option<CachingTimes> {
        let status = self.input.cache_status()?;
        let stream_length_ms = self.demuxer.as_ref()?.stream_length_ms();
        caching_times(
            &status,
            self.input.length(),
            self.input.position(),
            stream_length_ms,
            self.queue_time_ms(),
        )
    }

    /// Media queued in the audio and video pipelines
    pub(super) fn queue_time_ms(&self) -> i64 {
        queue_time_ms(
            self.pipelines.level(StreamType::Audio),
            self.pipelines.level(StreamType::Video),
            self.config.sync.cache_runway_ms,
        )
    }

    pub(super) fn in_menu(&self) -> bool {
        self.navigator.as_ref().is_some_and(|nav| nav.is_in_menu())
    }

    fn pipeline_view(&self, stream_type: StreamType) -> PipelineView {
        let cursor = self.cursors.get(stream_type);
        if !cursor.is_active() {
            return PipelineView::absent();
        }
        PipelineView {
            enabled: true,
            sync_state: cursor.sync_state,
            inited: cursor.inited,
            accepts_data: self.pipelines.accepts_data(stream_type),
            level: self.pipelines.level(stream_type),
            stalled: self.pipelines.is_stalled(stream_type),
        }
    }

    /// One pass of caching, handshake, stall, trick-play and auto-skip checks
    pub(super) fn handle_play_speed(&mut self) {
        let in_menu = self.in_menu();

        for _ in 0..MAX_CACHING_STEPS {
            let inputs = CachingInputs {
                now: self.clock.absolute(),
                in_menu,
                cache_level: self.caching_metrics().map(|times| times.level),
                audio: self.pipeline_view(StreamType::Audio),
                video: self.pipeline_view(StreamType::Video),
            };
            match self.caching.next_state(&inputs) {
                Some(next) => self.set_caching(next),
                None => break,
            }
        }

        if self.caching.state() == CachingState::Done {
            self.check_stall(in_menu);
        }

        self.check_clock_handshake();

        if is_trick_play(self.play_speed) && !self.is_tempo {
            if in_menu {
                debug!("Trick play is not possible in menus");
                self.set_speed(PLAYSPEED_NORMAL, false);
            } else {
                self.check_trick_play();
            }
        }

        self.check_auto_scene_skip();
    }

    fn check_stall(&mut self, in_menu: bool) {
        let now = self.clock.absolute();
        let inputs = StallInputs {
            speed: self.play_speed,
            in_menu,
            realtime: self.input.is_realtime(),
            cooldown_elapsed: now >= self.resync_deadline,
            speed_adjust: self.clock.speed_adjust(),
            audio: self.pipeline_view(StreamType::Audio),
            video: self.pipeline_view(StreamType::Video),
        };

        match self.caching.stall_action(&inputs) {
            StallAction::None => {}
            StallAction::FlushResync => {
                info!(
                    "Stream stalled, rebuffering (audio {}%, video {}%)",
                    inputs.audio.level, inputs.video.level
                );
                self.flush_buffers(None, true, true, false);
            }
            StallAction::CacheFull => {
                info!("Audio and video ran low, caching");
                self.set_caching(CachingState::Full);
            }
            StallAction::ResyncSeek => {
                info!("Audio stream stalled, triggering resync");
                self.resync_deadline = now + msec_to_time(self.config.sync.resync_cooldown_ms);
                let resync = SeekRequest::to(self.current_time_ms());
                self.post(ControlMessage::Seek(resync));
            }
            StallAction::SpeedAdjust(adjust) => {
                debug!("Live audio level {}%, clock adjust {}", inputs.audio.level, adjust);
                self.clock.set_speed_adjust(adjust);
            }
        }
    }

    fn check_clock_handshake(&mut self) {
        let audio = HandshakeSide::from_cursor(
            self.cursors.audio(),
            self.pipelines.accepts_data(StreamType::Audio),
            self.pipelines.level(StreamType::Audio),
        );
        let video = HandshakeSide::from_cursor(
            self.cursors.video(),
            self.pipelines.accepts_data(StreamType::Video),
            self.pipelines.level(StreamType::Video),
        );
        let stream_count = self.demuxer.as_ref().map_or(0, |d| d.streams().len());
        let realtime = self.input.is_realtime();

        match self
            .handshake
            .resolve(&audio, &video, realtime, stream_count, self.clock.get_clock())
        {
            Handshake::Pending => {}
            Handshake::Single { stream_type, clock } => {
                info!("{} joins the running clock at {}us", stream_type, clock);
                self.mark_in_sync(stream_type, clock);
            }
            Handshake::Joint { clock } => {
                info!("Starting audio and video at clock {}us", clock);
                self.clock.discontinuity(clock);
                self.mark_in_sync(StreamType::Audio, clock);
                self.mark_in_sync(StreamType::Video, clock);
                self.resync_deadline = self.clock.absolute() + msec_to_time(self.config.sync.resync_cooldown_ms);
                self.set_caching(CachingState::Done);

                if !self.av_started {
                    self.av_started = true;
                    self.shared.broadcast_event(PlayerEvent::AvStarted {
                        session_id: self.shared.session_id,
                        clock_us: clock,
                        timestamp: chrono::Utc::now(),
                    });
                }
            }
        }
    }

    fn mark_in_sync(&mut self, stream_type: StreamType, clock: i64) {
        let cursor = self.cursors.get_mut(stream_type);
        cursor.sync_state = SyncState::InSync;
        cursor.avsync = AvSyncState::None;
        if cursor.is_active() {
            self.pipelines.send(stream_type, PipelineMessage::Resync { clock }, 1);
        }
    }

    fn check_trick_play(&mut self) {
        let video = self.cursors.video();
        let video_ready = video.is_active()
            && video.sync_state == SyncState::InSync
            && (video.inited || self.play_speed < 0);
        let observation = TrickPlayObservation {
            speed: self.play_speed,
            clock: self.clock.get_clock(),
            displayed_pts: self.pipelines.get(StreamType::Video).and_then(|p| p.current_pts()),
            time_ms: self.published_time_ms,
            time_offset: self.continuity.offset(),
            video_ready,
        };
        if let Some(catch_up) = self.trick_play.check(&observation) {
            debug!("Seeking to {}ms to catch up with the clock", catch_up.time_ms);
            let request = SeekRequest::to(catch_up.time_ms)
                .backward(catch_up.backward)
                .trick_play();
            self.post(ControlMessage::Seek(request));
        }
    }

    /// Skip EDL regions reached by the demuxed audio and video
    fn check_auto_scene_skip(&mut self) {
        if self.edl.is_empty() {
            return;
        }
        let (audio, video) = (self.cursors.audio(), self.cursors.video());
        if !audio.is_active() || !video.is_active() || !audio.inited || !video.inited {
            return;
        }
        let (Some(audio_dts), Some(video_dts)) = (audio.dts, video.dts) else {
            return;
        };
        let time_ms = time_to_msec(audio_dts.min(video_dts) + self.continuity.offset());
        if let Some(request) = self.auto_skip.check(&self.edl, time_ms, self.play_speed) {
            self.post(ControlMessage::Seek(request));
        }
    }
}
