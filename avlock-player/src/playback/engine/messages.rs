//! Inbound control messages
//!
//! Messages are drained from the channel into `pending` once per cycle and
//! handled in arrival order. A seek is skipped when a later seek is already
//! queued behind it.

use super::core::PlayerEngine;
use crate::collaborators::PipelineMessage;
use crate::error::Result;
use crate::playback::cursor::SyncState;
use crate::playback::messages::ControlMessage;
use crate::playback::seek::SeekRequest;
use avlock_common::events::{CachingState, PlayerEvent};
use avlock_common::timing::{
    frame_duration, is_trick_play, msec_to_time, Timestamp, PLAYSPEED_NORMAL, PLAYSPEED_PAUSE,
};
use avlock_common::StreamType;
use tokio::sync::mpsc::error::TryRecvError;
use tracing::{debug, info, warn};

/// A non-accurate seek this soon after the previous one is dropped while
/// video has not resynced yet
const SEEK_SETTLE_MS: i64 = 2000;

/// Timeout pipelines get to acknowledge a flush
const FLUSH_SYNC_TIMEOUT_MS: u64 = 1000;

impl PlayerEngine {
    /// Move everything waiting on the channel into `pending`
    pub(super) fn drain_inbox(&mut self) {
        loop {
            match self.rx.try_recv() {
                Ok(message) => self.pending.push_back(message),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
    }

    /// Handle every pending message; an error is fatal for the session
    pub(super) fn handle_messages(&mut self) -> Result<()> {
        while let Some(message) = self.pending.pop_front() {
            if message.is_seek() && self.pending.iter().any(ControlMessage::is_seek) {
                debug!("{} superseded by a later seek", message.name());
                continue;
            }

            match message {
                ControlMessage::Open(options) => self.open_session(options)?,
                ControlMessage::Seek(request) => self.handle_seek(request),
                ControlMessage::SeekChapter(chapter) => self.handle_seek_chapter(chapter),
                ControlMessage::SetStream {
                    stream_type,
                    type_index,
                } => self.set_stream(stream_type, type_index),
                ControlMessage::SetSubtitleVisible(visible) => self.set_subtitle_visible(visible),
                ControlMessage::SetState(state) => self.set_player_state(state),
                ControlMessage::SetSpeed { speed, is_tempo } => self.set_speed(speed, is_tempo),
                ControlMessage::FrameAdvance(frames) => self.frame_advance(frames),
                ControlMessage::Flush => self.flush_buffers(None, true, true, false),
                ControlMessage::Synchronize { timeout, players, ack } => {
                    let timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
                    for player in players {
                        self.pipelines
                            .send(player, PipelineMessage::Synchronize { timeout_ms }, 1);
                    }
                    if ack.send(()).is_err() {
                        debug!("Synchronize caller gave up waiting");
                    }
                }
                ControlMessage::PipelineStarted {
                    player,
                    timestamp,
                    cache_time,
                    cache_total,
                } => self.pipeline_started(player, timestamp, cache_time, cache_total),
                ControlMessage::PipelineState { player, sync_state } => {
                    let cursor = self.cursors.get_mut(player);
                    if cursor.is_active() {
                        cursor.sync_state = sync_state;
                    }
                }
                ControlMessage::AddSubtitle(path) => {
                    if let Some(index) = self.add_subtitle_file(&path) {
                        self.set_stream(StreamType::Subtitle, index);
                        self.set_subtitle_visible_internal(true);
                    }
                }
                ControlMessage::Abort => {
                    info!("Abort requested");
                    self.shared.request_abort();
                    break;
                }
            }
        }
        Ok(())
    }

    fn handle_seek(&mut self, request: SeekRequest) {
        if self.demuxer.is_none() {
            debug!("No demuxer yet, ignoring seek");
            return;
        }
        if !self.input.can_seek() {
            info!("Input cannot seek, ignoring seek request");
            return;
        }

        let now = self.clock.absolute();
        let video = self.cursors.video();
        let settling = video.is_active()
            && video.sync_state != SyncState::InSync
            && self
                .last_seek_abs
                .is_some_and(|last| now - last < msec_to_time(SEEK_SETTLE_MS));
        if settling && self.play_speed == PLAYSPEED_NORMAL && !request.accurate {
            debug!("Previous seek still settling, skipping seek");
            return;
        }

        if !request.trick_play && request.flush {
            self.set_caching(CachingState::Flush);
        }

        let target = request.target_ms(self.current_time_ms());
        let time_ms = if request.restore {
            self.edl.restore_cut_time(target)
        } else {
            target
        };
        self.last_seek_abs = Some(now);

        debug!("Demuxer seek to {}ms", time_ms);
        let result = match self.demuxer.as_mut() {
            Some(demuxer) => demuxer.seek_time(time_ms, request.backward),
            None => return,
        };
        match result {
            Ok(start) => {
                for (source, demuxer) in self.subtitle_demuxers.iter_mut() {
                    if let Err(e) = demuxer.seek_time(time_ms, request.backward) {
                        debug!("Subtitle demuxer {} failed to seek: {}", source, e);
                    }
                }
                let start = start.or(Some(msec_to_time(time_ms)));
                self.flush_buffers(start, request.accurate, request.sync, !request.flush);
                if request.restore {
                    self.auto_skip.reset_cut_marker();
                }
                info!("Seeked to {}ms", time_ms);
                self.shared.broadcast_event(PlayerEvent::SeekPerformed {
                    time_ms,
                    accurate: request.accurate,
                    trick_play: request.trick_play,
                    timestamp: chrono::Utc::now(),
                });
            }
            Err(e) => {
                warn!("Seek to {}ms failed: {}", time_ms, e);
                self.flush_buffers(Some(msec_to_time(time_ms)), false, true, false);
                if self.play_speed != PLAYSPEED_PAUSE {
                    self.set_speed(PLAYSPEED_NORMAL, false);
                }
            }
        }
    }

    fn handle_seek_chapter(&mut self, chapter: usize) {
        if !self.input.can_seek() {
            info!("Input cannot seek, ignoring chapter seek");
            return;
        }
        self.set_caching(CachingState::Flush);
        self.last_seek_abs = Some(self.clock.absolute());

        let result = match self.demuxer.as_mut() {
            Some(demuxer) => demuxer.seek_chapter(chapter),
            None => return,
        };
        match result {
            Ok(start) => {
                self.flush_buffers(start, true, true, false);
                self.auto_skip.reset_cut_marker();
                info!("Seeked to chapter {}", chapter);
                self.shared.broadcast_event(PlayerEvent::ChapterSeek {
                    chapter,
                    timestamp: chrono::Utc::now(),
                });
            }
            Err(e) => warn!("Chapter seek to {} failed: {}", chapter, e),
        }
    }

    /// Discard everything buffered downstream of the demuxer
    ///
    /// `start` is the demuxer time playback resumes from. With `accurate`,
    /// packets before it are dropped at the gate; with `sync`, the clock
    /// handshake restarts and the clock jumps to `start`. A `queued` flush
    /// leaves the pipelines' queues to drain behind a reset marker.
    pub(super) fn flush_buffers(&mut self, start: Option<Timestamp>, accurate: bool, sync: bool, queued: bool) {
        debug!(
            "Flushing buffers (start {:?}, accurate {}, sync {}, queued {})",
            start, accurate, sync, queued
        );
        let offset = self.continuity.offset();
        let corrected_start = start.map(|s| s - offset);
        let gate = corrected_start.filter(|_| accurate);
        for cursor in self.cursors.iter_mut() {
            cursor.reset_for_flush(gate, sync);
        }

        if queued {
            for stream_type in StreamType::ALL {
                if self.cursors.get(stream_type).is_active() {
                    self.pipelines.send(stream_type, PipelineMessage::Reset, 1);
                }
            }
        } else {
            for (stream_type, player) in self.pipelines.iter_mut() {
                player.flush(sync && stream_type.is_av());
            }
            if self.play_speed == PLAYSPEED_NORMAL || self.play_speed == PLAYSPEED_PAUSE {
                for stream_type in [StreamType::Audio, StreamType::Video] {
                    self.pipelines.send(
                        stream_type,
                        PipelineMessage::Synchronize {
                            timeout_ms: FLUSH_SYNC_TIMEOUT_MS,
                        },
                        1,
                    );
                }
                self.drain_inbox();
                self.pending
                    .retain(|m| !matches!(m, ControlMessage::PipelineStarted { .. }));
                self.set_caching(CachingState::Flush);
            }
        }

        if sync {
            if let Some(clock) = corrected_start {
                self.clock.discontinuity(clock);
            }
        }
        self.trick_play.reset(self.clock.get_clock());
        self.state_dts = corrected_start;

        // a paused demuxer has to refill the flushed queues
        let demux_speed = if self.play_speed == PLAYSPEED_PAUSE {
            PLAYSPEED_NORMAL
        } else {
            self.play_speed
        };
        if self.demuxer_speed != demux_speed {
            self.set_demuxer_speed(demux_speed);
        }
        self.update_play_state(true);
    }

    pub(super) fn set_speed(&mut self, speed: i32, is_tempo: bool) {
        if speed == PLAYSPEED_PAUSE && !self.input.can_pause() {
            warn!("Input cannot pause, ignoring");
            return;
        }
        let previous = self.play_speed;
        if speed == previous && is_tempo == self.is_tempo {
            return;
        }
        info!("Play speed {} -> {}{}", previous, speed, if is_tempo { " (tempo)" } else { "" });

        let was_trick = is_trick_play(previous) && !self.is_tempo;
        let trick = is_trick_play(speed) && !is_tempo;
        if was_trick && speed == PLAYSPEED_NORMAL && !trick {
            // the decoder lacks reference frames after trick play
            let resume = SeekRequest {
                trick_play: true,
                ..SeekRequest::to(self.current_time_ms()).backward(previous < 0)
            };
            self.post(ControlMessage::Seek(resume));
        }

        self.play_speed = speed;
        self.is_tempo = is_tempo;
        self.set_caching(CachingState::Done);
        self.clock.set_speed(speed);
        for (_, player) in self.pipelines.iter_mut() {
            player.set_speed(speed);
        }
        // pausing the demuxer waits until the queues are full
        if speed != PLAYSPEED_PAUSE {
            self.set_demuxer_speed(speed);
        }
        self.trick_play.reset(self.clock.get_clock());

        self.shared.broadcast_event(PlayerEvent::SpeedChanged {
            speed,
            is_tempo,
            timestamp: chrono::Utc::now(),
        });
        self.update_play_state(true);
    }

    /// Step the paused clock forward by whole video frames
    fn frame_advance(&mut self, frames: u32) {
        if self.play_speed != PLAYSPEED_PAUSE {
            debug!("Frame advance ignored while playing");
            return;
        }
        let video = self.cursors.video();
        let frame = video
            .hint
            .as_ref()
            .and_then(|hint| frame_duration(hint.fps_rate, hint.fps_scale))
            .unwrap_or(video.dur);
        debug!("Advancing {} frame(s) of {}us", frames, frame);
        self.clock.advance(frame * i64::from(frames));
        self.update_play_state(true);
    }

    fn pipeline_started(
        &mut self,
        player: StreamType,
        timestamp: Option<Timestamp>,
        cache_time: Timestamp,
        cache_total: Timestamp,
    ) {
        if !player.is_av() {
            return;
        }
        let cursor = self.cursors.get_mut(player);
        if !cursor.is_active() {
            debug!("{} pipeline started without an active stream", player);
            return;
        }
        cursor.sync_state = SyncState::WaitSync;
        cursor.start_time = timestamp;
        cursor.cache_time = cache_time;
        cursor.cache_total = cache_total;
        debug!(
            "{} pipeline started at {:?} (cache {}us of {}us)",
            player, timestamp, cache_time, cache_total
        );
    }

    fn set_player_state(&mut self, state: String) {
        let Some(nav) = self.navigator.clone() else {
            warn!("Input has no navigator, ignoring player state");
            return;
        };
        self.set_caching(CachingState::Flush);
        if nav.set_state(&state) {
            info!("Navigator state restored");
            self.player_state = Some(state);
        } else {
            warn!("Navigator rejected player state");
        }
        self.update_play_state(true);
    }
}
