//! Stream catalog maintenance and stream open/close
//!
//! Keeps the selection registry in step with the demuxers and the disc
//! navigator, applies the default selection policy, and opens or closes the
//! pipeline behind each cursor.

use super::core::PlayerEngine;
use crate::collaborators::{NextStream, PipelineMessage, StreamHint, StreamInfo};
use crate::error::{Error, Result};
use crate::playback::cursor::{AvSyncState, SyncState};
use crate::playback::messages::ControlMessage;
use crate::playback::seek::SeekRequest;
use crate::streams::selection::reference_audio_language;
use crate::streams::{SelectionContext, SelectionPolicy, SelectionStream, SourceId, SourceKind};
use avlock_common::events::{CachingState, PlayerEvent};
use avlock_common::timing::PLAYSPEED_NORMAL;
use avlock_common::StreamType;
use std::path::Path;
use tracing::{debug, error, info, warn};

/// Subtitle file extensions read through a subtitle demuxer; everything else
/// is handed to the subtitle pipeline as a text file
const DEMUXED_SUBTITLE_EXTENSIONS: &[&str] = &["idx", "sup", "mks"];

fn selection_stream(info: &StreamInfo, stream_type: StreamType, source: SourceId, filename: &str) -> SelectionStream {
    let mut stream = SelectionStream::new(stream_type, source, info.id);
    stream.demuxer_id = info.demuxer_id;
    stream.language = info.language.clone();
    stream.flags = info.flags;
    stream.codec = info.codec.clone();
    stream.channels = info.channels;
    stream.bitrate = info.bitrate;
    stream.width = info.width;
    stream.height = info.height;
    stream.filename = filename.to_string();
    stream.name = info.name.clone();
    stream.disabled = info.disabled;
    stream
}

/// Language tag embedded in a subtitle file name (`movie.en.srt` -> `en`)
fn language_from_filename(path: &str) -> String {
    let stem = Path::new(path)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default();
    match stem.rsplit_once('.') {
        Some((_, tag)) if (2..=3).contains(&tag.len()) && tag.chars().all(|c| c.is_ascii_alphabetic()) => {
            tag.to_ascii_lowercase()
        }
        _ => String::new(),
    }
}

impl PlayerEngine {
    /// Build the main demuxer, retrying while the input offers new inner streams
    pub(super) fn open_demux_stream(&mut self) -> Result<()> {
        info!("Creating demuxer");
        let attempts = self.config.sync.demuxer_open_attempts.max(1);
        let mut last_error = None;

        for attempt in 1..=attempts {
            if self.shared.is_aborted() {
                break;
            }
            match self.factory.open_demuxer(self.input.as_mut()) {
                Ok(demuxer) => {
                    self.demuxer = Some(demuxer);
                    break;
                }
                Err(e) => {
                    last_error = Some(e);
                    if self.input.next_stream() == NextStream::None {
                        break;
                    }
                    debug!("New inner stream available, retrying demuxer ({}/{})", attempt, attempts);
                }
            }
        }

        if self.demuxer.is_none() {
            let reason = last_error.map_or_else(|| "aborted".to_string(), |e| e.to_string());
            error!("Error creating demuxer: {}", reason);
            return Err(Error::Open(format!("no demuxer for {}: {}", self.input.file_name(), reason)));
        }

        self.refresh_demux_streams();
        self.set_demuxer_speed(PLAYSPEED_NORMAL);
        self.continuity.reset();
        info!("Demuxer ready with {} selectable streams", self.registry.len());
        Ok(())
    }

    /// Re-enumerate main demuxer and navigator streams
    pub(super) fn refresh_demux_streams(&mut self) {
        // streams whose open failed stay disabled across the re-enumeration
        let disabled: Vec<_> = self
            .registry
            .snapshot()
            .into_iter()
            .filter(|s| s.disabled && matches!(s.source.kind, SourceKind::Demux | SourceKind::DiscNav))
            .map(|s| s.key())
            .collect();
        self.registry.clear(None, Some(SourceKind::Demux));
        self.registry.clear(None, Some(SourceKind::DiscNav));
        let file_name = self.input.file_name();

        if let Some(demuxer) = self.demuxer.as_ref() {
            for info in demuxer.streams() {
                let Some(stream_type) = info.stream_type else {
                    continue;
                };
                // the navigator lists these itself
                if self.navigator.is_some() && matches!(stream_type, StreamType::Audio | StreamType::Subtitle) {
                    continue;
                }
                self.registry
                    .update(selection_stream(&info, stream_type, self.demux_source, &file_name));
            }
        }

        if let Some(nav) = self.navigator.as_ref() {
            let listed = [
                (StreamType::Audio, nav.audio_streams()),
                (StreamType::Subtitle, nav.subtitle_streams()),
            ];
            for (stream_type, streams) in listed {
                for info in streams {
                    self.registry
                        .update(selection_stream(&info, stream_type, self.nav_source, &file_name));
                }
            }
        }
        for (stream_type, source, demuxer_id, id) in disabled {
            self.registry.set_disabled(stream_type, source, demuxer_id, id);
        }
        self.publish_streams();
    }

    /// Re-enumerate the streams of every external subtitle demuxer
    pub(super) fn refresh_subtitle_streams(&mut self) {
        self.registry
            .clear(Some(StreamType::Subtitle), Some(SourceKind::ExternalSub));
        for (source, demuxer) in &self.subtitle_demuxers {
            let file_name = demuxer.file_name();
            for info in demuxer.streams() {
                if info.stream_type == Some(StreamType::Subtitle) {
                    self.registry
                        .update(selection_stream(&info, StreamType::Subtitle, *source, &file_name));
                }
            }
        }
        self.publish_streams();
    }

    pub(super) fn refresh_caption_streams(&mut self) {
        self.registry
            .clear(Some(StreamType::Subtitle), Some(SourceKind::EmbeddedCc));
        let file_name = self.input.file_name();
        if let Some(captions) = self.caption_demuxer.as_ref() {
            for info in captions.streams() {
                self.registry
                    .update(selection_stream(&info, StreamType::Subtitle, self.caption_source, &file_name));
            }
        }
        self.publish_streams();
    }

    pub(super) fn publish_streams(&self) {
        self.shared.publish_streams(self.registry.snapshot());
    }

    /// Register an external subtitle file, returning its subtitle type index
    pub(super) fn add_subtitle_file(&mut self, path: &str) -> Option<i32> {
        let extension = Path::new(path)
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();

        if DEMUXED_SUBTITLE_EXTENSIONS.contains(&extension.as_str()) {
            let demuxer = match self.factory.open_subtitle_demuxer(path) {
                Ok(demuxer) => demuxer,
                Err(e) => {
                    warn!("Failed to open subtitle file {}: {}", path, e);
                    return None;
                }
            };
            let first = demuxer
                .streams()
                .into_iter()
                .find(|s| s.stream_type == Some(StreamType::Subtitle));
            let source = self.registry.source(SourceKind::ExternalSub, path);
            self.subtitle_demuxers.insert(source, demuxer);
            self.refresh_subtitle_streams();

            let first = first?;
            let index = self
                .registry
                .type_index_of(StreamType::Subtitle, source, first.demuxer_id, first.id);
            info!("Added subtitle file {} as index {}", path, index);
            return Some(index);
        }

        let source = self.registry.source(SourceKind::ExternalText, path);
        let mut stream = SelectionStream::new(StreamType::Subtitle, source, 0);
        stream.demuxer_id = 0;
        stream.language = language_from_filename(path);
        stream.codec = extension;
        stream.filename = path.to_string();
        stream.name = Path::new(path)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(path)
            .to_string();
        let index = self.registry.update(stream);
        info!("Added subtitle file {} as index {}", path, index);
        self.publish_streams();
        Some(index)
    }

    /// Run the selection policy for every stream type
    ///
    /// With `reset` false, cursors already on their best stream are kept
    /// without reopening their pipelines.
    pub(super) fn open_default_streams(&mut self, reset: bool) {
        if let Some(nav) = self.navigator.as_ref() {
            if nav.active_audio_stream() >= 0 || nav.active_subtitle_stream() >= 0 {
                debug!("Navigator dictates the active streams");
                return;
            }
        }

        if !self.open_best(StreamType::Video, reset) {
            self.close_stream(StreamType::Video, true);
        }
        if self.config.selection.video_only || !self.open_best(StreamType::Audio, reset) {
            self.close_stream(StreamType::Audio, true);
        }

        let selected_audio = self.selected_entry(StreamType::Audio);
        let audio_language =
            reference_audio_language(&self.registry, selected_audio.as_ref(), &self.config.selection);
        let ctx = SelectionContext {
            previous_index: self.preferred_index[StreamType::Subtitle.index()],
            audio_language,
        };
        let policy = SelectionPolicy::new(&self.config.selection);
        let ranked = policy.rank(&self.registry, StreamType::Subtitle, &ctx);
        let filter = policy.subtitle_filter(&ctx);

        let mut visible = self.config.selection.subtitles_on;
        let mut valid = false;
        for stream in ranked {
            if self.open_stream(StreamType::Subtitle, stream.demuxer_id, stream.id, stream.source, reset) {
                valid = true;
                if !filter.is_relevant(&stream) {
                    visible = false;
                } else if stream.flags.is_forced() {
                    visible = true;
                }
                break;
            }
        }
        if !valid {
            self.close_stream(StreamType::Subtitle, false);
        }
        // a restored navigator state carries its own visibility
        if self.navigator.is_none() || self.player_state.is_none() {
            self.set_subtitle_visible_internal(visible);
        }

        for stream_type in [StreamType::Teletext, StreamType::AuxData, StreamType::SideChannel] {
            if !self.open_best(stream_type, reset) {
                self.close_stream(stream_type, false);
            }
        }
        self.publish_streams();
    }

    /// Open the best ranked candidate of a type without language context
    fn open_best(&mut self, stream_type: StreamType, reset: bool) -> bool {
        if !self.pipelines.contains(stream_type) {
            return false;
        }
        let ctx = SelectionContext {
            previous_index: self.preferred_index[stream_type.index()],
            audio_language: String::new(),
        };
        let ranked = SelectionPolicy::new(&self.config.selection).rank(&self.registry, stream_type, &ctx);
        ranked
            .into_iter()
            .any(|stream| self.open_stream(stream_type, stream.demuxer_id, stream.id, stream.source, reset))
    }

    /// Registry entry of the active stream of `stream_type`
    fn selected_entry(&self, stream_type: StreamType) -> Option<SelectionStream> {
        let cursor = self.cursors.get(stream_type);
        let source = cursor.source.filter(|_| cursor.is_active())?;
        self.registry
            .find_key(stream_type, source, cursor.demuxer_id, cursor.id)
            .cloned()
    }

    fn stream_hint(
        &self,
        stream_type: StreamType,
        demuxer_id: i32,
        id: i32,
        source: SourceId,
    ) -> Option<(StreamHint, u32)> {
        if source.kind == SourceKind::ExternalText {
            let entry = self.registry.find_key(stream_type, source, demuxer_id, id)?;
            let hint = StreamHint {
                stream_type: Some(stream_type),
                id,
                demuxer_id,
                source: Some(source),
                codec: entry.codec.clone(),
                language: entry.language.clone(),
                flags: entry.flags,
                filename: Some(entry.filename.clone()),
                ..StreamHint::default()
            };
            return Some((hint, 0));
        }
        let info = self.stream_info(source, demuxer_id, id)?;
        Some((StreamHint::from_info(&info, source), info.changes))
    }

    fn enable_source_stream(&mut self, source: SourceId, demuxer_id: i32, id: i32, enable: bool) {
        match source.kind {
            SourceKind::Demux => {
                if let Some(demuxer) = self.demuxer.as_mut() {
                    demuxer.enable_stream(demuxer_id, id, enable);
                }
            }
            SourceKind::ExternalSub => {
                if let Some(demuxer) = self.subtitle_demuxers.get_mut(&source) {
                    demuxer.enable_stream(demuxer_id, id, enable);
                }
            }
            SourceKind::DiscNav | SourceKind::ExternalText | SourceKind::EmbeddedCc => {}
        }
    }

    /// Make the identified stream the active one of `stream_type`
    ///
    /// A stream its pipeline refuses is disabled in the registry and the
    /// demuxer, and the call returns false.
    pub(super) fn open_stream(
        &mut self,
        stream_type: StreamType,
        demuxer_id: i32,
        id: i32,
        source: SourceId,
        reset: bool,
    ) -> bool {
        if !self.pipelines.contains(stream_type) {
            return false;
        }
        if source.kind == SourceKind::DiscNav {
            return self.select_navigator_stream(stream_type, id);
        }
        let Some((hint, changes)) = self.stream_hint(stream_type, demuxer_id, id, source) else {
            debug!("{} stream {} from {} not found", stream_type, id, source);
            return false;
        };

        let cursor = self.cursors.get(stream_type);
        let same_stream = cursor.is_active()
            && cursor.id == id
            && cursor.demuxer_id == demuxer_id
            && cursor.source == Some(source);
        let pipeline_inited = self.pipelines.get(stream_type).is_some_and(|p| p.is_inited());
        let needs_open = !same_stream
            || reset
            || !pipeline_inited
            || cursor.hint.as_ref().map_or(true, |current| current.needs_reopen(&hint));
        let previous_id = cursor.id;

        if needs_open {
            let opened = self
                .pipelines
                .get_mut(stream_type)
                .is_some_and(|player| player.open_stream(&hint));
            if !opened {
                warn!(
                    "Unsupported {} stream {} ({}), stream disabled",
                    stream_type, id, hint.codec
                );
                self.registry.set_disabled(stream_type, source, demuxer_id, id);
                self.enable_source_stream(source, demuxer_id, id, false);
                self.publish_streams();
                return false;
            }
            self.enable_source_stream(source, demuxer_id, id, true);
        }

        let cursor = self.cursors.get_mut(stream_type);
        cursor.id = id;
        cursor.demuxer_id = demuxer_id;
        cursor.source = Some(source);
        cursor.hint = Some(hint);
        cursor.changes = changes;
        cursor.last_dts = None;
        if needs_open {
            cursor.sync_state = SyncState::Starting;
            cursor.start_time = None;
            if stream_type.is_av() && previous_id >= 0 && cursor.avsync != AvSyncState::Force {
                cursor.avsync = AvSyncState::Check;
            }
        }

        match stream_type {
            StreamType::Video => self.has_video = true,
            StreamType::Audio => self.has_audio = true,
            StreamType::Subtitle => {
                let visible = self.subtitles_visible;
                self.pipelines
                    .send(StreamType::Subtitle, PipelineMessage::SubtitleVisible(visible), 1);
            }
            _ => {}
        }

        if !same_stream {
            let type_index = self.registry.type_index_of(stream_type, source, demuxer_id, id);
            info!("Opened {} stream {} from {} (index {})", stream_type, id, source, type_index);
            self.shared.broadcast_event(PlayerEvent::StreamSelected {
                stream_type,
                type_index,
                timestamp: chrono::Utc::now(),
            });
        }
        true
    }

    /// Ask the navigator to switch streams; the cursor follows once packets
    /// of the newly routed stream arrive
    fn select_navigator_stream(&mut self, stream_type: StreamType, index: i32) -> bool {
        let Some(nav) = self.navigator.as_ref() else {
            return false;
        };
        let selected = match stream_type {
            StreamType::Audio => nav.set_active_audio_stream(index),
            StreamType::Subtitle => nav.set_active_subtitle_stream(index),
            _ => false,
        };
        if selected {
            let type_index = self
                .registry
                .get_all(stream_type)
                .into_iter()
                .find(|s| s.source == self.nav_source && s.id == index)
                .map_or(-1, |s| s.type_index);
            info!("Navigator switched {} to stream {}", stream_type, index);
            self.shared.broadcast_event(PlayerEvent::StreamSelected {
                stream_type,
                type_index,
                timestamp: chrono::Utc::now(),
            });
        }
        selected
    }

    /// Close the active stream of `stream_type`
    ///
    /// `wait` lets the pipeline play out what it already holds.
    pub(super) fn close_stream(&mut self, stream_type: StreamType, wait: bool) -> bool {
        let cursor = self.cursors.get(stream_type);
        if !cursor.is_active() {
            return false;
        }
        let (source, demuxer_id, id) = (cursor.source, cursor.demuxer_id, cursor.id);
        debug!("Closing {} stream {}", stream_type, id);

        if wait {
            self.set_caching(CachingState::Done);
        }
        if let Some(source) = source {
            self.enable_source_stream(source, demuxer_id, id, false);
        }
        if let Some(player) = self.pipelines.get_mut(stream_type) {
            player.close_stream(wait);
        }
        self.cursors.get_mut(stream_type).clear();
        true
    }

    /// User stream choice by registry type index
    pub(super) fn set_stream(&mut self, stream_type: StreamType, type_index: i32) {
        let Some(stream) = self.registry.find(stream_type, type_index).cloned() else {
            warn!("No {} stream at index {}", stream_type, type_index);
            return;
        };
        if stream.disabled {
            warn!("{} stream at index {} is disabled", stream_type, type_index);
            return;
        }
        self.preferred_index[stream_type.index()] = Some(type_index);

        if stream.source.kind == SourceKind::DiscNav {
            self.select_navigator_stream(stream_type, stream.id);
            return;
        }

        self.close_stream(stream_type, false);
        if !self.open_stream(stream_type, stream.demuxer_id, stream.id, stream.source, true) {
            warn!("Failed to switch {} to index {}", stream_type, type_index);
            return;
        }
        // restart the new stream at the current position
        if stream_type.is_av() && self.input.can_seek() {
            let request = SeekRequest::to(self.current_time_ms()).backward(true);
            self.post(ControlMessage::Seek(request));
        }
    }

    pub(super) fn set_subtitle_visible(&mut self, visible: bool) {
        if let Some(nav) = self.navigator.as_ref() {
            nav.enable_subtitle_stream(visible);
        }
        self.set_subtitle_visible_internal(visible);
    }

    pub(super) fn set_subtitle_visible_internal(&mut self, visible: bool) {
        let changed = self.subtitles_visible != visible;
        self.subtitles_visible = visible;
        self.pipelines
            .send(StreamType::Subtitle, PipelineMessage::SubtitleVisible(visible), 1);
        if changed {
            info!("Subtitles {}", if visible { "shown" } else { "hidden" });
            self.shared
                .broadcast_event(PlayerEvent::SubtitleVisibilityChanged {
                    visible,
                    timestamp: chrono::Utc::now(),
                });
        }
    }
}
