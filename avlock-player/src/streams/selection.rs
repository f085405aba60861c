//! Default stream selection policy
//!
//! Every stream type is ranked by one generic [`PredicateChain`]: an ordered
//! list of keys where the first key on which two candidates differ decides
//! (higher wins). Ties cascade to the next key and finally to registration
//! order, because ranking is a stable sort over type-index order.
//!
//! Subtitles are additionally partitioned by a [`SubtitleFilter`] so that
//! relevant candidates always rank ahead of irrelevant ones.

use super::language::languages_match;
use super::registry::SelectionStreams;
use super::types::{SelectionStream, StreamFlags};
use crate::config::{ChannelPreference, SelectionPreferences, SubtitleMode};
use avlock_common::StreamType;
use std::cmp::Ordering;

/// Built-in codec priorities (higher wins); overridable from configuration
const CODEC_PRIORITY: &[(&str, i32)] = &[
    ("flac", 7),
    ("pcm", 7),
    ("pcm_s16le", 7),
    ("pcm_s24le", 7),
    ("pcm_s32le", 7),
    ("truehd", 6),
    ("dtshd_ma", 5),
    ("dtshd_hra", 4),
    ("eac3", 3),
    ("dca", 2),
    ("ac3", 1),
];

/// Ordered list of ranking keys
pub struct PredicateChain<'a, T> {
    keys: Vec<Box<dyn Fn(&T) -> i64 + 'a>>,
}

impl<'a, T> Default for PredicateChain<'a, T> {
    fn default() -> Self {
        Self { keys: Vec::new() }
    }
}

impl<'a, T> PredicateChain<'a, T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a numeric key (higher ranks first)
    pub fn key(mut self, key: impl Fn(&T) -> i64 + 'a) -> Self {
        self.keys.push(Box::new(key));
        self
    }

    /// Append a boolean key (true ranks first)
    pub fn flag(self, predicate: impl Fn(&T) -> bool + 'a) -> Self {
        self.key(move |item| i64::from(predicate(item)))
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// `Less` when `a` ranks ahead of `b`
    pub fn compare(&self, a: &T, b: &T) -> Ordering {
        for key in &self.keys {
            match key(b).cmp(&key(a)) {
                Ordering::Equal => continue,
                decided => return decided,
            }
        }
        Ordering::Equal
    }

    /// Stable sort of `items`, best first
    pub fn rank<'b>(&self, items: &mut [&'b T]) {
        items.sort_by(|a, b| self.compare(a, b));
    }
}

/// Relevance filter applied to subtitle candidates
#[derive(Debug, Clone)]
pub struct SubtitleFilter {
    mode: SubtitleMode,
    original: bool,
    previous: Option<i32>,
    audio_language: String,
    preferred_language: String,
}

impl SubtitleFilter {
    pub fn new(prefs: &SelectionPreferences, previous: Option<i32>, audio_language: &str) -> Self {
        Self {
            mode: prefs.subtitle_mode,
            original: prefs.subtitle_original(),
            previous,
            audio_language: audio_language.to_string(),
            preferred_language: prefs.subtitle_language.clone(),
        }
    }

    /// True when `stream` may be shown without an explicit user choice
    pub fn is_relevant(&self, stream: &SelectionStream) -> bool {
        if self.previous == Some(stream.type_index) {
            return true;
        }
        match self.mode {
            SubtitleMode::ShowNone => return false,
            SubtitleMode::ForcedOnly => {
                return stream.flags.is_forced()
                    && languages_match(&stream.language, &self.audio_language);
            }
            SubtitleMode::ShowAll => {}
        }
        if stream.is_external() {
            return true;
        }
        if stream.flags.is_forced()
            && (self.original || languages_match(&stream.language, &self.audio_language))
        {
            return true;
        }
        if stream.flags.is_default() {
            return true;
        }
        !self.original && languages_match(&stream.language, &self.preferred_language)
    }
}

/// Inputs of one selection round
#[derive(Debug, Clone, Default)]
pub struct SelectionContext {
    /// Index the user chose previously for the type being ranked
    pub previous_index: Option<i32>,
    /// Reference audio language for subtitle ranking
    pub audio_language: String,
}

/// Ranks candidates of each stream type
pub struct SelectionPolicy<'p> {
    prefs: &'p SelectionPreferences,
}

impl<'p> SelectionPolicy<'p> {
    pub fn new(prefs: &'p SelectionPreferences) -> Self {
        Self { prefs }
    }

    /// Codec priority from configuration overrides or the built-in table
    pub fn codec_priority(&self, codec: &str) -> i32 {
        let codec = codec.to_ascii_lowercase();
        if let Some(priority) = self.prefs.codec_priority.get(&codec) {
            return *priority;
        }
        CODEC_PRIORITY
            .iter()
            .find(|(name, _)| *name == codec)
            .map_or(0, |(_, priority)| *priority)
    }

    /// Enabled candidates of `stream_type`, best first
    pub fn rank(
        &self,
        registry: &SelectionStreams,
        stream_type: StreamType,
        ctx: &SelectionContext,
    ) -> Vec<SelectionStream> {
        let mut candidates: Vec<&SelectionStream> = registry
            .get_all(stream_type)
            .into_iter()
            .filter(|s| !s.disabled)
            .collect();

        match stream_type {
            StreamType::Audio => self.audio_chain(ctx).rank(&mut candidates),
            StreamType::Video => self.video_chain(ctx).rank(&mut candidates),
            StreamType::Subtitle => self.subtitle_chain(ctx).rank(&mut candidates),
            // Registration order
            StreamType::Teletext | StreamType::AuxData | StreamType::SideChannel => {}
        }

        candidates.into_iter().cloned().collect()
    }

    fn audio_chain<'c>(&'c self, ctx: &'c SelectionContext) -> PredicateChain<'c, SelectionStream> {
        let prefs = self.prefs;
        let mut chain = PredicateChain::new()
            .flag(move |s: &SelectionStream| ctx.previous_index == Some(s.type_index));

        chain = if prefs.audio_original() {
            chain.flag(|s: &SelectionStream| s.flags.is_original())
        } else {
            chain.flag(move |s: &SelectionStream| languages_match(&s.language, &prefs.audio_language))
        };

        chain = chain
            .flag(move |s: &SelectionStream| s.flags.is_hearing_impaired() == prefs.audio_hearing_impaired)
            .flag(move |s: &SelectionStream| s.flags.is_visual_impaired() == prefs.audio_visual_impaired);

        if prefs.prefer_default_flag {
            chain = chain.flag(|s: &SelectionStream| s.flags.is_default());
        }

        chain = match prefs.channel_preference {
            ChannelPreference::Stereo => chain.flag(|s: &SelectionStream| s.channels == 2),
            ChannelPreference::MostChannels => chain.key(|s: &SelectionStream| i64::from(s.channels)),
        };

        chain
            .key(move |s: &SelectionStream| i64::from(self.codec_priority(&s.codec)))
            .flag(|s: &SelectionStream| s.flags.is_default())
    }

    fn video_chain<'c>(&'c self, ctx: &'c SelectionContext) -> PredicateChain<'c, SelectionStream> {
        PredicateChain::new()
            .flag(move |s: &SelectionStream| ctx.previous_index == Some(s.type_index))
            .flag(|s: &SelectionStream| s.flags.is_default())
    }

    /// Relevance filter for the current subtitle round
    pub fn subtitle_filter(&self, ctx: &SelectionContext) -> SubtitleFilter {
        SubtitleFilter::new(self.prefs, ctx.previous_index, &ctx.audio_language)
    }

    fn subtitle_chain<'c>(&'c self, ctx: &'c SelectionContext) -> PredicateChain<'c, SelectionStream> {
        let prefs = self.prefs;
        let filter = self.subtitle_filter(ctx);
        let audio = ctx.audio_language.as_str();
        let matches_audio = move |s: &SelectionStream| languages_match(&s.language, audio);

        let mut chain = PredicateChain::new()
            .flag(move |s: &SelectionStream| filter.is_relevant(s))
            .flag(move |s: &SelectionStream| ctx.previous_index == Some(s.type_index))
            .flag(|s: &SelectionStream| s.is_external())
            .flag(move |s: &SelectionStream| s.flags.is_forced() && matches_audio(s))
            .flag(move |s: &SelectionStream| s.flags.is_default() && matches_audio(s))
            .flag(matches_audio)
            .flag(|s: &SelectionStream| s.flags.contains(StreamFlags::FORCED | StreamFlags::DEFAULT));

        if !prefs.subtitle_original() && prefs.subtitles_on {
            let preferred = prefs.subtitle_language.as_str();
            chain = chain
                .flag(move |s: &SelectionStream| s.is_external() && languages_match(&s.language, preferred))
                .flag(move |s: &SelectionStream| languages_match(&s.language, preferred));
        }

        chain
            .flag(move |s: &SelectionStream| s.flags.is_hearing_impaired() == prefs.subtitle_hearing_impaired)
            .flag(|s: &SelectionStream| s.flags.is_default())
    }
}

/// Audio language subtitles are compared against
///
/// With the "original" subtitle preference the language comes from the audio
/// track flagged original, else the one flagged default, else the selected
/// audio track.
pub fn reference_audio_language(
    registry: &SelectionStreams,
    selected_audio: Option<&SelectionStream>,
    prefs: &SelectionPreferences,
) -> String {
    if prefs.subtitle_original() {
        let flagged = registry
            .find_flagged(StreamType::Audio, StreamFlags::ORIGINAL)
            .or_else(|| registry.find_flagged(StreamType::Audio, StreamFlags::DEFAULT));
        if let Some(stream) = flagged {
            return stream.language.clone();
        }
    }
    selected_audio.map(|s| s.language.clone()).unwrap_or_default()
}
