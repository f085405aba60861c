//! Default stream selection, user stream switching and subtitle handling

mod helpers;

use avlock_common::events::{PlayerEvent, SessionOutcome};
use avlock_common::StreamType;
use avlock_player::collaborators::StreamInfo;
use avlock_player::playback::ControlMessage;
use avlock_player::sim::{ScenarioCommand, SimDemuxerFactory, SimInput, SimMediaSpec, SimNavigator, SimStreamSpec};
use helpers::{ManualSession, SessionBuilder};
use std::sync::Arc;

/// Video plus English AC-3 (default flag) and German stereo AAC
fn bilingual(duration_ms: i64) -> SimMediaSpec {
    SimMediaSpec::movie(duration_ms).with_stream(SimStreamSpec::audio(2, "aac", "ger", 2))
}

fn audio_selections(events: &[PlayerEvent]) -> Vec<i32> {
    events
        .iter()
        .filter_map(|event| match event {
            PlayerEvent::StreamSelected {
                stream_type: StreamType::Audio,
                type_index,
                ..
            } => Some(*type_index),
            _ => None,
        })
        .collect()
}

#[test]
fn test_default_flag_wins_without_language_preference() {
    let run = SessionBuilder::new(bilingual(3000)).run();

    assert_eq!(run.report.outcome, SessionOutcome::Ended);
    assert_eq!(run.opened_ids(StreamType::Audio), vec![1]);
    assert_eq!(run.opened_ids(StreamType::Video), vec![0]);
}

#[test]
fn test_preferred_audio_language() {
    let run = SessionBuilder::new(bilingual(3000))
        .config(|config| config.selection.audio_language = "ger".to_string())
        .run();

    assert_eq!(run.report.outcome, SessionOutcome::Ended);
    assert_eq!(run.opened_ids(StreamType::Audio), vec![2]);
    assert_eq!(audio_selections(&run.report.events), vec![1]);
}

#[test]
fn test_refused_codec_falls_back_and_disables_stream() {
    let run = SessionBuilder::new(bilingual(3000)).refuse_codec("ac3").run();

    assert_eq!(run.report.outcome, SessionOutcome::Ended);
    assert_eq!(run.opened_ids(StreamType::Audio), vec![2]);
    assert!(run.pipeline(StreamType::Audio).refused >= 1);

    let ac3 = run
        .report
        .streams
        .iter()
        .find(|s| s.stream_type == StreamType::Audio && s.id == 1)
        .expect("AC-3 stream stays listed");
    assert!(ac3.disabled);
}

#[test]
fn test_refused_stream_stays_disabled_after_stream_change() {
    let media = bilingual(5000).with_stream_change(2000, 0, "hevc");
    let run = SessionBuilder::new(media).refuse_codec("ac3").run();

    assert_eq!(run.report.outcome, SessionOutcome::Ended);
    // the re-enumeration must not hand the AC-3 stream back to selection
    assert_eq!(run.pipeline(StreamType::Audio).refused, 1);
    assert_eq!(run.opened_ids(StreamType::Audio), vec![2]);
    assert_eq!(run.pipeline(StreamType::Video).opened.len(), 2);

    let ac3 = run
        .report
        .streams
        .iter()
        .find(|s| s.stream_type == StreamType::Audio && s.id == 1)
        .expect("AC-3 stream stays listed");
    assert!(ac3.disabled);
}

#[test]
fn test_user_switches_audio_stream() {
    let run = SessionBuilder::new(bilingual(6000))
        .at(
            1000,
            ScenarioCommand::SetStream {
                stream_type: StreamType::Audio,
                index: 1,
            },
        )
        .run();

    assert_eq!(run.report.outcome, SessionOutcome::Ended);
    assert_eq!(run.opened_ids(StreamType::Audio), vec![1, 2]);
    assert_eq!(audio_selections(&run.report.events), vec![0, 1]);
    // the new stream restarts at the current position
    assert_eq!(run.count("SeekPerformed"), 1);
}

#[test]
fn test_switch_to_missing_stream_is_ignored() {
    let run = SessionBuilder::movie(3000)
        .at(
            1000,
            ScenarioCommand::SetStream {
                stream_type: StreamType::Audio,
                index: 5,
            },
        )
        .run();

    assert_eq!(run.report.outcome, SessionOutcome::Ended);
    assert_eq!(run.opened_ids(StreamType::Audio), vec![1]);
    assert_eq!(run.count("SeekPerformed"), 0);
}

#[test]
fn test_video_only_never_opens_audio() {
    let run = SessionBuilder::new(bilingual(3000))
        .config(|config| config.selection.video_only = true)
        .run();

    assert_eq!(run.report.outcome, SessionOutcome::Ended);
    assert!(run.opened_ids(StreamType::Audio).is_empty());
    assert_eq!(run.count("AvStarted"), 1);
    assert!(!run.report.snapshot.has_audio);
}

#[test]
fn test_codec_change_reopens_pipeline() {
    let media = SimMediaSpec::movie(5000).with_stream_change(2000, 1, "eac3");
    let run = SessionBuilder::new(media).run();

    assert_eq!(run.report.outcome, SessionOutcome::Ended);
    let audio = run.pipeline(StreamType::Audio);
    assert_eq!(audio.opened.len(), 2);
    assert_eq!(audio.opened[1].codec, "eac3");
    // video is untouched
    assert_eq!(run.pipeline(StreamType::Video).opened.len(), 1);
}

#[test]
fn test_external_text_subtitle() {
    let run = SessionBuilder::movie(3000)
        .at(
            1000,
            ScenarioCommand::AddSubtitle {
                path: "/media/movie.en.srt".to_string(),
            },
        )
        .run();

    assert_eq!(run.report.outcome, SessionOutcome::Ended);
    let subtitle = run.pipeline(StreamType::Subtitle);
    assert_eq!(subtitle.opened.len(), 1);
    assert_eq!(subtitle.opened[0].filename.as_deref(), Some("/media/movie.en.srt"));
    assert_eq!(subtitle.subtitle_visible, Some(true));

    let entry = run
        .report
        .streams
        .iter()
        .find(|s| s.stream_type == StreamType::Subtitle)
        .expect("subtitle registered");
    assert_eq!(entry.language, "en");
    assert_eq!(entry.codec, "srt");
}

#[test]
fn test_external_demuxed_subtitle_feeds_packets() {
    let subtitle_media =
        SimMediaSpec::new(3000).with_stream(SimStreamSpec::subtitle(0, "dvdsub", "eng"));
    let run = SessionBuilder::movie(3000)
        .subtitle_file("/media/movie.idx", subtitle_media)
        .at(
            500,
            ScenarioCommand::AddSubtitle {
                path: "/media/movie.idx".to_string(),
            },
        )
        .run();

    assert_eq!(run.report.outcome, SessionOutcome::Ended);
    let subtitle = run.pipeline(StreamType::Subtitle);
    assert_eq!(subtitle.opened.len(), 1);
    assert_eq!(subtitle.opened[0].codec, "dvdsub");
    assert!(subtitle.packets > 0);
}

#[test]
fn test_hiding_subtitles() {
    let run = SessionBuilder::movie(3000)
        .at(1000, ScenarioCommand::SetSubtitleVisible { visible: false })
        .run();

    assert_eq!(run.report.outcome, SessionOutcome::Ended);
    assert!(!run.report.snapshot.subtitles_visible);
    let last = run
        .report
        .events
        .iter()
        .rev()
        .find_map(|event| match event {
            PlayerEvent::SubtitleVisibilityChanged { visible, .. } => Some(*visible),
            _ => None,
        });
    assert_eq!(last, Some(false));
}

fn nav_entry(id: i32, physical_id: i32, language: &str) -> StreamInfo {
    StreamInfo {
        id,
        physical_id,
        stream_type: Some(StreamType::Audio),
        language: language.to_string(),
        codec: "ac3".to_string(),
        ..Default::default()
    }
}

#[test]
fn test_navigator_routes_audio() {
    let media = SimMediaSpec::movie(6000).with_stream(SimStreamSpec::audio(2, "ac3", "fre", 6));
    let navigator = Arc::new(SimNavigator::new(
        vec![nav_entry(0, 1, "eng"), nav_entry(1, 2, "fre")],
        Vec::new(),
    ));
    let input = SimInput::new("disc://movie").with_navigator(Arc::clone(&navigator));

    let mut session = ManualSession::new();
    let switch = ControlMessage::SetStream {
        stream_type: StreamType::Audio,
        type_index: 1,
    };
    let (outcome, _events) = session.run(
        Box::new(input),
        Box::new(SimDemuxerFactory::new(media)),
        vec![(1000, switch)],
    );

    assert_eq!(outcome, SessionOutcome::Ended);
    // the cursor follows the stream the navigator routes
    let audio_ids: Vec<i32> = session
        .pipeline(StreamType::Audio)
        .opened
        .iter()
        .map(|hint| hint.id)
        .collect();
    assert_eq!(audio_ids, vec![1, 2]);

    let streams = session.shared.streams();
    let listed: Vec<&str> = streams
        .iter()
        .filter(|s| s.stream_type == StreamType::Audio)
        .map(|s| s.language.as_str())
        .collect();
    assert_eq!(listed, vec!["eng", "fre"]);
}
