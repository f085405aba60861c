//! Seeking, chapter navigation and EDL handling

mod helpers;

use avlock_common::events::{PlayerEvent, SessionOutcome};
use avlock_common::StreamType;
use avlock_player::playback::{EditAction, EditDecision};
use avlock_player::sim::{ScenarioCommand, SimMediaSpec};
use helpers::{seek_to, SessionBuilder, SessionRun};

const MS: i64 = 1000;

fn seek_targets(run: &SessionRun) -> Vec<i64> {
    run.report
        .events
        .iter()
        .filter_map(|event| match event {
            PlayerEvent::SeekPerformed { time_ms, .. } => Some(*time_ms),
            _ => None,
        })
        .collect()
}

#[test]
fn test_accurate_seek_starts_at_target() {
    let run = SessionBuilder::movie(30_000).at(1000, seek_to(10_000)).run();

    assert_eq!(run.report.outcome, SessionOutcome::Ended);
    assert_eq!(seek_targets(&run), vec![10_000]);
    assert_eq!(run.count("AvStarted"), 1, "AvStarted is reported once per session");

    for stream_type in [StreamType::Video, StreamType::Audio] {
        let record = run.pipeline(stream_type);
        let first = record.first_pts.expect("packets after the seek");
        assert!(first >= 10_000 * MS, "{} resumed at {}us", stream_type, first);
        assert!(record.flushes >= 1);
    }
    // 1s before the seek, 20s after it
    assert!(run.report.elapsed_ms < 25_000, "ended after {}ms", run.report.elapsed_ms);
}

#[test]
fn test_queued_seeks_coalesce_to_the_latest() {
    let run = SessionBuilder::movie(20_000)
        .at(1000, seek_to(5000))
        .at(1000, seek_to(12_000))
        .run();

    assert_eq!(run.report.outcome, SessionOutcome::Ended);
    assert_eq!(seek_targets(&run), vec![12_000]);
}

#[test]
fn test_relative_seek_from_current_time() {
    let run = SessionBuilder::movie(20_000)
        .at(
            1000,
            ScenarioCommand::Seek {
                time_ms: 5000,
                relative: true,
            },
        )
        .run();

    let targets = seek_targets(&run);
    assert_eq!(targets.len(), 1);
    assert!((5900..=6100).contains(&targets[0]), "seeked to {}ms", targets[0]);
}

#[test]
fn test_seek_ignored_when_input_cannot_seek() {
    let run = SessionBuilder::movie(5000)
        .input(|input| input.can_seek = false)
        .at(1000, seek_to(4000))
        .run();

    assert_eq!(run.report.outcome, SessionOutcome::Ended);
    assert!(seek_targets(&run).is_empty());
    assert!(run.report.elapsed_ms >= 4900, "ended after {}ms", run.report.elapsed_ms);
}

#[test]
fn test_failed_seek_keeps_playing() {
    let run = SessionBuilder::movie(5000).at(1000, seek_to(60_000)).run();

    assert_eq!(run.report.outcome, SessionOutcome::Ended);
    assert!(seek_targets(&run).is_empty());
}

#[test]
fn test_chapter_seek() {
    let media = SimMediaSpec::movie(20_000)
        .with_chapter("Opening", 0)
        .with_chapter("Story", 5000)
        .with_chapter("Credits", 15_000);
    let run = SessionBuilder::new(media)
        .at(500, ScenarioCommand::SeekChapter { chapter: 3 })
        .run();

    assert_eq!(run.report.outcome, SessionOutcome::Ended);
    assert_eq!(run.count("ChapterSeek"), 1);
    assert_eq!(run.report.snapshot.chapters.len(), 3);
    assert_eq!(run.report.snapshot.chapters[2].start_ms, 15_000);

    let first = run.pipeline(StreamType::Video).first_pts.expect("video after the seek");
    assert!(first >= 15_000 * MS, "video resumed at {}us", first);
    assert!(run.report.elapsed_ms < 10_000, "ended after {}ms", run.report.elapsed_ms);
}

#[test]
fn test_unknown_chapter_is_ignored() {
    let media = SimMediaSpec::movie(3000).with_chapter("Only", 0);
    let run = SessionBuilder::new(media)
        .at(500, ScenarioCommand::SeekChapter { chapter: 7 })
        .run();

    assert_eq!(run.report.outcome, SessionOutcome::Ended);
    assert_eq!(run.count("ChapterSeek"), 0);
}

#[test]
fn test_resume_time() {
    let run = SessionBuilder::movie(10_000).start_at(4000).run();

    assert_eq!(run.report.outcome, SessionOutcome::Ended);
    let first = run.pipeline(StreamType::Video).first_pts.expect("video played");
    assert!(first >= 4000 * MS, "video started at {}us", first);
    assert!(run.report.elapsed_ms < 8000, "ended after {}ms", run.report.elapsed_ms);
}

#[test]
fn test_leading_cut_skipped_at_startup() {
    let run = SessionBuilder::movie(10_000)
        .edit(EditDecision::new(0, 5000, EditAction::Cut))
        .run();

    assert_eq!(run.report.outcome, SessionOutcome::Ended);
    assert_eq!(run.report.snapshot.start_time_ms, 5000);
    let first = run.pipeline(StreamType::Video).first_pts.expect("video played");
    assert!(first >= 5000 * MS, "video started at {}us", first);
    assert!(run.report.elapsed_ms < 7000, "ended after {}ms", run.report.elapsed_ms);
}

#[test]
fn test_cut_skipped_during_playback() {
    let run = SessionBuilder::movie(10_000)
        .edit(EditDecision::new(3000, 6000, EditAction::Cut))
        .run();

    assert_eq!(run.report.outcome, SessionOutcome::Ended);
    assert!(seek_targets(&run).contains(&6000));
    // the cut does not count towards the playable length
    assert_eq!(run.report.snapshot.time_max_ms, 7000);
    assert!(run.report.elapsed_ms < 9500, "ended after {}ms", run.report.elapsed_ms);
}

#[test]
fn test_mute_region_mutes_audio_only() {
    let run = SessionBuilder::movie(6000)
        .edit(EditDecision::new(2000, 4000, EditAction::Mute))
        .run();

    assert_eq!(run.report.outcome, SessionOutcome::Ended);
    assert!(run.pipeline(StreamType::Audio).muted > 0);
    assert_eq!(run.pipeline(StreamType::Video).muted, 0);
    assert!(seek_targets(&run).is_empty());
}
