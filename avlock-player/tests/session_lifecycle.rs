//! Session lifecycle: open, playback to the end, stop, failures
//!
//! Every session runs on virtual time through the scenario runner.

mod helpers;

use avlock_common::events::{CachingState, PlayerEvent, SessionOutcome};
use avlock_common::StreamType;
use avlock_player::sim::{ScenarioCommand, SimMediaSpec};
use helpers::SessionBuilder;

#[test]
fn test_movie_starts_in_sync_and_ends() {
    let run = SessionBuilder::movie(4000).run();

    assert_eq!(run.report.outcome, SessionOutcome::Ended);
    assert_eq!(run.count("PlaybackStarted"), 1);
    assert_eq!(run.count("AvStarted"), 1);
    assert_eq!(run.count("PlaybackEnded"), 1);
    assert_eq!(run.count("PlaybackStopped"), 0);
    assert!(run.report.elapsed_ms >= 3900, "ended after {}ms", run.report.elapsed_ms);

    let reached_done = run.report.events.iter().any(|event| {
        matches!(
            event,
            PlayerEvent::CachingChanged {
                to: CachingState::Done,
                ..
            }
        )
    });
    assert!(reached_done, "caching never finished");

    let video = run.pipeline(StreamType::Video);
    let audio = run.pipeline(StreamType::Audio);
    assert_eq!(video.opened.len(), 1);
    assert_eq!(audio.opened.len(), 1);
    assert!(!video.resyncs.is_empty());
    assert!(!audio.resyncs.is_empty());
    assert!(video.eof && audio.eof);
    assert_eq!(video.dropped, 0);
}

#[test]
fn test_terminal_event_is_last() {
    let run = SessionBuilder::movie(2000).run();
    let last = run.report.events.last().expect("events were published");
    assert_eq!(last.event_type(), "PlaybackEnded");
    assert_eq!(run.report.events.iter().filter(|e| e.is_terminal()).count(), 1);
}

#[test]
fn test_stop_reports_stopped_once() {
    let run = SessionBuilder::movie(10_000)
        .at(1000, ScenarioCommand::Stop)
        .run();

    assert_eq!(run.report.outcome, SessionOutcome::Stopped);
    assert_eq!(run.count("PlaybackStopped"), 1);
    assert_eq!(run.count("PlaybackEnded"), 0);
    assert!(run.report.elapsed_ms < 2000, "stopped after {}ms", run.report.elapsed_ms);
    assert!(run.pipeline(StreamType::Video).closes >= 1);
}

#[test]
fn test_session_past_its_time_limit_is_stopped() {
    let run = SessionBuilder::movie(10_000)
        .at(500, ScenarioCommand::SetSpeed { speed: 0, tempo: false })
        .max_duration(3000)
        .run();

    assert_eq!(run.report.outcome, SessionOutcome::Stopped);
    assert!(run.report.elapsed_ms >= 3000);
}

#[test]
fn test_input_that_cannot_open_fails_the_session() {
    let run = SessionBuilder::movie(5000)
        .input(|input| input.fail_open = true)
        .run();

    assert!(matches!(run.report.outcome, SessionOutcome::Error { .. }));
    assert_eq!(run.count("PlaybackError"), 1);
    assert_eq!(run.count("PlaybackStarted"), 0);
    assert!(run.pipeline(StreamType::Video).opened.is_empty());
}

#[test]
fn test_demuxer_failure_without_new_streams_fails_the_session() {
    let run = SessionBuilder::movie(5000).demuxer_failures(1).run();

    match &run.report.outcome {
        SessionOutcome::Error { message } => assert!(message.contains("demuxer"), "message: {}", message),
        other => panic!("expected an error outcome, got {:?}", other),
    }
}

#[test]
fn test_demuxer_retried_while_input_offers_new_streams() {
    let run = SessionBuilder::movie(2000)
        .demuxer_failures(2)
        .input(|input| input.next_streams = 2)
        .run();

    assert_eq!(run.report.outcome, SessionOutcome::Ended);
    assert_eq!(run.count("AvStarted"), 1);
}

#[test]
fn test_inner_stream_switch_reopens_the_demuxer() {
    // the first inner stream ends, the input announces another one
    let run = SessionBuilder::movie(2000)
        .input(|input| input.next_streams = 1)
        .run();

    assert_eq!(run.report.outcome, SessionOutcome::Ended);
    assert_eq!(run.pipeline(StreamType::Video).opened.len(), 2);
}

#[test]
fn test_pause_holds_the_clock() {
    let run = SessionBuilder::movie(3000)
        .at(1000, ScenarioCommand::SetSpeed { speed: 0, tempo: false })
        .at(4000, ScenarioCommand::SetSpeed { speed: 1000, tempo: false })
        .run();

    assert_eq!(run.report.outcome, SessionOutcome::Ended);
    assert!(run.report.elapsed_ms >= 5900, "ended after {}ms", run.report.elapsed_ms);
    assert_eq!(run.count("SpeedChanged"), 2);
    assert!(run.pipeline(StreamType::Video).speeds.contains(&0));
}

#[test]
fn test_pause_refused_by_input() {
    let run = SessionBuilder::movie(2000)
        .input(|input| input.can_pause = false)
        .at(500, ScenarioCommand::SetSpeed { speed: 0, tempo: false })
        .run();

    assert_eq!(run.report.outcome, SessionOutcome::Ended);
    assert_eq!(run.count("SpeedChanged"), 0);
}

#[test]
fn test_corroborated_timestamp_jump_is_absorbed() {
    let media = SimMediaSpec::movie(5000).with_jump(2000, 60_000);
    let run = SessionBuilder::new(media).run();

    assert_eq!(run.report.outcome, SessionOutcome::Ended);
    // playback continued on the corrected timeline instead of waiting a minute
    assert!(run.report.elapsed_ms < 20_000, "ended after {}ms", run.report.elapsed_ms);
    let offset = run.report.snapshot.time_offset;
    assert!(
        (55_000_000..=61_000_000).contains(&offset),
        "offset {}us",
        offset
    );
}
