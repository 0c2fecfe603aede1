use std::path::PathBuf;
use std::time::Duration;

use slideshow::{EngineEvent, Error, PlaybackEngine, PlaybackState, SlideChange};
use tokio::sync::mpsc::Receiver;
use tokio::time::{Instant, sleep_until, timeout_at};

fn playlist(names: &[&str]) -> Vec<PathBuf> {
    names.iter().map(PathBuf::from).collect()
}

fn secs(s: f64) -> Duration {
    Duration::from_secs_f64(s)
}

/// Receive everything emitted before `origin + until`, tagged with the
/// (virtual) time it arrived.
async fn collect_until(
    rx: &mut Receiver<EngineEvent>,
    origin: Instant,
    until: Duration,
) -> Vec<(Duration, EngineEvent)> {
    let mut seen = Vec::new();
    while let Ok(Some(event)) = timeout_at(origin + until, rx.recv()).await {
        seen.push((origin.elapsed(), event));
    }
    seen
}

fn slide_changes(events: &[(Duration, EngineEvent)]) -> Vec<(Duration, SlideChange)> {
    events
        .iter()
        .filter_map(|(at, ev)| match ev {
            EngineEvent::SlideChanged(change) => Some((*at, change.clone())),
            EngineEvent::Progress(_) => None,
        })
        .collect()
}

fn progress_seconds(events: &[(Duration, EngineEvent)]) -> Vec<f64> {
    events
        .iter()
        .filter_map(|(_, ev)| match ev {
            EngineEvent::Progress(p) => Some(p.seconds()),
            EngineEvent::SlideChanged(_) => None,
        })
        .collect()
}

async fn wait_for_state(engine: &PlaybackEngine, state: PlaybackState) {
    let mut status = engine.status();
    status
        .wait_for(|s| s.state == state)
        .await
        .expect("engine status channel closed");
}

#[tokio::test]
async fn rejects_empty_playlist_and_zero_duration() {
    let err = PlaybackEngine::new(Vec::new(), secs(3.0)).unwrap_err();
    assert!(matches!(err, Error::EmptyPlaylist));

    let err = PlaybackEngine::new(playlist(&["a"]), Duration::ZERO).unwrap_err();
    assert!(matches!(err, Error::InvalidDuration));
}

#[tokio::test(start_paused = true)]
async fn advances_once_per_slide_duration() {
    let (engine, mut rx) = PlaybackEngine::new(playlist(&["a", "b", "c"]), secs(3.0)).unwrap();
    let origin = Instant::now();
    engine.start().unwrap();

    let events = collect_until(&mut rx, origin, secs(3.5)).await;
    let changes = slide_changes(&events);
    assert_eq!(changes.len(), 1, "exactly one slide change: {events:?}");
    assert_eq!(changes[0].0, secs(3.0));
    assert_eq!(changes[0].1.index, 1);
    assert_eq!(changes[0].1.item, PathBuf::from("b"));
    assert_eq!(engine.current_index(), 1);

    // ticks at 1s, 2s, 3s, then the reset that precedes the change
    assert_eq!(progress_seconds(&events), vec![1.0, 2.0, 3.0, 0.0]);
    let reset_pos = events
        .iter()
        .position(|(_, ev)| matches!(ev, EngineEvent::Progress(p) if p.elapsed.is_zero()))
        .unwrap();
    let change_pos = events
        .iter()
        .position(|(_, ev)| matches!(ev, EngineEvent::SlideChanged(_)))
        .unwrap();
    assert!(reset_pos < change_pos, "progress reset must precede the slide change");

    engine.stop().unwrap();
}

#[tokio::test(start_paused = true)]
async fn manual_jump_starts_a_new_epoch() {
    let (engine, mut rx) = PlaybackEngine::new(playlist(&["a", "b", "c"]), secs(3.0)).unwrap();
    let origin = Instant::now();
    engine.start().unwrap();

    let first = collect_until(&mut rx, origin, secs(3.5)).await;
    let progress = progress_seconds(&first);
    assert!((progress[0] - 1.0).abs() < f64::EPSILON, "first tick at 1s");
    assert_eq!(slide_changes(&first)[0].1.item, PathBuf::from("b"));

    let item = engine.next_slide(0).unwrap();
    assert_eq!(item, PathBuf::from("a"));

    let after = collect_until(&mut rx, origin, secs(7.0)).await;
    let changes = slide_changes(&after);
    assert_eq!(changes.len(), 2, "jump plus one automatic advance: {after:?}");
    assert_eq!(changes[0].0, secs(3.5));
    assert_eq!(changes[0].1.index, 0);
    assert_eq!(changes[0].1.item, PathBuf::from("a"));
    // the old epoch would have fired at 6s
    assert!(changes.iter().all(|(at, _)| *at != secs(6.0)));
    assert_eq!(changes[1].0, secs(6.5));
    assert_eq!(changes[1].1.index, 1);
    assert_eq!(engine.current_index(), 1);

    engine.stop().unwrap();
}

#[tokio::test(start_paused = true)]
async fn wraps_from_last_to_first() {
    let (engine, mut rx) = PlaybackEngine::new(playlist(&["a", "b"]), secs(2.0)).unwrap();
    let origin = Instant::now();
    engine.start().unwrap();

    let events = collect_until(&mut rx, origin, secs(4.5)).await;
    let changes: Vec<usize> = slide_changes(&events).iter().map(|(_, c)| c.index).collect();
    assert_eq!(changes, vec![1, 0]);
    assert_eq!(engine.current_index(), 0);

    engine.stop().unwrap();
}

#[tokio::test(start_paused = true)]
async fn next_slide_wraps_and_resets_while_paused() {
    let (engine, mut rx) = PlaybackEngine::new(playlist(&["a", "b", "c"]), secs(3.0)).unwrap();
    let origin = Instant::now();
    engine.start().unwrap();

    sleep_until(origin + secs(1.5)).await;
    engine.pause().unwrap();
    wait_for_state(&engine, PlaybackState::Paused).await;
    assert!(engine.is_paused());

    assert_eq!(engine.next_slide(5).unwrap(), PathBuf::from("c"));
    let mut status = engine.status();
    let snapshot = *status
        .wait_for(|s| s.index == 2 && s.state == PlaybackState::Running)
        .await
        .unwrap();
    assert_eq!(snapshot.remaining, secs(3.0));

    let events = collect_until(&mut rx, origin, secs(4.0)).await;
    assert_eq!(progress_seconds(&events), vec![1.0, 0.0, 1.0, 2.0]);
    let changes = slide_changes(&events);
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].0, secs(1.5));

    engine.stop().unwrap();
}

#[tokio::test(start_paused = true)]
async fn zero_length_pause_round_trip_is_a_no_op() {
    let (engine, mut rx) = PlaybackEngine::new(playlist(&["a", "b", "c"]), secs(3.0)).unwrap();
    let origin = Instant::now();
    engine.start().unwrap();

    sleep_until(origin + secs(1.5)).await;
    engine.pause().unwrap();
    engine.pause().unwrap();
    let mut status = engine.status();
    let snapshot = *status
        .wait_for(|s| s.state == PlaybackState::Running && s.remaining == secs(1.5))
        .await
        .unwrap();
    assert_eq!(snapshot.index, 0);

    let events = collect_until(&mut rx, origin, secs(3.5)).await;
    assert_eq!(progress_seconds(&events), vec![1.0, 2.0, 3.0, 0.0]);
    let changes = slide_changes(&events);
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].0, secs(3.0));

    engine.stop().unwrap();
}

#[tokio::test(start_paused = true)]
async fn pause_preserves_remaining_time() {
    let (engine, mut rx) = PlaybackEngine::new(playlist(&["a", "b"]), secs(5.0)).unwrap();
    let origin = Instant::now();
    engine.start().unwrap();

    // two ticks, then pause
    let before = collect_until(&mut rx, origin, secs(2.5)).await;
    assert_eq!(progress_seconds(&before), vec![1.0, 2.0]);
    engine.pause().unwrap();
    let mut status = engine.status();
    let paused = *status
        .wait_for(|s| s.state == PlaybackState::Paused)
        .await
        .unwrap();
    assert_eq!(paused.remaining, secs(2.5));

    // nothing while paused, however long
    let idle = collect_until(&mut rx, origin, secs(60.0)).await;
    assert!(idle.is_empty(), "events while paused: {idle:?}");
    assert_eq!(engine.current_index(), 0);

    engine.pause().unwrap();
    let resumed = Instant::now();
    let events = collect_until(&mut rx, resumed, secs(3.0)).await;
    assert_eq!(progress_seconds(&events), vec![3.0, 4.0, 5.0, 0.0]);
    let changes = slide_changes(&events);
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].0, secs(2.5));
    assert_eq!(changes[0].1.index, 1);

    engine.stop().unwrap();
}

#[tokio::test(start_paused = true)]
async fn skip_back_from_first_wraps_to_last() {
    let (engine, mut rx) = PlaybackEngine::new(playlist(&["a", "b", "c"]), secs(3.0)).unwrap();
    let origin = Instant::now();
    engine.start().unwrap();
    engine.skip_back().unwrap();
    engine.skip_back().unwrap();
    engine.skip_forward().unwrap();

    let events = collect_until(&mut rx, origin, secs(0.5)).await;
    let indices: Vec<usize> = slide_changes(&events).iter().map(|(_, c)| c.index).collect();
    assert_eq!(indices, vec![2, 1, 2]);

    engine.stop().unwrap();
}

#[tokio::test(start_paused = true)]
async fn restart_resets_elapsed_time() {
    let (engine, mut rx) = PlaybackEngine::new(playlist(&["a", "b"]), secs(3.0)).unwrap();
    let origin = Instant::now();
    engine.start().unwrap();

    sleep_until(origin + secs(2.5)).await;
    engine.start().unwrap();

    let events = collect_until(&mut rx, origin, secs(6.0)).await;
    let changes = slide_changes(&events);
    assert_eq!(changes.len(), 1, "no duplicate advance after restart: {events:?}");
    assert_eq!(changes[0].0, secs(5.5));

    engine.stop().unwrap();
}

#[tokio::test(start_paused = true)]
async fn pause_before_start_is_ignored() {
    let (engine, mut rx) = PlaybackEngine::new(playlist(&["a", "b"]), secs(2.0)).unwrap();
    let origin = Instant::now();
    engine.pause().unwrap();

    let events = collect_until(&mut rx, origin, secs(5.0)).await;
    assert!(events.is_empty());
    assert_eq!(engine.state(), PlaybackState::Idle);

    engine.stop().unwrap();
}

#[tokio::test(start_paused = true)]
async fn stop_ends_the_stream_and_rejects_commands() {
    let (engine, mut rx) = PlaybackEngine::new(playlist(&["a", "b", "c"]), secs(3.0)).unwrap();
    let origin = Instant::now();
    engine.start().unwrap();

    sleep_until(origin + secs(1.5)).await;
    engine.stop().unwrap();

    let mut late = Vec::new();
    let deadline = origin + secs(20.0);
    loop {
        match timeout_at(deadline, rx.recv()).await {
            Ok(Some(event)) if origin.elapsed() > secs(1.5) => late.push(event),
            Ok(Some(_)) => {}
            Ok(None) => break,
            Err(_) => panic!("event stream still open after stop"),
        }
    }
    assert!(late.is_empty(), "events after stop: {late:?}");
    assert_eq!(engine.state(), PlaybackState::Stopped);

    assert!(matches!(engine.pause(), Err(Error::Stopped)));
    assert!(matches!(engine.next_slide(1), Err(Error::Stopped)));
    assert!(matches!(engine.start(), Err(Error::Stopped)));
    assert!(matches!(engine.stop(), Err(Error::Stopped)));

    engine.join().await;
}

#[tokio::test(start_paused = true)]
async fn stop_while_paused_terminates() {
    let (engine, mut rx) = PlaybackEngine::new(playlist(&["a", "b"]), secs(3.0)).unwrap();
    engine.start().unwrap();
    engine.pause().unwrap();
    wait_for_state(&engine, PlaybackState::Paused).await;

    engine.stop().unwrap();
    assert!(rx.recv().await.is_none());
    engine.join().await;
}

#[tokio::test(start_paused = true)]
async fn stalled_consumer_does_not_block_stop() {
    let options = slideshow::EngineOptions {
        event_buffer: 1,
        ..slideshow::EngineOptions::new(secs(1.0))
    };
    let (engine, rx) = PlaybackEngine::with_options(playlist(&["a", "b"]), options).unwrap();
    engine.start().unwrap();

    // nobody reads; the buffer fills and the engine blocks on delivery
    tokio::time::sleep(secs(10.0)).await;
    engine.stop().unwrap();
    tokio::time::timeout(secs(1.0), engine.join())
        .await
        .expect("engine did not terminate with a stalled consumer");
    drop(rx);
}

#[tokio::test(start_paused = true)]
async fn dropped_consumer_stops_the_engine() {
    let (engine, rx) = PlaybackEngine::new(playlist(&["a", "b"]), secs(1.0)).unwrap();
    engine.start().unwrap();
    drop(rx);

    wait_for_state(&engine, PlaybackState::Stopped).await;
    assert!(matches!(engine.skip_forward(), Err(Error::Stopped)));
}

#[tokio::test(start_paused = true)]
async fn enormous_slide_duration_still_ticks() {
    let (engine, mut rx) =
        PlaybackEngine::new(playlist(&["a", "b"]), Duration::from_secs(u64::MAX / 2)).unwrap();
    let origin = Instant::now();
    engine.start().unwrap();

    let events = collect_until(&mut rx, origin, secs(2.5)).await;
    assert_eq!(progress_seconds(&events), vec![1.0, 2.0]);
    assert!(slide_changes(&events).is_empty());
    assert_eq!(engine.state(), PlaybackState::Running);

    engine.stop().unwrap();
    assert!(rx.recv().await.is_none());
    engine.join().await;
}

#[tokio::test(start_paused = true)]
async fn enormous_tick_period_still_advances() {
    let options = slideshow::EngineOptions {
        tick_period: Duration::from_secs(u64::MAX / 2),
        ..slideshow::EngineOptions::new(secs(2.0))
    };
    let (engine, mut rx) = PlaybackEngine::with_options(playlist(&["a", "b"]), options).unwrap();
    let origin = Instant::now();
    engine.start().unwrap();

    let events = collect_until(&mut rx, origin, secs(2.5)).await;
    assert_eq!(progress_seconds(&events), vec![0.0]);
    let changes = slide_changes(&events);
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].0, secs(2.0));
    assert_eq!(changes[0].1.index, 1);

    engine.stop().unwrap();
}
