mod common;

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::Duration as ChronoDuration;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rust_eink_frame::catalog::CatalogCache;
use rust_eink_frame::clock::{Clock, ManualClock};
use rust_eink_frame::error::{ErrorKind, FrameError};
use rust_eink_frame::model::{Card, DisplayOutcome};
use rust_eink_frame::selector::Selector;
use rust_eink_frame::state::{RotationState, read_json_optional};
use rust_eink_frame::tasks::rotation::{RotationScheduler, SchedulerState, TickOutcome};
use tempfile::tempdir;
use tokio_util::sync::CancellationToken;

use common::{FakeSource, RecordingSink, Shown, manual_clock, photos, token_store};

const CATALOG_TTL: Duration = Duration::from_secs(60);

fn build(
    dir: &Path,
    source: &Arc<FakeSource>,
    sink: &Arc<RecordingSink>,
    clock: &Arc<ManualClock>,
    selector: Selector,
    interval: Duration,
) -> RotationScheduler {
    let tokens = token_store(dir, source.clone(), clock.clone(), ChronoDuration::days(1));
    let catalog = CatalogCache::new(source.clone(), tokens.clone(), clock.clone(), CATALOG_TTL);
    RotationScheduler::new(
        catalog,
        selector,
        tokens,
        source.clone(),
        sink.clone(),
        clock.clone(),
        interval,
    )
    .with_state_file(dir.join("rotation-state.json"))
}

fn seeded() -> Selector {
    Selector::new(StdRng::seed_from_u64(42))
}

async fn rendered_id(scheduler: &mut RotationScheduler) -> String {
    match scheduler.tick(&CancellationToken::new()).await.unwrap() {
        TickOutcome::Rendered { id } => id,
        other => panic!("expected a rendered photo, got {other:?}"),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn failed_tick_shows_error_card_and_next_tick_recovers() {
    let tmp = tempdir().unwrap();
    let source = FakeSource::new(photos(&["a", "b", "c"]));
    let sink = RecordingSink::new();
    let clock = manual_clock();
    let mut scheduler = build(tmp.path(), &source, &sink, &clock, seeded(), Duration::from_secs(60));

    source.fail_bytes(FrameError::Network("image download returned 502".into()));
    let cancel = CancellationToken::new();
    let first = scheduler.tick(&cancel).await.unwrap();
    assert_eq!(first, TickOutcome::Errored(ErrorKind::Network));
    assert_eq!(scheduler.state(), SchedulerState::Errored);
    match sink.last() {
        Some(Shown::Card(Card::Error { kind, message })) => {
            assert_eq!(kind, ErrorKind::Network);
            assert!(message.contains("502"));
        }
        other => panic!("expected an error card, got {other:?}"),
    }

    let second = scheduler.tick(&cancel).await.unwrap();
    assert!(matches!(second, TickOutcome::Rendered { .. }));
    assert_eq!(scheduler.state(), SchedulerState::Rendered);
    assert!(matches!(sink.last(), Some(Shown::Photo(_))));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn empty_catalog_shows_nothing_to_show() {
    let tmp = tempdir().unwrap();
    let source = FakeSource::new(Vec::new());
    let sink = RecordingSink::new();
    let clock = manual_clock();
    let mut scheduler = build(tmp.path(), &source, &sink, &clock, seeded(), Duration::from_secs(60));

    let outcome = scheduler.tick(&CancellationToken::new()).await.unwrap();
    assert_eq!(outcome, TickOutcome::NothingToShow);
    assert_eq!(sink.shown(), vec![Shown::Card(Card::NothingToShow)]);
    assert_eq!(source.bytes_calls(), 0);
    assert!(!tmp.path().join("rotation-state.json").exists());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn album_cycle_repeats_then_restarts_when_album_changes() {
    let tmp = tempdir().unwrap();
    let source = FakeSource::new(photos(&["A", "B", "C"]));
    let sink = RecordingSink::new();
    let clock = manual_clock();
    let mut scheduler = build(tmp.path(), &source, &sink, &clock, seeded(), Duration::from_secs(60));

    let mut shown = Vec::new();
    for _ in 0..6 {
        shown.push(rendered_id(&mut scheduler).await);
    }
    let cycle: HashSet<&String> = shown[..3].iter().collect();
    assert_eq!(cycle.len(), 3);
    assert_eq!(shown[3..], shown[..3]);

    source.set_catalog(photos(&["A", "B", "C", "D"]));
    clock.advance(ChronoDuration::from_std(CATALOG_TTL).unwrap());

    let mut next_cycle = HashSet::new();
    for _ in 0..4 {
        next_cycle.insert(rendered_id(&mut scheduler).await);
    }
    let expected: HashSet<String> = ["A", "B", "C", "D"].iter().map(|s| s.to_string()).collect();
    assert_eq!(next_cycle, expected);
    assert_eq!(scheduler.selector().cursor(), 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn rendered_photo_is_persisted() {
    let tmp = tempdir().unwrap();
    let source = FakeSource::new(photos(&["a", "b"]));
    let sink = RecordingSink::new();
    let clock = manual_clock();
    let mut scheduler = build(tmp.path(), &source, &sink, &clock, seeded(), Duration::from_secs(90));

    let id = rendered_id(&mut scheduler).await;
    let saved: RotationState = read_json_optional(&tmp.path().join("rotation-state.json"))
        .unwrap()
        .expect("rotation state written");
    assert_eq!(saved.current_id(), Some(id.as_str()));
    assert_eq!(saved.ordered_ids.len(), 2);
    assert_eq!(saved.last_rotated_at, Some(clock.now()));
    assert_eq!(saved.interval_seconds, 90);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn resumes_after_the_persisted_cursor() {
    let tmp = tempdir().unwrap();
    let source = FakeSource::new(photos(&["a", "b", "c"]));
    let sink = RecordingSink::new();
    let clock = manual_clock();
    let saved = RotationState {
        ordered_ids: vec!["c".into(), "a".into(), "b".into()],
        cursor: 0,
        last_rotated_at: None,
        interval_seconds: 60,
    };
    let selector = Selector::from_state(&saved, StdRng::seed_from_u64(1));
    let mut scheduler = build(tmp.path(), &source, &sink, &clock, selector, Duration::from_secs(60));

    assert_eq!(rendered_id(&mut scheduler).await, "a");
    assert_eq!(rendered_id(&mut scheduler).await, "b");
    assert_eq!(rendered_id(&mut scheduler).await, "c");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn decode_failure_is_reported_as_decode_card() {
    let tmp = tempdir().unwrap();
    let source = FakeSource::new(photos(&["a", "b"]));
    let sink = RecordingSink::new();
    let clock = manual_clock();
    let mut scheduler = build(tmp.path(), &source, &sink, &clock, seeded(), Duration::from_secs(60));

    sink.script_photo_outcome(DisplayOutcome::failed(ErrorKind::Decode, "not an image"));
    let outcome = scheduler.tick(&CancellationToken::new()).await.unwrap();
    assert_eq!(outcome, TickOutcome::Errored(ErrorKind::Decode));
    assert!(matches!(
        sink.last(),
        Some(Shown::Card(Card::Error { kind: ErrorKind::Decode, .. }))
    ));

    // The bad photo does not block the rotation.
    assert!(matches!(
        scheduler.tick(&CancellationToken::new()).await.unwrap(),
        TickOutcome::Rendered { .. }
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn run_loop_survives_failures_until_cancelled() {
    let tmp = tempdir().unwrap();
    let source = FakeSource::new(photos(&["a", "b"]));
    let sink = RecordingSink::new();
    let clock = manual_clock();
    let mut scheduler = build(tmp.path(), &source, &sink, &clock, seeded(), Duration::from_millis(20));

    source.fail_bytes(FrameError::Network("timeout".into()));
    let cancel = CancellationToken::new();
    let handle = tokio::spawn({
        let cancel = cancel.clone();
        async move {
            let result = scheduler.run(cancel).await;
            (result, scheduler.state())
        }
    });

    tokio::time::timeout(Duration::from_secs(5), async {
        while sink.photo_ids().len() < 2 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("photos rendered after the failed tick");
    cancel.cancel();

    let (result, state) = tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .expect("loop stops after cancellation")
        .unwrap();
    assert!(result.is_ok());
    assert_eq!(state, SchedulerState::Stopped);
    assert!(matches!(
        sink.shown().first(),
        Some(Shown::Card(Card::Error { kind: ErrorKind::Network, .. }))
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn revoked_authorization_stops_the_loop() {
    let tmp = tempdir().unwrap();
    let source = FakeSource::new(photos(&["a"]));
    let sink = RecordingSink::new();
    let clock = manual_clock();
    // The token is already due for a refresh, which the provider refuses.
    let tokens = token_store(tmp.path(), source.clone(), clock.clone(), ChronoDuration::zero());
    let catalog = CatalogCache::new(source.clone(), tokens.clone(), clock.clone(), CATALOG_TTL);
    let mut scheduler = RotationScheduler::new(
        catalog,
        seeded(),
        tokens,
        source.clone(),
        sink.clone(),
        clock.clone(),
        Duration::from_millis(10),
    );
    source.fail_refresh(FrameError::AuthRevoked("invalid_grant: Token has been expired or revoked.".into()));

    let result = tokio::time::timeout(Duration::from_secs(2), scheduler.run(CancellationToken::new()))
        .await
        .expect("fatal error ends the loop");
    assert!(matches!(result, Err(FrameError::AuthRevoked(_))));
    assert_eq!(scheduler.state(), SchedulerState::Stopped);
    assert_eq!(source.refresh_calls(), 1);
    assert!(matches!(
        sink.shown().as_slice(),
        [Shown::Card(Card::Error { kind: ErrorKind::Auth, .. })]
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn cancellation_interrupts_the_interval_wait() {
    let tmp = tempdir().unwrap();
    let source = FakeSource::new(photos(&["a", "b"]));
    let sink = RecordingSink::new();
    let clock = manual_clock();
    let mut scheduler = build(tmp.path(), &source, &sink, &clock, seeded(), Duration::from_secs(3600));

    let cancel = CancellationToken::new();
    let handle = tokio::spawn({
        let cancel = cancel.clone();
        async move { scheduler.run(cancel).await }
    });

    tokio::time::timeout(Duration::from_secs(5), async {
        while sink.photo_ids().is_empty() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("first photo rendered immediately");
    cancel.cancel();

    let result = tokio::time::timeout(Duration::from_secs(1), handle)
        .await
        .expect("cancel is prompt")
        .unwrap();
    assert!(result.is_ok());
    assert_eq!(sink.photo_ids().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn recent_rotation_waits_out_the_remaining_interval() {
    let tmp = tempdir().unwrap();
    let source = FakeSource::new(photos(&["a"]));
    let sink = RecordingSink::new();
    let clock = manual_clock();
    let last = clock.now() - ChronoDuration::seconds(10);
    let mut scheduler = build(tmp.path(), &source, &sink, &clock, seeded(), Duration::from_secs(3600))
        .with_last_rotated_at(Some(last));

    let cancel = CancellationToken::new();
    let handle = tokio::spawn({
        let cancel = cancel.clone();
        async move { scheduler.run(cancel).await }
    });
    tokio::time::sleep(Duration::from_millis(150)).await;
    cancel.cancel();

    let result = tokio::time::timeout(Duration::from_secs(1), handle)
        .await
        .expect("cancel is prompt")
        .unwrap();
    assert!(result.is_ok());
    assert_eq!(source.catalog_calls(), 0);
    assert!(sink.shown().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn cancelled_before_start_does_nothing() {
    let tmp = tempdir().unwrap();
    let source = FakeSource::new(photos(&["a"]));
    let sink = RecordingSink::new();
    let clock = manual_clock();
    let mut scheduler = build(tmp.path(), &source, &sink, &clock, seeded(), Duration::from_secs(60));

    let cancel = CancellationToken::new();
    cancel.cancel();
    scheduler.run(cancel).await.unwrap();
    assert_eq!(scheduler.state(), SchedulerState::Stopped);
    assert_eq!(source.catalog_calls(), 0);
}
