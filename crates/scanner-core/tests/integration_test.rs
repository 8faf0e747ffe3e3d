use async_trait::async_trait;
use scanner_core::*;
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::tempdir;

fn make_event(id: u64, kind: &str, place: &str, summary: &str) -> Event {
    Event::try_from(json!({
        "id": id,
        "datetime": format!("2025-03-{:02} 08:00:00 +01:00", id),
        "name": format!("{}, {}", kind, place),
        "summary": summary,
        "type": kind,
        "location": {"name": place},
    }))
    .unwrap()
}

struct BatchFeed {
    batches: Mutex<Vec<Vec<Event>>>,
}

#[async_trait]
impl EventFeed for BatchFeed {
    fn name(&self) -> &str {
        "batches"
    }

    async fn fetch(&self) -> Result<Vec<Event>> {
        let mut batches = self.batches.lock().unwrap();
        Ok(if batches.is_empty() {
            Vec::new()
        } else {
            batches.remove(0)
        })
    }
}

#[derive(Default)]
struct FlagShell(AtomicBool);

impl Shell for FlagShell {
    fn close(&self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

// ── Refresh then Query ───────────────────────────────────────────────────────

#[tokio::test]
async fn test_refresh_persists_and_queries_see_new_events() {
    let dir = tempdir().unwrap();
    let store = Arc::new(EventStore::new(
        dir.path().join("events.json"),
        dir.path().join("state.json"),
    ));
    let feed = Arc::new(BatchFeed {
        batches: Mutex::new(vec![
            vec![
                make_event(2, "Brand", "Solna", "Brand i radhus"),
                make_event(1, "Rån", "Solna", "Rån mot butik"),
            ],
            vec![
                make_event(3, "Brand", "Uppsala", "Skogsbrand"),
                make_event(2, "Brand", "Solna", "Brand i radhus"),
            ],
        ]),
    });
    let refresher = Refresher::new(feed, store.clone());

    assert_eq!(refresher.refresh().await.unwrap().len(), 2);
    let second = refresher.refresh().await.unwrap();
    assert_eq!(second.iter().map(Event::id).collect::<Vec<_>>(), vec![3]);

    // Reopen from disk
    let reopened = EventStore::new(store.data_file(), store.state_file());
    let events = reopened.load().unwrap();
    assert_eq!(
        events.iter().map(Event::id).collect::<Vec<_>>(),
        vec![3, 2, 1]
    );

    let query = Query::new().with_text("brand");
    let result = evaluate(&events, &query).unwrap();
    let ids: Vec<_> = result.events().unwrap().iter().map(|s| s.event.id()).collect();
    assert_eq!(ids, vec![3, 2]);

    let ranked = evaluate(
        &events,
        &Query::new().with_group_by(FieldPath::parse("location.name").unwrap()),
    )
    .unwrap();
    let groups = ranked.groups().unwrap();
    assert_eq!(groups[0].group, "solna");
    assert_eq!(groups[0].count, 2);
}

// ── Workers and Shutdown ─────────────────────────────────────────────────────

#[tokio::test]
async fn test_shutdown_drains_background_refresh_worker() {
    let dir = tempdir().unwrap();
    let store = Arc::new(EventStore::new(
        dir.path().join("events.json"),
        dir.path().join("state.json"),
    ));
    let feed = Arc::new(BatchFeed {
        batches: Mutex::new(vec![vec![make_event(1, "Rån", "Solna", "Rån")]]),
    });
    let refresher = Arc::new(Refresher::new(feed, store.clone()));

    let scheduler = Arc::new(Scheduler::new(tokio::runtime::Handle::current()));
    let shell = Arc::new(FlagShell::default());
    let lifecycle = Lifecycle::new(scheduler.clone(), shell.clone());

    let worker_refresher = refresher.clone();
    scheduler
        .spawn("poll", move |token| async move {
            loop {
                worker_refresher.refresh().await?;
                tokio::select! {
                    _ = token.cancelled() => return Ok(()),
                    _ = tokio::time::sleep(Duration::from_millis(10)) => {}
                }
            }
        })
        .unwrap();

    tokio::time::timeout(Duration::from_secs(5), async {
        while store.load().unwrap().is_empty() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();

    let report = lifecycle
        .shutdown(false, Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(report.workers, 1);
    assert!(!report.timed_out);
    assert_eq!(report.failed, 0);
    assert!(shell.0.load(Ordering::SeqCst));
    assert_eq!(lifecycle.state(), LifecycleState::Completed);
    assert!(scheduler.running_tasks().is_empty());

    assert!(matches!(
        lifecycle.shutdown(true, Duration::ZERO).await,
        Err(ScannerError::ShutdownInProgress)
    ));
}

// ── Log Buffer and Rendering ─────────────────────────────────────────────────

#[test]
fn test_log_buffer_feeds_render_frames() {
    let buffer = LogBuffer::new(3);
    let scroll = AtomicBool::new(false);
    let mut tracker = RenderTracker::new();

    buffer.write("a\nb");
    let frame = tracker.poll(&buffer, 0, &scroll).unwrap();
    assert_eq!(frame.redraw, Redraw::Append(vec!["a".into(), "b".into()]));

    buffer.write("c\nd");
    let frame = tracker.poll(&buffer, frame.cursor, &scroll).unwrap();
    assert_eq!(buffer.snapshot(), "b\nc\nd");
    assert_eq!(frame.redraw, Redraw::Append(vec!["c".into(), "d".into()]));
    assert!(tracker.poll(&buffer, frame.cursor, &scroll).is_none());
}
