//! # Read Tracker Tests
//!
//! Watermark, count and polling behaviour of [`ReadTracker`] against an
//! in-memory store and scripted message sources.

use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use chrono::TimeZone;
use tokio::sync::Notify;

use super::{
    Clock, FetchError, KeyValueStore, MemoryStore, MessageSource, ReadTracker, TrackerOptions,
    count_unread, watermark_key,
};
use crate::models::{ConversationId, Message, Timestamp};

const ME: &str = "user-1";
const FRIEND: &str = "user-2";

fn t0() -> Timestamp {
    Timestamp(chrono::Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap())
}

fn offset(base: Timestamp, seconds: i64) -> Timestamp {
    Timestamp(base.0 + chrono::Duration::seconds(seconds))
}

fn message(id: &str, author: &str, created_at: Timestamp) -> Message {
    Message {
        id: id.to_string(),
        group_id: Some(ConversationId::from("group-1")),
        user_id: author.to_string(),
        content: format!("message {id}"),
        created_at,
        is_ai: false,
        thread_id: None,
        is_pinned: false,
        reply_to_id: None,
        file_url: None,
        file_name: None,
        file_type: None,
        file_size: None,
    }
}

struct FixedClock(Mutex<Timestamp>);

impl FixedClock {
    fn at(instant: Timestamp) -> Arc<Self> {
        Arc::new(Self(Mutex::new(instant)))
    }

    fn set(&self, instant: Timestamp) {
        *self.0.lock().unwrap() = instant;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> Timestamp {
        *self.0.lock().unwrap()
    }
}

/// Serves canned message lists; conversations without an entry fail.
#[derive(Default)]
struct ScriptedSource {
    messages: Mutex<HashMap<ConversationId, Vec<Message>>>,
    calls: AtomicUsize,
}

impl ScriptedSource {
    fn with(conversation: &str, messages: Vec<Message>) -> Arc<Self> {
        let source = Arc::new(Self::default());
        source.put(conversation, messages);
        source
    }

    fn put(&self, conversation: &str, messages: Vec<Message>) {
        self.messages
            .lock()
            .unwrap()
            .insert(ConversationId::from(conversation), messages);
    }

    fn remove(&self, conversation: &str) {
        self.messages
            .lock()
            .unwrap()
            .remove(&ConversationId::from(conversation));
    }
}

#[async_trait]
impl MessageSource for ScriptedSource {
    async fn list_messages(
        &self,
        conversation: &ConversationId,
    ) -> Result<Vec<Message>, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.messages
            .lock()
            .unwrap()
            .get(conversation)
            .cloned()
            .ok_or_else(|| FetchError::Status {
                conversation: conversation.clone(),
                status: 503,
            })
    }
}

/// Holds every fetch until released, announcing when one has started.
struct GatedSource {
    inner: Arc<ScriptedSource>,
    started: Notify,
    release: Notify,
}

#[async_trait]
impl MessageSource for GatedSource {
    async fn list_messages(
        &self,
        conversation: &ConversationId,
    ) -> Result<Vec<Message>, FetchError> {
        self.started.notify_one();
        self.release.notified().await;
        self.inner.list_messages(conversation).await
    }
}

/// Holds fetches of one conversation until released; others answer at once.
struct SlowConversationSource {
    inner: Arc<ScriptedSource>,
    slow: ConversationId,
    started: Notify,
    release: Notify,
}

#[async_trait]
impl MessageSource for SlowConversationSource {
    async fn list_messages(
        &self,
        conversation: &ConversationId,
    ) -> Result<Vec<Message>, FetchError> {
        if *conversation == self.slow {
            self.started.notify_one();
            self.release.notified().await;
        }
        self.inner.list_messages(conversation).await
    }
}

fn tracker_for(
    user: &str,
    store: Arc<MemoryStore>,
    source: Arc<dyn MessageSource>,
    clock: Arc<FixedClock>,
) -> ReadTracker {
    ReadTracker::with_clock(user, store, source, clock)
}

#[tokio::test]
async fn test_counts_only_other_authors_after_watermark() {
    let conversation = ConversationId::from("group-1");
    let source = ScriptedSource::with(
        "group-1",
        vec![
            message("a", ME, offset(t0(), -1)),
            message("b", FRIEND, offset(t0(), 1)),
            message("c", FRIEND, offset(t0(), 2)),
        ],
    );
    let clock = FixedClock::at(t0());
    let tracker = tracker_for(ME, Arc::new(MemoryStore::new()), source, clock);
    tracker.set_conversations([conversation.clone()]);

    tracker.mark_as_read(&conversation).unwrap();
    tracker.recompute().await;

    assert_eq!(tracker.unread_count(&conversation), 2);
}

#[tokio::test]
async fn test_unwatermarked_conversation_counts_everything_from_others() {
    let conversation = ConversationId::from("group-1");
    let source = ScriptedSource::with(
        "group-1",
        vec![
            message("a", FRIEND, offset(t0(), -3600)),
            message("b", ME, offset(t0(), 1)),
            message("c", "ai-agent", offset(t0(), 2)),
        ],
    );
    let tracker = tracker_for(ME, Arc::new(MemoryStore::new()), source, FixedClock::at(t0()));
    tracker.set_conversations([conversation.clone()]);

    let snapshot = tracker.recompute().await;

    assert_eq!(snapshot.get(&conversation), Some(&2));
    assert_eq!(tracker.total_unread(), 2);
}

#[tokio::test]
async fn test_mark_as_read_resets_count_before_next_pass() {
    let conversation = ConversationId::from("group-1");
    let source = ScriptedSource::with("group-1", vec![message("b", FRIEND, offset(t0(), 5))]);
    let tracker = tracker_for(ME, Arc::new(MemoryStore::new()), source, FixedClock::at(t0()));
    tracker.set_conversations([conversation.clone()]);
    tracker.recompute().await;
    assert_eq!(tracker.unread_count(&conversation), 1);

    tracker.mark_as_read(&conversation).unwrap();

    assert_eq!(tracker.unread_count(&conversation), 0);
}

#[test]
fn test_unknown_conversation_reads_zero() {
    let tracker = tracker_for(
        ME,
        Arc::new(MemoryStore::new()),
        Arc::new(ScriptedSource::default()),
        FixedClock::at(t0()),
    );
    assert_eq!(tracker.unread_count(&ConversationId::from("nowhere")), 0);
}

#[test]
fn test_watermark_never_regresses() {
    let conversation = ConversationId::from("group-1");
    let clock = FixedClock::at(offset(t0(), 60));
    let tracker = tracker_for(
        ME,
        Arc::new(MemoryStore::new()),
        Arc::new(ScriptedSource::default()),
        clock.clone(),
    );

    let first = tracker.mark_as_read(&conversation).unwrap();
    clock.set(t0());
    let second = tracker.mark_as_read(&conversation).unwrap();
    clock.set(offset(t0(), 120));
    let third = tracker.mark_as_read(&conversation).unwrap();

    assert_eq!(first, offset(t0(), 60));
    assert_eq!(second, first);
    assert_eq!(third, offset(t0(), 120));
    assert_eq!(tracker.watermark(&conversation).unwrap(), Some(third));
}

#[tokio::test]
async fn test_fetch_failure_zeroes_only_that_conversation() {
    let healthy = ConversationId::from("group-1");
    let broken = ConversationId::from("thread-9");
    let source = ScriptedSource::with("group-1", vec![message("b", FRIEND, offset(t0(), 1))]);
    source.put("thread-9", vec![message("x", FRIEND, offset(t0(), 1))]);
    let tracker = tracker_for(ME, Arc::new(MemoryStore::new()), source.clone(), FixedClock::at(t0()));
    tracker.set_conversations([healthy.clone(), broken.clone()]);
    tracker.recompute().await;
    assert_eq!(tracker.unread_count(&broken), 1);

    source.remove("thread-9");
    tracker.recompute().await;

    assert_eq!(tracker.unread_count(&broken), 0);
    assert_eq!(tracker.unread_count(&healthy), 1);

    // Self-heals on the next cycle.
    source.put("thread-9", vec![message("x", FRIEND, offset(t0(), 1))]);
    tracker.recompute().await;
    assert_eq!(tracker.unread_count(&broken), 1);
}

#[tokio::test]
async fn test_preserve_on_failure_keeps_last_count() {
    let conversation = ConversationId::from("group-1");
    let source = ScriptedSource::with("group-1", vec![message("b", FRIEND, offset(t0(), 1))]);
    let tracker = tracker_for(ME, Arc::new(MemoryStore::new()), source.clone(), FixedClock::at(t0()))
        .with_options(TrackerOptions {
            preserve_on_failure: true,
        });
    tracker.set_conversations([conversation.clone()]);
    tracker.recompute().await;

    source.remove("group-1");
    tracker.recompute().await;

    assert_eq!(tracker.unread_count(&conversation), 1);
}

#[tokio::test]
async fn test_pass_replaces_the_whole_count_map() {
    let kept = ConversationId::from("group-1");
    let dropped = ConversationId::from("group-2");
    let source = ScriptedSource::with("group-1", vec![message("a", FRIEND, offset(t0(), 1))]);
    source.put("group-2", vec![message("b", FRIEND, offset(t0(), 1))]);
    let tracker = tracker_for(ME, Arc::new(MemoryStore::new()), source, FixedClock::at(t0()));
    tracker.set_conversations([kept.clone(), dropped.clone()]);
    tracker.recompute().await;
    assert_eq!(tracker.unread_count(&dropped), 1);

    tracker.set_conversations([kept.clone()]);
    let snapshot = tracker.recompute().await;

    assert!(!snapshot.contains_key(&dropped));
    assert_eq!(tracker.unread_count(&dropped), 0);
    assert_eq!(tracker.unread_count(&kept), 1);
}

#[tokio::test]
async fn test_mark_during_pass_is_not_overwritten() {
    let conversation = ConversationId::from("group-1");
    let gated = Arc::new(GatedSource {
        inner: ScriptedSource::with("group-1", vec![message("b", FRIEND, offset(t0(), 1))]),
        started: Notify::new(),
        release: Notify::new(),
    });
    let clock = FixedClock::at(offset(t0(), 10));
    let tracker = Arc::new(tracker_for(
        ME,
        Arc::new(MemoryStore::new()),
        gated.clone(),
        clock,
    ));
    tracker.set_conversations([conversation.clone()]);

    let pass = {
        let tracker = Arc::clone(&tracker);
        tokio::spawn(async move { tracker.recompute().await })
    };
    gated.started.notified().await;
    tracker.mark_as_read(&conversation).unwrap();
    gated.release.notify_one();
    let snapshot = pass.await.unwrap();

    assert_eq!(snapshot.get(&conversation), Some(&0));
    assert_eq!(tracker.unread_count(&conversation), 0);
}

#[test]
fn test_watermarks_are_isolated_per_user() {
    let conversation = ConversationId::from("group-1");
    let store = Arc::new(MemoryStore::new());
    let source: Arc<dyn MessageSource> = Arc::new(ScriptedSource::default());
    let u1 = tracker_for("u1", store.clone(), source.clone(), FixedClock::at(t0()));
    u1.mark_as_read(&conversation).unwrap();
    let u1_raw = store.get(&watermark_key("u1")).unwrap();

    let u2 = tracker_for("u2", store.clone(), source, FixedClock::at(offset(t0(), 30)));
    assert_eq!(u2.watermark(&conversation).unwrap(), None);
    u2.mark_as_read(&conversation).unwrap();

    assert_eq!(store.get(&watermark_key("u1")).unwrap(), u1_raw);
    assert_eq!(u1.watermark(&conversation).unwrap(), Some(t0()));
    assert_eq!(u2.watermark(&conversation).unwrap(), Some(offset(t0(), 30)));
}

#[test]
fn test_watermark_persists_across_tracker_instances() {
    let conversation = ConversationId::from("group-1");
    let store = Arc::new(MemoryStore::new());
    let source: Arc<dyn MessageSource> = Arc::new(ScriptedSource::default());
    tracker_for(ME, store.clone(), source.clone(), FixedClock::at(t0()))
        .mark_as_read(&conversation)
        .unwrap();

    let reopened = tracker_for(ME, store, source, FixedClock::at(offset(t0(), 99)));

    assert_eq!(reopened.watermark(&conversation).unwrap(), Some(t0()));
}

#[tokio::test]
async fn test_subscribers_see_each_pass() {
    let conversation = ConversationId::from("group-1");
    let source = ScriptedSource::with("group-1", vec![message("b", FRIEND, offset(t0(), 1))]);
    let tracker = tracker_for(ME, Arc::new(MemoryStore::new()), source, FixedClock::at(t0()));
    tracker.set_conversations([conversation.clone()]);
    let mut updates = tracker.subscribe();

    tracker.recompute().await;

    assert!(updates.has_changed().unwrap());
    assert_eq!(updates.borrow_and_update().get(&conversation), Some(&1));
}

#[tokio::test]
async fn test_polling_runs_immediately_and_stops_when_set_empties() {
    let conversation = ConversationId::from("group-1");
    let source = ScriptedSource::with("group-1", vec![message("b", FRIEND, offset(t0(), 1))]);
    let tracker = Arc::new(tracker_for(
        ME,
        Arc::new(MemoryStore::new()),
        source.clone(),
        FixedClock::at(t0()),
    ));
    tracker.set_conversations([conversation.clone()]);
    let mut updates = tracker.subscribe();

    let handle = tracker.spawn_polling(Duration::from_secs(3600));
    tokio::time::timeout(Duration::from_secs(5), updates.changed())
        .await
        .expect("first pass should run immediately")
        .unwrap();
    assert_eq!(tracker.unread_count(&conversation), 1);

    tracker.set_conversations(Vec::new());
    tokio::time::timeout(Duration::from_secs(5), async {
        while handle.is_running() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("poller should exit once nothing is tracked");
}

#[tokio::test]
async fn test_dropping_handle_cancels_polling() {
    let source = ScriptedSource::with("group-1", Vec::new());
    let tracker = Arc::new(tracker_for(
        ME,
        Arc::new(MemoryStore::new()),
        source.clone(),
        FixedClock::at(t0()),
    ));
    tracker.set_conversations([ConversationId::from("group-1")]);

    let handle = tracker.spawn_polling(Duration::from_millis(5));
    tokio::time::sleep(Duration::from_millis(30)).await;
    drop(handle);
    tokio::time::sleep(Duration::from_millis(20)).await;
    let after_drop = source.calls.load(Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(after_drop > 0);
    assert_eq!(source.calls.load(Ordering::SeqCst), after_drop);
}

#[tokio::test]
async fn test_shutdown_waits_for_loop_exit() {
    let source = ScriptedSource::with("group-1", Vec::new());
    let tracker = Arc::new(tracker_for(
        ME,
        Arc::new(MemoryStore::new()),
        source,
        FixedClock::at(t0()),
    ));
    tracker.set_conversations([ConversationId::from("group-1")]);

    let handle = tracker.spawn_polling(Duration::from_secs(3600));
    handle.shutdown().await;
}

#[test]
fn test_count_unread_boundary_is_strict() {
    let messages = vec![
        message("equal", FRIEND, t0()),
        message("after", FRIEND, offset(t0(), 1)),
    ];
    assert_eq!(count_unread(&messages, ME, t0()), 1);
    assert_eq!(count_unread(&messages, FRIEND, Timestamp::EPOCH), 0);
}

#[tokio::test]
async fn test_slow_conversation_does_not_hold_back_others() {
    let slow = ConversationId::from("group-1");
    let fast = ConversationId::from("group-2");
    let inner = ScriptedSource::with("group-1", vec![message("a", FRIEND, offset(t0(), 1))]);
    inner.put("group-2", vec![message("b", FRIEND, offset(t0(), 1))]);
    let source = Arc::new(SlowConversationSource {
        inner,
        slow: slow.clone(),
        started: Notify::new(),
        release: Notify::new(),
    });
    let tracker = Arc::new(tracker_for(
        ME,
        Arc::new(MemoryStore::new()),
        source.clone(),
        FixedClock::at(t0()),
    ));
    tracker.set_conversations([slow.clone(), fast.clone()]);

    let pass = {
        let tracker = Arc::clone(&tracker);
        tokio::spawn(async move { tracker.recompute().await })
    };
    source.started.notified().await;
    tokio::time::timeout(Duration::from_secs(5), async {
        while tracker.unread_count(&fast) != 1 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("fast conversation should be counted while the slow fetch is pending");
    assert!(!pass.is_finished());
    assert_eq!(tracker.unread_count(&slow), 0);

    source.release.notify_one();
    let snapshot = pass.await.unwrap();

    assert_eq!(snapshot.get(&slow), Some(&1));
    assert_eq!(snapshot.get(&fast), Some(&1));
}

#[tokio::test]
async fn test_zero_poll_interval_still_polls() {
    let conversation = ConversationId::from("group-1");
    let source = ScriptedSource::with("group-1", vec![message("b", FRIEND, offset(t0(), 1))]);
    let tracker = Arc::new(tracker_for(
        ME,
        Arc::new(MemoryStore::new()),
        source,
        FixedClock::at(t0()),
    ));
    tracker.set_conversations([conversation.clone()]);
    let mut updates = tracker.subscribe();

    let handle = tracker.spawn_polling(Duration::ZERO);
    tokio::time::timeout(Duration::from_secs(5), updates.changed())
        .await
        .expect("a pass should run")
        .unwrap();

    assert_eq!(tracker.unread_count(&conversation), 1);
    assert!(handle.is_running());
    handle.shutdown().await;
}

#[tokio::test]
async fn test_polling_start_runs_a_single_pass() {
    let source = ScriptedSource::with("group-1", Vec::new());
    let tracker = Arc::new(tracker_for(
        ME,
        Arc::new(MemoryStore::new()),
        source.clone(),
        FixedClock::at(t0()),
    ));
    tracker.set_conversations([ConversationId::from("group-1")]);
    let mut updates = tracker.subscribe();

    let handle = tracker.spawn_polling(Duration::from_secs(3600));
    tokio::time::timeout(Duration::from_secs(5), updates.changed())
        .await
        .expect("first pass should run immediately")
        .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    handle.shutdown().await;
}

#[tokio::test]
async fn test_backend_local_stamp_before_mark_is_read() {
    let conversation = ConversationId::from("group-1");
    let written = (chrono::Local::now() - chrono::Duration::seconds(1))
        .naive_local()
        .format("%Y-%m-%dT%H:%M:%S%.6f")
        .to_string();
    let created_at = Timestamp::parse(&written).unwrap();
    let source = ScriptedSource::with("group-1", vec![message("b", FRIEND, created_at)]);
    let tracker = ReadTracker::new(ME, Arc::new(MemoryStore::new()), source);
    tracker.set_conversations([conversation.clone()]);

    tracker.mark_as_read(&conversation).unwrap();
    tracker.recompute().await;

    assert_eq!(tracker.unread_count(&conversation), 0);
}
