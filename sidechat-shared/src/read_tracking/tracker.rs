use std::{
    collections::{BTreeMap, BTreeSet},
    sync::{Arc, Mutex, PoisonError, RwLock},
    time::Duration,
};

use async_trait::async_trait;
use chrono::Utc;
use futures::{
    FutureExt,
    stream::{FuturesUnordered, StreamExt},
};
use metrics::counter;
use tokio::{
    sync::{Notify, watch},
    task::JoinHandle,
    time::MissedTickBehavior,
};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span, warn};

use super::{
    errors::{FetchError, StorageResult},
    store::{KeyValueStore, WatermarkStore},
};
use crate::models::{ConversationId, Message, Timestamp};

/// Default delay between two recomputation passes.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Shortest delay [`ReadTracker::spawn_polling`] accepts; shorter ones are
/// raised to it.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Lists the messages of one conversation.
#[async_trait]
pub trait MessageSource: Send + Sync {
    /// Every message currently in `conversation`, in any order.
    async fn list_messages(
        &self,
        conversation: &ConversationId,
    ) -> Result<Vec<Message>, FetchError>;
}

/// Source of the current instant.
pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}

/// Wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Timestamp(Utc::now())
    }
}

/// Behaviour switches for [`ReadTracker`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrackerOptions {
    /// Keep a conversation's previous count when its fetch fails, instead of
    /// reporting zero for that cycle.
    pub preserve_on_failure: bool,
}

/// Unread counts per conversation, as published after each pass.
pub type UnreadSnapshot = BTreeMap<ConversationId, usize>;

/// Counts the messages newer than `watermark` written by someone else.
#[must_use]
pub fn count_unread(messages: &[Message], user_id: &str, watermark: Timestamp) -> usize {
    messages
        .iter()
        .filter(|message| !message.is_authored_by(user_id) && message.created_at > watermark)
        .count()
}

/// Per-conversation last-read watermarks and unread counts for one user.
///
/// Watermarks only move on [`mark_as_read`](Self::mark_as_read) and are
/// persisted on every move. Counts are derived: each
/// [`recompute`](Self::recompute) pass replaces the whole cache, and
/// [`unread_count`](Self::unread_count) only ever reads that cache.
pub struct ReadTracker {
    user_id: String,
    watermarks: WatermarkStore,
    source: Arc<dyn MessageSource>,
    clock: Arc<dyn Clock>,
    options: TrackerOptions,
    conversations: RwLock<BTreeSet<ConversationId>>,
    // Guards every watermark write and every count write; never held across
    // an await.
    counts: Mutex<UnreadSnapshot>,
    updates: watch::Sender<UnreadSnapshot>,
    conversations_changed: Notify,
}

impl std::fmt::Debug for ReadTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadTracker")
            .field("user_id", &self.user_id)
            .field("watermarks", &self.watermarks)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl ReadTracker {
    /// Creates a tracker for `user_id` using the wall clock.
    pub fn new(
        user_id: impl Into<String>,
        store: Arc<dyn KeyValueStore>,
        source: Arc<dyn MessageSource>,
    ) -> Self {
        Self::with_clock(user_id, store, source, Arc::new(SystemClock))
    }

    /// Creates a tracker for `user_id` that stamps watermarks with `clock`.
    pub fn with_clock(
        user_id: impl Into<String>,
        store: Arc<dyn KeyValueStore>,
        source: Arc<dyn MessageSource>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let user_id = user_id.into();
        let (updates, _) = watch::channel(UnreadSnapshot::new());
        Self {
            watermarks: WatermarkStore::new(store, &user_id),
            user_id,
            source,
            clock,
            options: TrackerOptions::default(),
            conversations: RwLock::new(BTreeSet::new()),
            counts: Mutex::new(UnreadSnapshot::new()),
            updates,
            conversations_changed: Notify::new(),
        }
    }

    #[must_use]
    pub fn with_options(mut self, options: TrackerOptions) -> Self {
        self.options = options;
        self
    }

    #[must_use]
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Replaces the set of tracked conversations.
    ///
    /// A running poller recomputes immediately; an empty set stops it.
    pub fn set_conversations<I>(&self, conversations: I)
    where
        I: IntoIterator<Item = ConversationId>,
    {
        {
            let mut tracked = self
                .conversations
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            *tracked = conversations.into_iter().collect();
            debug!(user_id = %self.user_id, tracked = tracked.len(), "tracked conversations changed");
        }
        self.conversations_changed.notify_one();
    }

    #[must_use]
    pub fn conversations(&self) -> Vec<ConversationId> {
        self.conversations
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    fn has_conversations(&self) -> bool {
        !self
            .conversations
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_empty()
    }

    fn tracked(&self) -> BTreeSet<ConversationId> {
        self.conversations
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Marks `conversation` as read now.
    ///
    /// The cached count drops to zero before anything else happens. The
    /// watermark never moves backwards: if the stored one is later than the
    /// clock, it is kept.
    ///
    /// # Errors
    /// Returns the storage error when the watermark map cannot be read or
    /// persisted. The cached count is reset regardless.
    pub fn mark_as_read(&self, conversation: &ConversationId) -> StorageResult<Timestamp> {
        let mut counts = self.counts.lock().unwrap_or_else(PoisonError::into_inner);
        counts.insert(conversation.clone(), 0);
        self.updates.send_replace(counts.clone());

        let mut map = self.watermarks.load()?;
        let now = self.clock.now();
        let watermark = map.get(conversation).map_or(now, |previous| (*previous).max(now));
        map.insert(conversation.clone(), watermark);
        self.watermarks.save(&map)?;

        debug!(conversation = %conversation, watermark = %watermark.to_rfc3339(), "marked conversation as read");
        Ok(watermark)
    }

    /// Last computed unread count; zero for conversations never counted.
    #[must_use]
    pub fn unread_count(&self, conversation: &ConversationId) -> usize {
        self.counts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(conversation)
            .copied()
            .unwrap_or(0)
    }

    /// Copy of the whole count cache.
    #[must_use]
    pub fn snapshot(&self) -> UnreadSnapshot {
        self.counts.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    #[must_use]
    pub fn total_unread(&self) -> usize {
        self.snapshot().values().sum()
    }

    /// Watermark currently persisted for `conversation`.
    ///
    /// # Errors
    /// Returns the storage error when the map cannot be read.
    pub fn watermark(&self, conversation: &ConversationId) -> StorageResult<Option<Timestamp>> {
        Ok(self.watermarks.load()?.get(conversation).copied())
    }

    /// Receives a new snapshot after every pass and every mark.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<UnreadSnapshot> {
        self.updates.subscribe()
    }

    /// Runs one full recomputation pass and returns the new counts.
    ///
    /// Fetches run concurrently and each count is written as soon as its own
    /// fetch returns, so a slow conversation never holds back the others.
    /// Every write happens under the lock [`mark_as_read`](Self::mark_as_read)
    /// takes, against watermarks freshly read from storage, so a mark made
    /// during the pass is never overwritten by an older watermark. Once all
    /// fetches are back, conversations outside this pass's set are dropped
    /// and the result is published.
    pub async fn recompute(&self) -> UnreadSnapshot {
        let conversations = self.tracked();
        let span = info_span!("unread_pass", user_id = %self.user_id, conversations = conversations.len());
        self.recompute_tracked(conversations).instrument(span).await
    }

    async fn recompute_tracked(&self, conversations: BTreeSet<ConversationId>) -> UnreadSnapshot {
        let mut fetches: FuturesUnordered<_> = conversations
            .iter()
            .map(|conversation| async move {
                (conversation, self.source.list_messages(conversation).await)
            })
            .collect();

        let mut failures = 0_usize;
        while let Some((conversation, result)) = fetches.next().await {
            let mut counts = self.counts.lock().unwrap_or_else(PoisonError::into_inner);
            let count = match result {
                Ok(messages) => {
                    let watermark = self.current_watermark(conversation);
                    count_unread(&messages, &self.user_id, watermark)
                }
                Err(err) => {
                    failures += 1;
                    counter!("sidechat_unread_fetch_failures_total").increment(1);
                    warn!(conversation = %conversation, error = %err, "failed to fetch messages for unread count");
                    if self.options.preserve_on_failure {
                        counts.get(conversation).copied().unwrap_or(0)
                    } else {
                        0
                    }
                }
            };
            counts.insert(conversation.clone(), count);
        }

        let snapshot = {
            let mut counts = self.counts.lock().unwrap_or_else(PoisonError::into_inner);
            counts.retain(|conversation, _| conversations.contains(conversation));
            let snapshot = counts.clone();
            self.updates.send_replace(snapshot.clone());
            snapshot
        };
        info!(
            total = snapshot.values().sum::<usize>(),
            failures,
            "unread counts recomputed"
        );
        snapshot
    }

    fn current_watermark(&self, conversation: &ConversationId) -> Timestamp {
        match self.watermarks.load() {
            Ok(map) => map.get(conversation).copied().unwrap_or(Timestamp::EPOCH),
            Err(err) => {
                warn!(conversation = %conversation, error = %err, "failed to read watermarks; treating all as unread");
                Timestamp::EPOCH
            }
        }
    }

    /// Starts periodic recomputation on the current tokio runtime.
    ///
    /// The first pass runs immediately, then one per `interval` and one
    /// whenever the tracked set changes. The loop ends when the handle is
    /// stopped or dropped, or when the tracked set becomes empty. An
    /// `interval` below [`MIN_POLL_INTERVAL`] is raised to it.
    #[must_use]
    pub fn spawn_polling(self: &Arc<Self>, interval: Duration) -> PollingHandle {
        let token = CancellationToken::new();
        let cancelled = token.clone();
        let tracker = Arc::clone(self);
        if interval < MIN_POLL_INTERVAL {
            warn!(requested = ?interval, "poll interval too short; using the minimum");
        }
        let interval = interval.max(MIN_POLL_INTERVAL);

        let task = tokio::spawn(async move {
            // The immediate first pass already sees the current set.
            let _ = tracker.conversations_changed.notified().now_or_never();
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    () = cancelled.cancelled() => {
                        debug!("unread polling cancelled");
                        break;
                    }
                    _ = ticker.tick() => {}
                    () = tracker.conversations_changed.notified() => {}
                }
                if !tracker.has_conversations() {
                    debug!("no conversations tracked; stopping unread polling");
                    break;
                }
                tracker.recompute().await;
            }
        });

        PollingHandle {
            token,
            task: Some(task),
        }
    }
}

/// Owns a running poller; dropping it cancels the loop.
#[derive(Debug)]
pub struct PollingHandle {
    token: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl PollingHandle {
    /// Requests cancellation without waiting for the loop to exit.
    pub fn stop(&self) {
        self.token.cancel();
    }

    /// Whether the polling loop is still running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Cancels the loop and waits for an in-flight pass to finish.
    pub async fn shutdown(mut self) {
        self.token.cancel();
        if let Some(task) = self.task.take()
            && let Err(err) = task.await
        {
            warn!(error = %err, "unread polling task ended abnormally");
        }
    }
}

impl Drop for PollingHandle {
    fn drop(&mut self) {
        self.token.cancel();
    }
}
