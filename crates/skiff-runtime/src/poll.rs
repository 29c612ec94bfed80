//! The long-poll loop.
//!
//! ```text
//!            ┌──────────── cancelled? ─────────────┐
//!            ▼                                     │
//!   fetch_events(poll_time, cursor) ──Err──▶ backoff sleep
//!            │ Ok(batch)                           ▲
//!            ▼                                     │
//!   cursor = max(cursor, max eventId)              │
//!   sort batch by eventId                          │
//!   decode + dispatch each event in turn ──────────┘
//! ```
//!
//! Fetch failures never end the loop; only cancellation does. Cancellation is
//! observed before and during a fetch and during backoff, never while an
//! event is being dispatched.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use parking_lot::RwLock;
use skiff_core::{BoxedTransport, Event, RawEvent, TransportError, TransportResult};
use skiff_framework::Dispatcher;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// A dispatcher that can be swapped while the loop runs.
///
/// The loop takes a snapshot per event, so replacing the inner `Arc` takes
/// effect from the next event.
pub type SharedDispatcher = Arc<RwLock<Arc<Dispatcher>>>;

/// Highest event id seen so far, shared between a bot and its poll task.
///
/// Starts at 0, meaning "from now on" for the server.
#[derive(Debug, Clone, Default)]
pub struct PollCursor(Arc<AtomicI64>);

impl PollCursor {
    pub fn new(last_event_id: i64) -> Self {
        Self(Arc::new(AtomicI64::new(last_event_id)))
    }

    pub fn get(&self) -> i64 {
        self.0.load(Ordering::Acquire)
    }

    /// Moves the cursor to `event_id` if that is larger. Never decreases.
    pub fn advance_to(&self, event_id: i64) {
        self.0.fetch_max(event_id, Ordering::AcqRel);
    }

    /// Overwrites the cursor, e.g. to resume from a persisted position.
    pub fn set(&self, event_id: i64) {
        self.0.store(event_id, Ordering::Release);
    }
}

/// Shortest wait after a failed fetch, whatever the policy says.
pub const MIN_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Exponential backoff parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
}

impl RetryPolicy {
    fn bound(&self, delay: Duration) -> Duration {
        delay.min(self.max_delay).max(MIN_RETRY_DELAY)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }
}

/// Timing of the poll loop.
#[derive(Debug, Clone, PartialEq)]
pub struct PollSettings {
    /// How long the server may hold a poll request.
    pub poll_time: Duration,
    /// Slack on top of `poll_time` before a fetch is abandoned.
    pub request_timeout: Duration,
    pub retry: RetryPolicy,
    /// Minimum wait after the server rejected the token.
    pub credential_delay: Duration,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            poll_time: Duration::from_secs(60),
            request_timeout: Duration::from_secs(20),
            retry: RetryPolicy::default(),
            credential_delay: Duration::from_secs(5),
        }
    }
}

/// Delay sequence for consecutive failures.
///
/// Delays never drop below [`MIN_RETRY_DELAY`], so a zeroed policy cannot
/// make the loop spin.
#[derive(Debug, Clone)]
pub struct Backoff {
    policy: RetryPolicy,
    next: Duration,
}

impl Backoff {
    pub fn new(policy: RetryPolicy) -> Self {
        let next = policy.bound(policy.initial_delay);
        Self { policy, next }
    }

    /// Returns the delay for this failure and grows the next one.
    pub fn next_delay(&mut self) -> Duration {
        let current = self.next;
        let grown = Duration::try_from_secs_f64(current.as_secs_f64() * self.policy.multiplier)
            .unwrap_or(self.policy.max_delay);
        self.next = self.policy.bound(grown);
        current
    }

    /// Starts over after a success.
    pub fn reset(&mut self) {
        self.next = self.policy.bound(self.policy.initial_delay);
    }
}

/// Fetches events and feeds them to the dispatcher until cancelled.
pub struct PollLoop {
    transport: BoxedTransport,
    dispatcher: SharedDispatcher,
    settings: PollSettings,
    cursor: PollCursor,
}

impl PollLoop {
    pub fn new(
        transport: BoxedTransport,
        dispatcher: SharedDispatcher,
        settings: PollSettings,
        cursor: PollCursor,
    ) -> Self {
        Self {
            transport,
            dispatcher,
            settings,
            cursor,
        }
    }

    pub fn cursor(&self) -> &PollCursor {
        &self.cursor
    }

    /// Runs until `cancel` fires.
    pub async fn run(self, cancel: CancellationToken) {
        info!(last_event_id = self.cursor.get(), "Polling started");
        let mut backoff = Backoff::new(self.settings.retry.clone());

        loop {
            let fetched = tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                result = self.fetch() => result,
            };

            match fetched {
                Ok(batch) => {
                    backoff.reset();
                    self.process_batch(batch).await;
                }
                Err(e) => {
                    let mut delay = backoff.next_delay();
                    if e.is_invalid_credential() {
                        delay = delay.max(self.settings.credential_delay);
                        error!(error = %e, delay_ms = delay.as_millis() as u64, "Bot token rejected, retrying");
                    } else {
                        warn!(error = %e, delay_ms = delay.as_millis() as u64, "Polling failed, retrying");
                    }

                    tokio::select! {
                        biased;
                        () = cancel.cancelled() => break,
                        () = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }

        info!(last_event_id = self.cursor.get(), "Polling stopped");
    }

    /// Fetches and dispatches a single batch.
    pub async fn poll_once(&self) -> TransportResult<usize> {
        let batch = self.fetch().await?;
        Ok(self.process_batch(batch).await)
    }

    async fn fetch(&self) -> TransportResult<Vec<RawEvent>> {
        let limit = self.settings.poll_time + self.settings.request_timeout;
        let request = self
            .transport
            .fetch_events(self.settings.poll_time, self.cursor.get());

        match tokio::time::timeout(limit, request).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout(limit)),
        }
    }

    /// Advances the cursor and dispatches the batch in event id order.
    /// Returns the number of events dispatched.
    async fn process_batch(&self, mut batch: Vec<RawEvent>) -> usize {
        if batch.is_empty() {
            return 0;
        }

        if let Some(max_id) = batch.iter().map(|raw| raw.event_id).max() {
            self.cursor.advance_to(max_id);
        }
        batch.sort_by_key(|raw| raw.event_id);

        debug!(
            count = batch.len(),
            last_event_id = self.cursor.get(),
            "Received events"
        );

        let mut dispatched = 0;
        for raw in batch {
            let event_id = raw.event_id;
            let event = match Event::from_raw(raw) {
                Ok(event) => event,
                Err(e) => {
                    warn!(event_id, error = %e, "Skipping undecodable event");
                    continue;
                }
            };

            let dispatcher = Arc::clone(&*self.dispatcher.read());
            dispatcher
                .dispatch(event, Arc::clone(&self.transport))
                .await;
            dispatched += 1;
        }
        dispatched
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::{Value, json};
    use skiff_core::{Params, Transport};
    use skiff_framework::{EventCache, Handler};
    use std::collections::VecDeque;

    /// Serves scripted replies, then blocks until cancelled.
    #[derive(Default)]
    struct ScriptedTransport {
        replies: parking_lot::Mutex<VecDeque<TransportResult<Vec<RawEvent>>>>,
        cursors: parking_lot::Mutex<Vec<i64>>,
    }

    impl ScriptedTransport {
        fn new(replies: Vec<TransportResult<Vec<RawEvent>>>) -> Arc<Self> {
            Arc::new(Self {
                replies: parking_lot::Mutex::new(replies.into()),
                cursors: parking_lot::Mutex::default(),
            })
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn fetch_events(
            &self,
            _poll_time: Duration,
            last_event_id: i64,
        ) -> TransportResult<Vec<RawEvent>> {
            self.cursors.lock().push(last_event_id);
            let reply = self.replies.lock().pop_front();
            match reply {
                Some(reply) => reply,
                None => futures::future::pending().await,
            }
        }

        async fn call_api(&self, _method: &str, _params: Params) -> TransportResult<Value> {
            Ok(json!({"ok": true}))
        }
    }

    fn new_message(event_id: i64, msg_id: &str, text: &str) -> RawEvent {
        RawEvent::new(
            event_id,
            "newMessage",
            json!({
                "msgId": msg_id,
                "chat": {"chatId": "c1", "type": "private"},
                "from": {"userId": "u1"},
                "text": text,
            }),
        )
    }

    fn recording_dispatcher(dispatcher: Dispatcher) -> (SharedDispatcher, Arc<parking_lot::Mutex<Vec<i64>>>) {
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let log = Arc::clone(&seen);
        let dispatcher = dispatcher.with(Handler::new().handler(move |ctx| {
            let log = Arc::clone(&log);
            async move { log.lock().push(ctx.event().event_id()) }
        }));
        (Arc::new(RwLock::new(Arc::new(dispatcher))), seen)
    }

    fn poll_loop(transport: Arc<ScriptedTransport>, dispatcher: SharedDispatcher) -> PollLoop {
        PollLoop::new(transport, dispatcher, PollSettings::default(), PollCursor::default())
    }

    #[tokio::test]
    async fn test_cursor_takes_max_and_batch_is_sorted() {
        let transport = ScriptedTransport::new(vec![Ok(vec![
            new_message(5, "a", "five"),
            new_message(2, "b", "two"),
            new_message(9, "c", "nine"),
            new_message(3, "d", "three"),
        ])]);
        let (dispatcher, seen) = recording_dispatcher(Dispatcher::new());
        let poll = poll_loop(transport.clone(), dispatcher);

        assert_eq!(poll.poll_once().await.unwrap(), 4);
        assert_eq!(poll.cursor().get(), 9);
        assert_eq!(*seen.lock(), vec![2, 3, 5, 9]);
        assert_eq!(*transport.cursors.lock(), vec![0]);
    }

    #[tokio::test]
    async fn test_cursor_never_moves_backwards() {
        let transport = ScriptedTransport::new(vec![Ok(vec![new_message(4, "a", "x")])]);
        let (dispatcher, _) = recording_dispatcher(Dispatcher::new());
        let poll = PollLoop::new(
            transport.clone(),
            dispatcher,
            PollSettings::default(),
            PollCursor::new(10),
        );

        poll.poll_once().await.unwrap();
        assert_eq!(poll.cursor().get(), 10);
        assert_eq!(*transport.cursors.lock(), vec![10]);
    }

    #[tokio::test]
    async fn test_redelivered_event_in_batch_is_suppressed() {
        let transport = ScriptedTransport::new(vec![Ok(vec![
            new_message(7, "m7", "hello"),
            new_message(7, "m7", "hello"),
        ])]);
        let (dispatcher, seen) =
            recording_dispatcher(Dispatcher::with_duplicate_guard(EventCache::default()));
        let poll = poll_loop(transport, dispatcher);

        poll.poll_once().await.unwrap();
        assert_eq!(*seen.lock(), vec![7]);
        assert_eq!(poll.cursor().get(), 7);
    }

    #[tokio::test]
    async fn test_redelivery_across_batches_is_suppressed() {
        let transport = ScriptedTransport::new(vec![
            Ok(vec![new_message(7, "m7", "hello")]),
            Ok(vec![new_message(7, "m7", "hello")]),
        ]);
        let (dispatcher, seen) =
            recording_dispatcher(Dispatcher::with_duplicate_guard(EventCache::default()));
        let poll = poll_loop(transport.clone(), dispatcher);

        assert_eq!(poll.poll_once().await.unwrap(), 1);
        assert_eq!(poll.poll_once().await.unwrap(), 1);
        assert_eq!(*seen.lock(), vec![7]);
        assert_eq!(*transport.cursors.lock(), vec![0, 7]);
    }

    #[tokio::test]
    async fn test_undecodable_events_are_skipped() {
        let transport = ScriptedTransport::new(vec![Ok(vec![
            RawEvent::new(1, "typing", json!({})),
            RawEvent::new(2, "newMessage", json!("not an object")),
            new_message(3, "m3", "ok"),
        ])]);
        let (dispatcher, seen) = recording_dispatcher(Dispatcher::new());
        let poll = poll_loop(transport, dispatcher);

        assert_eq!(poll.poll_once().await.unwrap(), 1);
        assert_eq!(*seen.lock(), vec![3]);
        assert_eq!(poll.cursor().get(), 3);
    }

    #[tokio::test]
    async fn test_registration_applies_to_next_event() {
        let transport = ScriptedTransport::new(vec![
            Ok(vec![new_message(1, "a", "x")]),
            Ok(vec![new_message(2, "b", "y")]),
        ]);
        let (dispatcher, seen) = recording_dispatcher(Dispatcher::new());
        let poll = poll_loop(transport, Arc::clone(&dispatcher));

        poll.poll_once().await.unwrap();
        {
            let mut guard = dispatcher.write();
            Arc::make_mut(&mut *guard).clear();
        }
        poll.poll_once().await.unwrap();
        assert_eq!(*seen.lock(), vec![1]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_is_bounded() {
        let transport = ScriptedTransport::new(Vec::new());
        let (dispatcher, _) = recording_dispatcher(Dispatcher::new());
        let settings = PollSettings {
            poll_time: Duration::from_secs(1),
            request_timeout: Duration::from_secs(2),
            ..Default::default()
        };
        let poll = PollLoop::new(transport, dispatcher, settings, PollCursor::default());

        let result = poll.poll_once().await;
        assert!(matches!(result, Err(TransportError::Timeout(d)) if d == Duration::from_secs(3)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_errors_back_off_and_retry() {
        let transport = ScriptedTransport::new(vec![
            Err(TransportError::Network("connection reset".to_string())),
            Err(TransportError::invalid_credential("bad token")),
            Ok(vec![new_message(1, "a", "x")]),
        ]);
        let (dispatcher, seen) = recording_dispatcher(Dispatcher::new());
        let poll = poll_loop(transport.clone(), dispatcher);
        let cursor = poll.cursor().clone();

        let cancel = CancellationToken::new();
        let task = tokio::spawn(poll.run(cancel.clone()));

        // 1s network backoff, then max(2s, 5s) credential backoff
        tokio::time::sleep(Duration::from_millis(5900)).await;
        assert_eq!(transport.cursors.lock().len(), 2);
        assert!(seen.lock().is_empty());

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(*seen.lock(), vec![1]);
        assert_eq!(cursor.get(), 1);

        cancel.cancel();
        task.await.unwrap();
        assert_eq!(*transport.cursors.lock(), vec![0, 0, 0, 1]);
    }

    #[tokio::test]
    async fn test_cancel_interrupts_pending_fetch() {
        let transport = ScriptedTransport::new(Vec::new());
        let (dispatcher, _) = recording_dispatcher(Dispatcher::new());
        let poll = poll_loop(transport, dispatcher);

        let cancel = CancellationToken::new();
        let task = tokio::spawn(poll.run(cancel.clone()));
        tokio::task::yield_now().await;
        cancel.cancel();

        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("loop stops promptly")
            .unwrap();
    }

    #[test]
    fn test_backoff_sequence() {
        let mut backoff = Backoff::new(RetryPolicy::default());
        let delays: Vec<u64> = (0..7).map(|_| backoff.next_delay().as_secs()).collect();
        assert_eq!(delays, vec![1, 2, 4, 8, 16, 30, 30]);

        backoff.reset();
        assert_eq!(backoff.next_delay(), Duration::from_secs(1));
    }

    #[test]
    fn test_zeroed_policy_keeps_minimum_delay() {
        let mut backoff = Backoff::new(RetryPolicy {
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            multiplier: 0.0,
        });
        for _ in 0..3 {
            assert_eq!(backoff.next_delay(), MIN_RETRY_DELAY);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_zeroed_settings_do_not_spin() {
        let transport = ScriptedTransport::new(
            (0..50)
                .map(|_| Err(TransportError::invalid_credential("bad token")))
                .collect(),
        );
        let (dispatcher, _) = recording_dispatcher(Dispatcher::new());
        let settings = PollSettings {
            retry: RetryPolicy {
                initial_delay: Duration::ZERO,
                max_delay: Duration::ZERO,
                multiplier: 1.0,
            },
            credential_delay: Duration::ZERO,
            ..Default::default()
        };
        let poll = PollLoop::new(transport.clone(), dispatcher, settings, PollCursor::default());

        let cancel = CancellationToken::new();
        let task = tokio::spawn(poll.run(cancel.clone()));
        tokio::time::sleep(Duration::from_millis(250)).await;
        cancel.cancel();
        task.await.unwrap();

        assert_eq!(transport.cursors.lock().len(), 3);
    }
}
