//! The embedding surface: a bot owning a transport, a dispatcher and at most
//! one poll task.
//!
//! ```rust,ignore
//! let bot = Bot::new(transport);
//! bot.register(on_help().handler(|ctx| async move { ctx.reply("...").await }));
//! bot.run_until_signal().await?;
//! ```

use std::future::Future;
use std::sync::Arc;

use parking_lot::RwLock;
use skiff_core::BoxedTransport;
use skiff_framework::{CacheConfig, Dispatcher, EventCache, Handler};
use tokio::signal;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::error::{RuntimeError, RuntimeResult};
use crate::poll::{PollCursor, PollLoop, PollSettings, SharedDispatcher};

/// Whether the poll task is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BotStatus {
    Idle,
    Running,
}

impl std::fmt::Display for BotStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Running => write!(f, "Running"),
        }
    }
}

enum Lifecycle {
    Idle,
    Running {
        cancel: CancellationToken,
        task: JoinHandle<()>,
    },
}

/// A chat bot: handlers plus a long-poll task feeding them.
///
/// Handlers may be registered and removed at any time, including while the
/// bot is running; changes apply from the next event. `start` and `stop`
/// are idempotent and the poll position survives a restart.
pub struct Bot {
    transport: BoxedTransport,
    dispatcher: SharedDispatcher,
    settings: PollSettings,
    cursor: PollCursor,
    lifecycle: Mutex<Lifecycle>,
}

impl Bot {
    /// Creates a bot with default poll settings and duplicate suppression.
    pub fn new(transport: BoxedTransport) -> Self {
        Self::builder(transport).build()
    }

    pub fn builder(transport: BoxedTransport) -> BotBuilder {
        BotBuilder {
            transport,
            settings: PollSettings::default(),
            cache: Some(CacheConfig::default()),
            last_event_id: 0,
        }
    }

    /// Creates a bot talking HTTP to the API described by `config`.
    #[cfg(feature = "http-client")]
    pub fn from_config(config: &crate::config::SkiffConfig) -> RuntimeResult<Self> {
        use skiff_transport::{HttpConfig, HttpTransport};

        crate::config::validate_config(config)?;

        let http = HttpConfig {
            api_url: config.bot.api_url.clone(),
            token: config.bot.token.clone(),
            request_timeout: std::time::Duration::from_secs(config.polling.request_timeout_secs),
            app_name: config.bot.name.clone(),
            app_version: config.bot.version.clone(),
        };
        let transport =
            HttpTransport::new(http).map_err(|e| RuntimeError::Transport(e.to_string()))?;

        let mut builder =
            Self::builder(Arc::new(transport)).poll_settings(config.polling.to_settings());
        builder = if config.cache.enabled {
            builder.cache(config.cache.to_cache_config())
        } else {
            builder.without_duplicate_guard()
        };
        Ok(builder.build())
    }

    /// Returns the transport handlers talk through.
    pub fn transport(&self) -> &BoxedTransport {
        &self.transport
    }

    /// Returns the highest event id received so far.
    pub fn last_event_id(&self) -> i64 {
        self.cursor.get()
    }

    pub fn poll_settings(&self) -> &PollSettings {
        &self.settings
    }

    /// Returns a snapshot of the current handlers.
    pub fn dispatcher(&self) -> Arc<Dispatcher> {
        Arc::clone(&*self.dispatcher.read())
    }

    fn update<R>(&self, f: impl FnOnce(&mut Dispatcher) -> R) -> R {
        let mut guard = self.dispatcher.write();
        f(Arc::make_mut(&mut *guard))
    }

    /// Appends a handler. Returns it so it can later be unregistered.
    pub fn register(&self, handler: Handler) -> Handler {
        debug!(handler = ?handler.get_name(), "Registering handler");
        self.update(|d| d.add(handler.clone()));
        handler
    }

    /// Inserts a handler at `index`, ahead of later registrations.
    pub fn register_at(&self, index: usize, handler: Handler) -> Handler {
        debug!(handler = ?handler.get_name(), index, "Registering handler");
        self.update(|d| d.insert(index, handler.clone()));
        handler
    }

    /// Removes a handler. Returns `false` if it was not registered.
    pub fn unregister(&self, handler: &Handler) -> bool {
        self.update(|d| d.remove(handler))
    }

    pub async fn status(&self) -> BotStatus {
        match &*self.lifecycle.lock().await {
            Lifecycle::Running { task, .. } if !task.is_finished() => BotStatus::Running,
            _ => BotStatus::Idle,
        }
    }

    pub async fn is_running(&self) -> bool {
        self.status().await == BotStatus::Running
    }

    /// Spawns the poll task. Does nothing if it is already running.
    ///
    /// If an earlier `stop` was abandoned before the task finished, that
    /// task is awaited first so that at most one poll loop ever runs.
    pub async fn start(&self) {
        let mut lifecycle = self.lifecycle.lock().await;
        if let Lifecycle::Running { cancel, task } = &mut *lifecycle {
            if !cancel.is_cancelled() && !task.is_finished() {
                debug!("Bot already running");
                return;
            }
            cancel.cancel();
            join(task).await;
        }

        let cancel = CancellationToken::new();
        let poll = PollLoop::new(
            Arc::clone(&self.transport),
            Arc::clone(&self.dispatcher),
            self.settings.clone(),
            self.cursor.clone(),
        );
        let task = tokio::spawn(poll.run(cancel.clone()));
        *lifecycle = Lifecycle::Running { cancel, task };

        info!(last_event_id = self.cursor.get(), "Bot started");
    }

    /// Cancels the poll task and waits for it to finish. Does nothing if the
    /// bot is idle.
    ///
    /// An event being dispatched when `stop` is called is finished first.
    /// The bot reports [`BotStatus::Running`] until the task has ended, even
    /// if this future is dropped early.
    pub async fn stop(&self) {
        let mut lifecycle = self.lifecycle.lock().await;
        let Lifecycle::Running { cancel, task } = &mut *lifecycle else {
            debug!("Bot not running");
            return;
        };

        cancel.cancel();
        join(task).await;
        *lifecycle = Lifecycle::Idle;

        info!(last_event_id = self.cursor.get(), "Bot stopped");
    }

    /// Starts the bot, waits for `shutdown`, then stops it.
    pub async fn run_until<F>(&self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        self.start().await;
        shutdown.await;
        self.stop().await;
    }

    /// Starts the bot and runs until Ctrl+C or SIGTERM.
    pub async fn run_until_signal(&self) -> RuntimeResult<()> {
        self.start().await;
        info!("Bot is now running. Press Ctrl+C to stop.");

        let waited = wait_for_shutdown().await;
        self.stop().await;
        waited
    }
}

impl std::fmt::Debug for Bot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bot")
            .field("handlers", &self.dispatcher.read().len())
            .field("settings", &self.settings)
            .field("last_event_id", &self.cursor.get())
            .finish_non_exhaustive()
    }
}

async fn join(task: &mut JoinHandle<()>) {
    if let Err(e) = task.await {
        error!(error = %e, "Poll task ended abnormally");
    }
}

/// Waits for shutdown signals (Ctrl+C or SIGTERM).
async fn wait_for_shutdown() -> RuntimeResult<()> {
    #[cfg(unix)]
    {
        let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())
            .map_err(RuntimeError::Signal)?;

        tokio::select! {
            result = signal::ctrl_c() => {
                result.map_err(RuntimeError::Signal)?;
                info!("Received Ctrl+C, shutting down");
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM, shutting down");
            }
        }
    }

    #[cfg(not(unix))]
    {
        signal::ctrl_c().await.map_err(RuntimeError::Signal)?;
        info!("Received Ctrl+C, shutting down");
    }

    Ok(())
}

/// Configures a [`Bot`].
pub struct BotBuilder {
    transport: BoxedTransport,
    settings: PollSettings,
    cache: Option<CacheConfig>,
    last_event_id: i64,
}

impl BotBuilder {
    pub fn poll_settings(mut self, settings: PollSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Sizes the duplicate-suppression cache.
    pub fn cache(mut self, config: CacheConfig) -> Self {
        self.cache = Some(config);
        self
    }

    /// Delivers re-sent messages again instead of suppressing them.
    pub fn without_duplicate_guard(mut self) -> Self {
        self.cache = None;
        self
    }

    /// Resumes polling after `event_id` instead of from now.
    pub fn last_event_id(mut self, event_id: i64) -> Self {
        self.last_event_id = event_id;
        self
    }

    pub fn build(self) -> Bot {
        let dispatcher = match self.cache {
            Some(config) => Dispatcher::with_duplicate_guard(EventCache::new(config)),
            None => Dispatcher::new(),
        };

        Bot {
            transport: self.transport,
            dispatcher: Arc::new(RwLock::new(Arc::new(dispatcher))),
            settings: self.settings,
            cursor: PollCursor::new(self.last_event_id),
            lifecycle: Mutex::new(Lifecycle::Idle),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::{Value, json};
    use skiff_core::{Params, RawEvent, Transport, TransportResult};
    use skiff_framework::{on_command, on_default};
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Serves queued batches, then long-polls until cancelled. Records
    /// outbound texts.
    #[derive(Default)]
    struct MockTransport {
        batches: parking_lot::Mutex<VecDeque<Vec<RawEvent>>>,
        sent: parking_lot::Mutex<Vec<String>>,
        fetches: parking_lot::Mutex<Vec<i64>>,
    }

    impl MockTransport {
        fn with_batches(batches: Vec<Vec<RawEvent>>) -> Arc<Self> {
            Arc::new(Self {
                batches: parking_lot::Mutex::new(batches.into()),
                ..Default::default()
            })
        }

        fn push(&self, batch: Vec<RawEvent>) {
            self.batches.lock().push_back(batch);
        }
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn fetch_events(
            &self,
            poll_time: Duration,
            last_event_id: i64,
        ) -> TransportResult<Vec<RawEvent>> {
            self.fetches.lock().push(last_event_id);
            let batch = self.batches.lock().pop_front();
            match batch {
                Some(batch) => Ok(batch),
                None => {
                    tokio::time::sleep(poll_time).await;
                    Ok(Vec::new())
                }
            }
        }

        async fn call_api(&self, method: &str, params: Params) -> TransportResult<Value> {
            if method == "messages/sendText"
                && let Some((_, text)) = params.iter().find(|(k, _)| *k == "text")
            {
                self.sent.lock().push(text.clone());
            }
            Ok(json!({"ok": true}))
        }
    }

    fn text(event_id: i64, text: &str) -> RawEvent {
        RawEvent::new(
            event_id,
            "newMessage",
            json!({
                "msgId": format!("m{event_id}"),
                "chat": {"chatId": "c1", "type": "private"},
                "from": {"userId": "u1"},
                "text": text,
            }),
        )
    }

    fn fast_settings() -> PollSettings {
        PollSettings {
            poll_time: Duration::from_millis(20),
            request_timeout: Duration::from_millis(50),
            ..Default::default()
        }
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    #[tokio::test]
    async fn test_default_and_help_end_to_end() {
        let transport = MockTransport::with_batches(vec![vec![text(1, "/help"), text(2, "hello")]]);
        let bot = Bot::builder(transport.clone())
            .poll_settings(fast_settings())
            .build();

        bot.register(on_command(["help"]).handler(|ctx| async move { ctx.reply("help text").await }));
        bot.register(on_default().handler(|ctx| async move { ctx.reply("fallback").await }));

        bot.start().await;
        settle().await;
        bot.stop().await;

        assert_eq!(*transport.sent.lock(), vec!["help text", "fallback"]);
        assert_eq!(bot.last_event_id(), 2);
    }

    #[tokio::test]
    async fn test_start_and_stop_are_idempotent() {
        let transport = MockTransport::with_batches(Vec::new());
        let bot = Bot::builder(transport.clone())
            .poll_settings(fast_settings())
            .build();

        bot.stop().await;
        assert_eq!(bot.status().await, BotStatus::Idle);

        bot.start().await;
        bot.start().await;
        assert!(bot.is_running().await);

        bot.stop().await;
        bot.stop().await;
        assert!(!bot.is_running().await);
    }

    #[tokio::test]
    async fn test_cursor_survives_restart() {
        let transport = MockTransport::with_batches(vec![vec![text(4, "a"), text(6, "b")]]);
        let bot = Bot::builder(transport.clone())
            .poll_settings(fast_settings())
            .build();

        bot.start().await;
        settle().await;
        bot.stop().await;
        assert_eq!(bot.last_event_id(), 6);

        transport.fetches.lock().clear();
        bot.start().await;
        settle().await;
        bot.stop().await;
        assert_eq!(transport.fetches.lock().first(), Some(&6));
    }

    #[tokio::test]
    async fn test_register_while_running() {
        let transport = MockTransport::with_batches(Vec::new());
        let bot = Bot::builder(transport.clone())
            .poll_settings(fast_settings())
            .build();

        bot.start().await;
        let handler =
            bot.register(on_command(["ping"]).handler(|ctx| async move { ctx.reply("pong").await }));
        transport.push(vec![text(1, "/ping")]);
        settle().await;

        assert!(bot.unregister(&handler));
        assert!(!bot.unregister(&handler));
        transport.push(vec![text(2, "/ping")]);
        settle().await;
        bot.stop().await;

        assert_eq!(*transport.sent.lock(), vec!["pong"]);
    }

    #[tokio::test]
    async fn test_register_at_front() {
        let bot = Bot::new(MockTransport::with_batches(Vec::new()));
        let a = bot.register(Handler::new().name("a"));
        let b = bot.register_at(0, Handler::new().name("b"));

        let dispatcher = bot.dispatcher();
        let ids: Vec<_> = dispatcher.handlers().iter().map(Handler::id).collect();
        assert_eq!(ids, vec![b.id(), a.id()]);
        assert!(dispatcher.guard().is_some());
    }

    #[tokio::test]
    async fn test_builder_options() {
        let bot = Bot::builder(MockTransport::with_batches(Vec::new()))
            .without_duplicate_guard()
            .last_event_id(42)
            .build();
        assert!(bot.dispatcher().guard().is_none());
        assert_eq!(bot.last_event_id(), 42);
    }

    #[tokio::test]
    async fn test_run_until_stops_after_future() {
        let transport = MockTransport::with_batches(vec![vec![text(1, "/ping")]]);
        let bot = Bot::builder(transport.clone())
            .poll_settings(fast_settings())
            .build();
        bot.register(on_command(["ping"]).handler(|ctx| async move { ctx.reply("pong").await }));

        bot.run_until(tokio::time::sleep(Duration::from_millis(100)))
            .await;

        assert!(!bot.is_running().await);
        assert_eq!(*transport.sent.lock(), vec!["pong"]);
    }

    #[tokio::test]
    async fn test_abandoned_stop_never_overlaps_loops() {
        let transport = MockTransport::with_batches(vec![vec![text(1, "slow")]]);
        let bot = Bot::builder(transport.clone())
            .poll_settings(fast_settings())
            .build();

        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let invoked = Arc::new(AtomicUsize::new(0));
        bot.register(Handler::new().handler({
            let (active, peak, invoked) = (active.clone(), peak.clone(), invoked.clone());
            move |_| {
                let (active, peak, invoked) = (active.clone(), peak.clone(), invoked.clone());
                async move {
                    let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    invoked.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(150)).await;
                    active.fetch_sub(1, Ordering::SeqCst);
                }
            }
        }));

        bot.start().await;
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(invoked.load(Ordering::SeqCst), 1);

        let stopped = tokio::time::timeout(Duration::from_millis(10), bot.stop()).await;
        assert!(stopped.is_err());
        assert_eq!(bot.status().await, BotStatus::Running);

        transport.push(vec![text(2, "slow")]);
        bot.start().await;
        settle().await;
        settle().await;
        bot.stop().await;

        assert_eq!(peak.load(Ordering::SeqCst), 1);
        assert_eq!(invoked.load(Ordering::SeqCst), 2);
        assert_eq!(bot.status().await, BotStatus::Idle);
    }
}
