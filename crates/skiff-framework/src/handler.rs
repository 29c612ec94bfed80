//! Handlers: an eligibility check paired with an action.
//!
//! A [`Handler`] is built from an optional set of event types, an optional
//! [`Filter`], an optional custom check and a [`Role`]. When the dispatcher
//! finds it eligible for an event it runs its action.
//!
//! Checks and actions report control flow through plain values rather than
//! errors:
//!
//! - [`Verdict`] from a check: `Skip`, `Eligible` or `Stop`
//! - [`Outcome`] from an action: `Continue` or `Stop`
//!
//! Real failures are [`HandlerError`]s and never stop dispatching.
//!
//! # Example
//!
//! ```rust,ignore
//! use skiff_framework::{Filter, Handler, Outcome};
//! use skiff_core::EventType;
//!
//! let handler = Handler::new()
//!     .name("greeter")
//!     .on(EventType::NewMessage)
//!     .filter(Filter::regex(r"(?i)\bhello\b")?)
//!     .handler(|ctx| async move {
//!         ctx.reply("Hi there!").await?;
//!         Ok::<_, HandlerError>(Outcome::Stop)
//!     });
//! ```

use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{Context as TaskContext, Poll};

use futures::FutureExt;
use futures::future::BoxFuture;
use serde_json::Value;
use skiff_core::{BoxedTransport, Event, EventType};
use tower::Service;

use crate::error::{HandlerError, HandlerResult};
use crate::filter::{Filter, command_name};

// ============================================================================
// Control flow values
// ============================================================================

/// Result of a handler check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Not interested in this event.
    Skip,
    /// Run this handler's action.
    Eligible,
    /// The event is fully handled; no later handler sees it.
    Stop,
}

/// Result of a handler action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Let later handlers see the event.
    Continue,
    /// The event is fully handled; no later handler sees it.
    Stop,
}

/// Conversion of action return values into an [`Outcome`].
pub trait IntoOutcome {
    fn into_outcome(self) -> HandlerResult<Outcome>;
}

impl IntoOutcome for () {
    fn into_outcome(self) -> HandlerResult<Outcome> {
        Ok(Outcome::Continue)
    }
}

impl IntoOutcome for Outcome {
    fn into_outcome(self) -> HandlerResult<Outcome> {
        Ok(self)
    }
}

impl<E: Into<HandlerError>> IntoOutcome for Result<(), E> {
    fn into_outcome(self) -> HandlerResult<Outcome> {
        self.map(|()| Outcome::Continue).map_err(Into::into)
    }
}

impl<E: Into<HandlerError>> IntoOutcome for Result<Outcome, E> {
    fn into_outcome(self) -> HandlerResult<Outcome> {
        self.map_err(Into::into)
    }
}

// ============================================================================
// Context
// ============================================================================

/// Everything an action gets to see: the event and a way to talk back.
pub struct Context {
    event: Event,
    transport: BoxedTransport,
}

impl Context {
    /// Creates a context for one dispatch.
    pub fn new(event: Event, transport: BoxedTransport) -> Self {
        Self { event, transport }
    }

    /// Returns the event being dispatched.
    pub fn event(&self) -> &Event {
        &self.event
    }

    /// Returns the transport for outbound calls.
    pub fn transport(&self) -> &BoxedTransport {
        &self.transport
    }

    /// Sends `text` to the chat the event came from.
    pub async fn reply(&self, text: &str) -> HandlerResult<()> {
        let chat_id = self.event.chat_id()?;
        self.transport.send_text(chat_id, text, None).await?;
        Ok(())
    }

    /// Answers the callback query this event carries.
    pub async fn answer(&self, text: Option<&str>, show_alert: bool) -> HandlerResult<Value> {
        let query_id = self.event.callback_query_id()?;
        Ok(self
            .transport
            .answer_callback_query(query_id, text, show_alert, None)
            .await?)
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("event", &self.event)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Handler
// ============================================================================

/// A type-erased custom check.
pub type CheckFn = Arc<dyn Fn(&Event) -> HandlerResult<Verdict> + Send + Sync>;

/// A type-erased action.
pub type Action = Arc<dyn Fn(Arc<Context>) -> BoxFuture<'static, HandlerResult<Outcome>> + Send + Sync>;

/// How the dispatcher treats a handler beyond its own check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Role {
    /// Eligible whenever its own check passes.
    Regular,
    /// Command handler for the given lower-cased names (empty = any command).
    Command(Vec<String>),
    /// Eligible only if no other non-fallback handler is; stops after running.
    Fallback,
    /// Eligible only if no command handler matches; stops after running.
    UnknownCommand,
}

impl Role {
    /// Creates a command role, normalising names to lower case.
    pub fn command<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::Command(
            names
                .into_iter()
                .map(|n| n.as_ref().to_lowercase())
                .collect(),
        )
    }

    /// Returns `true` for roles that end dispatching after their action.
    pub fn stops_after_handling(&self) -> bool {
        matches!(self, Self::Fallback | Self::UnknownCommand)
    }
}

/// Identity of a registered handler, stable across clones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

impl HandlerId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

#[derive(Clone)]
struct HandlerInner {
    id: HandlerId,
    name: Option<String>,
    event_types: Vec<EventType>,
    filter: Option<Filter>,
    check_fn: Option<CheckFn>,
    role: Role,
    action: Option<Action>,
}

/// A (check, action) pair registered with the dispatcher.
///
/// `Handler` is cheap to clone; clones share the same [`HandlerId`], which is
/// what [`Dispatcher::remove`](crate::Dispatcher::remove) matches on.
#[derive(Clone)]
pub struct Handler {
    inner: Arc<HandlerInner>,
}

impl Default for Handler {
    fn default() -> Self {
        Self::new()
    }
}

impl Handler {
    /// Creates a handler that matches every event and does nothing.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(HandlerInner {
                id: HandlerId::next(),
                name: None,
                event_types: Vec::new(),
                filter: None,
                check_fn: None,
                role: Role::Regular,
                action: None,
            }),
        }
    }

    /// Mutable access for the builder methods. A shared handler is copied
    /// and the copy gets a fresh id.
    fn inner_mut(&mut self) -> &mut HandlerInner {
        if Arc::get_mut(&mut self.inner).is_none() {
            let mut copy = (*self.inner).clone();
            copy.id = HandlerId::next();
            self.inner = Arc::new(copy);
        }
        Arc::make_mut(&mut self.inner)
    }

    /// Sets a name used in logs.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.inner_mut().name = Some(name.into());
        self
    }

    /// Restricts the handler to an event type. May be called repeatedly.
    pub fn on(mut self, event_type: EventType) -> Self {
        let types = &mut self.inner_mut().event_types;
        if !types.contains(&event_type) {
            types.push(event_type);
        }
        self
    }

    /// Adds a filter. A second call ANDs it with the existing one.
    pub fn filter(mut self, filter: Filter) -> Self {
        let inner = self.inner_mut();
        inner.filter = Some(match inner.filter.take() {
            Some(existing) => existing.and(filter),
            None => filter,
        });
        self
    }

    /// Sets a custom check, run after the event type and filter pass.
    pub fn check<F>(mut self, f: F) -> Self
    where
        F: Fn(&Event) -> HandlerResult<Verdict> + Send + Sync + 'static,
    {
        self.inner_mut().check_fn = Some(Arc::new(f));
        self
    }

    /// Sets the dispatcher role.
    pub fn role(mut self, role: Role) -> Self {
        self.inner_mut().role = role;
        self
    }

    /// Sets the action.
    pub fn handler<F, Fut, R>(mut self, f: F) -> Self
    where
        F: Fn(Arc<Context>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: IntoOutcome,
    {
        let action: Action = Arc::new(move |ctx| {
            let fut = f(ctx);
            Box::pin(async move { fut.await.into_outcome() })
        });
        self.inner_mut().action = Some(action);
        self
    }

    /// Sets a pre-built action.
    pub fn action_boxed(mut self, action: Action) -> Self {
        self.inner_mut().action = Some(action);
        self
    }

    pub fn id(&self) -> HandlerId {
        self.inner.id
    }

    pub fn get_name(&self) -> Option<&str> {
        self.inner.name.as_deref()
    }

    /// Name for log output.
    pub(crate) fn describe(&self) -> &str {
        self.inner.name.as_deref().unwrap_or("unnamed")
    }

    pub fn get_role(&self) -> &Role {
        &self.inner.role
    }

    pub fn event_types(&self) -> &[EventType] {
        &self.inner.event_types
    }

    /// Runs the handler's own check: event type, filter, command name and
    /// custom check, in that order.
    ///
    /// This does not include the cross-handler conditions of the
    /// [`Role::Fallback`] and [`Role::UnknownCommand`] roles; those are
    /// evaluated by the dispatcher.
    pub fn check_event(&self, event: &Event) -> HandlerResult<Verdict> {
        let inner = &self.inner;

        if !inner.event_types.is_empty() && !inner.event_types.contains(&event.event_type()) {
            return Ok(Verdict::Skip);
        }

        if let Some(filter) = &inner.filter
            && !filter.evaluate(event)
        {
            return Ok(Verdict::Skip);
        }

        if let Role::Command(names) = &inner.role
            && !names.is_empty()
        {
            let matched = event
                .text()
                .ok()
                .and_then(command_name)
                .is_some_and(|name| names.contains(&name));
            if !matched {
                return Ok(Verdict::Skip);
            }
        }

        match &inner.check_fn {
            Some(f) => f(event),
            None => Ok(Verdict::Eligible),
        }
    }

    /// [`check_event`](Self::check_event) with panics turned into errors.
    pub(crate) fn check_caught(&self, event: &Event) -> HandlerResult<Verdict> {
        panic::catch_unwind(AssertUnwindSafe(|| self.check_event(event)))
            .unwrap_or_else(|payload| Err(HandlerError::from_panic(payload.as_ref())))
    }

    /// Runs the action. Panics are turned into [`HandlerError::Panicked`].
    ///
    /// Handlers without an action return [`Outcome::Continue`]. Fallback and
    /// unknown-command handlers always return [`Outcome::Stop`] on success.
    pub async fn handle(&self, ctx: Arc<Context>) -> HandlerResult<Outcome> {
        let outcome = match &self.inner.action {
            Some(action) => {
                match AssertUnwindSafe(async { action(ctx).await })
                    .catch_unwind()
                    .await
                {
                    Ok(result) => result?,
                    Err(payload) => return Err(HandlerError::from_panic(payload.as_ref())),
                }
            }
            None => Outcome::Continue,
        };

        if self.inner.role.stops_after_handling() {
            Ok(Outcome::Stop)
        } else {
            Ok(outcome)
        }
    }
}

impl std::fmt::Debug for Handler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Handler")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .field("event_types", &self.inner.event_types)
            .field("filter", &self.inner.filter)
            .field("role", &self.inner.role)
            .field("has_action", &self.inner.action.is_some())
            .finish()
    }
}

// ============================================================================
// Tower Service Implementation for Handler
// ============================================================================

/// Runs the handler's action as a tower service, so middleware such as
/// `tower::timeout` can wrap it. The check is not part of the service.
impl Service<Arc<Context>> for Handler {
    type Response = Outcome;
    type Error = HandlerError;
    type Future = BoxFuture<'static, HandlerResult<Outcome>>;

    fn poll_ready(&mut self, _cx: &mut TaskContext<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, ctx: Arc<Context>) -> Self::Future {
        let handler = self.clone();
        Box::pin(async move { handler.handle(ctx).await })
    }
}
