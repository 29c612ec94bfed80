//! Event dispatcher.
//!
//! The [`Dispatcher`] holds an ordered list of [`Handler`]s and offers each
//! event to them in registration order:
//!
//! ```text
//! Event ──▶ duplicate guard ──▶ handler[0] ──▶ handler[1] ──▶ ... ──▶ done
//!               │ Stop              │ Stop          │ Stop
//!               ▼                   ▼               ▼
//!             done                done            done
//! ```
//!
//! For every handler the dispatcher evaluates its check. `Skip` moves on,
//! `Stop` ends dispatch, and `Eligible` runs the action. An action returning
//! [`Outcome::Stop`] ends dispatch as well. Failures and panics in a check or
//! action are logged and count as "not handled by this handler"; they never
//! stop the remaining handlers.
//!
//! Checks are evaluated lazily: a handler after a stop point is never asked.

use std::ops::ControlFlow;
use std::sync::Arc;

use skiff_core::{BoxedTransport, Event};
use tracing::{Instrument, debug, debug_span, error, trace, warn};

use crate::builders::skip_duplicates;
use crate::cache::EventCache;
use crate::error::HandlerResult;
use crate::handler::{Context, Handler, Outcome, Role, Verdict};

/// What happened while dispatching one event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchSummary {
    /// Actions that were run.
    pub invoked: usize,
    /// Checks or actions that failed or panicked.
    pub failed: usize,
    /// Whether a check or action stopped dispatching.
    pub stopped: bool,
}

/// Ordered collection of handlers.
///
/// The optional duplicate guard always runs first and is not part of the
/// handler list: it is never counted, removed or consulted when deciding
/// whether a fallback handler applies.
#[derive(Debug, Clone, Default)]
pub struct Dispatcher {
    guard: Option<Handler>,
    handlers: Vec<Handler>,
}

impl Dispatcher {
    /// Creates an empty dispatcher without a duplicate guard.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty dispatcher that suppresses re-delivered messages
    /// using `cache`.
    pub fn with_duplicate_guard(cache: EventCache) -> Self {
        Self {
            guard: Some(skip_duplicates(cache)),
            handlers: Vec::new(),
        }
    }

    /// Replaces the guard that runs ahead of every handler.
    pub fn set_guard(&mut self, guard: Option<Handler>) {
        self.guard = guard;
    }

    pub fn guard(&self) -> Option<&Handler> {
        self.guard.as_ref()
    }

    /// Appends a handler.
    pub fn add(&mut self, handler: Handler) {
        self.handlers.push(handler);
    }

    /// Appends a handler, builder style.
    pub fn with(mut self, handler: Handler) -> Self {
        self.add(handler);
        self
    }

    /// Inserts a handler at `index`, clamped to the current length.
    pub fn insert(&mut self, index: usize, handler: Handler) {
        let index = index.min(self.handlers.len());
        self.handlers.insert(index, handler);
    }

    /// Removes every registration of `handler`. Returns `false` if it was not
    /// registered.
    pub fn remove(&mut self, handler: &Handler) -> bool {
        let before = self.handlers.len();
        self.handlers.retain(|h| h.id() != handler.id());
        self.handlers.len() != before
    }

    /// Removes all handlers. The guard is kept.
    pub fn clear(&mut self) {
        self.handlers.clear();
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    pub fn handlers(&self) -> &[Handler] {
        &self.handlers
    }

    /// Offers `event` to the guard and then to every handler in order.
    pub async fn dispatch(&self, event: Event, transport: BoxedTransport) -> DispatchSummary {
        let span = debug_span!(
            "dispatch",
            event_id = event.event_id(),
            event_type = %event.event_type(),
        );

        async move {
            let ctx = Arc::new(Context::new(event, transport));
            let mut summary = DispatchSummary::default();

            if let Some(guard) = &self.guard
                && self.step(None, guard, &ctx, &mut summary).await.is_break()
            {
                summary.stopped = true;
                return summary;
            }

            for (index, handler) in self.handlers.iter().enumerate() {
                if self
                    .step(Some(index), handler, &ctx, &mut summary)
                    .await
                    .is_break()
                {
                    summary.stopped = true;
                    break;
                }
            }

            debug!(
                invoked = summary.invoked,
                failed = summary.failed,
                stopped = summary.stopped,
                "Event dispatched"
            );
            summary
        }
        .instrument(span)
        .await
    }

    /// Checks one handler and runs it if eligible. `Break` ends dispatch.
    async fn step(
        &self,
        position: Option<usize>,
        handler: &Handler,
        ctx: &Arc<Context>,
        summary: &mut DispatchSummary,
    ) -> ControlFlow<()> {
        let verdict = match position {
            Some(index) => self.eligibility(index, handler, ctx.event()),
            None => handler.check_caught(ctx.event()),
        };

        match verdict {
            Ok(Verdict::Skip) => {
                trace!(handler = handler.describe(), "Handler skipped");
                return ControlFlow::Continue(());
            }
            Ok(Verdict::Stop) => {
                debug!(handler = handler.describe(), "Check stopped dispatch");
                return ControlFlow::Break(());
            }
            Ok(Verdict::Eligible) => {}
            Err(e) => {
                summary.failed += 1;
                warn!(handler = handler.describe(), error = %e, "Handler check failed");
                return ControlFlow::Continue(());
            }
        }

        summary.invoked += 1;
        trace!(handler = handler.describe(), "Running handler");

        match handler.handle(Arc::clone(ctx)).await {
            Ok(Outcome::Continue) => ControlFlow::Continue(()),
            Ok(Outcome::Stop) => {
                debug!(handler = handler.describe(), "Handler stopped dispatch");
                ControlFlow::Break(())
            }
            Err(e) => {
                summary.failed += 1;
                error!(handler = handler.describe(), error = %e, "Handler failed");
                ControlFlow::Continue(())
            }
        }
    }

    /// The handler's own check plus the cross-handler condition of its role.
    fn eligibility(&self, index: usize, handler: &Handler, event: &Event) -> HandlerResult<Verdict> {
        let verdict = handler.check_caught(event)?;
        if verdict != Verdict::Eligible {
            return Ok(verdict);
        }

        let claimed = match handler.get_role() {
            Role::Fallback => {
                self.any_other_matches(index, event, |h| !matches!(h.get_role(), Role::Fallback))
            }
            Role::UnknownCommand => {
                self.any_other_matches(index, event, |h| matches!(h.get_role(), Role::Command(_)))
            }
            Role::Regular | Role::Command(_) => false,
        };

        Ok(if claimed { Verdict::Skip } else { Verdict::Eligible })
    }

    /// Whether some other handler selected by `include` would take `event`.
    ///
    /// Only base checks are consulted. A failing check counts as no match.
    fn any_other_matches(
        &self,
        index: usize,
        event: &Event,
        include: impl Fn(&Handler) -> bool,
    ) -> bool {
        self.handlers
            .iter()
            .enumerate()
            .filter(|(i, h)| *i != index && include(h))
            .any(|(_, h)| match h.check_caught(event) {
                Ok(verdict) => verdict != Verdict::Skip,
                Err(e) => {
                    debug!(handler = h.describe(), error = %e, "Side check failed, treating as no match");
                    false
                }
            })
    }
}
