//! Convenience constructors for common handlers.
//!
//! Each function returns a pre-configured [`Handler`]; attach the action with
//! [`Handler::handler`] and further filters with [`Handler::filter`].
//!
//! ```rust,ignore
//! dispatcher.add(on_command(["ping"]).handler(|ctx| async move { ctx.reply("pong").await }));
//! dispatcher.add(on_default().handler(|ctx| async move { ctx.reply("?").await }));
//! ```

use std::sync::Arc;

use skiff_core::EventType;

use crate::cache::EventCache;
use crate::error::HandlerResult;
use crate::filter::Filter;
use crate::handler::{Context, Handler, Outcome, Role, Verdict};

macro_rules! event_builders {
    ($($(#[$doc:meta])* $fn_name:ident => $variant:ident),* $(,)?) => {
        $(
            $(#[$doc])*
            pub fn $fn_name() -> Handler {
                Handler::new().on(EventType::$variant)
            }
        )*
    };
}

event_builders! {
    /// Matches `newMessage` events.
    on_message => NewMessage,
    /// Matches `editedMessage` events.
    on_edited_message => EditedMessage,
    /// Matches `deletedMessage` events.
    on_deleted_message => DeletedMessage,
    /// Matches `pinnedMessage` events.
    on_pinned_message => PinnedMessage,
    /// Matches `unpinnedMessage` events.
    on_unpinned_message => UnpinnedMessage,
    /// Matches `newChatMembers` events.
    on_new_chat_members => NewChatMembers,
    /// Matches `leftChatMembers` events.
    on_left_chat_members => LeftChatMembers,
    /// Matches `changedChatInfo` events.
    on_changed_chat_info => ChangedChatInfo,
    /// Matches `callbackQuery` events.
    on_callback_query => CallbackQuery,
}

/// Matches commands (`/name` or `.name`) with one of `names`, ignoring case.
///
/// An empty `names` matches any command.
pub fn on_command<I, S>(names: I) -> Handler
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let role = Role::command(names);
    let name = match &role {
        Role::Command(names) if !names.is_empty() => format!("command:{}", names.join("|")),
        _ => "command:*".to_string(),
    };
    on_message().name(name).filter(Filter::command()).role(role)
}

/// Matches `/help`.
pub fn on_help() -> Handler {
    on_command(["help"])
}

/// Matches `/start`.
pub fn on_start() -> Handler {
    on_command(["start"])
}

/// Runs only when no other (non-default) handler would take the event, then
/// stops dispatch.
pub fn on_default() -> Handler {
    Handler::new().name("default").role(Role::Fallback)
}

/// Runs for commands no command handler is registered for, then stops
/// dispatch.
pub fn on_unknown_command() -> Handler {
    on_message()
        .name("unknown-command")
        .filter(Filter::command())
        .role(Role::UnknownCommand)
}

/// Stops dispatch of a `newMessage` whose (message id, text) pair was seen
/// recently. Every other event is passed through.
pub fn skip_duplicates(cache: EventCache) -> Handler {
    Handler::new().name("duplicate-guard").check(move |event| {
        if event.event_type() != EventType::NewMessage {
            return Ok(Verdict::Skip);
        }
        let (Ok(msg_id), Ok(text)) = (event.message_id(), event.text()) else {
            return Ok(Verdict::Skip);
        };
        if cache.record_and_check(msg_id, text) {
            Ok(Verdict::Stop)
        } else {
            Ok(Verdict::Skip)
        }
    })
}

// ============================================================================
// Feedback command
// ============================================================================

/// A command that forwards user feedback to a fixed chat.
///
/// `/feedback <text>` sends the message template with `{source}` (the
/// originating chat) and `{message}` (the text) filled in to `target`, then
/// optionally acknowledges in the originating chat. A bare `/feedback`
/// gets the error reply, if one is set.
#[derive(Debug, Clone)]
pub struct Feedback {
    target: String,
    command: String,
    template: String,
    reply: Option<String>,
    error_reply: Option<String>,
}

impl Feedback {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            command: "feedback".to_string(),
            template: "Feedback from {source}: {message}".to_string(),
            reply: Some("Got it!".to_string()),
            error_reply: None,
        }
    }

    pub fn command(mut self, command: impl Into<String>) -> Self {
        self.command = command.into();
        self
    }

    pub fn template(mut self, template: impl Into<String>) -> Self {
        self.template = template.into();
        self
    }

    pub fn reply(mut self, reply: Option<String>) -> Self {
        self.reply = reply;
        self
    }

    pub fn error_reply(mut self, error_reply: Option<String>) -> Self {
        self.error_reply = error_reply;
        self
    }

    /// Builds the command handler.
    pub fn into_handler(self) -> Handler {
        let feedback = Arc::new(self);
        on_command([feedback.command.as_str()]).handler(move |ctx| {
            let feedback = Arc::clone(&feedback);
            async move { feedback.run(&ctx).await }
        })
    }

    async fn run(&self, ctx: &Context) -> HandlerResult<Outcome> {
        let event = ctx.event();
        let source = event.chat_id()?;
        let message = event
            .text()?
            .split_once(' ')
            .map(|(_, rest)| rest.trim())
            .unwrap_or("");

        let transport = ctx.transport();
        if message.is_empty() {
            if let Some(error_reply) = &self.error_reply {
                transport.send_text(source, error_reply, None).await?;
            }
            return Ok(Outcome::Continue);
        }

        let forwarded = self
            .template
            .replace("{source}", source)
            .replace("{message}", message);
        transport.send_text(&self.target, &forwarded, None).await?;

        if let Some(reply) = &self.reply {
            transport.send_text(source, reply, None).await?;
        }
        Ok(Outcome::Continue)
    }
}

/// Shorthand for `Feedback::new(target).into_handler()`.
pub fn feedback_command(target: impl Into<String>) -> Handler {
    Feedback::new(target).into_handler()
}
