//! Composable event filters.
//!
//! A [`Filter`] is an explicit expression tree over [`Event`]s. Leaves test
//! one aspect of an event; `And`/`Or`/`Not`/`AnyOf`/`AllOf` combine them.
//! Evaluation is a recursive interpretation of the tree that short-circuits
//! left to right, never mutates the event and always gives the same answer
//! for the same event.
//!
//! # Example
//!
//! ```rust,ignore
//! use skiff_framework::Filter;
//!
//! // Photos or videos from one user
//! let filter = Filter::sender("1234") & (Filter::image() | Filter::video());
//!
//! // Plain chatter: not a command, sticker, file or link
//! let chatter = Filter::text();
//! ```

use std::fmt;
use std::ops::{BitAnd, BitOr, Not};
use std::sync::{Arc, LazyLock};

use regex::{Regex, RegexBuilder};
use skiff_core::{Event, PartKind};

/// Prefixes that mark a message as a command.
pub const COMMAND_PREFIXES: [char; 2] = ['/', '.'];

static URL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    RegexBuilder::new(r"^\s*https?://\S+\s*$")
        .case_insensitive(true)
        .build()
        .expect("URL pattern is valid")
});

/// A type-erased custom predicate.
pub type Predicate = Arc<dyn Fn(&Event) -> bool + Send + Sync>;

/// Returns `true` if `text` is command-shaped.
pub fn is_command_text(text: &str) -> bool {
    text.trim_start().starts_with(COMMAND_PREFIXES)
}

/// Extracts the lower-cased command name from command-shaped text.
///
/// The name is the first whitespace-delimited token without its prefix:
/// `"/Help me"` yields `Some("help")`, `"/ help"` yields `Some("")`.
/// Non-command text yields `None`.
pub fn command_name(text: &str) -> Option<String> {
    let token = text.trim_start().split(char::is_whitespace).next()?;
    let name = token.strip_prefix(COMMAND_PREFIXES)?;
    Some(name.to_lowercase())
}

/// Kinds of message attachments a filter can look for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttachmentKind {
    /// Any file.
    File,
    Image,
    Video,
    Audio,
    Sticker,
}

impl AttachmentKind {
    fn media_type(self) -> Option<&'static str> {
        match self {
            Self::Image => Some("image"),
            Self::Video => Some("video"),
            Self::Audio => Some("audio"),
            Self::File | Self::Sticker => None,
        }
    }
}

fn has_attachment(event: &Event, kind: AttachmentKind) -> bool {
    match kind {
        AttachmentKind::File => event.has_part(&PartKind::File),
        AttachmentKind::Sticker => event.has_part(&PartKind::Sticker),
        AttachmentKind::Image | AttachmentKind::Video | AttachmentKind::Audio => {
            event.parts().iter().any(|p| {
                p.kind() == &PartKind::File && p.file_type() == kind.media_type()
            })
        }
    }
}

// ============================================================================
// Leaves
// ============================================================================

/// A primitive test on one aspect of an event.
///
/// Leaves return `false` when the event lacks the fields they inspect.
#[derive(Clone)]
pub enum Leaf {
    /// The event carries message text.
    Message,
    /// Message text starts with a command prefix after leading whitespace.
    Command,
    /// Message text contains a match of the pattern.
    Regex(Regex),
    /// Message sent by the given user id.
    Sender(String),
    /// Message with an attachment of the given kind.
    Attachment(AttachmentKind),
    /// Message mentioning anyone (`None`) or a specific user id.
    Mention(Option<String>),
    /// Event contains a forwarded message. Text is not required.
    Forward,
    /// Message replying to another message.
    Reply,
    /// Message whose whole text is a single URL and which is not a file.
    Url,
    /// Custom predicate.
    Predicate(Predicate),
}

impl Leaf {
    fn evaluate(&self, event: &Event) -> bool {
        let text = event.text().ok();

        match self {
            Self::Message => text.is_some(),
            Self::Command => text.is_some_and(is_command_text),
            Self::Regex(pattern) => text.is_some_and(|t| pattern.is_match(t)),
            Self::Sender(user_id) => {
                text.is_some() && event.sender_id().is_ok_and(|sender| sender == user_id)
            }
            Self::Attachment(kind) => text.is_some() && has_attachment(event, *kind),
            Self::Mention(target) => {
                text.is_some()
                    && event.parts().iter().any(|p| {
                        p.kind() == &PartKind::Mention
                            && target
                                .as_deref()
                                .is_none_or(|t| p.user_id().as_deref() == Some(t))
                    })
            }
            Self::Forward => event.has_part(&PartKind::Forward),
            Self::Reply => text.is_some() && event.has_part(&PartKind::Reply),
            Self::Url => {
                text.is_some_and(|t| URL_PATTERN.is_match(t))
                    && !has_attachment(event, AttachmentKind::File)
            }
            Self::Predicate(f) => f(event),
        }
    }
}

impl fmt::Debug for Leaf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Message => f.write_str("Message"),
            Self::Command => f.write_str("Command"),
            Self::Regex(re) => f.debug_tuple("Regex").field(&re.as_str()).finish(),
            Self::Sender(id) => f.debug_tuple("Sender").field(id).finish(),
            Self::Attachment(kind) => f.debug_tuple("Attachment").field(kind).finish(),
            Self::Mention(id) => f.debug_tuple("Mention").field(id).finish(),
            Self::Forward => f.write_str("Forward"),
            Self::Reply => f.write_str("Reply"),
            Self::Url => f.write_str("Url"),
            Self::Predicate(_) => f.write_str("Predicate(..)"),
        }
    }
}

// ============================================================================
// Filter Tree
// ============================================================================

/// A composable boolean predicate over events.
#[derive(Debug, Clone)]
pub enum Filter {
    Leaf(Leaf),
    And(Box<Filter>, Box<Filter>),
    Or(Box<Filter>, Box<Filter>),
    Not(Box<Filter>),
    /// True if any child is true; false when empty.
    AnyOf(Vec<Filter>),
    /// True if every child is true; true when empty.
    AllOf(Vec<Filter>),
}

impl Filter {
    /// Evaluates the filter against an event.
    pub fn evaluate(&self, event: &Event) -> bool {
        match self {
            Self::Leaf(leaf) => leaf.evaluate(event),
            Self::And(left, right) => left.evaluate(event) && right.evaluate(event),
            Self::Or(left, right) => left.evaluate(event) || right.evaluate(event),
            Self::Not(inner) => !inner.evaluate(event),
            Self::AnyOf(filters) => filters.iter().any(|f| f.evaluate(event)),
            Self::AllOf(filters) => filters.iter().all(|f| f.evaluate(event)),
        }
    }

    /// Combines two filters with short-circuit AND.
    pub fn and(self, other: Filter) -> Filter {
        Self::And(Box::new(self), Box::new(other))
    }

    /// Combines two filters with short-circuit OR.
    pub fn or(self, other: Filter) -> Filter {
        Self::Or(Box::new(self), Box::new(other))
    }

    /// Inverts a filter.
    pub fn invert(self) -> Filter {
        Self::Not(Box::new(self))
    }

    pub fn any_of(filters: impl IntoIterator<Item = Filter>) -> Filter {
        Self::AnyOf(filters.into_iter().collect())
    }

    pub fn all_of(filters: impl IntoIterator<Item = Filter>) -> Filter {
        Self::AllOf(filters.into_iter().collect())
    }

    // ------------------------------------------------------------------------
    // Standard leaves
    // ------------------------------------------------------------------------

    pub fn message() -> Filter {
        Self::Leaf(Leaf::Message)
    }

    pub fn command() -> Filter {
        Self::Leaf(Leaf::Command)
    }

    /// Compiles `pattern` into a regex leaf.
    pub fn regex(pattern: &str) -> Result<Filter, regex::Error> {
        Regex::new(pattern).map(Self::pattern)
    }

    /// Wraps an already compiled regex.
    pub fn pattern(regex: Regex) -> Filter {
        Self::Leaf(Leaf::Regex(regex))
    }

    pub fn sender(user_id: impl Into<String>) -> Filter {
        Self::Leaf(Leaf::Sender(user_id.into()))
    }

    pub fn attachment(kind: AttachmentKind) -> Filter {
        Self::Leaf(Leaf::Attachment(kind))
    }

    pub fn file() -> Filter {
        Self::attachment(AttachmentKind::File)
    }

    pub fn image() -> Filter {
        Self::attachment(AttachmentKind::Image)
    }

    pub fn video() -> Filter {
        Self::attachment(AttachmentKind::Video)
    }

    pub fn audio() -> Filter {
        Self::attachment(AttachmentKind::Audio)
    }

    pub fn sticker() -> Filter {
        Self::attachment(AttachmentKind::Sticker)
    }

    /// Messages mentioning anyone.
    pub fn mention() -> Filter {
        Self::Leaf(Leaf::Mention(None))
    }

    /// Messages mentioning a specific user.
    pub fn mention_of(user_id: impl Into<String>) -> Filter {
        Self::Leaf(Leaf::Mention(Some(user_id.into())))
    }

    pub fn forward() -> Filter {
        Self::Leaf(Leaf::Forward)
    }

    pub fn reply() -> Filter {
        Self::Leaf(Leaf::Reply)
    }

    pub fn url() -> Filter {
        Self::Leaf(Leaf::Url)
    }

    /// Wraps a custom predicate. It must not have side effects.
    pub fn predicate<F>(f: F) -> Filter
    where
        F: Fn(&Event) -> bool + Send + Sync + 'static,
    {
        Self::Leaf(Leaf::Predicate(Arc::new(f)))
    }

    // ------------------------------------------------------------------------
    // Derived filters
    // ------------------------------------------------------------------------

    /// `image OR video OR audio`
    pub fn media() -> Filter {
        Self::image().or(Self::video()).or(Self::audio())
    }

    /// Generic files: `file AND NOT media`
    pub fn data() -> Filter {
        Self::file().and(Self::media().invert())
    }

    /// Plain text: `message AND NOT (command OR sticker OR file OR url)`
    pub fn text() -> Filter {
        let excluded = Self::command()
            .or(Self::sticker())
            .or(Self::file())
            .or(Self::url());
        Self::message().and(excluded.invert())
    }
}

impl BitAnd for Filter {
    type Output = Filter;

    fn bitand(self, rhs: Filter) -> Filter {
        self.and(rhs)
    }
}

impl BitOr for Filter {
    type Output = Filter;

    fn bitor(self, rhs: Filter) -> Filter {
        self.or(rhs)
    }
}

impl Not for Filter {
    type Output = Filter;

    fn not(self) -> Filter {
        self.invert()
    }
}

impl From<Leaf> for Filter {
    fn from(leaf: Leaf) -> Self {
        Self::Leaf(leaf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::{Value, json};
    use skiff_core::EventType;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn message(text: &str, parts: Value) -> Event {
        Event::new(
            1,
            EventType::NewMessage,
            json!({
                "msgId": "m1",
                "chat": {"chatId": "c1", "type": "private"},
                "from": {"userId": "u1"},
                "text": text,
                "parts": parts,
            }),
        )
        .unwrap()
    }

    fn file_part(kind: &str) -> Value {
        json!({"type": "file", "payload": {"fileId": "f1", "type": kind}})
    }

    fn deleted() -> Event {
        Event::new(2, EventType::DeletedMessage, json!({"msgId": "m1"})).unwrap()
    }

    #[test]
    fn test_command_leaf() {
        assert!(Filter::command().evaluate(&message("/help", json!([]))));
        assert!(Filter::command().evaluate(&message("   .start now", json!([]))));
        assert!(!Filter::command().evaluate(&message("hello /help", json!([]))));
        assert!(!Filter::command().evaluate(&deleted()));
    }

    #[test]
    fn test_command_name_parsing() {
        assert_eq!(command_name("/Help me").as_deref(), Some("help"));
        assert_eq!(command_name("  .start").as_deref(), Some("start"));
        assert_eq!(command_name("/").as_deref(), Some(""));
        assert_eq!(command_name("/ help").as_deref(), Some(""));
        assert_eq!(command_name(".Start\tnow").as_deref(), Some("start"));
        assert_eq!(command_name("hello"), None);
    }

    #[test]
    fn test_leaves_return_false_without_fields() {
        let event = deleted();
        for filter in [
            Filter::message(),
            Filter::regex(".*").unwrap(),
            Filter::sender("u1"),
            Filter::file(),
            Filter::mention(),
            Filter::reply(),
            Filter::url(),
            Filter::forward(),
        ] {
            assert!(!filter.evaluate(&event), "{filter:?} matched a deleted message");
        }
    }

    #[test]
    fn test_regex_and_sender() {
        let event = message("order #42 shipped", json!([]));
        assert!(Filter::regex(r"#\d+").unwrap().evaluate(&event));
        assert!(!Filter::regex(r"^\d+$").unwrap().evaluate(&event));
        assert!(Filter::sender("u1").evaluate(&event));
        assert!(!Filter::sender("u2").evaluate(&event));
    }

    #[test]
    fn test_attachment_kinds() {
        let image = message("https://files.icq.net/get/0abc", json!([file_part("image")]));
        let doc = message("https://files.icq.net/get/0def", json!([file_part("document")]));
        let sticker = message("sticker", json!([{"type": "sticker", "payload": {"fileId": "s"}}]));

        assert!(Filter::file().evaluate(&image));
        assert!(Filter::image().evaluate(&image));
        assert!(Filter::media().evaluate(&image));
        assert!(!Filter::data().evaluate(&image));
        assert!(!Filter::video().evaluate(&image));

        assert!(Filter::data().evaluate(&doc));
        assert!(!Filter::media().evaluate(&doc));

        assert!(Filter::sticker().evaluate(&sticker));
        assert!(!Filter::file().evaluate(&sticker));
    }

    #[test]
    fn test_mention_forward_reply() {
        let event = message(
            "hey",
            json!([
                {"type": "mention", "payload": {"userId": "42"}},
                {"type": "reply", "payload": {"message": {"msgId": "m0"}}}
            ]),
        );
        assert!(Filter::mention().evaluate(&event));
        assert!(Filter::mention_of("42").evaluate(&event));
        assert!(!Filter::mention_of("43").evaluate(&event));
        assert!(Filter::reply().evaluate(&event));
        assert!(!Filter::forward().evaluate(&event));

        let forwarded = Event::new(
            3,
            EventType::NewMessage,
            json!({"msgId": "m2", "parts": [{"type": "forward", "payload": {}}]}),
        )
        .unwrap();
        assert!(Filter::forward().evaluate(&forwarded));
    }

    #[test]
    fn test_url_excludes_files() {
        assert!(Filter::url().evaluate(&message("  HTTPS://example.com/a?b=c ", json!([]))));
        assert!(!Filter::url().evaluate(&message("see https://example.com", json!([]))));
        assert!(!Filter::url().evaluate(&message(
            "https://files.icq.net/get/0abc",
            json!([file_part("image")])
        )));
    }

    #[test]
    fn test_text_composite() {
        assert!(Filter::text().evaluate(&message("just chatting", json!([]))));
        assert!(!Filter::text().evaluate(&message("/cmd", json!([]))));
        assert!(!Filter::text().evaluate(&message("https://example.com", json!([]))));
        assert!(!Filter::text().evaluate(&message("pic", json!([file_part("image")]))));
    }

    #[test]
    fn test_and_or_short_circuit() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counting = {
            let calls = Arc::clone(&calls);
            Filter::predicate(move |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                true
            })
        };
        let event = deleted();

        let never = Filter::predicate(|_| false);
        let always = Filter::predicate(|_| true);

        assert!(!(never.clone() & counting.clone()).evaluate(&event));
        assert!((always.clone() | counting.clone()).evaluate(&event));
        assert!(Filter::any_of([always, counting.clone()]).evaluate(&event));
        assert!(!Filter::all_of([never, counting]).evaluate(&event));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_empty_collections() {
        let event = deleted();
        assert!(!Filter::any_of([]).evaluate(&event));
        assert!(Filter::all_of([]).evaluate(&event));
    }

    // ------------------------------------------------------------------------
    // Boolean algebra against a reference interpreter
    // ------------------------------------------------------------------------

    #[derive(Debug, Clone)]
    enum Expr {
        Lit(bool),
        And(Box<Expr>, Box<Expr>),
        Or(Box<Expr>, Box<Expr>),
        Not(Box<Expr>),
        Any(Vec<Expr>),
        All(Vec<Expr>),
    }

    impl Expr {
        fn reference(&self) -> bool {
            match self {
                Self::Lit(b) => *b,
                Self::And(a, b) => a.reference() & b.reference(),
                Self::Or(a, b) => a.reference() | b.reference(),
                Self::Not(e) => !e.reference(),
                Self::Any(es) => es.iter().fold(false, |acc, e| acc | e.reference()),
                Self::All(es) => es.iter().fold(true, |acc, e| acc & e.reference()),
            }
        }

        fn to_filter(&self) -> Filter {
            match self {
                Self::Lit(b) => {
                    let b = *b;
                    Filter::predicate(move |_| b)
                }
                Self::And(a, b) => a.to_filter() & b.to_filter(),
                Self::Or(a, b) => a.to_filter() | b.to_filter(),
                Self::Not(e) => !e.to_filter(),
                Self::Any(es) => Filter::any_of(es.iter().map(Expr::to_filter)),
                Self::All(es) => Filter::all_of(es.iter().map(Expr::to_filter)),
            }
        }
    }

    fn arb_expr() -> impl Strategy<Value = Expr> {
        any::<bool>().prop_map(Expr::Lit).prop_recursive(5, 48, 4, |inner| {
            prop_oneof![
                (inner.clone(), inner.clone())
                    .prop_map(|(a, b)| Expr::And(Box::new(a), Box::new(b))),
                (inner.clone(), inner.clone())
                    .prop_map(|(a, b)| Expr::Or(Box::new(a), Box::new(b))),
                inner.clone().prop_map(|e| Expr::Not(Box::new(e))),
                prop::collection::vec(inner.clone(), 0..4).prop_map(Expr::Any),
                prop::collection::vec(inner, 0..4).prop_map(Expr::All),
            ]
        })
    }

    proptest! {
        #[test]
        fn prop_composition_matches_boolean_logic(expr in arb_expr()) {
            let event = deleted();
            prop_assert_eq!(expr.to_filter().evaluate(&event), expr.reference());
        }

        #[test]
        fn prop_de_morgan(a in any::<bool>(), b in any::<bool>()) {
            let event = deleted();
            let lit = |v: bool| Filter::predicate(move |_| v);
            let lhs = !(lit(a) & lit(b));
            let rhs = !lit(a) | !lit(b);
            prop_assert_eq!(lhs.evaluate(&event), rhs.evaluate(&event));
        }

        #[test]
        fn prop_evaluation_is_idempotent(expr in arb_expr()) {
            let event = deleted();
            let filter = expr.to_filter();
            prop_assert_eq!(filter.evaluate(&event), filter.evaluate(&event));
        }
    }
}
