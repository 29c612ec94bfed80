//! Event model for the Skiff SDK.
//!
//! The server delivers events as `{eventId, type, payload}` triples. This
//! module turns them into an immutable, typed [`Event`]:
//!
//! - [`EventType`] - the closed set of event kinds
//! - [`RawEvent`] / [`EventBatch`] - the wire representation
//! - [`Event`] - decoded event with derived fields computed once
//! - [`Part`] - one attachment/annotation of a message (file, mention, ...)
//!
//! Derived fields that an event does not carry are reported through
//! [`EventError::MissingField`] instead of being defaulted.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{EventError, EventResult};

// ============================================================================
// Event Type Classification
// ============================================================================

/// Kind of an event as reported by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    /// A new message in a chat.
    NewMessage,
    /// An existing message was edited.
    EditedMessage,
    /// A message was deleted.
    DeletedMessage,
    /// A message was pinned.
    PinnedMessage,
    /// A message was unpinned.
    UnpinnedMessage,
    /// Users joined a chat.
    NewChatMembers,
    /// Users left a chat.
    LeftChatMembers,
    /// Chat title, about or rules changed.
    ChangedChatInfo,
    /// A user pressed an inline keyboard button.
    CallbackQuery,
}

impl EventType {
    /// All event types, in wire-protocol order.
    pub const ALL: [EventType; 9] = [
        EventType::NewMessage,
        EventType::EditedMessage,
        EventType::DeletedMessage,
        EventType::PinnedMessage,
        EventType::UnpinnedMessage,
        EventType::NewChatMembers,
        EventType::LeftChatMembers,
        EventType::ChangedChatInfo,
        EventType::CallbackQuery,
    ];

    /// Returns the wire name of this event type.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NewMessage => "newMessage",
            Self::EditedMessage => "editedMessage",
            Self::DeletedMessage => "deletedMessage",
            Self::PinnedMessage => "pinnedMessage",
            Self::UnpinnedMessage => "unpinnedMessage",
            Self::NewChatMembers => "newChatMembers",
            Self::LeftChatMembers => "leftChatMembers",
            Self::ChangedChatInfo => "changedChatInfo",
            Self::CallbackQuery => "callbackQuery",
        }
    }
}

impl FromStr for EventType {
    type Err = EventError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| EventError::UnknownType(s.to_string()))
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of chat an event happened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChatType {
    /// One-to-one conversation with the bot.
    Private,
    /// Group chat.
    Group,
    /// Broadcast channel.
    Channel,
}

impl ChatType {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "private" => Some(Self::Private),
            "group" => Some(Self::Group),
            "channel" => Some(Self::Channel),
            _ => None,
        }
    }
}

// ============================================================================
// Message Parts
// ============================================================================

/// Kind of a message part.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PartKind {
    File,
    Sticker,
    Mention,
    Voice,
    Forward,
    Reply,
    /// A part kind this SDK does not know about.
    Other(String),
}

impl From<&str> for PartKind {
    fn from(s: &str) -> Self {
        match s {
            "file" => Self::File,
            "sticker" => Self::Sticker,
            "mention" => Self::Mention,
            "voice" => Self::Voice,
            "forward" => Self::Forward,
            "reply" => Self::Reply,
            other => Self::Other(other.to_string()),
        }
    }
}

/// One entry of a message's `parts` array.
#[derive(Debug, Clone, PartialEq)]
pub struct Part {
    kind: PartKind,
    payload: Value,
}

impl Part {
    /// Creates a part from its kind and raw payload.
    pub fn new(kind: PartKind, payload: Value) -> Self {
        Self { kind, payload }
    }

    /// Returns the part kind.
    pub fn kind(&self) -> &PartKind {
        &self.kind
    }

    /// Returns the raw part payload.
    pub fn payload(&self) -> &Value {
        &self.payload
    }

    /// Returns the media type of a file part (`image`, `video`, `audio`), if present.
    pub fn file_type(&self) -> Option<&str> {
        self.payload.get("type").and_then(Value::as_str)
    }

    /// Returns the mentioned user id of a mention part, if present.
    pub fn user_id(&self) -> Option<String> {
        id_value(self.payload.get("userId"))
    }
}

// ============================================================================
// Wire Representation
// ============================================================================

/// An event exactly as delivered by `events/get`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawEvent {
    /// Server-assigned, totally ordered event id.
    #[serde(rename = "eventId")]
    pub event_id: i64,
    /// Wire name of the event type.
    #[serde(rename = "type")]
    pub kind: String,
    /// Type-specific payload.
    #[serde(default)]
    pub payload: Value,
}

impl RawEvent {
    /// Creates a raw event.
    pub fn new(event_id: i64, kind: impl Into<String>, payload: Value) -> Self {
        Self {
            event_id,
            kind: kind.into(),
            payload,
        }
    }
}

/// Body of an `events/get` response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventBatch {
    #[serde(default)]
    pub events: Vec<RawEvent>,
}

// ============================================================================
// Typed Event
// ============================================================================

/// A decoded, immutable event.
///
/// Derived fields are computed once in [`Event::new`] according to the event
/// type. Accessors for optional fields return [`EventError::MissingField`]
/// when the event does not carry them.
#[derive(Debug, Clone)]
pub struct Event {
    event_id: i64,
    event_type: EventType,
    payload: Value,
    message_id: Option<String>,
    text: Option<String>,
    chat_id: Option<String>,
    chat_type: Option<ChatType>,
    sender_id: Option<String>,
    callback_query_id: Option<String>,
    callback_data: Option<String>,
    parts: Vec<Part>,
    members: Vec<String>,
}

impl Event {
    /// Decodes a typed event from its id, type and payload.
    pub fn new(event_id: i64, event_type: EventType, payload: Value) -> EventResult<Self> {
        let Some(obj) = payload.as_object() else {
            return Err(EventError::InvalidPayload {
                event_id,
                reason: "payload is not a JSON object".to_string(),
            });
        };

        let mut event = Self {
            event_id,
            event_type,
            payload: Value::Null,
            message_id: None,
            text: None,
            chat_id: None,
            chat_type: None,
            sender_id: None,
            callback_query_id: None,
            callback_data: None,
            parts: Vec::new(),
            members: Vec::new(),
        };

        match event_type {
            EventType::NewMessage | EventType::EditedMessage | EventType::PinnedMessage => {
                event.message_id = id_value(obj.get("msgId"));
                event.text = string_value(obj.get("text"));
                event.sender_id = user_id(obj.get("from"));
                event.parts = parse_parts(obj.get("parts"));
                event.read_chat(obj);
            }
            EventType::DeletedMessage | EventType::UnpinnedMessage => {
                event.message_id = id_value(obj.get("msgId"));
                event.read_chat(obj);
            }
            EventType::NewChatMembers => {
                event.sender_id = user_id(obj.get("addedBy"));
                event.members = member_ids(obj.get("newMembers"));
                event.read_chat(obj);
            }
            EventType::LeftChatMembers => {
                event.sender_id = user_id(obj.get("removedBy"));
                event.members = member_ids(obj.get("leftMembers"));
                event.read_chat(obj);
            }
            EventType::ChangedChatInfo => {
                event.sender_id = user_id(obj.get("from"));
                event.read_chat(obj);
            }
            EventType::CallbackQuery => {
                event.callback_query_id = string_value(obj.get("queryId"));
                event.callback_data = string_value(obj.get("callbackData"));
                event.sender_id = user_id(obj.get("from"));
                if let Some(message) = obj.get("message").and_then(Value::as_object) {
                    event.message_id = id_value(message.get("msgId"));
                    event.read_chat(message);
                }
            }
        }

        event.payload = payload;
        Ok(event)
    }

    /// Decodes a typed event from its wire representation.
    pub fn from_raw(raw: RawEvent) -> EventResult<Self> {
        let event_type = raw.kind.parse()?;
        Self::new(raw.event_id, event_type, raw.payload)
    }

    fn read_chat(&mut self, obj: &Map<String, Value>) {
        if let Some(chat) = obj.get("chat").and_then(Value::as_object) {
            self.chat_id = id_value(chat.get("chatId"));
            self.chat_type = chat.get("type").and_then(Value::as_str).and_then(ChatType::parse);
        }
    }

    fn missing(&self, field: &'static str) -> EventError {
        EventError::MissingField {
            event_type: self.event_type,
            field,
        }
    }

    /// Returns the server-assigned event id.
    pub fn event_id(&self) -> i64 {
        self.event_id
    }

    /// Returns the event type.
    pub fn event_type(&self) -> EventType {
        self.event_type
    }

    /// Returns the raw payload.
    pub fn payload(&self) -> &Value {
        &self.payload
    }

    pub fn message_id(&self) -> EventResult<&str> {
        self.message_id.as_deref().ok_or_else(|| self.missing("msgId"))
    }

    pub fn text(&self) -> EventResult<&str> {
        self.text.as_deref().ok_or_else(|| self.missing("text"))
    }

    pub fn chat_id(&self) -> EventResult<&str> {
        self.chat_id.as_deref().ok_or_else(|| self.missing("chatId"))
    }

    pub fn chat_type(&self) -> EventResult<ChatType> {
        self.chat_type.ok_or_else(|| self.missing("chat.type"))
    }

    pub fn sender_id(&self) -> EventResult<&str> {
        self.sender_id.as_deref().ok_or_else(|| self.missing("userId"))
    }

    pub fn callback_query_id(&self) -> EventResult<&str> {
        self.callback_query_id
            .as_deref()
            .ok_or_else(|| self.missing("queryId"))
    }

    pub fn callback_data(&self) -> EventResult<&str> {
        self.callback_data
            .as_deref()
            .ok_or_else(|| self.missing("callbackData"))
    }

    /// Returns `true` if the event carries message text.
    pub fn has_text(&self) -> bool {
        self.text.is_some()
    }

    /// Returns the message parts (empty for events without parts).
    pub fn parts(&self) -> &[Part] {
        &self.parts
    }

    /// Returns `true` if any part has the given kind.
    pub fn has_part(&self, kind: &PartKind) -> bool {
        self.parts.iter().any(|p| p.kind() == kind)
    }

    /// Returns the user ids that joined or left, for membership events.
    pub fn members(&self) -> &[String] {
        &self.members
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.event_type, self.event_id)
    }
}

// ============================================================================
// Payload helpers
// ============================================================================

/// Ids arrive as strings or numbers depending on the field and server version.
fn id_value(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn string_value(value: Option<&Value>) -> Option<String> {
    value.and_then(Value::as_str).map(str::to_owned)
}

fn user_id(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_object)
        .and_then(|user| id_value(user.get("userId")))
}

fn member_ids(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|members| members.iter().filter_map(|m| user_id(Some(m))).collect())
        .unwrap_or_default()
}

fn parse_parts(value: Option<&Value>) -> Vec<Part> {
    let Some(parts) = value.and_then(Value::as_array) else {
        return Vec::new();
    };

    parts
        .iter()
        .filter_map(|part| {
            let kind = part.get("type")?.as_str()?;
            let payload = part.get("payload").cloned().unwrap_or(Value::Null);
            Some(Part::new(PartKind::from(kind), payload))
        })
        .collect()
}
