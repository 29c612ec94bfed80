//! Shared fixtures for the framework's unit tests.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Value, json};
use skiff_core::{BoxedTransport, Event, EventType, Params, RawEvent, Transport, TransportResult};

/// Transport that accepts every call and records it.
#[derive(Default)]
pub(crate) struct NullTransport {
    pub calls: Mutex<Vec<(String, Params)>>,
}

impl NullTransport {
    pub fn boxed() -> BoxedTransport {
        Arc::new(Self::default())
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Returns `(chatId, text)` of every `messages/sendText` call.
    pub fn sent_texts(&self) -> Vec<(String, String)> {
        self.calls
            .lock()
            .iter()
            .filter(|(method, _)| method == "messages/sendText")
            .map(|(_, params)| {
                let get = |key: &str| {
                    params
                        .iter()
                        .find(|(k, _)| *k == key)
                        .map(|(_, v)| v.clone())
                        .unwrap_or_default()
                };
                (get("chatId"), get("text"))
            })
            .collect()
    }
}

#[async_trait]
impl Transport for NullTransport {
    async fn fetch_events(&self, _: Duration, _: i64) -> TransportResult<Vec<RawEvent>> {
        Ok(Vec::new())
    }

    async fn call_api(&self, method: &str, params: Params) -> TransportResult<Value> {
        self.calls.lock().push((method.to_string(), params));
        Ok(json!({"ok": true}))
    }
}

/// A `newMessage` event in chat `c1` from user `u1`, with message id `m{id}`.
pub(crate) fn event_with_text(id: i64, text: &str) -> Event {
    message(id, &format!("m{id}"), text)
}

/// A `newMessage` event with an explicit message id.
pub(crate) fn message(id: i64, msg_id: &str, text: &str) -> Event {
    Event::new(
        id,
        EventType::NewMessage,
        json!({
            "msgId": msg_id,
            "chat": {"chatId": "c1", "type": "private"},
            "from": {"userId": "u1"},
            "text": text,
        }),
    )
    .unwrap()
}
