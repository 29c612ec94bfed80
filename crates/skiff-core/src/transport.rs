//! Transport contract between the dispatch engine and the bot API.
//!
//! The poll loop only needs [`Transport::fetch_events`]. Everything a handler
//! may want to send goes through [`Transport::call_api`]; the provided
//! methods are thin request builders over it.
//!
//! ```text
//! ┌──────────┐  fetch_events   ┌─────────────┐
//! │ PollLoop │────────────────▶│  Transport  │──▶ bot API
//! └──────────┘                 │  (HTTP, ..) │
//! ┌──────────┐  call_api       │             │
//! │ Handlers │────────────────▶│             │
//! └──────────┘                 └─────────────┘
//! ```

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::TransportResult;
use crate::event::RawEvent;

/// Query parameters of an API call.
pub type Params = Vec<(&'static str, String)>;

/// A shared, type-erased transport.
pub type BoxedTransport = Arc<dyn Transport>;

/// Network collaborator used by the poll loop and by handlers.
///
/// Implementations must bound every call: `fetch_events` by
/// `poll_time + request timeout`, other calls by the request timeout.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Long-polls for events newer than `last_event_id`.
    ///
    /// The returned events are in server order, which is not guaranteed to
    /// be sorted by event id.
    async fn fetch_events(
        &self,
        poll_time: Duration,
        last_event_id: i64,
    ) -> TransportResult<Vec<RawEvent>>;

    /// Calls an API method (e.g. `messages/sendText`) with query parameters.
    async fn call_api(&self, method: &str, params: Params) -> TransportResult<Value>;

    /// Returns information about the bot itself.
    async fn self_get(&self) -> TransportResult<Value> {
        self.call_api("self/get", Vec::new()).await
    }

    /// Sends a text message, optionally as a reply.
    async fn send_text(
        &self,
        chat_id: &str,
        text: &str,
        reply_msg_id: Option<&str>,
    ) -> TransportResult<Value> {
        let mut params = vec![("chatId", chat_id.to_string()), ("text", text.to_string())];
        if let Some(reply) = reply_msg_id {
            params.push(("replyMsgId", reply.to_string()));
        }
        self.call_api("messages/sendText", params).await
    }

    async fn edit_text(&self, chat_id: &str, msg_id: &str, text: &str) -> TransportResult<Value> {
        self.call_api(
            "messages/editText",
            vec![
                ("chatId", chat_id.to_string()),
                ("msgId", msg_id.to_string()),
                ("text", text.to_string()),
            ],
        )
        .await
    }

    async fn delete_messages(&self, chat_id: &str, msg_id: &str) -> TransportResult<Value> {
        self.call_api(
            "messages/deleteMessages",
            vec![("chatId", chat_id.to_string()), ("msgId", msg_id.to_string())],
        )
        .await
    }

    /// Sends chat actions such as `typing` or `looking`.
    async fn send_actions(&self, chat_id: &str, actions: &[&str]) -> TransportResult<Value> {
        self.call_api(
            "chats/sendActions",
            vec![("chatId", chat_id.to_string()), ("actions", actions.join(","))],
        )
        .await
    }

    async fn get_chat_info(&self, chat_id: &str) -> TransportResult<Value> {
        self.call_api("chats/getInfo", vec![("chatId", chat_id.to_string())])
            .await
    }

    async fn get_chat_admins(&self, chat_id: &str) -> TransportResult<Value> {
        self.call_api("chats/getAdmins", vec![("chatId", chat_id.to_string())])
            .await
    }

    async fn get_file_info(&self, file_id: &str) -> TransportResult<Value> {
        self.call_api("files/getInfo", vec![("fileId", file_id.to_string())])
            .await
    }

    async fn pin_message(&self, chat_id: &str, msg_id: &str) -> TransportResult<Value> {
        self.call_api(
            "chats/pinMessage",
            vec![("chatId", chat_id.to_string()), ("msgId", msg_id.to_string())],
        )
        .await
    }

    async fn unpin_message(&self, chat_id: &str, msg_id: &str) -> TransportResult<Value> {
        self.call_api(
            "chats/unpinMessage",
            vec![("chatId", chat_id.to_string()), ("msgId", msg_id.to_string())],
        )
        .await
    }

    /// Answers a callback query, optionally with a notification or URL.
    async fn answer_callback_query(
        &self,
        query_id: &str,
        text: Option<&str>,
        show_alert: bool,
        url: Option<&str>,
    ) -> TransportResult<Value> {
        let mut params = vec![
            ("queryId", query_id.to_string()),
            ("showAlert", show_alert.to_string()),
        ];
        if let Some(text) = text {
            params.push(("text", text.to_string()));
        }
        if let Some(url) = url {
            params.push(("url", url.to_string()));
        }
        self.call_api("messages/answerCallbackQuery", params).await
    }
}
