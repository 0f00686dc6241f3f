//! Messages spoken across execution surfaces.
//!
//! Three surfaces exist: the privileged coordinator that owns the session
//! engine, page-injected callers, and a sandboxed UI that can only reach
//! the coordinator through its embedding frame. None of them can call each
//! other synchronously; everything goes through tagged action messages and
//! event streams.

use serde::{Deserialize, Serialize};

use crate::context::{ConversationContext, TurnResult};

/// Which surface a message originates from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Surface {
    /// Privileged coordinator; owns the engine and the history store.
    Host,
    /// Page-injected caller (toolbar / quick ask).
    Page,
    /// Sandboxed side-panel UI, relayed through its embedding frame.
    Panel,
}

/// An image carried inside a relay message. Raw bytes cannot cross the
/// surface boundary, so they travel base64-encoded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImagePayload {
    pub base64: String,
    pub mime: String,
    pub name: String,
}

/// Inbound requests a surface can address to the coordinator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
    /// Continue the current conversation; streams updates then a terminal
    /// done event.
    SendPrompt {
        text: String,
        model: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        image: Option<ImagePayload>,
    },
    /// One-off question: the coordinator resets to a fresh context first
    /// and saves the exchange as a new history record.
    QuickAsk {
        text: String,
        model: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        image: Option<ImagePayload>,
    },
    CancelPrompt,
    /// Switch to a previously saved conversation.
    SetContext {
        context: ConversationContext,
        model: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        session_id: Option<String>,
    },
    ResetContext,
    /// Privileged fetch of a remote image on behalf of a page surface.
    FetchImage { url: String },
}

/// Outbound events the coordinator emits back to the requesting surface.
///
/// For a streaming request, zero or more `StreamUpdate`s arrive first,
/// then exactly one `StreamDone`. Each update carries the full text so
/// far, not a delta. The reply channel stays open until the terminal
/// event has been delivered.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelayEvent {
    StreamUpdate {
        text: String,
    },
    StreamDone {
        result: TurnResult,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        session_id: Option<String>,
    },
    Ack {
        status: String,
    },
    Cancelled {
        cancelled: bool,
    },
    Image {
        base64: String,
        mime: String,
        name: String,
    },
    Error {
        message: String,
    },
}

impl RelayEvent {
    /// Whether this event closes its request's reply channel.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RelayEvent::StreamUpdate { .. })
    }
}
