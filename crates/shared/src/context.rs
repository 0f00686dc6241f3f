//! Conversation context and per-turn result types.

use serde::{Deserialize, Serialize};

/// The opaque `(conversationId, responseId, choiceId)` triple the remote
/// service assigns to a threaded conversation. The client only ever echoes
/// these back; it never inspects or synthesizes them.
///
/// The triple is replaced atomically: a response that does not carry all
/// three ids leaves the previous triple in place.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContinuationIds {
    pub conversation_id: String,
    pub response_id: String,
    pub choice_id: String,
}

impl ContinuationIds {
    pub fn new(
        conversation_id: impl Into<String>,
        response_id: impl Into<String>,
        choice_id: impl Into<String>,
    ) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            response_id: response_id.into(),
            choice_id: choice_id.into(),
        }
    }

    /// A fresh conversation carries empty ids; the wire encoder sends them
    /// as empty strings.
    pub fn is_empty(&self) -> bool {
        self.conversation_id.is_empty() && self.response_id.is_empty() && self.choice_id.is_empty()
    }
}

/// Short-lived page-derived token pair required to authorize a turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    /// The `at` anti-forgery value scraped from the app page.
    pub auth_token: String,
    /// The `bl` client build tag, carried as a routing query parameter.
    pub routing_token: String,
}

/// Everything needed to continue one conversation across turns.
///
/// Owned exclusively by the session engine and replaced wholesale after
/// each successful turn; nothing else mutates it field-by-field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationContext {
    /// Absent on a fresh context; acquired on first use.
    pub tokens: Option<TokenPair>,
    pub ids: ContinuationIds,
}

impl ConversationContext {
    /// A brand-new conversation: no tokens, empty continuation ids.
    pub fn fresh() -> Self {
        Self::default()
    }

    pub fn has_tokens(&self) -> bool {
        self.tokens.is_some()
    }
}

/// An image the caller wants attached to a turn, as raw bytes.
#[derive(Debug, Clone)]
pub struct ImageAttachment {
    pub data: Vec<u8>,
    pub name: String,
    pub mime: String,
}

/// Terminal status of one turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnStatus {
    Success,
    Error,
    Cancelled,
}

/// What a turn resolved to. On success `context` carries the replacement
/// conversation context; on error `text` carries the user-facing message.
/// A cancelled turn must never be persisted to history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnResult {
    pub status: TurnStatus,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<ConversationContext>,
    /// Remote reference of the image uploaded for this turn, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_ref: Option<String>,
}

impl TurnResult {
    pub fn success(text: impl Into<String>, context: ConversationContext) -> Self {
        Self {
            status: TurnStatus::Success,
            text: text.into(),
            context: Some(context),
            image_ref: None,
        }
    }

    pub fn with_image_ref(mut self, image_ref: Option<String>) -> Self {
        self.image_ref = image_ref;
        self
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: TurnStatus::Error,
            text: message.into(),
            context: None,
            image_ref: None,
        }
    }

    pub fn cancelled() -> Self {
        Self {
            status: TurnStatus::Cancelled,
            text: String::new(),
            context: None,
            image_ref: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == TurnStatus::Success
    }
}
