//! Shared data model for the Gemini web-transport bridge.
//!
//! Everything that crosses a crate boundary lives here: conversation
//! context and continuation ids, turn results, the error taxonomy, and
//! the relay message enums spoken between surfaces.

pub mod context;
pub mod error;
pub mod relay;

pub use context::{
    ContinuationIds, ConversationContext, ImageAttachment, TokenPair, TurnResult, TurnStatus,
};
pub use error::{EngineError, TurnError};
