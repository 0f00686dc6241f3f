//! Reverse-engineered client for the Gemini web transport.
//!
//! The modules mirror the turn pipeline: [`auth`] scrapes the page-derived
//! token pair, [`upload`] pushes image bytes through the two-phase upload,
//! [`wire`] encodes the positional request envelope and decodes streamed
//! response frames, [`stream`] drives the chunked HTTP response through
//! the codec, and [`engine`] sequences all of it under the
//! single-in-flight invariant. [`config`] isolates the opaque protocol
//! constants everything else is parameterized on.

pub mod auth;
pub mod config;
pub mod engine;
pub mod lines;
pub mod stream;
pub mod upload;
pub mod wire;

pub use auth::{PageTokenSource, TokenSource};
pub use config::WireConfig;
pub use engine::SessionEngine;
pub use stream::{GeminiTransport, StreamOutcome, TurnRequest, TurnTransport};
pub use upload::{GoogleUploader, MediaUploader};
pub use wire::{DecodedLine, ImageRef};
