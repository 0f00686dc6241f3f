//! Streaming transport: executes one encoded turn against the service
//! and incrementally decodes the newline-delimited response body.
//!
//! Each decodable line carries the full response so far, so the last
//! successful decode is authoritative. Undecodable lines are normal
//! framing noise and are skipped without aborting the stream.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use futures::StreamExt;
use rand::Rng;
use reqwest::Client;
use shared::{ContinuationIds, ConversationContext, TurnError};
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;

use crate::config::WireConfig;
use crate::lines::LineBuffer;
use crate::wire::{self, DecodedLine, ImageRef};

/// One fully prepared turn handed to the transport.
#[derive(Debug, Clone)]
pub struct TurnRequest {
    pub prompt: String,
    pub model: String,
    pub context: ConversationContext,
    pub image: Option<ImageRef>,
}

/// What a completed stream resolved to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamOutcome {
    pub text: String,
    pub ids: Option<ContinuationIds>,
}

/// Seam for the streaming request, injectable for engine tests.
#[async_trait]
pub trait TurnTransport: Send + Sync {
    /// Execute the turn, forwarding each newly decoded full-so-far text
    /// over `updates` in decode order. Resolves only after the terminal
    /// outcome is known; a cancellation discards any partial decode.
    async fn execute(
        &self,
        request: TurnRequest,
        cancel: CancellationToken,
        updates: UnboundedSender<String>,
    ) -> Result<StreamOutcome, TurnError>;
}

/// Accumulates the stream: splits bytes into lines, decodes them, and
/// keeps the latest good decode as the current best result.
struct StreamDecoder {
    lines: LineBuffer,
    best: Option<DecodedLine>,
}

impl StreamDecoder {
    fn new() -> Self {
        Self {
            lines: LineBuffer::new(),
            best: None,
        }
    }

    /// Feed one chunk; returns the texts of any newly decoded frames, in
    /// decode order.
    fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut texts = Vec::new();
        for line in self.lines.feed(chunk) {
            if let Some(decoded) = wire::decode_line(&line) {
                texts.push(decoded.text.clone());
                self.best = Some(decoded);
            }
        }
        texts
    }

    /// Stream ended: decode the carried-over trailing line, then resolve
    /// to the last good decode or `EmptyStream`.
    fn finish(mut self) -> Result<StreamOutcome, TurnError> {
        if let Some(tail) = self.lines.flush() {
            if let Some(decoded) = wire::decode_line(&tail) {
                self.best = Some(decoded);
            }
        }
        match self.best {
            Some(decoded) => Ok(StreamOutcome {
                text: decoded.text,
                ids: decoded.ids,
            }),
            None => Err(TurnError::EmptyStream),
        }
    }
}

/// Production transport for the streaming generate endpoint.
pub struct GeminiTransport {
    http: Client,
    config: Arc<WireConfig>,
}

impl GeminiTransport {
    pub fn new(config: Arc<WireConfig>) -> Result<Self> {
        // No total timeout: a stream stays open as long as the model
        // generates. Cancellation is caller-driven.
        Ok(Self {
            http: Client::builder()
                .connect_timeout(Duration::from_secs(30))
                .cookie_store(true)
                .build()?,
            config,
        })
    }
}

#[async_trait]
impl TurnTransport for GeminiTransport {
    async fn execute(
        &self,
        request: TurnRequest,
        cancel: CancellationToken,
        updates: UnboundedSender<String>,
    ) -> Result<StreamOutcome, TurnError> {
        let tokens = request
            .context
            .tokens
            .as_ref()
            .ok_or_else(|| TurnError::Auth("context carries no token pair".to_string()))?;

        let envelope = wire::encode_envelope(
            &request.prompt,
            &request.context.ids,
            request.image.as_ref(),
            &self.config,
        );

        let reqid = rand::thread_rng().gen_range(100_000u32..1_000_000).to_string();
        let open = self
            .http
            .post(&self.config.stream_endpoint)
            .query(&[
                ("bl", tokens.routing_token.as_str()),
                ("_reqid", reqid.as_str()),
                ("rt", "c"),
            ])
            .form(&[
                ("at", tokens.auth_token.as_str()),
                ("f.req", envelope.as_str()),
            ])
            .send();

        let resp = tokio::select! {
            _ = cancel.cancelled() => return Err(TurnError::Cancelled),
            r = open => r.map_err(|e| TurnError::Network(e.to_string()))?,
        };
        if !resp.status().is_success() {
            return Err(TurnError::Network(format!(
                "stream endpoint returned {}",
                resp.status()
            )));
        }

        tracing::debug!(model = %request.model, reqid = %reqid, "stream opened");

        let mut decoder = StreamDecoder::new();
        let mut body = resp.bytes_stream();
        loop {
            let chunk = tokio::select! {
                _ = cancel.cancelled() => return Err(TurnError::Cancelled),
                chunk = body.next() => chunk,
            };
            match chunk {
                Some(Ok(bytes)) => {
                    for text in decoder.feed(&bytes) {
                        // Receiver gone means the caller stopped listening;
                        // the terminal result still gets returned.
                        let _ = updates.send(text);
                    }
                }
                Some(Err(e)) => return Err(TurnError::Network(e.to_string())),
                None => break,
            }
        }

        decoder.finish()
    }
}
