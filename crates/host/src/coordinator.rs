//! The privileged coordinator: owns the session engine and the history
//! store, and services every relay action.
//!
//! Persistence policy: a successful turn is appended to the active
//! session record, or creates one if none is active. Quick asks reset to
//! a fresh context first and always start a new record, so they never
//! pollute an ongoing conversation's continuation ids. Cancelled and
//! failed turns are never persisted.

use std::time::Duration;

use anyhow::Result;
use base64::Engine as _;
use history::{HistoryStore, SessionTurn};
use parking_lot::Mutex;
use protocol::SessionEngine;
use reqwest::Client;
use shared::relay::{Action, ImagePayload, RelayEvent};
use shared::{EngineError, ImageAttachment, TurnResult};
use std::sync::Arc;
use tokio::sync::mpsc::{unbounded_channel, UnboundedSender};

pub struct Coordinator {
    engine: Arc<SessionEngine>,
    history: Mutex<HistoryStore>,
    active_session: Mutex<Option<String>>,
    http: Client,
}

impl Coordinator {
    pub fn new(engine: Arc<SessionEngine>, history: HistoryStore) -> Result<Self> {
        Ok(Self {
            engine,
            history: Mutex::new(history),
            active_session: Mutex::new(None),
            http: Client::builder().timeout(Duration::from_secs(45)).build()?,
        })
    }

    /// Service one relay action, emitting events on `reply`. Exactly one
    /// terminal event is emitted per request.
    pub async fn dispatch(&self, action: Action, reply: UnboundedSender<RelayEvent>) {
        match action {
            Action::SendPrompt { text, model, image } => {
                self.run_prompt(text, model, image, false, reply).await;
            }
            Action::QuickAsk { text, model, image } => {
                // Fresh context so the exchange saves as a clean new
                // history item.
                if let Err(e) = self.engine.reset_context() {
                    let _ = reply.send(RelayEvent::StreamDone {
                        result: TurnResult::error(e.to_string()),
                        session_id: None,
                    });
                    return;
                }
                self.run_prompt(text, model, image, true, reply).await;
            }
            Action::CancelPrompt => {
                let cancelled = self.engine.cancel();
                let _ = reply.send(RelayEvent::Cancelled { cancelled });
            }
            Action::SetContext {
                context,
                model: _,
                session_id,
            } => match self.engine.set_context(context) {
                Ok(()) => {
                    *self.active_session.lock() = session_id;
                    let _ = reply.send(RelayEvent::Ack {
                        status: "context_updated".to_string(),
                    });
                }
                Err(e) => {
                    let _ = reply.send(RelayEvent::Error {
                        message: e.to_string(),
                    });
                }
            },
            Action::ResetContext => match self.engine.reset_context() {
                Ok(()) => {
                    *self.active_session.lock() = None;
                    let _ = reply.send(RelayEvent::Ack {
                        status: "reset".to_string(),
                    });
                }
                Err(e) => {
                    let _ = reply.send(RelayEvent::Error {
                        message: e.to_string(),
                    });
                }
            },
            Action::FetchImage { url } => {
                let event = match self.fetch_image(&url).await {
                    Ok(event) => event,
                    Err(e) => RelayEvent::Error {
                        message: format!("failed to load image: {e}"),
                    },
                };
                let _ = reply.send(event);
            }
        }
    }

    async fn run_prompt(
        &self,
        text: String,
        model: String,
        image: Option<ImagePayload>,
        fresh: bool,
        reply: UnboundedSender<RelayEvent>,
    ) {
        let attachment = match image.map(decode_image).transpose() {
            Ok(attachment) => attachment,
            Err(e) => {
                let _ = reply.send(RelayEvent::StreamDone {
                    result: TurnResult::error(format!("bad image payload: {e}")),
                    session_id: None,
                });
                return;
            }
        };

        // Forward decoded partial texts as stream updates; the engine
        // guarantees the terminal result follows the last update.
        let (updates, mut update_rx) = unbounded_channel::<String>();
        let update_reply = reply.clone();
        let forwarder = tokio::spawn(async move {
            while let Some(text) = update_rx.recv().await {
                let _ = update_reply.send(RelayEvent::StreamUpdate { text });
            }
        });

        let outcome = self.engine.send_prompt(&text, &model, attachment, updates).await;
        let _ = forwarder.await;

        let result = match outcome {
            Ok(result) => result,
            Err(e @ EngineError::Busy) => TurnResult::error(e.to_string()),
        };

        let session_id = if result.is_success() {
            self.persist(&text, &result, fresh)
        } else {
            None
        };

        let _ = reply.send(RelayEvent::StreamDone { result, session_id });
    }

    /// Record a successful turn. Returns the session record id it landed
    /// in.
    fn persist(&self, prompt: &str, result: &TurnResult, fresh: bool) -> Option<String> {
        let turn = SessionTurn {
            prompt: prompt.to_string(),
            response: result.text.clone(),
            image_ref: result.image_ref.clone(),
        };

        let mut history = self.history.lock();
        let mut active = self.active_session.lock();

        if !fresh {
            if let Some(id) = active.clone() {
                match history.append(&id, turn) {
                    Ok(()) => return Some(id),
                    Err(e) => {
                        tracing::warn!(error = %e, "failed to append turn to history");
                        return None;
                    }
                }
            }
        }

        match history.create(turn) {
            Ok(record) => {
                // The engine context now belongs to this conversation, so
                // follow-up prompts append here.
                *active = Some(record.id.clone());
                Some(record.id)
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to save history record");
                None
            }
        }
    }

    /// Privileged fetch of a remote image into a base64 payload. Page
    /// surfaces cannot fetch cross-origin themselves.
    async fn fetch_image(&self, url: &str) -> Result<RelayEvent> {
        let resp = self.http.get(url).send().await?.error_for_status()?;
        let mime = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("image/png")
            .to_string();
        let name = url
            .rsplit('/')
            .next()
            .filter(|s| !s.is_empty())
            .unwrap_or("image")
            .to_string();
        let bytes = resp.bytes().await?;
        Ok(RelayEvent::Image {
            base64: base64::engine::general_purpose::STANDARD.encode(&bytes),
            mime,
            name,
        })
    }
}

fn decode_image(payload: ImagePayload) -> Result<ImageAttachment> {
    let data = base64::engine::general_purpose::STANDARD.decode(payload.base64.as_bytes())?;
    Ok(ImageAttachment {
        data,
        name: payload.name,
        mime: payload.mime,
    })
}
