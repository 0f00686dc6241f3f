//! Cross-surface message relay.
//!
//! Surfaces cannot call each other directly; each one holds a
//! [`RelayConnection`] and speaks tagged [`Action`] messages. A request
//! opens a reply channel that stays open until the terminal
//! [`RelayEvent`] arrives; streaming requests deliver their updates over
//! the same channel first. Delivery is at-most-once and unordered across
//! independent requests; events within one request arrive in emission
//! order because one dispatch task produces them sequentially.

use std::sync::Arc;

use shared::relay::{Action, RelayEvent, Surface};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

use crate::coordinator::Coordinator;

/// One routed request: who asked, what they asked, where replies go.
struct Envelope {
    origin: Surface,
    action: Action,
    reply: UnboundedSender<RelayEvent>,
}

/// The hub owned by the privileged surface. Routes envelopes to the
/// coordinator; each request is dispatched on its own task so a
/// `CancelPrompt` can land while a prompt is still streaming.
pub struct Relay {
    requests: UnboundedSender<Envelope>,
}

impl Relay {
    pub fn new(coordinator: Arc<Coordinator>) -> Self {
        let (tx, mut rx) = unbounded_channel::<Envelope>();
        tokio::spawn(async move {
            while let Some(envelope) = rx.recv().await {
                let coordinator = coordinator.clone();
                tokio::spawn(async move {
                    tracing::debug!(origin = ?envelope.origin, "dispatching relay request");
                    coordinator
                        .dispatch(envelope.action, envelope.reply)
                        .await;
                });
            }
        });
        Self { requests: tx }
    }

    /// Hand a surface its connection to the hub.
    pub fn connect(&self, surface: Surface) -> RelayConnection {
        RelayConnection {
            surface,
            requests: self.requests.clone(),
        }
    }
}

/// A surface's handle for talking to the coordinator.
#[derive(Clone)]
pub struct RelayConnection {
    surface: Surface,
    requests: UnboundedSender<Envelope>,
}

impl RelayConnection {
    /// Send a request; the returned receiver yields zero or more
    /// non-terminal events followed by exactly one terminal event, after
    /// which the channel closes.
    pub fn request(&self, action: Action) -> UnboundedReceiver<RelayEvent> {
        let (reply, rx) = unbounded_channel();
        let _ = self.requests.send(Envelope {
            origin: self.surface,
            action,
            reply,
        });
        rx
    }

    /// Convenience for non-streaming requests: drain to the terminal
    /// event. `None` means the hub went away.
    pub async fn request_terminal(&self, action: Action) -> Option<RelayEvent> {
        let mut rx = self.request(action);
        let mut last = None;
        while let Some(event) = rx.recv().await {
            let terminal = event.is_terminal();
            last = Some(event);
            if terminal {
                break;
            }
        }
        last
    }

    /// Connection for a sandboxed frame that cannot reach the hub
    /// directly: its envelopes are forwarded verbatim through this
    /// embedding connection.
    pub fn embed(&self) -> RelayConnection {
        let (tx, mut rx) = unbounded_channel::<Envelope>();
        let parent = self.requests.clone();
        tokio::spawn(async move {
            while let Some(envelope) = rx.recv().await {
                if parent.send(envelope).is_err() {
                    break;
                }
            }
        });
        RelayConnection {
            surface: Surface::Panel,
            requests: tx,
        }
    }
}
