//! The conversation session engine.
//!
//! Owns the current [`ConversationContext`] and enforces the
//! single-in-flight invariant: at most one turn is ever being processed,
//! and its presence is the lock. A turn sequences credential acquisition,
//! optional image upload, envelope encoding, and the streaming request,
//! all cancellable through one shared signal. The stored context is
//! replaced wholesale on success and left untouched on error or
//! cancellation.

use std::sync::Arc;

use parking_lot::Mutex;
use shared::{ConversationContext, EngineError, ImageAttachment, TurnError, TurnResult};
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;

use crate::auth::TokenSource;
use crate::stream::{TurnRequest, TurnTransport};
use crate::upload::MediaUploader;
use crate::wire::ImageRef;

/// The single in-flight turn; holding one is what makes the engine busy.
struct PendingTurn {
    cancel: CancellationToken,
}

struct EngineState {
    context: ConversationContext,
    pending: Option<PendingTurn>,
}

/// Session engine over injectable protocol collaborators.
///
/// Policy: a prompt issued while a turn is in flight is rejected with
/// [`EngineError::Busy`]; callers wanting to supersede must cancel
/// explicitly first.
pub struct SessionEngine {
    tokens: Arc<dyn TokenSource>,
    uploader: Arc<dyn MediaUploader>,
    transport: Arc<dyn TurnTransport>,
    state: Mutex<EngineState>,
}

impl SessionEngine {
    pub fn new(
        tokens: Arc<dyn TokenSource>,
        uploader: Arc<dyn MediaUploader>,
        transport: Arc<dyn TurnTransport>,
    ) -> Self {
        Self {
            tokens,
            uploader,
            transport,
            state: Mutex::new(EngineState {
                context: ConversationContext::fresh(),
                pending: None,
            }),
        }
    }

    /// Snapshot of the current context.
    pub fn context(&self) -> ConversationContext {
        self.state.lock().context.clone()
    }

    pub fn is_busy(&self) -> bool {
        self.state.lock().pending.is_some()
    }

    /// Run one turn. Streams each newly decoded full-so-far text over
    /// `updates`; the returned result logically follows the last update.
    pub async fn send_prompt(
        &self,
        text: &str,
        model: &str,
        image: Option<ImageAttachment>,
        updates: UnboundedSender<String>,
    ) -> Result<TurnResult, EngineError> {
        // Acquiring the pending slot and snapshotting the context happen
        // under one lock; nothing else may touch the context while busy.
        let (cancel, context) = {
            let mut state = self.state.lock();
            if state.pending.is_some() {
                return Err(EngineError::Busy);
            }
            let cancel = CancellationToken::new();
            state.pending = Some(PendingTurn {
                cancel: cancel.clone(),
            });
            (cancel, state.context.clone())
        };

        let outcome = self
            .run_turn(text, model, image, context, &cancel, updates)
            .await;

        let mut state = self.state.lock();
        state.pending = None;
        Ok(match outcome {
            Ok((text, new_context, image_ref)) => {
                state.context = new_context.clone();
                TurnResult::success(text, new_context).with_image_ref(image_ref)
            }
            Err(e) if e.is_cancelled() => {
                tracing::debug!("turn cancelled");
                TurnResult::cancelled()
            }
            Err(e) => {
                tracing::warn!(error = %e, "turn failed");
                TurnResult::error(e.to_string())
            }
        })
    }

    async fn run_turn(
        &self,
        text: &str,
        model: &str,
        image: Option<ImageAttachment>,
        mut context: ConversationContext,
        cancel: &CancellationToken,
        updates: UnboundedSender<String>,
    ) -> Result<(String, ConversationContext, Option<String>), TurnError> {
        // First turn of a fresh conversation: fetch the token pair.
        if !context.has_tokens() {
            context.tokens = Some(self.tokens.acquire(cancel).await?);
        }

        let image_ref = match image {
            Some(attachment) => {
                let url = self.uploader.upload(&attachment, cancel).await?;
                Some(ImageRef {
                    url,
                    name: attachment.name,
                })
            }
            None => None,
        };

        let outcome = self
            .transport
            .execute(
                TurnRequest {
                    prompt: text.to_string(),
                    model: model.to_string(),
                    context: context.clone(),
                    image: image_ref.clone(),
                },
                cancel.clone(),
                updates,
            )
            .await?;

        // A cancellation that raced stream completion still wins; partial
        // state is discarded either way.
        if cancel.is_cancelled() {
            return Err(TurnError::Cancelled);
        }

        // Continuation ids are replaced only as a complete triple; a
        // response without one keeps the conversation where it was.
        if let Some(ids) = outcome.ids {
            context.ids = ids;
        }
        Ok((outcome.text, context, image_ref.map(|r| r.url)))
    }

    /// Signal the active turn's cancellation handle. Advisory: in-flight
    /// awaits observe the signal rather than being killed. Returns false
    /// when idle.
    pub fn cancel(&self) -> bool {
        let state = self.state.lock();
        match &state.pending {
            Some(pending) => {
                pending.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Replace the stored context wholesale (switching to a saved
    /// conversation). Only valid while idle.
    pub fn set_context(&self, context: ConversationContext) -> Result<(), EngineError> {
        let mut state = self.state.lock();
        if state.pending.is_some() {
            return Err(EngineError::Busy);
        }
        state.context = context;
        Ok(())
    }

    /// Start over with a token-less, id-less context. Only valid while
    /// idle.
    pub fn reset_context(&self) -> Result<(), EngineError> {
        self.set_context(ConversationContext::fresh())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::StreamOutcome;
    use async_trait::async_trait;
    use shared::{ContinuationIds, TokenPair};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::mpsc::unbounded_channel;
    use tokio::sync::Notify;

    fn token_pair() -> TokenPair {
        TokenPair {
            auth_token: "at_test".into(),
            routing_token: "bl_test".into(),
        }
    }

    struct StaticTokens {
        calls: AtomicUsize,
    }

    impl StaticTokens {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl TokenSource for StaticTokens {
        async fn acquire(&self, _cancel: &CancellationToken) -> Result<TokenPair, TurnError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(token_pair())
        }
    }

    struct StaticUploader;

    #[async_trait]
    impl MediaUploader for StaticUploader {
        async fn upload(
            &self,
            image: &ImageAttachment,
            _cancel: &CancellationToken,
        ) -> Result<String, TurnError> {
            Ok(format!("https://uploads.test/{}", image.name))
        }
    }

    /// Scripted transport: emits the given texts as updates, then the
    /// outcome. Records every request and tracks concurrent executions.
    struct ScriptedTransport {
        updates: Vec<&'static str>,
        outcome: fn() -> Result<StreamOutcome, TurnError>,
        requests: Mutex<Vec<TurnRequest>>,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        hold: Option<Arc<Notify>>,
    }

    impl ScriptedTransport {
        fn new(
            updates: Vec<&'static str>,
            outcome: fn() -> Result<StreamOutcome, TurnError>,
        ) -> Arc<Self> {
            Arc::new(Self {
                updates,
                outcome,
                requests: Mutex::new(Vec::new()),
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
                hold: None,
            })
        }

        fn held(
            updates: Vec<&'static str>,
            outcome: fn() -> Result<StreamOutcome, TurnError>,
            hold: Arc<Notify>,
        ) -> Arc<Self> {
            Arc::new(Self {
                updates,
                outcome,
                requests: Mutex::new(Vec::new()),
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
                hold: Some(hold),
            })
        }
    }

    #[async_trait]
    impl TurnTransport for ScriptedTransport {
        async fn execute(
            &self,
            request: TurnRequest,
            cancel: CancellationToken,
            updates: UnboundedSender<String>,
        ) -> Result<StreamOutcome, TurnError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            self.requests.lock().push(request);

            for text in &self.updates {
                let _ = updates.send(text.to_string());
            }
            if let Some(hold) = &self.hold {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        self.in_flight.fetch_sub(1, Ordering::SeqCst);
                        return Err(TurnError::Cancelled);
                    }
                    _ = hold.notified() => {}
                }
            }

            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            (self.outcome)()
        }
    }

    fn success_outcome() -> Result<StreamOutcome, TurnError> {
        Ok(StreamOutcome {
            text: "Hi there".into(),
            ids: Some(ContinuationIds::new("c1", "r1", "rc1")),
        })
    }

    fn engine_with(transport: Arc<ScriptedTransport>) -> (SessionEngine, Arc<StaticTokens>) {
        let tokens = StaticTokens::new();
        let engine = SessionEngine::new(tokens.clone(), Arc::new(StaticUploader), transport);
        (engine, tokens)
    }

    #[tokio::test]
    async fn successful_turn_updates_context_and_streams_in_order() {
        let transport = ScriptedTransport::new(vec!["Hi", "Hi there"], success_outcome);
        let (engine, tokens) = engine_with(transport.clone());

        let (tx, mut rx) = unbounded_channel();
        let result = engine.send_prompt("hello", "flash", None, tx).await.unwrap();

        assert!(result.is_success());
        assert_eq!(result.text, "Hi there");
        assert_eq!(rx.recv().await.as_deref(), Some("Hi"));
        assert_eq!(rx.recv().await.as_deref(), Some("Hi there"));
        assert_eq!(engine.context().ids, ContinuationIds::new("c1", "r1", "rc1"));
        assert_eq!(tokens.calls.load(Ordering::SeqCst), 1);
        assert!(!engine.is_busy());
    }

    #[tokio::test]
    async fn tokens_are_acquired_only_for_fresh_contexts() {
        let transport = ScriptedTransport::new(vec![], success_outcome);
        let (engine, tokens) = engine_with(transport);

        let mut ctx = ConversationContext::fresh();
        ctx.tokens = Some(token_pair());
        engine.set_context(ctx).unwrap();

        let (tx, _rx) = unbounded_channel();
        engine.send_prompt("hi", "flash", None, tx).await.unwrap();
        assert_eq!(tokens.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn continuation_ids_propagate_into_the_next_request() {
        let transport = ScriptedTransport::new(vec![], success_outcome);
        let (engine, _) = engine_with(transport.clone());

        let (tx, _rx) = unbounded_channel();
        engine.send_prompt("first", "flash", None, tx).await.unwrap();
        let (tx, _rx) = unbounded_channel();
        engine.send_prompt("second", "flash", None, tx).await.unwrap();

        let requests = transport.requests.lock();
        assert_eq!(requests[0].context.ids, ContinuationIds::default());
        assert_eq!(requests[1].context.ids, ContinuationIds::new("c1", "r1", "rc1"));
    }

    #[tokio::test]
    async fn second_prompt_while_busy_is_rejected_without_a_second_stream() {
        let hold = Arc::new(Notify::new());
        let transport = ScriptedTransport::held(vec![], success_outcome, hold.clone());
        let tokens = StaticTokens::new();
        let engine = Arc::new(SessionEngine::new(
            tokens,
            Arc::new(StaticUploader),
            transport.clone(),
        ));

        let (tx, _rx) = unbounded_channel();
        let first = {
            let engine = engine.clone();
            tokio::spawn(async move { engine.send_prompt("first", "flash", None, tx).await })
        };
        // Wait until the first turn reaches the transport.
        while transport.requests.lock().is_empty() {
            tokio::task::yield_now().await;
        }

        let (tx2, _rx2) = unbounded_channel();
        let second = engine.send_prompt("second", "flash", None, tx2).await;
        assert_eq!(second.unwrap_err(), EngineError::Busy);

        hold.notify_one();
        assert!(first.await.unwrap().unwrap().is_success());
        assert_eq!(transport.max_in_flight.load(Ordering::SeqCst), 1);
        assert_eq!(transport.requests.lock().len(), 1);
    }

    #[tokio::test]
    async fn cancellation_discards_partial_state() {
        let hold = Arc::new(Notify::new());
        let transport = ScriptedTransport::held(vec!["partial"], success_outcome, hold);
        let tokens = StaticTokens::new();
        let engine = Arc::new(SessionEngine::new(
            tokens,
            Arc::new(StaticUploader),
            transport,
        ));
        let before = engine.context();

        let (tx, mut rx) = unbounded_channel();
        let turn = {
            let engine = engine.clone();
            tokio::spawn(async move { engine.send_prompt("hi", "flash", None, tx).await })
        };
        // One chunk has arrived; cancel mid-stream.
        assert_eq!(rx.recv().await.as_deref(), Some("partial"));
        while !engine.is_busy() {
            tokio::task::yield_now().await;
        }
        assert!(engine.cancel());

        let result = turn.await.unwrap().unwrap();
        assert_eq!(result.status, shared::TurnStatus::Cancelled);
        assert_eq!(engine.context(), before);
        assert!(!engine.is_busy());
    }

    #[tokio::test]
    async fn cancel_while_idle_is_a_no_op() {
        let transport = ScriptedTransport::new(vec![], success_outcome);
        let (engine, _) = engine_with(transport);
        assert!(!engine.cancel());
    }

    #[tokio::test]
    async fn empty_stream_fails_the_turn_and_leaves_context_alone() {
        let transport = ScriptedTransport::new(vec![], || Err(TurnError::EmptyStream));
        let (engine, _) = engine_with(transport);
        let before = engine.context();

        let (tx, _rx) = unbounded_channel();
        let result = engine.send_prompt("hi", "flash", None, tx).await.unwrap();

        assert_eq!(result.status, shared::TurnStatus::Error);
        assert_eq!(engine.context(), before);
        assert!(!engine.is_busy());
    }

    #[tokio::test]
    async fn auth_failure_surfaces_and_engine_recovers() {
        struct FailingTokens;
        #[async_trait]
        impl TokenSource for FailingTokens {
            async fn acquire(&self, _: &CancellationToken) -> Result<TokenPair, TurnError> {
                Err(TurnError::Auth("markup changed".into()))
            }
        }
        let transport = ScriptedTransport::new(vec![], success_outcome);
        let engine = SessionEngine::new(Arc::new(FailingTokens), Arc::new(StaticUploader), transport.clone());

        let (tx, _rx) = unbounded_channel();
        let result = engine.send_prompt("hi", "flash", None, tx).await.unwrap();
        assert_eq!(result.status, shared::TurnStatus::Error);
        assert!(result.text.contains("authentication"));
        // The transport was never reached and a new prompt can proceed.
        assert!(transport.requests.lock().is_empty());
        assert!(!engine.is_busy());
    }

    #[tokio::test]
    async fn partial_id_triple_keeps_previous_ids() {
        let transport = ScriptedTransport::new(vec![], || {
            Ok(StreamOutcome {
                text: "ok".into(),
                ids: None,
            })
        });
        let (engine, _) = engine_with(transport);

        let mut ctx = ConversationContext::fresh();
        ctx.tokens = Some(token_pair());
        ctx.ids = ContinuationIds::new("c0", "r0", "rc0");
        engine.set_context(ctx).unwrap();

        let (tx, _rx) = unbounded_channel();
        let result = engine.send_prompt("hi", "flash", None, tx).await.unwrap();
        assert!(result.is_success());
        assert_eq!(engine.context().ids, ContinuationIds::new("c0", "r0", "rc0"));
    }

    #[tokio::test]
    async fn reset_context_is_idempotent() {
        let transport = ScriptedTransport::new(vec![], success_outcome);
        let (engine, _) = engine_with(transport);

        let (tx, _rx) = unbounded_channel();
        engine.send_prompt("hi", "flash", None, tx).await.unwrap();
        assert!(!engine.context().ids.is_empty());

        for _ in 0..3 {
            engine.reset_context().unwrap();
            let ctx = engine.context();
            assert!(ctx.ids.is_empty());
            assert!(!ctx.has_tokens());
        }
    }

    #[tokio::test]
    async fn image_turns_upload_before_the_stream_request() {
        let transport = ScriptedTransport::new(vec![], success_outcome);
        let (engine, _) = engine_with(transport.clone());

        let (tx, _rx) = unbounded_channel();
        let image = ImageAttachment {
            data: vec![0xFF, 0xD8],
            name: "photo.jpg".into(),
            mime: "image/jpeg".into(),
        };
        engine
            .send_prompt("what is this", "flash", Some(image), tx)
            .await
            .unwrap();

        let requests = transport.requests.lock();
        let image_ref = requests[0].image.as_ref().unwrap();
        assert_eq!(image_ref.url, "https://uploads.test/photo.jpg");
        assert_eq!(image_ref.name, "photo.jpg");
    }
}
