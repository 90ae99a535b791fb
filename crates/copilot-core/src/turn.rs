//! One conversational turn: user message, relay call, revealed reply.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::Error;
use crate::message::Message;
use crate::preview::{self, Preview};
use crate::relay::Relay;
use crate::reveal::Revealer;
use crate::segment::{segment, Span};
use crate::session::Session;

/// Substituted when the relay answers with an empty reply.
pub const EMPTY_REPLY: &str = "No response from backend";

/// The assistant message appended when a turn fails.
pub fn error_reply(error: &Error) -> String {
    format!(
        "Sorry, I encountered an error: {}. Please check your API key and try again.",
        error
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnOutcome {
    /// Blank input; nothing was sent.
    Ignored,
    /// The reply was revealed (or shown at once when `skipped`) and committed.
    Completed { message_id: u64, skipped: bool },
    /// The relay failed; an error message was appended instead.
    Failed { message_id: u64 },
}

/// Receives the visible effects of a turn.
pub trait TurnObserver {
    fn on_message_appended(&mut self, _message: &Message) {}

    /// The relay request is in flight.
    fn on_waiting(&mut self) {}

    fn on_reveal_tick(&mut self, _message_id: u64, _spans: &[Span<'_>]) {}

    /// Final, stable segmentation of the committed reply.
    fn on_reveal_complete(&mut self, _message: &Message, _spans: &[Span<'_>]) {}

    fn on_preview(&mut self, _preview: &Preview) {}
}

/// Observer that ignores everything.
pub struct NoopObserver;

impl TurnObserver for NoopObserver {}

enum RevealEvent {
    Tick(String),
    Complete(String),
}

/// Runs turns for one conversation. Owns the conversation's reveal slot.
pub struct TurnRunner {
    relay: Arc<dyn Relay>,
    revealer: Revealer,
    animate: bool,
}

impl TurnRunner {
    pub fn new(relay: Arc<dyn Relay>, revealer: Revealer) -> Self {
        Self {
            relay,
            revealer,
            animate: true,
        }
    }

    /// Commit replies immediately instead of revealing them.
    pub fn with_animation(mut self, animate: bool) -> Self {
        self.animate = animate;
        self
    }

    pub async fn send(
        &mut self,
        session: &mut Session,
        input: &str,
        observer: &mut dyn TurnObserver,
    ) -> TurnOutcome {
        self.send_with_skip(session, input, observer, &CancellationToken::new())
            .await
    }

    /// Like [`send`](Self::send); cancelling `skip` ends the reveal early and
    /// commits the full reply at once.
    pub async fn send_with_skip(
        &mut self,
        session: &mut Session,
        input: &str,
        observer: &mut dyn TurnObserver,
        skip: &CancellationToken,
    ) -> TurnOutcome {
        if input.trim().is_empty() {
            return TurnOutcome::Ignored;
        }

        self.revealer.stop_and_wait().await;

        observer.on_message_appended(session.push_user(input));

        let request = session.relay_request();
        debug!(
            relay = self.relay.name(),
            messages = request.messages.len(),
            "Sending turn"
        );
        observer.on_waiting();

        let started = Instant::now();
        let result = match request.validate() {
            Ok(()) => self.relay.complete(request).await,
            Err(e) => Err(e),
        };

        let reply = match result {
            Ok(reply) if reply.reply.is_empty() => EMPTY_REPLY.to_string(),
            Ok(reply) => reply.reply,
            Err(e) => {
                warn!(relay = self.relay.name(), "Relay call failed: {}", e);
                let message = session.push_assistant(error_reply(&e));
                observer.on_message_appended(message);
                return TurnOutcome::Failed {
                    message_id: message.id,
                };
            }
        };

        info!(
            chars = reply.chars().count(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Reply received"
        );

        let placeholder = session.push_assistant("");
        let message_id = placeholder.id;
        observer.on_message_appended(placeholder);

        let (text, skipped) = if self.animate {
            self.reveal(message_id, reply, observer, skip).await
        } else {
            (reply, false)
        };

        self.commit(session, message_id, text, observer);
        TurnOutcome::Completed {
            message_id,
            skipped,
        }
    }

    async fn reveal(
        &mut self,
        message_id: u64,
        reply: String,
        observer: &mut dyn TurnObserver,
        skip: &CancellationToken,
    ) -> (String, bool) {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let tick_tx = tx.clone();

        self.revealer
            .start(
                reply.clone(),
                move |prefix: &str| {
                    let _ = tick_tx.send(RevealEvent::Tick(prefix.to_string()));
                },
                move |target: String| {
                    let _ = tx.send(RevealEvent::Complete(target));
                },
            )
            .await;

        loop {
            tokio::select! {
                biased;
                _ = skip.cancelled() => {
                    self.revealer.stop_and_wait().await;
                    debug!(message_id, "Reveal skipped");
                    return (reply, true);
                }
                event = rx.recv() => match event {
                    Some(RevealEvent::Tick(prefix)) => {
                        observer.on_reveal_tick(message_id, &segment(&prefix));
                    }
                    Some(RevealEvent::Complete(target)) => return (target, false),
                    // The reveal was stopped from elsewhere.
                    None => return (reply, true),
                }
            }
        }
    }

    fn commit(
        &self,
        session: &mut Session,
        message_id: u64,
        text: String,
        observer: &mut dyn TurnObserver,
    ) {
        let content = match session.complete_assistant(message_id, text) {
            Ok(message) => {
                observer.on_reveal_complete(message, &segment(&message.content));
                message.content.clone()
            }
            Err(e) => {
                warn!("Failed to commit reply: {}", e);
                return;
            }
        };

        if let Some(code) = preview::scan(&content) {
            debug!(message_id, len = code.len(), "Opening preview");
            session.show_preview(code);
            observer.on_preview(session.preview());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Role;
    use crate::store::{load_json, MemoryStore, MESSAGES_KEY};
    use crate::testing::{MockRelay, RecordingObserver};
    use std::time::Duration;

    fn fixture(relay: &Arc<MockRelay>) -> (TurnRunner, Session, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let session = Session::load(Box::new(Arc::clone(&store)), "system").unwrap();
        let runner = TurnRunner::new(
            Arc::clone(relay) as Arc<dyn Relay>,
            Revealer::new(Duration::from_millis(1)),
        );
        (runner, session, store)
    }

    #[tokio::test]
    async fn test_reply_is_revealed_then_committed() {
        let relay = Arc::new(MockRelay::new());
        relay.queue_reply("hi");
        let (mut runner, mut session, store) = fixture(&relay);
        let mut observer = RecordingObserver::default();

        let outcome = runner.send(&mut session, "hello", &mut observer).await;

        let message_id = session.messages()[1].id;
        assert_eq!(
            outcome,
            TurnOutcome::Completed {
                message_id,
                skipped: false
            }
        );
        assert_eq!(observer.ticks, vec!["h", "hi"]);
        assert_eq!(observer.appended.len(), 2);
        assert_eq!(observer.appended[1].role, Role::Assistant);
        assert_eq!(observer.appended[1].content, "");
        assert_eq!(observer.completed[0].content, "hi");

        assert_eq!(session.messages()[1].content, "hi");
        let stored: Vec<Message> = load_json(store.as_ref(), MESSAGES_KEY).unwrap().unwrap();
        assert_eq!(stored[1].content, "hi");
    }

    #[tokio::test]
    async fn test_request_carries_system_prompt_and_history() {
        let relay = Arc::new(MockRelay::new());
        relay.queue_reply("first");
        relay.queue_reply("second");
        let (mut runner, mut session, _store) = fixture(&relay);
        let mut observer = RecordingObserver::default();

        runner.send(&mut session, "one", &mut observer).await;
        runner.send(&mut session, "two", &mut observer).await;

        assert_eq!(relay.request_count(), 2);
        let request = relay.last_request().unwrap();
        let contents: Vec<&str> = request.messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["system", "one", "first", "two"]);
        assert_eq!(request.messages[0].role, Role::System);
    }

    #[tokio::test]
    async fn test_ticks_carry_partial_code_spans() {
        let relay = Arc::new(MockRelay::new());
        relay.queue_reply("a```py\nx\n```");
        let (mut runner, mut session, _store) = fixture(&relay);
        let mut observer = RecordingObserver::default();

        runner.send(&mut session, "code please", &mut observer).await;

        assert!(observer.open_code_ticks > 0);
        assert_eq!(observer.ticks.last().map(String::as_str), Some("a```py\nx\n```"));
    }

    #[tokio::test]
    async fn test_preview_opens_for_first_allowed_block() {
        let relay = Arc::new(MockRelay::new());
        relay.queue_reply("```rust\nfn f() {}\n```\n```html\n<b>hi</b>\n```\n```css\nb {}\n```");
        let (mut runner, mut session, _store) = fixture(&relay);
        let mut observer = RecordingObserver::default();

        runner.send(&mut session, "page", &mut observer).await;

        assert_eq!(session.preview().code, "<b>hi</b>\n");
        assert!(session.preview().visible);
        assert_eq!(observer.previews.len(), 1);
    }

    #[tokio::test]
    async fn test_no_block_leaves_preview_untouched() {
        let relay = Arc::new(MockRelay::new());
        relay.queue_reply("plain answer");
        let (mut runner, mut session, _store) = fixture(&relay);
        session.show_preview("kept");
        let mut observer = RecordingObserver::default();

        runner.send(&mut session, "q", &mut observer).await;

        assert_eq!(session.preview().code, "kept");
        assert!(observer.previews.is_empty());
    }

    #[tokio::test]
    async fn test_relay_failure_appends_error_message() {
        let relay = Arc::new(MockRelay::new());
        relay.queue_error(Error::upstream("boom"));
        let (mut runner, mut session, _store) = fixture(&relay);
        let mut observer = RecordingObserver::default();

        let outcome = runner.send(&mut session, "hello", &mut observer).await;

        let last = session.messages().last().unwrap();
        assert_eq!(outcome, TurnOutcome::Failed { message_id: last.id });
        assert_eq!(last.role, Role::Assistant);
        assert_eq!(
            last.content,
            "Sorry, I encountered an error: Upstream request failed: boom. \
             Please check your API key and try again."
        );
        assert!(observer.ticks.is_empty());
        assert!(observer.completed.is_empty());
    }

    #[tokio::test]
    async fn test_every_relay_error_kind_is_recovered() {
        let errors = [
            Error::relay_unavailable("API key not configured"),
            Error::malformed_response("No choices in response"),
        ];
        for error in errors {
            let expected = error_reply(&error);
            let relay = Arc::new(MockRelay::new());
            relay.queue_error(error);
            let (mut runner, mut session, _store) = fixture(&relay);
            let mut observer = RecordingObserver::default();

            let outcome = runner.send(&mut session, "hello", &mut observer).await;

            let last = session.messages().last().unwrap();
            assert_eq!(outcome, TurnOutcome::Failed { message_id: last.id });
            assert_eq!(last.role, Role::Assistant);
            assert_eq!(last.content, expected);
            assert_eq!(session.messages().len(), 2);
            assert!(observer.ticks.is_empty());
            assert!(observer.completed.is_empty());
        }
    }

    #[tokio::test]
    async fn test_blank_input_is_ignored() {
        let relay = Arc::new(MockRelay::new());
        let (mut runner, mut session, _store) = fixture(&relay);
        let mut observer = RecordingObserver::default();

        let outcome = runner.send(&mut session, "   ", &mut observer).await;

        assert_eq!(outcome, TurnOutcome::Ignored);
        assert_eq!(relay.request_count(), 0);
        assert!(session.messages().is_empty());
    }

    #[tokio::test]
    async fn test_empty_reply_is_replaced() {
        let relay = Arc::new(MockRelay::new());
        relay.queue_reply("");
        let (mut runner, mut session, _store) = fixture(&relay);

        runner.send(&mut session, "hi", &mut NoopObserver).await;

        assert_eq!(session.messages()[1].content, EMPTY_REPLY);
    }

    #[tokio::test]
    async fn test_skip_commits_full_reply() {
        let relay = Arc::new(MockRelay::new());
        relay.queue_reply("a reply that would take a minute per character");
        let store = Arc::new(MemoryStore::new());
        let mut session = Session::load(Box::new(Arc::clone(&store)), "").unwrap();
        let mut runner = TurnRunner::new(
            Arc::clone(&relay) as Arc<dyn Relay>,
            Revealer::new(Duration::from_secs(60)),
        );
        let mut observer = RecordingObserver::default();
        let skip = CancellationToken::new();
        skip.cancel();

        let outcome = runner
            .send_with_skip(&mut session, "go", &mut observer, &skip)
            .await;

        assert!(matches!(outcome, TurnOutcome::Completed { skipped: true, .. }));
        assert!(observer.ticks.is_empty());
        assert_eq!(
            session.messages()[1].content,
            "a reply that would take a minute per character"
        );
    }

    #[tokio::test]
    async fn test_without_animation_commits_at_once() {
        let relay = Arc::new(MockRelay::new());
        relay.queue_reply("```json\n{}\n```");
        let (runner, mut session, _store) = fixture(&relay);
        let mut runner = runner.with_animation(false);
        let mut observer = RecordingObserver::default();

        runner.send(&mut session, "json", &mut observer).await;

        assert!(observer.ticks.is_empty());
        assert_eq!(observer.completed.len(), 1);
        assert_eq!(session.preview().code, "{}\n");
    }
}
