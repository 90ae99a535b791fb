//! Test utilities shared across the workspace.
//! Only compiled when running tests or with the `testing` feature.

use async_trait::async_trait;
use std::sync::Mutex;

use crate::error::Error;
use crate::message::Message;
use crate::preview::Preview;
use crate::relay::{Relay, RelayReply, RelayRequest};
use crate::segment::{reconstruct, Span};
use crate::turn::TurnObserver;

/// A mock relay that returns pre-configured replies.
pub struct MockRelay {
    responses: Mutex<Vec<Result<RelayReply, Error>>>,
    /// Captured requests (for assertion).
    pub captured_requests: Mutex<Vec<RelayRequest>>,
    pub name: String,
}

impl MockRelay {
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(Vec::new()),
            captured_requests: Mutex::new(Vec::new()),
            name: "mock".to_string(),
        }
    }

    /// Queue a reply for the next complete() call.
    /// Replies are returned in FIFO order (first queued = first returned).
    pub fn queue_reply(&self, reply: &str) {
        self.responses
            .lock()
            .unwrap()
            .insert(0, Ok(RelayReply::new(reply)));
    }

    /// Queue a failure for the next complete() call.
    pub fn queue_error(&self, error: Error) {
        self.responses.lock().unwrap().insert(0, Err(error));
    }

    pub fn request_count(&self) -> usize {
        self.captured_requests.lock().unwrap().len()
    }

    pub fn last_request(&self) -> Option<RelayRequest> {
        self.captured_requests.lock().unwrap().last().cloned()
    }
}

impl Default for MockRelay {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Relay for MockRelay {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, request: RelayRequest) -> Result<RelayReply, Error> {
        self.captured_requests.lock().unwrap().push(request);
        match self.responses.lock().unwrap().pop() {
            Some(response) => response,
            None => Err(Error::upstream("No mock reply queued")),
        }
    }
}

/// Observer that records everything a turn reports.
#[derive(Debug, Default)]
pub struct RecordingObserver {
    pub appended: Vec<Message>,
    pub waiting: usize,
    /// Reconstructed text of every reveal tick.
    pub ticks: Vec<String>,
    /// Ticks whose segmentation ended in an unterminated code span.
    pub open_code_ticks: usize,
    pub completed: Vec<Message>,
    pub previews: Vec<Preview>,
}

impl TurnObserver for RecordingObserver {
    fn on_message_appended(&mut self, message: &Message) {
        self.appended.push(message.clone());
    }

    fn on_waiting(&mut self) {
        self.waiting += 1;
    }

    fn on_reveal_tick(&mut self, _message_id: u64, spans: &[Span<'_>]) {
        if spans
            .iter()
            .filter_map(Span::as_code)
            .any(|code| !code.terminated)
        {
            self.open_code_ticks += 1;
        }
        self.ticks.push(reconstruct(spans));
    }

    fn on_reveal_complete(&mut self, message: &Message, _spans: &[Span<'_>]) {
        self.completed.push(message.clone());
    }

    fn on_preview(&mut self, preview: &Preview) {
        self.previews.push(preview.clone());
    }
}
