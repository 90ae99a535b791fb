//! Typewriter reveal of a complete reply.
//!
//! [`Reveal`] is the state machine (`Idle -> Revealing -> Complete`, with
//! `Cancelled` reachable from any non-terminal phase). [`start`] drives one
//! from a tokio interval timer on its own task, and [`Revealer`] is the
//! single active-reveal slot of a conversation.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// Delay between revealed characters.
pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(20);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevealPhase {
    Idle,
    Revealing,
    Complete,
    Cancelled,
}

impl RevealPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RevealPhase::Complete | RevealPhase::Cancelled)
    }
}

/// Result of advancing a [`Reveal`] by one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevealStep<'a> {
    /// One more character is visible.
    Progress(&'a str),
    /// The whole target is visible. Returned exactly once.
    Finished(&'a str),
    /// The reveal already completed or was cancelled; nothing changed.
    Inactive,
}

/// Incremental disclosure of a target string, one `char` per tick.
///
/// The revealed text is always a prefix of the target on a character
/// boundary, and its length only grows.
#[derive(Debug, Clone)]
pub struct Reveal {
    target: String,
    revealed_bytes: usize,
    revealed_chars: usize,
    phase: RevealPhase,
}

impl Reveal {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            revealed_bytes: 0,
            revealed_chars: 0,
            phase: RevealPhase::Idle,
        }
    }

    pub fn tick(&mut self) -> RevealStep<'_> {
        match self.phase {
            RevealPhase::Complete | RevealPhase::Cancelled => return RevealStep::Inactive,
            RevealPhase::Idle => self.phase = RevealPhase::Revealing,
            RevealPhase::Revealing => {}
        }

        if let Some(c) = self.target[self.revealed_bytes..].chars().next() {
            self.revealed_bytes += c.len_utf8();
            self.revealed_chars += 1;
        }

        let prefix = &self.target[..self.revealed_bytes];
        if self.revealed_bytes == self.target.len() {
            self.phase = RevealPhase::Complete;
            RevealStep::Finished(prefix)
        } else {
            RevealStep::Progress(prefix)
        }
    }

    /// Stop revealing. Returns false if the reveal had already ended.
    pub fn cancel(&mut self) -> bool {
        if self.phase.is_terminal() {
            return false;
        }
        self.phase = RevealPhase::Cancelled;
        true
    }

    pub fn phase(&self) -> RevealPhase {
        self.phase
    }

    pub fn revealed(&self) -> &str {
        &self.target[..self.revealed_bytes]
    }

    /// Number of characters revealed so far.
    pub fn revealed_len(&self) -> usize {
        self.revealed_chars
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn into_target(self) -> String {
        self.target
    }
}

/// Handle to a running reveal.
///
/// Dropping the handle stops the reveal, so a timer never outlives its
/// owner.
#[derive(Debug)]
pub struct RevealHandle {
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl RevealHandle {
    /// Cancel the timer. Pending ticks and the completion callback are
    /// suppressed. Calling this again, or after completion, does nothing.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Whether the driver task has exited (completed or stopped).
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, |task| task.is_finished())
    }

    /// Wait for the driver task to exit.
    pub async fn finished(mut self) {
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                debug!("Reveal task ended abnormally: {}", e);
            }
        }
    }
}

impl Drop for RevealHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Reveal `target` one character every `interval`.
///
/// `on_tick` receives the revealed prefix after every firing; the firing
/// that reveals the last character is followed by `on_complete(target)`.
/// The first firing happens one interval after the call. An empty target
/// completes on the first firing with an empty prefix.
///
/// Must be called from within a tokio runtime.
pub fn start<T, C>(
    target: impl Into<String>,
    interval: Duration,
    mut on_tick: T,
    on_complete: C,
) -> RevealHandle
where
    T: FnMut(&str) + Send + 'static,
    C: FnOnce(String) + Send + 'static,
{
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    let reveal = Reveal::new(target);
    let period = interval.max(Duration::from_millis(1));

    let task = tokio::spawn(async move {
        let mut reveal = reveal;
        let mut timer = tokio::time::interval_at(Instant::now() + period, period);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        debug!(chars = reveal.target().chars().count(), "Reveal started");

        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => {
                    reveal.cancel();
                    debug!(revealed = reveal.revealed_len(), "Reveal stopped");
                    return;
                }
                _ = timer.tick() => {}
            }

            if token.is_cancelled() {
                reveal.cancel();
                return;
            }

            match reveal.tick() {
                RevealStep::Progress(prefix) => {
                    trace!(len = prefix.len(), "Reveal tick");
                    on_tick(prefix);
                }
                RevealStep::Finished(prefix) => {
                    on_tick(prefix);
                    break;
                }
                RevealStep::Inactive => return,
            }
        }

        if token.is_cancelled() {
            return;
        }
        debug!(revealed = reveal.revealed_len(), "Reveal complete");
        on_complete(reveal.into_target());
    });

    RevealHandle {
        cancel,
        task: Some(task),
    }
}

/// The exclusive active-reveal slot of one conversation.
///
/// Starting a reveal stops the previous one and waits for its task to exit
/// first, so callbacks from two reveals never interleave.
#[derive(Debug)]
pub struct Revealer {
    interval: Duration,
    active: Option<RevealHandle>,
}

impl Default for Revealer {
    fn default() -> Self {
        Self::new(DEFAULT_INTERVAL)
    }
}

impl Revealer {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            active: None,
        }
    }

    pub async fn start<T, C>(&mut self, target: impl Into<String>, on_tick: T, on_complete: C)
    where
        T: FnMut(&str) + Send + 'static,
        C: FnOnce(String) + Send + 'static,
    {
        self.stop_and_wait().await;
        self.active = Some(start(target, self.interval, on_tick, on_complete));
    }

    /// Release the slot, cancelling any active reveal.
    pub fn stop(&mut self) {
        if let Some(handle) = self.active.take() {
            handle.stop();
        }
    }

    /// Release the slot and wait until the cancelled task has exited.
    pub async fn stop_and_wait(&mut self) {
        if let Some(handle) = self.active.take() {
            handle.stop();
            handle.finished().await;
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
            .as_ref()
            .is_some_and(|handle| !handle.is_finished() && !handle.is_stopped())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    const FAST: Duration = Duration::from_millis(1);

    #[derive(Clone, Default)]
    struct Recorder {
        ticks: Arc<Mutex<Vec<String>>>,
        completions: Arc<Mutex<Vec<String>>>,
    }

    impl Recorder {
        fn on_tick(&self) -> impl FnMut(&str) + Send + 'static {
            let ticks = Arc::clone(&self.ticks);
            move |prefix: &str| ticks.lock().unwrap().push(prefix.to_string())
        }

        fn on_complete(&self) -> impl FnOnce(String) + Send + 'static {
            let completions = Arc::clone(&self.completions);
            move |target: String| completions.lock().unwrap().push(target)
        }

        fn ticks(&self) -> Vec<String> {
            self.ticks.lock().unwrap().clone()
        }

        fn completions(&self) -> Vec<String> {
            self.completions.lock().unwrap().clone()
        }
    }

    #[test]
    fn test_two_char_target() {
        let mut reveal = Reveal::new("hi");
        assert_eq!(reveal.phase(), RevealPhase::Idle);
        assert_eq!(reveal.tick(), RevealStep::Progress("h"));
        assert_eq!(reveal.phase(), RevealPhase::Revealing);
        assert_eq!(reveal.tick(), RevealStep::Finished("hi"));
        assert_eq!(reveal.phase(), RevealPhase::Complete);
        assert_eq!(reveal.tick(), RevealStep::Inactive);
        assert_eq!(reveal.revealed(), "hi");
    }

    #[test]
    fn test_empty_target_finishes_on_first_tick() {
        let mut reveal = Reveal::new("");
        assert_eq!(reveal.tick(), RevealStep::Finished(""));
        assert_eq!(reveal.tick(), RevealStep::Inactive);
    }

    #[test]
    fn test_reveal_is_monotonic_and_bounded() {
        let target = "héllo ```rs\nlet ü = 1;\n``` 🎉";
        let total = target.chars().count();
        let mut reveal = Reveal::new(target);
        let mut last = 0;
        let mut finished = 0;

        for _ in 0..total + 5 {
            let step = reveal.tick();
            if let RevealStep::Finished(prefix) = step {
                assert_eq!(prefix, target);
                finished += 1;
            }
            assert!(reveal.revealed_len() >= last);
            assert!(reveal.revealed_len() <= total);
            assert!(target.starts_with(reveal.revealed()));
            last = reveal.revealed_len();
        }

        assert_eq!(finished, 1);
        assert_eq!(last, total);
    }

    #[test]
    fn test_cancel_is_terminal() {
        let mut reveal = Reveal::new("abc");
        reveal.tick();
        assert!(reveal.cancel());
        assert!(!reveal.cancel());
        assert_eq!(reveal.tick(), RevealStep::Inactive);
        assert_eq!(reveal.revealed(), "a");

        let mut done = Reveal::new("a");
        done.tick();
        assert!(!done.cancel());
        assert_eq!(done.phase(), RevealPhase::Complete);
    }

    #[tokio::test]
    async fn test_timer_reveals_then_completes_once() {
        let recorder = Recorder::default();
        let handle = start("hi", FAST, recorder.on_tick(), recorder.on_complete());
        handle.finished().await;

        assert_eq!(recorder.ticks(), vec!["h", "hi"]);
        assert_eq!(recorder.completions(), vec!["hi"]);
    }

    #[tokio::test]
    async fn test_empty_target_completes_with_empty_prefix() {
        let recorder = Recorder::default();
        start("", FAST, recorder.on_tick(), recorder.on_complete())
            .finished()
            .await;

        assert_eq!(recorder.ticks(), vec![""]);
        assert_eq!(recorder.completions(), vec![""]);
    }

    #[tokio::test]
    async fn test_stop_suppresses_ticks_and_completion() {
        let recorder = Recorder::default();
        let handle = start(
            "a long reply",
            Duration::from_secs(60),
            recorder.on_tick(),
            recorder.on_complete(),
        );
        handle.stop();
        handle.stop();
        assert!(handle.is_stopped());
        handle.finished().await;

        assert!(recorder.ticks().is_empty());
        assert!(recorder.completions().is_empty());
    }

    #[tokio::test]
    async fn test_stop_after_completion_is_noop() {
        let recorder = Recorder::default();
        let handle = start("ok", FAST, recorder.on_tick(), recorder.on_complete());
        while !handle.is_finished() {
            tokio::time::sleep(FAST).await;
        }
        handle.stop();
        handle.stop();
        handle.finished().await;

        assert_eq!(recorder.ticks().len(), 2);
        assert_eq!(recorder.completions(), vec!["ok"]);
    }

    #[tokio::test]
    async fn test_dropping_handle_stops_reveal() {
        let recorder = Recorder::default();
        let handle = start(
            "never shown",
            Duration::from_millis(20),
            recorder.on_tick(),
            recorder.on_complete(),
        );
        drop(handle);
        tokio::time::sleep(Duration::from_millis(80)).await;

        assert!(recorder.ticks().is_empty());
        assert!(recorder.completions().is_empty());
    }

    #[tokio::test]
    async fn test_new_reveal_replaces_active_one() {
        let first = Recorder::default();
        let second = Recorder::default();
        let stream = Arc::new(Mutex::new(Vec::<String>::new()));

        let mut revealer = Revealer::new(Duration::from_millis(5));
        let s1 = Arc::clone(&stream);
        revealer
            .start(
                "aaaaaaaaaaaaaaaaaaaa",
                move |p: &str| s1.lock().unwrap().push(p.to_string()),
                first.on_complete(),
            )
            .await;
        tokio::time::sleep(Duration::from_millis(12)).await;

        let s2 = Arc::clone(&stream);
        revealer
            .start(
                "bbb",
                move |p: &str| s2.lock().unwrap().push(p.to_string()),
                second.on_complete(),
            )
            .await;
        while revealer.is_active() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        let stream = stream.lock().unwrap().clone();
        let first_b = stream
            .iter()
            .position(|p| p.starts_with('b'))
            .expect("second reveal ticked");
        assert!(stream[..first_b].iter().all(|p| p.chars().all(|c| c == 'a')));
        assert!(stream[first_b..].iter().all(|p| p.chars().all(|c| c == 'b')));
        assert_eq!(stream.last().map(String::as_str), Some("bbb"));

        assert!(first.completions().is_empty());
        assert_eq!(second.completions(), vec!["bbb"]);
    }

    #[tokio::test]
    async fn test_revealer_stop_is_idempotent() {
        let recorder = Recorder::default();
        let mut revealer = Revealer::new(Duration::from_secs(60));
        revealer
            .start("x", recorder.on_tick(), recorder.on_complete())
            .await;
        assert!(revealer.is_active());
        revealer.stop();
        revealer.stop();
        revealer.stop_and_wait().await;
        assert!(!revealer.is_active());
        assert!(recorder.completions().is_empty());
    }
}
