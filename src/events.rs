use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Speaker {
    User,
    Bot,
    System,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TranscriptEntry {
    pub speaker: Speaker,
    pub text: String,
    /// Wall-clock time the model took, only recorded for bot replies.
    pub elapsed: Option<Duration>,
}

impl TranscriptEntry {
    pub fn user(text: &str) -> Self {
        Self {
            speaker: Speaker::User,
            text: text.to_string(),
            elapsed: None,
        }
    }

    pub fn bot(text: &str, elapsed: Duration) -> Self {
        Self {
            speaker: Speaker::Bot,
            text: text.to_string(),
            elapsed: Some(elapsed),
        }
    }

    pub fn system(text: &str) -> Self {
        Self {
            speaker: Speaker::System,
            text: text.to_string(),
            elapsed: None,
        }
    }
}

/// Updates pushed from background tasks to the UI thread.
#[derive(Debug, Clone, PartialEq)]
pub enum UiEvent {
    Transcript(TranscriptEntry),
    TimerText(String),
    InputsEnabled(bool),
}

pub fn timer_text(elapsed: Duration) -> String {
    format!("Response time: {:.2} seconds", elapsed.as_secs_f64())
}

type Wake = Arc<dyn Fn() + Send + Sync>;

/// Sending half of the UI event queue.
///
/// Every emitted event also fires the wake hook so an idle event loop
/// repaints without polling.
#[derive(Clone)]
pub struct EventSink {
    tx: Sender<UiEvent>,
    wake: Wake,
}

impl EventSink {
    pub fn channel(wake: impl Fn() + Send + Sync + 'static) -> (Self, Receiver<UiEvent>) {
        let (tx, rx) = mpsc::channel();
        let sink = Self {
            tx,
            wake: Arc::new(wake),
        };
        (sink, rx)
    }

    pub fn emit(&self, event: UiEvent) {
        if self.tx.send(event).is_err() {
            // UI is gone (window closed mid-generation)
            debug!("dropping ui event, receiver disconnected");
            return;
        }
        (self.wake)();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_emit_wakes_receiver() {
        let wakes = Arc::new(AtomicUsize::new(0));
        let counter = wakes.clone();
        let (sink, rx) = EventSink::channel(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        sink.emit(UiEvent::InputsEnabled(false));
        sink.emit(UiEvent::TimerText("Thinking...".into()));

        assert_eq!(rx.try_recv().unwrap(), UiEvent::InputsEnabled(false));
        assert_eq!(
            rx.try_recv().unwrap(),
            UiEvent::TimerText("Thinking...".into())
        );
        assert_eq!(wakes.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_emit_after_receiver_dropped() {
        let wakes = Arc::new(AtomicUsize::new(0));
        let counter = wakes.clone();
        let (sink, rx) = EventSink::channel(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        drop(rx);

        sink.emit(UiEvent::InputsEnabled(true));
        assert_eq!(wakes.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_timer_text_format() {
        assert_eq!(
            timer_text(Duration::from_millis(1234)),
            "Response time: 1.23 seconds"
        );
        assert_eq!(timer_text(Duration::ZERO), "Response time: 0.00 seconds");
    }
}
