//! Single-flight generation lifecycle.
//!
//! The controller lives on the UI thread. Each accepted submit spawns one
//! worker thread that makes the blocking runtime call and one timer thread
//! that reports elapsed time while the worker runs. All results flow back
//! through the [`EventSink`].

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{error, info, warn};

use crate::events::{timer_text, EventSink, TranscriptEntry, UiEvent};
use crate::llm::{GenerationError, GenerationRequest, InferenceRuntime};
use crate::prompt;

const TIMER_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationState {
    Idle,
    Busy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    Empty,
    Busy,
}

/// Outcome of [`GenerationController::submit`].
#[derive(Debug)]
pub enum Submission {
    Accepted(GenerationHandle),
    Ignored(IgnoreReason),
}

impl Submission {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Submission::Accepted(_))
    }
}

/// Handle to an in-flight generation. Dropping it detaches the worker.
#[derive(Debug)]
pub struct GenerationHandle {
    worker: JoinHandle<()>,
}

impl GenerationHandle {
    /// Blocks until the worker has emitted its completion and released the
    /// busy flag.
    pub fn join(self) {
        if self.worker.join().is_err() {
            warn!("generation worker exited abnormally");
        }
    }
}

pub struct GenerationController {
    runtime: Arc<dyn InferenceRuntime>,
    request: GenerationRequest,
    events: EventSink,
    busy: Arc<AtomicBool>,
    pending_document: Option<String>,
}

impl GenerationController {
    pub fn new(
        runtime: Arc<dyn InferenceRuntime>,
        request: GenerationRequest,
        events: EventSink,
    ) -> Self {
        Self {
            runtime,
            request,
            events,
            busy: Arc::new(AtomicBool::new(false)),
            pending_document: None,
        }
    }

    pub fn state(&self) -> GenerationState {
        if self.busy.load(Ordering::Acquire) {
            GenerationState::Busy
        } else {
            GenerationState::Idle
        }
    }

    pub fn has_pending_document(&self) -> bool {
        self.pending_document.is_some()
    }

    /// Stores extracted document text for the next accepted prompt. A newer
    /// upload replaces an unconsumed one.
    pub fn attach(&mut self, document_text: String) {
        if self.pending_document.replace(document_text).is_some() {
            info!("replacing unused document text");
        }
    }

    pub fn submit(&mut self, prompt_text: &str) -> Submission {
        let user_text = prompt_text.trim();
        if user_text.is_empty() {
            return Submission::Ignored(IgnoreReason::Empty);
        }

        if self
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            info!("generation in flight, dropping prompt");
            return Submission::Ignored(IgnoreReason::Busy);
        }

        let document = self.pending_document.take();

        self.events.emit(UiEvent::InputsEnabled(false));
        self.events
            .emit(UiEvent::Transcript(TranscriptEntry::user(user_text)));
        if let Some(document) = &document {
            self.events.emit(UiEvent::Transcript(TranscriptEntry::system(&format!(
                "(Attached PDF document: {} characters)",
                document.chars().count()
            ))));
        }
        self.events.emit(UiEvent::TimerText("Thinking...".to_string()));

        let full_prompt = prompt::compose(document.as_deref(), user_text);
        info!(prompt_chars = full_prompt.len(), "generation accepted");

        let job = Worker {
            runtime: self.runtime.clone(),
            request: self.request.clone(),
            events: self.events.clone(),
            busy: self.busy.clone(),
        };
        let worker = thread::spawn(move || job.run(full_prompt));

        Submission::Accepted(GenerationHandle { worker })
    }
}

/// Returns the controller to idle when dropped, unwinding included.
struct BusyGuard(Arc<AtomicBool>);

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

struct Worker {
    runtime: Arc<dyn InferenceRuntime>,
    request: GenerationRequest,
    events: EventSink,
    busy: Arc<AtomicBool>,
}

impl Worker {
    fn run(self, full_prompt: String) {
        let _idle_on_exit = BusyGuard(self.busy.clone());
        let start = Instant::now();
        let timer = Timer::start(start, self.busy.clone(), self.events.clone());

        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            self.runtime.generate(&full_prompt, &self.request)
        }))
        .unwrap_or_else(|payload| Err(GenerationError::Panicked(panic_message(&*payload))));

        // stop ticking before the final update so it cannot be overwritten
        timer.stop();

        let (text, elapsed) = match result {
            Ok(text) => {
                let elapsed = start.elapsed();
                info!(elapsed_secs = elapsed.as_secs_f64(), "generation finished");
                (text.trim().to_string(), elapsed)
            }
            Err(e) => {
                error!("llm error: {e}");
                (format!("(Error: {e})"), Duration::ZERO)
            }
        };

        self.events
            .emit(UiEvent::Transcript(TranscriptEntry::bot(&text, elapsed)));
        self.events.emit(UiEvent::TimerText(timer_text(elapsed)));
        self.events.emit(UiEvent::InputsEnabled(true));
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Periodic elapsed-time reporter. Only reads the busy flag.
struct Timer {
    stop_tx: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl Timer {
    fn start(start: Instant, busy: Arc<AtomicBool>, events: EventSink) -> Self {
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let handle = thread::spawn(move || loop {
            match stop_rx.recv_timeout(TIMER_INTERVAL) {
                Err(RecvTimeoutError::Timeout) if busy.load(Ordering::Acquire) => {
                    events.emit(UiEvent::TimerText(timer_text(start.elapsed())));
                }
                _ => break,
            }
        });

        Self {
            stop_tx: Some(stop_tx),
            handle: Some(handle),
        }
    }

    fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        // disconnecting the channel wakes the timer immediately
        self.stop_tx.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("timer thread panicked");
            }
        }
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        self.shutdown();
    }
}
