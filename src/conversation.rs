use crate::events::{timer_text, TranscriptEntry, UiEvent};

/// Append-only transcript for the lifetime of the process.
#[derive(Debug, Default)]
pub struct ConversationLog {
    entries: Vec<TranscriptEntry>,
}

impl ConversationLog {
    pub fn push(&mut self, entry: TranscriptEntry) {
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[TranscriptEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Everything the chat window renders, independent of the widget toolkit.
#[derive(Debug)]
pub struct ChatState {
    pub log: ConversationLog,
    pub timer_text: String,
    pub inputs_enabled: bool,
}

impl Default for ChatState {
    fn default() -> Self {
        Self {
            log: ConversationLog::default(),
            timer_text: timer_text(Default::default()),
            inputs_enabled: true,
        }
    }
}

impl ChatState {
    pub fn apply(&mut self, event: UiEvent) {
        match event {
            UiEvent::Transcript(entry) => self.log.push(entry),
            UiEvent::TimerText(text) => self.timer_text = text,
            UiEvent::InputsEnabled(enabled) => self.inputs_enabled = enabled,
        }
    }

    /// True between acceptance of a prompt and its reply.
    pub fn is_waiting(&self) -> bool {
        !self.inputs_enabled
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn test_initial_state() {
        let state = ChatState::default();

        assert!(state.log.is_empty());
        assert!(state.inputs_enabled);
        assert_eq!(state.timer_text, "Response time: 0.00 seconds");
    }

    #[test]
    fn test_apply_generation_lifecycle() {
        let mut state = ChatState::default();

        state.apply(UiEvent::InputsEnabled(false));
        state.apply(UiEvent::Transcript(TranscriptEntry::user("Hi")));
        state.apply(UiEvent::TimerText("Thinking...".into()));
        assert!(state.is_waiting());
        assert_eq!(state.timer_text, "Thinking...");

        let elapsed = Duration::from_millis(420);
        state.apply(UiEvent::Transcript(TranscriptEntry::bot("Hello", elapsed)));
        state.apply(UiEvent::TimerText(timer_text(elapsed)));
        state.apply(UiEvent::InputsEnabled(true));

        assert!(!state.is_waiting());
        assert_eq!(state.timer_text, "Response time: 0.42 seconds");
        assert_eq!(state.log.len(), 2);
        assert_eq!(state.log.entries()[1].text, "Hello");
    }
}
