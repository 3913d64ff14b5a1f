//! Transcript events produced by the transcription engine

/// Incremental or final speech-to-text result
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranscriptEvent {
    /// Partial text for the utterance in progress
    Delta(String),
    /// Final text for one utterance
    Completed(String),
}

impl TranscriptEvent {
    pub fn text(&self) -> &str {
        match self {
            TranscriptEvent::Delta(text) | TranscriptEvent::Completed(text) => text,
        }
    }

    pub fn is_final(&self) -> bool {
        matches!(self, TranscriptEvent::Completed(_))
    }
}
