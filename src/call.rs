use std::time::Instant;

use tokio::sync::Mutex;

use crate::error::CallError;
use crate::media_session::MediaSession;

/// Per-call lifecycle state.
///
/// `Speaking` and `Listening` are transient — a call never rests in them
/// between turns, only while a turn is actually in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    PendingStream,
    Active,
    Speaking,
    Listening,
    Ended,
}

/// Who produced a turn-half of conversation history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Speaker {
    Agent,
    Human,
}

#[derive(Debug, Clone)]
pub struct HistoryEntry {
    pub speaker: Speaker,
    pub text: String,
}

/// A single PSTN call under management. Identity is minted by the registry
/// and never reused for the lifetime of a Call Manager instance.
pub struct Call {
    pub id: u64,
    pub created_at: Instant,
    pub state: Mutex<CallState>,
    pub history: Mutex<Vec<HistoryEntry>>,
    /// Unbound until the Call Manager correlates an incoming media stream.
    pub media: Mutex<Option<MediaSession>>,
}

impl Call {
    pub fn new(id: u64) -> Self {
        Self {
            id,
            created_at: Instant::now(),
            state: Mutex::new(CallState::PendingStream),
            history: Mutex::new(Vec::new()),
            media: Mutex::new(None),
        }
    }

    /// Atomically move from `from` to `to`, failing with `InvalidState` if the
    /// call isn't currently in `from`. This is how the state machine rejects
    /// concurrent operations on the same call — a second caller observes the
    /// state already moved and backs off instead of blocking on the media lock.
    pub async fn transition(&self, from: CallState, to: CallState) -> Result<(), CallError> {
        let mut guard = self.state.lock().await;
        if *guard != from {
            return Err(CallError::InvalidState);
        }
        *guard = to;
        Ok(())
    }

    pub async fn force_state(&self, to: CallState) {
        *self.state.lock().await = to;
    }

    pub async fn current_state(&self) -> CallState {
        *self.state.lock().await
    }

    pub async fn push_history(&self, speaker: Speaker, text: impl Into<String>) {
        self.history.lock().await.push(HistoryEntry {
            speaker,
            text: text.into(),
        });
    }
}
