use crate::error::Result;
use crate::protocol::{ResponseEvent, SessionPhase, Transition};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Debug)]
struct SessionRecord {
    phase: SessionPhase,
    final_text: String,
    error: Option<ResponseEvent>,
}

/// State shared by the sender, the receiver and the consumer of one session.
///
/// The record lock is only taken for short synchronous updates and is never
/// held across an `.await`.
#[derive(Debug)]
pub struct SessionState {
    request_id: String,
    finished: AtomicBool,
    record: Mutex<SessionRecord>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionState {
    pub fn new() -> Self {
        Self {
            request_id: Uuid::new_v4().to_string(),
            finished: AtomicBool::new(false),
            record: Mutex::new(SessionRecord {
                phase: SessionPhase::New,
                final_text: String::new(),
                error: None,
            }),
        }
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }

    pub fn phase(&self) -> SessionPhase {
        self.lock().phase
    }

    /// Text of the most recent final result.
    pub fn final_text(&self) -> String {
        self.lock().final_text.clone()
    }

    /// The terminal error event, if the session failed.
    pub fn error(&self) -> Option<ResponseEvent> {
        self.lock().error.clone()
    }

    /// Apply a client-side transition. The phase is unchanged on error.
    pub fn advance(&self, input: Transition) -> Result<SessionPhase> {
        let mut record = self.lock();
        let next = record.phase.next(input)?;
        debug!("Session {:?} -> {:?} on {:?}", record.phase, next, input);
        record.phase = next;
        if next.is_done() {
            self.finished.store(true, Ordering::SeqCst);
        }
        Ok(next)
    }

    /// Record a server event and return what should be delivered for it.
    ///
    /// Nothing is delivered once the session is done. A lifecycle event that
    /// does not fit the current phase fails the session and is delivered as
    /// a terminal `Error` instead.
    pub fn apply(&self, event: ResponseEvent) -> Option<ResponseEvent> {
        let mut record = self.lock();
        if record.phase.is_done() {
            debug!("Dropping {} after session end", event.kind());
            return None;
        }

        let input = match &event {
            ResponseEvent::TaskStarted => Some(Transition::TaskStarted),
            ResponseEvent::SessionStarted => Some(Transition::SessionStarted),
            ResponseEvent::SessionFinished => Some(Transition::SessionFinished),
            ResponseEvent::Error { .. } => Some(Transition::Failed),
            ResponseEvent::FinalResult { text, .. } => {
                record.final_text = text.clone();
                None
            }
            _ => None,
        };

        let Some(input) = input else {
            return Some(event);
        };

        match record.phase.next(input) {
            Ok(next) => {
                record.phase = next;
                if let ResponseEvent::Error { .. } = &event {
                    record.error = Some(event.clone());
                }
                if next.is_done() {
                    self.finished.store(true, Ordering::SeqCst);
                }
                Some(event)
            }
            Err(e) => {
                warn!("Unexpected {} from server: {}", event.kind(), e);
                Some(self.fail_locked(&mut record, e.to_string()))
            }
        }
    }

    /// Fail the session. Returns the terminal event to deliver, or `None`
    /// when the session had already ended.
    pub fn fail(&self, message: impl Into<String>) -> Option<ResponseEvent> {
        let mut record = self.lock();
        if record.phase.is_done() {
            return None;
        }
        Some(self.fail_locked(&mut record, message.into()))
    }

    /// The transport closed cleanly. Ends the session without an error.
    pub fn close(&self) {
        let mut record = self.lock();
        if !record.phase.is_done() {
            debug!("Session closed in {:?}", record.phase);
            record.phase = SessionPhase::Done;
        }
        self.finished.store(true, Ordering::SeqCst);
    }

    fn fail_locked(&self, record: &mut SessionRecord, message: String) -> ResponseEvent {
        let event = ResponseEvent::Error { message };
        record.phase = SessionPhase::Done;
        record.error = Some(event.clone());
        self.finished.store(true, Ordering::SeqCst);
        event
    }

    fn lock(&self) -> MutexGuard<'_, SessionRecord> {
        self.record.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Cooperative stop signal shared by the session tasks. Firing is
/// idempotent.
#[derive(Debug, Clone)]
pub(crate) struct StopSignal {
    tx: std::sync::Arc<watch::Sender<bool>>,
    rx: watch::Receiver<bool>,
}

impl StopSignal {
    pub(crate) fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            tx: std::sync::Arc::new(tx),
            rx,
        }
    }

    pub(crate) fn fire(&self) {
        self.tx.send_replace(true);
    }

    pub(crate) fn is_stopped(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once the signal has fired.
    pub(crate) async fn stopped(&mut self) {
        let _ = self.rx.wait_for(|stopped| *stopped).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn streaming_state() -> SessionState {
        let state = SessionState::new();
        state.advance(Transition::StartTaskSent).unwrap();
        state.apply(ResponseEvent::TaskStarted).unwrap();
        state.apply(ResponseEvent::SessionStarted).unwrap();
        state
    }

    #[test]
    fn test_request_id_is_uuid() {
        let state = SessionState::new();
        assert!(Uuid::parse_str(state.request_id()).is_ok());
        assert_eq!(state.phase(), SessionPhase::New);
    }

    #[test]
    fn test_final_text_tracks_latest_final() {
        let state = streaming_state();
        state.apply(ResponseEvent::FinalResult {
            text: "one".to_string(),
            vad_finished: true,
        });
        state.apply(ResponseEvent::InterimResult {
            text: "two".to_string(),
        });
        assert_eq!(state.final_text(), "one");
        assert!(!state.is_finished());
    }

    #[test]
    fn test_error_is_terminal_once() {
        let state = streaming_state();
        let delivered = state.apply(ResponseEvent::Error {
            message: "boom".to_string(),
        });
        assert!(delivered.is_some());
        assert!(state.is_finished());
        assert!(state.fail("later").is_none());
        assert!(state.apply(ResponseEvent::SessionFinished).is_none());
        assert_eq!(
            state.error(),
            Some(ResponseEvent::Error {
                message: "boom".to_string()
            })
        );
    }

    #[test]
    fn test_unexpected_lifecycle_event_fails_session() {
        let state = streaming_state();
        let delivered = state.apply(ResponseEvent::TaskStarted).unwrap();
        assert!(matches!(delivered, ResponseEvent::Error { .. }));
        assert_eq!(state.phase(), SessionPhase::Done);
    }

    #[test]
    fn test_clean_close_has_no_error() {
        let state = streaming_state();
        state.close();
        assert!(state.is_finished());
        assert!(state.error().is_none());
    }

    #[tokio::test]
    async fn test_stop_signal() {
        let mut signal = StopSignal::new();
        let other = signal.clone();
        assert!(!signal.is_stopped());
        other.fire();
        other.fire();
        signal.stopped().await;
        assert!(signal.is_stopped());
    }
}
