use super::state::{SessionState, StopSignal};
use crate::protocol::{ResponseEvent, SessionPhase};
use futures::Stream;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

/// How long the consumer waits for the next server message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryMode {
    /// Every pull is bounded; a stall ends the stream without an error.
    Bounded(Duration),
    /// Pulls wait as long as the transport stays open.
    Unbounded,
}

/// Ordered events of one streaming session.
///
/// Yields the initialization events first, then server events in arrival
/// order. Heartbeats are consumed but never yielded. Iteration ends after a
/// terminal event, when the server closes the session, or (in bounded mode)
/// when the server goes quiet for longer than the receive timeout.
pub struct TranscriptionStream {
    state: Arc<SessionState>,
    pending: VecDeque<ResponseEvent>,
    events: mpsc::Receiver<ResponseEvent>,
    mode: DeliveryMode,
    stop: StopSignal,
    sender: Option<JoinHandle<()>>,
    receiver: Option<JoinHandle<()>>,
    ended: bool,
}

impl TranscriptionStream {
    pub(crate) fn new(
        state: Arc<SessionState>,
        pending: VecDeque<ResponseEvent>,
        events: mpsc::Receiver<ResponseEvent>,
        mode: DeliveryMode,
        stop: StopSignal,
        sender: JoinHandle<()>,
        receiver: JoinHandle<()>,
    ) -> Self {
        Self {
            state,
            pending,
            events,
            mode,
            stop,
            sender: Some(sender),
            receiver: Some(receiver),
            ended: false,
        }
    }

    pub fn request_id(&self) -> &str {
        self.state.request_id()
    }

    pub fn phase(&self) -> SessionPhase {
        self.state.phase()
    }

    /// Text of the latest final result seen so far.
    pub fn final_text(&self) -> String {
        self.state.final_text()
    }

    pub fn mode(&self) -> DeliveryMode {
        self.mode
    }

    /// Next event, or `None` once the session has ended.
    pub async fn next_event(&mut self) -> Option<ResponseEvent> {
        if let Some(event) = self.pending.pop_front() {
            return Some(event);
        }
        if self.ended {
            return None;
        }

        loop {
            let next = match self.mode {
                DeliveryMode::Bounded(limit) => {
                    match tokio::time::timeout(limit, self.events.recv()).await {
                        Ok(next) => next,
                        Err(_) => {
                            warn!(
                                "No server message for {:.1}s, ending session",
                                limit.as_secs_f64()
                            );
                            None
                        }
                    }
                }
                DeliveryMode::Unbounded => self.events.recv().await,
            };

            match next {
                None => {
                    self.close().await;
                    return None;
                }
                Some(ResponseEvent::Heartbeat { sequence }) => {
                    debug!("Heartbeat {}", sequence);
                }
                Some(event) => {
                    if event.is_terminal() {
                        self.close().await;
                    }
                    return Some(event);
                }
            }
        }
    }

    /// Stop both session tasks and wait for them. Safe to call repeatedly.
    pub async fn close(&mut self) {
        self.ended = true;
        self.stop.fire();
        self.events.close();

        for (name, handle) in [("sender", self.sender.take()), ("receiver", self.receiver.take())] {
            let Some(handle) = handle else { continue };
            match handle.await {
                Ok(()) => {}
                Err(e) if e.is_cancelled() => debug!("Session {} cancelled", name),
                Err(e) => error!("Session {} panicked: {}", name, e),
            }
        }
    }

    /// Adapt to a [`futures::Stream`] of events.
    pub fn into_stream(self) -> impl Stream<Item = ResponseEvent> + Send {
        futures::stream::unfold(self, |mut stream| async move {
            let event = stream.next_event().await?;
            Some((event, stream))
        })
    }
}

impl Drop for TranscriptionStream {
    fn drop(&mut self) {
        self.stop.fire();
        for handle in [self.sender.take(), self.receiver.take()].into_iter().flatten() {
            handle.abort();
        }
    }
}
