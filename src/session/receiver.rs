use super::state::{SessionState, StopSignal};
use crate::protocol::{classify_bytes, ResponseEvent};
use crate::transport::TransportStream;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Receiving half of a streaming session.
///
/// Classified events go onto the delivery queue in transport order. The
/// queue sender is dropped when this task returns, which is how the
/// consumer learns that no more events will come.
pub(crate) struct Receiver {
    pub stream: Box<dyn TransportStream>,
    pub state: Arc<SessionState>,
    pub events: mpsc::Sender<ResponseEvent>,
    pub stop: StopSignal,
}

impl Receiver {
    pub(crate) async fn run(mut self) {
        info!("Response receiver started");
        let mut received = 0usize;

        while !self.state.is_finished() {
            let next = tokio::select! {
                _ = self.stop.stopped() => {
                    debug!("Response receiver stopped");
                    break;
                }
                next = self.stream.recv() => next,
            };

            let data = match next {
                Some(Ok(data)) => data,
                Some(Err(e)) => {
                    warn!("Connection lost: {}", e);
                    if let Some(event) = self.state.fail(e.to_string()) {
                        let _ = self.events.send(event).await;
                    }
                    break;
                }
                None => {
                    debug!("Server closed the connection");
                    self.state.close();
                    break;
                }
            };

            received += 1;
            let Some(event) = self.state.apply(classify_bytes(&data)) else {
                break;
            };
            let terminal = event.is_terminal();
            if self.events.send(event).await.is_err() {
                debug!("Event consumer went away");
                break;
            }
            if terminal {
                break;
            }
        }

        // The session is over; the sender must not keep the queue open.
        self.stop.fire();
        info!("Response receiver stopped after {} messages", received);
    }
}
