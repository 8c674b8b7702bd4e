use super::state::{SessionState, StopSignal};
use crate::audio::{silent_frame, AudioFormat, AudioFramer, FrameCodec, LiveFrameBuffer};
use crate::error::{AsrError, Result};
use crate::protocol::{
    AsrRequest, FrameSequencer, FrameState, ResponseEvent, TaggedFrame, Transition,
};
use crate::transport::TransportSink;
use chrono::Utc;
use futures::stream::BoxStream;
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Upper bound on the best-effort FinishSession write.
const FINISH_TIMEOUT: Duration = Duration::from_secs(2);

/// Where the sender takes its audio from.
pub(crate) enum AudioSource {
    /// A complete recording, optionally paced at real-time speed.
    Samples { samples: Vec<i16>, realtime: bool },
    /// Chunks of any size from a live source; ends when the stream ends.
    Live(BoxStream<'static, Vec<i16>>),
}

/// Sending half of a streaming session.
pub(crate) struct Sender {
    pub sink: Box<dyn TransportSink>,
    pub codec: Box<dyn FrameCodec>,
    pub format: AudioFormat,
    pub token: String,
    pub state: Arc<SessionState>,
    pub events: mpsc::Sender<ResponseEvent>,
    pub stop: StopSignal,
}

#[derive(Debug, PartialEq, Eq)]
enum Outcome {
    Sent,
    Stopped,
}

impl Sender {
    pub(crate) async fn run(mut self, source: AudioSource) {
        info!("Audio sender started");

        match self.stream_audio(source).await {
            Ok(Outcome::Sent) => debug!("All frames sent"),
            Ok(Outcome::Stopped) => debug!("Audio sender stopped early"),
            Err(e) => {
                error!("Audio sender failed: {}", e);
                if let Some(event) = self.state.fail(e.to_string()) {
                    let _ = self.events.send(event).await;
                }
                self.stop.fire();
            }
        }

        self.finish_session().await;

        // Keep the socket open until the receiver is done with it.
        self.stop.stopped().await;
        match tokio::time::timeout(FINISH_TIMEOUT, self.sink.close()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => debug!("Close failed: {}", e),
            Err(_) => debug!("Timed out closing the connection"),
        }
        info!("Audio sender stopped");
    }

    async fn stream_audio(&mut self, source: AudioSource) -> Result<Outcome> {
        let format = self.format;
        let spf = format.samples_per_frame();
        let codec = self.codec.as_mut();
        let mut sequencer = FrameSequencer::new();
        let mut writer = FrameWriter {
            sink: self.sink.as_mut(),
            state: &self.state,
            stop: &mut self.stop,
            frame_duration_ms: format.frame_duration_ms,
            start_ms: Utc::now().timestamp_millis(),
        };

        match source {
            AudioSource::Samples { samples, realtime } => {
                let framer = AudioFramer::new(samples, format);
                debug!("Sending {} frames", framer.frame_count());
                let pace = Duration::from_millis(format.frame_duration_ms as u64);

                for frame in framer.frames(&mut *codec) {
                    if let Some(tagged) = sequencer.push(frame?) {
                        if writer.write(tagged).await? == Outcome::Stopped {
                            return Ok(Outcome::Stopped);
                        }
                        if realtime {
                            tokio::time::sleep(pace).await;
                        }
                    }
                }
            }
            AudioSource::Live(mut chunks) => {
                let mut buffer = LiveFrameBuffer::new(&format);
                loop {
                    let chunk = tokio::select! {
                        _ = writer.stop.stopped() => return Ok(Outcome::Stopped),
                        chunk = chunks.next() => chunk,
                    };
                    let Some(chunk) = chunk else { break };

                    for pcm in buffer.push(&chunk) {
                        let data = codec.encode(&pcm, spf)?;
                        if let Some(tagged) = sequencer.push(data) {
                            if writer.write(tagged).await? == Outcome::Stopped {
                                return Ok(Outcome::Stopped);
                            }
                        }
                    }
                }

                if let Some(pcm) = buffer.finish() {
                    let data = codec.encode(&pcm, spf)?;
                    if let Some(tagged) = sequencer.push(data) {
                        if writer.write(tagged).await? == Outcome::Stopped {
                            return Ok(Outcome::Stopped);
                        }
                    }
                }
            }
        }

        for tagged in sequencer.finish(|| silent_frame(&mut *codec, &format))? {
            if writer.write(tagged).await? == Outcome::Stopped {
                return Ok(Outcome::Stopped);
            }
        }
        Ok(Outcome::Sent)
    }

    async fn finish_session(&mut self) {
        let request = AsrRequest::finish_session(self.state.request_id(), &self.token);
        match tokio::time::timeout(FINISH_TIMEOUT, self.sink.send(request.to_bytes())).await {
            Ok(Ok(())) => debug!("FinishSession sent"),
            Ok(Err(e)) => warn!("Failed to send FinishSession: {}", e),
            Err(_) => warn!("Timed out sending FinishSession"),
        }
    }
}

/// Writes tagged frames as TaskRequests.
struct FrameWriter<'a> {
    sink: &'a mut dyn TransportSink,
    state: &'a SessionState,
    stop: &'a mut StopSignal,
    frame_duration_ms: u32,
    start_ms: i64,
}

impl FrameWriter<'_> {
    async fn write(&mut self, frame: TaggedFrame) -> Result<Outcome> {
        if self.state.is_finished() || self.stop.is_stopped() {
            return Ok(Outcome::Stopped);
        }

        // Enter Finishing before LAST hits the wire so a prompt
        // SessionFinished always finds the session ready for it.
        if frame.state == FrameState::Last {
            if let Err(e) = self.state.advance(Transition::LastFrameSent) {
                debug!("Not sending LAST frame: {}", e);
                return Ok(Outcome::Stopped);
            }
        }

        let index = frame.index;
        let timestamp_ms = self.start_ms + index as i64 * self.frame_duration_ms as i64;
        let request = AsrRequest::task_request(
            frame.data,
            self.state.request_id(),
            frame.state,
            timestamp_ms,
        );

        tokio::select! {
            _ = self.stop.stopped() => Ok(Outcome::Stopped),
            sent = self.sink.send(request.to_bytes()) => {
                sent.map_err(|e| AsrError::transport(format!("frame {} not sent: {}", index, e)))?;
                Ok(Outcome::Sent)
            }
        }
    }
}
