use super::receiver::Receiver;
use super::sender::{AudioSource, Sender};
use super::state::{SessionState, StopSignal};
use super::stream::{DeliveryMode, TranscriptionStream};
use crate::audio::{default_codec_factory, AudioFile, CodecFactory, FrameCodec};
use crate::config::AsrConfig;
use crate::credentials::{CredentialIssuer, Credentials};
use crate::error::{AsrError, Result};
use crate::protocol::{
    classify_bytes, AsrRequest, ResponseEvent, SessionConfig, Transition,
};
use crate::transport::{Connector, TransportSink, TransportStream, WebSocketConnector};
use futures::Stream;
use std::collections::VecDeque;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Capacity of the ordered event queue between receiver and consumer.
const EVENT_QUEUE_CAPACITY: usize = 64;

/// Streaming speech recognition client.
///
/// Each call opens its own connection and session; the client itself only
/// holds configuration and can be shared.
#[derive(Clone)]
pub struct AsrClient {
    config: AsrConfig,
    credentials: Credentials,
    connector: Arc<dyn Connector>,
    codec_factory: CodecFactory,
}

impl AsrClient {
    pub fn new(config: AsrConfig, credentials: Credentials) -> Result<Self> {
        config.validate()?;
        let connector = Arc::new(WebSocketConnector::new(config.user_agent.clone()));
        Ok(Self {
            config,
            credentials,
            connector,
            codec_factory: default_codec_factory(),
        })
    }

    /// Resolve credentials from `config` (and `issuer`, if given) and build
    /// a client.
    pub async fn from_config(
        config: AsrConfig,
        issuer: Option<&dyn CredentialIssuer>,
    ) -> Result<Self> {
        let credentials = Credentials::resolve(&config, issuer).await?;
        Self::new(config, credentials)
    }

    pub fn with_connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = connector;
        self
    }

    pub fn with_codec_factory(mut self, factory: CodecFactory) -> Self {
        self.codec_factory = factory;
        self
    }

    pub fn config(&self) -> &AsrConfig {
        &self.config
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// Recognise a complete recording and return the final text.
    pub async fn transcribe(&self, samples: Vec<i16>) -> Result<String> {
        self.transcribe_with(samples, |_| {}).await
    }

    /// Like [`transcribe`](Self::transcribe), calling `on_interim` with each
    /// interim hypothesis.
    pub async fn transcribe_with<F>(&self, samples: Vec<i16>, mut on_interim: F) -> Result<String>
    where
        F: FnMut(&str),
    {
        let mut stream = self.transcribe_stream(samples).await?;
        let mut final_text = String::new();

        while let Some(event) = stream.next_event().await {
            match event {
                ResponseEvent::InterimResult { text } => on_interim(&text),
                ResponseEvent::FinalResult { text, .. } => final_text = text,
                ResponseEvent::Error { message } => {
                    stream.close().await;
                    return Err(AsrError::Server { message });
                }
                _ => {}
            }
        }

        Ok(final_text)
    }

    /// Decode an audio file, convert it to the configured format and
    /// recognise it.
    pub async fn transcribe_file(&self, path: impl AsRef<Path>) -> Result<String> {
        let samples = self.load_file(path.as_ref()).await?;
        self.transcribe(samples).await
    }

    /// Decode an audio file for [`transcribe_stream`](Self::transcribe_stream).
    pub async fn load_file(&self, path: &Path) -> Result<Vec<i16>> {
        let path = path.to_path_buf();
        let (rate, channels) = (self.config.sample_rate, self.config.channels);

        tokio::task::spawn_blocking(move || {
            let audio = AudioFile::open(&path)?;
            audio.to_format(rate, channels)
        })
        .await
        .map_err(|e| AsrError::audio(format!("decoder task failed: {}", e)))?
    }

    /// Stream a complete recording. Every wait for the server is bounded by
    /// the receive timeout.
    pub async fn transcribe_stream(&self, samples: Vec<i16>) -> Result<TranscriptionStream> {
        let source = AudioSource::Samples {
            samples,
            realtime: self.config.realtime,
        };
        self.start(source, DeliveryMode::Bounded(self.config.recv_timeout()))
            .await
    }

    /// Stream audio from a live source such as a microphone. Chunks may
    /// have any length; the session ends after the source does.
    pub async fn transcribe_realtime<S>(&self, source: S) -> Result<TranscriptionStream>
    where
        S: Stream<Item = Vec<i16>> + Send + 'static,
    {
        let source = AudioSource::Live(Box::pin(source));
        self.start(source, DeliveryMode::Unbounded).await
    }

    async fn start(&self, source: AudioSource, mode: DeliveryMode) -> Result<TranscriptionStream> {
        let format = self.config.audio_format();
        let codec = (self.codec_factory)(&format)?;

        let url = self.config.ws_url(&self.credentials.device_id);
        let (mut sink, mut stream) =
            tokio::time::timeout(self.config.connect_timeout(), self.connector.connect(&url))
                .await
                .map_err(|_| AsrError::Connect {
                    url: url.clone(),
                    message: format!(
                        "timed out after {:.1}s",
                        self.config.connect_timeout_secs
                    ),
                })??;

        let state = Arc::new(SessionState::new());
        info!("Starting session {}", state.request_id());

        let pending = match self
            .initialize(sink.as_mut(), stream.as_mut(), &state, &*codec)
            .await
        {
            Ok(pending) => pending,
            Err(e) => {
                let _ = sink.close().await;
                return Err(e);
            }
        };

        let (tx, rx) = mpsc::channel(EVENT_QUEUE_CAPACITY);
        let stop = StopSignal::new();

        let sender = Sender {
            sink,
            codec,
            format,
            token: self.credentials.token.clone(),
            state: Arc::clone(&state),
            events: tx.clone(),
            stop: stop.clone(),
        };
        let receiver = Receiver {
            stream,
            state: Arc::clone(&state),
            events: tx,
            stop: stop.clone(),
        };

        let sender_handle = tokio::spawn(sender.run(source));
        let receiver_handle = tokio::spawn(receiver.run());

        Ok(TranscriptionStream::new(
            state,
            pending,
            rx,
            mode,
            stop,
            sender_handle,
            receiver_handle,
        ))
    }

    /// StartTask then StartSession, each answered before moving on.
    async fn initialize(
        &self,
        sink: &mut dyn TransportSink,
        stream: &mut dyn TransportStream,
        state: &SessionState,
        codec: &dyn FrameCodec,
    ) -> Result<VecDeque<ResponseEvent>> {
        let token = &self.credentials.token;
        let mut events = VecDeque::with_capacity(2);

        state.advance(Transition::StartTaskSent)?;
        sink.send(AsrRequest::start_task(state.request_id(), token).to_bytes())
            .await?;
        events.push_back(
            self.await_reply(stream, state, "StartTask", Transition::TaskStarted)
                .await?,
        );

        let session_config =
            SessionConfig::new(&self.config, &self.credentials.device_id, codec.format());
        sink.send(
            AsrRequest::start_session(state.request_id(), token, session_config.to_json()?)
                .to_bytes(),
        )
        .await?;
        events.push_back(
            self.await_reply(stream, state, "StartSession", Transition::SessionStarted)
                .await?,
        );

        debug!("Session {} streaming", state.request_id());
        Ok(events)
    }

    async fn await_reply(
        &self,
        stream: &mut dyn TransportStream,
        state: &SessionState,
        step: &str,
        transition: Transition,
    ) -> Result<ResponseEvent> {
        let limit = self.config.recv_timeout();

        loop {
            let next = tokio::time::timeout(limit, stream.recv())
                .await
                .map_err(|_| AsrError::transport(format!("no reply to {}", step)))?;
            let data = match next {
                Some(result) => result?,
                None => {
                    state.fail(format!("connection closed during {}", step));
                    return Err(AsrError::transport(format!(
                        "connection closed during {}",
                        step
                    )));
                }
            };

            let event = classify_bytes(&data);
            let expected = match (&event, transition) {
                (ResponseEvent::TaskStarted, Transition::TaskStarted) => true,
                (ResponseEvent::SessionStarted, Transition::SessionStarted) => true,
                _ => false,
            };
            match event {
                ResponseEvent::Heartbeat { .. } => continue,
                ResponseEvent::Error { ref message } => {
                    warn!("{} failed: {}", step, message);
                    let message = format!("{} failed: {}", step, message);
                    state.fail(message.clone());
                    return Err(AsrError::Lifecycle {
                        message,
                        event: Some(event),
                    });
                }
                event if expected => {
                    state.advance(transition)?;
                    return Ok(event);
                }
                other => {
                    let from = state.phase();
                    state.fail(format!("unexpected {} during {}", other.kind(), step));
                    return Err(AsrError::InvalidTransition {
                        from,
                        input: other.kind().to_string(),
                    });
                }
            }
        }
    }
}
