//! Session state machine and event loop
//!
//! A [`SessionController`] owns at most one live session at a time. The
//! session itself is a spawned task that owns the capture pipeline, the
//! playback scheduler and the transport, and pumps traffic between them with
//! a `tokio::select!` loop. Every exit path runs the same teardown in the
//! same order, so device handles are always released before the status
//! leaves `Connected`.

use std::sync::{Arc, Mutex};

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::capabilities::Capabilities;
use crate::capture::CapturePipeline;
use crate::codec;
use crate::config::EngineConfig;
use crate::playback::{PlaybackHandle, PlaybackScheduler};
use crate::state::{GroundingSource, MediaContent, SharedState, Status};
use crate::tools::{self, ToolDispatcher};
use crate::transport::{ClientEvent, ServerEvent, SessionTransport};
use crate::Result;

/// Queue depth between the capture callback and the event loop
const FRAME_QUEUE: usize = 16;

/// A live session's controller-side handles
struct Session {
    shutdown: Option<oneshot::Sender<()>>,
    run: JoinHandle<()>,
}

/// Public engine surface: one controller, at most one live session
pub struct SessionController {
    config: EngineConfig,
    shared: Arc<SharedState>,
    dispatcher: Arc<ToolDispatcher>,
    session: tokio::sync::Mutex<Option<Session>>,
    /// Live playback handle for gain changes and the speaking flag;
    /// `None` whenever no session is live
    playback: Arc<Mutex<Option<PlaybackHandle>>>,
}

impl SessionController {
    /// Create a controller with the host-injected capability callbacks
    #[must_use]
    pub fn new(config: EngineConfig, capabilities: Arc<dyn Capabilities>) -> Self {
        let shared = Arc::new(SharedState::default());
        let dispatcher = Arc::new(ToolDispatcher::with_capabilities(
            capabilities,
            Arc::clone(&shared),
        ));
        Self {
            config,
            shared,
            dispatcher,
            session: tokio::sync::Mutex::new(None),
            playback: Arc::new(Mutex::new(None)),
        }
    }

    /// Open a new session: playback device, microphone, transport, loop
    ///
    /// Honored only from `Disconnected` or `Error`; anywhere else it is a
    /// warning no-op.
    ///
    /// # Errors
    ///
    /// Returns `Error::Audio` if the output device cannot be opened,
    /// `Error::PermissionDenied` if the microphone cannot be acquired, or
    /// `Error::TransportOpen` if the connection fails. In every failure case
    /// anything already opened is released and the status is `Error`.
    pub async fn connect(&self) -> Result<()> {
        let mut slot = self.session.lock().await;

        match self.shared.status() {
            Status::Disconnected | Status::Error => {}
            status => {
                tracing::warn!(%status, "connect ignored");
                return Ok(());
            }
        }

        self.shared.reset_for_connect();
        self.shared.set_status(Status::Connecting);

        let mut playback = match PlaybackScheduler::start(self.shared.output_gain()) {
            Ok(playback) => playback,
            Err(e) => {
                self.shared.set_status(Status::Error);
                return Err(e);
            }
        };

        let (frames_tx, mut frames_rx) = mpsc::channel(FRAME_QUEUE);
        let mut capture = match CapturePipeline::start(frames_tx, Arc::clone(&self.shared)) {
            Ok(capture) => capture,
            Err(e) => {
                playback.stop();
                self.shared.set_status(Status::Error);
                return Err(e);
            }
        };

        let (transport, outbound, inbound) =
            match SessionTransport::open(&self.config, tools::catalog()).await {
                Ok(open) => open,
                Err(e) => {
                    capture.stop();
                    playback.stop();
                    self.shared.set_status(Status::Error);
                    return Err(e);
                }
            };

        // Only live audio goes out: anything captured while the handshake
        // was in flight is stale by now
        let dropped = drain_stale_frames(&mut frames_rx);
        if dropped > 0 {
            tracing::debug!(dropped, "discarded frames captured during connect");
        }

        self.shared.set_status(Status::Connected);
        tracing::info!(model = %self.config.model, "session connected");

        if let Ok(mut handle) = self.playback.lock() {
            *handle = Some(playback.handle());
        }

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let run = tokio::spawn(run_session(SessionParts {
            capture,
            playback,
            transport,
            outbound,
            inbound,
            frames: frames_rx,
            shared: Arc::clone(&self.shared),
            dispatcher: Arc::clone(&self.dispatcher),
            live_playback: Arc::clone(&self.playback),
            shutdown: shutdown_rx,
        }));

        *slot = Some(Session {
            shutdown: Some(shutdown_tx),
            run,
        });
        Ok(())
    }

    /// Signal shutdown and wait for the session's teardown to complete
    ///
    /// When this returns, the microphone and output device are released and
    /// the status is `Disconnected`. With no live session it is a no-op.
    pub async fn disconnect(&self) {
        let mut slot = self.session.lock().await;
        let Some(mut session) = slot.take() else {
            return;
        };

        if let Some(shutdown) = session.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Err(e) = session.run.await {
            tracing::error!(error = %e, "session task failed");
        }
        clear_live_playback(&self.playback);
    }

    /// Current connection status
    #[must_use]
    pub fn status(&self) -> Status {
        self.shared.status()
    }

    /// True while any synthesized chunk is still playing
    #[must_use]
    pub fn is_speaking(&self) -> bool {
        self.playback
            .lock()
            .ok()
            .and_then(|handle| handle.as_ref().map(PlaybackHandle::is_speaking))
            .unwrap_or(false)
    }

    /// Current microphone loudness in [0, 1]
    #[must_use]
    pub fn input_loudness(&self) -> f32 {
        self.shared.input_loudness()
    }

    /// Current output gain in [0, 1]
    #[must_use]
    pub fn output_gain(&self) -> f32 {
        self.shared.output_gain()
    }

    /// Set the output gain, clamped to [0, 1]
    ///
    /// Applies immediately to audio in flight and persists across sessions.
    pub fn set_output_gain(&self, gain: f32) {
        self.shared.set_output_gain(gain);
        if let Ok(handle) = self.playback.lock() {
            if let Some(handle) = handle.as_ref() {
                handle.set_gain(gain);
            }
        }
    }

    /// Citations accumulated for the current response, deduplicated by URI
    #[must_use]
    pub fn citations(&self) -> Vec<GroundingSource> {
        self.shared.citations()
    }

    /// The display instruction most recently issued by the remote side
    #[must_use]
    pub fn current_display(&self) -> Option<MediaContent> {
        self.shared.current_display()
    }
}

/// Everything the session task owns
struct SessionParts {
    capture: CapturePipeline,
    playback: PlaybackScheduler,
    transport: SessionTransport,
    outbound: mpsc::Sender<ClientEvent>,
    inbound: mpsc::Receiver<ServerEvent>,
    frames: mpsc::Receiver<Vec<u8>>,
    shared: Arc<SharedState>,
    dispatcher: Arc<ToolDispatcher>,
    live_playback: Arc<Mutex<Option<PlaybackHandle>>>,
    shutdown: oneshot::Receiver<()>,
}

/// The session event loop; every exit path funnels into [`teardown`]
async fn run_session(mut parts: SessionParts) {
    let playback = parts.playback.handle();
    let mut frames_open = true;

    let final_status = loop {
        tokio::select! {
            frame = parts.frames.recv(), if frames_open => {
                match frame {
                    Some(pcm) => {
                        // New user speech invalidates prior citations
                        parts.shared.clear_citations();
                        if parts.outbound.try_send(ClientEvent::Audio(pcm)).is_err() {
                            tracing::trace!("capture frame dropped; outbound queue full");
                        }
                    }
                    None => frames_open = false,
                }
            }

            event = parts.inbound.recv() => {
                match event {
                    Some(ServerEvent::Audio(pcm)) => match codec::decode(&pcm) {
                        Ok(samples) => playback.enqueue(samples),
                        Err(e) => tracing::warn!(error = %e, "dropping malformed audio chunk"),
                    },
                    Some(ServerEvent::Grounding(sources)) => {
                        parts.shared.merge_citations(sources);
                    }
                    Some(ServerEvent::ToolCalls(calls)) => {
                        for call in calls {
                            let dispatcher = Arc::clone(&parts.dispatcher);
                            let outbound = parts.outbound.clone();
                            tokio::spawn(async move {
                                let response = dispatcher.dispatch(call).await;
                                if outbound
                                    .send(ClientEvent::ToolResponse(response))
                                    .await
                                    .is_err()
                                {
                                    tracing::warn!("tool response dropped; session closed");
                                }
                            });
                        }
                    }
                    Some(ServerEvent::Closed) | None => {
                        tracing::info!("session closed by remote");
                        break Status::Disconnected;
                    }
                    Some(ServerEvent::Fault(reason)) => {
                        tracing::error!(%reason, "session transport fault");
                        break Status::Error;
                    }
                }
            }

            _ = &mut parts.shutdown => {
                tracing::debug!("session shutdown requested");
                break Status::Disconnected;
            }
        }
    };

    teardown(parts, final_status);
}

/// Release everything, in strict order: microphone first, then playback,
/// then the transport, then the shared-state signals
fn teardown(mut parts: SessionParts, final_status: Status) {
    parts.capture.stop();
    parts.playback.stop();
    parts.transport.close();
    clear_live_playback(&parts.live_playback);
    parts.shared.set_input_loudness(0.0);
    parts.shared.clear_citations();
    parts.shared.set_display(None);
    parts.shared.set_status(final_status);
}

/// Discard every frame already sitting in the capture queue
///
/// Returns the number of frames dropped.
fn drain_stale_frames(frames: &mut mpsc::Receiver<Vec<u8>>) -> usize {
    let mut dropped = 0;
    while frames.try_recv().is_ok() {
        dropped += 1;
    }
    dropped
}

/// Drop the controller's reference to a session's playback handle
fn clear_live_playback(slot: &Mutex<Option<PlaybackHandle>>) {
    if let Ok(mut handle) = slot.lock() {
        *handle = None;
    }
}
