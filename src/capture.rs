//! Capture pipeline: microphone to transport frames
//!
//! A dedicated OS thread owns the cpal input stream (cpal streams are not
//! `Send`); the pipeline handle itself is `Send` and stops the thread via a
//! channel. The stream callback accumulates device buffers into fixed-size
//! frames, publishes an RMS loudness reading per frame, encodes the frame as
//! PCM and hands it to the session over a bounded channel. When the session
//! is not accepting frames they are dropped: live audio only, no buffering
//! while disconnected.

use std::sync::Arc;
use std::sync::mpsc as std_mpsc;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::SampleRate;
use tokio::sync::mpsc;

use crate::codec::{self, CAPTURE_SAMPLE_RATE};
use crate::state::SharedState;
use crate::{Error, Result};

/// Samples per transport frame (~256ms at 16kHz)
pub const FRAME_SAMPLES: usize = 4096;

/// Capture thread name
const THREAD_NAME: &str = "voxlink-capture";

/// Captures microphone audio on a dedicated thread
pub struct CapturePipeline {
    stop_tx: std_mpsc::Sender<()>,
    join: Option<std::thread::JoinHandle<()>>,
}

impl CapturePipeline {
    /// Acquire the default input device and start streaming frames
    ///
    /// Encoded frames are delivered on `frames`; the per-frame loudness
    /// reading is published to `shared` regardless of whether anything is
    /// consuming the frames.
    ///
    /// # Errors
    ///
    /// Returns `Error::PermissionDenied` if no input device is available or
    /// the capture stream cannot be opened.
    pub fn start(frames: mpsc::Sender<Vec<u8>>, shared: Arc<SharedState>) -> Result<Self> {
        let (stop_tx, stop_rx) = std_mpsc::channel::<()>();
        let (ready_tx, ready_rx) = std_mpsc::channel::<std::result::Result<(), String>>();

        let join = std::thread::Builder::new()
            .name(THREAD_NAME.to_string())
            .spawn(move || capture_thread(&frames, &shared, &ready_tx, &stop_rx))?;

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Self {
                stop_tx,
                join: Some(join),
            }),
            Ok(Err(e)) => {
                let _ = join.join();
                Err(Error::PermissionDenied(e))
            }
            Err(_) => {
                let _ = join.join();
                Err(Error::PermissionDenied(
                    "capture thread exited before opening the device".to_string(),
                ))
            }
        }
    }

    /// Stop capturing and release the microphone
    ///
    /// Blocks until the capture thread has dropped the device stream, so the
    /// microphone is guaranteed released when this returns. Idempotent.
    pub fn stop(&mut self) {
        let _ = self.stop_tx.send(());
        if let Some(join) = self.join.take() {
            let _ = join.join();
            tracing::debug!("audio capture stopped");
        }
    }
}

impl Drop for CapturePipeline {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Thread body: open the device, report readiness, park until stopped
fn capture_thread(
    frames: &mpsc::Sender<Vec<u8>>,
    shared: &Arc<SharedState>,
    ready_tx: &std_mpsc::Sender<std::result::Result<(), String>>,
    stop_rx: &std_mpsc::Receiver<()>,
) {
    let stream = match build_capture_stream(frames.clone(), Arc::clone(shared)) {
        Ok(stream) => stream,
        Err(e) => {
            let _ = ready_tx.send(Err(e.to_string()));
            return;
        }
    };

    if let Err(e) = stream.play() {
        let _ = ready_tx.send(Err(e.to_string()));
        return;
    }

    let _ = ready_tx.send(Ok(()));

    // Park until stop is signaled or the pipeline handle is dropped
    let _ = stop_rx.recv();
    drop(stream);
}

fn build_capture_stream(
    frames: mpsc::Sender<Vec<u8>>,
    shared: Arc<SharedState>,
) -> Result<cpal::Stream> {
    let host = cpal::default_host();

    let device = host
        .default_input_device()
        .ok_or_else(|| Error::PermissionDenied("no input device available".to_string()))?;

    let supported_config = device
        .supported_input_configs()
        .map_err(|e| Error::PermissionDenied(e.to_string()))?
        .find(|c| {
            c.channels() == 1
                && c.min_sample_rate() <= SampleRate(CAPTURE_SAMPLE_RATE)
                && c.max_sample_rate() >= SampleRate(CAPTURE_SAMPLE_RATE)
        })
        .ok_or_else(|| {
            Error::PermissionDenied("no suitable capture config found".to_string())
        })?;

    let config = supported_config
        .with_sample_rate(SampleRate(CAPTURE_SAMPLE_RATE))
        .config();

    tracing::debug!(
        device = device.name().unwrap_or_default(),
        sample_rate = CAPTURE_SAMPLE_RATE,
        channels = config.channels,
        frame_samples = FRAME_SAMPLES,
        "audio capture initialized"
    );

    let mut accumulator = FrameAccumulator::new(FRAME_SAMPLES);

    let stream = device
        .build_input_stream(
            &config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                accumulator.push(data, |frame| {
                    shared.set_input_loudness(rms(frame));
                    // Drop the frame if the session is not keeping up or the
                    // transport is gone; loudness was already published.
                    let _ = frames.try_send(codec::encode(frame));
                });
            },
            |err| {
                tracing::error!(error = %err, "audio capture error");
            },
            None,
        )
        .map_err(|e| Error::PermissionDenied(e.to_string()))?;

    Ok(stream)
}

/// Accumulates variable-size device buffers into fixed-size frames
struct FrameAccumulator {
    frame_len: usize,
    buf: Vec<f32>,
}

impl FrameAccumulator {
    fn new(frame_len: usize) -> Self {
        Self {
            frame_len,
            buf: Vec::with_capacity(frame_len * 2),
        }
    }

    /// Append samples; invokes `emit` once per completed frame
    fn push(&mut self, data: &[f32], mut emit: impl FnMut(&[f32])) {
        self.buf.extend_from_slice(data);
        while self.buf.len() >= self.frame_len {
            {
                let frame = &self.buf[..self.frame_len];
                emit(frame);
            }
            self.buf.drain(..self.frame_len);
        }
    }
}

/// Root-mean-square loudness of a frame, clamped to [0, 1]
#[allow(clippy::cast_precision_loss)]
fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_squares: f32 = samples.iter().map(|s| s * s).sum();
    (sum_squares / samples.len() as f32).sqrt().clamp(0.0, 1.0)
}
