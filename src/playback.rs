//! Playback scheduler: gapless output of synthesized speech
//!
//! Decoded chunks arrive from the transport in bursts; the scheduler places
//! each on a monotonic sample timeline so consecutive chunks play
//! back-to-back with no gap and no overlap, regardless of arrival jitter.
//!
//! The scheduling core ([`Timeline`]) is pure and runs in the sample domain:
//! `start = max(next_start, clock)`, then `next_start = start + len`. The
//! cpal output stream lives on a dedicated OS thread (same ownership pattern
//! as the capture side); its callback mixes scheduled chunks under a mutex
//! and applies the output gain at the mix stage.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::mpsc as std_mpsc;
use std::sync::{Arc, Mutex};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::SampleRate;

use crate::codec::PLAYBACK_SAMPLE_RATE;
use crate::{Error, Result};

/// Playback thread name
const THREAD_NAME: &str = "voxlink-playback";

/// A chunk scheduled on the output timeline
struct ScheduledChunk {
    /// Start position in samples on the timeline
    start: u64,
    samples: Vec<f32>,
    /// Next sample to play
    pos: usize,
}

impl ScheduledChunk {
    fn finished(&self) -> bool {
        self.pos >= self.samples.len()
    }
}

/// Pure gapless scheduling core in the sample domain
///
/// `clock` advances only as the output callback consumes samples, making it
/// the monotonic "current time" of the output device.
pub(crate) struct Timeline {
    clock: u64,
    next_start: u64,
    chunks: Vec<ScheduledChunk>,
}

impl Timeline {
    pub(crate) const fn new() -> Self {
        Self {
            clock: 0,
            next_start: 0,
            chunks: Vec::new(),
        }
    }

    /// Schedule a chunk; returns its start position
    pub(crate) fn schedule(&mut self, samples: Vec<f32>) -> u64 {
        let start = self.next_start.max(self.clock);
        self.next_start = start + samples.len() as u64;
        self.chunks.push(ScheduledChunk {
            start,
            samples,
            pos: 0,
        });
        start
    }

    /// Mix one output buffer, advancing the clock by one sample per frame
    ///
    /// Mono content is duplicated across `channels`. Finished chunks are
    /// discarded after the pass.
    pub(crate) fn mix(&mut self, out: &mut [f32], channels: usize, gain: f32) {
        for frame in out.chunks_mut(channels) {
            let mut acc = 0.0f32;
            for chunk in &mut self.chunks {
                if chunk.start <= self.clock && !chunk.finished() {
                    acc += chunk.samples[chunk.pos];
                    chunk.pos += 1;
                }
            }
            let value = acc * gain;
            for out_sample in frame {
                *out_sample = value;
            }
            self.clock += 1;
        }
        self.chunks.retain(|c| !c.finished());
    }

    /// Stop every outstanding chunk; safe to call when already empty
    pub(crate) fn stop_all(&mut self) {
        self.chunks.clear();
        self.next_start = self.clock;
    }

    pub(crate) fn in_flight(&self) -> usize {
        self.chunks.len()
    }

    #[cfg(test)]
    pub(crate) const fn clock(&self) -> u64 {
        self.clock
    }

    #[cfg(test)]
    pub(crate) const fn next_start(&self) -> u64 {
        self.next_start
    }
}

/// Mixer state shared between the session and the output callback
struct MixerShared {
    timeline: Mutex<Timeline>,
    speaking: AtomicBool,
    /// Output gain, f32 bits
    gain: AtomicU32,
}

/// Cloneable, `Send` handle for scheduling and controlling playback
#[derive(Clone)]
pub struct PlaybackHandle {
    shared: Arc<MixerShared>,
}

impl PlaybackHandle {
    /// Schedule a decoded chunk for gapless playback
    pub fn enqueue(&self, samples: Vec<f32>) {
        if samples.is_empty() {
            return;
        }
        if let Ok(mut timeline) = self.shared.timeline.lock() {
            let start = timeline.schedule(samples);
            self.shared.speaking.store(true, Ordering::Release);
            tracing::trace!(start, in_flight = timeline.in_flight(), "chunk scheduled");
        }
    }

    /// Forcibly stop all outstanding chunks; idempotent
    pub fn stop_all(&self) {
        if let Ok(mut timeline) = self.shared.timeline.lock() {
            timeline.stop_all();
            self.shared.speaking.store(false, Ordering::Release);
        }
    }

    /// True iff any scheduled chunk has not yet finished playing
    #[must_use]
    pub fn is_speaking(&self) -> bool {
        self.shared.speaking.load(Ordering::Acquire)
    }

    /// Set the output gain, clamped to [0, 1]; takes effect immediately,
    /// including for chunks already in flight
    pub fn set_gain(&self, gain: f32) {
        self.shared
            .gain
            .store(gain.clamp(0.0, 1.0).to_bits(), Ordering::Relaxed);
    }

    /// A handle backed by a mixer with no output device
    #[cfg(test)]
    pub(crate) fn detached() -> Self {
        Self {
            shared: Arc::new(MixerShared {
                timeline: Mutex::new(Timeline::new()),
                speaking: AtomicBool::new(false),
                gain: AtomicU32::new(1.0f32.to_bits()),
            }),
        }
    }
}

/// Owns the output device thread for one session
pub struct PlaybackScheduler {
    handle: PlaybackHandle,
    stop_tx: std_mpsc::Sender<()>,
    join: Option<std::thread::JoinHandle<()>>,
}

impl PlaybackScheduler {
    /// Open the default output device and start the mix callback
    ///
    /// # Errors
    ///
    /// Returns `Error::Audio` if no output device is available or the
    /// stream cannot be opened.
    pub fn start(initial_gain: f32) -> Result<Self> {
        let shared = Arc::new(MixerShared {
            timeline: Mutex::new(Timeline::new()),
            speaking: AtomicBool::new(false),
            gain: AtomicU32::new(initial_gain.clamp(0.0, 1.0).to_bits()),
        });

        let (stop_tx, stop_rx) = std_mpsc::channel::<()>();
        let (ready_tx, ready_rx) = std_mpsc::channel::<std::result::Result<(), String>>();

        let thread_shared = Arc::clone(&shared);
        let join = std::thread::Builder::new()
            .name(THREAD_NAME.to_string())
            .spawn(move || playback_thread(&thread_shared, &ready_tx, &stop_rx))?;

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Self {
                handle: PlaybackHandle { shared },
                stop_tx,
                join: Some(join),
            }),
            Ok(Err(e)) => {
                let _ = join.join();
                Err(Error::Audio(e))
            }
            Err(_) => {
                let _ = join.join();
                Err(Error::Audio(
                    "playback thread exited before opening the device".to_string(),
                ))
            }
        }
    }

    /// `Send` handle for the session event loop and public surface
    #[must_use]
    pub fn handle(&self) -> PlaybackHandle {
        self.handle.clone()
    }

    /// Stop all chunks and release the output device
    ///
    /// Blocks until the playback thread has dropped the stream. Idempotent.
    pub fn stop(&mut self) {
        self.handle.stop_all();
        let _ = self.stop_tx.send(());
        if let Some(join) = self.join.take() {
            let _ = join.join();
            tracing::debug!("audio playback stopped");
        }
    }
}

impl Drop for PlaybackScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Thread body: open the device, report readiness, park until stopped
fn playback_thread(
    shared: &Arc<MixerShared>,
    ready_tx: &std_mpsc::Sender<std::result::Result<(), String>>,
    stop_rx: &std_mpsc::Receiver<()>,
) {
    let stream = match build_output_stream(Arc::clone(shared)) {
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

    let _ = stop_rx.recv();
    drop(stream);
}

fn build_output_stream(shared: Arc<MixerShared>) -> Result<cpal::Stream> {
    let host = cpal::default_host();

    let device = host
        .default_output_device()
        .ok_or_else(|| Error::Audio("no output device available".to_string()))?;

    let supported_config = device
        .supported_output_configs()
        .map_err(|e| Error::Audio(e.to_string()))?
        .find(|c| {
            c.channels() == 1
                && c.min_sample_rate() <= SampleRate(PLAYBACK_SAMPLE_RATE)
                && c.max_sample_rate() >= SampleRate(PLAYBACK_SAMPLE_RATE)
        })
        .or_else(|| {
            // Fallback: try stereo
            device.supported_output_configs().ok()?.find(|c| {
                c.channels() == 2
                    && c.min_sample_rate() <= SampleRate(PLAYBACK_SAMPLE_RATE)
                    && c.max_sample_rate() >= SampleRate(PLAYBACK_SAMPLE_RATE)
            })
        })
        .ok_or_else(|| Error::Audio("no suitable output config found".to_string()))?;

    let config = supported_config
        .with_sample_rate(SampleRate(PLAYBACK_SAMPLE_RATE))
        .config();

    let channels = config.channels as usize;

    tracing::debug!(
        device = device.name().unwrap_or_default(),
        sample_rate = PLAYBACK_SAMPLE_RATE,
        channels,
        "audio playback initialized"
    );

    let stream = device
        .build_output_stream(
            &config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                let gain = f32::from_bits(shared.gain.load(Ordering::Relaxed));
                if let Ok(mut timeline) = shared.timeline.lock() {
                    timeline.mix(data, channels, gain);
                    shared
                        .speaking
                        .store(timeline.in_flight() > 0, Ordering::Release);
                } else {
                    data.fill(0.0);
                }
            },
            |err| {
                tracing::error!(error = %err, "audio playback error");
            },
            None,
        )
        .map_err(|e| Error::Audio(e.to_string()))?;

    Ok(stream)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(timeline: &mut Timeline, samples: usize) {
        let mut out = vec![0.0f32; samples];
        timeline.mix(&mut out, 1, 1.0);
    }

    #[test]
    fn back_to_back_chunks_are_gapless() {
        let mut timeline = Timeline::new();

        // Two 0.5s chunks arriving with no inter-arrival delay
        let start0 = timeline.schedule(vec![0.1; 12_000]);
        let start1 = timeline.schedule(vec![0.1; 12_000]);

        assert_eq!(start0, 0);
        assert_eq!(start1, 12_000);
        assert_eq!(timeline.next_start(), 24_000);
    }

    #[test]
    fn start_sequence_is_non_decreasing_and_non_overlapping() {
        let mut timeline = Timeline::new();
        let durations = [400usize, 100, 900, 1, 250];

        let mut prev_start = 0u64;
        let mut prev_len = 0u64;
        for &len in &durations {
            let start = timeline.schedule(vec![0.0; len]);
            assert!(start >= prev_start + prev_len, "chunks must not overlap");
            assert_eq!(start, prev_start + prev_len, "no unintended silence");
            prev_start = start;
            prev_len = len as u64;
        }
    }

    #[test]
    fn late_chunk_starts_at_current_clock() {
        let mut timeline = Timeline::new();
        timeline.schedule(vec![0.5; 100]);
        // Play past the end of the first chunk, then idle
        drain(&mut timeline, 500);
        assert_eq!(timeline.in_flight(), 0);

        let start = timeline.schedule(vec![0.5; 100]);
        assert_eq!(start, timeline.clock());
    }

    #[test]
    fn mix_applies_gain_and_duplicates_channels() {
        let mut timeline = Timeline::new();
        timeline.schedule(vec![0.8; 4]);

        let mut out = vec![0.0f32; 8];
        timeline.mix(&mut out, 2, 0.5);

        for frame in out.chunks(2) {
            assert!((frame[0] - 0.4).abs() < 1e-6);
            assert!((frame[0] - frame[1]).abs() < f32::EPSILON);
        }
    }

    #[test]
    fn finished_chunks_leave_the_in_flight_set() {
        let mut timeline = Timeline::new();
        timeline.schedule(vec![0.1; 64]);
        timeline.schedule(vec![0.1; 64]);
        assert_eq!(timeline.in_flight(), 2);

        drain(&mut timeline, 64);
        assert_eq!(timeline.in_flight(), 1);

        drain(&mut timeline, 64);
        assert_eq!(timeline.in_flight(), 0);
    }

    #[test]
    fn stop_all_is_idempotent_and_pins_next_start() {
        let mut timeline = Timeline::new();
        timeline.schedule(vec![0.1; 1000]);
        drain(&mut timeline, 100);

        timeline.stop_all();
        assert_eq!(timeline.in_flight(), 0);
        assert_eq!(timeline.next_start(), timeline.clock());

        // Safe when the set is already empty
        timeline.stop_all();
        assert_eq!(timeline.in_flight(), 0);
    }

    #[test]
    fn failed_decode_leaves_the_timeline_untouched() {
        let mut timeline = Timeline::new();
        timeline.schedule(vec![0.1; 64]);
        let next_start = timeline.next_start();

        // An odd-length payload never reaches the scheduler
        let err = crate::codec::decode(&[0x01, 0x02, 0x03]).unwrap_err();
        assert!(matches!(err, crate::Error::Codec(_)));

        assert_eq!(timeline.next_start(), next_start);
        assert_eq!(timeline.in_flight(), 1);
    }

    #[test]
    fn schedule_after_stop_does_not_wait_for_cancelled_audio() {
        let mut timeline = Timeline::new();
        timeline.schedule(vec![0.1; 100_000]);
        drain(&mut timeline, 10);
        timeline.stop_all();

        let start = timeline.schedule(vec![0.1; 10]);
        assert_eq!(start, 10);
    }

    #[test]
    fn handle_speaking_flag_tracks_in_flight_set() {
        let shared = Arc::new(MixerShared {
            timeline: Mutex::new(Timeline::new()),
            speaking: AtomicBool::new(false),
            gain: AtomicU32::new(1.0f32.to_bits()),
        });
        let handle = PlaybackHandle {
            shared: Arc::clone(&shared),
        };

        assert!(!handle.is_speaking());
        handle.enqueue(vec![0.1; 32]);
        assert!(handle.is_speaking());

        // Simulate the output callback draining everything
        let mut out = vec![0.0f32; 32];
        {
            let mut timeline = shared.timeline.lock().unwrap();
            timeline.mix(&mut out, 1, 1.0);
            shared
                .speaking
                .store(timeline.in_flight() > 0, Ordering::Release);
        }
        assert!(!handle.is_speaking());

        handle.stop_all();
        assert!(!handle.is_speaking());
    }

    #[test]
    fn empty_chunk_is_ignored() {
        let shared = Arc::new(MixerShared {
            timeline: Mutex::new(Timeline::new()),
            speaking: AtomicBool::new(false),
            gain: AtomicU32::new(1.0f32.to_bits()),
        });
        let handle = PlaybackHandle { shared };
        handle.enqueue(Vec::new());
        assert!(!handle.is_speaking());
    }
}
