//! The bidirectional audio adapter.

use bytes::{Bytes, BytesMut};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::{timeout, Instant};
use tracing::{trace, warn};

use voicebridge_codec_core::resample::resample;
use voicebridge_codec_core::Sample;

use crate::error::{Error, Result};

/// Sample rate of the AI session.
pub const AI_SAMPLE_RATE: u32 = 24_000;

/// One frame is 20 ms of audio.
pub const FRAME_DURATION: Duration = Duration::from_millis(20);

/// Uplink queue depth in frames (≈ 320 ms); the AI consumes at any
/// rate, so this only needs to ride out scheduling jitter.
const UPLINK_QUEUE_CAPACITY: usize = 16;

/// Downlink queue depth in frames (≈ 5 s). The AI streams synthesized
/// speech faster than realtime while the telephone side drains at
/// exactly 50 frames a second; the burst has to fit here.
const DOWNLINK_QUEUE_CAPACITY: usize = 256;

/// Bounded FIFO of fixed-size frames with an async deadline pop.
struct FrameQueue {
    frames: Mutex<VecDeque<Bytes>>,
    notify: Notify,
    capacity: usize,
}

impl FrameQueue {
    fn new(capacity: usize) -> Self {
        Self {
            frames: Mutex::new(VecDeque::with_capacity(capacity.min(64))),
            notify: Notify::new(),
            capacity,
        }
    }

    fn push(&self, frame: Bytes) {
        {
            let mut frames = self.frames.lock();
            if frames.len() == self.capacity {
                frames.pop_front();
                trace!("audio queue overflow, oldest frame discarded");
            }
            frames.push_back(frame);
        }
        self.notify.notify_one();
    }

    async fn pop_within(&self, wait: Duration) -> Option<Bytes> {
        let deadline = Instant::now() + wait;
        loop {
            if let Some(frame) = self.frames.lock().pop_front() {
                return Some(frame);
            }
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            if timeout(deadline - now, self.notify.notified()).await.is_err() {
                return self.frames.lock().pop_front();
            }
        }
    }

    fn clear(&self) {
        self.frames.lock().clear();
    }
}

/// Frames and rate-matches the two directions of one call.
///
/// Uplink: fixed telephone-rate frames in, fixed AI-rate frames out.
/// Downlink: variable AI-rate chunks in, fixed telephone-rate frames
/// out through a byte accumulator that only ever releases whole
/// frames, in order.
pub struct AudioAdapter {
    telephone_rate: u32,
    telephone_frame_len: usize,
    ai_frame_len: usize,
    uplink: FrameQueue,
    downlink: FrameQueue,
    downlink_accumulator: Mutex<BytesMut>,
}

impl AudioAdapter {
    /// Build an adapter for a call at the given telephone rate.
    ///
    /// Frame sizes follow from the 20 ms cadence: `rate × 0.020 × 2`
    /// bytes of PCM16 per frame.
    pub fn new(telephone_rate: u32) -> Self {
        let telephone_frame_len = (telephone_rate as usize / 1000) * 20 * 2;
        let ai_frame_len = (AI_SAMPLE_RATE as usize / 1000) * 20 * 2;
        trace!(
            telephone_rate,
            telephone_frame_len,
            ai_frame_len,
            "audio adapter created"
        );
        Self {
            telephone_rate,
            telephone_frame_len,
            ai_frame_len,
            uplink: FrameQueue::new(UPLINK_QUEUE_CAPACITY),
            downlink: FrameQueue::new(DOWNLINK_QUEUE_CAPACITY),
            downlink_accumulator: Mutex::new(BytesMut::new()),
        }
    }

    /// PCM16 bytes per 20 ms telephone-rate frame.
    pub fn telephone_frame_len(&self) -> usize {
        self.telephone_frame_len
    }

    /// PCM16 bytes per 20 ms AI-rate frame.
    pub fn ai_frame_len(&self) -> usize {
        self.ai_frame_len
    }

    /// Enqueue one 20 ms telephone-rate PCM16 frame toward the AI.
    pub fn push_uplink(&self, frame: Bytes) -> Result<()> {
        if frame.len() != self.telephone_frame_len {
            return Err(Error::BadFrameLength {
                expected: self.telephone_frame_len,
                actual: frame.len(),
            });
        }
        self.uplink.push(frame);
        Ok(())
    }

    /// Pull one AI-rate frame, resampling exactly one telephone frame.
    ///
    /// Waits at most one frame interval; starvation yields silence so
    /// the AI's voice activity detector keeps seeing a steady stream.
    pub async fn pull_uplink(&self) -> Bytes {
        match self.uplink.pop_within(FRAME_DURATION).await {
            Some(frame) => {
                let samples = bytes_to_samples(&frame);
                let converted = resample(&samples, self.telephone_rate, AI_SAMPLE_RATE);
                let out = samples_to_bytes(&converted);
                if out.len() != self.ai_frame_len {
                    warn!(
                        expected = self.ai_frame_len,
                        actual = out.len(),
                        "uplink resample produced unexpected frame size"
                    );
                }
                out
            }
            None => Bytes::from(vec![0u8; self.ai_frame_len]),
        }
    }

    /// Feed a variable-length AI-rate chunk toward the telephone.
    ///
    /// The chunk is resampled to the telephone rate and appended to the
    /// accumulator; every complete frame is moved to the downlink queue
    /// in order.
    pub fn push_downlink(&self, chunk: &[u8]) {
        if chunk.is_empty() {
            return;
        }
        let samples = bytes_to_samples(chunk);
        let converted = resample(&samples, AI_SAMPLE_RATE, self.telephone_rate);

        let mut accumulator = self.downlink_accumulator.lock();
        accumulator.extend_from_slice(&samples_to_bytes(&converted));
        while accumulator.len() >= self.telephone_frame_len {
            let frame = accumulator.split_to(self.telephone_frame_len).freeze();
            self.downlink.push(frame);
        }
    }

    /// Pull one telephone-rate frame, or silence after one interval.
    pub async fn pull_downlink(&self) -> Bytes {
        match self.downlink.pop_within(FRAME_DURATION).await {
            Some(frame) => frame,
            None => Bytes::from(vec![0u8; self.telephone_frame_len]),
        }
    }

    /// Drop buffered downlink audio. Used when the AI is interrupted
    /// so the caller does not hear stale speech.
    pub fn clear_downlink(&self) {
        self.downlink.clear();
        self.downlink_accumulator.lock().clear();
    }

    /// Drop all buffered audio in both directions.
    pub fn clear(&self) {
        self.uplink.clear();
        self.clear_downlink();
    }
}

fn bytes_to_samples(data: &[u8]) -> Vec<Sample> {
    data.chunks_exact(2)
        .map(|pair| Sample::from_le_bytes([pair[0], pair[1]]))
        .collect()
}

fn samples_to_bytes(samples: &[Sample]) -> Bytes {
    let mut out = BytesMut::with_capacity(samples.len() * 2);
    for &sample in samples {
        out.extend_from_slice(&sample.to_le_bytes());
    }
    out.freeze()
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEL_FRAME: usize = 320;
    const AI_FRAME: usize = 960;

    fn tel_frame_with_value(value: i16) -> Bytes {
        samples_to_bytes(&vec![value; TEL_FRAME / 2])
    }

    fn energy(data: &[u8]) -> f64 {
        let samples = bytes_to_samples(data);
        let sum: f64 = samples.iter().map(|&s| (s as f64) * (s as f64)).sum();
        (sum / samples.len() as f64).sqrt()
    }

    #[tokio::test]
    async fn uplink_resamples_in_order() {
        let adapter = AudioAdapter::new(8000);
        for i in 0..50i16 {
            adapter.push_uplink(tel_frame_with_value(i * 100)).unwrap();
        }
        for i in 0..50i16 {
            let frame = adapter.pull_uplink().await;
            assert_eq!(frame.len(), AI_FRAME);
            let samples = bytes_to_samples(&frame);
            assert_eq!(samples[0], i * 100, "frames reordered at index {i}");
        }
    }

    #[tokio::test]
    async fn uplink_starvation_yields_silence() {
        let adapter = AudioAdapter::new(8000);
        let frame = adapter.pull_uplink().await;
        assert_eq!(frame.len(), AI_FRAME);
        assert!(frame.iter().all(|&b| b == 0));
    }

    #[tokio::test]
    async fn downlink_accumulates_partial_chunks() {
        let adapter = AudioAdapter::new(8000);
        // 480 bytes at 24 kHz -> 160 bytes at 8 kHz: half a frame.
        let chunk = vec![0x01u8; 480];
        adapter.push_downlink(&chunk);
        let frame = adapter.pull_downlink().await;
        assert!(frame.iter().all(|&b| b == 0), "half a frame must not release");

        adapter.push_downlink(&chunk);
        adapter.push_downlink(&chunk);
        let frame = adapter.pull_downlink().await;
        assert_eq!(frame.len(), TEL_FRAME);
        assert!(frame.iter().any(|&b| b != 0));
    }

    #[tokio::test]
    async fn downlink_frames_preserve_chunk_order() {
        let adapter = AudioAdapter::new(8000);
        // Two full AI frames with distinct constant values.
        adapter.push_downlink(&samples_to_bytes(&vec![1000i16; AI_FRAME / 2]));
        adapter.push_downlink(&samples_to_bytes(&vec![-2000i16; AI_FRAME / 2]));

        let first = bytes_to_samples(&adapter.pull_downlink().await);
        let second = bytes_to_samples(&adapter.pull_downlink().await);
        assert_eq!(first[0], 1000);
        assert_eq!(second[second.len() - 1], -2000);
    }

    #[tokio::test]
    async fn every_pull_matches_framing_law() {
        let adapter = AudioAdapter::new(8000);
        for _ in 0..5 {
            assert_eq!(adapter.pull_downlink().await.len(), 8000 / 25);
            assert_eq!(adapter.pull_uplink().await.len(), 24000 / 25);
        }
    }

    #[tokio::test]
    async fn downlink_roundtrip_energy_within_one_db() {
        let adapter = AudioAdapter::new(8000);
        let telephone: Vec<i16> = (0..160)
            .map(|i| {
                let t = i as f64 / 8000.0;
                (6000.0 * (2.0 * std::f64::consts::PI * 440.0 * t).sin()) as i16
            })
            .collect();
        let upsampled = resample(&telephone, 8000, AI_SAMPLE_RATE);
        adapter.push_downlink(&samples_to_bytes(&upsampled));

        let frame = adapter.pull_downlink().await;
        assert_eq!(frame.len(), TEL_FRAME);
        let original = samples_to_bytes(&telephone);
        let db = 20.0 * (energy(&frame) / energy(&original)).log10();
        assert!(db.abs() < 1.0, "energy drifted {db} dB");
    }

    #[tokio::test]
    async fn wrong_uplink_frame_length_is_rejected() {
        let adapter = AudioAdapter::new(8000);
        let err = adapter.push_uplink(Bytes::from(vec![0u8; 100])).unwrap_err();
        assert!(matches!(err, Error::BadFrameLength { expected: 320, actual: 100 }));
    }

    #[tokio::test]
    async fn clear_flushes_everything() {
        let adapter = AudioAdapter::new(8000);
        adapter.push_uplink(tel_frame_with_value(42)).unwrap();
        adapter.push_downlink(&vec![0x05u8; AI_FRAME]);
        adapter.push_downlink(&vec![0x05u8; 480]);
        adapter.clear();

        let up = adapter.pull_uplink().await;
        assert!(up.iter().all(|&b| b == 0));
        let down = adapter.pull_downlink().await;
        assert!(down.iter().all(|&b| b == 0));
    }
}
