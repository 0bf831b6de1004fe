// FramePool - lock-free frame transfer from capture to analysis
//
// Object pool over two lock-free SPSC ring buffers, so the capture callback
// never allocates:
// - data queue: capture pushes filled frames, analysis pops them
// - pool queue: analysis returns emptied frames, capture reuses them
//
// Frame flow:
// 1. Capture pops an empty frame from the pool queue
// 2. Capture copies samples in and stamps the sample rate and capture time
// 3. Capture pushes the frame to the data queue
// 4. Analysis pops, estimates, then returns the frame to the pool queue
//
// If analysis falls behind, the pool runs dry and capture drops frames with
// `AudioError::BufferPoolExhausted` instead of blocking.

use rtrb::{Consumer, Producer, RingBuffer};

use crate::audio::frame::validate_frame_size;
use crate::error::AudioError;

pub const DEFAULT_FRAME_COUNT: usize = 16;

/// One captured analysis frame, pre-allocated and recycled
#[derive(Debug, Clone, PartialEq)]
pub struct CapturedFrame {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    /// Milliseconds since the listening session started
    pub captured_at_ms: f64,
}

impl CapturedFrame {
    fn empty(frame_size: usize) -> Self {
        Self {
            samples: vec![0.0; frame_size],
            sample_rate: 0,
            captured_at_ms: 0.0,
        }
    }
}

/// Capture side of the pool. Owned by the audio callback.
pub struct FrameProducer {
    frame_size: usize,
    data_producer: Producer<CapturedFrame>,
    pool_consumer: Consumer<CapturedFrame>,
}

/// Analysis side of the pool. Owned by the analysis thread.
pub struct FrameConsumer {
    data_consumer: Consumer<CapturedFrame>,
    pool_producer: Producer<CapturedFrame>,
}

/// Lock-free frame pool factory
///
/// # Example
/// ```ignore
/// let (mut producer, mut consumer) = FramePool::new(16, 2048)?;
///
/// // In the capture callback:
/// producer.push_frame(&block, 44100, now_ms)?;
///
/// // In the analysis thread:
/// if let Some(frame) = consumer.pop_frame() {
///     // estimate pitch
///     consumer.recycle(frame);
/// }
/// ```
pub struct FramePool;

impl FramePool {
    /// Pre-allocate `frame_count` frames of `frame_size` samples.
    ///
    /// All allocation happens here.
    ///
    /// # Errors
    /// `AudioError::MalformedFrame` if `frame_size` is not a power of two,
    /// `AudioError::BufferPoolExhausted` if `frame_count` is zero.
    #[allow(clippy::new_ret_no_self)]
    pub fn new(
        frame_count: usize,
        frame_size: usize,
    ) -> Result<(FrameProducer, FrameConsumer), AudioError> {
        if frame_count == 0 {
            return Err(AudioError::BufferPoolExhausted);
        }
        validate_frame_size(frame_size)?;

        let (mut pool_producer, pool_consumer) = RingBuffer::new(frame_count);
        let (data_producer, data_consumer) = RingBuffer::new(frame_count);

        for _ in 0..frame_count {
            if pool_producer.push(CapturedFrame::empty(frame_size)).is_err() {
                break;
            }
        }

        Ok((
            FrameProducer {
                frame_size,
                data_producer,
                pool_consumer,
            },
            FrameConsumer {
                data_consumer,
                pool_producer,
            },
        ))
    }
}

impl FrameProducer {
    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    /// Copy one block of samples into a pooled frame and hand it to analysis.
    ///
    /// # Errors
    /// - `MalformedFrame` when `samples` is not exactly one frame long
    /// - `InvalidSampleRate` for a zero sample rate
    /// - `BufferPoolExhausted` when analysis holds every frame
    pub fn push_frame(
        &mut self,
        samples: &[f32],
        sample_rate: u32,
        captured_at_ms: f64,
    ) -> Result<(), AudioError> {
        if samples.len() != self.frame_size {
            return Err(AudioError::MalformedFrame {
                expected: self.frame_size,
                actual: samples.len(),
            });
        }
        if sample_rate == 0 {
            return Err(AudioError::InvalidSampleRate { sample_rate });
        }

        let mut frame = self
            .pool_consumer
            .pop()
            .map_err(|_| AudioError::BufferPoolExhausted)?;
        frame.samples.copy_from_slice(samples);
        frame.sample_rate = sample_rate;
        frame.captured_at_ms = captured_at_ms;

        // Data queue capacity equals the frame count, so this cannot overflow
        self.data_producer
            .push(frame)
            .map_err(|_| AudioError::BufferPoolExhausted)
    }

    /// Empty frames currently available to capture
    pub fn available(&self) -> usize {
        self.pool_consumer.slots()
    }
}

impl FrameConsumer {
    /// Next filled frame, if any
    pub fn pop_frame(&mut self) -> Option<CapturedFrame> {
        self.data_consumer.pop().ok()
    }

    /// Return a processed frame to the pool
    pub fn recycle(&mut self, frame: CapturedFrame) {
        if self.pool_producer.push(frame).is_err() {
            log::warn!("[FramePool] Pool queue full; dropping recycled frame");
        }
    }

    /// Filled frames waiting for analysis
    pub fn pending(&self) -> usize {
        self.data_consumer.slots()
    }

    /// True once the capture side has been dropped and no frames remain
    pub fn is_closed(&self) -> bool {
        self.data_consumer.is_abandoned() && self.data_consumer.is_empty()
    }
}
