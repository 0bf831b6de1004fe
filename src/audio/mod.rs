// Audio module - frame contract, capture-to-analysis transfer and beat clock

pub mod beat_clock;
pub mod buffer_pool;
pub mod frame;

// Re-export commonly used types for convenience
pub use beat_clock::{
    BeatClock, BeatTick, IntervalBeatClock, ManualBeatClock, SessionClock, TickSink, TimeSource,
};
pub use buffer_pool::{CapturedFrame, FrameConsumer, FramePool, FrameProducer, DEFAULT_FRAME_COUNT};
pub use frame::{validate_frame, validate_frame_size, AudioFrame};
