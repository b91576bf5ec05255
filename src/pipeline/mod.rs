//! Tracking pipeline: frame sources, the worker pool and result sequencing

pub mod dispatcher;
pub mod sequencer;
pub mod source;

pub use dispatcher::{DispatcherStats, FrameDetector, FrameDispatcher, ResultSink};
pub use sequencer::{Applied, ResultSequencer, SequencerStats};
pub use source::{DirectoryFrameSource, FrameSource, MemoryFrameSource};
