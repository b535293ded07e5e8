// Capture-card frame delivery
//
// The driver calls the delegate from its own capture thread; the delegate
// timestamps each frame pair and drops it into the element's single-slot
// handoff; the element's streaming thread takes it from there.

pub mod clock;
pub mod delegate;
pub mod element;
pub mod frame;
pub mod handoff;
pub mod mode;
pub mod simulated;

pub use clock::{ClockState, ManualClock, PipelineClock};
pub use delegate::{CaptureDelegate, DelegateRef, InputCallback};
pub use element::{CaptureElement, CapturedBuffer};
pub use frame::{
    AudioInputPacket, AudioPacketRef, FrameFlags, Timecode, TimecodeFormat, VideoFrameRef,
    VideoInputFrame,
};
pub use handoff::{CapturedFrame, FrameHandoff, HandoffStats, PublishOutcome};
pub use mode::{DetectedFormatFlags, DisplayMode, FormatChangedEvents, ModeId};
pub use simulated::{DeviceCommand, SimulatedDevice};

use gstreamer as gst;

/// Error type for capture operations
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("Capture is flushing")]
    Flushing,

    #[error("GStreamer error: {0}")]
    Gst(#[from] gst::glib::Error),

    #[error("No frame within {0:?}")]
    Timeout(std::time::Duration),

    #[error("Device error: {0}")]
    Device(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CaptureError>;
