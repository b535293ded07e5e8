// decklink-capture - capture-card frame delivery core
// Main library entry point

pub mod capture;
pub mod config;
pub mod gstreamer_init;

#[cfg(feature = "test-harness")]
pub mod test_harness;

pub use capture::{
    CaptureDelegate, CaptureElement, CaptureError, DelegateRef, FrameHandoff, InputCallback,
    SimulatedDevice,
};
pub use config::CaptureConfig;
