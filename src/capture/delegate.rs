//! Driver callback sink
//!
//! The capture driver calls [`InputCallback::on_frame_arrived`] from its own
//! capture thread once per captured frame. The delegate validates the
//! delivery, stamps it with the element's running time and publishes it into
//! the element's [`FrameHandoff`](super::handoff::FrameHandoff). It never
//! blocks on the streaming thread and always reports success; overload is
//! handled by overwriting the pending frame.
//!
//! Lifetime follows the driver's add-ref/release contract through
//! [`DelegateRef`]. The driver and the element each hold one.

use std::sync::{Arc, Weak};

use gstreamer as gst;
use gstreamer::prelude::*;
use parking_lot::Mutex;

use super::element::CaptureElement;
use super::frame::{AudioPacketRef, FrameFlags, TimecodeFormat, VideoFrameRef};
use super::mode::{DetectedFormatFlags, DisplayMode, FormatChangedEvents};

/// Callbacks the capture driver invokes on its input
pub trait InputCallback: Send + Sync {
    /// A frame interval completed. Either frame may be missing on a
    /// malformed delivery.
    fn on_frame_arrived(
        &self,
        video: Option<&VideoFrameRef>,
        audio: Option<&AudioPacketRef>,
    ) -> Result<gst::FlowSuccess, gst::FlowError>;

    /// The input signal changed resolution, frame rate or colorspace
    fn on_format_changed(
        &self,
        events: FormatChangedEvents,
        mode: &DisplayMode,
        flags: DetectedFormatFlags,
    ) -> Result<gst::FlowSuccess, gst::FlowError>;
}

pub struct CaptureDelegate {
    element: Weak<CaptureElement>,
    /// Diagnostic only, `Disabled` unless the config asks for a format
    timecode_format: TimecodeFormat,
}

impl CaptureDelegate {
    /// Create a delegate pointing back at `element`.
    ///
    /// The returned handle is the first reference (count 1).
    pub fn new(element: Weak<CaptureElement>, timecode_format: TimecodeFormat) -> DelegateRef {
        DelegateRef {
            shared: Arc::new(Shared {
                refs: Mutex::new(1),
                delegate: CaptureDelegate {
                    element,
                    timecode_format,
                },
            }),
            released: false,
        }
    }

    pub fn timecode_format(&self) -> TimecodeFormat {
        self.timecode_format
    }
}

impl InputCallback for CaptureDelegate {
    fn on_frame_arrived(
        &self,
        video: Option<&VideoFrameRef>,
        audio: Option<&AudioPacketRef>,
    ) -> Result<gst::FlowSuccess, gst::FlowError> {
        // The element may already be gone during teardown
        let Some(element) = self.element.upgrade() else {
            return Ok(gst::FlowSuccess::Ok);
        };

        let Some(video) = video else {
            log::warn!("[{}] Video frame is missing", element.name());
            return Ok(gst::FlowSuccess::Ok);
        };

        let Some(audio) = audio else {
            log::warn!("[{}] Audio packet is missing", element.name());
            return Ok(gst::FlowSuccess::Ok);
        };

        if video.flags().contains(FrameFlags::NO_INPUT_SOURCE) {
            log::debug!("[{}] Frame received - no input signal detected", element.name());
            return Ok(gst::FlowSuccess::Ok);
        }

        let timecode = match self.timecode_format {
            TimecodeFormat::Disabled => None,
            format => video.timecode(format),
        };

        // Object lock only; the handoff lock is taken afterwards
        let capture_time = element.capture_time();

        log::trace!(
            "[{}] Frame received [{}] - {} - size: {} bytes",
            element.name(),
            timecode
                .map(|tc| tc.to_string())
                .unwrap_or_else(|| "No timecode".to_string()),
            capture_time.display(),
            video.size()
        );

        let outcome = element.handoff().publish(video, Some(audio), capture_time);
        if outcome.flushing {
            log::trace!("[{}] Flushing, frame discarded", element.name());
        } else if outcome.dropped_previous {
            log::debug!(
                "[{}] Overwrote unconsumed frame before #{}",
                element.name(),
                outcome.frame_index
            );
        }

        Ok(gst::FlowSuccess::Ok)
    }

    fn on_format_changed(
        &self,
        events: FormatChangedEvents,
        mode: &DisplayMode,
        flags: DetectedFormatFlags,
    ) -> Result<gst::FlowSuccess, gst::FlowError> {
        let Some(element) = self.element.upgrade() else {
            return Ok(gst::FlowSuccess::Ok);
        };

        log::error!(
            "[{}] Unimplemented: video input format changed to {} ({:?}, {:?})",
            element.name(),
            mode.id.display_name(),
            events,
            flags
        );

        Ok(gst::FlowSuccess::Ok)
    }
}

impl Drop for CaptureDelegate {
    fn drop(&mut self) {
        log::debug!("Capture delegate destroyed");
    }
}

struct Shared {
    refs: Mutex<u32>,
    delegate: CaptureDelegate,
}

/// One counted reference on a [`CaptureDelegate`].
///
/// `add_ref` hands out another counted reference, `release` gives one back.
/// The delegate is destroyed once the count reaches zero and the last handle
/// is gone, on whichever thread that happens. A handle dropped without
/// `release` gives its count back on drop.
pub struct DelegateRef {
    shared: Arc<Shared>,
    released: bool,
}

impl DelegateRef {
    /// Take another reference. Returns it with the new count.
    #[must_use]
    pub fn add_ref(&self) -> (DelegateRef, u32) {
        let count = {
            let mut refs = self.shared.refs.lock();
            *refs += 1;
            *refs
        };
        let handle = DelegateRef {
            shared: self.shared.clone(),
            released: false,
        };
        (handle, count)
    }

    /// Give this reference back. Returns the remaining count; at 0 the
    /// delegate is destroyed.
    pub fn release(mut self) -> u32 {
        self.released = true;
        self.decrement()
    }

    fn decrement(&self) -> u32 {
        let mut refs = self.shared.refs.lock();
        *refs -= 1;
        *refs
    }

    pub fn ref_count(&self) -> u32 {
        *self.shared.refs.lock()
    }
}

impl Drop for DelegateRef {
    fn drop(&mut self) {
        if !self.released {
            let remaining = self.decrement();
            log::debug!("Capture delegate reference dropped unreleased (refs: {})", remaining);
        }
    }
}

impl std::ops::Deref for DelegateRef {
    type Target = CaptureDelegate;

    fn deref(&self) -> &CaptureDelegate {
        &self.shared.delegate
    }
}
