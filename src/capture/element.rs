// The owning source element
//
// Holds the state the delegate reaches back into (clock + base time under the
// object lock, the frame handoff) and the streaming-thread side that turns a
// taken frame pair into timestamped GStreamer buffers.

use std::sync::Arc;
use std::time::Duration;

use gstreamer as gst;
use parking_lot::Mutex;

use super::clock::{ClockState, PipelineClock};
use super::delegate::{CaptureDelegate, DelegateRef};
use super::handoff::{CapturedFrame, FrameHandoff, HandoffStats};
use super::mode::DisplayMode;
use super::{CaptureError, Result};
use crate::config::CaptureConfig;

/// Capture cards deliver embedded audio at a fixed 48 kHz
pub const AUDIO_SAMPLE_RATE: u64 = 48_000;

/// One streaming iteration's output
#[derive(Debug)]
pub struct CapturedBuffer {
    pub video: gst::Buffer,
    pub audio: Option<gst::Buffer>,
    pub frame_index: u64,
    pub capture_time: Option<gst::ClockTime>,
    /// Frames were dropped between the previous buffer and this one
    pub discont: bool,
}

pub struct CaptureElement {
    name: String,
    config: CaptureConfig,
    mode: DisplayMode,
    /// Object lock: clock and base time
    object_lock: Mutex<ClockState>,
    handoff: FrameHandoff,
    /// Drop total already reported by `create` (streaming thread only)
    dropped_reported: Mutex<u64>,
    /// The element's own reference on its delegate
    delegate: Mutex<Option<DelegateRef>>,
}

impl CaptureElement {
    pub fn new(config: CaptureConfig) -> Arc<Self> {
        let mode = config.mode.display_mode();
        Arc::new(Self {
            name: config.device_name.clone(),
            config,
            mode,
            object_lock: Mutex::new(ClockState::default()),
            handoff: FrameHandoff::new(),
            dropped_reported: Mutex::new(0),
            delegate: Mutex::new(None),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }

    pub fn mode(&self) -> DisplayMode {
        self.mode
    }

    pub fn handoff(&self) -> &FrameHandoff {
        &self.handoff
    }

    pub fn stats(&self) -> HandoffStats {
        self.handoff.stats()
    }

    /// Create the callback delegate for this element.
    ///
    /// The element keeps one reference; the returned one is for the driver.
    pub fn create_delegate(self: &Arc<Self>) -> DelegateRef {
        let own = CaptureDelegate::new(Arc::downgrade(self), self.config.timecode_format);
        let (for_driver, count) = own.add_ref();
        log::debug!("[{}] Capture delegate created (refs: {})", self.name, count);

        let previous = self.delegate.lock().replace(own);
        if let Some(previous) = previous {
            previous.release();
        }
        for_driver
    }

    /// Attach a pipeline clock with the element's base time
    pub fn set_clock(&self, clock: Arc<dyn PipelineClock>, base_time: gst::ClockTime) {
        let mut state = self.object_lock.lock();
        state.clock = Some(clock);
        state.base_time = Some(base_time);
    }

    pub fn clear_clock(&self) {
        let mut state = self.object_lock.lock();
        state.clock = None;
        state.base_time = None;
    }

    /// Running time right now, `None` without a clock.
    ///
    /// Only the object lock is taken, and only long enough to copy the clock
    /// handle; the clock itself is queried after it is released.
    pub fn capture_time(&self) -> Option<gst::ClockTime> {
        let (clock, base_time) = {
            let state = self.object_lock.lock();
            match &state.clock {
                Some(clock) => (Some(clock.clone()), state.base_time),
                None => (None, None),
            }
        };

        let now = clock.and_then(|clock| clock.now());
        ClockState::running_time(now, base_time)
    }

    /// Prepare for streaming: clear stale frames and counters, stop flushing
    pub fn start(&self) -> Result<()> {
        crate::gstreamer_init::ensure_initialized()?;

        self.handoff.reset();
        *self.dropped_reported.lock() = 0;
        self.handoff.set_flushing(false);

        log::info!("[{}] Capture started ({})", self.name, self.mode.id.display_name());
        Ok(())
    }

    /// Wake the streaming thread and refuse further waits until `start`.
    ///
    /// Returns whether an undelivered frame was discarded.
    pub fn stop(&self) -> bool {
        let discarded = self.handoff.set_flushing(true);

        let stats = self.handoff.stats();
        log::info!(
            "[{}] Capture stopped: {} frames received, {} dropped",
            self.name,
            stats.frames_received,
            stats.dropped_frames
        );
        discarded
    }

    /// Block until the next frame pair is available and wrap it in buffers.
    ///
    /// Honors `wait_timeout_ms` from the config (0 waits forever).
    pub fn create(&self) -> Result<CapturedBuffer> {
        crate::gstreamer_init::ensure_initialized()?;

        let frame = match self.config.wait_timeout_ms {
            0 => self.handoff.wait()?,
            ms => {
                let timeout = Duration::from_millis(ms);
                self.handoff
                    .wait_timeout(timeout)?
                    .ok_or(CaptureError::Timeout(timeout))?
            }
        };

        Ok(self.wrap_frame(frame))
    }

    fn wrap_frame(&self, frame: CapturedFrame) -> CapturedBuffer {
        let discont = {
            let mut reported = self.dropped_reported.lock();
            let new_drops = frame.dropped_before.saturating_sub(*reported);
            *reported = frame.dropped_before;
            if new_drops > 0 && self.config.warn_on_drops {
                log::warn!("[{}] Dropped {} frame(s)", self.name, new_drops);
            }
            new_drops > 0
        };

        let duration = self.mode.frame_duration();
        let mut video = gst::Buffer::from_mut_slice(frame.video.data().to_vec());
        {
            let video = video.make_mut();
            video.set_pts(frame.capture_time);
            video.set_duration(duration);
            video.set_offset(frame.frame_index);
            video.set_offset_end(frame.frame_index + 1);
            if discont {
                video.set_flags(gst::BufferFlags::DISCONT);
            }
        }

        let audio = frame.audio.as_ref().map(|packet| {
            let samples = packet.sample_frame_count() as u64;
            let mut buffer = gst::Buffer::from_mut_slice(packet.data().to_vec());
            {
                let buffer = buffer.make_mut();
                buffer.set_pts(frame.capture_time);
                buffer.set_duration(gst::ClockTime::from_nseconds(
                    samples * gst::ClockTime::SECOND.nseconds() / AUDIO_SAMPLE_RATE,
                ));
                if discont {
                    buffer.set_flags(gst::BufferFlags::DISCONT);
                }
            }
            buffer
        });

        log::trace!(
            "[{}] Created buffer #{} ({} bytes)",
            self.name,
            frame.frame_index,
            video.size()
        );

        // Driver frames are released here, the buffers own copies
        CapturedBuffer {
            video,
            audio,
            frame_index: frame.frame_index,
            capture_time: frame.capture_time,
            discont,
        }
    }
}

impl Drop for CaptureElement {
    fn drop(&mut self) {
        if let Some(delegate) = self.delegate.get_mut().take() {
            let remaining = delegate.release();
            log::debug!("[{}] Released capture delegate (refs: {})", self.name, remaining);
        }
    }
}
