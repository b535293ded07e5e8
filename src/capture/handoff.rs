//! Single-slot frame mailbox between the driver's capture thread and the
//! streaming thread.
//!
//! This is a bounded queue of capacity one with an explicit overwrite policy:
//! publishing while a frame is still pending replaces it and counts a drop.
//! The producer never waits for the consumer. The consumer blocks on the
//! condition variable until a frame is pending or the handoff is flushing.
//!
//! The slot retains (holds an `Arc` clone of) every handle it stores and lets
//! go of it exactly once: when the frame is overwritten, taken, or flushed.

use std::time::{Duration, Instant};

use gstreamer as gst;
use parking_lot::{Condvar, Mutex};

use super::frame::{AudioPacketRef, VideoFrameRef};
use super::{CaptureError, Result};

/// A frame pair taken out of the slot. The consumer now owns the references.
pub struct CapturedFrame {
    pub video: VideoFrameRef,
    pub audio: Option<AudioPacketRef>,
    /// Running time at capture, `None` when no clock was attached
    pub capture_time: Option<gst::ClockTime>,
    /// Zero-based arrival index, counting dropped frames too
    pub frame_index: u64,
    /// Drop total at the time this frame was stored
    pub dropped_before: u64,
}

/// What a publish did to the slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublishOutcome {
    /// A pending frame was overwritten
    pub dropped_previous: bool,
    pub frame_index: u64,
    /// The handoff was flushing; the pair was not stored or counted
    pub flushing: bool,
}

/// Counter snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HandoffStats {
    /// Frames received from the driver, delivered or not
    pub frames_received: u64,
    /// Pending frames overwritten before the consumer got to them
    pub dropped_frames: u64,
    pub pending: bool,
}

struct Slot {
    pending: Option<CapturedFrame>,
    frames_received: u64,
    dropped_frames: u64,
    flushing: bool,
}

pub struct FrameHandoff {
    slot: Mutex<Slot>,
    cond: Condvar,
}

impl FrameHandoff {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(Slot {
                pending: None,
                frames_received: 0,
                dropped_frames: 0,
                flushing: false,
            }),
            cond: Condvar::new(),
        }
    }

    /// Store a frame pair, replacing (and releasing) any pending one.
    ///
    /// Retains both handles. Signals the consumer exactly once. While
    /// flushing nothing is retained, stored or counted.
    pub fn publish(
        &self,
        video: &VideoFrameRef,
        audio: Option<&AudioPacketRef>,
        capture_time: Option<gst::ClockTime>,
    ) -> PublishOutcome {
        let mut slot = self.slot.lock();

        if slot.flushing {
            return PublishOutcome {
                dropped_previous: false,
                frame_index: slot.frames_received,
                flushing: true,
            };
        }

        // Release the stale pair before the new one goes in
        let dropped_previous = match slot.pending.take() {
            Some(stale) => {
                slot.dropped_frames += 1;
                drop(stale);
                true
            }
            None => false,
        };

        let frame_index = slot.frames_received;
        slot.pending = Some(CapturedFrame {
            video: video.clone(),
            audio: audio.cloned(),
            capture_time,
            frame_index,
            dropped_before: slot.dropped_frames,
        });
        // Counts frames received, not frames delivered
        slot.frames_received += 1;

        self.cond.notify_one();

        PublishOutcome {
            dropped_previous,
            frame_index,
            flushing: false,
        }
    }

    /// Take the pending frame without waiting
    pub fn take(&self) -> Option<CapturedFrame> {
        self.slot.lock().pending.take()
    }

    /// Block until a frame is pending, then take it.
    ///
    /// Returns `CaptureError::Flushing` if the handoff is (or becomes) flushing.
    pub fn wait(&self) -> Result<CapturedFrame> {
        let mut slot = self.slot.lock();
        loop {
            if slot.flushing {
                return Err(CaptureError::Flushing);
            }
            if let Some(frame) = slot.pending.take() {
                return Ok(frame);
            }
            self.cond.wait(&mut slot);
        }
    }

    /// Like [`wait`](Self::wait) but gives up after `timeout`, returning `Ok(None)`
    pub fn wait_timeout(&self, timeout: Duration) -> Result<Option<CapturedFrame>> {
        let deadline = Instant::now() + timeout;
        let mut slot = self.slot.lock();
        loop {
            if slot.flushing {
                return Err(CaptureError::Flushing);
            }
            if let Some(frame) = slot.pending.take() {
                return Ok(Some(frame));
            }
            if self.cond.wait_until(&mut slot, deadline).timed_out() {
                // A publish may have raced the timeout
                if slot.flushing {
                    return Err(CaptureError::Flushing);
                }
                return Ok(slot.pending.take());
            }
        }
    }

    /// Enter or leave flushing.
    ///
    /// Entering wakes every waiter and releases the pending frame without
    /// counting it as dropped. Returns whether a pending frame was released.
    pub fn set_flushing(&self, flushing: bool) -> bool {
        let stale = {
            let mut slot = self.slot.lock();
            slot.flushing = flushing;
            if flushing {
                self.cond.notify_all();
                slot.pending.take()
            } else {
                None
            }
        };
        stale.is_some()
    }

    pub fn is_flushing(&self) -> bool {
        self.slot.lock().flushing
    }

    /// Forget the pending frame and zero both counters
    pub fn reset(&self) {
        let stale = {
            let mut slot = self.slot.lock();
            slot.frames_received = 0;
            slot.dropped_frames = 0;
            slot.pending.take()
        };
        drop(stale);
    }

    pub fn stats(&self) -> HandoffStats {
        let slot = self.slot.lock();
        HandoffStats {
            frames_received: slot.frames_received,
            dropped_frames: slot.dropped_frames,
            pending: slot.pending.is_some(),
        }
    }
}

impl Default for FrameHandoff {
    fn default() -> Self {
        Self::new()
    }
}
