// Pipeline clock access
//
// Capture timestamps are running time: the pipeline clock reading minus the
// element's base time. The clock is optional; without one the timestamp is
// unknown.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use gstreamer as gst;
use gstreamer::prelude::*;

/// A monotonic clock the pipeline runs on
pub trait PipelineClock: Send + Sync {
    /// Current clock reading, `None` if the clock can't tell
    fn now(&self) -> Option<gst::ClockTime>;
}

impl PipelineClock for gst::Clock {
    fn now(&self) -> Option<gst::ClockTime> {
        ClockExt::time(self).into()
    }
}

/// A clock that only moves when told to
#[derive(Debug, Default)]
pub struct ManualClock {
    nanos: AtomicU64,
}

impl ManualClock {
    pub fn new(start: gst::ClockTime) -> Self {
        Self {
            nanos: AtomicU64::new(start.nseconds()),
        }
    }

    pub fn set(&self, time: gst::ClockTime) {
        self.nanos.store(time.nseconds(), Ordering::SeqCst);
    }

    pub fn advance(&self, by: gst::ClockTime) {
        self.nanos.fetch_add(by.nseconds(), Ordering::SeqCst);
    }
}

impl PipelineClock for ManualClock {
    fn now(&self) -> Option<gst::ClockTime> {
        Some(gst::ClockTime::from_nseconds(self.nanos.load(Ordering::SeqCst)))
    }
}

/// Clock state guarded by the element's object lock
#[derive(Clone, Default)]
pub struct ClockState {
    pub clock: Option<Arc<dyn PipelineClock>>,
    pub base_time: Option<gst::ClockTime>,
}

impl ClockState {
    /// Running time for a clock reading taken outside the object lock
    pub fn running_time(
        now: Option<gst::ClockTime>,
        base_time: Option<gst::ClockTime>,
    ) -> Option<gst::ClockTime> {
        match (now, base_time) {
            (Some(now), Some(base)) => Some(gst::ClockTime::from_nseconds(
                now.nseconds().saturating_sub(base.nseconds()),
            )),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn running_time_subtracts_base_time() {
        let now = Some(gst::ClockTime::from_seconds(10));
        let base = Some(gst::ClockTime::from_seconds(4));
        assert_eq!(
            ClockState::running_time(now, base),
            Some(gst::ClockTime::from_seconds(6))
        );
    }

    #[test]
    fn running_time_unknown_without_clock_or_base() {
        assert_eq!(
            ClockState::running_time(None, Some(gst::ClockTime::ZERO)),
            None
        );
        assert_eq!(
            ClockState::running_time(Some(gst::ClockTime::from_seconds(1)), None),
            None
        );
    }

    #[test]
    fn running_time_saturates_before_base_time() {
        let now = Some(gst::ClockTime::from_seconds(1));
        let base = Some(gst::ClockTime::from_seconds(2));
        assert_eq!(
            ClockState::running_time(now, base),
            Some(gst::ClockTime::ZERO)
        );
    }

    #[test]
    fn manual_clock_advances() {
        let clock = ManualClock::new(gst::ClockTime::from_seconds(1));
        clock.advance(gst::ClockTime::from_mseconds(500));
        assert_eq!(clock.now(), Some(gst::ClockTime::from_mseconds(1500)));
        clock.set(gst::ClockTime::ZERO);
        assert_eq!(clock.now(), Some(gst::ClockTime::ZERO));
    }
}
