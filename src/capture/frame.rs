// Frame handles delivered by the capture driver
//
// The driver owns the frame pool. Everything on our side only ever holds an
// Arc clone of a handle: cloning is "retain", dropping is "release".

use std::fmt;
use std::sync::Arc;

use gstreamer_audio as gst_audio;
use gstreamer_video as gst_video;
use serde::{Deserialize, Serialize};

bitflags::bitflags! {
    /// Per-frame flags reported by the driver
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct FrameFlags: u32 {
        /// Frame is stored bottom-up
        const FLIP_VERTICAL = 1 << 0;
        /// No signal on the input connector (cable unplugged / source off)
        const NO_INPUT_SOURCE = 1 << 31;
    }
}

/// Which embedded timecode a frame should be asked for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimecodeFormat {
    /// Don't query timecodes at all
    #[default]
    Disabled,
    /// SMPTE RP188 (ancillary data)
    Rp188,
    /// Vertical interval timecode
    Vitc,
    /// Serial (RS-422) timecode
    Serial,
}

/// SMPTE timecode as reported by a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timecode {
    pub hours: u8,
    pub minutes: u8,
    pub seconds: u8,
    pub frames: u8,
    pub drop_frame: bool,
}

impl Timecode {
    /// Build a non-drop-frame timecode from a running frame count
    pub fn from_frame_count(count: u64, fps: u32) -> Self {
        let fps = fps.max(1) as u64;
        let total_secs = count / fps;
        Self {
            hours: ((total_secs / 3600) % 24) as u8,
            minutes: ((total_secs / 60) % 60) as u8,
            seconds: (total_secs % 60) as u8,
            frames: (count % fps) as u8,
            drop_frame: false,
        }
    }
}

impl fmt::Display for Timecode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sep = if self.drop_frame { ';' } else { ':' };
        write!(
            f,
            "{:02}:{:02}:{:02}{}{:02}",
            self.hours, self.minutes, self.seconds, sep, self.frames
        )
    }
}

/// A captured video frame owned by the driver's frame pool
pub trait VideoInputFrame: Send + Sync {
    fn width(&self) -> u32;
    fn height(&self) -> u32;
    /// Bytes per row including padding
    fn row_bytes(&self) -> usize;
    fn pixel_format(&self) -> gst_video::VideoFormat;
    fn flags(&self) -> FrameFlags;
    /// Raw frame memory, `row_bytes * height` bytes
    fn data(&self) -> &[u8];
    /// Embedded timecode of the requested kind, if the frame carries one
    fn timecode(&self, format: TimecodeFormat) -> Option<Timecode>;

    fn size(&self) -> usize {
        self.row_bytes() * self.height() as usize
    }
}

/// The audio captured alongside a video frame
pub trait AudioInputPacket: Send + Sync {
    /// Number of sample frames (one sample per channel) in the packet
    fn sample_frame_count(&self) -> usize;
    fn channels(&self) -> u32;
    fn sample_format(&self) -> gst_audio::AudioFormat;
    /// Interleaved sample data
    fn data(&self) -> &[u8];
}

pub type VideoFrameRef = Arc<dyn VideoInputFrame>;
pub type AudioPacketRef = Arc<dyn AudioInputPacket>;
