// Display modes and the format-change notification payload

use gstreamer as gst;
use gstreamer_video as gst_video;
use serde::{Deserialize, Serialize};

/// Input signal modes the capture path knows about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModeId {
    Ntsc,
    Pal,
    Hd720p50,
    Hd720p5994,
    Hd1080i50,
    Hd1080i5994,
    Hd1080p25,
    #[default]
    Hd1080p30,
}

impl ModeId {
    /// All supported modes (for iteration)
    pub const ALL: &'static [ModeId] = &[
        ModeId::Ntsc,
        ModeId::Pal,
        ModeId::Hd720p50,
        ModeId::Hd720p5994,
        ModeId::Hd1080i50,
        ModeId::Hd1080i5994,
        ModeId::Hd1080p25,
        ModeId::Hd1080p30,
    ];

    pub fn display_mode(&self) -> DisplayMode {
        let (width, height, fps_n, fps_d, interlaced) = match self {
            ModeId::Ntsc => (720, 486, 30000, 1001, true),
            ModeId::Pal => (720, 576, 25, 1, true),
            ModeId::Hd720p50 => (1280, 720, 50, 1, false),
            ModeId::Hd720p5994 => (1280, 720, 60000, 1001, false),
            ModeId::Hd1080i50 => (1920, 1080, 25, 1, true),
            ModeId::Hd1080i5994 => (1920, 1080, 30000, 1001, true),
            ModeId::Hd1080p25 => (1920, 1080, 25, 1, false),
            ModeId::Hd1080p30 => (1920, 1080, 30, 1, false),
        };

        DisplayMode {
            id: *self,
            width,
            height,
            fps_n,
            fps_d,
            interlaced,
            pixel_format: gst_video::VideoFormat::Uyvy,
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            ModeId::Ntsc => "NTSC",
            ModeId::Pal => "PAL",
            ModeId::Hd720p50 => "HD 720p 50",
            ModeId::Hd720p5994 => "HD 720p 59.94",
            ModeId::Hd1080i50 => "HD 1080i 50",
            ModeId::Hd1080i5994 => "HD 1080i 59.94",
            ModeId::Hd1080p25 => "HD 1080p 25",
            ModeId::Hd1080p30 => "HD 1080p 30",
        }
    }
}

/// Geometry and timing of an input signal
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DisplayMode {
    pub id: ModeId,
    pub width: u32,
    pub height: u32,
    /// Frame rate numerator (frames, not fields)
    pub fps_n: u32,
    pub fps_d: u32,
    pub interlaced: bool,
    pub pixel_format: gst_video::VideoFormat,
}

impl DisplayMode {
    /// Duration of one frame
    pub fn frame_duration(&self) -> gst::ClockTime {
        let nanos = gst::ClockTime::SECOND.nseconds() * self.fps_d as u64 / self.fps_n.max(1) as u64;
        gst::ClockTime::from_nseconds(nanos)
    }

    /// Bytes per row for the mode's pixel format (UYVY packs 2 bytes per pixel)
    pub fn row_bytes(&self) -> usize {
        match self.pixel_format {
            gst_video::VideoFormat::Uyvy | gst_video::VideoFormat::Yuy2 => self.width as usize * 2,
            gst_video::VideoFormat::Argb | gst_video::VideoFormat::Bgra => self.width as usize * 4,
            // v210 packs 6 pixels into 16 bytes, rows aligned to 128 bytes
            gst_video::VideoFormat::V210 => ((self.width as usize + 47) / 48) * 128,
            _ => self.width as usize * 2,
        }
    }

    /// Nominal integer frame rate (rounded), used for timecode counting
    pub fn nominal_fps(&self) -> u32 {
        (self.fps_n + self.fps_d / 2) / self.fps_d.max(1)
    }
}

/// What changed on the input, as reported by the driver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FormatChangedEvents {
    pub display_mode_changed: bool,
    pub field_dominance_changed: bool,
    pub colorspace_changed: bool,
}

/// What the driver detected about the new signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DetectedFormatFlags {
    pub ycbcr422: bool,
    pub rgb444: bool,
    pub dual_stream_3d: bool,
}
