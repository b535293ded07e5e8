// Simulated capture driver
//
// Stands in for the card driver: owns a capture thread that ticks at the
// input mode's frame rate and calls the registered delegate with a
// test-pattern frame and a packet of silence, the way the hardware thread
// would. Signal loss, missing audio and format changes can be injected
// through the control channel.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{select, tick, unbounded, Receiver, Sender};
use gstreamer_audio as gst_audio;
use gstreamer_video as gst_video;

use super::delegate::{DelegateRef, InputCallback};
use super::element::AUDIO_SAMPLE_RATE;
use super::frame::{
    AudioInputPacket, AudioPacketRef, FrameFlags, Timecode, TimecodeFormat, VideoFrameRef,
    VideoInputFrame,
};
use super::mode::{DetectedFormatFlags, DisplayMode, FormatChangedEvents, ModeId};
use super::{CaptureError, Result};

const AUDIO_CHANNELS: u32 = 2;
/// S16LE
const AUDIO_BYTES_PER_SAMPLE: usize = 2;

/// Control messages for the capture thread
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceCommand {
    /// Connect or disconnect the input signal
    SetSignal(bool),
    /// Deliver frames with or without their audio packet
    SetAudio(bool),
    /// Switch the input to another mode (reported through `on_format_changed`)
    ChangeFormat(ModeId),
    Stop,
}

struct SimulatedVideoFrame {
    mode: DisplayMode,
    flags: FrameFlags,
    frame_number: u64,
    pattern: Arc<Vec<u8>>,
}

impl VideoInputFrame for SimulatedVideoFrame {
    fn width(&self) -> u32 {
        self.mode.width
    }

    fn height(&self) -> u32 {
        self.mode.height
    }

    fn row_bytes(&self) -> usize {
        self.mode.row_bytes()
    }

    fn pixel_format(&self) -> gst_video::VideoFormat {
        self.mode.pixel_format
    }

    fn flags(&self) -> FrameFlags {
        self.flags
    }

    fn data(&self) -> &[u8] {
        &self.pattern
    }

    fn timecode(&self, format: TimecodeFormat) -> Option<Timecode> {
        match format {
            TimecodeFormat::Rp188 | TimecodeFormat::Vitc => Some(Timecode::from_frame_count(
                self.frame_number,
                self.mode.nominal_fps(),
            )),
            TimecodeFormat::Serial | TimecodeFormat::Disabled => None,
        }
    }
}

struct SimulatedAudioPacket {
    samples: Arc<Vec<u8>>,
}

impl AudioInputPacket for SimulatedAudioPacket {
    fn sample_frame_count(&self) -> usize {
        self.samples.len() / (AUDIO_CHANNELS as usize * AUDIO_BYTES_PER_SAMPLE)
    }

    fn channels(&self) -> u32 {
        AUDIO_CHANNELS
    }

    fn sample_format(&self) -> gst_audio::AudioFormat {
        gst_audio::AudioFormat::S16le
    }

    fn data(&self) -> &[u8] {
        &self.samples
    }
}

/// UYVY color bars, one full frame
fn test_pattern(mode: &DisplayMode) -> Vec<u8> {
    // (U, Y, V) for white, yellow, cyan, green, magenta, red, blue, black
    const BARS: [(u8, u8, u8); 8] = [
        (128, 235, 128),
        (16, 210, 146),
        (166, 170, 16),
        (54, 145, 34),
        (202, 106, 222),
        (90, 81, 240),
        (240, 41, 110),
        (128, 16, 128),
    ];

    let row_bytes = mode.row_bytes();
    let mut row = vec![0u8; row_bytes];
    let bar_width = (mode.width as usize / BARS.len()).max(1);
    for (pair, chunk) in row.chunks_exact_mut(4).enumerate() {
        let x = pair * 2;
        let (u, y, v) = BARS[(x / bar_width).min(BARS.len() - 1)];
        chunk.copy_from_slice(&[u, y, v, y]);
    }

    row.repeat(mode.height as usize)
}

fn silence(mode: &DisplayMode) -> Vec<u8> {
    let samples = (AUDIO_SAMPLE_RATE * mode.fps_d as u64 / mode.fps_n.max(1) as u64) as usize;
    vec![0u8; samples * AUDIO_CHANNELS as usize * AUDIO_BYTES_PER_SAMPLE]
}

fn frame_interval(mode: &DisplayMode) -> Duration {
    Duration::from_nanos(mode.frame_duration().nseconds())
}

/// A fake capture card input
pub struct SimulatedDevice {
    name: String,
    mode: ModeId,
    /// The driver's reference on the registered delegate while idle
    callback: Option<DelegateRef>,
    control: Option<Sender<DeviceCommand>>,
    /// The capture thread owns the delegate reference while running and
    /// hands it back when it exits
    thread: Option<JoinHandle<DelegateRef>>,
    frames_delivered: Arc<AtomicU64>,
}

impl SimulatedDevice {
    pub fn new(name: impl Into<String>, mode: ModeId) -> Self {
        Self {
            name: name.into(),
            mode,
            callback: None,
            control: None,
            thread: None,
            frames_delivered: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Register the delegate. The device takes its own reference.
    pub fn set_callback(&mut self, delegate: &DelegateRef) -> Result<()> {
        if self.is_running() {
            return Err(CaptureError::Device(format!(
                "{}: can't change callback while streaming",
                self.name
            )));
        }

        let (reference, count) = delegate.add_ref();
        log::debug!("[{}] Callback registered (refs: {})", self.name, count);
        if let Some(previous) = self.callback.replace(reference) {
            previous.release();
        }
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.thread.is_some()
    }

    pub fn frames_delivered(&self) -> u64 {
        self.frames_delivered.load(Ordering::Relaxed)
    }

    /// Start the capture thread
    pub fn start(&mut self) -> Result<()> {
        if self.is_running() {
            return Err(CaptureError::Device(format!("{}: already streaming", self.name)));
        }
        let Some(callback) = self.callback.take() else {
            return Err(CaptureError::Device(format!("{}: no callback registered", self.name)));
        };

        let (control_tx, control_rx) = unbounded();
        let frames_delivered = self.frames_delivered.clone();
        let mode = self.mode;
        let name = self.name.clone();

        let thread = std::thread::Builder::new()
            .name(format!("{}-capture", self.name))
            .spawn(move || capture_loop(name, mode, callback, control_rx, frames_delivered))?;

        self.control = Some(control_tx);
        self.thread = Some(thread);
        log::info!("[{}] Streams started ({})", self.name, self.mode.display_name());
        Ok(())
    }

    /// Send a control message to the running capture thread
    pub fn send(&self, command: DeviceCommand) -> Result<()> {
        let control = self
            .control
            .as_ref()
            .ok_or_else(|| CaptureError::Device(format!("{}: not streaming", self.name)))?;
        control
            .send(command)
            .map_err(|_| CaptureError::Device(format!("{}: capture thread exited", self.name)))
    }

    pub fn set_signal(&self, connected: bool) -> Result<()> {
        self.send(DeviceCommand::SetSignal(connected))
    }

    /// Switch modes; a later restart resumes in the new mode
    pub fn change_format(&mut self, mode: ModeId) -> Result<()> {
        self.send(DeviceCommand::ChangeFormat(mode))?;
        self.mode = mode;
        Ok(())
    }

    /// Stop the capture thread. The delegate reference comes back to the
    /// device and stays registered.
    pub fn stop(&mut self) {
        if let Some(control) = self.control.take() {
            let _ = control.send(DeviceCommand::Stop);
        }
        if let Some(thread) = self.thread.take() {
            match thread.join() {
                Ok(callback) => self.callback = Some(callback),
                // The thread's handle gave its count back while unwinding
                Err(_) => log::error!("[{}] Capture thread panicked", self.name),
            }
            log::info!(
                "[{}] Streams stopped after {} frames",
                self.name,
                self.frames_delivered()
            );
        }
    }

    /// Stop streaming and release the device's delegate reference
    pub fn unregister(&mut self) -> Option<u32> {
        self.stop();
        self.callback.take().map(|callback| {
            let remaining = callback.release();
            log::debug!("[{}] Callback released (refs: {})", self.name, remaining);
            remaining
        })
    }
}

impl Drop for SimulatedDevice {
    fn drop(&mut self) {
        self.unregister();
    }
}

enum LoopEvent {
    Command(Option<DeviceCommand>),
    Tick,
}

fn capture_loop(
    name: String,
    mode: ModeId,
    callback: DelegateRef,
    control: Receiver<DeviceCommand>,
    frames_delivered: Arc<AtomicU64>,
) -> DelegateRef {
    let mut mode = mode.display_mode();
    let mut pattern = Arc::new(test_pattern(&mode));
    let mut samples = Arc::new(silence(&mode));
    let mut ticker = tick(frame_interval(&mode));
    let mut signal = true;
    let mut audio_enabled = true;
    let mut frame_number: u64 = 0;

    loop {
        let event = select! {
            recv(control) -> msg => LoopEvent::Command(msg.ok()),
            recv(ticker) -> _ => LoopEvent::Tick,
        };

        match event {
            LoopEvent::Command(Some(DeviceCommand::SetSignal(connected))) => {
                log::info!(
                    "[{}] Input signal {}",
                    name,
                    if connected { "connected" } else { "lost" }
                );
                signal = connected;
            }
            LoopEvent::Command(Some(DeviceCommand::SetAudio(enabled))) => {
                audio_enabled = enabled;
            }
            LoopEvent::Command(Some(DeviceCommand::ChangeFormat(id))) => {
                let previous = mode;
                mode = id.display_mode();
                pattern = Arc::new(test_pattern(&mode));
                samples = Arc::new(silence(&mode));
                ticker = tick(frame_interval(&mode));

                let events = FormatChangedEvents {
                    display_mode_changed: previous.id != mode.id,
                    field_dominance_changed: previous.interlaced != mode.interlaced,
                    colorspace_changed: false,
                };
                let flags = DetectedFormatFlags {
                    ycbcr422: true,
                    ..Default::default()
                };
                if let Err(e) = callback.on_format_changed(events, &mode, flags) {
                    log::warn!("[{}] Format change callback failed: {:?}", name, e);
                }
            }
            LoopEvent::Command(Some(DeviceCommand::Stop)) | LoopEvent::Command(None) => break,
            LoopEvent::Tick => {
                let mut flags = FrameFlags::empty();
                if !signal {
                    flags.insert(FrameFlags::NO_INPUT_SOURCE);
                }

                let video: VideoFrameRef = Arc::new(SimulatedVideoFrame {
                    mode,
                    flags,
                    frame_number,
                    pattern: pattern.clone(),
                });
                let audio: Option<AudioPacketRef> = if audio_enabled {
                    Some(Arc::new(SimulatedAudioPacket {
                        samples: samples.clone(),
                    }))
                } else {
                    None
                };

                if let Err(e) = callback.on_frame_arrived(Some(&video), audio.as_ref()) {
                    log::warn!("[{}] Frame callback failed: {:?}", name, e);
                }
                frame_number += 1;
                frames_delivered.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    callback
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::element::CaptureElement;
    use crate::config::CaptureConfig;
    use std::time::Instant;

    fn wait_for(mut condition: impl FnMut() -> bool, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        condition()
    }

    fn setup(mode: ModeId) -> (Arc<CaptureElement>, SimulatedDevice) {
        let element = CaptureElement::new(CaptureConfig {
            mode,
            ..CaptureConfig::default()
        });
        let delegate = element.create_delegate();
        let mut device = SimulatedDevice::new("sim0", mode);
        device.set_callback(&delegate).unwrap();
        delegate.release();
        (element, device)
    }

    #[test]
    fn pattern_fills_whole_frame() {
        let mode = ModeId::Pal.display_mode();
        let pattern = test_pattern(&mode);
        assert_eq!(pattern.len(), mode.row_bytes() * mode.height as usize);
        // First pixel pair is white
        assert_eq!(&pattern[..4], &[128, 235, 128, 235]);
    }

    #[test]
    fn silence_matches_frame_rate() {
        let packet = SimulatedAudioPacket {
            samples: Arc::new(silence(&ModeId::Hd1080p25.display_mode())),
        };
        assert_eq!(packet.sample_frame_count(), 1920);
    }

    #[test]
    fn start_without_callback_fails() {
        let mut device = SimulatedDevice::new("sim0", ModeId::Pal);
        assert!(matches!(device.start(), Err(CaptureError::Device(_))));
    }

    #[test]
    fn delivers_frames_into_handoff() {
        let (element, mut device) = setup(ModeId::Hd720p50);
        device.start().unwrap();

        assert!(wait_for(|| element.stats().frames_received >= 3, Duration::from_secs(2)));
        device.stop();

        let stats = element.stats();
        assert_eq!(stats.frames_received, device.frames_delivered());
        // Nobody consumed: everything but the last frame was dropped
        assert_eq!(stats.dropped_frames, stats.frames_received - 1);

        let frame = element.handoff().take().unwrap();
        assert_eq!(frame.video.width(), 1280);
        assert_eq!(frame.audio.unwrap().sample_frame_count(), 960);
    }

    #[test]
    fn signal_loss_suppresses_publishing() {
        let (element, mut device) = setup(ModeId::Hd720p50);
        device.start().unwrap();
        device.set_signal(false).unwrap();
        // Let anything published before the command land
        std::thread::sleep(Duration::from_millis(60));
        let before = element.stats().frames_received;
        let delivered = device.frames_delivered();

        assert!(wait_for(|| device.frames_delivered() >= delivered + 3, Duration::from_secs(2)));
        assert_eq!(element.stats().frames_received, before);

        device.set_signal(true).unwrap();
        assert!(wait_for(|| element.stats().frames_received > before, Duration::from_secs(2)));
        device.stop();
    }

    #[test]
    fn missing_audio_is_ignored() {
        let (element, mut device) = setup(ModeId::Hd720p50);
        device.start().unwrap();
        device.send(DeviceCommand::SetAudio(false)).unwrap();
        std::thread::sleep(Duration::from_millis(60));
        let before = element.stats().frames_received;
        let delivered = device.frames_delivered();

        assert!(wait_for(|| device.frames_delivered() >= delivered + 3, Duration::from_secs(2)));
        assert_eq!(element.stats().frames_received, before);
        device.stop();
    }

    #[test]
    fn format_change_keeps_capturing_in_new_mode() {
        let (element, mut device) = setup(ModeId::Hd720p50);
        device.start().unwrap();
        device.change_format(ModeId::Pal).unwrap();

        assert!(wait_for(
            || {
                element
                    .handoff()
                    .take()
                    .map(|frame| frame.video.width() == 720)
                    .unwrap_or(false)
            },
            Duration::from_secs(2)
        ));
        device.stop();
    }

    #[test]
    fn unregister_releases_device_reference() {
        let element = CaptureElement::new(CaptureConfig::default());
        let delegate = element.create_delegate();
        let mut device = SimulatedDevice::new("sim0", ModeId::Hd1080p30);
        device.set_callback(&delegate).unwrap();
        // element + test handle + device
        assert_eq!(delegate.ref_count(), 3);

        device.start().unwrap();
        device.stop();
        assert_eq!(delegate.ref_count(), 3);

        assert_eq!(device.unregister(), Some(2));
        assert_eq!(delegate.release(), 1);
    }
}
