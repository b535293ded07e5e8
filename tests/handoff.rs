// End-to-end frame delivery through the public API

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use decklink_capture::capture::{
    AudioInputPacket, AudioPacketRef, FrameFlags, ManualClock, ModeId, Timecode, TimecodeFormat,
    VideoFrameRef, VideoInputFrame,
};
use decklink_capture::{CaptureConfig, CaptureElement, CaptureError, InputCallback, SimulatedDevice};
use gstreamer as gst;
use gstreamer_audio as gst_audio;
use gstreamer_video as gst_video;

struct Frame {
    data: Vec<u8>,
    flags: FrameFlags,
    live: Arc<AtomicUsize>,
}

impl Frame {
    fn new(tag: u8, live: &Arc<AtomicUsize>) -> VideoFrameRef {
        live.fetch_add(1, Ordering::SeqCst);
        Arc::new(Frame {
            data: vec![tag; 8],
            flags: FrameFlags::empty(),
            live: live.clone(),
        })
    }
}

impl VideoInputFrame for Frame {
    fn width(&self) -> u32 {
        2
    }
    fn height(&self) -> u32 {
        2
    }
    fn row_bytes(&self) -> usize {
        4
    }
    fn pixel_format(&self) -> gst_video::VideoFormat {
        gst_video::VideoFormat::Uyvy
    }
    fn flags(&self) -> FrameFlags {
        self.flags
    }
    fn data(&self) -> &[u8] {
        &self.data
    }
    fn timecode(&self, _format: TimecodeFormat) -> Option<Timecode> {
        None
    }
}

impl Drop for Frame {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

struct Packet;

impl AudioInputPacket for Packet {
    fn sample_frame_count(&self) -> usize {
        4
    }
    fn channels(&self) -> u32 {
        2
    }
    fn sample_format(&self) -> gst_audio::AudioFormat {
        gst_audio::AudioFormat::S16le
    }
    fn data(&self) -> &[u8] {
        &[0; 16]
    }
}

fn packet() -> AudioPacketRef {
    Arc::new(Packet)
}

fn started(config: CaptureConfig) -> Arc<CaptureElement> {
    let element = CaptureElement::new(config);
    element.start().unwrap();
    element
}

#[test]
fn newer_frame_replaces_unconsumed_one() {
    let element = started(CaptureConfig::default());
    let delegate = element.create_delegate();
    let live = Arc::new(AtomicUsize::new(0));

    let a = Frame::new(b'A', &live);
    let b = Frame::new(b'B', &live);
    delegate.on_frame_arrived(Some(&a), Some(&packet())).unwrap();
    delegate.on_frame_arrived(Some(&b), Some(&packet())).unwrap();
    drop((a, b));

    // A was released when B overwrote it
    assert_eq!(live.load(Ordering::SeqCst), 1);

    let out = element.create().unwrap();
    assert_eq!(out.frame_index, 1);
    assert!(out.discont);
    let map = out.video.map_readable().unwrap();
    assert_eq!(map.as_slice(), &[b'B'; 8]);
    drop(map);

    assert_eq!(live.load(Ordering::SeqCst), 0);
    assert_eq!(element.stats().dropped_frames, 1);
    delegate.release();
}

#[test]
fn burst_without_consumer_keeps_only_the_last_frame() {
    let element = started(CaptureConfig::default());
    let delegate = element.create_delegate();
    let live = Arc::new(AtomicUsize::new(0));

    const BURST: u8 = 12;
    for tag in 0..BURST {
        let frame = Frame::new(tag, &live);
        delegate.on_frame_arrived(Some(&frame), Some(&packet())).unwrap();
    }

    let stats = element.stats();
    assert_eq!(stats.frames_received, BURST as u64);
    assert_eq!(stats.dropped_frames, BURST as u64 - 1);
    assert!(stats.pending);
    assert_eq!(live.load(Ordering::SeqCst), 1);

    let out = element.create().unwrap();
    let map = out.video.map_readable().unwrap();
    assert_eq!(map.as_slice()[0], BURST - 1);
    delegate.release();
}

#[test]
fn frames_stamped_with_running_time() {
    let element = started(CaptureConfig::default());
    let clock = Arc::new(ManualClock::new(gst::ClockTime::from_seconds(5)));
    element.set_clock(clock.clone(), gst::ClockTime::from_seconds(4));
    let delegate = element.create_delegate();
    let live = Arc::new(AtomicUsize::new(0));

    clock.advance(gst::ClockTime::from_mseconds(250));
    delegate
        .on_frame_arrived(Some(&Frame::new(0, &live)), Some(&packet()))
        .unwrap();

    let out = element.create().unwrap();
    assert_eq!(out.capture_time, Some(gst::ClockTime::from_mseconds(1250)));
    assert_eq!(out.video.pts(), out.capture_time);
    assert_eq!(out.audio.unwrap().pts(), out.capture_time);
    delegate.release();
}

#[test]
fn callbacks_after_element_teardown_are_ignored() {
    let element = started(CaptureConfig::default());
    let delegate = element.create_delegate();
    let live = Arc::new(AtomicUsize::new(0));
    drop(element);

    let frame = Frame::new(0, &live);
    assert_eq!(
        delegate.on_frame_arrived(Some(&frame), Some(&packet())),
        Ok(gst::FlowSuccess::Ok)
    );
    drop(frame);
    assert_eq!(live.load(Ordering::SeqCst), 0);
    assert_eq!(delegate.release(), 0);
}

#[test]
fn simulated_device_streams_into_element() {
    let config = CaptureConfig {
        mode: ModeId::Hd720p50,
        wait_timeout_ms: 500,
        ..CaptureConfig::default()
    };
    let element = started(config.clone());
    element.set_clock(
        Arc::new(ManualClock::new(gst::ClockTime::from_seconds(1))),
        gst::ClockTime::ZERO,
    );

    let delegate = element.create_delegate();
    let mut device = SimulatedDevice::new("sim", config.mode);
    device.set_callback(&delegate).unwrap();
    assert_eq!(delegate.ref_count(), 3);
    delegate.release();

    let streaming = {
        let element = element.clone();
        thread::spawn(move || {
            let mut indices = Vec::new();
            loop {
                match element.create() {
                    Ok(buffer) => {
                        assert!(buffer.video.pts().is_some());
                        indices.push(buffer.frame_index);
                    }
                    Err(CaptureError::Flushing) => break,
                    Err(e) => panic!("unexpected error: {}", e),
                }
            }
            indices
        })
    };

    device.start().unwrap();
    thread::sleep(Duration::from_millis(300));
    assert_eq!(device.unregister(), Some(1));
    let flushed = element.stop() as u64;

    let indices = streaming.join().unwrap();
    let stats = element.stats();
    assert!(!indices.is_empty());
    assert!(indices.windows(2).all(|w| w[0] < w[1]));
    assert_eq!(
        indices.len() as u64 + stats.dropped_frames + flushed,
        stats.frames_received
    );
    assert!(stats.frames_received <= device.frames_delivered());
}
