//! Capture demo
//!
//! Runs a simulated capture card against a capture element with a streaming
//! thread that is deliberately slower than the input, then reports how many
//! frames were received, delivered and dropped.
//!
//! Usage:
//!   decklink-capture [--config <path>] [--seconds <n>] [--consumer-delay-ms <n>] [--verbose]

use std::sync::Arc;
use std::time::Duration;

use decklink_capture::capture::{CaptureError, PipelineClock};
use decklink_capture::config::{self, CaptureConfig};
use decklink_capture::{gstreamer_init, CaptureElement, SimulatedDevice};
use gstreamer as gst;
use gstreamer::prelude::*;

fn arg_value<'a>(args: &'a [String], name: &str) -> Option<&'a str> {
    args.iter()
        .position(|a| a == name)
        .and_then(|i| args.get(i + 1))
        .map(String::as_str)
}

fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().collect();

    let verbose = args.iter().any(|a| a == "--verbose");
    let seconds: u64 = arg_value(&args, "--seconds").unwrap_or("3").parse()?;
    let consumer_delay_ms: u64 = arg_value(&args, "--consumer-delay-ms")
        .unwrap_or("50")
        .parse()?;
    let config_path = arg_value(&args, "--config")
        .map(std::path::PathBuf::from)
        .unwrap_or_else(config::default_config_path);

    let log_level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    gstreamer_init::init_gstreamer_env();

    let config = CaptureConfig::load_or_default(&config_path);
    let element = CaptureElement::new(config.clone());
    element.start()?;

    let clock = gst::SystemClock::obtain();
    let base_time = clock.now().unwrap_or(gst::ClockTime::ZERO);
    element.set_clock(Arc::new(clock), base_time);

    let delegate = element.create_delegate();
    let mut device = SimulatedDevice::new(config.device_name.clone(), config.mode);
    device.set_callback(&delegate)?;
    delegate.release();

    let streaming = {
        let element = element.clone();
        std::thread::Builder::new()
            .name("streaming".to_string())
            .spawn(move || {
                let mut delivered: u64 = 0;
                loop {
                    match element.create() {
                        Ok(buffer) => {
                            delivered += 1;
                            log::debug!(
                                "Buffer #{} pts {} discont {}",
                                buffer.frame_index,
                                buffer.capture_time.display(),
                                buffer.discont
                            );
                            std::thread::sleep(Duration::from_millis(consumer_delay_ms));
                        }
                        Err(CaptureError::Flushing) => break,
                        Err(CaptureError::Timeout(timeout)) => {
                            log::warn!("No frame within {:?}", timeout);
                        }
                        Err(e) => {
                            log::error!("Streaming error: {}", e);
                            break;
                        }
                    }
                }
                delivered
            })?
    };

    device.start()?;
    std::thread::sleep(Duration::from_secs(seconds));
    device.unregister();
    element.stop();

    let delivered = streaming
        .join()
        .map_err(|_| anyhow::anyhow!("Streaming thread panicked"))?;
    let stats = element.stats();

    println!("\n=== {} ({}) ===", config.device_name, config.mode.display_name());
    println!("  Frames received:  {}", stats.frames_received);
    println!("  Frames delivered: {}", delivered);
    println!("  Frames dropped:   {}", stats.dropped_frames);

    Ok(())
}
