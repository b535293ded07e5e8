use std::sync::Arc;
use std::time::{Duration, Instant};

use gstreamer as gst;

use crate::capture::{CaptureElement, CaptureError, DeviceCommand, ManualClock, SimulatedDevice};
use crate::config::CaptureConfig;

use super::validators::{self, StreamingLog};

// ── Test case types ──────────────────────────────────────────────────

/// A device command fired at a fixed offset into the run
#[derive(Debug, Clone)]
pub struct ScriptStep {
    pub at_ms: u64,
    pub command: DeviceCommand,
}

/// What we expect from a run
#[derive(Debug, Clone)]
pub struct Expected {
    pub min_drop_ratio: f64,
    pub max_drop_ratio: f64,
    /// Buffers should carry a pts (a clock is attached)
    pub timestamped: bool,
}

#[derive(Debug, Clone)]
pub struct TestCase {
    pub name: String,
    pub config: CaptureConfig,
    /// Simulated processing time per buffer on the streaming thread
    pub consumer_delay_ms: u64,
    pub run_ms: u64,
    /// Attach a pipeline clock before streaming
    pub with_clock: bool,
    pub script: Vec<ScriptStep>,
    pub expected: Expected,
}

/// Result of a single test run.
pub struct TestResult {
    pub name: String,
    pub passed: bool,
    pub duration_ms: u64,
    pub errors: Vec<String>,
}

// ── Test execution ───────────────────────────────────────────────────

pub fn run_test(case: &TestCase, keep_files: bool) -> TestResult {
    let start = Instant::now();
    let mut errors: Vec<String> = Vec::new();

    // 1. Round-trip the config through disk like a real deployment
    let config = match stage_config(&case.config, keep_files) {
        Ok(config) => config,
        Err(e) => return failed(case, start, format!("Failed to stage config: {}", e)),
    };

    // 2. Element, clock, delegate, device
    let element = CaptureElement::new(config.clone());
    if let Err(e) = element.start() {
        return failed(case, start, format!("Failed to start element: {}", e));
    }
    let clock = Arc::new(ManualClock::new(gst::ClockTime::from_seconds(100)));
    if case.with_clock {
        element.set_clock(clock.clone(), gst::ClockTime::from_seconds(100));
    }

    let delegate = element.create_delegate();
    let mut device = SimulatedDevice::new(config.device_name.clone(), config.mode);
    if let Err(e) = device.set_callback(&delegate) {
        return failed(case, start, format!("Failed to register callback: {}", e));
    }
    delegate.release();

    // 3. Streaming thread
    let streaming = {
        let element = element.clone();
        let delay = Duration::from_millis(case.consumer_delay_ms);
        std::thread::spawn(move || {
            let mut log = StreamingLog::default();
            loop {
                match element.create() {
                    Ok(buffer) => {
                        log.indices.push(buffer.frame_index);
                        if buffer.discont {
                            log.discont_buffers += 1;
                        }
                        if buffer.video.pts().is_some() {
                            log.timestamped_buffers += 1;
                        }
                        if !delay.is_zero() {
                            std::thread::sleep(delay);
                        }
                    }
                    Err(CaptureError::Timeout(_)) => continue,
                    Err(_) => break,
                }
            }
            log
        })
    };

    // 4. Run the script while the device streams
    if let Err(e) = device.start() {
        element.stop();
        let _ = streaming.join();
        return failed(case, start, format!("Failed to start device: {}", e));
    }

    let frame_step = element.mode().frame_duration();
    let run_start = Instant::now();
    let mut script = case.script.iter().peekable();
    while run_start.elapsed() < Duration::from_millis(case.run_ms) {
        while let Some(step) = script.next_if(|s| run_start.elapsed().as_millis() as u64 >= s.at_ms) {
            if let Err(e) = device.send(step.command) {
                errors.push(format!("Script step {:?} failed: {}", step.command, e));
            }
        }
        clock.advance(frame_step);
        std::thread::sleep(Duration::from_millis(5));
    }

    // 5. Tear down: driver first, then the element
    let delivered_by_device = device.frames_delivered();
    device.unregister();
    let flushed = element.stop() as u64;

    let log = match streaming.join() {
        Ok(log) => log,
        Err(_) => return failed(case, start, "Streaming thread panicked".into()),
    };

    // 6. Validate
    let stats = element.stats();
    if stats.frames_received > delivered_by_device {
        errors.push(format!(
            "Element received {} frames but the device only delivered {}",
            stats.frames_received, delivered_by_device
        ));
    }
    errors.extend(validators::validate_counters(&stats, &log, flushed));
    errors.extend(validators::validate_drop_ratio(
        &stats,
        case.expected.min_drop_ratio,
        case.expected.max_drop_ratio,
    ));

    let expect_pts = if case.expected.timestamped {
        log.indices.len() as u64
    } else {
        0
    };
    if log.timestamped_buffers != expect_pts {
        errors.push(format!(
            "{} of {} buffers timestamped, expected {}",
            log.timestamped_buffers,
            log.indices.len(),
            expect_pts
        ));
    }

    log::info!(
        "{}: received {}, delivered {}, dropped {}",
        case.name,
        stats.frames_received,
        log.indices.len(),
        stats.dropped_frames
    );

    TestResult {
        name: case.name.clone(),
        passed: errors.is_empty(),
        duration_ms: start.elapsed().as_millis() as u64,
        errors,
    }
}

/// Write the case config to a temp dir and load it back
fn stage_config(config: &CaptureConfig, keep_files: bool) -> anyhow::Result<CaptureConfig> {
    let dir = tempfile::Builder::new().prefix("decklink-capture-").tempdir()?;
    let path = dir.path().join("config.toml");
    config.save(&path)?;
    let loaded = CaptureConfig::load(&path)?;

    if keep_files {
        let kept = dir.into_path();
        println!("         config kept at {}", kept.display());
    }
    Ok(loaded)
}

fn failed(case: &TestCase, start: Instant, error: String) -> TestResult {
    TestResult {
        name: case.name.clone(),
        passed: false,
        duration_ms: start.elapsed().as_millis() as u64,
        errors: vec![error],
    }
}

pub fn print_summary(results: &[TestResult]) {
    let passed = results.iter().filter(|r| r.passed).count();
    let failed = results.len() - passed;

    println!("\n  === Test Results ===\n");

    for (i, result) in results.iter().enumerate() {
        let status = if result.passed { "PASS" } else { "FAIL" };
        let duration = format!("{:.1}s", result.duration_ms as f64 / 1000.0);
        println!(
            "  [{}/{}] {} {} {} ({})",
            i + 1,
            results.len(),
            result.name,
            ".".repeat(50_usize.saturating_sub(result.name.len())),
            status,
            duration
        );
        for err in &result.errors {
            println!("         -> {}", err);
        }
    }

    println!();
    if failed == 0 {
        println!("  Results: {} passed, 0 failed", passed);
    } else {
        println!("  Results: {} passed, {} FAILED", passed, failed);
    }
    println!();
}
