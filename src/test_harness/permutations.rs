use crate::capture::{DeviceCommand, ModeId, TimecodeFormat};
use crate::config::CaptureConfig;

use super::runner::{Expected, ScriptStep, TestCase};

const RUN_MS: u64 = 1000;

fn config(mode: ModeId) -> CaptureConfig {
    CaptureConfig {
        device_name: format!("sim-{}", mode.display_name().to_lowercase().replace(' ', "-")),
        mode,
        wait_timeout_ms: 200,
        ..CaptureConfig::default()
    }
}

fn frame_ms(mode: ModeId) -> u64 {
    mode.display_mode().frame_duration().mseconds()
}

/// Build the full set of test cases
pub fn build_test_matrix() -> Vec<TestCase> {
    let mut cases = Vec::new();

    // Fast and slow streaming threads for a few representative modes
    for mode in [ModeId::Pal, ModeId::Hd720p50, ModeId::Hd1080p30] {
        cases.push(TestCase {
            name: format!("{} fast consumer", mode.display_name()),
            config: config(mode),
            consumer_delay_ms: 0,
            run_ms: RUN_MS,
            with_clock: true,
            script: Vec::new(),
            expected: Expected {
                min_drop_ratio: 0.0,
                max_drop_ratio: 0.5,
                timestamped: true,
            },
        });

        cases.push(TestCase {
            name: format!("{} slow consumer", mode.display_name()),
            config: config(mode),
            consumer_delay_ms: frame_ms(mode) * 3,
            run_ms: RUN_MS,
            with_clock: true,
            script: Vec::new(),
            expected: Expected {
                min_drop_ratio: 0.3,
                max_drop_ratio: 1.0,
                timestamped: true,
            },
        });
    }

    cases.push(TestCase {
        name: "Signal loss and recovery".into(),
        config: config(ModeId::Hd1080p25),
        consumer_delay_ms: 0,
        run_ms: RUN_MS,
        with_clock: true,
        script: vec![
            ScriptStep {
                at_ms: 300,
                command: DeviceCommand::SetSignal(false),
            },
            ScriptStep {
                at_ms: 600,
                command: DeviceCommand::SetSignal(true),
            },
        ],
        expected: Expected {
            min_drop_ratio: 0.0,
            max_drop_ratio: 0.5,
            timestamped: true,
        },
    });

    cases.push(TestCase {
        name: "Format change mid-stream".into(),
        config: config(ModeId::Hd1080p30),
        consumer_delay_ms: 0,
        run_ms: RUN_MS,
        with_clock: true,
        script: vec![ScriptStep {
            at_ms: 400,
            command: DeviceCommand::ChangeFormat(ModeId::Hd720p50),
        }],
        expected: Expected {
            min_drop_ratio: 0.0,
            max_drop_ratio: 0.5,
            timestamped: true,
        },
    });

    cases.push(TestCase {
        name: "No pipeline clock".into(),
        config: config(ModeId::Pal),
        consumer_delay_ms: 0,
        run_ms: RUN_MS,
        with_clock: false,
        script: Vec::new(),
        expected: Expected {
            min_drop_ratio: 0.0,
            max_drop_ratio: 0.5,
            timestamped: false,
        },
    });

    cases.push(TestCase {
        name: "Audio lost mid-stream".into(),
        config: CaptureConfig {
            timecode_format: TimecodeFormat::Rp188,
            ..config(ModeId::Hd720p50)
        },
        consumer_delay_ms: frame_ms(ModeId::Hd720p50) * 2,
        run_ms: RUN_MS,
        with_clock: true,
        script: vec![ScriptStep {
            at_ms: 500,
            command: DeviceCommand::SetAudio(false),
        }],
        expected: Expected {
            min_drop_ratio: 0.2,
            max_drop_ratio: 1.0,
            timestamped: true,
        },
    });

    cases
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matrix_names_are_unique() {
        let cases = build_test_matrix();
        let mut names: Vec<_> = cases.iter().map(|c| c.name.as_str()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), cases.len());
    }

    #[test]
    fn slow_consumers_lag_the_input() {
        for case in build_test_matrix() {
            if case.name.ends_with("slow consumer") {
                let frame = frame_ms(case.config.mode);
                assert!(case.consumer_delay_ms > frame, "{}", case.name);
            }
        }
    }
}
