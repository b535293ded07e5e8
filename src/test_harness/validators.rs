use crate::capture::HandoffStats;

// ── Delivery validation ──────────────────────────────────────────────

/// What the streaming thread saw during a run
#[derive(Debug, Default)]
pub struct StreamingLog {
    /// Frame index of every buffer created, in order
    pub indices: Vec<u64>,
    /// Buffers flagged DISCONT
    pub discont_buffers: u64,
    /// Buffers that carried a timestamp
    pub timestamped_buffers: u64,
}

/// Check the counter invariants that hold for every run.
///
/// `flushed` is how many frames were still pending when the element stopped
/// (0 or 1); those are neither delivered nor dropped.
pub fn validate_counters(stats: &HandoffStats, log: &StreamingLog, flushed: u64) -> Vec<String> {
    let mut errors = Vec::new();

    if !log.indices.windows(2).all(|w| w[0] < w[1]) {
        errors.push("Frame indices are not strictly increasing".into());
    }

    if let Some(&last) = log.indices.last() {
        if last >= stats.frames_received {
            errors.push(format!(
                "Delivered index {} but only {} frames were received",
                last, stats.frames_received
            ));
        }
    }

    let accounted = log.indices.len() as u64 + stats.dropped_frames + flushed;
    if accounted != stats.frames_received {
        errors.push(format!(
            "delivered ({}) + dropped ({}) + flushed ({}) != received ({})",
            log.indices.len(),
            stats.dropped_frames,
            flushed,
            stats.frames_received
        ));
    }

    // Each gap in the indices is a batch of drops, announced by DISCONT
    let gaps = log
        .indices
        .windows(2)
        .filter(|w| w[1] > w[0] + 1)
        .count() as u64
        + log.indices.first().map_or(0, |&first| (first > 0) as u64);
    if gaps != log.discont_buffers {
        errors.push(format!(
            "{} index gaps but {} DISCONT buffers",
            gaps, log.discont_buffers
        ));
    }

    errors
}

/// Check the drop ratio lies in the expected band
pub fn validate_drop_ratio(stats: &HandoffStats, min: f64, max: f64) -> Vec<String> {
    if stats.frames_received == 0 {
        return vec!["No frames received".into()];
    }

    let ratio = stats.dropped_frames as f64 / stats.frames_received as f64;
    if ratio < min || ratio > max {
        vec![format!(
            "Drop ratio {:.2} outside [{:.2}, {:.2}] ({} of {})",
            ratio, min, max, stats.dropped_frames, stats.frames_received
        )]
    } else {
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(received: u64, dropped: u64) -> HandoffStats {
        HandoffStats {
            frames_received: received,
            dropped_frames: dropped,
            pending: false,
        }
    }

    #[test]
    fn consistent_run_passes() {
        let log = StreamingLog {
            indices: vec![0, 1, 3, 4, 7],
            discont_buffers: 2,
            timestamped_buffers: 5,
        };
        assert!(validate_counters(&stats(9, 3), &log, 1).is_empty());
    }

    #[test]
    fn unaccounted_frames_are_reported() {
        let log = StreamingLog {
            indices: vec![0, 1, 2],
            ..Default::default()
        };
        let errors = validate_counters(&stats(5, 0), &log, 0);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("!= received (5)"));
    }

    #[test]
    fn drop_ratio_band() {
        assert!(validate_drop_ratio(&stats(10, 5), 0.4, 0.6).is_empty());
        assert_eq!(validate_drop_ratio(&stats(10, 9), 0.0, 0.5).len(), 1);
        assert_eq!(validate_drop_ratio(&stats(0, 0), 0.0, 1.0).len(), 1);
    }
}
