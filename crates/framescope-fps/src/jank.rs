//! Frame rate and jank from latency timestamps.
//!
//! Two heuristics coexist. The simple one flags any inter-frame gap above a
//! fixed threshold. The weighted one, used once a batch has at least five
//! frames, compares each gap with the pacing of the three gaps before it, so
//! a deliberate slowdown (an easing animation, say) is not reported as jank.

use framescope_types::telemetry::FramePair;

use crate::sample::LatencySample;

/// Batches shorter than this use the simple threshold only.
pub const WEIGHTED_MIN_FRAMES: usize = 5;

/// Round a rate to the nearest whole number, never negative.
pub(crate) fn whole_rate(count: f64, seconds: f64) -> u32 {
    if seconds <= 0.0 || count <= 0.0 {
        return 0;
    }
    let rate = (count / seconds).round();
    if rate >= u32::MAX as f64 {
        u32::MAX
    } else {
        rate as u32
    }
}

/// Count gaps between consecutive timestamps longer than `threshold_secs`.
pub fn simple_jank(completed: &[f64], threshold_secs: f64) -> u32 {
    completed
        .windows(2)
        .filter(|pair| pair[1] - pair[0] > threshold_secs)
        .count() as u32
}

/// Pacing-relative jank count.
///
/// The first four frames use the fixed threshold. From index 4 on, a frame
/// is janky when its gap exceeds two thirds of the sum of the previous three
/// gaps (twice their mean) and also exceeds two refresh periods.
pub fn weighted_jank(completed: &[f64], refresh_period_secs: f64, threshold_secs: f64) -> u32 {
    let floor = 2.0 * refresh_period_secs;
    let mut jank = 0;
    for index in 1..completed.len() {
        let gap = completed[index] - completed[index - 1];
        let janky = if index < 4 {
            gap > threshold_secs
        } else {
            let mean = (completed[index - 1] - completed[index - 4]) / 3.0;
            let expected = mean * 2.0;
            gap > expected && gap > floor
        };
        if janky {
            jank += 1;
        }
    }
    jank
}

/// Frame rate and jank for one latency batch.
pub fn latency_pair(sample: &LatencySample, threshold_secs: f64) -> FramePair {
    let frames = &sample.timestamps;
    let (first, last) = match (frames.first(), frames.last()) {
        (Some(first), Some(last)) if frames.len() > 1 => (first, last),
        (Some(_), _) => return FramePair::new(1, 0),
        _ => return FramePair::default(),
    };

    let span = last.vsync - first.vsync;
    if span <= 0.0 {
        return FramePair::new(1, 0);
    }
    let fps = whole_rate((frames.len() - 1) as f64, span);

    let completed: Vec<f64> = frames.iter().map(|frame| frame.completed).collect();
    let jank = if frames.len() < WEIGHTED_MIN_FRAMES {
        simple_jank(&completed, threshold_secs)
    } else {
        weighted_jank(&completed, sample.refresh_period_secs, threshold_secs)
    };
    FramePair::new(fps, jank)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample::FrameTiming;

    const REFRESH: f64 = 1.0 / 60.0;
    const THRESHOLD: f64 = 0.166;

    fn batch(completed: &[f64]) -> LatencySample {
        LatencySample {
            refresh_period_secs: REFRESH,
            timestamps: completed
                .iter()
                .map(|&t| FrameTiming::new(t - 0.01, t - 0.005, t))
                .collect(),
        }
    }

    fn uniform(count: usize, spacing: f64) -> Vec<f64> {
        (0..count).map(|i| 10.0 + i as f64 * spacing).collect()
    }

    #[test]
    fn empty_and_single_frame_batches() {
        assert_eq!(latency_pair(&batch(&[]), THRESHOLD), FramePair::new(0, 0));
        assert_eq!(latency_pair(&batch(&[1.0]), THRESHOLD), FramePair::new(1, 0));
    }

    #[test]
    fn zero_span_counts_as_one_frame() {
        assert_eq!(
            latency_pair(&batch(&[2.0, 2.0, 2.0]), THRESHOLD),
            FramePair::new(1, 0)
        );
    }

    #[test]
    fn short_batch_uses_fixed_threshold() {
        let pair = latency_pair(&batch(&[0.0, 0.1, 0.4, 0.5]), THRESHOLD);
        assert_eq!(pair.fps, 6);
        assert_eq!(pair.jank, 1);
    }

    #[test]
    fn uniform_pacing_has_no_jank() {
        for count in [5, 6, 30, 120] {
            let pair = latency_pair(&batch(&uniform(count, REFRESH)), THRESHOLD);
            assert_eq!(pair.jank, 0, "{count} frames");
            assert_eq!(pair.fps, 60);
        }
        let slow = uniform(40, 0.1);
        assert_eq!(weighted_jank(&slow, REFRESH, THRESHOLD), 0);
    }

    #[test]
    fn single_long_gap_is_jank() {
        let mut completed = uniform(8, REFRESH);
        for t in completed.iter_mut().skip(6) {
            *t += 0.1;
        }
        let pair = latency_pair(&batch(&completed), THRESHOLD);
        assert_eq!(pair.jank, 1);
    }

    #[test]
    fn leading_frames_of_long_batch_use_fixed_threshold() {
        // Index 2 carries a 200ms gap; pacing rules only start at index 4.
        let completed = [0.0, 0.016, 0.216, 0.232, 0.248, 0.264];
        assert_eq!(weighted_jank(&completed, REFRESH, THRESHOLD), 1);
        assert_eq!(latency_pair(&batch(&completed), THRESHOLD).jank, 1);

        // 150ms at index 2 stays under the fixed threshold.
        let completed = [0.0, 0.016, 0.166, 0.182, 0.198, 0.214];
        assert_eq!(weighted_jank(&completed, REFRESH, THRESHOLD), 0);
    }

    #[test]
    fn long_gap_below_two_refresh_periods_is_not_jank() {
        // Gaps of 5ms then one of 30ms: relative to pacing it is slow, but
        // still under two refresh periods.
        let completed = [0.0, 0.005, 0.010, 0.015, 0.020, 0.050];
        assert_eq!(weighted_jank(&completed, REFRESH, THRESHOLD), 0);
        assert_eq!(weighted_jank(&completed, 0.01, THRESHOLD), 1);
    }

    #[test]
    fn simple_jank_counts_every_long_gap() {
        let completed = [0.0, 0.2, 0.25, 0.5, 0.51];
        assert_eq!(simple_jank(&completed, THRESHOLD), 2);
        assert_eq!(simple_jank(&[], THRESHOLD), 0);
    }

    #[test]
    fn whole_rate_rounds_and_clamps() {
        assert_eq!(whole_rate(59.6, 1.0), 60);
        assert_eq!(whole_rate(10.0, 0.0), 0);
        assert_eq!(whole_rate(-3.0, 1.0), 0);
    }
}
