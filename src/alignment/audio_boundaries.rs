//! Energy-based speech onset/offset detection, used when the acoustic model
//! emits no characters at all.

const BASELINE_FRAMES: usize = 10;
const EDGE_WINDOW_FRAMES: usize = 25;

#[derive(Debug, Clone, Copy)]
struct Threshold {
    noise_multiplier: f32,
    floor: f32,
    min_run: usize,
}

const STRICT: Threshold = Threshold {
    noise_multiplier: 4.0,
    floor: 0.01,
    min_run: 3,
};

const LENIENT: Threshold = Threshold {
    noise_multiplier: 3.0,
    floor: 0.0075,
    min_run: 2,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Edge {
    Onset,
    Offset,
}

/// Speech span in seconds, from the first to the end of the last loud frame.
pub fn detect_speech_span(
    samples: &[f32],
    sample_rate_hz: u32,
    frame_ms: f64,
) -> Option<(f64, f64)> {
    let rms = frame_rms(samples, sample_rate_hz, frame_ms)?;
    let onset = detect_edge(&rms, Edge::Onset)?;
    let offset = detect_edge(&rms, Edge::Offset)?;
    if offset < onset {
        return None;
    }
    let frame_secs = frame_ms / 1000.0;
    let duration = samples.len() as f64 / sample_rate_hz as f64;
    Some((
        onset as f64 * frame_secs,
        ((offset + 1) as f64 * frame_secs).min(duration),
    ))
}

/// Strict detection is preferred while it lands near its edge of the clip;
/// otherwise a lenient run that sits closer to the edge wins.
fn detect_edge(rms: &[f32], edge: Edge) -> Option<usize> {
    let noise = noise_floor(rms, edge);
    let strict = find_run(rms, STRICT, noise, edge);
    let near_edge = |frame: usize| match edge {
        Edge::Onset => frame <= EDGE_WINDOW_FRAMES,
        Edge::Offset => frame + 1 + EDGE_WINDOW_FRAMES >= rms.len(),
    };
    if let Some(frame) = strict.filter(|&f| near_edge(f)) {
        return Some(frame);
    }

    let lenient = find_run(rms, LENIENT, noise, edge);
    match (strict, lenient) {
        (None, fallback) => fallback,
        (Some(strict), Some(fallback)) => {
            let closer = match edge {
                Edge::Onset => fallback < strict,
                Edge::Offset => fallback > strict,
            };
            Some(if closer { fallback } else { strict })
        }
        (Some(strict), None) => Some(strict),
    }
}

fn noise_floor(rms: &[f32], edge: Edge) -> f32 {
    let n = rms.len().min(BASELINE_FRAMES);
    if n == 0 {
        return 0.0;
    }
    let sum: f32 = match edge {
        Edge::Onset => rms.iter().take(n).sum(),
        Edge::Offset => rms.iter().rev().take(n).sum(),
    };
    sum / n as f32
}

/// Frame index of the run edge closest to `edge`: the start of the first run
/// for onsets, the end of the last run for offsets.
fn find_run(rms: &[f32], threshold: Threshold, noise: f32, edge: Edge) -> Option<usize> {
    let level = (noise * threshold.noise_multiplier).max(threshold.floor);
    let mut run_anchor = 0usize;
    let mut run_len = 0usize;

    let mut scan = |frame: usize, value: f32| -> Option<usize> {
        if value < level {
            run_len = 0;
            return None;
        }
        if run_len == 0 {
            run_anchor = frame;
        }
        run_len += 1;
        (run_len >= threshold.min_run).then_some(run_anchor)
    };

    match edge {
        Edge::Onset => rms.iter().enumerate().find_map(|(i, &v)| scan(i, v)),
        Edge::Offset => rms.iter().enumerate().rev().find_map(|(i, &v)| scan(i, v)),
    }
}

fn frame_rms(samples: &[f32], sample_rate_hz: u32, frame_ms: f64) -> Option<Vec<f32>> {
    if samples.is_empty() || sample_rate_hz == 0 {
        return None;
    }
    let frame_len = ((sample_rate_hz as f64 * frame_ms) / 1000.0).round().max(1.0) as usize;
    Some(
        samples
            .chunks(frame_len)
            .map(|chunk| {
                let mean_sq = chunk.iter().map(|&x| (x as f64).powi(2)).sum::<f64>()
                    / chunk.len() as f64;
                mean_sq.sqrt() as f32
            })
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tone_between(total: usize, start: usize, end: usize) -> Vec<f32> {
        (0..total)
            .map(|i| {
                if i >= start && i < end {
                    0.5 * (i as f32 * 0.3).sin()
                } else {
                    0.0005
                }
            })
            .collect()
    }

    #[test]
    fn finds_speech_in_the_middle() {
        // 16 kHz, 20 ms frames = 320 samples; speech in [0.5 s, 1.0 s)
        let samples = tone_between(24_000, 8_000, 16_000);
        let (start, end) = detect_speech_span(&samples, 16_000, 20.0).expect("span");
        assert!((start - 0.5).abs() < 0.021, "start {start}");
        assert!((end - 1.0).abs() < 0.041, "end {end}");
    }

    #[test]
    fn silence_has_no_span() {
        let samples = vec![0.0f32; 16_000];
        assert_eq!(detect_speech_span(&samples, 16_000, 20.0), None);
        assert_eq!(detect_speech_span(&[], 16_000, 20.0), None);
    }
}
