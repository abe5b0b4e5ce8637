/// Fewest frames a blank-interleaved label sequence can occupy: one per
/// non-blank label, plus one blank between identical neighbours.
pub fn min_frames_for(tokens: &[usize], blank_id: usize) -> usize {
    let labels: Vec<usize> = tokens.iter().copied().filter(|&t| t != blank_id).collect();
    let repeats = labels.windows(2).filter(|w| w[0] == w[1]).count();
    labels.len() + repeats
}

/// CTC Viterbi forced alignment over a blank-interleaved label sequence.
///
/// Returns one `(state, frame)` pair per frame, where `state` indexes `tokens`.
/// The path starts in state 0 or 1 and ends in one of the last two states.
pub fn ctc_viterbi_path(log_probs: &[Vec<f32>], tokens: &[usize]) -> Vec<(usize, usize)> {
    let n_frames = log_probs.len();
    let n_states = tokens.len();
    if n_frames == 0 || n_states == 0 {
        return Vec::new();
    }

    let mut prev = vec![f32::NEG_INFINITY; n_states];
    let mut curr = vec![f32::NEG_INFINITY; n_states];
    // 0 = stay, 1 = advance one state, 2 = skip a blank
    let mut backptr = vec![0u8; n_frames * n_states];

    prev[0] = log_probs[0][tokens[0]];
    if n_states > 1 {
        prev[1] = log_probs[0][tokens[1]];
    }
    let mut reachable = (0usize, n_states.min(2) - 1);
    let last_required = n_states.saturating_sub(2);

    for (t, row) in log_probs.iter().enumerate().skip(1) {
        let frames_left = n_frames - 1 - t;
        // States that can still reach the end, and states reachable from the start.
        let lo = last_required.saturating_sub(2 * frames_left);
        let hi = (2 * t + 1).min(n_states - 1);

        curr.fill(f32::NEG_INFINITY);
        for s in lo..=hi {
            let (best, step) = best_predecessor(&prev, s, reachable, tokens);
            curr[s] = best + row[tokens[s]];
            backptr[t * n_states + s] = step;
        }
        std::mem::swap(&mut prev, &mut curr);
        reachable = (lo, hi);
    }

    let mut state = n_states - 1;
    if n_states >= 2 && prev[n_states - 2] > prev[n_states - 1] {
        state = n_states - 2;
    }

    let mut path = Vec::with_capacity(n_frames);
    path.push((state, n_frames - 1));
    for t in (1..n_frames).rev() {
        state -= backptr[t * n_states + state] as usize;
        path.push((state, t - 1));
    }
    path.reverse();
    path
}

#[inline]
fn best_predecessor(
    prev: &[f32],
    s: usize,
    (lo, hi): (usize, usize),
    tokens: &[usize],
) -> (f32, u8) {
    let in_range = |p: usize| p >= lo && p <= hi;
    let mut best = if in_range(s) { prev[s] } else { f32::NEG_INFINITY };
    let mut step = 0u8;

    if s >= 1 && in_range(s - 1) && prev[s - 1] > best {
        best = prev[s - 1];
        step = 1;
    }
    if s >= 2 && tokens[s] != tokens[s - 2] && in_range(s - 2) && prev[s - 2] > best {
        best = prev[s - 2];
        step = 2;
    }
    (best, step)
}
