use crate::types::{PhonemePosition, PhonemeTimestamp, WordSpan};

/// `n` equal consecutive windows covering `[start, end]`.
pub fn uniform_windows(n: usize, start: f64, end: f64) -> Vec<(f64, f64)> {
    if n == 0 {
        return Vec::new();
    }
    let step = (end - start).max(0.0) / n as f64;
    (0..n)
        .map(|i| (start + i as f64 * step, start + (i + 1) as f64 * step))
        .collect()
}

/// Word index for each phoneme.
///
/// Consecutive runs of identical labels form one word each; when the run count
/// disagrees with `word_lengths`, phonemes are spread over words in proportion
/// to their character length instead.
pub fn assign_phonemes_to_words(
    n_phonemes: usize,
    labels: Option<&[String]>,
    word_lengths: &[usize],
) -> Vec<usize> {
    if let Some(labels) = labels.filter(|l| l.len() == n_phonemes) {
        let groups = label_runs(labels);
        let n_runs = groups.last().map_or(0, |&g| g + 1);
        if n_runs == word_lengths.len() || word_lengths.is_empty() {
            return groups;
        }
        tracing::debug!(
            label_words = n_runs,
            aligned_words = word_lengths.len(),
            "word labels disagree with aligned words, splitting by length"
        );
    }
    proportional_groups(n_phonemes, word_lengths)
}

fn label_runs(labels: &[String]) -> Vec<usize> {
    let mut group = 0usize;
    labels
        .iter()
        .enumerate()
        .map(|(i, label)| {
            if i > 0 && labels[i - 1] != *label {
                group += 1;
            }
            group
        })
        .collect()
}

fn proportional_groups(n_phonemes: usize, word_lengths: &[usize]) -> Vec<usize> {
    let total: usize = word_lengths.iter().sum();
    if total == 0 {
        return vec![0; n_phonemes];
    }
    let mut cumulative = Vec::with_capacity(word_lengths.len());
    let mut acc = 0usize;
    for &len in word_lengths {
        acc += len;
        cumulative.push(acc as f64 / total as f64);
    }
    (0..n_phonemes)
        .map(|j| {
            let center = (j as f64 + 0.5) / n_phonemes as f64;
            cumulative
                .iter()
                .position(|&c| center < c)
                .unwrap_or(word_lengths.len() - 1)
        })
        .collect()
}

/// Splits each word's span evenly across the phonemes assigned to it.
/// Phonemes whose word has no span inherit the end of the previous window.
pub fn windows_from_word_spans(groups: &[usize], spans: &[WordSpan]) -> Vec<(f64, f64)> {
    let mut windows = Vec::with_capacity(groups.len());
    let mut i = 0;
    let mut cursor = spans.first().map_or(0.0, |s| s.start);
    while i < groups.len() {
        let word = groups[i];
        let run = groups[i..].iter().take_while(|&&g| g == word).count();
        match spans.get(word) {
            Some(span) => {
                let start = span.start.max(cursor);
                let end = span.end.max(start);
                windows.extend(uniform_windows(run, start, end));
                cursor = end;
            }
            None => windows.extend(std::iter::repeat((cursor, cursor)).take(run)),
        }
        i += run;
    }
    windows
}

/// Makes windows monotonic, non-overlapping and at least `min_width` wide,
/// staying inside `[clip_start, clip_end]` whenever the clip is long enough.
pub fn enforce_min_width(
    windows: &[(f64, f64)],
    min_width: f64,
    clip_start: f64,
    clip_end: f64,
) -> Vec<(f64, f64)> {
    let n = windows.len();
    if n == 0 {
        return Vec::new();
    }
    if (clip_end - clip_start) < n as f64 * min_width {
        return (0..n)
            .map(|i| {
                let start = clip_start + i as f64 * min_width;
                (start, start + min_width)
            })
            .collect();
    }

    let mut out: Vec<(f64, f64)> = Vec::with_capacity(n);
    let mut prev_end = clip_start;
    for &(start, end) in windows {
        let start = start.max(prev_end);
        let end = end.max(start + min_width);
        out.push((start, end));
        prev_end = end;
    }

    // Pull any overflow past the clip end back in, right to left.
    let mut next_start = clip_end;
    for window in out.iter_mut().rev() {
        if window.1 <= next_start {
            break;
        }
        window.1 = next_start;
        window.0 = window.0.min(window.1 - min_width);
        next_start = window.0;
    }
    out
}

pub fn build_timestamps(
    phonemes: &[String],
    windows: &[(f64, f64)],
    groups: &[usize],
    word_names: &[String],
) -> Vec<PhonemeTimestamp> {
    phonemes
        .iter()
        .enumerate()
        .map(|(i, phoneme)| {
            let group = groups.get(i).copied().unwrap_or(0);
            let first = groups.iter().position(|&g| g == group).unwrap_or(i);
            let len = groups.iter().filter(|&&g| g == group).count().max(1);
            let (start, end) = windows.get(i).copied().unwrap_or((0.0, 0.0));
            PhonemeTimestamp {
                phoneme: phoneme.clone(),
                start,
                end,
                word: word_names.get(group).cloned(),
                position: PhonemePosition::within_word(i - first, len),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(words: &[&str]) -> Vec<String> {
        words.iter().map(|w| w.to_string()).collect()
    }

    #[test]
    fn uniform_windows_tile_the_span() {
        let w = uniform_windows(4, 1.0, 2.0);
        assert_eq!(w.len(), 4);
        assert!((w[0].0 - 1.0).abs() < 1e-12);
        assert!((w[3].1 - 2.0).abs() < 1e-12);
        for pair in w.windows(2) {
            assert!((pair[0].1 - pair[1].0).abs() < 1e-12);
        }
    }

    #[test]
    fn groups_follow_labels() {
        let l = labels(&["the", "the", "cat", "cat", "cat", "the"]);
        assert_eq!(
            assign_phonemes_to_words(6, Some(&l), &[3, 3, 3]),
            vec![0, 0, 1, 1, 1, 2]
        );
    }

    #[test]
    fn groups_fall_back_to_character_length() {
        // "a" (1 char) and "cats" (4 chars) over 5 phonemes
        assert_eq!(assign_phonemes_to_words(5, None, &[1, 4]), vec![0, 1, 1, 1, 1]);
        let l = labels(&["x", "y"]);
        assert_eq!(assign_phonemes_to_words(2, Some(&l), &[5]), vec![0, 0]);
    }

    #[test]
    fn word_spans_are_split_per_phoneme() {
        let spans = vec![
            WordSpan {
                word: "a".into(),
                start: 0.0,
                end: 0.2,
            },
            WordSpan {
                word: "b".into(),
                start: 0.3,
                end: 0.6,
            },
        ];
        let w = windows_from_word_spans(&[0, 0, 1, 1, 1], &spans);
        assert_eq!(w.len(), 5);
        assert!((w[1].1 - 0.2).abs() < 1e-12);
        assert!((w[2].0 - 0.3).abs() < 1e-12);
        assert!((w[4].1 - 0.6).abs() < 1e-12);
    }

    #[test]
    fn min_width_keeps_monotonic_and_inside_clip() {
        let w = enforce_min_width(&[(0.0, 0.0), (0.0, 0.0), (0.5, 1.0)], 0.02, 0.0, 1.0);
        assert_eq!(w.len(), 3);
        for (start, end) in &w {
            assert!(end - start >= 0.02 - 1e-12);
            assert!(*start >= 0.0 && *end <= 1.0 + 1e-12);
        }
        for pair in w.windows(2) {
            assert!(pair[1].0 >= pair[0].1 - 1e-12);
        }
    }

    #[test]
    fn min_width_pulls_overflow_back() {
        let w = enforce_min_width(&[(0.9, 0.95), (0.99, 0.995), (1.0, 1.0)], 0.02, 0.0, 1.0);
        assert!(w[2].1 <= 1.0 + 1e-12);
        for (start, end) in &w {
            assert!(end - start >= 0.02 - 1e-9);
        }
        for pair in w.windows(2) {
            assert!(pair[1].0 >= pair[0].1 - 1e-12);
        }
    }

    #[test]
    fn positions_within_words() {
        let phonemes = labels(&["DH", "AH", "K", "AE", "T"]);
        let windows = uniform_windows(5, 0.0, 1.0);
        let ts = build_timestamps(&phonemes, &windows, &[0, 0, 1, 1, 1], &labels(&["the", "cat"]));
        assert_eq!(ts[0].position, PhonemePosition::Initial);
        assert_eq!(ts[1].position, PhonemePosition::Final);
        assert_eq!(ts[3].position, PhonemePosition::Medial);
        assert_eq!(ts[4].word.as_deref(), Some("cat"));
    }
}
