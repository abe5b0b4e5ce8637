use std::collections::HashMap;

use crate::types::{CharSegment, CtcPosteriors};

/// Argmax token id for every frame.
pub fn argmax_ids(log_probs: &[Vec<f32>]) -> Vec<usize> {
    log_probs
        .iter()
        .map(|row| {
            row.iter()
                .enumerate()
                .fold((0usize, f32::NEG_INFINITY), |best, (id, &lp)| {
                    if lp > best.1 {
                        (id, lp)
                    } else {
                        best
                    }
                })
                .0
        })
        .collect()
}

/// Collapses runs of the frame-wise argmax into character segments. Blank,
/// word-separator and unknown ids are dropped; their frames still advance time.
pub fn greedy_char_segments(posteriors: &CtcPosteriors) -> Vec<CharSegment> {
    let id_to_char = posteriors.id_to_char();
    let ids = argmax_ids(&posteriors.log_probs);
    let stride = posteriors.stride_secs;

    let mut segments = Vec::new();
    let mut run_start = 0usize;
    for frame in 1..=ids.len() {
        if frame < ids.len() && ids[frame] == ids[run_start] {
            continue;
        }
        let id = ids[run_start];
        if id != posteriors.blank_id && id != posteriors.word_sep_id {
            if let Some(&ch) = id_to_char.get(&id) {
                segments.push(CharSegment {
                    ch,
                    start: run_start as f64 * stride,
                    end: frame as f64 * stride,
                });
            }
        }
        run_start = frame;
    }
    segments
}

/// Standard CTC greedy decode: merge repeats, drop blanks, separators become spaces.
pub fn greedy_transcript(posteriors: &CtcPosteriors) -> String {
    let id_to_char: HashMap<usize, char> = posteriors.id_to_char();
    let ids = argmax_ids(&posteriors.log_probs);

    let mut text = String::new();
    let mut prev: Option<usize> = None;
    for &id in &ids {
        if prev == Some(id) {
            continue;
        }
        prev = Some(id);
        if id == posteriors.blank_id {
            continue;
        }
        if id == posteriors.word_sep_id {
            if !text.is_empty() && !text.ends_with(' ') {
                text.push(' ');
            }
            continue;
        }
        if let Some(&ch) = id_to_char.get(&id) {
            text.push(ch);
        }
    }
    text.trim_end().to_lowercase()
}

/// First segment start to last segment end, if anything was emitted.
pub fn speech_span(segments: &[CharSegment]) -> Option<(f64, f64)> {
    match (segments.first(), segments.last()) {
        (Some(first), Some(last)) if last.end > first.start => Some((first.start, last.end)),
        _ => None,
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Posteriors where each frame puts all mass on one id. Vocab: blank=0, '|'=1, a..=2.. .
    pub(crate) fn one_hot_posteriors(frame_ids: &[usize], stride_secs: f64) -> CtcPosteriors {
        let mut vocab = HashMap::new();
        vocab.insert('|', 1);
        for (i, c) in ('a'..='z').enumerate() {
            vocab.insert(c, i + 2);
        }
        let vocab_len = 28;
        let log_probs = frame_ids
            .iter()
            .map(|&id| {
                (0..vocab_len)
                    .map(|v| if v == id { 0.0 } else { -20.0 })
                    .collect()
            })
            .collect();
        CtcPosteriors {
            log_probs,
            stride_secs,
            vocab,
            blank_id: 0,
            word_sep_id: 1,
        }
    }

    fn id(c: char) -> usize {
        c as usize - 'a' as usize + 2
    }

    #[test]
    fn collapses_runs_and_drops_blanks() {
        let frames = [0, 0, id('h'), id('h'), 0, id('i'), 0, 0];
        let segments = greedy_char_segments(&one_hot_posteriors(&frames, 0.02));
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].ch, 'h');
        assert!((segments[0].start - 0.04).abs() < 1e-9);
        assert!((segments[0].end - 0.08).abs() < 1e-9);
        assert_eq!(segments[1].ch, 'i');
        assert_eq!(speech_span(&segments).map(|(s, _)| s), Some(segments[0].start));
    }

    #[test]
    fn repeated_letters_need_a_blank_between() {
        let frames = [id('l'), id('l'), 0, id('l')];
        let segments = greedy_char_segments(&one_hot_posteriors(&frames, 0.02));
        assert_eq!(segments.len(), 2);
    }

    #[test]
    fn transcript_uses_separator_as_space() {
        let frames = [
            0,
            id('h'),
            id('i'),
            1,
            1,
            id('y'),
            0,
            id('o'),
            id('u'),
            1,
        ];
        let text = greedy_transcript(&one_hot_posteriors(&frames, 0.02));
        assert_eq!(text, "hi you");
    }

    #[test]
    fn silence_has_no_span() {
        let segments = greedy_char_segments(&one_hot_posteriors(&[0, 0, 0], 0.02));
        assert!(segments.is_empty());
        assert_eq!(speech_span(&segments), None);
        assert_eq!(greedy_transcript(&one_hot_posteriors(&[0, 0], 0.02)), "");
    }
}
