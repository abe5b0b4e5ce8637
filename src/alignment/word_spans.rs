use crate::types::{TokenSequence, WordSpan};

/// Word index for every label state; blanks and separators map to `None`.
fn word_of_state(token_sequence: &TokenSequence) -> Vec<Option<usize>> {
    let mut word = 0usize;
    let mut seen_char = false;
    token_sequence
        .chars
        .iter()
        .map(|c| match c {
            Some('|') => {
                if seen_char {
                    word += 1;
                    seen_char = false;
                }
                None
            }
            Some(_) => {
                seen_char = true;
                Some(word)
            }
            None => None,
        })
        .collect()
}

/// Groups a Viterbi path into one span per normalized word. A word runs from
/// the first frame spent on any of its characters through the last one.
pub fn group_path_into_words(
    path: &[(usize, usize)],
    token_sequence: &TokenSequence,
    stride_secs: f64,
) -> Vec<WordSpan> {
    let state_words = word_of_state(token_sequence);
    let n_words = token_sequence.normalized_words.len();
    let mut bounds: Vec<Option<(usize, usize)>> = vec![None; n_words];

    for &(state, frame) in path {
        let Some(Some(word)) = state_words.get(state) else {
            continue;
        };
        if let Some(slot) = bounds.get_mut(*word) {
            *slot = Some(match *slot {
                Some((first, _)) => (first, frame),
                None => (frame, frame),
            });
        }
    }

    token_sequence
        .normalized_words
        .iter()
        .zip(bounds)
        .filter_map(|(word, bound)| {
            bound.map(|(first, last)| WordSpan {
                word: word.clone(),
                start: first as f64 * stride_secs,
                end: (last + 1) as f64 * stride_secs,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seq_ab_c() -> TokenSequence {
        // blank a blank b blank | blank c blank
        TokenSequence {
            tokens: vec![0, 1, 0, 2, 0, 9, 0, 3, 0],
            chars: vec![
                None,
                Some('a'),
                None,
                Some('b'),
                None,
                Some('|'),
                None,
                Some('c'),
                None,
            ],
            normalized_words: vec!["ab".to_string(), "c".to_string()],
        }
    }

    #[test]
    fn spans_cover_each_word() {
        let path = vec![
            (0, 0),
            (1, 1),
            (1, 2),
            (3, 3),
            (4, 4),
            (5, 5),
            (6, 6),
            (7, 7),
            (7, 8),
            (8, 9),
        ];
        let words = group_path_into_words(&path, &seq_ab_c(), 0.02);
        assert_eq!(words.len(), 2);
        assert_eq!(words[0].word, "ab");
        assert!((words[0].start - 0.02).abs() < 1e-9);
        assert!((words[0].end - 0.08).abs() < 1e-9);
        assert_eq!(words[1].word, "c");
        assert!((words[1].start - 0.14).abs() < 1e-9);
        assert!((words[1].end - 0.18).abs() < 1e-9);
    }

    #[test]
    fn unvisited_words_are_omitted() {
        let path = vec![(0, 0), (1, 1), (2, 2)];
        let words = group_path_into_words(&path, &seq_ab_c(), 0.02);
        assert_eq!(words.len(), 1);
        assert_eq!(words[0].word, "ab");
    }
}
