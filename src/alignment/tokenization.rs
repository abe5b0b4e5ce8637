use std::collections::HashMap;

use crate::types::TokenSequence;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum VocabCase {
    Upper,
    Lower,
}

/// Uppercase-only character vocabularies (the common English CTC checkpoints)
/// need uppercased text; everything else is matched lowercase.
fn vocab_case(vocab: &HashMap<char, usize>) -> VocabCase {
    let letters = || vocab.keys().filter(|c| c.is_alphabetic());
    let any_upper = letters().any(|c| c.is_uppercase());
    let any_lower = letters().any(|c| c.is_lowercase());
    if any_upper && !any_lower {
        VocabCase::Upper
    } else {
        VocabCase::Lower
    }
}

/// Builds the blank-interleaved CTC label sequence for `text`:
/// `blank w1 blank ... | blank w2 ...`. Characters missing from the vocabulary
/// (punctuation, digits) are dropped, and words left empty are skipped.
pub fn build_token_sequence(
    text: &str,
    vocab: &HashMap<char, usize>,
    blank_id: usize,
    word_sep_id: usize,
) -> TokenSequence {
    let cased = match vocab_case(vocab) {
        VocabCase::Upper => text.to_uppercase(),
        VocabCase::Lower => text.to_lowercase(),
    };

    let mut seq = TokenSequence {
        tokens: vec![blank_id],
        chars: vec![None],
        normalized_words: Vec::new(),
    };

    for raw_word in cased.split_whitespace() {
        let kept: Vec<(char, usize)> = raw_word
            .chars()
            .filter_map(|c| vocab.get(&c).map(|&id| (c, id)))
            .collect();
        if kept.is_empty() {
            continue;
        }

        if !seq.normalized_words.is_empty() {
            push_label(&mut seq, word_sep_id, Some('|'), blank_id);
        }
        for &(c, id) in &kept {
            push_label(&mut seq, id, Some(c), blank_id);
        }
        seq.normalized_words
            .push(kept.iter().map(|&(c, _)| c).collect());
    }

    debug_assert_eq!(
        seq.normalized_words,
        words_from_chars(&seq.chars),
        "normalized words must match emitted characters"
    );
    seq
}

fn push_label(seq: &mut TokenSequence, id: usize, ch: Option<char>, blank_id: usize) {
    seq.tokens.push(id);
    seq.chars.push(ch);
    seq.tokens.push(blank_id);
    seq.chars.push(None);
}

pub(crate) fn words_from_chars(chars: &[Option<char>]) -> Vec<String> {
    chars
        .iter()
        .flatten()
        .collect::<String>()
        .split('|')
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const BLANK: usize = 0;
    const SEP: usize = 9;

    fn vocab(chars: &[char]) -> HashMap<char, usize> {
        chars
            .iter()
            .enumerate()
            .map(|(i, &c)| (c, i + 1))
            .collect()
    }

    #[test]
    fn empty_text_is_a_single_blank() {
        let seq = build_token_sequence("", &vocab(&['a', 'b']), BLANK, SEP);
        assert_eq!(seq.tokens, vec![BLANK]);
        assert!(seq.normalized_words.is_empty());
    }

    #[test]
    fn labels_are_blank_interleaved() {
        let seq = build_token_sequence("Ab", &vocab(&['a', 'b']), BLANK, SEP);
        assert_eq!(seq.tokens, vec![BLANK, 1, BLANK, 2, BLANK]);
        assert_eq!(seq.normalized_words, ["ab"]);
    }

    #[test]
    fn uppercase_vocab_uppercases_text() {
        let seq = build_token_sequence("she sells", &vocab(&['S', 'H', 'E', 'L']), BLANK, SEP);
        assert_eq!(seq.normalized_words, ["SHE", "SELLS"]);
        assert_eq!(seq.tokens.iter().filter(|&&t| t == SEP).count(), 1);
    }

    #[test]
    fn mixed_case_vocab_matches_lowercase() {
        let seq = build_token_sequence("A B c", &vocab(&['a', 'B', 'c']), BLANK, SEP);
        assert_eq!(seq.normalized_words, ["a", "c"]);
    }

    #[test]
    fn punctuation_is_dropped() {
        let seq = build_token_sequence("cab, abc!", &vocab(&['a', 'b', 'c']), BLANK, SEP);
        assert_eq!(seq.normalized_words, ["cab", "abc"]);
        assert_eq!(words_from_chars(&seq.chars), seq.normalized_words);
    }
}
