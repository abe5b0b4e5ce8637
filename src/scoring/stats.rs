use serde::Serialize;

use crate::scoring::PhonemeScore;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PhonemeStats {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub median: f64,
    /// Population standard deviation.
    pub std: f64,
    pub weak_count: usize,
    pub total_count: usize,
    /// Rounded to one decimal.
    pub weak_percentage: f64,
}

impl PhonemeStats {
    pub fn from_scores(scores: &[PhonemeScore]) -> Option<Self> {
        if scores.is_empty() {
            return None;
        }
        let mut values: Vec<f64> = scores.iter().map(|s| s.score as f64).collect();
        values.sort_by(|a, b| a.total_cmp(b));

        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
        let mid = values.len() / 2;
        let median = if values.len() % 2 == 0 {
            (values[mid - 1] + values[mid]) / 2.0
        } else {
            values[mid]
        };
        let weak_count = scores.iter().filter(|s| s.is_weak).count();

        Some(Self {
            min: round_to(values[0], 3),
            max: round_to(values[values.len() - 1], 3),
            mean: round_to(mean, 3),
            median: round_to(median, 3),
            std: round_to(variance.sqrt(), 3),
            weak_count,
            total_count: scores.len(),
            weak_percentage: round_to(weak_count as f64 / n * 100.0, 1),
        })
    }
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;

    fn score(value: f32, weak: bool) -> PhonemeScore {
        PhonemeScore {
            phoneme: "AH".to_string(),
            score: value,
            is_weak: weak,
            start: None,
            end: None,
            word: None,
            position: None,
        }
    }

    #[test]
    fn summary_statistics() {
        let scores = vec![
            score(0.5, true),
            score(0.9, false),
            score(0.7, false),
            score(0.8, false),
        ];
        let stats = PhonemeStats::from_scores(&scores).expect("stats");
        assert_eq!(stats.min, 0.5);
        assert_eq!(stats.max, 0.9);
        assert_eq!(stats.mean, 0.725);
        assert_eq!(stats.median, 0.75);
        assert_eq!(stats.weak_count, 1);
        assert_eq!(stats.total_count, 4);
        assert_eq!(stats.weak_percentage, 25.0);
        assert!(stats.std > 0.0);
    }

    #[test]
    fn empty_has_no_stats() {
        assert_eq!(PhonemeStats::from_scores(&[]), None);
    }
}
