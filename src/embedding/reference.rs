use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::audio::AudioPreprocessor;
use crate::embedding::ReferenceEmbeddings;
use crate::error::AssessmentError;
use crate::pipeline::cancel::CancellationFlag;
use crate::pipeline::traits::EmbeddingModel;
use crate::types::{ExpectedSentence, ReferenceAudio};

/// Shared per-sentence reference vectors. Concurrent writers for the same
/// sentence race harmlessly: the last complete write wins.
#[derive(Debug, Default)]
pub struct ReferenceEmbeddingCache {
    entries: RwLock<HashMap<String, Arc<ReferenceEmbeddings>>>,
}

impl ReferenceEmbeddingCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, sentence_id: &str) -> Option<Arc<ReferenceEmbeddings>> {
        self.entries.read().get(sentence_id).cloned()
    }

    pub fn insert(&self, sentence_id: impl Into<String>, embeddings: ReferenceEmbeddings) {
        self.entries
            .write()
            .insert(sentence_id.into(), Arc::new(embeddings));
    }

    pub fn remove(&self, sentence_id: &str) -> Option<Arc<ReferenceEmbeddings>> {
        self.entries.write().remove(sentence_id)
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Writes every entry as one MessagePack map.
    pub fn save(&self, path: &Path) -> Result<(), AssessmentError> {
        let snapshot: HashMap<String, ReferenceEmbeddings> = self
            .entries
            .read()
            .iter()
            .map(|(id, emb)| (id.clone(), (**emb).clone()))
            .collect();
        let bytes = rmp_serde::to_vec_named(&snapshot)
            .map_err(|e| AssessmentError::codec("encode cache", e))?;
        std::fs::write(path, bytes).map_err(|e| AssessmentError::io("write reference cache", e))
    }

    pub fn load(path: &Path) -> Result<Self, AssessmentError> {
        let bytes =
            std::fs::read(path).map_err(|e| AssessmentError::io("read reference cache", e))?;
        let snapshot: HashMap<String, ReferenceEmbeddings> = rmp_serde::from_slice(&bytes)
            .map_err(|e| AssessmentError::codec("decode cache", e))?;
        let cache = Self::new();
        {
            let mut entries = cache.entries.write();
            for (id, emb) in snapshot {
                entries.insert(id, Arc::new(emb));
            }
        }
        Ok(cache)
    }
}

/// Resolves a sentence's reference vectors: embedded record, then cache, then
/// computing them from the sentence's reference audio.
pub struct ReferenceEmbeddingProvider {
    cache: Arc<ReferenceEmbeddingCache>,
}

impl ReferenceEmbeddingProvider {
    pub fn new(cache: Arc<ReferenceEmbeddingCache>) -> Self {
        Self { cache }
    }

    pub fn cache(&self) -> &Arc<ReferenceEmbeddingCache> {
        &self.cache
    }

    pub fn resolve(
        &self,
        sentence: &ExpectedSentence,
        model: &dyn EmbeddingModel,
        preprocessor: &AudioPreprocessor,
        cancel: &CancellationFlag,
    ) -> Result<Arc<ReferenceEmbeddings>, AssessmentError> {
        if let Some(embedded) = sentence.reference_embeddings.as_ref().filter(|e| !e.is_empty()) {
            return Ok(Arc::new(embedded.clone()));
        }
        if let Some(cached) = self.cache.get(&sentence.id) {
            tracing::debug!(sentence_id = %sentence.id, "reference embeddings cache hit");
            return Ok(cached);
        }
        let Some(reference_audio) = sentence.reference_audio.as_ref() else {
            return Err(AssessmentError::NoReferenceAudio {
                sentence_id: sentence.id.clone(),
            });
        };

        let bytes = match reference_audio {
            ReferenceAudio::Encoded(bytes) => bytes.clone(),
            ReferenceAudio::File(path) => std::fs::read(path)
                .map_err(|e| AssessmentError::io("read reference audio", e))?,
        };
        let audio = preprocessor.preprocess(&bytes)?;
        cancel.check("reference embedding")?;
        let matrix = model.embed(&audio)?;

        let computed = if sentence.reference_timestamps.len() == sentence.phonemes.len()
            && !sentence.phonemes.is_empty()
        {
            let windows: Vec<(f64, f64)> = sentence
                .reference_timestamps
                .iter()
                .map(|ts| (ts.start, ts.end))
                .collect();
            ReferenceEmbeddings::PerPhoneme(matrix.pool_windows(&windows)?)
        } else {
            tracing::warn!(
                sentence_id = %sentence.id,
                "reference timing missing, caching a sentence-level vector"
            );
            ReferenceEmbeddings::Sentence(matrix.mean_vector()?)
        };

        // A cancelled request must not publish anything.
        cancel.check("reference cache write")?;
        self.cache.insert(sentence.id.clone(), computed.clone());
        tracing::info!(
            sentence_id = %sentence.id,
            vectors = computed.len(),
            "reference embeddings computed"
        );
        Ok(Arc::new(computed))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::audio::wav_bytes;
    use crate::embedding::EmbeddingMatrix;
    use crate::types::{CanonicalAudio, ReferenceTimestamp};

    struct CountingModel {
        calls: AtomicUsize,
    }

    impl EmbeddingModel for CountingModel {
        fn embed(&self, audio: &CanonicalAudio) -> Result<EmbeddingMatrix, AssessmentError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let frames = (audio.duration_secs() / 0.02).floor() as usize;
            let rows: Vec<Vec<f32>> = (0..frames).map(|f| vec![1.0, f as f32]).collect();
            EmbeddingMatrix::from_rows(&rows, 0.02)
        }
    }

    fn tone(samples: usize) -> Vec<i16> {
        (0..samples)
            .map(|i| ((i as f32 * 0.05).sin() * 12_000.0) as i16)
            .collect()
    }

    fn sentence(with_audio: bool) -> ExpectedSentence {
        let tone = tone(16_000);
        ExpectedSentence {
            id: "s1".to_string(),
            text: "hi".to_string(),
            phonemes: vec!["HH".to_string(), "AY".to_string()],
            reference_timestamps: vec![
                ReferenceTimestamp {
                    phoneme: "HH".to_string(),
                    start: 0.0,
                    end: 0.4,
                    word: Some("hi".to_string()),
                },
                ReferenceTimestamp {
                    phoneme: "AY".to_string(),
                    start: 0.4,
                    end: 0.9,
                    word: Some("hi".to_string()),
                },
            ],
            reference_audio: with_audio.then(|| ReferenceAudio::Encoded(wav_bytes(&tone, 1, 16_000))),
            reference_embeddings: None,
        }
    }

    fn model() -> CountingModel {
        CountingModel {
            calls: AtomicUsize::new(0),
        }
    }

    #[test]
    fn computes_once_then_hits_cache() {
        let provider = ReferenceEmbeddingProvider::new(Arc::new(ReferenceEmbeddingCache::new()));
        let model = model();
        let pre = AudioPreprocessor::default();
        let cancel = CancellationFlag::new();
        let s = sentence(true);

        let first = provider.resolve(&s, &model, &pre, &cancel).expect("compute");
        assert_eq!(first.len(), 2);
        let second = provider.resolve(&s, &model, &pre, &cancel).expect("cached");
        assert_eq!(first, second);
        assert_eq!(model.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn missing_cache_and_audio_is_distinct_error() {
        let provider = ReferenceEmbeddingProvider::new(Arc::new(ReferenceEmbeddingCache::new()));
        let model = model();
        let err = provider
            .resolve(&sentence(false), &model, &AudioPreprocessor::default(), &CancellationFlag::new())
            .expect_err("no reference");
        assert_eq!(err.code(), "no_reference_audio");
        assert_eq!(model.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn cancelled_request_does_not_write_cache() {
        let cache = Arc::new(ReferenceEmbeddingCache::new());
        let provider = ReferenceEmbeddingProvider::new(cache.clone());
        let cancel = CancellationFlag::new();
        cancel.cancel();
        let err = provider
            .resolve(&sentence(true), &model(), &AudioPreprocessor::default(), &cancel)
            .expect_err("cancelled");
        assert_eq!(err.code(), "cancelled");
        assert!(cache.is_empty());
    }

    #[test]
    fn embedded_vectors_win_over_cache() {
        let cache = Arc::new(ReferenceEmbeddingCache::new());
        cache.insert("s1", ReferenceEmbeddings::Sentence(vec![9.0]));
        let provider = ReferenceEmbeddingProvider::new(cache);
        let mut s = sentence(false);
        s.reference_embeddings = Some(ReferenceEmbeddings::PerPhoneme(vec![vec![1.0], vec![2.0]]));
        let resolved = provider
            .resolve(&s, &model(), &AudioPreprocessor::default(), &CancellationFlag::new())
            .expect("embedded");
        assert_eq!(resolved.len(), 2);
    }

    #[test]
    fn concurrent_first_access_leaves_one_consistent_entry() {
        const WORKERS: usize = 8;
        let cache = Arc::new(ReferenceEmbeddingCache::new());
        let provider = Arc::new(ReferenceEmbeddingProvider::new(Arc::clone(&cache)));
        let model = Arc::new(model());
        let s = Arc::new(sentence(true));

        let workers: Vec<_> = (0..WORKERS)
            .map(|_| {
                let provider = Arc::clone(&provider);
                let model = Arc::clone(&model);
                let s = Arc::clone(&s);
                std::thread::spawn(move || {
                    provider
                        .resolve(&s, &*model, &AudioPreprocessor::default(), &CancellationFlag::new())
                        .expect("resolve")
                })
            })
            .collect();
        let results: Vec<Arc<ReferenceEmbeddings>> = workers
            .into_iter()
            .map(|w| w.join().expect("worker"))
            .collect();

        assert_eq!(cache.len(), 1);
        assert!(results.iter().all(|r| r == &results[0]));
        assert_eq!(cache.get("s1").as_deref(), Some(&*results[0]));
        // redundant computation is allowed, lost or torn entries are not
        let calls = model.calls.load(Ordering::SeqCst);
        assert!((1..=WORKERS).contains(&calls), "{calls} embed calls");
    }

    #[test]
    fn reference_windows_use_the_trimmed_time_base() {
        // half a second of silent lead-in before the tone
        let mut samples = vec![0i16; 8_000];
        samples.extend(tone(16_000));
        let bytes = wav_bytes(&samples, 1, 16_000);
        let mut s = sentence(false);
        s.reference_audio = Some(ReferenceAudio::Encoded(bytes.clone()));

        let pre = AudioPreprocessor::default();
        let model = model();
        let provider = ReferenceEmbeddingProvider::new(Arc::new(ReferenceEmbeddingCache::new()));
        let resolved = provider
            .resolve(&s, &model, &pre, &CancellationFlag::new())
            .expect("resolve");

        let canonical = pre.preprocess(&bytes).expect("canonical");
        assert!(canonical.duration_secs() < 1.2, "lead-in was not trimmed");
        let expected = model
            .embed(&canonical)
            .and_then(|m| m.pool_windows(&[(0.0, 0.4), (0.4, 0.9)]))
            .expect("pooled");
        assert_eq!(*resolved, ReferenceEmbeddings::PerPhoneme(expected));
    }

    #[test]
    fn last_write_wins_and_persists() {
        let cache = ReferenceEmbeddingCache::new();
        cache.insert("s1", ReferenceEmbeddings::Sentence(vec![1.0]));
        cache.insert("s1", ReferenceEmbeddings::Sentence(vec![2.0]));
        assert_eq!(cache.len(), 1);

        let path = std::env::temp_dir().join("pronounce_rs_reference_cache.msgpack");
        cache.save(&path).expect("save");
        let loaded = ReferenceEmbeddingCache::load(&path).expect("load");
        let _ = std::fs::remove_file(&path);
        assert_eq!(
            loaded.get("s1").as_deref(),
            Some(&ReferenceEmbeddings::Sentence(vec![2.0]))
        );
    }
}
