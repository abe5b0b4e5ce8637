//! Runs the real wav2vec2 checkpoint end to end. Skipped unless
//! `PRONOUNCE_IT_MODEL_DIR` points at a directory holding `model.safetensors`,
//! `config.json` and `vocab.json`.

use std::env;
use std::io::Cursor;
use std::path::PathBuf;

use pronounce_rs::embedding::ReferenceEmbeddings;
use pronounce_rs::{
    AssessmentConfig, AssessmentPipelineBuilder, ExpectedSentence, Wav2Vec2Config,
};

fn model_dir() -> Option<PathBuf> {
    let dir = PathBuf::from(env::var("PRONOUNCE_IT_MODEL_DIR").ok()?);
    if dir.join("model.safetensors").exists() {
        Some(dir)
    } else {
        eprintln!(
            "PRONOUNCE_IT_MODEL_DIR='{}' has no model.safetensors, skipping",
            dir.display()
        );
        None
    }
}

fn tone_wav() -> Vec<u8> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: 16_000,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec).expect("wav writer");
        for n in 0..32_000 {
            let t = n as f32 / 16_000.0;
            let sample = (2.0 * std::f32::consts::PI * 180.0 * t).sin() * 0.4;
            writer
                .write_sample((sample * i16::MAX as f32) as i16)
                .expect("write sample");
        }
        writer.finalize().expect("finalize wav");
    }
    cursor.into_inner()
}

#[test]
fn checkpoint_runs_every_model_stage() {
    let Some(dir) = model_dir() else {
        return;
    };
    let device = env::var("PRONOUNCE_IT_DEVICE").unwrap_or_else(|_| "cpu".to_string());
    let pipeline = AssessmentPipelineBuilder::new(AssessmentConfig::default())
        .with_wav2vec2(Wav2Vec2Config::from_model_dir(&dir, device))
        .build()
        .expect("pipeline");

    let sentence = ExpectedSentence {
        id: "tone".to_string(),
        text: "hello".to_string(),
        phonemes: ["HH", "AH", "L", "OW"].iter().map(|s| s.to_string()).collect(),
        reference_timestamps: Vec::new(),
        reference_audio: None,
        reference_embeddings: Some(ReferenceEmbeddings::Sentence(vec![1.0; 768])),
    };

    // a pure tone transcribes to nothing useful, so verification rejects it,
    // but only after the checkpoint loaded and transcribed
    let result = pipeline.assess(&tone_wav(), &sentence);
    assert_ne!(result.kind(), "model_unavailable", "{}", result.to_json().unwrap_or_default());
    assert_ne!(result.kind(), "internal", "{}", result.to_json().unwrap_or_default());
}
