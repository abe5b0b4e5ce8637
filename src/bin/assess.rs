use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use pronounce_rs::embedding::ReferenceEmbeddingCache;
use pronounce_rs::{
    AssessmentConfig, AssessmentPipeline, AssessmentPipelineBuilder, AssessmentResult,
    ExpectedSentence, PhonemeFeedback, Wav2Vec2Config,
};
use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

#[path = "assess/json_report_formatter.rs"]
mod json_report_formatter;

#[derive(Debug, Parser)]
#[command(name = "assess")]
#[command(about = "Score recorded attempts at known sentences, phoneme by phoneme")]
struct Args {
    #[arg(
        long,
        env = "PRONOUNCE_MODEL_DIR",
        default_value = "models/wav2vec2-base-960h"
    )]
    model_dir: PathBuf,
    #[arg(long, env = "PRONOUNCE_DEVICE", default_value = "cpu")]
    device: String,
    /// JSON file holding one expected sentence or a list of them.
    #[arg(long, env = "PRONOUNCE_SENTENCES")]
    sentence: PathBuf,
    /// Single attempt to score against the (only) sentence.
    #[arg(long, conflicts_with = "batch", required_unless_present = "batch")]
    audio: Option<PathBuf>,
    /// JSON list of `{ "sentence_id", "audio" }` attempts; audio paths are
    /// relative to the manifest.
    #[arg(long)]
    batch: Option<PathBuf>,
    #[arg(long, env = "PRONOUNCE_CONFIG")]
    config: Option<PathBuf>,
    /// MessagePack reference embedding cache, loaded if present and saved after the run.
    #[arg(long, env = "PRONOUNCE_REFERENCE_CACHE")]
    reference_cache: Option<PathBuf>,
    #[arg(long, env = "PRONOUNCE_OUT")]
    out: Option<PathBuf>,
    #[arg(long, env = "PRONOUNCE_SIMULATED_MODE", default_value_t = false)]
    simulated_mode: bool,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SentenceFile {
    One(ExpectedSentence),
    Many(Vec<ExpectedSentence>),
}

#[derive(Debug, Clone, Deserialize)]
struct Attempt {
    sentence_id: String,
    audio: PathBuf,
}

#[derive(Debug, Serialize)]
pub struct AttemptReport {
    pub sentence_id: String,
    pub audio: String,
    /// Compact per-phoneme slice for feedback tooling; absent unless completed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feedback: Option<Vec<PhonemeFeedback>>,
    pub result: AssessmentResult,
}

#[derive(Debug, Default, Serialize)]
pub struct RunSummary {
    pub total: usize,
    pub completed: usize,
    pub rejected: usize,
    pub simulated: usize,
    pub mean_overall_score: Option<f64>,
    pub rejections: HashMap<String, usize>,
}

#[derive(Debug, Serialize)]
pub struct Report {
    pub generated_at: String,
    pub model_dir: String,
    pub device: String,
    pub simulated_mode: bool,
    pub summary: RunSummary,
    pub attempts: Vec<AttemptReport>,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(err) = run() {
        eprintln!("{err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), String> {
    let args = Args::parse();

    let sentences = load_sentences(&args.sentence)?;
    let attempts = match (&args.audio, &args.batch) {
        (Some(audio), _) => {
            let [sentence] = sentences.as_slice() else {
                return Err(format!(
                    "--audio needs exactly one sentence in '{}', found {}",
                    args.sentence.display(),
                    sentences.len()
                ));
            };
            vec![Attempt {
                sentence_id: sentence.id.clone(),
                audio: audio.clone(),
            }]
        }
        (None, Some(manifest)) => load_manifest(manifest)?,
        (None, None) => return Err("either --audio or --batch is required".to_string()),
    };
    if attempts.is_empty() {
        return Err("no attempts to assess".to_string());
    }
    let by_id: HashMap<&str, &ExpectedSentence> =
        sentences.iter().map(|s| (s.id.as_str(), s)).collect();

    let mut config = match &args.config {
        Some(path) => AssessmentConfig::load(path).map_err(|err| err.to_string())?,
        None => AssessmentConfig::default(),
    };
    config.simulated_mode |= args.simulated_mode;

    let cache = match &args.reference_cache {
        Some(path) if path.exists() => Arc::new(
            ReferenceEmbeddingCache::load(path)
                .map_err(|err| format!("Failed to load '{}': {err}", path.display()))?,
        ),
        _ => Arc::new(ReferenceEmbeddingCache::new()),
    };
    let pipeline = AssessmentPipelineBuilder::new(config)
        .with_wav2vec2(Wav2Vec2Config::from_model_dir(&args.model_dir, &args.device))
        .with_reference_cache(Arc::clone(&cache))
        .build()
        .map_err(|err| err.to_string())?;

    let progress = ProgressBar::new(attempts.len() as u64);
    progress.set_style(
        ProgressStyle::with_template(
            "[{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} ({eta}) {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=>-"),
    );
    if attempts.len() == 1 {
        progress.set_draw_target(indicatif::ProgressDrawTarget::hidden());
    }

    let mut reports = Vec::with_capacity(attempts.len());
    for attempt in &attempts {
        progress.set_message(attempt.sentence_id.clone());
        let sentence = by_id.get(attempt.sentence_id.as_str()).ok_or_else(|| {
            format!(
                "attempt '{}' references unknown sentence '{}'",
                attempt.audio.display(),
                attempt.sentence_id
            )
        })?;
        reports.push(assess_one(&pipeline, sentence, attempt)?);
        progress.inc(1);
    }
    progress.finish_with_message("assessment pass complete");

    if let Some(path) = &args.reference_cache {
        cache
            .save(path)
            .map_err(|err| format!("Failed to save '{}': {err}", path.display()))?;
    }

    let report = Report {
        generated_at: Utc::now().to_rfc3339(),
        model_dir: args.model_dir.display().to_string(),
        device: args.device.clone(),
        simulated_mode: pipeline.config().simulated_mode,
        summary: summarize(&reports),
        attempts: reports,
    };
    let out_path = args.out.clone().unwrap_or_else(default_out_path);
    json_report_formatter::write_report(&out_path, &report)?;
    eprintln!(
        "{} attempt(s): {} completed, {} rejected, {} simulated -> {}",
        report.summary.total,
        report.summary.completed,
        report.summary.rejected,
        report.summary.simulated,
        out_path.display()
    );
    Ok(())
}

fn assess_one(
    pipeline: &AssessmentPipeline,
    sentence: &ExpectedSentence,
    attempt: &Attempt,
) -> Result<AttemptReport, String> {
    let bytes = fs::read(&attempt.audio)
        .map_err(|err| format!("Failed to read '{}': {err}", attempt.audio.display()))?;
    let result = pipeline.assess(&bytes, sentence);
    Ok(AttemptReport {
        sentence_id: sentence.id.clone(),
        audio: attempt.audio.display().to_string(),
        feedback: result.completed().map(|done| done.feedback_view()),
        result,
    })
}

fn summarize(reports: &[AttemptReport]) -> RunSummary {
    let mut summary = RunSummary {
        total: reports.len(),
        ..RunSummary::default()
    };
    let mut overall = Vec::new();
    for report in reports {
        match &report.result {
            AssessmentResult::Completed(done) => {
                summary.completed += 1;
                overall.push(done.overall_score);
            }
            AssessmentResult::Rejected(rejection) => {
                summary.rejected += 1;
                *summary
                    .rejections
                    .entry(rejection.error.as_str().to_string())
                    .or_default() += 1;
            }
            AssessmentResult::Simulated(_) => summary.simulated += 1,
        }
    }
    if !overall.is_empty() {
        summary.mean_overall_score = Some(overall.iter().sum::<f64>() / overall.len() as f64);
    }
    summary
}

fn load_sentences(path: &Path) -> Result<Vec<ExpectedSentence>, String> {
    let data = fs::read_to_string(path)
        .map_err(|err| format!("Failed to read '{}': {err}", path.display()))?;
    let parsed: SentenceFile = serde_json::from_str(&data)
        .map_err(|err| format!("Failed to parse sentences '{}': {err}", path.display()))?;
    Ok(match parsed {
        SentenceFile::One(sentence) => vec![sentence],
        SentenceFile::Many(sentences) => sentences,
    })
}

fn load_manifest(path: &Path) -> Result<Vec<Attempt>, String> {
    let data = fs::read_to_string(path)
        .map_err(|err| format!("Failed to read '{}': {err}", path.display()))?;
    let attempts: Vec<Attempt> = serde_json::from_str(&data)
        .map_err(|err| format!("Failed to parse manifest '{}': {err}", path.display()))?;
    let base = path.parent().unwrap_or_else(|| Path::new("."));
    Ok(attempts
        .into_iter()
        .map(|attempt| Attempt {
            audio: resolve_path(base, &attempt.audio),
            ..attempt
        })
        .collect())
}

fn default_out_path() -> PathBuf {
    let run_id = Utc::now().format("%Y%m%dT%H%M%SZ");
    PathBuf::from("reports").join(format!("assess-{run_id}.json"))
}

fn resolve_path(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}
