use std::sync::Arc;

use once_cell::sync::OnceCell;

use crate::config::Wav2Vec2Config;
use crate::error::AssessmentError;
use crate::pipeline::runtime::Wav2Vec2Runtime;
use crate::pipeline::traits::{CharPosteriorModel, EmbeddingModel, Transcriber};

/// The three model capabilities an assessment needs.
#[derive(Clone)]
pub struct ModelHandles {
    pub transcriber: Arc<dyn Transcriber>,
    pub posteriors: Arc<dyn CharPosteriorModel>,
    pub embedder: Arc<dyn EmbeddingModel>,
}

impl ModelHandles {
    /// One model serving every capability.
    pub fn shared<M>(model: Arc<M>) -> Self
    where
        M: Transcriber + CharPosteriorModel + EmbeddingModel + 'static,
    {
        Self {
            transcriber: model.clone(),
            posteriors: model.clone(),
            embedder: model,
        }
    }
}

type Loader = Box<dyn Fn() -> Result<ModelHandles, AssessmentError> + Send + Sync>;

/// Lazily-initialized model handles. The loader runs on first use and, once it
/// succeeds, never again; a failed load is retried by the next request.
pub struct ModelContext {
    loader: Loader,
    handles: OnceCell<ModelHandles>,
}

impl ModelContext {
    pub fn lazy<F>(loader: F) -> Self
    where
        F: Fn() -> Result<ModelHandles, AssessmentError> + Send + Sync + 'static,
    {
        Self {
            loader: Box::new(loader),
            handles: OnceCell::new(),
        }
    }

    /// Already-loaded handles, e.g. fakes in tests.
    pub fn from_models(handles: ModelHandles) -> Self {
        let context = Self::lazy(|| {
            Err(AssessmentError::runtime(
                "model context",
                "preloaded context has no loader",
            ))
        });
        // freshly created cell, cannot already be set
        let _ = context.handles.set(handles);
        context
    }

    /// A candle wav2vec2 checkpoint serving all three capabilities.
    pub fn wav2vec2(config: Wav2Vec2Config) -> Self {
        Self::lazy(move || {
            let runtime = Wav2Vec2Runtime::load(&config)
                .map_err(|e| AssessmentError::model_unavailable("wav2vec2", e))?;
            Ok(ModelHandles::shared(Arc::new(runtime)))
        })
    }

    /// A context whose models can never load.
    pub fn unavailable(reason: impl Into<String>) -> Self {
        let reason = reason.into();
        Self::lazy(move || Err(AssessmentError::model_unavailable("acoustic", &reason)))
    }

    pub fn is_loaded(&self) -> bool {
        self.handles.get().is_some()
    }

    pub fn handles(&self) -> Result<&ModelHandles, AssessmentError> {
        self.handles.get_or_try_init(|| {
            let handles = (self.loader)()?;
            tracing::info!("model context initialized");
            Ok(handles)
        })
    }
}
