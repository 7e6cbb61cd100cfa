//! Request pipeline: question → prompt → model text → action → result.

use std::fmt;
use std::sync::Arc;

use geoask_dsl::{compile, Action};
use thiserror::Error;

use crate::backend::{Processing, Project};
use crate::cache::{MemoryResponseCache, ResponseCache};
use crate::config::GeoaskConfig;
use crate::context::{compute_context, SchemaError};
use crate::executor::{ExecError, Executor};
use crate::prompt::{clean_response, render_prompt};

pub const NO_ACTION_MESSAGE: &str = "Could not determine an action for this request";

/// A failure reported by the language model client.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct CompletionError {
    pub message: String,
}

impl CompletionError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Text-in, text-out model boundary. Transport and credentials live behind it.
pub trait Completer {
    fn complete(&self, prompt: &str) -> Result<String, CompletionError>;
}

impl<F> Completer for F
where
    F: Fn(&str) -> Result<String, CompletionError>,
{
    fn complete(&self, prompt: &str) -> Result<String, CompletionError> {
        self(prompt)
    }
}

/// Hooks for front ends that show intermediate steps. All default to no-ops.
pub trait PipelineObserver {
    fn on_prompt(&self, _prompt: &str) {}
    fn on_code(&self, _code: &str) {}
    fn on_action(&self, _action: &Action) {}
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl PipelineObserver for NoopObserver {}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("failed to describe project layers: {0}")]
    Schema(#[from] SchemaError),
    #[error("model completion failed: {0}")]
    Completion(#[from] CompletionError),
    #[error(transparent)]
    Exec(#[from] ExecError),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Answer {
    /// The action that ran, if the model text yielded one.
    pub action: Option<Action>,
    /// The executor's result sentence; `None` when no action ran.
    pub result: Option<String>,
    /// Compiler diagnostics, surfaced even when an action was found.
    pub warnings: Vec<String>,
}

impl Answer {
    /// Text to show the user.
    pub fn message(&self) -> &str {
        self.result.as_deref().unwrap_or(NO_ACTION_MESSAGE)
    }
}

pub struct Assistant<C> {
    completer: C,
    cache: Option<Arc<dyn ResponseCache>>,
    config: GeoaskConfig,
    observer: Box<dyn PipelineObserver>,
}

impl<C> fmt::Debug for Assistant<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Assistant")
            .field("cached", &self.cache.is_some())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<C: Completer> Assistant<C> {
    pub fn new(completer: C, config: GeoaskConfig) -> Self {
        Self {
            completer,
            cache: None,
            config,
            observer: Box::new(NoopObserver),
        }
    }

    /// Share `cache` with other assistants.
    pub fn with_cache(mut self, cache: Arc<dyn ResponseCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Private in-memory cache sized by `config.response_cache_capacity`.
    pub fn with_memory_cache(self) -> Self {
        let cache = MemoryResponseCache::new(self.config.response_cache_capacity);
        self.with_cache(Arc::new(cache))
    }

    pub fn with_observer(mut self, observer: impl PipelineObserver + 'static) -> Self {
        self.observer = Box::new(observer);
        self
    }

    /// Answer one question against `project`, running processing on `backend`.
    ///
    /// Model output that does not compile is not an error: the answer carries
    /// no action and the diagnostics as warnings.
    pub fn ask<P, B>(
        &self,
        question: &str,
        project: &mut P,
        backend: &mut B,
    ) -> Result<Answer, PipelineError>
    where
        P: Project,
        B: Processing<P::Dataset>,
    {
        let context = compute_context(&*project)?;
        let prompt = render_prompt(&context, question);
        self.observer.on_prompt(&prompt);

        let response = self.complete(&prompt)?;
        let code = clean_response(&response);
        self.observer.on_code(&code);

        let compilation = compile(&code);
        let Some(action) = compilation.action else {
            tracing::info!(
                warnings = compilation.warnings.len(),
                "model response contains no action"
            );
            return Ok(Answer {
                action: None,
                result: None,
                warnings: compilation.warnings,
            });
        };
        self.observer.on_action(&action);

        let result = Executor::new(project, backend, &self.config).execute(&action)?;
        Ok(Answer {
            action: Some(action),
            result: Some(result),
            warnings: compilation.warnings,
        })
    }

    fn complete(&self, prompt: &str) -> Result<String, CompletionError> {
        if let Some(cached) = self.cache.as_ref().and_then(|c| c.get(prompt)) {
            tracing::debug!("using cached model response");
            return Ok(cached);
        }
        let response = self.completer.complete(prompt)?;
        if let Some(cache) = &self.cache {
            cache.put(prompt, response.clone());
        }
        Ok(response)
    }
}
