//! Task lookup by name.
//!
//! The registry maps the config's `task` field to a [`Task`] implementation, so callers
//! that only hold a config document (release tooling, a server, a CLI) can build and run
//! a pipeline without naming its Rust type.

use super::aspect_sentiment::AspectSentimentTask;
use super::pipeline::{Pipeline, PipelineState};
use super::sentiment::SentimentTask;
use super::task::Task;
use super::token_classification::TokenClassificationTask;
use crate::config::{resolve_with, ConfigSchema, ConfigSource, PipelineConfig};
use crate::error::{PipelineError, Result};
use crate::loaders::ArtifactLoader;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::borrow::Borrow;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// A ready pipeline with its task type erased. Inputs and outputs are JSON.
pub trait DynPipeline: Send + Sync {
    /// Task name.
    fn task(&self) -> &'static str;

    /// Lifecycle state.
    fn state(&self) -> PipelineState;

    /// Resolved config.
    fn config(&self) -> Option<&PipelineConfig>;

    /// Deserialize `input` into the task's input type, run it and serialize the result.
    ///
    /// Input that does not deserialize is an [`PipelineError::InputValidation`].
    fn run_json(&self, input: Value) -> Result<Value>;
}

impl<T> DynPipeline for Pipeline<T>
where
    T: Task,
    T::Input: ToOwned,
    <T::Input as ToOwned>::Owned: DeserializeOwned,
    T::Output: Serialize,
{
    fn task(&self) -> &'static str {
        T::NAME
    }

    fn state(&self) -> PipelineState {
        Pipeline::state(self)
    }

    fn config(&self) -> Option<&PipelineConfig> {
        Pipeline::config(self)
    }

    fn run_json(&self, input: Value) -> Result<Value> {
        let owned: <T::Input as ToOwned>::Owned = serde_json::from_value(input).map_err(|e| {
            PipelineError::InputValidation(format!("input does not match task `{}`: {e}", T::NAME))
        })?;
        let output = self.run(owned.borrow())?;
        serde_json::to_value(output)
            .map_err(|e| PipelineError::Postprocess(format!("cannot serialize result: {e}")))
    }
}

type Constructor = fn(ConfigSource, Arc<ArtifactLoader>) -> Result<Box<dyn DynPipeline>>;

struct TaskEntry {
    schema: fn() -> ConfigSchema,
    construct: Constructor,
}

fn construct<T>(source: ConfigSource, loader: Arc<ArtifactLoader>) -> Result<Box<dyn DynPipeline>>
where
    Pipeline<T>: DynPipeline,
    T: Task,
{
    let pipeline = Pipeline::<T>::builder().loader(loader).from_config(source)?;
    Ok(Box::new(pipeline))
}

/// Tasks by name, with one artifact loader shared by every pipeline built here.
pub struct TaskRegistry {
    tasks: BTreeMap<&'static str, TaskEntry>,
    loader: Arc<ArtifactLoader>,
}

impl TaskRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::with_loader(Arc::new(ArtifactLoader::new()))
    }

    /// An empty registry whose pipelines share `loader`.
    pub fn with_loader(loader: Arc<ArtifactLoader>) -> Self {
        Self {
            tasks: BTreeMap::new(),
            loader,
        }
    }

    /// A registry with `sentiment`, `aspect_sentiment` and `token_classification`.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register::<SentimentTask>();
        registry.register::<AspectSentimentTask>();
        registry.register::<TokenClassificationTask>();
        registry
    }

    /// Add (or replace) a task under [`Task::NAME`].
    pub fn register<T>(&mut self) -> &mut Self
    where
        T: Task,
        Pipeline<T>: DynPipeline,
    {
        debug!(task = T::NAME, "registering task");
        self.tasks.insert(
            T::NAME,
            TaskEntry {
                schema: T::schema,
                construct: construct::<T>,
            },
        );
        self
    }

    /// Registered task names, sorted.
    pub fn tasks(&self) -> Vec<&'static str> {
        self.tasks.keys().copied().collect()
    }

    /// Whether `task` is registered.
    pub fn contains(&self, task: &str) -> bool {
        self.tasks.contains_key(task)
    }

    /// Config schema of a registered task.
    pub fn schema(&self, task: &str) -> Result<ConfigSchema> {
        self.tasks
            .get(task)
            .map(|entry| (entry.schema)())
            .ok_or_else(|| {
                PipelineError::config(
                    "task",
                    format!(
                        "unknown task `{task}` (available: {})",
                        self.tasks().join(", ")
                    ),
                )
            })
    }

    /// Resolve a config document against the schema of the task it names.
    pub fn resolve(&self, source: impl Into<ConfigSource>) -> Result<PipelineConfig> {
        resolve_with(source, |task| self.schema(task))
    }

    /// Build a ready pipeline for whatever task the config names.
    pub fn pipeline_from_config(&self, source: impl Into<ConfigSource>) -> Result<Box<dyn DynPipeline>> {
        let source = source.into();
        let task = self.resolve(source.clone())?.task().to_string();
        let entry = self.tasks.get(task.as_str()).ok_or_else(|| {
            PipelineError::config("task", format!("unknown task `{task}`"))
        })?;
        (entry.construct)(source, Arc::clone(&self.loader))
    }

    /// Loader shared by this registry's pipelines.
    pub fn loader(&self) -> &Arc<ArtifactLoader> {
        &self.loader
    }
}

impl Default for TaskRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_builtin_tasks() {
        let registry = TaskRegistry::builtin();
        assert_eq!(
            registry.tasks(),
            vec!["aspect_sentiment", "sentiment", "token_classification"]
        );
        assert!(registry.contains("sentiment"));
        assert_eq!(registry.schema("sentiment").unwrap().task(), "sentiment");
    }

    #[test]
    fn test_unknown_task_is_config_error_on_task() {
        let registry = TaskRegistry::builtin();
        let err = registry
            .resolve(json!({ "task": "translation", "family": "x" }))
            .unwrap_err();
        match err {
            PipelineError::Config { field, reason } => {
                assert_eq!(field, "task");
                assert!(reason.contains("translation"));
            }
            other => panic!("expected config error, got {other:?}"),
        }
    }

    #[test]
    fn test_resolve_uses_task_schema() {
        let registry = TaskRegistry::builtin();
        let err = registry
            .resolve(json!({
                "task": "sentiment",
                "family": "bag_of_embeddings",
                "labels": ["negative", "positive"],
                "artifacts": {
                    "weights": { "path": "w.safetensors" },
                    "vocab": { "path": "vocab.json" }
                }
            }))
            .unwrap_err();
        match err {
            PipelineError::Config { field, .. } => assert_eq!(field, "hyperparameters.embed_dim"),
            other => panic!("expected config error, got {other:?}"),
        }
    }
}
