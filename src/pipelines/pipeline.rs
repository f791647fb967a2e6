use super::stats::PipelineStats;
use super::task::{PreprocessedBatch, Task};
use super::utils::DeviceRequest;
use crate::config::{resolve_with, ConfigSource, PipelineConfig};
use crate::error::{PipelineError, Result};
use crate::loaders::{ArtifactBundle, ArtifactLoader};
use candle_core::Device;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::{debug, info, warn};

// ============ State ============

/// Lifecycle state of a [`Pipeline`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    /// Nothing resolved yet.
    Uninitialized,
    /// Config resolved, artifacts not loaded.
    ConfigResolved,
    /// Artifacts loaded. Passed through on the way to `Ready`.
    ArtifactsLoaded,
    /// `run` may be called.
    Ready,
    /// Config resolution or artifact loading failed. Terminal.
    Failed,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineState::Uninitialized => "uninitialized",
            PipelineState::ConfigResolved => "config_resolved",
            PipelineState::ArtifactsLoaded => "artifacts_loaded",
            PipelineState::Ready => "ready",
            PipelineState::Failed => "failed",
        };
        write!(f, "{name}")
    }
}

// ============ Output types ============

/// Output of [`Pipeline::run_batch`].
#[derive(Debug)]
pub struct BatchOutput<O> {
    /// One result per input, in input order.
    pub results: Vec<Result<O>>,
    /// Execution statistics.
    pub stats: PipelineStats,
}

// ============ Pipeline ============

/// One task's composed pipeline: config resolver, artifact loader, preprocessor, model
/// adapter and postprocessor.
///
/// # Examples
///
/// ```rust,no_run
/// # use sgnlp::sentiment::SentimentPipeline;
/// # fn main() -> sgnlp::error::Result<()> {
/// let pipeline = SentimentPipeline::from_config("models/sentiment/config.json")?;
///
/// let sentiment = pipeline.run("The staff were lovely.")?;
/// println!("{}: {:.2}", sentiment.label, sentiment.score);
///
/// let output = pipeline.run_batch(&["Great!", "Terrible."])?;
/// for r in output.results {
///     println!("{}", r?.label);
/// }
/// # Ok(())
/// # }
/// ```
pub struct Pipeline<T: Task> {
    loader: Arc<ArtifactLoader>,
    state: PipelineState,
    device_override: Option<DeviceRequest>,
    config: Option<PipelineConfig>,
    bundle: Option<Arc<ArtifactBundle<T::Resources>>>,
    failure: Option<String>,
}

impl<T: Task> Pipeline<T> {
    /// An uninitialized pipeline with its own artifact loader.
    pub fn new() -> Self {
        Self::with_loader(Arc::new(ArtifactLoader::new()))
    }

    /// An uninitialized pipeline sharing `loader` (and its cache) with others.
    pub fn with_loader(loader: Arc<ArtifactLoader>) -> Self {
        Self {
            loader,
            state: PipelineState::Uninitialized,
            device_override: None,
            config: None,
            bundle: None,
            failure: None,
        }
    }

    /// Start a builder for device and loader overrides.
    pub fn builder() -> PipelineBuilder<T> {
        PipelineBuilder::new()
    }

    /// Resolve config and load artifacts, returning a ready pipeline.
    pub fn from_config(source: impl Into<ConfigSource>) -> Result<Self> {
        let mut pipeline = Self::new();
        pipeline.initialize(source)?;
        Ok(pipeline)
    }

    fn initialize(&mut self, source: impl Into<ConfigSource>) -> Result<()> {
        self.resolve_config(source)?;
        self.load_artifacts()?;
        Ok(())
    }

    /// `Uninitialized -> ConfigResolved`.
    ///
    /// Once a config is resolved, later calls return it without reading `source`.
    pub fn resolve_config(&mut self, source: impl Into<ConfigSource>) -> Result<&PipelineConfig> {
        if self.state == PipelineState::Failed {
            return Err(self.not_ready());
        }

        if self.config.is_none() {
            let resolved = resolve_with(source, |task| {
                if task == T::NAME {
                    Ok(T::schema())
                } else {
                    Err(PipelineError::config(
                        "task",
                        format!("this pipeline runs `{}`, config declares `{task}`", T::NAME),
                    ))
                }
            });

            match resolved {
                Ok(config) => {
                    let config = match self.device_override {
                        Some(device) => config.with_device(device),
                        None => config,
                    };
                    info!(
                        task = T::NAME,
                        family = config.family(),
                        device = %config.device(),
                        "config resolved"
                    );
                    self.config = Some(config);
                    self.state = PipelineState::ConfigResolved;
                }
                Err(e) => return Err(self.fail(e)),
            }
        } else {
            debug!(task = T::NAME, "config already resolved");
        }

        self.config.as_ref().ok_or_else(|| self.not_ready())
    }

    /// `ConfigResolved -> ArtifactsLoaded -> Ready`.
    ///
    /// Once loaded, later calls return the same bundle.
    pub fn load_artifacts(&mut self) -> Result<&Arc<ArtifactBundle<T::Resources>>> {
        if self.bundle.is_none() {
            let config = match (&self.state, &self.config) {
                (PipelineState::ConfigResolved, Some(config)) => config,
                _ => return Err(self.not_ready()),
            };

            match self.loader.load::<T>(config) {
                Ok(bundle) => {
                    self.bundle = Some(bundle);
                    self.state = PipelineState::ArtifactsLoaded;
                    debug!(task = T::NAME, "artifacts loaded");
                    self.state = PipelineState::Ready;
                    info!(task = T::NAME, "pipeline ready");
                }
                Err(e) => return Err(self.fail(e)),
            }
        }

        self.bundle.as_ref().ok_or_else(|| self.not_ready())
    }

    /// Drop the cached bundle for this config and load it again.
    ///
    /// Other pipelines keep the bundle they hold. A failed reload leaves the pipeline
    /// `Failed`.
    pub fn reload(&mut self) -> Result<()> {
        if self.state != PipelineState::Ready {
            return Err(self.not_ready());
        }
        if let Some(config) = &self.config {
            self.loader.invalidate(config);
        }
        self.bundle = None;
        self.state = PipelineState::ConfigResolved;
        info!(task = T::NAME, "reloading artifacts");
        self.load_artifacts().map(|_| ())
    }

    /// Run one input through preprocess, inference and postprocess.
    ///
    /// Errors from any stage are returned as-is and leave the pipeline ready.
    pub fn run(&self, input: &T::Input) -> Result<T::Output> {
        let (config, bundle) = self.ready()?;

        let encoded = T::prepare(bundle, config, input)?;
        let batch = PreprocessedBatch::new(vec![encoded]);
        let mut raw = predict_checked::<T>(bundle, &batch)?;

        let raw = raw
            .pop()
            .ok_or_else(|| PipelineError::Unexpected("No predictions returned".into()))?;
        let encoded = batch
            .items
            .first()
            .ok_or_else(|| PipelineError::Unexpected("Batch lost its item".into()))?;
        T::finalize(bundle, config, raw, encoded, input)
    }

    /// Run several inputs with one forward pass.
    ///
    /// Inputs rejected by the preprocessor get their error in place; the rest are batched.
    /// A failed forward pass fails the whole call.
    pub fn run_batch(&self, inputs: &[&T::Input]) -> Result<BatchOutput<T::Output>> {
        let stats = PipelineStats::start();
        let (config, bundle) = self.ready()?;

        let mut error_results: Vec<Option<PipelineError>> = (0..inputs.len()).map(|_| None).collect();
        let mut valid_indices = Vec::with_capacity(inputs.len());
        let mut items = Vec::with_capacity(inputs.len());

        for (i, input) in inputs.iter().enumerate() {
            match T::prepare(bundle, config, input) {
                Ok(encoded) => {
                    valid_indices.push(i);
                    items.push(encoded);
                }
                Err(e) => {
                    debug!(task = T::NAME, index = i, error = %e, "input rejected");
                    error_results[i] = Some(e);
                }
            }
        }

        let mut outputs: Vec<Option<Result<T::Output>>> = (0..inputs.len()).map(|_| None).collect();

        if !items.is_empty() {
            let batch = PreprocessedBatch::new(items);
            let raw = predict_checked::<T>(bundle, &batch)?;
            for ((&orig_idx, raw), encoded) in valid_indices.iter().zip(raw).zip(&batch.items) {
                outputs[orig_idx] = Some(T::finalize(bundle, config, raw, encoded, inputs[orig_idx]));
            }
        }

        let results: Vec<Result<T::Output>> = outputs
            .into_iter()
            .zip(error_results)
            .map(|(output, error)| match (output, error) {
                (Some(output), _) => output,
                (None, Some(err)) => Err(err),
                (None, None) => Err(PipelineError::Unexpected(
                    "Model returned no predictions".to_string(),
                )),
            })
            .collect();

        let succeeded = results.iter().filter(|r| r.is_ok()).count();
        Ok(BatchOutput {
            results,
            stats: stats.finish(inputs.len(), succeeded),
        })
    }

    /// Current lifecycle state.
    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Resolved config, once resolution succeeded.
    pub fn config(&self) -> Option<&PipelineConfig> {
        self.config.as_ref()
    }

    /// Loaded artifact bundle, once loading succeeded.
    pub fn bundle(&self) -> Option<&Arc<ArtifactBundle<T::Resources>>> {
        self.bundle.as_ref()
    }

    /// Device the loaded model runs on.
    pub fn device(&self) -> Option<&Device> {
        self.bundle.as_ref().map(|b| b.device())
    }

    /// Loader this pipeline fetches through.
    pub fn loader(&self) -> &Arc<ArtifactLoader> {
        &self.loader
    }

    /// Message of the error that moved the pipeline to `Failed`.
    pub fn failure(&self) -> Option<&str> {
        self.failure.as_deref()
    }

    fn ready(&self) -> Result<(&PipelineConfig, &ArtifactBundle<T::Resources>)> {
        match (&self.state, &self.config, &self.bundle) {
            (PipelineState::Ready, Some(config), Some(bundle)) => Ok((config, bundle.as_ref())),
            _ => Err(self.not_ready()),
        }
    }

    fn not_ready(&self) -> PipelineError {
        PipelineError::NotReady {
            state: self.state.to_string(),
        }
    }

    fn fail(&mut self, error: PipelineError) -> PipelineError {
        warn!(task = T::NAME, state = %self.state, error = %error, "pipeline failed");
        self.state = PipelineState::Failed;
        self.failure = Some(error.to_string());
        self.bundle = None;
        error
    }
}

impl<T: Task> Default for Pipeline<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Task> fmt::Debug for Pipeline<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("task", &T::NAME)
            .field("state", &self.state)
            .field("config", &self.config)
            .finish()
    }
}

fn predict_checked<T: Task>(
    bundle: &ArtifactBundle<T::Resources>,
    batch: &PreprocessedBatch<T::Encoded>,
) -> Result<Vec<T::RawOutput>> {
    let raw = T::predict(bundle, batch)?;
    if raw.len() != batch.len() {
        return Err(PipelineError::Inference(format!(
            "model returned {} outputs for a batch of {}",
            raw.len(),
            batch.len()
        )));
    }
    Ok(raw)
}

// ============ Builder ============

/// Builder for a [`Pipeline`] with device or loader overrides.
///
/// ```rust,no_run
/// # use sgnlp::sentiment::SentimentPipeline;
/// # fn main() -> sgnlp::error::Result<()> {
/// let pipeline = SentimentPipeline::builder()
///     .cuda(0)
///     .from_config("models/sentiment/config.json")?;
/// # Ok(())
/// # }
/// ```
pub struct PipelineBuilder<T: Task> {
    loader: Option<Arc<ArtifactLoader>>,
    device: Option<DeviceRequest>,
    _task: PhantomData<fn() -> T>,
}

impl<T: Task> PipelineBuilder<T> {
    /// A builder with no overrides.
    pub fn new() -> Self {
        Self {
            loader: None,
            device: None,
            _task: PhantomData,
        }
    }

    /// Run on CPU whatever the config says.
    pub fn cpu(mut self) -> Self {
        self.device = Some(DeviceRequest::Cpu);
        self
    }

    /// Run on the given CUDA device whatever the config says.
    pub fn cuda(mut self, index: usize) -> Self {
        self.device = Some(DeviceRequest::Cuda(index));
        self
    }

    /// Override the device.
    pub fn device(mut self, device: DeviceRequest) -> Self {
        self.device = Some(device);
        self
    }

    /// Share an artifact loader.
    pub fn loader(mut self, loader: Arc<ArtifactLoader>) -> Self {
        self.loader = Some(loader);
        self
    }

    /// An uninitialized pipeline with the overrides applied.
    pub fn build(self) -> Pipeline<T> {
        let mut pipeline = match self.loader {
            Some(loader) => Pipeline::with_loader(loader),
            None => Pipeline::new(),
        };
        pipeline.device_override = self.device;
        pipeline
    }

    /// Build and drive the pipeline to `Ready`.
    pub fn from_config(self, source: impl Into<ConfigSource>) -> Result<Pipeline<T>> {
        let mut pipeline = self.build();
        pipeline.initialize(source)?;
        Ok(pipeline)
    }
}

impl<T: Task> Default for PipelineBuilder<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConfigSchema, FamilySchema, LabelRule};
    use crate::loaders::ArtifactFiles;
    use serde_json::json;
    use std::path::PathBuf;

    // Scores each whitespace token by its length; the table artifact holds a multiplier.
    struct LengthTask;

    impl Task for LengthTask {
        const NAME: &'static str = "length";
        type Input = str;
        type Resources = usize;
        type Encoded = Vec<usize>;
        type RawOutput = usize;
        type Output = String;

        fn schema() -> ConfigSchema {
            ConfigSchema::new("length", LabelRule::at_least(1))
                .family(FamilySchema::new("plain").artifacts(&["table"]))
        }

        fn load(_: &PipelineConfig, files: &ArtifactFiles, _: &Device) -> Result<usize> {
            let text = std::fs::read_to_string(files.path("table")?)?;
            text.trim()
                .parse()
                .map_err(|_| PipelineError::corrupt("table", "an integer", text.trim()))
        }

        fn prepare(_: &ArtifactBundle<usize>, _: &PipelineConfig, input: &str) -> Result<Vec<usize>> {
            if input.trim().is_empty() {
                return Err(PipelineError::InputValidation("empty".into()));
            }
            Ok(input.split_whitespace().map(str::len).collect())
        }

        fn predict(
            bundle: &ArtifactBundle<usize>,
            batch: &PreprocessedBatch<Vec<usize>>,
        ) -> Result<Vec<usize>> {
            Ok(batch
                .items
                .iter()
                .map(|lens| lens.iter().sum::<usize>() * bundle.resources())
                .collect())
        }

        fn finalize(
            _: &ArtifactBundle<usize>,
            config: &PipelineConfig,
            raw: usize,
            _: &Vec<usize>,
            _: &str,
        ) -> Result<String> {
            Ok(format!("{}:{raw}", config.labels()[0]))
        }
    }

    fn table_file(name: &str, contents: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("sgnlp-pipeline-{name}-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("table.txt");
        std::fs::write(&path, contents).unwrap();
        path
    }

    fn config_doc(path: &std::path::Path) -> serde_json::Value {
        json!({
            "task": "length",
            "family": "plain",
            "labels": ["len"],
            "artifacts": { "table": { "path": path.to_str().unwrap() } }
        })
    }

    #[test]
    fn test_state_machine_happy_path() {
        let path = table_file("happy", "2");
        let mut pipeline = Pipeline::<LengthTask>::new();
        assert_eq!(pipeline.state(), PipelineState::Uninitialized);
        assert!(matches!(pipeline.run("a b"), Err(PipelineError::NotReady { .. })));

        pipeline.resolve_config(config_doc(&path)).unwrap();
        assert_eq!(pipeline.state(), PipelineState::ConfigResolved);
        assert!(matches!(pipeline.run("a b"), Err(PipelineError::NotReady { .. })));

        pipeline.load_artifacts().unwrap();
        assert_eq!(pipeline.state(), PipelineState::Ready);
        assert_eq!(pipeline.run("ab cde").unwrap(), "len:10");
    }

    #[test]
    fn test_transitions_are_idempotent() {
        let path = table_file("idem", "1");
        let mut pipeline = Pipeline::<LengthTask>::new();
        pipeline.resolve_config(config_doc(&path)).unwrap();
        // A second source is ignored once a config is cached.
        let config = pipeline.resolve_config(json!({})).unwrap().clone();
        assert_eq!(config.task(), "length");

        let first = Arc::clone(pipeline.load_artifacts().unwrap());
        let second = Arc::clone(pipeline.load_artifacts().unwrap());
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(pipeline.loader().stats().fetches, 1);
    }

    #[test]
    fn test_load_before_resolve_is_not_ready() {
        let mut pipeline = Pipeline::<LengthTask>::new();
        assert!(matches!(
            pipeline.load_artifacts(),
            Err(PipelineError::NotReady { .. })
        ));
        assert_eq!(pipeline.state(), PipelineState::Uninitialized);
    }

    #[test]
    fn test_failures_are_terminal() {
        let mut pipeline = Pipeline::<LengthTask>::new();
        let err = pipeline
            .resolve_config(json!({ "task": "length", "family": "plain" }))
            .unwrap_err();
        assert!(matches!(err, PipelineError::Config { .. }));
        assert_eq!(pipeline.state(), PipelineState::Failed);
        assert!(pipeline.failure().is_some());

        let path = table_file("terminal", "1");
        assert!(matches!(
            pipeline.resolve_config(config_doc(&path)),
            Err(PipelineError::NotReady { .. })
        ));
        assert!(matches!(pipeline.run("x"), Err(PipelineError::NotReady { .. })));
    }

    #[test]
    fn test_wrong_task_is_config_error() {
        let path = table_file("wrongtask", "1");
        let mut doc = config_doc(&path);
        doc["task"] = json!("sentiment");
        match Pipeline::<LengthTask>::from_config(doc).unwrap_err() {
            PipelineError::Config { field, .. } => assert_eq!(field, "task"),
            other => panic!("expected config error, got {other:?}"),
        }
    }

    #[test]
    fn test_corrupt_artifact_fails_load() {
        let path = table_file("corrupt", "not-a-number");
        let mut pipeline = Pipeline::<LengthTask>::new();
        pipeline.resolve_config(config_doc(&path)).unwrap();
        assert!(matches!(
            pipeline.load_artifacts(),
            Err(PipelineError::ArtifactCorrupt { .. })
        ));
        assert_eq!(pipeline.state(), PipelineState::Failed);
    }

    #[test]
    fn test_per_call_errors_keep_pipeline_ready() {
        let path = table_file("percall", "1");
        let pipeline = Pipeline::<LengthTask>::from_config(config_doc(&path)).unwrap();
        assert!(matches!(
            pipeline.run("   "),
            Err(PipelineError::InputValidation(_))
        ));
        assert_eq!(pipeline.state(), PipelineState::Ready);
        assert_eq!(pipeline.run("abc").unwrap(), "len:3");
    }

    #[test]
    fn test_run_batch_reports_errors_in_place() {
        let path = table_file("batch", "1");
        let pipeline = Pipeline::<LengthTask>::from_config(config_doc(&path)).unwrap();
        let output = pipeline.run_batch(&["a", "", "abc de"]).unwrap();
        assert_eq!(output.results.len(), 3);
        assert_eq!(output.results[0].as_ref().unwrap(), "len:1");
        assert!(matches!(
            output.results[1],
            Err(PipelineError::InputValidation(_))
        ));
        assert_eq!(output.results[2].as_ref().unwrap(), "len:5");
        assert_eq!(output.stats.items_processed, 3);
        assert_eq!(output.stats.items_succeeded, 2);
    }

    #[test]
    fn test_reload_picks_up_new_artifacts() {
        let path = table_file("reload", "1");
        let mut pipeline = Pipeline::<LengthTask>::from_config(config_doc(&path)).unwrap();
        assert_eq!(pipeline.run("ab").unwrap(), "len:2");

        std::fs::write(&path, "3").unwrap();
        assert_eq!(pipeline.run("ab").unwrap(), "len:2");

        pipeline.reload().unwrap();
        assert_eq!(pipeline.state(), PipelineState::Ready);
        assert_eq!(pipeline.run("ab").unwrap(), "len:6");
        assert_eq!(pipeline.loader().stats().fetches, 2);
    }

    #[test]
    fn test_builder_overrides_device() {
        let path = table_file("builder", "1");
        let mut doc = config_doc(&path);
        doc["device"] = json!("cuda:3");
        let pipeline = Pipeline::<LengthTask>::builder().cpu().from_config(doc).unwrap();
        assert_eq!(pipeline.config().unwrap().device(), &DeviceRequest::Cpu);
        assert!(pipeline.device().unwrap().is_cpu());
    }
}
