//! Artifact loading.
//!
//! [`ArtifactLoader`] turns a resolved config into a ready [`ArtifactBundle`]:
//!
//! 1. every declared artifact is located on disk or fetched from the HuggingFace hub,
//! 2. pinned sizes and CRC-32 checksums are verified,
//! 3. the task's `load` hook builds tokenizers and model weights from the verified files.
//!
//! Bundles are cached by [`PipelineConfig::artifact_key`]. Concurrent first loads of the
//! same key perform one fetch; the other callers wait and share the result. Nothing here
//! retries: a failed fetch is reported and the caller decides whether to try again.

use crate::config::{ArtifactLocation, ArtifactSpec, PipelineConfig};
use crate::error::{PipelineError, Result};
use crate::pipelines::cache::ArtifactCache;
use crate::pipelines::task::Task;
use candle_core::Device;
use hf_hub::api::sync::{Api, ApiBuilder};
use hf_hub::{Repo, RepoType};
use std::collections::BTreeMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

// ============ Verified files ============

/// A located artifact that passed its integrity checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedArtifact {
    /// Local path of the file.
    pub path: PathBuf,
    /// File size in bytes.
    pub size: u64,
    /// CRC-32 of the contents, computed when a checksum was pinned.
    pub crc32: Option<u32>,
}

/// The verified files of one config, by artifact name.
#[derive(Debug, Clone, Default)]
pub struct ArtifactFiles {
    files: BTreeMap<String, VerifiedArtifact>,
}

impl ArtifactFiles {
    /// Path of a declared artifact.
    pub fn path(&self, name: &str) -> Result<&Path> {
        self.files
            .get(name)
            .map(|f| f.path.as_path())
            .ok_or_else(|| PipelineError::unavailable(name, "not declared in config"))
    }

    /// Path of an optional artifact, if declared.
    pub fn optional(&self, name: &str) -> Option<&Path> {
        self.files.get(name).map(|f| f.path.as_path())
    }

    /// Verification record of an artifact.
    pub fn get(&self, name: &str) -> Option<&VerifiedArtifact> {
        self.files.get(name)
    }

    /// Iterate over `(name, artifact)` pairs in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &VerifiedArtifact)> {
        self.files.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of artifacts.
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// True if no artifacts were declared.
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

// ============ Bundle ============

/// Everything a pipeline needs to run one config: verified files, device and the
/// task's loaded resources. Read-only once built and shared through `Arc`.
#[derive(Debug)]
pub struct ArtifactBundle<R> {
    key: String,
    files: ArtifactFiles,
    device: Device,
    resources: R,
}

impl<R> ArtifactBundle<R> {
    /// Assemble a bundle from already-loaded parts.
    pub fn new(key: impl Into<String>, files: ArtifactFiles, device: Device, resources: R) -> Self {
        Self {
            key: key.into(),
            files,
            device,
            resources,
        }
    }

    /// Cache key the bundle was loaded under.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Verified artifact files.
    pub fn files(&self) -> &ArtifactFiles {
        &self.files
    }

    /// Device the resources live on.
    pub fn device(&self) -> &Device {
        &self.device
    }

    /// Task resources (tokenizer, model, label tables).
    pub fn resources(&self) -> &R {
        &self.resources
    }
}

// ============ Loader ============

/// Fetch and cache counters of an [`ArtifactLoader`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoaderStats {
    /// Bundles actually fetched and loaded.
    pub fetches: usize,
    /// Loads answered from the cache.
    pub cache_hits: usize,
}

/// Locates, verifies and caches artifact bundles.
///
/// Share one loader between pipelines with `Arc` to share their bundles.
pub struct ArtifactLoader {
    cache: ArtifactCache,
    cache_dir: Option<PathBuf>,
    fetches: AtomicUsize,
    cache_hits: AtomicUsize,
}

impl ArtifactLoader {
    /// A loader using the hub's default download cache.
    pub fn new() -> Self {
        Self {
            cache: ArtifactCache::new(),
            cache_dir: None,
            fetches: AtomicUsize::new(0),
            cache_hits: AtomicUsize::new(0),
        }
    }

    /// A loader downloading hub artifacts under `dir`, unless a config sets `cache_dir`.
    pub fn with_cache_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: Some(dir.into()),
            ..Self::new()
        }
    }

    /// Load the bundle for `config`, reusing a cached one when its key matches.
    pub fn load<T: Task>(&self, config: &PipelineConfig) -> Result<Arc<ArtifactBundle<T::Resources>>> {
        let key = config.artifact_key();
        let mut fetched = false;

        let bundle = self.cache.get_or_create(&key, || {
            fetched = true;
            self.fetches.fetch_add(1, Ordering::SeqCst);
            self.load_uncached::<T>(config, &key)
        })?;

        if !fetched {
            self.cache_hits.fetch_add(1, Ordering::SeqCst);
            debug!(task = T::NAME, key = %key, "artifact bundle cache hit");
        }
        Ok(bundle)
    }

    /// Forget the cached bundle for `config`. Pipelines holding it keep their copy.
    pub fn invalidate(&self, config: &PipelineConfig) -> bool {
        let key = config.artifact_key();
        let removed = self.cache.invalidate(&key);
        if removed {
            info!(key = %key, "artifact bundle invalidated");
        }
        removed
    }

    /// Counters since the loader was created.
    pub fn stats(&self) -> LoaderStats {
        LoaderStats {
            fetches: self.fetches.load(Ordering::SeqCst),
            cache_hits: self.cache_hits.load(Ordering::SeqCst),
        }
    }

    /// Locate (downloading if needed) and verify every artifact of `config`.
    pub fn fetch(&self, config: &PipelineConfig) -> Result<ArtifactFiles> {
        let mut api: Option<Api> = None;
        let mut files = BTreeMap::new();

        for (name, spec) in config.artifacts() {
            let path = match spec.location() {
                ArtifactLocation::Local(path) => locate_local(name, path)?,
                ArtifactLocation::Hub {
                    repo,
                    filename,
                    revision,
                } => {
                    if api.is_none() {
                        api = Some(self.hub_api(name, config)?);
                    }
                    let api = api
                        .as_ref()
                        .ok_or_else(|| PipelineError::Unexpected("hub client missing".into()))?;
                    fetch_hub(api, name, repo, filename, revision.as_deref())?
                }
            };
            let verified = verify(name, spec, path)?;
            debug!(
                artifact = %name,
                path = %verified.path.display(),
                size = verified.size,
                "artifact verified"
            );
            files.insert(name.clone(), verified);
        }

        Ok(ArtifactFiles { files })
    }

    fn load_uncached<T: Task>(
        &self,
        config: &PipelineConfig,
        key: &str,
    ) -> Result<ArtifactBundle<T::Resources>> {
        info!(task = T::NAME, family = config.family(), key = %key, "loading artifact bundle");
        let device = config.device().resolve()?;
        let files = self.fetch(config)?;
        let resources = T::load(config, &files, &device)?;
        Ok(ArtifactBundle::new(key, files, device, resources))
    }

    fn hub_api(&self, artifact: &str, config: &PipelineConfig) -> Result<Api> {
        let mut builder = ApiBuilder::new().with_progress(false);
        if let Some(dir) = config.cache_dir().or(self.cache_dir.as_deref()) {
            builder = builder.with_cache_dir(dir.to_path_buf());
        }
        builder.build().map_err(|e| {
            PipelineError::unavailable(
                artifact,
                format!("Failed to initialize HuggingFace API: {e}"),
            )
        })
    }
}

impl Default for ArtifactLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn locate_local(name: &str, path: &Path) -> Result<PathBuf> {
    let meta = std::fs::metadata(path).map_err(|e| {
        PipelineError::unavailable(name, format!("cannot access '{}': {e}", path.display()))
    })?;
    if !meta.is_file() {
        return Err(PipelineError::unavailable(
            name,
            format!("'{}' is not a regular file", path.display()),
        ));
    }
    Ok(path.to_path_buf())
}

fn fetch_hub(
    api: &Api,
    name: &str,
    repo: &str,
    filename: &str,
    revision: Option<&str>,
) -> Result<PathBuf> {
    let hub_repo = match revision {
        Some(rev) => Repo::with_revision(repo.to_string(), RepoType::Model, rev.to_string()),
        None => Repo::new(repo.to_string(), RepoType::Model),
    };
    info!(artifact = %name, repo = %repo, filename = %filename, "fetching from hub");
    api.repo(hub_repo).get(filename).map_err(|e| {
        PipelineError::unavailable(
            name,
            format!("Failed to download '{filename}' from '{repo}': {e}"),
        )
    })
}

fn verify(name: &str, spec: &ArtifactSpec, path: PathBuf) -> Result<VerifiedArtifact> {
    let size = std::fs::metadata(&path)
        .map_err(|e| {
            PipelineError::unavailable(name, format!("cannot stat '{}': {e}", path.display()))
        })?
        .len();

    if let Some(expected) = spec.size() {
        if expected != size {
            warn!(artifact = %name, expected, actual = size, "artifact size mismatch");
            return Err(PipelineError::corrupt(
                name,
                format!("{expected} bytes"),
                format!("{size} bytes"),
            ));
        }
    }

    let crc32 = match spec.crc32() {
        None => None,
        Some(expected) => {
            let actual = crc32_of(name, &path)?;
            if actual != expected {
                warn!(artifact = %name, "artifact checksum mismatch");
                return Err(PipelineError::corrupt(
                    name,
                    format!("crc32 {expected:08x}"),
                    format!("crc32 {actual:08x}"),
                ));
            }
            Some(actual)
        }
    };

    Ok(VerifiedArtifact { path, size, crc32 })
}

/// CRC-32 (IEEE) of a file, streamed in 64 KiB chunks.
pub fn crc32_of(name: &str, path: &Path) -> Result<u32> {
    let mut file = std::fs::File::open(path).map_err(|e| {
        PipelineError::unavailable(name, format!("cannot open '{}': {e}", path.display()))
    })?;
    let mut hasher = crc32fast::Hasher::new();
    let mut buf = vec![0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf).map_err(|e| {
            PipelineError::unavailable(name, format!("cannot read '{}': {e}", path.display()))
        })?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hasher.finalize())
}
