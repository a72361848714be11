//! # testdock Image Handle (`image`)
//!
//! File: testdock/src/image.rs
//!
//! ## Overview
//!
//! `DockerImage` is a fluent handle over at most one image on the engine. It can
//! build an image from a local build context or pull one from a registry, and
//! afterwards exposes the image's identity (id, short id, tags) and removes it
//! again. Independent of the stored image it can look up or check the existence
//! of any other image reference.
//!
//! ## Architecture
//!
//! - The handle holds an `Arc<dyn Engine>` it does not own; many handles may share
//!   one engine connection.
//! - Options are typed builders (`BuildOptions`, `PullOptions`, `RemoveOptions`)
//!   converted to `bollard` option structs in exactly one place each.
//! - Build and pull consume the engine's progress stream to the end: the build log
//!   is collected so a failing recipe surfaces as `Error::Build` with the log
//!   attached, pull errors surface as `Error::Pull`.
//! - Build, pull and remove leave the stored image untouched on failure.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use testdock::common::docker::DockerEngine;
//! use testdock::image::{DockerImage, RemoveOptions};
//!
//! # async fn run() -> testdock::Result<()> {
//! let engine = DockerEngine::from_env()?.shared();
//! let mut image = DockerImage::new(engine);
//! image.from_image("alpine", None).await?;
//! println!("{} {:?}", image.short_id()?, image.tags()?);
//! image.remove(RemoveOptions::default().force(true)).await?;
//! # Ok(())
//! # }
//! ```
//!
use crate::common::{archive::context::pack_build_context, docker::Engine};
use crate::core::error::{classify, is_transport_failure, status_code, Error, Result};
use bollard::{
    auth::DockerCredentials,
    image::{BuildImageOptions, CreateImageOptions, RemoveImageOptions},
};
use futures_util::StreamExt;
use std::{
    collections::HashMap,
    fmt,
    path::{Path, PathBuf},
    sync::Arc,
};
use tracing::{debug, error, info, instrument, warn};

/// Tag used by `from_dockerfile` when none is given.
pub const DEFAULT_BUILD_TAG: &str = "local/image";
/// Tag used by `from_image` when none is given.
pub const DEFAULT_PULL_TAG: &str = "latest";

/// Identity of an image as reported by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageDescriptor {
    /// Content-addressed id, usually `sha256:<64 hex>`.
    pub id: String,
    /// Truncated id, see [`short_id`].
    pub short_id: String,
    /// `repository:tag` references pointing at this image.
    pub tags: Vec<String>,
}

/// Truncates an image id for display.
///
/// `sha256:` ids keep the prefix plus the first 10 hex digits; anything else is cut
/// to its first 10 characters.
pub fn short_id(id: &str) -> String {
    match id.strip_prefix("sha256:") {
        Some(hex) => format!("sha256:{}", hex.chars().take(10).collect::<String>()),
        None => id.chars().take(10).collect(),
    }
}

/// Options for building an image from a local build context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildOptions {
    context: PathBuf,
    tag: String,
    dockerfile: String,
    build_args: HashMap<String, String>,
    target: Option<String>,
    no_cache: bool,
    pull: bool,
    labels: HashMap<String, String>,
    platform: Option<String>,
}

impl BuildOptions {
    pub fn new(context: impl Into<PathBuf>, tag: impl Into<String>) -> Self {
        Self {
            context: context.into(),
            tag: tag.into(),
            dockerfile: "Dockerfile".to_string(),
            build_args: HashMap::new(),
            target: None,
            no_cache: false,
            pull: false,
            labels: HashMap::new(),
            platform: None,
        }
    }

    /// Dockerfile path relative to the context.
    pub fn dockerfile(mut self, dockerfile: impl Into<String>) -> Self {
        self.dockerfile = dockerfile.into();
        self
    }

    pub fn build_arg(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.build_args.insert(key.into(), value.into());
        self
    }

    /// Stage of a multi-stage Dockerfile to stop at.
    pub fn target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn no_cache(mut self, no_cache: bool) -> Self {
        self.no_cache = no_cache;
        self
    }

    /// Always attempt to pull newer versions of base images.
    pub fn pull(mut self, pull: bool) -> Self {
        self.pull = pull;
        self
    }

    pub fn label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    pub fn platform(mut self, platform: impl Into<String>) -> Self {
        self.platform = Some(platform.into());
        self
    }

    pub fn context(&self) -> &Path {
        &self.context
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    fn to_bollard(&self) -> BuildImageOptions<String> {
        BuildImageOptions {
            dockerfile: self.dockerfile.clone(),
            t: self.tag.clone(),
            nocache: self.no_cache,
            pull: self.pull,
            rm: true, // Remove intermediate containers after a successful build
            buildargs: self.build_args.clone(),
            labels: self.labels.clone(),
            target: self.target.clone().unwrap_or_default(),
            platform: self.platform.clone().unwrap_or_default(),
            ..Default::default()
        }
    }
}

/// Options for pulling an image from a registry.
#[derive(Debug, Clone, Default)]
pub struct PullOptions {
    repository: String,
    tag: String,
    platform: Option<String>,
    credentials: Option<DockerCredentials>,
}

impl PullOptions {
    pub fn new(repository: impl Into<String>) -> Self {
        Self {
            repository: repository.into(),
            tag: DEFAULT_PULL_TAG.to_string(),
            ..Default::default()
        }
    }

    /// Tag or digest. A value starting with `sha256:` pulls by digest.
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = tag.into();
        self
    }

    pub fn platform(mut self, platform: impl Into<String>) -> Self {
        self.platform = Some(platform.into());
        self
    }

    /// Registry credentials sent with the request.
    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.credentials = Some(DockerCredentials {
            username: Some(username.into()),
            password: Some(password.into()),
            ..Default::default()
        });
        self
    }

    /// The reference the image will be known by locally after the pull.
    pub fn reference(&self) -> String {
        if self.tag.starts_with("sha256:") {
            format!("{}@{}", self.repository, self.tag)
        } else {
            format!("{}:{}", self.repository, self.tag)
        }
    }

    fn to_bollard(&self) -> CreateImageOptions<String> {
        // Digests travel inside `fromImage`; the `tag` parameter only takes tags.
        let (from_image, tag) = if self.tag.starts_with("sha256:") {
            (self.reference(), String::new())
        } else {
            (self.repository.clone(), self.tag.clone())
        };
        CreateImageOptions {
            from_image,
            tag,
            platform: self.platform.clone().unwrap_or_default(),
            ..Default::default()
        }
    }
}

/// Options for removing the stored image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoveOptions {
    force: bool,
    prune_children: bool,
    ignore_missing: bool,
}

impl Default for RemoveOptions {
    fn default() -> Self {
        Self {
            force: false,
            prune_children: true,
            ignore_missing: false,
        }
    }
}

impl RemoveOptions {
    /// Remove even if stopped containers still reference the image.
    pub fn force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    /// Also delete untagged parent layers.
    pub fn prune_children(mut self, prune: bool) -> Self {
        self.prune_children = prune;
        self
    }

    /// Treat an image that is already gone as successfully removed.
    pub fn ignore_missing(mut self, ignore: bool) -> Self {
        self.ignore_missing = ignore;
        self
    }

    fn to_bollard(self) -> RemoveImageOptions {
        RemoveImageOptions {
            force: self.force,
            noprune: !self.prune_children,
        }
    }
}

/// Fluent handle over a single image on the engine.
#[derive(Clone)]
pub struct DockerImage {
    engine: Arc<dyn Engine>,
    image: Option<ImageDescriptor>,
    // Name the stored image was built, pulled or attached under.
    reference: Option<String>,
}

impl fmt::Debug for DockerImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DockerImage")
            .field("image", &self.image)
            .finish_non_exhaustive()
    }
}

impl DockerImage {
    /// Creates an empty handle. Nothing is sent to the engine until build or pull.
    pub fn new(engine: Arc<dyn Engine>) -> Self {
        Self {
            engine,
            image: None,
            reference: None,
        }
    }

    pub fn engine(&self) -> &Arc<dyn Engine> {
        &self.engine
    }

    /// Builds `context` with its `Dockerfile`, tagged `tag` or `local/image`.
    pub async fn from_dockerfile(
        &mut self,
        context: impl AsRef<Path>,
        tag: Option<&str>,
    ) -> Result<&mut Self> {
        let options = BuildOptions::new(
            context.as_ref(),
            tag.unwrap_or(DEFAULT_BUILD_TAG).to_string(),
        );
        self.build(options).await
    }

    /// Builds an image and makes it the handle's stored image.
    ///
    /// # Errors
    ///
    /// * `Error::Build` - The context is invalid or the recipe failed. `log`
    ///   holds everything the engine streamed back.
    /// * `Error::Connection` - The engine could not be reached.
    #[instrument(skip(self, options), fields(tag = %options.tag, context = %options.context.display()))]
    pub async fn build(&mut self, options: BuildOptions) -> Result<&mut Self> {
        info!("Building image '{}'...", options.tag);
        let context = pack_build_context(&options.context, &options.dockerfile).map_err(|e| {
            error!("Invalid build context for '{}': {}", options.tag, e);
            Error::Build {
                tag: options.tag.clone(),
                message: e.to_string(),
                log: String::new(),
            }
        })?;

        let mut log = String::new();
        let mut built_id: Option<String> = None;
        let mut stream = self.engine.build_image(options.to_bollard(), context);
        while let Some(event) = stream.next().await {
            match event {
                Ok(info) => {
                    if let Some(line) = info.stream.as_deref() {
                        debug!("{}", line.trim_end());
                        log.push_str(line);
                    }
                    if let Some(id) = info.aux.and_then(|aux| aux.id) {
                        built_id = Some(id);
                    }
                    if let Some(message) = info
                        .error_detail
                        .and_then(|detail| detail.message)
                        .or(info.error)
                    {
                        error!("Build of '{}' failed: {}", options.tag, message);
                        return Err(Error::Build {
                            tag: options.tag.clone(),
                            message,
                            log,
                        });
                    }
                }
                Err(e) if is_transport_failure(&e) => {
                    error!("Lost the engine while building '{}': {}", options.tag, e);
                    return Err(Error::Connection { source: e });
                }
                Err(e) => {
                    error!("Build of '{}' failed: {}", options.tag, e);
                    return Err(Error::Build {
                        tag: options.tag.clone(),
                        message: e.to_string(),
                        log,
                    });
                }
            }
        }
        drop(stream);

        // Tags are not part of the build stream, ask the engine for the full picture.
        let descriptor = self.get(&options.tag).await?;
        if let Some(id) = built_id.filter(|id| *id != descriptor.id) {
            warn!(
                "Build reported id {} but '{}' resolves to {}",
                id, options.tag, descriptor.id
            );
        }
        info!("Built image '{}' ({})", options.tag, descriptor.short_id);
        self.store(options.tag.clone(), descriptor);
        Ok(self)
    }

    /// Pulls `repository:tag` (`latest` when `tag` is `None`).
    pub async fn from_image(&mut self, repository: &str, tag: Option<&str>) -> Result<&mut Self> {
        let options = PullOptions::new(repository).tag(tag.unwrap_or(DEFAULT_PULL_TAG));
        self.pull(options).await
    }

    /// Pulls an image and makes it the handle's stored image.
    ///
    /// # Errors
    ///
    /// * `Error::Pull` - Unknown repository or tag, rejected credentials, or an
    ///   unreachable registry.
    /// * `Error::Connection` - The engine itself could not be reached.
    #[instrument(skip(self, options), fields(reference = %options.reference()))]
    pub async fn pull(&mut self, options: PullOptions) -> Result<&mut Self> {
        let reference = options.reference();
        info!("Pulling image '{}'...", reference);

        let mut stream = self
            .engine
            .create_image(options.to_bollard(), options.credentials.clone());
        while let Some(event) = stream.next().await {
            match event {
                Ok(info) => {
                    if let Some(message) = info
                        .error_detail
                        .and_then(|detail| detail.message)
                        .or(info.error)
                    {
                        error!("Pull of '{}' failed: {}", reference, message);
                        return Err(Error::Pull { reference, message });
                    }
                    if let Some(status) = info.status.as_deref() {
                        debug!("{} {}", info.id.as_deref().unwrap_or_default(), status);
                    }
                }
                Err(e) if is_transport_failure(&e) => {
                    error!("Lost the engine while pulling '{}': {}", reference, e);
                    return Err(Error::Connection { source: e });
                }
                Err(e) => {
                    error!("Pull of '{}' failed: {}", reference, e);
                    return Err(Error::Pull {
                        reference,
                        message: e.to_string(),
                    });
                }
            }
        }
        drop(stream);

        let descriptor = self.get(&reference).await?;
        info!("Pulled image '{}' ({})", reference, descriptor.short_id);
        self.store(reference, descriptor);
        Ok(self)
    }

    /// Attaches an image that already exists locally, without building or pulling.
    pub async fn from_local(&mut self, reference: &str) -> Result<&mut Self> {
        let descriptor = self.get(reference).await?;
        self.store(reference.to_string(), descriptor);
        Ok(self)
    }

    /// Looks up any image by name, tag or id. The stored image is not touched.
    ///
    /// # Errors
    ///
    /// * `Error::ImageNotFound` - The engine has no such image.
    /// * `Error::Connection` / `Error::DockerApi` - The lookup itself failed.
    #[instrument(skip(self))]
    pub async fn get(&self, reference: &str) -> Result<ImageDescriptor> {
        let inspect = self
            .engine
            .inspect_image(reference)
            .await
            .map_err(|e| match status_code(&e) {
                Some(404) => {
                    debug!("Image '{}' not found.", reference);
                    Error::ImageNotFound {
                        name: reference.to_string(),
                    }
                }
                _ => {
                    error!("Failed to inspect image '{}': {}", reference, e);
                    classify(e)
                }
            })?;
        let id = inspect.id.unwrap_or_default();
        Ok(ImageDescriptor {
            short_id: short_id(&id),
            tags: inspect.repo_tags.unwrap_or_default(),
            id,
        })
    }

    /// `true` if the engine has `reference`, `false` only when it reports it missing.
    ///
    /// Any other failure, an unreachable engine in particular, is returned as an error.
    pub async fn exists(&self, reference: &str) -> Result<bool> {
        match self.get(reference).await {
            Ok(_) => Ok(true),
            Err(Error::ImageNotFound { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Deletes the stored image and clears the handle.
    ///
    /// # Errors
    ///
    /// * `Error::NoImage` - Nothing was built or pulled.
    /// * `Error::ImageNotFound` - The image is already gone (unless `ignore_missing`).
    /// * `Error::Removal` - A container still uses the image and `force` is not set.
    #[instrument(skip(self))]
    pub async fn remove(&mut self, options: RemoveOptions) -> Result<()> {
        let reference = self.reference()?;
        info!("Removing image '{}' (force: {})...", reference, options.force);

        match self
            .engine
            .remove_image(&reference, options.to_bollard())
            .await
        {
            Ok(items) => {
                for item in items {
                    if let Some(untagged) = item.untagged {
                        debug!("Untagged: {}", untagged);
                    }
                    if let Some(deleted) = item.deleted {
                        debug!("Deleted: {}", deleted);
                    }
                }
                info!("Image '{}' removed.", reference);
                self.clear();
                Ok(())
            }
            Err(e) => match status_code(&e) {
                Some(404) if options.ignore_missing => {
                    debug!("Image '{}' was already removed.", reference);
                    self.clear();
                    Ok(())
                }
                Some(404) => {
                    warn!("Image '{}' not found, cannot remove.", reference);
                    Err(Error::ImageNotFound { name: reference })
                }
                Some(409) => {
                    let message = e.to_string();
                    error!("Conflict removing image '{}': {}", reference, message);
                    Err(Error::Removal {
                        name: reference,
                        message,
                    })
                }
                _ => {
                    error!("Failed to remove image '{}': {}", reference, e);
                    Err(classify(e))
                }
            },
        }
    }

    fn store(&mut self, reference: String, descriptor: ImageDescriptor) {
        self.reference = Some(reference);
        self.image = Some(descriptor);
    }

    fn clear(&mut self) {
        self.reference = None;
        self.image = None;
    }

    pub fn descriptor(&self) -> Result<&ImageDescriptor> {
        self.image.as_ref().ok_or(Error::NoImage)
    }

    pub fn id(&self) -> Result<&str> {
        Ok(&self.descriptor()?.id)
    }

    pub fn short_id(&self) -> Result<&str> {
        Ok(&self.descriptor()?.short_id)
    }

    pub fn tags(&self) -> Result<&[String]> {
        Ok(&self.descriptor()?.tags)
    }

    /// Name the stored image was built, pulled or attached under.
    pub fn reference(&self) -> Result<String> {
        let descriptor = self.descriptor()?;
        Ok(self
            .reference
            .clone()
            .unwrap_or_else(|| descriptor.id.clone()))
    }
}
