use super::Store;
use crate::cipher::Cipher;
use crate::config::{CommitMode, Config};
use crate::coordination::{ChangeWatcher, PollingWatcher};
use crate::error::{CoreError, CoreResult};
use crate::layout::StorePaths;
use crate::payload::PayloadCodec;
use mapkv_codec::{DynEncoder, EncoderRegistry, ObjectEncoder};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use tracing::debug;

/// Configures and opens a [`Store`].
///
/// Nothing is validated until [`build`](Self::build), which reports every
/// configuration problem as an error.
///
/// ```rust,no_run
/// use mapkv_core::{Builder, CborEncoder, Config, CommitMode};
///
/// let store = Builder::new("/data/app", "profile")
///     .config(Config::default().commit_mode(CommitMode::Async))
///     .encoder(CborEncoder::<Vec<u32>>::new("Scores"))
///     .blocking()
///     .build()?;
/// # Ok::<(), mapkv_core::CoreError>(())
/// ```
pub struct Builder {
    dir: PathBuf,
    name: String,
    config: Config,
    encoders: Vec<Arc<dyn DynEncoder>>,
    cipher: Option<Arc<dyn Cipher>>,
    watcher: Option<Box<dyn ChangeWatcher>>,
}

impl Builder {
    /// Starts configuring store `name` in directory `dir`.
    pub fn new(dir: impl AsRef<Path>, name: impl Into<String>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            name: name.into(),
            config: Config::default(),
            encoders: Vec::new(),
            cipher: None,
            watcher: None,
        }
    }

    /// Replaces the whole configuration.
    #[must_use]
    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Sets the commit mode.
    #[must_use]
    pub fn commit_mode(mut self, mode: CommitMode) -> Self {
        self.config = self.config.commit_mode(mode);
        self
    }

    /// Registers an object encoder.
    #[must_use]
    pub fn encoder<E: ObjectEncoder>(mut self, encoder: E) -> Self {
        self.encoders.push(Arc::new(encoder));
        self
    }

    /// Registers an encoder shared with other stores.
    #[must_use]
    pub fn encoder_shared(mut self, encoder: Arc<dyn DynEncoder>) -> Self {
        self.encoders.push(encoder);
        self
    }

    /// Encrypts values with `cipher`.
    #[must_use]
    pub fn cipher(mut self, cipher: impl Cipher + 'static) -> Self {
        self.cipher = Some(Arc::new(cipher));
        self
    }

    /// Encrypts values with a shared cipher.
    #[must_use]
    pub fn cipher_shared(mut self, cipher: Arc<dyn Cipher>) -> Self {
        self.cipher = Some(cipher);
        self
    }

    /// Makes [`build`](Self::build) wait for the initial load.
    #[must_use]
    pub fn blocking(mut self) -> Self {
        self.config = self.config.blocking(true);
        self
    }

    /// Shares the file with other processes.
    #[must_use]
    pub fn multi_process(mut self) -> Self {
        self.config = self.config.multi_process(true);
        self
    }

    /// Replaces the default [`PollingWatcher`] of a multi-process store.
    #[must_use]
    pub fn watcher(mut self, watcher: Box<dyn ChangeWatcher>) -> Self {
        self.watcher = Some(watcher);
        self
    }

    /// Directory of the store.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Name of the store.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn set_dir(&mut self, dir: PathBuf) {
        self.dir = dir;
    }

    /// Validates the configuration and opens the store.
    ///
    /// In blocking mode this returns after the file is loaded and
    /// recovered. Otherwise loading continues in the background and every
    /// call on the store waits for it.
    ///
    /// # Errors
    ///
    /// - [`CoreError::InvalidConfig`] for a bad name, directory or setting,
    /// - [`CoreError::Codec`] for a duplicate or invalid encoder tag,
    /// - in blocking mode, any error from loading
    ///   ([`CoreError::StoreLocked`], I/O errors).
    pub fn build(self) -> CoreResult<Store> {
        validate_name(&self.name)?;
        self.config.validate().map_err(CoreError::invalid_config)?;

        let mut registry = EncoderRegistry::builder();
        for encoder in self.encoders {
            registry = registry.register_shared(encoder)?;
        }
        let encoders = registry.build();

        let paths = StorePaths::new(&self.dir, &self.name);
        paths.ensure_dir()?;

        let watcher = if self.config.multi_process {
            self.watcher.or_else(|| {
                self.config
                    .watch_interval
                    .map(|interval| Box::new(PollingWatcher::new(interval)) as Box<dyn ChangeWatcher>)
            })
        } else {
            None
        };

        let payload = PayloadCodec::new(self.cipher, self.config.encrypt_primitives);
        let blocking = self.config.blocking;
        let store = Store::new(paths, self.config, encoders, payload, watcher)?;

        if blocking {
            store.load()?;
        } else {
            let loader = store.clone();
            thread::Builder::new()
                .name("mapkv-load".to_string())
                .spawn(move || {
                    // Failures are recorded in the store state
                    let _ = loader.load();
                })?;
            debug!(store = store.name(), "loading in background");
        }
        Ok(store)
    }
}

impl std::fmt::Debug for Builder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Builder")
            .field("dir", &self.dir)
            .field("name", &self.name)
            .field("config", &self.config)
            .field("encoders", &self.encoders.len())
            .field("cipher", &self.cipher.is_some())
            .finish_non_exhaustive()
    }
}

fn validate_name(name: &str) -> CoreResult<()> {
    if name.is_empty() {
        return Err(CoreError::invalid_config("store name is empty"));
    }
    if name == "." || name == ".." || name.contains(['/', '\\']) {
        return Err(CoreError::invalid_config(format!(
            "store name {name:?} is not a plain file name"
        )));
    }
    Ok(())
}
