//! Type registry: maps a section's `type` tag to the loader that opens it.
//!
//! A [`Registry`] is an ordinary value that sources hold a shared handle to.
//! For callers that do not need isolation there is a process-wide instance,
//! seeded with the built-in loaders, reachable through
//! [`default_registry`] and [`register`].

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::{Arc, OnceLock, PoisonError, RwLock};

use log::debug;

use crate::data::loader;
use crate::data::model::{Artifact, LoaderArgs};
use crate::error::{Error, Result};

/// Something that can turn a file plus keyword arguments into an artifact.
pub trait Loadable: Send + Sync {
    fn load(&self, path: &Path, args: &LoaderArgs) -> anyhow::Result<Artifact>;
}

impl<F> Loadable for F
where
    F: Fn(&Path, &LoaderArgs) -> anyhow::Result<Artifact> + Send + Sync,
{
    fn load(&self, path: &Path, args: &LoaderArgs) -> anyhow::Result<Artifact> {
        self(path, args)
    }
}

/// A registry handle shared between sources.
pub type SharedRegistry = Arc<RwLock<Registry>>;

#[derive(Clone, Default)]
pub struct Registry {
    loaders: HashMap<String, Arc<dyn Loadable>>,
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry").field("tags", &self.tags()).finish()
    }
}

impl Registry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the loaders shipped with the crate
    /// (`profile` and `sed`, both 1-D tables).
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("profile", loader::load_profile);
        registry.register("sed", loader::load_profile);
        registry
    }

    /// Register `loader` under the lower-cased `tag`, replacing any previous
    /// loader for it.
    pub fn register(&mut self, tag: &str, loader: impl Loadable + 'static) {
        let tag = tag.to_lowercase();
        if self.loaders.insert(tag.clone(), Arc::new(loader)).is_some() {
            debug!("replaced loader for type '{tag}'");
        } else {
            debug!("registered loader for type '{tag}'");
        }
    }

    pub fn resolve(&self, tag: &str) -> Result<Arc<dyn Loadable>> {
        let tag = tag.to_lowercase();
        self.loaders
            .get(&tag)
            .cloned()
            .ok_or(Error::UnknownType(tag))
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.loaders.contains_key(&tag.to_lowercase())
    }

    /// Registered tags, sorted.
    pub fn tags(&self) -> Vec<&str> {
        let mut tags: Vec<&str> = self.loaders.keys().map(String::as_str).collect();
        tags.sort_unstable();
        tags
    }

    pub fn into_shared(self) -> SharedRegistry {
        Arc::new(RwLock::new(self))
    }
}

static DEFAULT_REGISTRY: OnceLock<SharedRegistry> = OnceLock::new();

/// The process-wide registry, created with the built-ins on first use.
pub fn default_registry() -> SharedRegistry {
    DEFAULT_REGISTRY
        .get_or_init(|| Registry::with_builtins().into_shared())
        .clone()
}

/// Register a loader in the process-wide registry.
pub fn register(tag: &str, loader: impl Loadable + 'static) {
    default_registry()
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .register(tag, loader);
}
