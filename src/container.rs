use std::collections::HashMap;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};

use crate::config::Config;
use crate::data::model::{expand_user, Artifact};
use crate::error::{Error, Result};

/// Section holding source-level metadata; never loaded as data.
pub const INFO_SECTION: &str = "INFO";

// ---------------------------------------------------------------------------
// ContainerState – name, configuration and artifact cache
// ---------------------------------------------------------------------------

/// The data every container carries.
///
/// Invariant: the cache only holds sections present in the configuration.
#[derive(Debug)]
pub struct ContainerState {
    name: Option<String>,
    config: Config,
    config_path: Option<PathBuf>,
    cache: HashMap<String, Artifact>,
}

impl ContainerState {
    /// Build the state from either a configuration file or a configuration
    /// object, never both.
    ///
    /// A file that does not exist yet gives an empty configuration that will
    /// be written back to that path. An explicit `name` is recorded in the
    /// default section; otherwise the name is read from the configuration.
    pub fn new(
        name: Option<&str>,
        config_file: Option<&Path>,
        config: Option<Config>,
    ) -> Result<Self> {
        let (config, config_path) = match (config_file, config) {
            (Some(_), Some(_)) => return Err(Error::ConflictingInputs),
            (Some(file), None) => {
                let path = expand_user(&file.to_string_lossy());
                let config = if path.is_file() {
                    info!("Loading config file: {}", path.display());
                    Config::read(&path)?
                } else {
                    info!("Config file {} does not exist yet", path.display());
                    Config::new()
                };
                (config, Some(path))
            }
            (None, Some(config)) => {
                info!("Configuration assigned");
                (config, None)
            }
            (None, None) => (Config::new(), None),
        };

        let mut state = Self {
            name: None,
            config,
            config_path,
            cache: HashMap::new(),
        };
        state.resolve_name(name)?;
        if state.config_path.is_none() {
            state.config_path = state.name.as_ref().map(|n| PathBuf::from(format!("{n}.cfg")));
        }
        if state.config_path.is_none() {
            warn!("Could not determine config file name");
        }
        Ok(state)
    }

    fn resolve_name(&mut self, name: Option<&str>) -> Result<()> {
        let default_section = self.config.default_section().to_string();
        if let Some(name) = name {
            self.config.set(&default_section, "name", name.replace('$', "$$"))?;
            self.name = Some(name.to_string());
            return Ok(());
        }

        let from_config = match self.config.get(&default_section, "name")? {
            Some(name) => Some(name),
            None if self.config.has_section(INFO_SECTION) => self.config.get(INFO_SECTION, "name")?,
            None => None,
        };
        if from_config.is_none() {
            warn!("Could not determine name");
        }
        self.name = from_config;
        Ok(())
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub(crate) fn config_mut(&mut self) -> &mut Config {
        &mut self.config
    }

    /// Where `write` saves by default.
    pub fn config_path(&self) -> Option<&Path> {
        self.config_path.as_deref()
    }

    pub fn set_config_path(&mut self, path: impl Into<PathBuf>) {
        self.config_path = Some(path.into());
    }

    pub fn cached(&self, section: &str) -> Option<Artifact> {
        self.cache.get(section).cloned()
    }

    /// Cache `artifact` for `section` and record the file it came from.
    ///
    /// The `file` option is only rewritten when it does not already resolve
    /// to `path`, so references like `${root}/x.fits` survive.
    pub fn store(&mut self, section: &str, artifact: Artifact, path: &Path) -> Result<()> {
        if !self.config.has_section(section) {
            return Err(Error::SectionNotFound(section.to_string()));
        }
        let recorded = self.config.get_path(section, "file").ok().flatten();
        if recorded.as_deref() != Some(path) {
            let text = path.display().to_string().replace('$', "$$");
            self.config.set(section, "file", text)?;
        }
        self.cache.insert(section.to_string(), artifact);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Container – lazy loading on top of ContainerState
// ---------------------------------------------------------------------------

/// A named configuration whose data sections are loaded on first access.
///
/// Implementors supply [`Container::load_data`]; everything else is shared.
/// A section goes from unloaded to loaded once and stays cached until the
/// caller overwrites it with [`Container::insert`] or reloads it explicitly.
pub trait Container {
    fn state(&self) -> &ContainerState;

    fn state_mut(&mut self) -> &mut ContainerState;

    /// Load `section` (from `file` when given) and cache the artifact.
    ///
    /// Implementations must leave an artifact in the cache and record the
    /// resolved path through [`ContainerState::store`].
    fn load_data(&mut self, section: &str, file: Option<&Path>) -> Result<()>;

    fn name(&self) -> Option<&str> {
        self.state().name()
    }

    fn config(&self) -> &Config {
        self.state().config()
    }

    /// Cached artifact for `section`, loading it on a miss.
    fn get(&mut self, section: &str) -> Result<Artifact> {
        if let Some(artifact) = self.state().cached(section) {
            return Ok(artifact);
        }
        if !self.config().has_section(section) {
            return Err(Error::SectionNotFound(section.to_string()));
        }
        self.load_data(section, None)?;
        self.state().cached(section).ok_or_else(|| Error::Loader {
            section: section.to_string(),
            source: anyhow::anyhow!("loader finished without caching an artifact"),
        })
    }

    /// Load each section from the file paired with it, in order.
    fn load_all<S, P>(&mut self, sections: &[S], files: &[P]) -> Result<()>
    where
        Self: Sized,
        S: AsRef<str>,
        P: AsRef<Path>,
    {
        for (section, file) in sections.iter().zip(files) {
            self.load_data(section.as_ref(), Some(file.as_ref()))?;
        }
        Ok(())
    }

    /// Overwrite the cached artifact of an existing section.
    fn insert(&mut self, section: &str, artifact: Artifact) -> Result<()> {
        if !self.config().has_section(section) {
            return Err(Error::SectionNotFound(section.to_string()));
        }
        self.state_mut().cache.insert(section.to_string(), artifact);
        Ok(())
    }

    fn is_loaded(&self, section: &str) -> bool {
        self.state().cache.contains_key(section)
    }

    /// Loaded sections in configuration order.
    fn loaded_sections(&self) -> Vec<&str> {
        let state = self.state();
        state
            .config
            .sections()
            .filter(|s| state.cache.contains_key(*s))
            .collect()
    }

    /// Merge `options` into `section`, creating it when absent.
    fn update_config<I, K, V>(&mut self, section: &str, options: I) -> Result<()>
    where
        Self: Sized,
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: ToString,
    {
        let config = self.state_mut().config_mut();
        if config.add_section(section) {
            info!("Adding section {section}");
        } else {
            info!("Updating section {section}");
        }
        for (key, value) in options {
            config.set(section, key.as_ref(), value.to_string())?;
        }
        Ok(())
    }

    /// Copy the own options of `section` (ignoring defaults) to `new_section`.
    fn copy_config(&mut self, section: &str, new_section: &str) -> Result<()> {
        self.state_mut()
            .config_mut()
            .copy_section(section, new_section, true)
    }

    /// Sections whose `type` is one of `types`.
    fn data_sections(&self, types: &[&str]) -> Vec<&str> {
        let config = self.config();
        config
            .sections()
            .filter(|section| {
                config
                    .get_raw(section, "type")
                    .ok()
                    .flatten()
                    .is_some_and(|t| types.iter().any(|want| want.eq_ignore_ascii_case(t.trim())))
            })
            .collect()
    }

    /// Save the configuration to `path`, or to the remembered config path.
    fn write(&self, path: Option<&Path>) -> Result<()> {
        let state = self.state();
        let target = path.or(state.config_path()).ok_or(Error::NoConfigPath)?;
        debug!("Writing configuration to {}", target.display());
        state.config.write(target)
    }
}
