use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError};

use log::{debug, info, warn};

use crate::config::Config;
use crate::container::{Container, ContainerState, INFO_SECTION};
use crate::data::model::{expand_user, LoaderArgs, ValueKind};
use crate::error::{Error, Result};
use crate::registry::{default_registry, SharedRegistry};
use crate::subsource::{Subsource, SUBSOURCE_TYPE};
use crate::units::{Angle, Quantity, SkyPosition};

/// Prefix of the options forwarded to loaders as keyword arguments.
pub const DEFAULT_LOADER_PREFIX: &str = "loader";

// ---------------------------------------------------------------------------
// Source – an astronomical object and its data
// ---------------------------------------------------------------------------

/// An astronomical source: metadata in the `INFO` section, data sections
/// dispatched through a type registry, and named subsources.
pub struct Source {
    state: ContainerState,
    registry: SharedRegistry,
    loader_prefix: String,
    subsources: BTreeMap<String, Subsource>,
}

impl fmt::Debug for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Source")
            .field("name", &self.name())
            .field("loaded", &self.loaded_sections())
            .field("subsources", &self.subsources.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Source {
    /// Create a source from a configuration file or a configuration object
    /// (mutually exclusive), using the process-wide registry.
    pub fn new(name: Option<&str>, config_file: Option<&Path>, config: Option<Config>) -> Result<Self> {
        match name {
            Some(name) => info!("Initializing source: {name}"),
            None => info!("Initializing source from configuration"),
        }
        let state = ContainerState::new(name, config_file, config)?;
        if !state.config().has_section(INFO_SECTION) {
            warn!("Source does not have INFO section: some functions will not work");
        }

        let mut source = Self {
            state,
            registry: default_registry(),
            loader_prefix: DEFAULT_LOADER_PREFIX.to_string(),
            subsources: BTreeMap::new(),
        };
        source.load_subsources()?;
        Ok(source)
    }

    pub fn from_file(config_file: impl AsRef<Path>) -> Result<Self> {
        Self::new(None, Some(config_file.as_ref()), None)
    }

    pub fn from_config(name: &str, config: Config) -> Result<Self> {
        Self::new(Some(name), None, Some(config))
    }

    /// Dispatch loads through `registry` instead of the process-wide one.
    pub fn with_registry(mut self, registry: SharedRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_loader_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.loader_prefix = prefix.into();
        self
    }

    pub fn registry(&self) -> &SharedRegistry {
        &self.registry
    }

    // -- INFO accessors -----------------------------------------------------

    /// Quantity stored under `option`, `None` when the section or option is
    /// missing.
    pub fn get_quantity(&self, option: &str, section: &str) -> Result<Option<Quantity>> {
        if !self.config().has_section(section) {
            return Ok(None);
        }
        self.config().get_quantity(section, option)
    }

    pub fn distance(&self) -> Result<Option<Quantity>> {
        self.get_quantity("distance", INFO_SECTION)
    }

    pub fn luminosity(&self) -> Result<Option<Quantity>> {
        self.get_quantity("luminosity", INFO_SECTION)
    }

    pub fn vlsr(&self) -> Result<Option<Quantity>> {
        self.get_quantity("vlsr", INFO_SECTION)
    }

    /// Position from `INFO`'s `ra`, `dec` and `frame` (default `icrs`).
    pub fn position(&self) -> Result<Option<SkyPosition>> {
        let config = self.config();
        if !config.has_section(INFO_SECTION) {
            return Ok(None);
        }
        let (Some(ra), Some(dec)) = (
            config.get(INFO_SECTION, "ra")?,
            config.get(INFO_SECTION, "dec")?,
        ) else {
            return Ok(None);
        };
        let frame = config.get(INFO_SECTION, "frame")?;
        SkyPosition::parse(&ra, &dec, frame.as_deref())
            .map(Some)
            .ok_or_else(|| Error::TypeCoercion {
                section: INFO_SECTION.to_string(),
                option: "ra/dec".to_string(),
                value: format!("{ra} {dec}"),
                kind: "position".to_string(),
            })
    }

    pub fn ra(&self) -> Result<Option<Angle>> {
        Ok(self.position()?.map(|p| p.ra))
    }

    pub fn dec(&self) -> Result<Option<Angle>> {
        Ok(self.position()?.map(|p| p.dec))
    }

    // -- subsources ---------------------------------------------------------

    /// Rebuild the subsources from every `type = subsource` section.
    pub fn load_subsources(&mut self) -> Result<()> {
        let config = self.state.config();
        let mut subsources = BTreeMap::new();
        let names: Vec<&str> = config
            .sections_with(|view| view.get("type").is_some_and(is_subsource_type))
            .collect();
        for name in names {
            let mut options = Vec::new();
            if let Some(own) = config.section(name) {
                for key in own.keys().filter(|k| *k != "type") {
                    if let Some(value) = config.get(name, key)? {
                        options.push((key.to_string(), value));
                    }
                }
            }
            debug!("Loading subsource {name}");
            subsources.insert(name.to_string(), Subsource::from_dict(options, Some(name))?);
        }
        self.subsources = subsources;
        Ok(())
    }

    pub fn subsources(&self) -> &BTreeMap<String, Subsource> {
        &self.subsources
    }

    pub fn subsource(&self, name: &str) -> Option<&Subsource> {
        self.subsources.get(name)
    }

    // -- data ---------------------------------------------------------------

    /// Lower-cased `type` of a section.
    pub fn get_type(&self, section: &str) -> Result<String> {
        self.config()
            .get(section, "type")?
            .map(|t| t.trim().to_lowercase())
            .ok_or_else(|| Error::MissingOption {
                section: section.to_string(),
                option: "type".to_string(),
            })
    }

    /// Keyword arguments from the section's `<prefix>_<key>` options.
    ///
    /// A sibling `<prefix>_<key>_type` picks the coercion (`int`, `float`,
    /// `bool` or `quantity`); without one the text is passed as is.
    pub fn loader_args(&self, section: &str) -> Result<LoaderArgs> {
        let config = self.config();
        let prefix = format!("{}_", self.loader_prefix);
        let mut args = LoaderArgs::new();

        for (option, _) in config.options(section)? {
            let Some(key) = option.strip_prefix(&prefix) else {
                continue;
            };
            if key.is_empty() || key.ends_with("_type") {
                continue;
            }

            let type_option = format!("{option}_type");
            let kind = match config.get(section, &type_option)? {
                Some(name) => name
                    .parse::<ValueKind>()
                    .ok()
                    .filter(ValueKind::is_loader_kind)
                    .ok_or_else(|| Error::TypeCoercion {
                        section: section.to_string(),
                        option: type_option.clone(),
                        value: name.clone(),
                        kind: "int|float|bool|quantity".to_string(),
                    })?,
                None => ValueKind::Str,
            };
            if let Some(value) = config.get_typed(section, option, kind, None)? {
                args.insert(key, value);
            }
        }
        Ok(args)
    }

    fn resolve_path(&self, section: &str, file: Option<&Path>) -> Result<PathBuf> {
        if let Some(file) = file {
            return Ok(expand_user(&file.to_string_lossy()));
        }
        let config = self.config();
        match config.get_path(section, "file")? {
            Some(path) => Ok(path),
            None => config
                .get_path(section, "loc")?
                .ok_or_else(|| Error::MissingFile(section.to_string())),
        }
    }

    /// Load a section with extra loader arguments that override the ones
    /// from the configuration.
    pub fn load_data_with(
        &mut self,
        section: &str,
        file: Option<&Path>,
        extra: LoaderArgs,
    ) -> Result<()> {
        if !self.config().has_section(section) {
            return Err(Error::SectionNotFound(section.to_string()));
        }
        let path = self.resolve_path(section, file)?;
        let dtype = self.get_type(section)?;
        let loader = self
            .registry
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .resolve(&dtype)?;
        let mut args = self.loader_args(section)?;
        args.extend(extra);

        debug!("Loading {section} as {dtype} from {}", path.display());
        let artifact = loader
            .load(&path, &args)
            .map_err(|source| Error::Loader {
                section: section.to_string(),
                source,
            })?;
        self.state.store(section, artifact, &path)
    }

    /// Load every data section: all but `INFO`, subsources and sections
    /// without a `type`. The first failure stops the run.
    pub fn load_all_data(&mut self) -> Result<()> {
        let sections: Vec<String> = self
            .config()
            .sections_with(|view| {
                view.name() != INFO_SECTION
                    && view.get("type").is_some_and(|t| !is_subsource_type(t))
            })
            .map(str::to_string)
            .collect();
        for section in sections {
            info!("Loading: {section}");
            self.load_data(&section, None)?;
        }
        Ok(())
    }

    /// Cached artifact of `section` as a concrete type, loading on a miss.
    /// `None` when the artifact is of another type.
    pub fn get_as<T: Any + Send + Sync>(&mut self, section: &str) -> Result<Option<Arc<T>>> {
        Ok(self.get(section)?.downcast::<T>().ok())
    }
}

fn is_subsource_type(tag: &str) -> bool {
    tag.trim().eq_ignore_ascii_case(SUBSOURCE_TYPE)
}

impl Container for Source {
    fn state(&self) -> &ContainerState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut ContainerState {
        &mut self.state
    }

    fn load_data(&mut self, section: &str, file: Option<&Path>) -> Result<()> {
        self.load_data_with(section, file, LoaderArgs::new())
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = self.name().unwrap_or("<unnamed>");
        writeln!(f, "{name}")?;
        write!(f, "{}", "-".repeat(name.chars().count()))?;
        if let Some(info) = self.config().section(INFO_SECTION) {
            for (option, value) in info.iter() {
                write!(f, "\n{option} = {value}")?;
            }
        }
        let loaded = self.loaded_sections();
        if !loaded.is_empty() {
            write!(f, "\nLoaded data:")?;
            for section in loaded {
                write!(f, "\n\t{section}")?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use crate::data::model::{Artifact, Value};
    use crate::registry::Registry;

    type Calls = Arc<Mutex<Vec<(PathBuf, LoaderArgs)>>>;

    /// A registry whose `image` loader records every call.
    fn recording_registry() -> (SharedRegistry, Calls) {
        let calls: Calls = Arc::default();
        let seen = calls.clone();
        let mut registry = Registry::new();
        registry.register(
            "image",
            move |path: &Path, args: &LoaderArgs| -> anyhow::Result<Artifact> {
                seen.lock().unwrap().push((path.to_path_buf(), args.clone()));
                Ok(Arc::new(path.display().to_string()))
            },
        );
        (registry.into_shared(), calls)
    }

    fn source(text: &str) -> (Source, Calls) {
        let (registry, calls) = recording_registry();
        let source = Source::from_config("M1", text.parse().unwrap())
            .unwrap()
            .with_registry(registry);
        (source, calls)
    }

    const CONFIG: &str = "\
[INFO]
ra = 05h34m31.9s
dec = +22d00m52s
distance = 2 kpc

[cont]
type = Image
file = /data/cont.fits
loader_nhdu = 1
loader_nhdu_type = int
loader_scale = 2.5 Jy
loader_scale_type = quantity
loader_usedask = false
loader_usedask_type = bool
loader_mode = fast

[core]
type = subsource
ra = 05h34m32s
dec = +22d00m50s
radius = 2 arcsec
";

    #[test]
    fn dispatch_builds_typed_kwargs() {
        let (mut src, calls) = source(CONFIG);
        src.load_data("cont", None).unwrap();

        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        let (path, args) = &calls[0];
        assert_eq!(path, Path::new("/data/cont.fits"));
        assert_eq!(args.len(), 4);
        assert_eq!(args.get("nhdu"), Some(&Value::Int(1)));
        assert_eq!(args.get("scale"), Some(&Value::Quantity(Quantity::new(2.5, "Jy"))));
        assert_eq!(args.get("usedask"), Some(&Value::Bool(false)));
        assert_eq!(args.get("mode"), Some(&Value::Str("fast".into())));
    }

    #[test]
    fn extra_args_override_config() {
        let (mut src, calls) = source(CONFIG);
        let extra: LoaderArgs = [("nhdu", Value::Int(3))].into_iter().collect();
        src.load_data_with("cont", None, extra).unwrap();
        assert_eq!(calls.lock().unwrap()[0].1.get("nhdu"), Some(&Value::Int(3)));
    }

    #[test]
    fn invalid_kwarg_type_name() {
        let (src, _) = source("[a]\ntype = image\nloader_x = 1\nloader_x_type = complex\n");
        let err = src.loader_args("a").err().unwrap();
        assert!(matches!(err, Error::TypeCoercion { option, .. } if option == "loader_x_type"));
    }

    #[test]
    fn custom_prefix() {
        let (src, _) = source("[a]\ntype = image\nopen_hdu = 2\nopen_hdu_type = int\nloader_x = y\n");
        let src = src.with_loader_prefix("open");
        let args = src.loader_args("a").unwrap();
        assert_eq!(args.len(), 1);
        assert_eq!(args.get("hdu"), Some(&Value::Int(2)));
    }

    #[test]
    fn override_path_is_recorded() {
        let (mut src, calls) = source(CONFIG);
        src.load_data("cont", Some(Path::new("/other/cont.fits"))).unwrap();
        assert_eq!(calls.lock().unwrap()[0].0, Path::new("/other/cont.fits"));
        assert_eq!(
            src.config().get_raw("cont", "file").unwrap(),
            Some("/other/cont.fits")
        );
    }

    #[test]
    fn loc_option_is_a_path_fallback() {
        let (mut src, calls) = source("[a]\ntype = image\nloc = /data/a.fits\n");
        src.get("a").unwrap();
        assert_eq!(calls.lock().unwrap()[0].0, Path::new("/data/a.fits"));
        assert_eq!(src.config().get_raw("a", "file").unwrap(), Some("/data/a.fits"));
    }

    #[test]
    fn missing_path() {
        let (mut src, calls) = source("[a]\ntype = image\n");
        let err = src.load_data("a", None).err().unwrap();
        assert!(matches!(err, Error::MissingFile(s) if s == "a"));
        assert!(calls.lock().unwrap().is_empty());
    }

    #[test]
    fn unknown_type_leaves_cache_untouched() {
        let (mut src, _) = source("[a]\ntype = nonexistent\nfile = /tmp/a\n");
        let err = src.get("a").err().unwrap();
        assert!(matches!(err, Error::UnknownType(t) if t == "nonexistent"));
        assert!(!src.is_loaded("a"));
    }

    #[test]
    fn missing_type() {
        let (mut src, _) = source("[a]\nfile = /tmp/a\n");
        let err = src.load_data("a", None).err().unwrap();
        assert!(matches!(err, Error::MissingOption { option, .. } if option == "type"));
    }

    #[test]
    fn loader_failure_is_wrapped() {
        let mut registry = Registry::new();
        registry.register("image", |_: &Path, _: &LoaderArgs| -> anyhow::Result<Artifact> {
            anyhow::bail!("corrupt header")
        });
        let mut src = Source::from_config("M1", "[a]\ntype = image\nfile = /x\n".parse().unwrap())
            .unwrap()
            .with_registry(registry.into_shared());
        let err = src.get("a").err().unwrap();
        match err {
            Error::Loader { section, source } => {
                assert_eq!(section, "a");
                assert_eq!(source.to_string(), "corrupt header");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(!src.is_loaded("a"));
    }

    #[test]
    fn load_all_skips_info_and_subsources() {
        let (mut src, calls) = source(CONFIG);
        src.load_all_data().unwrap();
        assert_eq!(calls.lock().unwrap().len(), 1);
        assert_eq!(src.loaded_sections(), vec!["cont"]);
    }

    #[test]
    fn load_all_stops_at_first_failure() {
        let (mut src, calls) =
            source("[a]\ntype = image\n[b]\ntype = image\nfile = /tmp/b\n");
        assert!(src.load_all_data().is_err());
        assert!(calls.lock().unwrap().is_empty());
        assert!(!src.is_loaded("b"));
    }

    #[test]
    fn info_accessors() {
        let (src, _) = source(CONFIG);
        assert_eq!(src.distance().unwrap(), Some(Quantity::new(2.0, "kpc")));
        assert_eq!(src.luminosity().unwrap(), None);
        assert_eq!(src.vlsr().unwrap(), None);
        let pos = src.position().unwrap().unwrap();
        assert_eq!(pos.frame, "icrs");
        assert_eq!(src.dec().unwrap(), Some(Angle::parse_dec("+22d00m52s").unwrap()));
    }

    #[test]
    fn accessors_without_info_are_absent() {
        let (src, _) = source("[a]\ntype = image\n");
        assert_eq!(src.position().unwrap(), None);
        assert_eq!(src.distance().unwrap(), None);
    }

    #[test]
    fn malformed_position_is_an_error() {
        let (src, _) = source("[INFO]\nra = up\ndec = down\n");
        assert!(matches!(src.position(), Err(Error::TypeCoercion { .. })));
    }

    #[test]
    fn subsources_are_built_at_construction() {
        let (src, _) = source(CONFIG);
        let core = src.subsource("core").unwrap();
        assert_eq!(core.radius(), Some(&Quantity::new(2.0, "arcsec")));
        assert!(core.position().is_some());
        assert!(core.get("type").is_none());
        assert!(core.get("name").is_none());
    }

    #[test]
    fn reloading_subsources_tracks_config() {
        let (mut src, _) = source(CONFIG);
        src.update_config("knot", [("type", "subsource"), ("radius", "0.5 arcsec")])
            .unwrap();
        assert!(src.subsource("knot").is_none());
        src.load_subsources().unwrap();
        assert_eq!(src.subsources().len(), 2);
    }

    #[test]
    fn get_as_downcasts() {
        let (mut src, _) = source(CONFIG);
        let text = src.get_as::<String>("cont").unwrap().unwrap();
        assert_eq!(text.as_str(), "/data/cont.fits");
        assert!(src.get_as::<u32>("cont").unwrap().is_none());
    }

    #[test]
    fn display_lists_info_and_loaded_data() {
        let (mut src, _) = source(CONFIG);
        src.get("cont").unwrap();
        let text = src.to_string();
        assert!(text.starts_with("M1\n--\n"));
        assert!(text.contains("distance = 2 kpc"));
        assert!(text.ends_with("Loaded data:\n\tcont"));
    }
}
